//! AWS-backed implementations of the directory and health capabilities.
//! Clients are built per instance so each one can carry its own region and
//! static credentials.

use async_trait::async_trait;
use aws_config::{BehaviorVersion, Region, SdkConfig};
use aws_credential_types::Credentials;

use crate::checks::elb::{ElbCheck, ElbHealthApi, MemberHealth};
use crate::checks::redshift::RedshiftCheck;
use crate::db::PgConnector;
use crate::error::{CollectionError, ResourceError};
use crate::locator::CloudDirectory;
use crate::types::{Endpoint, InstanceConfig, ResourceSpec};

async fn sdk_config(config: &InstanceConfig) -> SdkConfig {
    let mut loader = aws_config::defaults(BehaviorVersion::latest())
        .region(Region::new(config.region.clone()));
    if let Some(credentials) = &config.credentials {
        loader = loader.credentials_provider(Credentials::new(
            credentials.access_key_id.clone(),
            credentials.secret_access_key.clone(),
            None,
            None,
            "instance-config",
        ));
    }
    loader.load().await
}

/// Directory lookup for classic load balancers: confirms the named balancer
/// exists and hands back its DNS name.
pub struct ElbDirectory;

#[async_trait]
impl CloudDirectory for ElbDirectory {
    async fn lookup(&self, config: &InstanceConfig) -> Result<Vec<Endpoint>, ResourceError> {
        let ResourceSpec::Named(name) = &config.resource else {
            return Ok(Vec::new());
        };
        let client = aws_sdk_elasticloadbalancing::Client::new(&sdk_config(config).await);
        let output = client
            .describe_load_balancers()
            .load_balancer_names(name)
            .send()
            .await
            .map_err(|e| ResourceError::Directory(e.to_string()))?;
        Ok(output
            .load_balancer_descriptions()
            .iter()
            .filter_map(|lb| lb.dns_name().map(|dns| Endpoint::new(dns, None)))
            .collect())
    }
}

/// Instance-health calls against the load balancer API, optionally narrowed
/// to a single member.
pub struct ElbHealth;

#[async_trait]
impl ElbHealthApi for ElbHealth {
    async fn instance_health(
        &self,
        config: &InstanceConfig,
    ) -> Result<Vec<MemberHealth>, CollectionError> {
        let ResourceSpec::Named(name) = &config.resource else {
            return Err(CollectionError::Query(
                "instance health requires a load balancer name".to_string(),
            ));
        };
        let client = aws_sdk_elasticloadbalancing::Client::new(&sdk_config(config).await);
        let mut request = client.describe_instance_health().load_balancer_name(name);
        if let Some(instance_id) = &config.instance_id {
            request = request.instances(
                aws_sdk_elasticloadbalancing::types::Instance::builder()
                    .instance_id(instance_id)
                    .build(),
            );
        }
        let output = request
            .send()
            .await
            .map_err(|e| CollectionError::Query(e.to_string()))?;
        Ok(output
            .instance_states()
            .iter()
            .map(|state| MemberHealth {
                instance_id: state.instance_id().unwrap_or_default().to_string(),
                state: state.state().unwrap_or("Unknown").to_string(),
                reason_code: state.reason_code().map(str::to_string),
            })
            .collect())
    }
}

/// Directory lookup for Redshift clusters: resolves the cluster endpoint.
pub struct RedshiftDirectory;

#[async_trait]
impl CloudDirectory for RedshiftDirectory {
    async fn lookup(&self, config: &InstanceConfig) -> Result<Vec<Endpoint>, ResourceError> {
        let ResourceSpec::Named(name) = &config.resource else {
            return Ok(Vec::new());
        };
        let client = aws_sdk_redshift::Client::new(&sdk_config(config).await);
        let output = client
            .describe_clusters()
            .cluster_identifier(name)
            .send()
            .await
            .map_err(|e| ResourceError::Directory(e.to_string()))?;
        Ok(output
            .clusters()
            .iter()
            .filter_map(|cluster| {
                let endpoint = cluster.endpoint()?;
                let address = endpoint.address()?;
                let port = endpoint.port().and_then(|p| u16::try_from(p).ok());
                Some(Endpoint::new(address, port))
            })
            .collect())
    }
}

/// The ELB check wired to the production AWS capabilities.
pub fn elb_check() -> ElbCheck {
    ElbCheck::new(Box::new(ElbDirectory), Box::new(ElbHealth))
}

/// The Redshift check wired to the production AWS and Postgres capabilities.
pub fn redshift_check() -> RedshiftCheck {
    RedshiftCheck::new(Box::new(RedshiftDirectory), Box::new(PgConnector))
}
