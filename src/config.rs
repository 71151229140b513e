//! Check configuration: a TOML file with one `[init_config]` table and one
//! array of instances per check.
//!
//! ```toml
//! [init_config]
//! min_collection_interval = 300
//! connect_timeout = 5
//! statsd_address = "127.0.0.1:8125"
//!
//! [[elb]]
//! name = "frontend"
//! load_balancer_name = "frontend-lb"
//! thresholds = { warning = 5, critical = 2 }
//!
//! [[redshift]]
//! name = "analytics"
//! cluster_name = "analytics-cluster"
//! db_name = "metrics"
//! user_name = "datadog"
//! user_password = "secret"
//! ```
//!
//! Raw instances are validated and normalized by [`resolve`] before anything
//! touches the network: a missing required field fails with a
//! [`ConfigError`] and no lookup is performed.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;

use crate::error::ConfigError;
use crate::types::{
    AwsCredentials, DatabaseConfig, InstanceConfig, ResourceSpec, TagSet, Thresholds,
};

/// Harness-wide fallback for the collection interval, in seconds.
pub const DEFAULT_MIN_COLLECTION_INTERVAL: u64 = 300;

/// Default connection-establishment timeout, in seconds.
pub const DEFAULT_CONNECT_TIMEOUT: u64 = 5;

/// Default dogstatsd target.
pub const DEFAULT_STATSD_ADDRESS: &str = "127.0.0.1:8125";

/// Top-level config file layout.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConfigFile {
    #[serde(default)]
    pub init_config: InitConfig,
    #[serde(default)]
    pub elb: Vec<RawInstance>,
    #[serde(default)]
    pub redshift: Vec<RawInstance>,
}

/// Process-wide settings, constructed once at startup and passed down.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct InitConfig {
    pub min_collection_interval: Option<u64>,
    pub connect_timeout: Option<u64>,
    pub statsd_address: Option<String>,
}

impl InitConfig {
    pub fn statsd_address(&self) -> &str {
        self.statsd_address.as_deref().unwrap_or(DEFAULT_STATSD_ADDRESS)
    }
}

/// One instance as it appears in the config file, before validation. The
/// named-resource key accepts the per-check spellings as aliases.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawInstance {
    pub name: Option<String>,
    #[serde(alias = "load_balancer_name", alias = "cluster_name")]
    pub resource_name: Option<String>,
    #[serde(alias = "cluster_address")]
    pub resource_address: Option<String>,
    #[serde(alias = "cluster_port")]
    pub resource_port: Option<u16>,
    pub instance_id: Option<String>,
    pub db_name: Option<String>,
    pub user_name: Option<String>,
    pub user_password: Option<String>,
    pub aws_access_key_id: Option<String>,
    pub aws_secret_access_key: Option<String>,
    pub aws_region: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    pub thresholds: Option<Thresholds>,
    pub min_collection_interval: Option<u64>,
    pub query: Option<bool>,
}

impl RawInstance {
    /// Identity tags derivable without full resolution, for reporting a
    /// failure on an instance whose pipeline never produced an
    /// [`InstanceConfig`]. `None` when the raw config does not even identify
    /// the resource.
    pub fn identity_tags(&self, resource_label: &str) -> Option<TagSet> {
        if let Some(name) = &self.resource_name {
            let mut tags = TagSet::new();
            tags.push(resource_label, name);
            return Some(tags);
        }
        match (&self.resource_address, self.resource_port) {
            (Some(host), Some(port)) => {
                let mut tags = TagSet::new();
                tags.push("address", host);
                tags.push("port", port);
                Some(tags)
            }
            _ => None,
        }
    }
}

pub fn load_config(path: impl AsRef<Path>) -> anyhow::Result<ConfigFile> {
    let raw = std::fs::read_to_string(path.as_ref())?;
    parse_config_str(&raw)
}

pub fn parse_config_str(raw: &str) -> anyhow::Result<ConfigFile> {
    use anyhow::Context;
    toml::from_str(raw).context("malformed check configuration")
}

/// Local instance-metadata lookup used to default the region.
#[async_trait]
pub trait MetadataProvider: Send + Sync {
    async fn availability_zone(&self) -> Result<String, ConfigError>;
}

/// Production lookup against the EC2 instance metadata service.
pub struct Ec2Metadata {
    base_url: String,
    client: reqwest::Client,
}

impl Ec2Metadata {
    pub fn new() -> Self {
        Self::with_base_url("http://169.254.169.254")
    }

    /// Point the lookup at a different server. Used by tests.
    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            client: reqwest::Client::new(),
        }
    }
}

impl Default for Ec2Metadata {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MetadataProvider for Ec2Metadata {
    async fn availability_zone(&self) -> Result<String, ConfigError> {
        let url = format!("{}/latest/meta-data/placement/availability-zone", self.base_url);
        let zone = self
            .client
            .get(&url)
            .timeout(Duration::from_secs(2))
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .map_err(|e| ConfigError::Metadata(e.to_string()))?
            .text()
            .await
            .map_err(|e| ConfigError::Metadata(e.to_string()))?;
        Ok(zone.trim().to_string())
    }
}

/// Mock lookup for tests. Counts calls so tests can assert that validation
/// failures happen before any lookup.
#[derive(Debug, Default)]
pub struct MockMetadata {
    zone: Option<String>,
    calls: std::sync::atomic::AtomicUsize,
}

impl MockMetadata {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_zone(zone: impl Into<String>) -> Self {
        Self {
            zone: Some(zone.into()),
            calls: std::sync::atomic::AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(std::sync::atomic::Ordering::SeqCst)
    }
}

#[async_trait]
impl MetadataProvider for MockMetadata {
    async fn availability_zone(&self) -> Result<String, ConfigError> {
        self.calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        self.zone
            .clone()
            .ok_or_else(|| ConfigError::Metadata("no metadata available".to_string()))
    }
}

/// Validate and normalize one raw instance.
///
/// Field validation happens strictly before the optional metadata lookup, so
/// a bad instance never causes network traffic. The tag set is built in a
/// fixed order: configured base tags, the instance name, the resource name
/// when addressed by name, the member instance id when present, the resolved
/// region, and finally the check name.
pub async fn resolve(
    raw: &RawInstance,
    init: &InitConfig,
    check_name: &str,
    resource_label: &str,
    requires_database: bool,
    metadata: &dyn MetadataProvider,
) -> Result<InstanceConfig, ConfigError> {
    let resource = match (&raw.resource_name, &raw.resource_address, raw.resource_port) {
        (Some(name), _, _) => ResourceSpec::Named(name.clone()),
        (None, Some(host), Some(port)) => ResourceSpec::Address {
            host: host.clone(),
            port,
        },
        _ => {
            return Err(ConfigError::missing(format!(
                "{} (or an explicit address and port)",
                resource_label
            )))
        }
    };

    let database = if requires_database {
        Some(DatabaseConfig {
            db_name: required(&raw.db_name, "db_name")?,
            user_name: required(&raw.user_name, "user_name")?,
            user_password: required(&raw.user_password, "user_password")?,
        })
    } else {
        None
    };

    let credentials = match (&raw.aws_access_key_id, &raw.aws_secret_access_key) {
        (Some(id), Some(secret)) => Some(AwsCredentials {
            access_key_id: id.clone(),
            secret_access_key: secret.clone(),
        }),
        (Some(_), None) => return Err(ConfigError::missing("aws_secret_access_key")),
        (None, Some(_)) => return Err(ConfigError::missing("aws_access_key_id")),
        (None, None) => None,
    };

    // Validation is done; the metadata lookup is the only I/O allowed here.
    let region = match &raw.aws_region {
        Some(region) => region.clone(),
        None => region_from_zone(&metadata.availability_zone().await?)?,
    };

    let name = raw
        .name
        .clone()
        .unwrap_or_else(|| resource.to_string());

    let mut tags = TagSet::from_tags(raw.tags.iter().cloned());
    tags.push("name", &name);
    if let ResourceSpec::Named(resource_name) = &resource {
        tags.push(resource_label, resource_name);
    }
    if let Some(instance_id) = &raw.instance_id {
        tags.push("instance_id", instance_id);
    }
    tags.push("aws_region", &region);
    tags.push("check", check_name);

    let identity_tags = match &resource {
        ResourceSpec::Named(resource_name) => {
            let mut tags = TagSet::new();
            tags.push(resource_label, resource_name);
            tags
        }
        ResourceSpec::Address { host, port } => {
            let mut tags = TagSet::new();
            tags.push("address", host);
            tags.push("port", port);
            tags
        }
    };

    let interval = raw
        .min_collection_interval
        .or(init.min_collection_interval)
        .unwrap_or(DEFAULT_MIN_COLLECTION_INTERVAL);

    Ok(InstanceConfig {
        name,
        resource,
        instance_id: raw.instance_id.clone(),
        database,
        credentials,
        region,
        thresholds: raw.thresholds,
        min_collection_interval: Duration::from_secs(interval),
        connect_timeout: Duration::from_secs(
            init.connect_timeout.unwrap_or(DEFAULT_CONNECT_TIMEOUT),
        ),
        query: raw.query.unwrap_or(false),
        tags,
        identity_tags,
    })
}

fn required(field: &Option<String>, name: &str) -> Result<String, ConfigError> {
    field.clone().ok_or_else(|| ConfigError::missing(name))
}

/// An availability zone is its region plus a trailing zone letter.
fn region_from_zone(zone: &str) -> Result<String, ConfigError> {
    if zone.len() < 2 {
        return Err(ConfigError::Metadata(format!(
            "unusable availability zone {:?}",
            zone
        )));
    }
    Ok(zone[..zone.len() - 1].to_string())
}
