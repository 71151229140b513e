use async_trait::async_trait;
use tracing::warn;

use crate::error::CollectionError;
use crate::locator::CloudDirectory;
use crate::runner::Check;
use crate::types::{Collection, Endpoint, InstanceConfig, MetricSample};

pub const CHECK_NAME: &str = "aws_ec2_elb_check";

/// Health of one registered load balancer member.
#[derive(Debug, Clone)]
pub struct MemberHealth {
    pub instance_id: String,
    pub state: String,
    pub reason_code: Option<String>,
}

/// Instance-health capability of the load balancer API.
#[async_trait]
pub trait ElbHealthApi: Send + Sync {
    async fn instance_health(
        &self,
        config: &InstanceConfig,
    ) -> Result<Vec<MemberHealth>, CollectionError>;
}

/// Classic ELB member-health check: counts registered members per state and
/// classifies the InService count against the configured thresholds.
pub struct ElbCheck {
    directory: Box<dyn CloudDirectory>,
    api: Box<dyn ElbHealthApi>,
}

impl ElbCheck {
    pub fn new(directory: Box<dyn CloudDirectory>, api: Box<dyn ElbHealthApi>) -> Self {
        Self { directory, api }
    }
}

#[async_trait]
impl Check for ElbCheck {
    fn name(&self) -> &str {
        CHECK_NAME
    }

    fn service_check_name(&self) -> String {
        format!("{}.up_in_service", CHECK_NAME)
    }

    fn resource_label(&self) -> &'static str {
        "load_balancer_name"
    }

    fn directory(&self) -> &dyn CloudDirectory {
        self.directory.as_ref()
    }

    async fn collect(
        &self,
        _endpoint: &Endpoint,
        config: &InstanceConfig,
    ) -> Result<Collection, CollectionError> {
        let members = self.api.instance_health(config).await?;

        let mut in_service = 0u64;
        let mut out_of_service = 0u64;
        let mut unknown = 0u64;
        for member in &members {
            match member.state.as_str() {
                "InService" => in_service += 1,
                "OutOfService" => {
                    out_of_service += 1;
                    warn!(
                        instance_id = %member.instance_id,
                        state = %member.state,
                        reason = member.reason_code.as_deref().unwrap_or("-"),
                        "member out of service"
                    );
                }
                other => {
                    unknown += 1;
                    warn!(
                        instance_id = %member.instance_id,
                        state = other,
                        reason = member.reason_code.as_deref().unwrap_or("-"),
                        "member in unexpected state"
                    );
                }
            }
        }

        let samples = vec![
            MetricSample::new(format!("{}.in_service", CHECK_NAME), in_service as f64, config.tags.clone()),
            MetricSample::new(format!("{}.out_of_service", CHECK_NAME), out_of_service as f64, config.tags.clone()),
            MetricSample::new(format!("{}.unknown", CHECK_NAME), unknown as f64, config.tags.clone()),
        ];

        Ok(Collection {
            samples,
            observed: Some(in_service),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{resolve, InitConfig, MockMetadata, RawInstance};
    use crate::error::ResourceError;

    struct NullDirectory;

    #[async_trait]
    impl CloudDirectory for NullDirectory {
        async fn lookup(&self, _config: &InstanceConfig) -> Result<Vec<Endpoint>, ResourceError> {
            Ok(vec![Endpoint::new("lb.example.com", None)])
        }
    }

    struct ScriptedApi {
        members: Vec<MemberHealth>,
    }

    #[async_trait]
    impl ElbHealthApi for ScriptedApi {
        async fn instance_health(
            &self,
            _config: &InstanceConfig,
        ) -> Result<Vec<MemberHealth>, CollectionError> {
            Ok(self.members.clone())
        }
    }

    fn member(id: &str, state: &str) -> MemberHealth {
        MemberHealth {
            instance_id: id.to_string(),
            state: state.to_string(),
            reason_code: Some("N/A".to_string()),
        }
    }

    async fn elb_config() -> InstanceConfig {
        let raw = RawInstance {
            name: Some("frontend".to_string()),
            resource_name: Some("frontend-lb".to_string()),
            aws_region: Some("us-east-1".to_string()),
            ..RawInstance::default()
        };
        resolve(&raw, &InitConfig::default(), CHECK_NAME, "load_balancer_name", false, &MockMetadata::new())
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn counts_members_per_state() {
        let check = ElbCheck::new(
            Box::new(NullDirectory),
            Box::new(ScriptedApi {
                members: vec![
                    member("i-1", "InService"),
                    member("i-2", "InService"),
                    member("i-3", "OutOfService"),
                    member("i-4", "Draining"),
                ],
            }),
        );
        let config = elb_config().await;

        let collection = check
            .collect(&Endpoint::new("lb.example.com", None), &config)
            .await
            .unwrap();

        let values: Vec<(&str, f64)> = collection
            .samples
            .iter()
            .map(|s| (s.name.as_str(), s.value))
            .collect();
        assert_eq!(
            values,
            [
                ("aws_ec2_elb_check.in_service", 2.0),
                ("aws_ec2_elb_check.out_of_service", 1.0),
                ("aws_ec2_elb_check.unknown", 1.0),
            ]
        );
        assert_eq!(collection.observed, Some(2));
    }

    #[tokio::test]
    async fn samples_carry_region_and_name_tags() {
        let check = ElbCheck::new(
            Box::new(NullDirectory),
            Box::new(ScriptedApi {
                members: vec![member("i-1", "InService")],
            }),
        );
        let config = elb_config().await;

        let collection = check
            .collect(&Endpoint::new("lb.example.com", None), &config)
            .await
            .unwrap();

        for sample in &collection.samples {
            assert!(sample.tags.contains("aws_region:us-east-1"));
            assert!(sample.tags.contains("name:frontend"));
        }
    }

    #[tokio::test]
    async fn api_failures_propagate() {
        struct FailingApi;

        #[async_trait]
        impl ElbHealthApi for FailingApi {
            async fn instance_health(
                &self,
                _config: &InstanceConfig,
            ) -> Result<Vec<MemberHealth>, CollectionError> {
                Err(CollectionError::Query("throttled".to_string()))
            }
        }

        let check = ElbCheck::new(Box::new(NullDirectory), Box::new(FailingApi));
        let config = elb_config().await;

        let err = check
            .collect(&Endpoint::new("lb.example.com", None), &config)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("throttled"));
    }
}
