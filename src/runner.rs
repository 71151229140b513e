use std::time::Instant;

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::classify::{classify, Classification};
use crate::config::{resolve, InitConfig, MetadataProvider, RawInstance};
use crate::error::{CheckError, CollectionError};
use crate::locator::{locate, CloudDirectory};
use crate::sink::MetricSink;
use crate::types::{Collection, Endpoint, HealthStatus, InstanceConfig};

/// One check: a named battery plus the capabilities it polls through.
#[async_trait]
pub trait Check: Send + Sync {
    fn name(&self) -> &str;

    fn service_check_name(&self) -> String {
        format!("{}.up", self.name())
    }

    /// Tag key for the named resource, e.g. `load_balancer_name`.
    fn resource_label(&self) -> &'static str;

    fn requires_database(&self) -> bool {
        false
    }

    fn directory(&self) -> &dyn CloudDirectory;

    async fn collect(
        &self,
        endpoint: &Endpoint,
        config: &InstanceConfig,
    ) -> Result<Collection, CollectionError>;
}

/// Drives configured instances through resolve → locate → collect → classify
/// and forwards the results to the sink. Instances are processed one at a
/// time; a failure is caught at the instance boundary and never stops the
/// remaining instances.
pub struct CheckRunner<'a> {
    sink: &'a dyn MetricSink,
    init: &'a InitConfig,
    metadata: &'a dyn MetadataProvider,
}

impl<'a> CheckRunner<'a> {
    pub fn new(
        sink: &'a dyn MetricSink,
        init: &'a InitConfig,
        metadata: &'a dyn MetadataProvider,
    ) -> Self {
        Self { sink, init, metadata }
    }

    pub async fn run_all(&self, check: &dyn Check, instances: &[RawInstance]) {
        for raw in instances {
            if let Err(err) = self.run_instance(check, raw).await {
                warn!(check = check.name(), error = %err, "check instance failed");
                if let Some(tags) = raw.identity_tags(check.resource_label()) {
                    self.sink.service_check(
                        &check.service_check_name(),
                        HealthStatus::Warning,
                        &tags,
                        Some(&format!("Exception - {}", err)),
                    );
                }
            }
        }
    }

    async fn run_instance(&self, check: &dyn Check, raw: &RawInstance) -> Result<(), CheckError> {
        let started = Instant::now();

        let config = resolve(
            raw,
            self.init,
            check.name(),
            check.resource_label(),
            check.requires_database(),
            self.metadata,
        )
        .await?;
        debug!(check = check.name(), instance = %config.name, "running check instance");

        let endpoint = locate(&config, check.directory()).await?;
        let collection = check.collect(&endpoint, &config).await?;

        for sample in &collection.samples {
            self.sink.gauge(&sample.name, sample.value, &sample.tags);
        }

        match collection.observed {
            None => {
                self.sink.service_check(
                    &check.service_check_name(),
                    HealthStatus::Ok,
                    &config.identity_tags,
                    None,
                );
            }
            Some(observed) => match classify(observed, config.thresholds.as_ref()) {
                Classification::Unconfigured => {
                    warn!(
                        check = check.name(),
                        instance = %config.name,
                        "thresholds configuration is empty"
                    );
                }
                Classification::Status { status, message } => {
                    self.sink.service_check(
                        &check.service_check_name(),
                        status,
                        &config.identity_tags,
                        Some(&message),
                    );
                }
            },
        }

        self.sink.gauge(
            &format!("{}.response_time", check.name()),
            started.elapsed().as_secs_f64(),
            &config.tags,
        );

        Ok(())
    }
}
