use async_trait::async_trait;
use tracing::debug;

use crate::error::ResourceError;
use crate::types::{Endpoint, InstanceConfig, ResourceSpec};

/// Cloud directory capability: given an instance addressed by name, return
/// the endpoints the directory knows for it.
#[async_trait]
pub trait CloudDirectory: Send + Sync {
    async fn lookup(&self, config: &InstanceConfig) -> Result<Vec<Endpoint>, ResourceError>;
}

/// Resolve the instance's endpoint.
///
/// An explicitly configured address passes through untouched and the
/// directory is never called. A named resource goes through the directory;
/// when the directory returns more than one match the first one wins and the
/// rest are ignored.
pub async fn locate(
    config: &InstanceConfig,
    directory: &dyn CloudDirectory,
) -> Result<Endpoint, ResourceError> {
    match &config.resource {
        ResourceSpec::Address { host, port } => Ok(Endpoint::new(host.clone(), Some(*port))),
        ResourceSpec::Named(name) => {
            let endpoints = directory.lookup(config).await?;
            if endpoints.len() > 1 {
                debug!(resource = %name, matches = endpoints.len(), "multiple directory matches, taking the first");
            }
            endpoints.into_iter().next().ok_or(ResourceError::NotFound)
        }
    }
}
