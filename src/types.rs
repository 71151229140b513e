use std::fmt;
use std::time::Duration;

use serde::Deserialize;

/// Ordered `key:value` tag list attached to samples and service-checks.
///
/// Per-row augmentation goes through [`TagSet::with_tag`], which returns a new
/// set instead of mutating the shared base, so one row's discriminator can
/// never leak into the next row's series.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TagSet(Vec<String>);

impl TagSet {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    pub fn from_tags<I, S>(tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(tags.into_iter().map(Into::into).collect())
    }

    /// Append a `key:value` tag in place. Used only while the instance's base
    /// set is being built.
    pub fn push(&mut self, key: &str, value: impl fmt::Display) {
        self.0.push(format!("{}:{}", key, value));
    }

    /// Return a new set with `key:value` appended, leaving `self` untouched.
    pub fn with_tag(&self, key: &str, value: impl fmt::Display) -> Self {
        let mut tags = self.0.clone();
        tags.push(format!("{}:{}", key, value));
        Self(tags)
    }

    pub fn contains(&self, tag: &str) -> bool {
        self.0.iter().any(|t| t == tag)
    }

    pub fn as_slice(&self) -> &[String] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Comma-joined form used by the dogstatsd wire format.
    pub fn join(&self) -> String {
        self.0.join(",")
    }
}

/// One gauge emission: name, value, and the tags that identify the series.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricSample {
    pub name: String,
    pub value: f64,
    pub tags: TagSet,
}

impl MetricSample {
    pub fn new(name: impl Into<String>, value: f64, tags: TagSet) -> Self {
        Self {
            name: name.into(),
            value,
            tags,
        }
    }
}

/// Discrete health verdict reported through service-checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthStatus {
    Ok,
    Warning,
    Critical,
    Unknown,
}

impl HealthStatus {
    /// Numeric code used on the dogstatsd wire.
    pub fn code(self) -> u8 {
        match self {
            HealthStatus::Ok => 0,
            HealthStatus::Warning => 1,
            HealthStatus::Critical => 2,
            HealthStatus::Unknown => 3,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            HealthStatus::Ok => "OK",
            HealthStatus::Warning => "WARNING",
            HealthStatus::Critical => "CRITICAL",
            HealthStatus::Unknown => "UNKNOWN",
        }
    }
}

impl fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A service-check report as handed to the sink.
#[derive(Debug, Clone, PartialEq)]
pub struct ServiceCheck {
    pub name: String,
    pub status: HealthStatus,
    pub tags: TagSet,
    pub message: Option<String>,
}

/// Resolved network address of a target resource. Directory lookups that only
/// confirm existence (a load balancer's DNS name) leave the port unset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub host: String,
    pub port: Option<u16>,
}

impl Endpoint {
    pub fn new(host: impl Into<String>, port: Option<u16>) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.port {
            Some(port) => write!(f, "{}:{}", self.host, port),
            None => f.write_str(&self.host),
        }
    }
}

/// How the target resource is addressed: by name through the cloud directory,
/// or directly by host and port.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResourceSpec {
    Named(String),
    Address { host: String, port: u16 },
}

impl fmt::Display for ResourceSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResourceSpec::Named(name) => f.write_str(name),
            ResourceSpec::Address { host, port } => write!(f, "{}:{}", host, port),
        }
    }
}

/// Warning/critical bounds for the member-count classification.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct Thresholds {
    pub warning: f64,
    pub critical: f64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatabaseConfig {
    pub db_name: String,
    pub user_name: String,
    pub user_password: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AwsCredentials {
    pub access_key_id: String,
    pub secret_access_key: String,
}

/// Validated per-instance configuration. Built once by the config resolver,
/// never mutated afterwards.
#[derive(Debug, Clone)]
pub struct InstanceConfig {
    pub name: String,
    pub resource: ResourceSpec,
    pub instance_id: Option<String>,
    pub database: Option<DatabaseConfig>,
    pub credentials: Option<AwsCredentials>,
    pub region: String,
    pub thresholds: Option<Thresholds>,
    pub min_collection_interval: Duration,
    pub connect_timeout: Duration,
    pub query: bool,
    /// Full tag set attached to every collected sample.
    pub tags: TagSet,
    /// Reduced tag set used on service-checks.
    pub identity_tags: TagSet,
}

/// What one check run against one instance produced.
#[derive(Debug, Clone, Default)]
pub struct Collection {
    pub samples: Vec<MetricSample>,
    /// Member count fed to the classifier. `None` means the check has no
    /// member-count semantics and a plain OK service-check is emitted instead.
    pub observed: Option<u64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn with_tag_does_not_mutate_base() {
        let base = TagSet::from_tags(["env:prod"]);
        let augmented = base.with_tag("table", "events");

        assert_eq!(base.as_slice(), ["env:prod"]);
        assert_eq!(augmented.as_slice(), ["env:prod", "table:events"]);
    }

    #[test]
    fn sibling_augmentations_stay_independent() {
        let base = TagSet::from_tags(["env:prod"]);
        let first = base.with_tag("node", 0);
        let second = base.with_tag("node", 1);

        assert_eq!(first.as_slice(), ["env:prod", "node:0"]);
        assert_eq!(second.as_slice(), ["env:prod", "node:1"]);
    }

    #[test]
    fn status_codes_match_wire_values() {
        assert_eq!(HealthStatus::Ok.code(), 0);
        assert_eq!(HealthStatus::Warning.code(), 1);
        assert_eq!(HealthStatus::Critical.code(), 2);
        assert_eq!(HealthStatus::Unknown.code(), 3);
    }

    #[test]
    fn endpoint_display_with_and_without_port() {
        assert_eq!(Endpoint::new("db.example.com", Some(5439)).to_string(), "db.example.com:5439");
        assert_eq!(Endpoint::new("lb.example.com", None).to_string(), "lb.example.com");
    }
}
