// Public modules
pub mod types;
pub mod error;
pub mod config;
pub mod locator;
pub mod classify;
pub mod checks;
pub mod sink;
pub mod runner;
pub mod aws;
pub mod db;

// Re-export commonly used items
pub use types::*;
pub use error::{CheckError, CollectionError, ConfigError, ResourceError};
pub use config::{load_config, parse_config_str, resolve, ConfigFile, Ec2Metadata, InitConfig, MetadataProvider, MockMetadata, RawInstance};
pub use locator::{locate, CloudDirectory};
pub use classify::{classify, Classification};
pub use checks::{ElbCheck, ElbHealthApi, MemberHealth, RedshiftCheck, SqlConnector, SqlRow, SqlSession, SqlValue};
pub use sink::{DogstatsdSink, MetricSink, RecordingSink};
pub use runner::{Check, CheckRunner};
