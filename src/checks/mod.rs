//! The shipped checks: one battery per AWS resource type.

pub mod elb;
pub mod redshift;

pub use elb::{ElbCheck, ElbHealthApi, MemberHealth};
pub use redshift::{RedshiftCheck, SqlConnector, SqlRow, SqlSession, SqlValue};
