//! Postgres-protocol session against a Redshift endpoint.

use async_trait::async_trait;
use sqlx::postgres::{PgConnectOptions, PgConnection, PgRow};
use sqlx::{Connection, Row};

use crate::checks::redshift::{SqlConnector, SqlRow, SqlSession, SqlValue};
use crate::error::CollectionError;
use crate::types::{Endpoint, InstanceConfig};

const DEFAULT_REDSHIFT_PORT: u16 = 5439;

/// Opens one connection per collection run, bounded by the configured
/// connect timeout.
pub struct PgConnector;

#[async_trait]
impl SqlConnector for PgConnector {
    async fn connect(
        &self,
        endpoint: &Endpoint,
        config: &InstanceConfig,
    ) -> Result<Box<dyn SqlSession>, CollectionError> {
        let database = config
            .database
            .as_ref()
            .ok_or(CollectionError::MissingDatabase)?;
        let options = PgConnectOptions::new()
            .host(&endpoint.host)
            .port(endpoint.port.unwrap_or(DEFAULT_REDSHIFT_PORT))
            .database(&database.db_name)
            .username(&database.user_name)
            .password(&database.user_password);

        let connection = tokio::time::timeout(
            config.connect_timeout,
            PgConnection::connect_with(&options),
        )
        .await
        .map_err(|_| CollectionError::ConnectTimeout(config.connect_timeout))?
        .map_err(|e| CollectionError::Connect(e.to_string()))?;

        Ok(Box::new(PgSession { connection }))
    }
}

struct PgSession {
    connection: PgConnection,
}

#[async_trait]
impl SqlSession for PgSession {
    async fn query(&mut self, sql: &str) -> Result<Vec<SqlRow>, CollectionError> {
        let rows = sqlx::query(sql)
            .fetch_all(&mut self.connection)
            .await
            .map_err(|e| CollectionError::Query(e.to_string()))?;
        Ok(rows.iter().map(decode_row).collect())
    }

    async fn close(self: Box<Self>) -> Result<(), CollectionError> {
        self.connection
            .close()
            .await
            .map_err(|e| CollectionError::Connect(e.to_string()))
    }
}

fn decode_row(row: &PgRow) -> SqlRow {
    SqlRow(
        (0..row.len())
            .map(|index| {
                row.try_get::<i64, _>(index)
                    .map(SqlValue::Int)
                    .or_else(|_| row.try_get::<i32, _>(index).map(|v| SqlValue::Int(v.into())))
                    .or_else(|_| row.try_get::<f64, _>(index).map(SqlValue::Float))
                    .or_else(|_| row.try_get::<String, _>(index).map(SqlValue::Text))
                    .unwrap_or(SqlValue::Null)
            })
            .collect(),
    )
}
