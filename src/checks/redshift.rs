use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::debug;

use crate::error::CollectionError;
use crate::locator::CloudDirectory;
use crate::runner::Check;
use crate::types::{Collection, Endpoint, InstanceConfig, MetricSample};

pub const CHECK_NAME: &str = "aws_redshift_status";

const QUERY_TABLE_COUNT: &str = "\
select count(DISTINCT tablename)
  from pg_table_def where schemaname = 'public'";

const QUERY_NODE: &str = "\
select node, sum(rows)
  from stv_slices m
  join stv_tbl_perm s on s.slice = m.slice
  group by node";

const QUERY_TABLE_RECORD: &str = "\
select name, sum(rows) as rows
  from stv_tbl_perm
  group by name";

const QUERY_TABLE_STATUS: &str = "\
select \"table\", size, tbl_rows, skew_rows
  from svv_table_info";

const QUERY_LOG_KINDS: [&str; 5] = ["select", "insert", "update", "delete", "analyze"];

fn log_type_query(start: &str, end: &str, kind: &str) -> String {
    format!(
        "select count(*)\n  from svl_qlog\n  where starttime >= '{}' and endtime <= '{}' and substring like '{} %'",
        start, end, kind
    )
}

/// UTC window `[now - interval, now]` for the query-log scans, formatted with
/// microsecond precision the way the query log stores timestamps.
pub fn query_window(now: DateTime<Utc>, interval: std::time::Duration) -> (String, String) {
    let start = now - chrono::Duration::seconds(interval.as_secs() as i64);
    const FORMAT: &str = "%Y-%m-%d %H:%M:%S%.6f";
    (start.format(FORMAT).to_string(), now.format(FORMAT).to_string())
}

/// One decoded column value. The battery only ever needs labels and numbers.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    Int(i64),
    Float(f64),
    Text(String),
    Null,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SqlRow(pub Vec<SqlValue>);

impl SqlRow {
    /// Column rendered as a tag value.
    pub fn label(&self, index: usize) -> Option<String> {
        match self.0.get(index)? {
            SqlValue::Int(v) => Some(v.to_string()),
            SqlValue::Float(v) => Some(v.to_string()),
            SqlValue::Text(v) => Some(v.clone()),
            SqlValue::Null => None,
        }
    }

    /// Column rendered as a gauge value.
    pub fn number(&self, index: usize) -> Option<f64> {
        match self.0.get(index)? {
            SqlValue::Int(v) => Some(*v as f64),
            SqlValue::Float(v) => Some(*v),
            SqlValue::Text(_) | SqlValue::Null => None,
        }
    }
}

/// A live, short-lived session against the cluster.
#[async_trait]
pub trait SqlSession: Send {
    async fn query(&mut self, sql: &str) -> Result<Vec<SqlRow>, CollectionError>;
    async fn close(self: Box<Self>) -> Result<(), CollectionError>;
}

/// Opens sessions against a resolved endpoint, honoring the configured
/// connect timeout.
#[async_trait]
pub trait SqlConnector: Send + Sync {
    async fn connect(
        &self,
        endpoint: &Endpoint,
        config: &InstanceConfig,
    ) -> Result<Box<dyn SqlSession>, CollectionError>;
}

/// Redshift cluster statistics: table counts, per-node and per-table row
/// totals, table skew, and (when the `query` flag is set) query-log activity
/// over the collection window.
pub struct RedshiftCheck {
    directory: Box<dyn CloudDirectory>,
    connector: Box<dyn SqlConnector>,
}

impl RedshiftCheck {
    pub fn new(directory: Box<dyn CloudDirectory>, connector: Box<dyn SqlConnector>) -> Self {
        Self { directory, connector }
    }

    async fn run_battery(
        session: &mut dyn SqlSession,
        config: &InstanceConfig,
        samples: &mut Vec<MetricSample>,
    ) -> Result<(), CollectionError> {
        let rows = session.query(QUERY_TABLE_COUNT).await?;
        let table_count = rows
            .first()
            .and_then(|row| row.number(0))
            .ok_or(CollectionError::UnexpectedRow("table count"))?;
        samples.push(MetricSample::new(
            format!("{}.table_count", CHECK_NAME),
            table_count,
            config.tags.clone(),
        ));

        for row in session.query(QUERY_NODE).await? {
            let node = row.label(0).ok_or(CollectionError::UnexpectedRow("node slices"))?;
            let rows_total = row.number(1).ok_or(CollectionError::UnexpectedRow("node slices"))?;
            samples.push(MetricSample::new(
                format!("{}.node_slice", CHECK_NAME),
                rows_total,
                config.tags.with_tag("node", node),
            ));
        }

        for row in session.query(QUERY_TABLE_RECORD).await? {
            let table = row.label(0).ok_or(CollectionError::UnexpectedRow("table records"))?;
            let rows_total = row.number(1).ok_or(CollectionError::UnexpectedRow("table records"))?;
            samples.push(MetricSample::new(
                format!("{}.table_records", CHECK_NAME),
                rows_total,
                config.tags.with_tag("table", table),
            ));
        }

        for row in session.query(QUERY_TABLE_STATUS).await? {
            let table = row.label(0).ok_or(CollectionError::UnexpectedRow("table status"))?;
            let tags = config.tags.with_tag("table", table);
            for (column, suffix) in [(1, "size"), (2, "tbl_rows"), (3, "skew_rows")] {
                let value = row
                    .number(column)
                    .ok_or(CollectionError::UnexpectedRow("table status"))?;
                samples.push(MetricSample::new(
                    format!("{}.table_status.{}", CHECK_NAME, suffix),
                    value,
                    tags.clone(),
                ));
            }
        }

        if config.query {
            let (start, end) = query_window(Utc::now(), config.min_collection_interval);
            for kind in QUERY_LOG_KINDS {
                let rows = session.query(&log_type_query(&start, &end, kind)).await?;
                let count = rows
                    .first()
                    .and_then(|row| row.number(0))
                    .ok_or(CollectionError::UnexpectedRow("query log"))?;
                samples.push(MetricSample::new(
                    format!("{}.query.{}", CHECK_NAME, kind),
                    count,
                    config.tags.clone(),
                ));
            }
        }

        Ok(())
    }
}

#[async_trait]
impl Check for RedshiftCheck {
    fn name(&self) -> &str {
        CHECK_NAME
    }

    fn service_check_name(&self) -> String {
        format!("{}.up", CHECK_NAME)
    }

    fn resource_label(&self) -> &'static str {
        "cluster_name"
    }

    fn requires_database(&self) -> bool {
        true
    }

    fn directory(&self) -> &dyn CloudDirectory {
        self.directory.as_ref()
    }

    async fn collect(
        &self,
        endpoint: &Endpoint,
        config: &InstanceConfig,
    ) -> Result<Collection, CollectionError> {
        let mut session = self.connector.connect(endpoint, config).await?;

        let mut samples = Vec::new();
        let outcome = Self::run_battery(session.as_mut(), config, &mut samples).await;

        // The session is released on success and failure alike.
        if let Err(e) = session.close().await {
            debug!(error = %e, "closing session failed");
        }
        outcome?;

        Ok(Collection {
            samples,
            observed: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{resolve, InitConfig, MockMetadata, RawInstance};
    use crate::error::ResourceError;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    struct NullDirectory;

    #[async_trait]
    impl CloudDirectory for NullDirectory {
        async fn lookup(&self, _config: &InstanceConfig) -> Result<Vec<Endpoint>, ResourceError> {
            Ok(vec![Endpoint::new("db.example.com", Some(5439))])
        }
    }

    #[derive(Default)]
    struct SessionLog {
        executed: Mutex<Vec<String>>,
        closes: AtomicUsize,
    }

    impl SessionLog {
        fn executed(&self) -> Vec<String> {
            self.executed.lock().unwrap().clone()
        }

        fn closes(&self) -> usize {
            self.closes.load(Ordering::SeqCst)
        }
    }

    struct ScriptedSession {
        results: VecDeque<Result<Vec<SqlRow>, CollectionError>>,
        log: Arc<SessionLog>,
    }

    #[async_trait]
    impl SqlSession for ScriptedSession {
        async fn query(&mut self, sql: &str) -> Result<Vec<SqlRow>, CollectionError> {
            self.log.executed.lock().unwrap().push(sql.to_string());
            self.results
                .pop_front()
                .unwrap_or_else(|| Ok(Vec::new()))
        }

        async fn close(self: Box<Self>) -> Result<(), CollectionError> {
            self.log.closes.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    struct ScriptedConnector {
        results: Mutex<VecDeque<Result<Vec<SqlRow>, CollectionError>>>,
        log: Arc<SessionLog>,
    }

    impl ScriptedConnector {
        fn new(results: Vec<Result<Vec<SqlRow>, CollectionError>>) -> (Self, Arc<SessionLog>) {
            let log = Arc::new(SessionLog::default());
            (
                Self {
                    results: Mutex::new(results.into()),
                    log: Arc::clone(&log),
                },
                log,
            )
        }
    }

    #[async_trait]
    impl SqlConnector for ScriptedConnector {
        async fn connect(
            &self,
            _endpoint: &Endpoint,
            _config: &InstanceConfig,
        ) -> Result<Box<dyn SqlSession>, CollectionError> {
            Ok(Box::new(ScriptedSession {
                results: std::mem::take(&mut *self.results.lock().unwrap()),
                log: Arc::clone(&self.log),
            }))
        }
    }

    fn int_row(values: &[i64]) -> SqlRow {
        SqlRow(values.iter().map(|v| SqlValue::Int(*v)).collect())
    }

    fn named_row(name: &str, values: &[i64]) -> SqlRow {
        let mut cols = vec![SqlValue::Text(name.to_string())];
        cols.extend(values.iter().map(|v| SqlValue::Int(*v)));
        SqlRow(cols)
    }

    async fn redshift_config(query: bool) -> InstanceConfig {
        let raw = RawInstance {
            name: Some("analytics".to_string()),
            resource_name: Some("analytics-cluster".to_string()),
            db_name: Some("metrics".to_string()),
            user_name: Some("datadog".to_string()),
            user_password: Some("secret".to_string()),
            aws_region: Some("us-east-1".to_string()),
            query: Some(query),
            ..RawInstance::default()
        };
        resolve(&raw, &InitConfig::default(), CHECK_NAME, "cluster_name", true, &MockMetadata::new())
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn battery_maps_rows_to_tagged_samples() {
        let (connector, log) = ScriptedConnector::new(vec![
            Ok(vec![int_row(&[12])]),
            Ok(vec![int_row(&[0, 100]), int_row(&[1, 90])]),
            Ok(vec![named_row("events", &[100]), named_row("users", &[90])]),
            Ok(vec![named_row("events", &[64, 100, 3])]),
        ]);
        let check = RedshiftCheck::new(Box::new(NullDirectory), Box::new(connector));
        let config = redshift_config(false).await;

        let collection = check
            .collect(&Endpoint::new("db.example.com", Some(5439)), &config)
            .await
            .unwrap();

        assert!(collection.observed.is_none());
        assert_eq!(log.closes(), 1);

        let names: Vec<&str> = collection.samples.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(
            names,
            [
                "aws_redshift_status.table_count",
                "aws_redshift_status.node_slice",
                "aws_redshift_status.node_slice",
                "aws_redshift_status.table_records",
                "aws_redshift_status.table_records",
                "aws_redshift_status.table_status.size",
                "aws_redshift_status.table_status.tbl_rows",
                "aws_redshift_status.table_status.skew_rows",
            ]
        );

        // Per-row tags keep same-named series apart.
        let node_tags: Vec<_> = collection
            .samples
            .iter()
            .filter(|s| s.name == "aws_redshift_status.node_slice")
            .map(|s| s.tags.clone())
            .collect();
        assert!(node_tags[0].contains("node:0"));
        assert!(node_tags[1].contains("node:1"));
        assert_ne!(node_tags[0], node_tags[1]);

        for sample in &collection.samples {
            assert!(sample.tags.contains("aws_region:us-east-1"));
            assert!(sample.tags.contains("name:analytics"));
        }
    }

    #[tokio::test]
    async fn query_flag_gates_the_log_scans() {
        let (connector, log) = ScriptedConnector::new(vec![
            Ok(vec![int_row(&[12])]),
            Ok(vec![]),
            Ok(vec![]),
            Ok(vec![]),
            Ok(vec![int_row(&[7])]),
            Ok(vec![int_row(&[3])]),
            Ok(vec![int_row(&[0])]),
            Ok(vec![int_row(&[1])]),
            Ok(vec![int_row(&[0])]),
        ]);
        let check = RedshiftCheck::new(Box::new(NullDirectory), Box::new(connector));
        let config = redshift_config(true).await;

        let collection = check
            .collect(&Endpoint::new("db.example.com", Some(5439)), &config)
            .await
            .unwrap();

        let query_samples: Vec<&str> = collection
            .samples
            .iter()
            .filter(|s| s.name.starts_with("aws_redshift_status.query."))
            .map(|s| s.name.as_str())
            .collect();
        assert_eq!(
            query_samples,
            [
                "aws_redshift_status.query.select",
                "aws_redshift_status.query.insert",
                "aws_redshift_status.query.update",
                "aws_redshift_status.query.delete",
                "aws_redshift_status.query.analyze",
            ]
        );

        let executed = log.executed();
        assert_eq!(executed.len(), 9);
        assert!(executed[4].contains("substring like 'select %'"));
        assert!(executed[8].contains("substring like 'analyze %'"));
    }

    #[tokio::test]
    async fn without_query_flag_no_log_scan_runs() {
        let (connector, log) = ScriptedConnector::new(vec![Ok(vec![int_row(&[12])])]);
        let check = RedshiftCheck::new(Box::new(NullDirectory), Box::new(connector));
        let config = redshift_config(false).await;

        check
            .collect(&Endpoint::new("db.example.com", Some(5439)), &config)
            .await
            .unwrap();

        assert!(log.executed().iter().all(|sql| !sql.contains("svl_qlog")));
    }

    #[tokio::test]
    async fn failed_query_aborts_battery_but_still_closes_session() {
        let (connector, log) = ScriptedConnector::new(vec![
            Ok(vec![int_row(&[12])]),
            Err(CollectionError::Query("relation does not exist".to_string())),
        ]);
        let check = RedshiftCheck::new(Box::new(NullDirectory), Box::new(connector));
        let config = redshift_config(false).await;

        let err = check
            .collect(&Endpoint::new("db.example.com", Some(5439)), &config)
            .await
            .unwrap_err();

        assert!(err.to_string().contains("relation does not exist"));
        assert_eq!(log.closes(), 1);
        // The battery stopped at the failing query.
        assert_eq!(log.executed().len(), 2);
    }

    #[tokio::test]
    async fn unexpected_row_shape_is_an_error() {
        let (connector, log) = ScriptedConnector::new(vec![Ok(vec![SqlRow(vec![SqlValue::Null])])]);
        let check = RedshiftCheck::new(Box::new(NullDirectory), Box::new(connector));
        let config = redshift_config(false).await;

        let err = check
            .collect(&Endpoint::new("db.example.com", Some(5439)), &config)
            .await
            .unwrap_err();

        assert!(matches!(err, CollectionError::UnexpectedRow("table count")));
        assert_eq!(log.closes(), 1);
    }

    #[test]
    fn query_window_spans_the_collection_interval() {
        let now = DateTime::parse_from_rfc3339("2016-04-01T12:00:30.500000Z")
            .unwrap()
            .with_timezone(&Utc);

        let (start, end) = query_window(now, std::time::Duration::from_secs(300));

        assert_eq!(start, "2016-04-01 11:55:30.500000");
        assert_eq!(end, "2016-04-01 12:00:30.500000");
    }

    #[test]
    fn log_type_query_embeds_window_and_kind() {
        let sql = log_type_query("2016-04-01 11:55:30.500000", "2016-04-01 12:00:30.500000", "select");
        assert!(sql.contains("starttime >= '2016-04-01 11:55:30.500000'"));
        assert!(sql.contains("endtime <= '2016-04-01 12:00:30.500000'"));
        assert!(sql.contains("like 'select %'"));
    }
}
