use std::net::UdpSocket;
use std::sync::Mutex;

use tracing::debug;

use crate::types::{HealthStatus, MetricSample, ServiceCheck, TagSet};

/// Metrics-submission capability. The transport buffers and flushes on its
/// own schedule; submission is best effort and never fails the check run.
pub trait MetricSink: Send + Sync {
    fn gauge(&self, name: &str, value: f64, tags: &TagSet);
    fn service_check(&self, name: &str, status: HealthStatus, tags: &TagSet, message: Option<&str>);
}

/// Sink speaking the dogstatsd datagram protocol over UDP.
pub struct DogstatsdSink {
    socket: UdpSocket,
}

impl DogstatsdSink {
    pub fn new(address: &str) -> std::io::Result<Self> {
        let socket = UdpSocket::bind("0.0.0.0:0")?;
        socket.connect(address)?;
        Ok(Self { socket })
    }

    fn send(&self, datagram: &str) {
        if let Err(e) = self.socket.send(datagram.as_bytes()) {
            debug!(error = %e, "dropping datagram");
        }
    }
}

impl MetricSink for DogstatsdSink {
    fn gauge(&self, name: &str, value: f64, tags: &TagSet) {
        self.send(&format_gauge(name, value, tags));
    }

    fn service_check(&self, name: &str, status: HealthStatus, tags: &TagSet, message: Option<&str>) {
        self.send(&format_service_check(name, status, tags, message));
    }
}

pub fn format_gauge(name: &str, value: f64, tags: &TagSet) -> String {
    if tags.is_empty() {
        format!("{}:{}|g", name, value)
    } else {
        format!("{}:{}|g|#{}", name, value, tags.join())
    }
}

pub fn format_service_check(
    name: &str,
    status: HealthStatus,
    tags: &TagSet,
    message: Option<&str>,
) -> String {
    let mut datagram = format!("_sc|{}|{}", name, status.code());
    if !tags.is_empty() {
        datagram.push_str(&format!("|#{}", tags.join()));
    }
    if let Some(message) = message {
        // The message field must stay last in the datagram.
        datagram.push_str(&format!("|m:{}", message));
    }
    datagram
}

/// In-memory sink for tests: records every emission for later assertions.
#[derive(Debug, Default)]
pub struct RecordingSink {
    gauges: Mutex<Vec<MetricSample>>,
    service_checks: Mutex<Vec<ServiceCheck>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn gauges(&self) -> Vec<MetricSample> {
        self.gauges.lock().expect("sink poisoned").clone()
    }

    pub fn service_checks(&self) -> Vec<ServiceCheck> {
        self.service_checks.lock().expect("sink poisoned").clone()
    }
}

impl MetricSink for RecordingSink {
    fn gauge(&self, name: &str, value: f64, tags: &TagSet) {
        self.gauges
            .lock()
            .expect("sink poisoned")
            .push(MetricSample::new(name, value, tags.clone()));
    }

    fn service_check(&self, name: &str, status: HealthStatus, tags: &TagSet, message: Option<&str>) {
        self.service_checks.lock().expect("sink poisoned").push(ServiceCheck {
            name: name.to_string(),
            status,
            tags: tags.clone(),
            message: message.map(str::to_string),
        });
    }
}
