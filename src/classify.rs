use crate::types::{HealthStatus, Thresholds};

/// Outcome of reducing an observed member count against the configured
/// thresholds.
#[derive(Debug, Clone, PartialEq)]
pub enum Classification {
    Status {
        status: HealthStatus,
        message: String,
    },
    /// Thresholds are not configured; the caller logs a warning and skips
    /// the derived service-check.
    Unconfigured,
}

/// Classify an observed member count.
///
/// A count of zero means the monitored member was not observed at all and is
/// CRITICAL no matter what the thresholds say. Otherwise the count is held
/// against two floors in order: below `warning` reports WARNING, and below
/// `critical` reports CRITICAL. The critical bound acts as a second, stricter
/// floor underneath the warning bound, so a count below both reports
/// CRITICAL.
pub fn classify(observed: u64, thresholds: Option<&Thresholds>) -> Classification {
    if observed == 0 {
        return Classification::Status {
            status: HealthStatus::Critical,
            message: message(HealthStatus::Critical, observed, None),
        };
    }

    let Some(thresholds) = thresholds else {
        return Classification::Unconfigured;
    };

    let count = observed as f64;
    let (status, bound) = if count < thresholds.warning {
        (HealthStatus::Warning, Some(thresholds.warning))
    } else if count < thresholds.critical {
        (HealthStatus::Critical, Some(thresholds.critical))
    } else {
        (HealthStatus::Ok, None)
    };

    Classification::Status {
        status,
        message: message(status, observed, bound),
    }
}

fn message(status: HealthStatus, observed: u64, bound: Option<f64>) -> String {
    let bound = match bound {
        Some(bound) => format!("{}", bound),
        None => "-".to_string(),
    };
    format!(
        "instance status 'InService' is {} - {}/{}",
        status.as_str(),
        observed,
        bound
    )
}
