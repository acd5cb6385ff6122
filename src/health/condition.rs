//! Health conditions reported on monitored resources.
//!
//! # Responsibilities
//! - Turn a loop's `HealthStatus` into a status condition
//! - Hand conditions to whatever persists them
//!
//! # Design Decisions
//! - Reporting is a trait so the daemon can log while an operator patches status
//! - Conditions carry their own transition time; callers only report on transitions

use std::fmt;
use std::future::Future;
use std::time::SystemTime;

use thiserror::Error;

use crate::health::checker::HealthStatus;

pub const REASON_SUCCEEDED: &str = "HealthCheckSucceeded";
pub const REASON_FAILED: &str = "HealthCheckFailed";
pub const REASON_PENDING: &str = "HealthCheckPending";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConditionType {
    DatabaseHealthy,
}

impl fmt::Display for ConditionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConditionType::DatabaseHealthy => f.write_str("DatabaseHealthy"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConditionStatus {
    True,
    False,
    Unknown,
}

impl fmt::Display for ConditionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ConditionStatus::True => "True",
            ConditionStatus::False => "False",
            ConditionStatus::Unknown => "Unknown",
        };
        f.write_str(s)
    }
}

/// A Kubernetes-style status condition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HealthCondition {
    pub kind: ConditionType,
    pub status: ConditionStatus,
    pub reason: String,
    pub message: String,
    pub last_transition_time: SystemTime,
}

impl HealthCondition {
    /// Condition for a resource whose loop has not finished a probe yet.
    pub fn pending() -> Self {
        Self {
            kind: ConditionType::DatabaseHealthy,
            status: ConditionStatus::Unknown,
            reason: REASON_PENDING.to_string(),
            message: "Waiting for the first health check".to_string(),
            last_transition_time: SystemTime::now(),
        }
    }

    pub fn from_status(status: &HealthStatus) -> Self {
        let (condition_status, reason, message) = if status.has_failed {
            let kind = status.last_failure.map(|k| k.as_str()).unwrap_or("Unknown");
            (
                ConditionStatus::False,
                REASON_FAILED,
                format!(
                    "{} consecutive {} failures (threshold {})",
                    status.total_failure, kind, status.threshold
                ),
            )
        } else {
            (
                ConditionStatus::True,
                REASON_SUCCEEDED,
                "Health check succeeded".to_string(),
            )
        };

        Self {
            kind: ConditionType::DatabaseHealthy,
            status: condition_status,
            reason: reason.to_string(),
            message,
            last_transition_time: SystemTime::now(),
        }
    }
}

/// Failure to persist a condition.
#[derive(Debug, Error)]
#[error("failed to report condition for {key}: {message}")]
pub struct ReportError {
    pub key: String,
    pub message: String,
}

/// Persists health conditions for monitored resources.
pub trait ConditionReporter: Send + Sync + 'static {
    fn report(
        &self,
        key: &str,
        condition: &HealthCondition,
    ) -> impl Future<Output = Result<(), ReportError>> + Send;
}

/// Reporter that only emits structured log events.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogReporter;

impl ConditionReporter for LogReporter {
    async fn report(&self, key: &str, condition: &HealthCondition) -> Result<(), ReportError> {
        match condition.status {
            ConditionStatus::True => tracing::info!(
                key = %key,
                condition = %condition.kind,
                status = %condition.status,
                reason = %condition.reason,
                "{}", condition.message
            ),
            _ => tracing::warn!(
                key = %key,
                condition = %condition.kind,
                status = %condition.status,
                reason = %condition.reason,
                "{}", condition.message
            ),
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::health::card::FailureKind;

    fn status(has_failed: bool) -> HealthStatus {
        HealthStatus {
            last_failure: has_failed.then_some(FailureKind::PingFailure),
            total_failure: if has_failed { 3 } else { 0 },
            threshold: 3,
            has_failed,
            client_count: 0,
            probes: 7,
        }
    }

    #[test]
    fn test_healthy_condition() {
        let condition = HealthCondition::from_status(&status(false));
        assert_eq!(condition.kind, ConditionType::DatabaseHealthy);
        assert_eq!(condition.status, ConditionStatus::True);
        assert_eq!(condition.reason, REASON_SUCCEEDED);
    }

    #[test]
    fn test_failed_condition_names_kind_and_streak() {
        let condition = HealthCondition::from_status(&status(true));
        assert_eq!(condition.status, ConditionStatus::False);
        assert_eq!(condition.reason, REASON_FAILED);
        assert_eq!(
            condition.message,
            "3 consecutive PingFailure failures (threshold 3)"
        );
    }

    #[test]
    fn test_pending_condition_is_unknown() {
        let condition = HealthCondition::pending();
        assert_eq!(condition.status, ConditionStatus::Unknown);
        assert_eq!(condition.reason, REASON_PENDING);
        assert_eq!(condition.status.to_string(), "Unknown");
    }

    #[tokio::test]
    async fn test_log_reporter_accepts_conditions() {
        let reporter = LogReporter;
        let condition = HealthCondition::from_status(&status(true));
        assert!(reporter.report("ns/db", &condition).await.is_ok());
    }
}
