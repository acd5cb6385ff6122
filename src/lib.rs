//! Health-check supervisor for KubeDB-managed databases.
//!
//! One polling loop per database resource, failure streaks tracked per
//! failure kind, conditions reported when the failure threshold is crossed.

pub mod config;
pub mod health;
pub mod lifecycle;
pub mod net;
pub mod observability;
pub mod supervisor;

pub use config::SupervisorConfig;
pub use health::{FailureKind, HealthCard, HealthCheckSpec, HealthChecker, Probe, ProbeContext};
pub use supervisor::Supervisor;
