//! Reconciliation of configured targets onto health check loops.
//!
//! # Data Flow
//! ```text
//! SupervisorConfig (initial load, file change, SIGHUP)
//!     → reconciler.rs diffs against the applied config
//!         new key      → HealthChecker::start
//!         removed key  → HealthChecker::stop
//!         changed key  → stop, then start with a fresh card
//!     → per key: status subscription
//!         has_failed transition → HealthCondition → ConditionReporter
//! ```
//!
//! # Design Decisions
//! - The applied config is swapped atomically after a successful diff
//! - Conditions are reported on transitions only, never on every tick

pub mod reconciler;

pub use reconciler::{ApplySummary, Supervisor, SupervisorError};
