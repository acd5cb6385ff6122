//! Health checking subsystem.
//!
//! # Data Flow
//! ```text
//! HealthChecker::start(key, spec, probe)
//!     → one loop per key (checker.rs)
//!     → every period: ProbeContext with timeout (context.rs)
//!     → probe(ctx, key, card) (probe.rs)
//!     → HealthCard records failure streaks (card.rs)
//!     → HealthStatus snapshot published to subscribers
//!     → first verdict and has_failed flips queued for transition subscribers
//!
//! Reconciler (supervisor):
//!     Unknown until the first verdict, then each queued transition
//!     → HealthCondition (condition.rs)
//!     → ConditionReporter
//! ```
//!
//! # Design Decisions
//! - The scheduler knows nothing about success or failure, only the card does
//! - Failure streaks are per kind to avoid flapping verdicts
//! - Specs are validated before a loop can be started

pub mod card;
pub mod checker;
pub mod condition;
pub mod context;
pub mod probe;
pub mod spec;

pub use card::{FailureKind, HealthCard};
pub use checker::{HealthChecker, HealthStatus};
pub use condition::{ConditionReporter, HealthCondition, LogReporter};
pub use context::{ContextError, ProbeContext};
pub use probe::{from_fn, ClientError, Connector, DatabaseClient, DatabaseProbe, Probe};
pub use spec::{HealthCheckSpec, RawHealthCheckSpec, SpecError};
