//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! Health loops, probes, supervisor produce:
//!     → logging.rs (structured log events)
//!     → metrics.rs (counters, gauges, histograms)
//!
//! Consumers:
//!     → Log aggregation (stdout, pretty or JSON)
//!     → Metrics endpoint (Prometheus scrape)
//! ```
//!
//! # Design Decisions
//! - Structured logging (JSON) for machine parsing
//! - Every event carries the resource key
//! - Metrics are cheap; without an installed recorder they are no-ops

pub mod logging;
pub mod metrics;
