//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (startup.rs):
//!     Load config → Validate → Logging → Metrics → Apply targets → Watch config
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → Shutdown::trigger → run loop exits → stop every health check loop
//!     SIGHUP → reload config file → re-apply targets
//!
//! Shutdown (shutdown.rs):
//!     broadcast to every subscriber of the coordinator
//! ```
//!
//! # Design Decisions
//! - Fail fast: any startup error is fatal
//! - A bad reload is logged and the running targets are kept

pub mod shutdown;
pub mod signals;
pub mod startup;

pub use shutdown::Shutdown;
pub use signals::{LifecycleSignal, Signals};
pub use startup::{run, StartupError};
