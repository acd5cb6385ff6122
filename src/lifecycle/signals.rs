//! OS signal handling.
//!
//! # Responsibilities
//! - Register signal handlers (SIGTERM, SIGINT, SIGHUP)
//! - Translate signals to lifecycle events
//!
//! # Design Decisions
//! - Uses Tokio's signal handling (async-safe)
//! - SIGHUP triggers config reload, not shutdown

use std::io;

/// What the process was asked to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleSignal {
    Shutdown,
    Reload,
}

/// Registered signal handlers. Create once, then call `recv` in a loop.
#[cfg(unix)]
pub struct Signals {
    terminate: tokio::signal::unix::Signal,
    hangup: tokio::signal::unix::Signal,
}

#[cfg(unix)]
impl Signals {
    /// Register the handlers. Must be called inside a Tokio runtime.
    pub fn new() -> io::Result<Self> {
        use tokio::signal::unix::{signal, SignalKind};
        Ok(Self {
            terminate: signal(SignalKind::terminate())?,
            hangup: signal(SignalKind::hangup())?,
        })
    }

    /// Wait for the next signal.
    pub async fn recv(&mut self) -> LifecycleSignal {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => LifecycleSignal::Shutdown,
            _ = self.terminate.recv() => LifecycleSignal::Shutdown,
            _ = self.hangup.recv() => LifecycleSignal::Reload,
        }
    }
}

/// Ctrl-C only; there is no reload signal.
#[cfg(not(unix))]
pub struct Signals;

#[cfg(not(unix))]
impl Signals {
    pub fn new() -> io::Result<Self> {
        Ok(Self)
    }

    pub async fn recv(&mut self) -> LifecycleSignal {
        let _ = tokio::signal::ctrl_c().await;
        LifecycleSignal::Shutdown
    }
}
