//! Per-resource failure bookkeeping.
//!
//! # Responsibilities
//! - Count consecutive failures of the same kind
//! - Decide whether the failure threshold has been reached
//! - Track clients opened by a probe so leaks show up
//!
//! # Design Decisions
//! - Streaks are per kind: alternating kinds never accumulate
//! - No interior locking; exactly one loop owns and mutates a card

use std::fmt;

/// Category of a probe failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureKind {
    /// Could not build a client or open a connection.
    ClientFailure,
    /// Connectivity check failed.
    PingFailure,
    /// Write probe failed.
    WriteFailure,
    /// Engine specific kind supplied by an embedding probe.
    Custom(&'static str),
}

impl FailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureKind::ClientFailure => "ClientFailure",
            FailureKind::PingFailure => "PingFailure",
            FailureKind::WriteFailure => "WriteFailure",
            FailureKind::Custom(label) => *label,
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Failure counter and threshold evaluator for one monitored resource.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HealthCard {
    last_failure: Option<FailureKind>,
    total_failure: u32,
    threshold: u32,
    client_count: i32,
}

impl HealthCard {
    /// Create a card with zeroed counters.
    pub fn new(threshold: u32) -> Self {
        Self {
            last_failure: None,
            total_failure: 0,
            threshold,
            client_count: 0,
        }
    }

    /// Record a failure. Repeating the previous kind extends the streak,
    /// a different kind starts a new streak of one.
    pub fn register(&mut self, kind: FailureKind) {
        if self.last_failure == Some(kind) {
            self.total_failure = self.total_failure.saturating_add(1);
        } else {
            self.total_failure = 1;
            self.last_failure = Some(kind);
        }
    }

    /// Forget all failures after a fully successful probe.
    pub fn clear(&mut self) {
        self.total_failure = 0;
        self.last_failure = None;
    }

    /// True once the current streak reached the threshold.
    pub fn has_failed(&self) -> bool {
        self.total_failure >= self.threshold
    }

    pub fn client_created(&mut self) {
        self.client_count += 1;
    }

    pub fn client_closed(&mut self) {
        self.client_count -= 1;
    }

    /// Clients opened by probes and not yet closed. Non-zero between probes means a leak.
    pub fn client_count(&self) -> i32 {
        self.client_count
    }

    pub fn last_failure(&self) -> Option<FailureKind> {
        self.last_failure
    }

    pub fn total_failure(&self) -> u32 {
        self.total_failure
    }

    pub fn threshold(&self) -> u32 {
        self.threshold
    }
}
