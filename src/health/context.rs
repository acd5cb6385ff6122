//! Per-probe cancellation and deadline.

use std::future::Future;
use std::time::Duration;

use thiserror::Error;
use tokio::time::{self, Instant};
use tokio_util::sync::CancellationToken;

/// Why a probe context is no longer usable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ContextError {
    /// The owning loop was stopped.
    #[error("context cancelled")]
    Cancelled,
    /// The per-probe timeout elapsed.
    #[error("context deadline exceeded")]
    DeadlineExceeded,
}

/// Context handed to a probe for a single tick.
///
/// Derived from the loop's root token, so stopping the loop cancels it,
/// and bounded by the configured timeout. Probes are expected to observe it;
/// the scheduler never aborts a probe that ignores it.
#[derive(Debug, Clone)]
pub struct ProbeContext {
    token: CancellationToken,
    deadline: Instant,
}

impl ProbeContext {
    /// Derive a context from `parent` that expires after `timeout`.
    pub fn new(parent: &CancellationToken, timeout: Duration) -> Self {
        Self {
            token: parent.child_token(),
            deadline: Instant::now() + timeout,
        }
    }

    /// A context with no parent, for one-shot probes.
    pub fn detached(timeout: Duration) -> Self {
        Self::new(&CancellationToken::new(), timeout)
    }

    pub fn deadline(&self) -> Instant {
        self.deadline
    }

    /// Time left before the deadline, zero once it has passed.
    pub fn remaining(&self) -> Duration {
        self.deadline.saturating_duration_since(Instant::now())
    }

    pub fn is_done(&self) -> bool {
        self.err().is_some()
    }

    /// Cancellation wins over an expired deadline.
    pub fn err(&self) -> Option<ContextError> {
        if self.token.is_cancelled() {
            Some(ContextError::Cancelled)
        } else if Instant::now() >= self.deadline {
            Some(ContextError::DeadlineExceeded)
        } else {
            None
        }
    }

    /// Resolve once the context is cancelled or its deadline passes.
    pub async fn done(&self) -> ContextError {
        tokio::select! {
            biased;
            _ = self.token.cancelled() => ContextError::Cancelled,
            _ = time::sleep_until(self.deadline) => ContextError::DeadlineExceeded,
        }
    }

    /// Run `fut` until it completes or the context ends, whichever comes first.
    pub async fn run<F>(&self, fut: F) -> Result<F::Output, ContextError>
    where
        F: Future,
    {
        if let Some(err) = self.err() {
            return Err(err);
        }
        tokio::select! {
            biased;
            err = self.done() => Err(err),
            out = fut => Ok(out),
        }
    }

    pub(crate) fn cancel(&self) {
        self.token.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_deadline_expires() {
        let ctx = ProbeContext::detached(Duration::from_secs(2));
        assert!(!ctx.is_done());
        assert_eq!(ctx.remaining(), Duration::from_secs(2));

        time::advance(Duration::from_secs(3)).await;
        assert_eq!(ctx.err(), Some(ContextError::DeadlineExceeded));
        assert_eq!(ctx.remaining(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_parent_cancellation_propagates() {
        let root = CancellationToken::new();
        let ctx = ProbeContext::new(&root, Duration::from_secs(60));

        root.cancel();
        assert_eq!(ctx.err(), Some(ContextError::Cancelled));
        assert_eq!(ctx.done().await, ContextError::Cancelled);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelling_child_leaves_parent_alone() {
        let root = CancellationToken::new();
        let ctx = ProbeContext::new(&root, Duration::from_secs(60));

        ctx.cancel();
        assert!(ctx.is_done());
        assert!(!root.is_cancelled());
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_bounds_slow_future() {
        let ctx = ProbeContext::detached(Duration::from_secs(1));
        let res = ctx.run(time::sleep(Duration::from_secs(30))).await;
        assert_eq!(res, Err(ContextError::DeadlineExceeded));

        let ctx = ProbeContext::detached(Duration::from_secs(5));
        let res = ctx.run(async { 42 }).await;
        assert_eq!(res, Ok(42));
    }
}
