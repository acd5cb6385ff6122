//! Probe contract and the standard database probe.
//!
//! # Responsibilities
//! - Define what the scheduler calls on every tick
//! - Provide the connect / ping / write sequence shared by all engines
//! - Translate client errors into failure kinds on the card
//!
//! # Design Decisions
//! - Probes return nothing; outcomes live on the `HealthCard`
//! - Engines only implement `Connector` + `DatabaseClient`
//! - The client is always closed and the card's client counter balanced,
//!   whatever step failed
//! - A cancelled context leaves the card untouched; only an expired deadline
//!   counts as a failure

use std::future::Future;
use std::time::Duration;

use thiserror::Error;

use crate::health::card::{FailureKind, HealthCard};
use crate::health::context::{ContextError, ProbeContext};

/// Errors raised by engine clients during a probe.
#[derive(Debug, Error)]
pub enum ClientError {
    /// Socket level failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The server answered with something the client could not parse.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// The server answered, but not with the expected reply.
    #[error("unexpected reply: expected {expected}, got {actual}")]
    Unexpected { expected: String, actual: String },

    /// The probe context ended before the call completed.
    #[error(transparent)]
    Context(#[from] ContextError),
}

/// A health probe invoked once per tick.
pub trait Probe: Send + Sync + 'static {
    /// Check the resource identified by `key` and record the outcome on `card`.
    fn probe(
        &self,
        ctx: &ProbeContext,
        key: &str,
        card: &mut HealthCard,
    ) -> impl Future<Output = ()> + Send;
}

/// Probe backed by a synchronous closure.
#[derive(Debug, Clone)]
pub struct FnProbe<F>(F);

/// Wrap a closure as a [`Probe`].
pub fn from_fn<F>(f: F) -> FnProbe<F>
where
    F: Fn(&ProbeContext, &str, &mut HealthCard) + Send + Sync + 'static,
{
    FnProbe(f)
}

impl<F> Probe for FnProbe<F>
where
    F: Fn(&ProbeContext, &str, &mut HealthCard) + Send + Sync + 'static,
{
    fn probe(
        &self,
        ctx: &ProbeContext,
        key: &str,
        card: &mut HealthCard,
    ) -> impl Future<Output = ()> + Send {
        (self.0)(ctx, key, card);
        std::future::ready(())
    }
}

/// Opens connections to one database endpoint.
pub trait Connector: Send + Sync + 'static {
    type Client: DatabaseClient + 'static;

    fn connect(&self) -> impl Future<Output = Result<Self::Client, ClientError>> + Send;
}

/// An open connection used for a single probe.
pub trait DatabaseClient: Send {
    /// Cheap connectivity check.
    fn ping(&mut self) -> impl Future<Output = Result<(), ClientError>> + Send;

    /// Write something small to prove the database accepts writes.
    fn write_check(&mut self) -> impl Future<Output = Result<(), ClientError>> + Send;

    fn close(self) -> impl Future<Output = ()> + Send;
}

/// Connect, ping and optionally write, reporting each stage on the card.
#[derive(Debug, Clone)]
pub struct DatabaseProbe<C> {
    connector: C,
    write_check: bool,
}

/// Budget for closing a client once the probe context has already ended.
const CLOSE_GRACE: Duration = Duration::from_secs(1);

impl<C: Connector> DatabaseProbe<C> {
    pub fn new(connector: C) -> Self {
        Self {
            connector,
            write_check: true,
        }
    }

    pub fn with_write_check(mut self, enabled: bool) -> Self {
        self.write_check = enabled;
        self
    }

    pub fn connector(&self) -> &C {
        &self.connector
    }

    async fn check(
        &self,
        ctx: &ProbeContext,
        client: &mut C::Client,
    ) -> Result<(), (FailureKind, ClientError)> {
        flatten(ctx.run(client.ping()).await).map_err(|e| (FailureKind::PingFailure, e))?;

        if self.write_check {
            flatten(ctx.run(client.write_check()).await)
                .map_err(|e| (FailureKind::WriteFailure, e))?;
        }
        Ok(())
    }
}

impl<C: Connector> Probe for DatabaseProbe<C> {
    async fn probe(&self, ctx: &ProbeContext, key: &str, card: &mut HealthCard) {
        let mut client = match flatten(ctx.run(self.connector.connect()).await) {
            Ok(client) => client,
            Err(ClientError::Context(ContextError::Cancelled)) => {
                tracing::debug!(key = %key, "Health check cancelled while connecting");
                return;
            }
            Err(e) => {
                tracing::warn!(
                    key = %key,
                    error = %e,
                    "Health check failed: could not create client"
                );
                card.register(FailureKind::ClientFailure);
                return;
            }
        };
        card.client_created();

        let outcome = self.check(ctx, &mut client).await;

        if tokio::time::timeout(ctx.remaining().max(CLOSE_GRACE), client.close())
            .await
            .is_err()
        {
            tracing::debug!(key = %key, "Timed out closing health check client");
        }
        card.client_closed();

        match outcome {
            Ok(()) => {
                tracing::trace!(key = %key, "Health check succeeded");
                card.clear();
            }
            Err((_, ClientError::Context(ContextError::Cancelled))) => {
                tracing::debug!(key = %key, "Health check cancelled");
            }
            Err((kind, e)) => {
                tracing::warn!(key = %key, kind = %kind, error = %e, "Health check failed");
                card.register(kind);
            }
        }
    }
}

fn flatten<T>(res: Result<Result<T, ClientError>, ContextError>) -> Result<T, ClientError> {
    res?
}
