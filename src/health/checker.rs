//! Per-resource health check loops.
//!
//! # Responsibilities
//! - Start at most one polling loop per resource key
//! - Run the probe once per period with a bounded context
//! - Stop loops on request and publish each loop's latest status
//!
//! # Design Decisions
//! - Registration is a single atomic insert-if-absent on the registry
//! - A loop only removes its own registry entry (generation id), so a
//!   restarted key is never evicted by the loop it replaced
//! - Probes run sequentially per key; a slow probe delays ticks, missed
//!   ticks are skipped
//! - The `HealthCard` never leaves its loop; observers get `HealthStatus` snapshots
//! - A probe interrupted by `stop` publishes nothing
//! - Verdict changes are queued per subscriber so a slow consumer sees every flip

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::Serialize;
use tokio::sync::{broadcast, watch};
use tokio::time::{self, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::health::card::{FailureKind, HealthCard};
use crate::health::context::ProbeContext;
use crate::health::probe::Probe;
use crate::health::spec::HealthCheckSpec;
use crate::observability::metrics;

/// Read-only snapshot of a loop's card, published after every probe.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HealthStatus {
    #[serde(serialize_with = "serialize_kind")]
    pub last_failure: Option<FailureKind>,
    pub total_failure: u32,
    pub threshold: u32,
    pub has_failed: bool,
    pub client_count: i32,
    /// Probes completed by this loop.
    pub probes: u64,
}

impl HealthStatus {
    pub fn from_card(card: &HealthCard, probes: u64) -> Self {
        Self {
            last_failure: card.last_failure(),
            total_failure: card.total_failure(),
            threshold: card.threshold(),
            has_failed: card.has_failed(),
            client_count: card.client_count(),
            probes,
        }
    }
}

fn serialize_kind<S>(kind: &Option<FailureKind>, s: S) -> Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    s.serialize_str(kind.map(|k| k.as_str()).unwrap_or(""))
}

/// Verdict changes a transition subscriber may fall behind by before it lags.
const TRANSITION_BACKLOG: usize = 64;

#[derive(Debug)]
struct LoopHandle {
    id: u64,
    token: CancellationToken,
    status: watch::Receiver<HealthStatus>,
    transitions: broadcast::Sender<HealthStatus>,
}

type Registry = DashMap<String, LoopHandle>;

/// Registry of running health check loops, keyed by resource.
///
/// Not a global: create one per process (or per test) and share it via `Arc`.
/// Dropping it stops every loop it started.
#[derive(Debug, Default)]
pub struct HealthChecker {
    loops: Arc<Registry>,
    next_id: AtomicU64,
}

impl HealthChecker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a loop for `key` unless one is already running.
    ///
    /// Returns `false` and leaves the running loop (and its card) untouched
    /// when `key` is already registered. Also returns `false`, registering
    /// nothing, when called outside a Tokio runtime.
    pub fn start<P: Probe>(&self, key: impl Into<String>, spec: HealthCheckSpec, probe: P) -> bool {
        let key = key.into();
        if tokio::runtime::Handle::try_current().is_err() {
            tracing::error!(key = %key, "Health checker needs a Tokio runtime to start");
            return false;
        }

        let vacant = match self.loops.entry(key.clone()) {
            Entry::Occupied(_) => {
                tracing::debug!(key = %key, "Health checker already running");
                return false;
            }
            Entry::Vacant(vacant) => vacant,
        };

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let token = CancellationToken::new();
        let card = HealthCard::new(spec.failure_threshold());
        let (status_tx, status_rx) = watch::channel(HealthStatus::from_card(&card, 0));
        let (transitions, _) = broadcast::channel(TRANSITION_BACKLOG);

        vacant.insert(LoopHandle {
            id,
            token: token.clone(),
            status: status_rx,
            transitions: transitions.clone(),
        });

        tracing::info!(
            key = %key,
            period_secs = spec.period().as_secs(),
            timeout_secs = spec.timeout().as_secs(),
            failure_threshold = spec.failure_threshold(),
            "Health checker started"
        );
        metrics::record_active_loops(self.loops.len());

        let health_loop = HealthLoop {
            registry: self.loops.clone(),
            id,
            key,
            spec,
            card,
            token,
            status: status_tx,
            transitions,
        };
        tokio::spawn(health_loop.run(probe));
        true
    }

    /// Cancel the loop for `key`. Returns `false` if none was running.
    pub fn stop(&self, key: &str) -> bool {
        match self.loops.remove(key) {
            Some((_, handle)) => {
                handle.token.cancel();
                tracing::info!(key = %key, "Health checker stopped");
                metrics::record_active_loops(self.loops.len());
                metrics::clear_key(key);
                true
            }
            None => false,
        }
    }

    /// Cancel every running loop.
    pub fn stop_all(&self) {
        for key in self.keys() {
            self.stop(&key);
        }
    }

    pub fn is_running(&self, key: &str) -> bool {
        self.loops.contains_key(key)
    }

    pub fn keys(&self) -> Vec<String> {
        self.loops.iter().map(|entry| entry.key().clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.loops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.loops.is_empty()
    }

    /// Latest status published by the loop for `key`.
    pub fn status(&self, key: &str) -> Option<HealthStatus> {
        self.loops
            .get(key)
            .map(|handle| handle.status.borrow().clone())
    }

    /// Receiver notified after every probe of `key`'s loop.
    /// Closes once that loop exits.
    pub fn subscribe(&self, key: &str) -> Option<watch::Receiver<HealthStatus>> {
        self.loops.get(key).map(|handle| handle.status.clone())
    }

    /// Receiver of the first verdict of `key`'s loop and of every later
    /// `has_failed` flip, in order. Closes once that loop exits.
    ///
    /// Subscribe before the first period elapses to see the first verdict.
    pub fn transitions(&self, key: &str) -> Option<broadcast::Receiver<HealthStatus>> {
        self.loops.get(key).map(|handle| handle.transitions.subscribe())
    }
}

impl Drop for HealthChecker {
    fn drop(&mut self) {
        for entry in self.loops.iter() {
            entry.value().token.cancel();
        }
    }
}

struct HealthLoop {
    registry: Arc<Registry>,
    id: u64,
    key: String,
    spec: HealthCheckSpec,
    card: HealthCard,
    token: CancellationToken,
    status: watch::Sender<HealthStatus>,
    transitions: broadcast::Sender<HealthStatus>,
}

impl HealthLoop {
    async fn run<P: Probe>(mut self, probe: P) {
        let period = self.spec.period();
        let mut ticker = time::interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut probes: u64 = 0;

        loop {
            tokio::select! {
                biased;
                _ = self.token.cancelled() => {
                    self.deregister();
                    tracing::debug!(key = %self.key, probes, "Health check loop exited");
                    return;
                }
                _ = ticker.tick() => {
                    let was_failed = self.card.has_failed();
                    let ctx = ProbeContext::new(&self.token, self.spec.timeout());
                    let started = Instant::now();

                    probe.probe(&ctx, &self.key, &mut self.card).await;
                    ctx.cancel();

                    // stopped mid-probe: the outcome says nothing about the database
                    if self.token.is_cancelled() {
                        continue;
                    }

                    probes += 1;
                    self.record(started.elapsed(), was_failed);
                    let status = HealthStatus::from_card(&self.card, probes);
                    if probes == 1 || status.has_failed != was_failed {
                        // no receivers is fine
                        let _ = self.transitions.send(status.clone());
                    }
                    self.status.send_replace(status);
                }
            }
        }
    }

    fn record(&self, elapsed: std::time::Duration, was_failed: bool) {
        let card = &self.card;
        metrics::record_probe(
            &self.key,
            elapsed,
            card.last_failure(),
            card.has_failed(),
            card.client_count(),
        );

        if card.has_failed() != was_failed {
            if card.has_failed() {
                tracing::warn!(
                    key = %self.key,
                    kind = %card.last_failure().map(|k| k.as_str()).unwrap_or_default(),
                    total_failure = card.total_failure(),
                    threshold = card.threshold(),
                    "Failure threshold reached"
                );
            } else {
                tracing::info!(key = %self.key, "Health check recovered");
            }
        }
    }

    fn deregister(&self) {
        if self.registry.remove_if(&self.key, |_, handle| handle.id == self.id).is_some() {
            metrics::record_active_loops(self.registry.len());
            metrics::clear_key(&self.key);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::health::probe::{from_fn, ClientError, Connector, DatabaseClient, DatabaseProbe};
    use std::sync::atomic::AtomicU32;
    use std::time::Duration;

    /// Healthy database that takes five seconds to accept a connection.
    struct SlowConnector;
    struct QuietClient;

    impl Connector for SlowConnector {
        type Client = QuietClient;

        async fn connect(&self) -> Result<QuietClient, ClientError> {
            time::sleep(Duration::from_secs(5)).await;
            Ok(QuietClient)
        }
    }

    impl DatabaseClient for QuietClient {
        async fn ping(&mut self) -> Result<(), ClientError> {
            Ok(())
        }

        async fn write_check(&mut self) -> Result<(), ClientError> {
            Ok(())
        }

        async fn close(self) {}
    }

    fn spec(period: i32, threshold: i32) -> HealthCheckSpec {
        HealthCheckSpec::new(period, 1, threshold).unwrap()
    }

    fn always(kind: FailureKind) -> impl Probe {
        from_fn(move |_: &ProbeContext, _: &str, card: &mut HealthCard| card.register(kind))
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_probe_after_one_period() {
        let checker = HealthChecker::new();
        assert!(checker.start("ns/db", spec(10, 3), always(FailureKind::PingFailure)));

        time::sleep(Duration::from_secs(9)).await;
        assert_eq!(checker.status("ns/db").unwrap().probes, 0);

        time::sleep(Duration::from_secs(2)).await;
        let status = checker.status("ns/db").unwrap();
        assert_eq!(status.probes, 1);
        assert_eq!(status.total_failure, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_threshold_then_recovery() {
        let fail = Arc::new(std::sync::atomic::AtomicBool::new(true));
        let f = fail.clone();
        let probe = from_fn(move |_: &ProbeContext, _: &str, card: &mut HealthCard| {
            if f.load(Ordering::SeqCst) {
                card.register(FailureKind::PingFailure);
            } else {
                card.clear();
            }
        });

        let checker = HealthChecker::new();
        checker.start("ns/db", spec(10, 3), probe);

        time::sleep(Duration::from_secs(25)).await;
        assert!(!checker.status("ns/db").unwrap().has_failed);

        time::sleep(Duration::from_secs(10)).await;
        let status = checker.status("ns/db").unwrap();
        assert!(status.has_failed);
        assert_eq!(status.total_failure, 3);

        fail.store(false, Ordering::SeqCst);
        time::sleep(Duration::from_secs(10)).await;
        let status = checker.status("ns/db").unwrap();
        assert!(!status.has_failed);
        assert_eq!(status.total_failure, 0);
        assert_eq!(status.last_failure, None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_second_start_keeps_existing_card() {
        let checker = HealthChecker::new();
        assert!(checker.start("ns/db", spec(10, 100), always(FailureKind::PingFailure)));
        time::sleep(Duration::from_secs(25)).await;
        assert_eq!(checker.status("ns/db").unwrap().total_failure, 2);

        assert!(!checker.start("ns/db", spec(1, 1), always(FailureKind::ClientFailure)));
        time::sleep(Duration::from_secs(10)).await;

        let status = checker.status("ns/db").unwrap();
        assert_eq!(status.total_failure, 3);
        assert_eq!(status.threshold, 100);
        assert_eq!(status.last_failure, Some(FailureKind::PingFailure));
        assert_eq!(checker.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_unknown_key_is_noop() {
        let checker = HealthChecker::new();
        assert!(!checker.stop("ns/missing"));
        assert!(checker.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_halts_probes_and_restart_gets_fresh_card() {
        let calls = Arc::new(AtomicU32::new(0));
        let c = calls.clone();
        let counting = move || {
            let c = c.clone();
            from_fn(move |_: &ProbeContext, _: &str, card: &mut HealthCard| {
                c.fetch_add(1, Ordering::SeqCst);
                card.register(FailureKind::WriteFailure);
            })
        };

        let checker = HealthChecker::new();
        checker.start("ns/db", spec(5, 10), counting());
        time::sleep(Duration::from_secs(16)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        let mut status_rx = checker.subscribe("ns/db").unwrap();
        status_rx.borrow_and_update();

        assert!(checker.stop("ns/db"));
        assert!(!checker.is_running("ns/db"));
        assert!(status_rx.changed().await.is_err(), "loop should drop its sender on exit");

        time::sleep(Duration::from_secs(30)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 3);

        assert!(checker.start("ns/db", spec(5, 10), counting()));
        time::sleep(Duration::from_secs(6)).await;
        let status = checker.status("ns/db").unwrap();
        assert_eq!(status.total_failure, 1);
        assert_eq!(status.probes, 1);
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_during_slow_connect_publishes_nothing() {
        let checker = HealthChecker::new();
        let spec = HealthCheckSpec::new(10, 8, 1).unwrap();
        checker.start("ns/db", spec, DatabaseProbe::new(SlowConnector));
        let mut status_rx = checker.subscribe("ns/db").unwrap();
        status_rx.borrow_and_update();
        let mut transitions = checker.transitions("ns/db").unwrap();

        // first connect runs from 10s to 15s
        time::sleep(Duration::from_secs(12)).await;
        assert!(checker.stop("ns/db"));

        assert!(status_rx.changed().await.is_err());
        let last = status_rx.borrow().clone();
        assert_eq!(last.probes, 0);
        assert_eq!(last.total_failure, 0);
        assert!(!last.has_failed);
        assert!(matches!(
            transitions.recv().await,
            Err(broadcast::error::RecvError::Closed)
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_transitions_carry_first_verdict_and_flips() {
        let tick = Arc::new(AtomicU32::new(0));
        let t = tick.clone();
        // pass, pass, fail, fail, pass, pass
        let probe = from_fn(move |_: &ProbeContext, _: &str, card: &mut HealthCard| {
            match t.fetch_add(1, Ordering::SeqCst) {
                2 | 3 => card.register(FailureKind::PingFailure),
                _ => card.clear(),
            }
        });

        let checker = HealthChecker::new();
        checker.start("ns/db", spec(1, 1), probe);
        let mut rx = checker.transitions("ns/db").unwrap();

        time::sleep(Duration::from_millis(6500)).await;
        checker.stop("ns/db");

        let mut seen = Vec::new();
        while let Ok(status) = rx.recv().await {
            seen.push((status.probes, status.has_failed));
        }
        assert_eq!(seen, vec![(1, false), (3, true), (5, false)]);
    }

    #[test]
    fn test_start_outside_runtime_registers_nothing() {
        let checker = HealthChecker::new();
        assert!(!checker.start("ns/db", spec(1, 1), always(FailureKind::PingFailure)));
        assert!(checker.is_empty());

        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        runtime.block_on(async {
            assert!(checker.start("ns/db", spec(1, 1), always(FailureKind::PingFailure)));
        });
        assert!(checker.is_running("ns/db"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_loop_does_not_evict_restarted_key() {
        let checker = HealthChecker::new();
        checker.start("ns/db", spec(5, 10), always(FailureKind::PingFailure));
        checker.stop("ns/db");
        checker.start("ns/db", spec(5, 10), always(FailureKind::PingFailure));

        // let the cancelled loop observe its token and exit
        time::sleep(Duration::from_secs(1)).await;
        assert!(checker.is_running("ns/db"));

        time::sleep(Duration::from_secs(5)).await;
        assert_eq!(checker.status("ns/db").unwrap().probes, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_alternating_kinds_never_fail() {
        let tick = Arc::new(AtomicU32::new(0));
        let t = tick.clone();
        let probe = from_fn(move |_: &ProbeContext, _: &str, card: &mut HealthCard| {
            if t.fetch_add(1, Ordering::SeqCst) % 2 == 0 {
                card.register(FailureKind::ClientFailure);
            } else {
                card.register(FailureKind::PingFailure);
            }
        });

        let checker = HealthChecker::new();
        checker.start("ns/db", spec(1, 2), probe);
        let mut rx = checker.subscribe("ns/db").unwrap();

        for _ in 0..50 {
            rx.changed().await.unwrap();
            assert!(!rx.borrow().has_failed);
        }
        assert_eq!(rx.borrow().total_failure, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_keys_are_independent() {
        let checker = HealthChecker::new();
        checker.start("ns/a", spec(10, 1), always(FailureKind::PingFailure));
        checker.start(
            "ns/b",
            spec(10, 1),
            from_fn(|_: &ProbeContext, _: &str, card: &mut HealthCard| card.clear()),
        );

        time::sleep(Duration::from_secs(11)).await;
        assert!(checker.status("ns/a").unwrap().has_failed);
        assert!(!checker.status("ns/b").unwrap().has_failed);

        let mut keys = checker.keys();
        keys.sort();
        assert_eq!(keys, vec!["ns/a".to_string(), "ns/b".to_string()]);

        checker.stop_all();
        assert!(checker.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_probe_sees_bounded_context() {
        let seen = Arc::new(std::sync::Mutex::new(None));
        let s = seen.clone();
        let probe = from_fn(move |ctx: &ProbeContext, key: &str, _: &mut HealthCard| {
            *s.lock().unwrap() = Some((key.to_string(), ctx.remaining(), ctx.is_done()));
        });

        let checker = HealthChecker::new();
        checker.start("ns/db", HealthCheckSpec::new(10, 4, 1).unwrap(), probe);
        time::sleep(Duration::from_secs(11)).await;

        let (key, remaining, done) = seen.lock().unwrap().clone().unwrap();
        assert_eq!(key, "ns/db");
        assert_eq!(remaining, Duration::from_secs(4));
        assert!(!done);
    }

    #[tokio::test(start_paused = true)]
    async fn test_drop_cancels_loops() {
        let calls = Arc::new(AtomicU32::new(0));
        let c = calls.clone();
        let checker = HealthChecker::new();
        checker.start(
            "ns/db",
            spec(1, 1),
            from_fn(move |_: &ProbeContext, _: &str, _: &mut HealthCard| {
                c.fetch_add(1, Ordering::SeqCst);
            }),
        );
        time::sleep(Duration::from_millis(1500)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        drop(checker);
        time::sleep(Duration::from_secs(10)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
