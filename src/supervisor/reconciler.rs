//! Target reconciler.

use std::collections::HashMap;
use std::sync::Arc;

use arc_swap::ArcSwap;
use thiserror::Error;
use tokio::sync::broadcast::{self, error::RecvError};

use crate::config::schema::{Engine, SupervisorConfig, TargetConfig};
use crate::config::validation::{resolve_spec, validate_config, ValidationError};
use crate::health::checker::{HealthChecker, HealthStatus};
use crate::health::condition::{ConditionReporter, HealthCondition, LogReporter};
use crate::health::probe::DatabaseProbe;
use crate::health::spec::HealthCheckSpec;
use crate::net::{RedisConnector, TcpConnector};

/// Errors returned when applying a configuration.
#[derive(Debug, Error)]
pub enum SupervisorError {
    #[error("invalid configuration: {}", .0.iter().map(ToString::to_string).collect::<Vec<_>>().join(", "))]
    Invalid(Vec<ValidationError>),
}

/// What an `apply` changed.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ApplySummary {
    pub started: usize,
    pub stopped: usize,
    pub restarted: usize,
    pub unchanged: usize,
}

/// Keeps the set of running health check loops in line with the configuration.
pub struct Supervisor<R = LogReporter> {
    checker: Arc<HealthChecker>,
    reporter: Arc<R>,
    applied: ArcSwap<SupervisorConfig>,
}

impl<R: ConditionReporter> Supervisor<R> {
    pub fn new(checker: Arc<HealthChecker>, reporter: R) -> Self {
        Self {
            checker,
            reporter: Arc::new(reporter),
            applied: ArcSwap::from_pointee(SupervisorConfig::default()),
        }
    }

    pub fn checker(&self) -> &Arc<HealthChecker> {
        &self.checker
    }

    /// The last configuration successfully applied.
    pub fn applied(&self) -> Arc<SupervisorConfig> {
        self.applied.load_full()
    }

    /// Start, stop and restart loops so they match `config`.
    ///
    /// An invalid configuration is rejected as a whole and nothing changes.
    pub fn apply(&self, config: SupervisorConfig) -> Result<ApplySummary, SupervisorError> {
        validate_config(&config).map_err(SupervisorError::Invalid)?;

        let previous = self.applied.load_full();
        let summary = self.reconcile(&previous, &config);
        self.applied.store(Arc::new(config));
        tracing::info!(
            started = summary.started,
            stopped = summary.stopped,
            restarted = summary.restarted,
            unchanged = summary.unchanged,
            "Configuration applied"
        );
        Ok(summary)
    }

    fn reconcile(&self, previous: &SupervisorConfig, next: &SupervisorConfig) -> ApplySummary {
        let current = resolve_targets(previous);
        let desired = resolve_targets(next);
        let mut summary = ApplySummary::default();

        for key in current.keys() {
            if !desired.contains_key(key) && self.checker.stop(key) {
                summary.stopped += 1;
            }
        }

        for (key, (target, spec)) in &desired {
            match current.get(key) {
                Some(old) if old == &(*target, *spec) && self.checker.is_running(key) => {
                    summary.unchanged += 1;
                }
                Some(_) => {
                    self.checker.stop(key);
                    self.start_target(key, target, *spec);
                    summary.restarted += 1;
                }
                None => {
                    if self.start_target(key, target, *spec) {
                        summary.started += 1;
                    } else {
                        summary.unchanged += 1;
                    }
                }
            }
        }
        summary
    }

    /// Stop every loop and forget the applied configuration.
    pub fn shutdown(&self) {
        self.checker.stop_all();
        self.applied.store(Arc::new(SupervisorConfig::default()));
        tracing::info!("Supervisor stopped all health checks");
    }

    fn start_target(&self, key: &str, target: &TargetConfig, spec: HealthCheckSpec) -> bool {
        let write_check = !spec.write_check_disabled();
        let started = match target.engine {
            Engine::Tcp => self.checker.start(
                key,
                spec,
                DatabaseProbe::new(TcpConnector::new(&target.address)).with_write_check(write_check),
            ),
            Engine::Redis => self.checker.start(
                key,
                spec,
                DatabaseProbe::new(RedisConnector::new(&target.address, target.password.clone()))
                    .with_write_check(write_check),
            ),
        };

        if started {
            if let Some(rx) = self.checker.transitions(key) {
                tokio::spawn(report_transitions(key.to_string(), rx, self.reporter.clone()));
            }
        }
        started
    }
}

fn resolve_targets(config: &SupervisorConfig) -> HashMap<String, (&TargetConfig, HealthCheckSpec)> {
    config
        .targets
        .iter()
        .filter_map(|target| {
            // applied configs are validated, so a failure here means the target is skipped
            let spec = resolve_spec(config, target).ok()?;
            Some((target.key(), (target, spec)))
        })
        .collect()
}

/// Report `Unknown` right away, then one condition per verdict change
/// received on `rx`, until the loop behind it exits.
///
/// A reporter slower than the probe period delays conditions but skips none
/// unless it falls a whole transition backlog behind.
pub async fn report_transitions<R: ConditionReporter>(
    key: String,
    mut rx: broadcast::Receiver<HealthStatus>,
    reporter: Arc<R>,
) {
    report(&key, &HealthCondition::pending(), reporter.as_ref()).await;
    loop {
        match rx.recv().await {
            Ok(status) => {
                report(&key, &HealthCondition::from_status(&status), reporter.as_ref()).await;
            }
            Err(RecvError::Lagged(skipped)) => {
                tracing::warn!(
                    key = %key,
                    skipped,
                    "Condition reporter fell behind, transitions dropped"
                );
            }
            Err(RecvError::Closed) => break,
        }
    }
    tracing::debug!(key = %key, "Condition reporting finished");
}

async fn report<R: ConditionReporter>(key: &str, condition: &HealthCondition, reporter: &R) {
    if let Err(e) = reporter.report(key, condition).await {
        tracing::error!(key = %key, error = %e, "Failed to report health condition");
    }
}
