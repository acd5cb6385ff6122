//! Startup orchestration.
//!
//! # Responsibilities
//! - Load and validate configuration
//! - Initialize logging and metrics in dependency order
//! - Apply targets and keep them in line with the config file until shutdown
//!
//! # Design Decisions
//! - Fail fast: any startup error is fatal
//! - Subsystems initialize in order, not concurrently

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use thiserror::Error;
use tokio::sync::mpsc;

use crate::config::loader::{load_config, ConfigError};
use crate::config::schema::SupervisorConfig;
use crate::config::watcher::{reload_into, ConfigWatcher};
use crate::health::checker::HealthChecker;
use crate::health::condition::LogReporter;
use crate::lifecycle::shutdown::Shutdown;
use crate::lifecycle::signals::{LifecycleSignal, Signals};
use crate::observability::{logging, metrics};
use crate::supervisor::{Supervisor, SupervisorError};

/// Errors that abort startup.
#[derive(Debug, Error)]
pub enum StartupError {
    #[error("configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("logging: {0}")]
    Logging(#[from] tracing_subscriber::util::TryInitError),

    #[error("metrics: {0}")]
    Metrics(#[from] metrics_exporter_prometheus::BuildError),

    #[error("invalid metrics address '{0}'")]
    MetricsAddress(String),

    #[error("config watcher: {0}")]
    Watch(#[from] notify::Error),

    #[error("signals: {0}")]
    Signal(#[from] std::io::Error),

    #[error(transparent)]
    Supervisor(#[from] SupervisorError),
}

/// Run the supervisor daemon until SIGINT/SIGTERM.
pub async fn run(config_path: &Path) -> Result<(), StartupError> {
    let config = load_config(config_path)?;
    logging::init_logging(&config.observability)?;

    tracing::info!(
        path = %config_path.display(),
        targets = config.targets.len(),
        "kubedb-health v{} starting",
        env!("CARGO_PKG_VERSION")
    );

    if config.observability.metrics_enabled {
        let addr: SocketAddr = config
            .observability
            .metrics_address
            .parse()
            .map_err(|_| StartupError::MetricsAddress(config.observability.metrics_address.clone()))?;
        metrics::init_metrics(addr)?;
    }

    let signals = Signals::new()?;
    let supervisor = Supervisor::new(Arc::new(HealthChecker::new()), LogReporter);
    supervisor.apply(config)?;

    let (watcher, mut updates) = ConfigWatcher::new(config_path);
    let reload_tx = watcher.sender();
    let file_watcher = watcher.run()?;

    let shutdown = Shutdown::new();
    let mut shutdown_rx = shutdown.subscribe();
    tokio::spawn(forward_signals(
        signals,
        shutdown.clone(),
        config_path.to_path_buf(),
        reload_tx,
    ));

    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => break,
            Some(next) = updates.recv() => {
                if supervisor.applied().as_ref() == &next {
                    tracing::debug!("Configuration unchanged, nothing to apply");
                    continue;
                }
                if let Err(e) = supervisor.apply(next) {
                    tracing::error!(error = %e, "Rejected configuration update");
                }
            }
        }
    }

    drop(file_watcher);
    tracing::debug!("Config watcher stopped");
    supervisor.shutdown();
    tracing::info!("Shutdown complete");
    Ok(())
}

/// Turn OS signals into shutdown or reload requests until shutdown fires.
async fn forward_signals(
    mut signals: Signals,
    shutdown: Shutdown,
    config_path: PathBuf,
    reload_tx: mpsc::UnboundedSender<SupervisorConfig>,
) {
    loop {
        match signals.recv().await {
            LifecycleSignal::Shutdown => {
                tracing::info!(
                    subscribers = shutdown.receiver_count(),
                    "Shutdown signal received"
                );
                shutdown.trigger();
                return;
            }
            LifecycleSignal::Reload => {
                tracing::info!("SIGHUP received, reloading configuration");
                reload_into(&config_path, &reload_tx);
            }
        }
    }
}
