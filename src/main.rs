//! KubeDB health supervisor.
//!
//! # Architecture Overview
//!
//! ```text
//!   config.toml ──▶ config ──▶ supervisor ──start/stop──▶ HealthChecker
//!        ▲                         │                          │ one loop per key
//!        │ notify / SIGHUP         │ conditions               ▼
//!        └─────────────────────────┤                    DatabaseProbe
//!                                  ▼                     tcp │ redis
//!                             LogReporter                    ▼
//!                                                        database
//! ```

use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand};

use kubedb_health::config::{load_config, Engine, ObservabilityConfig};
use kubedb_health::health::checker::HealthStatus;
use kubedb_health::health::{DatabaseProbe, HealthCard, Probe, ProbeContext};
use kubedb_health::lifecycle;
use kubedb_health::net::{RedisConnector, TcpConnector};
use kubedb_health::observability::logging;

#[derive(Parser)]
#[command(name = "kubedb-health")]
#[command(about = "Health check supervisor for KubeDB databases", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the supervisor until SIGINT/SIGTERM
    Run {
        #[arg(short, long, default_value = "kubedb-health.toml")]
        config: PathBuf,
    },
    /// Validate a configuration file and exit
    Validate {
        #[arg(short, long, default_value = "kubedb-health.toml")]
        config: PathBuf,
    },
    /// Probe a single database once and print the result as JSON
    Probe {
        #[arg(short, long, default_value = "tcp")]
        engine: Engine,
        #[arg(short, long)]
        address: String,
        #[arg(long)]
        password: Option<String>,
        #[arg(long, default_value_t = 10)]
        timeout_seconds: u64,
        #[arg(long)]
        disable_write_check: bool,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Run { config } => {
            lifecycle::run(&config).await?;
        }
        Commands::Validate { config } => {
            let config = load_config(&config)?;
            println!("configuration OK: {} target(s)", config.targets.len());
            for target in &config.targets {
                println!("  {} ({}, {})", target.key(), target.engine, target.address);
            }
        }
        Commands::Probe {
            engine,
            address,
            password,
            timeout_seconds,
            disable_write_check,
        } => {
            let _ = logging::init_logging(&ObservabilityConfig {
                log_level: "warn".to_string(),
                ..Default::default()
            });

            let ctx = ProbeContext::detached(Duration::from_secs(timeout_seconds));
            let mut card = HealthCard::new(1);
            let key = address.clone();
            let write_check = !disable_write_check;
            match engine {
                Engine::Tcp => {
                    DatabaseProbe::new(TcpConnector::new(address))
                        .with_write_check(write_check)
                        .probe(&ctx, &key, &mut card)
                        .await
                }
                Engine::Redis => {
                    DatabaseProbe::new(RedisConnector::new(address, password))
                        .with_write_check(write_check)
                        .probe(&ctx, &key, &mut card)
                        .await
                }
            }

            let status = HealthStatus::from_card(&card, 1);
            println!("{}", serde_json::to_string_pretty(&status)?);
            if status.has_failed {
                std::process::exit(1);
            }
        }
    }

    Ok(())
}
