//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the health
//! supervisor. All types derive Serde traits for deserialization from config files.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::health::spec::RawHealthCheckSpec;

/// Root configuration for the health supervisor.
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq)]
#[serde(default)]
pub struct SupervisorConfig {
    /// Observability settings.
    pub observability: ObservabilityConfig,

    /// Health check settings applied to targets that leave a field unset.
    pub defaults: RawHealthCheckSpec,

    /// Monitored databases.
    #[serde(rename = "target")]
    pub targets: Vec<TargetConfig>,
}

/// Database engines with a built-in probe.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, Default, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Engine {
    /// Plain TCP reachability.
    #[default]
    Tcp,
    /// Redis / Valkey speaking RESP.
    Redis,
}

impl fmt::Display for Engine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Engine::Tcp => f.write_str("tcp"),
            Engine::Redis => f.write_str("redis"),
        }
    }
}

impl std::str::FromStr for Engine {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "tcp" => Ok(Engine::Tcp),
            "redis" => Ok(Engine::Redis),
            other => Err(format!("unknown engine '{}'", other)),
        }
    }
}

/// A monitored database.
#[derive(Clone, Deserialize, Serialize, PartialEq)]
pub struct TargetConfig {
    /// Namespace of the database resource.
    #[serde(default = "default_namespace")]
    pub namespace: String,

    /// Name of the database resource.
    pub name: String,

    /// Engine used to pick the probe.
    #[serde(default)]
    pub engine: Engine,

    /// Address to probe (e.g., "redis.demo.svc:6379").
    pub address: String,

    /// Password sent with AUTH, where the engine supports it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,

    /// Per-target health check settings.
    #[serde(default, alias = "healthChecker")]
    pub health_check: RawHealthCheckSpec,
}

impl TargetConfig {
    /// Registry key, `namespace/name`.
    pub fn key(&self) -> String {
        format!("{}/{}", self.namespace, self.name)
    }
}

impl fmt::Debug for TargetConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TargetConfig")
            .field("namespace", &self.namespace)
            .field("name", &self.name)
            .field("engine", &self.engine)
            .field("address", &self.address)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("health_check", &self.health_check)
            .finish()
    }
}

fn default_namespace() -> String {
    "default".to_string()
}

/// Log output format.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Log output format.
    pub log_format: LogFormat,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}
