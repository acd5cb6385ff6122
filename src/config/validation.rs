//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Reject duplicate resource keys
//! - Validate addresses and health check values after defaults are applied
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: SupervisorConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::collections::HashSet;
use std::net::SocketAddr;

use thiserror::Error;

use crate::config::schema::{SupervisorConfig, TargetConfig};
use crate::health::spec::{HealthCheckSpec, SpecError};

/// A single semantic problem in the configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("target #{index} has an empty name")]
    EmptyName { index: usize },

    #[error("duplicate target key '{key}'")]
    DuplicateKey { key: String },

    #[error("target '{key}' has invalid address '{address}': expected host:port")]
    InvalidAddress { key: String, address: String },

    #[error("target '{key}': {source}")]
    InvalidSpec { key: String, source: SpecError },

    #[error("defaults: {0}")]
    InvalidDefaults(SpecError),

    #[error("invalid metrics address '{0}'")]
    InvalidMetricsAddress(String),
}

/// Check the configuration, collecting every problem found.
pub fn validate_config(config: &SupervisorConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if let Err(e) = HealthCheckSpec::try_from(&config.defaults) {
        errors.push(ValidationError::InvalidDefaults(e));
    }

    let mut seen = HashSet::new();
    for (index, target) in config.targets.iter().enumerate() {
        if target.name.trim().is_empty() {
            errors.push(ValidationError::EmptyName { index });
            continue;
        }

        let key = target.key();
        if !seen.insert(key.clone()) {
            errors.push(ValidationError::DuplicateKey { key: key.clone() });
        }

        if !is_host_port(&target.address) {
            errors.push(ValidationError::InvalidAddress {
                key: key.clone(),
                address: target.address.clone(),
            });
        }

        if let Err(source) = resolve_spec(config, target) {
            errors.push(ValidationError::InvalidSpec { key, source });
        }
    }

    if config.observability.metrics_enabled
        && config.observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError::InvalidMetricsAddress(
            config.observability.metrics_address.clone(),
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

/// Apply the global defaults to a target and validate the result.
pub fn resolve_spec(
    config: &SupervisorConfig,
    target: &TargetConfig,
) -> Result<HealthCheckSpec, SpecError> {
    HealthCheckSpec::try_from(target.health_check.with_defaults_from(&config.defaults))
}

fn is_host_port(address: &str) -> bool {
    match address.rsplit_once(':') {
        Some((host, port)) => !host.is_empty() && port.parse::<u16>().map_or(false, |p| p > 0),
        None => false,
    }
}
