//! Health check timing and threshold settings.
//!
//! # Responsibilities
//! - Carry the raw, optional settings as they appear in resource specs and config files
//! - Apply platform defaults and reject non-positive values at the boundary
//!
//! # Design Decisions
//! - `HealthCheckSpec` has no optional fields; only validated values reach the scheduler
//! - Defaults match the database resources: 10s period, 10s timeout, threshold 1

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const DEFAULT_PERIOD_SECONDS: i32 = 10;
pub const DEFAULT_TIMEOUT_SECONDS: i32 = 10;
pub const DEFAULT_FAILURE_THRESHOLD: i32 = 1;

/// Errors produced while validating a health check spec.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SpecError {
    /// A field that must be strictly positive was zero or negative.
    #[error("{field} must be greater than zero, got {value}")]
    NonPositive { field: &'static str, value: i32 },
}

/// Health check settings as written by users; every field may be omitted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct RawHealthCheckSpec {
    /// Seconds between two probes.
    #[serde(alias = "periodSeconds", skip_serializing_if = "Option::is_none")]
    pub period_seconds: Option<i32>,

    /// Seconds a single probe may take.
    #[serde(alias = "timeoutSeconds", skip_serializing_if = "Option::is_none")]
    pub timeout_seconds: Option<i32>,

    /// Consecutive same-kind failures before the resource is reported unhealthy.
    #[serde(alias = "failureThreshold", skip_serializing_if = "Option::is_none")]
    pub failure_threshold: Option<i32>,

    /// Skip the write probe (read-only replicas, restricted users).
    #[serde(alias = "disableWriteCheck")]
    pub disable_write_check: bool,
}

impl RawHealthCheckSpec {
    /// Fill fields missing here from `defaults`.
    pub fn with_defaults_from(&self, defaults: &RawHealthCheckSpec) -> RawHealthCheckSpec {
        RawHealthCheckSpec {
            period_seconds: self.period_seconds.or(defaults.period_seconds),
            timeout_seconds: self.timeout_seconds.or(defaults.timeout_seconds),
            failure_threshold: self.failure_threshold.or(defaults.failure_threshold),
            disable_write_check: self.disable_write_check || defaults.disable_write_check,
        }
    }
}

/// Validated health check settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HealthCheckSpec {
    period_seconds: u32,
    timeout_seconds: u32,
    failure_threshold: u32,
    disable_write_check: bool,
}

impl HealthCheckSpec {
    /// Build a spec from explicit values.
    pub fn new(
        period_seconds: i32,
        timeout_seconds: i32,
        failure_threshold: i32,
    ) -> Result<Self, SpecError> {
        Ok(Self {
            period_seconds: positive("periodSeconds", period_seconds)?,
            timeout_seconds: positive("timeoutSeconds", timeout_seconds)?,
            failure_threshold: positive("failureThreshold", failure_threshold)?,
            disable_write_check: false,
        })
    }

    /// Return a copy with the write probe switched off or on.
    pub fn with_write_check_disabled(mut self, disabled: bool) -> Self {
        self.disable_write_check = disabled;
        self
    }

    pub fn period(&self) -> Duration {
        Duration::from_secs(u64::from(self.period_seconds))
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(u64::from(self.timeout_seconds))
    }

    pub fn failure_threshold(&self) -> u32 {
        self.failure_threshold
    }

    pub fn write_check_disabled(&self) -> bool {
        self.disable_write_check
    }
}

impl Default for HealthCheckSpec {
    fn default() -> Self {
        Self {
            period_seconds: DEFAULT_PERIOD_SECONDS as u32,
            timeout_seconds: DEFAULT_TIMEOUT_SECONDS as u32,
            failure_threshold: DEFAULT_FAILURE_THRESHOLD as u32,
            disable_write_check: false,
        }
    }
}

impl TryFrom<RawHealthCheckSpec> for HealthCheckSpec {
    type Error = SpecError;

    fn try_from(raw: RawHealthCheckSpec) -> Result<Self, Self::Error> {
        let spec = HealthCheckSpec::new(
            raw.period_seconds.unwrap_or(DEFAULT_PERIOD_SECONDS),
            raw.timeout_seconds.unwrap_or(DEFAULT_TIMEOUT_SECONDS),
            raw.failure_threshold.unwrap_or(DEFAULT_FAILURE_THRESHOLD),
        )?;
        Ok(spec.with_write_check_disabled(raw.disable_write_check))
    }
}

impl TryFrom<&RawHealthCheckSpec> for HealthCheckSpec {
    type Error = SpecError;

    fn try_from(raw: &RawHealthCheckSpec) -> Result<Self, Self::Error> {
        HealthCheckSpec::try_from(raw.clone())
    }
}

fn positive(field: &'static str, value: i32) -> Result<u32, SpecError> {
    if value > 0 {
        Ok(value as u32)
    } else {
        Err(SpecError::NonPositive { field, value })
    }
}
