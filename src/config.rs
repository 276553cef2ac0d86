//! Waiter configuration
//!
//! The four timing knobs plus the transient-error log cadence. Loadable from
//! YAML or JSON and overridable from `IKA_WAIT_*` environment variables.

use crate::readiness::schedule::{PollPhase, PollSchedule};
use crate::{Error, ErrorContext, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

pub const ENV_FAST_INTERVAL_MS: &str = "IKA_WAIT_FAST_INTERVAL_MS";
pub const ENV_FAST_PHASE_MS: &str = "IKA_WAIT_FAST_PHASE_MS";
pub const ENV_SLOW_INTERVAL_MS: &str = "IKA_WAIT_SLOW_INTERVAL_MS";
pub const ENV_TIMEOUT_MS: &str = "IKA_WAIT_TIMEOUT_MS";
pub const ENV_ERROR_LOG_EVERY: &str = "IKA_WAIT_ERROR_LOG_EVERY";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WaiterConfig {
    /// Poll interval while in the fast phase.
    pub fast_interval_ms: u64,
    /// How long the fast phase lasts, measured from the start of the attempt.
    pub fast_phase_duration_ms: u64,
    /// Poll interval after the fast phase, until the timeout.
    pub slow_interval_ms: u64,
    /// Hard deadline for one attempt.
    pub total_timeout_ms: u64,
    /// Transient probe errors are logged on the first, every Nth, and on message change.
    pub error_log_every: u64,
}

impl Default for WaiterConfig {
    fn default() -> Self {
        Self {
            fast_interval_ms: 150,
            fast_phase_duration_ms: 5_000,
            slow_interval_ms: 500,
            total_timeout_ms: 60_000,
            error_log_every: 50,
        }
    }
}

fn config_error(field: &str, msg: impl Into<String>, details: impl Into<String>) -> Error {
    Error::configuration_with_context(
        msg,
        ErrorContext::new()
            .with_field_path(field)
            .with_details(details)
            .with_source("waiter_config"),
    )
}

impl WaiterConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_fast_interval(mut self, interval: Duration) -> Self {
        self.fast_interval_ms = interval.as_millis() as u64;
        self
    }

    pub fn with_fast_phase(mut self, duration: Duration) -> Self {
        self.fast_phase_duration_ms = duration.as_millis() as u64;
        self
    }

    pub fn with_slow_interval(mut self, interval: Duration) -> Self {
        self.slow_interval_ms = interval.as_millis() as u64;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.total_timeout_ms = timeout.as_millis() as u64;
        self
    }

    pub fn with_error_log_every(mut self, every: u64) -> Self {
        self.error_log_every = every;
        self
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.total_timeout_ms)
    }

    pub fn validate(&self) -> Result<()> {
        if self.fast_interval_ms == 0 {
            return Err(config_error(
                "fast_interval_ms",
                "poll interval must be positive",
                "got 0",
            ));
        }
        if self.slow_interval_ms < self.fast_interval_ms {
            return Err(config_error(
                "slow_interval_ms",
                "slow interval must not be shorter than the fast interval",
                format!(
                    "slow {}ms < fast {}ms",
                    self.slow_interval_ms, self.fast_interval_ms
                ),
            ));
        }
        if self.total_timeout_ms == 0 {
            return Err(config_error(
                "total_timeout_ms",
                "timeout must be positive",
                "got 0",
            ));
        }
        if self.fast_phase_duration_ms > self.total_timeout_ms {
            return Err(config_error(
                "fast_phase_duration_ms",
                "fast phase cannot outlast the total timeout",
                format!(
                    "fast phase {}ms > timeout {}ms",
                    self.fast_phase_duration_ms, self.total_timeout_ms
                ),
            ));
        }
        self.validate_error_log_every()
    }

    /// The only check that still applies when an explicit schedule replaces
    /// the timing fields.
    pub(crate) fn validate_error_log_every(&self) -> Result<()> {
        if self.error_log_every == 0 {
            return Err(config_error(
                "error_log_every",
                "log cadence must be positive",
                "got 0",
            ));
        }
        Ok(())
    }

    /// Build the phased poll schedule this config describes.
    pub fn schedule(&self) -> Result<PollSchedule> {
        self.validate()?;
        let mut phases = Vec::with_capacity(2);
        if self.fast_phase_duration_ms > 0 {
            phases.push(PollPhase::bounded(
                Duration::from_millis(self.fast_interval_ms),
                Duration::from_millis(self.fast_phase_duration_ms),
            ));
        }
        phases.push(PollPhase::open(Duration::from_millis(self.slow_interval_ms)));
        PollSchedule::new(phases, self.timeout())
    }

    pub fn from_yaml_str(content: &str) -> Result<Self> {
        let cfg: Self = serde_yaml::from_str(content)?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn from_json_str(content: &str) -> Result<Self> {
        let cfg: Self = serde_json::from_str(content)?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Load from a `.yaml`/`.yml` or `.json` file.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        match path.extension().and_then(|e| e.to_str()) {
            Some("yaml") | Some("yml") => Self::from_yaml_str(&content),
            Some("json") => Self::from_json_str(&content),
            other => Err(Error::configuration_with_context(
                "unsupported config file extension",
                ErrorContext::new()
                    .with_field_path(path.display().to_string())
                    .with_details(format!("extension: {:?}", other))
                    .with_source("waiter_config"),
            )),
        }
    }

    /// Apply `IKA_WAIT_*` environment overrides on top of this config.
    pub fn with_env_overrides(self) -> Result<Self> {
        self.with_overrides_from(|key| std::env::var(key).ok())
    }

    pub(crate) fn with_overrides_from<F>(mut self, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let fields: [(&str, &mut u64); 5] = [
            (ENV_FAST_INTERVAL_MS, &mut self.fast_interval_ms),
            (ENV_FAST_PHASE_MS, &mut self.fast_phase_duration_ms),
            (ENV_SLOW_INTERVAL_MS, &mut self.slow_interval_ms),
            (ENV_TIMEOUT_MS, &mut self.total_timeout_ms),
            (ENV_ERROR_LOG_EVERY, &mut self.error_log_every),
        ];
        for (key, slot) in fields {
            if let Some(raw) = lookup(key) {
                *slot = raw.trim().parse().map_err(|_| {
                    config_error(key, "expected an unsigned integer", format!("got {:?}", raw))
                })?;
            }
        }
        self.validate()?;
        Ok(self)
    }
}
