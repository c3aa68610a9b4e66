//! Per-run configuration: the ordered steps plus the timing budgets that
//! govern how they are executed.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;
use thiserror::Error;

use crate::constants::{
    DEFAULT_ACTION_RETRIES, DEFAULT_ACTION_TIMEOUT_MS, DEFAULT_FINAL_CAPTURE_BUFFER_MS,
    DEFAULT_TOTAL_TIMEOUT_MS,
};
use crate::step::{ActionStep, InteractionMode};

/// Errors raised when a run configuration is malformed or out of range.
#[derive(Debug, Error)]
pub enum RunConfigError {
    #[error("{field} must be greater than zero")]
    Zero { field: &'static str },
    #[error("final capture buffer {buffer_ms}ms must be below total timeout {total_ms}ms")]
    BufferExceedsBudget { buffer_ms: u64, total_ms: u64 },
    #[error("control mapping for '{direction}' is empty")]
    EmptyControl { direction: String },
    #[error("unknown control direction '{0}' (expected left, right, up or down)")]
    UnknownDirection(String),
    #[error("could not parse steps: {0}")]
    Parse(#[from] serde_json::Error),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SequenceRunConfig {
    #[serde(default)]
    pub steps: Vec<ActionStep>,
    #[serde(default = "SequenceRunConfig::default_action_timeout_ms")]
    pub action_timeout_ms: u64,
    #[serde(default = "SequenceRunConfig::default_action_retries")]
    pub action_retries: u32,
    #[serde(default = "SequenceRunConfig::default_total_timeout_ms")]
    pub total_timeout_ms: u64,
    #[serde(default = "SequenceRunConfig::default_final_capture_buffer_ms")]
    pub final_capture_buffer_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_mode: Option<InteractionMode>,
    /// Direction (`left`, `right`, `up`, `down`) to key name.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub controls: BTreeMap<String, String>,
}

impl SequenceRunConfig {
    const fn default_action_timeout_ms() -> u64 {
        DEFAULT_ACTION_TIMEOUT_MS
    }

    const fn default_action_retries() -> u32 {
        DEFAULT_ACTION_RETRIES
    }

    const fn default_total_timeout_ms() -> u64 {
        DEFAULT_TOTAL_TIMEOUT_MS
    }

    const fn default_final_capture_buffer_ms() -> u64 {
        DEFAULT_FINAL_CAPTURE_BUFFER_MS
    }

    #[must_use]
    pub fn with_steps(steps: Vec<ActionStep>) -> Self {
        Self {
            steps,
            ..Self::default()
        }
    }

    #[must_use]
    pub const fn action_timeout(&self) -> Duration {
        Duration::from_millis(self.action_timeout_ms)
    }

    #[must_use]
    pub const fn total_timeout(&self) -> Duration {
        Duration::from_millis(self.total_timeout_ms)
    }

    #[must_use]
    pub const fn final_capture_buffer(&self) -> Duration {
        Duration::from_millis(self.final_capture_buffer_ms)
    }

    /// Validate timing budgets and the control mapping.
    ///
    /// # Errors
    ///
    /// Returns the first constraint that does not hold.
    pub fn validate(&self) -> Result<(), RunConfigError> {
        if self.action_timeout_ms == 0 {
            return Err(RunConfigError::Zero {
                field: "action_timeout_ms",
            });
        }
        if self.total_timeout_ms == 0 {
            return Err(RunConfigError::Zero {
                field: "total_timeout_ms",
            });
        }
        if self.final_capture_buffer_ms >= self.total_timeout_ms {
            return Err(RunConfigError::BufferExceedsBudget {
                buffer_ms: self.final_capture_buffer_ms,
                total_ms: self.total_timeout_ms,
            });
        }
        for (direction, key) in &self.controls {
            if !matches!(direction.as_str(), "left" | "right" | "up" | "down") {
                return Err(RunConfigError::UnknownDirection(direction.clone()));
            }
            if key.trim().is_empty() {
                return Err(RunConfigError::EmptyControl {
                    direction: direction.clone(),
                });
            }
        }
        Ok(())
    }
}

impl Default for SequenceRunConfig {
    fn default() -> Self {
        Self {
            steps: Vec::new(),
            action_timeout_ms: Self::default_action_timeout_ms(),
            action_retries: Self::default_action_retries(),
            total_timeout_ms: Self::default_total_timeout_ms(),
            final_capture_buffer_ms: Self::default_final_capture_buffer_ms(),
            default_mode: None,
            controls: BTreeMap::new(),
        }
    }
}

/// Parse a JSON array of steps.
///
/// # Errors
///
/// Fails on malformed JSON or an unknown step `kind`.
pub fn parse_steps(json: &str) -> Result<Vec<ActionStep>, RunConfigError> {
    Ok(serde_json::from_str(json)?)
}

/// Parse either a bare step array or a full run configuration object, then
/// validate it.
///
/// # Errors
///
/// Fails on malformed JSON, an unknown step `kind`, or an invalid budget.
pub fn parse_run_config(json: &str) -> Result<SequenceRunConfig, RunConfigError> {
    let trimmed = json.trim_start();
    let config = if trimmed.starts_with('[') {
        SequenceRunConfig::with_steps(parse_steps(trimmed)?)
    } else {
        serde_json::from_str(trimmed)?
    };
    config.validate()?;
    Ok(config)
}
