//! Declared action steps and their validation.
//!
//! Steps arrive as JSON objects tagged by `kind`. Unknown kinds fail at parse
//! time; [`ActionStep::validate`] then checks required fields and clamps
//! numeric fields into their documented bounds, producing a
//! [`ValidatedStep`] the dispatcher can execute without further checks.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use thiserror::Error;

use crate::constants::{
    DEFAULT_AGENT_STEPS, DEFAULT_AXIS_DURATION_MS, MAX_AGENT_STEPS, MAX_AXIS_DURATION_MS,
    MAX_HOLD_MS, MAX_PRESS_DELAY_MS, MAX_REPEAT, MAX_WAIT_MS, MIN_AGENT_STEPS, MIN_REPEAT,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InteractionMode {
    Agent,
    Structural,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepKind {
    Wait,
    Click,
    Press,
    Screenshot,
    Observe,
    Agent,
    Axis,
}

impl StepKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Wait => "wait",
            Self::Click => "click",
            Self::Press => "press",
            Self::Screenshot => "screenshot",
            Self::Observe => "observe",
            Self::Agent => "agent",
            Self::Axis => "axis",
        }
    }
}

impl fmt::Display for StepKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

const fn default_repeat() -> u32 {
    1
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ActionStep {
    Wait {
        duration_ms: u64,
    },
    Click {
        target: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        timeout_ms: Option<u64>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        mode: Option<InteractionMode>,
    },
    Press {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        key: Option<String>,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        keys: Vec<String>,
        #[serde(default = "default_repeat")]
        repeat: u32,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        hold_ms: Option<u64>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        delay_ms: Option<u64>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        timeout_ms: Option<u64>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        mode: Option<InteractionMode>,
    },
    Screenshot {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        label: Option<String>,
    },
    Observe {
        elements: Vec<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        timeout_ms: Option<u64>,
    },
    Agent {
        instruction: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        max_steps: Option<u32>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        timeout_ms: Option<u64>,
    },
    Axis {
        #[serde(default)]
        x: f64,
        #[serde(default)]
        y: f64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        duration_ms: Option<u64>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        timeout_ms: Option<u64>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        mode: Option<InteractionMode>,
    },
}

/// Raised when a step cannot be executed at all. Out-of-range numbers are
/// clamped instead of reported here.
#[derive(Debug, Error, PartialEq)]
pub enum StepValidationError {
    #[error("{kind} step requires a non-empty {field}")]
    EmptyField {
        kind: StepKind,
        field: &'static str,
    },
    #[error("{field} must be a finite number")]
    NonFinite { field: &'static str },
    #[error("axis step needs a non-zero x or y")]
    NoDirection,
}

/// A step whose fields have been checked and clamped.
#[derive(Debug, Clone, PartialEq)]
pub enum ValidatedStep {
    Wait {
        duration: Duration,
    },
    Click {
        target: String,
        timeout: Option<Duration>,
        mode: Option<InteractionMode>,
    },
    Press {
        keys: Vec<String>,
        repeat: u32,
        hold: Option<Duration>,
        delay: Duration,
        timeout: Option<Duration>,
        mode: Option<InteractionMode>,
    },
    Screenshot {
        label: Option<String>,
    },
    Observe {
        elements: Vec<String>,
        timeout: Option<Duration>,
    },
    Agent {
        instruction: String,
        max_steps: u32,
        timeout: Option<Duration>,
    },
    Axis {
        x: f64,
        y: f64,
        duration: Duration,
        timeout: Option<Duration>,
        mode: Option<InteractionMode>,
    },
}

fn non_empty(
    value: &str,
    kind: StepKind,
    field: &'static str,
) -> Result<String, StepValidationError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(StepValidationError::EmptyField { kind, field });
    }
    Ok(trimmed.to_string())
}

fn clamp_ms(value: u64, max: u64, field: &str) -> Duration {
    if value > max {
        log::warn!("{field} of {value}ms exceeds {max}ms; clamping");
    }
    Duration::from_millis(value.min(max))
}

fn millis(value: Option<u64>) -> Option<Duration> {
    value.map(Duration::from_millis)
}

impl ActionStep {
    #[must_use]
    pub const fn kind(&self) -> StepKind {
        match self {
            Self::Wait { .. } => StepKind::Wait,
            Self::Click { .. } => StepKind::Click,
            Self::Press { .. } => StepKind::Press,
            Self::Screenshot { .. } => StepKind::Screenshot,
            Self::Observe { .. } => StepKind::Observe,
            Self::Agent { .. } => StepKind::Agent,
            Self::Axis { .. } => StepKind::Axis,
        }
    }

    /// Short human-readable description used in logs and report lines.
    #[must_use]
    pub fn describe(&self) -> String {
        match self {
            Self::Wait { duration_ms } => format!("wait {duration_ms}ms"),
            Self::Click { target, .. } => format!("click '{target}'"),
            Self::Press { key, keys, repeat, .. } => {
                let mut all: Vec<&str> = key.iter().map(String::as_str).collect();
                all.extend(keys.iter().map(String::as_str));
                format!("press {} x{repeat}", all.join("/"))
            }
            Self::Screenshot { label } => {
                format!("screenshot {}", label.as_deref().unwrap_or("(unlabelled)"))
            }
            Self::Observe { elements, .. } => format!("observe {}", elements.join(", ")),
            Self::Agent { instruction, .. } => format!("agent '{instruction}'"),
            Self::Axis { x, y, .. } => format!("axis ({x:.2}, {y:.2})"),
        }
    }

    /// Check required fields and clamp numeric ones.
    ///
    /// # Errors
    ///
    /// Returns an error when a required field is empty or a number is not
    /// finite. Out-of-range values are clamped, never rejected.
    pub fn validate(&self) -> Result<ValidatedStep, StepValidationError> {
        let kind = self.kind();
        match self {
            Self::Wait { duration_ms } => Ok(ValidatedStep::Wait {
                duration: clamp_ms(*duration_ms, MAX_WAIT_MS, "wait"),
            }),
            Self::Click {
                target,
                timeout_ms,
                mode,
            } => Ok(ValidatedStep::Click {
                target: non_empty(target, kind, "target")?,
                timeout: millis(*timeout_ms),
                mode: *mode,
            }),
            Self::Press {
                key,
                keys,
                repeat,
                hold_ms,
                delay_ms,
                timeout_ms,
                mode,
            } => {
                let mut all_keys = Vec::with_capacity(keys.len() + 1);
                for candidate in key.iter().chain(keys.iter()) {
                    all_keys.push(non_empty(candidate, kind, "key")?);
                }
                if all_keys.is_empty() {
                    return Err(StepValidationError::EmptyField { kind, field: "key" });
                }
                if *repeat > MAX_REPEAT {
                    log::warn!("press repeat {repeat} exceeds {MAX_REPEAT}; clamping");
                }
                Ok(ValidatedStep::Press {
                    keys: all_keys,
                    repeat: (*repeat).clamp(MIN_REPEAT, MAX_REPEAT),
                    hold: hold_ms
                        .filter(|ms| *ms > 0)
                        .map(|ms| clamp_ms(ms, MAX_HOLD_MS, "hold")),
                    delay: clamp_ms(delay_ms.unwrap_or(0), MAX_PRESS_DELAY_MS, "press delay"),
                    timeout: millis(*timeout_ms),
                    mode: *mode,
                })
            }
            Self::Screenshot { label } => Ok(ValidatedStep::Screenshot {
                label: label
                    .as_deref()
                    .map(str::trim)
                    .filter(|l| !l.is_empty())
                    .map(str::to_string),
            }),
            Self::Observe {
                elements,
                timeout_ms,
            } => {
                let names: Vec<String> = elements
                    .iter()
                    .map(|e| e.trim())
                    .filter(|e| !e.is_empty())
                    .map(str::to_string)
                    .collect();
                if names.is_empty() {
                    return Err(StepValidationError::EmptyField {
                        kind,
                        field: "elements",
                    });
                }
                Ok(ValidatedStep::Observe {
                    elements: names,
                    timeout: millis(*timeout_ms),
                })
            }
            Self::Agent {
                instruction,
                max_steps,
                timeout_ms,
            } => Ok(ValidatedStep::Agent {
                instruction: non_empty(instruction, kind, "instruction")?,
                max_steps: max_steps
                    .unwrap_or(DEFAULT_AGENT_STEPS)
                    .clamp(MIN_AGENT_STEPS, MAX_AGENT_STEPS),
                timeout: millis(*timeout_ms),
            }),
            Self::Axis {
                x,
                y,
                duration_ms,
                timeout_ms,
                mode,
            } => {
                if !x.is_finite() {
                    return Err(StepValidationError::NonFinite { field: "x" });
                }
                if !y.is_finite() {
                    return Err(StepValidationError::NonFinite { field: "y" });
                }
                if *x == 0.0 && *y == 0.0 {
                    return Err(StepValidationError::NoDirection);
                }
                Ok(ValidatedStep::Axis {
                    x: x.clamp(-1.0, 1.0),
                    y: y.clamp(-1.0, 1.0),
                    duration: clamp_ms(
                        duration_ms.unwrap_or(DEFAULT_AXIS_DURATION_MS),
                        MAX_AXIS_DURATION_MS,
                        "axis duration",
                    ),
                    timeout: millis(*timeout_ms),
                    mode: *mode,
                })
            }
        }
    }
}
