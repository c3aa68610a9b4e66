//! Limits and tuning constants for the action engine and the heuristic scorer.
//!
//! Everything that shapes observable behaviour (clamps, budgets, weights)
//! lives here so that a change to the scoring math is a reviewed code change.

use std::time::Duration;

// Sequencing ---------------------------------------------------------------
pub const MAX_STEPS: usize = 100;
pub const DEFAULT_ACTION_TIMEOUT_MS: u64 = 10_000;
pub const DEFAULT_ACTION_RETRIES: u32 = 2;
pub const DEFAULT_TOTAL_TIMEOUT_MS: u64 = 120_000;
pub const DEFAULT_FINAL_CAPTURE_BUFFER_MS: u64 = 5_000;

// Step clamps --------------------------------------------------------------
pub const MIN_REPEAT: u32 = 1;
pub const MAX_REPEAT: u32 = 100;
pub const MAX_HOLD_MS: u64 = 10_000;
pub const MAX_WAIT_MS: u64 = 60_000;
pub const MAX_PRESS_DELAY_MS: u64 = 5_000;
pub const MAX_AXIS_DURATION_MS: u64 = 10_000;
pub const DEFAULT_AXIS_DURATION_MS: u64 = 500;
pub const MIN_AGENT_STEPS: u32 = 1;
pub const MAX_AGENT_STEPS: u32 = 50;
pub const DEFAULT_AGENT_STEPS: u32 = 10;

/// Interval between discrete presses while a key is "held".
pub const HOLD_PRESS_INTERVAL: Duration = Duration::from_millis(50);

// Agent budgeting ----------------------------------------------------------
pub const AGENT_ACTION_TIMEOUT_MULTIPLIER: u32 = 2;
pub const AGENT_ACTION_TIMEOUT_FLOOR: Duration = Duration::from_secs(30);
pub const AGENT_TASK_TIMEOUT_MULTIPLIER: u32 = 8;

// Retry backoff ------------------------------------------------------------
pub const RETRY_BASE_DELAY: Duration = Duration::from_millis(500);
pub const RETRY_MAX_DELAY: Duration = Duration::from_secs(5);

// Heuristic scoring --------------------------------------------------------
pub const ERROR_PENALTY: f64 = 0.1;
pub const CRITICAL_ERROR_PENALTY: f64 = 0.2;
pub const MAX_ISSUE_PENALTY: f64 = 0.5;
pub const LOAD_FAILURE_MULTIPLIER: f64 = 0.5;
pub const STABILITY_MULTIPLIER: f64 = 0.3;
pub const RESPONSIVENESS_BASE: f64 = 0.8;
pub const RESPONSIVENESS_WEIGHT: f64 = 0.2;
pub const TERMINAL_STATE_BONUS: f64 = 0.1;

// Score blending -----------------------------------------------------------
pub const CONFIDENT_EXTERNAL_WEIGHT: f64 = 0.4;
pub const HESITANT_EXTERNAL_WEIGHT: f64 = 0.2;
pub const CONFIDENCE_THRESHOLD: f64 = 0.5;

// Caching ------------------------------------------------------------------
pub const CACHE_TTL_SECS: i64 = 24 * 60 * 60;
pub const CACHE_KEY_SEGMENT_LEN: usize = 16;
