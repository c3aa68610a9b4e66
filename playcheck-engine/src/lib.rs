//! Playcheck Engine
//!
//! Drives a declared sequence of simulated user actions against a live game
//! page and turns the resulting telemetry into a playability score. The
//! browser backend, the scoring model and diagnostic capture are consumed
//! through the traits in [`capability`]; this crate has no WebDriver
//! dependency.

pub mod capability;
pub mod config;
pub mod constants;
pub mod context;
pub mod dispatcher;
pub mod error;
pub mod evaluation;
pub mod fallback;
pub mod issue;
pub mod report;
pub mod result;
pub mod retry;
pub mod sequencer;
pub mod step;

mod duration_serde;

// Re-export commonly used types
pub use capability::{
    ActionTarget, Agent, AgentOutcome, Automation, Capture, ExternalScore, ExtractOptions, Handle,
    PerformOptions, Scorer, ScoringContext,
};
pub use config::{RunConfigError, SequenceRunConfig, parse_run_config, parse_steps};
pub use context::RunContext;
pub use dispatcher::dispatch;
pub use error::ActionError;
pub use evaluation::{
    CacheEntry, CacheError, CacheStore, EvaluationEngine, EvaluationResult, MemoryCache,
    Telemetry, cache_key, combine, heuristic_score,
};
pub use fallback::{Resolution, click_strategies, resolve};
pub use issue::{ErrorContext, Issue, IssueType, classify};
pub use report::{MethodBreakdown, PlaytestReport, build_report, write_json};
pub use result::{ActionResult, AgentSummary, ClassifiedError, MethodUsed};
pub use retry::{RetryPolicy, is_retryable_message, retry};
pub use sequencer::{SequenceOutcome, SequenceStatus, Sequencer};
pub use step::{ActionStep, InteractionMode, StepKind, StepValidationError, ValidatedStep};
