//! Narrow interfaces to the collaborators the engine drives: the browser
//! automation backend, an optional instruction-following agent, an optional
//! external scorer, and diagnostic capture.

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;

use crate::step::InteractionMode;

/// Opaque reference to a located element, meaningful only to the backend
/// that produced it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Handle(pub String);

impl Handle {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    #[must_use]
    pub fn id(&self) -> &str {
        &self.0
    }
}

/// What a single `perform` call acts on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActionTarget {
    Handle(Handle),
    Key(String),
    Instruction(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PerformOptions {
    pub timeout: Duration,
    pub mode_hint: InteractionMode,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractOptions {
    pub selector: Option<String>,
    pub timeout: Duration,
}

#[async_trait]
pub trait Automation: Send + Sync {
    /// Find elements matching a natural-language description.
    async fn locate(&self, description: &str, timeout: Duration) -> Result<Vec<Handle>>;

    async fn perform(&self, target: &ActionTarget, options: PerformOptions) -> Result<()>;

    async fn extract_structured(
        &self,
        instruction: &str,
        schema: &Value,
        options: &ExtractOptions,
    ) -> Result<Value>;
}

/// Self-reported outcome of a multi-step agent task.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentOutcome {
    pub message: Option<String>,
    pub steps_executed: Option<u32>,
    pub success: Option<bool>,
}

#[async_trait]
pub trait Agent: Send + Sync {
    /// Carry out one bounded instruction ("click the start button").
    async fn act(&self, instruction: &str, timeout: Duration) -> Result<()>;

    async fn run_agent_task(
        &self,
        instruction: &str,
        max_steps: u32,
        timeout: Duration,
    ) -> Result<AgentOutcome>;
}

/// Input handed to an external scorer.
#[derive(Debug, Clone, Serialize)]
pub struct ScoringContext {
    pub url: String,
    pub heuristic_score: f64,
    pub total_actions: usize,
    pub successful_actions: usize,
    pub issues: Vec<String>,
    pub action_log: Vec<String>,
    pub terminal_state: Option<Value>,
}

/// Raw result from an external scorer. This is what the evaluation cache
/// stores, not the blended score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExternalScore {
    pub score: f64,
    #[serde(default)]
    pub issues: Vec<String>,
    pub confidence: f64,
    #[serde(default)]
    pub token_usage: u64,
}

#[async_trait]
pub trait Scorer: Send + Sync {
    async fn score(&self, context: &ScoringContext) -> Result<ExternalScore>;
}

#[async_trait]
pub trait Capture: Send + Sync {
    /// Best-effort diagnostic capture; callers log and discard failures.
    async fn capture_diagnostic(&self, label: &str, index: usize) -> Result<()>;
}
