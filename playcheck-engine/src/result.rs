use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::time::Duration;

use crate::capability::AgentOutcome;
use crate::error::ActionError;
use crate::issue::{Issue, IssueType};
use crate::step::{InteractionMode, StepKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MethodUsed {
    Agent,
    Structural,
    None,
}

impl From<InteractionMode> for MethodUsed {
    fn from(mode: InteractionMode) -> Self {
        match mode {
            InteractionMode::Agent => Self::Agent,
            InteractionMode::Structural => Self::Structural,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassifiedError {
    pub issue_type: IssueType,
    pub message: String,
}

impl From<&ActionError> for ClassifiedError {
    fn from(err: &ActionError) -> Self {
        Self {
            issue_type: err.issue_type(),
            message: err.to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentSummary {
    pub message: Option<String>,
    pub steps_executed: Option<u32>,
    pub reported_success: Option<bool>,
}

impl From<AgentOutcome> for AgentSummary {
    fn from(outcome: AgentOutcome) -> Self {
        Self {
            message: outcome.message,
            steps_executed: outcome.steps_executed,
            reported_success: outcome.success,
        }
    }
}

/// Outcome of one dispatched step. Built once and never mutated after the
/// sequencer records it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionResult {
    pub index: usize,
    pub kind: StepKind,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ClassifiedError>,
    #[serde(with = "crate::duration_serde", rename = "execution_ms")]
    pub execution_time: Duration,
    pub timestamp: DateTime<Utc>,
    pub method_used: MethodUsed,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub metadata: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_summary: Option<AgentSummary>,
}

impl ActionResult {
    #[must_use]
    pub fn succeeded(index: usize, kind: StepKind, method: MethodUsed, elapsed: Duration) -> Self {
        Self {
            index,
            kind,
            success: true,
            error: None,
            execution_time: elapsed,
            timestamp: Utc::now(),
            method_used: method,
            metadata: Map::new(),
            agent_summary: None,
        }
    }

    #[must_use]
    pub fn failed(
        index: usize,
        kind: StepKind,
        method: MethodUsed,
        elapsed: Duration,
        error: &ActionError,
    ) -> Self {
        Self {
            success: false,
            error: Some(ClassifiedError::from(error)),
            ..Self::succeeded(index, kind, method, elapsed)
        }
    }

    #[must_use]
    pub fn with_metadata(mut self, metadata: Map<String, Value>) -> Self {
        self.metadata = metadata;
        self
    }

    #[must_use]
    pub fn with_agent_summary(mut self, summary: AgentSummary) -> Self {
        self.agent_summary = Some(summary);
        self
    }

    /// Issue describing this result's failure, if any.
    #[must_use]
    pub fn to_issue(&self) -> Option<Issue> {
        let error = self.error.as_ref()?;
        let issue = Issue::new(
            error.issue_type,
            format!("{} step {} failed: {}", self.kind, self.index, error.message),
        );
        Some(issue.at_action(self.index))
    }
}
