//! Final structured report for one playtest run.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::evaluation::EvaluationResult;
use crate::issue::Issue;
use crate::result::{ActionResult, AgentSummary, ClassifiedError, MethodUsed};
use crate::sequencer::{SequenceOutcome, SequenceStatus};
use crate::step::StepKind;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MethodBreakdown {
    pub agent: usize,
    pub structural: usize,
    pub none: usize,
}

impl MethodBreakdown {
    #[must_use]
    pub fn from_results(results: &[ActionResult]) -> Self {
        let mut breakdown = Self::default();
        for result in results {
            match result.method_used {
                MethodUsed::Agent => breakdown.agent += 1,
                MethodUsed::Structural => breakdown.structural += 1,
                MethodUsed::None => breakdown.none += 1,
            }
        }
        breakdown
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionTiming {
    pub index: usize,
    pub kind: StepKind,
    pub success: bool,
    pub execution_ms: u64,
    pub method: MethodUsed,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ClassifiedError>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexedAgentSummary {
    pub index: usize,
    #[serde(flatten)]
    pub summary: AgentSummary,
}

impl IndexedAgentSummary {
    /// One-line text for human-facing reports.
    #[must_use]
    pub fn describe(&self) -> String {
        let mut text = self.summary.message.clone().unwrap_or_else(|| {
            match self.summary.steps_executed {
                Some(steps) => format!("agent finished after {steps} steps"),
                None => "agent finished".to_string(),
            }
        });
        if self.summary.reported_success == Some(false) {
            text.push_str(" (reported failure)");
        }
        text
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlaytestReport {
    pub url: String,
    pub generated_at: DateTime<Utc>,
    /// False whenever any issue was recorded, regardless of score.
    pub passed: bool,
    pub status: SequenceStatus,
    pub score: f64,
    pub evaluation: EvaluationResult,
    pub issues: Vec<Issue>,
    pub actions: Vec<ActionTiming>,
    pub method_breakdown: MethodBreakdown,
    pub agent_summaries: Vec<IndexedAgentSummary>,
    pub elapsed_ms: u64,
    pub dropped_steps: usize,
}

impl PlaytestReport {
    #[must_use]
    pub fn failed_actions(&self) -> usize {
        self.actions.iter().filter(|a| !a.success).count()
    }
}

fn millis(duration: std::time::Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

/// Assemble the report from sequencer output, the evaluation and any issues
/// raised outside the sequence (load check, session setup).
#[must_use]
pub fn build_report(
    url: &str,
    outcome: &SequenceOutcome,
    evaluation: &EvaluationResult,
    external_issues: &[Issue],
) -> PlaytestReport {
    let mut issues = outcome.issues.clone();
    issues.extend_from_slice(external_issues);

    let actions = outcome
        .results
        .iter()
        .map(|r| ActionTiming {
            index: r.index,
            kind: r.kind,
            success: r.success,
            execution_ms: millis(r.execution_time),
            method: r.method_used,
            error: r.error.clone(),
        })
        .collect();

    let agent_summaries = outcome
        .results
        .iter()
        .filter_map(|r| {
            r.agent_summary.as_ref().map(|summary| IndexedAgentSummary {
                index: r.index,
                summary: summary.clone(),
            })
        })
        .collect();

    PlaytestReport {
        url: url.to_string(),
        generated_at: Utc::now(),
        passed: issues.is_empty(),
        status: outcome.status,
        score: evaluation.final_score,
        evaluation: evaluation.clone(),
        issues,
        actions,
        method_breakdown: MethodBreakdown::from_results(&outcome.results),
        agent_summaries,
        elapsed_ms: millis(outcome.elapsed),
        dropped_steps: outcome.dropped_steps,
    }
}

/// Write `report.json` into `dir`, creating it if needed.
///
/// # Errors
///
/// Fails if the directory cannot be created or the file cannot be written.
pub fn write_json(report: &PlaytestReport, dir: &Path) -> Result<PathBuf> {
    fs::create_dir_all(dir).with_context(|| format!("creating report dir {}", dir.display()))?;
    let path = dir.join("report.json");
    let json = serde_json::to_string_pretty(report).context("serializing report")?;
    fs::write(&path, json).with_context(|| format!("writing {}", path.display()))?;
    Ok(path)
}
