//! Runs an ordered list of steps under one total time budget.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::time::Instant;

use crate::constants::MAX_STEPS;
use crate::context::RunContext;
use crate::dispatcher::dispatch;
use crate::error::ActionError;
use crate::issue::{Issue, IssueType};
use crate::result::{ActionResult, MethodUsed};
use crate::step::ActionStep;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SequenceStatus {
    Completed,
    TimedOut,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SequenceOutcome {
    pub results: Vec<ActionResult>,
    pub issues: Vec<Issue>,
    pub status: SequenceStatus,
    #[serde(with = "crate::duration_serde", rename = "elapsed_ms")]
    pub elapsed: Duration,
    pub dropped_steps: usize,
}

impl SequenceOutcome {
    #[must_use]
    pub fn successful(&self) -> usize {
        self.results.iter().filter(|r| r.success).count()
    }

    #[must_use]
    pub fn failed(&self) -> usize {
        self.results.len() - self.successful()
    }
}

pub struct Sequencer {
    ctx: RunContext,
}

impl Sequencer {
    #[must_use]
    pub const fn new(ctx: RunContext) -> Self {
        Self { ctx }
    }

    /// Execute `steps` strictly in order.
    ///
    /// Individual failures never stop the run; only the total budget does.
    /// Wall-clock time stays within the total timeout plus the final capture
    /// buffer even when a backend call hangs.
    pub async fn run(&self, steps: &[ActionStep]) -> SequenceOutcome {
        let total = self.ctx.config.total_timeout();
        let buffer = self.ctx.config.final_capture_buffer();
        let started = Instant::now();

        let dropped_steps = steps.len().saturating_sub(MAX_STEPS);
        if dropped_steps > 0 {
            log::warn!(
                "sequence has {} steps; only the first {MAX_STEPS} will run",
                steps.len()
            );
        }
        let steps = &steps[..steps.len().min(MAX_STEPS)];

        let mut results = Vec::with_capacity(steps.len());
        let mut issues = Vec::new();
        let mut status = SequenceStatus::Completed;

        for (index, step) in steps.iter().enumerate() {
            let elapsed = started.elapsed();
            if elapsed >= total {
                log::warn!("total budget spent before step {index} ({})", step.describe());
                results.push(budget_exhausted(index, step, total));
                status = SequenceStatus::TimedOut;
                break;
            }

            let bound = total - elapsed + buffer;
            let result = match tokio::time::timeout(bound, dispatch(index, step, &self.ctx)).await
            {
                Ok(result) => result,
                Err(_) => {
                    log::warn!("step {index} overran the remaining budget of {bound:?}");
                    results.push(budget_exhausted(index, step, total));
                    status = SequenceStatus::TimedOut;
                    break;
                }
            };

            if let Some(issue) = result.to_issue() {
                issues.push(issue);
                let limit = (total + buffer)
                    .saturating_sub(started.elapsed())
                    .min(self.ctx.config.action_timeout());
                self.ctx.capture_best_effort("failure", index, limit).await;
            }
            results.push(result);

            let has_more = index + 1 < steps.len();
            if has_more && started.elapsed() >= total.saturating_sub(buffer) {
                log::warn!(
                    "stopping after step {index}: within {buffer:?} of the {total:?} budget"
                );
                status = SequenceStatus::TimedOut;
                break;
            }
        }

        if status == SequenceStatus::TimedOut {
            issues.push(Issue::new(
                IssueType::TotalTimeout,
                format!(
                    "sequence exceeded the total timeout of {}ms after {} of {} steps",
                    total.as_millis(),
                    results.iter().filter(|r| !is_budget_marker(r)).count(),
                    steps.len()
                ),
            ));
        }

        let elapsed = started.elapsed();
        log::info!(
            "sequence finished {status:?}: {}/{} steps succeeded in {elapsed:?}",
            results.iter().filter(|r| r.success).count(),
            results.len()
        );
        SequenceOutcome {
            results,
            issues,
            status,
            elapsed,
            dropped_steps,
        }
    }
}

fn budget_exhausted(index: usize, step: &ActionStep, total: Duration) -> ActionResult {
    let err = ActionError::Budget { budget: total };
    ActionResult::failed(index, step.kind(), MethodUsed::None, Duration::ZERO, &err)
}

fn is_budget_marker(result: &ActionResult) -> bool {
    result
        .error
        .as_ref()
        .is_some_and(|e| e.issue_type == IssueType::TotalTimeout)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capability::{
        ActionTarget, Automation, Capture, ExtractOptions, Handle, PerformOptions,
    };
    use crate::config::SequenceRunConfig;
    use async_trait::async_trait;
    use serde_json::Value;
    use std::sync::Arc;

    /// Every perform call hangs far longer than any budget.
    struct Hanging;

    #[async_trait]
    impl Automation for Hanging {
        async fn locate(&self, _description: &str, _timeout: Duration) -> anyhow::Result<Vec<Handle>> {
            Ok(Vec::new())
        }

        async fn perform(&self, _target: &ActionTarget, _options: PerformOptions) -> anyhow::Result<()> {
            tokio::time::sleep(Duration::from_secs(3_600)).await;
            Ok(())
        }

        async fn extract_structured(
            &self,
            _instruction: &str,
            _schema: &Value,
            _options: &ExtractOptions,
        ) -> anyhow::Result<Value> {
            Ok(Value::Null)
        }
    }

    /// Capture that never returns.
    struct StuckCapture;

    #[async_trait]
    impl Capture for StuckCapture {
        async fn capture_diagnostic(&self, _label: &str, _index: usize) -> anyhow::Result<()> {
            tokio::time::sleep(Duration::from_secs(3_600)).await;
            Ok(())
        }
    }

    struct BrokenCapture;

    #[async_trait]
    impl Capture for BrokenCapture {
        async fn capture_diagnostic(&self, _label: &str, _index: usize) -> anyhow::Result<()> {
            anyhow::bail!("screenshot failed: session gone")
        }
    }

    fn blank_click() -> ActionStep {
        ActionStep::Click {
            target: String::new(),
            timeout_ms: None,
            mode: None,
        }
    }

    fn wait(ms: u64) -> ActionStep {
        ActionStep::Wait { duration_ms: ms }
    }

    fn sequencer(total_ms: u64, buffer_ms: u64) -> Sequencer {
        let config = SequenceRunConfig {
            total_timeout_ms: total_ms,
            final_capture_buffer_ms: buffer_ms,
            ..SequenceRunConfig::default()
        };
        Sequencer::new(RunContext::new(Arc::new(Hanging), config))
    }

    #[tokio::test(start_paused = true)]
    async fn completes_when_budget_allows() {
        let outcome = sequencer(10_000, 1_000).run(&[wait(100), wait(200)]).await;
        assert_eq!(outcome.status, SequenceStatus::Completed);
        assert_eq!(outcome.results.len(), 2);
        assert!(outcome.issues.is_empty());
        assert_eq!(outcome.successful(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn stops_near_budget_with_single_timeout_issue() {
        let steps = vec![wait(5_000); 10];
        let outcome = sequencer(12_000, 2_000).run(&steps).await;
        assert_eq!(outcome.status, SequenceStatus::TimedOut);
        assert!(outcome.results.len() < steps.len());
        let timeouts = outcome
            .issues
            .iter()
            .filter(|i| i.issue_type == IssueType::TotalTimeout)
            .count();
        assert_eq!(timeouts, 1);
        assert!(outcome.elapsed <= Duration::from_millis(14_000));
    }

    #[tokio::test(start_paused = true)]
    async fn hanging_backend_is_cut_off_at_budget_plus_buffer() {
        let click = ActionStep::Click {
            target: "start".into(),
            timeout_ms: Some(3_600_000),
            mode: None,
        };
        let outcome = sequencer(2_000, 500).run(&[click, wait(10)]).await;
        assert_eq!(outcome.status, SequenceStatus::TimedOut);
        assert!(outcome.elapsed <= Duration::from_millis(2_500));
        let last = outcome.results.last().expect("marker result");
        assert!(is_budget_marker(last));
    }

    #[tokio::test(start_paused = true)]
    async fn stuck_failure_capture_stays_within_budget() {
        let config = SequenceRunConfig {
            total_timeout_ms: 10_000,
            final_capture_buffer_ms: 1_000,
            ..SequenceRunConfig::default()
        };
        let ctx = RunContext::new(Arc::new(Hanging), config).with_capture(Arc::new(StuckCapture));
        let outcome = Sequencer::new(ctx).run(&[blank_click(), wait(10)]).await;
        assert!(outcome.elapsed <= Duration::from_millis(11_000));
        assert_eq!(outcome.status, SequenceStatus::TimedOut);
        assert_eq!(outcome.failed(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn failing_capture_does_not_stop_the_run() {
        let ctx = RunContext::new(Arc::new(Hanging), SequenceRunConfig::default())
            .with_capture(Arc::new(BrokenCapture));
        let outcome = Sequencer::new(ctx).run(&[blank_click(), wait(10)]).await;
        assert_eq!(outcome.status, SequenceStatus::Completed);
        assert_eq!(outcome.results.len(), 2);
        assert!(!outcome.results[0].success);
        assert!(outcome.results[1].success);
        assert_eq!(outcome.issues.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn truncates_long_sequences() {
        let steps = vec![wait(0); MAX_STEPS + 7];
        let outcome = sequencer(60_000, 1_000).run(&steps).await;
        assert_eq!(outcome.dropped_steps, 7);
        assert_eq!(outcome.results.len(), MAX_STEPS);
        assert_eq!(outcome.status, SequenceStatus::Completed);
    }

    #[tokio::test(start_paused = true)]
    async fn empty_sequence_completes() {
        let outcome = sequencer(1_000, 100).run(&[]).await;
        assert_eq!(outcome.status, SequenceStatus::Completed);
        assert!(outcome.results.is_empty());
        assert_eq!(outcome.failed(), 0);
    }
}
