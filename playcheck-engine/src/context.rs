//! Explicit per-run context handed to every component.

use std::sync::Arc;
use std::time::Duration;

use crate::capability::{Agent, Automation, Capture};
use crate::config::SequenceRunConfig;
use crate::retry::RetryPolicy;
use crate::step::InteractionMode;

/// Collaborators and budgets for a single run. Constructed once per run so
/// no state leaks between runs.
#[derive(Clone)]
pub struct RunContext {
    pub automation: Arc<dyn Automation>,
    pub agent: Option<Arc<dyn Agent>>,
    pub capture: Option<Arc<dyn Capture>>,
    pub config: SequenceRunConfig,
}

impl RunContext {
    pub fn new(automation: Arc<dyn Automation>, config: SequenceRunConfig) -> Self {
        Self {
            automation,
            agent: None,
            capture: None,
            config,
        }
    }

    #[must_use]
    pub fn with_agent(mut self, agent: Arc<dyn Agent>) -> Self {
        self.agent = Some(agent);
        self
    }

    #[must_use]
    pub fn with_capture(mut self, capture: Arc<dyn Capture>) -> Self {
        self.capture = Some(capture);
        self
    }

    /// Step override, then the sequence default, then structural.
    #[must_use]
    pub fn resolve_mode(&self, step_mode: Option<InteractionMode>) -> InteractionMode {
        step_mode
            .or(self.config.default_mode)
            .unwrap_or(InteractionMode::Structural)
    }

    #[must_use]
    pub fn action_timeout(&self, step_timeout: Option<Duration>) -> Duration {
        step_timeout.unwrap_or_else(|| self.config.action_timeout())
    }

    #[must_use]
    pub const fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::for_action(self.config.action_retries)
    }

    /// Key bound to a direction, falling back to the arrow keys.
    #[must_use]
    pub fn control_key(&self, direction: &str) -> String {
        if let Some(key) = self.config.controls.get(direction) {
            return key.clone();
        }
        match direction {
            "left" => "ArrowLeft",
            "right" => "ArrowRight",
            "up" => "ArrowUp",
            _ => "ArrowDown",
        }
        .to_string()
    }

    /// Best-effort diagnostic capture bounded by `limit`; failures and
    /// overruns are logged and dropped.
    pub async fn capture_best_effort(&self, label: &str, index: usize, limit: Duration) -> bool {
        let Some(capture) = &self.capture else {
            return false;
        };
        match tokio::time::timeout(limit, capture.capture_diagnostic(label, index)).await {
            Ok(Ok(())) => true,
            Ok(Err(err)) => {
                log::warn!("diagnostic capture '{label}' for step {index} failed: {err:#}");
                false
            }
            Err(_) => {
                log::warn!("diagnostic capture '{label}' for step {index} abandoned after {limit:?}");
                false
            }
        }
    }
}
