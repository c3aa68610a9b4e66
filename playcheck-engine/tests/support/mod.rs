#![allow(dead_code)]

use anyhow::{Result, bail};
use async_trait::async_trait;
use playcheck_engine::{
    ActionTarget, Agent, AgentOutcome, Automation, Capture, ExternalScore, ExtractOptions, Handle,
    PerformOptions, Scorer, ScoringContext,
};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

/// Scripted automation backend: locates only the descriptions it was told
/// about and fails performs whose target mentions a scripted word.
#[derive(Default)]
pub struct FakeAutomation {
    pub visible: Vec<String>,
    pub failures: HashMap<String, String>,
    pub perform_delay: Option<Duration>,
    pub performed: Mutex<Vec<ActionTarget>>,
    pub perform_calls: AtomicUsize,
}

impl FakeAutomation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn visible(mut self, description: &str) -> Self {
        self.visible.push(description.to_string());
        self
    }

    pub fn failing(mut self, word: &str, message: &str) -> Self {
        self.failures.insert(word.to_string(), message.to_string());
        self
    }

    pub fn slow(mut self, delay: Duration) -> Self {
        self.perform_delay = Some(delay);
        self
    }

    pub fn calls(&self) -> usize {
        self.perform_calls.load(Ordering::SeqCst)
    }
}

fn target_text(target: &ActionTarget) -> &str {
    match target {
        ActionTarget::Handle(handle) => handle.id(),
        ActionTarget::Key(key) => key,
        ActionTarget::Instruction(text) => text,
    }
}

#[async_trait]
impl Automation for FakeAutomation {
    async fn locate(&self, description: &str, _timeout: Duration) -> Result<Vec<Handle>> {
        Ok(self
            .visible
            .iter()
            .filter(|v| v.as_str() == description)
            .map(|v| Handle::new(v.clone()))
            .collect())
    }

    async fn perform(&self, target: &ActionTarget, _options: PerformOptions) -> Result<()> {
        self.perform_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.perform_delay {
            tokio::time::sleep(delay).await;
        }
        let text = target_text(target);
        for (word, message) in &self.failures {
            if text.contains(word.as_str()) {
                bail!("{message}");
            }
        }
        self.performed.lock().unwrap().push(target.clone());
        Ok(())
    }

    async fn extract_structured(
        &self,
        _instruction: &str,
        _schema: &Value,
        _options: &ExtractOptions,
    ) -> Result<Value> {
        Ok(serde_json::json!({ "screen": "title" }))
    }
}

#[derive(Default)]
pub struct FakeAgent {
    pub instructions: Mutex<Vec<String>>,
}

#[async_trait]
impl Agent for FakeAgent {
    async fn act(&self, instruction: &str, _timeout: Duration) -> Result<()> {
        self.instructions.lock().unwrap().push(instruction.to_string());
        Ok(())
    }

    async fn run_agent_task(
        &self,
        instruction: &str,
        max_steps: u32,
        _timeout: Duration,
    ) -> Result<AgentOutcome> {
        self.instructions.lock().unwrap().push(instruction.to_string());
        Ok(AgentOutcome {
            message: Some(format!("finished '{instruction}'")),
            steps_executed: Some(max_steps),
            success: Some(true),
        })
    }
}

#[derive(Default)]
pub struct FakeCapture {
    pub labels: Mutex<Vec<(String, usize)>>,
}

#[async_trait]
impl Capture for FakeCapture {
    async fn capture_diagnostic(&self, label: &str, index: usize) -> Result<()> {
        self.labels.lock().unwrap().push((label.to_string(), index));
        Ok(())
    }
}

/// Scorer returning a fixed payload and counting its calls.
pub struct FakeScorer {
    pub payload: ExternalScore,
    pub fail: bool,
    pub calls: AtomicUsize,
}

impl FakeScorer {
    pub fn returning(score: f64, confidence: f64) -> Self {
        Self {
            payload: ExternalScore {
                score,
                issues: vec!["controls feel sluggish".to_string()],
                confidence,
                token_usage: 128,
            },
            fail: false,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn broken() -> Self {
        Self {
            fail: true,
            ..Self::returning(0.0, 0.0)
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Scorer for FakeScorer {
    async fn score(&self, _context: &ScoringContext) -> Result<ExternalScore> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            bail!("scoring backend unavailable");
        }
        Ok(self.payload.clone())
    }
}
