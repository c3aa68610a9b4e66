//! Turns sequencer results into a playability score.

mod blend;
mod cache;
mod heuristic;

pub use blend::combine;
pub use cache::{CacheEntry, CacheError, CacheStore, MemoryCache, cache_key};
pub use heuristic::{heuristic_findings, heuristic_score};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;

use crate::capability::{ExternalScore, Scorer, ScoringContext};
use crate::config::SequenceRunConfig;
use crate::issue::Issue;
use crate::result::ActionResult;

/// Evaluation input that does not come from the action results themselves.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Telemetry {
    pub console_error_count: usize,
    pub critical_error_count: usize,
    pub load_check_passed: bool,
    pub terminal_state_reached: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub terminal_state: Option<Value>,
    /// Every issue recorded for the run, load and sequence alike.
    #[serde(default)]
    pub issues: Vec<Issue>,
}

impl Telemetry {
    #[must_use]
    pub fn has_stability_break(&self) -> bool {
        self.issues.iter().any(|i| i.issue_type.breaks_stability())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationResult {
    pub heuristic_score: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub external_score: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub external_confidence: Option<f64>,
    pub final_score: f64,
    pub issues: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub terminal_state: Option<Value>,
    pub cache_hit: bool,
    #[serde(default)]
    pub token_usage: u64,
}

pub struct EvaluationEngine {
    url: String,
    scorer: Option<Arc<dyn Scorer>>,
    cache: Option<Arc<dyn CacheStore>>,
}

impl EvaluationEngine {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            scorer: None,
            cache: None,
        }
    }

    #[must_use]
    pub fn with_scorer(mut self, scorer: Arc<dyn Scorer>) -> Self {
        self.scorer = Some(scorer);
        self
    }

    #[must_use]
    pub fn with_cache(mut self, cache: Arc<dyn CacheStore>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub async fn evaluate(
        &self,
        results: &[ActionResult],
        telemetry: &Telemetry,
        config: &SequenceRunConfig,
    ) -> EvaluationResult {
        self.evaluate_at(results, telemetry, config, Utc::now()).await
    }

    /// Evaluate as of `now`. Scorer and cache failures fall back to the
    /// heuristic score; they never fail the evaluation.
    pub async fn evaluate_at(
        &self,
        results: &[ActionResult],
        telemetry: &Telemetry,
        config: &SequenceRunConfig,
        now: DateTime<Utc>,
    ) -> EvaluationResult {
        let heuristic = heuristic_score(results, telemetry);
        let mut findings = heuristic_findings(results, telemetry);

        let (external, cache_hit) = match &self.scorer {
            Some(scorer) => {
                let key = cache_key(&self.url, config, results);
                match self.cached(&key, now).await {
                    Some(external) => (Some(external), true),
                    None => {
                        let context = self.scoring_context(heuristic, results, telemetry);
                        match scorer.score(&context).await {
                            Ok(external) => {
                                self.store(CacheEntry::new(key, external.clone(), now)).await;
                                (Some(external), false)
                            }
                            Err(err) => {
                                log::warn!("external scoring failed, using heuristic only: {err:#}");
                                (None, false)
                            }
                        }
                    }
                }
            }
            None => (None, false),
        };

        let final_score = combine(heuristic, external.as_ref());
        if let Some(external) = &external {
            findings.extend(external.issues.iter().cloned());
        }
        log::debug!(
            "evaluation: heuristic {heuristic:.3}, final {final_score:.3}, cache hit {cache_hit}"
        );

        EvaluationResult {
            heuristic_score: heuristic,
            external_score: external.as_ref().map(|e| e.score),
            external_confidence: external.as_ref().map(|e| e.confidence),
            final_score,
            issues: findings,
            terminal_state: telemetry.terminal_state.clone(),
            cache_hit,
            token_usage: external.as_ref().map_or(0, |e| e.token_usage),
        }
    }

    async fn cached(&self, key: &str, now: DateTime<Utc>) -> Option<ExternalScore> {
        let cache = self.cache.as_ref()?;
        match cache.get(key).await {
            Ok(Some(entry)) if entry.is_fresh(now) => {
                log::debug!("evaluation cache hit for {key}");
                Some(entry.external)
            }
            Ok(Some(_)) => {
                log::debug!("evaluation cache entry {key} expired");
                None
            }
            Ok(None) => None,
            Err(err) => {
                log::warn!("evaluation cache read failed for {key}: {err}");
                None
            }
        }
    }

    async fn store(&self, entry: CacheEntry) {
        let Some(cache) = &self.cache else {
            return;
        };
        if let Err(err) = cache.put(&entry).await {
            log::warn!("evaluation cache write failed for {}: {err}", entry.key);
        }
    }

    fn scoring_context(
        &self,
        heuristic: f64,
        results: &[ActionResult],
        telemetry: &Telemetry,
    ) -> ScoringContext {
        let action_log = results
            .iter()
            .map(|r| match &r.error {
                None => format!("#{} {}: ok in {}ms", r.index, r.kind, r.execution_time.as_millis()),
                Some(err) => format!("#{} {}: failed ({})", r.index, r.kind, err.message),
            })
            .collect();
        ScoringContext {
            url: self.url.clone(),
            heuristic_score: heuristic,
            total_actions: results.len(),
            successful_actions: results.iter().filter(|r| r.success).count(),
            issues: telemetry
                .issues
                .iter()
                .map(|i| format!("{}: {}", i.issue_type, i.description))
                .collect(),
            action_log,
            terminal_state: telemetry.terminal_state.clone(),
        }
    }
}
