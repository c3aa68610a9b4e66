mod support;

use chrono::{Duration as ChronoDuration, Utc};
use playcheck_engine::{
    ActionStep, EvaluationEngine, InteractionMode, Issue, IssueType, MemoryCache, MethodUsed,
    PlaytestReport, RetryPolicy, RunContext, SequenceRunConfig, SequenceStatus, Sequencer,
    Telemetry, build_report, is_retryable_message, parse_run_config, retry,
};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use support::{FakeAgent, FakeAutomation, FakeCapture, FakeScorer};

const URL: &str = "https://games.example.test/runner";

fn click(target: &str) -> ActionStep {
    ActionStep::Click {
        target: target.into(),
        timeout_ms: None,
        mode: None,
    }
}

fn press(key: &str, repeat: u32) -> ActionStep {
    ActionStep::Press {
        key: Some(key.into()),
        keys: Vec::new(),
        repeat,
        hold_ms: None,
        delay_ms: None,
        timeout_ms: None,
        mode: None,
    }
}

fn wait(ms: u64) -> ActionStep {
    ActionStep::Wait { duration_ms: ms }
}

async fn playtest(
    automation: Arc<FakeAutomation>,
    config: SequenceRunConfig,
    extra_issues: Vec<Issue>,
) -> PlaytestReport {
    let ctx = RunContext::new(automation, config.clone());
    let outcome = Sequencer::new(ctx).run(&config.steps).await;
    let mut issues = outcome.issues.clone();
    issues.extend(extra_issues.iter().cloned());
    let telemetry = Telemetry {
        load_check_passed: true,
        issues,
        ..Telemetry::default()
    };
    let evaluation = EvaluationEngine::new(URL)
        .evaluate(&outcome.results, &telemetry, &config)
        .await;
    build_report(URL, &outcome, &evaluation, &extra_issues)
}

#[tokio::test(start_paused = true)]
async fn all_steps_succeeding_passes_with_full_score() {
    let automation = Arc::new(FakeAutomation::new().visible("start button"));
    let config = SequenceRunConfig::with_steps(vec![click("Start"), press("Space", 2), wait(100)]);
    let report = playtest(automation.clone(), config, Vec::new()).await;

    assert!(report.passed);
    assert_eq!(report.status, SequenceStatus::Completed);
    assert!(report.issues.is_empty());
    assert!((report.evaluation.heuristic_score - 1.0).abs() < 1e-9);
    assert_eq!(report.method_breakdown.structural, 2);
    assert_eq!(report.method_breakdown.none, 1);
    // one click plus two key presses
    assert_eq!(automation.calls(), 3);
}

#[tokio::test(start_paused = true)]
async fn timeout_failure_is_classified_and_lowers_score() {
    let clean_config =
        SequenceRunConfig::with_steps(vec![click("Start"), press("Space", 1), wait(100)]);
    let clean = playtest(
        Arc::new(FakeAutomation::new().visible("start button")),
        clean_config,
        Vec::new(),
    )
    .await;

    let automation = Arc::new(
        FakeAutomation::new()
            .visible("start button")
            .failing("Boom", "navigation timeout while pressing"),
    );
    let config = SequenceRunConfig::with_steps(vec![click("Start"), press("Boom", 1), wait(100)]);
    let report = playtest(automation.clone(), config, Vec::new()).await;

    assert!(!report.passed);
    assert_eq!(report.issues.len(), 1);
    assert_eq!(report.issues[0].issue_type, IssueType::ActionTimeout);
    assert_eq!(report.issues[0].action_index, Some(1));
    assert!(report.score < clean.score);
    // click once, then 1 + 2 retries on the timed-out press
    assert_eq!(automation.calls(), 4);
    assert_eq!(report.evaluation.issues, vec!["1 of 3 actions failed"]);
}

#[tokio::test(start_paused = true)]
async fn browser_crash_applies_stability_penalty() {
    let automation = Arc::new(FakeAutomation::new().visible("start button"));
    let config = SequenceRunConfig::with_steps(vec![click("Start"), wait(10), wait(10)]);
    let crash = Issue::new(IssueType::BrowserCrash, "target closed unexpectedly");
    let report = playtest(automation, config, vec![crash]).await;

    assert!(!report.passed);
    assert!(report.score < 0.5);
    assert!(
        report
            .evaluation
            .issues
            .contains(&"stability-breaking issue recorded".to_string())
    );
}

#[tokio::test(start_paused = true)]
async fn non_retryable_errors_run_once_and_surface_unchanged() {
    let calls = AtomicUsize::new(0);
    let result: Result<(), String> = retry(
        RetryPolicy::for_action(2),
        |err: &String| is_retryable_message(err),
        || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err("element is obscured by an overlay".to_string()) }
        },
    )
    .await;
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(result, Err("element is obscured by an overlay".to_string()));
}

#[tokio::test(start_paused = true)]
async fn oversized_repeat_is_clamped_before_execution() {
    let automation = Arc::new(FakeAutomation::new());
    let config = SequenceRunConfig::with_steps(vec![press("ArrowUp", 500)]);
    let report = playtest(automation.clone(), config, Vec::new()).await;
    assert!(report.passed);
    assert_eq!(automation.calls(), 100);
}

#[tokio::test(start_paused = true)]
async fn elapsed_time_stays_within_budget_and_buffer() {
    let automation = Arc::new(FakeAutomation::new().slow(Duration::from_secs(4)));
    let config = SequenceRunConfig {
        steps: vec![press("Space", 1); 20],
        total_timeout_ms: 10_000,
        final_capture_buffer_ms: 1_000,
        ..SequenceRunConfig::default()
    };
    let ctx = RunContext::new(automation, config.clone());
    let outcome = Sequencer::new(ctx).run(&config.steps).await;

    assert_eq!(outcome.status, SequenceStatus::TimedOut);
    assert!(outcome.elapsed <= Duration::from_millis(11_000));
    let timeouts = outcome
        .issues
        .iter()
        .filter(|i| i.issue_type == IssueType::TotalTimeout)
        .count();
    assert_eq!(timeouts, 1);
}

#[tokio::test(start_paused = true)]
async fn failures_request_diagnostic_capture() {
    let automation = Arc::new(FakeAutomation::new().failing("Enter", "element obscured"));
    let capture = Arc::new(FakeCapture::default());
    let config = SequenceRunConfig::with_steps(vec![wait(5), press("Enter", 1)]);
    let ctx = RunContext::new(automation, config.clone()).with_capture(capture.clone());
    let outcome = Sequencer::new(ctx).run(&config.steps).await;

    assert_eq!(outcome.failed(), 1);
    assert_eq!(
        capture.labels.lock().unwrap().as_slice(),
        &[("failure".to_string(), 1)]
    );
}

#[tokio::test(start_paused = true)]
async fn agent_default_mode_routes_interactions_to_agent() {
    let automation = Arc::new(FakeAutomation::new());
    let agent = Arc::new(FakeAgent::default());
    let config = parse_run_config(
        r#"{
            "default_mode": "agent",
            "steps": [
                {"kind": "click", "target": "the Start"},
                {"kind": "press", "key": "Space", "mode": "structural"},
                {"kind": "agent", "instruction": "reach level two", "max_steps": 5}
            ]
        }"#,
    )
    .expect("valid config");
    let ctx = RunContext::new(automation.clone(), config.clone()).with_agent(agent.clone());
    let outcome = Sequencer::new(ctx).run(&config.steps).await;

    assert_eq!(outcome.successful(), 3);
    let methods: Vec<MethodUsed> = outcome.results.iter().map(|r| r.method_used).collect();
    assert_eq!(
        methods,
        vec![MethodUsed::Agent, MethodUsed::Structural, MethodUsed::Agent]
    );
    assert_eq!(
        agent.instructions.lock().unwrap().as_slice(),
        &["click the start".to_string(), "reach level two".to_string()]
    );
    assert_eq!(automation.calls(), 1);
    assert_eq!(config.default_mode, Some(InteractionMode::Agent));
}

mod evaluation_cache {
    use super::*;

    async fn sample_results() -> (Vec<playcheck_engine::ActionResult>, SequenceRunConfig) {
        let automation = Arc::new(FakeAutomation::new().failing("Boom", "element obscured"));
        let config = SequenceRunConfig::with_steps(vec![wait(10), press("Boom", 1)]);
        let ctx = RunContext::new(automation, config.clone());
        let outcome = Sequencer::new(ctx).run(&config.steps).await;
        (outcome.results, config)
    }

    fn telemetry() -> Telemetry {
        Telemetry {
            load_check_passed: true,
            ..Telemetry::default()
        }
    }

    #[tokio::test(start_paused = true)]
    async fn second_evaluation_hits_cache_with_identical_score() {
        let (results, config) = sample_results().await;
        let scorer = Arc::new(FakeScorer::returning(0.9, 0.8));
        let engine = EvaluationEngine::new(URL)
            .with_scorer(scorer.clone())
            .with_cache(Arc::new(MemoryCache::new()));

        let first = engine.evaluate(&results, &telemetry(), &config).await;
        let second = engine.evaluate(&results, &telemetry(), &config).await;

        assert!(!first.cache_hit);
        assert!(second.cache_hit);
        assert_eq!(scorer.calls(), 1);
        assert_eq!(first.final_score, second.final_score);
        assert_eq!(first.external_score, Some(0.9));
        assert_eq!(
            second.issues,
            vec!["1 of 2 actions failed", "controls feel sluggish"]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn expired_entries_are_rescored() {
        let (results, config) = sample_results().await;
        let scorer = Arc::new(FakeScorer::returning(0.6, 0.3));
        let engine = EvaluationEngine::new(URL)
            .with_scorer(scorer.clone())
            .with_cache(Arc::new(MemoryCache::new()));

        let now = Utc::now();
        engine.evaluate_at(&results, &telemetry(), &config, now).await;
        let later = engine
            .evaluate_at(&results, &telemetry(), &config, now + ChronoDuration::hours(25))
            .await;
        assert!(!later.cache_hit);
        assert_eq!(scorer.calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn scorer_failure_falls_back_to_heuristic() {
        let (results, config) = sample_results().await;
        let engine = EvaluationEngine::new(URL).with_scorer(Arc::new(FakeScorer::broken()));
        let evaluation = engine.evaluate(&results, &telemetry(), &config).await;
        assert_eq!(evaluation.final_score, evaluation.heuristic_score);
        assert!(evaluation.external_score.is_none());
        assert!(!evaluation.cache_hit);
    }
}
