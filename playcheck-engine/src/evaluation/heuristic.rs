use crate::constants::{
    CRITICAL_ERROR_PENALTY, ERROR_PENALTY, LOAD_FAILURE_MULTIPLIER, MAX_ISSUE_PENALTY,
    RESPONSIVENESS_BASE, RESPONSIVENESS_WEIGHT, STABILITY_MULTIPLIER, TERMINAL_STATE_BONUS,
};
use crate::result::ActionResult;

use super::Telemetry;

/// Deterministic playability estimate in `[0, 1]`.
///
/// With no actions the success ratio is zero, so only the terminal-state
/// bonus can lift the score.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn heuristic_score(results: &[ActionResult], telemetry: &Telemetry) -> f64 {
    let total = results.len();
    let successful = results.iter().filter(|r| r.success).count();

    let success_ratio = if total == 0 {
        0.0
    } else {
        successful as f64 / total as f64
    };
    let denominator = total.max(1) as f64;

    let weighted_issues: f64 = telemetry.issues.iter().map(|i| i.issue_type.weight()).sum();
    let issue_penalty = (weighted_issues / denominator).min(MAX_ISSUE_PENALTY);

    let responsiveness = (1.0
        - (telemetry.console_error_count as f64 * ERROR_PENALTY
            + telemetry.critical_error_count as f64 * CRITICAL_ERROR_PENALTY))
        .clamp(0.0, 1.0);

    let mut score = success_ratio * (1.0 - issue_penalty);
    if !telemetry.load_check_passed {
        score *= LOAD_FAILURE_MULTIPLIER;
    }
    if telemetry.has_stability_break() {
        score *= STABILITY_MULTIPLIER;
    }
    score *= RESPONSIVENESS_BASE + responsiveness * RESPONSIVENESS_WEIGHT;
    if telemetry.terminal_state_reached {
        score = (score + TERMINAL_STATE_BONUS).min(1.0);
    }
    score.clamp(0.0, 1.0)
}

/// Plain-language findings backing the heuristic score.
#[must_use]
pub fn heuristic_findings(results: &[ActionResult], telemetry: &Telemetry) -> Vec<String> {
    let mut findings = Vec::new();
    let failed = results.iter().filter(|r| !r.success).count();
    if failed > 0 {
        findings.push(format!("{failed} of {} actions failed", results.len()));
    }
    if !telemetry.load_check_passed {
        findings.push("load check failed".to_string());
    }
    if telemetry.has_stability_break() {
        findings.push("stability-breaking issue recorded".to_string());
    }
    findings
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ActionError;
    use crate::issue::{Issue, IssueType};
    use crate::result::MethodUsed;
    use crate::step::StepKind;
    use std::time::Duration;

    fn ok(index: usize) -> ActionResult {
        ActionResult::succeeded(index, StepKind::Click, MethodUsed::Structural, Duration::ZERO)
    }

    fn failed(index: usize) -> ActionResult {
        ActionResult::failed(
            index,
            StepKind::Click,
            MethodUsed::Structural,
            Duration::ZERO,
            &ActionError::NotFound("start".into()),
        )
    }

    fn clean() -> Telemetry {
        Telemetry {
            load_check_passed: true,
            ..Telemetry::default()
        }
    }

    #[test]
    fn perfect_run_scores_one() {
        let results: Vec<_> = (0..4).map(ok).collect();
        let score = heuristic_score(&results, &clean());
        assert!((score - 1.0).abs() < 1e-9);
    }

    #[test]
    fn zero_actions_only_earn_terminal_bonus() {
        assert_eq!(heuristic_score(&[], &clean()), 0.0);
        let telemetry = Telemetry {
            terminal_state_reached: true,
            ..clean()
        };
        assert!((heuristic_score(&[], &telemetry) - 0.1).abs() < 1e-9);
    }

    #[test]
    fn issues_and_failures_reduce_score() {
        let results = vec![ok(0), failed(1)];
        let telemetry = Telemetry {
            issues: vec![Issue::new(IssueType::SelectorNotFound, "start").at_action(1)],
            ..clean()
        };
        // 0.5 * (1 - 0.15 / 2) = 0.4625
        let score = heuristic_score(&results, &telemetry);
        assert!((score - 0.4625).abs() < 1e-9);
    }

    #[test]
    fn load_failure_and_crash_multiply_down() {
        let results: Vec<_> = (0..2).map(ok).collect();
        let telemetry = Telemetry {
            load_check_passed: false,
            issues: vec![Issue::new(IssueType::BrowserCrash, "target closed")],
            ..Telemetry::default()
        };
        // 1.0 * (1 - 0.25) * 0.5 * 0.3 = 0.1125
        let score = heuristic_score(&results, &telemetry);
        assert!((score - 0.1125).abs() < 1e-9);
        let findings = heuristic_findings(&results, &telemetry);
        assert_eq!(
            findings,
            vec!["load check failed", "stability-breaking issue recorded"]
        );
    }

    #[test]
    fn console_errors_dampen_responsiveness_and_stay_in_range() {
        let results: Vec<_> = (0..3).map(ok).collect();
        let telemetry = Telemetry {
            console_error_count: 50,
            critical_error_count: 10,
            terminal_state_reached: true,
            issues: (0..20).map(|_| Issue::new(IssueType::TotalTimeout, "slow")).collect(),
            ..clean()
        };
        let score = heuristic_score(&results, &telemetry);
        // 1.0 * 0.5 * 0.8 + 0.1
        assert!((score - 0.5).abs() < 1e-9);
        assert!((0.0..=1.0).contains(&score));
    }
}
