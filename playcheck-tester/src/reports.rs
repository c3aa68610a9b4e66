use anyhow::Result;
use colored::Colorize;
use playcheck_engine::{PlaytestReport, SequenceStatus};
use serde::Serialize;
use std::io::Write;
use std::time::Duration;

/// One playtest report tagged with the browser it ran in.
#[derive(Debug, Clone, Serialize)]
pub struct BrowserRun {
    pub browser: String,
    pub report: PlaytestReport,
}

const fn status_label(status: SequenceStatus) -> &'static str {
    match status {
        SequenceStatus::Completed => "completed",
        SequenceStatus::TimedOut => "timed out",
    }
}

pub fn generate_console_report(
    out: &mut dyn Write,
    runs: &[BrowserRun],
    total_duration: Duration,
) -> Result<()> {
    writeln!(out)?;
    writeln!(out, "{}", "📊 Playtest Results Summary".bright_cyan().bold())?;
    writeln!(out, "{}", "===========================".cyan())?;

    let passed = runs.iter().filter(|r| r.report.passed).count();
    writeln!(out, "Total runs: {}", runs.len())?;
    writeln!(out, "Passed: {}", passed.to_string().green())?;
    writeln!(out, "Failed: {}", (runs.len() - passed).to_string().red())?;
    writeln!(out, "Total time: {total_duration:?}")?;
    writeln!(out)?;

    for run in runs {
        let report = &run.report;
        let status = if report.passed {
            "✅ PASS".green()
        } else {
            "❌ FAIL".red()
        };
        writeln!(out, "{status} [{}] {}", run.browser.bold(), report.url)?;
        writeln!(
            out,
            "   Score: {:.2} (heuristic {:.2}{})",
            report.score,
            report.evaluation.heuristic_score,
            if report.evaluation.cache_hit { ", cached" } else { "" }
        )?;
        writeln!(
            out,
            "   Actions: {}/{} succeeded, sequence {} in {}ms",
            report.actions.len() - report.failed_actions(),
            report.actions.len(),
            status_label(report.status),
            report.elapsed_ms
        )?;
        let methods = report.method_breakdown;
        writeln!(
            out,
            "   Methods: structural {}, agent {}, none {}",
            methods.structural, methods.agent, methods.none
        )?;
        if report.dropped_steps > 0 {
            writeln!(
                out,
                "   {}",
                format!("{} steps dropped over the step limit", report.dropped_steps).yellow()
            )?;
        }
        if !report.issues.is_empty() {
            writeln!(out, "   Issues:")?;
            for issue in &report.issues {
                writeln!(
                    out,
                    "     • {} {}",
                    issue.issue_type.as_str().red(),
                    issue.description
                )?;
            }
        }
        for finding in &report.evaluation.issues {
            writeln!(out, "     · {finding}")?;
        }
        writeln!(out)?;
    }
    Ok(())
}

pub fn generate_json_report(out: &mut dyn Write, runs: &[BrowserRun]) -> Result<()> {
    let json_output = serde_json::to_string_pretty(runs)?;
    writeln!(out, "{json_output}")?;
    Ok(())
}

pub fn generate_markdown_report(out: &mut dyn Write, runs: &[BrowserRun]) -> Result<()> {
    writeln!(out, "# Playtest Results\n")?;

    let passed = runs.iter().filter(|r| r.report.passed).count();
    writeln!(out, "## Summary\n")?;
    writeln!(out, "- **Total runs**: {}", runs.len())?;
    writeln!(out, "- **Passed**: {passed}")?;
    writeln!(out, "- **Failed**: {}\n", runs.len() - passed)?;

    writeln!(out, "## Runs\n")?;
    for run in runs {
        let report = &run.report;
        let status = if report.passed { "✅" } else { "❌" };
        writeln!(out, "### {status} {} ({})\n", report.url, run.browser)?;
        writeln!(out, "- **Score**: {:.2}", report.score)?;
        writeln!(out, "- **Status**: {}", status_label(report.status))?;
        writeln!(out, "- **Elapsed**: {}ms\n", report.elapsed_ms)?;

        writeln!(out, "| # | kind | result | ms | method |")?;
        writeln!(out, "|---|------|--------|----|--------|")?;
        for action in &report.actions {
            let result = match &action.error {
                None => "ok".to_string(),
                Some(err) => format!("{}: {}", err.issue_type, err.message.replace('|', "\\|")),
            };
            writeln!(
                out,
                "| {} | {} | {result} | {} | {:?} |",
                action.index, action.kind, action.execution_ms, action.method
            )?;
        }

        if !report.issues.is_empty() {
            writeln!(out, "\n**Issues**:")?;
            for issue in &report.issues {
                writeln!(out, "- `{}` {}", issue.issue_type, issue.description)?;
            }
        }
        if !report.agent_summaries.is_empty() {
            writeln!(out, "\n**Agent**:")?;
            for summary in &report.agent_summaries {
                writeln!(out, "- step {}: {}", summary.index, summary.describe())?;
            }
        }
        writeln!(out)?;
    }
    Ok(())
}
