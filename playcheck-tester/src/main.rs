mod browser;
mod cache;
mod capture;
mod reports;
mod scorer;
mod util;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use colored::Colorize;
use serde_json::Value;
use std::fs::File;
use std::io::{BufWriter, Write, stdout};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use browser::{BrowserConfig, BrowserKind, WebDriverAutomation, check_load, console_errors, new_session};
use cache::FileCache;
use capture::{ArtifactCapture, capture_failure_artifacts};
use playcheck_engine::{
    ActionStep, Automation, EvaluationEngine, ExtractOptions, InteractionMode, RunContext,
    SequenceRunConfig, Sequencer, Telemetry, build_report, parse_run_config, write_json,
};
use reports::BrowserRun;
use scorer::CommandScorer;
use util::{artifacts_dir, split_csv};

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum HeadlessMode {
    /// Run browsers in headless mode
    Headless,
    /// Run browsers with visible windows
    Windowed,
}

impl HeadlessMode {
    const fn is_headless(self) -> bool {
        matches!(self, Self::Headless)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ModeArg {
    /// Route interactions through the instruction-following agent
    Agent,
    /// Locate elements and send input directly
    Structural,
}

impl From<ModeArg> for InteractionMode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::Agent => Self::Agent,
            ModeArg::Structural => Self::Structural,
        }
    }
}

#[derive(Debug, Parser)]
#[command(name = "playcheck-tester", version)]
#[command(about = "Automated playability testing for browser games")]
struct Args {
    /// URL of the game page under test
    #[arg(long, default_value = "http://localhost:5173/")]
    url: String,

    /// JSON file holding a step array or a full run configuration
    #[arg(long)]
    steps: Option<PathBuf>,

    /// Browsers to run (chrome,edge,firefox,safari)
    #[arg(long, default_value = "chrome")]
    browsers: String,

    /// Run headless where supported
    #[arg(long, value_enum, default_value_t = HeadlessMode::Headless)]
    headless: HeadlessMode,

    /// Connect to a Selenium Grid/Appium hub instead of local drivers
    #[arg(long)]
    hub: Option<String>,

    /// Artifacts directory for screenshots, DOM snapshots and reports
    #[arg(long, default_value = "target/playcheck-artifacts")]
    artifacts_dir: String,

    /// Output report format
    #[arg(long, default_value = "console")]
    #[arg(value_parser = ["json", "markdown", "console"])]
    report: String,

    /// Optional path to write the report output instead of stdout
    #[arg(long)]
    output: Option<PathBuf>,

    /// Directory for cached external scores
    #[arg(long, default_value = "target/playcheck-cache")]
    cache_dir: PathBuf,

    /// Disable the external score cache
    #[arg(long)]
    no_cache: bool,

    /// External scorer command: reads the scoring context as JSON on stdin,
    /// prints a score JSON object on stdout
    #[arg(long)]
    scorer_cmd: Option<String>,

    /// Per-action timeout override in milliseconds
    #[arg(long)]
    action_timeout_ms: Option<u64>,

    /// Total sequence budget override in milliseconds
    #[arg(long)]
    total_timeout_ms: Option<u64>,

    /// Retries per action override (attempts = retries + 1)
    #[arg(long)]
    retries: Option<u32>,

    /// Default interaction mode for click/press/axis steps
    #[arg(long, value_enum)]
    mode: Option<ModeArg>,

    /// How long to wait for the page to render before flagging it
    #[arg(long, default_value_t = 30_000)]
    load_timeout_ms: u64,

    /// Parse and validate the steps, print them, and exit
    #[arg(long)]
    validate_only: bool,
}

/// Steps used when no steps file is given: load, start, poke the controls.
fn default_steps() -> Vec<ActionStep> {
    vec![
        ActionStep::Screenshot {
            label: Some("loaded".into()),
        },
        ActionStep::Click {
            target: "start".into(),
            timeout_ms: None,
            mode: None,
        },
        ActionStep::Wait { duration_ms: 1_000 },
        ActionStep::Press {
            key: Some("Space".into()),
            keys: Vec::new(),
            repeat: 3,
            hold_ms: None,
            delay_ms: Some(200),
            timeout_ms: None,
            mode: None,
        },
        ActionStep::Axis {
            x: 1.0,
            y: 0.0,
            duration_ms: Some(1_000),
            timeout_ms: None,
            mode: None,
        },
        ActionStep::Screenshot {
            label: Some("played".into()),
        },
    ]
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    let config = load_config(&args)?;

    if args.validate_only {
        let mut output_target = OutputTarget::new(args.output.clone())?;
        write_step_listing(output_target.writer(), &config)?;
        output_target.flush_inner()?;
        return Ok(());
    }

    announce_banner();
    if config.default_mode == Some(InteractionMode::Agent) {
        eprintln!(
            "⚠️  {}",
            "No agent backend is bundled; agent-mode steps will fail".yellow()
        );
    }

    let start_time = Instant::now();
    let (runs, fatal) = run_browsers(&args, &config).await;
    write_reports(&args, &runs, start_time)?;

    if fatal > 0 {
        eprintln!("❌ {fatal} browser run(s) failed before producing a report");
    }
    if fatal > 0 || runs.iter().any(|r| !r.report.passed) {
        std::process::exit(1);
    }

    Ok(())
}

fn load_config(args: &Args) -> Result<SequenceRunConfig> {
    let mut config = match &args.steps {
        Some(path) => {
            let raw = std::fs::read_to_string(path)
                .with_context(|| format!("reading steps from {}", path.display()))?;
            parse_run_config(&raw).with_context(|| format!("invalid steps in {}", path.display()))?
        }
        None => SequenceRunConfig::with_steps(default_steps()),
    };
    apply_overrides(args, &mut config);
    config.validate().context("invalid run configuration")?;
    Ok(config)
}

fn apply_overrides(args: &Args, config: &mut SequenceRunConfig) {
    if let Some(ms) = args.action_timeout_ms {
        config.action_timeout_ms = ms;
    }
    if let Some(ms) = args.total_timeout_ms {
        config.total_timeout_ms = ms;
    }
    if let Some(retries) = args.retries {
        config.action_retries = retries;
    }
    if let Some(mode) = args.mode {
        config.default_mode = Some(mode.into());
    }
}

fn write_step_listing(out: &mut dyn Write, config: &SequenceRunConfig) -> Result<()> {
    writeln!(out, "Steps ({}):", config.steps.len())?;
    for (index, step) in config.steps.iter().enumerate() {
        let status = match step.validate() {
            Ok(_) => String::new(),
            Err(err) => format!("  [invalid: {err}]"),
        };
        writeln!(out, "  {index:>3}. {}{status}", step.describe())?;
    }
    writeln!(
        out,
        "Budget: {}ms total, {}ms per action, {} retries, {}ms final capture buffer",
        config.total_timeout_ms,
        config.action_timeout_ms,
        config.action_retries,
        config.final_capture_buffer_ms
    )?;
    Ok(())
}

fn announce_banner() {
    println!("{}", "🎮 Playcheck Playability Tester".bright_cyan().bold());
    println!("{}", "===============================".cyan());
}

fn build_browser_config(args: &Args) -> BrowserConfig {
    BrowserConfig {
        headless: args.headless.is_headless(),
        implicit_wait_secs: 0,
        remote_hub: args.hub.clone(),
    }
}

fn build_evaluation_engine(args: &Args) -> EvaluationEngine {
    let mut engine = EvaluationEngine::new(args.url.clone());
    if let Some(command) = args.scorer_cmd.as_deref() {
        match CommandScorer::from_command_line(command) {
            Some(scorer) => engine = engine.with_scorer(Arc::new(scorer)),
            None => eprintln!("⚠️  Ignoring empty --scorer-cmd"),
        }
    }
    if !args.no_cache {
        engine = engine.with_cache(Arc::new(FileCache::new(args.cache_dir.clone())));
    }
    engine
}

/// Run every requested browser. Returns the finished runs and the number of
/// browsers whose session or navigation failed outright.
async fn run_browsers(args: &Args, config: &SequenceRunConfig) -> (Vec<BrowserRun>, usize) {
    let mut runs = Vec::new();
    let mut fatal = 0;
    let engine = build_evaluation_engine(args);

    for browser_name in split_csv(&args.browsers) {
        let Some(kind) = BrowserKind::parse(&browser_name) else {
            eprintln!("⚠️  Unknown browser: {}", browser_name.yellow());
            continue;
        };

        let cfg = build_browser_config(args);
        let driver = match new_session(kind, &cfg).await {
            Ok(d) => d,
            Err(e) => {
                eprintln!("❌ Could not start {kind:?}: {e}");
                fatal += 1;
                continue;
            }
        };

        let dir = artifacts_dir(&args.artifacts_dir, kind.label(), &args.url);
        let run_start = Instant::now();
        match run_playtest(args, config, &engine, &driver, &dir).await {
            Ok(report) => {
                let label = if report.passed {
                    kind.label().green()
                } else {
                    kind.label().red()
                };
                println!(
                    "🏁 [{label}] score {:.2}, {} issues - {:?}",
                    report.score,
                    report.issues.len(),
                    run_start.elapsed()
                );
                runs.push(BrowserRun {
                    browser: kind.label().to_string(),
                    report,
                });
            }
            Err(e) => {
                eprintln!(
                    "❌ [{}] {} - {:?}: {:#}",
                    kind.label().red(),
                    args.url,
                    run_start.elapsed(),
                    e
                );
                fatal += 1;
                let _ = capture_failure_artifacts(&driver, &dir, &e).await;
            }
        }
        let _ = driver.quit().await;
    }

    (runs, fatal)
}

async fn run_playtest(
    args: &Args,
    config: &SequenceRunConfig,
    engine: &EvaluationEngine,
    driver: &thirtyfour::WebDriver,
    dir: &str,
) -> Result<playcheck_engine::PlaytestReport> {
    let load = check_load(
        driver,
        &args.url,
        Duration::from_millis(args.load_timeout_ms),
        args.headless.is_headless(),
    )
    .await?;
    if !load.passed {
        eprintln!(
            "⚠️  Load check flagged {} issue(s) after {:?}",
            load.issues.len(),
            load.elapsed
        );
    }

    let automation = Arc::new(WebDriverAutomation::new(driver.clone()));
    let capture = Arc::new(ArtifactCapture::new(driver.clone(), dir));
    let ctx = RunContext::new(automation.clone(), config.clone()).with_capture(capture);
    let outcome = Sequencer::new(ctx).run(&config.steps).await;

    let terminal_state = probe_terminal_state(automation.as_ref(), config).await;
    let (console_error_count, critical_error_count) = console_errors(driver).await;

    let mut issues = load.issues.clone();
    issues.extend(outcome.issues.iter().cloned());
    let telemetry = Telemetry {
        console_error_count,
        critical_error_count,
        load_check_passed: load.passed,
        terminal_state_reached: terminal_state.as_ref().is_some_and(is_terminal),
        terminal_state,
        issues,
    };

    let evaluation = engine.evaluate(&outcome.results, &telemetry, config).await;
    let report = build_report(&args.url, &outcome, &evaluation, &load.issues);
    let path = write_json(&report, std::path::Path::new(dir))?;
    log::info!("report written to {}", path.display());
    Ok(report)
}

async fn probe_terminal_state(automation: &dyn Automation, config: &SequenceRunConfig) -> Option<Value> {
    let options = ExtractOptions {
        selector: None,
        timeout: config.action_timeout(),
    };
    match automation
        .extract_structured("current game state", &Value::Null, &options)
        .await
    {
        Ok(Value::Null) => None,
        Ok(state) => Some(state),
        Err(err) => {
            log::debug!("game state probe failed: {err:#}");
            None
        }
    }
}

/// Whether a game-state snapshot describes an ended game.
fn is_terminal(state: &Value) -> bool {
    if state.get("terminal").and_then(Value::as_bool) == Some(true) {
        return true;
    }
    state
        .get("screen")
        .and_then(Value::as_str)
        .is_some_and(|screen| {
            matches!(
                screen.to_ascii_lowercase().as_str(),
                "game_over" | "gameover" | "victory" | "win" | "results" | "ended"
            )
        })
}

fn write_reports(args: &Args, runs: &[BrowserRun], start_time: Instant) -> Result<()> {
    let mut output_target = OutputTarget::new(args.output.clone())?;

    match args.report.as_str() {
        "json" => reports::generate_json_report(&mut output_target, runs)?,
        "markdown" => {
            if runs.is_empty() {
                writeln!(&mut output_target, "# Playtest Results\n\n_No playtests executed._")?;
            } else {
                reports::generate_markdown_report(&mut output_target, runs)?;
            }
        }
        _ => {
            if runs.is_empty() {
                writeln!(&mut output_target, "No playtests executed.")?;
            } else {
                reports::generate_console_report(&mut output_target, runs, start_time.elapsed())?;
            }
        }
    }

    if args.report != "json" {
        let duration = start_time.elapsed();
        writeln!(&mut output_target)?;
        writeln!(&mut output_target, "🏁 Total time: {duration:?}")?;
    }
    output_target.flush_inner()?;
    Ok(())
}

enum OutputTarget {
    Stdout(BufWriter<std::io::Stdout>),
    File(BufWriter<File>),
}

impl OutputTarget {
    fn new(path: Option<PathBuf>) -> Result<Self> {
        if let Some(path) = path {
            let file = File::create(&path)
                .with_context(|| format!("failed to create {}", path.display()))?;
            Ok(Self::File(BufWriter::new(file)))
        } else {
            Ok(Self::Stdout(BufWriter::new(stdout())))
        }
    }

    fn writer(&mut self) -> &mut dyn Write {
        match self {
            Self::Stdout(w) => w,
            Self::File(w) => w,
        }
    }

    fn flush_inner(&mut self) -> std::io::Result<()> {
        match self {
            Self::Stdout(w) => w.flush(),
            Self::File(w) => w.flush(),
        }
    }
}

impl Write for OutputTarget {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.writer().write(buf)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.flush_inner()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn base_args() -> Args {
        Args {
            url: "http://localhost:5173/".to_string(),
            steps: None,
            browsers: "chrome".to_string(),
            headless: HeadlessMode::Headless,
            hub: None,
            artifacts_dir: "target/test-artifacts".to_string(),
            report: "json".to_string(),
            output: None,
            cache_dir: PathBuf::from("target/test-cache"),
            no_cache: true,
            scorer_cmd: None,
            action_timeout_ms: None,
            total_timeout_ms: None,
            retries: None,
            mode: None,
            load_timeout_ms: 1_000,
            validate_only: false,
        }
    }

    fn temp_path(label: &str) -> PathBuf {
        std::env::temp_dir().join(format!(
            "playcheck-main-{label}-{}",
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .unwrap_or_default()
                .as_nanos()
        ))
    }

    #[test]
    fn default_steps_validate() {
        let config = load_config(&base_args()).expect("default config");
        assert_eq!(config.steps.len(), default_steps().len());
        assert!(config.steps.iter().all(|s| s.validate().is_ok()));
    }

    #[test]
    fn cli_overrides_win_over_file_values() {
        let path = temp_path("overrides.json");
        std::fs::write(
            &path,
            r#"{"action_timeout_ms": 2000, "steps": [{"kind": "wait", "duration_ms": 5}]}"#,
        )
        .expect("write steps");
        let mut args = base_args();
        args.steps = Some(path.clone());
        args.action_timeout_ms = Some(4_000);
        args.retries = Some(0);
        args.mode = Some(ModeArg::Structural);
        let config = load_config(&args).expect("config");
        assert_eq!(config.action_timeout_ms, 4_000);
        assert_eq!(config.action_retries, 0);
        assert_eq!(config.default_mode, Some(InteractionMode::Structural));
        let _ = std::fs::remove_file(path);
    }

    #[test]
    fn invalid_overrides_are_rejected() {
        let mut args = base_args();
        args.total_timeout_ms = Some(1_000);
        let err = load_config(&args).expect_err("buffer exceeds budget");
        assert!(format!("{err:#}").contains("final capture buffer"));
    }

    #[test]
    fn step_listing_flags_invalid_steps() {
        let config = SequenceRunConfig::with_steps(vec![
            ActionStep::Wait { duration_ms: 10 },
            ActionStep::Click {
                target: " ".into(),
                timeout_ms: None,
                mode: None,
            },
        ]);
        let mut buffer = Vec::new();
        write_step_listing(&mut buffer, &config).expect("listing");
        let text = String::from_utf8(buffer).expect("utf8");
        assert!(text.contains("Steps (2):"));
        assert!(text.contains("wait 10ms"));
        assert!(text.contains("[invalid: click step requires a non-empty target]"));
    }

    #[test]
    fn terminal_state_detection() {
        assert!(is_terminal(&json!({"screen": "GAME_OVER"})));
        assert!(is_terminal(&json!({"terminal": true, "screen": "play"})));
        assert!(!is_terminal(&json!({"screen": "play"})));
        assert!(!is_terminal(&json!([1, 2])));
    }

    #[test]
    fn unknown_browsers_are_skipped() {
        let mut args = base_args();
        args.browsers = "netscape, mosaic".to_string();
        let config = load_config(&args).expect("config");
        let (runs, fatal) = tokio_test::block_on(run_browsers(&args, &config));
        assert!(runs.is_empty());
        assert_eq!(fatal, 0);
    }

    #[test]
    fn unreachable_hub_counts_as_fatal() {
        let mut args = base_args();
        args.browsers = "chrome".to_string();
        args.hub = Some("http://127.0.0.1:9".to_string());
        let config = load_config(&args).expect("config");
        let (runs, fatal) = tokio_test::block_on(run_browsers(&args, &config));
        assert!(runs.is_empty());
        assert_eq!(fatal, 1);
    }

    #[test]
    fn empty_run_writes_placeholder_report() {
        let path = temp_path("empty.md");
        let mut args = base_args();
        args.report = "markdown".to_string();
        args.output = Some(path.clone());
        write_reports(&args, &[], Instant::now()).expect("write report");
        let content = std::fs::read_to_string(&path).expect("read output");
        assert!(content.contains("_No playtests executed._"));
        let _ = std::fs::remove_file(path);
    }
}
