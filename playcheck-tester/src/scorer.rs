use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use playcheck_engine::{ExternalScore, Scorer, ScoringContext};
use std::process::Stdio;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

const SCORER_TIMEOUT: Duration = Duration::from_secs(120);

/// Delegates scoring to an external program: the scoring context goes in as
/// JSON on stdin and an [`ExternalScore`] is read back as JSON from stdout.
pub struct CommandScorer {
    program: String,
    args: Vec<String>,
    timeout: Duration,
}

impl CommandScorer {
    /// Split a command line on whitespace into program and arguments.
    pub fn from_command_line(command: &str) -> Option<Self> {
        let mut parts = command.split_whitespace().map(str::to_string);
        let program = parts.next()?;
        Some(Self {
            program,
            args: parts.collect(),
            timeout: SCORER_TIMEOUT,
        })
    }
}

#[async_trait]
impl Scorer for CommandScorer {
    async fn score(&self, context: &ScoringContext) -> Result<ExternalScore> {
        let input = serde_json::to_vec(context).context("serializing scoring context")?;
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .with_context(|| format!("starting scorer {}", self.program))?;

        let stdin = child.stdin.take();
        let exchange = async move {
            if let Some(mut stdin) = stdin {
                stdin.write_all(&input).await.context("writing scoring context")?;
            }
            child.wait_with_output().await.context("waiting for scorer")
        };
        let output = tokio::time::timeout(self.timeout, exchange)
            .await
            .context("scorer timed out")??;
        if !output.status.success() {
            bail!(
                "scorer exited with {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }
        let score: ExternalScore =
            serde_json::from_slice(&output.stdout).context("parsing scorer output")?;
        Ok(score)
    }
}
