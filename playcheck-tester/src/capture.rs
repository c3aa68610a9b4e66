use anyhow::{Context, Result};
use async_trait::async_trait;
use playcheck_engine::Capture;
use std::fs;
use std::path::{Path, PathBuf};
use thirtyfour::prelude::*;

const STATE_PROBE: &str =
    "return (window.__playcheck && window.__playcheck.state) ? window.__playcheck.state() : null";

/// Writes screenshots, DOM and game state into the run's artifact directory.
pub struct ArtifactCapture {
    driver: WebDriver,
    dir: PathBuf,
}

impl ArtifactCapture {
    pub fn new(driver: WebDriver, dir: impl Into<PathBuf>) -> Self {
        Self {
            driver,
            dir: dir.into(),
        }
    }
}

#[async_trait]
impl Capture for ArtifactCapture {
    async fn capture_diagnostic(&self, label: &str, index: usize) -> Result<()> {
        let screenshot = self
            .driver
            .screenshot_as_png()
            .await
            .context("taking screenshot")?;
        let source = self.driver.source().await.ok();
        let state = self
            .driver
            .execute(STATE_PROBE, Vec::new())
            .await
            .ok()
            .map(|ret| ret.json().clone());

        let artifacts = Artifacts {
            screenshot: Some(&screenshot),
            source: source.as_deref(),
            state: state.as_ref(),
            error_chain: None,
        };
        write_artifact_files(&self.dir, &format!("{label}-{index}"), &artifacts)
    }
}

/// Best-effort capture after a fatal run error, alongside the error chain.
pub async fn capture_failure_artifacts(driver: &WebDriver, dir: &str, err: &anyhow::Error) -> Result<()> {
    let screenshot = driver.screenshot_as_png().await.ok();
    let source = driver.source().await.ok();
    let state = driver
        .execute(STATE_PROBE, Vec::new())
        .await
        .ok()
        .map(|ret| ret.json().clone());
    let chain = format!("{err:#}");

    let artifacts = Artifacts {
        screenshot: screenshot.as_deref(),
        source: source.as_deref(),
        state: state.as_ref(),
        error_chain: Some(&chain),
    };
    write_artifact_files(Path::new(dir), "fatal", &artifacts)
}

struct Artifacts<'a> {
    screenshot: Option<&'a [u8]>,
    source: Option<&'a str>,
    state: Option<&'a serde_json::Value>,
    error_chain: Option<&'a str>,
}

fn write_artifact_files(dir: &Path, stem: &str, artifacts: &Artifacts<'_>) -> Result<()> {
    fs::create_dir_all(dir).context("creating artifacts dir")?;

    if let Some(png) = artifacts.screenshot {
        fs::write(dir.join(format!("{stem}.png")), png).context("writing screenshot")?;
    }

    if let Some(src) = artifacts.source {
        let _ = fs::write(dir.join(format!("{stem}.html")), src);
    }

    if let Some(state_json) = artifacts.state {
        let payload = serde_json::to_vec_pretty(state_json).unwrap_or_default();
        let _ = fs::write(dir.join(format!("{stem}.state.json")), payload);
    }

    if let Some(chain) = artifacts.error_chain {
        let _ = fs::write(dir.join(format!("{stem}.error.txt")), chain);
    }

    Ok(())
}
