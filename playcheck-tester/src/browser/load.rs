use anyhow::{Context, Result};
use playcheck_engine::{ErrorContext, Issue, classify};
use serde_json::Value;
use std::time::{Duration, Instant};
use thirtyfour::prelude::*;

const CONTENT_SELECTOR: &str = "canvas, #app, #game, body > *";
const POLL_INTERVAL: Duration = Duration::from_millis(250);

const WEBGL_PROBE: &str = "try { const c = document.createElement('canvas'); \
     return !!(c.getContext('webgl') || c.getContext('experimental-webgl')); } \
     catch (e) { return false; }";

const ERROR_PROBE: &str = "return (window.__playcheck && window.__playcheck.errors) \
     ? window.__playcheck.errors() : []";

#[derive(Debug, Clone)]
pub struct LoadCheck {
    pub passed: bool,
    pub elapsed: Duration,
    pub issues: Vec<Issue>,
}

/// Navigate to `url` and wait for game content to appear.
///
/// # Errors
///
/// Navigation failures are fatal for the run. A page that never renders is
/// reported through the returned issues instead.
pub async fn check_load(
    driver: &WebDriver,
    url: &str,
    timeout: Duration,
    headless: bool,
) -> Result<LoadCheck> {
    let started = Instant::now();
    driver
        .goto(url)
        .await
        .with_context(|| format!("navigating to {url}"))?;

    let mut issues = Vec::new();
    let rendered = loop {
        match driver.find_all(By::Css(CONTENT_SELECTOR)).await {
            Ok(found) if !found.is_empty() => break true,
            Ok(_) => {}
            Err(err) => log::debug!("content probe failed: {err}"),
        }
        if started.elapsed() >= timeout {
            break false;
        }
        tokio::time::sleep(POLL_INTERVAL).await;
    };

    if !rendered {
        let message = format!(
            "page content did not render before timeout of {}ms",
            timeout.as_millis()
        );
        issues.push(Issue::new(classify(&message, ErrorContext::Load), message));
    }

    if headless {
        let webgl = driver
            .execute(WEBGL_PROBE, Vec::new())
            .await
            .map(|ret| ret.json().as_bool().unwrap_or(false))
            .unwrap_or(false);
        if !webgl {
            let message = "headless browser exposes no WebGL context".to_string();
            issues.push(Issue::new(classify(&message, ErrorContext::Load), message));
        }
    }

    let elapsed = started.elapsed();
    log::info!("load check for {url}: rendered={rendered} in {elapsed:?}");
    Ok(LoadCheck {
        passed: issues.is_empty(),
        elapsed,
        issues,
    })
}

/// Count page errors reported by the game's probe, split into
/// `(errors, critical)`. Pages without the probe report none.
pub async fn console_errors(driver: &WebDriver) -> (usize, usize) {
    let errors = match driver.execute(ERROR_PROBE, Vec::new()).await {
        Ok(ret) => ret.json().clone(),
        Err(err) => {
            log::debug!("error probe unavailable: {err}");
            return (0, 0);
        }
    };
    count_errors(&errors)
}

fn count_errors(errors: &Value) -> (usize, usize) {
    let Some(list) = errors.as_array() else {
        return (0, 0);
    };
    let critical = list
        .iter()
        .filter(|e| e.get("critical").and_then(Value::as_bool).unwrap_or(false))
        .count();
    (list.len(), critical)
}
