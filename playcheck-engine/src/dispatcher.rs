//! Executes one validated step against the run's collaborators.
//!
//! Every backend call is bounded by a timeout and wrapped in the retry
//! controller, except `wait`, which only sleeps. Failures come back as data
//! inside the [`ActionResult`]; nothing here returns an error to the caller.

use serde_json::{Map, Value, json};
use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;

use crate::capability::{ActionTarget, Agent, Automation, Handle, PerformOptions};
use crate::constants::{
    AGENT_ACTION_TIMEOUT_FLOOR, AGENT_ACTION_TIMEOUT_MULTIPLIER, AGENT_TASK_TIMEOUT_MULTIPLIER,
    HOLD_PRESS_INTERVAL,
};
use crate::context::RunContext;
use crate::error::ActionError;
use crate::fallback::{Resolution, click_strategies, normalize_target, resolve};
use crate::result::{ActionResult, AgentSummary, MethodUsed};
use crate::retry::retry;
use crate::step::{ActionStep, InteractionMode, ValidatedStep};

/// What a handler produced before timing and bookkeeping are attached.
struct Executed {
    metadata: Map<String, Value>,
    agent_summary: Option<AgentSummary>,
    failure: Option<ActionError>,
}

impl Executed {
    fn with(metadata: Value) -> Self {
        Self {
            metadata: into_map(metadata),
            agent_summary: None,
            failure: None,
        }
    }
}

fn into_map(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}

/// Validate and execute `step`, always producing a result.
pub async fn dispatch(index: usize, step: &ActionStep, ctx: &RunContext) -> ActionResult {
    let started = Instant::now();
    let kind = step.kind();

    let validated = match step.validate() {
        Ok(validated) => validated,
        Err(err) => {
            let err = ActionError::from(err);
            log::warn!("step {index} rejected: {err}");
            return ActionResult::failed(index, kind, MethodUsed::None, started.elapsed(), &err);
        }
    };

    let method = method_for(&validated, ctx);
    log::debug!("dispatching step {index}: {} via {method:?}", step.describe());

    let outcome = execute(index, &validated, ctx).await;
    let elapsed = started.elapsed();

    match outcome {
        Ok(executed) => {
            let mut result = match &executed.failure {
                Some(err) => ActionResult::failed(index, kind, method, elapsed, err),
                None => ActionResult::succeeded(index, kind, method, elapsed),
            }
            .with_metadata(executed.metadata);
            if let Some(summary) = executed.agent_summary {
                result = result.with_agent_summary(summary);
            }
            result
        }
        Err(err) => {
            log::warn!("step {index} ({kind}) failed after {elapsed:?}: {err}");
            ActionResult::failed(index, kind, method, elapsed, &err)
        }
    }
}

fn method_for(step: &ValidatedStep, ctx: &RunContext) -> MethodUsed {
    match step {
        ValidatedStep::Wait { .. } | ValidatedStep::Screenshot { .. } => MethodUsed::None,
        ValidatedStep::Observe { .. } => MethodUsed::Structural,
        ValidatedStep::Agent { .. } => MethodUsed::Agent,
        ValidatedStep::Click { mode, .. }
        | ValidatedStep::Press { mode, .. }
        | ValidatedStep::Axis { mode, .. } => ctx.resolve_mode(*mode).into(),
    }
}

async fn execute(
    index: usize,
    step: &ValidatedStep,
    ctx: &RunContext,
) -> Result<Executed, ActionError> {
    match step {
        ValidatedStep::Wait { duration } => {
            tokio::time::sleep(*duration).await;
            Ok(Executed::with(json!({ "waited_ms": duration.as_millis() })))
        }
        ValidatedStep::Click {
            target,
            timeout,
            mode,
        } => {
            let timeout = ctx.action_timeout(*timeout);
            match ctx.resolve_mode(*mode) {
                InteractionMode::Structural => click_structural(ctx, target, timeout).await,
                InteractionMode::Agent => {
                    let instruction = format!("click the {}", normalize_target(target));
                    agent_instruction(ctx, &instruction, timeout).await
                }
            }
        }
        ValidatedStep::Press {
            keys,
            repeat,
            hold,
            delay,
            timeout,
            mode,
        } => {
            let keyboard = Keyboard::new(ctx, ctx.resolve_mode(*mode), ctx.action_timeout(*timeout))?;
            let mut presses = 0u32;
            for i in 0..*repeat {
                let key = &keys[i as usize % keys.len()];
                presses += match hold {
                    Some(hold) => keyboard.hold(std::slice::from_ref(key), *hold).await?,
                    None => keyboard.press(key).await.map(|()| 1)?,
                };
                if !delay.is_zero() && i + 1 < *repeat {
                    tokio::time::sleep(*delay).await;
                }
            }
            Ok(Executed::with(json!({
                "keys": keys,
                "repeat": repeat,
                "presses": presses,
                "hold_ms": hold.map(|h| h.as_millis()),
            })))
        }
        ValidatedStep::Axis {
            x,
            y,
            duration,
            timeout,
            mode,
        } => {
            let keyboard = Keyboard::new(ctx, ctx.resolve_mode(*mode), ctx.action_timeout(*timeout))?;
            let keys = axis_keys(ctx, *x, *y);
            let presses = keyboard.hold(&keys, *duration).await?;
            Ok(Executed::with(json!({
                "keys": keys,
                "presses": presses,
                "duration_ms": duration.as_millis(),
            })))
        }
        ValidatedStep::Screenshot { label } => {
            let label = label.clone().unwrap_or_else(|| format!("step-{index}"));
            Ok(screenshot(ctx, &label, index).await)
        }
        ValidatedStep::Observe { elements, timeout } => {
            observe(ctx, elements, ctx.action_timeout(*timeout)).await
        }
        ValidatedStep::Agent {
            instruction,
            max_steps,
            timeout,
        } => agent_task(ctx, instruction, *max_steps, *timeout).await,
    }
}

/// Await a backend call under `limit`, turning an overrun into a
/// timeout-classified error.
async fn bounded<T>(
    operation: &str,
    limit: Duration,
    call: impl Future<Output = anyhow::Result<T>>,
) -> Result<T, ActionError> {
    match tokio::time::timeout(limit, call).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(err)) => Err(ActionError::Backend(err)),
        Err(_) => Err(ActionError::timeout(operation, limit)),
    }
}

async fn with_retry<T, F, Fut>(ctx: &RunContext, operation: F) -> Result<T, ActionError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ActionError>>,
{
    retry(ctx.retry_policy(), ActionError::is_retryable, operation).await
}

fn require_agent(ctx: &RunContext) -> Result<&dyn Agent, ActionError> {
    ctx.agent.as_deref().ok_or_else(|| {
        ActionError::Configuration("agent mode requested but no agent is configured".into())
    })
}

/// Agent calls get at least double the action budget to absorb the agent's
/// own multi-step latency.
fn agent_interaction_timeout(action_timeout: Duration) -> Duration {
    action_timeout
        .saturating_mul(AGENT_ACTION_TIMEOUT_MULTIPLIER)
        .max(AGENT_ACTION_TIMEOUT_FLOOR)
}

async fn locate_bounded(
    automation: &dyn Automation,
    description: String,
    timeout: Duration,
) -> anyhow::Result<Vec<Handle>> {
    match tokio::time::timeout(timeout, automation.locate(&description, timeout)).await {
        Ok(found) => found,
        Err(_) => anyhow::bail!("timeout locating '{description}'"),
    }
}

async fn click_structural(
    ctx: &RunContext,
    target: &str,
    timeout: Duration,
) -> Result<Executed, ActionError> {
    let automation = ctx.automation.as_ref();
    let strategies = click_strategies(target);
    let strategies = strategies.as_slice();
    let options = PerformOptions {
        timeout,
        mode_hint: InteractionMode::Structural,
    };

    with_retry(ctx, move || async move {
        let resolution = resolve(strategies, timeout, move |candidate, limit| {
            locate_bounded(automation, candidate, limit)
        })
        .await;

        match resolution {
            Resolution::Found {
                handle,
                strategy_index,
                candidate,
            } => {
                let click = ActionTarget::Handle(handle.clone());
                bounded("clicking", timeout, automation.perform(&click, options)).await?;
                Ok(Executed::with(json!({
                    "strategy": candidate,
                    "strategy_index": strategy_index,
                    "handle": handle.id(),
                })))
            }
            Resolution::NotFound { tried } => {
                // Last resort: hand the backend a direct instruction.
                let instruction = format!("click the {}", normalize_target(target));
                let direct = ActionTarget::Instruction(instruction.clone());
                match bounded("clicking", timeout, automation.perform(&direct, options)).await {
                    Ok(()) => Ok(Executed::with(json!({
                        "strategy": instruction,
                        "strategy_index": Value::Null,
                        "direct": true,
                    }))),
                    Err(err) => {
                        log::debug!("direct click on '{target}' failed: {err}");
                        Err(ActionError::NotFound(format!(
                            "'{target}' after {} strategies",
                            tried.len()
                        )))
                    }
                }
            }
        }
    })
    .await
}

async fn agent_instruction(
    ctx: &RunContext,
    instruction: &str,
    action_timeout: Duration,
) -> Result<Executed, ActionError> {
    let agent = require_agent(ctx)?;
    let limit = agent_interaction_timeout(action_timeout);
    with_retry(ctx, move || {
        bounded("waiting for agent", limit, agent.act(instruction, limit))
    })
    .await?;
    Ok(Executed::with(json!({
        "instruction": instruction,
        "timeout_ms": limit.as_millis(),
    })))
}

/// Key presses routed through either the automation backend or the agent.
struct Keyboard<'a> {
    ctx: &'a RunContext,
    agent: Option<&'a dyn Agent>,
    timeout: Duration,
}

impl<'a> Keyboard<'a> {
    fn new(
        ctx: &'a RunContext,
        mode: InteractionMode,
        timeout: Duration,
    ) -> Result<Self, ActionError> {
        let agent = match mode {
            InteractionMode::Agent => Some(require_agent(ctx)?),
            InteractionMode::Structural => None,
        };
        Ok(Self {
            ctx,
            agent,
            timeout,
        })
    }

    async fn press(&self, key: &str) -> Result<(), ActionError> {
        match self.agent {
            Some(agent) => {
                let instruction = format!("press the {key} key");
                let instruction = instruction.as_str();
                let limit = agent_interaction_timeout(self.timeout);
                with_retry(self.ctx, move || {
                    bounded("waiting for agent", limit, agent.act(instruction, limit))
                })
                .await
            }
            None => {
                let target = &ActionTarget::Key(key.to_string());
                let timeout = self.timeout;
                let options = PerformOptions {
                    timeout,
                    mode_hint: InteractionMode::Structural,
                };
                let automation = self.ctx.automation.as_ref();
                with_retry(self.ctx, move || {
                    bounded("pressing key", timeout, automation.perform(target, options))
                })
                .await
            }
        }
    }

    /// Approximate holding `keys` for `duration` by pressing them in turn
    /// every [`HOLD_PRESS_INTERVAL`]. There is no key-down/key-up pair.
    async fn hold(&self, keys: &[String], duration: Duration) -> Result<u32, ActionError> {
        let started = Instant::now();
        let mut presses = 0u32;
        while started.elapsed() < duration {
            let key = &keys[presses as usize % keys.len()];
            self.press(key).await?;
            presses += 1;
            tokio::time::sleep(HOLD_PRESS_INTERVAL).await;
        }
        Ok(presses)
    }
}

/// One or two keys for an axis input: horizontal first, then vertical.
fn axis_keys(ctx: &RunContext, x: f64, y: f64) -> Vec<String> {
    let mut keys = Vec::with_capacity(2);
    if x < 0.0 {
        keys.push(ctx.control_key("left"));
    } else if x > 0.0 {
        keys.push(ctx.control_key("right"));
    }
    if y > 0.0 {
        keys.push(ctx.control_key("up"));
    } else if y < 0.0 {
        keys.push(ctx.control_key("down"));
    }
    keys
}

async fn screenshot(ctx: &RunContext, label: &str, index: usize) -> Executed {
    let Some(capture) = ctx.capture.as_deref() else {
        log::warn!("screenshot '{label}' skipped: no capture backend configured");
        return Executed::with(json!({ "label": label, "captured": false }));
    };
    let limit = ctx.config.action_timeout();
    let captured = with_retry(ctx, move || {
        bounded("capturing screenshot", limit, capture.capture_diagnostic(label, index))
    })
    .await;
    match captured {
        Ok(()) => Executed::with(json!({ "label": label, "captured": true })),
        Err(err) => {
            log::warn!("screenshot '{label}' failed: {err}");
            Executed::with(json!({
                "label": label,
                "captured": false,
                "error": err.to_string(),
            }))
        }
    }
}

async fn observe(
    ctx: &RunContext,
    elements: &[String],
    timeout: Duration,
) -> Result<Executed, ActionError> {
    let automation = ctx.automation.as_ref();
    let mut found = Map::new();
    for element in elements {
        let located = with_retry(ctx, move || async move {
            locate_bounded(automation, element.clone(), timeout)
                .await
                .map_err(ActionError::Backend)
        })
        .await;
        let visible = match located {
            Ok(handles) => !handles.is_empty(),
            Err(err) => {
                log::debug!("observe '{element}' failed: {err}");
                false
            }
        };
        found.insert(element.clone(), Value::Bool(visible));
    }
    Ok(Executed::with(json!({ "elements": found })))
}

async fn agent_task(
    ctx: &RunContext,
    instruction: &str,
    max_steps: u32,
    timeout: Option<Duration>,
) -> Result<Executed, ActionError> {
    let agent = require_agent(ctx)?;
    let limit = agent_task_timeout(ctx, timeout);
    let metadata = into_map(json!({
        "instruction": instruction,
        "max_steps": max_steps,
        "timeout_ms": limit.as_millis(),
    }));

    let outcome = with_retry(ctx, move || {
        bounded(
            "running agent task",
            limit,
            agent.run_agent_task(instruction, max_steps, limit),
        )
    })
    .await;

    let outcome = match outcome {
        Ok(outcome) => outcome,
        Err(err) => {
            return Ok(Executed {
                metadata,
                agent_summary: None,
                failure: Some(err),
            });
        }
    };

    let summary = AgentSummary::from(outcome);
    let failure = (summary.reported_success == Some(false)).then(|| {
        ActionError::Backend(anyhow::anyhow!(
            "agent reported failure: {}",
            summary.message.as_deref().unwrap_or("no message")
        ))
    });
    Ok(Executed {
        metadata,
        agent_summary: Some(summary),
        failure,
    })
}

/// A step timeout stands in for the action timeout; the task still gets the
/// multiplier and never less than the total budget.
fn agent_task_timeout(ctx: &RunContext, step_timeout: Option<Duration>) -> Duration {
    ctx.action_timeout(step_timeout)
        .saturating_mul(AGENT_TASK_TIMEOUT_MULTIPLIER)
        .max(ctx.config.total_timeout())
}
