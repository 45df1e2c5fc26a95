//! Background timers running nested action lists.
//!
//! `timer.timeout` and `timer.interval` return as soon as the task is
//! registered. Each run of the nested actions gets a fresh fork of the
//! triggering context, so ticks never share results with each other or with
//! the pipeline that scheduled them.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::{debug, info};
use trellis_types::{ActionDescriptor, ConfigSchema, FieldSpec, FieldType, Pipeline};

use crate::context::ExecutionContext;
use crate::error::ActionError;
use crate::executor::{ActionEnv, ActionHandler, ActionOutput, Executor};

/// Decode and check the deferred `actions` list before scheduling it.
fn nested_pipeline(id: &str, actions: Value, env: &ActionEnv<'_>) -> Result<Pipeline, ActionError> {
    let actions: Vec<ActionDescriptor> = serde_json::from_value(actions)
        .map_err(|error| ActionError::configuration(format!("invalid nested actions: {}", error)))?;
    let pipeline = Pipeline {
        name: id.to_string(),
        description: None,
        actions,
    };
    let problems = env.executor.validate_pipeline(&pipeline);
    if !problems.is_empty() {
        return Err(ActionError::configuration(problems.join("; ")));
    }
    Ok(pipeline)
}

async fn run_tick(executor: &Executor, pipeline: &Pipeline, base: &ExecutionContext) {
    let mut context = base.fork();
    let report = executor.run_pipeline(pipeline, &mut context).await;
    debug!(timer = %pipeline.name, succeeded = report.succeeded(), "timer tick finished");
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimeoutConfig {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub delay_ms: u64,
    pub actions: Value,
}

pub struct TimeoutAction;

#[async_trait]
impl ActionHandler for TimeoutAction {
    type Config = TimeoutConfig;
    const KEY: &'static str = "timer.timeout";

    fn schema(&self) -> ConfigSchema {
        ConfigSchema::new()
            .field("id", FieldSpec::optional(FieldType::String))
            .field("delayMs", FieldSpec::optional(FieldType::Number))
            .field("actions", FieldSpec::deferred(FieldType::Array).require())
    }

    async fn run(&self, config: TimeoutConfig, env: &mut ActionEnv<'_>) -> Result<ActionOutput, ActionError> {
        let timers = Arc::clone(&env.services().timers);
        let id = config.id.unwrap_or_else(|| timers.next_id());
        let pipeline = nested_pipeline(&id, config.actions, env)?;
        let executor = env.executor.clone();
        let base = env.context.fork();
        let delay = Duration::from_millis(config.delay_ms);

        let generation = timers.reserve();
        let task_timers = Arc::clone(&timers);
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            run_tick(&executor, &pipeline, &base).await;
            task_timers.complete(&pipeline.name, generation);
        });
        timers.insert(id.clone(), generation, handle);
        info!(timer = %id, delay_ms = config.delay_ms, "timeout scheduled");
        Ok(ActionOutput::new(json!({ "id": id, "delayMs": config.delay_ms })))
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IntervalConfig {
    #[serde(default)]
    pub id: Option<String>,
    pub interval_ms: u64,
    /// Stop after this many ticks; unbounded when absent.
    #[serde(default)]
    pub max_ticks: Option<u64>,
    pub actions: Value,
}

pub struct IntervalAction;

#[async_trait]
impl ActionHandler for IntervalAction {
    type Config = IntervalConfig;
    const KEY: &'static str = "timer.interval";

    fn schema(&self) -> ConfigSchema {
        ConfigSchema::new()
            .field("id", FieldSpec::optional(FieldType::String))
            .field("intervalMs", FieldSpec::required(FieldType::Number))
            .field("maxTicks", FieldSpec::optional(FieldType::Number))
            .field("actions", FieldSpec::deferred(FieldType::Array).require())
    }

    async fn run(&self, config: IntervalConfig, env: &mut ActionEnv<'_>) -> Result<ActionOutput, ActionError> {
        if config.interval_ms == 0 {
            return Err(ActionError::configuration("intervalMs must be greater than zero"));
        }
        let timers = Arc::clone(&env.services().timers);
        let id = config.id.unwrap_or_else(|| timers.next_id());
        let pipeline = nested_pipeline(&id, config.actions, env)?;
        let executor = env.executor.clone();
        let base = env.context.fork();
        let period = Duration::from_millis(config.interval_ms);
        let max_ticks = config.max_ticks;

        let generation = timers.reserve();
        let task_timers = Arc::clone(&timers);
        let handle = tokio::spawn(async move {
            let mut ticks = 0u64;
            while max_ticks.is_none_or(|max| ticks < max) {
                tokio::time::sleep(period).await;
                run_tick(&executor, &pipeline, &base).await;
                ticks += 1;
            }
            task_timers.complete(&pipeline.name, generation);
        });
        timers.insert(id.clone(), generation, handle);
        info!(timer = %id, interval_ms = config.interval_ms, "interval scheduled");
        Ok(ActionOutput::new(json!({ "id": id, "intervalMs": config.interval_ms })))
    }
}

#[derive(Debug, Deserialize)]
pub struct ClearConfig {
    pub id: String,
}

pub struct ClearTimerAction;

#[async_trait]
impl ActionHandler for ClearTimerAction {
    type Config = ClearConfig;
    const KEY: &'static str = "timer.clear";

    fn schema(&self) -> ConfigSchema {
        ConfigSchema::new().field("id", FieldSpec::required(FieldType::String))
    }

    async fn run(&self, config: ClearConfig, env: &mut ActionEnv<'_>) -> Result<ActionOutput, ActionError> {
        let cleared = env.services().timers.cancel(&config.id);
        debug!(timer = %config.id, cleared, "timer clear requested");
        Ok(ActionOutput::new(json!({ "id": config.id, "cleared": cleared })))
    }
}
