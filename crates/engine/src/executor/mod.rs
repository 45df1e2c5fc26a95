//! Execution engine: resolves each action's configuration, dispatches it to
//! the registered handler, and writes the outcome back into the context.
//!
//! - [`ActionRegistry`] maps action keys to typed handlers
//! - [`Services`] carries the injected stores and host seams
//! - [`Executor::execute`] runs one descriptor; [`Executor::run_pipeline`]
//!   runs an ordered list and honors each descriptor's `onError` policy
//!
//! Every executed action ends with exactly one of `results[name]` or
//! `errors[name]` written, except that a semantic failure carrying partial
//! data writes both.

mod handler;
mod notify;
mod registry;
mod services;
mod timers;
mod types;

use std::sync::Arc;
use std::time::Instant;

use serde_json::Value;
use tracing::{debug, info, warn};
use trellis_types::{ActionDescriptor, ConfigSchema, OnError, Pipeline, StorageArea};

use crate::context::ExecutionContext;
use crate::error::ActionError;
use crate::resolve::{ResolveScope, Resolver, Template};

pub use handler::{ActionEnv, ActionHandler, ActionOutput};
pub use notify::{FailureNotice, Notifier, TracingNotifier};
pub use registry::{ActionRegistry, RegistrationError};
pub use services::Services;
pub use timers::TimerRegistry;
pub use types::{ActionPhase, ActionReport, PipelineReport};

struct ExecutorInner {
    registry: ActionRegistry,
    services: Services,
    resolver: Resolver,
}

/// Cheap to clone; clones share the registry and services.
#[derive(Clone)]
pub struct Executor {
    inner: Arc<ExecutorInner>,
}

impl std::fmt::Debug for Executor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Executor")
            .field("registry", &self.inner.registry)
            .field("resolver", &self.inner.resolver)
            .finish_non_exhaustive()
    }
}

impl Executor {
    pub fn new(registry: ActionRegistry, services: Services) -> Self {
        let resolver = Resolver::new(services.config.max_interpolation_passes);
        Self {
            inner: Arc::new(ExecutorInner {
                registry,
                services,
                resolver,
            }),
        }
    }

    /// Executor over every built-in action.
    pub fn with_builtin_actions(services: Services) -> Result<Self, RegistrationError> {
        Ok(Self::new(ActionRegistry::with_builtin_actions()?, services))
    }

    pub fn registry(&self) -> &ActionRegistry {
        &self.inner.registry
    }

    pub fn services(&self) -> &Services {
        &self.inner.services
    }

    pub fn resolver(&self) -> &Resolver {
        &self.inner.resolver
    }

    /// Run one action and return its result value.
    ///
    /// The outcome is also recorded in `context`; callers decide whether a
    /// failure stops further work.
    pub async fn execute(&self, descriptor: &ActionDescriptor, context: &mut ExecutionContext) -> Result<Value, ActionError> {
        self.execute_reported(descriptor, context).await.1
    }

    /// Like [`Executor::execute`], also returning the action's report.
    pub async fn execute_reported(
        &self,
        descriptor: &ActionDescriptor,
        context: &mut ExecutionContext,
    ) -> (ActionReport, Result<Value, ActionError>) {
        let started = Instant::now();
        let mut report = ActionReport::new(&descriptor.name, &descriptor.key);
        let outcome = self.run_action(descriptor, context, &mut report).await;
        report.duration_ms = started.elapsed().as_millis() as u64;

        match &outcome {
            Ok(value) => {
                context.record_result(&descriptor.name, value.clone());
                report.advance(ActionPhase::Succeeded);
                info!(
                    action = %descriptor.name,
                    key = %descriptor.key,
                    attempts = report.attempts,
                    duration_ms = report.duration_ms,
                    "action succeeded"
                );
            }
            Err(error) => {
                let record = error.to_record(&descriptor.key);
                context.record_error(&descriptor.name, record.clone());
                if let Some(partial) = error.partial() {
                    context.results.insert(descriptor.name.clone(), partial.clone());
                }
                if let Some(attempts) = error.attempts() {
                    report.attempts = attempts;
                }
                report.error = Some(record.clone());
                report.advance(ActionPhase::Failed);
                self.inner.services.notifier.notify(&FailureNotice {
                    action: descriptor.name.clone(),
                    key: descriptor.key.clone(),
                    kind: error.kind(),
                    message: error.to_string(),
                    record,
                });
            }
        }
        (report, outcome)
    }

    async fn run_action(
        &self,
        descriptor: &ActionDescriptor,
        context: &mut ExecutionContext,
        report: &mut ActionReport,
    ) -> Result<Value, ActionError> {
        let handler = self
            .inner
            .registry
            .get(&descriptor.key)
            .ok_or_else(|| ActionError::configuration(format!("unknown action key '{}'", descriptor.key)))?;

        report.advance(ActionPhase::ResolvingConfig);
        let binding = descriptor.element.clone().or_else(|| context.binding.clone());
        let handler_schema = handler.schema();
        let resolved = {
            let local_store = self.inner.services.storage.snapshot(StorageArea::Local);
            let scope = ResolveScope::from_context(context, binding.as_ref(), local_store);
            let is_deferred =
                |field: &str| handler_schema.is_deferred(field) || descriptor.schema.as_ref().is_some_and(|schema| schema.is_deferred(field));
            Template::<Value>::new(Value::Object(descriptor.config.clone())).resolve_fields(&self.inner.resolver, &scope, is_deferred)?
        };
        validate(&descriptor.key, &handler_schema, &resolved)?;
        if let Some(schema) = &descriptor.schema {
            validate(&descriptor.key, schema, &resolved)?;
        }

        report.advance(ActionPhase::Running);
        report.attempts = 1;
        debug!(action = %descriptor.name, key = %descriptor.key, "running action");
        let mut env = ActionEnv {
            executor: self,
            context,
            descriptor,
            binding,
        };
        let output = handler.invoke(resolved, &mut env).await?;
        report.attempts = output.attempts;
        Ok(output.value)
    }

    /// Run a pipeline's actions in order.
    ///
    /// A failure stops the run unless the failing descriptor says
    /// `onError: continue`. Invalid pipelines (empty or duplicate names) do
    /// not run at all; the problem is recorded under the pipeline's name.
    pub async fn run_pipeline(&self, pipeline: &Pipeline, context: &mut ExecutionContext) -> PipelineReport {
        let mut report = PipelineReport {
            pipeline: pipeline.name.clone(),
            actions: Vec::with_capacity(pipeline.actions.len()),
            halted: false,
        };
        if let Err(reason) = pipeline.validate_names() {
            warn!(pipeline = %pipeline.name, reason = %reason, "pipeline rejected");
            let error = ActionError::configuration(reason);
            context.record_error(&pipeline.name, error.to_record("pipeline"));
            report.halted = true;
            return report;
        }

        info!(pipeline = %pipeline.name, actions = pipeline.actions.len(), "running pipeline");
        for descriptor in &pipeline.actions {
            let (action_report, outcome) = self.execute_reported(descriptor, context).await;
            report.actions.push(action_report);
            if outcome.is_err() && descriptor.on_error == OnError::Halt {
                warn!(pipeline = %pipeline.name, action = %descriptor.name, "pipeline halted");
                report.halted = true;
                break;
            }
        }
        report
    }

    /// Static checks: unique non-empty names and registered keys, including
    /// actions nested in timer configurations.
    pub fn validate_pipeline(&self, pipeline: &Pipeline) -> Vec<String> {
        let mut problems = Vec::new();
        if let Err(reason) = pipeline.validate_names() {
            problems.push(reason);
        }
        self.collect_key_problems(&pipeline.actions, &mut problems);
        problems
    }

    fn collect_key_problems(&self, actions: &[ActionDescriptor], problems: &mut Vec<String>) {
        for descriptor in actions {
            if !self.inner.registry.contains(&descriptor.key) {
                problems.push(format!(
                    "action '{}' uses unknown key '{}'",
                    descriptor.name, descriptor.key
                ));
            }
            if let Some(nested) = descriptor.config.get("actions")
                && let Ok(nested) = serde_json::from_value::<Vec<ActionDescriptor>>(nested.clone())
            {
                self.collect_key_problems(&nested, problems);
            }
        }
    }
}

fn validate(key: &str, schema: &ConfigSchema, config: &serde_json::Map<String, Value>) -> Result<(), ActionError> {
    schema
        .validate(config)
        .map_err(|violation| ActionError::configuration(format!("invalid configuration for '{}': {}", key, violation)))
}
