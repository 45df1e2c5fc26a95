//! `code.run`: evaluate a sandboxed expression against the current context.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use trellis_types::{ConfigSchema, FieldSpec, FieldType};

use crate::error::ActionError;
use crate::executor::{ActionEnv, ActionHandler, ActionOutput};
use crate::guard::looks_like_function;

#[derive(Debug, Deserialize)]
pub struct CodeRunConfig {
    pub code: String,
}

pub struct CodeRunAction;

#[async_trait]
impl ActionHandler for CodeRunAction {
    type Config = CodeRunConfig;
    const KEY: &'static str = "code.run";

    fn schema(&self) -> ConfigSchema {
        ConfigSchema::new().field("code", FieldSpec::deferred(FieldType::String).require())
    }

    async fn run(&self, config: CodeRunConfig, env: &mut ActionEnv<'_>) -> Result<ActionOutput, ActionError> {
        if looks_like_function(&config.code) {
            return Err(ActionError::sandbox("function bodies are not executed"));
        }
        match env.resolver().evaluate_code(&config.code, &env.scope()) {
            Ok(value) => Ok(ActionOutput::new(value.unwrap_or(Value::Null))),
            Err(error) if error.is_violation() => Err(ActionError::sandbox(error.to_string())),
            Err(error) => Err(ActionError::configuration(error.to_string())),
        }
    }
}
