//! `state.update`: dispatch a `setPartial` command to the host store.

use async_trait::async_trait;
use serde_json::{Value, json};
use trellis_types::{ConfigSchema, ElementBinding, FieldSpec, FieldType, SetPartial};

use crate::error::ActionError;
use crate::executor::{ActionEnv, ActionHandler, ActionOutput};

pub struct StateUpdateAction;

/// Rewrite `self` and `self.<path>` keys onto the bound element's slice.
fn expand_self_key(key: &str, binding: Option<&ElementBinding>) -> Result<String, ActionError> {
    let rest = match key.strip_prefix("self") {
        Some("") => None,
        Some(rest) if rest.starts_with('.') => Some(&rest[1..]),
        _ => return Ok(key.to_string()),
    };
    let binding = binding.ok_or_else(|| ActionError::configuration(format!("'{}' needs an element binding", key)))?;
    Ok(match rest {
        Some(path) => format!("{}.{}", binding.state_path(), path),
        None => binding.state_path(),
    })
}

#[async_trait]
impl ActionHandler for StateUpdateAction {
    type Config = SetPartial;
    const KEY: &'static str = "state.update";

    fn schema(&self) -> ConfigSchema {
        ConfigSchema::new()
            .field("key", FieldSpec::required(FieldType::String))
            .field("payload", FieldSpec::optional(FieldType::Any))
            .field(
                "operationType",
                FieldSpec::optional(FieldType::String).one_of(
                    [
                        "set",
                        "merge",
                        "append",
                        "prepend",
                        "delete",
                        "toggle",
                        "increment",
                        "decrement",
                    ]
                    .into_iter()
                    .map(Value::from),
                ),
            )
            .field("operationConfig", FieldSpec::optional(FieldType::Object))
    }

    async fn run(&self, mut command: SetPartial, env: &mut ActionEnv<'_>) -> Result<ActionOutput, ActionError> {
        command.key = expand_self_key(&command.key, env.binding.as_ref())?;
        let key = command.key.clone();
        let state = env.state();
        state
            .dispatch(command)
            .map_err(|error| ActionError::configuration(error.to_string()))?;
        let value = state.get(&key).unwrap_or(Value::Null);
        Ok(ActionOutput::new(json!({ "key": key, "value": value })))
    }
}
