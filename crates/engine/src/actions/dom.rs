//! `dom.effect`: hand a typed request to the host's effect executor.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Map, Value};
use trellis_types::{ConfigSchema, FieldSpec, FieldType};

use crate::dom::{DomActionType, normalize_dom_result};
use crate::error::ActionError;
use crate::executor::{ActionEnv, ActionHandler, ActionOutput};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DomEffectConfig {
    pub action_type: DomActionType,
    /// Every other field is an option for the host.
    #[serde(flatten)]
    pub options: Map<String, Value>,
}

pub struct DomEffectAction;

#[async_trait]
impl ActionHandler for DomEffectAction {
    type Config = DomEffectConfig;
    const KEY: &'static str = "dom.effect";

    fn schema(&self) -> ConfigSchema {
        ConfigSchema::new().field("actionType", FieldSpec::required(FieldType::String))
    }

    async fn run(&self, config: DomEffectConfig, env: &mut ActionEnv<'_>) -> Result<ActionOutput, ActionError> {
        let action = config.action_type;
        if let Some(missing) = action
            .required_options()
            .iter()
            .find(|option| config.options.get(**option).is_none_or(Value::is_null))
        {
            return Err(ActionError::configuration(format!(
                "'{}' requires the '{}' option",
                action.as_str(),
                missing
            )));
        }
        let outcome = env
            .services()
            .dom
            .perform(action, &config.options)
            .await
            .map_err(ActionError::operation)?;
        Ok(ActionOutput::new(normalize_dom_result(action, outcome)))
    }
}
