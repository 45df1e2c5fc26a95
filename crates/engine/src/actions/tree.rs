//! `tree.instantiate`: clone a blueprint into the host layout.
//!
//! `mappings` and `defaults` are deferred: their templates are resolved per
//! instantiated element, with `self` bound to that element's slice.

use async_trait::async_trait;
use serde_json::{Value, json};
use tracing::info;
use trellis_types::{ConfigSchema, FieldSpec, FieldType};

use crate::error::ActionError;
use crate::executor::{ActionEnv, ActionHandler, ActionOutput};
use crate::instantiate::{InstantiateRequest, TreeInstantiator};

pub struct TreeInstantiateAction;

#[async_trait]
impl ActionHandler for TreeInstantiateAction {
    type Config = InstantiateRequest;
    const KEY: &'static str = "tree.instantiate";

    fn schema(&self) -> ConfigSchema {
        ConfigSchema::new()
            .field("blueprintId", FieldSpec::required(FieldType::String))
            .field("targetId", FieldSpec::optional(FieldType::String))
            .field(
                "mode",
                FieldSpec::optional(FieldType::String).one_of([json!("inject"), json!("renderInto")]),
            )
            .field("newRootId", FieldSpec::optional(FieldType::String))
            .field("mappings", FieldSpec::deferred(FieldType::Array))
            .field("defaults", FieldSpec::deferred(FieldType::Array))
            .field("item", FieldSpec::optional(FieldType::Any))
            .field("index", FieldSpec::optional(FieldType::Number))
    }

    async fn run(&self, request: InstantiateRequest, env: &mut ActionEnv<'_>) -> Result<ActionOutput, ActionError> {
        let state = env.state();
        let scope = env.scope();
        let instantiation = TreeInstantiator::new(env.services().catalog.as_ref(), env.resolver(), state.as_ref())
            .instantiate(&request, &scope)
            .map_err(|error| ActionError::configuration(error.to_string()))?;
        info!(
            blueprint = %request.blueprint_id,
            root = %instantiation.root_id,
            created = instantiation.created,
            elements = instantiation.element_ids.len(),
            "tree instantiated"
        );
        let value: Value = json!({
            "rootId": instantiation.root_id,
            "elementIds": instantiation.element_ids,
            "created": instantiation.created,
        });
        Ok(ActionOutput::new(value))
    }
}
