//! Pipeline and action descriptor definitions.
//!
//! A pipeline is an ordered list of action descriptors executed against one
//! execution context. Descriptors are immutable once loaded; their `name` is
//! the address under which results and errors are recorded.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::schema::ConfigSchema;

/// One configured unit of work inside a pipeline.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ActionDescriptor {
    /// Catalog key selecting the handler (for example `http.request`).
    pub key: String,
    /// Unique name within one pipeline run.
    pub name: String,
    /// Raw configuration; values may be literals, JSON text, or templates.
    #[serde(default)]
    pub config: Map<String, Value>,
    /// Additional constraints checked after resolution, on top of the
    /// handler's own schema.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<ConfigSchema>,
    /// Pipeline behavior when this action fails.
    #[serde(default)]
    pub on_error: OnError,
    /// Element binding used for `self.` lookups during resolution.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub element: Option<ElementBinding>,
}

impl ActionDescriptor {
    pub fn new(key: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            name: name.into(),
            config: Map::new(),
            schema: None,
            on_error: OnError::Halt,
            element: None,
        }
    }

    /// Builder-style helper used heavily by tests and embedders.
    pub fn with_config(mut self, field: impl Into<String>, value: Value) -> Self {
        self.config.insert(field.into(), value);
        self
    }

    pub fn with_on_error(mut self, on_error: OnError) -> Self {
        self.on_error = on_error;
        self
    }

    pub fn bound_to(mut self, view_id: impl Into<String>, element_id: impl Into<String>) -> Self {
        self.element = Some(ElementBinding {
            view_id: view_id.into(),
            element_id: element_id.into(),
        });
        self
    }
}

/// Failure policy for a single action.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum OnError {
    /// Stop the pipeline at this action.
    #[default]
    Halt,
    /// Record the error and keep going.
    Continue,
}

/// Identifies the element whose state slice backs `self.` lookups.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ElementBinding {
    pub view_id: String,
    pub element_id: String,
}

impl ElementBinding {
    pub fn new(view_id: impl Into<String>, element_id: impl Into<String>) -> Self {
        Self {
            view_id: view_id.into(),
            element_id: element_id.into(),
        }
    }

    /// Dot path of the bound element's slice inside the state tree.
    pub fn state_path(&self) -> String {
        format!("{}.{}", self.view_id, self.element_id)
    }
}

/// Named, ordered list of actions.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Pipeline {
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub actions: Vec<ActionDescriptor>,
}

impl Pipeline {
    /// Checks that every action carries a non-empty key and a unique,
    /// non-empty name.
    pub fn validate_names(&self) -> Result<(), String> {
        let mut seen = std::collections::HashSet::new();
        for action in &self.actions {
            if action.key.trim().is_empty() {
                return Err(format!("action '{}' is missing a key", action.name));
            }
            if action.name.trim().is_empty() {
                return Err(format!("action with key '{}' is missing a name", action.key));
            }
            if !seen.insert(action.name.as_str()) {
                return Err(format!("duplicate action name detected: '{}'", action.name));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn deserializes_descriptor_with_defaults() {
        let yaml = r#"
key: http.request
name: loadUsers
config:
  url: "https://api.example.com/users"
  method: GET
"#;
        let descriptor: ActionDescriptor = serde_yaml::from_str(yaml).expect("descriptor");
        assert_eq!(descriptor.key, "http.request");
        assert_eq!(descriptor.on_error, OnError::Halt);
        assert!(descriptor.element.is_none());
        assert_eq!(descriptor.config["method"], json!("GET"));
    }

    #[test]
    fn parses_continue_policy_and_binding() {
        let descriptor: ActionDescriptor = serde_json::from_value(json!({
            "key": "state.update",
            "name": "bump",
            "onError": "continue",
            "element": { "viewId": "pageA", "elementId": "btn1" }
        }))
        .expect("descriptor");
        assert_eq!(descriptor.on_error, OnError::Continue);
        assert_eq!(descriptor.element.map(|binding| binding.state_path()), Some("pageA.btn1".to_string()));
    }

    #[test]
    fn duplicate_action_names_are_rejected() {
        let pipeline = Pipeline {
            name: "onClick".into(),
            description: None,
            actions: vec![
                ActionDescriptor::new("state.update", "same"),
                ActionDescriptor::new("http.request", "same"),
            ],
        };
        let error = pipeline.validate_names().expect_err("duplicate");
        assert!(error.contains("duplicate action name"));
    }
}
