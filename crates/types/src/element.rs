//! Element and view records owned by the host catalog.
//!
//! Elements form a parented tree inside a view. A virtual element is a clone
//! produced by the tree instantiator; it remembers the id of the blueprint
//! element it was cloned from.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A single node in a view's element tree.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct Element {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub view_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<String>,
    #[serde(default)]
    pub children: Vec<String>,
    /// Widget kind, opaque to the runtime.
    #[serde(default, rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub config: Map<String, Value>,
    /// Id of a component view rendered inside this element.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub view_ref: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub origin_id: Option<String>,
    #[serde(default)]
    pub is_virtual: bool,
}

impl Element {
    pub fn new(id: impl Into<String>, kind: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind: kind.into(),
            ..Self::default()
        }
    }

    pub fn with_parent(mut self, parent: impl Into<String>) -> Self {
        self.parent = Some(parent.into());
        self
    }

    pub fn with_children<I, S>(mut self, children: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.children = children.into_iter().map(Into::into).collect();
        self
    }
}

/// An ordered element tree with its own identity and configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct View {
    pub id: String,
    #[serde(default)]
    pub config: Map<String, Value>,
    #[serde(default)]
    pub elements: Vec<Element>,
}

impl View {
    /// Elements without a parent inside this view.
    pub fn roots(&self) -> impl Iterator<Item = &Element> {
        self.elements.iter().filter(|element| match &element.parent {
            None => true,
            Some(parent) => parent == &self.id || !self.elements.iter().any(|candidate| &candidate.id == parent),
        })
    }
}

/// How the instantiator applies a blueprint.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub enum InstantiateMode {
    /// Apply rules to the existing element; nothing is cloned.
    Inject,
    /// Clone the blueprint into a target container.
    #[default]
    RenderInto,
}

/// Mapping or default rule addressed by blueprint element id.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FieldRule {
    pub element: String,
    pub field: String,
    #[serde(default)]
    pub value: Value,
}

impl FieldRule {
    pub fn new(element: impl Into<String>, field: impl Into<String>, value: Value) -> Self {
        Self {
            element: element.into(),
            field: field.into(),
            value,
        }
    }
}
