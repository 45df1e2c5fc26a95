//! Dynamic tree instantiation.
//!
//! A blueprint (element or view) is either cloned into a target container
//! under a fresh namespace (`renderInto`) or used in place (`inject`). In both
//! modes mapping and default rules are evaluated per element and written into
//! the element's state slice at `<viewId>.<elementId>.<field>`.

pub mod blueprint;
pub mod catalog;
pub mod namespace;
pub mod rules;

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, info};
use trellis_types::{Element, ElementBinding, FieldRule, InstantiateMode, SetPartial};
use trellis_util::{lookup, set_path};

use crate::resolve::{ResolveScope, Resolver};
use crate::state::{StateError, StateStore};
use blueprint::load_blueprint;
use catalog::{CatalogError, HostCatalog};
use namespace::{batch_ids, namespace, next_virtual_id, validate_batch};
use rules::{RuleTarget, evaluate_rule};

#[derive(Debug, Error, Clone, PartialEq)]
pub enum InstantiateError {
    #[error("no element or view named '{0}'")]
    BlueprintNotFound(String),
    #[error("target container '{0}' does not exist")]
    TargetNotFound(String),
    #[error("a target container is required to render view '{0}'")]
    MissingTarget(String),
    #[error("component views form a cycle: {0}")]
    ViewCycle(String),
    #[error("element id '{0}' appears more than once")]
    DuplicateId(String),
    #[error("element '{id}' points at parent '{parent}' outside the batch")]
    DanglingParent { id: String, parent: String },
    #[error("rule for '{element}.{field}' failed: {reason}")]
    Rule { element: String, field: String, reason: String },
    #[error(transparent)]
    Catalog(#[from] CatalogError),
    #[error(transparent)]
    State(#[from] StateError),
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct InstantiateRequest {
    pub blueprint_id: String,
    #[serde(default)]
    pub target_id: Option<String>,
    #[serde(default)]
    pub mode: InstantiateMode,
    #[serde(default)]
    pub new_root_id: Option<String>,
    #[serde(default)]
    pub mappings: Vec<FieldRule>,
    #[serde(default)]
    pub defaults: Vec<FieldRule>,
    /// Current list item when rendering collections.
    #[serde(default)]
    pub item: Option<Value>,
    #[serde(default)]
    pub index: Option<usize>,
}

/// Result of one instantiation.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Instantiation {
    pub root_id: String,
    pub element_ids: Vec<String>,
    /// False when nothing new was created (inject mode, or the root existed).
    pub created: bool,
    #[serde(skip)]
    pub elements: Vec<Element>,
}

pub struct TreeInstantiator<'a> {
    catalog: &'a dyn HostCatalog,
    resolver: &'a Resolver,
    state: &'a dyn StateStore,
}

impl<'a> TreeInstantiator<'a> {
    pub fn new(catalog: &'a dyn HostCatalog, resolver: &'a Resolver, state: &'a dyn StateStore) -> Self {
        Self {
            catalog,
            resolver,
            state,
        }
    }

    /// `scope` is the caller's template scope; rule templates are resolved
    /// against it with `self` rebound to each instantiated element.
    pub fn instantiate(&self, request: &InstantiateRequest, scope: &ResolveScope) -> Result<Instantiation, InstantiateError> {
        match request.mode {
            InstantiateMode::Inject => self.inject(request, scope),
            InstantiateMode::RenderInto => self.render_into(request, scope),
        }
    }

    fn inject(&self, request: &InstantiateRequest, scope: &ResolveScope) -> Result<Instantiation, InstantiateError> {
        let blueprint = load_blueprint(self.catalog, &request.blueprint_id)?;
        let view_id = blueprint
            .source_view
            .clone()
            .or_else(|| request.target_id.clone())
            .unwrap_or_else(|| blueprint.id.clone());
        let writes = self.plan_rules(request, &blueprint.id, &view_id, &blueprint.elements, scope)?;
        self.commit_writes(writes)?;
        debug!(blueprint = %blueprint.id, elements = blueprint.elements.len(), "rules injected");
        Ok(Instantiation {
            root_id: blueprint.root().id.clone(),
            element_ids: blueprint.elements.iter().map(|element| element.id.clone()).collect(),
            created: false,
            elements: blueprint.elements,
        })
    }

    fn render_into(&self, request: &InstantiateRequest, scope: &ResolveScope) -> Result<Instantiation, InstantiateError> {
        let blueprint = load_blueprint(self.catalog, &request.blueprint_id)?;
        let existing: HashSet<String> = self
            .catalog
            .all_elements()
            .into_iter()
            .map(|element| element.id)
            .collect();

        let root_id = match &request.new_root_id {
            Some(root_id) => root_id.clone(),
            None => next_virtual_id(&existing),
        };
        if existing.contains(&root_id) {
            info!(root = %root_id, "instantiation root already exists; skipping");
            let mut element_ids = batch_ids(&root_id, existing);
            element_ids.sort();
            return Ok(Instantiation {
                root_id,
                element_ids,
                created: false,
                elements: Vec::new(),
            });
        }

        let (view_id, target) = self.placement(request, &blueprint)?;
        let batch = namespace(&blueprint, &root_id, target.as_deref());
        validate_batch(&batch, target.as_deref())?;
        if let Some(clash) = batch.iter().find(|element| existing.contains(&element.id)) {
            return Err(InstantiateError::DuplicateId(clash.id.clone()));
        }

        // Rules are evaluated before the layout changes so a failing rule
        // leaves neither elements nor state behind.
        let writes = self.plan_rules(request, &blueprint.id, &view_id, &batch, scope)?;
        self.catalog.update_layout(&view_id, batch.clone())?;
        self.commit_writes(writes)?;
        info!(blueprint = %blueprint.id, root = %root_id, view = %view_id, elements = batch.len(), "blueprint instantiated");

        Ok(Instantiation {
            root_id,
            element_ids: batch.iter().map(|element| element.id.clone()).collect(),
            created: true,
            elements: batch,
        })
    }

    /// View that receives the batch, and the container the root hangs off.
    fn placement(
        &self,
        request: &InstantiateRequest,
        blueprint: &blueprint::Blueprint,
    ) -> Result<(String, Option<String>), InstantiateError> {
        match &request.target_id {
            Some(target) => {
                if let Some(element) = self.catalog.element(target) {
                    let view_id = element
                        .view_id
                        .ok_or_else(|| InstantiateError::TargetNotFound(target.clone()))?;
                    return Ok((view_id, Some(target.clone())));
                }
                if self.catalog.view(target).is_some() {
                    return Ok((target.clone(), Some(target.clone())));
                }
                Err(InstantiateError::TargetNotFound(target.clone()))
            }
            None => {
                let view_id = blueprint
                    .source_view
                    .clone()
                    .ok_or_else(|| InstantiateError::MissingTarget(blueprint.id.clone()))?;
                Ok((view_id, blueprint.root().parent.clone()))
            }
        }
    }

    /// Evaluate every rule against a working copy of the state tree and
    /// return the writes in order. Defaults fill absent fields; mappings
    /// always overwrite. Later rules see the values of earlier ones.
    fn plan_rules(
        &self,
        request: &InstantiateRequest,
        blueprint_id: &str,
        view_id: &str,
        elements: &[Element],
        scope: &ResolveScope,
    ) -> Result<Vec<(String, Value)>, InstantiateError> {
        let mut writes = Vec::new();
        if request.mappings.is_empty() && request.defaults.is_empty() {
            return Ok(writes);
        }
        let mut tree = self.state.get_state();
        for element in elements {
            let original = element.origin_id.as_deref().unwrap_or(&element.id);
            let defaults = request.defaults.iter().filter(|rule| rule.element == original);
            let mappings = request.mappings.iter().filter(|rule| rule.element == original);

            let binding = ElementBinding::new(view_id, element.id.clone());
            let slice_path = binding.state_path();
            let mut element_scope = scope.clone().with_binding(Some(binding));
            element_scope.set_root("state", tree.clone());
            if let Some(item) = &request.item {
                element_scope.set_root("item", item.clone());
            }
            if let Some(index) = request.index {
                element_scope.set_root("index", Value::from(index));
            }

            for (rule, overwrite) in defaults.map(|rule| (rule, false)).chain(mappings.map(|rule| (rule, true))) {
                let key = format!("{slice_path}.{}", rule.field);
                if !overwrite && lookup(&tree, &key).is_some() {
                    continue;
                }
                let target = RuleTarget {
                    element,
                    blueprint_id,
                    slice: lookup(&tree, &slice_path),
                    item: request.item.as_ref(),
                    index: request.index,
                };
                let Some(value) = evaluate_rule(self.resolver, rule, &target, &element_scope)? else {
                    continue;
                };
                set_path(&mut tree, &key, value.clone()).map_err(StateError::from)?;
                writes.push((key, value));
            }
        }
        Ok(writes)
    }

    fn commit_writes(&self, writes: Vec<(String, Value)>) -> Result<(), InstantiateError> {
        for (key, value) in writes {
            debug!(key = %key, "applying instantiation rule");
            self.state.dispatch(SetPartial::set(key, value))?;
        }
        Ok(())
    }
}
