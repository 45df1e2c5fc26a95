//! Host element/view catalog.

use std::sync::{PoisonError, RwLock};

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;
use trellis_types::{Element, View};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CatalogError {
    #[error("unknown view '{0}'")]
    UnknownView(String),
    #[error("element id '{0}' already exists")]
    DuplicateElement(String),
}

/// Read access to elements and views, plus layout updates.
pub trait HostCatalog: Send + Sync {
    /// Every element of every view, with `view_id` filled in.
    fn all_elements(&self) -> Vec<Element>;

    fn view(&self, id: &str) -> Option<View>;

    /// Append `elements` to the view and link each one into its parent's
    /// `children` list when the parent already exists.
    fn update_layout(&self, view_id: &str, elements: Vec<Element>) -> Result<(), CatalogError>;

    fn element(&self, id: &str) -> Option<Element> {
        self.all_elements().into_iter().find(|element| element.id == id)
    }
}

/// Serialized catalog document: `{ "views": [...] }`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CatalogDocument {
    #[serde(default)]
    pub views: Vec<View>,
}

#[derive(Debug, Default)]
pub struct MemoryCatalog {
    views: RwLock<IndexMap<String, View>>,
}

impl MemoryCatalog {
    pub fn new(views: impl IntoIterator<Item = View>) -> Self {
        let views = views
            .into_iter()
            .map(|mut view| {
                for element in &mut view.elements {
                    element.view_id.get_or_insert_with(|| view.id.clone());
                }
                (view.id.clone(), view)
            })
            .collect();
        Self {
            views: RwLock::new(views),
        }
    }

    pub fn from_document(document: CatalogDocument) -> Self {
        Self::new(document.views)
    }

    pub fn to_document(&self) -> CatalogDocument {
        let views = self.views.read().unwrap_or_else(PoisonError::into_inner);
        CatalogDocument {
            views: views.values().cloned().collect(),
        }
    }
}

impl HostCatalog for MemoryCatalog {
    fn all_elements(&self) -> Vec<Element> {
        let views = self.views.read().unwrap_or_else(PoisonError::into_inner);
        views.values().flat_map(|view| view.elements.iter().cloned()).collect()
    }

    fn view(&self, id: &str) -> Option<View> {
        self.views.read().unwrap_or_else(PoisonError::into_inner).get(id).cloned()
    }

    fn update_layout(&self, view_id: &str, elements: Vec<Element>) -> Result<(), CatalogError> {
        let mut views = self.views.write().unwrap_or_else(PoisonError::into_inner);
        let duplicate = elements.iter().find(|added| {
            views
                .values()
                .flat_map(|view| view.elements.iter())
                .any(|existing| existing.id == added.id)
        });
        if let Some(duplicate) = duplicate {
            return Err(CatalogError::DuplicateElement(duplicate.id.clone()));
        }
        let view = views
            .get_mut(view_id)
            .ok_or_else(|| CatalogError::UnknownView(view_id.to_string()))?;

        for added in &elements {
            let Some(parent) = &added.parent else { continue };
            if let Some(existing) = view.elements.iter_mut().find(|candidate| &candidate.id == parent)
                && !existing.children.contains(&added.id)
            {
                existing.children.push(added.id.clone());
            }
        }
        debug!(view = view_id, added = elements.len(), "layout updated");
        view.elements.extend(elements.into_iter().map(|mut element| {
            element.view_id = Some(view_id.to_string());
            element
        }));
        Ok(())
    }
}
