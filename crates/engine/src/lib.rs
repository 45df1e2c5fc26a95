//! # Trellis Engine
//!
//! Runtime for declarative action pipelines. A pipeline is an ordered list of
//! action descriptors; the engine resolves each descriptor's `{{...}}`
//! templates against the current execution context, dispatches it to the
//! registered handler and records the outcome under the action's name.
//!
//! ## Usage
//!
//! ```rust
//! use trellis_engine::parse_pipeline_file;
//!
//! let temp_dir = tempfile::tempdir()?;
//! let pipeline_path = temp_dir.path().join("pipeline.yaml");
//! std::fs::write(&pipeline_path, r#"
//! name: "greet"
//! actions:
//!   - key: state.update
//!     name: setGreeting
//!     config:
//!       key: pageA.title.text
//!       payload: "Hello {{event.user}}"
//! "#)?;
//!
//! let bundle = parse_pipeline_file(&pipeline_path)?;
//! assert_eq!(bundle.pipelines["greet"].actions.len(), 1);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! ## Architecture
//!
//! - **`resolve`**: template markers, scoped lookups and typed templates
//! - **`expr`**: the restricted expression language behind conditions and
//!   inline code
//! - **`executor`**: action registry, injected services and the executor
//! - **`actions`**: built-in handlers (HTTP, GraphQL, sockets, state,
//!   storage, DOM effects, timers, code, tree instantiation)
//! - **`cache`**, **`retry`**, **`connection`**: shared network plumbing
//! - **`instantiate`**: blueprint cloning into the host layout

use std::{fs, path::Path};

use anyhow::{Context, Result};
use indexmap::IndexMap;
use serde::Deserialize;
use trellis_types::{ActionDescriptor, Pipeline};

pub mod actions;
pub mod cache;
pub mod config;
pub mod connection;
pub mod context;
pub mod dom;
pub mod error;
pub mod executor;
pub mod expr;
pub mod guard;
pub mod instantiate;
pub mod resolve;
pub mod retry;
pub mod state;
pub mod storage;
pub mod transport;

pub use cache::{CacheStore, Clock, ManualClock, SystemClock};
pub use config::{EngineConfig, load_config, load_config_from_path};
pub use connection::{ConnectionRegistry, ConnectionSnapshot, SocketEvent, SocketFactory, SocketTransport};
pub use context::ExecutionContext;
pub use error::{ActionError, ErrorKind};
pub use executor::{
    ActionEnv, ActionHandler, ActionOutput, ActionPhase, ActionRegistry, ActionReport, Executor, Notifier, PipelineReport,
    RegistrationError, Services,
};
pub use instantiate::catalog::{CatalogDocument, HostCatalog, MemoryCatalog};
pub use instantiate::{InstantiateError, InstantiateRequest, Instantiation, TreeInstantiator};
pub use resolve::{ResolveError, ResolveScope, Resolver, Template};
pub use retry::{RetryPolicy, with_retry};
pub use state::{MemoryStateStore, StateError, StateStore};
pub use storage::{KeyValueStorage, MemoryStorage, NamespacedStorage};
pub use transport::{HttpTransport, ReqwestTransport, TransportError};

/// Pipelines loaded from one document, in document order.
#[derive(Debug, Clone, Default)]
pub struct PipelineBundle {
    pub pipelines: IndexMap<String, Pipeline>,
}

/// Loads a pipeline document (YAML or JSON).
///
/// Accepts either a bundle with pipelines under a `pipelines` key, or a
/// single pipeline with `name` and `actions`. Bundle entries without a name
/// take their key as name; a single pipeline without a name is `default`.
pub fn parse_pipeline_file(file_path: impl AsRef<Path>) -> Result<PipelineBundle> {
    let file_path = file_path.as_ref();
    let content = fs::read_to_string(file_path).with_context(|| format!("Failed to read pipeline file: {}", file_path.display()))?;
    parse_pipeline_str(&content)
}

pub fn parse_pipeline_str(content: &str) -> Result<PipelineBundle> {
    // Bundle first so a bundle is never read as an empty single pipeline.
    #[derive(Deserialize)]
    struct BundleDocument {
        pipelines: IndexMap<String, Pipeline>,
    }

    #[derive(Deserialize)]
    struct SingleDocument {
        #[serde(default)]
        name: Option<String>,
        #[serde(default)]
        description: Option<String>,
        actions: Vec<ActionDescriptor>,
    }

    if let Ok(bundle) = serde_yaml::from_str::<BundleDocument>(content) {
        let pipelines = bundle
            .pipelines
            .into_iter()
            .map(|(key, mut pipeline)| {
                if pipeline.name.trim().is_empty() {
                    pipeline.name = key.clone();
                }
                (key, pipeline)
            })
            .collect();
        return Ok(PipelineBundle { pipelines });
    }

    match serde_yaml::from_str::<SingleDocument>(content) {
        Ok(single) => {
            let name = single
                .name
                .filter(|name| !name.trim().is_empty())
                .unwrap_or_else(|| "default".to_string());
            let mut pipelines = IndexMap::new();
            pipelines.insert(
                name.clone(),
                Pipeline {
                    name,
                    description: single.description,
                    actions: single.actions,
                },
            );
            Ok(PipelineBundle { pipelines })
        }
        Err(error) => anyhow::bail!(
            "Unsupported pipeline document format ({}). Expected one of:\n\
             - Single pipeline with 'name' and 'actions' fields\n\
             - Bundle with pipelines under a 'pipelines' key",
            error
        ),
    }
}
