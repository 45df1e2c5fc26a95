//! Shared type definitions for the Trellis runtime.
//!
//! These records are the serialized vocabulary exchanged between pipeline
//! documents, the engine, and host collaborators. They carry no behavior
//! beyond construction helpers and validation.

pub mod element;
pub mod pipeline;
pub mod schema;
pub mod state;
pub mod storage;
pub mod transport;

pub use element::{Element, FieldRule, InstantiateMode, View};
pub use pipeline::{ActionDescriptor, ElementBinding, OnError, Pipeline};
pub use schema::{ConfigSchema, FieldSpec, FieldType, SchemaViolation};
pub use state::{SetPartial, StateOperation};
pub use storage::{StorageArea, StorageEnvelope, StorageMetadata, session_info_key, storage_key};
pub use transport::{ConnectionStatus, HttpRequest, HttpResponse, ResponseType};
