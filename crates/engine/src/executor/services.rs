//! Collaborators shared by every action an executor runs.

use std::sync::Arc;

use crate::cache::{CacheStore, Clock, SystemClock};
use crate::config::EngineConfig;
use crate::connection::{ConnectionOptions, ConnectionRegistry, NullSocketFactory, SocketFactory};
use crate::dom::{DomEffects, LoggingDom};
use crate::instantiate::catalog::{HostCatalog, MemoryCatalog};
use crate::storage::{KeyValueStorage, NamespacedStorage};
use crate::transport::{HttpTransport, UnavailableHttpTransport};

use super::notify::{Notifier, TracingNotifier};
use super::timers::TimerRegistry;

/// Explicitly constructed stores and host seams, injected into the executor.
#[derive(Clone)]
pub struct Services {
    pub config: Arc<EngineConfig>,
    pub http: Arc<dyn HttpTransport>,
    pub cache: Arc<CacheStore>,
    pub connections: Arc<ConnectionRegistry>,
    pub storage: Arc<NamespacedStorage>,
    pub dom: Arc<dyn DomEffects>,
    pub catalog: Arc<dyn HostCatalog>,
    pub notifier: Arc<dyn Notifier>,
    pub timers: Arc<TimerRegistry>,
}

impl std::fmt::Debug for Services {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Services")
            .field("config", &self.config)
            .field("cache", &self.cache)
            .field("connections", &self.connections)
            .field("storage", &self.storage)
            .finish_non_exhaustive()
    }
}

impl Services {
    /// In-process defaults: no network transport, no sockets, memory
    /// storage, an empty catalog and log-only DOM effects.
    pub fn in_memory(config: EngineConfig) -> Self {
        let connections = ConnectionRegistry::new(Arc::new(NullSocketFactory), ConnectionOptions::from(&config));
        let storage = NamespacedStorage::in_memory(config.app_id.clone());
        Self {
            http: Arc::new(UnavailableHttpTransport),
            cache: Arc::new(CacheStore::new(Arc::new(SystemClock::default()))),
            connections,
            storage: Arc::new(storage),
            dom: Arc::new(LoggingDom),
            catalog: Arc::new(MemoryCatalog::default()),
            notifier: Arc::new(TracingNotifier),
            timers: Arc::new(TimerRegistry::default()),
            config: Arc::new(config),
        }
    }

    pub fn with_http(mut self, http: Arc<dyn HttpTransport>) -> Self {
        self.http = http;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.cache = Arc::new(CacheStore::new(clock));
        self
    }

    pub fn with_socket_factory(mut self, factory: Arc<dyn SocketFactory>) -> Self {
        self.connections = ConnectionRegistry::new(factory, ConnectionOptions::from(self.config.as_ref()));
        self
    }

    pub fn with_storage(mut self, backend: Arc<dyn KeyValueStorage>) -> Self {
        self.storage = Arc::new(NamespacedStorage::new(backend, self.config.app_id.clone()));
        self
    }

    pub fn with_dom(mut self, dom: Arc<dyn DomEffects>) -> Self {
        self.dom = dom;
        self
    }

    pub fn with_catalog(mut self, catalog: Arc<dyn HostCatalog>) -> Self {
        self.catalog = catalog;
        self
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = notifier;
        self
    }
}
