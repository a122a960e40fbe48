//! Database Module
//!
//! The handle that ties configuration, the model registry and the store
//! together.
//!
//! ## Responsibilities
//! - Own the process-scoped model registry
//! - Register models against the configured write protocol
//! - Hand out sessions (units of work) sharing one store connection

use std::sync::Arc;

use crate::config::Config;
use crate::error::Result;
use crate::schema::{ModelDef, Registry, Schema};
use crate::session::Session;
use crate::store::Store;

/// Shared database handle
///
/// Cheap to clone and safe to share between threads. Models are registered
/// once at startup; after that the registry is only read.
#[derive(Clone)]
pub struct Database {
    /// Configuration fixed at open time
    config: Config,

    /// Registered models and inbound references
    registry: Arc<Registry>,

    /// Connection to the key-value store
    store: Arc<dyn Store>,
}

impl Database {
    /// Open a database over `store`
    pub fn open(config: Config, store: Arc<dyn Store>) -> Self {
        tracing::info!(
            use_scripting = config.use_scripting,
            identity_cache = config.identity_cache,
            "opening database"
        );
        Self {
            config,
            registry: Arc::new(Registry::new()),
            store,
        }
    }

    /// Validate and register a model
    pub fn register(&self, def: ModelDef) -> Result<Arc<Schema>> {
        self.registry.register(def, self.config.use_scripting)
    }

    /// Look up a registered model by name or namespace
    pub fn model(&self, name: &str) -> Option<Arc<Schema>> {
        self.registry.get(name)
    }

    /// Start a new unit of work
    pub fn session(&self) -> Session {
        Session::new(
            Arc::clone(&self.store),
            Arc::clone(&self.registry),
            self.config.clone(),
        )
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }
}
