//! The engine: loaded mappings, connection catalog and storage pool.

use crate::bootstrap::{StorageBootstrap, StorageRegistry};
use crate::config::{ConnectionResolver, EngineConfig};
use crate::mapping::{LoadReport, MappingLoader, MappingRegistry};
use crate::storage::{ConnectionCatalog, SqlExecutor};
use crate::Result;
use std::sync::Arc;
use tracing::instrument;

/// Owns everything a process needs to resolve storage implementations.
///
/// Built once at startup, then shared. Every method takes `&self`.
#[derive(Debug)]
pub struct Engine {
    config: EngineConfig,
    mappings: Arc<MappingRegistry>,
    catalog: ConnectionCatalog,
    bootstrap: StorageBootstrap,
    load_report: LoadReport,
}

impl Engine {
    /// Loads the mapping directory named by `config` and prepares the
    /// connection catalog.
    ///
    /// # Errors
    ///
    /// Propagates mapping load failures ([`crate::Error::Configuration`],
    /// [`crate::Error::Mapping`]).
    #[instrument(skip(config), fields(mapping_dir = %config.mapping_dir.display()))]
    pub fn from_config(config: EngineConfig) -> Result<Self> {
        let loader = MappingLoader::new()
            .with_extension(config.mapping_extension.clone())
            .with_policy(config.load_policy);
        let (mappings, load_report) = loader.load_with_report(&config.mapping_dir)?;
        let resolver: Arc<dyn ConnectionResolver> = Arc::new(config.clone());
        let mut engine = Self::with_registry(config, mappings, resolver);
        engine.load_report = load_report;
        Ok(engine)
    }

    /// Builds an engine over already loaded mappings and a custom resolver.
    #[must_use]
    pub fn with_registry(
        config: EngineConfig,
        mappings: MappingRegistry,
        resolver: Arc<dyn ConnectionResolver>,
    ) -> Self {
        let catalog = ConnectionCatalog::new(resolver).with_default_timeout(config.default_timeout);
        let bootstrap = StorageBootstrap::new(config.resolution_mode);
        let load_report = LoadReport {
            discovered: mappings.len(),
            loaded: mappings.len(),
            skipped: Vec::new(),
        };
        Self {
            config,
            mappings: Arc::new(mappings),
            catalog,
            bootstrap,
            load_report,
        }
    }

    /// Instantiates every registration not yet pooled.
    ///
    /// # Errors
    ///
    /// See [`StorageBootstrap::create_instances`].
    pub fn bootstrap(&self, registry: &StorageRegistry) -> Result<usize> {
        self.bootstrap
            .create_instances(registry, &self.mappings, &self.catalog)
    }

    /// Resolves the storage implementing interface `I`.
    ///
    /// # Errors
    ///
    /// See [`StorageBootstrap::resolve`].
    pub fn resolve<I: ?Sized + Send + Sync + 'static>(&self) -> Result<Arc<I>> {
        self.bootstrap.resolve::<I>()
    }

    /// Resolves a pooled instance by concrete type.
    ///
    /// # Errors
    ///
    /// See [`StorageBootstrap::resolve_concrete`].
    pub fn resolve_concrete<C: Send + Sync + 'static>(&self) -> Result<Arc<C>> {
        self.bootstrap.resolve_concrete::<C>()
    }

    /// Executor for a connection key.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Configuration`] for an unknown key.
    pub fn executor(&self, key: &str) -> Result<Arc<SqlExecutor>> {
        self.catalog.executor(key)
    }

    /// The loaded mappings.
    #[must_use]
    pub const fn mappings(&self) -> &Arc<MappingRegistry> {
        &self.mappings
    }

    /// Summary of the mapping load.
    #[must_use]
    pub const fn load_report(&self) -> &LoadReport {
        &self.load_report
    }

    /// The configuration the engine was built from.
    #[must_use]
    pub const fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// The connection catalog.
    #[must_use]
    pub const fn catalog(&self) -> &ConnectionCatalog {
        &self.catalog
    }

    /// The storage pool.
    #[must_use]
    pub const fn storage(&self) -> &StorageBootstrap {
        &self.bootstrap
    }
}
