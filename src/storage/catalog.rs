//! Connection-key → executor lookup.

use super::connection::SqliteConnectionFactory;
use super::executor::SqlExecutor;
use crate::Result;
use crate::config::ConnectionResolver;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;

/// Builds and caches one [`SqlExecutor`] per connection key.
///
/// Settings are resolved lazily on first use, so mappings that are never
/// instantiated do not need a configured connection.
pub struct ConnectionCatalog {
    resolver: Arc<dyn ConnectionResolver>,
    executors: DashMap<String, Arc<SqlExecutor>>,
    default_timeout: Option<Duration>,
}

impl ConnectionCatalog {
    /// Creates a catalog over a connection resolver.
    #[must_use]
    pub fn new(resolver: Arc<dyn ConnectionResolver>) -> Self {
        Self {
            resolver,
            executors: DashMap::new(),
            default_timeout: None,
        }
    }

    /// Sets the timeout applied when a command declares none.
    #[must_use]
    pub const fn with_default_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.default_timeout = timeout;
        self
    }

    /// Registers a pre-built executor under `key`, replacing any cached one.
    pub fn insert(&self, key: impl Into<String>, executor: Arc<SqlExecutor>) {
        self.executors.insert(key.into(), executor);
    }

    /// Returns the executor for `key`, creating it on first use.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Configuration`] if the key is not configured or
    /// its provider is not supported.
    pub fn executor(&self, key: &str) -> Result<Arc<SqlExecutor>> {
        if let Some(existing) = self.executors.get(key) {
            return Ok(Arc::clone(existing.value()));
        }

        let settings = self.resolver.resolve(key)?;
        let factory = SqliteConnectionFactory::from_settings(&settings)?;
        tracing::debug!(
            key,
            provider = %settings.provider_name,
            "created executor for connection key"
        );
        let executor = Arc::new(
            SqlExecutor::new(Arc::new(factory)).with_default_timeout(self.default_timeout),
        );
        let entry = self.executors.entry(key.to_string()).or_insert(executor);
        Ok(Arc::clone(entry.value()))
    }

    /// Connection keys with a cached executor, sorted.
    #[must_use]
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.executors.iter().map(|e| e.key().clone()).collect();
        keys.sort();
        keys
    }
}

impl std::fmt::Debug for ConnectionCatalog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionCatalog")
            .field("keys", &self.keys())
            .field("default_timeout", &self.default_timeout)
            .finish_non_exhaustive()
    }
}
