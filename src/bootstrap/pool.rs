//! Instance pool and resolution cache.

use super::ResolutionMode;
use super::registration::{
    AnyArc, AnyInterface, InterfaceBinding, MappingSource, Registration, StorageContext,
    StorageRegistry,
};
use crate::mapping::MappingRegistry;
use crate::storage::ConnectionCatalog;
use crate::{Error, Result};
use dashmap::DashMap;
use rayon::prelude::*;
use std::any::{Any, TypeId, type_name};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Instant;
use tracing::instrument;

/// One constructed storage instance.
struct PooledInstance {
    order: usize,
    name: String,
    instance: AnyArc,
    interfaces: Arc<Vec<InterfaceBinding>>,
}

impl PooledInstance {
    fn cast(&self, interface: TypeId) -> Option<AnyInterface> {
        self.interfaces
            .iter()
            .find(|binding| binding.type_id == interface)
            .and_then(|binding| (binding.cast)(&self.instance))
    }
}

/// Creates storage instances and resolves them by interface.
///
/// Each concrete type is instantiated at most once. The first successful
/// resolution of an interface is cached, so later resolutions return the
/// same `Arc`.
pub struct StorageBootstrap {
    mode: ResolutionMode,
    pool: DashMap<TypeId, PooledInstance>,
    cache: DashMap<TypeId, AnyInterface>,
    next_order: AtomicUsize,
}

impl Default for StorageBootstrap {
    fn default() -> Self {
        Self::new(ResolutionMode::default())
    }
}

impl StorageBootstrap {
    /// Creates an empty bootstrap.
    #[must_use]
    pub fn new(mode: ResolutionMode) -> Self {
        Self {
            mode,
            pool: DashMap::new(),
            cache: DashMap::new(),
            next_order: AtomicUsize::new(0),
        }
    }

    /// The configured resolution mode.
    #[must_use]
    pub const fn mode(&self) -> ResolutionMode {
        self.mode
    }

    /// Number of pooled instances.
    #[must_use]
    pub fn len(&self) -> usize {
        self.pool.len()
    }

    /// True when nothing has been instantiated.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pool.is_empty()
    }

    /// Registration names of pooled instances, in registration order.
    #[must_use]
    pub fn instance_names(&self) -> Vec<String> {
        let mut entries: Vec<(usize, String)> = self
            .pool
            .iter()
            .map(|entry| (entry.order, entry.name.clone()))
            .collect();
        entries.sort_unstable_by_key(|(order, _)| *order);
        entries.into_iter().map(|(_, name)| name).collect()
    }

    /// Instantiates every registration not yet pooled, in parallel.
    ///
    /// Returns the number of instances created by this call; types already in
    /// the pool are skipped.
    ///
    /// # Errors
    ///
    /// - [`Error::Configuration`] when a mapping constructor has no mapping or
    ///   its connection key is not configured.
    /// - Any error returned by a constructor.
    #[instrument(skip_all, fields(registrations = registry.len()))]
    pub fn create_instances(
        &self,
        registry: &StorageRegistry,
        mappings: &MappingRegistry,
        connections: &ConnectionCatalog,
    ) -> Result<usize> {
        let start = Instant::now();
        let registrations = registry.registrations();
        let base = self.next_order.fetch_add(registrations.len(), Ordering::SeqCst);
        let created = AtomicUsize::new(0);

        registrations
            .par_iter()
            .enumerate()
            .try_for_each(|(index, registration)| {
                if self.pool.contains_key(&registration.type_id) {
                    tracing::debug!(storage = %registration.name, "already instantiated, skipping");
                    return Ok(());
                }
                let context = build_context(registration, mappings, connections)?;
                let instance = (registration.factory)(context)?;
                self.pool
                    .entry(registration.type_id)
                    .or_insert_with(|| {
                        created.fetch_add(1, Ordering::SeqCst);
                        PooledInstance {
                            order: base + index,
                            name: registration.name.clone(),
                            instance,
                            interfaces: Arc::clone(&registration.interfaces),
                        }
                    });
                tracing::debug!(
                    storage = %registration.name,
                    interfaces = ?registration.interface_names().collect::<Vec<_>>(),
                    "storage instantiated"
                );
                Ok::<(), Error>(())
            })?;

        let created = created.into_inner();
        metrics::counter!("mapstore_storage_instances_created_total").increment(created as u64);
        tracing::info!(
            created,
            pooled = self.pool.len(),
            duration_ms = start.elapsed().as_millis(),
            "storage instances created"
        );
        Ok(created)
    }

    /// Resolves the storage implementing interface `I`.
    ///
    /// The result is cached: every later call returns the identical `Arc`.
    ///
    /// # Errors
    ///
    /// - [`Error::NotFound`] if no pooled instance implements `I`.
    /// - [`Error::Ambiguous`] if several do and the mode is
    ///   [`ResolutionMode::Strict`].
    pub fn resolve<I: ?Sized + Send + Sync + 'static>(&self) -> Result<Arc<I>> {
        let interface = TypeId::of::<I>();
        if let Some(cached) = self.cache.get(&interface) {
            return downcast_interface::<I>(&**cached.value());
        }

        let mut candidates: Vec<(usize, String, AnyInterface)> = self
            .pool
            .iter()
            .filter_map(|entry| {
                entry
                    .cast(interface)
                    .map(|value| (entry.order, entry.name.clone(), value))
            })
            .collect();
        candidates.sort_unstable_by_key(|(order, _, _)| *order);

        if candidates.len() > 1 && self.mode == ResolutionMode::Strict {
            return Err(Error::Ambiguous {
                interface: type_name::<I>(),
                candidates: candidates.into_iter().map(|(_, name, _)| name).collect(),
            });
        }
        let Some((_, name, value)) = candidates.into_iter().next() else {
            return Err(Error::not_found("storage implementation", type_name::<I>()));
        };

        tracing::debug!(interface = type_name::<I>(), storage = %name, "resolved storage");
        let cached = self.cache.entry(interface).or_insert(value);
        downcast_interface::<I>(&**cached.value())
    }

    /// Resolves a pooled instance by its concrete type.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if `C` was never instantiated.
    pub fn resolve_concrete<C: Send + Sync + 'static>(&self) -> Result<Arc<C>> {
        let entry = self
            .pool
            .get(&TypeId::of::<C>())
            .ok_or_else(|| Error::not_found("storage instance", type_name::<C>()))?;
        Arc::clone(&entry.instance)
            .downcast::<C>()
            .map_err(|_| type_mismatch(type_name::<C>()))
    }
}

impl std::fmt::Debug for StorageBootstrap {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StorageBootstrap")
            .field("mode", &self.mode)
            .field("instances", &self.instance_names())
            .field("cached_interfaces", &self.cache.len())
            .finish()
    }
}

fn build_context(
    registration: &Registration,
    mappings: &MappingRegistry,
    connections: &ConnectionCatalog,
) -> Result<Option<StorageContext>> {
    let mapping = match &registration.mapping {
        MappingSource::None => return Ok(None),
        MappingSource::External(mapping) => Arc::clone(mapping),
        MappingSource::Registry => mappings.get(&registration.name).map_err(|_| {
            Error::Configuration(format!(
                "storage '{}' is constructed from a mapping, but no mapping with that type name was loaded",
                registration.name
            ))
        })?,
    };
    let executor = connections.executor(&mapping.connection_key)?;
    Ok(Some(StorageContext::new(mapping, executor)))
}

fn downcast_interface<I: ?Sized + 'static>(value: &(dyn Any + Send + Sync)) -> Result<Arc<I>> {
    value
        .downcast_ref::<Arc<I>>()
        .cloned()
        .ok_or_else(|| type_mismatch(type_name::<I>()))
}

fn type_mismatch(name: &str) -> Error {
    Error::OperationFailed {
        operation: "resolve_storage".to_string(),
        cause: format!("pooled value is not a {name}"),
    }
}
