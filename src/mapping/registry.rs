//! Concurrent owner-type-name → mapping registry.

use super::model::{Command, Mapping};
use crate::{Error, Result};
use dashmap::DashMap;
use std::sync::Arc;

/// Registry of loaded mappings, keyed by owner type name.
///
/// Populated once (possibly from many threads) and read-only afterwards.
/// Reads never block each other.
#[derive(Debug, Default)]
pub struct MappingRegistry {
    mappings: DashMap<String, Arc<Mapping>>,
}

impl MappingRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a mapping, replacing any mapping with the same owner.
    ///
    /// Returns the replaced mapping. Under a parallel load the surviving entry
    /// depends on processing order.
    pub fn insert(&self, mapping: Mapping) -> Option<Arc<Mapping>> {
        let owner = mapping.owner_type_name.clone();
        let previous = self.mappings.insert(owner.clone(), Arc::new(mapping));
        if previous.is_some() {
            tracing::warn!(owner = %owner, "mapping owner declared more than once, replacing");
        }
        previous
    }

    /// Returns the mapping owned by `owner_type_name`.
    pub fn get(&self, owner_type_name: &str) -> Result<Arc<Mapping>> {
        self.mappings
            .get(owner_type_name)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or_else(|| Error::not_found("mapping", owner_type_name))
    }

    /// Returns a copy of one command.
    pub fn command(&self, owner_type_name: &str, key: &str) -> Result<Command> {
        self.get(owner_type_name)?.command(key).cloned()
    }

    /// Returns true if a mapping exists for `owner_type_name`.
    #[must_use]
    pub fn contains(&self, owner_type_name: &str) -> bool {
        self.mappings.contains_key(owner_type_name)
    }

    /// Returns the number of mappings.
    #[must_use]
    pub fn len(&self) -> usize {
        self.mappings.len()
    }

    /// Returns true if no mapping is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.mappings.is_empty()
    }

    /// Returns all owner names, sorted.
    #[must_use]
    pub fn owner_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.mappings.iter().map(|e| e.key().clone()).collect();
        names.sort_unstable();
        names
    }
}

impl FromIterator<Mapping> for MappingRegistry {
    fn from_iter<I: IntoIterator<Item = Mapping>>(iter: I) -> Self {
        let registry = Self::new();
        for mapping in iter {
            registry.insert(mapping);
        }
        registry
    }
}
