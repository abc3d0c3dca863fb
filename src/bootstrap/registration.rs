//! Explicit storage registrations.
//!
//! Each registration names a concrete storage type, how to construct it, and
//! which interfaces (trait objects) it can be resolved as.

use crate::mapping::{Command, Mapping};
use crate::storage::{MappedStorage, SqlExecutor};
use crate::{Error, Result};
use std::any::{Any, TypeId, type_name};
use std::marker::PhantomData;
use std::sync::Arc;

/// A type-erased pooled instance.
pub(crate) type AnyArc = Arc<dyn Any + Send + Sync>;

/// A type-erased `Arc<I>` for some interface `I`.
pub(crate) type AnyInterface = Box<dyn Any + Send + Sync>;

type CastFn = Arc<dyn Fn(&AnyArc) -> Option<AnyInterface> + Send + Sync>;
type FactoryFn = Arc<dyn Fn(Option<StorageContext>) -> Result<AnyArc> + Send + Sync>;

/// What a mapping-constructed storage receives.
#[derive(Debug, Clone)]
pub struct StorageContext {
    mapping: Arc<Mapping>,
    executor: Arc<SqlExecutor>,
}

impl StorageContext {
    /// Creates a context from a mapping and the executor of its connection key.
    #[must_use]
    pub const fn new(mapping: Arc<Mapping>, executor: Arc<SqlExecutor>) -> Self {
        Self { mapping, executor }
    }

    /// The storage type's mapping.
    #[must_use]
    pub fn mapping(&self) -> &Mapping {
        &self.mapping
    }

    /// Executor bound to the mapping's connection key.
    #[must_use]
    pub fn executor(&self) -> &Arc<SqlExecutor> {
        &self.executor
    }

    /// Looks up one command of the mapping.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] for an unknown key.
    pub fn command(&self, key: &str) -> Result<&Command> {
        self.mapping.command(key)
    }

    /// Converts into a [`MappedStorage`] over the mapping's commands.
    #[must_use]
    pub fn into_mapped(self) -> MappedStorage {
        MappedStorage::new(self.executor, self.mapping)
    }
}

/// How a registered storage type is constructed.
pub enum Constructor<C> {
    /// Built from its mapping and executor.
    WithMapping(Arc<dyn Fn(StorageContext) -> Result<C> + Send + Sync>),
    /// Built without arguments.
    Default(Arc<dyn Fn() -> C + Send + Sync>),
}

impl<C> Constructor<C> {
    /// A constructor that receives the type's [`StorageContext`].
    #[must_use]
    pub fn with_mapping(f: impl Fn(StorageContext) -> Result<C> + Send + Sync + 'static) -> Self {
        Self::WithMapping(Arc::new(f))
    }

    /// A zero-argument constructor.
    #[must_use]
    pub fn default(f: impl Fn() -> C + Send + Sync + 'static) -> Self {
        Self::Default(Arc::new(f))
    }

    const fn needs_mapping(&self) -> bool {
        matches!(self, Self::WithMapping(_))
    }
}

impl<C> std::fmt::Debug for Constructor<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::WithMapping(_) => f.write_str("Constructor::WithMapping"),
            Self::Default(_) => f.write_str("Constructor::Default"),
        }
    }
}

/// Where a mapping constructor gets its mapping from.
#[derive(Debug, Clone)]
pub(crate) enum MappingSource {
    /// Default constructor, no mapping.
    None,
    /// Looked up in the mapping registry by registration name.
    Registry,
    /// Supplied at registration time.
    External(Arc<Mapping>),
}

/// One interface a concrete type can be resolved as.
#[derive(Clone)]
pub(crate) struct InterfaceBinding {
    pub type_id: TypeId,
    pub name: &'static str,
    pub cast: CastFn,
}

impl std::fmt::Debug for InterfaceBinding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name)
    }
}

/// A type-erased registration.
#[derive(Clone)]
pub(crate) struct Registration {
    pub name: String,
    pub type_id: TypeId,
    pub type_name: &'static str,
    pub mapping: MappingSource,
    pub factory: FactoryFn,
    pub interfaces: Arc<Vec<InterfaceBinding>>,
}

impl Registration {
    fn new<C: Send + Sync + 'static>(constructor: Constructor<C>, mapping: MappingSource) -> Self {
        let factory: FactoryFn = match constructor {
            Constructor::WithMapping(build) => Arc::new(move |context: Option<StorageContext>| -> Result<AnyArc> {
                let context = context.ok_or_else(|| {
                    Error::Configuration(format!("{} requires a storage context", type_name::<C>()))
                })?;
                Ok(Arc::new(build(context)?) as AnyArc)
            }),
            Constructor::Default(build) => {
                Arc::new(move |_: Option<StorageContext>| -> Result<AnyArc> { Ok(Arc::new(build()) as AnyArc) })
            },
        };

        let concrete = InterfaceBinding {
            type_id: TypeId::of::<C>(),
            name: type_name::<C>(),
            cast: Arc::new(|instance: &AnyArc| -> Option<AnyInterface> {
                let concrete = Arc::clone(instance).downcast::<C>().ok()?;
                Some(Box::new(concrete) as AnyInterface)
            }),
        };

        Self {
            name: type_name::<C>().to_string(),
            type_id: TypeId::of::<C>(),
            type_name: type_name::<C>(),
            mapping,
            factory,
            interfaces: Arc::new(vec![concrete]),
        }
    }

    pub(crate) fn interface_names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.interfaces.iter().map(|binding| binding.name)
    }
}

impl std::fmt::Debug for Registration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registration")
            .field("name", &self.name)
            .field("type_name", &self.type_name)
            .field("mapping", &self.mapping)
            .field("interfaces", &self.interfaces)
            .finish_non_exhaustive()
    }
}

/// The registration table consumed by the bootstrap.
///
/// # Examples
///
/// ```ignore
/// let mut registry = StorageRegistry::new();
/// registry
///     .register(Constructor::with_mapping(|ctx| Ok(SqlUserStore::new(ctx.into_mapped()))))
///     .named("app::storage::UserStorage")
///     .implements::<dyn UserStore>(|s| s);
/// registry
///     .register(Constructor::default(InMemoryAuditLog::new))
///     .implements::<dyn AuditLog>(|s| s);
/// ```
#[derive(Debug, Default, Clone)]
pub struct StorageRegistry {
    registrations: Vec<Registration>,
}

impl StorageRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a concrete storage type.
    ///
    /// The registration is named after the type (`std::any::type_name`);
    /// a mapping constructor reads the mapping with that owner name unless
    /// renamed with [`RegistrationBuilder::named`]. Registering a type again
    /// replaces the earlier registration.
    pub fn register<C: Send + Sync + 'static>(&mut self, constructor: Constructor<C>) -> RegistrationBuilder<'_, C> {
        let source = if constructor.needs_mapping() {
            MappingSource::Registry
        } else {
            MappingSource::None
        };
        self.push(Registration::new(constructor, source))
    }

    /// Registers a storage type built from an externally supplied mapping.
    pub fn register_with_mapping<C: Send + Sync + 'static>(
        &mut self,
        mapping: Mapping,
        build: impl Fn(StorageContext) -> Result<C> + Send + Sync + 'static,
    ) -> RegistrationBuilder<'_, C> {
        let owner = mapping.owner_type_name.clone();
        let mut registration = Registration::new(
            Constructor::with_mapping(build),
            MappingSource::External(Arc::new(mapping)),
        );
        registration.name = owner;
        self.push(registration)
    }

    fn push<C>(&mut self, registration: Registration) -> RegistrationBuilder<'_, C> {
        self.registrations
            .retain(|existing| existing.type_id != registration.type_id);
        self.registrations.push(registration);
        let index = self.registrations.len() - 1;
        RegistrationBuilder {
            registration: &mut self.registrations[index],
            _concrete: PhantomData,
        }
    }

    /// Number of registrations.
    #[must_use]
    pub fn len(&self) -> usize {
        self.registrations.len()
    }

    /// True when nothing is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.registrations.is_empty()
    }

    /// Registration names in registration order.
    #[must_use]
    pub fn names(&self) -> Vec<&str> {
        self.registrations.iter().map(|r| r.name.as_str()).collect()
    }

    pub(crate) fn registrations(&self) -> &[Registration] {
        &self.registrations
    }
}

/// Refines a registration just added to a [`StorageRegistry`].
pub struct RegistrationBuilder<'r, C> {
    registration: &'r mut Registration,
    _concrete: PhantomData<fn() -> C>,
}

impl<C: Send + Sync + 'static> RegistrationBuilder<'_, C> {
    /// Overrides the registration name (the mapping owner name).
    pub fn named(self, name: impl Into<String>) -> Self {
        self.registration.name = name.into();
        self
    }

    /// Declares that the type can be resolved as interface `I`.
    ///
    /// `cast` is normally the identity closure `|s| s`, which unsizes
    /// `Arc<C>` to `Arc<dyn Trait>`.
    pub fn implements<I: ?Sized + Send + Sync + 'static>(self, cast: fn(Arc<C>) -> Arc<I>) -> Self {
        let binding = InterfaceBinding {
            type_id: TypeId::of::<I>(),
            name: type_name::<I>(),
            cast: Arc::new(move |instance: &AnyArc| -> Option<AnyInterface> {
                let concrete = Arc::clone(instance).downcast::<C>().ok()?;
                Some(Box::new(cast(concrete)) as AnyInterface)
            }),
        };
        let interfaces = Arc::make_mut(&mut self.registration.interfaces);
        interfaces.retain(|existing| existing.type_id != binding.type_id);
        interfaces.push(binding);
        self
    }
}

impl<C> std::fmt::Debug for RegistrationBuilder<'_, C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("RegistrationBuilder")
            .field(&self.registration.name)
            .finish()
    }
}
