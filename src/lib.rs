//! # mapstore
//!
//! SQL command mapping and storage bootstrap engine.
//!
//! mapstore loads externally authored SQL commands from mapping files,
//! builds storage implementations from an explicit registration table and
//! resolves them by the trait they implement, runs queries and transactions
//! over `SQLite` with strict connection-lifetime rules, and generates
//! dialect-specific SQL including two pagination strategies.
//!
//! ## Layout
//!
//! - [`mapping`]: command model, mapping file loader, mapping registry
//! - [`bootstrap`]: storage registrations, instance pool, resolution cache
//! - [`storage`]: connection leases, transactions, query primitives
//! - [`sql`]: column descriptors, statement builder, paging dialects
//! - [`engine`]: the value that ties the above together
//!
//! ## Example
//!
//! ```rust,ignore
//! use mapstore::{Engine, EngineConfig, Params};
//!
//! let engine = Engine::from_config(EngineConfig::load_from_file("mapstore.toml".as_ref())?)?;
//! let users = engine.resolve::<dyn UserStore>()?;
//! let page = users.page(1, 20)?;
//! ```

#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![warn(missing_docs)]
#![forbid(unsafe_code)]
#![allow(clippy::multiple_crate_versions)]

use std::path::PathBuf;
use thiserror::Error as ThisError;

pub mod bootstrap;
pub mod config;
pub mod engine;
pub mod mapping;
pub mod observability;
pub mod sql;
pub mod storage;

pub use bootstrap::{Constructor, ResolutionMode, StorageBootstrap, StorageContext, StorageRegistry};
pub use config::{ConnectionResolver, ConnectionSettings, EngineConfig, LoadPolicy};
pub use engine::Engine;
pub use mapping::{Command, CommandKind, CommandSource, Mapping, MappingLoader, MappingRegistry};
pub use sql::{
    BuiltSql, ClauseColumn, Column, Combinator, Dialect, Operator, SortableColumn, SqlBuilder,
    ValueColumn,
};
pub use storage::{
    FromRow, IsolationLevel, MappedStorage, PagedResult, Params, SqlExecutor, Transaction, Value,
};

/// Error type for mapstore operations.
///
/// # Error Variant Triggers
///
/// | Variant | Raised When |
/// |---------|-------------|
/// | `Configuration` | Missing mapping directory, no mapping files, unknown connection key |
/// | `Mapping` | A mapping file cannot be read or parsed |
/// | `NotFound` | Unknown owner type, command key, or unimplemented interface |
/// | `Ambiguous` | Strict resolution finds more than one implementation |
/// | `InvalidArgument` | Blank SQL, `IN` bound to a scalar, invalid identifiers |
/// | `MissingCondition` | `UPDATE`/`DELETE` without clause columns |
/// | `Unsupported` | Command kind not available on the active provider |
/// | `Database` | The `SQLite` driver reports an error |
/// | `OperationFailed` | I/O and other operational failures |
#[derive(Debug, ThisError)]
pub enum Error {
    /// Configuration is missing or invalid.
    ///
    /// Raised at load or construction time; never retried.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// A mapping definition file could not be loaded.
    #[error("invalid mapping file '{}': {cause}", path.display())]
    Mapping {
        /// The offending file.
        path: PathBuf,
        /// The underlying parse or read failure.
        cause: String,
    },

    /// A looked-up entity does not exist.
    #[error("{kind} not found: {name}")]
    NotFound {
        /// What was being looked up (e.g. "mapping", "command").
        kind: &'static str,
        /// The requested name.
        name: String,
    },

    /// More than one pooled instance implements the requested interface.
    #[error("ambiguous resolution for {interface}: implemented by {candidates:?}")]
    Ambiguous {
        /// The requested interface.
        interface: &'static str,
        /// Registration names of every matching instance.
        candidates: Vec<String>,
    },

    /// A caller supplied an invalid argument.
    ///
    /// Always raised before a connection is opened.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// An `UPDATE` or `DELETE` was requested without any clause column.
    #[error("{statement} on '{table}' requires at least one clause column")]
    MissingCondition {
        /// Statement kind (`UPDATE` or `DELETE`).
        statement: &'static str,
        /// Target table.
        table: String,
    },

    /// The operation is not supported by the active provider.
    #[error("unsupported: {0}")]
    Unsupported(String),

    /// The database driver reported an error.
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// An operation failed.
    #[error("operation '{operation}' failed: {cause}")]
    OperationFailed {
        /// The operation that failed.
        operation: String,
        /// The underlying cause.
        cause: String,
    },
}

impl Error {
    pub(crate) fn not_found(kind: &'static str, name: impl Into<String>) -> Self {
        Self::NotFound {
            kind,
            name: name.into(),
        }
    }
}

/// Result type alias for mapstore operations.
pub type Result<T> = std::result::Result<T, Error>;
