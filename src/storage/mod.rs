//! Storage base: connections, transactions and query primitives.
//!
//! - [`connection`]: connection factories and counted leases
//! - [`transaction`]: isolation levels and caller-owned transactions
//! - [`executor`]: buffered, unbuffered, scalar, multi-result and paged reads
//! - [`mapped`]: command-keyed operations for mapping-driven storage types
//! - [`catalog`]: one executor per connection key

// Allow significant_drop_tightening - leases are held for the whole call.
#![allow(clippy::significant_drop_tightening)]

pub mod catalog;
pub mod connection;
pub mod executor;
pub mod grid;
pub mod mapped;
pub mod metrics;
pub mod params;
pub mod row;
pub mod transaction;

pub use catalog::ConnectionCatalog;
pub use connection::{
    ConnectionFactory, ConnectionLease, SqliteConnectionFactory, SqliteTarget, configure_connection,
};
pub use executor::{PagedResult, SqlExecutor};
pub use grid::{GridReader, Scope};
pub use mapped::MappedStorage;
pub use metrics::record_operation_metrics;
pub use params::{Params, Value};
pub use row::{FromRow, Record};
pub use transaction::{IsolationLevel, Transaction};
