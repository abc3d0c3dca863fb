//! Connection acquisition for `SQLite` storage.
//!
//! Every connection handed out by the engine is wrapped in a
//! [`ConnectionLease`]. The lease is counted while alive and released when
//! dropped, so each acquisition is paired with exactly one release on every
//! exit path.

use crate::config::ConnectionSettings;
use crate::{Error, Result};
use rusqlite::Connection;
use std::ops::Deref;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

/// Default lock wait applied to every new connection.
pub const DEFAULT_BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Provider names accepted for `SQLite`.
const SQLITE_PROVIDERS: &[&str] = &["sqlite", "sqlite3", "system.data.sqlite", "microsoft.data.sqlite"];

/// Opens new database connections.
pub trait ConnectionFactory: Send + Sync {
    /// Opens and configures a new connection.
    fn open(&self) -> Result<Connection>;

    /// Provider name (used to pick SQL dialects and capability checks).
    fn provider_name(&self) -> &'static str;

    /// Whether the provider can execute stored procedures.
    fn supports_stored_procedures(&self) -> bool {
        false
    }
}

/// Where a `SQLite` database lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SqliteTarget {
    /// A database file (or a `file:` URI).
    File(PathBuf),
    /// A private in-memory database; each connection sees its own database.
    Memory,
}

/// [`ConnectionFactory`] for `SQLite` databases.
#[derive(Debug, Clone)]
pub struct SqliteConnectionFactory {
    target: SqliteTarget,
}

impl SqliteConnectionFactory {
    /// Factory for a database file.
    #[must_use]
    pub fn file(path: impl Into<PathBuf>) -> Self {
        Self {
            target: SqliteTarget::File(path.into()),
        }
    }

    /// Factory for private in-memory databases.
    #[must_use]
    pub const fn memory() -> Self {
        Self {
            target: SqliteTarget::Memory,
        }
    }

    /// Builds a factory from connection settings.
    ///
    /// The connection string is either a bare path, `:memory:`, a `file:` URI,
    /// or an ADO-style `Data Source=<path>;...` string.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] for a non-`SQLite` provider or an empty
    /// data source.
    pub fn from_settings(settings: &ConnectionSettings) -> Result<Self> {
        let provider = settings.provider_name.trim().to_lowercase();
        if !SQLITE_PROVIDERS.contains(&provider.as_str()) {
            return Err(Error::Configuration(format!(
                "unsupported provider '{}' (expected one of {SQLITE_PROVIDERS:?})",
                settings.provider_name
            )));
        }

        let source = parse_data_source(&settings.connection_string);
        if source.is_empty() {
            return Err(Error::Configuration(
                "connection string has no data source".to_string(),
            ));
        }
        if source.eq_ignore_ascii_case(":memory:") {
            return Ok(Self::memory());
        }
        Ok(Self::file(source))
    }

    /// Returns the configured target.
    #[must_use]
    pub const fn target(&self) -> &SqliteTarget {
        &self.target
    }
}

impl ConnectionFactory for SqliteConnectionFactory {
    fn open(&self) -> Result<Connection> {
        let conn = match &self.target {
            SqliteTarget::File(path) => Connection::open(path),
            SqliteTarget::Memory => Connection::open_in_memory(),
        }
        .map_err(|e| Error::OperationFailed {
            operation: "open_sqlite".to_string(),
            cause: e.to_string(),
        })?;
        configure_connection(&conn)?;
        Ok(conn)
    }

    fn provider_name(&self) -> &'static str {
        "sqlite"
    }
}

/// Extracts the data source from a connection string.
fn parse_data_source(connection_string: &str) -> String {
    let trimmed = connection_string.trim();
    if !trimmed.contains('=') || trimmed.starts_with("file:") {
        return trimmed.to_string();
    }
    trimmed
        .split(';')
        .filter_map(|pair| pair.split_once('='))
        .find(|(key, _)| {
            let key = key.trim().to_lowercase();
            key == "data source" || key == "datasource" || key == "filename"
        })
        .map(|(_, value)| value.trim().to_string())
        .unwrap_or_default()
}

/// Configures a `SQLite` connection for concurrent use.
///
/// - **WAL mode**: concurrent readers with a single writer
/// - **NORMAL synchronous**: balances durability with performance
/// - **`busy_timeout`**: waits for locks instead of failing immediately
/// - **`foreign_keys`**: enforced
pub fn configure_connection(conn: &Connection) -> Result<()> {
    // journal_mode returns a row, so execute_batch cannot be used; in-memory
    // databases report "memory" and ignore the request.
    let _ = conn.pragma_update(None, "journal_mode", "WAL");
    let _ = conn.pragma_update(None, "synchronous", "NORMAL");
    conn.busy_timeout(DEFAULT_BUSY_TIMEOUT)?;
    conn.pragma_update(None, "foreign_keys", "ON")?;
    Ok(())
}

/// A counted, scoped connection.
///
/// Dereferences to [`Connection`]. Dropping the lease closes the connection.
pub struct ConnectionLease {
    conn: Connection,
    live: Arc<AtomicUsize>,
}

impl ConnectionLease {
    pub(crate) fn new(conn: Connection, live: Arc<AtomicUsize>) -> Self {
        let open = live.fetch_add(1, Ordering::SeqCst) + 1;
        tracing::trace!(open, "acquired connection");
        Self { conn, live }
    }

    /// Applies a lock wait timeout to this connection.
    pub fn set_timeout(&self, timeout: Duration) -> Result<()> {
        self.conn.busy_timeout(timeout)?;
        Ok(())
    }
}

impl Deref for ConnectionLease {
    type Target = Connection;

    fn deref(&self) -> &Connection {
        &self.conn
    }
}

impl Drop for ConnectionLease {
    fn drop(&mut self) {
        let open = self.live.fetch_sub(1, Ordering::SeqCst).saturating_sub(1);
        tracing::trace!(open, "released connection");
    }
}

impl std::fmt::Debug for ConnectionLease {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionLease")
            .field("path", &self.conn.path())
            .finish_non_exhaustive()
    }
}
