//! Query and transaction primitives.
//!
//! Every operation takes an optional transaction. With `Some(&tx)` the
//! transaction's connection is used and left open; with `None` a connection
//! is leased for the duration of the call and released on every exit path.

use super::connection::{ConnectionFactory, ConnectionLease, SqliteConnectionFactory};
use super::grid::{GridReader, Scope};
use super::metrics::{record_operation_metrics, status_of};
use super::params::{Params, expand_lists, validate_text};
use super::row::FromRow;
use super::transaction::{IsolationLevel, Transaction};
use crate::Result;
use rusqlite::Connection;
use rusqlite::types::FromSql;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};
use tracing::instrument;

/// One page of rows plus the total number of matching rows.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PagedResult<T> {
    /// Rows of the requested page.
    pub rows: Vec<T>,
    /// Total rows matching the predicate, across all pages.
    pub count: i64,
}

impl<T> PagedResult<T> {
    /// Number of pages for a given page size.
    #[must_use]
    pub fn page_count(&self, page_size: u32) -> i64 {
        if page_size == 0 || self.count <= 0 {
            return 0;
        }
        let size = i64::from(page_size);
        (self.count + size - 1) / size
    }

    /// True when the page holds no rows.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Executes SQL against connections produced by a [`ConnectionFactory`].
pub struct SqlExecutor {
    factory: Arc<dyn ConnectionFactory>,
    live: Arc<AtomicUsize>,
    default_timeout: Option<Duration>,
}

impl SqlExecutor {
    /// Creates an executor over a connection factory.
    #[must_use]
    pub fn new(factory: Arc<dyn ConnectionFactory>) -> Self {
        Self {
            factory,
            live: Arc::new(AtomicUsize::new(0)),
            default_timeout: None,
        }
    }

    /// Creates an executor for a `SQLite` database file.
    #[must_use]
    pub fn sqlite(path: impl Into<PathBuf>) -> Self {
        Self::new(Arc::new(SqliteConnectionFactory::file(path)))
    }

    /// Sets the timeout used when an operation passes `None`.
    #[must_use]
    pub const fn with_default_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.default_timeout = timeout;
        self
    }

    /// Provider name of the underlying factory.
    #[must_use]
    pub fn provider_name(&self) -> &'static str {
        self.factory.provider_name()
    }

    /// Whether stored procedure commands can run on this provider.
    #[must_use]
    pub fn supports_stored_procedures(&self) -> bool {
        self.factory.supports_stored_procedures()
    }

    /// Number of connection leases currently alive.
    #[must_use]
    pub fn open_connections(&self) -> usize {
        self.live.load(Ordering::SeqCst)
    }

    /// Opens a new connection lease. Dropping the lease releases it.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection cannot be opened.
    pub fn acquire(&self) -> Result<ConnectionLease> {
        let conn = self.factory.open()?;
        Ok(ConnectionLease::new(conn, Arc::clone(&self.live)))
    }

    /// Runs a query and buffers every row of its first result set.
    ///
    /// # Errors
    ///
    /// - [`crate::Error::InvalidArgument`] for blank text, before any connection is opened.
    /// - [`crate::Error::Database`] for driver failures.
    #[instrument(skip(self, text, params, tx), fields(operation = "query", in_transaction = tx.is_some()))]
    pub fn query<T: FromRow>(
        &self,
        text: &str,
        params: &Params,
        tx: Option<&Transaction>,
        timeout: Option<Duration>,
    ) -> Result<Vec<T>> {
        self.observe("query", || {
            validate_text(text)?;
            let prepared = expand_lists(text, params);
            self.with_connection(tx, timeout, |conn| {
                GridReader::new(conn, &prepared.text, &prepared.params).read()
            })
        })
    }

    /// Runs a query and hands each row to `visit` as it is stepped.
    ///
    /// Returns the number of rows visited. Rows are never buffered; an error
    /// from `visit` stops the iteration and is returned.
    ///
    /// # Errors
    ///
    /// Same as [`query`](Self::query), plus any error returned by `visit`.
    #[instrument(skip(self, text, params, tx, visit), fields(operation = "query_unbuffered"))]
    pub fn query_unbuffered<T: FromRow>(
        &self,
        text: &str,
        params: &Params,
        tx: Option<&Transaction>,
        timeout: Option<Duration>,
        visit: impl FnMut(T) -> Result<()>,
    ) -> Result<usize> {
        self.observe("query_unbuffered", || {
            validate_text(text)?;
            let prepared = expand_lists(text, params);
            self.with_connection(tx, timeout, |conn| {
                GridReader::new(conn, &prepared.text, &prepared.params).visit(visit)
            })
        })
    }

    /// Executes every statement of `text`; returns the total rows affected.
    ///
    /// # Errors
    ///
    /// Same as [`query`](Self::query).
    #[instrument(skip(self, text, params, tx), fields(operation = "execute", in_transaction = tx.is_some()))]
    pub fn execute(
        &self,
        text: &str,
        params: &Params,
        tx: Option<&Transaction>,
        timeout: Option<Duration>,
    ) -> Result<usize> {
        self.observe("execute", || {
            validate_text(text)?;
            let prepared = expand_lists(text, params);
            let affected = self.with_connection(tx, timeout, |conn| {
                GridReader::new(conn, &prepared.text, &prepared.params).execute_remaining()
            })?;
            tracing::debug!(affected, "executed command");
            Ok(affected)
        })
    }

    /// Returns the first column of the first row.
    ///
    /// # Errors
    ///
    /// [`crate::Error::NotFound`] when the query yields no row; otherwise same
    /// as [`query`](Self::query).
    #[instrument(skip(self, text, params, tx), fields(operation = "scalar"))]
    pub fn execute_scalar<T: FromSql>(
        &self,
        text: &str,
        params: &Params,
        tx: Option<&Transaction>,
        timeout: Option<Duration>,
    ) -> Result<T> {
        self.observe("scalar", || {
            validate_text(text)?;
            let prepared = expand_lists(text, params);
            self.with_connection(tx, timeout, |conn| {
                GridReader::new(conn, &prepared.text, &prepared.params).read_scalar()
            })
        })
    }

    /// Runs a multi-statement command and lets `read` consume its result sets
    /// in order.
    ///
    /// The connection comes from `scope`; the caller keeps ownership of it and
    /// releases a plain lease by dropping it.
    ///
    /// # Examples
    ///
    /// ```ignore
    /// let lease = executor.acquire()?;
    /// let (users, total) = executor.query_multiple(
    ///     "SELECT * FROM users; SELECT COUNT(1) FROM users",
    ///     &Params::new(),
    ///     &lease,
    ///     None,
    ///     |grid| Ok((grid.read::<Record>()?, grid.read_scalar::<i64>()?)),
    /// )?;
    /// drop(lease);
    /// ```
    ///
    /// # Errors
    ///
    /// Same as [`query`](Self::query); reading past the last result set
    /// returns [`crate::Error::NotFound`].
    #[instrument(skip(self, text, params, scope, read), fields(operation = "query_multiple"))]
    pub fn query_multiple<'a, R>(
        &self,
        text: &str,
        params: &Params,
        scope: impl Into<Scope<'a>>,
        timeout: Option<Duration>,
        read: impl FnOnce(&mut GridReader<'_, '_>) -> Result<R>,
    ) -> Result<R> {
        self.observe("query_multiple", || {
            validate_text(text)?;
            let scope = scope.into();
            let prepared = expand_lists(text, params);
            let conn = scope.connection();
            if let Some(timeout) = timeout.or(self.default_timeout) {
                conn.busy_timeout(timeout)?;
            }
            let mut grid = GridReader::new(conn, &prepared.text, &prepared.params);
            read(&mut grid)
        })
    }

    /// Runs a two-statement paged command: the page rows first, then a
    /// one-row, one-column total count.
    ///
    /// # Errors
    ///
    /// Same as [`query_multiple`](Self::query_multiple).
    #[instrument(skip(self, text, params, tx), fields(operation = "paged_list"))]
    pub fn paged_list<T: FromRow>(
        &self,
        text: &str,
        params: &Params,
        tx: Option<&Transaction>,
        timeout: Option<Duration>,
    ) -> Result<PagedResult<T>> {
        self.observe("paged_list", || {
            validate_text(text)?;
            let prepared = expand_lists(text, params);
            self.with_connection(tx, timeout, |conn| {
                let mut grid = GridReader::new(conn, &prepared.text, &prepared.params);
                let rows = grid.read()?;
                let count = grid.read_scalar()?;
                Ok(PagedResult { rows, count })
            })
        })
    }

    /// Opens a connection and starts a transaction on it.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection cannot be opened or `BEGIN` fails.
    #[instrument(skip(self), fields(operation = "begin_transaction"))]
    pub fn begin_transaction(&self, isolation: IsolationLevel) -> Result<Transaction> {
        self.observe("begin_transaction", || {
            let lease = self.acquire()?;
            Transaction::begin(lease, isolation)
        })
    }

    /// Runs `work` inside a transaction.
    ///
    /// Commits when `work` returns `Ok`. When it returns `Err` the transaction
    /// is rolled back and the error returned. If `work` panics the transaction
    /// is rolled back while unwinding. The connection is released exactly once
    /// on every path.
    ///
    /// # Errors
    ///
    /// The error returned by `work`, or a failure to begin or commit.
    #[instrument(skip(self, work), fields(operation = "transaction"))]
    pub fn execute_in_transaction<R>(
        &self,
        isolation: IsolationLevel,
        work: impl FnOnce(&Transaction) -> Result<R>,
    ) -> Result<R> {
        let tx = self.begin_transaction(isolation)?;
        let start = Instant::now();
        let result = match work(&tx) {
            Ok(value) => tx.commit().map(|()| value),
            Err(e) => {
                if let Err(rollback) = tx.rollback() {
                    tracing::warn!(error = %rollback, "rollback failed");
                }
                tracing::debug!(error = %e, "transaction rolled back");
                Err(e)
            },
        };
        record_operation_metrics(self.provider_name(), "transaction", start, status_of(&result));
        result
    }

    /// Runs `f` on the transaction's connection, or on a fresh lease that is
    /// dropped before returning.
    fn with_connection<R>(
        &self,
        tx: Option<&Transaction>,
        timeout: Option<Duration>,
        f: impl FnOnce(&Connection) -> Result<R>,
    ) -> Result<R> {
        let timeout = timeout.or(self.default_timeout);
        if let Some(tx) = tx {
            if let Some(timeout) = timeout {
                tx.lease().set_timeout(timeout)?;
            }
            return f(tx.lease());
        }
        let lease = self.acquire()?;
        if let Some(timeout) = timeout {
            lease.set_timeout(timeout)?;
        }
        f(&lease)
    }

    fn observe<R>(&self, operation: &'static str, f: impl FnOnce() -> Result<R>) -> Result<R> {
        let start = Instant::now();
        let result = f();
        if let Err(e) = &result {
            tracing::debug!(operation, error = %e, "operation failed");
        }
        record_operation_metrics(self.provider_name(), operation, start, status_of(&result));
        result
    }
}

impl std::fmt::Debug for SqlExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqlExecutor")
            .field("provider", &self.provider_name())
            .field("open_connections", &self.open_connections())
            .field("default_timeout", &self.default_timeout)
            .finish_non_exhaustive()
    }
}
