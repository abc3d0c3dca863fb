//! Caller-owned transactions.

use super::connection::ConnectionLease;
use crate::Result;
use std::fmt;

/// Transaction isolation level.
///
/// `SQLite` serializes writers, so the levels map onto lock acquisition
/// timing rather than snapshot rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IsolationLevel {
    /// Dirty reads allowed (only observable with shared cache).
    ReadUncommitted,
    /// Locks are taken on first access.
    #[default]
    ReadCommitted,
    /// The write lock is taken up front.
    RepeatableRead,
    /// Readers and writers are excluded for the whole transaction.
    Serializable,
}

impl IsolationLevel {
    /// The `BEGIN` statement used for this level.
    #[must_use]
    pub const fn begin_statement(self) -> &'static str {
        match self {
            Self::ReadUncommitted | Self::ReadCommitted => "BEGIN DEFERRED",
            Self::RepeatableRead => "BEGIN IMMEDIATE",
            Self::Serializable => "BEGIN EXCLUSIVE",
        }
    }

    /// Returns the level name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ReadUncommitted => "read_uncommitted",
            Self::ReadCommitted => "read_committed",
            Self::RepeatableRead => "repeatable_read",
            Self::Serializable => "serializable",
        }
    }
}

impl fmt::Display for IsolationLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An open transaction bound to its own connection.
///
/// Operations that receive `Some(&tx)` run on this connection and never close
/// it. Call [`commit`](Self::commit) or [`rollback`](Self::rollback) to finish;
/// a transaction dropped while still active is rolled back.
pub struct Transaction {
    lease: ConnectionLease,
    isolation: IsolationLevel,
    active: bool,
}

impl Transaction {
    pub(crate) fn begin(lease: ConnectionLease, isolation: IsolationLevel) -> Result<Self> {
        if isolation == IsolationLevel::ReadUncommitted {
            lease.pragma_update(None, "read_uncommitted", 1)?;
        }
        lease.execute_batch(isolation.begin_statement())?;
        tracing::debug!(isolation = %isolation, "transaction started");
        Ok(Self {
            lease,
            isolation,
            active: true,
        })
    }

    /// Isolation level the transaction was started with.
    #[must_use]
    pub const fn isolation(&self) -> IsolationLevel {
        self.isolation
    }

    /// The connection lease backing this transaction.
    #[must_use]
    pub const fn lease(&self) -> &ConnectionLease {
        &self.lease
    }

    /// Commits and releases the connection.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Database`] if `COMMIT` fails; the transaction is
    /// then rolled back when dropped.
    pub fn commit(mut self) -> Result<()> {
        self.lease.execute_batch("COMMIT")?;
        self.active = false;
        tracing::debug!("transaction committed");
        Ok(())
    }

    /// Rolls back and releases the connection.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Database`] if `ROLLBACK` fails.
    pub fn rollback(mut self) -> Result<()> {
        self.active = false;
        self.lease.execute_batch("ROLLBACK")?;
        tracing::debug!("transaction rolled back");
        Ok(())
    }
}

impl Drop for Transaction {
    fn drop(&mut self) {
        if self.active
            && let Err(e) = self.lease.execute_batch("ROLLBACK")
        {
            tracing::warn!(error = %e, "rollback of abandoned transaction failed");
        }
    }
}

impl fmt::Debug for Transaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transaction")
            .field("isolation", &self.isolation)
            .field("active", &self.active)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rusqlite::Connection;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn lease(path: &std::path::Path, live: &Arc<AtomicUsize>) -> ConnectionLease {
        ConnectionLease::new(Connection::open(path).unwrap(), Arc::clone(live))
    }

    fn count(path: &std::path::Path) -> i64 {
        Connection::open(path)
            .unwrap()
            .query_row("SELECT COUNT(*) FROM t", [], |row| row.get(0))
            .unwrap()
    }

    fn setup() -> (tempfile::TempDir, std::path::PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tx.db");
        Connection::open(&path)
            .unwrap()
            .execute_batch("CREATE TABLE t (id INTEGER PRIMARY KEY)")
            .unwrap();
        (dir, path)
    }

    #[test]
    fn test_begin_statements() {
        assert_eq!(IsolationLevel::ReadCommitted.begin_statement(), "BEGIN DEFERRED");
        assert_eq!(IsolationLevel::RepeatableRead.begin_statement(), "BEGIN IMMEDIATE");
        assert_eq!(IsolationLevel::Serializable.begin_statement(), "BEGIN EXCLUSIVE");
        assert_eq!(IsolationLevel::default(), IsolationLevel::ReadCommitted);
    }

    #[test]
    fn test_commit_persists() {
        let (_dir, path) = setup();
        let live = Arc::new(AtomicUsize::new(0));
        let tx = Transaction::begin(lease(&path, &live), IsolationLevel::Serializable).unwrap();
        tx.lease().execute("INSERT INTO t (id) VALUES (1)", []).unwrap();
        tx.commit().unwrap();
        assert_eq!(count(&path), 1);
        assert_eq!(live.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_drop_rolls_back() {
        let (_dir, path) = setup();
        let live = Arc::new(AtomicUsize::new(0));
        {
            let tx = Transaction::begin(lease(&path, &live), IsolationLevel::ReadCommitted).unwrap();
            tx.lease().execute("INSERT INTO t (id) VALUES (1)", []).unwrap();
            assert_eq!(live.load(Ordering::SeqCst), 1);
        }
        assert_eq!(count(&path), 0);
        assert_eq!(live.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_read_uncommitted_sets_pragma() {
        let (_dir, path) = setup();
        let live = Arc::new(AtomicUsize::new(0));
        let tx = Transaction::begin(lease(&path, &live), IsolationLevel::ReadUncommitted).unwrap();
        let flag: i64 = tx
            .lease()
            .pragma_query_value(None, "read_uncommitted", |row| row.get(0))
            .unwrap();
        assert_eq!(flag, 1);
        tx.rollback().unwrap();
    }
}
