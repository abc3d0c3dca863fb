//! Sequential reading of multi-statement results.
//!
//! A command may hold several statements separated by `;`. Each statement that
//! returns columns is one result set; the others are executed as they are
//! passed over. Result sets are read strictly in declaration order.

use super::connection::ConnectionLease;
use super::params::{Params, bind};
use super::row::FromRow;
use super::transaction::Transaction;
use crate::{Error, Result};
use rusqlite::types::FromSql;
use rusqlite::fallible_iterator::FallibleIterator;
use rusqlite::{Batch, Connection, Statement};

/// Connection scope for a multi-result read.
///
/// Multi-result reads never open their own connection: the caller supplies a
/// lease (and releases it by dropping it) or a transaction.
#[derive(Debug, Clone, Copy)]
pub enum Scope<'a> {
    /// A plain connection lease.
    Lease(&'a ConnectionLease),
    /// An open transaction.
    Transaction(&'a Transaction),
}

impl Scope<'_> {
    pub(crate) fn connection(&self) -> &Connection {
        let lease: &ConnectionLease = match *self {
            Self::Lease(lease) => lease,
            Self::Transaction(tx) => tx.lease(),
        };
        lease
    }
}

impl<'a> From<&'a ConnectionLease> for Scope<'a> {
    fn from(lease: &'a ConnectionLease) -> Self {
        Self::Lease(lease)
    }
}

impl<'a> From<&'a Transaction> for Scope<'a> {
    fn from(tx: &'a Transaction) -> Self {
        Self::Transaction(tx)
    }
}

/// Reads the result sets of one multi-statement command, in order.
pub struct GridReader<'conn, 'sql> {
    conn: &'conn Connection,
    batch: Batch<'conn, 'sql>,
    params: &'sql Params,
    consumed: usize,
}

impl<'conn, 'sql> GridReader<'conn, 'sql> {
    pub(crate) fn new(conn: &'conn Connection, text: &'sql str, params: &'sql Params) -> Self {
        Self {
            conn,
            batch: Batch::new(conn, text),
            params,
            consumed: 0,
        }
    }

    /// Number of result sets read so far.
    #[must_use]
    pub const fn consumed(&self) -> usize {
        self.consumed
    }

    /// Reads the next result set, buffering every row.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] when every result set has been read.
    pub fn read<T: FromRow>(&mut self) -> Result<Vec<T>> {
        let mut rows = Vec::new();
        self.visit(|row| {
            rows.push(row);
            Ok(())
        })?;
        Ok(rows)
    }

    /// Streams the next result set row by row; returns the number of rows.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] when every result set has been read, or the
    /// first error returned by `visit`.
    pub fn visit<T: FromRow>(&mut self, mut visit: impl FnMut(T) -> Result<()>) -> Result<usize> {
        let mut stmt = self.next_result_set()?;
        let mut rows = stmt.raw_query();
        let mut seen = 0;
        while let Some(row) = rows.next()? {
            visit(T::from_row(row)?)?;
            seen += 1;
        }
        Ok(seen)
    }

    /// Reads the first column of the first row of the next result set.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] when every result set has been read or the
    /// result set is empty.
    pub fn read_scalar<T: FromSql>(&mut self) -> Result<T> {
        let position = self.consumed + 1;
        let mut stmt = self.next_result_set()?;
        let mut rows = stmt.raw_query();
        match rows.next()? {
            Some(row) => Ok(row.get(0)?),
            None => Err(Error::not_found("scalar row", format!("result set #{position}"))),
        }
    }

    /// Advances to the next row-returning statement, executing any statement
    /// without columns on the way.
    fn next_result_set(&mut self) -> Result<Statement<'conn>> {
        while let Some(mut stmt) = self.batch.next()? {
            bind(&mut stmt, self.params)?;
            if stmt.column_count() == 0 {
                stmt.raw_execute()?;
                continue;
            }
            self.consumed += 1;
            return Ok(stmt);
        }
        Err(Error::not_found(
            "result set",
            format!("#{} (command has {} result sets)", self.consumed + 1, self.consumed),
        ))
    }

    /// Executes every remaining statement, returning the total changed rows.
    ///
    /// Only statements that changed rows count; `sqlite3_changes` keeps the
    /// previous DML count across DDL statements.
    pub(crate) fn execute_remaining(&mut self) -> Result<usize> {
        let mut changed = 0;
        while let Some(mut stmt) = self.batch.next()? {
            bind(&mut stmt, self.params)?;
            let before = self.conn.total_changes();
            let reported = stmt.raw_execute()?;
            if self.conn.total_changes() != before {
                changed += reported;
            }
        }
        Ok(changed)
    }
}

impl std::fmt::Debug for GridReader<'_, '_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GridReader")
            .field("consumed", &self.consumed)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn conn() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(
            "CREATE TABLE t (id INTEGER PRIMARY KEY, name TEXT);
             INSERT INTO t (id, name) VALUES (1, 'a'), (2, 'b'), (3, 'c');",
        )
        .unwrap();
        conn
    }

    #[test]
    fn test_reads_result_sets_in_order() {
        let conn = conn();
        let params = Params::new().with("min", 2);
        let mut grid = GridReader::new(
            &conn,
            "SELECT name FROM t WHERE id >= @min ORDER BY id; SELECT COUNT(1) FROM t WHERE id >= @min",
            &params,
        );
        let names: Vec<String> = grid.read().unwrap();
        assert_eq!(names, vec!["b", "c"]);
        let count: i64 = grid.read_scalar().unwrap();
        assert_eq!(count, 2);
        assert_eq!(grid.consumed(), 2);
    }

    #[test]
    fn test_reading_past_last_set_fails() {
        let conn = conn();
        let params = Params::new();
        let mut grid = GridReader::new(&conn, "SELECT 1;", &params);
        let _: Vec<i64> = grid.read().unwrap();
        let err = grid.read::<i64>().unwrap_err();
        assert!(matches!(err, Error::NotFound { kind: "result set", .. }));
    }

    #[test]
    fn test_statements_without_columns_are_executed() {
        let conn = conn();
        let params = Params::new().with("id", 4).with("name", "d");
        let mut grid = GridReader::new(
            &conn,
            "INSERT INTO t (id, name) VALUES (@id, @name); SELECT last_insert_rowid()",
            &params,
        );
        let id: i64 = grid.read_scalar().unwrap();
        assert_eq!(id, 4);
    }

    #[test]
    fn test_execute_remaining_ignores_ddl_counts() {
        let conn = conn();
        let params = Params::new().with("id", 1);
        let mut grid = GridReader::new(
            &conn,
            "DELETE FROM t WHERE id = @id; CREATE INDEX ix_t_name ON t(name)",
            &params,
        );
        assert_eq!(grid.execute_remaining().unwrap(), 1);
    }

    #[test]
    fn test_scalar_on_empty_set() {
        let conn = conn();
        let params = Params::new();
        let mut grid = GridReader::new(&conn, "SELECT id FROM t WHERE id > 100", &params);
        assert!(matches!(
            grid.read_scalar::<i64>(),
            Err(Error::NotFound { kind: "scalar row", .. })
        ));
    }
}
