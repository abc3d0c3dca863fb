//! Command-keyed storage operations.
//!
//! [`MappedStorage`] composes an executor with a [`CommandSource`] so storage
//! types can run commands by key, using the command's text, kind and timeout
//! as declared in its mapping file.

use super::executor::{PagedResult, SqlExecutor};
use super::grid::{GridReader, Scope};
use super::params::Params;
use super::row::FromRow;
use super::transaction::{IsolationLevel, Transaction};
use crate::mapping::{Command, CommandKind, CommandSource};
use crate::{Error, Result};
use rusqlite::types::FromSql;
use std::sync::Arc;

/// Storage base for mapping-driven storage types.
#[derive(Clone)]
pub struct MappedStorage {
    executor: Arc<SqlExecutor>,
    commands: Arc<dyn CommandSource>,
}

impl MappedStorage {
    /// Combines an executor and a command source.
    #[must_use]
    pub fn new(executor: Arc<SqlExecutor>, commands: Arc<dyn CommandSource>) -> Self {
        Self { executor, commands }
    }

    /// The underlying executor.
    #[must_use]
    pub fn executor(&self) -> &SqlExecutor {
        &self.executor
    }

    /// Looks up a command by key.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] for an unknown key.
    pub fn command(&self, key: &str) -> Result<&Command> {
        self.commands.command(key)
    }

    /// Runs a command and buffers its rows.
    ///
    /// # Errors
    ///
    /// Unknown key, unsupported command kind, or any executor error.
    pub fn query_command<T: FromRow>(
        &self,
        key: &str,
        params: &Params,
        tx: Option<&Transaction>,
    ) -> Result<Vec<T>> {
        let command = self.runnable(key)?;
        self.executor
            .query(&command.text, params, tx, command.timeout())
    }

    /// Runs a command and streams its rows to `visit`.
    ///
    /// # Errors
    ///
    /// Unknown key, unsupported command kind, or any executor error.
    pub fn query_command_unbuffered<T: FromRow>(
        &self,
        key: &str,
        params: &Params,
        tx: Option<&Transaction>,
        visit: impl FnMut(T) -> Result<()>,
    ) -> Result<usize> {
        let command = self.runnable(key)?;
        self.executor
            .query_unbuffered(&command.text, params, tx, command.timeout(), visit)
    }

    /// Executes a command; returns the rows affected.
    ///
    /// # Errors
    ///
    /// Unknown key, unsupported command kind, or any executor error.
    pub fn execute_command(&self, key: &str, params: &Params, tx: Option<&Transaction>) -> Result<usize> {
        let command = self.runnable(key)?;
        self.executor
            .execute(&command.text, params, tx, command.timeout())
    }

    /// Runs a command and returns its scalar result.
    ///
    /// # Errors
    ///
    /// Unknown key, unsupported command kind, or any executor error.
    pub fn scalar_command<T: FromSql>(
        &self,
        key: &str,
        params: &Params,
        tx: Option<&Transaction>,
    ) -> Result<T> {
        let command = self.runnable(key)?;
        self.executor
            .execute_scalar(&command.text, params, tx, command.timeout())
    }

    /// Runs a two-statement paged command.
    ///
    /// # Errors
    ///
    /// Unknown key, unsupported command kind, or any executor error.
    pub fn paged_command<T: FromRow>(
        &self,
        key: &str,
        params: &Params,
        tx: Option<&Transaction>,
    ) -> Result<PagedResult<T>> {
        let command = self.runnable(key)?;
        self.executor
            .paged_list(&command.text, params, tx, command.timeout())
    }

    /// Runs a multi-statement command within a caller-owned scope.
    ///
    /// # Errors
    ///
    /// Unknown key, unsupported command kind, or any executor error.
    pub fn multiple_command<'a, R>(
        &self,
        key: &str,
        params: &Params,
        scope: impl Into<Scope<'a>>,
        read: impl FnOnce(&mut GridReader<'_, '_>) -> Result<R>,
    ) -> Result<R> {
        let command = self.runnable(key)?;
        self.executor
            .query_multiple(&command.text, params, scope, command.timeout(), read)
    }

    /// Runs `work` in a transaction on this storage's connection.
    ///
    /// # Errors
    ///
    /// See [`SqlExecutor::execute_in_transaction`].
    pub fn in_transaction<R>(
        &self,
        isolation: IsolationLevel,
        work: impl FnOnce(&Transaction) -> Result<R>,
    ) -> Result<R> {
        self.executor.execute_in_transaction(isolation, work)
    }

    fn runnable(&self, key: &str) -> Result<&Command> {
        let command = self.commands.command(key)?;
        if command.kind == CommandKind::StoredProcedure && !self.executor.supports_stored_procedures() {
            return Err(Error::Unsupported(format!(
                "command '{key}' is a stored procedure, which the {} provider cannot execute",
                self.executor.provider_name()
            )));
        }
        Ok(command)
    }
}

impl std::fmt::Debug for MappedStorage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MappedStorage")
            .field("connection_key", &self.commands.connection_key())
            .field("executor", &self.executor)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mapping::Mapping;

    fn storage() -> (tempfile::TempDir, MappedStorage) {
        let dir = tempfile::tempdir().unwrap();
        let executor = Arc::new(SqlExecutor::sqlite(dir.path().join("mapped.db")));
        let mapping = Mapping::new("UserStorage", "main")
            .with_command(Command::text(
                "Create",
                "CREATE TABLE users (id INTEGER PRIMARY KEY, name TEXT)",
            ))
            .with_command(Command::text(
                "Insert",
                "INSERT INTO users (id, name) VALUES (@id, @name)",
            ))
            .with_command(Command::text("Count", "SELECT COUNT(*) FROM users"))
            .with_command(Command::new("Archive", CommandKind::StoredProcedure, "usp_archive"));
        let storage = MappedStorage::new(executor, Arc::new(mapping));
        storage.execute_command("Create", &Params::new(), None).unwrap();
        (dir, storage)
    }

    #[test]
    fn test_commands_by_key() {
        let (_dir, storage) = storage();
        let params = Params::new().with("id", 1).with("name", "ada");
        assert_eq!(storage.execute_command("Insert", &params, None).unwrap(), 1);
        let count: i64 = storage.scalar_command("Count", &Params::new(), None).unwrap();
        assert_eq!(count, 1);
    }

    #[test]
    fn test_unknown_key() {
        let (_dir, storage) = storage();
        let err = storage.execute_command("Nope", &Params::new(), None).unwrap_err();
        assert!(matches!(err, Error::NotFound { kind: "command", .. }));
    }

    #[test]
    fn test_stored_procedure_is_unsupported() {
        let (_dir, storage) = storage();
        let err = storage.execute_command("Archive", &Params::new(), None).unwrap_err();
        assert!(matches!(err, Error::Unsupported(_)));
        assert_eq!(storage.executor().open_connections(), 0);
    }
}
