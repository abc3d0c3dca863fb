//! Statement generation from column descriptors.

use super::columns::{
    ClauseColumn, Column, Combinator, SortableColumn, ValueColumn, validate_identifier,
};
use super::dialect::{Dialect, PageParts};
use crate::storage::{Params, Value};
use crate::{Error, Result};
use std::collections::HashSet;
use std::fmt;

/// Generated SQL text with the parameters it references.
#[derive(Debug, Clone, PartialEq)]
pub struct BuiltSql {
    /// Statement text; paged lists hold two statements separated by `;`.
    pub text: String,
    /// Values for every `@name` placeholder in `text`.
    pub params: Params,
}

impl fmt::Display for BuiltSql {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

/// A select over one table.
#[derive(Debug, Clone, Copy)]
pub struct Select<'a> {
    /// Target table.
    pub table: &'a str,
    /// Selected columns; empty selects every column.
    pub columns: &'a [Column],
    /// Predicates.
    pub clauses: &'a [ClauseColumn],
    /// Sort keys.
    pub sorts: &'a [SortableColumn],
    /// How predicates are joined.
    pub combinator: Combinator,
}

impl<'a> Select<'a> {
    /// Selects every column of `table` without predicates or sorting.
    #[must_use]
    pub const fn from(table: &'a str) -> Self {
        Self {
            table,
            columns: &[],
            clauses: &[],
            sorts: &[],
            combinator: Combinator::And,
        }
    }

    /// Sets the selected columns.
    #[must_use]
    pub const fn columns(mut self, columns: &'a [Column]) -> Self {
        self.columns = columns;
        self
    }

    /// Sets the predicates and how they are joined.
    #[must_use]
    pub const fn filter(mut self, clauses: &'a [ClauseColumn], combinator: Combinator) -> Self {
        self.clauses = clauses;
        self.combinator = combinator;
        self
    }

    /// Sets the sort keys.
    #[must_use]
    pub const fn order_by(mut self, sorts: &'a [SortableColumn]) -> Self {
        self.sorts = sorts;
        self
    }
}

/// Allocates unique placeholder names within one statement.
#[derive(Debug, Default)]
struct ParamNames {
    used: HashSet<String>,
    params: Params,
}

impl ParamNames {
    fn reserve(&mut self, name: &str, value: Value) {
        self.used.insert(name.to_string());
        self.params.insert(name, value);
    }

    /// Binds `value` under a name derived from `column`, suffixing `_1`, `_2`, ...
    /// when the name is taken. Returns the placeholder name.
    fn bind(&mut self, column: &str, value: Value) -> String {
        let base = column.replace('.', "_");
        let mut name = base.clone();
        let mut suffix = 1;
        while self.used.contains(&name) {
            name = format!("{base}_{suffix}");
            suffix += 1;
        }
        self.used.insert(name.clone());
        self.params.insert(&name, value);
        name
    }
}

/// Generates parameterized statements.
///
/// Table and column names are validated as identifiers; values are always
/// bound, never inlined.
#[derive(Debug, Clone, Copy, Default)]
pub struct SqlBuilder {
    dialect: Dialect,
}

impl SqlBuilder {
    /// Creates a builder for a dialect.
    #[must_use]
    pub const fn new(dialect: Dialect) -> Self {
        Self { dialect }
    }

    /// The configured dialect.
    #[must_use]
    pub const fn dialect(&self) -> Dialect {
        self.dialect
    }

    /// `INSERT INTO t (a, b) VALUES (@a, @b)`
    ///
    /// # Errors
    ///
    /// [`Error::InvalidArgument`] for no value columns or an invalid name.
    pub fn insert(&self, table: &str, values: &[ValueColumn]) -> Result<BuiltSql> {
        validate_identifier(table, "table")?;
        require_values(table, values)?;

        let mut names = ParamNames::default();
        let mut columns = Vec::with_capacity(values.len());
        let mut placeholders = Vec::with_capacity(values.len());
        for column in values {
            validate_value_column(column)?;
            columns.push(column.name.as_str());
            placeholders.push(format!("@{}", names.bind(&column.name, column.value.clone())));
        }

        Ok(BuiltSql {
            text: format!(
                "INSERT INTO {table} ({}) VALUES ({})",
                columns.join(", "),
                placeholders.join(", ")
            ),
            params: names.params,
        })
    }

    /// `UPDATE t SET a = @a WHERE <clauses>`
    ///
    /// # Errors
    ///
    /// - [`Error::MissingCondition`] when `clauses` is empty.
    /// - [`Error::InvalidArgument`] for no value columns, an invalid name or
    ///   an invalid clause.
    pub fn update(
        &self,
        table: &str,
        values: &[ValueColumn],
        clauses: &[ClauseColumn],
        combinator: Combinator,
    ) -> Result<BuiltSql> {
        validate_identifier(table, "table")?;
        require_clauses("UPDATE", table, clauses)?;
        require_values(table, values)?;

        let mut names = ParamNames::default();
        let mut assignments = Vec::with_capacity(values.len());
        for column in values {
            validate_value_column(column)?;
            let name = names.bind(&column.name, column.value.clone());
            assignments.push(format!("{} = @{name}", column.name));
        }
        let filter = where_clause(clauses, combinator, &mut names)?;

        Ok(BuiltSql {
            text: format!("UPDATE {table} SET {}{filter}", assignments.join(", ")),
            params: names.params,
        })
    }

    /// `DELETE FROM t WHERE <clauses>`
    ///
    /// # Errors
    ///
    /// - [`Error::MissingCondition`] when `clauses` is empty.
    /// - [`Error::InvalidArgument`] for an invalid name or clause.
    pub fn delete(&self, table: &str, clauses: &[ClauseColumn], combinator: Combinator) -> Result<BuiltSql> {
        validate_identifier(table, "table")?;
        require_clauses("DELETE", table, clauses)?;

        let mut names = ParamNames::default();
        let filter = where_clause(clauses, combinator, &mut names)?;
        Ok(BuiltSql {
            text: format!("DELETE FROM {table}{filter}"),
            params: names.params,
        })
    }

    /// `SELECT COUNT(1) FROM t [WHERE <clauses>]`
    ///
    /// # Errors
    ///
    /// [`Error::InvalidArgument`] for an invalid name or clause.
    pub fn count(&self, table: &str, clauses: &[ClauseColumn], combinator: Combinator) -> Result<BuiltSql> {
        validate_identifier(table, "table")?;
        let mut names = ParamNames::default();
        let filter = where_clause(clauses, combinator, &mut names)?;
        Ok(BuiltSql {
            text: count_statement(table, &filter),
            params: names.params,
        })
    }

    /// `SELECT <columns> FROM t [WHERE <clauses>] [ORDER BY <sorts>]`
    ///
    /// # Errors
    ///
    /// [`Error::InvalidArgument`] for an invalid name or clause.
    pub fn list(&self, select: &Select<'_>) -> Result<BuiltSql> {
        validate_identifier(select.table, "table")?;
        let columns = column_list(select.columns)?;
        let order_by = sort_list(select.sorts)?;

        let mut names = ParamNames::default();
        let filter = where_clause(select.clauses, select.combinator, &mut names)?;

        let mut text = format!(
            "SELECT {} FROM {}{filter}",
            if columns.is_empty() { "*" } else { columns.as_str() },
            select.table
        );
        if !order_by.is_empty() {
            text.push_str(" ORDER BY ");
            text.push_str(&order_by);
        }
        Ok(BuiltSql {
            text,
            params: names.params,
        })
    }

    /// Two statements: one page of rows, then the total count under the same
    /// predicate. Binds `@page` (1-based) and `@pageSize`.
    ///
    /// The first sort key is the primary page key.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidArgument`] for no sort keys, `page` or `page_size`
    /// below 1, an invalid name, or an invalid clause.
    pub fn paged_list(&self, select: &Select<'_>, page: u32, page_size: u32) -> Result<BuiltSql> {
        validate_identifier(select.table, "table")?;
        if page < 1 || page_size < 1 {
            return Err(Error::InvalidArgument(format!(
                "page ({page}) and page size ({page_size}) must be at least 1"
            )));
        }
        let Some(first) = select.sorts.first() else {
            return Err(Error::InvalidArgument(format!(
                "paged list on '{}' requires at least one sort column",
                select.table
            )));
        };
        let columns = column_list(select.columns)?;
        let order_by = sort_list(select.sorts)?;

        let mut names = ParamNames::default();
        names.reserve("page", Value::from(page));
        names.reserve("pageSize", Value::from(page_size));
        let filter = where_clause(select.clauses, select.combinator, &mut names)?;

        let first_sort = first.render();
        let parts = PageParts {
            table: select.table,
            columns: &columns,
            where_clause: &filter,
            order_by: &order_by,
            first_sort: &first_sort,
        };
        let page_statement = self.dialect.strategy().page_statement(&parts);

        Ok(BuiltSql {
            text: format!("{page_statement};\n{}", count_statement(select.table, &filter)),
            params: names.params,
        })
    }
}

fn require_values(table: &str, values: &[ValueColumn]) -> Result<()> {
    if values.is_empty() {
        return Err(Error::InvalidArgument(format!(
            "statement on '{table}' requires at least one value column"
        )));
    }
    Ok(())
}

fn require_clauses(statement: &'static str, table: &str, clauses: &[ClauseColumn]) -> Result<()> {
    if clauses.is_empty() {
        return Err(Error::MissingCondition {
            statement,
            table: table.to_string(),
        });
    }
    Ok(())
}

fn validate_value_column(column: &ValueColumn) -> Result<()> {
    validate_identifier(&column.name, "column")?;
    if column.value.is_list() {
        return Err(Error::InvalidArgument(format!(
            "column '{}' cannot be assigned a list value",
            column.name
        )));
    }
    Ok(())
}

/// ` WHERE a = @a AND b IN @b`, or empty without clauses.
fn where_clause(clauses: &[ClauseColumn], combinator: Combinator, names: &mut ParamNames) -> Result<String> {
    if clauses.is_empty() {
        return Ok(String::new());
    }
    let mut rendered = Vec::with_capacity(clauses.len());
    for clause in clauses {
        clause.validate()?;
        let name = names.bind(&clause.name, clause.value.clone());
        rendered.push(format!("{} {} @{name}", clause.name, clause.operator.as_sql()));
    }
    let separator = format!(" {} ", combinator.as_sql());
    Ok(format!(" WHERE {}", rendered.join(&separator)))
}

fn column_list(columns: &[Column]) -> Result<String> {
    let mut names = Vec::with_capacity(columns.len());
    for column in columns {
        validate_identifier(&column.name, "column")?;
        names.push(column.name.as_str());
    }
    Ok(names.join(", "))
}

fn sort_list(sorts: &[SortableColumn]) -> Result<String> {
    let mut keys = Vec::with_capacity(sorts.len());
    for sort in sorts {
        validate_identifier(&sort.name, "sort column")?;
        keys.push(sort.render());
    }
    Ok(keys.join(", "))
}

fn count_statement(table: &str, filter: &str) -> String {
    format!("SELECT COUNT(1) FROM {table}{filter}")
}
