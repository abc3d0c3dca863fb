//! Pagination dialects.
//!
//! Both strategies bind `@page` (1-based) and `@pageSize` and differ only in
//! how the page statement restricts rows.

use std::fmt;

/// Rendered pieces of a paged select.
#[derive(Debug, Clone)]
pub struct PageParts<'a> {
    /// Target table.
    pub table: &'a str,
    /// Comma-separated column list, empty for all columns.
    pub columns: &'a str,
    /// ` WHERE ...` or empty.
    pub where_clause: &'a str,
    /// Every sort key, comma-separated.
    pub order_by: &'a str,
    /// The primary sort key.
    pub first_sort: &'a str,
}

/// Renders the page statement of a paged list.
pub trait PagingStrategy: Send + Sync {
    /// Short strategy name.
    fn name(&self) -> &'static str;

    /// Renders the statement selecting one page.
    fn page_statement(&self, parts: &PageParts<'_>) -> String;
}

/// `ORDER BY ... LIMIT offset, count` paging (`SQLite`, `MySQL`).
#[derive(Debug, Clone, Copy, Default)]
pub struct LimitOffsetPaging;

impl PagingStrategy for LimitOffsetPaging {
    fn name(&self) -> &'static str {
        "limit_offset"
    }

    fn page_statement(&self, parts: &PageParts<'_>) -> String {
        let columns = if parts.columns.is_empty() {
            "*"
        } else {
            parts.columns
        };
        format!(
            "SELECT {columns} FROM {table}{filter} ORDER BY {order} LIMIT (@page - 1) * @pageSize, @pageSize",
            table = parts.table,
            filter = parts.where_clause,
            order = parts.order_by,
        )
    }
}

/// Alias of the paged table inside the window query; `schema.table.*` is not
/// valid SQL, so `*` is taken from the alias.
const SOURCE_ALIAS: &str = "src";

/// `ROW_NUMBER() OVER (...)` window paging (SQL Server, Oracle, `SQLite` 3.25+).
#[derive(Debug, Clone, Copy, Default)]
pub struct RowNumberPaging;

impl PagingStrategy for RowNumberPaging {
    fn name(&self) -> &'static str {
        "row_number"
    }

    fn page_statement(&self, parts: &PageParts<'_>) -> String {
        let columns = if parts.columns.is_empty() {
            format!("{SOURCE_ALIAS}.*")
        } else {
            parts.columns.to_string()
        };
        format!(
            "SELECT * FROM (SELECT {columns}, ROW_NUMBER() OVER (ORDER BY {first}) AS RowNumber \
             FROM {table} {SOURCE_ALIAS}{filter}) AS paged \
             WHERE RowNumber BETWEEN (@page - 1) * @pageSize + 1 AND @page * @pageSize \
             ORDER BY RowNumber",
            first = parts.first_sort,
            table = parts.table,
            filter = parts.where_clause,
        )
    }
}

/// SQL dialect used for paged lists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Dialect {
    /// `LIMIT offset, count`.
    #[default]
    LimitOffset,
    /// `ROW_NUMBER()` window.
    RowNumber,
}

impl Dialect {
    /// Picks the dialect for a provider name.
    ///
    /// SQL Server and Oracle providers use [`Dialect::RowNumber`]; everything
    /// else uses [`Dialect::LimitOffset`].
    #[must_use]
    pub fn for_provider(provider: &str) -> Self {
        let provider = provider.trim().to_lowercase();
        let row_number = ["sqlserver", "mssql", "sqlclient", "oracle", "odp"]
            .iter()
            .any(|marker| provider.contains(marker));
        if row_number {
            Self::RowNumber
        } else {
            Self::LimitOffset
        }
    }

    /// Parses a dialect name.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "limit_offset" | "limit" | "sqlite" | "mysql" => Some(Self::LimitOffset),
            "row_number" | "rownumber" | "sqlserver" | "mssql" => Some(Self::RowNumber),
            _ => None,
        }
    }

    /// The paging strategy of this dialect.
    #[must_use]
    pub fn strategy(self) -> &'static dyn PagingStrategy {
        match self {
            Self::LimitOffset => &LimitOffsetPaging,
            Self::RowNumber => &RowNumberPaging,
        }
    }
}

impl fmt::Display for Dialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.strategy().name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    const PARTS: PageParts<'static> = PageParts {
        table: "users",
        columns: "",
        where_clause: " WHERE active = @active",
        order_by: "id ASC, name DESC",
        first_sort: "id ASC",
    };

    #[test_case("sqlite", Dialect::LimitOffset)]
    #[test_case("System.Data.SqlClient", Dialect::RowNumber)]
    #[test_case("Oracle.ManagedDataAccess", Dialect::RowNumber)]
    #[test_case("mysql", Dialect::LimitOffset)]
    #[test_case("", Dialect::LimitOffset)]
    fn test_for_provider(provider: &str, expected: Dialect) {
        assert_eq!(Dialect::for_provider(provider), expected);
    }

    #[test]
    fn test_limit_offset_statement() {
        assert_eq!(
            LimitOffsetPaging.page_statement(&PARTS),
            "SELECT * FROM users WHERE active = @active ORDER BY id ASC, name DESC \
             LIMIT (@page - 1) * @pageSize, @pageSize"
        );
    }

    #[test]
    fn test_row_number_statement() {
        let sql = RowNumberPaging.page_statement(&PARTS);
        assert!(sql.starts_with("SELECT * FROM (SELECT src.*, ROW_NUMBER() OVER (ORDER BY id ASC) AS RowNumber"));
        assert!(sql.contains("FROM users src WHERE active = @active) AS paged"));
        assert!(sql.contains("BETWEEN (@page - 1) * @pageSize + 1 AND @page * @pageSize"));
        assert!(sql.ends_with("ORDER BY RowNumber"));
    }

    #[test]
    fn test_row_number_on_qualified_table() {
        let parts = PageParts {
            table: "main.users",
            ..PARTS
        };
        let sql = RowNumberPaging.page_statement(&parts);
        assert!(sql.contains("SELECT src.*, ROW_NUMBER()"));
        assert!(sql.contains("FROM main.users src WHERE"));
        assert!(!sql.contains("main.users.*"));
    }

    #[test]
    fn test_parse_and_display() {
        assert_eq!(Dialect::parse("row-number"), Some(Dialect::RowNumber));
        assert_eq!(Dialect::parse("LIMIT_OFFSET"), Some(Dialect::LimitOffset));
        assert_eq!(Dialect::parse("cobol"), None);
        assert_eq!(Dialect::RowNumber.to_string(), "row_number");
    }
}
