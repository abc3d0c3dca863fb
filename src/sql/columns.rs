//! Column, clause and sort descriptors.

use crate::storage::Value;
use crate::{Error, Result};
use regex::Regex;
use std::fmt;
use std::sync::LazyLock;

/// Table and column names: `name` or `schema.name`.
static IDENTIFIER_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*(\.[A-Za-z_][A-Za-z0-9_]*)*$")
        .unwrap_or_else(|_| unreachable!())
});

/// Rejects names that are not plain (optionally dotted) identifiers.
pub(crate) fn validate_identifier(name: &str, what: &str) -> Result<()> {
    if IDENTIFIER_PATTERN.is_match(name) {
        Ok(())
    } else {
        Err(Error::InvalidArgument(format!("invalid {what} name '{name}'")))
    }
}

/// Comparison operator of a clause.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Operator {
    /// `=`
    #[default]
    Eq,
    /// `<>`
    Neq,
    /// `>`
    Gt,
    /// `>=`
    Gte,
    /// `<`
    Lt,
    /// `<=`
    Lte,
    /// `IN`, requires a list value.
    In,
    /// `LIKE`; wildcards are part of the value.
    Like,
}

impl Operator {
    /// SQL spelling of the operator.
    #[must_use]
    pub const fn as_sql(self) -> &'static str {
        match self {
            Self::Eq => "=",
            Self::Neq => "<>",
            Self::Gt => ">",
            Self::Gte => ">=",
            Self::Lt => "<",
            Self::Lte => "<=",
            Self::In => "IN",
            Self::Like => "LIKE",
        }
    }

    /// Parses an operator from its name or SQL spelling.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "eq" | "=" | "==" => Some(Self::Eq),
            "neq" | "ne" | "<>" | "!=" => Some(Self::Neq),
            "gt" | ">" => Some(Self::Gt),
            "gte" | "ge" | ">=" => Some(Self::Gte),
            "lt" | "<" => Some(Self::Lt),
            "lte" | "le" | "<=" => Some(Self::Lte),
            "in" => Some(Self::In),
            "like" => Some(Self::Like),
            _ => None,
        }
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_sql())
    }
}

/// How multiple clauses are joined.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Combinator {
    /// All clauses must hold.
    #[default]
    And,
    /// Any clause may hold.
    Or,
}

impl Combinator {
    /// SQL keyword.
    #[must_use]
    pub const fn as_sql(self) -> &'static str {
        match self {
            Self::And => "AND",
            Self::Or => "OR",
        }
    }
}

/// A selected column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Column {
    /// Column name.
    pub name: String,
}

impl Column {
    /// Creates a column.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

impl From<&str> for Column {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

/// A column with the value to write.
#[derive(Debug, Clone, PartialEq)]
pub struct ValueColumn {
    /// Column name.
    pub name: String,
    /// Value to bind.
    pub value: Value,
}

impl ValueColumn {
    /// Creates a value column.
    #[must_use]
    pub fn new(name: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// A predicate on one column.
#[derive(Debug, Clone, PartialEq)]
pub struct ClauseColumn {
    /// Column name.
    pub name: String,
    /// Value compared against.
    pub value: Value,
    /// Comparison operator.
    pub operator: Operator,
}

impl ClauseColumn {
    /// Creates a clause.
    #[must_use]
    pub fn new(name: impl Into<String>, operator: Operator, value: impl Into<Value>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            operator,
        }
    }

    /// `name = value`
    #[must_use]
    pub fn eq(name: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::new(name, Operator::Eq, value)
    }

    /// `name IN (values...)`
    #[must_use]
    pub fn in_(name: impl Into<String>, values: impl Into<Value>) -> Self {
        Self::new(name, Operator::In, values)
    }

    /// `name LIKE pattern`
    #[must_use]
    pub fn like(name: impl Into<String>, pattern: impl Into<String>) -> Self {
        Self::new(name, Operator::Like, pattern.into())
    }

    /// Checks the name and the operator/value pairing.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidArgument`] for an invalid name, `IN` with a non-list
    /// value, or a list value with any other operator.
    pub fn validate(&self) -> Result<()> {
        validate_identifier(&self.name, "column")?;
        match (self.operator, self.value.is_list()) {
            (Operator::In, false) => Err(Error::InvalidArgument(format!(
                "clause on '{}' uses IN with a {} value; IN requires a list",
                self.name,
                self.value.type_name()
            ))),
            (op, true) if op != Operator::In => Err(Error::InvalidArgument(format!(
                "clause on '{}' binds a list with operator {op}; lists require IN",
                self.name
            ))),
            _ => Ok(()),
        }
    }
}

/// A sort key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortableColumn {
    /// Column name.
    pub name: String,
    /// Sort descending instead of ascending.
    pub descending: bool,
}

impl SortableColumn {
    /// Ascending sort on `name`.
    #[must_use]
    pub fn asc(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            descending: false,
        }
    }

    /// Descending sort on `name`.
    #[must_use]
    pub fn desc(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            descending: true,
        }
    }

    pub(crate) fn render(&self) -> String {
        if self.descending {
            format!("{} DESC", self.name)
        } else {
            format!("{} ASC", self.name)
        }
    }
}

/// Wraps `text` in `%` for a substring `LIKE` match.
///
/// `%` and `_` inside `text` keep their wildcard meaning.
///
/// # Examples
///
/// ```
/// assert_eq!(mapstore::sql::like_contains("ada"), "%ada%");
/// ```
#[must_use]
pub fn like_contains(text: &str) -> String {
    format!("%{text}%")
}

/// Appends `%` for a prefix `LIKE` match.
#[must_use]
pub fn like_starts_with(text: &str) -> String {
    format!("{text}%")
}
