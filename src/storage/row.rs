//! Row materialization.

use super::params::Value;
use rusqlite::Row;
use rusqlite::types::FromSql;
use serde_json::{Map, Number};

/// Builds a value from one result row.
///
/// Implemented for common scalars (reading column 0), for tuples of up to four
/// columns (reading columns by position), and for [`Record`]. Storage types
/// implement it for their own row structs, usually reading columns by name.
///
/// # Examples
///
/// ```ignore
/// struct User { id: i64, name: String }
///
/// impl FromRow for User {
///     fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
///         Ok(Self { id: row.get("id")?, name: row.get("name")? })
///     }
/// }
/// ```
pub trait FromRow: Sized {
    /// Converts the current row.
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self>;
}

macro_rules! from_row_scalar {
    ($($t:ty),*) => {
        $(impl FromRow for $t {
            fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
                row.get(0)
            }
        })*
    };
}

from_row_scalar!(i32, i64, u32, f64, bool, String, Vec<u8>);

impl<T: FromSql> FromRow for Option<T> {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        row.get(0)
    }
}

impl<A: FromSql, B: FromSql> FromRow for (A, B) {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok((row.get(0)?, row.get(1)?))
    }
}

impl<A: FromSql, B: FromSql, C: FromSql> FromRow for (A, B, C) {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok((row.get(0)?, row.get(1)?, row.get(2)?))
    }
}

impl<A: FromSql, B: FromSql, C: FromSql, D: FromSql> FromRow for (A, B, C, D) {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?))
    }
}

/// A dynamically typed row: column names with their values, in select order.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Record {
    columns: Vec<(String, Value)>,
}

impl Record {
    /// Returns the value of a column by name.
    #[must_use]
    pub fn get(&self, column: &str) -> Option<&Value> {
        self.columns
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(column))
            .map(|(_, value)| value)
    }

    /// Column names in select order.
    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|(name, _)| name.as_str())
    }

    /// Number of columns.
    #[must_use]
    pub fn len(&self) -> usize {
        self.columns.len()
    }

    /// True for a row without columns.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Renders the row as a JSON object. Blobs become arrays of bytes.
    #[must_use]
    pub fn to_json(&self) -> serde_json::Value {
        let mut object = Map::new();
        for (name, value) in &self.columns {
            object.insert(name.clone(), value_to_json(value));
        }
        serde_json::Value::Object(object)
    }
}

fn value_to_json(value: &Value) -> serde_json::Value {
    match value {
        Value::Null => serde_json::Value::Null,
        Value::Integer(i) => serde_json::Value::Number((*i).into()),
        Value::Real(r) => Number::from_f64(*r).map_or(serde_json::Value::Null, serde_json::Value::Number),
        Value::Text(s) => serde_json::Value::String(s.clone()),
        Value::Blob(b) => serde_json::Value::Array(b.iter().map(|byte| (*byte).into()).collect()),
        Value::List(items) => serde_json::Value::Array(items.iter().map(value_to_json).collect()),
    }
}

impl FromRow for Record {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        let stmt = row.as_ref();
        let mut columns = Vec::with_capacity(stmt.column_count());
        for index in 0..stmt.column_count() {
            let name = stmt.column_name(index)?.to_string();
            columns.push((name, Value::from_value_ref(row.get_ref(index)?)));
        }
        Ok(Self { columns })
    }
}
