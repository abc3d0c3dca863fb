//! Typed parameter values and statement binding.
//!
//! Parameters are addressed by name (`@name` in SQL). List values are only
//! meaningful on the right of `IN`; they are expanded into one placeholder per
//! element before the statement is prepared.

use crate::{Error, Result};
use regex::{Captures, Regex};
use rusqlite::Statement;
use rusqlite::types::{ToSql, ToSqlOutput, ValueRef};
use std::borrow::Cow;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;
use std::sync::LazyLock;

/// Matches `@name` placeholders.
static PLACEHOLDER_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"@([A-Za-z_][A-Za-z0-9_]*)").unwrap_or_else(|_| unreachable!())
});

/// A bound parameter value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// SQL `NULL`.
    Null,
    /// 64-bit integer.
    Integer(i64),
    /// Double precision float.
    Real(f64),
    /// UTF-8 text.
    Text(String),
    /// Raw bytes.
    Blob(Vec<u8>),
    /// A collection, only valid with the `IN` operator.
    List(Vec<Self>),
}

impl Value {
    /// Returns true for [`Value::List`].
    #[must_use]
    pub const fn is_list(&self) -> bool {
        matches!(self, Self::List(_))
    }

    /// Returns a short type name for diagnostics.
    #[must_use]
    pub const fn type_name(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Integer(_) => "integer",
            Self::Real(_) => "real",
            Self::Text(_) => "text",
            Self::Blob(_) => "blob",
            Self::List(_) => "list",
        }
    }

    pub(crate) fn from_value_ref(value: ValueRef<'_>) -> Self {
        match value {
            ValueRef::Null => Self::Null,
            ValueRef::Integer(i) => Self::Integer(i),
            ValueRef::Real(f) => Self::Real(f),
            ValueRef::Text(t) => Self::Text(String::from_utf8_lossy(t).into_owned()),
            ValueRef::Blob(b) => Self::Blob(b.to_vec()),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => f.write_str("NULL"),
            Self::Integer(i) => write!(f, "{i}"),
            Self::Real(r) => write!(f, "{r}"),
            Self::Text(s) => write!(f, "'{s}'"),
            Self::Blob(b) => write!(f, "<{} bytes>", b.len()),
            Self::List(items) => {
                f.write_str("(")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{item}")?;
                }
                f.write_str(")")
            },
        }
    }
}

impl ToSql for Value {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(match self {
            Self::Null => ToSqlOutput::Owned(rusqlite::types::Value::Null),
            Self::Integer(i) => ToSqlOutput::Owned(rusqlite::types::Value::Integer(*i)),
            Self::Real(r) => ToSqlOutput::Owned(rusqlite::types::Value::Real(*r)),
            Self::Text(s) => ToSqlOutput::Borrowed(ValueRef::Text(s.as_bytes())),
            Self::Blob(b) => ToSqlOutput::Borrowed(ValueRef::Blob(b)),
            Self::List(_) => {
                return Err(rusqlite::Error::ToSqlConversionFailure(
                    "list values can only be bound through `IN @name`".into(),
                ));
            },
        })
    }
}

macro_rules! value_from_integer {
    ($($t:ty),*) => {
        $(impl From<$t> for Value {
            fn from(v: $t) -> Self {
                Self::Integer(i64::from(v))
            }
        })*
    };
}

value_from_integer!(i8, i16, i32, i64, u8, u16, u32, bool);

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Self::Real(v)
    }
}

impl From<f32> for Value {
    fn from(v: f32) -> Self {
        Self::Real(f64::from(v))
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Self::Text(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Self::Text(v)
    }
}

impl From<&String> for Value {
    fn from(v: &String) -> Self {
        Self::Text(v.clone())
    }
}

impl<T: Into<Self>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Self::Null, Into::into)
    }
}

impl<T: Into<Self>> From<Vec<T>> for Value {
    fn from(v: Vec<T>) -> Self {
        Self::List(v.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<Self> + Clone> From<&[T]> for Value {
    fn from(v: &[T]) -> Self {
        Self::List(v.iter().cloned().map(Into::into).collect())
    }
}

/// Named parameter map.
///
/// Names are stored without their `@`, `:` or `$` prefix.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Params {
    values: BTreeMap<String, Value>,
}

impl Params {
    /// Creates an empty parameter map.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a parameter (builder style).
    #[must_use]
    pub fn with(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.insert(name, value);
        self
    }

    /// Inserts a parameter, returning the previous value.
    pub fn insert(&mut self, name: &str, value: impl Into<Value>) -> Option<Value> {
        self.values
            .insert(normalize_name(name).to_string(), value.into())
    }

    /// Returns a parameter by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values.get(normalize_name(name))
    }

    /// Number of parameters.
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// True when no parameter is set.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Iterates parameters in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Copies every parameter of `other` into `self`.
    pub fn extend(&mut self, other: &Self) {
        for (name, value) in &other.values {
            self.values.insert(name.clone(), value.clone());
        }
    }
}

impl<K: AsRef<str>, V: Into<Value>> FromIterator<(K, V)> for Params {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut params = Self::new();
        for (name, value) in iter {
            params.insert(name.as_ref(), value);
        }
        params
    }
}

fn normalize_name(name: &str) -> &str {
    name.trim_start_matches(['@', ':', '$'])
}

/// Command text and parameters after list expansion.
#[derive(Debug)]
pub(crate) struct PreparedText<'a> {
    pub text: Cow<'a, str>,
    pub params: Cow<'a, Params>,
}

/// Rejects blank command text.
pub(crate) fn validate_text(text: &str) -> Result<()> {
    if text.trim().is_empty() {
        return Err(Error::InvalidArgument(
            "command text must not be blank".to_string(),
        ));
    }
    Ok(())
}

/// Expands list parameters: `IN @ids` with `ids = [1, 2]` becomes
/// `IN (@ids_0, @ids_1)`. An empty list becomes `(NULL)`.
///
/// Element names never shadow another parameter: when `ids_0` is already
/// bound, the element is named `ids_0_1` instead.
pub(crate) fn expand_lists<'a>(text: &'a str, params: &'a Params) -> PreparedText<'a> {
    if !params.values.values().any(Value::is_list) {
        return PreparedText {
            text: Cow::Borrowed(text),
            params: Cow::Borrowed(params),
        };
    }

    let mut taken: HashSet<String> = params
        .values
        .iter()
        .filter(|(_, value)| !value.is_list())
        .map(|(name, _)| name.clone())
        .collect();
    let mut expanded = Params::new();
    let mut elements: HashMap<&str, Vec<String>> = HashMap::new();
    for (name, value) in &params.values {
        match value {
            Value::List(items) => {
                let names = items
                    .iter()
                    .enumerate()
                    .map(|(i, item)| {
                        let element = unique_name(&format!("{name}_{i}"), &mut taken);
                        expanded.values.insert(element.clone(), item.clone());
                        element
                    })
                    .collect();
                elements.insert(name.as_str(), names);
            },
            other => {
                expanded.values.insert(name.clone(), other.clone());
            },
        }
    }

    let text = PLACEHOLDER_PATTERN.replace_all(text, |caps: &Captures<'_>| {
        match elements.get(&caps[1]) {
            Some(names) if names.is_empty() => "(NULL)".to_string(),
            Some(names) => {
                let placeholders: Vec<String> = names.iter().map(|n| format!("@{n}")).collect();
                format!("({})", placeholders.join(", "))
            },
            None => caps[0].to_string(),
        }
    });

    PreparedText {
        text: Cow::Owned(text.into_owned()),
        params: Cow::Owned(expanded),
    }
}

/// Returns `base`, or `base_1`, `base_2`, ... if taken, and marks it taken.
fn unique_name(base: &str, taken: &mut HashSet<String>) -> String {
    let mut name = base.to_string();
    let mut suffix = 1;
    while taken.contains(&name) {
        name = format!("{base}_{suffix}");
        suffix += 1;
    }
    taken.insert(name.clone());
    name
}

/// Binds every named parameter the statement declares.
///
/// Parameters present in `params` but unused by this statement are ignored,
/// which lets one map serve every statement of a multi-statement command.
pub(crate) fn bind(stmt: &mut Statement<'_>, params: &Params) -> Result<()> {
    for index in 1..=stmt.parameter_count() {
        let Some(raw_name) = stmt.parameter_name(index) else {
            return Err(Error::InvalidArgument(format!(
                "positional parameter at index {index} is not supported, use @name"
            )));
        };
        let name = normalize_name(raw_name).to_string();
        let value = params.values.get(&name).ok_or_else(|| {
            Error::InvalidArgument(format!("no value supplied for parameter @{name}"))
        })?;
        stmt.raw_bind_parameter(index, value)?;
    }
    Ok(())
}
