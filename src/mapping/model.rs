//! Command mapping value types.

use crate::{Error, Result};
use serde::{Deserialize, Serialize, Serializer};
use std::collections::HashMap;
use std::fmt;
use std::time::Duration;

/// How a command's text is executed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum CommandKind {
    /// Plain SQL text.
    #[default]
    Text,
    /// Name of a stored procedure.
    StoredProcedure,
}

impl CommandKind {
    /// Returns the kind as it is spelled in mapping files.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Text => "Text",
            Self::StoredProcedure => "StoredProcedure",
        }
    }
}

impl fmt::Display for CommandKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One named, pre-authored SQL statement.
///
/// Serializes with the field names of mapping files (`commandType`, `timeout`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Command {
    /// Key, unique within the owning mapping.
    pub key: String,
    /// Execution kind.
    #[serde(rename = "commandType")]
    pub kind: CommandKind,
    /// Statement text with surrounding whitespace removed.
    pub text: String,
    /// Optional per-command timeout in seconds.
    #[serde(rename = "timeout", skip_serializing_if = "Option::is_none")]
    pub timeout_seconds: Option<u32>,
}

impl Command {
    /// Creates a command, trimming surrounding whitespace and newlines from `text`.
    #[must_use]
    pub fn new(key: impl Into<String>, kind: CommandKind, text: &str) -> Self {
        Self {
            key: key.into(),
            kind,
            text: text.trim().to_string(),
            timeout_seconds: None,
        }
    }

    /// Shorthand for a [`CommandKind::Text`] command.
    #[must_use]
    pub fn text(key: impl Into<String>, text: &str) -> Self {
        Self::new(key, CommandKind::Text, text)
    }

    /// Sets the per-command timeout.
    #[must_use]
    pub const fn with_timeout(mut self, seconds: u32) -> Self {
        self.timeout_seconds = Some(seconds);
        self
    }

    /// Returns the timeout as a [`Duration`], if one is declared.
    #[must_use]
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_seconds
            .map(|seconds| Duration::from_secs(u64::from(seconds)))
    }
}

/// The command registry owned by one storage type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Mapping {
    /// Fully-qualified name of the owning storage type.
    #[serde(rename = "type")]
    pub owner_type_name: String,
    /// Key used to resolve connection settings.
    #[serde(rename = "connectionKey")]
    pub connection_key: String,
    #[serde(rename = "command", serialize_with = "serialize_sorted")]
    commands: HashMap<String, Command>,
}

fn serialize_sorted<S: Serializer>(
    commands: &HashMap<String, Command>,
    serializer: S,
) -> std::result::Result<S::Ok, S::Error> {
    let mut sorted: Vec<&Command> = commands.values().collect();
    sorted.sort_unstable_by(|a, b| a.key.cmp(&b.key));
    serializer.collect_seq(sorted)
}

impl Mapping {
    /// Creates an empty mapping.
    #[must_use]
    pub fn new(owner_type_name: impl Into<String>, connection_key: impl Into<String>) -> Self {
        Self {
            owner_type_name: owner_type_name.into(),
            connection_key: connection_key.into(),
            commands: HashMap::new(),
        }
    }

    /// Adds a command. A command with the same key is replaced.
    #[must_use]
    pub fn with_command(mut self, command: Command) -> Self {
        self.insert(command);
        self
    }

    /// Inserts a command, returning the one it replaced.
    pub fn insert(&mut self, command: Command) -> Option<Command> {
        self.commands.insert(command.key.clone(), command)
    }

    /// Looks up a command by key.
    pub fn command(&self, key: &str) -> Result<&Command> {
        self.commands.get(key).ok_or_else(|| {
            Error::not_found("command", format!("{}::{key}", self.owner_type_name))
        })
    }

    /// Returns the number of commands.
    #[must_use]
    pub fn len(&self) -> usize {
        self.commands.len()
    }

    /// Returns true if the mapping declares no commands.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    /// Returns command keys in sorted order.
    #[must_use]
    pub fn command_keys(&self) -> Vec<&str> {
        let mut keys: Vec<&str> = self.commands.keys().map(String::as_str).collect();
        keys.sort_unstable();
        keys
    }

    /// Iterates over all commands in no particular order.
    pub fn commands(&self) -> impl Iterator<Item = &Command> {
        self.commands.values()
    }
}

/// Mapping-backed command lookup.
///
/// Storage types that read their SQL from mapping files depend on this
/// capability rather than on a concrete mapping.
pub trait CommandSource: Send + Sync {
    /// Returns the command registered under `key`.
    fn command(&self, key: &str) -> Result<&Command>;

    /// Returns the connection key the commands run against.
    fn connection_key(&self) -> &str;
}

impl CommandSource for Mapping {
    fn command(&self, key: &str) -> Result<&Command> {
        Self::command(self, key)
    }

    fn connection_key(&self) -> &str {
        &self.connection_key
    }
}
