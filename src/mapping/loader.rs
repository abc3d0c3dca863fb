//! Mapping file discovery and parsing.
//!
//! A mapping directory holds one TOML document per storage type. Files are
//! parsed independently on the rayon pool and inserted into a shared
//! [`MappingRegistry`].

use super::model::{Command, CommandKind, Mapping};
use super::registry::MappingRegistry;
use crate::{Error, Result};
use rayon::prelude::*;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::instrument;

/// Default mapping file extension.
pub const DEFAULT_MAPPING_EXTENSION: &str = "toml";

/// What to do when one mapping file fails to parse.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LoadPolicy {
    /// Abort the whole load on the first failure.
    #[default]
    FailFast,
    /// Skip invalid files and report them.
    SkipInvalid,
}

impl LoadPolicy {
    /// Parses a policy name (`fail_fast` / `skip_invalid`).
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "fail_fast" | "strict" => Some(Self::FailFast),
            "skip_invalid" | "lenient" => Some(Self::SkipInvalid),
            _ => None,
        }
    }
}

/// A file skipped under [`LoadPolicy::SkipInvalid`].
#[derive(Debug, Clone)]
pub struct SkippedFile {
    /// Path of the file.
    pub path: PathBuf,
    /// Why it was skipped.
    pub reason: String,
}

/// Outcome summary of a directory load.
#[derive(Debug, Clone, Default)]
pub struct LoadReport {
    /// Number of files discovered.
    pub discovered: usize,
    /// Number of mappings inserted.
    pub loaded: usize,
    /// Files that failed and were skipped.
    pub skipped: Vec<SkippedFile>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct MappingDocument {
    mapping: MappingSection,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
struct MappingSection {
    #[serde(rename = "type")]
    owner_type: String,
    connection_key: String,
    #[serde(default, rename = "command")]
    commands: Vec<CommandEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
struct CommandEntry {
    key: String,
    #[serde(default)]
    command_type: CommandKind,
    text: String,
    timeout: Option<u32>,
}

/// Loads mapping files from a directory.
#[derive(Debug, Clone)]
pub struct MappingLoader {
    extension: String,
    policy: LoadPolicy,
}

impl Default for MappingLoader {
    fn default() -> Self {
        Self {
            extension: DEFAULT_MAPPING_EXTENSION.to_string(),
            policy: LoadPolicy::default(),
        }
    }
}

impl MappingLoader {
    /// Creates a loader with the default extension and fail-fast policy.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the file extension that marks a mapping file (without the dot).
    #[must_use]
    pub fn with_extension(mut self, extension: impl Into<String>) -> Self {
        self.extension = extension.into().trim_start_matches('.').to_string();
        self
    }

    /// Sets the failure policy.
    #[must_use]
    pub const fn with_policy(mut self, policy: LoadPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Loads every mapping file in `dir` into a new registry.
    ///
    /// # Errors
    ///
    /// - [`Error::Configuration`] if `dir` does not exist or holds no mapping files.
    /// - [`Error::Mapping`] for the first file that fails under [`LoadPolicy::FailFast`].
    pub fn load_from(&self, dir: &Path) -> Result<MappingRegistry> {
        self.load_with_report(dir).map(|(registry, _)| registry)
    }

    /// Like [`load_from`](Self::load_from), also returning a [`LoadReport`].
    #[instrument(skip(self), fields(dir = %dir.display(), policy = ?self.policy))]
    pub fn load_with_report(&self, dir: &Path) -> Result<(MappingRegistry, LoadReport)> {
        let start = Instant::now();
        let files = self.discover(dir)?;
        let registry = MappingRegistry::new();

        let skipped = match self.policy {
            LoadPolicy::FailFast => {
                files.par_iter().try_for_each(|path| {
                    registry.insert(parse_mapping_file(path)?);
                    Ok::<(), Error>(())
                })?;
                Vec::new()
            },
            LoadPolicy::SkipInvalid => files
                .par_iter()
                .filter_map(|path| match parse_mapping_file(path) {
                    Ok(mapping) => {
                        registry.insert(mapping);
                        None
                    },
                    Err(e) => {
                        tracing::warn!(path = %path.display(), error = %e, "skipping invalid mapping file");
                        Some(SkippedFile {
                            path: path.clone(),
                            reason: e.to_string(),
                        })
                    },
                })
                .collect(),
        };

        let report = LoadReport {
            discovered: files.len(),
            loaded: files.len() - skipped.len(),
            skipped,
        };

        metrics::counter!("mapstore_mapping_files_loaded_total").increment(report.loaded as u64);
        tracing::info!(
            files = report.discovered,
            mappings = registry.len(),
            skipped = report.skipped.len(),
            duration_ms = start.elapsed().as_millis(),
            "loaded mapping directory"
        );

        Ok((registry, report))
    }

    /// Lists matching files in `dir`, sorted by path.
    fn discover(&self, dir: &Path) -> Result<Vec<PathBuf>> {
        if !dir.is_dir() {
            return Err(Error::Configuration(format!(
                "mapping directory '{}' does not exist",
                dir.display()
            )));
        }

        let entries = std::fs::read_dir(dir).map_err(|e| Error::OperationFailed {
            operation: "read_mapping_dir".to_string(),
            cause: format!("{}: {e}", dir.display()),
        })?;

        let mut files = Vec::new();
        for entry in entries {
            let path = entry
                .map_err(|e| Error::OperationFailed {
                    operation: "read_mapping_dir".to_string(),
                    cause: e.to_string(),
                })?
                .path();
            if path.is_file() && self.matches(&path) {
                files.push(path);
            }
        }
        files.sort();

        if files.is_empty() {
            return Err(Error::Configuration(format!(
                "mapping directory '{}' contains no *.{} files",
                dir.display(),
                self.extension
            )));
        }
        Ok(files)
    }

    fn matches(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case(&self.extension))
    }
}

/// Reads and parses one mapping file.
pub fn parse_mapping_file(path: &Path) -> Result<Mapping> {
    let contents = std::fs::read_to_string(path).map_err(|e| Error::Mapping {
        path: path.to_path_buf(),
        cause: e.to_string(),
    })?;
    parse_mapping_str(&contents, path)
}

/// Parses mapping TOML. `origin` is only used in error messages.
pub fn parse_mapping_str(contents: &str, origin: &Path) -> Result<Mapping> {
    let mapping_error = |cause: String| Error::Mapping {
        path: origin.to_path_buf(),
        cause,
    };

    let document: MappingDocument =
        toml::from_str(contents).map_err(|e| mapping_error(e.to_string()))?;
    let section = document.mapping;

    if section.owner_type.trim().is_empty() {
        return Err(mapping_error("`type` must not be blank".to_string()));
    }
    if section.connection_key.trim().is_empty() {
        return Err(mapping_error("`connectionKey` must not be blank".to_string()));
    }

    let mut mapping = Mapping::new(section.owner_type.trim(), section.connection_key.trim());
    for entry in section.commands {
        let key = entry.key.trim();
        if key.is_empty() {
            return Err(mapping_error("command `key` must not be blank".to_string()));
        }
        let mut command = Command::new(key, entry.command_type, &entry.text);
        command.timeout_seconds = entry.timeout;
        if let Some(replaced) = mapping.insert(command) {
            tracing::debug!(
                owner = %mapping.owner_type_name,
                key = %replaced.key,
                "duplicate command key, keeping the last declaration"
            );
        }
    }

    Ok(mapping)
}

#[cfg(test)]
mod tests {
    use super::*;

    const USERS: &str = r#"
[mapping]
type = "app::storage::UserStorage"
connectionKey = "main"

[[mapping.command]]
key = "GetById"
text = """

    SELECT id, name FROM users WHERE id = @id

"""

[[mapping.command]]
key = "Archive"
commandType = "StoredProcedure"
timeout = 90
text = "usp_archive_users"
"#;

    #[test]
    fn test_parse_mapping_document() {
        let mapping = parse_mapping_str(USERS, Path::new("users.toml")).unwrap();
        assert_eq!(mapping.owner_type_name, "app::storage::UserStorage");
        assert_eq!(mapping.connection_key, "main");
        assert_eq!(mapping.len(), 2);

        let get = mapping.command("GetById").unwrap();
        assert_eq!(get.kind, CommandKind::Text);
        assert_eq!(get.text, "SELECT id, name FROM users WHERE id = @id");
        assert_eq!(get.timeout_seconds, None);

        let archive = mapping.command("Archive").unwrap();
        assert_eq!(archive.kind, CommandKind::StoredProcedure);
        assert_eq!(archive.timeout_seconds, Some(90));
    }

    #[test]
    fn test_wrong_root_is_rejected() {
        let doc = r#"
[storage]
type = "x"
connectionKey = "main"
"#;
        let err = parse_mapping_str(doc, Path::new("bad.toml")).unwrap_err();
        assert!(matches!(err, Error::Mapping { .. }));
    }

    #[test]
    fn test_unknown_command_type_is_rejected() {
        let doc = r#"
[mapping]
type = "x"
connectionKey = "main"

[[mapping.command]]
key = "a"
commandType = "Function"
text = "SELECT 1"
"#;
        assert!(parse_mapping_str(doc, Path::new("bad.toml")).is_err());
    }

    #[test]
    fn test_duplicate_keys_keep_last() {
        let doc = r#"
[mapping]
type = "x"
connectionKey = "main"

[[mapping.command]]
key = "a"
text = "SELECT 1"

[[mapping.command]]
key = "a"
text = "SELECT 2"
"#;
        let mapping = parse_mapping_str(doc, Path::new("dup.toml")).unwrap();
        assert_eq!(mapping.len(), 1);
        assert_eq!(mapping.command("a").unwrap().text, "SELECT 2");
    }

    #[test]
    fn test_blank_owner_is_rejected() {
        let doc = r#"
[mapping]
type = "  "
connectionKey = "main"
"#;
        let err = parse_mapping_str(doc, Path::new("blank.toml")).unwrap_err();
        assert!(err.to_string().contains("`type`"));
    }

    #[test]
    fn test_load_policy_parse() {
        assert_eq!(LoadPolicy::parse("fail_fast"), Some(LoadPolicy::FailFast));
        assert_eq!(LoadPolicy::parse("Skip-Invalid"), Some(LoadPolicy::SkipInvalid));
        assert_eq!(LoadPolicy::parse("whatever"), None);
    }

    #[test]
    fn test_missing_directory() {
        let err = MappingLoader::new()
            .load_from(Path::new("/definitely/not/a/mapping/dir"))
            .unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));
    }
}
