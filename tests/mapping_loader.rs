//! Integration tests for loading mapping directories.

#![allow(clippy::expect_used, clippy::unwrap_used)]

use mapstore::mapping::{LoadPolicy, MappingLoader};
use mapstore::{CommandKind, Error};
use std::fs;
use std::path::Path;
use tempfile::TempDir;

fn write_mapping(dir: &Path, file: &str, owner: &str, commands: &[(&str, &str)]) {
    let mut doc = format!("[mapping]\ntype = \"{owner}\"\nconnectionKey = \"main\"\n");
    for (key, text) in commands {
        doc.push_str(&format!(
            "\n[[mapping.command]]\nkey = \"{key}\"\ntext = \"\"\"\n{text}\n\"\"\"\n"
        ));
    }
    fs::write(dir.join(file), doc).expect("write mapping file");
}

#[test]
fn test_one_registry_entry_per_file() {
    let dir = TempDir::new().unwrap();
    for i in 0..12 {
        write_mapping(
            dir.path(),
            &format!("storage_{i:02}.toml"),
            &format!("app::storage::Storage{i}"),
            &[("GetAll", "SELECT 1")],
        );
    }

    let registry = MappingLoader::new().load_from(dir.path()).unwrap();
    assert_eq!(registry.len(), 12);
    for i in 0..12 {
        assert!(registry.contains(&format!("app::storage::Storage{i}")));
    }
}

#[test]
fn test_duplicate_command_key_keeps_last() {
    let dir = TempDir::new().unwrap();
    write_mapping(
        dir.path(),
        "users.toml",
        "app::UserStorage",
        &[
            ("GetById", "SELECT 1"),
            ("List", "SELECT * FROM users"),
            ("GetById", "SELECT id, name FROM users WHERE id = @id"),
        ],
    );

    let registry = MappingLoader::new().load_from(dir.path()).unwrap();
    let mapping = registry.get("app::UserStorage").unwrap();
    assert_eq!(mapping.len(), 2);

    let command = registry.command("app::UserStorage", "GetById").unwrap();
    assert_eq!(command.text, "SELECT id, name FROM users WHERE id = @id");
    assert_eq!(command.kind, CommandKind::Text);
}

#[test]
fn test_only_matching_extension_is_loaded() {
    let dir = TempDir::new().unwrap();
    write_mapping(dir.path(), "users.toml", "app::Users", &[("A", "SELECT 1")]);
    write_mapping(dir.path(), "orders.mapping", "app::Orders", &[("A", "SELECT 1")]);
    fs::write(dir.path().join("README.md"), "# not a mapping").unwrap();

    let registry = MappingLoader::new().load_from(dir.path()).unwrap();
    assert_eq!(registry.owner_names(), vec!["app::Users".to_string()]);

    let registry = MappingLoader::new()
        .with_extension(".mapping")
        .load_from(dir.path())
        .unwrap();
    assert_eq!(registry.owner_names(), vec!["app::Orders".to_string()]);
}

#[test]
fn test_fail_fast_and_skip_invalid() {
    let dir = TempDir::new().unwrap();
    write_mapping(dir.path(), "good.toml", "app::Good", &[("A", "SELECT 1")]);
    fs::write(dir.path().join("broken.toml"), "[mapping\ntype = ").unwrap();

    let err = MappingLoader::new().load_from(dir.path()).unwrap_err();
    assert!(matches!(err, Error::Mapping { ref path, .. } if path.ends_with("broken.toml")));

    let (registry, report) = MappingLoader::new()
        .with_policy(LoadPolicy::SkipInvalid)
        .load_with_report(dir.path())
        .unwrap();
    assert_eq!(registry.len(), 1);
    assert_eq!(report.discovered, 2);
    assert_eq!(report.loaded, 1);
    assert_eq!(report.skipped.len(), 1);
    assert!(report.skipped[0].path.ends_with("broken.toml"));
}

#[test]
fn test_missing_or_empty_directory_is_configuration_error() {
    let dir = TempDir::new().unwrap();
    assert!(matches!(
        MappingLoader::new().load_from(dir.path()),
        Err(Error::Configuration(_))
    ));
    assert!(matches!(
        MappingLoader::new().load_from(&dir.path().join("nope")),
        Err(Error::Configuration(_))
    ));
}

#[test]
fn test_unknown_lookups_are_not_found() {
    let dir = TempDir::new().unwrap();
    write_mapping(dir.path(), "users.toml", "app::Users", &[("A", "SELECT 1")]);
    let registry = MappingLoader::new().load_from(dir.path()).unwrap();

    assert!(matches!(
        registry.get("app::Orders"),
        Err(Error::NotFound { kind: "mapping", .. })
    ));
    assert!(matches!(
        registry.command("app::Users", "B"),
        Err(Error::NotFound { .. })
    ));
}
