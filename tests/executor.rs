//! Integration tests for query execution against `SQLite`.

#![allow(clippy::expect_used, clippy::unwrap_used)]

use mapstore::sql::{ClauseColumn, Combinator, Dialect, Select, SortableColumn, SqlBuilder};
use mapstore::storage::{MappedStorage, Params, Record, Scope};
use mapstore::{Command, CommandKind, Error, IsolationLevel, Mapping, SqlExecutor};
use std::sync::Arc;
use tempfile::TempDir;
use test_case::test_case;

fn seeded(dir: &TempDir) -> SqlExecutor {
    let executor = SqlExecutor::sqlite(dir.path().join("people.db"));
    executor
        .execute(
            "CREATE TABLE people (id INTEGER PRIMARY KEY, name TEXT NOT NULL, team TEXT NOT NULL)",
            &Params::new(),
            None,
            None,
        )
        .unwrap();
    executor
        .execute_in_transaction(IsolationLevel::ReadCommitted, |tx| {
            for id in 1..=45_i64 {
                let team = if id % 3 == 0 { "red" } else { "blue" };
                executor.execute(
                    "INSERT INTO people (id, name, team) VALUES (@id, @name, @team)",
                    &Params::new()
                        .with("id", id)
                        .with("name", format!("person {id}"))
                        .with("team", team),
                    Some(tx),
                    None,
                )?;
            }
            Ok(())
        })
        .unwrap();
    executor
}

#[test_case(Dialect::LimitOffset ; "limit offset")]
#[test_case(Dialect::RowNumber ; "row number")]
fn test_second_page_of_ten(dialect: Dialect) {
    let dir = TempDir::new().unwrap();
    let executor = seeded(&dir);

    let sorts = [SortableColumn::asc("id")];
    let built = SqlBuilder::new(dialect)
        .paged_list(&Select::from("people").order_by(&sorts), 2, 10)
        .unwrap();

    let page = executor
        .paged_list::<(i64, String)>(&built.text, &built.params, None, None)
        .unwrap();
    let ids: Vec<i64> = page.rows.iter().map(|(id, _)| *id).collect();
    assert_eq!(ids, (11..=20).collect::<Vec<_>>());
    assert_eq!(page.count, 45);
    assert_eq!(page.page_count(10), 5);
    assert_eq!(executor.open_connections(), 0);
}

#[test_case(Dialect::LimitOffset ; "limit offset")]
#[test_case(Dialect::RowNumber ; "row number")]
fn test_filtered_page_counts_with_same_predicate(dialect: Dialect) {
    let dir = TempDir::new().unwrap();
    let executor = seeded(&dir);

    let clauses = [ClauseColumn::eq("team", "red")];
    let sorts = [SortableColumn::asc("id")];
    let select = Select::from("people")
        .filter(&clauses, Combinator::And)
        .order_by(&sorts);
    let built = SqlBuilder::new(dialect).paged_list(&select, 2, 5).unwrap();

    let (page_sql, count_sql) = built.text.split_once(";\n").unwrap();
    assert!(page_sql.contains("WHERE team = @team"));
    assert!(count_sql.contains("WHERE team = @team"));

    let page = executor
        .paged_list::<(i64, String)>(&built.text, &built.params, None, None)
        .unwrap();
    let ids: Vec<i64> = page.rows.iter().map(|(id, _)| *id).collect();
    assert_eq!(ids, vec![18, 21, 24, 27, 30]);
    assert_eq!(page.count, 15);
}

#[test]
fn test_in_with_scalar_fails_before_any_database_call() {
    let dir = TempDir::new().unwrap();
    let executor = SqlExecutor::sqlite(dir.path().join("never-created.db"));

    let clauses = [ClauseColumn::in_("id", 7)];
    let err = SqlBuilder::default()
        .list(&Select::from("people").filter(&clauses, Combinator::And))
        .unwrap_err();
    assert!(matches!(err, Error::InvalidArgument(_)));

    let err = executor
        .query::<Record>("   ", &Params::new(), None, None)
        .unwrap_err();
    assert!(matches!(err, Error::InvalidArgument(_)));
    assert!(!dir.path().join("never-created.db").exists());
}

#[test]
fn test_in_list_round_trip() {
    let dir = TempDir::new().unwrap();
    let executor = seeded(&dir);

    let clauses = [ClauseColumn::in_("id", vec![3_i64, 5, 8])];
    let sorts = [SortableColumn::desc("id")];
    let built = SqlBuilder::default()
        .list(
            &Select::from("people")
                .filter(&clauses, Combinator::And)
                .order_by(&sorts),
        )
        .unwrap();
    let rows: Vec<Record> = executor.query(&built.text, &built.params, None, None).unwrap();
    let ids: Vec<_> = rows.iter().map(|r| r.get("id").cloned().unwrap()).collect();
    assert_eq!(
        ids,
        vec![
            mapstore::Value::Integer(8),
            mapstore::Value::Integer(5),
            mapstore::Value::Integer(3)
        ]
    );
}

#[test]
fn test_failed_transaction_rolls_back_and_releases_once() {
    let dir = TempDir::new().unwrap();
    let executor = seeded(&dir);

    let result: mapstore::Result<()> =
        executor.execute_in_transaction(IsolationLevel::Serializable, |tx| {
            executor.execute(
                "DELETE FROM people WHERE team = @team",
                &Params::new().with("team", "blue"),
                Some(tx),
                None,
            )?;
            assert_eq!(executor.open_connections(), 1);
            Err(Error::InvalidArgument("abort".to_string()))
        });
    assert!(matches!(result, Err(Error::InvalidArgument(_))));
    assert_eq!(executor.open_connections(), 0);

    let remaining: i64 = executor
        .execute_scalar("SELECT COUNT(1) FROM people", &Params::new(), None, None)
        .unwrap();
    assert_eq!(remaining, 45);
}

#[test]
fn test_multiple_results_in_declaration_order() {
    let dir = TempDir::new().unwrap();
    let executor = seeded(&dir);
    let lease = executor.acquire().unwrap();

    let (names, total, reds) = executor
        .query_multiple(
            "SELECT name FROM people WHERE id <= 2 ORDER BY id;
             SELECT COUNT(1) FROM people;
             SELECT COUNT(1) FROM people WHERE team = @team",
            &Params::new().with("team", "red"),
            &lease,
            None,
            |grid| {
                let names: Vec<String> = grid.read()?;
                let total: i64 = grid.read_scalar()?;
                let reds: i64 = grid.read_scalar()?;
                assert!(grid.read::<Record>().is_err());
                Ok((names, total, reds))
            },
        )
        .unwrap();
    assert_eq!(names, vec!["person 1".to_string(), "person 2".to_string()]);
    assert_eq!((total, reds), (45, 15));

    assert_eq!(executor.open_connections(), 1);
    drop(lease);
    assert_eq!(executor.open_connections(), 0);
}

#[test]
fn test_multiple_results_inside_transaction() {
    let dir = TempDir::new().unwrap();
    let executor = seeded(&dir);
    let tx = executor.begin_transaction(IsolationLevel::RepeatableRead).unwrap();

    let count: i64 = executor
        .query_multiple(
            "DELETE FROM people WHERE id > 40; SELECT COUNT(1) FROM people",
            &Params::new(),
            Scope::from(&tx),
            None,
            |grid| grid.read_scalar(),
        )
        .unwrap();
    assert_eq!(count, 40);
    tx.rollback().unwrap();

    let count: i64 = executor
        .execute_scalar("SELECT COUNT(1) FROM people", &Params::new(), None, None)
        .unwrap();
    assert_eq!(count, 45);
}

#[test]
fn test_mapped_storage_commands() {
    let dir = TempDir::new().unwrap();
    let executor = Arc::new(seeded(&dir));
    let mapping = Mapping::new("app::People", "main")
        .with_command(Command::text(
            "ByTeam",
            "SELECT id, name FROM people WHERE team = @team ORDER BY id",
        ))
        .with_command(Command::text(
            "Rename",
            "UPDATE people SET name = @name WHERE id = @id",
        ))
        .with_command(Command::new(
            "Archive",
            CommandKind::StoredProcedure,
            "usp_archive_people",
        ));
    let storage = MappedStorage::new(Arc::clone(&executor), Arc::new(mapping));

    let reds: Vec<(i64, String)> = storage
        .query_command("ByTeam", &Params::new().with("team", "red"), None)
        .unwrap();
    assert_eq!(reds.len(), 15);

    let changed = storage
        .execute_command(
            "Rename",
            &Params::new().with("id", 3).with("name", "renamed"),
            None,
        )
        .unwrap();
    assert_eq!(changed, 1);

    let mut seen = Vec::new();
    let visited = storage
        .query_command_unbuffered(
            "ByTeam",
            &Params::new().with("team", "red"),
            None,
            |(id, name): (i64, String)| {
                seen.push((id, name));
                Ok(())
            },
        )
        .unwrap();
    assert_eq!(visited, 15);
    assert_eq!(seen[0], (3, "renamed".to_string()));

    assert!(matches!(
        storage.execute_command("Archive", &Params::new(), None),
        Err(Error::Unsupported(_))
    ));
    assert!(matches!(
        storage.execute_command("Missing", &Params::new(), None),
        Err(Error::NotFound { .. })
    ));
    assert_eq!(executor.open_connections(), 0);
}

#[test]
fn test_in_list_next_to_suffixed_parameter() {
    let dir = TempDir::new().unwrap();
    let executor = SqlExecutor::sqlite(dir.path().join("roles.db"));
    executor
        .execute(
            "CREATE TABLE grants (id INTEGER PRIMARY KEY, role TEXT NOT NULL, role_0 TEXT NOT NULL);
             INSERT INTO grants (id, role, role_0) VALUES (1, 'x', 'z'), (2, 'y', 'q'), (3, 'x', 'q')",
            &Params::new(),
            None,
            None,
        )
        .unwrap();

    let clauses = [
        ClauseColumn::in_("role", vec!["x", "y"]),
        ClauseColumn::eq("role_0", "q"),
    ];
    let built = SqlBuilder::default()
        .count("grants", &clauses, Combinator::And)
        .unwrap();
    let count: i64 = executor
        .execute_scalar(&built.text, &built.params, None, None)
        .unwrap();
    assert_eq!(count, 2);
}

#[test]
fn test_row_number_paging_on_schema_qualified_table() {
    let dir = TempDir::new().unwrap();
    let executor = seeded(&dir);

    let sorts = [SortableColumn::desc("id")];
    let built = SqlBuilder::new(Dialect::RowNumber)
        .paged_list(&Select::from("main.people").order_by(&sorts), 1, 3)
        .unwrap();

    let page = executor
        .paged_list::<(i64, String)>(&built.text, &built.params, None, None)
        .unwrap();
    let ids: Vec<i64> = page.rows.iter().map(|(id, _)| *id).collect();
    assert_eq!(ids, vec![45, 44, 43]);
    assert_eq!(page.count, 45);
}

#[test]
fn test_execute_counts_only_data_changes() {
    let dir = TempDir::new().unwrap();
    let executor = seeded(&dir);

    let affected = executor
        .execute(
            "DELETE FROM people WHERE id = 1; CREATE INDEX ix_people_team ON people(team)",
            &Params::new(),
            None,
            None,
        )
        .unwrap();
    assert_eq!(affected, 1);
}
