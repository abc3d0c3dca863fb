//! Integration and property tests for SQL generation.

#![allow(clippy::expect_used, clippy::unwrap_used)]

use mapstore::sql::{Select, like_contains};
use mapstore::{
    ClauseColumn, Combinator, Dialect, Error, SortableColumn, SqlBuilder, Value, ValueColumn,
};
use proptest::prelude::*;

#[test]
fn test_insert_preserves_column_order() {
    let built = SqlBuilder::default()
        .insert(
            "T",
            &[ValueColumn::new("a", 1), ValueColumn::new("b", "x")],
        )
        .unwrap();
    assert_eq!(built.text, "INSERT INTO T (a, b) VALUES (@a, @b)");
    assert_eq!(built.params.get("a"), Some(&Value::Integer(1)));
    assert_eq!(built.params.get("b"), Some(&Value::Text("x".to_string())));
}

#[test]
fn test_update_and_delete_refuse_missing_conditions() {
    let builder = SqlBuilder::default();
    let err = builder
        .update("users", &[ValueColumn::new("name", "ada")], &[], Combinator::And)
        .unwrap_err();
    assert!(matches!(err, Error::MissingCondition { statement: "UPDATE", .. }));

    let err = builder.delete("users", &[], Combinator::Or).unwrap_err();
    assert!(matches!(err, Error::MissingCondition { statement: "DELETE", .. }));
}

#[test]
fn test_update_with_repeated_column() {
    let built = SqlBuilder::default()
        .update(
            "users",
            &[ValueColumn::new("status", "archived")],
            &[ClauseColumn::eq("status", "active"), ClauseColumn::eq("id", 9)],
            Combinator::And,
        )
        .unwrap();
    assert_eq!(
        built.text,
        "UPDATE users SET status = @status WHERE status = @status_1 AND id = @id"
    );
    assert_eq!(built.params.get("status"), Some(&Value::Text("archived".to_string())));
    assert_eq!(built.params.get("status_1"), Some(&Value::Text("active".to_string())));
}

#[test]
fn test_or_combinator_and_like() {
    let clauses = [
        ClauseColumn::like("name", like_contains("ad")),
        ClauseColumn::eq("team", "red"),
    ];
    let built = SqlBuilder::default()
        .count("people", &clauses, Combinator::Or)
        .unwrap();
    assert_eq!(
        built.text,
        "SELECT COUNT(1) FROM people WHERE name LIKE @name OR team = @team"
    );
    assert_eq!(built.params.get("name"), Some(&Value::Text("%ad%".to_string())));
}

#[test]
fn test_in_requires_list() {
    let builder = SqlBuilder::default();
    let scalar = [ClauseColumn::in_("id", 3)];
    assert!(matches!(
        builder.delete("users", &scalar, Combinator::And),
        Err(Error::InvalidArgument(_))
    ));

    let list = [ClauseColumn::eq("id", vec![1_i64, 2])];
    assert!(matches!(
        builder.count("users", &list, Combinator::And),
        Err(Error::InvalidArgument(_))
    ));
}

#[test]
fn test_paged_list_requires_sort_and_positive_page() {
    let builder = SqlBuilder::new(Dialect::RowNumber);
    assert!(matches!(
        builder.paged_list(&Select::from("users"), 1, 10),
        Err(Error::InvalidArgument(_))
    ));

    let sorts = [SortableColumn::asc("id")];
    let select = Select::from("users").order_by(&sorts);
    assert!(builder.paged_list(&select, 0, 10).is_err());
    assert!(builder.paged_list(&select, 1, 0).is_err());

    let built = builder.paged_list(&select, 3, 25).unwrap();
    assert_eq!(built.params.get("page"), Some(&Value::Integer(3)));
    assert_eq!(built.params.get("pageSize"), Some(&Value::Integer(25)));
}

#[test]
fn test_invalid_identifiers_are_rejected() {
    let builder = SqlBuilder::default();
    assert!(builder
        .insert("users; DROP TABLE users", &[ValueColumn::new("a", 1)])
        .is_err());
    assert!(builder
        .insert("users", &[ValueColumn::new("a b", 1)])
        .is_err());
    assert!(builder
        .insert("main.users", &[ValueColumn::new("a", 1)])
        .is_ok());
}

fn identifier() -> impl Strategy<Value = String> {
    "[a-z_][a-z0-9_]{0,12}"
}

proptest! {
    #[test]
    fn prop_insert_binds_every_column(names in prop::collection::vec(identifier(), 1..8)) {
        let values: Vec<ValueColumn> = names
            .iter()
            .enumerate()
            .map(|(i, name)| ValueColumn::new(name.as_str(), i as i64))
            .collect();
        let built = SqlBuilder::default().insert("t", &values).unwrap();

        prop_assert_eq!(built.params.len(), names.len());
        prop_assert_eq!(built.text.matches('@').count(), names.len());
        for (name, _) in built.params.iter() {
            let placeholder = format!("@{name}");
            prop_assert!(built.text.contains(&placeholder));
        }
    }

    #[test]
    fn prop_delete_without_clauses_never_renders(table in identifier()) {
        let result = SqlBuilder::default().delete(&table, &[], Combinator::And);
        let is_missing_condition = matches!(result, Err(Error::MissingCondition { .. }));
        prop_assert!(is_missing_condition);
    }

    #[test]
    fn prop_page_and_count_share_predicate(
        column in identifier(),
        value in any::<i64>(),
        page in 1_u32..1000,
        page_size in 1_u32..500,
        row_number in any::<bool>(),
    ) {
        let dialect = if row_number { Dialect::RowNumber } else { Dialect::LimitOffset };
        let clauses = [ClauseColumn::eq(column.as_str(), value)];
        let sorts = [SortableColumn::desc(column.as_str())];
        let select = Select::from("t").filter(&clauses, Combinator::And).order_by(&sorts);
        let built = SqlBuilder::new(dialect).paged_list(&select, page, page_size).unwrap();

        let (page_sql, count_sql) = built.text.split_once(";\n").unwrap();
        let predicate = count_sql.split_once(" WHERE ").unwrap().1;
        prop_assert!(page_sql.contains(predicate));
        prop_assert_eq!(built.params.get("page"), Some(&Value::from(page)));
        prop_assert_eq!(built.params.get("pageSize"), Some(&Value::from(page_size)));
    }
}
