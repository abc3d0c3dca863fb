//! SQL generation.
//!
//! - [`columns`]: column, clause and sort descriptors
//! - [`builder`]: insert/update/delete/count/list/paged-list statements
//! - [`dialect`]: `LIMIT`/`OFFSET` and `ROW_NUMBER()` paging strategies

pub mod builder;
pub mod columns;
pub mod dialect;

pub use builder::{BuiltSql, Select, SqlBuilder};
pub use columns::{
    ClauseColumn, Column, Combinator, Operator, SortableColumn, ValueColumn, like_contains,
    like_starts_with,
};
pub use dialect::{Dialect, LimitOffsetPaging, PageParts, PagingStrategy, RowNumberPaging};
