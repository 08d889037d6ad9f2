//! Parameterized SQL builder for Oxidata (SQLite dialect).
//!
//! Provides a safe way to construct SQL without string concatenation of
//! values: every literal binds as a `?` positional parameter, and every
//! identifier is expected to have been validated against the schema
//! registry before it is rendered.

mod builder;
mod delete;
pub mod identifier;
mod insert;
mod param;
mod select;
mod update;

pub use builder::SqlFragment;
pub use delete::DeleteStatement;
pub use identifier::{is_sql_keyword, is_valid_identifier};
pub use insert::InsertStatement;
pub use param::SqlParam;
pub use select::SelectStatement;
pub use update::UpdateStatement;
