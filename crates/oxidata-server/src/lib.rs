//! Oxidata HTTP server: axum binding and SQLite storage for the
//! framework-neutral core.

pub mod app;
pub mod sqlite;
pub mod state;

pub use sqlite::{introspect_schema, SqliteSession};
pub use state::AppState;
