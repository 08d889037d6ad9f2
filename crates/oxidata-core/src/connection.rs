//! Storage capability consumed by the core.
//!
//! The store itself lives behind these traits: the core prepares
//! parameterized SQL and suspends only at these methods. Parsing and
//! planning never touch a connection.

use crate::error::Result;
use async_trait::async_trait;
use oxidata_sql::SqlParam;

/// A result row, keyed by column or alias name.
pub type JsonRow = serde_json::Map<String, serde_json::Value>;

/// Outcome of a mutating statement.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ExecResult {
    /// Rows changed by the statement.
    pub rows_affected: u64,
    /// Rowid assigned by the most recent INSERT.
    pub last_insert_rowid: i64,
}

/// Statement execution surface shared by connections and transactions.
#[async_trait]
pub trait Queryable: Send {
    /// Run a query and collect every row.
    async fn fetch_all(&mut self, sql: &str, params: &[SqlParam]) -> Result<Vec<JsonRow>>;

    /// Run a query and return the first row, if any.
    async fn fetch_optional(&mut self, sql: &str, params: &[SqlParam])
        -> Result<Option<JsonRow>>;

    /// Run a mutating statement.
    async fn execute(&mut self, sql: &str, params: &[SqlParam]) -> Result<ExecResult>;
}

/// A database connection with transaction support.
#[async_trait]
pub trait Connection: Queryable {
    /// Run a parameterless SQL script (DDL, maintenance).
    async fn exec(&mut self, sql: &str) -> Result<()>;

    /// Whether `begin` is usable. When false, batch changesets execute
    /// sequentially without rollback (documented degradation).
    fn supports_transactions(&self) -> bool {
        true
    }

    /// Begin a transaction scoped to this connection.
    async fn begin<'a>(&'a mut self) -> Result<Box<dyn Transaction + 'a>>;
}

/// An open transaction. Dropping without commit must roll back.
#[async_trait]
pub trait Transaction: Queryable {
    async fn commit(self: Box<Self>) -> Result<()>;

    async fn rollback(self: Box<Self>) -> Result<()>;
}
