//! Oxidata Core - an RQL (OData v4 style) query compiler, batch processor,
//! and change tracker over an abstract SQL store.
//!
//! # Architecture
//!
//! The request processing pipeline:
//!
//! 1. **Path and option parsing** (`path`, `query`) - typed routes and AST
//! 2. **Schema registry** (`schema`) - table, column, and navigation lookup
//! 3. **Planning** (`plan`) - parameterized SQL from a validated query
//! 4. **Execution** (`connection`) - the abstract store capability
//! 5. **Formatting** (`oxidata-response`) - the RQL wire envelopes
//!
//! Mutations additionally feed the delta subsystem (`delta`), and
//! `$batch` requests iterate the pipeline inside one transaction (`batch`).
//!
//! # Example
//!
//! ```ignore
//! use oxidata_core::prelude::*;
//!
//! let mut registry = SchemaRegistry::new();
//! registry.register_table(products_table)?;
//!
//! let service = Service::new(registry, ServiceConfig::default());
//! let response = service.handle(&mut conn, request).await;
//! ```

pub mod batch;
pub mod config;
pub mod connection;
pub mod delta;
pub mod error;
pub mod handler;
pub mod metadata;
pub mod path;
pub mod plan;
pub mod query;
pub mod schema;

// Re-export main types
pub use config::{DeltaConfig, SearchConfig, ServiceConfig};
pub use connection::{Connection, ExecResult, JsonRow, Queryable, Transaction};
pub use delta::{ChangeEvent, ChangeOp, DeltaTracker};
pub use error::{Error, Result};
pub use handler::{parse_query_string, Service, ServiceRequest, ServiceResponse};
pub use path::{parse_path, RoutePath};
pub use plan::{build_count_query, build_select_query, SqlPlan};
pub use query::{parse_query, FilterExpr, Query};
pub use schema::{Column, ColumnType, ForeignKey, SchemaRegistry, TableSchema};

/// Prelude for common imports.
pub mod prelude {
    pub use super::config::{DeltaConfig, SearchConfig, ServiceConfig};
    pub use super::connection::{Connection, ExecResult, JsonRow, Queryable, Transaction};
    pub use super::error::{Error, Result};
    pub use super::handler::{Service, ServiceRequest, ServiceResponse};
    pub use super::query::{parse_query, Query};
    pub use super::schema::{Column, ColumnType, ForeignKey, SchemaRegistry, TableSchema};
}
