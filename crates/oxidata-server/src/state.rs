//! Shared server state.

use oxidata_core::Service;
use sqlx::SqlitePool;

/// State shared by every request handler.
pub struct AppState {
    pub service: Service,
    pub pool: SqlitePool,
}
