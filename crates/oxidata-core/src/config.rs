//! Configuration for Oxidata.
//!
//! All options live in one immutable record; absent options take their
//! declared defaults at deserialization time.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Main service configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServiceConfig {
    // ========================================================================
    // Service Surface
    // ========================================================================
    /// External base URL used in context and delta links.
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Path prefix under which the service is mounted ("" for root).
    #[serde(default)]
    pub service_root: String,

    // ========================================================================
    // Database Settings
    // ========================================================================
    /// SQLite database path (used by the server binding).
    #[serde(default = "default_db_path")]
    pub db_path: String,

    // ========================================================================
    // Server Settings
    // ========================================================================
    /// Server host to bind.
    #[serde(default = "default_host")]
    pub server_host: String,

    /// Server port.
    #[serde(default = "default_port")]
    pub server_port: u16,

    // ========================================================================
    // Batch Settings
    // ========================================================================
    /// Maximum operations accepted in one batch request.
    #[serde(default = "default_max_batch_operations")]
    pub max_batch_operations: usize,

    // ========================================================================
    // Delta Tracking
    // ========================================================================
    #[serde(default)]
    pub delta: DeltaConfig,

    // ========================================================================
    // Full-Text Search
    // ========================================================================
    /// Per-table full-text search bindings.
    #[serde(default)]
    pub search: Vec<SearchConfig>,

    // ========================================================================
    // Field Renaming
    // ========================================================================
    /// API field name to database column name, applied uniformly at every
    /// field reference site. Unmapped names are used as-is.
    #[serde(default)]
    pub field_map: HashMap<String, String>,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            service_root: String::new(),
            db_path: default_db_path(),
            server_host: default_host(),
            server_port: default_port(),
            max_batch_operations: default_max_batch_operations(),
            delta: DeltaConfig::default(),
            search: Vec::new(),
            field_map: HashMap::new(),
        }
    }
}

impl ServiceConfig {
    /// Map an API field name to its database column name.
    pub fn db_field<'a>(&'a self, api_name: &'a str) -> &'a str {
        self.field_map
            .get(api_name)
            .map(String::as_str)
            .unwrap_or(api_name)
    }

    /// Find the search binding for a table, if any.
    pub fn search_for(&self, table: &str) -> Option<&SearchConfig> {
        self.search.iter().find(|s| s.table == table)
    }

    /// Base for context URLs: `<base_url><service_root>`.
    pub fn context_base(&self) -> String {
        format!("{}{}", self.base_url, self.service_root)
    }
}

/// Change tracking options.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DeltaConfig {
    /// Whether change tracking is enabled.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Per-resource ring buffer capacity (oldest entries evicted).
    #[serde(default = "default_max_changes")]
    pub max_changes: usize,

    /// Whether to additionally persist events to the `delta_changes` table.
    #[serde(default)]
    pub persist: bool,
}

impl Default for DeltaConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_changes: default_max_changes(),
            persist: false,
        }
    }
}

/// Full-text search binding for one table.
///
/// `fts_table` is an FTS virtual table whose `rowid` matches the base
/// table's primary key and which indexes `columns`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SearchConfig {
    pub table: String,
    pub fts_table: String,
    #[serde(default)]
    pub columns: Vec<String>,
}

fn default_base_url() -> String {
    "http://localhost:3000".to_string()
}

fn default_db_path() -> String {
    "oxidata.db".to_string()
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    3000
}

fn default_max_batch_operations() -> usize {
    1000
}

fn default_max_changes() -> usize {
    1000
}

fn default_true() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ServiceConfig::default();
        assert_eq!(config.max_batch_operations, 1000);
        assert_eq!(config.delta.max_changes, 1000);
        assert!(config.delta.enabled);
        assert!(!config.delta.persist);
    }

    #[test]
    fn test_deserialize_partial() {
        let config: ServiceConfig =
            serde_json::from_str(r#"{"base_url": "https://api.example.com"}"#).unwrap();
        assert_eq!(config.base_url, "https://api.example.com");
        assert_eq!(config.server_port, 3000);
    }

    #[test]
    fn test_db_field_mapping() {
        let mut config = ServiceConfig::default();
        config
            .field_map
            .insert("displayName".into(), "display_name".into());

        assert_eq!(config.db_field("displayName"), "display_name");
        assert_eq!(config.db_field("price"), "price");
    }

    #[test]
    fn test_context_base() {
        let mut config = ServiceConfig::default();
        config.service_root = "/odata".into();
        assert_eq!(config.context_base(), "http://localhost:3000/odata");
    }
}
