//! Schema registry.
//!
//! A pure lookup service registered at startup and read-only afterwards.
//! Every planning stage resolves resource, field, and navigation names here
//! before a single character of SQL is emitted; unresolved names fail the
//! request with the offending identifier.

use crate::error::{Error, Result};
use indexmap::IndexMap;
use oxidata_sql::is_valid_identifier;
use serde::{Deserialize, Serialize};

/// SQLite storage class of a column.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ColumnType {
    Integer,
    Real,
    Text,
    Blob,
    Null,
}

impl ColumnType {
    /// EDM type used in metadata documents.
    pub fn edm_type(self) -> &'static str {
        match self {
            Self::Integer => "Edm.Int32",
            Self::Real => "Edm.Double",
            Self::Text => "Edm.String",
            Self::Blob => "Edm.Binary",
            Self::Null => "Edm.String",
        }
    }

    /// Classify a SQLite type declaration using its affinity rules.
    pub fn from_declared(decl: &str) -> Self {
        let upper = decl.to_ascii_uppercase();
        if upper.contains("INT") {
            Self::Integer
        } else if upper.contains("CHAR") || upper.contains("CLOB") || upper.contains("TEXT") {
            Self::Text
        } else if upper.contains("BLOB") || upper.is_empty() {
            Self::Blob
        } else if upper.contains("REAL") || upper.contains("FLOA") || upper.contains("DOUB") {
            Self::Real
        } else {
            Self::Null
        }
    }
}

/// A table column.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Column {
    pub name: String,
    pub column_type: ColumnType,
    pub primary_key: bool,
    pub nullable: bool,
    pub default_value: Option<String>,
}

impl Column {
    pub fn new(name: impl Into<String>, column_type: ColumnType) -> Self {
        Self {
            name: name.into(),
            column_type,
            primary_key: false,
            nullable: true,
            default_value: None,
        }
    }

    /// A non-nullable primary key column.
    pub fn primary_key(name: impl Into<String>, column_type: ColumnType) -> Self {
        Self {
            name: name.into(),
            column_type,
            primary_key: true,
            nullable: false,
            default_value: None,
        }
    }

    pub fn not_null(mut self) -> Self {
        self.nullable = false;
        self
    }

    pub fn with_default(mut self, default: impl Into<String>) -> Self {
        self.default_value = Some(default.into());
        self
    }
}

/// A table exposed as a resource.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TableSchema {
    pub name: String,
    /// Columns in declaration order.
    pub columns: IndexMap<String, Column>,
}

impl TableSchema {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            columns: IndexMap::new(),
        }
    }

    pub fn with_column(mut self, column: Column) -> Self {
        self.columns.insert(column.name.clone(), column);
        self
    }

    pub fn get_column(&self, name: &str) -> Option<&Column> {
        self.columns.get(name)
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.columns.contains_key(name)
    }

    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.keys().map(String::as_str)
    }

    /// Name of the primary key column. Falls back to SQLite's implicit
    /// `rowid` when no declared key exists.
    pub fn pk_name(&self) -> &str {
        self.columns
            .values()
            .find(|c| c.primary_key)
            .map(|c| c.name.as_str())
            .unwrap_or("rowid")
    }
}

/// A declared foreign key; `nav_name` is the expand alias on the wire.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForeignKey {
    pub from_table: String,
    pub from_column: String,
    pub to_table: String,
    pub to_column: String,
    pub nav_name: String,
}

/// Process-lifetime registry of tables and relationships.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct SchemaRegistry {
    tables: IndexMap<String, TableSchema>,
    foreign_keys: Vec<ForeignKey>,
}

impl SchemaRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a table. Rejects invalid identifiers and duplicates.
    pub fn register_table(&mut self, table: TableSchema) -> Result<()> {
        if !is_valid_identifier(&table.name) {
            return Err(Error::Config(format!("invalid table name: {}", table.name)));
        }
        for name in table.column_names() {
            if !is_valid_identifier(name) {
                return Err(Error::Config(format!(
                    "invalid column name {} in table {}",
                    name, table.name
                )));
            }
        }
        if self.tables.contains_key(&table.name) {
            return Err(Error::Config(format!("duplicate table: {}", table.name)));
        }

        self.tables.insert(table.name.clone(), table);
        Ok(())
    }

    /// Register a foreign key. Both endpoints must already be registered.
    pub fn register_foreign_key(&mut self, fk: ForeignKey) -> Result<()> {
        let from = self
            .tables
            .get(&fk.from_table)
            .ok_or_else(|| Error::Config(format!("unknown table: {}", fk.from_table)))?;
        if !from.has_column(&fk.from_column) {
            return Err(Error::Config(format!(
                "unknown column {}.{}",
                fk.from_table, fk.from_column
            )));
        }

        let to = self
            .tables
            .get(&fk.to_table)
            .ok_or_else(|| Error::Config(format!("unknown table: {}", fk.to_table)))?;
        if !to.has_column(&fk.to_column) {
            return Err(Error::Config(format!(
                "unknown column {}.{}",
                fk.to_table, fk.to_column
            )));
        }

        if !is_valid_identifier(&fk.nav_name) {
            return Err(Error::Config(format!(
                "invalid navigation name: {}",
                fk.nav_name
            )));
        }

        self.foreign_keys.push(fk);
        Ok(())
    }

    /// Resolve a resource name to its table.
    pub fn resolve_resource(&self, name: &str) -> Result<&TableSchema> {
        self.tables
            .get(name)
            .ok_or_else(|| Error::ResourceNotFound(name.to_string()))
    }

    /// Resolve a field against a table.
    pub fn resolve_field<'a>(&self, table: &'a TableSchema, field: &str) -> Result<&'a Column> {
        table
            .get_column(field)
            .ok_or_else(|| Error::UnknownField(field.to_string()))
    }

    /// Resolve a navigation name from a table.
    pub fn resolve_navigation(&self, from_table: &str, nav: &str) -> Result<&ForeignKey> {
        self.foreign_keys
            .iter()
            .find(|fk| fk.from_table == from_table && fk.nav_name == nav)
            .ok_or_else(|| Error::UnknownNavigation {
                nav: nav.to_string(),
                table: from_table.to_string(),
            })
    }

    /// Navigations declared from a table, in registration order.
    pub fn navigations_from<'a>(
        &'a self,
        from_table: &'a str,
    ) -> impl Iterator<Item = &'a ForeignKey> {
        self.foreign_keys
            .iter()
            .filter(move |fk| fk.from_table == from_table)
    }

    /// All registered tables, in registration order.
    pub fn tables(&self) -> impl Iterator<Item = &TableSchema> {
        self.tables.values()
    }
}
