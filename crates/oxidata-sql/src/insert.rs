//! INSERT statement builder.

use crate::{builder::SqlFragment, param::SqlParam};

/// Builder for single-row INSERT statements.
///
/// Table and column names must have been validated against the schema
/// registry before they reach the builder; values always bind as parameters.
#[derive(Clone, Debug, Default)]
pub struct InsertStatement {
    table: String,
    columns: Vec<String>,
    values: Vec<SqlParam>,
}

impl InsertStatement {
    /// Create an INSERT into a validated table name.
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            ..Self::default()
        }
    }

    /// Add a column/value pair.
    pub fn value(&mut self, column: impl Into<String>, value: impl Into<SqlParam>) -> &mut Self {
        self.columns.push(column.into());
        self.values.push(value.into());
        self
    }

    /// Whether any column/value pairs were added.
    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Render the statement. With no columns, inserts default values.
    pub fn build(self) -> SqlFragment {
        let mut result = SqlFragment::raw("INSERT INTO ");
        result.push(&self.table);

        if self.columns.is_empty() {
            result.push(" DEFAULT VALUES");
            return result;
        }

        result.push(" (");
        result.push(&self.columns.join(", "));
        result.push(") VALUES (");
        for (i, value) in self.values.into_iter().enumerate() {
            if i > 0 {
                result.push(", ");
            }
            result.push_param(value);
        }
        result.push(")");

        result
    }
}
