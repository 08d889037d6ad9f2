//! DELETE statement builder.

use crate::builder::SqlFragment;

/// Builder for DELETE statements.
#[derive(Clone, Debug, Default)]
pub struct DeleteStatement {
    table: String,
    where_clauses: Vec<SqlFragment>,
}

impl DeleteStatement {
    /// Create a DELETE from a validated table name.
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            ..Self::default()
        }
    }

    /// Add a WHERE conjunct.
    pub fn where_clause(&mut self, clause: SqlFragment) -> &mut Self {
        self.where_clauses.push(clause);
        self
    }

    /// Render the statement.
    pub fn build(self) -> SqlFragment {
        let mut result = SqlFragment::raw("DELETE FROM ");
        result.push(&self.table);

        if !self.where_clauses.is_empty() {
            result.push(" WHERE ");
            let combined = SqlFragment::join(" AND ", self.where_clauses);
            result.append(combined);
        }

        result
    }
}
