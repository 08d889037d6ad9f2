//! UPDATE statement builder.

use crate::{builder::SqlFragment, param::SqlParam};

/// Builder for UPDATE statements.
#[derive(Clone, Debug, Default)]
pub struct UpdateStatement {
    table: String,
    set: Vec<(String, SqlParam)>,
    where_clauses: Vec<SqlFragment>,
}

impl UpdateStatement {
    /// Create an UPDATE of a validated table name.
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            ..Self::default()
        }
    }

    /// Add a SET column/value pair.
    pub fn set(&mut self, column: impl Into<String>, value: impl Into<SqlParam>) -> &mut Self {
        self.set.push((column.into(), value.into()));
        self
    }

    /// Add a WHERE conjunct.
    pub fn where_clause(&mut self, clause: SqlFragment) -> &mut Self {
        self.where_clauses.push(clause);
        self
    }

    /// Whether any SET pairs were added.
    pub fn is_empty(&self) -> bool {
        self.set.is_empty()
    }

    /// Render the statement.
    pub fn build(self) -> SqlFragment {
        let mut result = SqlFragment::raw("UPDATE ");
        result.push(&self.table);
        result.push(" SET ");

        for (i, (column, value)) in self.set.into_iter().enumerate() {
            if i > 0 {
                result.push(", ");
            }
            result.push(&column);
            result.push(" = ");
            result.push_param(value);
        }

        if !self.where_clauses.is_empty() {
            result.push(" WHERE ");
            let combined = SqlFragment::join(" AND ", self.where_clauses);
            result.append(combined);
        }

        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_simple_update() {
        let mut by_id = SqlFragment::raw("id = ");
        by_id.push_param(5i64);

        let mut stmt = UpdateStatement::new("Products");
        stmt.set("name", "Gadget");
        stmt.set("price", 250i64);
        stmt.where_clause(by_id);
        let sql = stmt.build();

        assert_eq!(
            sql.sql(),
            "UPDATE Products SET name = ?, price = ? WHERE id = ?"
        );
        assert_eq!(sql.params().len(), 3);
    }
}
