//! SELECT statement builder.
//!
//! The statement is an algebraic value (select list, FROM, joins, WHERE,
//! GROUP BY, HAVING, ORDER BY, LIMIT/OFFSET) rendered exactly once, so no
//! caller ever has to track whether a clause keyword was already emitted.

use crate::{builder::SqlFragment, param::SqlParam};

/// Builder for SELECT statements.
#[derive(Clone, Debug)]
pub struct SelectStatement {
    select: Vec<SqlFragment>,
    from: String,
    joins: Vec<SqlFragment>,
    where_clauses: Vec<SqlFragment>,
    group_by: Vec<String>,
    having: Option<SqlFragment>,
    order_by: Vec<String>,
    limit: Option<i64>,
    offset: Option<i64>,
}

impl SelectStatement {
    /// Create a SELECT over a validated table name.
    pub fn new(from: impl Into<String>) -> Self {
        Self {
            select: Vec::new(),
            from: from.into(),
            joins: Vec::new(),
            where_clauses: Vec::new(),
            group_by: Vec::new(),
            having: None,
            order_by: Vec::new(),
            limit: None,
            offset: None,
        }
    }

    /// Add a pre-validated select item (column, aliased column, expression).
    pub fn select_item(&mut self, item: impl Into<String>) -> &mut Self {
        self.select.push(SqlFragment::raw(item));
        self
    }

    /// Add a select item carrying parameters.
    pub fn select_fragment(&mut self, item: SqlFragment) -> &mut Self {
        self.select.push(item);
        self
    }

    /// Add a JOIN clause fragment (including its ON condition parameters).
    pub fn join(&mut self, clause: SqlFragment) -> &mut Self {
        self.joins.push(clause);
        self
    }

    /// Add a WHERE conjunct.
    pub fn where_clause(&mut self, clause: SqlFragment) -> &mut Self {
        self.where_clauses.push(clause);
        self
    }

    /// Add a GROUP BY field.
    pub fn group_by(&mut self, field: impl Into<String>) -> &mut Self {
        self.group_by.push(field.into());
        self
    }

    /// Set the HAVING predicate.
    pub fn having(&mut self, clause: SqlFragment) -> &mut Self {
        self.having = Some(clause);
        self
    }

    /// Add an ORDER BY term (`field DIR`).
    pub fn order_by(&mut self, term: impl Into<String>) -> &mut Self {
        self.order_by.push(term.into());
        self
    }

    /// Set LIMIT (bound as a parameter).
    pub fn limit(&mut self, n: i64) -> &mut Self {
        self.limit = Some(n);
        self
    }

    /// Set OFFSET (bound as a parameter).
    pub fn offset(&mut self, n: i64) -> &mut Self {
        self.offset = Some(n);
        self
    }

    /// Render the statement.
    ///
    /// Parameters are collected in textual order: joins, WHERE, HAVING,
    /// then LIMIT/OFFSET. An OFFSET without a LIMIT renders as
    /// `LIMIT -1 OFFSET ?` for dialects that require both.
    pub fn build(self) -> SqlFragment {
        let mut result = SqlFragment::raw("SELECT ");

        if self.select.is_empty() {
            result.push("*");
        } else {
            let items = SqlFragment::join(", ", self.select);
            result.append(items);
        }

        result.push(" FROM ");
        result.push(&self.from);

        for join in self.joins {
            result.push(" ");
            result.append(join);
        }

        if !self.where_clauses.is_empty() {
            result.push(" WHERE ");
            let combined = SqlFragment::join(" AND ", self.where_clauses);
            result.append(combined);
        }

        if !self.group_by.is_empty() {
            result.push(" GROUP BY ");
            result.push(&self.group_by.join(", "));
        }

        if let Some(having) = self.having {
            result.push(" HAVING ");
            result.append(having);
        }

        if !self.order_by.is_empty() {
            result.push(" ORDER BY ");
            result.push(&self.order_by.join(", "));
        }

        match (self.limit, self.offset) {
            (Some(limit), Some(offset)) => {
                result.push(" LIMIT ");
                result.push_param(SqlParam::Int(limit));
                result.push(" OFFSET ");
                result.push_param(SqlParam::Int(offset));
            }
            (Some(limit), None) => {
                result.push(" LIMIT ");
                result.push_param(SqlParam::Int(limit));
            }
            (None, Some(offset)) => {
                result.push(" LIMIT -1 OFFSET ");
                result.push_param(SqlParam::Int(offset));
            }
            (None, None) => {}
        }

        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_simple_select() {
        let sql = SelectStatement::new("Products").build();
        assert_eq!(sql.sql(), "SELECT * FROM Products");
        assert!(sql.params().is_empty());
    }

    #[test]
    fn test_select_where_order_limit() {
        let mut filter = SqlFragment::raw("price > ");
        filter.push_param(100i64);

        let mut stmt = SelectStatement::new("Products");
        stmt.where_clause(filter);
        stmt.order_by("price DESC");
        stmt.limit(2);
        let sql = stmt.build();

        assert_eq!(
            sql.sql(),
            "SELECT * FROM Products WHERE price > ? ORDER BY price DESC LIMIT ?"
        );
        assert_eq!(sql.params(), &[SqlParam::Int(100), SqlParam::Int(2)]);
    }

    #[test]
    fn test_offset_without_limit() {
        let mut stmt = SelectStatement::new("Products");
        stmt.offset(10);
        let sql = stmt.build();

        assert_eq!(sql.sql(), "SELECT * FROM Products LIMIT -1 OFFSET ?");
        assert_eq!(sql.params(), &[SqlParam::Int(10)]);
    }

    #[test]
    fn test_group_by_having() {
        let mut having = SqlFragment::raw("SUM(total_amount) > ");
        having.push_param(1000i64);

        let mut stmt = SelectStatement::new("Orders");
        stmt.select_item("region");
        stmt.select_item("SUM(total_amount) as revenue");
        stmt.group_by("region");
        stmt.having(having);
        let sql = stmt.build();

        assert_eq!(
            sql.sql(),
            "SELECT region, SUM(total_amount) as revenue FROM Orders \
             GROUP BY region HAVING SUM(total_amount) > ?"
        );
    }

    #[test]
    fn test_join_params_precede_where_params() {
        let mut join = SqlFragment::raw(
            "LEFT JOIN Customers ON Orders.customer_id = Customers.id AND Customers.tier = ",
        );
        join.push_param("gold");

        let mut filter = SqlFragment::raw("Orders.status = ");
        filter.push_param("open");

        let mut stmt = SelectStatement::new("Orders");
        stmt.select_item("Orders.*");
        stmt.join(join);
        stmt.where_clause(filter);
        let sql = stmt.build();

        assert_eq!(
            sql.sql(),
            "SELECT Orders.* FROM Orders LEFT JOIN Customers ON \
             Orders.customer_id = Customers.id AND Customers.tier = ? \
             WHERE Orders.status = ?"
        );
        assert_eq!(
            sql.params(),
            &[SqlParam::text("gold"), SqlParam::text("open")]
        );
    }
}
