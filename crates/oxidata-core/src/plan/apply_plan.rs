//! `$apply` planning: GROUP BY, aggregates, and HAVING.

use super::{lower_filter, lower_filter_with, lower_search, PlanContext, SqlPlan};
use crate::error::{Error, Result};
use crate::query::ast::{Apply, Query};
use crate::schema::TableSchema;
use oxidata_sql::SelectStatement;
use std::collections::{HashMap, HashSet};

/// Lower an aggregation query: group-by fields first, then each aggregate
/// as `OP(source) as alias`, with GROUP BY, optional HAVING, and the usual
/// ordering and paging.
pub(crate) fn build_apply_query(
    query: &Query,
    apply: &Apply,
    table: &TableSchema,
    ctx: &PlanContext<'_>,
) -> Result<SqlPlan> {
    let mut stmt = SelectStatement::new(&table.name);

    // Group-by fields resolve against the table and keep their given order.
    let mut group_columns: HashMap<&str, String> = HashMap::new();
    for field in &apply.group_by {
        let column = ctx.resolve_column(table, field)?;
        stmt.select_item(column.clone());
        stmt.group_by(column.clone());
        group_columns.insert(field.as_str(), column);
    }

    let mut aliases: HashSet<&str> = HashSet::new();
    for aggregate in &apply.aggregates {
        let source = ctx.resolve_column(table, &aggregate.source)?;
        stmt.select_item(format!(
            "{}({}) as {}",
            aggregate.op.to_sql(),
            source,
            aggregate.alias
        ));
        aliases.insert(aggregate.alias.as_str());
    }

    // Row-level filter and search apply before grouping.
    if let Some(filter) = &query.filter {
        stmt.where_clause(lower_filter(filter, table, ctx, false)?);
    }
    if let Some(term) = &query.search {
        stmt.where_clause(lower_search(term, table, ctx, false)?);
    }

    // HAVING references group-by fields or aggregate aliases only.
    let resolve_grouped = |field: &str| -> Result<String> {
        if let Some(column) = group_columns.get(field) {
            Ok(column.clone())
        } else if aliases.contains(field) {
            Ok(field.to_string())
        } else {
            Err(Error::UnknownField(field.to_string()))
        }
    };

    if let Some(having) = &apply.having {
        stmt.having(lower_filter_with(having, &resolve_grouped)?);
    }

    if let Some(keys) = &query.order_by {
        for key in keys {
            let column = resolve_grouped(&key.field)?;
            stmt.order_by(format!("{} {}", column, key.direction.to_sql()));
        }
    }

    if let Some(top) = query.top {
        stmt.limit(top);
    }
    if let Some(skip) = query.skip {
        stmt.offset(skip);
    }

    Ok(stmt.build().into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ServiceConfig;
    use crate::plan::build_select_query;
    use crate::query::parse_query;
    use crate::schema::{Column, ColumnType, SchemaRegistry, TableSchema};
    use indexmap::IndexMap;
    use oxidata_sql::SqlParam;
    use pretty_assertions::assert_eq;

    fn registry() -> SchemaRegistry {
        let mut registry = SchemaRegistry::new();
        registry
            .register_table(
                TableSchema::new("Orders")
                    .with_column(Column::primary_key("id", ColumnType::Integer))
                    .with_column(Column::new("region", ColumnType::Text))
                    .with_column(Column::new("status", ColumnType::Text))
                    .with_column(Column::new("total_amount", ColumnType::Real)),
            )
            .unwrap();
        registry
    }

    fn query_of(pairs: &[(&str, &str)]) -> crate::query::ast::Query {
        let map: IndexMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        parse_query(&map).unwrap()
    }

    #[test]
    fn test_groupby_aggregate_plan() {
        let registry = registry();
        let config = ServiceConfig::default();
        let table = registry.resolve_resource("Orders").unwrap();
        let query = query_of(&[(
            "$apply",
            "groupby((region),aggregate(total_amount with sum as revenue))",
        )]);

        let plan = build_select_query(&query, table, &registry, &config).unwrap();
        assert_eq!(
            plan.sql,
            "SELECT region, SUM(total_amount) as revenue FROM Orders GROUP BY region"
        );
        assert!(plan.params.is_empty());
    }

    #[test]
    fn test_having_over_alias() {
        let registry = registry();
        let config = ServiceConfig::default();
        let table = registry.resolve_resource("Orders").unwrap();
        let query = query_of(&[(
            "$apply",
            "groupby((region),aggregate(total_amount with sum as revenue))/filter(revenue gt 1000)",
        )]);

        let plan = build_select_query(&query, table, &registry, &config).unwrap();
        assert_eq!(
            plan.sql,
            "SELECT region, SUM(total_amount) as revenue FROM Orders \
             GROUP BY region HAVING revenue > ?"
        );
        assert_eq!(plan.params, vec![SqlParam::Int(1000)]);
    }

    #[test]
    fn test_filter_applies_before_grouping() {
        let registry = registry();
        let config = ServiceConfig::default();
        let table = registry.resolve_resource("Orders").unwrap();
        let query = query_of(&[
            ("$filter", "status eq 'open'"),
            (
                "$apply",
                "groupby((region),aggregate(id with count as orders))",
            ),
        ]);

        let plan = build_select_query(&query, table, &registry, &config).unwrap();
        assert_eq!(
            plan.sql,
            "SELECT region, COUNT(id) as orders FROM Orders \
             WHERE status = ? GROUP BY region"
        );
    }

    #[test]
    fn test_orderby_restricted_to_grouped_fields() {
        let registry = registry();
        let config = ServiceConfig::default();
        let table = registry.resolve_resource("Orders").unwrap();

        let ok = query_of(&[
            (
                "$apply",
                "groupby((region),aggregate(total_amount with sum as revenue))",
            ),
            ("$orderby", "revenue desc"),
            ("$top", "3"),
        ]);
        let plan = build_select_query(&ok, table, &registry, &config).unwrap();
        assert_eq!(
            plan.sql,
            "SELECT region, SUM(total_amount) as revenue FROM Orders \
             GROUP BY region ORDER BY revenue DESC LIMIT ?"
        );

        let bad = query_of(&[
            (
                "$apply",
                "groupby((region),aggregate(total_amount with sum as revenue))",
            ),
            ("$orderby", "status"),
        ]);
        assert!(matches!(
            build_select_query(&bad, table, &registry, &config),
            Err(Error::UnknownField(_))
        ));
    }

    #[test]
    fn test_unknown_aggregate_source_rejected() {
        let registry = registry();
        let config = ServiceConfig::default();
        let table = registry.resolve_resource("Orders").unwrap();
        let query = query_of(&[(
            "$apply",
            "groupby((region),aggregate(bogus with sum as revenue))",
        )]);

        assert!(matches!(
            build_select_query(&query, table, &registry, &config),
            Err(Error::UnknownField(_))
        ));
    }

    #[test]
    fn test_compute_with_apply_rejected() {
        let registry = registry();
        let config = ServiceConfig::default();
        let table = registry.resolve_resource("Orders").unwrap();
        let query = query_of(&[
            ("$apply", "groupby((region))"),
            ("$compute", "total_amount * 2 as doubled"),
        ]);

        assert!(build_select_query(&query, table, &registry, &config).is_err());
    }
}
