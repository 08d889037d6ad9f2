//! SELECT and COUNT planning for ordinary (non-aggregate) queries.

use super::apply_plan::build_apply_query;
use super::expand_plan::plan_expands;
use super::{lower_filter, lower_search, PlanContext, SqlPlan};
use crate::config::ServiceConfig;
use crate::error::{Error, Result};
use crate::query::ast::Query;
use crate::query::compute::expression_columns;
use crate::schema::{SchemaRegistry, TableSchema};
use oxidata_sql::SelectStatement;

/// Lower a validated query against a resolved table into `(sql, params)`.
pub fn build_select_query(
    query: &Query,
    table: &TableSchema,
    registry: &SchemaRegistry,
    config: &ServiceConfig,
) -> Result<SqlPlan> {
    let ctx = PlanContext { registry, config };

    if let Some(apply) = &query.apply {
        if query.compute.is_some() {
            return Err(Error::InvalidQueryOption {
                option: "$compute".into(),
                message: "cannot be combined with $apply".into(),
            });
        }
        return build_apply_query(query, apply, table, &ctx);
    }

    let expand_items = query.expand.as_deref().unwrap_or(&[]);
    let has_joins = !expand_items.is_empty();
    let expand = plan_expands(expand_items, table, &ctx)?;

    let mut stmt = SelectStatement::new(&table.name);

    // Select list: explicit fields in the listed order, otherwise all
    // columns (table-qualified when joins widen the row).
    match query.select.as_deref() {
        Some(fields) if !fields.is_empty() => {
            for field in fields {
                let column = ctx.resolve_ref(table, field, has_joins)?;
                stmt.select_item(column);
            }
        }
        _ => {
            if has_joins {
                stmt.select_item(format!("{}.*", table.name));
            } else if query.compute.is_some() {
                stmt.select_item("*");
            }
        }
    }

    // Computed columns follow the base select list.
    if let Some(items) = &query.compute {
        for item in items {
            for column in expression_columns(&item.expression)? {
                ctx.resolve_ref(table, &column, false)?;
            }
            stmt.select_item(format!("({}) AS {}", item.expression, item.alias));
        }
    }

    for column in expand.select {
        stmt.select_item(column);
    }
    for join in expand.joins {
        stmt.join(join);
    }

    if let Some(filter) = &query.filter {
        stmt.where_clause(lower_filter(filter, table, &ctx, has_joins)?);
    }
    if let Some(term) = &query.search {
        stmt.where_clause(lower_search(term, table, &ctx, has_joins)?);
    }

    if let Some(keys) = &query.order_by {
        for key in keys {
            let column = ctx.resolve_ref(table, &key.field, has_joins)?;
            stmt.order_by(format!("{} {}", column, key.direction.to_sql()));
        }
    }
    for term in expand.order_by {
        stmt.order_by(term);
    }

    // Root paging wins; expand-level paging applies at the outer query.
    if let Some(top) = query.top.or(expand.top) {
        stmt.limit(top);
    }
    if let Some(skip) = query.skip.or(expand.skip) {
        stmt.offset(skip);
    }

    Ok(stmt.build().into())
}

/// Lower the count variant: filter and search apply, while `top`, `skip`,
/// `orderby`, and `select` are ignored.
pub fn build_count_query(
    query: &Query,
    table: &TableSchema,
    registry: &SchemaRegistry,
    config: &ServiceConfig,
) -> Result<SqlPlan> {
    let ctx = PlanContext { registry, config };

    let mut stmt = SelectStatement::new(&table.name);
    stmt.select_item("COUNT(*) AS count");

    if let Some(filter) = &query.filter {
        stmt.where_clause(lower_filter(filter, table, &ctx, false)?);
    }
    if let Some(term) = &query.search {
        stmt.where_clause(lower_search(term, table, &ctx, false)?);
    }

    Ok(stmt.build().into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SearchConfig;
    use crate::query::parse_query;
    use crate::schema::{Column, ColumnType, SchemaRegistry, TableSchema};
    use indexmap::IndexMap;
    use oxidata_sql::SqlParam;
    use pretty_assertions::assert_eq;

    fn registry() -> SchemaRegistry {
        let mut registry = SchemaRegistry::new();
        registry
            .register_table(
                TableSchema::new("Products")
                    .with_column(Column::primary_key("id", ColumnType::Integer))
                    .with_column(Column::new("name", ColumnType::Text))
                    .with_column(Column::new("price", ColumnType::Real))
                    .with_column(Column::new("subtotal", ColumnType::Real))
                    .with_column(Column::new("tax_amount", ColumnType::Real)),
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
    fn test_filter_order_top() {
        let registry = registry();
        let config = ServiceConfig::default();
        let query = query_of(&[
            ("$filter", "price gt 100"),
            ("$orderby", "price desc"),
            ("$top", "2"),
        ]);
        let table = registry.resolve_resource("Products").unwrap();

        let plan = build_select_query(&query, table, &registry, &config).unwrap();
        assert_eq!(
            plan.sql,
            "SELECT * FROM Products WHERE price > ? ORDER BY price DESC LIMIT ?"
        );
        assert_eq!(plan.params, vec![SqlParam::Int(100), SqlParam::Int(2)]);
    }

    #[test]
    fn test_search_plan() {
        let registry = registry();
        let mut config = ServiceConfig::default();
        config.search.push(SearchConfig {
            table: "Products".into(),
            fts_table: "Products_fts".into(),
            columns: vec!["name".into()],
        });
        let query = query_of(&[("$search", "laptop")]);
        let table = registry.resolve_resource("Products").unwrap();

        let plan = build_select_query(&query, table, &registry, &config).unwrap();
        assert_eq!(
            plan.sql,
            "SELECT * FROM Products WHERE id IN \
             (SELECT rowid FROM Products_fts WHERE Products_fts MATCH ?)"
        );
        assert_eq!(plan.params, vec![SqlParam::text("laptop")]);
    }

    #[test]
    fn test_search_unconfigured_rejected() {
        let registry = registry();
        let config = ServiceConfig::default();
        let query = query_of(&[("$search", "laptop")]);
        let table = registry.resolve_resource("Products").unwrap();

        let err = build_select_query(&query, table, &registry, &config).unwrap_err();
        assert!(matches!(err, Error::SearchNotConfigured(_)));
    }

    #[test]
    fn test_select_lists_columns_in_order() {
        let registry = registry();
        let config = ServiceConfig::default();
        let query = query_of(&[("$select", "name,id")]);
        let table = registry.resolve_resource("Products").unwrap();

        let plan = build_select_query(&query, table, &registry, &config).unwrap();
        assert_eq!(plan.sql, "SELECT name, id FROM Products");
    }

    #[test]
    fn test_unknown_select_field_rejected_before_sql() {
        let registry = registry();
        let config = ServiceConfig::default();
        let query = query_of(&[("$select", "id,nope")]);
        let table = registry.resolve_resource("Products").unwrap();

        assert!(matches!(
            build_select_query(&query, table, &registry, &config),
            Err(Error::UnknownField(_))
        ));
    }

    #[test]
    fn test_compute_appended_after_star() {
        let registry = registry();
        let config = ServiceConfig::default();
        let query = query_of(&[("$compute", "subtotal + tax_amount as total")]);
        let table = registry.resolve_resource("Products").unwrap();

        let plan = build_select_query(&query, table, &registry, &config).unwrap();
        assert_eq!(
            plan.sql,
            "SELECT *, (subtotal + tax_amount) AS total FROM Products"
        );
    }

    #[test]
    fn test_compute_unknown_column_rejected() {
        let registry = registry();
        let config = ServiceConfig::default();
        let query = query_of(&[("$compute", "subtotal + bogus as total")]);
        let table = registry.resolve_resource("Products").unwrap();

        assert!(matches!(
            build_select_query(&query, table, &registry, &config),
            Err(Error::UnknownField(_))
        ));
    }

    #[test]
    fn test_skip_without_top() {
        let registry = registry();
        let config = ServiceConfig::default();
        let query = query_of(&[("$skip", "30")]);
        let table = registry.resolve_resource("Products").unwrap();

        let plan = build_select_query(&query, table, &registry, &config).unwrap();
        assert_eq!(plan.sql, "SELECT * FROM Products LIMIT -1 OFFSET ?");
        assert_eq!(plan.params, vec![SqlParam::Int(30)]);
    }

    #[test]
    fn test_field_map_applied_everywhere() {
        let registry = {
            let mut registry = SchemaRegistry::new();
            registry
                .register_table(
                    TableSchema::new("Products")
                        .with_column(Column::primary_key("id", ColumnType::Integer))
                        .with_column(Column::new("display_name", ColumnType::Text)),
                )
                .unwrap();
            registry
        };
        let mut config = ServiceConfig::default();
        config
            .field_map
            .insert("displayName".into(), "display_name".into());

        let query = query_of(&[
            ("$filter", "displayName eq 'x'"),
            ("$orderby", "displayName"),
            ("$select", "displayName"),
        ]);
        let table = registry.resolve_resource("Products").unwrap();

        let plan = build_select_query(&query, table, &registry, &config).unwrap();
        assert_eq!(
            plan.sql,
            "SELECT display_name FROM Products WHERE display_name = ? ORDER BY display_name ASC"
        );
    }

    #[test]
    fn test_count_ignores_paging_order_select() {
        let registry = registry();
        let config = ServiceConfig::default();
        let table = registry.resolve_resource("Products").unwrap();

        let full = query_of(&[
            ("$filter", "price gt 100"),
            ("$orderby", "price desc"),
            ("$top", "2"),
            ("$skip", "4"),
            ("$select", "id"),
        ]);
        let bare = query_of(&[("$filter", "price gt 100")]);

        let a = build_count_query(&full, table, &registry, &config).unwrap();
        let b = build_count_query(&bare, table, &registry, &config).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.sql, "SELECT COUNT(*) AS count FROM Products WHERE price > ?");
    }

    #[test]
    fn test_wide_or_filter_binds_every_literal() {
        let registry = registry();
        let config = ServiceConfig::default();
        let table = registry.resolve_resource("Products").unwrap();

        let leaves: Vec<String> = (0..1000).map(|i| format!("price eq {}", i)).collect();
        let query = query_of(&[("$filter", &leaves.join(" or "))]);

        let plan = build_select_query(&query, table, &registry, &config).unwrap();
        assert_eq!(plan.params.len(), 1000);
    }

    #[test]
    fn test_injection_text_stays_in_params() {
        let registry = registry();
        let config = ServiceConfig::default();
        let table = registry.resolve_resource("Products").unwrap();

        let benign = query_of(&[("$filter", "name eq 'x'")]);
        let hostile = query_of(&[("$filter", "name eq '''; DROP TABLE Products; --'")]);

        let a = build_select_query(&benign, table, &registry, &config).unwrap();
        let b = build_select_query(&hostile, table, &registry, &config).unwrap();

        // Same SQL text for the same query shape; hostile bytes only in params.
        assert_eq!(a.sql, b.sql);
        assert_eq!(
            b.params,
            vec![SqlParam::text("'; DROP TABLE Products; --")]
        );
    }
}
