//! Expand / join planning.
//!
//! Each expand item becomes a pure fragment (its LEFT JOIN, aliased select
//! columns, and any outer-level ordering or paging), and fragments fold
//! together in depth-first order. Nested expands join relative to the
//! target table of their parent.

use super::{lower_filter, PlanContext};
use crate::error::Result;
use crate::query::ast::ExpandItem;
use crate::schema::TableSchema;
use oxidata_sql::SqlFragment;

/// The folded contribution of a set of expand items.
#[derive(Debug, Default)]
pub(crate) struct ExpandFragment {
    /// JOIN clauses in depth-first traversal order.
    pub joins: Vec<SqlFragment>,
    /// Aliased select items (`Target.col AS prefix_col`).
    pub select: Vec<String>,
    /// Outer-level ORDER BY terms contributed by expand options.
    pub order_by: Vec<String>,
    /// Outer-level paging contributed by expand options; the first expand
    /// that sets one wins. Bounds the joined row set, not the child set.
    pub top: Option<i64>,
    pub skip: Option<i64>,
}

impl ExpandFragment {
    fn fold(&mut self, other: ExpandFragment) {
        self.joins.extend(other.joins);
        self.select.extend(other.select);
        self.order_by.extend(other.order_by);
        self.top = self.top.or(other.top);
        self.skip = self.skip.or(other.skip);
    }
}

/// Plan a list of expand items rooted at `scope`.
pub(crate) fn plan_expands(
    items: &[ExpandItem],
    scope: &TableSchema,
    ctx: &PlanContext<'_>,
) -> Result<ExpandFragment> {
    let mut combined = ExpandFragment::default();
    for item in items {
        combined.fold(plan_expand(item, scope, &[], ctx)?);
    }
    Ok(combined)
}

fn plan_expand(
    item: &ExpandItem,
    scope: &TableSchema,
    chain: &[String],
    ctx: &PlanContext<'_>,
) -> Result<ExpandFragment> {
    let fk = ctx.registry.resolve_navigation(&scope.name, &item.path)?;
    let target = ctx.registry.resolve_resource(&fk.to_table)?;

    let mut prefix_parts = chain.to_vec();
    prefix_parts.push(item.path.clone());
    let prefix = prefix_parts.join("_");

    // Filters attach to the JOIN condition so missing matches still yield a
    // NULL-expanded side.
    let mut join = SqlFragment::raw(format!(
        "LEFT JOIN {} ON {}.{} = {}.{}",
        fk.to_table, fk.from_table, fk.from_column, fk.to_table, fk.to_column
    ));
    if let Some(filter) = &item.filter {
        join.push(" AND ");
        join.append(lower_filter(filter, target, ctx, true)?);
    }

    let mut fragment = ExpandFragment {
        joins: vec![join],
        top: item.top,
        skip: item.skip,
        ..ExpandFragment::default()
    };

    let columns: Vec<String> = match &item.select {
        Some(fields) if !fields.is_empty() => fields
            .iter()
            .map(|field| ctx.resolve_column(target, field))
            .collect::<Result<_>>()?,
        _ => target.column_names().map(String::from).collect(),
    };
    for column in columns {
        fragment.select.push(format!(
            "{}.{} AS {}_{}",
            target.name, column, prefix, column
        ));
    }

    if let Some(keys) = &item.order_by {
        for key in keys {
            let column = ctx.resolve_column(target, &key.field)?;
            fragment.order_by.push(format!(
                "{}.{} {}",
                target.name,
                column,
                key.direction.to_sql()
            ));
        }
    }

    for child in &item.nested {
        fragment.fold(plan_expand(child, target, &prefix_parts, ctx)?);
    }

    Ok(fragment)
}
