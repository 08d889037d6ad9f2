//! Query planning: lowering a validated AST to parameterized SQL.
//!
//! Planning is pure and synchronous. Every identifier is resolved against
//! the schema registry (through the configured field map) before rendering,
//! and every literal becomes a positional parameter; nothing user-supplied
//! is ever spliced into SQL text.

pub mod apply_plan;
pub mod expand_plan;
pub mod select_plan;

pub use select_plan::{build_count_query, build_select_query};

use crate::config::ServiceConfig;
use crate::error::{Error, Result};
use crate::query::ast::{CompareOp, FilterExpr};
use crate::schema::{SchemaRegistry, TableSchema};
use oxidata_sql::{is_valid_identifier, SqlFragment, SqlParam};

/// A rendered SQL statement and its parameters, ready for execution.
#[derive(Clone, Debug, PartialEq)]
pub struct SqlPlan {
    pub sql: String,
    pub params: Vec<SqlParam>,
}

impl From<SqlFragment> for SqlPlan {
    fn from(fragment: SqlFragment) -> Self {
        let (sql, params) = fragment.build();
        Self { sql, params }
    }
}

/// Shared lookup context for one planning pass.
#[derive(Clone, Copy)]
pub(crate) struct PlanContext<'a> {
    pub registry: &'a SchemaRegistry,
    pub config: &'a ServiceConfig,
}

impl PlanContext<'_> {
    /// Resolve an API field name to its database column on a table.
    pub fn resolve_column(&self, table: &TableSchema, api_name: &str) -> Result<String> {
        let db_name = self.config.db_field(api_name);
        if table.has_column(db_name) {
            Ok(db_name.to_string())
        } else {
            Err(Error::UnknownField(api_name.to_string()))
        }
    }

    /// Resolve a field reference, table-qualified when joins are in play.
    pub fn resolve_ref(
        &self,
        table: &TableSchema,
        api_name: &str,
        qualify: bool,
    ) -> Result<String> {
        let column = self.resolve_column(table, api_name)?;
        if qualify {
            Ok(format!("{}.{}", table.name, column))
        } else {
            Ok(column)
        }
    }
}

/// Lower a filter tree using a caller-supplied field resolver.
pub(crate) fn lower_filter_with(
    expr: &FilterExpr,
    resolve: &impl Fn(&str) -> Result<String>,
) -> Result<SqlFragment> {
    match expr {
        FilterExpr::Compare { field, op, value } => {
            let column = resolve(field)?;
            let mut frag = SqlFragment::new();
            frag.push(&column);

            // eq/ne against null lower to IS [NOT] NULL.
            if value.is_null() && matches!(op, CompareOp::Eq | CompareOp::Ne) {
                frag.push(match op {
                    CompareOp::Eq => " IS NULL",
                    _ => " IS NOT NULL",
                });
            } else {
                frag.push(" ");
                frag.push(op.to_sql());
                frag.push(" ");
                frag.push_param(value.clone());
            }
            Ok(frag)
        }
        FilterExpr::StringPred { field, op, value } => {
            let column = resolve(field)?;
            let mut frag = SqlFragment::new();
            frag.push(&column);
            frag.push(" LIKE ");
            frag.push_param(op.like_pattern(value));
            Ok(frag)
        }
        FilterExpr::In { field, values } => {
            let column = resolve(field)?;
            let mut frag = SqlFragment::new();
            frag.push(&column);
            frag.push(" IN (");
            for (i, value) in values.iter().enumerate() {
                if i > 0 {
                    frag.push(", ");
                }
                frag.push_param(value.clone());
            }
            frag.push(")");
            Ok(frag)
        }
        FilterExpr::And(left, right) => {
            let mut frag = SqlFragment::raw("(");
            frag.append(lower_filter_with(left, resolve)?);
            frag.push(" AND ");
            frag.append(lower_filter_with(right, resolve)?);
            frag.push(")");
            Ok(frag)
        }
        FilterExpr::Or(left, right) => {
            let mut frag = SqlFragment::raw("(");
            frag.append(lower_filter_with(left, resolve)?);
            frag.push(" OR ");
            frag.append(lower_filter_with(right, resolve)?);
            frag.push(")");
            Ok(frag)
        }
        FilterExpr::Not(inner) => {
            let mut frag = SqlFragment::raw("NOT (");
            frag.append(lower_filter_with(inner, resolve)?);
            frag.push(")");
            Ok(frag)
        }
    }
}

/// Lower a filter tree against a table's columns.
pub(crate) fn lower_filter(
    expr: &FilterExpr,
    table: &TableSchema,
    ctx: &PlanContext<'_>,
    qualify: bool,
) -> Result<SqlFragment> {
    lower_filter_with(expr, &|field| ctx.resolve_ref(table, field, qualify))
}

/// Lower a `$search` term to an FTS membership test.
pub(crate) fn lower_search(
    term: &str,
    table: &TableSchema,
    ctx: &PlanContext<'_>,
    qualify: bool,
) -> Result<SqlFragment> {
    let search = ctx
        .config
        .search_for(&table.name)
        .ok_or_else(|| Error::SearchNotConfigured(table.name.clone()))?;

    if !is_valid_identifier(&search.fts_table) {
        return Err(Error::Config(format!(
            "invalid FTS table name: {}",
            search.fts_table
        )));
    }

    let pk = if qualify {
        format!("{}.{}", table.name, table.pk_name())
    } else {
        table.pk_name().to_string()
    };

    let mut frag = SqlFragment::new();
    frag.push(&pk);
    frag.push(" IN (SELECT rowid FROM ");
    frag.push(&search.fts_table);
    frag.push(" WHERE ");
    frag.push(&search.fts_table);
    frag.push(" MATCH ");
    frag.push_param(term);
    frag.push(")");
    Ok(frag)
}
