//! System option parsing.
//!
//! Each option parses independently into the typed AST; the first failure
//! wins and nothing downstream ever sees an unvalidated option. Non-system
//! parameters (no `$` prefix) are ignored; unknown `$` options are rejected.

pub mod apply;
pub mod ast;
pub mod compute;
pub mod expand;
pub mod filter;

pub use apply::parse_apply;
pub use ast::{
    Aggregate, AggregateOp, Apply, CompareOp, ComputeItem, ExpandItem, FilterExpr, OrderDirection,
    OrderKey, Query, StringOp, Value,
};
pub use compute::parse_compute;
pub use expand::parse_expand;
pub use filter::parse_filter;

use crate::error::{Error, Result};
use indexmap::IndexMap;

/// Parse a query-parameter map into a [`Query`].
pub fn parse_query(params: &IndexMap<String, String>) -> Result<Query> {
    let mut query = Query::default();

    for (key, value) in params {
        match key.as_str() {
            "$filter" => query.filter = Some(parse_filter(value)?),
            "$select" => {
                if !value.trim().is_empty() {
                    query.select = Some(parse_select_list(value)?);
                }
            }
            "$orderby" => query.order_by = Some(parse_order_terms(value)?),
            "$top" => query.top = Some(parse_non_negative(value, "$top")?),
            "$skip" => query.skip = Some(parse_non_negative(value, "$skip")?),
            "$expand" => {
                if !value.trim().is_empty() {
                    query.expand = Some(parse_expand(value)?);
                }
            }
            "$search" => query.search = Some(value.clone()),
            "$apply" => query.apply = Some(parse_apply(value)?),
            "$compute" => query.compute = Some(parse_compute(value)?),
            "$count" => {
                query.count = match value.as_str() {
                    "true" => true,
                    "false" => false,
                    other => {
                        return Err(Error::InvalidQueryOption {
                            option: "$count".into(),
                            message: format!("expected true or false, got {}", other),
                        })
                    }
                }
            }
            "$deltatoken" => query.delta_token = Some(value.clone()),
            other if other.starts_with('$') => {
                return Err(Error::InvalidQueryOption {
                    option: other.to_string(),
                    message: "unknown system option".into(),
                })
            }
            _ => {}
        }
    }

    Ok(query)
}

/// Parse a `$select` list: comma-separated field names.
fn parse_select_list(input: &str) -> Result<Vec<String>> {
    input
        .split(',')
        .map(|part| {
            let name = part.trim();
            if name.is_empty() {
                Err(Error::InvalidQueryOption {
                    option: "$select".into(),
                    message: "empty field name".into(),
                })
            } else {
                Ok(name.to_string())
            }
        })
        .collect()
}

/// Parse `$orderby` terms: `field (asc|desc)?`, comma-separated.
pub(crate) fn parse_order_terms(input: &str) -> Result<Vec<OrderKey>> {
    input
        .split(',')
        .map(|part| {
            let tokens: Vec<&str> = part.split_whitespace().collect();
            match tokens.as_slice() {
                [field] => Ok(OrderKey::asc(*field)),
                [field, "asc"] => Ok(OrderKey::asc(*field)),
                [field, "desc"] => Ok(OrderKey::desc(*field)),
                _ => Err(Error::InvalidQueryOption {
                    option: "$orderby".into(),
                    message: format!("invalid term: {}", part.trim()),
                }),
            }
        })
        .collect()
}

/// Parse a non-negative integer option value.
fn parse_non_negative(input: &str, option: &str) -> Result<i64> {
    match input.trim().parse::<i64>() {
        Ok(n) if n >= 0 => Ok(n),
        _ => Err(Error::InvalidQueryOption {
            option: option.into(),
            message: format!("expected a non-negative integer, got {}", input),
        }),
    }
}

/// Split on a separator at paren depth zero, outside quoted strings.
pub(crate) fn split_top_level(input: &str, sep: char) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut in_quotes = false;
    let mut start = 0usize;

    for (i, c) in input.char_indices() {
        match c {
            '\'' => in_quotes = !in_quotes,
            '(' if !in_quotes => depth += 1,
            ')' if !in_quotes => depth = depth.saturating_sub(1),
            c if c == sep && depth == 0 && !in_quotes => {
                parts.push(&input[start..i]);
                start = i + c.len_utf8();
            }
            _ => {}
        }
    }

    parts.push(&input[start..]);
    parts
}
