//! `$apply` parsing.
//!
//! Supported transformations:
//!
//! ```text
//! groupby((f1,f2),aggregate(src with sum as alias,...))
//! groupby((f1,f2))
//! aggregate(src with sum as alias)
//! .../filter(predicate)        post-grouping predicate (HAVING)
//! ```

use super::ast::{Aggregate, AggregateOp, Apply};
use super::{filter::parse_filter, split_top_level};
use crate::error::{Error, Result};
use oxidata_sql::is_valid_identifier;

/// Parse a `$apply` value.
pub fn parse_apply(input: &str) -> Result<Apply> {
    let mut apply = Apply::default();

    for transformation in split_top_level(input, '/') {
        let transformation = transformation.trim();

        if let Some(body) = call_body(transformation, "groupby") {
            parse_groupby(body, &mut apply)?;
        } else if let Some(body) = call_body(transformation, "aggregate") {
            parse_aggregates(body, &mut apply)?;
        } else if let Some(body) = call_body(transformation, "filter") {
            apply.having = Some(parse_filter(body)?);
        } else {
            return Err(invalid(&format!(
                "unknown transformation: {}",
                transformation
            )));
        }
    }

    if apply.group_by.is_empty() && apply.aggregates.is_empty() {
        return Err(invalid("no grouping or aggregation given"));
    }

    Ok(apply)
}

/// `(f1,f2)[,aggregate(...)]`
fn parse_groupby(body: &str, apply: &mut Apply) -> Result<()> {
    let body = body.trim();
    if !body.starts_with('(') {
        return Err(invalid("groupby fields must be parenthesized"));
    }

    let close = matching_paren(body).ok_or_else(|| invalid("unbalanced parentheses"))?;
    for field in body[1..close].split(',') {
        let field = field.trim();
        if !is_valid_identifier(field) {
            return Err(invalid(&format!("invalid group-by field: {}", field)));
        }
        apply.group_by.push(field.to_string());
    }

    let remainder = body[close + 1..].trim();
    if remainder.is_empty() {
        return Ok(());
    }

    let remainder = remainder
        .strip_prefix(',')
        .map(str::trim)
        .ok_or_else(|| invalid(remainder))?;
    let aggregates = call_body(remainder, "aggregate").ok_or_else(|| invalid(remainder))?;
    parse_aggregates(aggregates, apply)
}

/// `src with op as alias, ...`
fn parse_aggregates(body: &str, apply: &mut Apply) -> Result<()> {
    for item in split_top_level(body, ',') {
        let tokens: Vec<&str> = item.split_whitespace().collect();
        let (source, op, alias) = match tokens.as_slice() {
            [source, "with", op, "as", alias] => (*source, *op, *alias),
            _ => return Err(invalid(&format!("invalid aggregate: {}", item.trim()))),
        };

        let op = AggregateOp::parse(op)
            .ok_or_else(|| invalid(&format!("unknown aggregate operation: {}", op)))?;
        if !is_valid_identifier(source) {
            return Err(invalid(&format!("invalid aggregate source: {}", source)));
        }
        if !is_valid_identifier(alias) {
            return Err(invalid(&format!("invalid aggregate alias: {}", alias)));
        }

        apply.aggregates.push(Aggregate {
            source: source.to_string(),
            op,
            alias: alias.to_string(),
        });
    }

    Ok(())
}

/// Strip `name( ... )`, returning the body.
fn call_body<'a>(input: &'a str, name: &str) -> Option<&'a str> {
    let rest = input.strip_prefix(name)?.trim_start();
    rest.strip_prefix('(')?.strip_suffix(')')
}

/// Index of the parenthesis matching the opening one at position 0.
fn matching_paren(input: &str) -> Option<usize> {
    let mut depth = 0usize;
    for (i, c) in input.char_indices() {
        match c {
            '(' => depth += 1,
            ')' => {
                depth -= 1;
                if depth == 0 {
                    return Some(i);
                }
            }
            _ => {}
        }
    }
    None
}

fn invalid(message: &str) -> Error {
    Error::InvalidQueryOption {
        option: "$apply".into(),
        message: message.to_string(),
    }
}
