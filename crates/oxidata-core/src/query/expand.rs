//! `$expand` parsing.
//!
//! Items are comma-separated navigation names, each optionally carrying
//! nested options in parentheses, semicolon-separated:
//!
//! ```text
//! customer,items($filter=qty gt 1;$select=sku,qty;$top=5;$expand=product)
//! ```
//!
//! Unknown nested options are rejected.

use super::ast::ExpandItem;
use super::{filter::parse_filter, parse_order_terms, split_top_level};
use crate::error::{Error, Result};

/// Parse a `$expand` value into a list of expand items.
pub fn parse_expand(input: &str) -> Result<Vec<ExpandItem>> {
    split_top_level(input, ',')
        .into_iter()
        .map(|part| parse_expand_item(part.trim()))
        .collect()
}

fn parse_expand_item(input: &str) -> Result<ExpandItem> {
    if input.is_empty() {
        return Err(invalid("empty expand item"));
    }

    let (name, options) = match input.find('(') {
        None => (input, None),
        Some(open) => {
            let inner = input[open..]
                .strip_prefix('(')
                .and_then(|rest| rest.strip_suffix(')'))
                .ok_or_else(|| invalid(input))?;
            (&input[..open], Some(inner))
        }
    };

    let name = name.trim();
    if name.is_empty() || !oxidata_sql::is_valid_identifier(name) {
        return Err(invalid(&format!("invalid navigation name: {}", input)));
    }

    let mut item = ExpandItem::new(name);

    if let Some(options) = options {
        for option in split_top_level(options, ';') {
            let option = option.trim();
            if option.is_empty() {
                continue;
            }

            let (key, value) = option
                .split_once('=')
                .ok_or_else(|| invalid(option))?;

            match key.trim() {
                "$filter" => item.filter = Some(parse_filter(value)?),
                "$select" => {
                    item.select = Some(
                        value
                            .split(',')
                            .map(|f| f.trim().to_string())
                            .filter(|f| !f.is_empty())
                            .collect(),
                    )
                }
                "$orderby" => item.order_by = Some(parse_order_terms(value)?),
                "$top" => item.top = Some(parse_nested_int(value)?),
                "$skip" => item.skip = Some(parse_nested_int(value)?),
                "$expand" => item.nested = parse_expand(value)?,
                other => {
                    return Err(Error::InvalidQueryOption {
                        option: "$expand".into(),
                        message: format!("unknown nested option: {}", other),
                    })
                }
            }
        }
    }

    Ok(item)
}

fn parse_nested_int(input: &str) -> Result<i64> {
    match input.trim().parse::<i64>() {
        Ok(n) if n >= 0 => Ok(n),
        _ => Err(invalid(&format!("expected a non-negative integer: {}", input))),
    }
}

fn invalid(message: &str) -> Error {
    Error::InvalidQueryOption {
        option: "$expand".into(),
        message: message.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::ast::OrderKey;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_simple_expand() {
        let items = parse_expand("customer").unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].path, "customer");
        assert!(items[0].nested.is_empty());
    }

    #[test]
    fn test_multiple_items() {
        let items = parse_expand("customer,items").unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[1].path, "items");
    }

    #[test]
    fn test_nested_options() {
        let items =
            parse_expand("items($filter=qty gt 1;$select=sku,qty;$top=5;$skip=2)").unwrap();
        let item = &items[0];
        assert!(item.filter.is_some());
        assert_eq!(
            item.select.as_deref(),
            Some(&["sku".to_string(), "qty".to_string()][..])
        );
        assert_eq!(item.top, Some(5));
        assert_eq!(item.skip, Some(2));
    }

    #[test]
    fn test_nested_orderby() {
        let items = parse_expand("items($orderby=qty desc)").unwrap();
        assert_eq!(
            items[0].order_by.as_deref(),
            Some(&[OrderKey::desc("qty")][..])
        );
    }

    #[test]
    fn test_nested_expand() {
        let items = parse_expand("items($expand=product($select=name))").unwrap();
        let inner = &items[0].nested;
        assert_eq!(inner.len(), 1);
        assert_eq!(inner[0].path, "product");
        assert_eq!(inner[0].select.as_deref(), Some(&["name".to_string()][..]));
    }

    #[test]
    fn test_filter_with_commas_inside_options() {
        let items = parse_expand("items($filter=sku in ('a','b')),customer").unwrap();
        assert_eq!(items.len(), 2);
        assert!(items[0].filter.is_some());
        assert_eq!(items[1].path, "customer");
    }

    #[test]
    fn test_unknown_nested_option_rejected() {
        let err = parse_expand("items($levels=2)").unwrap_err();
        assert!(err.to_string().contains("unknown nested option"));
    }

    #[test]
    fn test_malformed_rejected() {
        assert!(parse_expand("items(").is_err());
        assert!(parse_expand("items)x(").is_err());
        assert!(parse_expand("bad name").is_err());
        assert!(parse_expand("").is_err());
    }
}
