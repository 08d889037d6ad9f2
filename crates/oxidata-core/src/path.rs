//! Request path parsing.
//!
//! Routes: `$metadata`, `$batch`, `Resource`, `Resource(id)`,
//! `Resource(id)/nav`, `Resource/$count`. Entity keys are integer rowids.

use crate::error::{Error, Result};
use oxidata_sql::is_valid_identifier;

/// A parsed request path.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RoutePath {
    Metadata,
    Batch,
    Collection { resource: String },
    Count { resource: String },
    Entity { resource: String, id: i64 },
    Navigation { resource: String, id: i64, nav: String },
}

/// Parse a request path, stripping the configured service root first.
pub fn parse_path(path: &str, service_root: &str) -> Result<RoutePath> {
    let path = match path.strip_prefix(service_root) {
        Some(rest) if !service_root.is_empty() => rest,
        _ => path,
    };
    let path = path.trim_matches('/');

    if path.is_empty() {
        return Err(Error::InvalidPath("empty path".into()));
    }

    let segments: Vec<&str> = path.split('/').collect();

    match segments.as_slice() {
        ["$metadata"] => Ok(RoutePath::Metadata),
        ["$batch"] => Ok(RoutePath::Batch),
        [first] => match parse_resource_segment(first)? {
            (resource, None) => Ok(RoutePath::Collection { resource }),
            (resource, Some(id)) => Ok(RoutePath::Entity { resource, id }),
        },
        [first, "$count"] => match parse_resource_segment(first)? {
            (resource, None) => Ok(RoutePath::Count { resource }),
            _ => Err(Error::InvalidPath(path.to_string())),
        },
        [first, nav] => match parse_resource_segment(first)? {
            (resource, Some(id)) if is_valid_identifier(nav) => Ok(RoutePath::Navigation {
                resource,
                id,
                nav: nav.to_string(),
            }),
            _ => Err(Error::InvalidPath(path.to_string())),
        },
        _ => Err(Error::InvalidPath(path.to_string())),
    }
}

/// Parse `Resource` or `Resource(id)`.
fn parse_resource_segment(segment: &str) -> Result<(String, Option<i64>)> {
    match segment.find('(') {
        None => {
            if is_valid_identifier(segment) {
                Ok((segment.to_string(), None))
            } else {
                Err(Error::InvalidPath(segment.to_string()))
            }
        }
        Some(open) => {
            let name = &segment[..open];
            let key = segment[open..]
                .strip_prefix('(')
                .and_then(|rest| rest.strip_suffix(')'))
                .ok_or_else(|| Error::InvalidPath(segment.to_string()))?;

            if !is_valid_identifier(name) {
                return Err(Error::InvalidPath(segment.to_string()));
            }

            let id = key
                .trim()
                .parse::<i64>()
                .map_err(|_| Error::InvalidPath(format!("invalid entity key: {}", key)))?;

            Ok((name.to_string(), Some(id)))
        }
    }
}
