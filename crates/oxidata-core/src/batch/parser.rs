//! Multipart batch envelope parsing.
//!
//! The body carries an outer `batch_boundary` enclosing one changeset
//! delimited by `changeset_boundary`. Each part is an `application/http`
//! block: MIME headers, a blank line, a request line, request headers,
//! a blank line, and an optional body.

use super::{BATCH_BOUNDARY, CHANGESET_BOUNDARY};
use crate::error::{Error, Result};
use serde_json::Value as JsonValue;

const METHODS: &[&str] = &["GET", "POST", "PUT", "DELETE", "PATCH"];

/// Body of a batch operation: JSON when it parses, raw text otherwise.
#[derive(Clone, Debug, PartialEq)]
pub enum BatchBody {
    Json(JsonValue),
    Text(String),
}

impl BatchBody {
    pub fn as_json(&self) -> Option<&JsonValue> {
        match self {
            Self::Json(value) => Some(value),
            Self::Text(_) => None,
        }
    }
}

/// One parsed sub-request.
#[derive(Clone, Debug, PartialEq)]
pub struct BatchOperation {
    pub method: String,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Option<BatchBody>,
}

/// Parse a multipart batch body into its operations, in input order.
pub fn parse_batch(body: &str) -> Result<Vec<BatchOperation>> {
    let outer_marker = format!("--{}", BATCH_BOUNDARY);
    if !body.contains(&outer_marker) {
        return Err(Error::InvalidBatchFormat);
    }

    let inner_marker = format!("--{}", CHANGESET_BOUNDARY);
    let marker = if body.contains(&inner_marker) {
        inner_marker
    } else {
        outer_marker
    };
    let terminal = format!("{}--", marker);

    let mut parts: Vec<Vec<&str>> = Vec::new();
    let mut current: Option<Vec<&str>> = None;

    for raw_line in body.lines() {
        let line = raw_line.strip_suffix('\r').unwrap_or(raw_line);
        if line == terminal {
            if let Some(part) = current.take() {
                parts.push(part);
            }
        } else if line == marker {
            if let Some(part) = current.take() {
                parts.push(part);
            }
            current = Some(Vec::new());
        } else if let Some(part) = current.as_mut() {
            part.push(line);
        }
    }
    if let Some(part) = current.take() {
        parts.push(part);
    }

    parts
        .into_iter()
        .filter(|lines| lines.iter().any(|line| !line.trim().is_empty()))
        .map(|lines| parse_part(&lines))
        .collect()
}

fn parse_part(lines: &[&str]) -> Result<BatchOperation> {
    let mut idx = 0;

    while idx < lines.len() && lines[idx].trim().is_empty() {
        idx += 1;
    }

    // Skip the MIME part headers, if present, up to the blank separator.
    if idx < lines.len() && !is_request_line(lines[idx]) {
        while idx < lines.len() && !lines[idx].trim().is_empty() {
            idx += 1;
        }
        while idx < lines.len() && lines[idx].trim().is_empty() {
            idx += 1;
        }
    }

    let request_line = lines.get(idx).ok_or(Error::InvalidBatchFormat)?;
    let mut tokens = request_line.split_whitespace();
    let method = tokens
        .next()
        .ok_or(Error::InvalidBatchFormat)?
        .to_string();
    let url = tokens
        .next()
        .ok_or(Error::InvalidBatchFormat)?
        .to_string();
    idx += 1;

    if !METHODS.contains(&method.as_str()) {
        return Err(Error::UnsupportedMethod(method));
    }
    if !url.starts_with('/') {
        return Err(Error::InvalidPath(url));
    }

    let mut headers = Vec::new();
    while idx < lines.len() && !lines[idx].trim().is_empty() {
        if let Some((name, value)) = lines[idx].split_once(':') {
            headers.push((name.trim().to_string(), value.trim().to_string()));
        }
        idx += 1;
    }

    let body_text = lines
        .get(idx..)
        .map(|rest| rest.join("\n"))
        .unwrap_or_default();
    let body_text = body_text.trim();
    let body = if body_text.is_empty() {
        None
    } else {
        match serde_json::from_str(body_text) {
            Ok(value) => Some(BatchBody::Json(value)),
            Err(_) => Some(BatchBody::Text(body_text.to_string())),
        }
    };

    Ok(BatchOperation {
        method,
        url,
        headers,
        body,
    })
}

fn is_request_line(line: &str) -> bool {
    match line.split_whitespace().next() {
        Some(first) => METHODS.contains(&first) || line.contains(" HTTP/"),
        None => false,
    }
}
