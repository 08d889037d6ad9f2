//! Batch processing: multipart envelope parsing, transactional execution,
//! and response serialization.

pub mod executor;
pub mod parser;
pub mod response;

pub use executor::execute_batch;
pub use parser::{parse_batch, BatchBody, BatchOperation};
pub use response::serialize_batch_response;

use http::StatusCode;
use serde_json::Value as JsonValue;

/// Outer multipart boundary (literal per the wire contract).
pub const BATCH_BOUNDARY: &str = "batch_boundary";

/// Inner changeset boundary (literal per the wire contract).
pub const CHANGESET_BOUNDARY: &str = "changeset_boundary";

/// Outcome of one batch operation, in input order.
#[derive(Clone, Debug)]
pub struct BatchResult {
    pub status: StatusCode,
    pub headers: Vec<(String, String)>,
    pub body: Option<JsonValue>,
}

impl BatchResult {
    pub fn json(status: StatusCode, body: JsonValue) -> Self {
        Self {
            status,
            headers: vec![("Content-Type".into(), "application/json".into())],
            body: Some(body),
        }
    }

    pub fn no_content() -> Self {
        Self {
            status: StatusCode::NO_CONTENT,
            headers: Vec::new(),
            body: None,
        }
    }

    pub fn from_error(error: &crate::error::Error) -> Self {
        Self::json(error.status_code(), error.to_json())
    }
}
