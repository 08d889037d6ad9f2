//! Wire-format response building for Oxidata.
//!
//! Pure JSON shaping: envelopes with context and links, nested-object
//! reassembly for expanded rows, and the standard response headers.
//! Nothing here touches a database or an HTTP framework.

mod envelope;
pub mod headers;

pub use envelope::{
    collection_envelope, entity_envelope, error_envelope, nest_expanded_rows, ExpandPrefix,
};

use bytes::Bytes;
use thiserror::Error;

/// Response serialization errors.
#[derive(Error, Debug)]
pub enum FormatError {
    #[error("JSON serialization failed: {0}")]
    Json(#[from] serde_json::Error),
}

/// Serialize a JSON body to bytes.
pub fn to_bytes(body: &serde_json::Value) -> Result<Bytes, FormatError> {
    Ok(Bytes::from(serde_json::to_vec(body)?))
}
