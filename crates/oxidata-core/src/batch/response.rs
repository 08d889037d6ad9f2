//! Batch response serialization.
//!
//! Mirrors the request structure: the outer batch boundary wraps one
//! changeset whose parts carry `HTTP/1.1 <status> <reason>` blocks in
//! operation order.

use super::{BatchResult, BATCH_BOUNDARY, CHANGESET_BOUNDARY};
use crate::handler::ServiceResponse;
use bytes::Bytes;
use http::StatusCode;
use oxidata_response::headers;
use std::fmt::Write;

/// Serialize batch results into the multipart response.
pub fn serialize_batch_response(results: &[BatchResult]) -> ServiceResponse {
    let mut out = String::new();

    let _ = writeln!(out, "--{}\r", BATCH_BOUNDARY);
    let _ = writeln!(
        out,
        "Content-Type: multipart/mixed; boundary={}\r",
        CHANGESET_BOUNDARY
    );
    out.push_str("\r\n");

    for result in results {
        let _ = writeln!(out, "--{}\r", CHANGESET_BOUNDARY);
        out.push_str("Content-Type: application/http\r\n");
        out.push_str("Content-Transfer-Encoding: binary\r\n");
        out.push_str("\r\n");

        let _ = writeln!(
            out,
            "HTTP/1.1 {} {}\r",
            result.status.as_u16(),
            reason(result.status)
        );
        for (name, value) in &result.headers {
            let _ = writeln!(out, "{}: {}\r", name, value);
        }
        out.push_str("\r\n");

        if let Some(body) = &result.body {
            let _ = writeln!(out, "{}\r", body);
        }
    }

    let _ = writeln!(out, "--{}--\r", CHANGESET_BOUNDARY);
    let _ = writeln!(out, "--{}--\r", BATCH_BOUNDARY);

    let (name, value) = headers::multipart_content_type(BATCH_BOUNDARY);
    ServiceResponse {
        status: StatusCode::OK,
        headers: vec![
            (name.to_string(), value),
            (
                headers::ODATA_VERSION.0.to_string(),
                headers::ODATA_VERSION.1.to_string(),
            ),
        ],
        body: Bytes::from(out),
    }
}

fn reason(status: StatusCode) -> &'static str {
    status.canonical_reason().unwrap_or("Unknown")
}
