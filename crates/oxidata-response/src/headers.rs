//! Standard response headers.

/// `OData-Version` header carried on every response.
pub const ODATA_VERSION: (&str, &str) = ("OData-Version", "4.0");

/// Content type for JSON bodies.
pub const CONTENT_TYPE_JSON: (&str, &str) = ("Content-Type", "application/json");

/// Content type for the metadata document.
pub const CONTENT_TYPE_XML: (&str, &str) = ("Content-Type", "application/xml");

/// Content type for `$count` responses.
pub const CONTENT_TYPE_TEXT: (&str, &str) = ("Content-Type", "text/plain");

/// Content type for batch responses.
pub fn multipart_content_type(boundary: &str) -> (&'static str, String) {
    (
        "Content-Type",
        format!("multipart/mixed; boundary={}", boundary),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_multipart_content_type() {
        let (name, value) = multipart_content_type("batch_boundary");
        assert_eq!(name, "Content-Type");
        assert_eq!(value, "multipart/mixed; boundary=batch_boundary");
    }
}
