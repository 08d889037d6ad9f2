//! Error types for Oxidata.
//!
//! Every error maps to an HTTP status and a stable numeric code, and its
//! message is safe to echo to clients (no SQL, no internals).

use http::StatusCode;
use thiserror::Error;

/// Result type for Oxidata operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for Oxidata.
#[derive(Error, Debug)]
pub enum Error {
    // ========================================================================
    // Request Parsing Errors (400)
    // ========================================================================
    #[error("Invalid path: {0}")]
    InvalidPath(String),

    #[error("Invalid {option} option: {message}")]
    InvalidQueryOption { option: String, message: String },

    #[error("Invalid filter expression: {0}")]
    InvalidFilter(String),

    #[error("Invalid request body: {0}")]
    InvalidBody(String),

    #[error("Unknown field: {0}")]
    UnknownField(String),

    #[error("Relationship \"{nav}\" not found for table \"{table}\"")]
    UnknownNavigation { nav: String, table: String },

    #[error("Invalid delta token: {0}")]
    InvalidDeltaToken(String),

    #[error("Invalid batch format")]
    InvalidBatchFormat,

    #[error("Batch too large: {0} operations")]
    BatchTooLarge(usize),

    #[error("Unsupported HTTP method: {0}")]
    UnsupportedMethod(String),

    #[error("Search is not configured for resource: {0}")]
    SearchNotConfigured(String),

    #[error("Invalid change event: {0}")]
    InvalidChange(String),

    // ========================================================================
    // Resource Errors (404)
    // ========================================================================
    #[error("Resource not found: {0}")]
    ResourceNotFound(String),

    #[error("Entity not found: {resource}({id})")]
    EntityNotFound { resource: String, id: i64 },

    // ========================================================================
    // Method Errors (405)
    // ========================================================================
    #[error("Method {method} not allowed on {path}")]
    MethodNotAllowed { method: String, path: String },

    // ========================================================================
    // Internal Errors (500)
    // ========================================================================
    #[error("Database error: {0}")]
    Database(String),

    #[error("Transaction rolled back: {0}")]
    TransactionAborted(String),

    #[error("Request deadline exceeded")]
    DeadlineExceeded,

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl Error {
    /// Get the HTTP status code for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::InvalidPath(_)
            | Self::InvalidQueryOption { .. }
            | Self::InvalidFilter(_)
            | Self::InvalidBody(_)
            | Self::UnknownField(_)
            | Self::UnknownNavigation { .. }
            | Self::InvalidDeltaToken(_)
            | Self::InvalidBatchFormat
            | Self::BatchTooLarge(_)
            | Self::UnsupportedMethod(_)
            | Self::SearchNotConfigured(_)
            | Self::InvalidChange(_) => StatusCode::BAD_REQUEST,

            Self::ResourceNotFound(_) | Self::EntityNotFound { .. } => StatusCode::NOT_FOUND,

            Self::MethodNotAllowed { .. } => StatusCode::METHOD_NOT_ALLOWED,

            Self::Database(_)
            | Self::TransactionAborted(_)
            | Self::DeadlineExceeded
            | Self::Internal(_)
            | Self::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Get the stable error code for API responses.
    ///
    /// Codes are the numeric HTTP status rendered as a string.
    pub fn code(&self) -> &'static str {
        match self.status_code() {
            StatusCode::BAD_REQUEST => "400",
            StatusCode::NOT_FOUND => "404",
            StatusCode::METHOD_NOT_ALLOWED => "405",
            _ => "500",
        }
    }

    /// Whether this error is a per-operation outcome rather than a failure
    /// that should abort a surrounding transaction.
    pub fn is_client_error(&self) -> bool {
        self.status_code().is_client_error()
    }

    /// Convert to the `{"error":{"code","message"}}` envelope.
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "error": {
                "code": self.code(),
                "message": self.to_string(),
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_status_codes() {
        assert_eq!(
            Error::InvalidFilter("x".into()).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            Error::ResourceNotFound("Products".into()).status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            Error::MethodNotAllowed {
                method: "TRACE".into(),
                path: "/Products".into()
            }
            .status_code(),
            StatusCode::METHOD_NOT_ALLOWED
        );
        assert_eq!(
            Error::Database("boom".into()).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_error_codes_are_numeric_strings() {
        assert_eq!(Error::InvalidBatchFormat.code(), "400");
        assert_eq!(
            Error::EntityNotFound {
                resource: "Products".into(),
                id: 9
            }
            .code(),
            "404"
        );
        assert_eq!(Error::Internal("x".into()).code(), "500");
    }

    #[test]
    fn test_unknown_navigation_message() {
        let err = Error::UnknownNavigation {
            nav: "customer".into(),
            table: "Orders".into(),
        };
        assert_eq!(
            err.to_string(),
            "Relationship \"customer\" not found for table \"Orders\""
        );
    }

    #[test]
    fn test_error_to_json() {
        let json = Error::InvalidFilter("bad".into()).to_json();
        assert_eq!(json["error"]["code"], "400");
        assert!(json["error"]["message"]
            .as_str()
            .unwrap()
            .contains("bad"));
    }
}
