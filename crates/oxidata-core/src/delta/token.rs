//! Delta token format, parsing, and link generation.

use crate::error::{Error, Result};
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};

/// Characters escaped when a custom token is embedded in a link. `-` and
/// `_` stay literal: they are what marks a token as custom.
const TOKEN_SET: &AsciiSet = &NON_ALPHANUMERIC.remove(b'-').remove(b'_');

/// A parsed `$deltatoken` value.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DeltaToken {
    /// Exclusive lower bound on event timestamps.
    Timestamp(i64),
    /// Opaque application-defined token (contains `-` or `_`).
    Custom(String),
}

/// Render a timestamp as a token: 17 digits, zero-padded.
///
/// The width matches a `YYYYMMDDHHMMSSMMM` stamp but the digits are the
/// millisecond timestamp itself, so parsing inverts formatting exactly.
pub fn format_timestamp(timestamp: i64) -> String {
    format!("{:017}", timestamp)
}

/// Parse a `$deltatoken` value.
///
/// Empty is invalid; anything containing `-` or `_` is an opaque custom
/// token; otherwise the value must be a positive integer timestamp. A plain
/// number containing neither marker always lands in the timestamp branch,
/// so custom tokens must carry one to avoid misclassification.
pub fn parse_delta_token(token: &str) -> Result<DeltaToken> {
    if token.is_empty() {
        return Err(Error::InvalidDeltaToken("empty token".into()));
    }

    if token.contains('-') || token.contains('_') {
        return Ok(DeltaToken::Custom(token.to_string()));
    }

    match token.parse::<i64>() {
        Ok(timestamp) if timestamp > 0 => Ok(DeltaToken::Timestamp(timestamp)),
        _ => Err(Error::InvalidDeltaToken(token.to_string())),
    }
}

/// Build a delta link for a resource.
///
/// The existing query string (if any) is preserved and `$deltatoken` is
/// appended with `&` or `?` as appropriate.
pub fn generate_delta_link(
    base_url: &str,
    resource: &str,
    timestamp: i64,
    existing_query: Option<&str>,
    custom_token: Option<&str>,
) -> String {
    let token = match custom_token {
        Some(custom) => utf8_percent_encode(custom, TOKEN_SET).to_string(),
        None => format_timestamp(timestamp),
    };

    match existing_query {
        Some(query) if !query.is_empty() => {
            format!("{}/{}?{}&$deltatoken={}", base_url, resource, query, token)
        }
        _ => format!("{}/{}?$deltatoken={}", base_url, resource, token),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_format_timestamp_width() {
        assert_eq!(format_timestamp(1), "00000000000000001");
        assert_eq!(format_timestamp(1722470400123), "00001722470400123");
        assert_eq!(format_timestamp(1).len(), 17);
    }

    #[test]
    fn test_token_round_trip() {
        for timestamp in [1i64, 999, 1722470400123, i64::MAX] {
            let token = format_timestamp(timestamp);
            assert_eq!(
                parse_delta_token(&token).unwrap(),
                DeltaToken::Timestamp(timestamp)
            );
        }
    }

    #[test]
    fn test_parse_custom_token() {
        assert_eq!(
            parse_delta_token("abc-123").unwrap(),
            DeltaToken::Custom("abc-123".into())
        );
        assert_eq!(
            parse_delta_token("snapshot_7").unwrap(),
            DeltaToken::Custom("snapshot_7".into())
        );
    }

    #[test]
    fn test_parse_invalid_tokens() {
        assert!(parse_delta_token("").is_err());
        assert!(parse_delta_token("0").is_err());
        assert!(parse_delta_token("nonsense").is_err());
        assert!(parse_delta_token("12.5").is_err());
    }

    #[test]
    fn test_generate_delta_link() {
        let link = generate_delta_link("http://h", "Products", 42, None, None);
        assert_eq!(link, "http://h/Products?$deltatoken=00000000000000042");

        let link =
            generate_delta_link("http://h", "Products", 42, Some("$filter=price gt 1"), None);
        assert_eq!(
            link,
            "http://h/Products?$filter=price gt 1&$deltatoken=00000000000000042"
        );

        let link = generate_delta_link("http://h", "Products", 42, None, Some("snap_1"));
        assert_eq!(link, "http://h/Products?$deltatoken=snap_1");
    }
}
