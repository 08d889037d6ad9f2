//! `$compute` parsing and expression validation.
//!
//! Entries are `<expression> as <alias>`, comma-separated. The expression
//! grammar is deliberately narrow: column references, numeric and string
//! literals, arithmetic and concatenation operators, CASE WHEN, and a fixed
//! function whitelist. Anything else is rejected before SQL generation, so
//! a validated expression can be embedded verbatim into a SELECT list.

use super::ast::ComputeItem;
use super::split_top_level;
use crate::error::{Error, Result};
use oxidata_sql::{is_sql_keyword, is_valid_identifier};

/// Keywords allowed inside compute expressions.
const ALLOWED_KEYWORDS: &[&str] = &[
    "case", "when", "then", "else", "end", "and", "or", "not", "null", "like",
    "in", "is", "as", "integer", "real", "text", "blob", "numeric",
];

/// Whitelisted functions.
const FUNCTIONS: &[&str] = &[
    "upper", "lower", "substr", "instr", "length", "trim", "round", "abs",
    "ceil", "floor", "coalesce", "cast", "julianday", "sum", "avg", "count",
    "min", "max",
];

/// Parse a `$compute` value into validated items.
///
/// Syntax and token-level safety are checked here; column resolution happens
/// at planning time via [`expression_columns`].
pub fn parse_compute(input: &str) -> Result<Vec<ComputeItem>> {
    split_top_level(input, ',')
        .into_iter()
        .map(|part| {
            let (expression, alias) = split_alias(part.trim())?;

            if !is_valid_identifier(&alias) || is_sql_keyword(&alias) {
                return Err(invalid(&format!("invalid alias: {}", alias)));
            }

            let tokens = tokenize(&expression)?;
            check_structure(&tokens)?;

            Ok(ComputeItem { expression, alias })
        })
        .collect()
}

/// Collect every bare identifier in a validated expression that must
/// resolve to a column (everything that is not a keyword or a function
/// call from the whitelist).
pub fn expression_columns(expression: &str) -> Result<Vec<String>> {
    let tokens = tokenize(expression)?;
    let mut columns = Vec::new();

    for (i, token) in tokens.iter().enumerate() {
        if let Token::Ident(name) = token {
            let lowered = name.to_ascii_lowercase();
            if ALLOWED_KEYWORDS.contains(&lowered.as_str()) {
                continue;
            }
            let is_call = FUNCTIONS.contains(&lowered.as_str())
                && matches!(tokens.get(i + 1), Some(Token::LParen));
            if is_call {
                continue;
            }
            columns.push(name.clone());
        }
    }

    Ok(columns)
}

/// Split `<expression> as <alias>` at the last top-level `as`.
fn split_alias(part: &str) -> Result<(String, String)> {
    let bytes = part.as_bytes();
    let mut depth = 0usize;
    let mut in_quotes = false;
    let mut split_at = None;

    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'\'' => in_quotes = !in_quotes,
            b'(' if !in_quotes => depth += 1,
            b')' if !in_quotes => depth = depth.saturating_sub(1),
            b' ' if !in_quotes && depth == 0 => {
                if i + 4 <= bytes.len() && bytes[i..i + 4].eq_ignore_ascii_case(b" as ") {
                    split_at = Some(i);
                }
            }
            _ => {}
        }
        i += 1;
    }

    let at = split_at.ok_or_else(|| invalid(&format!("missing alias: {}", part)))?;
    let expression = part[..at].trim().to_string();
    let alias = part[at + 4..].trim().to_string();

    if expression.is_empty() {
        return Err(invalid("empty expression"));
    }

    Ok((expression, alias))
}

// ============================================================================
// Tokenizer
// ============================================================================

#[derive(Clone, Debug, PartialEq)]
enum Token {
    Ident(String),
    Number(String),
    Str(String),
    Op(&'static str),
    LParen,
    RParen,
    Comma,
}

fn tokenize(expression: &str) -> Result<Vec<Token>> {
    let chars: Vec<char> = expression.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        match c {
            ' ' | '\t' | '\r' | '\n' => i += 1,
            '(' => {
                tokens.push(Token::LParen);
                i += 1;
            }
            ')' => {
                tokens.push(Token::RParen);
                i += 1;
            }
            ',' => {
                tokens.push(Token::Comma);
                i += 1;
            }
            ';' => return Err(invalid("semicolons are not allowed")),
            '\'' => {
                let mut out = String::new();
                let mut j = i + 1;
                loop {
                    match chars.get(j) {
                        Some('\'') if chars.get(j + 1) == Some(&'\'') => {
                            out.push('\'');
                            j += 2;
                        }
                        Some('\'') => {
                            j += 1;
                            break;
                        }
                        Some(ch) => {
                            out.push(*ch);
                            j += 1;
                        }
                        None => return Err(invalid("unterminated string literal")),
                    }
                }
                tokens.push(Token::Str(out));
                i = j;
            }
            '|' => {
                if chars.get(i + 1) == Some(&'|') {
                    tokens.push(Token::Op("||"));
                    i += 2;
                } else {
                    return Err(invalid("single | is not an operator"));
                }
            }
            '-' => {
                if chars.get(i + 1) == Some(&'-') {
                    return Err(invalid("comments are not allowed"));
                }
                tokens.push(Token::Op("-"));
                i += 1;
            }
            '/' => {
                if chars.get(i + 1) == Some(&'*') {
                    return Err(invalid("comments are not allowed"));
                }
                tokens.push(Token::Op("/"));
                i += 1;
            }
            '+' => {
                tokens.push(Token::Op("+"));
                i += 1;
            }
            '*' => {
                tokens.push(Token::Op("*"));
                i += 1;
            }
            '%' => {
                tokens.push(Token::Op("%"));
                i += 1;
            }
            '=' => {
                tokens.push(Token::Op("="));
                i += 1;
            }
            '!' => {
                if chars.get(i + 1) == Some(&'=') {
                    tokens.push(Token::Op("!="));
                    i += 2;
                } else {
                    return Err(invalid("unexpected character: !"));
                }
            }
            '<' => match chars.get(i + 1) {
                Some('=') => {
                    tokens.push(Token::Op("<="));
                    i += 2;
                }
                Some('>') => {
                    tokens.push(Token::Op("<>"));
                    i += 2;
                }
                _ => {
                    tokens.push(Token::Op("<"));
                    i += 1;
                }
            },
            '>' => {
                if chars.get(i + 1) == Some(&'=') {
                    tokens.push(Token::Op(">="));
                    i += 2;
                } else {
                    tokens.push(Token::Op(">"));
                    i += 1;
                }
            }
            c if c.is_ascii_digit() => {
                let mut out = String::new();
                let mut seen_dot = false;
                while let Some(ch) = chars.get(i) {
                    if ch.is_ascii_digit() {
                        out.push(*ch);
                        i += 1;
                    } else if *ch == '.' && !seen_dot {
                        seen_dot = true;
                        out.push('.');
                        i += 1;
                    } else {
                        break;
                    }
                }
                tokens.push(Token::Number(out));
            }
            c if c.is_ascii_alphabetic() || c == '_' => {
                let mut out = String::new();
                while let Some(ch) = chars.get(i) {
                    if ch.is_ascii_alphanumeric() || *ch == '_' {
                        out.push(*ch);
                        i += 1;
                    } else {
                        break;
                    }
                }
                tokens.push(Token::Ident(out));
            }
            other => return Err(invalid(&format!("unexpected character: {}", other))),
        }
    }

    if tokens.is_empty() {
        return Err(invalid("empty expression"));
    }

    Ok(tokens)
}

fn check_structure(tokens: &[Token]) -> Result<()> {
    let mut depth = 0i64;
    let mut previous_was_op = false;

    for (i, token) in tokens.iter().enumerate() {
        match token {
            Token::LParen => depth += 1,
            Token::RParen => {
                depth -= 1;
                if depth < 0 {
                    return Err(invalid("unbalanced parentheses"));
                }
            }
            Token::Comma => {
                if depth == 0 {
                    return Err(invalid("unexpected comma"));
                }
            }
            _ => {}
        }

        let is_op = matches!(token, Token::Op(_));
        if is_op && previous_was_op {
            return Err(invalid("consecutive operators"));
        }
        // Leading minus is the only operator allowed to open an expression.
        if is_op && i == 0 && !matches!(token, Token::Op("-")) {
            return Err(invalid("expression starts with an operator"));
        }
        previous_was_op = is_op;
    }

    if depth != 0 {
        return Err(invalid("unbalanced parentheses"));
    }
    if previous_was_op {
        return Err(invalid("expression ends with an operator"));
    }

    Ok(())
}

fn invalid(message: &str) -> Error {
    Error::InvalidQueryOption {
        option: "$compute".into(),
        message: message.to_string(),
    }
}
