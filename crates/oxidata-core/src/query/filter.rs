//! `$filter` parsing.
//!
//! Full recursive descent over the grammar:
//!
//! ```text
//! expr     := or_expr
//! or_expr  := and_expr ('or' and_expr)*
//! and_expr := unary ('and' unary)*
//! unary    := 'not' unary | primary
//! primary  := '(' expr ')'
//!           | func '(' field ',' string ')'
//!           | field 'in' '(' literal (',' literal)* ')'
//!           | field OP literal
//! ```
//!
//! Whitespace is insignificant outside quoted strings; a quote inside a
//! string literal is escaped by doubling it.

use super::ast::{CompareOp, FilterExpr, StringOp, Value};
use crate::error::{Error, Result};
use nom::{
    branch::alt,
    bytes::complete::tag,
    character::complete::{char, digit1, multispace0},
    combinator::{all_consuming, opt, value},
    multi::{many0, separated_list1},
    sequence::{delimited, preceded},
    IResult,
};

/// Parse a `$filter` value into an expression tree.
pub fn parse_filter(input: &str) -> Result<FilterExpr> {
    if input.trim().is_empty() {
        return Err(Error::InvalidFilter("empty expression".into()));
    }

    match all_consuming(delimited(multispace0, expr, multispace0))(input) {
        Ok((_, ast)) => Ok(ast),
        Err(_) => Err(Error::InvalidFilter(input.to_string())),
    }
}

fn expr(input: &str) -> IResult<&str, FilterExpr> {
    or_expr(input)
}

fn or_expr(input: &str) -> IResult<&str, FilterExpr> {
    let (input, first) = and_expr(input)?;
    let (input, rest) = many0(preceded(word("or"), and_expr))(input)?;
    Ok((input, rest.into_iter().fold(first, FilterExpr::or)))
}

fn and_expr(input: &str) -> IResult<&str, FilterExpr> {
    let (input, first) = unary(input)?;
    let (input, rest) = many0(preceded(word("and"), unary))(input)?;
    Ok((input, rest.into_iter().fold(first, FilterExpr::and)))
}

fn unary(input: &str) -> IResult<&str, FilterExpr> {
    alt((negation, primary))(input)
}

fn negation(input: &str) -> IResult<&str, FilterExpr> {
    let (input, _) = word("not")(input)?;
    let (input, inner) = unary(input)?;
    Ok((input, FilterExpr::negate(inner)))
}

fn primary(input: &str) -> IResult<&str, FilterExpr> {
    alt((parenthesized, string_func, in_expr, comparison))(input)
}

fn parenthesized(input: &str) -> IResult<&str, FilterExpr> {
    delimited(sym('('), expr, sym(')'))(input)
}

fn string_func(input: &str) -> IResult<&str, FilterExpr> {
    let (input, op) = alt((
        value(StringOp::Contains, word("contains")),
        value(StringOp::StartsWith, word("startswith")),
        value(StringOp::EndsWith, word("endswith")),
    ))(input)?;
    let (input, _) = sym('(')(input)?;
    let (input, field) = identifier(input)?;
    let (input, _) = sym(',')(input)?;
    let (input, text) = preceded(multispace0, quoted_string)(input)?;
    let (input, _) = sym(')')(input)?;

    Ok((
        input,
        FilterExpr::StringPred {
            field: field.to_string(),
            op,
            value: text,
        },
    ))
}

fn in_expr(input: &str) -> IResult<&str, FilterExpr> {
    let (input, field) = identifier(input)?;
    let (input, _) = word("in")(input)?;
    let (input, _) = sym('(')(input)?;
    let (input, values) = separated_list1(sym(','), literal)(input)?;
    let (input, _) = sym(')')(input)?;

    Ok((
        input,
        FilterExpr::In {
            field: field.to_string(),
            values,
        },
    ))
}

fn comparison(input: &str) -> IResult<&str, FilterExpr> {
    let (input, field) = identifier(input)?;
    let (input, op) = compare_op(input)?;
    let (input, val) = literal(input)?;

    Ok((
        input,
        FilterExpr::Compare {
            field: field.to_string(),
            op,
            value: val,
        },
    ))
}

fn compare_op(input: &str) -> IResult<&str, CompareOp> {
    alt((
        value(CompareOp::Eq, word("eq")),
        value(CompareOp::Ne, word("ne")),
        value(CompareOp::Le, word("le")),
        value(CompareOp::Lt, word("lt")),
        value(CompareOp::Ge, word("ge")),
        value(CompareOp::Gt, word("gt")),
    ))(input)
}

// ============================================================================
// Terminals
// ============================================================================

fn literal(input: &str) -> IResult<&str, Value> {
    preceded(
        multispace0,
        alt((
            value(Value::Null, word("null")),
            value(Value::Bool(true), word("true")),
            value(Value::Bool(false), word("false")),
            number,
            |i| quoted_string(i).map(|(rest, s)| (rest, Value::Text(s))),
        )),
    )(input)
}

fn number(input: &str) -> IResult<&str, Value> {
    let (rest, sign) = opt(char('-'))(input)?;
    let (rest, int_part) = digit1(rest)?;
    let (rest, frac_part) = opt(preceded(char('.'), digit1))(rest)?;

    let negate = if sign.is_some() { "-" } else { "" };
    let parsed = match frac_part {
        Some(frac) => format!("{}{}.{}", negate, int_part, frac)
            .parse::<f64>()
            .map(Value::Real)
            .map_err(|_| ()),
        None => format!("{}{}", negate, int_part)
            .parse::<i64>()
            .map(Value::Integer)
            .map_err(|_| ()),
    };

    match parsed {
        Ok(v) => Ok((rest, v)),
        Err(_) => Err(nom::Err::Error(nom::error::Error::new(
            input,
            nom::error::ErrorKind::Digit,
        ))),
    }
}

/// Single-quoted string; an embedded quote is escaped by doubling.
fn quoted_string(input: &str) -> IResult<&str, String> {
    let (body, _) = char('\'')(input)?;
    let mut out = String::new();
    let mut chars = body.char_indices();

    loop {
        match chars.next() {
            Some((idx, '\'')) => match chars.clone().next() {
                Some((_, '\'')) => {
                    out.push('\'');
                    chars.next();
                }
                _ => return Ok((&body[idx + 1..], out)),
            },
            Some((_, c)) => out.push(c),
            None => {
                return Err(nom::Err::Failure(nom::error::Error::new(
                    input,
                    nom::error::ErrorKind::Char,
                )))
            }
        }
    }
}

fn identifier(input: &str) -> IResult<&str, &str> {
    let (rest, _) = multispace0(input)?;
    match rest.chars().next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => {
            return Err(nom::Err::Error(nom::error::Error::new(
                rest,
                nom::error::ErrorKind::Alpha,
            )))
        }
    }

    let end = rest
        .char_indices()
        .find(|(_, c)| !c.is_ascii_alphanumeric() && *c != '_')
        .map(|(i, _)| i)
        .unwrap_or(rest.len());

    Ok((&rest[end..], &rest[..end]))
}

/// Match a lowercase keyword at a word boundary, skipping leading space.
fn word<'a>(w: &'static str) -> impl FnMut(&'a str) -> IResult<&'a str, &'a str> {
    move |input: &'a str| {
        let (rest, _) = multispace0(input)?;
        let (rest, matched) = tag(w)(rest)?;
        match rest.chars().next() {
            Some(c) if c.is_ascii_alphanumeric() || c == '_' => Err(nom::Err::Error(
                nom::error::Error::new(input, nom::error::ErrorKind::Tag),
            )),
            _ => Ok((rest, matched)),
        }
    }
}

/// Match a punctuation character, skipping leading space.
fn sym<'a>(c: char) -> impl FnMut(&'a str) -> IResult<&'a str, char> {
    preceded(multispace0, char(c))
}
