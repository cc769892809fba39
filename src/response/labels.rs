//! Label set parsing and formatting
//!
//! Parses label strings such as `{job="app", level="error"}` as the legacy
//! API returns them.

use nom::{
    branch::alt,
    bytes::complete::take_while1,
    character::complete::{anychar, char, multispace0, none_of},
    combinator::{all_consuming, map},
    multi::{fold_many0, separated_list0},
    sequence::{delimited, preceded, separated_pair},
    IResult,
};
use std::collections::BTreeMap;

use super::error::{ResponseError, ResponseResult};

/// Ordered label set
pub type Labels = BTreeMap<String, String>;

/// Parse a `{name="value", ...}` label string
pub fn parse_labels(input: &str) -> ResponseResult<Labels> {
    let input = input.trim();
    if input.is_empty() {
        return Ok(Labels::new());
    }

    match all_consuming(parse_label_set)(input) {
        Ok((_, pairs)) => Ok(pairs.into_iter().collect()),
        Err(e) => Err(ResponseError::InvalidLabels(format!("{input}: {e:?}"))),
    }
}

/// Render labels as an exact-match selector, e.g. `{job="app", level="error"}`
pub fn format_labels(labels: &Labels) -> String {
    let terms: Vec<String> = labels
        .iter()
        .map(|(name, value)| format!("{}=\"{}\"", name, escape_label_value(value)))
        .collect();
    format!("{{{}}}", terms.join(", "))
}

/// Escape `\` and `"` so a value can sit inside a quoted matcher
pub fn escape_label_value(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}

fn parse_label_set(input: &str) -> IResult<&str, Vec<(String, String)>> {
    delimited(
        preceded(char('{'), multispace0),
        separated_list0(
            delimited(multispace0, char(','), multispace0),
            parse_label_pair,
        ),
        preceded(multispace0, char('}')),
    )(input)
}

fn parse_label_pair(input: &str) -> IResult<&str, (String, String)> {
    map(
        separated_pair(
            parse_label_name,
            delimited(multispace0, char('='), multispace0),
            parse_quoted,
        ),
        |(name, value)| (name.to_string(), value),
    )(input)
}

fn parse_label_name(input: &str) -> IResult<&str, &str> {
    take_while1(|c: char| c.is_ascii_alphanumeric() || c == '_' || c == '.')(input)
}

fn parse_quoted(input: &str) -> IResult<&str, String> {
    delimited(
        char('"'),
        fold_many0(
            alt((none_of("\\\""), preceded(char('\\'), map(anychar, unescape)))),
            String::new,
            |mut acc, c| {
                acc.push(c);
                acc
            },
        ),
        char('"'),
    )(input)
}

fn unescape(c: char) -> char {
    match c {
        'n' => '\n',
        't' => '\t',
        other => other,
    }
}
