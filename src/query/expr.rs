//! Expression handling
//!
//! Extracts the stream selector and the optional legacy regex from a
//! textual query, and escapes values before they are spliced into one.

use regex::Regex;
use std::sync::OnceLock;

/// Selector and legacy regex of a query expression
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedQuery {
    /// Stream selector; the whole expression when it carries a pipeline
    pub selector: String,
    /// Old-style trailing regex, empty when absent
    pub regex: String,
}

fn selector_regex() -> &'static Regex {
    static SELECTOR: OnceLock<Regex> = OnceLock::new();
    SELECTOR.get_or_init(|| Regex::new(r"(?:^|\s)\{[^{]*\}").expect("valid selector regex"))
}

fn pipeline_regex() -> &'static Regex {
    static PIPELINE: OnceLock<Regex> = OnceLock::new();
    PIPELINE.get_or_init(|| Regex::new(r"\|=|\|~|!=|!~").expect("valid pipeline regex"))
}

/// Split an expression into selector and legacy regex.
///
/// Text after the selector is only treated as a legacy regex when it has
/// no line-filter operator; otherwise the expression is kept whole.
pub fn parse_query(input: &str) -> ParsedQuery {
    let Some(selector) = selector_regex().find(input) else {
        return ParsedQuery {
            selector: input.to_string(),
            regex: String::new(),
        };
    };

    let remainder = selector_regex().replace_all(input, "");
    let remainder = remainder.trim();

    if !remainder.is_empty() && !pipeline_regex().is_match(remainder) {
        ParsedQuery {
            selector: selector.as_str().trim().to_string(),
            regex: remainder.to_string(),
        }
    } else {
        ParsedQuery {
            selector: input.to_string(),
            regex: String::new(),
        }
    }
}


const REGEX_META: &[char] = &[
    '\\', '$', '^', '*', '{', '}', '[', ']', '+', '?', '.', '(', ')', '|',
];

/// Escape regex metacharacters so `value` matches only itself
pub fn escape_regex(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        if REGEX_META.contains(&c) {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

/// Escape a value for use inside a regex matcher within a quoted string,
/// i.e. regex escaping followed by string-literal escaping.
pub fn special_regex_escape(value: &str) -> String {
    escape_regex(value).replace('\\', "\\\\")
}

/// Escape single quotes for plain (non-regex) substitution
pub fn regular_escape(value: &str) -> String {
    value.replace('\'', "\\\\'")
}
