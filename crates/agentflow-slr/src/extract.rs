//! Recovery of a JSON object from free-form stage output.
//!
//! Stage agents are asked for JSON but answer with whatever they like:
//! bare JSON, a markdown fence after some prose, or an object buried in a
//! paragraph. The strategies below are tried in order and the first one that
//! yields an object wins.

use regex::Regex;
use serde_json::{Map, Value};

/// Characters of raw output kept on a failure.
pub const RAW_EXCERPT_CHARS: usize = 200;

type Object = Map<String, Value>;
type Strategy = fn(&str) -> Result<Object, String>;

const STRATEGIES: &[(&str, Strategy)] = &[
    ("direct", parse_direct),
    ("fenced", parse_fenced),
    ("brace_span", parse_brace_span),
];

#[derive(Debug, Clone, PartialEq)]
pub struct ParseFailure {
    pub error: String,
    /// Leading part of the raw output.
    pub raw_excerpt: String,
}

/// Extract a JSON object from `raw`.
pub fn extract_structured(raw: &str) -> Result<Object, ParseFailure> {
    extract_with_strategy(raw).map(|(_, obj)| obj)
}

/// Like [`extract_structured`], also naming the strategy that matched.
pub fn extract_with_strategy(raw: &str) -> Result<(&'static str, Object), ParseFailure> {
    let text = raw.trim();
    let mut first_error = None;
    for &(name, strategy) in STRATEGIES {
        match strategy(text) {
            Ok(obj) => return Ok((name, obj)),
            Err(e) if first_error.is_none() => first_error = Some(e),
            Err(_) => {}
        }
    }
    Err(ParseFailure {
        error: format!(
            "No JSON object found in stage output: {}",
            first_error.unwrap_or_else(|| "empty output".to_string())
        ),
        raw_excerpt: raw.chars().take(RAW_EXCERPT_CHARS).collect(),
    })
}

fn as_object(value: Value) -> Result<Object, String> {
    match value {
        Value::Object(obj) => Ok(obj),
        other => Err(format!("expected a JSON object, found {}", kind(&other))),
    }
}

fn kind(v: &Value) -> &'static str {
    match v {
        Value::Null      => "null",
        Value::Bool(_)   => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_)  => "an array",
        Value::Object(_) => "an object",
    }
}

fn parse_direct(text: &str) -> Result<Object, String> {
    serde_json::from_str(text).map_err(|e| e.to_string()).and_then(as_object)
}

fn fence_regex() -> &'static Regex {
    use std::sync::OnceLock;
    static RE: OnceLock<Regex> = OnceLock::new();
    // ```json\n{...}\n``` with an optional language tag
    RE.get_or_init(|| Regex::new(r"(?s)```[A-Za-z0-9_+-]*[ \t]*\r?\n?(.*?)```").unwrap())
}

fn parse_fenced(text: &str) -> Result<Object, String> {
    fence_regex()
        .captures_iter(text)
        .filter_map(|c| c.get(1))
        .find_map(|m| parse_direct(m.as_str().trim()).ok())
        .ok_or_else(|| "no fenced JSON block".to_string())
}

fn parse_brace_span(text: &str) -> Result<Object, String> {
    brace_spans(text)
        .into_iter()
        .find_map(|span| parse_direct(span).ok())
        .ok_or_else(|| "no brace-delimited object".to_string())
}

/// Balanced top-level `{...}` spans, skipping braces inside string literals.
fn brace_spans(text: &str) -> Vec<&str> {
    let mut spans = Vec::new();
    let mut depth = 0usize;
    let mut start = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (i, c) in text.char_indices() {
        if in_string {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match c {
            '"' if depth > 0 => in_string = true,
            '{' => {
                if depth == 0 {
                    start = i;
                }
                depth += 1;
            }
            '}' if depth > 0 => {
                depth -= 1;
                if depth == 0 {
                    spans.push(&text[start..=i]);
                }
            }
            _ => {}
        }
    }
    spans
}
