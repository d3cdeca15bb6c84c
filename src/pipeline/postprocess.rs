//! Post-processing: turn a raw model response into a [`RawAnalysis`].
//!
//! Even well-prompted models wrap JSON in ```` ```json ```` fences, prepend
//! "Here is the analysis:" or leak zero-width characters. These cheap,
//! deterministic rules strip that noise before parsing:
//!
//! 1. Strip invisible Unicode (zero-width spaces, BOM, soft hyphens)
//! 2. Normalise line endings (CRLF → LF)
//! 3. Strip outer Markdown fences
//! 4. Cut everything outside the outermost `{ … }`
//!
//! Parsing is deliberately lenient about the shape of individual claim
//! items: they stay as raw JSON values and the aggregator validates each one,
//! so one bad item never costs the rest of the response.

use crate::error::ItemError;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Map, Value};

/// A parsed model response, before validation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawAnalysis {
    pub chart_type: Option<String>,
    pub title: Option<String>,
    /// Analysis-level relevance, used when an item has none.
    pub relevance_score: Option<Value>,
    /// Claim items exactly as the model sent them.
    pub claims: Vec<Value>,
}

/// Apply all cleanup rules to the raw model output.
pub fn clean_response(input: &str) -> String {
    let s = remove_invisible_chars(input);
    let s = normalise_line_endings(&s);
    let s = strip_markdown_fences(&s);
    extract_outer_object(&s).unwrap_or(s)
}

/// Clean and parse a model response.
///
/// Fails with [`ItemError::MalformedOutput`] when no JSON object can be
/// recovered or when the claim list is not an array.
pub fn parse_analysis(input: &str) -> Result<RawAnalysis, ItemError> {
    let cleaned = clean_response(input);
    let value: Value = serde_json::from_str(&cleaned).map_err(|e| ItemError::MalformedOutput {
        detail: format!("not valid JSON: {e}"),
    })?;
    let Value::Object(obj) = value else {
        return Err(ItemError::MalformedOutput {
            detail: "top-level value is not an object".into(),
        });
    };

    let claims = match obj.get("claims").or_else(|| obj.get("insights")) {
        None | Some(Value::Null) => Vec::new(),
        Some(Value::Array(items)) => items.clone(),
        Some(other) => {
            return Err(ItemError::MalformedOutput {
                detail: format!("'claims' is not an array: {}", type_name(other)),
            })
        }
    };

    Ok(RawAnalysis {
        chart_type: string_field(&obj, "chart_type"),
        title: string_field(&obj, "title"),
        relevance_score: obj.get("relevance_score").cloned(),
        claims,
    })
}

/// A non-empty string field; anything else reads as absent.
pub fn string_field(obj: &Map<String, Value>, key: &str) -> Option<String> {
    obj.get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn type_name(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

// ── Rule 1: Remove invisible Unicode characters ──────────────────────────────

fn remove_invisible_chars(input: &str) -> String {
    input.replace(
        [
            '\u{200B}', '\u{FEFF}', '\u{00AD}', '\u{200C}', '\u{200D}', '\u{2060}',
        ],
        "",
    )
}

// ── Rule 2: Normalise line endings ───────────────────────────────────────────

fn normalise_line_endings(input: &str) -> String {
    input.replace("\r\n", "\n").replace('\r', "\n")
}

// ── Rule 3: Strip outer markdown fences ──────────────────────────────────────

static RE_OUTER_FENCES: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)^```(?:json|JSON)?\s*\n(.*)\n```\s*$").unwrap());

fn strip_markdown_fences(input: &str) -> String {
    let trimmed = input.trim();
    if let Some(caps) = RE_OUTER_FENCES.captures(trimmed) {
        caps[1].to_string()
    } else {
        trimmed.to_string()
    }
}

// ── Rule 4: Keep only the outermost JSON object ──────────────────────────────

fn extract_outer_object(input: &str) -> Option<String> {
    let start = input.find('{')?;
    let end = input.rfind('}')?;
    (end > start).then(|| input[start..=end].to_string())
}
