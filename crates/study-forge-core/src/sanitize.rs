//! Recovery of JSON data from untrusted generative-text output.
//!
//! Model output is treated as hostile input. It may be wrapped in markdown
//! fences, preceded by prose, double-wrapped in a `{"text": "..."}` object,
//! carry undecoded `\uXXXX` sequences, or be truncated mid-value.
//!
//! # Pipeline
//!
//! 1. Strip byte-order marks, zero-width characters, and control characters
//!    other than `\n`, `\r`, `\t`.
//! 2. Remove markdown code fences (keeping the first fenced block's body).
//! 3. Strict JSON decode. On failure, escape raw newlines and tabs inside
//!    string literals, remove trailing commas and retry, then locate balanced
//!    `{...}` / `[...]` regions by bracket matching. The first region holding
//!    an object (or an array of objects) wins; a scalar region such as a
//!    `[1]` citation is used only when nothing better follows.
//! 4. Unwrap single-field `{"text": ...}` wrappers, trying the payload both
//!    as written and with `\uXXXX` escapes decoded. More than
//!    `MAX_WRAPPER_DEPTH` levels is an error.
//! 5. Decode literal `\uXXXX` sequences left inside string values.
//!
//! [`extract_shaped`] additionally enforces the top-level container the
//! artifact expects, unwrapping collection objects such as
//! `{"flashcards": [...]}`.
//!
//! Every scan is a single linear pass with an explicit depth limit; the
//! number of candidate regions tried is capped, so pathological input
//! cannot cause unbounded work.

use serde::Serialize;
use serde_json::Value;
use std::fmt;

use crate::error::ParseError;

/// Maximum bracket nesting accepted while scanning for a JSON region.
pub const MAX_NESTING: usize = 128;

/// Maximum number of candidate regions tried by the bracket-matching fallback.
const MAX_CANDIDATES: usize = 32;

/// Maximum depth of `{"text": ...}` wrapper unwrapping.
const MAX_WRAPPER_DEPTH: usize = 4;

/// Object keys that commonly hold the record array of a wrapped response.
const COLLECTION_KEYS: &[&str] = &[
    "flashcards",
    "questions",
    "quiz",
    "items",
    "sections",
    "notes",
    "data",
];

/// Top-level JSON container expected for an artifact type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Shape {
    Object,
    Array,
}

impl Shape {
    pub fn matches(&self, value: &Value) -> bool {
        match self {
            Shape::Object => value.is_object(),
            Shape::Array => value.is_array(),
        }
    }
}

impl fmt::Display for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Shape::Object => f.write_str("object"),
            Shape::Array => f.write_str("array"),
        }
    }
}

/// Name of a value's JSON type, for error messages.
pub fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Extract the first well-formed JSON value from raw model output.
pub fn extract(raw: &str) -> Result<Value, ParseError> {
    let mut value = extract_inner(raw, 0)?;
    repair_strings(&mut value);
    Ok(value)
}

/// Extract a JSON value and coerce it to `shape`.
///
/// - Array expected, object found: unwrap a known collection key, or the
///   object's only array-valued field.
/// - Object expected, array found: accept a one-element array of an object.
///
/// Anything else is a [`ParseError::ShapeMismatch`].
pub fn extract_shaped(raw: &str, shape: Shape) -> Result<Value, ParseError> {
    let value = extract(raw)?;
    coerce_shape(value, shape)
}

/// Apply the container coercions of [`extract_shaped`] to an already
/// decoded value.
pub fn coerce_shape(value: Value, shape: Shape) -> Result<Value, ParseError> {
    if shape.matches(&value) {
        return Ok(value);
    }

    let found = json_type_name(&value);
    match (shape, value) {
        (Shape::Array, Value::Object(mut map)) => {
            for key in COLLECTION_KEYS {
                if map.get(*key).is_some_and(Value::is_array) {
                    if let Some(inner) = map.remove(*key) {
                        return Ok(inner);
                    }
                }
            }
            let mut arrays = map.into_iter().filter(|(_, v)| v.is_array());
            match (arrays.next(), arrays.next()) {
                (Some((_, inner)), None) => Ok(inner),
                _ => Err(ParseError::ShapeMismatch {
                    expected: shape,
                    found,
                }),
            }
        }
        (Shape::Object, Value::Array(mut items)) if items.len() == 1 && items[0].is_object() => {
            Ok(items.remove(0))
        }
        _ => Err(ParseError::ShapeMismatch {
            expected: shape,
            found,
        }),
    }
}

fn extract_inner(raw: &str, depth: usize) -> Result<Value, ParseError> {
    let value = decode_payload(raw)?;
    unwrap_text_wrapper(value, depth)
}

/// Clean and decode one payload without unwrapping `{"text": ...}`.
fn decode_payload(raw: &str) -> Result<Value, ParseError> {
    let cleaned = strip_invisible(raw);
    let trimmed = cleaned.trim();
    if trimmed.is_empty() {
        return Err(ParseError::Empty);
    }

    // Fences are only stripped when the text is not already valid JSON:
    // a JSON string value may itself contain a fenced block.
    if let Ok(v) = serde_json::from_str::<Value>(trimmed) {
        return Ok(v);
    }
    let body = strip_fences(trimmed).trim();
    if body.is_empty() {
        return Err(ParseError::Empty);
    }
    match decode(body) {
        Ok(v) => Ok(v),
        Err(e) if body.len() != trimmed.len() => decode(trimmed).map_err(|_| e),
        Err(e) => Err(e),
    }
}

/// Unwrap `{"text": <json>}`. Leaves the object alone when the inner value
/// is plain prose rather than JSON, which keeps extraction idempotent.
fn unwrap_text_wrapper(value: Value, depth: usize) -> Result<Value, ParseError> {
    let inner = match &value {
        Value::Object(map) if map.len() == 1 => map.get("text"),
        _ => None,
    };
    let unwrapped = match inner {
        Some(Value::String(s)) => unwrap_string_payload(s, depth)?,
        Some(inner @ (Value::Object(_) | Value::Array(_))) => {
            if depth >= MAX_WRAPPER_DEPTH {
                return Err(ParseError::WrapperTooDeep(MAX_WRAPPER_DEPTH));
            }
            Some(unwrap_text_wrapper(inner.clone(), depth + 1)?)
        }
        _ => None,
    };
    Ok(unwrapped.unwrap_or(value))
}

/// JSON container held in a wrapper's string payload, if any.
///
/// The payload is tried as written, then with literal `\uXXXX` escapes
/// decoded, matching what [`repair_strings`] would turn it into.
fn unwrap_string_payload(payload: &str, depth: usize) -> Result<Option<Value>, ParseError> {
    let decoded = payload
        .contains("\\u")
        .then(|| decode_unicode_escapes(payload));
    let candidates = std::iter::once(payload).chain(decoded.as_deref());

    for candidate in candidates {
        let found = if depth >= MAX_WRAPPER_DEPTH {
            decode_payload(candidate)
        } else {
            extract_inner(candidate, depth + 1)
        };
        match found {
            Ok(v) if v.is_object() || v.is_array() => {
                if depth >= MAX_WRAPPER_DEPTH {
                    return Err(ParseError::WrapperTooDeep(MAX_WRAPPER_DEPTH));
                }
                return Ok(Some(v));
            }
            Err(e @ ParseError::WrapperTooDeep(_)) => return Err(e),
            _ => {}
        }
    }
    Ok(None)
}

fn strip_invisible(raw: &str) -> String {
    raw.chars()
        .filter(|&c| {
            !matches!(c, '\u{feff}' | '\u{200b}' | '\u{200c}' | '\u{200d}' | '\u{2060}')
                && (!c.is_control() || matches!(c, '\n' | '\r' | '\t'))
        })
        .collect()
}

/// Return the body of the first fenced block, or the input unchanged.
fn strip_fences(text: &str) -> &str {
    let Some(open) = text.find("```") else {
        return text;
    };
    let after_open = &text[open + 3..];
    // Skip the info string (`json`, `JSON`, ...) up to the end of the line.
    let body_start = after_open.find('\n').map(|i| i + 1).unwrap_or(0);
    let body = &after_open[body_start..];
    match body.find("```") {
        Some(close) => &body[..close],
        None => body,
    }
}

fn decode(body: &str) -> Result<Value, ParseError> {
    if let Ok(v) = serde_json::from_str::<Value>(body) {
        return Ok(v);
    }

    // Prose quotes can throw off string tracking, so the unescaped text is
    // always tried as well.
    let plain = remove_trailing_commas(body);
    let escaped = remove_trailing_commas(&escape_string_controls(body));
    let mut texts = vec![escaped.as_str()];
    if plain != escaped {
        texts.push(plain.as_str());
    }

    for text in &texts {
        if let Ok(v) = serde_json::from_str::<Value>(text) {
            return Ok(v);
        }
    }

    let mut fallback = None;
    let mut too_deep = false;
    for text in &texts {
        let regions = scan_regions(text);
        if let Some(v) = regions.records {
            return Ok(v);
        }
        if fallback.is_none() {
            fallback = regions.first_other;
        }
        too_deep |= regions.too_deep;
    }

    match fallback {
        Some(v) => Ok(v),
        None if too_deep => Err(ParseError::TooDeep(MAX_NESTING)),
        None => Err(ParseError::NoJson),
    }
}

#[derive(Default)]
struct Regions {
    /// First region holding record data.
    records: Option<Value>,
    /// First region that parsed but holds no records.
    first_other: Option<Value>,
    too_deep: bool,
}

/// Decode balanced `{...}` / `[...]` regions left to right, stopping at the
/// first one that [`holds_records`].
fn scan_regions(text: &str) -> Regions {
    let mut regions = Regions::default();
    let mut from = 0usize;
    for _ in 0..MAX_CANDIDATES {
        let Some(rel) = text[from..].find(|c: char| c == '{' || c == '[') else {
            break;
        };
        let start = from + rel;
        match find_balanced(text, start) {
            Scan::Found(end) => {
                if let Ok(v) = serde_json::from_str::<Value>(&text[start..end]) {
                    if holds_records(&v) {
                        regions.records = Some(v);
                        return regions;
                    }
                    regions.first_other.get_or_insert(v);
                    from = end;
                    continue;
                }
            }
            Scan::TooDeep => regions.too_deep = true,
            Scan::Unbalanced => {}
        }
        from = start + 1;
    }
    regions
}

/// An object, or an array whose elements are all objects.
fn holds_records(value: &Value) -> bool {
    match value {
        Value::Object(_) => true,
        Value::Array(items) => items.iter().all(Value::is_object),
        _ => false,
    }
}

enum Scan {
    /// Exclusive end offset of the balanced region.
    Found(usize),
    Unbalanced,
    TooDeep,
}

/// Match brackets from `start` (which must be `{` or `[`), honouring JSON
/// string literals and escapes.
fn find_balanced(text: &str, start: usize) -> Scan {
    let bytes = text.as_bytes();
    let mut stack: Vec<u8> = Vec::new();
    let mut in_string = false;
    let mut escaped = false;

    for (i, &b) in bytes.iter().enumerate().skip(start) {
        if in_string {
            if escaped {
                escaped = false;
            } else if b == b'\\' {
                escaped = true;
            } else if b == b'"' {
                in_string = false;
            }
            continue;
        }
        match b {
            b'"' => in_string = true,
            b'{' | b'[' => {
                if stack.len() >= MAX_NESTING {
                    return Scan::TooDeep;
                }
                stack.push(if b == b'{' { b'}' } else { b']' });
            }
            b'}' | b']' => {
                if stack.pop() != Some(b) {
                    return Scan::Unbalanced;
                }
                if stack.is_empty() {
                    return Scan::Found(i + 1);
                }
            }
            _ => {}
        }
    }
    Scan::Unbalanced
}

/// Escape raw `\n`, `\r` and `\t` inside string literals.
fn escape_string_controls(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut in_string = false;
    let mut escaped = false;

    for c in text.chars() {
        if in_string {
            if escaped {
                escaped = false;
            } else {
                match c {
                    '\\' => escaped = true,
                    '"' => in_string = false,
                    '\n' => {
                        out.push_str("\\n");
                        continue;
                    }
                    '\r' => {
                        out.push_str("\\r");
                        continue;
                    }
                    '\t' => {
                        out.push_str("\\t");
                        continue;
                    }
                    _ => {}
                }
            }
        } else if c == '"' {
            in_string = true;
        }
        out.push(c);
    }
    out
}

/// Drop commas that directly precede `}` or `]` (outside string literals).
fn remove_trailing_commas(text: &str) -> String {
    let bytes = text.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut in_string = false;
    let mut escaped = false;

    for (i, &b) in bytes.iter().enumerate() {
        if in_string {
            if escaped {
                escaped = false;
            } else if b == b'\\' {
                escaped = true;
            } else if b == b'"' {
                in_string = false;
            }
            out.push(b);
            continue;
        }
        if b == b'"' {
            in_string = true;
        } else if b == b',' {
            let next = bytes[i + 1..].iter().find(|c| !c.is_ascii_whitespace());
            if matches!(next, Some(b'}') | Some(b']')) {
                continue;
            }
        }
        out.push(b);
    }

    // Only ASCII bytes were removed, so the buffer is still valid UTF-8.
    String::from_utf8(out).unwrap_or_else(|e| String::from_utf8_lossy(e.as_bytes()).into_owned())
}

/// Decode literal `\uXXXX` escapes in every string value.
fn repair_strings(value: &mut Value) {
    match value {
        Value::String(s) => {
            if s.contains("\\u") {
                *s = decode_unicode_escapes(s);
            }
        }
        Value::Array(items) => items.iter_mut().for_each(repair_strings),
        Value::Object(map) => map.values_mut().for_each(repair_strings),
        _ => {}
    }
}

/// Replace `\uXXXX` (and surrogate pairs) with the characters they encode.
///
/// Sequences that decode to control characters, backslashes, or invalid
/// code points are left untouched.
fn decode_unicode_escapes(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut rest = s;

    while let Some(pos) = rest.find("\\u") {
        out.push_str(&rest[..pos]);
        let tail = &rest[pos..];
        match parse_escape(tail) {
            Some((c, consumed)) => {
                out.push(c);
                rest = &tail[consumed..];
            }
            None => {
                out.push_str("\\u");
                rest = &tail[2..];
            }
        }
    }
    out.push_str(rest);
    out
}

fn parse_escape(tail: &str) -> Option<(char, usize)> {
    let hi = hex4(tail.get(2..6)?)?;
    let (code, consumed) = if (0xD800..0xDC00).contains(&hi) {
        let lo_part = tail.get(6..12)?;
        if !lo_part.starts_with("\\u") {
            return None;
        }
        let lo = hex4(&lo_part[2..])?;
        if !(0xDC00..0xE000).contains(&lo) {
            return None;
        }
        (0x10000 + ((hi - 0xD800) << 10) + (lo - 0xDC00), 12)
    } else {
        (hi, 6)
    };
    let c = char::from_u32(code)?;
    if c.is_control() || c == '\\' {
        return None;
    }
    Some((c, consumed))
}

fn hex4(s: &str) -> Option<u32> {
    if s.len() != 4 || !s.bytes().all(|b| b.is_ascii_hexdigit()) {
        return None;
    }
    u32::from_str_radix(s, 16).ok()
}
