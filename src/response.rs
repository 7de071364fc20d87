//! Recovery and validation of file operations from raw LLM responses.
//!
//! Models are asked to answer with a JSON array of
//! `{ "operation", "file_path", "file_content" }` objects. In practice the
//! array arrives wrapped in a markdown fence, surrounded by prose, or cut off
//! when the model hits its output limit. [`parse_response`] picks the most
//! likely JSON candidate, parses it strictly, and falls back to a single
//! structural repair pass when the array was truncated.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use tracing::{debug, warn};

const JSON_FENCE: &str = "```json";
const FENCE: &str = "```";

/// Kind of change requested for a file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    /// Write a new file
    Create,
    /// Replace an existing file
    Update,
    /// Remove a file
    Delete,
}

impl Operation {
    fn parse(name: &str) -> Option<Self> {
        match name {
            "create" => Some(Self::Create),
            "update" => Some(Self::Update),
            "delete" => Some(Self::Delete),
            _ => None,
        }
    }

    /// Returns true if the operation writes content.
    #[must_use]
    pub const fn requires_content(self) -> bool {
        matches!(self, Self::Create | Self::Update)
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Create => write!(f, "create"),
            Self::Update => write!(f, "update"),
            Self::Delete => write!(f, "delete"),
        }
    }
}

/// One validated instruction extracted from a response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileOperation {
    /// Requested change
    pub operation: Operation,

    /// Target path, relative to the step's output folder
    pub file_path: String,

    /// New content; always `Some` and non-empty for create/update, `None` for delete
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_content: Option<String>,
}

/// Result of parsing one response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedResponse {
    /// Operations in response order
    pub operations: Vec<FileOperation>,

    /// The array only parsed after truncation repair
    pub recovered: bool,

    /// The raw text does not end with `]`, so the model may have stopped early
    pub tail_suspect: bool,
}

impl ParsedResponse {
    /// Returns true if the result should be audited before being trusted.
    #[must_use]
    pub const fn is_suspect(&self) -> bool {
        self.recovered || self.tail_suspect
    }
}

/// Parses and validates the file operations in a raw LLM response.
///
/// # Errors
///
/// Returns [`Error::MalformedResponse`] if no JSON array can be recovered,
/// and [`Error::OperationValidation`] if any element is invalid. In both
/// cases no operation is returned.
pub fn parse_response(raw: &str) -> Result<ParsedResponse> {
    let (value, recovered) = match parse_candidate(raw) {
        Ok(value) => (value, false),
        Err((candidate, e)) => {
            debug!("Strict parse failed ({}), attempting truncation repair", e);
            let repaired = repair_truncated(candidate)
                .ok_or_else(|| Error::malformed_response("no complete JSON element found", raw))?;
            let value = serde_json::from_str::<Value>(&repaired).map_err(|e| {
                Error::malformed_response(format!("invalid JSON after repair: {e}"), raw)
            })?;
            (value, true)
        }
    };

    let operations = validate(value, raw)?;

    if recovered {
        warn!(
            "LLM response was truncated; recovered {} complete operation(s)",
            operations.len()
        );
    }

    let tail_suspect = ends_abruptly(raw);
    if tail_suspect {
        warn!("LLM response appears truncated: last character is not ']'");
    }

    Ok(ParsedResponse {
        operations,
        recovered,
        tail_suspect,
    })
}

/// Strictly parses the whole response, then the extracted candidate.
///
/// On failure returns the candidate that repair should work on.
fn parse_candidate(raw: &str) -> std::result::Result<Value, (&str, serde_json::Error)> {
    if let Ok(value) = serde_json::from_str::<Value>(raw.trim()) {
        return Ok(value);
    }

    let candidate = extract_candidate(raw);
    serde_json::from_str::<Value>(candidate).map_err(|e| (candidate, e))
}

/// Picks the text most likely to hold the JSON array.
///
/// Preference order: the body of a ```` ```json ```` fence (everything after
/// the fence if it is never closed), then the first `[{ ... }]` span, then the
/// trimmed text. Fences only count at the start of a line; a JSON string
/// cannot hold a raw newline, so fences quoted inside `file_content` never do.
fn extract_candidate(raw: &str) -> &str {
    if let Some(body) = fenced_body(raw) {
        return body.trim();
    }

    if let Some(span) = array_of_objects_span(raw) {
        return span;
    }

    raw.trim()
}

/// Returns the text between a line opening with ```` ```json ```` and the
/// next line opening with ```` ``` ````, or through the end if none follows.
fn fenced_body(raw: &str) -> Option<&str> {
    let mut offset = 0;
    let mut body_start = None;

    for line in raw.split_inclusive('\n') {
        let fence = line.trim_start();
        match body_start {
            None => {
                if let Some(rest) = fence.strip_prefix(JSON_FENCE) {
                    // anything after the tag on the same line belongs to the body
                    body_start = Some(offset + line.len() - rest.len());
                }
            }
            Some(start) => {
                if fence.starts_with(FENCE) {
                    return Some(&raw[start..offset]);
                }
            }
        }
        offset += line.len();
    }

    body_start.map(|start| &raw[start..])
}

/// Finds the first `[{` and returns the span through the `]` closing it.
fn array_of_objects_span(raw: &str) -> Option<&str> {
    let start = raw
        .match_indices('[')
        .map(|(i, _)| i)
        .find(|&i| raw[i + 1..].trim_start().starts_with('{'))?;

    let end = scan_array(&raw[start..]).array_end?;
    Some(&raw[start..=start + end])
}

/// Structural landmarks of a JSON array, as byte offsets into the scanned text.
#[derive(Debug, Default)]
struct ArrayScan {
    /// Closing brace of the last complete top-level element
    last_element_end: Option<usize>,

    /// Bracket closing the array itself
    array_end: Option<usize>,
}

/// Walks `text`, which must start with `[`, tracking nesting depth and
/// string literals so that brackets inside `file_content` never count.
fn scan_array(text: &str) -> ArrayScan {
    let mut scan = ArrayScan::default();
    let mut depth = 0usize;
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
            '"' => in_string = true,
            '[' | '{' => depth += 1,
            '}' => {
                depth = depth.saturating_sub(1);
                if depth == 1 {
                    scan.last_element_end = Some(i);
                }
            }
            ']' => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    scan.array_end = Some(i);
                    break;
                }
            }
            _ => {}
        }
    }

    scan
}

/// Cuts a truncated array back to its last complete element.
///
/// If the array is closed the text is cut at its `]`, dropping anything
/// after it. Otherwise it is cut after the last complete element and a `]`
/// is appended.
fn repair_truncated(candidate: &str) -> Option<String> {
    let start = candidate.find('[')?;
    let body = &candidate[start..];

    match scan_array(body) {
        ArrayScan {
            array_end: Some(end),
            ..
        } => Some(body[..=end].to_string()),
        ArrayScan {
            last_element_end: Some(end),
            ..
        } => Some(format!("{}]", &body[..=end])),
        _ => None,
    }
}

fn validate(value: Value, raw: &str) -> Result<Vec<FileOperation>> {
    let Value::Array(elements) = value else {
        return Err(Error::malformed_response("expected a JSON array of operations", raw));
    };

    elements
        .into_iter()
        .enumerate()
        .map(|(index, element)| validate_element(index, element))
        .collect()
}

fn validate_element(index: usize, element: Value) -> Result<FileOperation> {
    let Value::Object(mut fields) = element else {
        return Err(Error::operation(index, "element is not an object"));
    };

    let operation = match fields.get("operation") {
        Some(Value::String(name)) => Operation::parse(name)
            .ok_or_else(|| Error::operation(index, format!("unknown operation '{name}'")))?,
        Some(_) => return Err(Error::operation(index, "operation is not a string")),
        None => return Err(Error::operation(index, "missing operation")),
    };

    let file_path = match fields.remove("file_path") {
        Some(Value::String(path)) if !path.trim().is_empty() => path,
        Some(Value::String(_)) => return Err(Error::operation(index, "empty file_path")),
        Some(_) => return Err(Error::operation(index, "file_path is not a string")),
        None => return Err(Error::operation(index, "missing file_path")),
    };

    let file_content = if operation.requires_content() {
        match fields.remove("file_content") {
            Some(Value::String(content)) if !content.is_empty() => Some(content),
            Some(Value::String(_)) => {
                return Err(Error::operation(
                    index,
                    format!("empty file_content for {operation}"),
                ));
            }
            Some(_) => return Err(Error::operation(index, "file_content is not a string")),
            None => {
                return Err(Error::operation(
                    index,
                    format!("missing file_content for {operation}"),
                ));
            }
        }
    } else {
        None
    };

    Ok(FileOperation {
        operation,
        file_path,
        file_content,
    })
}

/// A closing fence on its own last line is ignored; anything else must end with `]`.
fn ends_abruptly(raw: &str) -> bool {
    let mut tail = raw.trim_end();
    let last_line_start = tail.rfind('\n').map_or(0, |i| i + 1);
    if tail[last_line_start..].trim() == FENCE {
        tail = tail[..last_line_start].trim_end();
    }
    !tail.ends_with(']')
}
