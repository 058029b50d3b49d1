//! Response normalization
//!
//! The backend has answered in several shapes over time: a bare text
//! stream, text starting with an error prefix, or a JSON record with
//! `output`/`error` fields. `normalize` folds all of them into one
//! `ExecutionResult`. It is a pure function of the raw response.
//!
//! Rules, first match wins:
//! 1. non-2xx status: `Error`, message from the record's `error` field or
//!    from the status line and body text
//! 2. JSON record with `error`: `Error`
//! 3. JSON record with `output`: `Accepted`, metrics copied when present
//! 4. anything else: the body is the output, `Error` if it starts with a
//!    known error prefix

use serde::Deserialize;
use serde_json::Value;

use super::status::ExecutionResult;

/// Prefixes the plain-text backend uses to report failures
pub const ERROR_PREFIXES: [&str; 2] = ["Error:", "Server Error:"];

/// Structured body shape; every field is optional
#[derive(Debug, Default, Deserialize)]
struct WireRecord {
    #[serde(default)]
    output: Option<Value>,
    #[serde(default)]
    error: Option<Value>,
    #[serde(default, rename = "executionTime", alias = "execution_time", alias = "time")]
    execution_time: Option<Value>,
    #[serde(default, rename = "memoryUsed", alias = "memory_used", alias = "memory")]
    memory_used: Option<Value>,
}

impl WireRecord {
    /// Parse `text` as a JSON object; other JSON values are not records
    fn parse(text: &str) -> Option<Self> {
        match serde_json::from_str::<Value>(text) {
            Ok(value @ Value::Object(_)) => serde_json::from_value(value).ok(),
            _ => None,
        }
    }

    fn error(&self) -> Option<String> {
        field_text(&self.error)
    }

    fn output(&self) -> Option<String> {
        field_text(&self.output)
    }
}

/// Render a JSON field as display text; `null` counts as absent
fn field_text(value: &Option<Value>) -> Option<String> {
    match value {
        None | Some(Value::Null) => None,
        Some(Value::String(s)) => Some(s.clone()),
        Some(other) => Some(other.to_string()),
    }
}

fn is_success(status: u16) -> bool {
    (200..300).contains(&status)
}

fn reason_phrase(status: u16) -> &'static str {
    reqwest::StatusCode::from_u16(status)
        .ok()
        .and_then(|s| s.canonical_reason())
        .unwrap_or("")
}

/// Rule 1: the record's `error` field, else the status line and body text
fn status_error(status: u16, text: &str) -> ExecutionResult {
    if let Some(message) = WireRecord::parse(text).and_then(|r| r.error()) {
        return ExecutionResult::error(message);
    }

    let mut message = format!("Server responded with HTTP {}", status);
    let reason = reason_phrase(status);
    if !reason.is_empty() {
        message.push(' ');
        message.push_str(reason);
    }
    let detail = text.trim();
    if !detail.is_empty() {
        message.push_str(": ");
        message.push_str(detail);
    }
    ExecutionResult::error(message)
}

/// Troubleshooting text appended to every connection failure
pub fn connection_help(endpoint: &str) -> String {
    format!(
        "Could not get a usable response from the execution server at {}. \
         Check that the backend is running and reachable, and that RUNPAD_API_URL points to it.",
        endpoint
    )
}

/// Normalize a backend reply into an `ExecutionResult`.
///
/// `endpoint` is only used to word the troubleshooting message when a
/// successful reply's body cannot be decoded.
pub fn normalize(status: u16, body: &[u8], endpoint: &str) -> ExecutionResult {
    if !is_success(status) {
        return status_error(status, &String::from_utf8_lossy(body));
    }

    let text = match std::str::from_utf8(body) {
        Ok(text) => text,
        Err(e) => {
            return ExecutionResult::connection_error(format!(
                "{} (response could not be read: {})",
                connection_help(endpoint),
                e
            ));
        }
    };

    if let Some(record) = WireRecord::parse(text) {
        if let Some(message) = record.error() {
            return ExecutionResult::error(message);
        }
        if let Some(output) = record.output() {
            return ExecutionResult::accepted(output).with_metrics(
                field_text(&record.execution_time),
                field_text(&record.memory_used),
            );
        }
    }

    if ERROR_PREFIXES.iter().any(|p| text.starts_with(p)) {
        ExecutionResult::error(text)
    } else {
        ExecutionResult::accepted(text)
    }
}
