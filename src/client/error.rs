//! Normalized API errors.
//!
//! Every failed call surfaces as an [`ApiError`] carrying a numeric status
//! and a human-readable message, whatever went wrong underneath.

use serde_json::Value;
use thiserror::Error;

/// Status reported when no response was received at all.
pub const TRANSPORT_STATUS: u16 = 500;

/// Broad classification of a failed call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// No response received (connect failure, timeout, body read error).
    Transport,
    /// The backend answered 4xx.
    Client,
    /// The backend answered 5xx or another non-success status.
    Server,
    /// The session is gone and could not be renewed.
    SessionInvalid,
    /// A success response whose body did not match the expected shape.
    Decode,
}

/// Error returned by every client call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message} (status {status})")]
pub struct ApiError {
    pub status: u16,
    pub message: String,
    pub kind: ErrorKind,
}

pub type ApiResult<T> = Result<T, ApiError>;

impl ApiError {
    /// A call that never got a response.
    pub fn transport(err: &reqwest::Error) -> Self {
        let text = err.to_string();
        Self {
            status: TRANSPORT_STATUS,
            message: resolve_message(None, &[], Some(&text)),
            kind: ErrorKind::Transport,
        }
    }

    /// A non-success response.
    pub fn from_response(status: u16, body: &[u8]) -> Self {
        let kind = if (400..500).contains(&status) {
            ErrorKind::Client
        } else {
            ErrorKind::Server
        };
        Self {
            status,
            message: resolve_message(Some(status), body, None),
            kind,
        }
    }

    /// The session is unrecoverable (no refresh token, refresh rejected, second 401).
    pub fn session_invalid(status: u16, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
            kind: ErrorKind::SessionInvalid,
        }
    }

    pub fn decode(status: u16, err: &serde_json::Error) -> Self {
        Self {
            status,
            message: format!("unexpected response body: {}", err),
            kind: ErrorKind::Decode,
        }
    }

    /// Mark an error as a terminal session failure, keeping status and message.
    pub fn into_session_invalid(self) -> Self {
        Self {
            kind: ErrorKind::SessionInvalid,
            ..self
        }
    }
}

/// Fixed message for well-known statuses.
pub fn status_message(status: u16) -> Option<&'static str> {
    match status {
        400 => Some("bad request"),
        401 => Some("unauthorized"),
        403 => Some("forbidden"),
        404 => Some("not found"),
        422 => Some("invalid input"),
        500 => Some("internal server error"),
        _ => None,
    }
}

/// Pick the message shown to the user.
///
/// Priority: backend `detail` → backend `message` → raw string body →
/// fixed message for the status → transport error text.
pub fn resolve_message(status: Option<u16>, body: &[u8], transport: Option<&str>) -> String {
    if let Some(message) = message_from_body(body) {
        return message;
    }
    if let Some(message) = status.and_then(status_message) {
        return message.to_string();
    }
    if let Some(text) = transport.filter(|t| !t.is_empty()) {
        return text.to_string();
    }
    match status {
        Some(status) => format!("request failed with status code {}", status),
        None => "unknown error".to_string(),
    }
}

fn message_from_body(body: &[u8]) -> Option<String> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return None;
    }

    match serde_json::from_slice::<Value>(body) {
        Ok(Value::Object(map)) => ["detail", "message"]
            .iter()
            .find_map(|field| map.get(*field).and_then(render_field)),
        Ok(Value::String(s)) if !s.is_empty() => Some(s),
        Ok(_) => None,
        Err(_) => Some(String::from_utf8_lossy(body).into_owned()),
    }
}

/// Render a `detail`/`message` value; empty and null values don't count.
fn render_field(value: &Value) -> Option<String> {
    match value {
        Value::Null | Value::Bool(false) => None,
        Value::String(s) if s.is_empty() => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}
