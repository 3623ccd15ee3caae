//! Validation of client-to-server frames.
//!
//! The accepted shape is `{"type": "ping" | "subscribe" | "unsubscribe",
//! "payload"?: any}` and nothing else.

use serde_json::Value;
use thiserror::Error;

use crate::domain::ErrorCode;

const ALLOWED_FIELDS: [&str; 2] = ["type", "payload"];

/// Longest client-supplied fragment echoed back in an error
const ECHO_LIMIT: usize = 32;

#[derive(Debug, Clone, PartialEq)]
pub enum ClientMessage {
    Ping(Option<Value>),
    Subscribe(Option<Value>),
    Unsubscribe(Option<Value>),
}

impl ClientMessage {
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Ping(_) => "ping",
            Self::Subscribe(_) => "subscribe",
            Self::Unsubscribe(_) => "unsubscribe",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("Message too large")]
    TooLarge { size: usize, limit: usize },

    #[error("Invalid JSON")]
    InvalidJson,

    #[error("Invalid message format: expected an object")]
    NotAnObject,

    #[error("Invalid message format: missing string field `type`")]
    MissingType,

    #[error("Invalid message format: unknown type `{0}`")]
    UnknownType(String),

    #[error("Invalid message format: unrecognized key `{0}`")]
    UnexpectedField(String),
}

impl ValidationError {
    /// Error code reported to the client
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::TooLarge { .. } => ErrorCode::MessageTooLarge,
            Self::InvalidJson
            | Self::NotAnObject
            | Self::MissingType
            | Self::UnknownType(_)
            | Self::UnexpectedField(_) => ErrorCode::InvalidMessage,
        }
    }
}

/// Check size, syntax and shape of a raw client frame, in that order
pub fn parse_client_message(raw: &str, max_size: usize) -> Result<ClientMessage, ValidationError> {
    if raw.len() > max_size {
        return Err(ValidationError::TooLarge {
            size: raw.len(),
            limit: max_size,
        });
    }

    let value: Value = serde_json::from_str(raw).map_err(|_| ValidationError::InvalidJson)?;

    let Value::Object(mut object) = value else {
        return Err(ValidationError::NotAnObject);
    };

    if let Some(extra) = object.keys().find(|key| !ALLOWED_FIELDS.contains(&key.as_str())) {
        return Err(ValidationError::UnexpectedField(sanitize_for_log(extra, ECHO_LIMIT)));
    }

    let kind = match object.get("type") {
        Some(Value::String(kind)) => kind.clone(),
        _ => return Err(ValidationError::MissingType),
    };
    let payload = object.remove("payload");

    match kind.as_str() {
        "ping" => Ok(ClientMessage::Ping(payload)),
        "subscribe" => Ok(ClientMessage::Subscribe(payload)),
        "unsubscribe" => Ok(ClientMessage::Unsubscribe(payload)),
        other => Err(ValidationError::UnknownType(sanitize_for_log(other, ECHO_LIMIT))),
    }
}

/// Truncate and strip control and non-ASCII characters so client text is safe to log
pub fn sanitize_for_log(value: &str, max_chars: usize) -> String {
    value
        .chars()
        .take(max_chars)
        .filter_map(|c| match c {
            '\n' | '\r' | '\t' => Some(' '),
            ' '..='~' => Some(c),
            _ => None,
        })
        .collect()
}
