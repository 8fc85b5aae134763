//! Error handling module for the FMU settings client.
//!
//! Provides a single error type covering transport failures, HTTP error
//! responses mapped from the server's status codes, and client-side states.

use serde::{Deserialize, Serialize};

/// Error codes as constants to avoid stringly-typed errors.
pub mod codes {
    pub const TRANSPORT_ERROR: &str = "TRANSPORT_ERROR";
    pub const UNAUTHORIZED: &str = "UNAUTHORIZED";
    pub const VALIDATION_ERROR: &str = "VALIDATION_ERROR";
    pub const NOT_FOUND: &str = "NOT_FOUND";
    pub const API_ERROR: &str = "API_ERROR";
    pub const DECODE_ERROR: &str = "DECODE_ERROR";
    pub const SESSION_NOT_READY: &str = "SESSION_NOT_READY";
    pub const CANCELLED: &str = "CANCELLED";
    pub const INVALID_STATE: &str = "INVALID_STATE";
    pub const STORAGE_ERROR: &str = "STORAGE_ERROR";
}

/// Field-level validation error as reported by the server (422).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ValidationError {
    pub loc: Vec<serde_json::Value>,
    pub msg: String,
    #[serde(rename = "type")]
    pub kind: String,
}

impl ValidationError {
    /// Dotted location without the leading `body`/`query`/`path` segment.
    pub fn field(&self) -> String {
        self.loc
            .iter()
            .skip(1)
            .map(|part| match part {
                serde_json::Value::String(s) => s.clone(),
                other => other.to_string(),
            })
            .collect::<Vec<_>>()
            .join(".")
    }
}

/// Error response body of the FMU settings API.
///
/// `detail` is a plain string for business errors and a list of
/// [`ValidationError`] for 422 responses.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ErrorBody {
    #[serde(default)]
    pub detail: Option<serde_json::Value>,
}

impl ErrorBody {
    pub fn detail_text(&self) -> Option<String> {
        match &self.detail {
            Some(serde_json::Value::String(text)) => Some(text.clone()),
            _ => None,
        }
    }

    pub fn validation_errors(&self) -> Vec<ValidationError> {
        self.detail
            .clone()
            .and_then(|detail| serde_json::from_value(detail).ok())
            .unwrap_or_default()
    }
}

/// Client error type.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientError {
    /// Network failure or timeout
    Transport(String),
    /// 401 response
    Unauthorized {
        path: String,
        detail: Option<String>,
    },
    /// 422 response with field-level errors
    Validation(Vec<ValidationError>),
    /// 404 response
    NotFound(String),
    /// Any other non-success response
    Api { status: u16, detail: Option<String> },
    /// Response body did not match the expected shape
    Decode(String),
    /// The session interceptor is not installed yet
    SessionNotReady,
    /// The request was superseded or its owner went away
    Cancelled,
    /// Operation not allowed in the current client state
    InvalidState(String),
    /// Credential persistence failed
    Storage(String),
}

impl ClientError {
    /// Build an error from an HTTP status and the decoded error body.
    pub fn from_response(status: u16, path: &str, body: ErrorBody) -> Self {
        match status {
            401 => ClientError::Unauthorized {
                path: path.to_string(),
                detail: body.detail_text(),
            },
            404 => ClientError::NotFound(
                body.detail_text()
                    .unwrap_or_else(|| format!("{} not found", path)),
            ),
            422 => ClientError::Validation(body.validation_errors()),
            _ => ClientError::Api {
                status,
                detail: body.detail_text(),
            },
        }
    }

    /// Get the HTTP status code behind this error, if any.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            ClientError::Unauthorized { .. } => Some(401),
            ClientError::NotFound(_) => Some(404),
            ClientError::Validation(_) => Some(422),
            ClientError::Api { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Get the error code for this error.
    pub fn error_code(&self) -> &'static str {
        match self {
            ClientError::Transport(_) => codes::TRANSPORT_ERROR,
            ClientError::Unauthorized { .. } => codes::UNAUTHORIZED,
            ClientError::Validation(_) => codes::VALIDATION_ERROR,
            ClientError::NotFound(_) => codes::NOT_FOUND,
            ClientError::Api { .. } => codes::API_ERROR,
            ClientError::Decode(_) => codes::DECODE_ERROR,
            ClientError::SessionNotReady => codes::SESSION_NOT_READY,
            ClientError::Cancelled => codes::CANCELLED,
            ClientError::InvalidState(_) => codes::INVALID_STATE,
            ClientError::Storage(_) => codes::STORAGE_ERROR,
        }
    }

    /// Get the error message.
    pub fn message(&self) -> String {
        match self {
            ClientError::Transport(msg) => msg.clone(),
            ClientError::Unauthorized { path, detail } => detail
                .clone()
                .unwrap_or_else(|| format!("Not authorized for {}", path)),
            ClientError::Validation(errors) => errors
                .iter()
                .map(|e| format!("{}: {}", e.field(), e.msg))
                .collect::<Vec<_>>()
                .join("; "),
            ClientError::NotFound(msg) => msg.clone(),
            ClientError::Api { status, detail } => detail
                .clone()
                .unwrap_or_else(|| format!("Request failed with status code {}", status)),
            ClientError::Decode(msg) => msg.clone(),
            ClientError::SessionNotReady => "Session is not established".to_string(),
            ClientError::Cancelled => "Request was cancelled".to_string(),
            ClientError::InvalidState(msg) => msg.clone(),
            ClientError::Storage(msg) => msg.clone(),
        }
    }

    pub fn is_unauthorized(&self) -> bool {
        matches!(self, ClientError::Unauthorized { .. })
    }
}

impl std::fmt::Display for ClientError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.error_code(), self.message())
    }
}

impl std::error::Error for ClientError {}

impl From<reqwest::Error> for ClientError {
    fn from(err: reqwest::Error) -> Self {
        tracing::error!("Transport error: {:?}", err);
        if err.is_decode() {
            ClientError::Decode(format!("Invalid response body: {}", err))
        } else {
            ClientError::Transport(format!("Transport error: {}", err))
        }
    }
}

impl From<serde_json::Error> for ClientError {
    fn from(err: serde_json::Error) -> Self {
        tracing::error!("JSON error: {:?}", err);
        ClientError::Decode(format!("JSON error: {}", err))
    }
}

impl From<std::io::Error> for ClientError {
    fn from(err: std::io::Error) -> Self {
        tracing::error!("Storage error: {:?}", err);
        ClientError::Storage(format!("Storage error: {}", err))
    }
}
