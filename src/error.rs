use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error classes reported by the upstream service in `error` events.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum UpstreamErrorType {
    InvalidRequestError,
    RateLimitError,
    AuthenticationError,
    ServerError,
    SessionExpired,
    #[serde(other)]
    Unknown,
}

/// Error payload attached to upstream `error` events and failed
/// transcriptions.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct UpstreamError {
    #[serde(rename = "type")]
    pub error_type: Option<UpstreamErrorType>,
    pub code: Option<String>,
    pub message: Option<String>,
    pub param: Option<String>,
    pub event_id: Option<String>,
}

impl fmt::Display for UpstreamError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let message = self.message.as_deref().unwrap_or("unknown upstream error");
        match &self.code {
            Some(code) => write!(f, "{message} (code: {code})"),
            None => write!(f, "{message}"),
        }
    }
}

#[derive(Error, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("WebSocket error: {0}")]
    Connection(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("Failed to parse or serialize JSON: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("HTTP protocol error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Invalid URL: {0}")]
    Url(#[from] url::ParseError),

    #[error("Header error: {0}")]
    Header(#[from] reqwest::header::InvalidHeaderValue),

    #[error("Unknown tool: {0}")]
    UnknownTool(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Tool execution failed: {0}")]
    ToolExecution(String),

    #[error("Tool call timed out after {0:?}")]
    Timeout(Duration),

    #[error("Circuit open for downstream client {0}")]
    CircuitOpen(String),

    #[error("Upstream error: {0}")]
    Upstream(UpstreamError),

    #[error("The connection was closed")]
    ConnectionClosed,

    #[error("Invalid client event: {0}")]
    InvalidClientEvent(String),
}

impl Error {
    /// Stable snake_case tag carried in function-call error payloads.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Configuration(_) => "configuration_error",
            Self::Connection(_) => "connection_error",
            Self::Decode(_) => "decode_error",
            Self::Http(_) | Self::ToolExecution(_) => "tool_execution_error",
            Self::Url(_) | Self::Header(_) => "internal_error",
            Self::UnknownTool(_) => "unknown_tool",
            Self::InvalidArgument(_) => "invalid_argument",
            Self::Timeout(_) => "timeout",
            Self::CircuitOpen(_) => "circuit_open",
            Self::Upstream(_) => "upstream_error",
            Self::ConnectionClosed => "connection_closed",
            Self::InvalidClientEvent(_) => "invalid_client_event",
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
