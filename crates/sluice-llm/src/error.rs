use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum LlmError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid model descriptor: {0}")]
    InvalidModel(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("Received empty response from the API, check the endpoint configuration")]
    EmptyResponse,
}

pub type Result<T> = std::result::Result<T, LlmError>;

/// Classification of a failed stream, carried by the terminal error event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StreamErrorKind {
    /// Connection failure, timeout or broken body.
    Transport,
    /// The caller's cancellation token fired.
    Cancelled,
    /// Unparsable JSON or a choice missing required fields.
    MalformedPayload,
    /// The provider answered with an explicit error.
    Upstream,
}

#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[error("{kind:?}: {message}")]
pub struct StreamError {
    pub kind: StreamErrorKind,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
}

impl StreamError {
    pub fn transport(message: impl Into<String>) -> Self {
        Self {
            kind: StreamErrorKind::Transport,
            message: message.into(),
            status: None,
        }
    }

    pub fn cancelled() -> Self {
        Self {
            kind: StreamErrorKind::Cancelled,
            message: "request cancelled".to_string(),
            status: None,
        }
    }

    pub fn malformed(message: impl Into<String>) -> Self {
        Self {
            kind: StreamErrorKind::MalformedPayload,
            message: message.into(),
            status: None,
        }
    }

    pub fn upstream(status: Option<u16>, message: impl Into<String>) -> Self {
        Self {
            kind: StreamErrorKind::Upstream,
            message: message.into(),
            status,
        }
    }

    /// Whether retrying the same call could succeed.
    pub fn is_transient(&self) -> bool {
        match self.kind {
            StreamErrorKind::Transport => true,
            StreamErrorKind::Cancelled | StreamErrorKind::MalformedPayload => false,
            StreamErrorKind::Upstream => matches!(
                self.status,
                Some(408) | Some(409) | Some(429) | Some(500..=599)
            ),
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.kind == StreamErrorKind::Cancelled
    }
}

impl From<LlmError> for StreamError {
    fn from(err: LlmError) -> Self {
        match err {
            LlmError::Http(e) => Self::transport(e.to_string()),
            LlmError::Json(e) => Self::malformed(e.to_string()),
            LlmError::Api { status, message } => Self::upstream(Some(status), message),
            LlmError::EmptyResponse => Self::upstream(None, LlmError::EmptyResponse.to_string()),
            other @ (LlmError::InvalidModel(_) | LlmError::InvalidConfig(_)) => {
                Self::upstream(None, other.to_string())
            }
        }
    }
}
