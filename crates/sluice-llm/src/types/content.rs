use serde::{Deserialize, Serialize};

use super::tool::{ToolCall, ToolResult};

/// One ordered piece of a message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    Text {
        text: String,
    },

    /// Model thinking captured from an earlier turn
    Reasoning {
        thinking: String,
    },

    ImageUrl {
        url: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        detail: Option<String>,
    },

    /// Raw attachment bytes (sent as a data URL when the MIME type is an image)
    Binary {
        path: String,
        mime_type: String,
        data: Vec<u8>,
    },

    ToolCall(ToolCall),

    ToolResult(ToolResult),

    Finish {
        reason: String,
    },
}

impl ContentPart {
    pub fn text(s: impl Into<String>) -> Self {
        Self::Text { text: s.into() }
    }

    pub fn image_url(url: impl Into<String>) -> Self {
        Self::ImageUrl {
            url: url.into(),
            detail: None,
        }
    }

    /// Short name used in conversion notes and logs
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Text { .. } => "text",
            Self::Reasoning { .. } => "reasoning",
            Self::ImageUrl { .. } => "image_url",
            Self::Binary { .. } => "binary",
            Self::ToolCall(_) => "tool_call",
            Self::ToolResult(_) => "tool_result",
            Self::Finish { .. } => "finish",
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text { text } => Some(text),
            _ => None,
        }
    }
}

impl From<&str> for ContentPart {
    fn from(s: &str) -> Self {
        Self::text(s)
    }
}

impl From<String> for ContentPart {
    fn from(s: String) -> Self {
        Self::Text { text: s }
    }
}
