//! Structured message content
//!
//! Stored message text is either plain prose or one of the JSON shapes below.
//! The `type` tag selects the variant; anything that fails to decode into one
//! of them is a [`ContentError`], never a panic.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

/// Outcome of a tool invocation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolStatus {
    Success,
    Error,
}

impl ToolStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ToolStatus::Success => "success",
            ToolStatus::Error => "error",
        }
    }
}

/// One call inside a `tool_calls` payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallEntry {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub name: String,
    pub parameters: Map<String, Value>,
}

impl ToolCallEntry {
    pub fn new(id: impl Into<String>, name: impl Into<String>, parameters: Map<String, Value>) -> Self {
        Self {
            id: Some(id.into()),
            name: name.into(),
            parameters,
        }
    }
}

/// Typed message content, one variant per wire shape
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StructuredContent {
    Text {
        text: String,
    },
    ToolCall {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        id: Option<String>,
        name: String,
        parameters: Map<String, Value>,
    },
    ToolCalls {
        calls: Vec<ToolCallEntry>,
    },
    ToolResult {
        tool_call_id: String,
        status: ToolStatus,
        message: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        payload: Option<Value>,
    },
    DataRequest {
        fields: Vec<String>,
    },
    DataResponse {
        data: Map<String, Value>,
    },
    Error {
        message: String,
        #[serde(
            rename = "originalContent",
            default,
            skip_serializing_if = "Option::is_none"
        )]
        original_content: Option<String>,
    },
}

/// Why raw text could not be decoded as structured content
#[derive(Debug, Error)]
pub enum ContentError {
    #[error("malformed JSON: {0}")]
    Malformed(#[source] serde_json::Error),
    #[error("unrecognized content shape: {0}")]
    Shape(#[source] serde_json::Error),
    #[error("{0}")]
    Invalid(String),
}

impl StructuredContent {
    /// Cheap pre-check: only text wrapped in braces is a parse candidate
    pub fn looks_structured(raw: &str) -> bool {
        let trimmed = raw.trim();
        trimmed.starts_with('{') && trimmed.ends_with('}')
    }

    /// Decode raw stored text into a known variant
    pub fn parse(raw: &str) -> Result<Self, ContentError> {
        let value: Value = serde_json::from_str(raw).map_err(ContentError::Malformed)?;
        serde_json::from_value(value).map_err(ContentError::Shape)
    }

    /// Serialize for storage
    pub fn to_json_string(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| "{}".to_string())
    }

    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }

    pub fn error(message: impl Into<String>, original_content: Option<String>) -> Self {
        Self::Error {
            message: message.into(),
            original_content,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Text { .. } => "text",
            Self::ToolCall { .. } => "tool_call",
            Self::ToolCalls { .. } => "tool_calls",
            Self::ToolResult { .. } => "tool_result",
            Self::DataRequest { .. } => "data_request",
            Self::DataResponse { .. } => "data_response",
            Self::Error { .. } => "error",
        }
    }

    /// Tool calls encoded by this content, in order.
    ///
    /// Returns `None` for every variant that is not a tool call payload and
    /// for an empty `tool_calls` list.
    pub fn tool_call_entries(&self) -> Option<Vec<ToolCallEntry>> {
        match self {
            Self::ToolCall {
                id,
                name,
                parameters,
            } => Some(vec![ToolCallEntry {
                id: id.clone(),
                name: name.clone(),
                parameters: parameters.clone(),
            }]),
            Self::ToolCalls { calls } if !calls.is_empty() => Some(calls.clone()),
            _ => None,
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Self::Error { .. })
    }
}
