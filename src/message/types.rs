//! Message records and projections

use super::content::StructuredContent;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Who authored a turn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Assistant,
    System,
    Tool,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::System => "system",
            Role::Tool => "tool",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Durable record of one conversation turn.
///
/// `content` holds either raw text or a JSON-serialized [`StructuredContent`].
/// A `Tool` turn always carries the `tool_call_id` it answers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StorageMessage {
    pub id: String,
    pub content: String,
    pub role: Role,
    pub created_at: DateTime<Utc>,
    pub user_id: String,
    pub thread_id: String,
    pub is_visible: bool,
    pub send_to_llm: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sequence: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
}

impl StorageMessage {
    /// Whether this is the stored result for `tool_call_id`.
    ///
    /// Falls back to the encoded `tool_result` payload for records written
    /// before the id column was attached.
    pub fn answers_tool_call(&self, tool_call_id: &str) -> bool {
        if self.role != Role::Tool {
            return false;
        }
        if let Some(id) = &self.tool_call_id {
            return id == tool_call_id;
        }
        matches!(
            StructuredContent::parse(&self.content),
            Ok(StructuredContent::ToolResult { tool_call_id: ref id, .. }) if id == tool_call_id
        )
    }
}

/// Options accepted when saving a message
#[derive(Debug, Clone, PartialEq)]
pub struct SaveOptions {
    pub is_visible: bool,
    pub send_to_llm: bool,
    pub tool_call_id: Option<String>,
    pub sequence: Option<i64>,
    pub metadata: Option<Value>,
}

impl Default for SaveOptions {
    fn default() -> Self {
        Self {
            is_visible: true,
            send_to_llm: true,
            tool_call_id: None,
            sequence: None,
            metadata: None,
        }
    }
}

impl SaveOptions {
    pub fn hidden(mut self) -> Self {
        self.is_visible = false;
        self
    }

    pub fn not_for_model(mut self) -> Self {
        self.send_to_llm = false;
        self
    }

    pub fn with_tool_call_id(mut self, tool_call_id: impl Into<String>) -> Self {
        self.tool_call_id = Some(tool_call_id.into());
        self
    }

    pub fn with_sequence(mut self, sequence: i64) -> Self {
        self.sequence = Some(sequence);
        self
    }

    pub fn with_metadata(mut self, metadata: Value) -> Self {
        self.metadata = Some(metadata);
        self
    }
}

/// A message ready to be handed to a repository
#[derive(Debug, Clone, PartialEq)]
pub struct NewMessage {
    pub content: String,
    pub role: Role,
    pub thread_id: String,
    pub user_id: String,
    pub options: SaveOptions,
}

impl NewMessage {
    /// Check record-level invariants before persisting
    pub fn validate(&self) -> Result<(), String> {
        if self.thread_id.is_empty() {
            return Err("thread_id is required".to_string());
        }
        if self.role == Role::Tool && self.options.tool_call_id.is_none() {
            return Err("tool messages require a tool_call_id".to_string());
        }
        Ok(())
    }
}

/// Render-ready content: prose or one of the structured variants
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum DisplayContent {
    Text(String),
    Structured(StructuredContent),
}

impl DisplayContent {
    pub fn is_error(&self) -> bool {
        matches!(self, DisplayContent::Structured(c) if c.is_error())
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            DisplayContent::Text(text) => Some(text),
            DisplayContent::Structured(StructuredContent::Text { text }) => Some(text),
            DisplayContent::Structured(_) => None,
        }
    }
}

/// Projection of a [`StorageMessage`] for rendering. Never persisted.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DisplayMessage {
    pub id: String,
    pub content: DisplayContent,
    pub role: Role,
    pub created_at: DateTime<Utc>,
    pub user_id: String,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub is_loading: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
}

/// A tool call as the model sees it, arguments JSON-encoded
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelToolCall {
    pub id: String,
    pub name: String,
    pub arguments: String,
}

/// Projection of a turn for the model backend.
///
/// `content` is `None` exactly when `tool_calls` is non-empty.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelHistoryMessage {
    pub role: Role,
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ModelToolCall>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

impl ModelHistoryMessage {
    pub fn text(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: Some(content.into()),
            tool_calls: Vec::new(),
            tool_call_id: None,
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::text(Role::Assistant, content)
    }

    pub fn with_tool_calls(tool_calls: Vec<ModelToolCall>) -> Self {
        Self {
            role: Role::Assistant,
            content: None,
            tool_calls,
            tool_call_id: None,
        }
    }

    pub fn tool(tool_call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: Role::Tool,
            content: Some(content.into()),
            tool_calls: Vec::new(),
            tool_call_id: Some(tool_call_id.into()),
        }
    }

    pub fn has_tool_calls(&self) -> bool {
        !self.tool_calls.is_empty()
    }

    /// `content` is absent iff tool calls are present
    pub fn is_well_formed(&self) -> bool {
        self.content.is_none() == self.has_tool_calls()
    }
}
