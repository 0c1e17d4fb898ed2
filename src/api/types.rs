//! API request and response types

use crate::message::DisplayMessage;
use crate::tools::{ToolDefinition, ToolResult};
use serde::{Deserialize, Serialize};

pub const ANONYMOUS_USER: &str = "anonymous";

fn anonymous() -> String {
    ANONYMOUS_USER.to_string()
}

/// Request to send a user message
#[derive(Debug, Deserialize)]
pub struct SendMessageRequest {
    pub content: String,
    #[serde(default = "anonymous")]
    pub user_id: String,
}

/// Request to submit a tool result
#[derive(Debug, Deserialize)]
pub struct ToolResultRequest {
    pub result: ToolResult,
    #[serde(default = "anonymous")]
    pub user_id: String,
}

#[derive(Debug, Deserialize)]
pub struct UserQuery {
    #[serde(default = "anonymous")]
    pub user_id: String,
}

/// The persisted user turn and the assistant's reply
#[derive(Debug, Serialize)]
pub struct SendMessageResponse {
    pub user: DisplayMessage,
    pub reply: DisplayMessage,
}

#[derive(Debug, Serialize)]
pub struct MessagesResponse {
    pub messages: Vec<DisplayMessage>,
}

#[derive(Debug, Serialize)]
pub struct ClearResponse {
    pub removed: usize,
}

#[derive(Debug, Serialize)]
pub struct AcceptedResponse {
    pub accepted: bool,
}

#[derive(Debug, Serialize)]
pub struct ToolsResponse {
    pub tools: Vec<ToolDefinition>,
}

/// Error response
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub kind: String,
}

impl ErrorResponse {
    pub fn new(kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error: message.into(),
            kind: kind.into(),
        }
    }
}
