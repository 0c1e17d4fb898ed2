//! Pure conversions between Storage, Display and Model-History shapes
//!
//! These run on every render and every resend, so they hold no state and never
//! fail: undecodable structured text degrades to an `error` variant for display
//! and to raw text for the model.

use super::content::StructuredContent;
use super::types::{
    DisplayContent, DisplayMessage, ModelHistoryMessage, ModelToolCall, NewMessage, Role,
    SaveOptions, StorageMessage,
};
use serde_json::Value;

/// Content accepted by [`from_params`]
#[derive(Debug, Clone, PartialEq)]
pub enum MessageBody {
    Text(String),
    Structured(StructuredContent),
    Json(Value),
}

impl From<String> for MessageBody {
    fn from(text: String) -> Self {
        MessageBody::Text(text)
    }
}

impl From<&str> for MessageBody {
    fn from(text: &str) -> Self {
        MessageBody::Text(text.to_string())
    }
}

impl From<StructuredContent> for MessageBody {
    fn from(content: StructuredContent) -> Self {
        MessageBody::Structured(content)
    }
}

impl From<Value> for MessageBody {
    fn from(value: Value) -> Self {
        MessageBody::Json(value)
    }
}

impl MessageBody {
    fn into_stored_text(self) -> String {
        match self {
            MessageBody::Text(text) | MessageBody::Json(Value::String(text)) => text,
            MessageBody::Structured(content) => content.to_json_string(),
            MessageBody::Json(value) => value.to_string(),
        }
    }
}

/// Build a message for persistence. Objects are serialized to JSON text.
pub fn from_params(
    content: impl Into<MessageBody>,
    role: Role,
    thread_id: &str,
    user_id: &str,
    options: SaveOptions,
) -> NewMessage {
    NewMessage {
        content: content.into().into_stored_text(),
        role,
        thread_id: thread_id.to_string(),
        user_id: user_id.to_string(),
        options,
    }
}

/// Decode stored text for rendering
pub fn display_content(raw: &str) -> DisplayContent {
    if !StructuredContent::looks_structured(raw) {
        return DisplayContent::Text(raw.to_string());
    }
    match StructuredContent::parse(raw) {
        Ok(content) => DisplayContent::Structured(content),
        Err(e) => DisplayContent::Structured(StructuredContent::error(
            format!("Invalid message format: {e}"),
            Some(raw.to_string()),
        )),
    }
}

pub fn to_display(message: &StorageMessage) -> DisplayMessage {
    DisplayMessage {
        id: message.id.clone(),
        content: display_content(&message.content),
        role: message.role,
        created_at: message.created_at,
        user_id: message.user_id.clone(),
        is_loading: false,
        metadata: message.metadata.clone(),
    }
}

pub fn to_model_history(message: &StorageMessage) -> ModelHistoryMessage {
    match message.role {
        Role::Tool => tool_history(message),
        Role::Assistant => assistant_history(message),
        Role::User | Role::System => ModelHistoryMessage::text(message.role, &message.content),
    }
}

/// Visible messages, in order, projected for display
pub fn display_thread(messages: &[StorageMessage]) -> Vec<DisplayMessage> {
    messages
        .iter()
        .filter(|m| m.is_visible)
        .map(to_display)
        .collect()
}

/// Model-bound messages, in order, projected for the model
pub fn model_thread(messages: &[StorageMessage]) -> Vec<ModelHistoryMessage> {
    messages
        .iter()
        .filter(|m| m.send_to_llm)
        .map(to_model_history)
        .collect()
}

/// Id used for a stored call that was persisted without one.
///
/// Derived from the message id so repeated conversion yields the same value.
pub fn synthesized_call_id(message_id: &str, index: usize) -> String {
    format!("call_{message_id}_{index}")
}

fn tool_history(message: &StorageMessage) -> ModelHistoryMessage {
    let tool_call_id = message.tool_call_id.clone().or_else(|| {
        match StructuredContent::parse(&message.content) {
            Ok(StructuredContent::ToolResult { tool_call_id, .. }) => Some(tool_call_id),
            _ => None,
        }
    });
    ModelHistoryMessage {
        role: Role::Tool,
        content: Some(message.content.clone()),
        tool_calls: Vec::new(),
        tool_call_id,
    }
}

fn assistant_history(message: &StorageMessage) -> ModelHistoryMessage {
    if StructuredContent::looks_structured(&message.content) {
        if let Ok(content) = StructuredContent::parse(&message.content) {
            if let Some(entries) = content.tool_call_entries() {
                let tool_calls = entries
                    .into_iter()
                    .enumerate()
                    .map(|(index, entry)| ModelToolCall {
                        id: entry
                            .id
                            .unwrap_or_else(|| synthesized_call_id(&message.id, index)),
                        name: entry.name,
                        arguments: Value::Object(entry.parameters).to_string(),
                    })
                    .collect();
                return ModelHistoryMessage::with_tool_calls(tool_calls);
            }
            if let StructuredContent::Text { text } = content {
                return ModelHistoryMessage::assistant(text);
            }
        }
    }
    ModelHistoryMessage::assistant(&message.content)
}
