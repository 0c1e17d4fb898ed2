//! Events published on the bus

use crate::error::ErrorKind;
use crate::message::{DisplayMessage, StorageMessage};
use crate::tools::{ToolCallRequest, ToolResult};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Subscription key for [`ChatEvent`]s
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EventKind {
    UserMessageSent,
    AssistantMessageReceived,
    ToolCallReceived,
    ToolResultSent,
    MessagesUpdated,
    ErrorOccurred,
}

impl EventKind {
    pub const ALL: [EventKind; 6] = [
        EventKind::UserMessageSent,
        EventKind::AssistantMessageReceived,
        EventKind::ToolCallReceived,
        EventKind::ToolResultSent,
        EventKind::MessagesUpdated,
        EventKind::ErrorOccurred,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            EventKind::UserMessageSent => "user-message-sent",
            EventKind::AssistantMessageReceived => "assistant-message-received",
            EventKind::ToolCallReceived => "tool-call-received",
            EventKind::ToolResultSent => "tool-result-sent",
            EventKind::MessagesUpdated => "messages-updated",
            EventKind::ErrorOccurred => "error-occurred",
        }
    }

    /// Events whose processing produces the next step of a turn.
    /// Publishing one with nobody listening stalls the conversation.
    pub fn expects_result(self) -> bool {
        matches!(self, EventKind::ToolCallReceived | EventKind::ToolResultSent)
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Type-specific event data
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum EventPayload {
    UserMessageSent {
        message: StorageMessage,
    },
    AssistantMessageReceived {
        message_id: String,
        content: String,
    },
    ToolCallReceived {
        message_id: String,
        tool_call: ToolCallRequest,
    },
    /// `message_id` is blank until the result is persisted
    ToolResultSent {
        message_id: String,
        result: ToolResult,
    },
    MessagesUpdated {
        messages: Vec<DisplayMessage>,
    },
    ErrorOccurred {
        kind: ErrorKind,
        message: String,
        context: String,
    },
}

/// An event scoped to one thread and user
#[derive(Debug, Clone, Serialize)]
pub struct ChatEvent {
    pub thread_id: String,
    pub user_id: String,
    #[serde(flatten)]
    pub payload: EventPayload,
}

impl ChatEvent {
    pub fn new(thread_id: &str, user_id: &str, payload: EventPayload) -> Self {
        Self {
            thread_id: thread_id.to_string(),
            user_id: user_id.to_string(),
            payload,
        }
    }

    pub fn kind(&self) -> EventKind {
        match &self.payload {
            EventPayload::UserMessageSent { .. } => EventKind::UserMessageSent,
            EventPayload::AssistantMessageReceived { .. } => EventKind::AssistantMessageReceived,
            EventPayload::ToolCallReceived { .. } => EventKind::ToolCallReceived,
            EventPayload::ToolResultSent { .. } => EventKind::ToolResultSent,
            EventPayload::MessagesUpdated { .. } => EventKind::MessagesUpdated,
            EventPayload::ErrorOccurred { .. } => EventKind::ErrorOccurred,
        }
    }

    pub fn user_message_sent(thread_id: &str, user_id: &str, message: StorageMessage) -> Self {
        Self::new(thread_id, user_id, EventPayload::UserMessageSent { message })
    }

    pub fn assistant_message_received(
        thread_id: &str,
        user_id: &str,
        message_id: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self::new(
            thread_id,
            user_id,
            EventPayload::AssistantMessageReceived {
                message_id: message_id.into(),
                content: content.into(),
            },
        )
    }

    pub fn tool_call_received(
        thread_id: &str,
        user_id: &str,
        message_id: impl Into<String>,
        tool_call: ToolCallRequest,
    ) -> Self {
        Self::new(
            thread_id,
            user_id,
            EventPayload::ToolCallReceived {
                message_id: message_id.into(),
                tool_call,
            },
        )
    }

    pub fn tool_result_sent(thread_id: &str, user_id: &str, result: ToolResult) -> Self {
        Self::new(
            thread_id,
            user_id,
            EventPayload::ToolResultSent {
                message_id: String::new(),
                result,
            },
        )
    }

    pub fn messages_updated(thread_id: &str, user_id: &str, messages: Vec<DisplayMessage>) -> Self {
        Self::new(thread_id, user_id, EventPayload::MessagesUpdated { messages })
    }

    pub fn error_occurred(
        thread_id: &str,
        user_id: &str,
        kind: ErrorKind,
        message: impl Into<String>,
        context: impl Into<String>,
    ) -> Self {
        Self::new(
            thread_id,
            user_id,
            EventPayload::ErrorOccurred {
                kind,
                message: message.into(),
                context: context.into(),
            },
        )
    }
}
