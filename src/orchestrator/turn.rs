//! Steps shared by the Message Service and the Tool Result Event Handler:
//! persisting an assistant turn, fanning out its tool calls, and recording
//! failures so they show up in the conversation.

use crate::error::ChatError;
use crate::events::{ChatEvent, EventBus};
use crate::message::{
    from_params, to_model_history, ModelHistoryMessage, Role, SaveOptions, StorageMessage,
    StructuredContent, ToolCallEntry,
};
use crate::model::ModelClient;
use crate::repository::{MessageRepository, MessageUpdate};
use crate::tools::ToolCallRequest;
use std::collections::HashSet;
use std::sync::Arc;
use uuid::Uuid;

/// Collaborators every orchestration step needs
#[derive(Clone)]
pub struct Pipeline {
    pub bus: EventBus,
    pub repository: Arc<dyn MessageRepository>,
    pub model: Arc<dyn ModelClient>,
}

/// One decoded model response
#[derive(Debug, Clone, PartialEq)]
pub enum AssistantTurn {
    Text(String),
    ToolCalls(Vec<ToolCallRequest>),
}

impl AssistantTurn {
    /// Decode a model response. Calls without an id get a fresh one so the
    /// stored turn and the results that answer it agree.
    pub fn from_response(response: ModelHistoryMessage) -> Result<Self, ChatError> {
        if !response.has_tool_calls() {
            return Ok(Self::Text(response.content.unwrap_or_default()));
        }
        let calls = response
            .tool_calls
            .iter()
            .map(|call| -> Result<ToolCallRequest, ChatError> {
                let mut request = ToolCallRequest::from_model_call(call)?;
                if request.id.trim().is_empty() {
                    request.id = fresh_call_id();
                }
                Ok(request)
            })
            .collect::<Result<Vec<_>, ChatError>>()?;
        Ok(Self::ToolCalls(calls))
    }

    /// Give a fresh id to every call whose id is in `taken` or repeats
    /// earlier in the turn. Returns how many were replaced.
    pub fn remint_ids(&mut self, taken: &HashSet<String>) -> usize {
        let Self::ToolCalls(calls) = self else {
            return 0;
        };
        let mut seen = HashSet::new();
        let mut replaced = 0;
        for call in calls.iter_mut() {
            if taken.contains(&call.id) || !seen.insert(call.id.clone()) {
                call.id = fresh_call_id();
                seen.insert(call.id.clone());
                replaced += 1;
            }
        }
        replaced
    }

    fn call_ids(&self) -> Vec<&str> {
        match self {
            Self::Text(_) => Vec::new(),
            Self::ToolCalls(calls) => calls.iter().map(|c| c.id.as_str()).collect(),
        }
    }

    /// Stored form: raw text, or one `tool_calls` payload for every call
    pub fn stored_content(&self) -> String {
        match self {
            Self::Text(text) => text.clone(),
            Self::ToolCalls(calls) => StructuredContent::ToolCalls {
                calls: calls
                    .iter()
                    .map(|c| ToolCallEntry::new(&c.id, &c.name, c.arguments.clone()))
                    .collect(),
            }
            .to_json_string(),
        }
    }
}

fn fresh_call_id() -> String {
    format!("call_{}", Uuid::new_v4().simple())
}

/// Make sure `stored` is part of `history`, appending it if a lagging read
/// left it out
pub fn with_turn(mut history: Vec<ModelHistoryMessage>, stored: &StorageMessage) -> Vec<ModelHistoryMessage> {
    let turn = to_model_history(stored);
    let present = match (&turn.role, &turn.tool_call_id) {
        (Role::Tool, Some(id)) => history
            .iter()
            .any(|m| m.role == Role::Tool && m.tool_call_id.as_deref() == Some(id.as_str())),
        _ => history.last() == Some(&turn),
    };
    if !present {
        tracing::debug!(
            thread_id = %stored.thread_id,
            message_id = %stored.id,
            "Stored turn missing from history read, re-inserting"
        );
        history.push(turn);
    }
    history
}

/// Ids of calls in the latest tool-calling assistant turn that have no
/// tool turn after them yet
pub fn pending_tool_calls(history: &[ModelHistoryMessage]) -> Vec<String> {
    let Some(position) = history.iter().rposition(ModelHistoryMessage::has_tool_calls) else {
        return Vec::new();
    };
    let answered: HashSet<&str> = history
        .iter()
        .skip(position + 1)
        .filter(|m| m.role == Role::Tool)
        .filter_map(|m| m.tool_call_id.as_deref())
        .collect();
    history[position]
        .tool_calls
        .iter()
        .filter(|c| !answered.contains(c.id.as_str()))
        .map(|c| c.id.clone())
        .collect()
}

impl Pipeline {
    pub fn new(
        bus: EventBus,
        repository: Arc<dyn MessageRepository>,
        model: Arc<dyn ModelClient>,
    ) -> Self {
        Self {
            bus,
            repository,
            model,
        }
    }

    /// Persist a model response and announce it: `assistant-message-received`
    /// for text, one `tool-call-received` per call otherwise
    pub async fn record_assistant_turn(
        &self,
        thread_id: &str,
        user_id: &str,
        response: ModelHistoryMessage,
    ) -> Result<StorageMessage, ChatError> {
        let mut turn = AssistantTurn::from_response(response)?;
        // A call id that already has a stored result would be answered by it
        let mut taken = HashSet::new();
        for id in turn.call_ids() {
            if self
                .repository
                .find_tool_message(thread_id, id, usize::MAX)
                .await?
                .is_some()
            {
                taken.insert(id.to_string());
            }
        }
        let replaced = turn.remint_ids(&taken);
        if replaced > 0 {
            tracing::warn!(
                thread_id = %thread_id,
                replaced,
                "Model reused tool call ids, assigned fresh ones"
            );
        }

        let saved = self
            .repository
            .save_message(from_params(
                turn.stored_content(),
                Role::Assistant,
                thread_id,
                user_id,
                SaveOptions::default(),
            ))
            .await?;

        match turn {
            AssistantTurn::Text(text) => {
                self.bus.publish(&ChatEvent::assistant_message_received(
                    thread_id, user_id, &saved.id, text,
                ));
            }
            AssistantTurn::ToolCalls(calls) => {
                tracing::info!(
                    thread_id = %thread_id,
                    message_id = %saved.id,
                    calls = calls.len(),
                    "Model requested tools"
                );
                for call in calls {
                    self.bus.publish(&ChatEvent::tool_call_received(
                        thread_id, user_id, &saved.id, call,
                    ));
                }
            }
        }
        Ok(saved)
    }

    /// Publish `messages-updated` with the thread's display list
    pub async fn publish_thread_snapshot(&self, thread_id: &str, user_id: &str) {
        match self.repository.get_display_messages(thread_id).await {
            Ok(messages) => {
                self.bus
                    .publish(&ChatEvent::messages_updated(thread_id, user_id, messages));
            }
            Err(e) => {
                tracing::warn!(thread_id = %thread_id, error = %e, "Failed to load thread snapshot");
            }
        }
    }

    /// Keep a failed turn out of future model calls and leave a visible error
    /// message in the thread. Best effort: storage failures are logged.
    pub async fn persist_failure(
        &self,
        thread_id: &str,
        user_id: &str,
        trigger: Option<&str>,
        error: &ChatError,
    ) {
        if let Some(message_id) = trigger {
            if let Err(e) = self
                .repository
                .update_message(message_id, MessageUpdate::demote())
                .await
            {
                tracing::warn!(message_id = %message_id, error = %e, "Failed to demote message");
            }
        }

        let content = StructuredContent::error(error.to_string(), None);
        if let Err(e) = self
            .repository
            .save_message(from_params(
                content,
                Role::Assistant,
                thread_id,
                user_id,
                SaveOptions::default().not_for_model(),
            ))
            .await
        {
            tracing::warn!(thread_id = %thread_id, error = %e, "Failed to persist error message");
        }
    }

    /// Announce a failure: `error-occurred`, then a fresh snapshot
    pub async fn report_failure(&self, thread_id: &str, user_id: &str, error: &ChatError, context: &str) {
        self.bus.publish(&ChatEvent::error_occurred(
            thread_id,
            user_id,
            error.kind(),
            error.to_string(),
            context,
        ));
        self.publish_thread_snapshot(thread_id, user_id).await;
    }
}
