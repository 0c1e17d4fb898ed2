//! Message Repository: durable conversation turns, scoped by thread
//!
//! The orchestration layer only talks to [`MessageRepository`]; the engine
//! behind it is a collaborator. [`InMemoryRepository`] ships for the server
//! binary and tests.

mod memory;

pub use memory::InMemoryRepository;

use crate::message::{
    model_thread, to_display, DisplayMessage, ModelHistoryMessage, NewMessage, StorageMessage,
};
use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("message not found: {0}")]
    MessageNotFound(String),
    /// A stored message may be mutated at most once after creation
    #[error("message {0} was already updated")]
    AlreadyUpdated(String),
    #[error("thread {thread_id} already has a result for tool call {tool_call_id}")]
    DuplicateToolResult {
        thread_id: String,
        tool_call_id: String,
    },
    #[error("invalid message: {0}")]
    Invalid(String),
    #[error("storage unavailable: {0}")]
    Unavailable(String),
}

/// Which messages `get_messages` returns
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MessageQuery {
    /// Include messages with `is_visible = false`
    pub include_hidden: bool,
    /// Only messages with `send_to_llm = true`, hidden or not
    pub for_llm: bool,
    /// Keep only the most recent `n` matches
    pub limit: Option<usize>,
}

impl MessageQuery {
    /// Visible messages
    pub fn visible() -> Self {
        Self::default()
    }

    pub fn all() -> Self {
        Self {
            include_hidden: true,
            ..Self::default()
        }
    }

    pub fn for_model() -> Self {
        Self {
            for_llm: true,
            ..Self::default()
        }
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn matches(&self, message: &StorageMessage) -> bool {
        if self.for_llm {
            message.send_to_llm
        } else {
            self.include_hidden || message.is_visible
        }
    }

    /// Filter an ordered thread and apply the limit
    pub fn apply<'a>(&self, messages: impl IntoIterator<Item = &'a StorageMessage>) -> Vec<StorageMessage> {
        let mut matched: Vec<StorageMessage> = messages
            .into_iter()
            .filter(|m| self.matches(m))
            .cloned()
            .collect();
        if let Some(limit) = self.limit {
            let skip = matched.len().saturating_sub(limit);
            matched.drain(..skip);
        }
        matched
    }
}

/// The one mutation a stored message may receive
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MessageUpdate {
    pub tool_call_id: Option<String>,
    pub send_to_llm: Option<bool>,
}

impl MessageUpdate {
    pub fn attach_tool_call_id(tool_call_id: impl Into<String>) -> Self {
        Self {
            tool_call_id: Some(tool_call_id.into()),
            ..Self::default()
        }
    }

    /// Stop sending the message to the model
    pub fn demote() -> Self {
        Self {
            send_to_llm: Some(false),
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.tool_call_id.is_none() && self.send_to_llm.is_none()
    }

    pub fn apply_to(&self, message: &mut StorageMessage) {
        if let Some(id) = &self.tool_call_id {
            message.tool_call_id = Some(id.clone());
        }
        if let Some(send) = self.send_to_llm {
            message.send_to_llm = send;
        }
    }
}

#[async_trait]
pub trait MessageRepository: Send + Sync {
    /// Messages of a thread in insertion order
    async fn get_messages(
        &self,
        thread_id: &str,
        query: MessageQuery,
    ) -> Result<Vec<StorageMessage>, RepositoryError>;

    async fn save_message(&self, message: NewMessage) -> Result<StorageMessage, RepositoryError>;

    async fn update_message(
        &self,
        message_id: &str,
        update: MessageUpdate,
    ) -> Result<StorageMessage, RepositoryError>;

    /// Remove every message of a thread, returning how many were removed
    async fn clear_messages(&self, thread_id: &str) -> Result<usize, RepositoryError>;

    /// Stored tool turn answering `tool_call_id`, looked up among the most
    /// recent `scan_limit` messages
    async fn find_tool_message(
        &self,
        thread_id: &str,
        tool_call_id: &str,
        scan_limit: usize,
    ) -> Result<Option<StorageMessage>, RepositoryError> {
        let recent = self
            .get_messages(thread_id, MessageQuery::all().with_limit(scan_limit))
            .await?;
        Ok(recent
            .into_iter()
            .rev()
            .find(|m| m.answers_tool_call(tool_call_id)))
    }

    async fn get_display_messages(
        &self,
        thread_id: &str,
    ) -> Result<Vec<DisplayMessage>, RepositoryError> {
        let messages = self.get_messages(thread_id, MessageQuery::visible()).await?;
        Ok(messages.iter().map(to_display).collect())
    }

    async fn get_history_messages(
        &self,
        thread_id: &str,
    ) -> Result<Vec<ModelHistoryMessage>, RepositoryError> {
        let messages = self.get_messages(thread_id, MessageQuery::for_model()).await?;
        Ok(model_thread(&messages))
    }
}

#[async_trait]
impl<T: MessageRepository + ?Sized> MessageRepository for Arc<T> {
    async fn get_messages(
        &self,
        thread_id: &str,
        query: MessageQuery,
    ) -> Result<Vec<StorageMessage>, RepositoryError> {
        (**self).get_messages(thread_id, query).await
    }

    async fn save_message(&self, message: NewMessage) -> Result<StorageMessage, RepositoryError> {
        (**self).save_message(message).await
    }

    async fn update_message(
        &self,
        message_id: &str,
        update: MessageUpdate,
    ) -> Result<StorageMessage, RepositoryError> {
        (**self).update_message(message_id, update).await
    }

    async fn clear_messages(&self, thread_id: &str) -> Result<usize, RepositoryError> {
        (**self).clear_messages(thread_id).await
    }

    async fn find_tool_message(
        &self,
        thread_id: &str,
        tool_call_id: &str,
        scan_limit: usize,
    ) -> Result<Option<StorageMessage>, RepositoryError> {
        (**self)
            .find_tool_message(thread_id, tool_call_id, scan_limit)
            .await
    }

    async fn get_display_messages(
        &self,
        thread_id: &str,
    ) -> Result<Vec<DisplayMessage>, RepositoryError> {
        (**self).get_display_messages(thread_id).await
    }

    async fn get_history_messages(
        &self,
        thread_id: &str,
    ) -> Result<Vec<ModelHistoryMessage>, RepositoryError> {
        (**self).get_history_messages(thread_id).await
    }
}
