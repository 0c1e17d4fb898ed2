//! In-process message storage

use super::{MessageQuery, MessageRepository, MessageUpdate, RepositoryError};
use crate::message::{NewMessage, Role, StorageMessage};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard, PoisonError};
use uuid::Uuid;

#[derive(Default)]
struct State {
    threads: HashMap<String, Vec<StorageMessage>>,
    /// message id -> thread id
    locations: HashMap<String, String>,
    /// ids of messages that already received their one mutation
    updated: HashSet<String>,
    /// (thread id, tool call id) -> message id
    tool_results: HashMap<(String, String), String>,
    next_sequence: i64,
}

/// Thread-scoped storage in a mutex.
///
/// Tool turns are indexed by `(thread_id, tool_call_id)` so a second result
/// for the same call is rejected instead of appended.
#[derive(Default)]
pub struct InMemoryRepository {
    state: Mutex<State>,
}

impl InMemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Every stored message of a thread, hidden ones included
    pub fn all_messages(&self, thread_id: &str) -> Vec<StorageMessage> {
        self.lock()
            .threads
            .get(thread_id)
            .cloned()
            .unwrap_or_default()
    }

    pub fn thread_count(&self) -> usize {
        self.lock().threads.len()
    }
}

fn index_key(thread_id: &str, tool_call_id: &str) -> (String, String) {
    (thread_id.to_string(), tool_call_id.to_string())
}

#[async_trait]
impl MessageRepository for InMemoryRepository {
    async fn get_messages(
        &self,
        thread_id: &str,
        query: MessageQuery,
    ) -> Result<Vec<StorageMessage>, RepositoryError> {
        let state = self.lock();
        Ok(state
            .threads
            .get(thread_id)
            .map(|messages| query.apply(messages))
            .unwrap_or_default())
    }

    async fn save_message(&self, message: NewMessage) -> Result<StorageMessage, RepositoryError> {
        message.validate().map_err(RepositoryError::Invalid)?;

        let mut state = self.lock();
        let index = match (message.role, &message.options.tool_call_id) {
            (Role::Tool, Some(tool_call_id)) => {
                let key = index_key(&message.thread_id, tool_call_id);
                if state.tool_results.contains_key(&key) {
                    return Err(RepositoryError::DuplicateToolResult {
                        thread_id: message.thread_id.clone(),
                        tool_call_id: tool_call_id.clone(),
                    });
                }
                Some(key)
            }
            _ => None,
        };

        state.next_sequence += 1;
        let sequence = message.options.sequence.unwrap_or(state.next_sequence);
        let stored = StorageMessage {
            id: Uuid::new_v4().to_string(),
            content: message.content,
            role: message.role,
            created_at: Utc::now(),
            user_id: message.user_id,
            thread_id: message.thread_id,
            is_visible: message.options.is_visible,
            send_to_llm: message.options.send_to_llm,
            tool_call_id: message.options.tool_call_id,
            sequence: Some(sequence),
            metadata: message.options.metadata,
        };

        if let Some(key) = index {
            state.tool_results.insert(key, stored.id.clone());
        }
        state
            .locations
            .insert(stored.id.clone(), stored.thread_id.clone());
        state
            .threads
            .entry(stored.thread_id.clone())
            .or_default()
            .push(stored.clone());

        tracing::debug!(
            thread_id = %stored.thread_id,
            message_id = %stored.id,
            role = %stored.role,
            "Message saved"
        );
        Ok(stored)
    }

    async fn update_message(
        &self,
        message_id: &str,
        update: MessageUpdate,
    ) -> Result<StorageMessage, RepositoryError> {
        if update.is_empty() {
            return Err(RepositoryError::Invalid("empty update".to_string()));
        }

        let mut state = self.lock();
        if state.updated.contains(message_id) {
            return Err(RepositoryError::AlreadyUpdated(message_id.to_string()));
        }
        let thread_id = state
            .locations
            .get(message_id)
            .cloned()
            .ok_or_else(|| RepositoryError::MessageNotFound(message_id.to_string()))?;

        let position = state
            .threads
            .get(&thread_id)
            .and_then(|messages| messages.iter().position(|m| m.id == message_id))
            .ok_or_else(|| RepositoryError::MessageNotFound(message_id.to_string()))?;

        let role = state.threads[&thread_id][position].role;
        if let (Role::Tool, Some(tool_call_id)) = (role, &update.tool_call_id) {
            let key = index_key(&thread_id, tool_call_id);
            if state.tool_results.contains_key(&key) {
                return Err(RepositoryError::DuplicateToolResult {
                    thread_id,
                    tool_call_id: tool_call_id.clone(),
                });
            }
            state.tool_results.insert(key, message_id.to_string());
        }

        let updated = state
            .threads
            .get_mut(&thread_id)
            .and_then(|messages| messages.get_mut(position))
            .map(|message| {
                update.apply_to(message);
                message.clone()
            })
            .ok_or_else(|| RepositoryError::MessageNotFound(message_id.to_string()))?;
        state.updated.insert(message_id.to_string());
        Ok(updated)
    }

    async fn clear_messages(&self, thread_id: &str) -> Result<usize, RepositoryError> {
        let mut state = self.lock();
        let removed = state.threads.remove(thread_id).unwrap_or_default();
        for message in &removed {
            state.locations.remove(&message.id);
            state.updated.remove(&message.id);
        }
        state.tool_results.retain(|(thread, _), _| thread != thread_id);
        tracing::info!(thread_id = %thread_id, removed = removed.len(), "Thread cleared");
        Ok(removed.len())
    }

    async fn find_tool_message(
        &self,
        thread_id: &str,
        tool_call_id: &str,
        _scan_limit: usize,
    ) -> Result<Option<StorageMessage>, RepositoryError> {
        let state = self.lock();
        let Some(message_id) = state.tool_results.get(&index_key(thread_id, tool_call_id)) else {
            return Ok(None);
        };
        Ok(state
            .threads
            .get(thread_id)
            .and_then(|messages| messages.iter().find(|m| &m.id == message_id))
            .cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::{from_params, DisplayContent, SaveOptions, StructuredContent};

    fn user_text(thread: &str, text: &str) -> NewMessage {
        from_params(text, Role::User, thread, "u1", SaveOptions::default())
    }

    fn tool_turn(thread: &str, call_id: &str) -> NewMessage {
        from_params(
            "done",
            Role::Tool,
            thread,
            "u1",
            SaveOptions::default().with_tool_call_id(call_id),
        )
    }

    #[tokio::test]
    async fn test_save_assigns_ids_and_sequence() {
        let repo = InMemoryRepository::new();
        let first = repo.save_message(user_text("t1", "one")).await.unwrap();
        let second = repo.save_message(user_text("t1", "two")).await.unwrap();

        assert_ne!(first.id, second.id);
        assert!(first.sequence < second.sequence);
        assert!(first.is_visible && first.send_to_llm);

        let messages = repo.get_messages("t1", MessageQuery::visible()).await.unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[1].content, "two");
    }

    #[tokio::test]
    async fn test_threads_are_isolated() {
        let repo = InMemoryRepository::new();
        repo.save_message(user_text("t1", "a")).await.unwrap();
        repo.save_message(user_text("t2", "b")).await.unwrap();

        assert_eq!(repo.all_messages("t1").len(), 1);
        assert_eq!(repo.thread_count(), 2);
        assert!(repo.get_messages("nope", MessageQuery::all()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_invalid_messages_rejected() {
        let repo = InMemoryRepository::new();
        let tool_without_id = from_params("x", Role::Tool, "t1", "u1", SaveOptions::default());
        let err = repo.save_message(tool_without_id).await.unwrap_err();
        assert!(matches!(err, RepositoryError::Invalid(_)));

        let no_thread = user_text("", "x");
        assert!(repo.save_message(no_thread).await.is_err());
    }

    #[tokio::test]
    async fn test_duplicate_tool_result_rejected() {
        let repo = InMemoryRepository::new();
        repo.save_message(tool_turn("t1", "c1")).await.unwrap();

        let err = repo.save_message(tool_turn("t1", "c1")).await.unwrap_err();
        assert!(matches!(err, RepositoryError::DuplicateToolResult { .. }));

        // Same call id in another thread is a different call
        repo.save_message(tool_turn("t2", "c1")).await.unwrap();
    }

    #[tokio::test]
    async fn test_find_tool_message_uses_index() {
        let repo = InMemoryRepository::new();
        let saved = repo.save_message(tool_turn("t1", "c1")).await.unwrap();
        for i in 0..5 {
            repo.save_message(user_text("t1", &format!("filler {i}")))
                .await
                .unwrap();
        }

        // Outside a scan window of 1, still found
        let found = repo.find_tool_message("t1", "c1", 1).await.unwrap();
        assert_eq!(found.map(|m| m.id), Some(saved.id));
        assert!(repo.find_tool_message("t1", "c2", 50).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_update_is_allowed_once() {
        let repo = InMemoryRepository::new();
        let saved = repo.save_message(user_text("t1", "hello")).await.unwrap();

        let demoted = repo
            .update_message(&saved.id, MessageUpdate::demote())
            .await
            .unwrap();
        assert!(!demoted.send_to_llm);

        let err = repo
            .update_message(&saved.id, MessageUpdate::demote())
            .await
            .unwrap_err();
        assert!(matches!(err, RepositoryError::AlreadyUpdated(_)));

        let history = repo.get_history_messages("t1").await.unwrap();
        assert!(history.is_empty());
    }

    #[tokio::test]
    async fn test_update_unknown_or_empty() {
        let repo = InMemoryRepository::new();
        let err = repo
            .update_message("missing", MessageUpdate::demote())
            .await
            .unwrap_err();
        assert!(matches!(err, RepositoryError::MessageNotFound(_)));

        let saved = repo.save_message(user_text("t1", "x")).await.unwrap();
        let err = repo
            .update_message(&saved.id, MessageUpdate::default())
            .await
            .unwrap_err();
        assert!(matches!(err, RepositoryError::Invalid(_)));
    }

    #[tokio::test]
    async fn test_clear_messages_resets_index() {
        let repo = InMemoryRepository::new();
        repo.save_message(tool_turn("t1", "c1")).await.unwrap();
        repo.save_message(user_text("t1", "x")).await.unwrap();

        assert_eq!(repo.clear_messages("t1").await.unwrap(), 2);
        assert!(repo.all_messages("t1").is_empty());
        assert!(repo.find_tool_message("t1", "c1", 50).await.unwrap().is_none());
        repo.save_message(tool_turn("t1", "c1")).await.unwrap();
    }

    #[tokio::test]
    async fn test_display_and_history_projections() {
        let repo = InMemoryRepository::new();
        repo.save_message(from_params(
            "be brief",
            Role::System,
            "t1",
            "u1",
            SaveOptions::default().hidden(),
        ))
        .await
        .unwrap();
        repo.save_message(from_params(
            StructuredContent::error("model down", None),
            Role::Assistant,
            "t1",
            "u1",
            SaveOptions::default().not_for_model(),
        ))
        .await
        .unwrap();

        let display = repo.get_display_messages("t1").await.unwrap();
        assert_eq!(display.len(), 1);
        assert!(matches!(display[0].content, DisplayContent::Structured(_)));
        assert!(display[0].content.is_error());

        let history = repo.get_history_messages("t1").await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].role, Role::System);
    }
}
