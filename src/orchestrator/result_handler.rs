//! Tool Result Event Handler
//!
//! Persists the tool turn if it is not stored yet, then sends the thread's
//! history back to the model once every call of the latest tool-calling turn
//! has an answer. Failures are written into the thread and published as
//! `error-occurred`; the turn never stalls silently.

use super::spawn_listener_work;
use super::turn::{pending_tool_calls, with_turn, Pipeline};
use crate::error::ChatError;
use crate::events::{ChatEvent, EventPayload, ListenerError, ListenerResult};
use crate::message::{from_params, Role, SaveOptions, StorageMessage};
use crate::repository::RepositoryError;
use crate::tools::ToolResult;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use tokio_util::task::TaskTracker;

/// Outcome of handling one result
#[derive(Debug, Clone, PartialEq)]
pub enum ResultOutcome {
    /// The follow-up assistant turn
    FollowUp(StorageMessage),
    /// Other calls of the same turn are still unanswered
    AwaitingResults(Vec<String>),
}

#[derive(Clone)]
pub struct ToolResultHandler {
    pipeline: Pipeline,
    history_scan_limit: usize,
    /// Serializes result handling per thread
    thread_locks: Arc<Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>>,
}

impl ToolResultHandler {
    pub fn new(pipeline: Pipeline, history_scan_limit: usize) -> Self {
        Self {
            pipeline,
            history_scan_limit,
            thread_locks: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    fn thread_lock(&self, thread_id: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self
            .thread_locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        // Drop locks nobody else holds
        locks.retain(|_, lock| Arc::strong_count(lock) > 1);
        Arc::clone(locks.entry(thread_id.to_string()).or_default())
    }

    /// Stored tool turn for `result`, persisting it if absent
    pub async fn ensure_tool_message(
        &self,
        result: &ToolResult,
        thread_id: &str,
        user_id: &str,
    ) -> Result<StorageMessage, ChatError> {
        let repository = &self.pipeline.repository;
        if let Some(existing) = repository
            .find_tool_message(thread_id, &result.tool_call_id, self.history_scan_limit)
            .await?
        {
            tracing::debug!(
                thread_id = %thread_id,
                tool_call_id = %result.tool_call_id,
                "Tool result already stored"
            );
            return Ok(existing);
        }

        let message = from_params(
            result.to_content(),
            Role::Tool,
            thread_id,
            user_id,
            SaveOptions::default().with_tool_call_id(&result.tool_call_id),
        );
        match repository.save_message(message).await {
            Ok(saved) => Ok(saved),
            Err(RepositoryError::DuplicateToolResult { .. }) => repository
                .find_tool_message(thread_id, &result.tool_call_id, self.history_scan_limit)
                .await?
                .ok_or_else(|| {
                    ChatError::Repository(RepositoryError::MessageNotFound(format!(
                        "tool result {}",
                        result.tool_call_id
                    )))
                }),
            Err(e) => Err(e.into()),
        }
    }

    pub async fn handle(
        &self,
        result: &ToolResult,
        thread_id: &str,
        user_id: &str,
    ) -> Result<ResultOutcome, ChatError> {
        let lock = self.thread_lock(thread_id);
        let _guard = lock.lock().await;

        let tool_message = self.ensure_tool_message(result, thread_id, user_id).await?;
        let history = self
            .pipeline
            .repository
            .get_history_messages(thread_id)
            .await?;
        let history = with_turn(history, &tool_message);

        let pending = pending_tool_calls(&history);
        if !pending.is_empty() {
            tracing::debug!(
                thread_id = %thread_id,
                tool_call_id = %result.tool_call_id,
                pending = pending.len(),
                "Waiting for remaining tool results"
            );
            return Ok(ResultOutcome::AwaitingResults(pending));
        }

        let response = self.pipeline.model.send_message(&history).await?;
        let reply = self
            .pipeline
            .record_assistant_turn(thread_id, user_id, response)
            .await?;
        self.pipeline.publish_thread_snapshot(thread_id, user_id).await;
        Ok(ResultOutcome::FollowUp(reply))
    }

    /// `handle`, recording any failure in the thread
    pub async fn process(&self, result: &ToolResult, thread_id: &str, user_id: &str) {
        if let Err(e) = self.handle(result, thread_id, user_id).await {
            tracing::error!(
                thread_id = %thread_id,
                tool_call_id = %result.tool_call_id,
                error = %e,
                "Tool result follow-up failed"
            );
            self.pipeline
                .persist_failure(thread_id, user_id, None, &e)
                .await;
            self.pipeline
                .report_failure(thread_id, user_id, &e, "tool_result_handler")
                .await;
        }
    }

    /// Bus listener that runs `process` on `tracker`
    pub fn into_listener(
        self,
        tracker: TaskTracker,
    ) -> impl Fn(&ChatEvent) -> ListenerResult + Send + Sync + 'static {
        move |event: &ChatEvent| {
            let EventPayload::ToolResultSent { result, .. } = &event.payload else {
                return Err(ListenerError::new(format!(
                    "tool result handler received {}",
                    event.kind()
                )));
            };
            let handler = self.clone();
            let result = result.clone();
            let thread_id = event.thread_id.clone();
            let user_id = event.user_id.clone();
            spawn_listener_work(&tracker, async move {
                handler.process(&result, &thread_id, &user_id).await;
            })
        }
    }
}
