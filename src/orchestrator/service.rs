//! Message Service: the public entry points of the pipeline
//!
//! Every entry point runs through [`MessageService::guarded`]: a failure is
//! published as `error-occurred` for the thread before it is returned.

use super::bootstrap::Bootstrapper;
use super::turn::{with_turn, Pipeline};
use crate::error::ChatError;
use crate::events::{ChatEvent, EventKind};
use crate::message::{from_params, DisplayMessage, Role, SaveOptions, StorageMessage};
use crate::tools::{ToolDefinition, ToolResult};
use std::future::Future;
use std::sync::Arc;

/// The turns persisted by `send_user_message`
#[derive(Debug, Clone, PartialEq)]
pub struct SentTurn {
    pub user: StorageMessage,
    /// Assistant text, or the stored tool-calls turn
    pub reply: StorageMessage,
}

#[derive(Clone)]
pub struct MessageService {
    bootstrapper: Arc<Bootstrapper>,
}

fn require_thread(thread_id: &str) -> Result<(), ChatError> {
    if thread_id.trim().is_empty() {
        return Err(ChatError::Validation("thread id is required".to_string()));
    }
    Ok(())
}

impl MessageService {
    pub fn new(bootstrapper: Arc<Bootstrapper>) -> Self {
        Self { bootstrapper }
    }

    pub fn bootstrapper(&self) -> &Arc<Bootstrapper> {
        &self.bootstrapper
    }

    /// Persist a user turn, ask the model, and persist and announce its answer.
    ///
    /// Tool calls in the answer are handled in the background; their results
    /// lead to a follow-up turn published on the bus.
    pub async fn send_user_message(
        &self,
        content: &str,
        thread_id: &str,
        user_id: &str,
    ) -> Result<SentTurn, ChatError> {
        self.guarded(
            thread_id,
            user_id,
            "send_user_message",
            self.user_turn(content, thread_id, user_id),
        )
        .await
    }

    async fn user_turn(
        &self,
        content: &str,
        thread_id: &str,
        user_id: &str,
    ) -> Result<SentTurn, ChatError> {
        require_thread(thread_id)?;
        if content.trim().is_empty() {
            return Err(ChatError::Validation("message content is empty".to_string()));
        }
        let pipeline = self.bootstrapper.ready().await?;

        let user = pipeline
            .repository
            .save_message(from_params(
                content,
                Role::User,
                thread_id,
                user_id,
                SaveOptions::default(),
            ))
            .await?;
        pipeline
            .bus
            .publish(&ChatEvent::user_message_sent(thread_id, user_id, user.clone()));

        let reply = match Self::answer(pipeline, &user).await {
            Ok(reply) => reply,
            Err(e) => {
                pipeline
                    .persist_failure(thread_id, user_id, Some(&user.id), &e)
                    .await;
                return Err(e);
            }
        };
        pipeline.publish_thread_snapshot(thread_id, user_id).await;
        Ok(SentTurn { user, reply })
    }

    async fn answer(pipeline: &Pipeline, user: &StorageMessage) -> Result<StorageMessage, ChatError> {
        let history = pipeline
            .repository
            .get_history_messages(&user.thread_id)
            .await?;
        let history = with_turn(history, user);
        let response = pipeline.model.send_message(&history).await?;
        pipeline
            .record_assistant_turn(&user.thread_id, &user.user_id, response)
            .await
    }

    /// Publish a tool result produced outside the pipeline, e.g. by a client
    /// that ran the tool itself
    pub async fn send_tool_result(
        &self,
        result: ToolResult,
        thread_id: &str,
        user_id: &str,
    ) -> Result<(), ChatError> {
        self.guarded(thread_id, user_id, "send_tool_result", async {
            require_thread(thread_id)?;
            if result.tool_call_id.trim().is_empty() {
                return Err(ChatError::Validation("tool_call_id is required".to_string()));
            }
            self.bootstrapper.ready().await?;
            self.bootstrapper.ensure_listener(EventKind::ToolResultSent)?;

            let outcome = self
                .bootstrapper
                .bus()
                .publish(&ChatEvent::tool_result_sent(thread_id, user_id, result));
            tracing::debug!(
                thread_id = %thread_id,
                delivered = outcome.delivered,
                failed = outcome.failed,
                "Tool result published"
            );
            Ok(())
        })
        .await
    }

    pub async fn display_messages(&self, thread_id: &str) -> Result<Vec<DisplayMessage>, ChatError> {
        require_thread(thread_id)?;
        Ok(self
            .bootstrapper
            .repository()
            .get_display_messages(thread_id)
            .await?)
    }

    /// Remove every message of a thread and announce the empty thread
    pub async fn clear_thread(&self, thread_id: &str, user_id: &str) -> Result<usize, ChatError> {
        self.guarded(thread_id, user_id, "clear_thread", async {
            require_thread(thread_id)?;
            let removed = self
                .bootstrapper
                .repository()
                .clear_messages(thread_id)
                .await?;
            tracing::info!(thread_id = %thread_id, removed, "Thread cleared");
            self.bootstrapper
                .bus()
                .publish(&ChatEvent::messages_updated(thread_id, user_id, Vec::new()));
            Ok(removed)
        })
        .await
    }

    pub fn tool_definitions(&self) -> Vec<ToolDefinition> {
        self.bootstrapper.registry().definitions()
    }

    /// Run `work`; on failure publish `error-occurred` and a fresh snapshot,
    /// then return the error
    async fn guarded<T>(
        &self,
        thread_id: &str,
        user_id: &str,
        context: &str,
        work: impl Future<Output = Result<T, ChatError>>,
    ) -> Result<T, ChatError> {
        let error = match work.await {
            Ok(value) => return Ok(value),
            Err(e) => e,
        };
        tracing::error!(
            thread_id = %thread_id,
            context = %context,
            kind = ?error.kind(),
            error = %error,
            "Message service call failed"
        );
        self.bootstrapper.bus().publish(&ChatEvent::error_occurred(
            thread_id,
            user_id,
            error.kind(),
            error.to_string(),
            context,
        ));
        if let (Some(pipeline), false) = (self.bootstrapper.pipeline(), thread_id.trim().is_empty()) {
            pipeline.publish_thread_snapshot(thread_id, user_id).await;
        }
        Err(error)
    }
}
