//! Tool Call Event Handler
//!
//! Every `tool-call-received` yields exactly one `tool-result-sent`. A missing
//! processor or a panicking one becomes an error result; nothing is
//! deduplicated.

use super::spawn_listener_work;
use crate::error::ChatError;
use crate::events::{panic_message, ChatEvent, EventBus, EventPayload, ListenerError, ListenerResult};
use crate::tools::{ProcessorRegistry, ToolCallRequest, ToolResult};
use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;
use tokio_util::task::TaskTracker;

#[derive(Clone)]
pub struct ToolCallHandler {
    bus: EventBus,
    registry: Arc<ProcessorRegistry>,
}

impl ToolCallHandler {
    pub fn new(bus: EventBus, registry: Arc<ProcessorRegistry>) -> Self {
        Self { bus, registry }
    }

    /// Resolve a processor and run the call
    pub async fn dispatch(
        &self,
        request: &ToolCallRequest,
        thread_id: &str,
        user_id: &str,
    ) -> ToolResult {
        let Some(processor) = self.registry.get_processor(&request.name) else {
            let err = ChatError::NotFound(request.name.clone());
            tracing::warn!(
                thread_id = %thread_id,
                tool = %request.name,
                tool_call_id = %request.id,
                "No processor for tool"
            );
            return ToolResult::error(&request.id, err.to_string());
        };

        let start = Instant::now();
        let outcome = AssertUnwindSafe(processor.process_tool_call(request, thread_id, user_id))
            .catch_unwind()
            .await;
        let mut result = match outcome {
            Ok(result) => result,
            Err(panic) => {
                let message = panic_message(panic.as_ref());
                tracing::error!(
                    thread_id = %thread_id,
                    tool = %request.name,
                    processor = %processor.name(),
                    panic = %message,
                    "Processor panicked"
                );
                ToolResult::error(&request.id, format!("Tool {} failed: {message}", request.name))
            }
        };
        // The result must answer the call that was dispatched
        if result.tool_call_id != request.id {
            result.tool_call_id.clone_from(&request.id);
        }

        tracing::info!(
            thread_id = %thread_id,
            tool = %request.name,
            tool_call_id = %request.id,
            processor = %processor.name(),
            status = %result.status.as_str(),
            duration_ms = %start.elapsed().as_millis(),
            "Tool call processed"
        );
        result
    }

    /// Dispatch, then publish the result with a blank message id
    pub async fn handle(
        &self,
        request: &ToolCallRequest,
        thread_id: &str,
        user_id: &str,
    ) -> ToolResult {
        let result = self.dispatch(request, thread_id, user_id).await;
        self.bus
            .publish(&ChatEvent::tool_result_sent(thread_id, user_id, result.clone()));
        result
    }

    /// Bus listener that runs `handle` on `tracker`
    pub fn into_listener(
        self,
        tracker: TaskTracker,
    ) -> impl Fn(&ChatEvent) -> ListenerResult + Send + Sync + 'static {
        move |event: &ChatEvent| {
            let EventPayload::ToolCallReceived { tool_call, .. } = &event.payload else {
                return Err(ListenerError::new(format!(
                    "tool call handler received {}",
                    event.kind()
                )));
            };
            let handler = self.clone();
            let request = tool_call.clone();
            let thread_id = event.thread_id.clone();
            let user_id = event.user_id.clone();
            spawn_listener_work(&tracker, async move {
                handler.handle(&request, &thread_id, &user_id).await;
            })
        }
    }
}
