//! Mock collaborators for orchestration tests

use super::bootstrap::Bootstrapper;
use super::service::MessageService;
use crate::events::{ChatEvent, EventBus, EventKind};
use crate::message::{ModelHistoryMessage, ModelToolCall, NewMessage, StorageMessage};
use crate::model::{ModelClient, ModelError};
use crate::repository::{InMemoryRepository, MessageQuery, MessageRepository, MessageUpdate, RepositoryError};
use crate::tools::{ProcessorRegistry, ToolCallRequest, ToolDefinition, ToolProcessor, ToolResult};
use async_trait::async_trait;
use serde_json::json;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

// ============================================================================
// Mock Model Client
// ============================================================================

/// Model client that returns queued responses and records every history
#[derive(Default)]
pub struct MockModelClient {
    responses: Mutex<VecDeque<Result<ModelHistoryMessage, ModelError>>>,
    requests: Mutex<Vec<Vec<ModelHistoryMessage>>>,
}

impl MockModelClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn queue_text(&self, content: &str) {
        self.responses
            .lock()
            .unwrap()
            .push_back(Ok(ModelHistoryMessage::assistant(content)));
    }

    pub fn queue_tool_calls(&self, calls: Vec<ModelToolCall>) {
        self.responses
            .lock()
            .unwrap()
            .push_back(Ok(ModelHistoryMessage::with_tool_calls(calls)));
    }

    pub fn queue_error(&self, error: ModelError) {
        self.responses.lock().unwrap().push_back(Err(error));
    }

    pub fn requests(&self) -> Vec<Vec<ModelHistoryMessage>> {
        self.requests.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

#[async_trait]
impl ModelClient for MockModelClient {
    async fn send_message(
        &self,
        history: &[ModelHistoryMessage],
    ) -> Result<ModelHistoryMessage, ModelError> {
        self.requests.lock().unwrap().push(history.to_vec());
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(ModelError::unavailable("No mock response queued")))
    }

    fn name(&self) -> &str {
        "mock"
    }
}

pub fn tool_call(id: &str, name: &str, arguments: serde_json::Value) -> ModelToolCall {
    ModelToolCall {
        id: id.to_string(),
        name: name.to_string(),
        arguments: arguments.to_string(),
    }
}

// ============================================================================
// Processors
// ============================================================================

/// Succeeds for its tool names and records each call
pub struct RecordingProcessor {
    tools: Vec<String>,
    calls: Mutex<Vec<(ToolCallRequest, String, String)>>,
}

impl RecordingProcessor {
    pub fn new(tools: &[&str]) -> Self {
        Self {
            tools: tools.iter().map(ToString::to_string).collect(),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// `(request, thread_id, user_id)` per call
    pub fn calls(&self) -> Vec<(ToolCallRequest, String, String)> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl ToolProcessor for RecordingProcessor {
    fn name(&self) -> &str {
        "recording"
    }

    fn definitions(&self) -> Vec<ToolDefinition> {
        self.tools
            .iter()
            .map(|name| {
                ToolDefinition::new(
                    name,
                    format!("Mock {name}"),
                    json!({ "type": "object", "properties": {} }),
                )
            })
            .collect()
    }

    async fn process_tool_call(
        &self,
        request: &ToolCallRequest,
        thread_id: &str,
        user_id: &str,
    ) -> ToolResult {
        self.calls.lock().unwrap().push((
            request.clone(),
            thread_id.to_string(),
            user_id.to_string(),
        ));
        ToolResult::success(&request.id, format!("{} done", request.name))
    }
}

/// Panics for its one tool name
pub struct PanickingProcessor {
    tool: String,
}

impl PanickingProcessor {
    pub fn new(tool: &str) -> Self {
        Self {
            tool: tool.to_string(),
        }
    }
}

#[async_trait]
impl ToolProcessor for PanickingProcessor {
    fn name(&self) -> &str {
        "panicking"
    }

    fn definitions(&self) -> Vec<ToolDefinition> {
        vec![ToolDefinition::new(&self.tool, "Always panics", json!({ "type": "object" }))]
    }

    async fn process_tool_call(
        &self,
        request: &ToolCallRequest,
        _thread_id: &str,
        _user_id: &str,
    ) -> ToolResult {
        panic!("{} blew up", request.name);
    }
}

// ============================================================================
// Event Recorder
// ============================================================================

/// Wildcard listener that keeps every published event
#[derive(Clone, Default)]
pub struct EventRecorder {
    events: Arc<Mutex<Vec<ChatEvent>>>,
}

impl EventRecorder {
    pub fn attach(bus: &EventBus) -> Self {
        let recorder = Self::default();
        let events = Arc::clone(&recorder.events);
        bus.subscribe_all(move |event| {
            events.lock().unwrap().push(event.clone());
            Ok(())
        });
        recorder
    }

    pub fn events(&self) -> Vec<ChatEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn of_kind(&self, kind: EventKind) -> Vec<ChatEvent> {
        self.events()
            .into_iter()
            .filter(|e| e.kind() == kind)
            .collect()
    }

    pub fn kinds(&self) -> Vec<EventKind> {
        self.events().iter().map(ChatEvent::kind).collect()
    }
}

// ============================================================================
// Lagging Repository
// ============================================================================

/// Reads miss the newest `lag` messages of a thread, as a replica that has
/// not caught up would. Writes and the tool-result lookup go straight through.
pub struct LaggingRepository {
    inner: Arc<InMemoryRepository>,
    lag: usize,
}

impl LaggingRepository {
    pub fn new(inner: Arc<InMemoryRepository>, lag: usize) -> Self {
        Self { inner, lag }
    }
}

#[async_trait]
impl MessageRepository for LaggingRepository {
    async fn get_messages(
        &self,
        thread_id: &str,
        query: MessageQuery,
    ) -> Result<Vec<StorageMessage>, RepositoryError> {
        let mut all = self.inner.all_messages(thread_id);
        all.truncate(all.len().saturating_sub(self.lag));
        Ok(query.apply(&all))
    }

    async fn save_message(&self, message: NewMessage) -> Result<StorageMessage, RepositoryError> {
        self.inner.save_message(message).await
    }

    async fn update_message(
        &self,
        message_id: &str,
        update: MessageUpdate,
    ) -> Result<StorageMessage, RepositoryError> {
        self.inner.update_message(message_id, update).await
    }

    async fn clear_messages(&self, thread_id: &str) -> Result<usize, RepositoryError> {
        self.inner.clear_messages(thread_id).await
    }

    async fn find_tool_message(
        &self,
        thread_id: &str,
        tool_call_id: &str,
        scan_limit: usize,
    ) -> Result<Option<StorageMessage>, RepositoryError> {
        self.inner
            .find_tool_message(thread_id, tool_call_id, scan_limit)
            .await
    }
}

// ============================================================================
// Test Harness
// ============================================================================

/// A fully wired service over mocks
pub struct Harness {
    pub service: MessageService,
    pub bootstrapper: Arc<Bootstrapper>,
    pub repository: Arc<InMemoryRepository>,
    pub model: Arc<MockModelClient>,
    pub processor: Arc<RecordingProcessor>,
    pub recorder: EventRecorder,
}

impl Harness {
    pub fn builder() -> HarnessBuilder {
        HarnessBuilder::default()
    }

    /// Let background handler work finish
    pub async fn settle(&self) {
        self.bootstrapper.wait_idle().await;
    }
}

#[derive(Default)]
pub struct HarnessBuilder {
    lag: usize,
    without_model: bool,
    extra_processors: Vec<Arc<dyn ToolProcessor>>,
}

impl HarnessBuilder {
    /// Reads trail writes by `lag` messages
    pub fn with_lag(mut self, lag: usize) -> Self {
        self.lag = lag;
        self
    }

    /// Leave the model client uninstalled
    pub fn without_model(mut self) -> Self {
        self.without_model = true;
        self
    }

    pub fn with_processor(mut self, processor: Arc<dyn ToolProcessor>) -> Self {
        self.extra_processors.push(processor);
        self
    }

    pub fn build(self) -> Harness {
        let bus = EventBus::new();
        let recorder = EventRecorder::attach(&bus);

        let processor = Arc::new(RecordingProcessor::new(&["set_nickname", "clear_nickname"]));
        let registry = Arc::new(ProcessorRegistry::new());
        registry.register_processor(processor.clone());
        for extra in self.extra_processors {
            registry.register_processor(extra);
        }

        let repository = Arc::new(InMemoryRepository::new());
        let store: Arc<dyn MessageRepository> = if self.lag > 0 {
            Arc::new(LaggingRepository::new(repository.clone(), self.lag))
        } else {
            repository.clone()
        };

        let model = Arc::new(MockModelClient::new());
        let mut bootstrapper = Bootstrapper::new(bus, registry, store);
        if !self.without_model {
            bootstrapper = bootstrapper.with_model_client(model.clone());
        }
        let bootstrapper = Arc::new(bootstrapper);

        Harness {
            service: MessageService::new(Arc::clone(&bootstrapper)),
            bootstrapper,
            repository,
            model,
            processor,
            recorder,
        }
    }
}
