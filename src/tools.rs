//! Tool processors and the registry that resolves them by name
//!
//! A processor owns one or more tool names. It never fails outward: bad input
//! and internal errors come back as a [`ToolResult`] with `status = error`.

mod nickname;
mod tasks;

pub use nickname::{InMemoryProfileStore, NicknameProcessor, ProfileStore, MAX_NICKNAME_LEN};
pub use tasks::{InMemoryTaskStore, Task, TaskProcessor, TaskStatus, TaskStore};

use crate::message::{ContentError, ModelToolCall, StructuredContent, ToolStatus};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashSet;
use std::sync::{Arc, PoisonError, RwLock};

/// A model-issued request to run a named tool
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallRequest {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub arguments: Map<String, Value>,
}

impl ToolCallRequest {
    pub fn new(id: impl Into<String>, name: impl Into<String>, arguments: Map<String, Value>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            arguments,
        }
    }

    /// Decode the JSON-encoded arguments of a model tool call.
    /// Empty arguments are treated as `{}`.
    pub fn from_model_call(call: &ModelToolCall) -> Result<Self, ContentError> {
        let arguments = if call.arguments.trim().is_empty() {
            Map::new()
        } else {
            match serde_json::from_str(&call.arguments).map_err(ContentError::Malformed)? {
                Value::Object(map) => map,
                other => {
                    return Err(ContentError::Invalid(format!(
                        "arguments for {} must be an object, got {other}",
                        call.name
                    )))
                }
            }
        };
        Ok(Self::new(&call.id, &call.name, arguments))
    }

    /// Deserialize the arguments into a typed input
    pub fn parse_arguments<T: DeserializeOwned>(&self) -> Result<T, String> {
        serde_json::from_value(Value::Object(self.arguments.clone()))
            .map_err(|e| format!("Invalid input for {}: {e}", self.name))
    }
}

/// Outcome of one tool call, persisted as a `tool` turn
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResult {
    pub tool_call_id: String,
    pub status: ToolStatus,
    #[serde(default)]
    pub payload: Value,
    pub message: String,
}

impl ToolResult {
    pub fn success(tool_call_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            tool_call_id: tool_call_id.into(),
            status: ToolStatus::Success,
            payload: Value::Null,
            message: message.into(),
        }
    }

    pub fn error(tool_call_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            tool_call_id: tool_call_id.into(),
            status: ToolStatus::Error,
            payload: Value::Null,
            message: message.into(),
        }
    }

    pub fn with_payload(mut self, payload: Value) -> Self {
        self.payload = payload;
        self
    }

    pub fn is_success(&self) -> bool {
        self.status == ToolStatus::Success
    }

    /// Structured `tool_result` content for storage
    pub fn to_content(&self) -> StructuredContent {
        StructuredContent::ToolResult {
            tool_call_id: self.tool_call_id.clone(),
            status: self.status,
            message: self.message.clone(),
            payload: (!self.payload.is_null()).then(|| self.payload.clone()),
        }
    }
}

/// Tool description advertised to the model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub input_schema: Value,
}

impl ToolDefinition {
    pub fn new(name: impl Into<String>, description: impl Into<String>, input_schema: Value) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            input_schema,
        }
    }
}

#[async_trait]
pub trait ToolProcessor: Send + Sync {
    /// Processor name for logs
    fn name(&self) -> &str;

    /// Tools this processor advertises
    fn definitions(&self) -> Vec<ToolDefinition>;

    /// Whether this processor accepts `tool_name`
    fn can_process(&self, tool_name: &str) -> bool {
        self.definitions().iter().any(|d| d.name == tool_name)
    }

    /// Run the call. Failures are reported in the returned result.
    async fn process_tool_call(
        &self,
        request: &ToolCallRequest,
        thread_id: &str,
        user_id: &str,
    ) -> ToolResult;
}

/// Ordered processor list; the first processor accepting a name wins
#[derive(Default)]
pub struct ProcessorRegistry {
    processors: RwLock<Vec<Arc<dyn ToolProcessor>>>,
}

impl ProcessorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the processors that ship with the crate
    pub fn standard(profiles: Arc<dyn ProfileStore>, tasks: Arc<dyn TaskStore>) -> Self {
        let registry = Self::new();
        registry.register_processor(Arc::new(NicknameProcessor::new(profiles)));
        registry.register_processor(Arc::new(TaskProcessor::new(tasks)));
        registry
    }

    /// Append a processor. Duplicates are kept; earlier ones shadow later ones.
    pub fn register_processor(&self, processor: Arc<dyn ToolProcessor>) {
        tracing::debug!(processor = %processor.name(), "Processor registered");
        self.processors
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(processor);
    }

    pub fn get_processor(&self, tool_name: &str) -> Option<Arc<dyn ToolProcessor>> {
        self.processors
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .find(|p| p.can_process(tool_name))
            .cloned()
    }

    /// Snapshot of the registered processors; changes to it do not affect the registry
    pub fn all_processors(&self) -> Vec<Arc<dyn ToolProcessor>> {
        self.processors
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Catalog for the model. A name shadowed by an earlier processor is listed once.
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        let mut seen = HashSet::new();
        self.all_processors()
            .iter()
            .flat_map(|p| p.definitions())
            .filter(|d| seen.insert(d.name.clone()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.processors
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
