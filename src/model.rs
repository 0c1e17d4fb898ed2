//! Model Client abstraction
//!
//! The orchestrator hands a model-history array to a [`ModelClient`] and gets
//! back one assistant turn. Provider protocols live behind the trait.

mod error;
mod gateway;

pub use error::{ModelError, ModelErrorKind};
pub use gateway::GatewayModelClient;

use crate::message::ModelHistoryMessage;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::{Duration, Instant};

#[async_trait]
pub trait ModelClient: Send + Sync {
    /// Send the full history, receive one assistant turn (text and/or tool calls)
    async fn send_message(
        &self,
        history: &[ModelHistoryMessage],
    ) -> Result<ModelHistoryMessage, ModelError>;

    /// Identifier used in logs
    fn name(&self) -> &str;
}

#[async_trait]
impl<T: ModelClient + ?Sized> ModelClient for Arc<T> {
    async fn send_message(
        &self,
        history: &[ModelHistoryMessage],
    ) -> Result<ModelHistoryMessage, ModelError> {
        (**self).send_message(history).await
    }

    fn name(&self) -> &str {
        (**self).name()
    }
}

/// Logging wrapper for model clients
pub struct LoggingModelClient {
    inner: Arc<dyn ModelClient>,
    name: String,
}

impl LoggingModelClient {
    pub fn new(inner: Arc<dyn ModelClient>) -> Self {
        let name = inner.name().to_string();
        Self { inner, name }
    }
}

#[async_trait]
impl ModelClient for LoggingModelClient {
    async fn send_message(
        &self,
        history: &[ModelHistoryMessage],
    ) -> Result<ModelHistoryMessage, ModelError> {
        let start = Instant::now();
        let result = self.inner.send_message(history).await;
        let duration = start.elapsed();

        match &result {
            Ok(response) => {
                tracing::info!(
                    model = %self.name,
                    duration_ms = %duration.as_millis(),
                    history_len = history.len(),
                    tool_calls = response.tool_calls.len(),
                    "Model request completed"
                );
            }
            Err(e) => {
                tracing::error!(
                    model = %self.name,
                    duration_ms = %duration.as_millis(),
                    error = %e.message,
                    retryable = e.is_retryable(),
                    "Model request failed"
                );
            }
        }

        result
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Bounds each call; the orchestrator itself never times out
pub struct TimeoutModelClient {
    inner: Arc<dyn ModelClient>,
    timeout: Duration,
}

impl TimeoutModelClient {
    pub fn new(inner: Arc<dyn ModelClient>, timeout: Duration) -> Self {
        Self { inner, timeout }
    }
}

#[async_trait]
impl ModelClient for TimeoutModelClient {
    async fn send_message(
        &self,
        history: &[ModelHistoryMessage],
    ) -> Result<ModelHistoryMessage, ModelError> {
        tokio::time::timeout(self.timeout, self.inner.send_message(history))
            .await
            .map_err(|_| ModelError::timeout(self.timeout))?
    }

    fn name(&self) -> &str {
        self.inner.name()
    }
}
