//! HTTP transport to a model gateway.
//!
//! The gateway owns the provider protocol. This client posts the history and
//! the tool catalog as JSON and expects one assistant turn back in the
//! model-history shape.

use super::{ModelClient, ModelError};
use crate::message::{ModelHistoryMessage, Role};
use crate::tools::ToolDefinition;
use async_trait::async_trait;
use serde::Serialize;
use std::time::Duration;

#[derive(Serialize)]
struct GatewayRequest<'a> {
    messages: &'a [ModelHistoryMessage],
    #[serde(skip_serializing_if = "no_tools")]
    tools: &'a [ToolDefinition],
}

fn no_tools(tools: &&[ToolDefinition]) -> bool {
    tools.is_empty()
}

pub struct GatewayModelClient {
    client: reqwest::Client,
    url: String,
    tools: Vec<ToolDefinition>,
}

impl GatewayModelClient {
    pub fn new(
        url: impl Into<String>,
        tools: Vec<ToolDefinition>,
        connect_timeout: Duration,
    ) -> Result<Self, ModelError> {
        let client = reqwest::Client::builder()
            .connect_timeout(connect_timeout)
            .build()
            .map_err(|e| ModelError::unavailable(format!("Failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            url: url.into(),
            tools,
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    fn classify_error(status: reqwest::StatusCode, body: &str) -> ModelError {
        match status.as_u16() {
            401 | 403 => ModelError::auth(format!("Authentication failed: {body}")),
            429 => {
                let mut err = ModelError::rate_limit(format!("Rate limited: {body}"));
                if let Some(retry_after) = serde_json::from_str::<serde_json::Value>(body)
                    .ok()
                    .and_then(|v| v.get("retry_after").and_then(serde_json::Value::as_f64))
                {
                    err = err.with_retry_after(Duration::from_secs_f64(retry_after));
                }
                err
            }
            400 => ModelError::invalid_request(format!("Invalid request: {body}")),
            500..=599 => ModelError::server_error(format!("Server error: {body}")),
            _ => ModelError::invalid_response(format!("HTTP {status}: {body}")),
        }
    }

    fn decode(body: &str) -> Result<ModelHistoryMessage, ModelError> {
        let turn: ModelHistoryMessage = serde_json::from_str(body).map_err(|e| {
            ModelError::invalid_response(format!("Failed to parse response: {e} - body: {body}"))
        })?;
        if turn.role != Role::Assistant {
            return Err(ModelError::invalid_response(format!(
                "expected an assistant turn, got {}",
                turn.role
            )));
        }
        if !turn.is_well_formed() {
            return Err(ModelError::invalid_response(
                "content must be null exactly when tool_calls are present",
            ));
        }
        Ok(turn)
    }
}

#[async_trait]
impl ModelClient for GatewayModelClient {
    async fn send_message(
        &self,
        history: &[ModelHistoryMessage],
    ) -> Result<ModelHistoryMessage, ModelError> {
        let request = GatewayRequest {
            messages: history,
            tools: &self.tools,
        };

        let response = self
            .client
            .post(&self.url)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ModelError::network(format!("Request timeout: {e}"))
                } else if e.is_connect() {
                    ModelError::network(format!("Connection failed: {e}"))
                } else {
                    ModelError::unavailable(format!("Request failed: {e}"))
                }
            })?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| ModelError::network(format!("Failed to read response: {e}")))?;

        if !status.is_success() {
            return Err(Self::classify_error(status, &body));
        }
        Self::decode(&body)
    }

    fn name(&self) -> &str {
        "gateway"
    }
}
