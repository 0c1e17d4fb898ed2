//! Nickname tools: `set_nickname` and `clear_nickname`

use super::{ToolCallRequest, ToolDefinition, ToolProcessor, ToolResult};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

pub const MAX_NICKNAME_LEN: usize = 32;

const SET_NICKNAME: &str = "set_nickname";
const CLEAR_NICKNAME: &str = "clear_nickname";

/// Per-user profile storage
#[async_trait]
pub trait ProfileStore: Send + Sync {
    async fn get_nickname(&self, user_id: &str) -> Result<Option<String>, String>;

    async fn set_nickname(&self, user_id: &str, nickname: &str) -> Result<(), String>;

    /// Returns the nickname that was removed, if any
    async fn clear_nickname(&self, user_id: &str) -> Result<Option<String>, String>;
}

#[derive(Default)]
pub struct InMemoryProfileStore {
    nicknames: Mutex<HashMap<String, String>>,
}

impl InMemoryProfileStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ProfileStore for InMemoryProfileStore {
    async fn get_nickname(&self, user_id: &str) -> Result<Option<String>, String> {
        Ok(self
            .nicknames
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(user_id)
            .cloned())
    }

    async fn set_nickname(&self, user_id: &str, nickname: &str) -> Result<(), String> {
        self.nicknames
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(user_id.to_string(), nickname.to_string());
        Ok(())
    }

    async fn clear_nickname(&self, user_id: &str) -> Result<Option<String>, String> {
        Ok(self
            .nicknames
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(user_id))
    }
}

#[derive(Debug, Deserialize)]
struct SetNicknameInput {
    nickname: String,
}

pub struct NicknameProcessor {
    store: Arc<dyn ProfileStore>,
}

impl NicknameProcessor {
    pub fn new(store: Arc<dyn ProfileStore>) -> Self {
        Self { store }
    }

    fn validate(nickname: &str) -> Result<&str, String> {
        let trimmed = nickname.trim();
        if trimmed.is_empty() {
            return Err("Nickname cannot be empty".to_string());
        }
        if trimmed.chars().count() > MAX_NICKNAME_LEN {
            return Err(format!(
                "Nickname must be at most {MAX_NICKNAME_LEN} characters"
            ));
        }
        if trimmed.chars().any(char::is_control) {
            return Err("Nickname cannot contain control characters".to_string());
        }
        Ok(trimmed)
    }

    async fn set(&self, request: &ToolCallRequest, user_id: &str) -> ToolResult {
        let input: SetNicknameInput = match request.parse_arguments() {
            Ok(input) => input,
            Err(e) => return ToolResult::error(&request.id, e),
        };
        let nickname = match Self::validate(&input.nickname) {
            Ok(nickname) => nickname,
            Err(e) => return ToolResult::error(&request.id, e),
        };
        match self.store.set_nickname(user_id, nickname).await {
            Ok(()) => ToolResult::success(&request.id, format!("Nickname set to {nickname}"))
                .with_payload(json!({ "nickname": nickname })),
            Err(e) => ToolResult::error(&request.id, format!("Failed to save nickname: {e}")),
        }
    }

    async fn clear(&self, request: &ToolCallRequest, user_id: &str) -> ToolResult {
        match self.store.clear_nickname(user_id).await {
            Ok(Some(previous)) => ToolResult::success(&request.id, "Nickname cleared")
                .with_payload(json!({ "previous": previous })),
            Ok(None) => ToolResult::success(&request.id, "No nickname was set"),
            Err(e) => ToolResult::error(&request.id, format!("Failed to clear nickname: {e}")),
        }
    }
}

#[async_trait]
impl ToolProcessor for NicknameProcessor {
    fn name(&self) -> &str {
        "nickname"
    }

    fn definitions(&self) -> Vec<ToolDefinition> {
        vec![
            ToolDefinition::new(
                SET_NICKNAME,
                "Set the name the assistant should use for the user.",
                json!({
                    "type": "object",
                    "required": ["nickname"],
                    "properties": {
                        "nickname": {
                            "type": "string",
                            "maxLength": MAX_NICKNAME_LEN,
                            "description": "The nickname to use"
                        }
                    }
                }),
            ),
            ToolDefinition::new(
                CLEAR_NICKNAME,
                "Forget the user's nickname.",
                json!({ "type": "object", "properties": {} }),
            ),
        ]
    }

    fn can_process(&self, tool_name: &str) -> bool {
        matches!(tool_name, SET_NICKNAME | CLEAR_NICKNAME)
    }

    async fn process_tool_call(
        &self,
        request: &ToolCallRequest,
        _thread_id: &str,
        user_id: &str,
    ) -> ToolResult {
        match request.name.as_str() {
            SET_NICKNAME => self.set(request, user_id).await,
            CLEAR_NICKNAME => self.clear(request, user_id).await,
            other => ToolResult::error(&request.id, format!("nickname cannot handle {other}")),
        }
    }
}
