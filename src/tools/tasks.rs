//! Task-management tools
//!
//! `create_task`, `list_tasks`, `update_task`, `complete_task`, `delete_task`,
//! all scoped to the calling user.

use super::{ToolCallRequest, ToolDefinition, ToolProcessor, ToolResult};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, PoisonError};
use uuid::Uuid;

const MAX_TITLE_LEN: usize = 200;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Open,
    Completed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    pub user_id: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub status: TaskStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Task persistence, keyed by user
#[async_trait]
pub trait TaskStore: Send + Sync {
    async fn create(
        &self,
        user_id: &str,
        title: &str,
        description: Option<&str>,
    ) -> Result<Task, String>;

    /// Tasks in creation order, optionally filtered by status
    async fn list(&self, user_id: &str, status: Option<TaskStatus>) -> Result<Vec<Task>, String>;

    /// `Ok(None)` when the task does not exist for this user
    async fn update(
        &self,
        user_id: &str,
        task_id: &str,
        title: Option<&str>,
        description: Option<&str>,
    ) -> Result<Option<Task>, String>;

    async fn complete(&self, user_id: &str, task_id: &str) -> Result<Option<Task>, String>;

    /// Returns whether a task was removed
    async fn delete(&self, user_id: &str, task_id: &str) -> Result<bool, String>;
}

#[derive(Default)]
pub struct InMemoryTaskStore {
    /// user id -> tasks in creation order
    tasks: Mutex<BTreeMap<String, Vec<Task>>>,
}

impl InMemoryTaskStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn with_task<R>(
        &self,
        user_id: &str,
        task_id: &str,
        f: impl FnOnce(&mut Task) -> R,
    ) -> Option<R> {
        let mut tasks = self.tasks.lock().unwrap_or_else(PoisonError::into_inner);
        tasks
            .get_mut(user_id)
            .and_then(|list| list.iter_mut().find(|t| t.id == task_id))
            .map(f)
    }
}

#[async_trait]
impl TaskStore for InMemoryTaskStore {
    async fn create(
        &self,
        user_id: &str,
        title: &str,
        description: Option<&str>,
    ) -> Result<Task, String> {
        let now = Utc::now();
        let task = Task {
            id: Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            title: title.to_string(),
            description: description.map(String::from),
            status: TaskStatus::Open,
            created_at: now,
            updated_at: now,
        };
        self.tasks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(user_id.to_string())
            .or_default()
            .push(task.clone());
        Ok(task)
    }

    async fn list(&self, user_id: &str, status: Option<TaskStatus>) -> Result<Vec<Task>, String> {
        let tasks = self.tasks.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(tasks
            .get(user_id)
            .map(|list| {
                list.iter()
                    .filter(|t| status.map_or(true, |s| t.status == s))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn update(
        &self,
        user_id: &str,
        task_id: &str,
        title: Option<&str>,
        description: Option<&str>,
    ) -> Result<Option<Task>, String> {
        Ok(self.with_task(user_id, task_id, |task| {
            if let Some(title) = title {
                task.title = title.to_string();
            }
            if let Some(description) = description {
                task.description = Some(description.to_string());
            }
            task.updated_at = Utc::now();
            task.clone()
        }))
    }

    async fn complete(&self, user_id: &str, task_id: &str) -> Result<Option<Task>, String> {
        Ok(self.with_task(user_id, task_id, |task| {
            task.status = TaskStatus::Completed;
            task.updated_at = Utc::now();
            task.clone()
        }))
    }

    async fn delete(&self, user_id: &str, task_id: &str) -> Result<bool, String> {
        let mut tasks = self.tasks.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(list) = tasks.get_mut(user_id) else {
            return Ok(false);
        };
        let before = list.len();
        list.retain(|t| t.id != task_id);
        Ok(list.len() != before)
    }
}

#[derive(Debug, Deserialize)]
struct CreateTaskInput {
    title: String,
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ListTasksInput {
    status: Option<TaskStatus>,
}

#[derive(Debug, Deserialize)]
struct UpdateTaskInput {
    task_id: String,
    title: Option<String>,
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TaskIdInput {
    task_id: String,
}

pub struct TaskProcessor {
    store: Arc<dyn TaskStore>,
}

impl TaskProcessor {
    pub const TOOLS: [&'static str; 5] = [
        "create_task",
        "list_tasks",
        "update_task",
        "complete_task",
        "delete_task",
    ];

    pub fn new(store: Arc<dyn TaskStore>) -> Self {
        Self { store }
    }

    fn validate_title(title: &str) -> Result<&str, String> {
        let trimmed = title.trim();
        if trimmed.is_empty() {
            return Err("Task title cannot be empty".to_string());
        }
        if trimmed.chars().count() > MAX_TITLE_LEN {
            return Err(format!("Task title must be at most {MAX_TITLE_LEN} characters"));
        }
        Ok(trimmed)
    }

    async fn run(&self, request: &ToolCallRequest, user_id: &str) -> Result<ToolResult, String> {
        let id = &request.id;
        match request.name.as_str() {
            "create_task" => {
                let input: CreateTaskInput = request.parse_arguments()?;
                let title = Self::validate_title(&input.title)?;
                let task = self
                    .store
                    .create(user_id, title, input.description.as_deref())
                    .await?;
                Ok(ToolResult::success(id, format!("Created task \"{}\"", task.title))
                    .with_payload(task_value(&task)))
            }
            "list_tasks" => {
                let input: ListTasksInput = request.parse_arguments()?;
                let tasks = self.store.list(user_id, input.status).await?;
                let message = match tasks.len() {
                    0 => "No tasks".to_string(),
                    1 => "1 task".to_string(),
                    n => format!("{n} tasks"),
                };
                Ok(ToolResult::success(id, message)
                    .with_payload(json!({ "tasks": tasks.iter().map(task_value).collect::<Vec<_>>() })))
            }
            "update_task" => {
                let input: UpdateTaskInput = request.parse_arguments()?;
                if input.title.is_none() && input.description.is_none() {
                    return Err("Nothing to update: provide title or description".to_string());
                }
                let title = input.title.as_deref().map(Self::validate_title).transpose()?;
                let task = self
                    .store
                    .update(user_id, &input.task_id, title, input.description.as_deref())
                    .await?
                    .ok_or_else(|| format!("Task not found: {}", input.task_id))?;
                Ok(ToolResult::success(id, format!("Updated task \"{}\"", task.title))
                    .with_payload(task_value(&task)))
            }
            "complete_task" => {
                let input: TaskIdInput = request.parse_arguments()?;
                let task = self
                    .store
                    .complete(user_id, &input.task_id)
                    .await?
                    .ok_or_else(|| format!("Task not found: {}", input.task_id))?;
                Ok(ToolResult::success(id, format!("Completed task \"{}\"", task.title))
                    .with_payload(task_value(&task)))
            }
            "delete_task" => {
                let input: TaskIdInput = request.parse_arguments()?;
                if self.store.delete(user_id, &input.task_id).await? {
                    Ok(ToolResult::success(id, "Task deleted")
                        .with_payload(json!({ "task_id": input.task_id })))
                } else {
                    Err(format!("Task not found: {}", input.task_id))
                }
            }
            other => Err(format!("tasks cannot handle {other}")),
        }
    }
}

fn task_value(task: &Task) -> Value {
    serde_json::to_value(task).unwrap_or(Value::Null)
}

fn task_id_schema(description: &str) -> Value {
    json!({
        "type": "object",
        "required": ["task_id"],
        "properties": {
            "task_id": { "type": "string", "description": description }
        }
    })
}

#[async_trait]
impl ToolProcessor for TaskProcessor {
    fn name(&self) -> &str {
        "tasks"
    }

    fn definitions(&self) -> Vec<ToolDefinition> {
        vec![
            ToolDefinition::new(
                "create_task",
                "Create a task for the user.",
                json!({
                    "type": "object",
                    "required": ["title"],
                    "properties": {
                        "title": { "type": "string", "maxLength": MAX_TITLE_LEN },
                        "description": { "type": "string" }
                    }
                }),
            ),
            ToolDefinition::new(
                "list_tasks",
                "List the user's tasks, optionally filtered by status.",
                json!({
                    "type": "object",
                    "properties": {
                        "status": { "type": "string", "enum": ["open", "completed"] }
                    }
                }),
            ),
            ToolDefinition::new(
                "update_task",
                "Change the title or description of a task.",
                json!({
                    "type": "object",
                    "required": ["task_id"],
                    "properties": {
                        "task_id": { "type": "string" },
                        "title": { "type": "string", "maxLength": MAX_TITLE_LEN },
                        "description": { "type": "string" }
                    }
                }),
            ),
            ToolDefinition::new(
                "complete_task",
                "Mark a task as completed.",
                task_id_schema("The task to complete"),
            ),
            ToolDefinition::new(
                "delete_task",
                "Delete a task.",
                task_id_schema("The task to delete"),
            ),
        ]
    }

    fn can_process(&self, tool_name: &str) -> bool {
        Self::TOOLS.contains(&tool_name)
    }

    async fn process_tool_call(
        &self,
        request: &ToolCallRequest,
        thread_id: &str,
        user_id: &str,
    ) -> ToolResult {
        match self.run(request, user_id).await {
            Ok(result) => result,
            Err(e) => {
                tracing::debug!(tool = %request.name, thread_id = %thread_id, error = %e, "Task tool failed");
                ToolResult::error(&request.id, e)
            }
        }
    }
}
