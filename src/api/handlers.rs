//! HTTP request handlers

use super::sse::sse_stream;
use super::types::{
    AcceptedResponse, ClearResponse, ErrorResponse, MessagesResponse, SendMessageRequest,
    SendMessageResponse, ToolResultRequest, ToolsResponse, UserQuery,
};
use super::AppState;
use crate::error::{ChatError, ErrorKind};
use crate::message::to_display;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};

/// Create the API router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route(
            "/api/threads/:id/messages",
            post(send_message).get(list_messages).delete(clear_messages),
        )
        .route("/api/threads/:id/tool-results", post(send_tool_result))
        .route("/api/threads/:id/stream", get(stream_thread))
        .route("/api/tools", get(list_tools))
        .route("/version", get(get_version))
        .with_state(state)
}

// ============================================================
// Messages
// ============================================================

async fn send_message(
    State(state): State<AppState>,
    Path(thread_id): Path<String>,
    Json(req): Json<SendMessageRequest>,
) -> Result<Json<SendMessageResponse>, AppError> {
    let turn = state
        .service
        .send_user_message(&req.content, &thread_id, &req.user_id)
        .await?;
    Ok(Json(SendMessageResponse {
        user: to_display(&turn.user),
        reply: to_display(&turn.reply),
    }))
}

async fn list_messages(
    State(state): State<AppState>,
    Path(thread_id): Path<String>,
) -> Result<Json<MessagesResponse>, AppError> {
    let messages = state.service.display_messages(&thread_id).await?;
    Ok(Json(MessagesResponse { messages }))
}

async fn clear_messages(
    State(state): State<AppState>,
    Path(thread_id): Path<String>,
    Query(query): Query<UserQuery>,
) -> Result<Json<ClearResponse>, AppError> {
    let removed = state
        .service
        .clear_thread(&thread_id, &query.user_id)
        .await?;
    Ok(Json(ClearResponse { removed }))
}

// ============================================================
// Tool Results
// ============================================================

async fn send_tool_result(
    State(state): State<AppState>,
    Path(thread_id): Path<String>,
    Json(req): Json<ToolResultRequest>,
) -> Result<(StatusCode, Json<AcceptedResponse>), AppError> {
    state
        .service
        .send_tool_result(req.result, &thread_id, &req.user_id)
        .await?;
    Ok((StatusCode::ACCEPTED, Json(AcceptedResponse { accepted: true })))
}

// ============================================================
// Streaming
// ============================================================

async fn stream_thread(
    State(state): State<AppState>,
    Path(thread_id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    // Subscribe before the snapshot so nothing falls between them
    let rx = state.events.subscribe();
    let messages = state.service.display_messages(&thread_id).await?;
    Ok(sse_stream(thread_id, messages, rx))
}

// ============================================================
// Catalog
// ============================================================

async fn list_tools(State(state): State<AppState>) -> Json<ToolsResponse> {
    Json(ToolsResponse {
        tools: state.service.tool_definitions(),
    })
}

async fn get_version() -> &'static str {
    concat!("parley ", env!("CARGO_PKG_VERSION"))
}

// ============================================================
// Error Handling
// ============================================================

#[derive(Debug)]
pub enum AppError {
    BadRequest(String),
    NotFound(String),
    Upstream(String),
    Unavailable(String),
}

impl From<ChatError> for AppError {
    fn from(e: ChatError) -> Self {
        let message = e.to_string();
        match e.kind() {
            ErrorKind::Validation => AppError::BadRequest(message),
            ErrorKind::NotFound => AppError::NotFound(message),
            ErrorKind::Upstream => AppError::Upstream(message),
            ErrorKind::Configuration => AppError::Unavailable(message),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, kind, message) = match self {
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "validation", msg),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, "not_found", msg),
            AppError::Upstream(msg) => (StatusCode::BAD_GATEWAY, "upstream", msg),
            AppError::Unavailable(msg) => (StatusCode::SERVICE_UNAVAILABLE, "configuration", msg),
        };

        let body = Json(ErrorResponse::new(kind, message));
        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ModelError;
    use crate::orchestrator::testing::Harness;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use serde_json::{json, Value};
    use tower::ServiceExt;

    fn router(harness: &Harness) -> Router {
        create_router(AppState::new(harness.service.clone()))
    }

    async fn call(router: Router, request: Request<Body>) -> (StatusCode, Value) {
        let response = router.oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, body)
    }

    fn post_json(uri: &str, body: &Value) -> Request<Body> {
        Request::post(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn test_send_and_list_messages() {
        let h = Harness::builder().build();
        h.model.queue_text("hi");

        let (status, body) = call(
            router(&h),
            post_json("/api/threads/t1/messages", &json!({"content": "hello", "user_id": "u1"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["user"]["content"], "hello");
        assert_eq!(body["reply"]["content"], "hi");

        let (status, body) = call(
            router(&h),
            Request::get("/api/threads/t1/messages").body(Body::empty()).unwrap(),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["messages"].as_array().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_errors_map_to_status_codes() {
        let h = Harness::builder().build();
        h.model.queue_error(ModelError::server_error("down"));

        let (status, body) = call(
            router(&h),
            post_json("/api/threads/t1/messages", &json!({"content": "hello"})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_GATEWAY);
        assert_eq!(body["kind"], "upstream");

        let (status, _) = call(
            router(&h),
            post_json("/api/threads/t1/messages", &json!({"content": "  "})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let unwired = Harness::builder().without_model().build();
        let (status, body) = call(
            router(&unwired),
            post_json("/api/threads/t1/messages", &json!({"content": "hello"})),
        )
        .await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body["kind"], "configuration");
    }

    #[tokio::test]
    async fn test_tool_result_is_accepted() {
        let h = Harness::builder().build();
        h.model.queue_text("thanks");

        let (status, body) = call(
            router(&h),
            post_json(
                "/api/threads/t1/tool-results",
                &json!({
                    "user_id": "u1",
                    "result": {"tool_call_id": "c1", "status": "success", "message": "ok"}
                }),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::ACCEPTED);
        assert_eq!(body["accepted"], true);

        h.settle().await;
        assert_eq!(h.model.call_count(), 1);
    }

    #[tokio::test]
    async fn test_clear_and_catalog() {
        let h = Harness::builder().build();
        h.model.queue_text("hi");
        h.service.send_user_message("hello", "t1", "u1").await.unwrap();

        let (status, body) = call(
            router(&h),
            Request::delete("/api/threads/t1/messages?user_id=u1")
                .body(Body::empty())
                .unwrap(),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["removed"], 2);

        let (status, body) = call(
            router(&h),
            Request::get("/api/tools").body(Body::empty()).unwrap(),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let names: Vec<&str> = body["tools"]
            .as_array()
            .unwrap()
            .iter()
            .filter_map(|t| t["name"].as_str())
            .collect();
        assert_eq!(names, ["set_nickname", "clear_nickname"]);
    }
}
