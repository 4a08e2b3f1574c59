//! HTTP API for the Sitewright service.
//!
//! # Endpoints
//!
//! - `POST /handle_task` - Accept a task request for background execution
//! - `GET /health` - Liveness check
//! - `GET /` - Landing page
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use sitewright_orchestrator::{create_router, AppState, Config, ProjectOrchestrator, TaskQueue};
//!
//! # async fn example(config: Config) -> sitewright_orchestrator::Result<()> {
//! let orchestrator = Arc::new(ProjectOrchestrator::from_config(&config)?);
//! let queue = TaskQueue::new(orchestrator, config.queue.max_concurrent_tasks);
//! let router = create_router(AppState::new(&config, queue));
//!
//! let listener = tokio::net::TcpListener::bind(config.bind_address()).await?;
//! axum::serve(listener, router).await?;
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    response::{Html, IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::{info, warn};

use crate::{Config, Round, SitewrightError, TaskQueue, TaskRequest};

// ============================================================================
// Request/Response Types
// ============================================================================

/// Status field of every task response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    /// The request was queued.
    Accepted,
    /// The request was rejected.
    Error,
}

/// Response body for `POST /handle_task`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskResponse {
    /// Whether the request was accepted.
    pub status: TaskStatus,
    /// Echoed task identifier, on acceptance.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task: Option<String>,
    /// Echoed round, on acceptance.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub round: Option<Round>,
    /// Reason for rejection.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl TaskResponse {
    fn accepted(request: &TaskRequest) -> Self {
        Self {
            status: TaskStatus::Accepted,
            task: Some(request.task.clone()),
            round: Some(request.round),
            message: None,
        }
    }

    fn error(message: impl Into<String>) -> Self {
        Self {
            status: TaskStatus::Error,
            task: None,
            round: None,
            message: Some(message.into()),
        }
    }
}

// ============================================================================
// Application State
// ============================================================================

/// Shared application state for the HTTP server.
#[derive(Debug, Clone)]
pub struct AppState {
    /// Secret every request must present.
    task_secret: Arc<str>,
    /// Status code used for secret mismatches.
    auth_failure_status: StatusCode,
    /// Background queue the accepted requests go to.
    queue: TaskQueue,
}

impl AppState {
    /// Creates state from configuration and a queue.
    #[must_use]
    pub fn new(config: &Config, queue: TaskQueue) -> Self {
        let auth_failure_status = if config.strict_auth_status {
            StatusCode::UNAUTHORIZED
        } else {
            StatusCode::OK
        };
        Self {
            task_secret: Arc::from(config.credentials.task_secret.as_str()),
            auth_failure_status,
            queue,
        }
    }
}

// ============================================================================
// API Error Type
// ============================================================================

/// Error type for API handlers.
#[derive(Debug)]
pub enum ApiError {
    /// The body is not a valid task request.
    BadRequest(String),
    /// The secret did not match; carries the status to answer with.
    Unauthorized(StatusCode),
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::BadRequest(rejection.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            Self::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            Self::Unauthorized(status) => (status, SitewrightError::Unauthorized.to_string()),
        };
        (status, Json(TaskResponse::error(message))).into_response()
    }
}

// ============================================================================
// Router Setup
// ============================================================================

/// Creates the HTTP router with all endpoints, CORS and request tracing.
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/", get(handle_index))
        .route("/health", get(handle_health))
        .route("/handle_task", post(handle_task))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(Arc::new(state))
}

// ============================================================================
// Handlers
// ============================================================================

/// Handler for `POST /handle_task`.
///
/// Rejects bad secrets before anything is queued, then acknowledges while the
/// round runs in the background.
async fn handle_task(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<TaskRequest>, JsonRejection>,
) -> Result<Json<TaskResponse>, ApiError> {
    let Json(request) = payload?;

    if !request.secret_matches(&state.task_secret) {
        warn!(task = %request.task, round = %request.round, "Rejected task with invalid secret");
        return Err(ApiError::Unauthorized(state.auth_failure_status));
    }

    request
        .validate()
        .map_err(|e| ApiError::BadRequest(e.to_string()))?;

    info!(
        task = %request.task,
        round = %request.round,
        nonce = %request.nonce,
        checks = request.checks.len(),
        attachments = request.attachments.len(),
        "Accepted task"
    );

    let response = TaskResponse::accepted(&request);
    state.queue.submit(request);
    Ok(Json(response))
}

/// Handler for `GET /health`.
async fn handle_health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

/// Handler for `GET /`.
async fn handle_index() -> Html<&'static str> {
    Html(
        "<!doctype html><html><head><title>Sitewright</title></head>\
         <body><h1>Sitewright is running</h1>\
         <p>POST task requests to <code>/handle_task</code>.</p></body></html>",
    )
}
