//! Sitewright Orchestrator
//!
//! Accepts task requests over HTTP, queues them per task, and runs the
//! creation and update rounds that build and publish each app.

pub mod api;
pub mod config;
pub mod error;
pub mod notify;
pub mod orchestrator;
pub mod queue;
pub mod task;

pub use api::{create_router, ApiError, AppState, TaskResponse, TaskStatus};
pub use config::{
    CallbackConfig, Config, Credentials, GitHubConfig, ModelConfig, QueueConfig, ENV_GEMINI_API_KEY,
    ENV_GITHUB_TOKEN, ENV_OWNER, ENV_TASK_SECRET,
};
pub use error::{Result, SitewrightError};
pub use notify::{EvaluationNotifier, EvaluationPayload, Notifier, NotifyOutcome, RetryPolicy};
pub use orchestrator::{OrchestratorSettings, ProjectOrchestrator, RoundReport};
pub use queue::{TaskHandler, TaskQueue};
pub use task::{Round, TaskKey, TaskRequest};
