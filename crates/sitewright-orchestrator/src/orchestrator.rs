//! Round execution.
//!
//! [`ProjectOrchestrator`] drives both rounds against the hosting, publishing,
//! code generation and notification seams. Individual step failures are
//! logged and the round carries on. A round-1 generation that yields no files
//! ends the round early, as do the round-2 preconditions. A round-2
//! generation that yields nothing still reports back with zero pushes.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use sitewright_codegen::{CodeGenerator, GeminiModel, GenerationMode, GenerationRequest};
use sitewright_hosting::{
    fetch_snapshot, pages_url, FileWrite, GitHubClient, PublishOutcome, PushOutcome, PushResult,
    RepositoryHost, SitePublisher,
};
use tracing::{info, instrument, warn};

use crate::config::Config;
use crate::error::{Result, SitewrightError};
use crate::notify::{EvaluationNotifier, EvaluationPayload, Notifier, NotifyOutcome};
use crate::queue::TaskHandler;
use crate::task::{Round, TaskRequest};

/// Tunables the orchestrator needs from configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrchestratorSettings {
    /// Branch holding the site.
    pub branch: String,
    /// Concurrent blob reads when building a snapshot.
    pub snapshot_concurrency: usize,
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self {
            branch: "main".to_string(),
            snapshot_concurrency: 4,
        }
    }
}

/// Summary of one executed round.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RoundReport {
    /// Target repository.
    pub repo: String,
    /// Round that ran.
    pub round: Round,
    /// When the round started.
    pub started_at: DateTime<Utc>,
    /// Per-file push results, in generation order.
    pub pushes: Vec<PushResult>,
    /// Pages enablement result, when attempted and successful.
    pub pages: Option<PublishOutcome>,
    /// Workflow upsert result, when attempted and successful.
    pub workflow: Option<PushOutcome>,
    /// Callback outcome; `None` when the round ended before notifying.
    #[serde(skip)]
    pub notification: Option<NotifyOutcome>,
    /// Why the round stopped early, if it did.
    pub aborted: Option<String>,
}

impl RoundReport {
    fn new(repo: &str, round: Round) -> Self {
        Self {
            repo: repo.to_string(),
            round,
            started_at: Utc::now(),
            pushes: Vec::new(),
            pages: None,
            workflow: None,
            notification: None,
            aborted: None,
        }
    }

    fn abort(mut self, reason: impl std::fmt::Display) -> Self {
        let reason = reason.to_string();
        warn!(repo = %self.repo, round = %self.round, reason = %reason, "Round ended early");
        self.aborted = Some(reason);
        self
    }

    /// Number of files that failed to push.
    #[must_use]
    pub fn failed_pushes(&self) -> usize {
        self.pushes.iter().filter(|p| p.is_failed()).count()
    }

    /// Whether the evaluation callback was delivered.
    #[must_use]
    pub fn delivered(&self) -> bool {
        self.notification.is_some_and(|n| n.delivered)
    }
}

/// Runs creation and update rounds.
#[derive(Clone)]
pub struct ProjectOrchestrator {
    host: Arc<dyn RepositoryHost>,
    publisher: Arc<dyn SitePublisher>,
    generator: CodeGenerator,
    notifier: Arc<dyn Notifier>,
    settings: OrchestratorSettings,
}

impl std::fmt::Debug for ProjectOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProjectOrchestrator")
            .field("owner", &self.host.owner())
            .field("generator", &self.generator)
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

impl ProjectOrchestrator {
    /// Assembles an orchestrator from its collaborators.
    #[must_use]
    pub fn new(
        host: Arc<dyn RepositoryHost>,
        publisher: Arc<dyn SitePublisher>,
        generator: CodeGenerator,
        notifier: Arc<dyn Notifier>,
        settings: OrchestratorSettings,
    ) -> Self {
        Self {
            host,
            publisher,
            generator,
            notifier,
            settings,
        }
    }

    /// Builds the production orchestrator: GitHub, Gemini and HTTP callbacks.
    ///
    /// # Errors
    ///
    /// Returns an error if any of the HTTP clients cannot be built.
    pub fn from_config(config: &Config) -> Result<Self> {
        let github = Arc::new(GitHubClient::new(config.github_settings())?);
        let model = Arc::new(GeminiModel::new(config.gemini_settings())?);
        let mut generator = CodeGenerator::new(model);
        if let Some(dir) = config.debug_dump_dir() {
            generator = generator.with_dump_dir(dir);
        }
        let notifier = Arc::new(EvaluationNotifier::new(
            config.retry_policy(),
            std::time::Duration::from_secs(config.callback.timeout_secs),
        )?);

        Ok(Self::new(
            github.clone(),
            github,
            generator,
            notifier,
            OrchestratorSettings {
                branch: config.github.branch.clone(),
                snapshot_concurrency: config.queue.snapshot_concurrency,
            },
        ))
    }

    /// Runs the round named by the request.
    #[instrument(skip(self, request), fields(repo = %request.repo_name(), round = %request.round))]
    pub async fn run(&self, request: &TaskRequest) -> RoundReport {
        match request.round {
            Round::One => self.run_round_one(request).await,
            Round::Two => self.run_round_two(request).await,
        }
    }

    /// Creates the repository, generates and pushes the app, publishes it and
    /// reports back.
    pub async fn run_round_one(&self, request: &TaskRequest) -> RoundReport {
        let repo = request.repo_name();
        let mut report = RoundReport::new(&repo, Round::One);

        match self.host.create_repository(&repo).await {
            Ok(()) => info!(repo = %repo, "Repository created"),
            Err(e) => warn!(repo = %repo, error = %e, "Repository creation failed, continuing"),
        }

        let generation = GenerationRequest {
            brief: &request.brief,
            attachments: &request.attachments,
            checks: &request.checks,
            mode: GenerationMode::Create,
        };
        let files = match self.generator.generate(&generation).await {
            Ok(files) if files.is_empty() => return report.abort("model reply contained no files"),
            Ok(files) => files,
            Err(e) => return report.abort(SitewrightError::from(e)),
        };

        for file in files {
            let write = FileWrite::new(&file.name, file.content, format!("Add {}", file.name));
            report.pushes.push(self.push(&repo, &write).await);
        }

        match self.publisher.enable_pages(&repo).await {
            Ok(outcome) => report.pages = Some(outcome),
            Err(e) => warn!(repo = %repo, error = %e, "Enabling GitHub Pages failed"),
        }
        match self.publisher.ensure_workflow(&repo).await {
            Ok(outcome) => report.workflow = Some(outcome),
            Err(e) => warn!(repo = %repo, error = %e, "Pages workflow upsert failed"),
        }

        report.notification = Some(self.notify(request, &repo).await);
        report
    }

    /// Revises the app in an existing repository, pushing changed files with
    /// their own blob SHAs, and reports back.
    pub async fn run_round_two(&self, request: &TaskRequest) -> RoundReport {
        let repo = request.repo_name();
        let mut report = RoundReport::new(&repo, Round::Two);

        match self.host.repository_exists(&repo).await {
            Ok(true) => {}
            Ok(false) => return report.abort(SitewrightError::repository_not_found(&repo)),
            Err(e) => return report.abort(SitewrightError::from(e)),
        }

        let head = match self.host.branch_head(&repo, &self.settings.branch).await {
            Ok(sha) => sha,
            Err(e) => return report.abort(SitewrightError::branch_head_unresolved(&repo, e)),
        };
        info!(repo = %repo, head = %head, "Resolved branch head");

        let snapshot = fetch_snapshot(
            self.host.as_ref(),
            &repo,
            &head,
            self.settings.snapshot_concurrency,
        )
        .await;

        let generation = GenerationRequest {
            brief: &request.brief,
            attachments: &request.attachments,
            checks: &request.checks,
            mode: GenerationMode::Update {
                existing: snapshot.files(),
            },
        };
        // An update round always reports back, even when nothing changes.
        let files = match self.generator.generate(&generation).await {
            Ok(files) => {
                if files.is_empty() {
                    warn!(repo = %repo, "Model reply contained no files; nothing to update");
                }
                files
            }
            Err(e) => {
                let e = SitewrightError::from(e);
                warn!(repo = %repo, error = %e, transient = e.is_transient(), "Generation failed; nothing to update");
                Vec::new()
            }
        };

        for file in files {
            let message = format!("Update {}", file.name);
            let write = match self.host.get_file(&repo, &file.name).await {
                Ok(Some(current)) => {
                    FileWrite::new(&file.name, file.content, message).with_sha(current.sha)
                }
                Ok(None) => FileWrite::new(&file.name, file.content, format!("Add {}", file.name)),
                Err(e) => {
                    warn!(repo = %repo, path = %file.name, error = %e, "Could not read current file SHA");
                    report.pushes.push(PushResult::failed(&file.name, e));
                    continue;
                }
            };
            report.pushes.push(self.push(&repo, &write).await);
        }

        report.notification = Some(self.notify(request, &repo).await);
        report
    }

    async fn push(&self, repo: &str, write: &FileWrite) -> PushResult {
        match self.host.put_file(repo, write).await {
            Ok(outcome) => {
                info!(repo = %repo, path = %write.path, outcome = %outcome, "Pushed file");
                PushResult::succeeded(&write.path, outcome)
            }
            Err(e) => {
                warn!(repo = %repo, path = %write.path, error = %e, transient = e.is_transient(), "Push failed");
                PushResult::failed(&write.path, e)
            }
        }
    }

    async fn notify(&self, request: &TaskRequest, repo: &str) -> NotifyOutcome {
        let commit_sha = match self.host.branch_head(repo, &self.settings.branch).await {
            Ok(sha) => Some(sha),
            Err(e) => {
                warn!(repo = %repo, error = %e, "Latest commit unavailable for callback");
                None
            }
        };

        let payload = EvaluationPayload {
            email: request.email.clone(),
            task: request.task.clone(),
            round: request.round,
            nonce: request.nonce.clone(),
            repo_url: self.host.repository_url(repo),
            commit_sha,
            pages_url: pages_url(self.host.owner(), repo),
        };
        self.notifier.notify(&request.evaluation_url, &payload).await
    }
}

#[async_trait]
impl TaskHandler for ProjectOrchestrator {
    async fn handle(&self, request: TaskRequest) {
        let report = self.run(&request).await;
        let elapsed = Utc::now() - report.started_at;
        info!(
            repo = %report.repo,
            round = %report.round,
            pushed = report.pushes.len() - report.failed_pushes(),
            failed = report.failed_pushes(),
            delivered = report.delivered(),
            aborted = report.aborted.as_deref().unwrap_or(""),
            elapsed_ms = elapsed.num_milliseconds(),
            "Round finished"
        );
    }
}
