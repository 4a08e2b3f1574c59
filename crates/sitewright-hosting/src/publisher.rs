//! GitHub Pages publishing.
//!
//! Publishing has two independent parts: switching Pages on for the
//! repository, and committing the Actions workflow that builds and deploys the
//! site on every push. Both are safe to repeat.

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};

use crate::client::{api_error, GitHubClient};
use crate::{FileWrite, HostingError, PushOutcome, RepositoryHost, SitePublisher};

/// Repository path of the deployment workflow.
pub const PAGES_WORKFLOW_PATH: &str = ".github/workflows/deploy-pages.yml";

/// Deployment workflow: checkout, configure Pages, upload the repository root
/// as the artifact, deploy.
pub const PAGES_WORKFLOW: &str = r#"name: Deploy to GitHub Pages

on:
  push:
    branches: [ main, master ]
  workflow_dispatch:

permissions:
  contents: read
  pages: write
  id-token: write

concurrency:
  group: "pages"
  cancel-in-progress: false

jobs:
  deploy:
    environment:
      name: github-pages
      url: ${{ steps.deployment.outputs.page_url }}
    runs-on: ubuntu-latest
    steps:
      - name: Checkout
        uses: actions/checkout@v4

      - name: Setup Pages
        uses: actions/configure-pages@v4
        with:
          enablement: true

      - name: Upload artifact
        uses: actions/upload-pages-artifact@v3
        with:
          path: '.'

      - name: Deploy to GitHub Pages
        id: deployment
        uses: actions/deploy-pages@v4
"#;

const WORKFLOW_COMMIT_MESSAGE: &str = "Add GitHub Pages deployment workflow";

/// Result of enabling Pages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PublishOutcome {
    /// Pages was switched on by this call.
    Enabled,
    /// Pages was already on.
    AlreadyEnabled,
}

impl std::fmt::Display for PublishOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Enabled => write!(f, "enabled"),
            Self::AlreadyEnabled => write!(f, "already_enabled"),
        }
    }
}

/// Writes `content` to `path`, updating in place when the file exists.
///
/// The existing file's blob SHA is read immediately before the write so that
/// a repeated call replaces the file instead of failing as a duplicate.
pub async fn ensure_file<H>(
    host: &H,
    repo: &str,
    path: &str,
    content: &str,
    message: &str,
) -> Result<PushOutcome, HostingError>
where
    H: RepositoryHost + ?Sized,
{
    let mut write = FileWrite::new(path, content, message);
    if let Some(existing) = host.get_file(repo, path).await? {
        debug!(path = %path, sha = %existing.sha, "Updating existing file in place");
        write = write.with_sha(existing.sha);
    }
    host.put_file(repo, &write).await
}

#[derive(Serialize)]
struct EnablePagesRequest<'a> {
    build_type: &'a str,
    source: PagesSource<'a>,
}

#[derive(Serialize)]
struct PagesSource<'a> {
    branch: &'a str,
    path: &'a str,
}

#[async_trait]
impl SitePublisher for GitHubClient {
    #[instrument(skip(self))]
    async fn enable_pages(&self, repo: &str) -> Result<PublishOutcome, HostingError> {
        let url = self.repo_endpoint(repo, &["pages"])?;
        let body = EnablePagesRequest {
            build_type: "legacy",
            source: PagesSource {
                branch: &self.branch,
                path: "/",
            },
        };

        let response = self.http().post(url).json(&body).send().await?;
        match response.status() {
            StatusCode::CREATED | StatusCode::NO_CONTENT => {
                info!(repo = %repo, "GitHub Pages enabled");
                Ok(PublishOutcome::Enabled)
            }
            StatusCode::CONFLICT => {
                debug!(repo = %repo, "GitHub Pages already enabled");
                Ok(PublishOutcome::AlreadyEnabled)
            }
            _ => Err(api_error(response).await),
        }
    }

    #[instrument(skip(self))]
    async fn ensure_workflow(&self, repo: &str) -> Result<PushOutcome, HostingError> {
        let outcome = ensure_file(
            self,
            repo,
            PAGES_WORKFLOW_PATH,
            PAGES_WORKFLOW,
            WORKFLOW_COMMIT_MESSAGE,
        )
        .await?;
        info!(repo = %repo, outcome = %outcome, "Pages workflow in place");
        Ok(outcome)
    }
}
