//! GitHub REST client.
//!
//! This module provides [`GitHubClient`], the `reqwest`-backed implementation
//! of [`RepositoryHost`]. Every request carries the bearer token, the
//! GitHub JSON media type and a per-call timeout.

use std::time::Duration;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use base64::Engine;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION, USER_AGENT};
use reqwest::{Client, Response, StatusCode, Url};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use crate::{FileWrite, HostingError, PushOutcome, RemoteFile, RepositoryHost, TreeEntry};

/// Default REST API root.
pub const DEFAULT_API_URL: &str = "https://api.github.com";

/// Default browser root used for repository links.
pub const DEFAULT_WEB_URL: &str = "https://github.com";

const API_VERSION: &str = "2022-11-28";

/// Connection settings for [`GitHubClient`].
#[derive(Clone)]
pub struct GitHubSettings {
    /// REST API root, e.g. `https://api.github.com`.
    pub api_url: String,
    /// Browser root, e.g. `https://github.com`.
    pub web_url: String,
    /// Owner (user or organization) of the managed repositories.
    pub owner: String,
    /// Personal access token.
    pub token: String,
    /// Branch that holds the published site.
    pub branch: String,
    /// Per-request timeout.
    pub timeout: Duration,
    /// `User-Agent` header value (GitHub rejects requests without one).
    pub user_agent: String,
}

impl std::fmt::Debug for GitHubSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GitHubSettings")
            .field("api_url", &self.api_url)
            .field("web_url", &self.web_url)
            .field("owner", &self.owner)
            .field("token", &"<redacted>")
            .field("branch", &self.branch)
            .field("timeout", &self.timeout)
            .field("user_agent", &self.user_agent)
            .finish()
    }
}

/// GitHub client for repository and Pages operations.
///
/// # Example
///
/// ```no_run
/// use std::time::Duration;
/// use sitewright_hosting::{GitHubClient, GitHubSettings, RepositoryHost};
///
/// # async fn example() -> Result<(), sitewright_hosting::HostingError> {
/// let client = GitHubClient::new(GitHubSettings {
///     api_url: "https://api.github.com".to_string(),
///     web_url: "https://github.com".to_string(),
///     owner: "octocat".to_string(),
///     token: "ghp_example".to_string(),
///     branch: "main".to_string(),
///     timeout: Duration::from_secs(30),
///     user_agent: "sitewright".to_string(),
/// })?;
/// let head = client.branch_head("demo-1", "main").await?;
/// println!("head is {head}");
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct GitHubClient {
    http: Client,
    api_url: Url,
    web_url: String,
    owner: String,
    pub(crate) branch: String,
}

impl GitHubClient {
    /// Builds a client from the given settings.
    ///
    /// # Errors
    ///
    /// Returns [`HostingError::Setup`] if the API URL or token cannot be used,
    /// or [`HostingError::Http`] if the underlying client cannot be built.
    pub fn new(settings: GitHubSettings) -> Result<Self, HostingError> {
        let api_url = Url::parse(&settings.api_url)
            .map_err(|e| HostingError::Setup(format!("invalid API URL '{}': {e}", settings.api_url)))?;
        if api_url.cannot_be_a_base() {
            return Err(HostingError::Setup(format!(
                "API URL '{}' cannot be used as a base",
                settings.api_url
            )));
        }

        let mut headers = HeaderMap::new();
        let mut auth = HeaderValue::from_str(&format!("Bearer {}", settings.token))
            .map_err(|_| HostingError::Setup("token contains invalid header characters".into()))?;
        auth.set_sensitive(true);
        headers.insert(AUTHORIZATION, auth);
        headers.insert(
            ACCEPT,
            HeaderValue::from_static("application/vnd.github+json"),
        );
        headers.insert(
            "x-github-api-version",
            HeaderValue::from_static(API_VERSION),
        );
        let agent = HeaderValue::from_str(&settings.user_agent)
            .map_err(|_| HostingError::Setup("user agent contains invalid characters".into()))?;
        headers.insert(USER_AGENT, agent);

        let http = Client::builder()
            .default_headers(headers)
            .timeout(settings.timeout)
            .build()?;

        debug!(api_url = %api_url, owner = %settings.owner, "GitHub client ready");

        Ok(Self {
            http,
            api_url,
            web_url: settings.web_url.trim_end_matches('/').to_string(),
            owner: settings.owner,
            branch: settings.branch,
        })
    }

    /// Builds an API URL from path segments, percent-encoding each one.
    pub(crate) fn endpoint<I, S>(&self, segments: I) -> Result<Url, HostingError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut url = self.api_url.clone();
        {
            let mut path = url
                .path_segments_mut()
                .map_err(|()| HostingError::Setup(format!("{} cannot be a base", self.api_url)))?;
            path.pop_if_empty().extend(segments);
        }
        Ok(url)
    }

    /// Builds `/repos/{owner}/{repo}/...`.
    pub(crate) fn repo_endpoint(&self, repo: &str, rest: &[&str]) -> Result<Url, HostingError> {
        let segments = ["repos", self.owner.as_str(), repo]
            .into_iter()
            .chain(rest.iter().copied());
        self.endpoint(segments)
    }

    fn contents_endpoint(&self, repo: &str, path: &str) -> Result<Url, HostingError> {
        let mut rest = vec!["contents"];
        rest.extend(path.split('/').filter(|s| !s.is_empty()));
        self.repo_endpoint(repo, &rest)
    }

    pub(crate) fn http(&self) -> &Client {
        &self.http
    }
}

#[async_trait]
impl RepositoryHost for GitHubClient {
    fn owner(&self) -> &str {
        &self.owner
    }

    fn repository_url(&self, repo: &str) -> String {
        format!("{}/{}/{repo}", self.web_url, self.owner)
    }

    #[instrument(skip(self))]
    async fn create_repository(&self, repo: &str) -> Result<(), HostingError> {
        let url = self.endpoint(["user", "repos"])?;
        let body = CreateRepositoryRequest {
            name: repo,
            private: false,
            auto_init: false,
        };

        let response = self.http.post(url).json(&body).send().await?;
        if response.status() == StatusCode::CREATED {
            info!(repo = %repo, "Repository created");
            return Ok(());
        }

        Err(api_error(response).await)
    }

    #[instrument(skip(self))]
    async fn repository_exists(&self, repo: &str) -> Result<bool, HostingError> {
        let url = self.repo_endpoint(repo, &[])?;
        let response = self.http.get(url).send().await?;
        match response.status() {
            StatusCode::OK => Ok(true),
            StatusCode::NOT_FOUND => Ok(false),
            _ => Err(api_error(response).await),
        }
    }

    #[instrument(skip(self))]
    async fn branch_head(&self, repo: &str, branch: &str) -> Result<String, HostingError> {
        let url = self.repo_endpoint(repo, &["branches", branch])?;
        let response = self.http.get(url).send().await?;
        match response.status() {
            StatusCode::OK => {}
            StatusCode::NOT_FOUND => {
                return Err(HostingError::not_found(format!(
                    "branch '{branch}' of {}/{repo}",
                    self.owner
                )));
            }
            _ => return Err(api_error(response).await),
        }

        let branch_info: BranchResponse = response.json().await?;
        debug!(sha = %branch_info.commit.sha, "Resolved branch head");
        Ok(branch_info.commit.sha)
    }

    #[instrument(skip(self))]
    async fn tree(&self, repo: &str, commit_sha: &str) -> Result<Vec<TreeEntry>, HostingError> {
        let url = self.repo_endpoint(repo, &["git", "trees", commit_sha])?;
        let response = self
            .http
            .get(url)
            .query(&[("recursive", "1")])
            .send()
            .await?;
        if response.status() != StatusCode::OK {
            return Err(api_error(response).await);
        }

        let listing: TreeResponse = response.json().await?;
        if listing.truncated {
            warn!(repo = %repo, entries = listing.tree.len(), "Tree listing was truncated by GitHub");
        }
        debug!(entries = listing.tree.len(), "Listed repository tree");
        Ok(listing.tree)
    }

    #[instrument(skip(self))]
    async fn get_file(&self, repo: &str, path: &str) -> Result<Option<RemoteFile>, HostingError> {
        let url = self.contents_endpoint(repo, path)?;
        let response = self.http.get(url).send().await?;
        match response.status() {
            StatusCode::OK => {}
            StatusCode::NOT_FOUND => return Ok(None),
            _ => return Err(api_error(response).await),
        }

        let body = response.text().await?;
        let file: ContentResponse = serde_json::from_str(&body)
            .map_err(|e| HostingError::decode(path, format!("not a file entry: {e}")))?;
        let content = decode_content(path, file.content.as_deref().unwrap_or_default())?;

        Ok(Some(RemoteFile {
            path: file.path.unwrap_or_else(|| path.to_string()),
            sha: file.sha,
            content,
        }))
    }

    #[instrument(skip(self, write), fields(path = %write.path, has_sha = write.sha.is_some()))]
    async fn put_file(&self, repo: &str, write: &FileWrite) -> Result<PushOutcome, HostingError> {
        let url = self.contents_endpoint(repo, &write.path)?;
        let body = PutContentRequest {
            message: &write.message,
            content: BASE64_STANDARD.encode(write.content.as_bytes()),
            sha: write.sha.as_deref(),
        };

        let response = self.http.put(url).json(&body).send().await?;
        match response.status() {
            StatusCode::CREATED => Ok(PushOutcome::Created),
            StatusCode::OK => Ok(PushOutcome::Updated),
            _ => Err(api_error(response).await),
        }
    }
}

/// Decodes a base64 `content` field; GitHub wraps it at 60 columns.
fn decode_content(path: &str, encoded: &str) -> Result<Vec<u8>, HostingError> {
    let compact: String = encoded
        .chars()
        .filter(|c| !c.is_ascii_whitespace())
        .collect();
    BASE64_STANDARD
        .decode(compact)
        .map_err(|e| HostingError::decode(path, e.to_string()))
}

/// Converts a non-success response into [`HostingError::Api`].
pub(crate) async fn api_error(response: Response) -> HostingError {
    let status = response.status().as_u16();
    let body = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<ApiMessage>(&body)
        .map(|m| m.message)
        .unwrap_or(body);
    HostingError::api(status, message)
}

#[derive(Serialize)]
struct CreateRepositoryRequest<'a> {
    name: &'a str,
    private: bool,
    auto_init: bool,
}

#[derive(Serialize)]
struct PutContentRequest<'a> {
    message: &'a str,
    content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    sha: Option<&'a str>,
}

#[derive(Deserialize)]
struct ApiMessage {
    message: String,
}

#[derive(Deserialize)]
struct BranchResponse {
    commit: CommitRef,
}

#[derive(Deserialize)]
struct CommitRef {
    sha: String,
}

#[derive(Deserialize)]
struct TreeResponse {
    #[serde(default)]
    tree: Vec<TreeEntry>,
    #[serde(default)]
    truncated: bool,
}

#[derive(Deserialize)]
struct ContentResponse {
    sha: String,
    path: Option<String>,
    content: Option<String>,
}
