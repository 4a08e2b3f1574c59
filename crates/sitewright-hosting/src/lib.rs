//! Sitewright Repository Hosting
//!
//! Typed GitHub REST operations used by the Sitewright pipeline.
//!
//! The [`RepositoryHost`] trait covers the repository operations (create,
//! branch head, tree, single-file read and write) and [`SitePublisher`] covers
//! GitHub Pages enablement. [`GitHubClient`] implements both over `reqwest`.

mod client;
mod publisher;
mod snapshot;

pub use client::{GitHubClient, GitHubSettings, DEFAULT_API_URL, DEFAULT_WEB_URL};
pub use publisher::{ensure_file, PublishOutcome, PAGES_WORKFLOW, PAGES_WORKFLOW_PATH};
pub use snapshot::{fetch_snapshot, RepositorySnapshot};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors returned by the hosting client.
#[derive(Debug, Error)]
pub enum HostingError {
    /// The request could not be sent or the response could not be read.
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// GitHub answered with an unexpected status code.
    #[error("GitHub API returned {status}: {message}")]
    Api {
        /// HTTP status code.
        status: u16,
        /// Message extracted from the response body.
        message: String,
    },

    /// The requested resource does not exist.
    #[error("not found: {resource}")]
    NotFound {
        /// Description of the missing resource.
        resource: String,
    },

    /// A response body could not be decoded.
    #[error("failed to decode '{path}': {message}")]
    Decode {
        /// Path of the file or endpoint being decoded.
        path: String,
        /// Description of the decode failure.
        message: String,
    },

    /// An endpoint URL or header value could not be built.
    #[error("invalid request setup: {0}")]
    Setup(String),
}

impl HostingError {
    /// Creates a new `Api` error.
    #[must_use]
    pub fn api(status: u16, message: impl Into<String>) -> Self {
        Self::Api {
            status,
            message: message.into(),
        }
    }

    /// Creates a new `NotFound` error.
    #[must_use]
    pub fn not_found(resource: impl Into<String>) -> Self {
        Self::NotFound {
            resource: resource.into(),
        }
    }

    /// Creates a new `Decode` error.
    #[must_use]
    pub fn decode(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Decode {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Returns `true` if retrying the same call may succeed.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Http(e) => e.is_timeout() || e.is_connect(),
            Self::Api { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }
}

/// Outcome of pushing a single file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PushOutcome {
    /// The file did not exist and was created.
    Created,
    /// An existing file was replaced.
    Updated,
    /// The push was rejected or never attempted.
    Failed,
}

impl std::fmt::Display for PushOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Created => write!(f, "created"),
            Self::Updated => write!(f, "updated"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// Per-file result of a push batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PushResult {
    /// Repository path of the file.
    pub path: String,
    /// What happened to the file.
    pub outcome: PushOutcome,
    /// Error description when the outcome is `Failed`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl PushResult {
    /// Creates a successful result with the given outcome.
    #[must_use]
    pub fn succeeded(path: impl Into<String>, outcome: PushOutcome) -> Self {
        Self {
            path: path.into(),
            outcome,
            error: None,
        }
    }

    /// Creates a failed result carrying the error text.
    #[must_use]
    pub fn failed(path: impl Into<String>, error: impl std::fmt::Display) -> Self {
        Self {
            path: path.into(),
            outcome: PushOutcome::Failed,
            error: Some(error.to_string()),
        }
    }

    /// Returns whether the push failed.
    #[must_use]
    pub fn is_failed(&self) -> bool {
        self.outcome == PushOutcome::Failed
    }
}

/// A single-file write against the contents API.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileWrite {
    /// Repository path of the file.
    pub path: String,
    /// New file content (encoded to base64 on the wire).
    pub content: String,
    /// Commit message for the write.
    pub message: String,
    /// Current blob SHA of the file; `None` creates the file.
    pub sha: Option<String>,
}

impl FileWrite {
    /// Creates a write with create semantics (no prior SHA).
    #[must_use]
    pub fn new(
        path: impl Into<String>,
        content: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            path: path.into(),
            content: content.into(),
            message: message.into(),
            sha: None,
        }
    }

    /// Sets the blob SHA the write replaces.
    #[must_use]
    pub fn with_sha(mut self, sha: impl Into<String>) -> Self {
        self.sha = Some(sha.into());
        self
    }
}

/// A file read from the contents API.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteFile {
    /// Repository path of the file.
    pub path: String,
    /// Blob SHA, used as the revision token for updates.
    pub sha: String,
    /// Decoded file bytes.
    pub content: Vec<u8>,
}

/// Kind of an entry in a git tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    /// A file.
    Blob,
    /// A directory.
    Tree,
    /// A submodule.
    Commit,
    /// Anything GitHub adds later.
    #[serde(other)]
    Other,
}

/// An entry of a recursive tree listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreeEntry {
    /// Path relative to the repository root.
    pub path: String,
    /// Entry kind.
    #[serde(rename = "type")]
    pub kind: EntryKind,
    /// Object SHA of the entry.
    pub sha: String,
}

/// Repository operations needed by the pipeline.
///
/// All repository names are relative to [`RepositoryHost::owner`].
#[async_trait]
pub trait RepositoryHost: Send + Sync {
    /// The account or organization that owns the repositories.
    fn owner(&self) -> &str;

    /// Public browser URL of the repository.
    fn repository_url(&self, repo: &str) -> String;

    /// Creates a public, uninitialized repository.
    async fn create_repository(&self, repo: &str) -> Result<(), HostingError>;

    /// Returns whether the repository exists.
    async fn repository_exists(&self, repo: &str) -> Result<bool, HostingError>;

    /// Resolves the head commit SHA of a branch.
    async fn branch_head(&self, repo: &str, branch: &str) -> Result<String, HostingError>;

    /// Lists every entry reachable from a commit, recursively.
    async fn tree(&self, repo: &str, commit_sha: &str) -> Result<Vec<TreeEntry>, HostingError>;

    /// Reads a single file; `Ok(None)` when it does not exist.
    async fn get_file(&self, repo: &str, path: &str) -> Result<Option<RemoteFile>, HostingError>;

    /// Creates or updates a single file.
    ///
    /// Updates must carry the file's current blob SHA in [`FileWrite::sha`].
    async fn put_file(&self, repo: &str, write: &FileWrite) -> Result<PushOutcome, HostingError>;
}

/// Static-site publishing for a repository.
#[async_trait]
pub trait SitePublisher: Send + Sync {
    /// Turns on GitHub Pages for the repository.
    async fn enable_pages(&self, repo: &str) -> Result<PublishOutcome, HostingError>;

    /// Creates or updates the deployment workflow definition.
    async fn ensure_workflow(&self, repo: &str) -> Result<PushOutcome, HostingError>;
}

/// Returns the GitHub Pages URL for a repository.
///
/// # Examples
///
/// ```
/// assert_eq!(
///     sitewright_hosting::pages_url("octocat", "demo-1"),
///     "https://octocat.github.io/demo-1/"
/// );
/// ```
#[must_use]
pub fn pages_url(owner: &str, repo: &str) -> String {
    format!("https://{owner}.github.io/{repo}/")
}
