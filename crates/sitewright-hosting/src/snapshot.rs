//! Point-in-time view of a repository's text files.

use std::collections::BTreeMap;

use futures::stream::{self, StreamExt};
use tracing::{debug, info, warn};

use crate::{EntryKind, RepositoryHost};

/// Mapping from repository path to current file content.
///
/// Built fresh for each update round and dropped when the round ends.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RepositorySnapshot {
    files: BTreeMap<String, String>,
}

impl RepositorySnapshot {
    /// Creates an empty snapshot.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or replaces a file.
    pub fn insert(&mut self, path: impl Into<String>, content: impl Into<String>) {
        self.files.insert(path.into(), content.into());
    }

    /// Returns all files, ordered by path.
    #[must_use]
    pub const fn files(&self) -> &BTreeMap<String, String> {
        &self.files
    }

    /// Number of files in the snapshot.
    #[must_use]
    pub fn len(&self) -> usize {
        self.files.len()
    }

    /// Returns `true` if the snapshot holds no files.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

impl FromIterator<(String, String)> for RepositorySnapshot {
    fn from_iter<T: IntoIterator<Item = (String, String)>>(iter: T) -> Self {
        Self {
            files: iter.into_iter().collect(),
        }
    }
}

/// Fetches every text blob reachable from `commit_sha`.
///
/// A failed tree listing yields an empty snapshot. Blobs that cannot be read
/// or are not valid UTF-8 are skipped. At most `concurrency` blob reads are in
/// flight at once.
pub async fn fetch_snapshot<H>(
    host: &H,
    repo: &str,
    commit_sha: &str,
    concurrency: usize,
) -> RepositorySnapshot
where
    H: RepositoryHost + ?Sized,
{
    let entries = match host.tree(repo, commit_sha).await {
        Ok(entries) => entries,
        Err(e) => {
            warn!(repo = %repo, commit = %commit_sha, error = %e, "Failed to list repository tree");
            return RepositorySnapshot::new();
        }
    };

    let blobs: Vec<String> = entries
        .into_iter()
        .filter(|entry| entry.kind == EntryKind::Blob)
        .map(|entry| entry.path)
        .collect();
    debug!(repo = %repo, blobs = blobs.len(), "Fetching blobs for snapshot");

    let fetched: Vec<_> = stream::iter(blobs)
        .map(|path| async move {
            let result = host.get_file(repo, &path).await;
            (path, result)
        })
        .buffer_unordered(concurrency.max(1))
        .collect()
        .await;

    let mut snapshot = RepositorySnapshot::new();
    for (path, result) in fetched {
        match result {
            Ok(Some(file)) => match String::from_utf8(file.content) {
                Ok(text) => snapshot.insert(path, text),
                Err(_) => debug!(path = %path, "Skipping non-UTF-8 file"),
            },
            Ok(None) => warn!(path = %path, "File listed in tree but not found"),
            Err(e) => warn!(path = %path, error = %e, "Failed to fetch file"),
        }
    }

    info!(repo = %repo, files = snapshot.len(), "Repository snapshot ready");
    snapshot
}
