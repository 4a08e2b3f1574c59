//! Sitewright Code Generation
//!
//! Turns a task brief into a set of files by prompting a text model and
//! parsing its reply.
//!
//! The model protocol is plain text: the prompt asks for every file as a
//! `FILE: <path>` line followed by a fenced block, and [`parse_files`] reads
//! that format back. [`CodeGenerator`] ties the two together around any
//! [`TextModel`].

mod gemini;
mod parser;
mod prompt;

pub use gemini::{GeminiModel, GeminiSettings, DEFAULT_API_URL, DEFAULT_MODEL};
pub use parser::parse_files;
pub use prompt::{build_prompt, REQUIRED_FILES};

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

/// Errors that can occur while generating code.
#[derive(Debug, Error)]
pub enum CodegenError {
    /// The model endpoint could not be reached or its body could not be read.
    #[error("model request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The model endpoint answered with a non-success status.
    #[error("model API returned {status}: {message}")]
    Api {
        /// HTTP status code.
        status: u16,
        /// Response body or error message.
        message: String,
    },

    /// The model answered without any text.
    #[error("model returned no text{}", .reason.as_ref().map(|r| format!(" (finish reason: {r})")).unwrap_or_default())]
    EmptyResponse {
        /// Finish reason reported by the model, if any.
        reason: Option<String>,
    },

    /// Failed to preserve an unparseable reply on disk.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl CodegenError {
    /// Returns `true` if retrying the request may succeed.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Http(e) => e.is_timeout() || e.is_connect(),
            Self::Api { status, .. } => *status == 429 || *status >= 500,
            Self::EmptyResponse { .. } | Self::Io(_) => false,
        }
    }
}

/// A file produced by the model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeneratedFile {
    /// Repository-relative path.
    pub name: String,
    /// Full file content.
    pub content: String,
}

impl GeneratedFile {
    /// Creates a new generated file.
    #[must_use]
    pub fn new(name: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            content: content.into(),
        }
    }
}

/// A named link supplied with a task (often a data URI).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    /// Display name of the attachment.
    pub name: String,
    /// Location of the attachment content.
    pub url: String,
}

/// Whether the model builds an app from scratch or revises an existing one.
#[derive(Debug, Clone, Copy)]
pub enum GenerationMode<'a> {
    /// Build a new app; the prompt names the mandatory files.
    Create,
    /// Revise the given files; the model returns only what changes.
    Update {
        /// Current repository content, keyed by path.
        existing: &'a BTreeMap<String, String>,
    },
}

impl GenerationMode<'_> {
    /// Short label used in logs.
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Update { .. } => "update",
        }
    }
}

/// Everything the prompt is built from.
#[derive(Debug, Clone, Copy)]
pub struct GenerationRequest<'a> {
    /// Natural-language task description, forwarded verbatim.
    pub brief: &'a str,
    /// Attachments supplied with the task.
    pub attachments: &'a [Attachment],
    /// Requirements the app will be checked against.
    pub checks: &'a [String],
    /// Create or update.
    pub mode: GenerationMode<'a>,
}

/// Single-shot text completion.
#[async_trait]
pub trait TextModel: Send + Sync {
    /// Model identifier, for logs.
    fn name(&self) -> &str;

    /// Sends `prompt` and returns the model's reply text.
    async fn complete(&self, prompt: &str) -> Result<String, CodegenError>;
}

/// Prompts a [`TextModel`] and parses its reply into files.
#[derive(Clone)]
pub struct CodeGenerator {
    model: Arc<dyn TextModel>,
    dump_dir: Option<PathBuf>,
}

impl std::fmt::Debug for CodeGenerator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CodeGenerator")
            .field("model", &self.model.name())
            .field("dump_dir", &self.dump_dir)
            .finish()
    }
}

impl CodeGenerator {
    /// Creates a generator around the given model.
    #[must_use]
    pub fn new(model: Arc<dyn TextModel>) -> Self {
        Self {
            model,
            dump_dir: None,
        }
    }

    /// Sets the directory where unparseable replies are saved.
    #[must_use]
    pub fn with_dump_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.dump_dir = Some(dir.into());
        self
    }

    /// Generates files for the request.
    ///
    /// A reply without any `FILE:` blocks is not an error: the raw reply is
    /// saved to the dump directory (when configured) and an empty list is
    /// returned.
    ///
    /// # Errors
    ///
    /// Returns the model's error if the completion call itself fails.
    pub async fn generate(
        &self,
        request: &GenerationRequest<'_>,
    ) -> Result<Vec<GeneratedFile>, CodegenError> {
        let prompt = build_prompt(request);
        info!(
            model = %self.model.name(),
            mode = request.mode.label(),
            prompt_len = prompt.len(),
            "Requesting code generation"
        );

        let reply = self.model.complete(&prompt).await?;
        let files = parse_files(&reply);

        if files.is_empty() {
            warn!(reply_len = reply.len(), "No files found in model reply");
            if let Some(dir) = &self.dump_dir {
                match preserve_reply(dir, &reply).await {
                    Ok(path) => info!(path = %path.display(), "Saved raw model reply"),
                    Err(e) => warn!(error = %e, "Failed to save raw model reply"),
                }
            }
            return Ok(Vec::new());
        }

        let names: Vec<&str> = files.iter().map(|f| f.name.as_str()).collect();
        info!(count = files.len(), files = ?names, "Parsed generated files");
        Ok(files)
    }
}

/// Writes `reply` to a timestamped file under `dir`.
async fn preserve_reply(dir: &Path, reply: &str) -> Result<PathBuf, CodegenError> {
    tokio::fs::create_dir_all(dir).await?;
    let stamp = Utc::now().format("%Y%m%dT%H%M%S%.3fZ");
    let path = dir.join(format!("reply-{stamp}.txt"));
    tokio::fs::write(&path, reply).await?;
    Ok(path)
}
