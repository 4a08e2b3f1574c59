//! Error types for the Sitewright orchestrator.
//!
//! This module defines the error hierarchy for configuration loading, request
//! validation and the round preconditions. Failures from the hosting and code
//! generation crates are wrapped so callers see a single type.

use std::path::PathBuf;

use sitewright_codegen::CodegenError;
use sitewright_hosting::HostingError;

/// A specialized `Result` type for Sitewright orchestrator operations.
pub type Result<T> = std::result::Result<T, SitewrightError>;

/// Errors that can occur while serving and executing tasks.
///
/// Variants carry an actionable suggestion where one exists.
#[derive(Debug, thiserror::Error)]
pub enum SitewrightError {
    // ========================================================================
    // Configuration Errors
    // ========================================================================
    /// Invalid JSON syntax in configuration file.
    #[error("Invalid JSON in config file '{path}': {message}\n\nSuggestion: Validate your sitewright.json with a JSON linter")]
    ConfigParseError {
        /// Path to the configuration file.
        path: PathBuf,
        /// Description of the parse error.
        message: String,
    },

    /// Configuration validation failed.
    #[error("Invalid configuration: {message}\n\nSuggestion: {suggestion}")]
    ConfigValidationError {
        /// Description of the validation failure.
        message: String,
        /// Actionable suggestion for the user.
        suggestion: String,
    },

    /// A required credential is not set in the environment.
    #[error("Missing credential: {var} is not set\n\nSuggestion: Export {var} or add it to your .env file")]
    MissingCredential {
        /// Name of the environment variable.
        var: String,
    },

    // ========================================================================
    // Request Errors
    // ========================================================================
    /// The task request is structurally valid JSON but semantically unusable.
    #[error("Invalid task request: {message}")]
    InvalidRequest {
        /// What is wrong with the request.
        message: String,
    },

    /// The request secret does not match the configured one.
    #[error("Invalid secret")]
    Unauthorized,

    // ========================================================================
    // Round Preconditions
    // ========================================================================
    /// An update round targeted a repository that does not exist.
    #[error("Repository '{repo}' does not exist\n\nSuggestion: Send round 1 for this task and nonce before round 2")]
    RepositoryNotFound {
        /// Repository name.
        repo: String,
    },

    /// The branch head commit could not be resolved.
    #[error("Could not resolve branch head of '{repo}': {message}\n\nSuggestion: Check that the repository has at least one commit on the configured branch")]
    BranchHeadUnresolved {
        /// Repository name.
        repo: String,
        /// Underlying failure.
        message: String,
    },

    // ========================================================================
    // Wrapped Subsystem Errors
    // ========================================================================
    /// Repository hosting failure.
    #[error("Hosting error: {0}")]
    Hosting(#[from] HostingError),

    /// Code generation failure.
    #[error("Code generation error: {0}")]
    Codegen(#[from] CodegenError),

    /// An outbound HTTP client could not be built.
    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    /// General I/O error during file operations.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl SitewrightError {
    /// Creates a new `ConfigParseError` with the given path and message.
    #[must_use]
    pub fn config_parse(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::ConfigParseError {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Creates a new `ConfigValidationError` with the given message and suggestion.
    #[must_use]
    pub fn config_validation(message: impl Into<String>, suggestion: impl Into<String>) -> Self {
        Self::ConfigValidationError {
            message: message.into(),
            suggestion: suggestion.into(),
        }
    }

    /// Creates a new `MissingCredential` error.
    #[must_use]
    pub fn missing_credential(var: impl Into<String>) -> Self {
        Self::MissingCredential { var: var.into() }
    }

    /// Creates a new `InvalidRequest` error.
    #[must_use]
    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::InvalidRequest {
            message: message.into(),
        }
    }

    /// Creates a new `RepositoryNotFound` error.
    #[must_use]
    pub fn repository_not_found(repo: impl Into<String>) -> Self {
        Self::RepositoryNotFound { repo: repo.into() }
    }

    /// Creates a new `BranchHeadUnresolved` error.
    #[must_use]
    pub fn branch_head_unresolved(repo: impl Into<String>, message: impl std::fmt::Display) -> Self {
        Self::BranchHeadUnresolved {
            repo: repo.into(),
            message: message.to_string(),
        }
    }

    /// Returns `true` if this error is transient and may be retried.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Hosting(e) => e.is_transient(),
            Self::Codegen(e) => e.is_transient(),
            _ => false,
        }
    }

    /// Returns `true` if this error must stop the process at start-up.
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::ConfigParseError { .. }
                | Self::ConfigValidationError { .. }
                | Self::MissingCredential { .. }
        )
    }
}
