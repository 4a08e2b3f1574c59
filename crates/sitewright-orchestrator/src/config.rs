//! Configuration types for the Sitewright service.
//!
//! Tunables live in `sitewright.json` (camelCase, every field optional).
//! Credentials never live in the file: they are read from the environment into
//! [`Credentials`] and attached to the [`Config`] once at start-up.

use std::path::{Path, PathBuf};
use std::time::Duration;

use reqwest::Url;
use serde::{Deserialize, Serialize};
use sitewright_codegen::GeminiSettings;
use sitewright_hosting::GitHubSettings;

use crate::error::{Result, SitewrightError};
use crate::notify::RetryPolicy;

/// The default config file name.
const CONFIG_FILE_NAME: &str = "sitewright.json";

/// Environment variable holding the shared task secret.
pub const ENV_TASK_SECRET: &str = "TASK_SECRET";
/// Environment variable holding the GitHub token.
pub const ENV_GITHUB_TOKEN: &str = "GITHUB_TOKEN";
/// Environment variable holding the repository owner.
pub const ENV_OWNER: &str = "OWNER";
/// Environment variable holding the Gemini API key.
pub const ENV_GEMINI_API_KEY: &str = "GEMINI_API_KEY";

fn default_host() -> String {
    "0.0.0.0".to_string()
}

const fn default_port() -> u16 {
    8000
}

fn default_github_api_url() -> String {
    sitewright_hosting::DEFAULT_API_URL.to_string()
}

fn default_github_web_url() -> String {
    sitewright_hosting::DEFAULT_WEB_URL.to_string()
}

fn default_branch() -> String {
    "main".to_string()
}

const fn default_github_timeout() -> u64 {
    30
}

fn default_user_agent() -> String {
    format!("sitewright/{}", env!("CARGO_PKG_VERSION"))
}

fn default_model_name() -> String {
    sitewright_codegen::DEFAULT_MODEL.to_string()
}

fn default_model_api_url() -> String {
    sitewright_codegen::DEFAULT_API_URL.to_string()
}

const fn default_model_timeout() -> u64 {
    300
}

#[allow(clippy::unnecessary_wraps)]
fn default_debug_dump_dir() -> Option<String> {
    Some(".sitewright/debug".to_string())
}

const fn default_max_attempts() -> u32 {
    6
}

const fn default_initial_delay_ms() -> u64 {
    1000
}

const fn default_callback_timeout() -> u64 {
    10
}

const fn default_max_concurrent_tasks() -> usize {
    4
}

const fn default_snapshot_concurrency() -> usize {
    4
}

/// Main configuration for the Sitewright service.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// Address the HTTP server binds to.
    #[serde(default = "default_host")]
    pub host: String,

    /// Port the HTTP server listens on.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Answer secret mismatches with 401 instead of 200.
    #[serde(default)]
    pub strict_auth_status: bool,

    /// GitHub connection settings.
    #[serde(default)]
    pub github: GitHubConfig,

    /// Model connection settings.
    #[serde(default)]
    pub model: ModelConfig,

    /// Evaluation callback retry settings.
    #[serde(default)]
    pub callback: CallbackConfig,

    /// Work queue limits.
    #[serde(default)]
    pub queue: QueueConfig,

    /// Secrets read from the environment.
    #[serde(skip)]
    pub credentials: Credentials,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            strict_auth_status: false,
            github: GitHubConfig::default(),
            model: ModelConfig::default(),
            callback: CallbackConfig::default(),
            queue: QueueConfig::default(),
            credentials: Credentials::default(),
        }
    }
}

impl Config {
    /// Loads configuration from the current working directory.
    ///
    /// Looks for `sitewright.json` in the current directory and falls back to
    /// defaults when it is absent.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but contains invalid JSON.
    pub fn load() -> Result<Self> {
        let current_dir = std::env::current_dir().map_err(|e| {
            SitewrightError::config_parse(
                "<current directory>",
                format!("cannot determine current directory: {e}"),
            )
        })?;
        Self::load_from_dir(&current_dir)
    }

    /// Loads configuration from `sitewright.json` in the given directory.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but contains invalid JSON.
    pub fn load_from_dir(dir: &Path) -> Result<Self> {
        Self::load_from_file(&dir.join(CONFIG_FILE_NAME))
    }

    /// Loads configuration from a specific file path.
    ///
    /// If the file does not exist, returns default configuration.
    ///
    /// # Errors
    ///
    /// Returns `SitewrightError::ConfigParseError` if the file cannot be read
    /// or parsed, and `SitewrightError::ConfigValidationError` if a value is
    /// out of range.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let contents = match std::fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                let config = Self::default();
                config.validate()?;
                return Ok(config);
            }
            Err(e) => {
                return Err(SitewrightError::config_parse(
                    path,
                    format!("failed to read file: {e}"),
                ));
            }
        };

        let config: Self = serde_json::from_str(&contents)
            .map_err(|e| SitewrightError::config_parse(path, e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Attaches credentials.
    #[must_use]
    pub fn with_credentials(mut self, credentials: Credentials) -> Self {
        self.credentials = credentials;
        self
    }

    /// Validates the configuration values.
    ///
    /// # Errors
    ///
    /// Returns `SitewrightError::ConfigValidationError` if any check fails.
    pub fn validate(&self) -> Result<()> {
        if self.host.trim().is_empty() {
            return Err(SitewrightError::config_validation(
                "host must not be empty",
                "Set host to an address such as 0.0.0.0 or 127.0.0.1",
            ));
        }

        for (field, value) in [
            ("github.apiUrl", &self.github.api_url),
            ("github.webUrl", &self.github.web_url),
            ("model.apiUrl", &self.model.api_url),
        ] {
            let valid = Url::parse(value)
                .map(|url| matches!(url.scheme(), "http" | "https"))
                .unwrap_or(false);
            if !valid {
                return Err(SitewrightError::config_validation(
                    format!("{field} '{value}' is not an http(s) URL"),
                    format!("Set {field} to an absolute URL in your sitewright.json"),
                ));
            }
        }

        if self.github.branch.trim().is_empty() {
            return Err(SitewrightError::config_validation(
                "github.branch must not be empty",
                "Set github.branch, usually \"main\"",
            ));
        }

        if self.model.name.trim().is_empty() {
            return Err(SitewrightError::config_validation(
                "model.name must not be empty",
                format!("Set model.name, e.g. \"{}\"", sitewright_codegen::DEFAULT_MODEL),
            ));
        }

        for (field, value) in [
            ("github.timeoutSecs", self.github.timeout_secs),
            ("model.timeoutSecs", self.model.timeout_secs),
            ("callback.timeoutSecs", self.callback.timeout_secs),
        ] {
            if value == 0 {
                return Err(SitewrightError::config_validation(
                    format!("{field} must be greater than 0"),
                    format!("Set {field} to at least 1 second in your sitewright.json"),
                ));
            }
        }

        if self.callback.max_attempts == 0 {
            return Err(SitewrightError::config_validation(
                "callback.maxAttempts must be greater than 0",
                "Set callback.maxAttempts to at least 1 in your sitewright.json",
            ));
        }

        if self.queue.max_concurrent_tasks == 0 {
            return Err(SitewrightError::config_validation(
                "queue.maxConcurrentTasks must be greater than 0",
                "Set queue.maxConcurrentTasks to at least 1 in your sitewright.json",
            ));
        }

        if self.queue.snapshot_concurrency == 0 {
            return Err(SitewrightError::config_validation(
                "queue.snapshotConcurrency must be greater than 0",
                "Set queue.snapshotConcurrency to at least 1 in your sitewright.json",
            ));
        }

        Ok(())
    }

    /// Address string for binding the server.
    #[must_use]
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// GitHub client settings built from config and credentials.
    #[must_use]
    pub fn github_settings(&self) -> GitHubSettings {
        GitHubSettings {
            api_url: self.github.api_url.clone(),
            web_url: self.github.web_url.clone(),
            owner: self.credentials.owner.clone(),
            token: self.credentials.github_token.clone(),
            branch: self.github.branch.clone(),
            timeout: Duration::from_secs(self.github.timeout_secs),
            user_agent: self.github.user_agent.clone(),
        }
    }

    /// Gemini client settings built from config and credentials.
    #[must_use]
    pub fn gemini_settings(&self) -> GeminiSettings {
        GeminiSettings {
            api_url: self.model.api_url.clone(),
            model: self.model.name.clone(),
            api_key: self.credentials.gemini_api_key.clone(),
            timeout: Duration::from_secs(self.model.timeout_secs),
        }
    }

    /// Callback retry policy.
    #[must_use]
    pub const fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.callback.max_attempts,
            Duration::from_millis(self.callback.initial_delay_ms),
        )
    }

    /// Directory for unparseable model replies, if enabled.
    #[must_use]
    pub fn debug_dump_dir(&self) -> Option<PathBuf> {
        self.model
            .debug_dump_dir
            .as_deref()
            .filter(|dir| !dir.trim().is_empty())
            .map(PathBuf::from)
    }
}

/// GitHub connection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GitHubConfig {
    /// REST API root.
    #[serde(default = "default_github_api_url")]
    pub api_url: String,

    /// Browser root used for repository links.
    #[serde(default = "default_github_web_url")]
    pub web_url: String,

    /// Branch that holds the site and is published by Pages.
    #[serde(default = "default_branch")]
    pub branch: String,

    /// Per-request timeout in seconds.
    #[serde(default = "default_github_timeout")]
    pub timeout_secs: u64,

    /// `User-Agent` header value.
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

impl Default for GitHubConfig {
    fn default() -> Self {
        Self {
            api_url: default_github_api_url(),
            web_url: default_github_web_url(),
            branch: default_branch(),
            timeout_secs: default_github_timeout(),
            user_agent: default_user_agent(),
        }
    }
}

/// Code generation model settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelConfig {
    /// Model identifier.
    #[serde(default = "default_model_name")]
    pub name: String,

    /// API root.
    #[serde(default = "default_model_api_url")]
    pub api_url: String,

    /// Per-request timeout in seconds.
    #[serde(default = "default_model_timeout")]
    pub timeout_secs: u64,

    /// Where unparseable replies are saved; `null` disables saving.
    #[serde(default = "default_debug_dump_dir")]
    pub debug_dump_dir: Option<String>,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            name: default_model_name(),
            api_url: default_model_api_url(),
            timeout_secs: default_model_timeout(),
            debug_dump_dir: default_debug_dump_dir(),
        }
    }
}

/// Evaluation callback settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallbackConfig {
    /// Total attempts, including the first.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Delay after the first failed attempt; doubles after each failure.
    #[serde(default = "default_initial_delay_ms")]
    pub initial_delay_ms: u64,

    /// Per-attempt timeout in seconds.
    #[serde(default = "default_callback_timeout")]
    pub timeout_secs: u64,
}

impl Default for CallbackConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_delay_ms: default_initial_delay_ms(),
            timeout_secs: default_callback_timeout(),
        }
    }
}

/// Work queue limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueConfig {
    /// Rounds allowed to execute at the same time.
    #[serde(default = "default_max_concurrent_tasks")]
    pub max_concurrent_tasks: usize,

    /// Concurrent blob reads while building an update snapshot.
    #[serde(default = "default_snapshot_concurrency")]
    pub snapshot_concurrency: usize,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            max_concurrent_tasks: default_max_concurrent_tasks(),
            snapshot_concurrency: default_snapshot_concurrency(),
        }
    }
}

/// Secrets and identity read from the environment.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Credentials {
    /// Shared secret every task request must carry.
    pub task_secret: String,
    /// GitHub personal access token.
    pub github_token: String,
    /// Account that owns the created repositories.
    pub owner: String,
    /// Gemini API key.
    pub gemini_api_key: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("task_secret", &"<redacted>")
            .field("github_token", &"<redacted>")
            .field("owner", &self.owner)
            .field("gemini_api_key", &"<redacted>")
            .finish()
    }
}

impl Credentials {
    /// Reads credentials from the process environment.
    ///
    /// # Errors
    ///
    /// Returns `SitewrightError::MissingCredential` naming the first variable
    /// that is unset or blank.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Reads credentials through an arbitrary lookup function.
    ///
    /// # Errors
    ///
    /// Returns `SitewrightError::MissingCredential` naming the first variable
    /// that is unset or blank.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let require = |var: &str| {
            lookup(var)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
                .ok_or_else(|| SitewrightError::missing_credential(var))
        };

        Ok(Self {
            task_secret: require(ENV_TASK_SECRET)?,
            github_token: require(ENV_GITHUB_TOKEN)?,
            owner: require(ENV_OWNER)?,
            gemini_api_key: require(ENV_GEMINI_API_KEY)?,
        })
    }
}
