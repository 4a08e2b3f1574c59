//! Inbound task request model.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sitewright_codegen::Attachment;

use crate::error::{Result, SitewrightError};

/// Which phase of a task a request drives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Round {
    /// Create the repository and the first version of the app.
    One,
    /// Revise the app in the existing repository.
    Two,
}

impl Round {
    /// Wire value of the round.
    #[must_use]
    pub const fn number(self) -> u8 {
        match self {
            Self::One => 1,
            Self::Two => 2,
        }
    }
}

impl std::fmt::Display for Round {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.number())
    }
}

impl Serialize for Round {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u8(self.number())
    }
}

impl<'de> Deserialize<'de> for Round {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        match u64::deserialize(deserializer)? {
            1 => Ok(Self::One),
            2 => Ok(Self::Two),
            other => Err(serde::de::Error::custom(format!(
                "invalid round {other}: expected 1 or 2"
            ))),
        }
    }
}

/// Identity of a task: every round for the same key targets one repository.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TaskKey {
    /// Task identifier.
    pub task: String,
    /// Nonce chosen by the caller.
    pub nonce: String,
}

impl TaskKey {
    /// Repository name derived from the key.
    #[must_use]
    pub fn repo_name(&self) -> String {
        format!("{}-{}", self.task, self.nonce)
    }
}

impl std::fmt::Display for TaskKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}-{}", self.task, self.nonce)
    }
}

/// A task request as received by the gateway.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskRequest {
    /// Requester's email, echoed in the callback.
    pub email: String,
    /// Shared secret authorizing the request.
    pub secret: String,
    /// Task identifier.
    pub task: String,
    /// Round to execute.
    pub round: Round,
    /// Caller-chosen nonce; with `task` it names the repository.
    pub nonce: String,
    /// Natural-language description of the app.
    pub brief: String,
    /// Requirements the app will be checked against.
    #[serde(default)]
    pub checks: Vec<String>,
    /// Where the result is reported.
    pub evaluation_url: String,
    /// Supporting files, usually data URIs.
    #[serde(default)]
    pub attachments: Vec<Attachment>,
}

impl std::fmt::Debug for TaskRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskRequest")
            .field("email", &self.email)
            .field("secret", &"<redacted>")
            .field("task", &self.task)
            .field("round", &self.round)
            .field("nonce", &self.nonce)
            .field("brief", &self.brief)
            .field("checks", &self.checks)
            .field("evaluation_url", &self.evaluation_url)
            .field("attachments", &self.attachments.len())
            .finish()
    }
}

impl TaskRequest {
    /// The `(task, nonce)` key.
    #[must_use]
    pub fn key(&self) -> TaskKey {
        TaskKey {
            task: self.task.clone(),
            nonce: self.nonce.clone(),
        }
    }

    /// Target repository name, `"{task}-{nonce}"`.
    #[must_use]
    pub fn repo_name(&self) -> String {
        format!("{}-{}", self.task, self.nonce)
    }

    /// Compares the request secret with `expected` in constant time.
    #[must_use]
    pub fn secret_matches(&self, expected: &str) -> bool {
        let given = self.secret.as_bytes();
        let expected = expected.as_bytes();
        if given.len() != expected.len() {
            return false;
        }
        given
            .iter()
            .zip(expected)
            .fold(0u8, |acc, (a, b)| acc | (a ^ b))
            == 0
    }

    /// Checks the fields the rounds depend on.
    ///
    /// # Errors
    ///
    /// Returns `SitewrightError::InvalidRequest` describing the first problem.
    pub fn validate(&self) -> Result<()> {
        for (field, value) in [
            ("email", &self.email),
            ("task", &self.task),
            ("nonce", &self.nonce),
            ("brief", &self.brief),
        ] {
            if value.trim().is_empty() {
                return Err(SitewrightError::invalid_request(format!(
                    "{field} must not be empty"
                )));
            }
        }

        for (field, value) in [("task", &self.task), ("nonce", &self.nonce)] {
            if !value
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
            {
                return Err(SitewrightError::invalid_request(format!(
                    "{field} may only contain letters, digits, '-', '_' and '.'"
                )));
            }
        }

        let url_ok = reqwest::Url::parse(&self.evaluation_url)
            .map(|url| matches!(url.scheme(), "http" | "https"))
            .unwrap_or(false);
        if !url_ok {
            return Err(SitewrightError::invalid_request(
                "evaluation_url must be an absolute http(s) URL",
            ));
        }

        Ok(())
    }
}
