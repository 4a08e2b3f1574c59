//! Evaluation callback with exponential backoff.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::task::Round;

/// Result report posted to the caller's evaluation URL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvaluationPayload {
    /// Requester's email.
    pub email: String,
    /// Task identifier.
    pub task: String,
    /// Round that produced this report.
    pub round: Round,
    /// Request nonce.
    pub nonce: String,
    /// Browser URL of the repository.
    pub repo_url: String,
    /// Head commit after the round; `null` when it could not be resolved.
    pub commit_sha: Option<String>,
    /// Public Pages URL.
    pub pages_url: String,
}

/// Attempt count and doubling delay for callback delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    max_attempts: u32,
    initial_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(6, Duration::from_secs(1))
    }
}

impl RetryPolicy {
    /// Creates a policy; `max_attempts` is raised to at least one.
    #[must_use]
    pub const fn new(max_attempts: u32, initial_delay: Duration) -> Self {
        Self {
            max_attempts: if max_attempts == 0 { 1 } else { max_attempts },
            initial_delay,
        }
    }

    /// Total attempts, including the first.
    #[must_use]
    pub const fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Delay associated with the 1-based `attempt`: `initial * 2^(attempt-1)`.
    #[must_use]
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(31);
        self.initial_delay.saturating_mul(1u32 << exponent)
    }

    /// Delays for every attempt, in order.
    #[must_use]
    pub fn schedule(&self) -> Vec<Duration> {
        (1..=self.max_attempts).map(|n| self.delay_for(n)).collect()
    }
}

/// Outcome of delivering one callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NotifyOutcome {
    /// Whether the evaluator answered 200.
    pub delivered: bool,
    /// Attempts made.
    pub attempts: u32,
    /// Total time spent sleeping between attempts.
    pub backoff: Duration,
}

/// Delivers evaluation callbacks.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Posts `payload` to `url`, retrying per policy. Never fails.
    async fn notify(&self, url: &str, payload: &EvaluationPayload) -> NotifyOutcome;
}

/// [`Notifier`] posting JSON over `reqwest`.
#[derive(Debug, Clone)]
pub struct EvaluationNotifier {
    http: Client,
    policy: RetryPolicy,
}

impl EvaluationNotifier {
    /// Creates a notifier with a per-attempt timeout.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(policy: RetryPolicy, timeout: Duration) -> Result<Self, reqwest::Error> {
        let http = Client::builder().timeout(timeout).build()?;
        Ok(Self { http, policy })
    }
}

#[async_trait]
impl Notifier for EvaluationNotifier {
    async fn notify(&self, url: &str, payload: &EvaluationPayload) -> NotifyOutcome {
        let max = self.policy.max_attempts();
        let mut backoff = Duration::ZERO;

        for attempt in 1..=max {
            match self.http.post(url).json(payload).send().await {
                Ok(response) if response.status() == StatusCode::OK => {
                    info!(url = %url, attempt, task = %payload.task, round = %payload.round, "Evaluation server notified");
                    return NotifyOutcome {
                        delivered: true,
                        attempts: attempt,
                        backoff,
                    };
                }
                Ok(response) => {
                    let status = response.status();
                    let body = response.text().await.unwrap_or_default();
                    warn!(url = %url, attempt, status = status.as_u16(), body = %body, "Callback attempt rejected");
                }
                Err(e) => {
                    warn!(url = %url, attempt, error = %e, "Callback attempt failed");
                }
            }

            // Every failed attempt waits, the last one included.
            let delay = self.policy.delay_for(attempt);
            tokio::time::sleep(delay).await;
            backoff = backoff.saturating_add(delay);
        }

        warn!(url = %url, attempts = max, backoff_ms = backoff.as_millis(), task = %payload.task, "Giving up on evaluation callback");
        NotifyOutcome {
            delivered: false,
            attempts: max,
            backoff,
        }
    }
}
