//! Gemini `generateContent` client.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::{CodegenError, TextModel};

/// Default Generative Language API root.
pub const DEFAULT_API_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Default model identifier.
pub const DEFAULT_MODEL: &str = "gemini-2.5-flash-lite";

/// Connection settings for [`GeminiModel`].
#[derive(Clone)]
pub struct GeminiSettings {
    /// API root; the request goes to `{api_url}/models/{model}:generateContent`.
    pub api_url: String,
    /// Model identifier.
    pub model: String,
    /// API key sent in the `x-goog-api-key` header.
    pub api_key: String,
    /// Per-request timeout.
    pub timeout: Duration,
}

impl std::fmt::Debug for GeminiSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeminiSettings")
            .field("api_url", &self.api_url)
            .field("model", &self.model)
            .field("api_key", &"<redacted>")
            .field("timeout", &self.timeout)
            .finish()
    }
}

/// [`TextModel`] backed by the Gemini REST API.
#[derive(Debug, Clone)]
pub struct GeminiModel {
    http: Client,
    endpoint: String,
    model: String,
}

impl GeminiModel {
    /// Builds a model client.
    ///
    /// # Errors
    ///
    /// Returns [`CodegenError::Api`] if the key is not a valid header value,
    /// or [`CodegenError::Http`] if the client cannot be built.
    pub fn new(settings: GeminiSettings) -> Result<Self, CodegenError> {
        let mut key = HeaderValue::from_str(&settings.api_key).map_err(|_| CodegenError::Api {
            status: 0,
            message: "API key contains invalid header characters".to_string(),
        })?;
        key.set_sensitive(true);
        let mut headers = HeaderMap::new();
        headers.insert("x-goog-api-key", key);

        let http = Client::builder()
            .default_headers(headers)
            .timeout(settings.timeout)
            .build()?;

        let endpoint = format!(
            "{}/models/{}:generateContent",
            settings.api_url.trim_end_matches('/'),
            settings.model
        );

        Ok(Self {
            http,
            endpoint,
            model: settings.model,
        })
    }
}

#[derive(Serialize)]
struct GenerateRequest<'a> {
    contents: [Content<'a>; 1],
}

#[derive(Serialize)]
struct Content<'a> {
    role: &'a str,
    parts: [RequestPart<'a>; 1],
}

#[derive(Serialize)]
struct RequestPart<'a> {
    text: &'a str,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    content: Option<CandidateContent>,
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Deserialize)]
struct ResponsePart {
    text: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    block_reason: Option<String>,
}

#[derive(Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Deserialize)]
struct ErrorBody {
    message: String,
}

impl GenerateResponse {
    fn into_text(self) -> Result<String, CodegenError> {
        let blocked = self.prompt_feedback.and_then(|f| f.block_reason);
        let Some(candidate) = self.candidates.into_iter().next() else {
            return Err(CodegenError::EmptyResponse { reason: blocked });
        };

        let text: String = candidate
            .content
            .map(|c| c.parts.into_iter().filter_map(|p| p.text).collect())
            .unwrap_or_default();

        if text.trim().is_empty() {
            return Err(CodegenError::EmptyResponse {
                reason: candidate.finish_reason.or(blocked),
            });
        }
        Ok(text)
    }
}

#[async_trait]
impl TextModel for GeminiModel {
    fn name(&self) -> &str {
        &self.model
    }

    async fn complete(&self, prompt: &str) -> Result<String, CodegenError> {
        let body = GenerateRequest {
            contents: [Content {
                role: "user",
                parts: [RequestPart { text: prompt }],
            }],
        };

        debug!(model = %self.model, "Calling generateContent");
        let response = self.http.post(&self.endpoint).json(&body).send().await?;
        let status = response.status();

        if !status.is_success() {
            let raw = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ErrorEnvelope>(&raw)
                .map(|e| e.error.message)
                .unwrap_or(raw);
            warn!(status = status.as_u16(), message = %message, "Model call failed");
            return Err(CodegenError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let parsed: GenerateResponse = response.json().await?;
        parsed.into_text()
    }
}
