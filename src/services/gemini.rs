//! Gemini transport
//!
//! One HTTP POST per dispatch attempt against the Gemini generateContent
//! REST endpoint. The client classifies each attempt for the dispatcher:
//! `Ok(answer)` on a 2xx response (substituting a placeholder when the body
//! carries no answer text), `Err` on transport failures and non-2xx
//! statuses.

use async_trait::async_trait;
use reqwest::Client;
use thiserror::Error;

use crate::schemas::gemini::{GeminiApiError, GeminiRequest, GeminiResponse};

// ============================================================================
// Constants
// ============================================================================

pub const GEMINI_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Shown in place of an answer when a 2xx body has no extractable text
pub const FALLBACK_ANSWER: &str = "No usable content in the model response.";

// ============================================================================
// Error Types
// ============================================================================

/// Failure of a single outbound attempt
#[derive(Error, Debug)]
pub enum AttemptError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error ({code}): {message}")]
    Api { code: u16, message: String },
}

// ============================================================================
// Client Trait
// ============================================================================

/// Outbound-call collaborator used by the dispatcher
///
/// One call = one attempt with one key. Implementations must not retry
/// internally; rotation across keys is the dispatcher's job.
#[async_trait]
pub trait GenerateClient: Send + Sync {
    async fn generate(&self, api_key: &str, prompt: &str) -> Result<String, AttemptError>;
}

// ============================================================================
// Gemini Client
// ============================================================================

/// Production [`GenerateClient`] backed by the Gemini REST API
pub struct GeminiClient {
    client: Client,
    base_url: Option<String>,
    model: String,
}

impl GeminiClient {
    /// Create a client for the given model
    pub fn new(
        model: impl Into<String>,
        base_url: Option<String>,
        timeout_seconds: u64,
    ) -> Result<Self, AttemptError> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(timeout_seconds))
            .build()?;

        Ok(Self {
            client,
            base_url,
            model: model.into(),
        })
    }

    fn base_url(&self) -> &str {
        self.base_url.as_deref().unwrap_or(GEMINI_API_BASE)
    }

    fn endpoint(&self) -> String {
        format!("{}/models/{}:generateContent", self.base_url(), self.model)
    }
}

#[async_trait]
impl GenerateClient for GeminiClient {
    async fn generate(&self, api_key: &str, prompt: &str) -> Result<String, AttemptError> {
        let url = self.endpoint();

        tracing::debug!(model = %self.model, url = %url, "Calling Gemini generateContent API");

        let response = self
            .client
            .post(&url)
            .query(&[("key", api_key)])
            .header("Content-Type", "application/json")
            .json(&GeminiRequest::from_prompt(prompt))
            .send()
            .await?;

        let status = response.status();

        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();

            // Prefer the structured Gemini error body when present
            if let Ok(api_error) = serde_json::from_str::<GeminiApiError>(&error_text) {
                return Err(AttemptError::Api {
                    code: status.as_u16(),
                    message: api_error.error.message,
                });
            }

            return Err(AttemptError::Api {
                code: status.as_u16(),
                message: error_text,
            });
        }

        let body: GeminiResponse = response.json().await?;
        Ok(answer_from_response(&body))
    }
}

/// Extract the answer text, falling back to a placeholder when the expected
/// path is absent. A 2xx with a malformed answer path is still a successful
/// attempt; only transport and status failures rotate to the next key.
pub fn answer_from_response(response: &GeminiResponse) -> String {
    response
        .first_text()
        .map(str::to_string)
        .unwrap_or_else(|| FALLBACK_ANSWER.to_string())
}

// ============================================================================
// Tests
// ============================================================================
