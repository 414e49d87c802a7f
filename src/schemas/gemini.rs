//! Google Gemini API schema definitions
//!
//! Rust structures for the subset of the Gemini REST generateContent
//! request and response formats this relay sends and reads.

use serde::{Deserialize, Serialize};

// ============================================================================
// Request Types
// ============================================================================

/// Gemini API request body for generateContent
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeminiRequest {
    /// The content of the conversation
    pub contents: Vec<GeminiContent>,
}

impl GeminiRequest {
    /// Build the single-turn request this relay sends: one content block
    /// holding the full prompt text.
    pub fn from_prompt(prompt: impl Into<String>) -> Self {
        Self {
            contents: vec![GeminiContent {
                role: None,
                parts: vec![Part::text(prompt)],
            }],
        }
    }
}

/// Content block containing role and parts
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeminiContent {
    /// Role: "user" or "model"
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,

    /// Content parts
    #[serde(default)]
    pub parts: Vec<Part>,
}

/// A part of the content
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Part {
    /// Text content
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

impl Part {
    /// Create a text part
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
        }
    }
}

// ============================================================================
// Response Types
// ============================================================================

/// Gemini API response body for generateContent
///
/// Every field is optional so that a 2xx body missing pieces of the answer
/// path still deserializes; the caller substitutes a placeholder then.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct GeminiResponse {
    #[serde(default)]
    pub candidates: Vec<Candidate>,
}

/// A single response candidate
#[derive(Debug, Clone, Deserialize)]
pub struct Candidate {
    #[serde(default)]
    pub content: Option<GeminiContent>,
}

impl GeminiResponse {
    /// Extract the answer text at `candidates[0].content.parts[0].text`
    pub fn first_text(&self) -> Option<&str> {
        self.candidates
            .first()?
            .content
            .as_ref()?
            .parts
            .first()?
            .text
            .as_deref()
    }
}

// ============================================================================
// Error Types
// ============================================================================

/// Error body returned by the Gemini API on non-2xx responses
#[derive(Debug, Clone, Deserialize)]
pub struct GeminiApiError {
    pub error: GeminiErrorDetail,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GeminiErrorDetail {
    pub code: i32,
    pub message: String,
    #[serde(default)]
    pub status: Option<String>,
}

// ============================================================================
// Tests
// ============================================================================
