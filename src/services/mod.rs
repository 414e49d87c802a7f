//! Services module
//!
//! Contains business logic and the upstream API integration.

pub mod gemini;
pub mod key_pool;
pub mod relay;

pub use gemini::{AttemptError, GeminiClient, GenerateClient, FALLBACK_ANSWER, GEMINI_API_BASE};
pub use key_pool::{
    ApiKey, DispatchOutcome, Dispatcher, KeyHealth, KeyPool, RotationPolicy, ALL_KEYS_FAILED,
};
pub use relay::{RelayService, PROMPT_SEPARATOR};
