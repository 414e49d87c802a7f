//! Gemini relay library
//!
//! A self-hosted relay for the Google Gemini API: send it a piece of text,
//! it composes a prompt and dispatches it upstream through a pool of API
//! keys with rotation and failover.

// Public modules
pub mod api;
pub mod config;
pub mod error;
pub mod schemas;
pub mod server;
pub mod services;
pub mod store;

// Re-export commonly used types
pub use config::Settings;
pub use error::RelayError;
pub use server::App;
pub use services::{DispatchOutcome, RelayService, RotationPolicy};
