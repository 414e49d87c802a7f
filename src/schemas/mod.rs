//! Schema module
//!
//! Wire-format models for the upstream API.

pub mod gemini;
