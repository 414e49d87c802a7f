//! API module
//!
//! HTTP request handlers.

pub mod ask;
pub mod health;
