//! Persistent relay state
//!
//! The key pool, rotation cursor, and question/answer history survive across
//! invocations. The dispatcher and relay service reach them only through the
//! `StateStore` trait; `FileStore` is the production implementation and
//! `MemoryStore` backs tests.

mod file;
mod memory;

pub use file::FileStore;
pub use memory::MemoryStore;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::services::key_pool::KeyPool;

/// Errors from the persistence layer
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("state file I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("state file is not valid JSON: {0}")]
    Parse(#[from] serde_json::Error),
}

/// The persisted state document
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RelayState {
    /// Configured API keys with their health state
    #[serde(default)]
    pub keys: KeyPool,

    /// Position of the last successfully used key (round-robin cursor)
    #[serde(default)]
    pub last_used: usize,

    /// Most recent prompt sent upstream
    #[serde(default)]
    pub last_question: Option<String>,

    /// Most recent answer (or failure message) shown to the user
    #[serde(default)]
    pub last_answer: Option<String>,
}

/// Storage collaborator for the dispatcher and relay service
///
/// Reads happen before a dispatch attempt loop starts; writes happen at the
/// points the rotation policies name (cursor after success, key health
/// immediately after a failed attempt).
#[async_trait]
pub trait StateStore: Send + Sync {
    async fn load_pool(&self) -> Result<KeyPool, StoreError>;

    async fn save_pool(&self, pool: &KeyPool) -> Result<(), StoreError>;

    async fn load_cursor(&self) -> Result<usize, StoreError>;

    async fn save_cursor(&self, position: usize) -> Result<(), StoreError>;

    /// Record the latest question/answer exchange for history display
    async fn record_exchange(&self, question: &str, answer: &str) -> Result<(), StoreError>;

    /// Read back the latest exchange, if any
    async fn last_exchange(&self) -> Result<(Option<String>, Option<String>), StoreError>;
}
