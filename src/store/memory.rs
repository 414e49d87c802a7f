//! In-memory state store
//!
//! Backs tests and embedded uses where nothing should touch disk.

use async_trait::async_trait;
use std::sync::Mutex;

use super::{RelayState, StateStore, StoreError};
use crate::services::key_pool::KeyPool;

/// [`StateStore`] that keeps the state document in process memory
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<RelayState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from a pre-populated state (test setup helper)
    pub fn with_state(state: RelayState) -> Self {
        Self {
            state: Mutex::new(state),
        }
    }

    /// Snapshot of the current state
    pub fn snapshot(&self) -> RelayState {
        self.state.lock().expect("state lock poisoned").clone()
    }
}

#[async_trait]
impl StateStore for MemoryStore {
    async fn load_pool(&self) -> Result<KeyPool, StoreError> {
        Ok(self.snapshot().keys)
    }

    async fn save_pool(&self, pool: &KeyPool) -> Result<(), StoreError> {
        self.state.lock().expect("state lock poisoned").keys = pool.clone();
        Ok(())
    }

    async fn load_cursor(&self) -> Result<usize, StoreError> {
        Ok(self.snapshot().last_used)
    }

    async fn save_cursor(&self, position: usize) -> Result<(), StoreError> {
        self.state.lock().expect("state lock poisoned").last_used = position;
        Ok(())
    }

    async fn record_exchange(&self, question: &str, answer: &str) -> Result<(), StoreError> {
        let mut state = self.state.lock().expect("state lock poisoned");
        state.last_question = Some(question.to_string());
        state.last_answer = Some(answer.to_string());
        Ok(())
    }

    async fn last_exchange(&self) -> Result<(Option<String>, Option<String>), StoreError> {
        let state = self.snapshot();
        Ok((state.last_question, state.last_answer))
    }
}
