//! Relay service
//!
//! The caller in front of the dispatcher: verifies that keys are configured
//! at all, composes the full prompt from the system prompt and the user's
//! text, dispatches, and records the exchange for history display.

use std::sync::Arc;

use crate::config::Settings;
use crate::error::RelayError;
use crate::services::gemini::GenerateClient;
use crate::services::key_pool::{DispatchOutcome, Dispatcher, KeyPool};
use crate::store::{StateStore, StoreError};

/// Separator between the system prompt and the user's text
pub const PROMPT_SEPARATOR: &str = "\n\n---\n\n";

/// Front door for a question: pool checks, prompt composition, dispatch,
/// history bookkeeping
pub struct RelayService {
    settings: Arc<Settings>,
    store: Arc<dyn StateStore>,
    dispatcher: Dispatcher,
}

impl RelayService {
    pub fn new(
        settings: Arc<Settings>,
        store: Arc<dyn StateStore>,
        client: Arc<dyn GenerateClient>,
    ) -> Self {
        let dispatcher = Dispatcher::new(settings.policy, client, store.clone());
        Self {
            settings,
            store,
            dispatcher,
        }
    }

    /// Adopt keys from the environment into an empty store
    ///
    /// Lets a fresh deployment start from `GEMINI_API_KEYS` without running
    /// `keys add` first. A store that already has keys wins over the
    /// environment.
    pub async fn seed_keys(&self) -> Result<(), StoreError> {
        if self.settings.api_keys.is_empty() {
            return Ok(());
        }

        let pool = self.store.load_pool().await?;
        if !pool.is_empty() {
            return Ok(());
        }

        let seeded = KeyPool::from_secrets(self.settings.api_keys.iter().cloned());
        tracing::info!(keys = seeded.len(), "seeding key pool from environment");
        self.store.save_pool(&seeded).await
    }

    /// Answer the user's text
    ///
    /// Returns `RelayError::NoKeysConfigured` without dispatching when the
    /// pool is empty; otherwise the outcome's `ok` flag carries
    /// success/exhaustion and its `text` the message to display.
    pub async fn ask(&self, user_text: &str) -> Result<DispatchOutcome, RelayError> {
        let pool = self.store.load_pool().await?;
        if pool.is_empty() {
            return Err(RelayError::NoKeysConfigured);
        }

        let prompt = self.compose_prompt(user_text);
        let outcome = self.dispatcher.dispatch(&prompt).await?;

        // History keeps the failure message too; it is what the user saw.
        if let Err(e) = self.store.record_exchange(&prompt, &outcome.text).await {
            tracing::warn!(error = %e, "failed to record exchange history");
        }

        Ok(outcome)
    }

    /// Latest question/answer pair, if any
    pub async fn last_exchange(&self) -> Result<(Option<String>, Option<String>), RelayError> {
        Ok(self.store.last_exchange().await?)
    }

    fn compose_prompt(&self, user_text: &str) -> String {
        match self.settings.system_prompt.as_deref() {
            Some(system) if !system.is_empty() => {
                format!("{system}{PROMPT_SEPARATOR}{user_text}")
            }
            _ => user_text.to_string(),
        }
    }
}
