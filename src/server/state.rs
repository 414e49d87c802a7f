//! Application state container
//!
//! Shared state passed to all request handlers via Axum's state extraction.

use std::sync::Arc;
use std::time::Instant;

use crate::config::Settings;
use crate::services::gemini::{GeminiClient, GenerateClient};
use crate::services::relay::RelayService;
use crate::store::{FileStore, StateStore};

/// Shared application state
///
/// Cheaply cloneable (via Arc) and thread-safe.
#[derive(Clone)]
pub struct AppState {
    /// Application settings
    pub settings: Arc<Settings>,

    /// Relay service fronting the dispatcher
    pub relay: Arc<RelayService>,

    /// Application start time (for uptime calculation)
    pub start_time: Instant,
}

impl AppState {
    /// Create the application state with the production collaborators
    pub async fn new(settings: Settings) -> anyhow::Result<Self> {
        let settings = Arc::new(settings);

        tracing::debug!(path = %settings.state_file.display(), "Opening state store");
        let store: Arc<dyn StateStore> = Arc::new(FileStore::new(&settings.state_file));

        let client: Arc<dyn GenerateClient> = Arc::new(GeminiClient::new(
            settings.model.clone(),
            settings.base_url.clone(),
            settings.request_timeout_seconds,
        )?);

        Self::with_collaborators(settings, store, client).await
    }

    /// Create the application state with injected collaborators (tests)
    pub async fn with_collaborators(
        settings: Arc<Settings>,
        store: Arc<dyn StateStore>,
        client: Arc<dyn GenerateClient>,
    ) -> anyhow::Result<Self> {
        let relay = Arc::new(RelayService::new(settings.clone(), store, client));
        relay.seed_keys().await?;

        tracing::info!(
            model = %settings.model,
            policy = %settings.policy,
            "Application state initialized"
        );

        Ok(Self {
            settings,
            relay,
            start_time: Instant::now(),
        })
    }

    /// Get the application uptime in seconds
    pub fn uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }
}
