//! Credential-rotating request dispatcher
//!
//! Given the configured key pool and a prompt, walk the pool under the
//! selected rotation policy: one sequential outbound attempt per key, at
//! most pool-size attempts, stopping at the first success. Each attempt's
//! outcome decides whether the loop continues, so attempts are never issued
//! in parallel; firing keys concurrently would spend quota on keys the
//! previous attempt already proved unnecessary.

use std::sync::Arc;
use tokio::sync::Mutex;

use super::credential::KeyPool;
use super::policy::RotationPolicy;
use crate::services::gemini::GenerateClient;
use crate::store::{StateStore, StoreError};

/// User-facing message when every usable key failed in one dispatch
pub const ALL_KEYS_FAILED: &str =
    "All of your API keys failed. Please check them in the key settings.";

// ============================================================================
// Dispatch Outcome
// ============================================================================

/// Result of one dispatch call
///
/// A dispatch fails only by returning `ok = false`; callers must check the
/// flag. `text` carries the answer on success and the human-readable
/// exhaustion message on failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchOutcome {
    pub ok: bool,
    pub text: String,
    pub used_position: Option<usize>,
}

impl DispatchOutcome {
    fn success(text: String, position: usize) -> Self {
        Self {
            ok: true,
            text,
            used_position: Some(position),
        }
    }

    fn exhausted() -> Self {
        Self {
            ok: false,
            text: ALL_KEYS_FAILED.to_string(),
            used_position: None,
        }
    }
}

// ============================================================================
// Dispatcher
// ============================================================================

/// Walks the key pool under a rotation policy, one awaited attempt at a time
pub struct Dispatcher {
    policy: RotationPolicy,
    client: Arc<dyn GenerateClient>,
    store: Arc<dyn StateStore>,
    /// Serializes whole dispatches: pool/cursor state is read-modify-write
    /// across the attempt loop, so two interleaved dispatches could publish
    /// conflicting health or cursor values.
    gate: Mutex<()>,
}

impl Dispatcher {
    pub fn new(
        policy: RotationPolicy,
        client: Arc<dyn GenerateClient>,
        store: Arc<dyn StateStore>,
    ) -> Self {
        Self {
            policy,
            client,
            store,
            gate: Mutex::new(()),
        }
    }

    pub fn policy(&self) -> RotationPolicy {
        self.policy
    }

    /// Send the prompt upstream, rotating keys on failure
    ///
    /// Pool and cursor are read once before the attempt loop starts; only
    /// that initial read can surface a store error. Persistence failures
    /// during the loop are logged and do not change the outcome.
    pub async fn dispatch(&self, prompt: &str) -> Result<DispatchOutcome, StoreError> {
        let _gate = self.gate.lock().await;

        let mut pool = self.store.load_pool().await?;
        let last_used = self.store.load_cursor().await?;

        if pool.is_empty() {
            // Callers surface the missing-configuration error before
            // dispatching; an empty pool here reads as exhaustion.
            tracing::warn!("dispatch invoked with an empty key pool");
            return Ok(DispatchOutcome::exhausted());
        }

        let outcome = match self.policy {
            RotationPolicy::RoundRobin => self.round_robin(&pool, last_used, prompt).await,
            RotationPolicy::HealthGated => self.health_gated(&mut pool, prompt).await,
        };

        if !outcome.ok {
            tracing::warn!(policy = %self.policy, keys = pool.len(), "every key failed for this dispatch");
        }

        Ok(outcome)
    }

    /// Stateless cursor rotation: start after the last successful position,
    /// walk forward modulo the pool size, never touch key health.
    async fn round_robin(
        &self,
        pool: &KeyPool,
        last_used: usize,
        prompt: &str,
    ) -> DispatchOutcome {
        let len = pool.len();
        let start = (last_used + 1) % len;

        for step in 0..len {
            let position = (start + step) % len;

            tracing::debug!(position, "trying key");
            match self.client.generate(pool[position].secret(), prompt).await {
                Ok(answer) => {
                    tracing::info!(position, "key succeeded");
                    // Cursor moves only on success; a fully failed dispatch
                    // leaves the next walk starting from the same place.
                    if let Err(e) = self.store.save_cursor(position).await {
                        tracing::warn!(position, error = %e, "failed to persist rotation cursor");
                    }
                    return DispatchOutcome::success(answer, position);
                }
                Err(e) => {
                    tracing::warn!(position, error = %e, "key attempt failed");
                }
            }
        }

        DispatchOutcome::exhausted()
    }

    /// Latching lockout: try active keys in pool order, lock each failure
    /// immediately, reset the whole pool when no active keys remain.
    async fn health_gated(&self, pool: &mut KeyPool, prompt: &str) -> DispatchOutcome {
        let mut active = pool.active_positions();

        if active.is_empty() {
            // Self-healing, not an error: the pool is never left unusable.
            tracing::info!(keys = pool.len(), "no active keys left, resetting the whole pool");
            pool.reset_all();
            self.persist_pool(pool).await;
            active = pool.active_positions();
        }

        for position in active {
            let secret = pool[position].secret().to_string();

            tracing::debug!(position, "trying key");
            match self.client.generate(&secret, prompt).await {
                Ok(answer) => {
                    tracing::info!(position, "key succeeded");
                    return DispatchOutcome::success(answer, position);
                }
                Err(e) => {
                    tracing::warn!(position, error = %e, "locking key after failed attempt");
                    pool.lock(position);
                    // Latched immediately, not batched: a concurrent process
                    // must not pick up a key this pass proved exhausted.
                    self.persist_pool(pool).await;
                }
            }
        }

        DispatchOutcome::exhausted()
    }

    async fn persist_pool(&self, pool: &KeyPool) {
        if let Err(e) = self.store.save_pool(pool).await {
            tracing::warn!(error = %e, "failed to persist key health state");
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::gemini::AttemptError;
    use crate::services::key_pool::{ApiKey, KeyHealth};
    use crate::store::{MemoryStore, RelayState};
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::Mutex as StdMutex;

    /// Client scripted per secret; records the order keys were tried in
    struct ScriptedClient {
        answers: HashMap<String, Result<String, u16>>,
        calls: StdMutex<Vec<String>>,
    }

    impl ScriptedClient {
        fn new(outcomes: &[(&str, Result<&str, u16>)]) -> Self {
            Self {
                answers: outcomes
                    .iter()
                    .map(|(k, v)| (k.to_string(), v.map(str::to_string)))
                    .collect(),
                calls: StdMutex::new(Vec::new()),
            }
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl GenerateClient for ScriptedClient {
        async fn generate(&self, api_key: &str, _prompt: &str) -> Result<String, AttemptError> {
            self.calls.lock().unwrap().push(api_key.to_string());
            match self.answers.get(api_key) {
                Some(Ok(answer)) => Ok(answer.clone()),
                Some(Err(code)) => Err(AttemptError::Api {
                    code: *code,
                    message: "scripted failure".to_string(),
                }),
                None => panic!("unscripted key: {api_key}"),
            }
        }
    }

    fn dispatcher_with(
        policy: RotationPolicy,
        state: RelayState,
        outcomes: &[(&str, Result<&str, u16>)],
    ) -> (Dispatcher, Arc<MemoryStore>, Arc<ScriptedClient>) {
        let store = Arc::new(MemoryStore::with_state(state));
        let client = Arc::new(ScriptedClient::new(outcomes));
        let dispatcher = Dispatcher::new(policy, client.clone(), store.clone());
        (dispatcher, store, client)
    }

    fn state_with_keys(keys: Vec<ApiKey>, last_used: usize) -> RelayState {
        RelayState {
            keys: KeyPool::from_keys(keys),
            last_used,
            ..Default::default()
        }
    }

    fn active(secret: &str) -> ApiKey {
        ApiKey::new(secret)
    }

    fn locked(secret: &str) -> ApiKey {
        let mut key = ApiKey::new(secret);
        key.lock();
        key
    }

    // ------------------------------------------------------------------
    // RoundRobin
    // ------------------------------------------------------------------

    #[tokio::test]
    async fn test_round_robin_starts_after_cursor() {
        // pool [a, b, c], b (position 1) last used -> start at c
        let (dispatcher, store, client) = dispatcher_with(
            RotationPolicy::RoundRobin,
            state_with_keys(vec![active("a"), active("b"), active("c")], 1),
            &[("c", Ok("from c"))],
        );

        let outcome = dispatcher.dispatch("q").await.unwrap();

        assert!(outcome.ok);
        assert_eq!(outcome.text, "from c");
        assert_eq!(outcome.used_position, Some(2));
        assert_eq!(client.calls(), vec!["c"]);
        assert_eq!(store.snapshot().last_used, 2);
    }

    #[tokio::test]
    async fn test_round_robin_walks_forward_modulo_pool_size() {
        // start at c (position 2), then wrap to a, then b
        let (dispatcher, store, client) = dispatcher_with(
            RotationPolicy::RoundRobin,
            state_with_keys(vec![active("a"), active("b"), active("c")], 1),
            &[("c", Err(429)), ("a", Ok("from a")), ("b", Ok("unused"))],
        );

        let outcome = dispatcher.dispatch("q").await.unwrap();

        assert!(outcome.ok);
        assert_eq!(outcome.used_position, Some(0));
        assert_eq!(client.calls(), vec!["c", "a"]);
        // cursor lands on the succeeding position
        assert_eq!(store.snapshot().last_used, 0);
    }

    #[tokio::test]
    async fn test_round_robin_each_position_tried_once() {
        let (dispatcher, store, client) = dispatcher_with(
            RotationPolicy::RoundRobin,
            state_with_keys(vec![active("a"), active("b"), active("c")], 1),
            &[("a", Err(500)), ("b", Err(500)), ("c", Err(500))],
        );

        let outcome = dispatcher.dispatch("q").await.unwrap();

        assert!(!outcome.ok);
        assert_eq!(outcome.text, ALL_KEYS_FAILED);
        assert_eq!(outcome.used_position, None);
        // at most pool-size attempts, no position twice, ascending walk
        assert_eq!(client.calls(), vec!["c", "a", "b"]);
        // cursor untouched by a failed dispatch
        assert_eq!(store.snapshot().last_used, 1);
    }

    #[tokio::test]
    async fn test_round_robin_never_mutates_health() {
        let (dispatcher, store, _client) = dispatcher_with(
            RotationPolicy::RoundRobin,
            state_with_keys(vec![active("a"), active("b")], 0),
            &[("a", Err(429)), ("b", Err(429))],
        );

        dispatcher.dispatch("q").await.unwrap();

        assert!(store.snapshot().keys.iter().all(|k| k.is_active()));
    }

    #[tokio::test]
    async fn test_round_robin_single_key_pool() {
        let (dispatcher, store, client) = dispatcher_with(
            RotationPolicy::RoundRobin,
            state_with_keys(vec![active("only")], 0),
            &[("only", Ok("answer"))],
        );

        let outcome = dispatcher.dispatch("q").await.unwrap();

        assert!(outcome.ok);
        assert_eq!(outcome.used_position, Some(0));
        assert_eq!(client.calls(), vec!["only"]);
        assert_eq!(store.snapshot().last_used, 0);
    }

    // ------------------------------------------------------------------
    // HealthGated
    // ------------------------------------------------------------------

    #[tokio::test]
    async fn test_health_gated_locks_failure_then_continues() {
        let (dispatcher, store, client) = dispatcher_with(
            RotationPolicy::HealthGated,
            state_with_keys(vec![active("a"), active("b")], 0),
            &[("a", Err(429)), ("b", Ok("from b"))],
        );

        let outcome = dispatcher.dispatch("q").await.unwrap();

        assert!(outcome.ok);
        assert_eq!(outcome.text, "from b");
        assert_eq!(outcome.used_position, Some(1));
        assert_eq!(client.calls(), vec!["a", "b"]);

        let keys = store.snapshot().keys;
        assert_eq!(keys.get(0).unwrap().health(), KeyHealth::Locked);
        // the succeeding key is untouched
        assert!(keys.get(1).unwrap().is_active());
    }

    #[tokio::test]
    async fn test_health_gated_skips_locked_keys() {
        // active set is just k1; k2 is never tried even after k1 fails
        let (dispatcher, store, client) = dispatcher_with(
            RotationPolicy::HealthGated,
            state_with_keys(vec![active("k1"), locked("k2")], 0),
            &[("k1", Err(403))],
        );

        let outcome = dispatcher.dispatch("q").await.unwrap();

        assert!(!outcome.ok);
        assert_eq!(client.calls(), vec!["k1"]);

        let keys = store.snapshot().keys;
        assert_eq!(keys.get(0).unwrap().health(), KeyHealth::Locked);
        assert_eq!(keys.get(1).unwrap().health(), KeyHealth::Locked);
    }

    #[tokio::test]
    async fn test_health_gated_resets_fully_locked_pool() {
        // 3 locked keys: reset makes all active, first fails and re-locks,
        // second succeeds, third stays active untried
        let (dispatcher, store, client) = dispatcher_with(
            RotationPolicy::HealthGated,
            state_with_keys(vec![locked("a"), locked("b"), locked("c")], 0),
            &[("a", Err(429)), ("b", Ok("recovered"))],
        );

        let outcome = dispatcher.dispatch("q").await.unwrap();

        assert!(outcome.ok);
        assert_eq!(outcome.text, "recovered");
        assert_eq!(client.calls(), vec!["a", "b"]);

        let keys = store.snapshot().keys;
        assert_eq!(keys.get(0).unwrap().health(), KeyHealth::Locked);
        assert!(keys.get(1).unwrap().is_active());
        assert!(keys.get(2).unwrap().is_active());
    }

    #[tokio::test]
    async fn test_health_gated_exhaustion_keeps_locks() {
        let (dispatcher, store, _client) = dispatcher_with(
            RotationPolicy::HealthGated,
            state_with_keys(vec![active("a"), active("b")], 0),
            &[("a", Err(500)), ("b", Err(500))],
        );

        let outcome = dispatcher.dispatch("q").await.unwrap();

        assert!(!outcome.ok);
        assert_eq!(outcome.text, ALL_KEYS_FAILED);
        // locks from the failed pass are not rolled back
        assert_eq!(store.snapshot().keys.active_count(), 0);
    }

    #[tokio::test]
    async fn test_health_gated_success_mutates_nothing() {
        let before = state_with_keys(vec![active("a"), active("b")], 0);
        let (dispatcher, store, _client) = dispatcher_with(
            RotationPolicy::HealthGated,
            before.clone(),
            &[("a", Ok("fine"))],
        );

        dispatcher.dispatch("q").await.unwrap();

        let after = store.snapshot();
        assert_eq!(after.keys, before.keys);
        assert_eq!(after.last_used, before.last_used);
    }

    #[tokio::test]
    async fn test_lock_is_persisted_per_failure_not_batched() {
        // both keys fail: after the dispatch both locks are in the store,
        // and the first lock was written before the second attempt ran
        struct CheckingClient {
            store: Arc<MemoryStore>,
            calls: StdMutex<usize>,
        }

        #[async_trait]
        impl GenerateClient for CheckingClient {
            async fn generate(&self, _key: &str, _prompt: &str) -> Result<String, AttemptError> {
                let mut calls = self.calls.lock().unwrap();
                if *calls == 1 {
                    // second attempt: the first key's lock must already be durable
                    assert_eq!(self.store.snapshot().keys.locked_count(), 1);
                }
                *calls += 1;
                Err(AttemptError::Api {
                    code: 429,
                    message: "scripted failure".to_string(),
                })
            }
        }

        let store = Arc::new(MemoryStore::with_state(state_with_keys(
            vec![active("a"), active("b")],
            0,
        )));
        let client = Arc::new(CheckingClient {
            store: store.clone(),
            calls: StdMutex::new(0),
        });
        let dispatcher =
            Dispatcher::new(RotationPolicy::HealthGated, client, store.clone());

        let outcome = dispatcher.dispatch("q").await.unwrap();

        assert!(!outcome.ok);
        assert_eq!(store.snapshot().keys.locked_count(), 2);
    }

    // ------------------------------------------------------------------
    // Shared
    // ------------------------------------------------------------------

    #[tokio::test]
    async fn test_empty_pool_reads_as_exhaustion() {
        let (dispatcher, _store, _client) = dispatcher_with(
            RotationPolicy::HealthGated,
            RelayState::default(),
            &[],
        );

        let outcome = dispatcher.dispatch("q").await.unwrap();
        assert!(!outcome.ok);
        assert_eq!(outcome.used_position, None);
    }
}
