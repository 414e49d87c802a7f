//! API key types
//!
//! This module defines the `ApiKey` credential, its persisted health state,
//! and the ordered `KeyPool` that the dispatcher rotates over.

use serde::{Deserialize, Serialize};

// ============================================================================
// Key Health
// ============================================================================

/// Health status for an API key
///
/// A key starts `Active` and is latched to `Locked` by the health-gated
/// dispatch policy after a failed call. Locked keys are skipped until the
/// pool runs out of active keys, at which point the whole pool is reset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyHealth {
    #[default]
    Active,
    Locked,
}

impl KeyHealth {
    pub fn is_active(self) -> bool {
        self == KeyHealth::Active
    }
}

impl std::fmt::Display for KeyHealth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            KeyHealth::Active => write!(f, "active"),
            KeyHealth::Locked => write!(f, "locked"),
        }
    }
}

// ============================================================================
// API Key
// ============================================================================

/// A single API key with its persisted health state
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiKey {
    /// The key material sent to the remote API
    secret: String,

    /// Current health state
    #[serde(default)]
    health: KeyHealth,
}

impl ApiKey {
    /// Create a new active key
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            secret: secret.into(),
            health: KeyHealth::Active,
        }
    }

    /// Get the key material
    pub fn secret(&self) -> &str {
        &self.secret
    }

    /// Get the health state
    pub fn health(&self) -> KeyHealth {
        self.health
    }

    pub fn is_active(&self) -> bool {
        self.health.is_active()
    }

    /// Latch the key to `Locked`
    pub fn lock(&mut self) {
        self.health = KeyHealth::Locked;
    }

    /// Reset the key to `Active`
    pub fn unlock(&mut self) {
        self.health = KeyHealth::Active;
    }

    /// Redacted form of the secret for logs and listings
    pub fn masked_secret(&self) -> String {
        let visible: String = self.secret.chars().take(6).collect();
        if self.secret.chars().count() <= 6 {
            "******".to_string()
        } else {
            format!("{visible}******")
        }
    }
}

// ============================================================================
// Key Pool
// ============================================================================

/// An ordered pool of API keys
///
/// Order is insertion order; the round-robin policy walks positions relative
/// to it. Invariant: no two keys share the same secret.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct KeyPool {
    keys: Vec<ApiKey>,
}

impl KeyPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a pool from keys, dropping duplicate secrets (first wins)
    pub fn from_keys(keys: Vec<ApiKey>) -> Self {
        let mut pool = Self::new();
        for key in keys {
            pool.insert(key);
        }
        pool
    }

    /// Build a pool of active keys from raw secrets
    pub fn from_secrets<I, S>(secrets: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::from_keys(secrets.into_iter().map(ApiKey::new).collect())
    }

    /// Add a key to the end of the pool
    ///
    /// Returns false (and leaves the pool unchanged) if a key with the same
    /// secret is already present.
    pub fn insert(&mut self, key: ApiKey) -> bool {
        if self.keys.iter().any(|k| k.secret == key.secret) {
            return false;
        }
        self.keys.push(key);
        true
    }

    /// Remove the key with the given secret, if present
    pub fn remove(&mut self, secret: &str) -> bool {
        let before = self.keys.len();
        self.keys.retain(|k| k.secret != secret);
        self.keys.len() != before
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn get(&self, position: usize) -> Option<&ApiKey> {
        self.keys.get(position)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ApiKey> {
        self.keys.iter()
    }

    /// Positions of active keys, in pool order
    pub fn active_positions(&self) -> Vec<usize> {
        self.keys
            .iter()
            .enumerate()
            .filter(|(_, k)| k.is_active())
            .map(|(i, _)| i)
            .collect()
    }

    pub fn active_count(&self) -> usize {
        self.keys.iter().filter(|k| k.is_active()).count()
    }

    pub fn locked_count(&self) -> usize {
        self.keys.len() - self.active_count()
    }

    /// Latch the key at `position` to `Locked`
    pub fn lock(&mut self, position: usize) {
        if let Some(key) = self.keys.get_mut(position) {
            key.lock();
        }
    }

    /// Reset every key to `Active`
    ///
    /// Recovery action taken when health filtering would leave the working
    /// set empty; the pool is never silently emptied.
    pub fn reset_all(&mut self) {
        for key in &mut self.keys {
            key.unlock();
        }
    }
}

impl std::ops::Index<usize> for KeyPool {
    type Output = ApiKey;

    fn index(&self, position: usize) -> &ApiKey {
        &self.keys[position]
    }
}

// ============================================================================
// Tests
// ============================================================================
