//! File-backed state store
//!
//! The whole relay state lives in one JSON document. Earlier versions of
//! this system stored the key list as a bare array of secret strings; that
//! shape is still accepted on load and normalized to the current object
//! form, so the pool reaching the dispatcher always carries health state.

use async_trait::async_trait;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tokio::fs;

use super::{RelayState, StateStore, StoreError};
use crate::services::key_pool::{ApiKey, KeyPool};

/// JSON-file implementation of [`StateStore`]
#[derive(Debug, Clone)]
pub struct FileStore {
    path: PathBuf,
}

/// On-disk document, tolerant of the legacy key shape
#[derive(Deserialize)]
struct StateDoc {
    #[serde(default)]
    keys: Vec<KeyEntry>,
    #[serde(default)]
    last_used: usize,
    #[serde(default)]
    last_question: Option<String>,
    #[serde(default)]
    last_answer: Option<String>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum KeyEntry {
    Tagged(ApiKey),
    Bare(String),
}

impl From<KeyEntry> for ApiKey {
    fn from(entry: KeyEntry) -> Self {
        match entry {
            KeyEntry::Tagged(key) => key,
            KeyEntry::Bare(secret) => ApiKey::new(secret),
        }
    }
}

impl From<StateDoc> for RelayState {
    fn from(doc: StateDoc) -> Self {
        RelayState {
            keys: KeyPool::from_keys(doc.keys.into_iter().map(ApiKey::from).collect()),
            last_used: doc.last_used,
            last_question: doc.last_question,
            last_answer: doc.last_answer,
        }
    }
}

impl FileStore {
    /// Create a store backed by the given file path
    ///
    /// The file is created lazily on first save; a missing file loads as the
    /// default (empty) state.
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the full state document
    pub async fn load(&self) -> Result<RelayState, StoreError> {
        match fs::read_to_string(&self.path).await {
            Ok(contents) => {
                let doc: StateDoc = serde_json::from_str(&contents)?;
                Ok(doc.into())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(RelayState::default()),
            Err(e) => Err(e.into()),
        }
    }

    /// Write the full state document
    pub async fn save(&self, state: &RelayState) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).await?;
            }
        }
        let contents = serde_json::to_string_pretty(state)?;
        fs::write(&self.path, contents).await?;
        Ok(())
    }

    /// Apply a mutation to the state document and persist it
    async fn update<F>(&self, mutate: F) -> Result<(), StoreError>
    where
        F: FnOnce(&mut RelayState),
    {
        let mut state = self.load().await?;
        mutate(&mut state);
        self.save(&state).await
    }
}

#[async_trait]
impl StateStore for FileStore {
    async fn load_pool(&self) -> Result<KeyPool, StoreError> {
        Ok(self.load().await?.keys)
    }

    async fn save_pool(&self, pool: &KeyPool) -> Result<(), StoreError> {
        let pool = pool.clone();
        self.update(|state| state.keys = pool).await
    }

    async fn load_cursor(&self) -> Result<usize, StoreError> {
        Ok(self.load().await?.last_used)
    }

    async fn save_cursor(&self, position: usize) -> Result<(), StoreError> {
        self.update(|state| state.last_used = position).await
    }

    async fn record_exchange(&self, question: &str, answer: &str) -> Result<(), StoreError> {
        let question = question.to_string();
        let answer = answer.to_string();
        self.update(|state| {
            state.last_question = Some(question);
            state.last_answer = Some(answer);
        })
        .await
    }

    async fn last_exchange(&self) -> Result<(Option<String>, Option<String>), StoreError> {
        let state = self.load().await?;
        Ok((state.last_question, state.last_answer))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::key_pool::KeyHealth;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_missing_file_loads_default_state() {
        let dir = tempdir().unwrap();
        let store = FileStore::new(dir.path().join("state.json"));

        let state = store.load().await.unwrap();
        assert!(state.keys.is_empty());
        assert_eq!(state.last_used, 0);
        assert!(state.last_question.is_none());
    }

    #[tokio::test]
    async fn test_save_load_round_trip() {
        let dir = tempdir().unwrap();
        let store = FileStore::new(dir.path().join("nested/state.json"));

        let mut pool = KeyPool::from_secrets(["k1", "k2"]);
        pool.lock(1);
        store.save_pool(&pool).await.unwrap();
        store.save_cursor(1).await.unwrap();

        let loaded = store.load_pool().await.unwrap();
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded.get(1).unwrap().health(), KeyHealth::Locked);
        assert_eq!(store.load_cursor().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_legacy_bare_string_keys_are_normalized() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("state.json");
        std::fs::write(
            &path,
            r#"{"keys": ["old-key-1", "old-key-2"], "last_used": 1}"#,
        )
        .unwrap();

        let store = FileStore::new(&path);
        let pool = store.load_pool().await.unwrap();

        assert_eq!(pool.len(), 2);
        assert_eq!(pool.get(0).unwrap().secret(), "old-key-1");
        assert!(pool.iter().all(|k| k.is_active()));
        assert_eq!(store.load_cursor().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_mixed_legacy_and_current_shapes() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("state.json");
        std::fs::write(
            &path,
            r#"{"keys": ["bare", {"secret": "tagged", "health": "locked"}]}"#,
        )
        .unwrap();

        let pool = FileStore::new(&path).load_pool().await.unwrap();
        assert!(pool.get(0).unwrap().is_active());
        assert_eq!(pool.get(1).unwrap().health(), KeyHealth::Locked);
    }

    #[tokio::test]
    async fn test_record_exchange() {
        let dir = tempdir().unwrap();
        let store = FileStore::new(dir.path().join("state.json"));

        store.record_exchange("what is rust", "a language").await.unwrap();

        let (question, answer) = store.last_exchange().await.unwrap();
        assert_eq!(question.as_deref(), Some("what is rust"));
        assert_eq!(answer.as_deref(), Some("a language"));
    }

    #[tokio::test]
    async fn test_corrupt_file_is_a_parse_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("state.json");
        std::fs::write(&path, "not json").unwrap();

        let err = FileStore::new(&path).load().await.unwrap_err();
        assert!(matches!(err, StoreError::Parse(_)));
    }
}
