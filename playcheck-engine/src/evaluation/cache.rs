//! Caching of external scoring results.
//!
//! Only the raw [`ExternalScore`] is stored. The blend is recomputed on every
//! evaluation so a cache hit and a fresh call with the same payload always
//! produce the same final score.

use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::fmt::Write as _;
use std::sync::Mutex;
use thiserror::Error;

use crate::capability::ExternalScore;
use crate::config::SequenceRunConfig;
use crate::constants::{CACHE_KEY_SEGMENT_LEN, CACHE_TTL_SECS};
use crate::result::ActionResult;

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("cache entry is not valid json: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("cache lock poisoned")]
    Poisoned,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub key: String,
    pub stored_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub external: ExternalScore,
}

impl CacheEntry {
    #[must_use]
    pub fn new(key: impl Into<String>, external: ExternalScore, now: DateTime<Utc>) -> Self {
        Self {
            key: key.into(),
            stored_at: now,
            expires_at: now + ChronoDuration::seconds(CACHE_TTL_SECS),
            external,
        }
    }

    #[must_use]
    pub fn is_fresh(&self, now: DateTime<Utc>) -> bool {
        self.expires_at > now
    }
}

/// Storage for cached external scores, keyed by [`cache_key`].
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Entry stored under `key`, fresh or not. Expiry is the caller's check.
    async fn get(&self, key: &str) -> Result<Option<CacheEntry>, CacheError>;

    async fn put(&self, entry: &CacheEntry) -> Result<(), CacheError>;
}

/// In-process cache, mostly for tests and single-run use.
#[derive(Debug, Default)]
pub struct MemoryCache {
    entries: Mutex<HashMap<String, CacheEntry>>,
}

impl MemoryCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.lock().map_or(0, |entries| entries.len())
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl CacheStore for MemoryCache {
    async fn get(&self, key: &str) -> Result<Option<CacheEntry>, CacheError> {
        let entries = self.entries.lock().map_err(|_| CacheError::Poisoned)?;
        Ok(entries.get(key).cloned())
    }

    async fn put(&self, entry: &CacheEntry) -> Result<(), CacheError> {
        let mut entries = self.entries.lock().map_err(|_| CacheError::Poisoned)?;
        entries.insert(entry.key.clone(), entry.clone());
        Ok(())
    }
}

fn digest_prefix(bytes: &[u8]) -> String {
    let digest = Sha256::digest(bytes);
    let mut hex = String::with_capacity(CACHE_KEY_SEGMENT_LEN);
    for byte in digest.iter().take(CACHE_KEY_SEGMENT_LEN / 2) {
        let _ = write!(hex, "{byte:02x}");
    }
    hex
}

/// Deterministic key over the page, the run configuration and the per-step
/// outcomes. Two runs of the same steps that succeed and fail in the same
/// places share a cache entry.
#[must_use]
pub fn cache_key(url: &str, config: &SequenceRunConfig, results: &[ActionResult]) -> String {
    // Struct fields serialize in declaration order and controls is a
    // BTreeMap, so this string is canonical for a given config.
    let config_json = serde_json::to_string(config).unwrap_or_default();

    let mut outcomes = String::new();
    for result in results {
        let _ = write!(outcomes, "{}:{};", result.index, u8::from(result.success));
    }

    format!(
        "{}-{}-{}",
        digest_prefix(url.as_bytes()),
        digest_prefix(config_json.as_bytes()),
        digest_prefix(outcomes.as_bytes())
    )
}
