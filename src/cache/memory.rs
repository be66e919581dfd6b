//! In-process history cache with per-entry expiry
//!
//! Values are stored as the same JSON text the shared cache holds, so a cached
//! history round-trips through serialization exactly as it would through Redis.

use crate::core::{history_key, HistoryCache};
use crate::types::{LedgerEntry, WalletError};
use async_trait::async_trait;
use dashmap::DashMap;
use std::time::Duration;
use tokio::time::Instant;

/// Fallback lifetime when `now + ttl` does not fit in an `Instant`
const MAX_TTL: Duration = Duration::from_secs(100 * 365 * 24 * 60 * 60);

#[derive(Debug, Clone)]
struct CachedHistory {
    payload: String,
    expires_at: Instant,
}

/// Thread-safe [`HistoryCache`] kept in process memory
///
/// Expired values are removed lazily when they are next read.
#[derive(Debug, Default)]
pub struct InMemoryHistoryCache {
    values: DashMap<String, CachedHistory>,
}

impl InMemoryHistoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored values, including expired ones not yet read
    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

#[async_trait]
impl HistoryCache for InMemoryHistoryCache {
    async fn get(&self, account_id: &str) -> Result<Option<Vec<LedgerEntry>>, WalletError> {
        let key = history_key(account_id);
        let now = Instant::now();

        // Clone out of the map so the shard lock is released before removal
        let cached = self.values.get(&key).map(|value| value.value().clone());
        match cached {
            Some(value) if value.expires_at > now => Ok(Some(serde_json::from_str(&value.payload)?)),
            Some(_) => {
                self.values.remove_if(&key, |_, value| value.expires_at <= now);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn put(
        &self,
        account_id: &str,
        entries: &[LedgerEntry],
        ttl: Duration,
    ) -> Result<(), WalletError> {
        let payload = serde_json::to_string(entries)?;
        let now = Instant::now();
        let expires_at = now
            .checked_add(ttl)
            .unwrap_or_else(|| now + MAX_TTL);

        self.values.insert(
            history_key(account_id),
            CachedHistory {
                payload,
                expires_at,
            },
        );
        Ok(())
    }

    async fn invalidate(&self, account_id: &str) -> Result<(), WalletError> {
        self.values.remove(&history_key(account_id));
        Ok(())
    }
}
