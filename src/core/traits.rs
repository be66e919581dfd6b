//! Collaborator traits for the balance engine
//!
//! The engine talks to the ledger service and the history cache only through
//! these traits. Handles are built once at startup and passed into
//! [`BalanceEngine::new`](crate::core::BalanceEngine::new) as `Arc<dyn _>`.

use crate::types::{LedgerEntry, LedgerPair, WalletError};
use async_trait::async_trait;
use std::time::Duration;

/// Out-of-process recorder of ledger entries
///
/// Recording is audit-only and decoupled from balance correctness: the engine
/// never waits on `record_pair` before answering its caller, and a retried
/// recording may produce duplicates.
#[async_trait]
pub trait LedgerClient: Send + Sync {
    /// Durably record a debit/credit pair
    async fn record_pair(&self, pair: &LedgerPair) -> Result<(), WalletError>;

    /// Entries whose subject is `account_id`, most recent first
    async fn fetch_history(&self, account_id: &str) -> Result<Vec<LedgerEntry>, WalletError>;
}

/// Cache-aside store of per-account ledger history
///
/// The cache is never the source of truth. An empty list is a valid cached
/// value and is distinct from a miss.
#[async_trait]
pub trait HistoryCache: Send + Sync {
    /// Cached entries for `account_id`, or `None` on a miss
    async fn get(&self, account_id: &str) -> Result<Option<Vec<LedgerEntry>>, WalletError>;

    /// Overwrite the cached entries for `account_id`
    async fn put(
        &self,
        account_id: &str,
        entries: &[LedgerEntry],
        ttl: Duration,
    ) -> Result<(), WalletError>;

    /// Remove the cached entries for `account_id`; absence is not an error
    async fn invalidate(&self, account_id: &str) -> Result<(), WalletError>;
}

/// Cache key holding the history of `account_id`
pub fn history_key(account_id: &str) -> String {
    format!("history:{}", account_id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_history_key() {
        assert_eq!(history_key("alice"), "history:alice");
    }
}
