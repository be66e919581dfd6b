//! In-process ledger
//!
//! Keeps every recorded entry in memory, indexed by subject account. Used by
//! the replay binary when no ledger service is configured, and by tests.

use crate::core::LedgerClient;
use crate::types::{AccountId, LedgerEntry, LedgerPair, WalletError};
use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Thread-safe in-memory [`LedgerClient`]
#[derive(Debug, Default)]
pub struct InMemoryLedger {
    /// Entries by subject account, oldest first
    entries: DashMap<AccountId, Vec<LedgerEntry>>,
    pairs: AtomicUsize,
}

impl InMemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of pairs recorded so far
    pub fn pair_count(&self) -> usize {
        self.pairs.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl LedgerClient for InMemoryLedger {
    async fn record_pair(&self, pair: &LedgerPair) -> Result<(), WalletError> {
        for entry in [&pair.debit, &pair.credit] {
            self.entries
                .entry(entry.subject_account_id.clone())
                .or_default()
                .push(entry.clone());
        }
        self.pairs.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    async fn fetch_history(&self, account_id: &str) -> Result<Vec<LedgerEntry>, WalletError> {
        Ok(self
            .entries
            .get(account_id)
            .map(|entries| entries.iter().rev().cloned().collect())
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Direction, EntryCategory};

    #[tokio::test]
    async fn test_history_is_indexed_by_subject_most_recent_first() {
        let ledger = InMemoryLedger::new();
        let first = LedgerPair::new(EntryCategory::Deposit, "bank", "alice", 100);
        let second = LedgerPair::new(EntryCategory::Withdraw, "alice", "sink", 40);

        ledger.record_pair(&first).await.unwrap();
        ledger.record_pair(&second).await.unwrap();

        let history = ledger.fetch_history("alice").await.unwrap();
        assert_eq!(history, vec![second.debit.clone(), first.credit.clone()]);
        assert_eq!(history[0].direction, Direction::Debit);

        assert_eq!(ledger.fetch_history("bank").await.unwrap(), vec![first.debit]);
        assert_eq!(ledger.pair_count(), 2);
    }

    #[tokio::test]
    async fn test_unknown_account_has_empty_history() {
        let ledger = InMemoryLedger::new();
        assert!(ledger.fetch_history("ghost").await.unwrap().is_empty());
    }
}
