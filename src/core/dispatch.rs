//! Fire-and-forget hand-off of ledger pairs to the ledger service
//!
//! This module provides the `LedgerDispatcher` struct, a bounded queue drained
//! by a single background task that forwards every pair to a [`LedgerClient`].
//!
//! # Design
//!
//! ```text
//! BalanceEngine ──try_send──▶ mpsc (bounded) ──▶ worker task ──▶ LedgerClient
//! ```
//!
//! Enqueueing never waits. When the queue is full the pair is dropped and a
//! warning is logged: under sustained overload ledger recording lags or loses
//! pairs, while balances stay correct. Recording failures are logged by the
//! worker and never retried.
//!
//! After a pair is recorded the worker invalidates the cached history of both
//! accounts again. The dispatcher also tracks, per account, how many pairs are
//! still queued and a history version that moves whenever one is queued or
//! settled. History reads wait on the former and guard cache writes with the
//! latter.

use super::traits::{HistoryCache, LedgerClient};
use crate::types::{AccountId, LedgerPair};
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, oneshot, Mutex, Notify};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

#[derive(Debug)]
enum DispatchMessage {
    Record(LedgerPair),
    Flush(oneshot::Sender<()>),
    Shutdown,
}

#[derive(Debug, Default, Clone, Copy)]
struct AccountRecords {
    /// Bumped whenever a pair touching the account is queued or settled
    version: u64,
    /// Pairs queued but not yet handed to the ledger
    pending: u64,
}

/// Per-account bookkeeping of pairs the ledger has not seen yet
#[derive(Debug, Default)]
struct RecordTracker {
    accounts: DashMap<AccountId, AccountRecords>,
    settled: Notify,
}

impl RecordTracker {
    fn queued(&self, pair: &LedgerPair) {
        for account in pair.accounts() {
            let mut records = self.accounts.entry(account.to_string()).or_default();
            records.version += 1;
            records.pending += 1;
        }
    }

    fn settled(&self, pair: &LedgerPair) {
        for account in pair.accounts() {
            if let Some(mut records) = self.accounts.get_mut(account) {
                records.version += 1;
                records.pending = records.pending.saturating_sub(1);
            }
        }
        self.settled.notify_waiters();
    }

    fn version(&self, account_id: &str) -> u64 {
        self.accounts
            .get(account_id)
            .map(|records| records.version)
            .unwrap_or(0)
    }

    /// The account's version, or `None` while pairs for it are still queued
    fn settled_version(&self, account_id: &str) -> Option<u64> {
        match self.accounts.get(account_id) {
            Some(records) if records.pending > 0 => None,
            Some(records) => Some(records.version),
            None => Some(0),
        }
    }

    async fn wait_settled(&self, account_id: &str) -> u64 {
        loop {
            // Register before checking so a settle in between is not missed
            let notified = self.settled.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if let Some(version) = self.settled_version(account_id) {
                return version;
            }
            notified.await;
        }
    }
}

/// Bounded background queue feeding the ledger service
///
/// Cloning shares the same queue and worker.
#[derive(Debug, Clone)]
pub struct LedgerDispatcher {
    sender: mpsc::Sender<DispatchMessage>,
    worker: Arc<Mutex<Option<JoinHandle<()>>>>,
    dropped: Arc<AtomicU64>,
    records: Arc<RecordTracker>,
}

impl LedgerDispatcher {
    /// Start the worker task
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn(
        ledger: Arc<dyn LedgerClient>,
        cache: Arc<dyn HistoryCache>,
        capacity: usize,
    ) -> Self {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        let records = Arc::new(RecordTracker::default());
        let worker = tokio::spawn(run_worker(ledger, cache, Arc::clone(&records), receiver));

        Self {
            sender,
            worker: Arc::new(Mutex::new(Some(worker))),
            dropped: Arc::new(AtomicU64::new(0)),
            records,
        }
    }

    /// Queue a pair for recording without waiting
    ///
    /// Returns `false` when the pair was dropped because the queue is full or
    /// the dispatcher has shut down.
    pub fn dispatch(&self, pair: LedgerPair) -> bool {
        let debit_id = pair.debit.id;
        let category = pair.category();

        self.records.queued(&pair);
        match self.sender.try_send(DispatchMessage::Record(pair)) {
            Ok(()) => true,
            Err(TrySendError::Full(message)) => {
                self.abandon(message);
                warn!(entry = %debit_id, %category, "ledger dispatch queue full, dropping pair");
                false
            }
            Err(TrySendError::Closed(message)) => {
                self.abandon(message);
                warn!(entry = %debit_id, %category, "ledger dispatcher stopped, dropping pair");
                false
            }
        }
    }

    fn abandon(&self, message: DispatchMessage) {
        self.dropped.fetch_add(1, Ordering::Relaxed);
        if let DispatchMessage::Record(pair) = message {
            self.records.settled(&pair);
        }
    }

    /// Wait until every pair queued before this call has been handed to the ledger
    pub async fn flush(&self) {
        let (ack, done) = oneshot::channel();
        if self.sender.send(DispatchMessage::Flush(ack)).await.is_err() {
            return;
        }
        let _ = done.await;
    }

    /// Wait until no pair touching `account_id` is still queued
    ///
    /// Returns the account's history version at that point. The version
    /// changes whenever a pair for the account is queued or settled, see
    /// [`LedgerDispatcher::history_version`].
    pub async fn settled(&self, account_id: &str) -> u64 {
        self.records.wait_settled(account_id).await
    }

    /// Current history version of an account
    pub fn history_version(&self, account_id: &str) -> u64 {
        self.records.version(account_id)
    }

    /// Drain the queue and stop the worker
    ///
    /// Pairs dispatched after shutdown are dropped. Calling this twice is a no-op.
    pub async fn shutdown(&self) {
        let _ = self.sender.send(DispatchMessage::Shutdown).await;

        let worker = self.worker.lock().await.take();
        if let Some(worker) = worker {
            if let Err(e) = worker.await {
                warn!(error = %e, "ledger dispatcher task failed");
            }
        }
    }

    /// Number of pairs dropped because the queue was full or closed
    pub fn dropped_count(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

async fn run_worker(
    ledger: Arc<dyn LedgerClient>,
    cache: Arc<dyn HistoryCache>,
    records: Arc<RecordTracker>,
    mut receiver: mpsc::Receiver<DispatchMessage>,
) {
    while let Some(message) = receiver.recv().await {
        match message {
            DispatchMessage::Record(pair) => {
                match ledger.record_pair(&pair).await {
                    Ok(()) => {
                        debug!(
                            entry = %pair.debit.id,
                            category = %pair.category(),
                            "ledger pair recorded"
                        );
                        for account in pair.accounts() {
                            if let Err(e) = cache.invalidate(account).await {
                                warn!(error = %e, account = %account, "failed to invalidate history cache");
                            }
                        }
                    }
                    Err(e) => warn!(
                        error = %e,
                        category = %pair.category(),
                        debit = %pair.debit.subject_account_id,
                        credit = %pair.credit.subject_account_id,
                        amount = pair.amount(),
                        "failed to record ledger pair"
                    ),
                }
                records.settled(&pair);
            }
            DispatchMessage::Flush(ack) => {
                let _ = ack.send(());
            }
            // Closing keeps everything already queued, so the loop drains it
            DispatchMessage::Shutdown => receiver.close(),
        }
    }
    debug!("ledger dispatcher stopped");
}
