//! Balance mutation orchestration
//!
//! This module provides the `BalanceEngine` struct, which runs deposits,
//! withdrawals and transfers as atomic two-account updates against the
//! [`AccountStore`], hands the resulting ledger pairs to the ledger service and
//! keeps the history cache coherent.
//!
//! # Architecture
//!
//! ```text
//! BalanceEngine
//!     ├── Arc<AccountStore>        (accounts and row locks)
//!     ├── LedgerDispatcher         (background queue to the ledger service)
//!     ├── Arc<dyn LedgerClient>    (history reads)
//!     └── Arc<dyn HistoryCache>    (cache-aside history)
//! ```
//!
//! # Mutation protocol
//!
//! Every mutation moves through the stages of [`MutationStage`]. Anything that
//! fails before `Committed` drops the atomic scope, which rolls back every
//! staged balance. Failures after `Committed` are logged and never reach the
//! caller: the balance change is the authoritative outcome.
//!
//! # Thread Safety
//!
//! The engine is cheap to clone and every clone shares the same store, queue
//! and collaborators. Both legs of a pair are locked in ascending account
//! order, so two transfers over the same accounts in opposite directions
//! cannot deadlock.

use super::account_store::AccountStore;
use super::dispatch::LedgerDispatcher;
use super::traits::{HistoryCache, LedgerClient};
use crate::config::EngineConfig;
use crate::types::{
    Account, AccountHistory, AccountKind, EntryCategory, LedgerEntry, LedgerPair, WalletError,
};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Stages of a single balance mutation, in order
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum MutationStage {
    Validated,
    Locked,
    Mutated,
    Committed,
    LedgerDispatched,
    CacheInvalidated,
}

impl MutationStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            MutationStage::Validated => "validated",
            MutationStage::Locked => "locked",
            MutationStage::Mutated => "mutated",
            MutationStage::Committed => "committed",
            MutationStage::LedgerDispatched => "ledger_dispatched",
            MutationStage::CacheInvalidated => "cache_invalidated",
        }
    }
}

impl fmt::Display for MutationStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Balance mutation orchestrator
///
/// Construct one per process and clone it into every task that needs it.
#[derive(Clone)]
pub struct BalanceEngine {
    store: Arc<AccountStore>,
    ledger: Arc<dyn LedgerClient>,
    cache: Arc<dyn HistoryCache>,
    dispatcher: LedgerDispatcher,
    config: EngineConfig,
}

impl fmt::Debug for BalanceEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BalanceEngine")
            .field("store", &self.store)
            .field("dispatcher", &self.dispatcher)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl BalanceEngine {
    /// Create an engine over an empty account store
    ///
    /// Starts the ledger dispatch worker, so this must be called from within
    /// a tokio runtime.
    ///
    /// # Arguments
    ///
    /// * `ledger` - Ledger service handle used for recording and history reads
    /// * `cache` - History cache handle
    /// * `config` - Engine settings
    pub fn new(
        ledger: Arc<dyn LedgerClient>,
        cache: Arc<dyn HistoryCache>,
        config: EngineConfig,
    ) -> Self {
        let store = Arc::new(AccountStore::with_lock_timeout(config.lock_timeout));
        let dispatcher =
            LedgerDispatcher::spawn(Arc::clone(&ledger), Arc::clone(&cache), config.dispatch_capacity);

        Self {
            store,
            ledger,
            cache,
            dispatcher,
            config,
        }
    }

    /// The account store backing this engine
    pub fn store(&self) -> &AccountStore {
        &self.store
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Number of ledger pairs dropped because the dispatch queue was full
    pub fn dropped_ledger_pairs(&self) -> u64 {
        self.dispatcher.dropped_count()
    }

    /// Create a new account at zero balance
    ///
    /// # Returns
    ///
    /// * `Ok(Account)` - The created account
    /// * `Err(WalletError::InvalidInput)` - If the identifier is malformed
    /// * `Err(WalletError::AlreadyExists)` - If the identifier is taken
    pub fn create(&self, account_id: &str, kind: AccountKind) -> Result<Account, WalletError> {
        let account = self.store.create(account_id, kind)?;
        info!(account = %account.id, kind = %account.kind, "account created");
        Ok(account)
    }

    /// Seed the configured deposit and withdraw providers
    ///
    /// Providers that already exist are left untouched, so this can run on
    /// every start. Returns the providers created by this call.
    pub fn bootstrap_providers(&self, opening_balance: i64) -> Result<Vec<Account>, WalletError> {
        let providers = &self.config.providers;
        let mut ids = vec![providers.deposit.as_str()];
        if providers.withdraw != providers.deposit {
            ids.push(providers.withdraw.as_str());
        }

        let mut seeded = Vec::with_capacity(ids.len());
        for id in ids {
            match self.store.seed_provider(id, opening_balance) {
                Ok(account) => {
                    info!(account = %account.id, balance = account.balance, "provider account seeded");
                    seeded.push(account);
                }
                Err(WalletError::AlreadyExists { .. }) => {
                    debug!(account = %id, "provider account already exists");
                }
                Err(e) => return Err(e),
            }
        }
        Ok(seeded)
    }

    /// Move `amount` from a provider into `account_id`
    ///
    /// Uses the configured deposit provider when `provider_id` is `None`.
    ///
    /// # Returns
    ///
    /// * `Ok(LedgerEntry)` - The credit entry, from the account's perspective
    /// * `Err(WalletError::InvalidAmount)` - If `amount` is not positive
    /// * `Err(WalletError::InvalidInput)` - If the provider is the account itself
    /// * `Err(WalletError::AccountNotFound)` - If the account does not exist
    /// * `Err(WalletError::ProviderNotFound)` - If the provider does not exist
    /// * `Err(WalletError::InsufficientFunds)` - If the provider cannot cover the amount
    pub async fn deposit(
        &self,
        account_id: &str,
        amount: i64,
        provider_id: Option<&str>,
    ) -> Result<LedgerEntry, WalletError> {
        validate_amount(amount)?;
        let provider_id = provider_id.unwrap_or(&self.config.providers.deposit);
        ensure_distinct(account_id, provider_id)?;

        self.store.find_by_id(account_id).await?;
        self.store.find_provider(provider_id).await?;
        debug!(stage = %MutationStage::Validated, account = %account_id, provider = %provider_id, amount, "deposit");

        let pair = LedgerPair::new(EntryCategory::Deposit, provider_id, account_id, amount);
        let pair = self.apply(pair).await?;
        Ok(pair.credit)
    }

    /// Move `amount` from `account_id` into a provider
    ///
    /// Uses the configured withdraw provider when `provider_id` is `None`.
    /// Fails fast on an obviously insufficient balance before any lock is
    /// taken. The check that decides the outcome runs under the row lock.
    ///
    /// # Returns
    ///
    /// * `Ok(LedgerEntry)` - The debit entry, from the account's perspective
    /// * `Err(WalletError::InsufficientFunds)` - If the balance cannot cover the amount
    /// * Otherwise the same errors as [`BalanceEngine::deposit`]
    pub async fn withdraw(
        &self,
        account_id: &str,
        amount: i64,
        provider_id: Option<&str>,
    ) -> Result<LedgerEntry, WalletError> {
        validate_amount(amount)?;
        let provider_id = provider_id.unwrap_or(&self.config.providers.withdraw);
        ensure_distinct(account_id, provider_id)?;

        let account = self.store.find_by_id(account_id).await?;
        self.store.find_provider(provider_id).await?;
        precheck_balance(&account, amount)?;
        debug!(stage = %MutationStage::Validated, account = %account_id, provider = %provider_id, amount, "withdraw");

        let pair = LedgerPair::new(EntryCategory::Withdraw, account_id, provider_id, amount);
        let pair = self.apply(pair).await?;
        Ok(pair.debit)
    }

    /// Move `amount` between two accounts
    ///
    /// # Returns
    ///
    /// * `Ok(LedgerEntry)` - The debit entry, from the sender's perspective
    /// * `Err(WalletError::InvalidInput)` - If sender and receiver are the same account
    /// * `Err(WalletError::InvalidAmount)` - If `amount` is not positive
    /// * `Err(WalletError::AccountNotFound)` - If either account does not exist
    /// * `Err(WalletError::InsufficientFunds)` - If the sender cannot cover the amount
    pub async fn transfer(
        &self,
        from_id: &str,
        to_id: &str,
        amount: i64,
    ) -> Result<LedgerEntry, WalletError> {
        ensure_distinct(from_id, to_id)?;
        validate_amount(amount)?;

        let sender = self.store.find_by_id(from_id).await?;
        self.store.find_by_id(to_id).await?;
        precheck_balance(&sender, amount)?;
        debug!(stage = %MutationStage::Validated, from = %from_id, to = %to_id, amount, "transfer");

        let pair = LedgerPair::new(EntryCategory::Transfer, from_id, to_id, amount);
        let pair = self.apply(pair).await?;
        Ok(pair.debit)
    }

    /// Current account state with its ledger history, most recent entry first
    ///
    /// Waits until every pair already committed for the account has been
    /// handed to the ledger service, so a read right after a mutation sees it.
    /// Serves the history from the cache when present. On a miss the history
    /// is fetched from the ledger service and written back to the cache,
    /// unless a mutation touched the account while the fetch was in flight.
    /// A broken cache degrades to a ledger read and is only logged.
    ///
    /// # Returns
    ///
    /// * `Ok(AccountHistory)` - The account and its entries
    /// * `Err(WalletError::AccountNotFound)` - If the account does not exist
    /// * `Err(WalletError::Unavailable)` - If the ledger service could not be read
    pub async fn get_with_history(&self, account_id: &str) -> Result<AccountHistory, WalletError> {
        let version = self.dispatcher.settled(account_id).await;
        let account = self.store.find_by_id(account_id).await?;

        match self.cache.get(account_id).await {
            Ok(Some(entries)) => {
                debug!(account = %account_id, entries = entries.len(), "history cache hit");
                return Ok(AccountHistory { account, entries });
            }
            Ok(None) => debug!(account = %account_id, "history cache miss"),
            Err(e) => warn!(error = %e, account = %account_id, "history cache read failed, reading ledger"),
        }

        let entries = self.ledger.fetch_history(account_id).await?;
        self.populate_cache(account_id, &entries, version).await;

        Ok(AccountHistory { account, entries })
    }

    /// Best-effort write-back of a history fetched at `version`
    async fn populate_cache(&self, account_id: &str, entries: &[LedgerEntry], version: u64) {
        if self.dispatcher.history_version(account_id) != version {
            debug!(account = %account_id, "history changed during fetch, not caching");
            return;
        }

        if let Err(e) = self
            .cache
            .put(account_id, entries, self.config.history_ttl)
            .await
        {
            warn!(error = %e, account = %account_id, "failed to populate history cache");
            return;
        }

        // A mutation queued between the check and the put may have invalidated before it landed
        if self.dispatcher.history_version(account_id) != version {
            debug!(account = %account_id, "history changed while caching, invalidating");
            if let Err(e) = self.cache.invalidate(account_id).await {
                warn!(error = %e, account = %account_id, "failed to invalidate history cache");
            }
        }
    }

    /// Wait until every ledger pair produced so far has been handed to the ledger
    pub async fn flush_ledger(&self) {
        self.dispatcher.flush().await;
    }

    /// Drain the ledger queue and stop its worker
    ///
    /// Mutations after shutdown still commit, but their ledger pairs are dropped.
    pub async fn shutdown(&self) {
        self.dispatcher.shutdown().await;
        info!(dropped = self.dispatcher.dropped_count(), "balance engine stopped");
    }

    /// Run one validated pair through lock, mutate, commit and the post-commit steps
    async fn apply(&self, pair: LedgerPair) -> Result<LedgerPair, WalletError> {
        let amount = pair.amount();
        let mut scope = self.store.begin_atomic_update();

        for (account_id, direction) in pair.legs_in_lock_order() {
            // Returning early drops the scope, which rolls back the other leg
            self.store
                .adjust_balance(&mut scope, account_id, amount, direction)
                .await?;
        }
        debug!(
            stage = %MutationStage::Locked,
            scope = %scope.id(),
            accounts = ?scope.locked_accounts()
        );
        debug!(
            stage = %MutationStage::Mutated,
            scope = %scope.id(),
            debit_balance = ?scope.staged_balance(&pair.debit.subject_account_id),
            credit_balance = ?scope.staged_balance(&pair.credit.subject_account_id)
        );

        let scope_id = scope.id();
        scope.commit();
        info!(
            stage = %MutationStage::Committed,
            scope = %scope_id,
            category = %pair.category(),
            debit = %pair.debit.subject_account_id,
            credit = %pair.credit.subject_account_id,
            amount,
            "balance mutation committed"
        );

        let queued = self.dispatcher.dispatch(pair.clone());
        debug!(stage = %MutationStage::LedgerDispatched, scope = %scope_id, queued);

        for account_id in pair.accounts() {
            if let Err(e) = self.cache.invalidate(account_id).await {
                warn!(error = %e, account = %account_id, "failed to invalidate history cache");
            }
        }
        debug!(stage = %MutationStage::CacheInvalidated, scope = %scope_id);

        Ok(pair)
    }
}

fn validate_amount(amount: i64) -> Result<(), WalletError> {
    if amount <= 0 {
        return Err(WalletError::invalid_amount(amount));
    }
    Ok(())
}

fn ensure_distinct(account_id: &str, counterparty_id: &str) -> Result<(), WalletError> {
    if account_id == counterparty_id {
        return Err(WalletError::invalid_input(format!(
            "account '{}' cannot be its own counterparty",
            account_id
        )));
    }
    Ok(())
}

/// Advisory balance check outside the row lock
fn precheck_balance(account: &Account, amount: i64) -> Result<(), WalletError> {
    if account.balance < amount {
        return Err(WalletError::insufficient_funds(
            &account.id,
            account.balance,
            amount,
        ));
    }
    Ok(())
}
