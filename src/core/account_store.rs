//! Durable account table with row-level exclusive locking
//!
//! This module provides the `AccountStore` struct, which owns every account and
//! the locking primitive used to serialize concurrent balance mutations.
//!
//! # Design
//!
//! Accounts live in a `DashMap` keyed by identifier. Each row is wrapped in its
//! own async mutex, so locking one account never blocks work on another.
//!
//! Balance mutations happen inside an [`AtomicScope`]:
//!
//! ```text
//! begin_atomic_update()
//!     ├── adjust_balance(a, ...)   lock row a, stage new balance
//!     ├── adjust_balance(b, ...)   lock row b, stage new balance
//!     └── commit()                 write staged balances, release both locks
//! ```
//!
//! A row lock is taken lazily the first time the scope touches that row and is
//! held until the scope commits or is dropped. Dropping a scope without
//! committing discards every staged balance, which makes rollback automatic on
//! every exit path, including early returns and panics.
//!
//! # Thread Safety
//!
//! Two scopes touching the same account serialize on its row lock. Scopes on
//! disjoint accounts proceed in parallel. Callers that lock more than one row
//! must do so in a consistent order to avoid deadlock.

use crate::types::{Account, AccountId, AccountKind, Direction, WalletError, MAX_ACCOUNT_ID_LEN};
use chrono::Utc;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::collections::{btree_map, BTreeMap};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::debug;
use uuid::Uuid;

type Row = Arc<Mutex<Account>>;

/// Check that an identifier is acceptable for a new account
pub fn validate_account_id(id: &str) -> Result<(), WalletError> {
    if id.is_empty() {
        return Err(WalletError::invalid_input("account identifier is required"));
    }
    if id.trim() != id {
        return Err(WalletError::invalid_input(format!(
            "account identifier '{}' has leading or trailing whitespace",
            id
        )));
    }
    if id.chars().count() > MAX_ACCOUNT_ID_LEN {
        return Err(WalletError::invalid_input(format!(
            "account identifier is longer than {} characters",
            MAX_ACCOUNT_ID_LEN
        )));
    }
    Ok(())
}

/// Thread-safe account table
///
/// Rows are never removed. Reads go through the row lock as well, so they
/// wait for an in-flight scope on that row and only ever see committed state.
#[derive(Debug, Default)]
pub struct AccountStore {
    /// Account rows by identifier, each behind its own lock
    rows: DashMap<AccountId, Row>,

    /// Longest wait for a row lock, `None` to wait indefinitely
    lock_timeout: Option<Duration>,
}

impl AccountStore {
    /// Create an empty store whose row locks wait indefinitely
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty store whose row lock waits fail after `lock_timeout`
    pub fn with_lock_timeout(lock_timeout: Option<Duration>) -> Self {
        Self {
            rows: DashMap::new(),
            lock_timeout,
        }
    }

    /// Insert a new account at zero balance and active status
    ///
    /// # Returns
    ///
    /// * `Ok(Account)` - The stored account
    /// * `Err(WalletError::InvalidInput)` - If the identifier is malformed
    /// * `Err(WalletError::AlreadyExists)` - If the identifier is taken
    pub fn create(&self, id: &str, kind: AccountKind) -> Result<Account, WalletError> {
        validate_account_id(id)?;
        self.insert(Account::new(id, kind))
    }

    /// Insert a provider account with an opening balance
    ///
    /// Provider accounts fund deposits, so they need a balance before the
    /// first deposit can debit them.
    pub fn seed_provider(&self, id: &str, opening_balance: i64) -> Result<Account, WalletError> {
        validate_account_id(id)?;
        if opening_balance < 0 {
            return Err(WalletError::invalid_amount(opening_balance));
        }
        let mut account = Account::new(id, AccountKind::Provider);
        account.balance = opening_balance;
        self.insert(account)
    }

    fn insert(&self, account: Account) -> Result<Account, WalletError> {
        match self.rows.entry(account.id.clone()) {
            Entry::Occupied(_) => Err(WalletError::already_exists(&account.id)),
            Entry::Vacant(slot) => {
                slot.insert(Arc::new(Mutex::new(account.clone())));
                debug!(account = %account.id, kind = %account.kind, "account created");
                Ok(account)
            }
        }
    }

    /// Return the committed state of an account
    pub async fn find_by_id(&self, id: &str) -> Result<Account, WalletError> {
        let row = self.row(id)?;
        let guard = self.acquire(id, row).await?;
        Ok(Account::clone(&guard))
    }

    /// Return an account only if it is a provider account
    pub async fn find_provider(&self, provider_id: &str) -> Result<Account, WalletError> {
        match self.find_by_id(provider_id).await {
            Ok(account) if account.is_provider() => Ok(account),
            Ok(_) | Err(WalletError::AccountNotFound { .. }) => {
                Err(WalletError::provider_not_found(provider_id))
            }
            Err(e) => Err(e),
        }
    }

    /// Committed state of every account, sorted by identifier
    pub async fn all_accounts(&self) -> Result<Vec<Account>, WalletError> {
        // Collect the rows first so no map shard stays locked across an await
        let rows: Vec<(AccountId, Row)> = self
            .rows
            .iter()
            .map(|entry| (entry.key().clone(), Arc::clone(entry.value())))
            .collect();

        let mut accounts = Vec::with_capacity(rows.len());
        for (id, row) in rows {
            let guard = self.acquire(&id, row).await?;
            accounts.push(Account::clone(&guard));
        }
        accounts.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(accounts)
    }

    /// Open a unit of work for one logical balance mutation
    pub fn begin_atomic_update(&self) -> AtomicScope {
        AtomicScope::new()
    }

    /// Apply a signed delta to an account inside `scope`
    ///
    /// The first call for an account locks its row until the scope ends. The
    /// balance check runs against the value read under that lock, so it is the
    /// authoritative non-negative check for the account.
    ///
    /// # Returns
    ///
    /// * `Ok(i64)` - The staged balance after the delta
    /// * `Err(WalletError::InvalidAmount)` - If `amount` is not positive
    /// * `Err(WalletError::AccountNotFound)` - If the account does not exist
    /// * `Err(WalletError::InsufficientFunds)` - If a debit would go negative
    /// * `Err(WalletError::ArithmeticOverflow)` - If a credit would overflow
    /// * `Err(WalletError::Unavailable)` - If the lock wait timed out
    ///
    /// On error the staged balance is left untouched. The caller is expected
    /// to drop the scope, which rolls back everything staged so far.
    pub async fn adjust_balance(
        &self,
        scope: &mut AtomicScope,
        account_id: &str,
        amount: i64,
        direction: Direction,
    ) -> Result<i64, WalletError> {
        if amount <= 0 {
            return Err(WalletError::invalid_amount(amount));
        }

        let locked = match scope.rows.entry(account_id.to_string()) {
            btree_map::Entry::Occupied(slot) => slot.into_mut(),
            btree_map::Entry::Vacant(slot) => {
                let row = self.row(account_id)?;
                let guard = self.acquire(account_id, row).await?;
                debug!(scope = %scope.id, account = %account_id, "row locked");
                slot.insert(LockedRow::new(guard))
            }
        };

        let next = match direction {
            Direction::Credit => locked
                .staged
                .checked_add(amount)
                .ok_or_else(|| WalletError::arithmetic_overflow("credit", account_id))?,
            Direction::Debit => {
                // staged is never negative, so this cannot overflow
                let next = locked.staged - amount;
                if next < 0 {
                    return Err(WalletError::insufficient_funds(
                        account_id,
                        locked.staged,
                        amount,
                    ));
                }
                next
            }
        };

        locked.staged = next;
        Ok(next)
    }

    fn row(&self, id: &str) -> Result<Row, WalletError> {
        self.rows
            .get(id)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or_else(|| WalletError::account_not_found(id))
    }

    async fn acquire(&self, id: &str, row: Row) -> Result<OwnedMutexGuard<Account>, WalletError> {
        match self.lock_timeout {
            Some(limit) => tokio::time::timeout(limit, row.lock_owned())
                .await
                .map_err(|_| {
                    WalletError::unavailable(format!(
                        "timed out after {:?} waiting for row lock on account '{}'",
                        limit, id
                    ))
                }),
            None => Ok(row.lock_owned().await),
        }
    }
}

/// A row held by a scope, with the balance it will commit
#[derive(Debug)]
struct LockedRow {
    guard: OwnedMutexGuard<Account>,
    staged: i64,
}

impl LockedRow {
    fn new(guard: OwnedMutexGuard<Account>) -> Self {
        let staged = guard.balance;
        Self { guard, staged }
    }
}

/// Unit of work holding exclusive locks on every row it has touched
///
/// Nothing becomes visible to other readers until [`AtomicScope::commit`].
/// Dropping the scope without committing releases the locks and discards all
/// staged balances.
#[derive(Debug)]
pub struct AtomicScope {
    id: Uuid,
    rows: BTreeMap<AccountId, LockedRow>,
}

impl AtomicScope {
    fn new() -> Self {
        Self {
            id: Uuid::now_v7(),
            rows: BTreeMap::new(),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Identifiers of the rows currently locked by this scope
    pub fn locked_accounts(&self) -> Vec<&str> {
        self.rows.keys().map(String::as_str).collect()
    }

    /// Balance that will be written for `account_id` on commit
    pub fn staged_balance(&self, account_id: &str) -> Option<i64> {
        self.rows.get(account_id).map(|row| row.staged)
    }

    /// Write every staged balance and release the row locks
    ///
    /// Returns the committed account states in identifier order.
    pub fn commit(mut self) -> Vec<Account> {
        let now = Utc::now();
        let rows = std::mem::take(&mut self.rows);

        let committed: Vec<Account> = rows
            .into_values()
            .map(|mut row| {
                if row.guard.balance != row.staged {
                    row.guard.balance = row.staged;
                    row.guard.updated_at = now;
                }
                Account::clone(&row.guard)
            })
            .collect();

        debug!(scope = %self.id, accounts = committed.len(), "scope committed");
        committed
    }

    /// Discard every staged balance and release the row locks
    pub fn rollback(self) {
        drop(self);
    }
}

impl Drop for AtomicScope {
    fn drop(&mut self) {
        if !self.rows.is_empty() {
            debug!(scope = %self.id, accounts = self.rows.len(), "scope rolled back");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{AccountStatus, ErrorKind};
    use rstest::rstest;

    async fn funded_store(balance: i64) -> AccountStore {
        let store = AccountStore::new();
        store.create("alice", AccountKind::User).unwrap();
        store.create("bob", AccountKind::User).unwrap();
        store.seed_provider("bank", 1_000_000).unwrap();

        if balance > 0 {
            let mut scope = store.begin_atomic_update();
            store
                .adjust_balance(&mut scope, "alice", balance, Direction::Credit)
                .await
                .unwrap();
            scope.commit();
        }
        store
    }

    #[tokio::test]
    async fn test_create_inserts_active_zero_balance_account() {
        let store = AccountStore::new();

        let account = store.create("alice", AccountKind::User).unwrap();

        assert_eq!(account.balance, 0);
        assert_eq!(account.status, AccountStatus::Active);
        assert_eq!(store.find_by_id("alice").await.unwrap(), account);
    }

    #[test]
    fn test_create_duplicate_fails() {
        let store = AccountStore::new();
        store.create("alice", AccountKind::User).unwrap();

        let result = store.create("alice", AccountKind::Provider);

        assert_eq!(result.unwrap_err(), WalletError::already_exists("alice"));
    }

    #[rstest]
    #[case::empty("")]
    #[case::padded(" alice")]
    #[case::too_long(&"x".repeat(MAX_ACCOUNT_ID_LEN + 1))]
    fn test_create_rejects_malformed_identifier(#[case] id: &str) {
        let store = AccountStore::new();
        let error = store.create(id, AccountKind::User).unwrap_err();
        assert_eq!(error.kind(), ErrorKind::InvalidInput);
    }

    #[test]
    fn test_seed_provider_rejects_negative_opening_balance() {
        let store = AccountStore::new();
        let error = store.seed_provider("bank", -1).unwrap_err();
        assert_eq!(error, WalletError::invalid_amount(-1));
    }

    #[tokio::test]
    async fn test_find_by_id_missing_account() {
        let store = AccountStore::new();
        let error = store.find_by_id("ghost").await.unwrap_err();
        assert_eq!(error, WalletError::account_not_found("ghost"));
    }

    #[rstest]
    #[case::provider("bank", true)]
    #[case::user_account("alice", false)]
    #[case::missing("ghost", false)]
    #[tokio::test]
    async fn test_find_provider(#[case] id: &str, #[case] found: bool) {
        let store = funded_store(0).await;

        let result = store.find_provider(id).await;

        if found {
            assert!(result.unwrap().is_provider());
        } else {
            assert_eq!(result.unwrap_err(), WalletError::provider_not_found(id));
        }
    }

    #[tokio::test]
    async fn test_adjust_balance_commits_both_legs() {
        let store = funded_store(1000).await;

        let mut scope = store.begin_atomic_update();
        let alice = store
            .adjust_balance(&mut scope, "alice", 400, Direction::Debit)
            .await
            .unwrap();
        let bob = store
            .adjust_balance(&mut scope, "bob", 400, Direction::Credit)
            .await
            .unwrap();
        assert_eq!((alice, bob), (600, 400));
        assert_eq!(scope.locked_accounts(), vec!["alice", "bob"]);

        let committed = scope.commit();

        assert_eq!(committed.len(), 2);
        assert_eq!(store.find_by_id("alice").await.unwrap().balance, 600);
        assert_eq!(store.find_by_id("bob").await.unwrap().balance, 400);
    }

    #[tokio::test]
    async fn test_adjust_balance_same_row_twice_uses_staged_balance() {
        let store = funded_store(1000).await;

        let mut scope = store.begin_atomic_update();
        store
            .adjust_balance(&mut scope, "alice", 700, Direction::Debit)
            .await
            .unwrap();
        let error = store
            .adjust_balance(&mut scope, "alice", 700, Direction::Debit)
            .await
            .unwrap_err();

        assert_eq!(error, WalletError::insufficient_funds("alice", 300, 700));
        assert_eq!(scope.staged_balance("alice"), Some(300));
    }

    #[tokio::test]
    async fn test_dropped_scope_rolls_back() {
        let store = funded_store(1000).await;

        {
            let mut scope = store.begin_atomic_update();
            store
                .adjust_balance(&mut scope, "bob", 500, Direction::Credit)
                .await
                .unwrap();
            let error = store
                .adjust_balance(&mut scope, "alice", 5000, Direction::Debit)
                .await
                .unwrap_err();
            assert_eq!(error.kind(), ErrorKind::InsufficientFunds);
        }

        assert_eq!(store.find_by_id("alice").await.unwrap().balance, 1000);
        assert_eq!(store.find_by_id("bob").await.unwrap().balance, 0);
    }

    #[tokio::test]
    async fn test_explicit_rollback_discards_staged_balance() {
        let store = funded_store(1000).await;

        let mut scope = store.begin_atomic_update();
        store
            .adjust_balance(&mut scope, "alice", 1000, Direction::Debit)
            .await
            .unwrap();
        scope.rollback();

        assert_eq!(store.find_by_id("alice").await.unwrap().balance, 1000);
    }

    #[rstest]
    #[case::zero(0)]
    #[case::negative(-10)]
    #[tokio::test]
    async fn test_adjust_balance_rejects_non_positive_amount(#[case] amount: i64) {
        let store = funded_store(1000).await;
        let mut scope = store.begin_atomic_update();

        let error = store
            .adjust_balance(&mut scope, "alice", amount, Direction::Credit)
            .await
            .unwrap_err();

        assert_eq!(error, WalletError::invalid_amount(amount));
        assert!(scope.locked_accounts().is_empty());
    }

    #[tokio::test]
    async fn test_adjust_balance_credit_overflow() {
        let store = AccountStore::new();
        store.seed_provider("bank", i64::MAX).unwrap();

        let mut scope = store.begin_atomic_update();
        let error = store
            .adjust_balance(&mut scope, "bank", 1, Direction::Credit)
            .await
            .unwrap_err();

        assert_eq!(error, WalletError::arithmetic_overflow("credit", "bank"));
    }

    #[tokio::test]
    async fn test_adjust_balance_missing_account() {
        let store = AccountStore::new();
        let mut scope = store.begin_atomic_update();

        let error = store
            .adjust_balance(&mut scope, "ghost", 1, Direction::Credit)
            .await
            .unwrap_err();

        assert_eq!(error, WalletError::account_not_found("ghost"));
    }

    #[tokio::test]
    async fn test_row_lock_blocks_readers_until_scope_ends() {
        let store = Arc::new(funded_store(1000).await);

        let mut scope = store.begin_atomic_update();
        store
            .adjust_balance(&mut scope, "alice", 250, Direction::Debit)
            .await
            .unwrap();

        let reader = {
            let store = Arc::clone(&store);
            tokio::spawn(async move { store.find_by_id("alice").await })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!reader.is_finished());

        scope.commit();

        let account = reader.await.unwrap().unwrap();
        assert_eq!(account.balance, 750);
    }

    #[tokio::test]
    async fn test_lock_timeout_reports_unavailable() {
        let store = AccountStore::with_lock_timeout(Some(Duration::from_millis(10)));
        store.create("alice", AccountKind::User).unwrap();

        let mut holder = store.begin_atomic_update();
        store
            .adjust_balance(&mut holder, "alice", 1, Direction::Credit)
            .await
            .unwrap();

        let mut waiter = store.begin_atomic_update();
        let error = store
            .adjust_balance(&mut waiter, "alice", 1, Direction::Credit)
            .await
            .unwrap_err();

        assert_eq!(error.kind(), ErrorKind::Unavailable);
        assert!(waiter.locked_accounts().is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_debits_never_overdraw() {
        let store = Arc::new(funded_store(1000).await);
        let mut handles = vec![];

        // 20 tasks each try to take 100 from a balance of 1000
        for _ in 0..20 {
            let store = Arc::clone(&store);
            handles.push(tokio::spawn(async move {
                let mut scope = store.begin_atomic_update();
                let result = store
                    .adjust_balance(&mut scope, "alice", 100, Direction::Debit)
                    .await;
                if result.is_ok() {
                    scope.commit();
                }
                result.is_ok()
            }));
        }

        let mut succeeded = 0;
        for handle in handles {
            if handle.await.unwrap() {
                succeeded += 1;
            }
        }

        assert_eq!(succeeded, 10);
        assert_eq!(store.find_by_id("alice").await.unwrap().balance, 0);
    }

    #[tokio::test]
    async fn test_all_accounts_sorted_by_id() {
        let store = funded_store(0).await;

        let ids: Vec<String> = store
            .all_accounts()
            .await
            .unwrap()
            .into_iter()
            .map(|a| a.id)
            .collect();

        assert_eq!(ids, vec!["alice", "bank", "bob"]);
    }
}
