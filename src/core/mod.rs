//! Core business logic module
//!
//! This module contains the balance mutation components:
//! - `traits` - Seams for the ledger service and the history cache
//! - `account_store` - Account table, row locks and atomic scopes
//! - `dispatch` - Background queue feeding the ledger service
//! - `engine` - Deposit, withdraw, transfer and history reads

pub mod account_store;
pub mod dispatch;
pub mod engine;
pub mod traits;

pub use account_store::{validate_account_id, AccountStore, AtomicScope};
pub use dispatch::LedgerDispatcher;
pub use engine::{BalanceEngine, MutationStage};
pub use traits::{history_key, HistoryCache, LedgerClient};
