//! Wallet Balance Engine Library
//! # Overview
//!
//! This library maintains per-account balances and records every balance
//! change as a mirrored pair of ledger entries. Recent history is served
//! through a cache-aside history cache.
//!
//! # Architecture
//!
//! The system is organized into several key components:
//!
//! - [`types`] - Core data types (Account, LedgerEntry, WalletError, etc.)
//! - [`core`] - Business logic components:
//!   - [`core::account_store`] - Accounts, row locks and atomic scopes
//!   - [`core::engine`] - Deposit, withdraw, transfer and history reads
//!   - [`core::dispatch`] - Background hand-off of ledger pairs
//! - [`cache`] - History cache backends
//! - [`ledger`] - Ledger service clients
//! - [`config`] - Engine, ledger client and replay settings
//! - [`cli`] - CLI arguments parsing
//! - [`io`] - CSV operation scripts and account report
//! - [`replay`] - Script replay driver used by the binary
//!
//! # Operations
//!
//! - **Deposit**: Move funds from a deposit provider into an account
//! - **Withdraw**: Move funds from an account into a withdraw provider
//! - **Transfer**: Move funds between two accounts
//!
//! Each operation debits one account and credits another inside a single
//! atomic scope. No committed balance is ever negative.

// Module declarations
pub mod cache;
pub mod cli;
pub mod config;
pub mod core;
pub mod io;
pub mod ledger;
pub mod replay;
pub mod telemetry;
pub mod types;

pub use crate::core::{AccountStore, BalanceEngine, HistoryCache, LedgerClient};
pub use config::{EngineConfig, LedgerClientConfig, ReplayConfig};
pub use io::write_accounts_csv;
pub use types::{
    Account, AccountHistory, AccountId, AccountKind, AccountStatus, Direction, EntryCategory,
    EntryStatus, ErrorKind, LedgerEntry, LedgerPair, WalletError,
};
