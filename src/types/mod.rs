//! Types module
//!
//! Contains core data structures used throughout the application.
//! This module organizes types into logical submodules:
//! - `account`: Account-related types and provider identifiers
//! - `entry`: Ledger entries and mirrored entry pairs
//! - `error`: Error types for the wallet engine

pub mod account;
pub mod entry;
pub mod error;

pub use account::{
    Account, AccountId, AccountKind, AccountStatus, ProviderIds, DEPOSIT_PROVIDER_ID,
    MAX_ACCOUNT_ID_LEN, WITHDRAW_PROVIDER_ID,
};
pub use entry::{AccountHistory, Direction, EntryCategory, EntryStatus, LedgerEntry, LedgerPair};
pub use error::{ErrorKind, WalletError};
