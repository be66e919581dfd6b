//! Account-related types for the wallet engine
//!
//! This module defines the Account structure, the two account kinds and the
//! identifiers of the well-known provider accounts.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Account identifier
///
/// Identifiers are chosen by the caller at creation time and never change.
pub type AccountId = String;

/// Identifier of the default deposit-source provider account
pub const DEPOSIT_PROVIDER_ID: &str = "deposit-provider-master";

/// Identifier of the default withdraw-sink provider account
pub const WITHDRAW_PROVIDER_ID: &str = "withdraw-provider-master";

/// Longest identifier accepted by account creation
pub const MAX_ACCOUNT_ID_LEN: usize = 64;

/// Kind of account
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccountKind {
    /// Regular end-user wallet
    User,

    /// System account acting as counterparty for deposits and withdrawals
    Provider,
}

impl AccountKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AccountKind::User => "user",
            AccountKind::Provider => "provider",
        }
    }
}

impl fmt::Display for AccountKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle status of an account
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccountStatus {
    Active,
    Inactive,
    Suspended,
}

impl AccountStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AccountStatus::Active => "active",
            AccountStatus::Inactive => "inactive",
            AccountStatus::Suspended => "suspended",
        }
    }
}

impl fmt::Display for AccountStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Account state as held by the account store
///
/// `balance` is kept in the smallest currency unit and is never negative in
/// any committed state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    /// Unique, immutable identifier
    pub id: AccountId,

    /// User wallet or provider account
    pub kind: AccountKind,

    /// Balance in the smallest currency unit
    pub balance: i64,

    pub status: AccountStatus,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Account {
    /// Create a new active account with a zero balance
    pub fn new(id: impl Into<AccountId>, kind: AccountKind) -> Self {
        let now = Utc::now();
        Account {
            id: id.into(),
            kind,
            balance: 0,
            status: AccountStatus::Active,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_provider(&self) -> bool {
        self.kind == AccountKind::Provider
    }
}

/// Identifiers of the provider accounts used when a deposit or withdraw does
/// not name its own counterparty
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderIds {
    pub deposit: AccountId,
    pub withdraw: AccountId,
}

impl Default for ProviderIds {
    fn default() -> Self {
        Self {
            deposit: DEPOSIT_PROVIDER_ID.to_string(),
            withdraw: WITHDRAW_PROVIDER_ID.to_string(),
        }
    }
}
