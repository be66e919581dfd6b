//! Ledger entry types for the wallet engine
//!
//! Every balance mutation is described by a [`LedgerPair`]: one debit entry and
//! one credit entry with the same amount and mirrored subject/counterparty
//! accounts. The pair is built in one place so the mirroring cannot drift.

use super::account::{Account, AccountId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Business category of a balance mutation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryCategory {
    /// Funds entering a user wallet from a deposit provider
    Deposit,

    /// Funds leaving a user wallet towards a withdraw provider
    Withdraw,

    /// Funds moving between two wallets
    Transfer,
}

impl EntryCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntryCategory::Deposit => "deposit",
            EntryCategory::Withdraw => "withdraw",
            EntryCategory::Transfer => "transfer",
        }
    }
}

impl fmt::Display for EntryCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Side of a ledger entry from the subject account's perspective
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Debit,
    Credit,
}

impl Direction {
    pub fn opposite(&self) -> Direction {
        match self {
            Direction::Debit => Direction::Credit,
            Direction::Credit => Direction::Debit,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Debit => "debit",
            Direction::Credit => "credit",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryStatus {
    Pending,
    Completed,
    Failed,
    Cancelled,
}

/// One half of a double-entry record
///
/// Entries are immutable once created. The field names double as the JSON
/// payload understood by the ledger service and the history cache.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub id: Uuid,

    /// Account whose balance this entry describes
    pub subject_account_id: AccountId,

    /// Account on the other side of the mutation
    pub counterparty_account_id: AccountId,

    pub category: EntryCategory,
    pub direction: Direction,

    /// Positive amount in the smallest currency unit
    pub amount: i64,

    pub status: EntryStatus,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Debit and credit entries describing one balance mutation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerPair {
    pub debit: LedgerEntry,
    pub credit: LedgerEntry,
}

impl LedgerPair {
    /// Build a completed, mirrored pair moving `amount` from `debit_account`
    /// to `credit_account`
    pub fn new(
        category: EntryCategory,
        debit_account: &str,
        credit_account: &str,
        amount: i64,
    ) -> Self {
        let now = Utc::now();
        let entry = |subject: &str, counterparty: &str, direction: Direction| LedgerEntry {
            id: Uuid::now_v7(),
            subject_account_id: subject.to_string(),
            counterparty_account_id: counterparty.to_string(),
            category,
            direction,
            amount,
            status: EntryStatus::Completed,
            created_at: now,
            updated_at: now,
        };

        LedgerPair {
            debit: entry(debit_account, credit_account, Direction::Debit),
            credit: entry(credit_account, debit_account, Direction::Credit),
        }
    }

    pub fn category(&self) -> EntryCategory {
        self.debit.category
    }

    pub fn amount(&self) -> i64 {
        self.debit.amount
    }

    /// Accounts touched by this pair, debit side first
    pub fn accounts(&self) -> [&str; 2] {
        [
            self.debit.subject_account_id.as_str(),
            self.credit.subject_account_id.as_str(),
        ]
    }

    /// The `(account, direction)` legs in ascending account order
    ///
    /// Applying legs in this order gives every operation the same row-lock
    /// acquisition order.
    pub fn legs_in_lock_order(&self) -> [(&str, Direction); 2] {
        let debit = (self.debit.subject_account_id.as_str(), Direction::Debit);
        let credit = (self.credit.subject_account_id.as_str(), Direction::Credit);
        if credit.0 < debit.0 {
            [credit, debit]
        } else {
            [debit, credit]
        }
    }
}

/// An account together with its ledger history, most recent entry first
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountHistory {
    pub account: Account,
    pub entries: Vec<LedgerEntry>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn test_pair_entries_are_mirrored() {
        let pair = LedgerPair::new(EntryCategory::Transfer, "alice", "bob", 250);

        assert_eq!(pair.debit.direction, Direction::Debit);
        assert_eq!(pair.credit.direction, Direction::Credit);
        assert_eq!(pair.debit.amount, pair.credit.amount);
        assert_eq!(pair.debit.subject_account_id, pair.credit.counterparty_account_id);
        assert_eq!(pair.credit.subject_account_id, pair.debit.counterparty_account_id);
        assert_eq!(pair.debit.status, EntryStatus::Completed);
        assert_ne!(pair.debit.id, pair.credit.id);
        assert_eq!(pair.accounts(), ["alice", "bob"]);
    }

    #[rstest]
    #[case::debit_first("alice", "bob", ["alice", "bob"])]
    #[case::credit_first("zed", "bob", ["bob", "zed"])]
    fn test_legs_in_lock_order(
        #[case] debit: &str,
        #[case] credit: &str,
        #[case] expected: [&str; 2],
    ) {
        let pair = LedgerPair::new(EntryCategory::Transfer, debit, credit, 1);
        let legs = pair.legs_in_lock_order();
        assert_eq!([legs[0].0, legs[1].0], expected);
        assert_eq!(legs[0].1.opposite(), legs[1].1);
    }

    #[test]
    fn test_entry_json_field_names() {
        let pair = LedgerPair::new(EntryCategory::Deposit, "provider", "alice", 5000);
        let value = serde_json::to_value(&pair.credit).unwrap();

        assert_eq!(value["subject_account_id"], "alice");
        assert_eq!(value["counterparty_account_id"], "provider");
        assert_eq!(value["category"], "deposit");
        assert_eq!(value["direction"], "credit");
        assert_eq!(value["amount"], 5000);
        assert_eq!(value["status"], "completed");
    }
}
