//! CSV format handling for operation scripts and the account report
//!
//! This module centralizes all CSV format concerns, providing:
//! - CsvRecord structure for deserialization
//! - Conversion from CSV records to [`WalletOperation`]s
//! - Account report serialization
//!
//! All functions are pure (no I/O) for easy testing.
//!
//! # Script format
//!
//! ```text
//! op,account,counterparty,amount,kind
//! create,alice,,,user
//! deposit,alice,,5000,
//! withdraw,alice,withdraw-provider-master,3000,
//! transfer,alice,bob,100,
//! ```
//!
//! `counterparty` names the provider for deposit/withdraw (optional) and the
//! receiver for transfer (required). `kind` is only read by `create` and
//! defaults to `user`.

use crate::types::{Account, AccountId, AccountKind};
use serde::Deserialize;
use std::fmt;
use std::io::Write;

/// CSV record structure for deserialization
///
/// Every column but `op` and `account` may be empty. Which ones are required
/// depends on the operation.
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct CsvRecord {
    pub op: String,
    pub account: String,
    pub counterparty: Option<String>,
    pub amount: Option<String>,
    pub kind: Option<String>,
}

/// One line of an operation script, ready to run against the engine
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WalletOperation {
    Create {
        account: AccountId,
        kind: AccountKind,
    },
    Deposit {
        account: AccountId,
        amount: i64,
        provider: Option<AccountId>,
    },
    Withdraw {
        account: AccountId,
        amount: i64,
        provider: Option<AccountId>,
    },
    Transfer {
        from: AccountId,
        to: AccountId,
        amount: i64,
    },
}

impl WalletOperation {
    pub fn name(&self) -> &'static str {
        match self {
            WalletOperation::Create { .. } => "create",
            WalletOperation::Deposit { .. } => "deposit",
            WalletOperation::Withdraw { .. } => "withdraw",
            WalletOperation::Transfer { .. } => "transfer",
        }
    }

    /// The account the operation is issued for
    pub fn account(&self) -> &str {
        match self {
            WalletOperation::Create { account, .. }
            | WalletOperation::Deposit { account, .. }
            | WalletOperation::Withdraw { account, .. } => account,
            WalletOperation::Transfer { from, .. } => from,
        }
    }
}

impl fmt::Display for WalletOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WalletOperation::Create { account, kind } => write!(f, "create {} ({})", account, kind),
            WalletOperation::Deposit { account, amount, .. } => {
                write!(f, "deposit {} into {}", amount, account)
            }
            WalletOperation::Withdraw { account, amount, .. } => {
                write!(f, "withdraw {} from {}", amount, account)
            }
            WalletOperation::Transfer { from, to, amount } => {
                write!(f, "transfer {} from {} to {}", amount, from, to)
            }
        }
    }
}

fn non_empty(field: Option<String>) -> Option<String> {
    field.filter(|value| !value.trim().is_empty())
}

fn parse_amount(op: &str, account: &str, amount: Option<String>) -> Result<i64, String> {
    let amount = non_empty(amount)
        .ok_or_else(|| format!("{} for account '{}' requires an amount", op, account))?;
    amount
        .trim()
        .parse::<i64>()
        .map_err(|_| format!("Invalid amount '{}' for {} on account '{}'", amount, op, account))
}

fn parse_kind(kind: Option<String>) -> Result<AccountKind, String> {
    match non_empty(kind) {
        None => Ok(AccountKind::User),
        Some(kind) => match kind.trim().to_lowercase().as_str() {
            "user" => Ok(AccountKind::User),
            "provider" => Ok(AccountKind::Provider),
            _ => Err(format!("Invalid account kind: '{}'", kind)),
        },
    }
}

/// Convert a CsvRecord to a WalletOperation
///
/// Only the shape of the record is checked here. Business rules such as
/// positive amounts and distinct accounts are left to the engine, so a script
/// can exercise them.
///
/// # Returns
///
/// * `Ok(WalletOperation)` - Successfully converted record
/// * `Err(String)` - Error message describing the conversion failure
pub fn convert_csv_record(record: CsvRecord) -> Result<WalletOperation, String> {
    let op = record.op.trim().to_lowercase();
    let account = record.account;

    match op.as_str() {
        "create" => Ok(WalletOperation::Create {
            kind: parse_kind(record.kind)?,
            account,
        }),
        "deposit" => Ok(WalletOperation::Deposit {
            amount: parse_amount(&op, &account, record.amount)?,
            provider: non_empty(record.counterparty),
            account,
        }),
        "withdraw" => Ok(WalletOperation::Withdraw {
            amount: parse_amount(&op, &account, record.amount)?,
            provider: non_empty(record.counterparty),
            account,
        }),
        "transfer" => {
            let to = non_empty(record.counterparty)
                .ok_or_else(|| format!("transfer from '{}' requires a counterparty", account))?;
            Ok(WalletOperation::Transfer {
                amount: parse_amount(&op, &account, record.amount)?,
                from: account,
                to,
            })
        }
        _ => Err(format!(
            "Invalid operation: '{}' for account '{}'",
            record.op, account
        )),
    }
}

/// Write account states to CSV format
///
/// Writes accounts with columns: account, kind, balance, status.
/// Accounts are sorted by identifier for deterministic output.
///
/// # Returns
///
/// * `Ok(())` if writing succeeded
/// * `Err(String)` if a write error occurred
pub fn write_accounts_csv(accounts: &[Account], output: &mut dyn Write) -> Result<(), String> {
    use csv::Writer;

    let mut writer = Writer::from_writer(output);

    writer
        .write_record(["account", "kind", "balance", "status"])
        .map_err(|e| format!("Failed to write CSV header: {}", e))?;

    let mut sorted_accounts: Vec<&Account> = accounts.iter().collect();
    sorted_accounts.sort_by(|a, b| a.id.cmp(&b.id));

    for account in sorted_accounts {
        let balance = account.balance.to_string();
        writer
            .write_record([
                account.id.as_str(),
                account.kind.as_str(),
                balance.as_str(),
                account.status.as_str(),
            ])
            .map_err(|e| format!("Failed to write account record: {}", e))?;
    }

    writer
        .flush()
        .map_err(|e| format!("Failed to flush output: {}", e))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn record(
        op: &str,
        account: &str,
        counterparty: Option<&str>,
        amount: Option<&str>,
        kind: Option<&str>,
    ) -> CsvRecord {
        CsvRecord {
            op: op.to_string(),
            account: account.to_string(),
            counterparty: counterparty.map(str::to_string),
            amount: amount.map(str::to_string),
            kind: kind.map(str::to_string),
        }
    }

    #[rstest]
    #[case::create_default_kind(
        record("create", "alice", None, None, None),
        WalletOperation::Create { account: "alice".into(), kind: AccountKind::User }
    )]
    #[case::create_provider(
        record("CREATE", "bank", None, None, Some("Provider")),
        WalletOperation::Create { account: "bank".into(), kind: AccountKind::Provider }
    )]
    #[case::deposit_default_provider(
        record("deposit", "alice", Some(""), Some("5000"), None),
        WalletOperation::Deposit { account: "alice".into(), amount: 5000, provider: None }
    )]
    #[case::withdraw_explicit_provider(
        record("withdraw", "alice", Some("bank"), Some(" 30 "), None),
        WalletOperation::Withdraw { account: "alice".into(), amount: 30, provider: Some("bank".into()) }
    )]
    #[case::transfer(
        record("transfer", "alice", Some("bob"), Some("100"), None),
        WalletOperation::Transfer { from: "alice".into(), to: "bob".into(), amount: 100 }
    )]
    #[case::negative_amount_is_left_to_the_engine(
        record("deposit", "alice", None, Some("-5"), None),
        WalletOperation::Deposit { account: "alice".into(), amount: -5, provider: None }
    )]
    fn test_convert_csv_record_valid(#[case] input: CsvRecord, #[case] expected: WalletOperation) {
        assert_eq!(convert_csv_record(input).unwrap(), expected);
    }

    #[rstest]
    #[case::invalid_op(record("refund", "alice", None, Some("1"), None), "Invalid operation")]
    #[case::deposit_missing_amount(record("deposit", "alice", None, None, None), "requires an amount")]
    #[case::withdraw_blank_amount(record("withdraw", "alice", None, Some("  "), None), "requires an amount")]
    #[case::fractional_amount(record("deposit", "alice", None, Some("10.5"), None), "Invalid amount")]
    #[case::transfer_missing_counterparty(record("transfer", "alice", None, Some("1"), None), "requires a counterparty")]
    #[case::invalid_kind(record("create", "alice", None, None, Some("admin")), "Invalid account kind")]
    fn test_convert_csv_record_errors(#[case] input: CsvRecord, #[case] expected_error: &str) {
        let err = convert_csv_record(input).unwrap_err();
        assert!(err.contains(expected_error), "unexpected error: {}", err);
    }

    #[test]
    fn test_operation_account_and_display() {
        let op = WalletOperation::Transfer {
            from: "alice".into(),
            to: "bob".into(),
            amount: 7,
        };
        assert_eq!(op.name(), "transfer");
        assert_eq!(op.account(), "alice");
        assert_eq!(op.to_string(), "transfer 7 from alice to bob");
    }

    #[rstest]
    #[case::empty_accounts(vec![], "account,kind,balance,status\n")]
    #[case::sorted_by_id(
        vec![
            Account::new("carol", AccountKind::User),
            Account::new("alice", AccountKind::User),
            Account::new("bank", AccountKind::Provider),
        ],
        "account,kind,balance,status\nalice,user,0,active\nbank,provider,0,active\ncarol,user,0,active\n"
    )]
    fn test_write_accounts_csv(#[case] accounts: Vec<Account>, #[case] expected_output: &str) {
        let mut output = Vec::new();
        write_accounts_csv(&accounts, &mut output).unwrap();
        assert_eq!(String::from_utf8(output).unwrap(), expected_output);
    }

    #[test]
    fn test_write_accounts_csv_balance() {
        let mut account = Account::new("alice", AccountKind::User);
        account.balance = 2000;

        let mut output = Vec::new();
        write_accounts_csv(&[account], &mut output).unwrap();

        assert_eq!(
            String::from_utf8(output).unwrap(),
            "account,kind,balance,status\nalice,user,2000,active\n"
        );
    }
}
