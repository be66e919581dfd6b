//! Error types for the wallet engine
//!
//! This module defines all error types that can occur while creating accounts,
//! mutating balances and reading history.
//!
//! # Error Categories
//!
//! - **Business rule errors**: invalid input, unknown accounts, insufficient funds,
//!   duplicate accounts. Returned to the caller, never retried internally.
//! - **Infrastructure errors**: ledger service, history cache or lock wait failures,
//!   all reported as `Unavailable`.

use thiserror::Error;

/// Coarse error classification used by callers to build a response
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    InvalidInput,
    NotFound,
    InsufficientFunds,
    AlreadyExists,
    Unavailable,
}

/// Main error type for the wallet engine
///
/// Each variant carries the context needed to explain the failure.
/// Use [`WalletError::kind`] to map a variant onto the coarse taxonomy.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WalletError {
    /// Malformed or missing input (bad identifier, same-account transfer, ...)
    #[error("Invalid input: {message}")]
    InvalidInput {
        /// Description of what was wrong
        message: String,
    },

    /// Amount was zero or negative
    #[error("Invalid amount {amount}: amount must be a positive integer")]
    InvalidAmount {
        /// The rejected amount
        amount: i64,
    },

    /// No account exists with the given identifier
    #[error("Account '{account}' not found")]
    AccountNotFound {
        /// The identifier that was looked up
        account: String,
    },

    /// No provider account exists with the given identifier
    #[error("Provider account '{provider}' not found")]
    ProviderNotFound {
        /// The provider identifier that was looked up
        provider: String,
    },

    /// Debit would take the balance below zero
    ///
    /// The account state remains unchanged.
    #[error("Insufficient funds for account '{account}': available {available}, requested {requested}")]
    InsufficientFunds {
        /// Account that was debited
        account: String,
        /// Balance at the time of the check
        available: i64,
        /// Requested debit
        requested: i64,
    },

    /// Account creation with an identifier that is already taken
    #[error("Account '{account}' already exists")]
    AlreadyExists {
        /// The duplicate identifier
        account: String,
    },

    /// Arithmetic overflow would occur
    ///
    /// The mutation is rejected to maintain account integrity.
    #[error("Arithmetic overflow in {operation} for account '{account}'")]
    ArithmeticOverflow {
        /// Operation that would overflow
        operation: String,
        /// Account being credited
        account: String,
    },

    /// Storage, cache or ledger service failure not caused by business rules
    #[error("Service unavailable: {message}")]
    Unavailable {
        /// Description of the infrastructure failure
        message: String,
    },
}

impl WalletError {
    /// Classify this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            WalletError::InvalidInput { .. }
            | WalletError::InvalidAmount { .. }
            | WalletError::ArithmeticOverflow { .. } => ErrorKind::InvalidInput,
            WalletError::AccountNotFound { .. } | WalletError::ProviderNotFound { .. } => {
                ErrorKind::NotFound
            }
            WalletError::InsufficientFunds { .. } => ErrorKind::InsufficientFunds,
            WalletError::AlreadyExists { .. } => ErrorKind::AlreadyExists,
            WalletError::Unavailable { .. } => ErrorKind::Unavailable,
        }
    }

    /// Whether this error comes from a business rule rather than infrastructure
    pub fn is_business_rule(&self) -> bool {
        self.kind() != ErrorKind::Unavailable
    }
}

impl From<serde_json::Error> for WalletError {
    fn from(error: serde_json::Error) -> Self {
        WalletError::Unavailable {
            message: format!("malformed payload: {}", error),
        }
    }
}

impl From<reqwest::Error> for WalletError {
    fn from(error: reqwest::Error) -> Self {
        WalletError::Unavailable {
            message: format!("ledger service request failed: {}", error),
        }
    }
}

#[cfg(feature = "redis")]
impl From<redis::RedisError> for WalletError {
    fn from(error: redis::RedisError) -> Self {
        WalletError::Unavailable {
            message: format!("redis: {}", error),
        }
    }
}

// Helper functions for creating common errors

impl WalletError {
    /// Create an InvalidInput error
    pub fn invalid_input(message: impl Into<String>) -> Self {
        WalletError::InvalidInput {
            message: message.into(),
        }
    }

    /// Create an InvalidAmount error
    pub fn invalid_amount(amount: i64) -> Self {
        WalletError::InvalidAmount { amount }
    }

    /// Create an AccountNotFound error
    pub fn account_not_found(account: &str) -> Self {
        WalletError::AccountNotFound {
            account: account.to_string(),
        }
    }

    /// Create a ProviderNotFound error
    pub fn provider_not_found(provider: &str) -> Self {
        WalletError::ProviderNotFound {
            provider: provider.to_string(),
        }
    }

    /// Create an InsufficientFunds error
    pub fn insufficient_funds(account: &str, available: i64, requested: i64) -> Self {
        WalletError::InsufficientFunds {
            account: account.to_string(),
            available,
            requested,
        }
    }

    /// Create an AlreadyExists error
    pub fn already_exists(account: &str) -> Self {
        WalletError::AlreadyExists {
            account: account.to_string(),
        }
    }

    /// Create an ArithmeticOverflow error
    pub fn arithmetic_overflow(operation: &str, account: &str) -> Self {
        WalletError::ArithmeticOverflow {
            operation: operation.to_string(),
            account: account.to_string(),
        }
    }

    /// Create an Unavailable error
    pub fn unavailable(message: impl Into<String>) -> Self {
        WalletError::Unavailable {
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case::invalid_input(
        WalletError::InvalidInput { message: "cannot transfer to the same account".to_string() },
        "Invalid input: cannot transfer to the same account"
    )]
    #[case::invalid_amount(
        WalletError::InvalidAmount { amount: -5 },
        "Invalid amount -5: amount must be a positive integer"
    )]
    #[case::account_not_found(
        WalletError::AccountNotFound { account: "alice".to_string() },
        "Account 'alice' not found"
    )]
    #[case::provider_not_found(
        WalletError::ProviderNotFound { provider: "bank".to_string() },
        "Provider account 'bank' not found"
    )]
    #[case::insufficient_funds(
        WalletError::InsufficientFunds { account: "alice".to_string(), available: 2000, requested: 3000 },
        "Insufficient funds for account 'alice': available 2000, requested 3000"
    )]
    #[case::already_exists(
        WalletError::AlreadyExists { account: "alice".to_string() },
        "Account 'alice' already exists"
    )]
    #[case::arithmetic_overflow(
        WalletError::ArithmeticOverflow { operation: "credit".to_string(), account: "alice".to_string() },
        "Arithmetic overflow in credit for account 'alice'"
    )]
    #[case::unavailable(
        WalletError::Unavailable { message: "ledger down".to_string() },
        "Service unavailable: ledger down"
    )]
    fn test_error_display(#[case] error: WalletError, #[case] expected: &str) {
        assert_eq!(error.to_string(), expected);
    }

    #[rstest]
    #[case(WalletError::invalid_input("x"), ErrorKind::InvalidInput)]
    #[case(WalletError::invalid_amount(0), ErrorKind::InvalidInput)]
    #[case(WalletError::arithmetic_overflow("credit", "a"), ErrorKind::InvalidInput)]
    #[case(WalletError::account_not_found("a"), ErrorKind::NotFound)]
    #[case(WalletError::provider_not_found("p"), ErrorKind::NotFound)]
    #[case(WalletError::insufficient_funds("a", 1, 2), ErrorKind::InsufficientFunds)]
    #[case(WalletError::already_exists("a"), ErrorKind::AlreadyExists)]
    #[case(WalletError::unavailable("down"), ErrorKind::Unavailable)]
    fn test_error_kind(#[case] error: WalletError, #[case] expected: ErrorKind) {
        assert_eq!(error.kind(), expected);
        assert_eq!(error.is_business_rule(), expected != ErrorKind::Unavailable);
    }

    #[rstest]
    #[case::insufficient_funds(
        WalletError::insufficient_funds("alice", 500, 1000),
        WalletError::InsufficientFunds { account: "alice".to_string(), available: 500, requested: 1000 }
    )]
    #[case::already_exists(
        WalletError::already_exists("alice"),
        WalletError::AlreadyExists { account: "alice".to_string() }
    )]
    fn test_helper_functions(#[case] result: WalletError, #[case] expected: WalletError) {
        assert_eq!(result, expected);
    }

    #[test]
    fn test_json_error_conversion() {
        let json_error = serde_json::from_str::<Vec<i64>>("not json").unwrap_err();
        let error: WalletError = json_error.into();
        assert_eq!(error.kind(), ErrorKind::Unavailable);
        assert!(error.to_string().starts_with("Service unavailable: malformed payload"));
    }
}
