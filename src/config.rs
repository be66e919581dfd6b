//! Configuration for the balance engine, the ledger client and script replay
//!
//! Every config has a `Default` and a sanitising `new` constructor that
//! replaces zero values with the defaults and logs a warning instead of
//! failing.

use crate::types::ProviderIds;
use std::time::Duration;
use tracing::warn;

/// History cache entries live this long after their last write
pub const DEFAULT_HISTORY_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// Default number of ledger pairs that may wait for dispatch
pub const DEFAULT_DISPATCH_CAPACITY: usize = 1024;

/// Default ledger service location
pub const DEFAULT_LEDGER_URL: &str = "http://localhost:8082";

/// Default ledger service request timeout
pub const DEFAULT_LEDGER_TIMEOUT: Duration = Duration::from_secs(30);

/// Opening balance of provider accounts seeded at startup
pub const DEFAULT_PROVIDER_OPENING_BALANCE: i64 = 1_000_000_000_000;

/// Settings for [`BalanceEngine`](crate::core::BalanceEngine)
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Time to live of a cached history list
    pub history_ttl: Duration,

    /// Counterparties used when a deposit or withdraw names none
    pub providers: ProviderIds,

    /// Capacity of the ledger dispatch queue
    pub dispatch_capacity: usize,

    /// Longest wait for a row lock before the operation fails `Unavailable`
    ///
    /// `None` waits indefinitely.
    pub lock_timeout: Option<Duration>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            history_ttl: DEFAULT_HISTORY_TTL,
            providers: ProviderIds::default(),
            dispatch_capacity: DEFAULT_DISPATCH_CAPACITY,
            lock_timeout: None,
        }
    }
}

impl EngineConfig {
    /// Create an EngineConfig with custom values
    pub fn new(
        history_ttl: Duration,
        providers: ProviderIds,
        dispatch_capacity: usize,
        lock_timeout: Option<Duration>,
    ) -> Self {
        let default = Self::default();

        let history_ttl = if history_ttl.is_zero() {
            warn!(
                default = ?default.history_ttl,
                "Invalid history_ttl (0), using default"
            );
            default.history_ttl
        } else {
            history_ttl
        };

        let dispatch_capacity = if dispatch_capacity == 0 {
            warn!(
                default = default.dispatch_capacity,
                "Invalid dispatch_capacity (0), using default"
            );
            default.dispatch_capacity
        } else {
            dispatch_capacity
        };

        let lock_timeout = match lock_timeout {
            Some(timeout) if timeout.is_zero() => {
                warn!("Invalid lock_timeout (0), waiting for row locks without a timeout");
                None
            }
            other => other,
        };

        Self {
            history_ttl,
            providers,
            dispatch_capacity,
            lock_timeout,
        }
    }
}

/// Settings for [`HttpLedgerClient`](crate::ledger::HttpLedgerClient)
#[derive(Debug, Clone)]
pub struct LedgerClientConfig {
    /// Base URL of the ledger service, without trailing slash
    pub base_url: String,
    pub timeout: Duration,
}

impl Default for LedgerClientConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_LEDGER_URL.to_string(),
            timeout: DEFAULT_LEDGER_TIMEOUT,
        }
    }
}

impl LedgerClientConfig {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Self {
        let default = Self::default();
        let base_url = base_url.into().trim_end_matches('/').to_string();

        let base_url = if base_url.is_empty() {
            warn!(default = %default.base_url, "Empty ledger base_url, using default");
            default.base_url
        } else {
            base_url
        };

        let timeout = if timeout.is_zero() {
            warn!(default = ?default.timeout, "Invalid ledger timeout (0), using default");
            default.timeout
        } else {
            timeout
        };

        Self { base_url, timeout }
    }
}

/// Configuration for batch replay of operation scripts
///
/// Controls how many operations are read per batch and how many of them may
/// run concurrently.
#[derive(Clone, Debug)]
pub struct ReplayConfig {
    /// Number of operations per batch
    pub batch_size: usize,
    /// Maximum number of operations in flight within a batch
    pub max_concurrent: usize,
}

impl Default for ReplayConfig {
    fn default() -> Self {
        Self {
            batch_size: 1000,
            max_concurrent: num_cpus::get(),
        }
    }
}

impl ReplayConfig {
    /// Create a new ReplayConfig with custom values
    pub fn new(batch_size: usize, max_concurrent: usize) -> Self {
        let default = Self::default();

        let batch_size = if batch_size == 0 {
            warn!(
                default = default.batch_size,
                "Invalid batch_size (0), using default"
            );
            default.batch_size
        } else {
            batch_size
        };

        let max_concurrent = if max_concurrent == 0 {
            warn!(
                default = default.max_concurrent,
                "Invalid max_concurrent (0), using default"
            );
            default.max_concurrent
        } else {
            max_concurrent
        };

        Self {
            batch_size,
            max_concurrent,
        }
    }
}
