use crate::config::{
    EngineConfig, LedgerClientConfig, ReplayConfig, DEFAULT_DISPATCH_CAPACITY,
    DEFAULT_HISTORY_TTL, DEFAULT_LEDGER_TIMEOUT, DEFAULT_PROVIDER_OPENING_BALANCE,
};
use crate::telemetry::LogFormat;
use crate::types::ProviderIds;
use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;

/// Replay a wallet operation script and report the resulting balances
#[derive(Parser, Debug)]
#[command(name = "wallet-engine")]
#[command(about = "Replay wallet operations and report account balances", long_about = None)]
pub struct CliArgs {
    /// Operation script to replay
    #[arg(value_name = "INPUT", help = "Path to the CSV operation script")]
    pub input_file: PathBuf,

    /// Ledger service base URL
    #[arg(
        long = "ledger-url",
        env = "LEDGER_URL",
        value_name = "URL",
        help = "Ledger service base URL (default: in-process ledger)"
    )]
    pub ledger_url: Option<String>,

    #[arg(
        long = "ledger-timeout-secs",
        value_name = "SECS",
        help = "Ledger service request timeout in seconds (default: 30)"
    )]
    pub ledger_timeout_secs: Option<u64>,

    /// Redis URL of the shared history cache
    #[arg(
        long = "redis-url",
        env = "REDIS_URL",
        value_name = "URL",
        help = "Redis history cache URL, needs the `redis` feature (default: in-process cache)"
    )]
    pub redis_url: Option<String>,

    #[arg(
        long = "cache-ttl-secs",
        value_name = "SECS",
        help = "History cache time to live in seconds (default: 86400)"
    )]
    pub cache_ttl_secs: Option<u64>,

    #[arg(
        long = "dispatch-capacity",
        value_name = "COUNT",
        help = "Ledger pairs that may wait for dispatch before new ones are dropped (default: 1024)"
    )]
    pub dispatch_capacity: Option<usize>,

    #[arg(
        long = "lock-timeout-ms",
        value_name = "MILLIS",
        help = "Longest wait for an account lock before the operation fails (default: no limit)"
    )]
    pub lock_timeout_ms: Option<u64>,

    #[arg(
        long = "provider-opening-balance",
        value_name = "AMOUNT",
        default_value_t = DEFAULT_PROVIDER_OPENING_BALANCE,
        help = "Opening balance of newly seeded provider accounts"
    )]
    pub provider_opening_balance: i64,

    /// Number of operations per batch
    #[arg(
        long = "batch-size",
        value_name = "SIZE",
        help = "Number of operations read per batch (default: 1000)"
    )]
    pub batch_size: Option<usize>,

    /// Maximum number of operations in flight within a batch
    #[arg(
        long = "max-concurrent",
        value_name = "COUNT",
        help = "Operations applied concurrently within a batch, 1 for strict script order (default: CPU cores)"
    )]
    pub max_concurrent: Option<usize>,

    #[arg(long = "log-json", help = "Emit logs as JSON lines")]
    pub log_json: bool,
}

impl CliArgs {
    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig::new(
            self.cache_ttl_secs
                .map(Duration::from_secs)
                .unwrap_or(DEFAULT_HISTORY_TTL),
            ProviderIds::default(),
            self.dispatch_capacity.unwrap_or(DEFAULT_DISPATCH_CAPACITY),
            self.lock_timeout_ms.map(Duration::from_millis),
        )
    }

    /// Ledger client settings, or `None` for the in-process ledger
    pub fn ledger_config(&self) -> Option<LedgerClientConfig> {
        let timeout = self
            .ledger_timeout_secs
            .map(Duration::from_secs)
            .unwrap_or(DEFAULT_LEDGER_TIMEOUT);
        self.ledger_url
            .as_deref()
            .map(|url| LedgerClientConfig::new(url, timeout))
    }

    /// Create a ReplayConfig from CLI arguments
    ///
    /// Missing values fall back to the defaults. Zero values are replaced
    /// with the defaults and a warning is logged.
    pub fn replay_config(&self) -> ReplayConfig {
        if self.batch_size.is_some() || self.max_concurrent.is_some() {
            let default = ReplayConfig::default();
            ReplayConfig::new(
                self.batch_size.unwrap_or(default.batch_size),
                self.max_concurrent.unwrap_or(default.max_concurrent),
            )
        } else {
            ReplayConfig::default()
        }
    }

    pub fn log_format(&self) -> LogFormat {
        LogFormat::from_json_flag(self.log_json)
    }
}
