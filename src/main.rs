//! Wallet Engine CLI
//!
//! Replays a CSV operation script through the balance engine and prints the
//! resulting account balances.
//!
//! # Usage
//!
//! ```bash
//! cargo run -- operations.csv > accounts.csv
//! cargo run -- --max-concurrent 1 operations.csv > accounts.csv
//! cargo run -- --ledger-url http://localhost:8082 operations.csv > accounts.csv
//! cargo run --features redis -- --redis-url redis://localhost:6379 operations.csv
//! ```
//!
//! Provider accounts are seeded before the script runs. Logs go to stderr,
//! the account report goes to stdout.
//!
//! # Exit Codes
//!
//! - 0: Success, even if some operations were rejected
//! - 1: Error (missing arguments, unreadable script, unreachable cache, etc.)

use anyhow::Context;
use std::process;
use std::sync::Arc;
use tracing::{error, info};
use wallet_engine::cache::InMemoryHistoryCache;
use wallet_engine::cli::{self, CliArgs};
use wallet_engine::ledger::{HttpLedgerClient, InMemoryLedger};
use wallet_engine::{replay, telemetry, BalanceEngine, HistoryCache, LedgerClient};

fn main() {
    let args = cli::parse_args();
    telemetry::init(args.log_format());

    if let Err(e) = run(args) {
        error!(error = ?e, "wallet engine failed");
        eprintln!("Error: {:#}", e);
        process::exit(1);
    }
}

fn run(args: CliArgs) -> anyhow::Result<()> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to create tokio runtime")?;

    runtime.block_on(replay_script(args))
}

async fn replay_script(args: CliArgs) -> anyhow::Result<()> {
    let ledger: Arc<dyn LedgerClient> = match args.ledger_config() {
        Some(config) => {
            info!(url = %config.base_url, "using ledger service");
            Arc::new(HttpLedgerClient::new(&config)?)
        }
        None => {
            info!("using in-process ledger");
            Arc::new(InMemoryLedger::new())
        }
    };
    let cache = build_cache(args.redis_url.as_deref()).await?;

    let engine = BalanceEngine::new(ledger, cache, args.engine_config());
    engine
        .bootstrap_providers(args.provider_opening_balance)
        .context("failed to seed provider accounts")?;

    let summary = replay::replay_file(&engine, &args.input_file, &args.replay_config()).await?;

    let mut output = std::io::stdout().lock();
    replay::write_report(&engine, &mut output).await?;

    engine.shutdown().await;
    info!(
        applied = summary.applied,
        rejected = summary.rejected,
        skipped = summary.skipped,
        dropped_ledger_pairs = engine.dropped_ledger_pairs(),
        "done"
    );
    Ok(())
}

#[cfg(feature = "redis")]
async fn build_cache(redis_url: Option<&str>) -> anyhow::Result<Arc<dyn HistoryCache>> {
    use wallet_engine::cache::RedisHistoryCache;

    match redis_url {
        Some(url) => {
            let cache = RedisHistoryCache::connect(url)
                .await
                .context("failed to connect to redis")?;
            Ok(Arc::new(cache))
        }
        None => Ok(Arc::new(InMemoryHistoryCache::new())),
    }
}

#[cfg(not(feature = "redis"))]
async fn build_cache(redis_url: Option<&str>) -> anyhow::Result<Arc<dyn HistoryCache>> {
    if redis_url.is_some() {
        tracing::warn!("built without the `redis` feature, using in-process history cache");
    }
    Ok(Arc::new(InMemoryHistoryCache::new()))
}
