//! Replay of operation scripts through the balance engine
//!
//! # Architecture
//!
//! ```text
//! replay_file
//!     ├── AsyncReader (batch CSV reading)
//!     ├── buffer_unordered(max_concurrent) per batch
//!     └── BalanceEngine (row-locked mutations)
//! ```
//!
//! Batches run one after another. Within a batch up to `max_concurrent`
//! operations are in flight at once, so operations of one batch may commit in
//! any order. A `max_concurrent` of 1 replays the script strictly in order.
//!
//! Rejected operations are logged and counted and never stop the replay.

use crate::config::ReplayConfig;
use crate::core::BalanceEngine;
use crate::io::{write_accounts_csv, AsyncReader, WalletOperation};
use crate::types::WalletError;
use anyhow::{anyhow, Context};
use futures::io::AsyncRead;
use futures::stream::{self, StreamExt};
use std::io::Write;
use std::path::Path;
use tokio_util::compat::TokioAsyncReadCompatExt;
use tracing::{info, warn};

/// Outcome counts of a replay
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReplaySummary {
    /// Operations the engine accepted
    pub applied: usize,
    /// Operations the engine rejected
    pub rejected: usize,
    /// Rows that could not be parsed into an operation
    pub skipped: usize,
}

/// Run a single operation against the engine
pub async fn apply_operation(
    engine: &BalanceEngine,
    operation: &WalletOperation,
) -> Result<(), WalletError> {
    match operation {
        WalletOperation::Create { account, kind } => engine.create(account, *kind).map(|_| ()),
        WalletOperation::Deposit {
            account,
            amount,
            provider,
        } => engine
            .deposit(account, *amount, provider.as_deref())
            .await
            .map(|_| ()),
        WalletOperation::Withdraw {
            account,
            amount,
            provider,
        } => engine
            .withdraw(account, *amount, provider.as_deref())
            .await
            .map(|_| ()),
        WalletOperation::Transfer { from, to, amount } => {
            engine.transfer(from, to, *amount).await.map(|_| ())
        }
    }
}

/// Replay every operation read from `reader`
///
/// Returns once every operation has been applied or rejected and the ledger
/// queue has been drained.
pub async fn replay<R>(engine: &BalanceEngine, reader: R, config: &ReplayConfig) -> ReplaySummary
where
    R: AsyncRead + Unpin + Send + 'static,
{
    let mut reader = AsyncReader::new(reader);
    let mut summary = ReplaySummary::default();

    loop {
        let batch = reader.read_batch(config.batch_size).await;
        if batch.is_empty() {
            break;
        }

        let outcomes: Vec<bool> = stream::iter(batch)
            .map(|operation| async move {
                match apply_operation(engine, &operation).await {
                    Ok(()) => true,
                    Err(e) => {
                        warn!(
                            operation = operation.name(),
                            account = %operation.account(),
                            kind = ?e.kind(),
                            error = %e,
                            "operation rejected"
                        );
                        false
                    }
                }
            })
            .buffer_unordered(config.max_concurrent)
            .collect()
            .await;

        let applied = outcomes.iter().filter(|applied| **applied).count();
        summary.applied += applied;
        summary.rejected += outcomes.len() - applied;
    }

    summary.skipped = reader.skipped();
    engine.flush_ledger().await;

    info!(
        applied = summary.applied,
        rejected = summary.rejected,
        skipped = summary.skipped,
        "replay finished"
    );
    summary
}

/// Replay the script stored at `path`
pub async fn replay_file(
    engine: &BalanceEngine,
    path: &Path,
    config: &ReplayConfig,
) -> anyhow::Result<ReplaySummary> {
    let file = tokio::fs::File::open(path)
        .await
        .with_context(|| format!("failed to open operation script {}", path.display()))?;

    Ok(replay(engine, file.compat(), config).await)
}

/// Write the committed state of every account as CSV
pub async fn write_report(engine: &BalanceEngine, output: &mut dyn Write) -> anyhow::Result<()> {
    let accounts = engine
        .store()
        .all_accounts()
        .await
        .context("failed to read accounts")?;
    write_accounts_csv(&accounts, output).map_err(|e| anyhow!(e))
}
