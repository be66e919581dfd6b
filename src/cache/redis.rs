//! Shared history cache in Redis
//!
//! Each history is stored as a JSON list under `history:{account}` with a
//! server-side expiry, so every engine process sharing the Redis instance
//! sees the same cached values and the same invalidations.

use crate::core::{history_key, HistoryCache};
use crate::types::{LedgerEntry, WalletError};
use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use std::time::Duration;
use tracing::info;

/// [`HistoryCache`] backed by a Redis server
///
/// Cloning shares the underlying multiplexed connection.
#[derive(Clone)]
pub struct RedisHistoryCache {
    connection: MultiplexedConnection,
}

impl RedisHistoryCache {
    /// Connect to the Redis server at `redis_url`
    pub async fn connect(redis_url: &str) -> Result<Self, WalletError> {
        let client = redis::Client::open(redis_url)?;
        let connection = client.get_multiplexed_tokio_connection().await?;
        info!("connected to redis history cache");
        Ok(Self { connection })
    }
}

#[async_trait]
impl HistoryCache for RedisHistoryCache {
    async fn get(&self, account_id: &str) -> Result<Option<Vec<LedgerEntry>>, WalletError> {
        let mut connection = self.connection.clone();
        let payload: Option<String> = redis::cmd("GET")
            .arg(history_key(account_id))
            .query_async(&mut connection)
            .await?;

        payload
            .map(|payload| serde_json::from_str(&payload))
            .transpose()
            .map_err(WalletError::from)
    }

    async fn put(
        &self,
        account_id: &str,
        entries: &[LedgerEntry],
        ttl: Duration,
    ) -> Result<(), WalletError> {
        let payload = serde_json::to_string(entries)?;
        // EX takes whole seconds and rejects zero
        let seconds = ttl.as_secs().max(1);

        let mut connection = self.connection.clone();
        redis::cmd("SET")
            .arg(history_key(account_id))
            .arg(payload)
            .arg("EX")
            .arg(seconds)
            .query_async::<_, ()>(&mut connection)
            .await?;
        Ok(())
    }

    async fn invalidate(&self, account_id: &str) -> Result<(), WalletError> {
        let mut connection = self.connection.clone();
        redis::cmd("DEL")
            .arg(history_key(account_id))
            .query_async::<_, ()>(&mut connection)
            .await?;
        Ok(())
    }
}
