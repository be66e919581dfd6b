//! HTTP+JSON client for the ledger service
//!
//! # Wire contract
//!
//! ```text
//! POST {base}/api/v1/transactions            {"debit_transaction": {..}, "credit_transaction": {..}}  -> 201
//! GET  {base}/api/v1/transactions/{account}  -> 200 {"data": [entry, ...]}  (most recent first)
//! ```
//!
//! Any other status, and any transport or decoding failure, is reported as
//! [`WalletError::Unavailable`].

use crate::config::LedgerClientConfig;
use crate::core::LedgerClient;
use crate::types::{Direction, EntryCategory, EntryStatus, LedgerEntry, LedgerPair, WalletError};
use async_trait::async_trait;
use reqwest::{Client, StatusCode, Url};
use serde::{Deserialize, Serialize};
use tracing::debug;

const TRANSACTIONS_PATH: &str = "api/v1/transactions";

/// One side of a pair as the ledger service expects it
#[derive(Debug, Serialize)]
struct EntryPayload<'a> {
    subject_account_id: &'a str,
    counterparty_account_id: &'a str,
    category: EntryCategory,
    direction: Direction,
    amount: i64,
    status: EntryStatus,
}

impl<'a> From<&'a LedgerEntry> for EntryPayload<'a> {
    fn from(entry: &'a LedgerEntry) -> Self {
        Self {
            subject_account_id: &entry.subject_account_id,
            counterparty_account_id: &entry.counterparty_account_id,
            category: entry.category,
            direction: entry.direction,
            amount: entry.amount,
            status: entry.status,
        }
    }
}

#[derive(Debug, Serialize)]
struct RecordPairRequest<'a> {
    debit_transaction: EntryPayload<'a>,
    credit_transaction: EntryPayload<'a>,
}

#[derive(Debug, Deserialize)]
struct HistoryResponse {
    data: Vec<LedgerEntry>,
}

/// [`LedgerClient`] talking to the ledger service over HTTP
#[derive(Debug, Clone)]
pub struct HttpLedgerClient {
    client: Client,
    base_url: Url,
}

impl HttpLedgerClient {
    /// Build a client for the service at `config.base_url`
    ///
    /// # Returns
    ///
    /// * `Err(WalletError::InvalidInput)` - If the base URL cannot be parsed
    /// * `Err(WalletError::Unavailable)` - If the HTTP client cannot be built
    pub fn new(config: &LedgerClientConfig) -> Result<Self, WalletError> {
        // A trailing slash makes Url::join append instead of replace
        let base_url = Url::parse(&format!("{}/", config.base_url)).map_err(|e| {
            WalletError::invalid_input(format!(
                "invalid ledger base url '{}': {}",
                config.base_url, e
            ))
        })?;

        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| WalletError::unavailable(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self { client, base_url })
    }

    fn transactions_url(&self) -> Result<Url, WalletError> {
        self.base_url
            .join(TRANSACTIONS_PATH)
            .map_err(|e| WalletError::unavailable(format!("invalid ledger url: {}", e)))
    }

    fn history_url(&self, account_id: &str) -> Result<Url, WalletError> {
        let mut url = self.transactions_url()?;
        url.path_segments_mut()
            .map_err(|_| WalletError::unavailable("ledger url cannot carry a path"))?
            .push(account_id);
        Ok(url)
    }
}

async fn unexpected_status(response: reqwest::Response, expected: StatusCode) -> WalletError {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    WalletError::unavailable(format!(
        "ledger service returned {} (expected {}): {}",
        status,
        expected,
        body.trim()
    ))
}

#[async_trait]
impl LedgerClient for HttpLedgerClient {
    async fn record_pair(&self, pair: &LedgerPair) -> Result<(), WalletError> {
        let request = RecordPairRequest {
            debit_transaction: EntryPayload::from(&pair.debit),
            credit_transaction: EntryPayload::from(&pair.credit),
        };

        let response = self
            .client
            .post(self.transactions_url()?)
            .json(&request)
            .send()
            .await?;

        if response.status() != StatusCode::CREATED {
            return Err(unexpected_status(response, StatusCode::CREATED).await);
        }
        debug!(entry = %pair.debit.id, "ledger service accepted pair");
        Ok(())
    }

    async fn fetch_history(&self, account_id: &str) -> Result<Vec<LedgerEntry>, WalletError> {
        let response = self.client.get(self.history_url(account_id)?).send().await?;

        if response.status() != StatusCode::OK {
            return Err(unexpected_status(response, StatusCode::OK).await);
        }

        let history: HistoryResponse = response.json().await?;
        Ok(history.data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use std::time::Duration;

    fn client(base_url: &str) -> HttpLedgerClient {
        HttpLedgerClient::new(&LedgerClientConfig::new(base_url, Duration::from_secs(1))).unwrap()
    }

    #[rstest]
    #[case::host_only("http://ledger:8082", "http://ledger:8082/api/v1/transactions")]
    #[case::with_prefix("http://gw/ledger", "http://gw/ledger/api/v1/transactions")]
    fn test_transactions_url(#[case] base: &str, #[case] expected: &str) {
        assert_eq!(client(base).transactions_url().unwrap().as_str(), expected);
    }

    #[rstest]
    #[case::plain("alice", "http://ledger/api/v1/transactions/alice")]
    #[case::needs_escaping("a b/c", "http://ledger/api/v1/transactions/a%20b%2Fc")]
    fn test_history_url_escapes_account(#[case] account: &str, #[case] expected: &str) {
        assert_eq!(client("http://ledger").history_url(account).unwrap().as_str(), expected);
    }

    #[test]
    fn test_invalid_base_url() {
        let err = HttpLedgerClient::new(&LedgerClientConfig::new("not a url", Duration::from_secs(1)))
            .unwrap_err();
        assert!(matches!(err, WalletError::InvalidInput { .. }));
    }

    #[test]
    fn test_record_pair_payload_shape() {
        let pair = LedgerPair::new(EntryCategory::Transfer, "alice", "bob", 42);
        let request = RecordPairRequest {
            debit_transaction: EntryPayload::from(&pair.debit),
            credit_transaction: EntryPayload::from(&pair.credit),
        };

        let json = serde_json::to_value(&request).unwrap();

        assert_eq!(
            json,
            serde_json::json!({
                "debit_transaction": {
                    "subject_account_id": "alice",
                    "counterparty_account_id": "bob",
                    "category": "transfer",
                    "direction": "debit",
                    "amount": 42,
                    "status": "completed"
                },
                "credit_transaction": {
                    "subject_account_id": "bob",
                    "counterparty_account_id": "alice",
                    "category": "transfer",
                    "direction": "credit",
                    "amount": 42,
                    "status": "completed"
                }
            })
        );
    }
}
