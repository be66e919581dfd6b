//! Asynchronous CSV reader with batch interface
//!
//! Provides a streaming interface over the operations of a CSV script.
//!
//! # Design
//!
//! The AsyncReader uses:
//! - csv-async for streaming CSV parsing
//! - Batch reading so the replay driver can run a batch concurrently
//!
//! # Architecture
//!
//! ```text
//! CSV Reader → AsyncReader → Batches of WalletOperations
//!                  ↓
//!           csv_format module
//!           (CsvRecord, convert_csv_record)
//! ```

use crate::io::csv_format::{convert_csv_record, CsvRecord, WalletOperation};
use csv_async::AsyncReaderBuilder;
use futures::io::AsyncRead;
use futures::stream::StreamExt;
use tracing::warn;

/// Asynchronous CSV reader
///
/// Maintains streaming behavior with constant memory usage per batch.
/// Malformed rows are logged, counted and skipped.
pub struct AsyncReader<R: AsyncRead + Unpin> {
    csv_reader: csv_async::AsyncDeserializer<R>,
    skipped: usize,
}

impl<R: AsyncRead + Unpin + Send + 'static> AsyncReader<R> {
    pub fn new(reader: R) -> Self {
        let csv_reader = AsyncReaderBuilder::new()
            .flexible(true)
            .trim(csv_async::Trim::All)
            .create_deserializer(reader);

        Self {
            csv_reader,
            skipped: 0,
        }
    }

    /// Read up to `batch_size` operations
    ///
    /// # Returns
    ///
    /// The successfully converted operations, in script order. Returns an
    /// empty vector when the end of the script is reached.
    pub async fn read_batch(&mut self, batch_size: usize) -> Vec<WalletOperation> {
        let mut batch = Vec::with_capacity(batch_size);
        let mut records = self.csv_reader.deserialize::<CsvRecord>();

        while batch.len() < batch_size {
            match records.next().await {
                Some(Ok(csv_record)) => match convert_csv_record(csv_record) {
                    Ok(operation) => batch.push(operation),
                    Err(e) => {
                        self.skipped += 1;
                        warn!(error = %e, "skipping malformed operation");
                    }
                },
                Some(Err(e)) => {
                    self.skipped += 1;
                    warn!(error = %e, "skipping unreadable CSV row");
                }
                None => break,
            }
        }

        batch
    }

    /// Rows skipped so far because they could not be parsed
    pub fn skipped(&self) -> usize {
        self.skipped
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::AccountKind;
    use futures::io::Cursor;

    const HEADER: &str = "op,account,counterparty,amount,kind\n";

    fn reader(rows: &str) -> AsyncReader<Cursor<Vec<u8>>> {
        AsyncReader::new(Cursor::new(format!("{}{}", HEADER, rows).into_bytes()))
    }

    #[tokio::test]
    async fn test_async_reader_read_batch() {
        let mut async_reader = reader("create,alice,,,\ndeposit,alice,,100,\ntransfer,alice,bob,50,\n");

        let batch = async_reader.read_batch(2).await;
        assert_eq!(batch.len(), 2);
        assert_eq!(
            batch[0],
            WalletOperation::Create {
                account: "alice".into(),
                kind: AccountKind::User
            }
        );
        assert_eq!(batch[1].name(), "deposit");

        let batch = async_reader.read_batch(2).await;
        assert_eq!(batch.len(), 1);
        assert_eq!(batch[0].name(), "transfer");

        assert!(async_reader.read_batch(2).await.is_empty());
    }

    #[tokio::test]
    async fn test_async_reader_empty_script() {
        let mut async_reader = reader("");
        assert!(async_reader.read_batch(10).await.is_empty());
        assert_eq!(async_reader.skipped(), 0);
    }

    #[tokio::test]
    async fn test_async_reader_skips_malformed_rows() {
        let mut async_reader = reader("refund,alice,,1,\ndeposit,alice,,abc,\ndeposit,alice,,50,\n");

        let batch = async_reader.read_batch(10).await;

        assert_eq!(
            batch,
            vec![WalletOperation::Deposit {
                account: "alice".into(),
                amount: 50,
                provider: None
            }]
        );
        assert_eq!(async_reader.skipped(), 2);
    }

    #[tokio::test]
    async fn test_async_reader_short_rows_and_whitespace() {
        let mut async_reader = reader("  create  ,  bank  ,,,  provider  \ndeposit,alice\nwithdraw,alice,,  25\n");

        let batch = async_reader.read_batch(10).await;

        assert_eq!(batch.len(), 2);
        assert_eq!(
            batch[0],
            WalletOperation::Create {
                account: "bank".into(),
                kind: AccountKind::Provider
            }
        );
        assert_eq!(
            batch[1],
            WalletOperation::Withdraw {
                account: "alice".into(),
                amount: 25,
                provider: None
            }
        );
        assert_eq!(async_reader.skipped(), 1);
    }
}
