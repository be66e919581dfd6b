//! Ledger service clients
//!
//! - `http` - Client for the ledger service over HTTP+JSON
//! - `memory` - In-process ledger for standalone runs and tests

pub mod http;
pub mod memory;

pub use http::HttpLedgerClient;
pub use memory::InMemoryLedger;
