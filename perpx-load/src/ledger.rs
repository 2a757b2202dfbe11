//! Read and submit access to a ledger node.
mod client;
mod endpoint;

pub use client::LedgerClient;
pub use endpoint::rest_url;

use crate::error::QueryError;
use perpx_load_core::{Coin, QUERY_ATTEMPTS, QUERY_RETRY_BACKOFF};
use serde::Serialize;
use std::future::Future;
use tracing::warn;

/// `(account number, sequence)` of an on-chain account.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct AccountInfo {
    pub account_number: u64,
    pub sequence: u64,
}

/// Inclusion state of an indexed transaction.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TxStatus {
    /// Zero while the transaction is known but not yet in a block.
    pub height: u64,
    pub code: u32,
    pub log: String,
}

impl TxStatus {
    pub fn is_included(&self) -> bool {
        self.height > 0
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BroadcastResponse {
    pub hash: String,
    /// Non-zero when the node refused the transaction before it reached the mempool.
    pub code: u32,
    pub log: String,
}

impl BroadcastResponse {
    pub fn is_accepted(&self) -> bool {
        self.code == 0
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum BroadcastMode {
    /// Wait for the mempool check.
    #[serde(rename = "BROADCAST_MODE_SYNC")]
    Sync,
    /// Return as soon as the node received the bytes.
    #[serde(rename = "BROADCAST_MODE_ASYNC")]
    Async,
}

/// Query and broadcast surface of a ledger node.
///
/// `QueryError::NotFound` is the only way an implementation reports that an account or a
/// transaction does not exist (yet).
#[trait_variant::make(Ledger: Send)]
pub trait LocalLedger {
    async fn balances(&self, address: &str) -> Result<Vec<Coin>, QueryError>;

    async fn account(&self, address: &str) -> Result<AccountInfo, QueryError>;

    async fn tx_status(&self, hash: &str) -> Result<TxStatus, QueryError>;

    async fn broadcast(
        &self,
        tx_bytes: &[u8],
        mode: BroadcastMode,
    ) -> Result<BroadcastResponse, QueryError>;
}

/// Runs `op` up to `QUERY_ATTEMPTS` times while it fails with a transient error.
pub(crate) async fn with_retry<T, F, Fut>(what: &str, mut op: F) -> Result<T, QueryError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, QueryError>>,
{
    let mut attempt = 1;
    loop {
        match op().await {
            Err(err) if err.is_transient() && attempt < QUERY_ATTEMPTS => {
                warn!(attempt, error = %err, "{what} failed, retrying");
                tokio::time::sleep(QUERY_RETRY_BACKOFF).await;
                attempt += 1;
            }
            res => return res,
        }
    }
}
