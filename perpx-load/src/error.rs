use crate::seed::SeedReport;
pub use perpx_load_core::ConfigError;
use std::time::Duration;
use thiserror::Error;

/// Failures talking to the node's query surface.
///
/// `NotFound` is kept apart from every other failure because callers read it as "does not exist
/// yet" (needs funding, still pending) rather than as an error.
#[derive(Debug, Error)]
pub enum QueryError {
    #[error("not found: {url}")]
    NotFound { url: String },

    #[error("HTTP {status} from {url}: {body}")]
    Status {
        url: String,
        status: u16,
        body: String,
    },

    #[error("request to {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("unable to decode response from {url}: {reason}")]
    Decode { url: String, reason: String },
}

impl QueryError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Failures worth retrying: network trouble, server-side errors and garbled bodies.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::NotFound { .. } => false,
            Self::Status { status, .. } => *status >= 500 || *status == 429,
            Self::Transport { .. } | Self::Decode { .. } => true,
        }
    }
}

#[derive(Debug, Error)]
pub enum SigningError {
    #[error("signature failed: {0}")]
    Signature(String),

    #[error("unable to encode transaction: {0}")]
    Encode(#[from] prost::EncodeError),
}

#[derive(Debug, Error)]
pub enum SeedError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("insufficient funds: seed {address} has {available}{denom}, needs {required}{denom}")]
    InsufficientFunds {
        address: String,
        available: u128,
        required: u128,
        denom: String,
    },

    #[error("batch {batch} rejected by node (code {code}): {log}")]
    BroadcastRejected { batch: usize, code: u32, log: String },

    #[error("transaction {hash} was not included in a block within {}", humantime::format_duration(*.waited))]
    ConfirmationTimeout { hash: String, waited: Duration },

    #[error("transaction {hash} failed in block {height}: code {code}, log: {log}")]
    OnChainFailure {
        hash: String,
        height: u64,
        code: u32,
        log: String,
    },

    #[error("{} of {} accounts are still underfunded after seeding", .report.underfunded.len(), .report.deficient)]
    PartialFundingFailure { report: SeedReport },

    #[error("unable to sign funding batch: {0}")]
    Signing(#[from] SigningError),

    #[error("ledger query failed: {0}")]
    Ledger(#[from] QueryError),

    #[error("seeding cancelled")]
    Cancelled,
}

#[derive(Debug, Error)]
pub enum GenerateError {
    #[error("account {address} (worker {worker}) not found on chain; run the `seed` command first")]
    AccountNotFound { address: String, worker: u32 },

    #[error("unable to sign transaction with sequence {sequence}: {source}")]
    Signing {
        sequence: u64,
        #[source]
        source: SigningError,
    },

    #[error("ledger query failed: {0}")]
    Ledger(#[from] QueryError),

    #[error("transaction generation cancelled")]
    Cancelled,
}

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("client factory {0:?} is already registered")]
    Duplicate(String),

    #[error("no client factory registered as {0:?}")]
    Unknown(String),
}
