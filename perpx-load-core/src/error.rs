use thiserror::Error;

/// Pre-flight configuration problems. Always fatal, always raised before any network traffic.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{field} cannot be empty")]
    Empty { field: &'static str },

    #[error("{field} must be greater than zero")]
    Zero { field: &'static str },

    #[error("invalid coin {input:?}: {reason}")]
    InvalidCoin { input: String, reason: &'static str },

    #[error("invalid denom {0:?}")]
    InvalidDenom(String),

    #[error("invalid {field} address {address:?}: {reason}")]
    InvalidAddress {
        field: &'static str,
        address: String,
        reason: String,
    },

    #[error("invalid private key: {0}")]
    InvalidPrivateKey(String),

    #[error("invalid mnemonic: {0}")]
    InvalidMnemonic(String),

    #[error("seed key {0:?} is not a mnemonic; provide a mnemonic, use \"alice\", or pass --seed-private-key")]
    UnknownSeedKey(String),

    #[error("invalid endpoint {endpoint:?}: {reason}")]
    InvalidEndpoint { endpoint: String, reason: String },

    #[error("{0}")]
    Invalid(String),
}
