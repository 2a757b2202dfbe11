use perpx_load::{GenerateError, QueryError, RegistryError, SeedError};
use perpx_load_core::ConfigError;
use std::sync::PoisonError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Generate(#[from] GenerateError),

    #[error(transparent)]
    Seed(#[from] SeedError),

    #[error(transparent)]
    Ledger(#[from] QueryError),

    #[error("connection task failed: {0}")]
    Join(#[from] tokio::task::JoinError),

    #[error("terminal error: {0}")]
    Terminal(#[from] std::io::Error),

    #[error("Counter table is poisoned.")]
    PoisonData,
}

impl<T> From<PoisonError<T>> for RuntimeError {
    fn from(_err: PoisonError<T>) -> Self {
        Self::PoisonData
    }
}
