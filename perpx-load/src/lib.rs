//! Account seeding and signed transaction generation for load testing PerpX nodes.
//!
//! Two entry points matter to a load driver:
//!
//! * [`FundingPlanner`] funds the deterministic worker accounts from a seed account, one
//!   confirmed batch at a time.
//! * [`TransferGenerator`] (usually obtained through a [`ClientFactory`]) hands out signed bank
//!   sends for one worker, each with its own sequence number, without a ledger round trip per
//!   transaction.
//!
//! ```no_run
//! use perpx_load::prelude::*;
//!
//! # async fn seed() -> Result<(), Box<dyn std::error::Error>> {
//! let config = SeedConfig::new(SeedCredential::resolve(None, "alice")?);
//! let ledger = LedgerClient::new(&config.rest_url)?;
//! let report = FundingPlanner::new(ledger, config)?.run().await?;
//! println!("funded {} accounts", report.funded());
//! # Ok(())
//! # }
//! ```
pub mod accounts;
pub mod client;
pub mod error;
pub mod generator;
pub mod ledger;
pub mod seed;
pub mod tx;

#[cfg(test)]
mod testing;

pub use perpx_load_core as core;

pub use accounts::{worker_secret, AccountDeriver, Address, SigningIdentity};
pub use client::{BankTransferFactory, ClientFactory, ClientRegistry, TxSource};
pub use error::{GenerateError, QueryError, RegistryError, SeedError, SigningError};
pub use generator::TransferGenerator;
pub use ledger::{BroadcastMode, Ledger, LedgerClient};
pub use seed::{FundingPlanner, SeedReport};
pub use tx::{SignedTransaction, TxSigner};

pub mod prelude {
    pub use crate::client::{BankTransferFactory, ClientFactory, ClientRegistry, TxSource};
    pub use crate::ledger::{BroadcastMode, Ledger, LedgerClient};
    pub use crate::seed::{FundingPlanner, SeedReport};
    pub use crate::{GenerateError, SeedError, TransferGenerator};

    pub use perpx_load_core::{
        ChainConfig, Coin, ConfigError, LoadConfig, RunStatistics, SeedConfig, SeedCredential,
    };
}
