//! The contract between a load driver and this crate: factories hand out one transaction
//! source per worker, and the driver pulls signed transactions from it.
use crate::accounts::Address;
use crate::error::{ConfigError, GenerateError, RegistryError};
use crate::generator::TransferGenerator;
use crate::ledger::{rest_url, Ledger, LedgerClient};
use crate::tx::{SignedTransaction, TxSigner};
use futures_util::future::BoxFuture;
use perpx_load_core::{LoadConfig, DEFAULT_CLIENT_FACTORY};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Produces the signed transactions of one worker.
pub trait TxSource: Send + Sync {
    fn worker(&self) -> u32;

    fn next_tx(&self) -> BoxFuture<'_, Result<SignedTransaction, GenerateError>>;
}

impl<L> TxSource for TransferGenerator<L>
where
    L: Ledger + Send + Sync + 'static,
{
    fn worker(&self) -> u32 {
        TransferGenerator::worker(self)
    }

    fn next_tx(&self) -> BoxFuture<'_, Result<SignedTransaction, GenerateError>> {
        Box::pin(self.next())
    }
}

/// Creates transaction sources for a load-test run.
pub trait ClientFactory: Send + Sync {
    /// Checked once, before any source is created.
    fn validate(&self, config: &LoadConfig) -> Result<(), ConfigError>;

    /// A source for the next worker, targeting `endpoint`.
    fn new_client(
        &self,
        config: &LoadConfig,
        endpoint: &str,
    ) -> Result<Box<dyn TxSource>, ConfigError>;
}

/// Bank sends from deterministic worker accounts. Every client gets the next worker index.
#[derive(Debug, Default)]
pub struct BankTransferFactory {
    next_worker: AtomicU32,
    cancel: CancellationToken,
}

impl BankTransferFactory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Workers handed out so far.
    pub fn workers(&self) -> u32 {
        self.next_worker.load(Ordering::SeqCst)
    }
}

impl ClientFactory for BankTransferFactory {
    fn validate(&self, config: &LoadConfig) -> Result<(), ConfigError> {
        config.validate()?;
        TxSigner::new(&config.chain)?;
        Address::parse(
            "sink address",
            &config.sink_address,
            &config.chain.address_prefix,
        )?;
        Ok(())
    }

    fn new_client(
        &self,
        config: &LoadConfig,
        endpoint: &str,
    ) -> Result<Box<dyn TxSource>, ConfigError> {
        let worker = self.next_worker.fetch_add(1, Ordering::SeqCst);
        let rest = rest_url(endpoint);
        debug!(worker, endpoint, %rest, "Creating bank transfer client");

        let ledger = LedgerClient::new(&rest).map_err(|e| ConfigError::InvalidEndpoint {
            endpoint: endpoint.to_string(),
            reason: e.to_string(),
        })?;
        let generator =
            TransferGenerator::new(worker, ledger, config)?.with_cancellation(self.cancel.clone());
        Ok(Box::new(generator))
    }
}

/// Named client factories, handed to the driver at startup.
#[derive(Default)]
pub struct ClientRegistry {
    factories: BTreeMap<String, Arc<dyn ClientFactory>>,
}

impl ClientRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry holding the bank transfer factory under its default name.
    pub fn with_defaults(cancel: CancellationToken) -> Self {
        let mut registry = Self::new();
        registry.factories.insert(
            DEFAULT_CLIENT_FACTORY.to_string(),
            Arc::new(BankTransferFactory::new().with_cancellation(cancel)),
        );
        registry
    }

    pub fn register(
        &mut self,
        name: &str,
        factory: Arc<dyn ClientFactory>,
    ) -> Result<(), RegistryError> {
        if self.factories.contains_key(name) {
            return Err(RegistryError::Duplicate(name.to_string()));
        }
        self.factories.insert(name.to_string(), factory);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Result<Arc<dyn ClientFactory>, RegistryError> {
        self.factories
            .get(name)
            .cloned()
            .ok_or_else(|| RegistryError::Unknown(name.to_string()))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.factories.keys().map(String::as_str)
    }
}
