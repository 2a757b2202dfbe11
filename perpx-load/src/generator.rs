use crate::accounts::{AccountDeriver, Address, SigningIdentity};
use crate::error::{ConfigError, GenerateError};
use crate::ledger::Ledger;
use crate::tx::{SignedTransaction, Signer, Transfer, TxSigner};
use perpx_load_core::{Coin, LoadConfig};
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::OnceCell;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

#[derive(Debug)]
struct ResolvedAccount {
    account_number: u64,
    next_sequence: AtomicU64,
}

/// Signed transfers of one worker account to the sink address.
///
/// The account number and starting sequence are read from the ledger on the first call only;
/// concurrent first calls wait for that single query. Afterwards every call reserves its
/// sequence with one atomic increment, so no two transactions ever share a sequence. A failed
/// signature still consumes its sequence.
pub struct TransferGenerator<L> {
    worker: u32,
    ledger: L,
    identity: SigningIdentity,
    sink: Address,
    amount: Coin,
    gas_limit: u64,
    signer: TxSigner,
    account: OnceCell<ResolvedAccount>,
    cancel: CancellationToken,
}

impl<L: Ledger + Sync> TransferGenerator<L> {
    pub fn new(worker: u32, ledger: L, config: &LoadConfig) -> Result<Self, ConfigError> {
        let chain = &config.chain;
        let signer = TxSigner::new(chain)?;
        let sink = Address::parse("sink address", &config.sink_address, &chain.address_prefix)?;
        let identity = AccountDeriver::new(&chain.address_prefix).derive(worker)?;

        Ok(Self {
            worker,
            ledger,
            identity,
            sink,
            amount: Coin::new(config.transfer_amount, &chain.denom),
            gas_limit: config.gas_limit,
            signer,
            account: OnceCell::new(),
            cancel: CancellationToken::new(),
        })
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn worker(&self) -> u32 {
        self.worker
    }

    pub fn address(&self) -> &Address {
        self.identity.address()
    }

    pub fn is_resolved(&self) -> bool {
        self.account.initialized()
    }

    /// The sequence the next call will use, once resolved.
    pub fn next_sequence(&self) -> Option<u64> {
        self.account
            .get()
            .map(|account| account.next_sequence.load(Ordering::SeqCst))
    }

    async fn resolve(&self) -> Result<&ResolvedAccount, GenerateError> {
        self.account
            .get_or_try_init(|| async {
                let address = self.identity.address();
                match self.ledger.account(address.as_str()).await {
                    Ok(info) => {
                        info!(
                            worker = self.worker,
                            account_number = info.account_number,
                            sequence = info.sequence,
                            "Resolved {address}"
                        );
                        Ok(ResolvedAccount {
                            account_number: info.account_number,
                            next_sequence: AtomicU64::new(info.sequence),
                        })
                    }
                    Err(err) if err.is_not_found() => Err(GenerateError::AccountNotFound {
                        address: address.to_string(),
                        worker: self.worker,
                    }),
                    Err(err) => Err(err.into()),
                }
            })
            .await
    }

    /// Signs the next transfer. Broadcasting is left to the caller.
    pub async fn next(&self) -> Result<SignedTransaction, GenerateError> {
        if self.cancel.is_cancelled() {
            return Err(GenerateError::Cancelled);
        }

        let account = self.resolve().await?;
        let sequence = account.next_sequence.fetch_add(1, Ordering::SeqCst);
        debug!(worker = self.worker, sequence, "Signing transfer");

        let transfer = Transfer::new(
            self.identity.address().clone(),
            self.sink.clone(),
            self.amount.clone(),
        );
        self.signer
            .sign(
                Signer {
                    identity: &self.identity,
                    account_number: account.account_number,
                    sequence,
                },
                vec![transfer],
                self.gas_limit,
            )
            .map_err(|source| GenerateError::Signing { sequence, source })
    }
}
