use crate::accounts::{Address, SigningIdentity};
use crate::error::SigningError;
use crate::tx::{SignedTransaction, Signer, Transfer, TxSigner};
use perpx_load_core::Coin;
use std::fmt;
use tracing::debug;

/// Lifecycle of one funding transaction. States are only ever entered in this order, and the
/// three terminal states are exclusive.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BatchState {
    Built,
    Signed,
    Broadcast,
    Confirmed,
    Failed,
    TimedOut,
}

impl BatchState {
    fn can_become(self, next: BatchState) -> bool {
        use BatchState::*;
        matches!(
            (self, next),
            (Built, Signed)
                | (Signed, Broadcast)
                | (Signed, Failed)
                | (Broadcast, Confirmed)
                | (Broadcast, Failed)
                | (Broadcast, TimedOut)
        )
    }
}

impl fmt::Display for BatchState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// A group of worker accounts funded by a single multi-message transaction.
#[derive(Debug)]
pub(crate) struct FundingBatch {
    pub index: usize,
    pub accounts: Vec<Address>,
    pub amount_per_account: Coin,
    pub gas_limit: u64,
    state: BatchState,
}

impl FundingBatch {
    pub fn build(
        index: usize,
        accounts: Vec<Address>,
        amount_per_account: Coin,
        gas_per_message: u64,
    ) -> Self {
        let gas_limit = gas_per_message.saturating_mul(accounts.len() as u64);
        Self {
            index,
            accounts,
            amount_per_account,
            gas_limit,
            state: BatchState::Built,
        }
    }

    pub fn state(&self) -> BatchState {
        self.state
    }

    pub fn sign(
        &mut self,
        signer: &TxSigner,
        seed: &SigningIdentity,
        account_number: u64,
        sequence: u64,
    ) -> Result<SignedTransaction, SigningError> {
        let messages = self
            .accounts
            .iter()
            .map(|to| {
                Transfer::new(
                    seed.address().clone(),
                    to.clone(),
                    self.amount_per_account.clone(),
                )
            })
            .collect();

        let tx = signer.sign(
            Signer {
                identity: seed,
                account_number,
                sequence,
            },
            messages,
            self.gas_limit,
        )?;
        self.transition(BatchState::Signed);
        Ok(tx)
    }

    pub fn transition(&mut self, next: BatchState) {
        debug_assert!(
            self.state.can_become(next),
            "batch {} cannot go from {} to {next}",
            self.index,
            self.state
        );
        debug!(batch = self.index, from = %self.state, to = %next, "batch state");
        self.state = next;
    }
}
