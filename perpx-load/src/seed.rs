//! Funding worker accounts from a single seed account.
mod batch;

pub use batch::BatchState;

use crate::accounts::{AccountDeriver, Address, SigningIdentity};
use crate::error::{QueryError, SeedError};
use crate::ledger::{BroadcastMode, Ledger, TxStatus};
use crate::tx::TxSigner;
use batch::FundingBatch;
use futures_util::{stream, StreamExt};
use perpx_load_core::{amount_of, SeedConfig, BALANCE_QUERY_CONCURRENCY};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

/// A funding transaction that made it into a block.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BatchReceipt {
    pub index: usize,
    pub hash: String,
    pub height: u64,
    pub accounts: usize,
}

/// Outcome of a seeding run.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SeedReport {
    pub seed_address: String,
    /// Worker accounts inspected.
    pub checked: usize,
    pub already_funded: usize,
    /// Accounts that were below the threshold before seeding.
    pub deficient: usize,
    pub batches: Vec<BatchReceipt>,
    /// Accounts still below the threshold (or unverifiable) after every batch settled.
    pub underfunded: Vec<String>,
}

impl SeedReport {
    pub fn funded(&self) -> usize {
        self.deficient - self.underfunded.len()
    }
}

/// Makes sure the first `workers` worker accounts each hold at least the configured amount.
///
/// Funding transactions share the seed account's sequence, so batches are signed, broadcast and
/// confirmed strictly one after another.
pub struct FundingPlanner<L> {
    ledger: L,
    config: SeedConfig,
    deriver: AccountDeriver,
    signer: TxSigner,
    seed: SigningIdentity,
    cancel: CancellationToken,
}

impl<L: Ledger + Sync> FundingPlanner<L> {
    pub fn new(ledger: L, config: SeedConfig) -> Result<Self, SeedError> {
        config.validate()?;
        let seed =
            SigningIdentity::from_credential(&config.credential, &config.chain.address_prefix)?;
        let signer = TxSigner::new(&config.chain)?;

        Ok(Self {
            ledger,
            deriver: AccountDeriver::new(&config.chain.address_prefix),
            signer,
            seed,
            config,
            cancel: CancellationToken::new(),
        })
    }

    /// Stops the planner before its next batch once `cancel` fires. A batch already broadcast is
    /// still followed until it settles.
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn seed_address(&self) -> &Address {
        self.seed.address()
    }

    /// Per-account amounts plus the fee of funding every account.
    pub fn required_funds(&self) -> u128 {
        let workers = u128::from(self.config.workers);
        let fee_reserve = self
            .config
            .chain
            .fee_for(self.config.gas_per_message)
            .amount
            .saturating_mul(workers);
        self.config
            .fund_amount
            .amount
            .saturating_mul(workers)
            .saturating_add(fee_reserve)
    }

    #[instrument(skip_all, fields(seed = %self.seed.address(), workers = self.config.workers))]
    pub async fn run(&self) -> Result<SeedReport, SeedError> {
        let mut report = SeedReport {
            seed_address: self.seed.address().to_string(),
            checked: self.config.workers as usize,
            ..SeedReport::default()
        };

        self.check_seed_balance().await?;

        let seed_account = self.ledger.account(self.seed.address().as_str()).await?;
        info!(
            account_number = seed_account.account_number,
            sequence = seed_account.sequence,
            "Resolved seed account"
        );

        let deficient = self.deficient_accounts().await?;
        report.deficient = deficient.len();
        report.already_funded = report.checked - deficient.len();
        if deficient.is_empty() {
            info!("All {} accounts already funded", report.checked);
            return Ok(report);
        }
        info!(
            "{} of {} accounts need funding, batch size {}",
            deficient.len(),
            report.checked,
            self.config.batch_size
        );

        let mut sequence = seed_account.sequence;
        for (index, chunk) in deficient.chunks(self.config.batch_size).enumerate() {
            if self.cancel.is_cancelled() {
                warn!("Seeding cancelled before batch {index}");
                return Err(SeedError::Cancelled);
            }

            let batch = FundingBatch::build(
                index,
                chunk.to_vec(),
                self.config.fund_amount.clone(),
                self.config.gas_per_message,
            );
            let receipt = self
                .process_batch(batch, seed_account.account_number, sequence)
                .await?;
            report.batches.push(receipt);
            sequence += 1;
        }

        report.underfunded = self.verify(&deficient).await;
        if !report.underfunded.is_empty() {
            warn!(
                "{} accounts still underfunded: {:?}",
                report.underfunded.len(),
                report.underfunded
            );
            return Err(SeedError::PartialFundingFailure { report });
        }

        info!(
            "Funded {} accounts in {} batches",
            report.funded(),
            report.batches.len()
        );
        Ok(report)
    }

    async fn check_seed_balance(&self) -> Result<(), SeedError> {
        let address = self.seed.address();
        let denom = &self.config.chain.denom;
        let available = match self.ledger.balances(address.as_str()).await {
            Ok(balances) => amount_of(&balances, denom),
            Err(QueryError::NotFound { .. }) => 0,
            Err(err) => return Err(err.into()),
        };
        let required = self.required_funds();

        info!("Seed balance {available}{denom}, required {required}{denom}");
        if available < required {
            error!("Seed account {address} cannot fund {} workers", self.config.workers);
            return Err(SeedError::InsufficientFunds {
                address: address.to_string(),
                available,
                required,
                denom: denom.clone(),
            });
        }
        Ok(())
    }

    /// Worker addresses below the funding threshold, in worker order.
    async fn deficient_accounts(&self) -> Result<Vec<Address>, SeedError> {
        let addresses = (0..self.config.workers)
            .map(|i| self.deriver.address(i))
            .collect::<Result<Vec<_>, _>>()?;

        let balances = stream::iter(addresses)
            .map(|address| async move {
                let balance = self.balance_of(&address).await;
                (address, balance)
            })
            .buffered(BALANCE_QUERY_CONCURRENCY)
            .collect::<Vec<_>>()
            .await;

        Ok(balances
            .into_iter()
            .filter_map(|(address, balance)| match balance {
                Ok(amount) if amount >= self.config.fund_amount.amount => None,
                Ok(amount) => {
                    debug!("{address} holds {amount}, needs funding");
                    Some(address)
                }
                Err(err) if err.is_not_found() => Some(address),
                Err(err) => {
                    warn!("Balance of {address} unavailable ({err}), funding it anyway");
                    Some(address)
                }
            })
            .collect())
    }

    async fn balance_of(&self, address: &Address) -> Result<u128, QueryError> {
        let balances = self.ledger.balances(address.as_str()).await?;
        Ok(amount_of(&balances, &self.config.chain.denom))
    }

    #[instrument(skip_all, fields(batch = batch.index, size = batch.accounts.len(), sequence = sequence))]
    async fn process_batch(
        &self,
        mut batch: FundingBatch,
        account_number: u64,
        sequence: u64,
    ) -> Result<BatchReceipt, SeedError> {
        let tx = batch.sign(&self.signer, &self.seed, account_number, sequence)?;
        let hash = tx.hash();

        let res = match self.ledger.broadcast(tx.bytes(), BroadcastMode::Sync).await {
            Ok(res) => res,
            // A 4xx is the node refusing this submission, not an unreachable node.
            Err(QueryError::Status { status, body, .. }) if (400..500).contains(&status) => {
                batch.transition(BatchState::Failed);
                error!(status, state = %batch.state(), "Batch refused: {body}");
                return Err(SeedError::BroadcastRejected {
                    batch: batch.index,
                    code: u32::from(status),
                    log: body,
                });
            }
            Err(err) => {
                batch.transition(BatchState::Failed);
                error!(state = %batch.state(), "Batch broadcast failed: {err}");
                return Err(err.into());
            }
        };
        if !res.is_accepted() {
            batch.transition(BatchState::Failed);
            error!(code = res.code, state = %batch.state(), "Batch rejected: {}", res.log);
            return Err(SeedError::BroadcastRejected {
                batch: batch.index,
                code: res.code,
                log: res.log,
            });
        }
        if !res.hash.is_empty() && !res.hash.eq_ignore_ascii_case(&hash) {
            warn!("Node reported hash {} for {hash}", res.hash);
        }
        batch.transition(BatchState::Broadcast);
        info!(%hash, "Broadcast funding batch");

        let confirmation = self.config.confirmation;
        let inclusion = tokio::time::timeout(confirmation.timeout, self.poll_inclusion(&hash)).await;
        let Ok(status) = inclusion else {
            batch.transition(BatchState::TimedOut);
            error!(%hash, state = %batch.state(), "Batch not included within {confirmation}");
            return Err(SeedError::ConfirmationTimeout {
                hash,
                waited: confirmation.timeout,
            });
        };

        if status.code != 0 {
            batch.transition(BatchState::Failed);
            error!(%hash, code = status.code, state = %batch.state(), "Batch failed on chain: {}", status.log);
            return Err(SeedError::OnChainFailure {
                hash,
                height: status.height,
                code: status.code,
                log: status.log,
            });
        }

        batch.transition(BatchState::Confirmed);
        info!(%hash, height = status.height, "Funding batch confirmed");
        Ok(BatchReceipt {
            index: batch.index,
            hash,
            height: status.height,
            accounts: batch.accounts.len(),
        })
    }

    /// Polls until the transaction lands in a block. Unbounded; the caller applies the timeout.
    async fn poll_inclusion(&self, hash: &str) -> TxStatus {
        let poll_interval: Duration = self.config.confirmation.poll_interval;
        loop {
            tokio::time::sleep(poll_interval).await;
            match self.ledger.tx_status(hash).await {
                Ok(status) if status.is_included() => return status,
                Ok(_) => debug!("{hash} pending"),
                Err(err) if err.is_not_found() => debug!("{hash} not indexed yet"),
                Err(err) => warn!("Status of {hash} unavailable: {err}"),
            }
        }
    }

    /// Re-reads every funded account. Anything unverifiable counts as underfunded.
    async fn verify(&self, accounts: &[Address]) -> Vec<String> {
        stream::iter(accounts)
            .map(|address| async move { (address, self.balance_of(address).await) })
            .buffered(BALANCE_QUERY_CONCURRENCY)
            .filter_map(|(address, balance)| async move {
                match balance {
                    Ok(amount) if amount >= self.config.fund_amount.amount => None,
                    Ok(amount) => {
                        warn!("{address} holds only {amount} after seeding");
                        Some(address.to_string())
                    }
                    Err(err) => {
                        warn!("Unable to verify {address}: {err}");
                        Some(address.to_string())
                    }
                }
            })
            .collect()
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{MockLedger, DENOM};
    use perpx_load_core::{
        Coin, ConfirmationPolicy, SeedCredential, DEFAULT_MIN_GAS_PRICE, DEV_SEED_MNEMONIC,
    };

    const FUND: u128 = 1_000_000;

    fn config(workers: u32, batch_size: usize) -> SeedConfig {
        let mut config = SeedConfig::new(SeedCredential::Mnemonic(DEV_SEED_MNEMONIC.into()));
        config.workers = workers;
        config.batch_size = batch_size;
        config.fund_amount = Coin::new(FUND, DENOM);
        config
    }

    fn planner(ledger: &MockLedger, config: SeedConfig) -> FundingPlanner<MockLedger> {
        FundingPlanner::new(ledger.clone(), config).unwrap()
    }

    /// A mock ledger whose seed account can pay for `workers` accounts.
    fn funded_ledger(workers: u32) -> (MockLedger, Address) {
        let ledger = MockLedger::new();
        let seed = planner(&ledger, config(workers, 1)).seed_address().clone();
        let required = planner(&ledger, config(workers, 1)).required_funds();
        ledger.fund(seed.as_str(), required);
        (ledger, seed)
    }

    #[test]
    fn required_funds_include_fee_reserve() {
        let ledger = MockLedger::new();
        let planner = planner(&ledger, config(10, 4));
        assert_eq!(
            planner.required_funds(),
            10 * FUND + 10 * 100_000 * DEFAULT_MIN_GAS_PRICE
        );
    }

    #[test]
    fn rejects_invalid_config() {
        let mut config = config(10, 4);
        config.batch_size = 0;
        assert!(matches!(
            FundingPlanner::new(MockLedger::new(), config),
            Err(SeedError::Config(_))
        ));
    }

    #[tracing_test::traced_test]
    #[tokio::test(start_paused = true)]
    async fn insufficient_funds_broadcast_nothing() {
        let ledger = MockLedger::new();
        let planner = planner(&ledger, config(10, 4));
        ledger.fund(planner.seed_address().as_str(), planner.required_funds() - 1);

        let err = planner.run().await.unwrap_err();
        assert!(matches!(err, SeedError::InsufficientFunds { .. }));
        assert!(ledger.broadcasts().is_empty());
        assert!(logs_contain("cannot fund 10 workers"));
    }

    #[tokio::test(start_paused = true)]
    async fn unknown_seed_is_insufficient() {
        let ledger = MockLedger::new();
        let err = planner(&ledger, config(2, 4)).run().await.unwrap_err();
        assert!(matches!(
            err,
            SeedError::InsufficientFunds { available: 0, .. }
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn batches_follow_worker_order() {
        let (ledger, seed) = funded_ledger(10);
        let report = planner(&ledger, config(10, 4)).run().await.unwrap();

        let broadcasts = ledger.broadcasts();
        let sizes = broadcasts.iter().map(|b| b.sends.len()).collect::<Vec<_>>();
        assert_eq!(sizes, vec![4, 4, 2]);

        let deriver = AccountDeriver::new("perpx");
        let mut worker = 0;
        for (i, broadcast) in broadcasts.iter().enumerate() {
            let size = broadcast.sends.len() as u64;
            assert_eq!(broadcast.gas_limit(), size * 100_000);
            assert_eq!(broadcast.fee(), u128::from(size * 100_000) * DEFAULT_MIN_GAS_PRICE);
            assert_eq!(broadcast.sequence(), i as u64);
            for send in &broadcast.sends {
                assert_eq!(send.from_address, seed.as_str());
                assert_eq!(send.to_address, deriver.address(worker).unwrap().as_str());
                assert_eq!(send.amount[0].amount, FUND.to_string());
                worker += 1;
            }
        }

        assert_eq!(report.deficient, 10);
        assert_eq!(report.funded(), 10);
        assert_eq!(report.batches.len(), 3);
        assert_eq!(report.batches[2].accounts, 2);
        for (receipt, broadcast) in report.batches.iter().zip(&broadcasts) {
            assert_eq!(receipt.hash, broadcast.hash);
        }
        assert!(report.underfunded.is_empty());
        for i in 0..10 {
            assert_eq!(ledger.balance(deriver.address(i).unwrap().as_str()), FUND);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn second_run_is_a_noop() {
        let (ledger, _) = funded_ledger(10);
        planner(&ledger, config(10, 4)).run().await.unwrap();
        ledger.fund(
            planner(&ledger, config(10, 4)).seed_address().as_str(),
            planner(&ledger, config(10, 4)).required_funds(),
        );

        let report = planner(&ledger, config(10, 4)).run().await.unwrap();
        assert_eq!(ledger.broadcasts().len(), 3);
        assert_eq!(report.already_funded, 10);
        assert!(report.batches.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn only_deficient_accounts_are_funded() {
        let (ledger, _) = funded_ledger(5);
        let deriver = AccountDeriver::new("perpx");
        ledger.fund(deriver.address(1).unwrap().as_str(), FUND);
        ledger.fund(deriver.address(3).unwrap().as_str(), FUND * 2);
        ledger.fund(deriver.address(4).unwrap().as_str(), FUND - 1);

        let report = planner(&ledger, config(5, 50)).run().await.unwrap();
        let broadcasts = ledger.broadcasts();
        assert_eq!(broadcasts.len(), 1);
        let recipients = broadcasts[0]
            .sends
            .iter()
            .map(|s| s.to_address.clone())
            .collect::<Vec<_>>();
        let expected = [0, 2, 4]
            .iter()
            .map(|i| deriver.address(*i).unwrap().to_string())
            .collect::<Vec<_>>();
        assert_eq!(recipients, expected);
        assert_eq!(report.already_funded, 2);
    }

    #[tracing_test::traced_test]
    #[tokio::test(start_paused = true)]
    async fn unreadable_balances_are_funded() {
        let (ledger, _) = funded_ledger(2);
        let deriver = AccountDeriver::new("perpx");
        ledger.fund(deriver.address(0).unwrap().as_str(), FUND);
        ledger.fail_balance_queries(deriver.address(0).unwrap().as_str());

        let err = planner(&ledger, config(2, 50)).run().await.unwrap_err();
        assert_eq!(ledger.broadcasts()[0].sends.len(), 2);
        assert!(logs_contain("funding it anyway"));

        // The failing account can't be verified afterwards either.
        let SeedError::PartialFundingFailure { report } = err else {
            panic!("unexpected error: {err}");
        };
        assert_eq!(
            report.underfunded,
            vec![deriver.address(0).unwrap().to_string()]
        );
        assert_eq!(report.funded(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn rejected_batch_stops_seeding() {
        let (mut ledger, _) = funded_ledger(10);
        ledger.reject_code = 32;

        let err = planner(&ledger, config(10, 4)).run().await.unwrap_err();
        assert!(matches!(
            err,
            SeedError::BroadcastRejected {
                batch: 0,
                code: 32,
                ..
            }
        ));
        assert_eq!(ledger.broadcasts().len(), 1);
    }

    #[tracing_test::traced_test]
    #[tokio::test(start_paused = true)]
    async fn refused_submission_is_a_rejection() {
        let (mut ledger, _) = funded_ledger(4);
        ledger.refuse_status = Some(400);

        let err = planner(&ledger, config(4, 2)).run().await.unwrap_err();
        let SeedError::BroadcastRejected { batch, code, log } = err else {
            panic!("unexpected error: {err}");
        };
        assert_eq!((batch, code), (0, 400));
        assert_eq!(log, "invalid tx bytes");
        assert_eq!(ledger.broadcasts().len(), 1);
        assert!(logs_contain("state=Failed"));
    }

    #[tokio::test(start_paused = true)]
    async fn unavailable_node_is_a_ledger_error() {
        let (mut ledger, _) = funded_ledger(4);
        ledger.refuse_status = Some(503);

        let err = planner(&ledger, config(4, 2)).run().await.unwrap_err();
        assert!(matches!(
            err,
            SeedError::Ledger(QueryError::Status { status: 503, .. })
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn confirmation_times_out() {
        let (mut ledger, _) = funded_ledger(10);
        ledger.never_include = true;
        let mut config = config(10, 4);
        config.confirmation = ConfirmationPolicy {
            poll_interval: Duration::from_millis(500),
            timeout: Duration::from_secs(30),
        };

        let start = tokio::time::Instant::now();
        let err = planner(&ledger, config).run().await.unwrap_err();
        assert!(matches!(err, SeedError::ConfirmationTimeout { .. }));
        assert!(start.elapsed() >= Duration::from_secs(30));
        assert_eq!(ledger.broadcasts().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn on_chain_failure_carries_log() {
        let (mut ledger, _) = funded_ledger(3);
        ledger.on_chain_code = 13;

        let err = planner(&ledger, config(3, 2)).run().await.unwrap_err();
        let SeedError::OnChainFailure { code, log, height, .. } = err else {
            panic!("unexpected error: {err}");
        };
        assert_eq!(code, 13);
        assert_eq!(log, "insufficient fee");
        assert!(height > 0);
        assert_eq!(ledger.broadcasts().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_before_first_batch() {
        let (ledger, _) = funded_ledger(3);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = planner(&ledger, config(3, 2))
            .with_cancellation(cancel)
            .run()
            .await
            .unwrap_err();
        assert!(matches!(err, SeedError::Cancelled));
        assert!(ledger.broadcasts().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_between_batches() {
        let (mut ledger, _) = funded_ledger(3);
        let cancel = CancellationToken::new();
        ledger.cancel_on_broadcast = Some(cancel.clone());

        let err = planner(&ledger, config(3, 2))
            .with_cancellation(cancel)
            .run()
            .await
            .unwrap_err();
        assert!(matches!(err, SeedError::Cancelled));

        // The first batch was already broadcast, so it is still followed into a block.
        let broadcasts = ledger.broadcasts();
        assert_eq!(broadcasts.len(), 1);
        let deriver = AccountDeriver::new("perpx");
        for worker in 0..2 {
            assert_eq!(ledger.balance(deriver.address(worker).unwrap().as_str()), FUND);
        }
        assert_eq!(ledger.balance(deriver.address(2).unwrap().as_str()), 0);
    }
}
