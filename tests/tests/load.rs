mod utils;
#[allow(unused)]
use utils::*;

mod tests {
    use super::*;

    use futures::future::join_all;
    use perpx_load::{
        BankTransferFactory, BroadcastMode, FundingPlanner, GenerateError, Ledger,
        TransferGenerator,
    };
    use perpx_load_core::DEFAULT_SINK_ADDRESS;
    use perpx_load_runtime::{RuntimeError, TransactorGroup};
    use std::sync::Arc;
    use std::time::Duration;

    async fn seeded(workers: u32) -> (mock_ledger::MockLedger, String) {
        let (ledger, url) = ledger().await;
        FundingPlanner::new(client(&url), seed_config(&url, workers, 50))
            .unwrap()
            .run()
            .await
            .unwrap();
        (ledger, url)
    }

    #[tokio::test]
    async fn generated_sequences_are_accepted_in_order() {
        let (ledger, url) = seeded(1).await;
        let generator = TransferGenerator::new(0, client(&url), &load_config(&url)).unwrap();

        let mut txs = join_all((0..20).map(|_| generator.next()))
            .await
            .into_iter()
            .collect::<Result<Vec<_>, _>>()
            .unwrap();
        txs.sort_by_key(|tx| tx.sequence());
        assert_eq!(
            txs.iter().map(|tx| tx.sequence()).collect::<Vec<_>>(),
            (0..20).collect::<Vec<_>>()
        );

        let ledger_client = client(&url);
        for tx in &txs {
            let res = ledger_client
                .broadcast(tx.bytes(), BroadcastMode::Sync)
                .await
                .unwrap();
            assert!(res.is_accepted(), "sequence {}: {}", tx.sequence(), res.log);
        }

        let worker = ledger.account(generator.address().as_str()).unwrap();
        assert_eq!(worker.sequence, 20);
        assert_eq!(ledger.balance(DEFAULT_SINK_ADDRESS), 20);
    }

    #[tokio::test]
    async fn replayed_sequence_is_rejected() {
        let (_ledger, url) = seeded(1).await;
        let generator = TransferGenerator::new(0, client(&url), &load_config(&url)).unwrap();
        let tx = generator.next().await.unwrap();

        let ledger_client = client(&url);
        let first = ledger_client
            .broadcast(tx.bytes(), BroadcastMode::Sync)
            .await
            .unwrap();
        assert!(first.is_accepted());

        let again = ledger_client
            .broadcast(tx.bytes(), BroadcastMode::Sync)
            .await
            .unwrap();
        assert_eq!(again.code, mock_ledger::CODE_WRONG_SEQUENCE);
    }

    #[tokio::test]
    async fn unseeded_worker_is_reported() {
        let (_ledger, url) = seeded(1).await;
        let generator = TransferGenerator::new(3, client(&url), &load_config(&url)).unwrap();

        let err = generator.next().await.unwrap_err();
        assert!(matches!(err, GenerateError::AccountNotFound { worker: 3, .. }));
        assert!(!generator.is_resolved());
    }

    #[tokio::test]
    #[ntest::timeout(30_000)]
    async fn transactor_group_sends_count() {
        let (ledger, url) = seeded(2).await;
        let mut config = load_config(&url);
        config.connections = 2;
        config.duration = None;
        config.count = Some(40);
        config.rate = std::num::NonZeroU32::new(200).unwrap();

        let stats = TransactorGroup::new(config, Arc::new(BankTransferFactory::new()))
            .run()
            .await
            .unwrap();
        assert_eq!(stats.connections, 2);
        assert_eq!(stats.total_txs, 40);
        assert_eq!(stats.errors, 0);
        assert!(stats.total_bytes > 0);
        assert_eq!(ledger.balance(DEFAULT_SINK_ADDRESS), 40);
    }

    #[tokio::test]
    #[ntest::timeout(30_000)]
    async fn rejected_sends_use_up_the_count() {
        let (ledger, url) = seeded(1).await;
        let mut config = load_config(&url);
        config.duration = None;
        config.count = Some(10);
        config.rate = std::num::NonZeroU32::new(200).unwrap();
        // No fee at all is below the ledger's minimum, so every send is rejected.
        config.chain.min_gas_price = 0;

        let stats = TransactorGroup::new(config, Arc::new(BankTransferFactory::new()))
            .run()
            .await
            .unwrap();
        assert_eq!(stats.total_txs, 0);
        assert_eq!(stats.errors, 10);
        assert_eq!(ledger.balance(DEFAULT_SINK_ADDRESS), 0);
    }

    #[tokio::test]
    #[ntest::timeout(30_000)]
    async fn transactor_group_stops_after_duration() {
        let (_ledger, url) = seeded(1).await;
        let mut config = load_config(&url);
        config.duration = Some(Duration::from_millis(500));
        config.rate = std::num::NonZeroU32::new(20).unwrap();

        let stats = TransactorGroup::new(config, Arc::new(BankTransferFactory::new()))
            .run()
            .await
            .unwrap();
        assert!(stats.total_txs > 0);
        assert!(stats.total_txs <= 40, "{} txs", stats.total_txs);
        assert!(stats.elapsed >= Duration::from_millis(500));
    }

    #[tokio::test]
    #[ntest::timeout(30_000)]
    async fn transactor_group_needs_seeded_workers() {
        let (_ledger, url) = seeded(1).await;
        let mut config = load_config(&url);
        config.connections = 2;
        config.duration = Some(Duration::from_secs(20));

        let err = TransactorGroup::new(config, Arc::new(BankTransferFactory::new()))
            .run()
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            RuntimeError::Generate(GenerateError::AccountNotFound { worker: 1, .. })
        ));
    }
}
