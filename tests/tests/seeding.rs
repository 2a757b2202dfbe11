mod utils;
#[allow(unused)]
use utils::*;

mod tests {
    use super::*;

    use perpx_load::{AccountDeriver, FundingPlanner, SeedError};
    use std::time::Duration;

    #[tokio::test]
    async fn funds_every_worker() {
        let (ledger, url) = ledger().await;
        let planner = FundingPlanner::new(client(&url), seed_config(&url, 7, 3)).unwrap();

        let report = planner.run().await.unwrap();
        assert_eq!(report.checked, 7);
        assert_eq!(report.deficient, 7);
        assert_eq!(report.funded(), 7);
        assert_eq!(report.batches.len(), 3);
        assert_eq!(
            report.batches.iter().map(|b| b.accounts).collect::<Vec<_>>(),
            vec![3, 3, 1]
        );
        assert!(report.batches.windows(2).all(|w| w[0].height < w[1].height));

        let deriver = AccountDeriver::new(&chain().address_prefix);
        for i in 0..7 {
            let address = deriver.address(i).unwrap();
            assert_eq!(ledger.balance(address.as_str()), FUND_AMOUNT, "worker {i}");
        }
        let seed = ledger
            .account(seed_identity().address().as_str())
            .unwrap();
        assert_eq!(seed.sequence, 3);
    }

    #[tokio::test]
    async fn second_run_is_a_no_op() {
        let (ledger, url) = ledger().await;
        FundingPlanner::new(client(&url), seed_config(&url, 4, 50))
            .unwrap()
            .run()
            .await
            .unwrap();
        let broadcasts = ledger.broadcasts();

        let report = FundingPlanner::new(client(&url), seed_config(&url, 4, 50))
            .unwrap()
            .run()
            .await
            .unwrap();
        assert!(report.batches.is_empty());
        assert_eq!(report.already_funded, 4);
        assert_eq!(ledger.broadcasts(), broadcasts);
    }

    #[tokio::test]
    async fn only_new_workers_are_funded() {
        let (ledger, url) = ledger().await;
        FundingPlanner::new(client(&url), seed_config(&url, 2, 50))
            .unwrap()
            .run()
            .await
            .unwrap();

        let report = FundingPlanner::new(client(&url), seed_config(&url, 5, 50))
            .unwrap()
            .run()
            .await
            .unwrap();
        assert_eq!(report.already_funded, 2);
        assert_eq!(report.funded(), 3);

        let deriver = AccountDeriver::new(&chain().address_prefix);
        let first = deriver.address(0).unwrap();
        assert_eq!(ledger.balance(first.as_str()), FUND_AMOUNT);
    }

    #[tokio::test]
    async fn poor_seed_broadcasts_nothing() {
        init();
        let ledger = mock_ledger::MockLedger::new(chain());
        ledger.fund(seed_identity().address().as_str(), FUND_AMOUNT);
        let url = ledger.spawn().await.unwrap();

        let err = FundingPlanner::new(client(&url), seed_config(&url, 10, 50))
            .unwrap()
            .run()
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            SeedError::InsufficientFunds { available, .. } if available == FUND_AMOUNT
        ));
        assert_eq!(ledger.broadcasts(), 0);
    }

    #[tokio::test]
    #[ntest::timeout(10_000)]
    async fn unconfirmed_batch_times_out() {
        let (ledger, url) = ledger().await;
        ledger.set_never_include(true);
        let mut config = seed_config(&url, 4, 2);
        config.confirmation.timeout = Duration::from_millis(300);

        let err = FundingPlanner::new(client(&url), config)
            .unwrap()
            .run()
            .await
            .unwrap_err();
        assert!(matches!(err, SeedError::ConfirmationTimeout { .. }));
        // The second batch is never attempted.
        assert_eq!(ledger.broadcasts(), 1);
    }
}
