//! Integration tests for the asynchronous estimator
//!
//! Covers snapshot timing, completion delivery, and fee caching

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{mpsc, oneshot, Notify};
use veil_core::testing::{record, CountingFeeOracle, FailingFeeOracle};
use veil_core::{
    Amount, CachingFeeOracle, ConnectionError, Error, FeeLevel, FeeOracle, FeeStrategy,
    FixedFeeStrategy, SharedAccount, TokenId, TransactionEstimator, TxOutSelector,
};

/// Oracle that holds every fetch until released
#[derive(Debug)]
struct GatedFeeOracle {
    fee: u64,
    entered: Notify,
    release: Notify,
}

impl GatedFeeOracle {
    fn new(fee: u64) -> Self {
        Self {
            fee,
            entered: Notify::new(),
            release: Notify::new(),
        }
    }
}

#[async_trait]
impl FeeOracle for GatedFeeOracle {
    async fn fee_strategy(
        &self,
        _level: FeeLevel,
        _token_id: TokenId,
    ) -> Result<Arc<dyn FeeStrategy>, ConnectionError> {
        self.entered.notify_one();
        self.release.notified().await;
        Ok(Arc::new(FixedFeeStrategy::new(self.fee)))
    }
}

fn mob(value: u64) -> Amount {
    Amount::new(value, TokenId::MOB)
}

// ============================================================================
// Snapshot Timing
// ============================================================================

#[tokio::test]
async fn test_snapshot_taken_after_fee_arrives() {
    let account = SharedAccount::from_records(vec![record(100, 0)]);
    let oracle = Arc::new(GatedFeeOracle::new(10));
    let estimator = TransactionEstimator::from_shared(
        Arc::new(account.clone()),
        Arc::clone(&oracle),
        TxOutSelector::new(16),
    );

    let task = tokio::spawn({
        let estimator = estimator.clone();
        async move {
            estimator
                .amount_transferable(TokenId::MOB, FeeLevel::Minimum)
                .await
        }
    });

    // Record arrives while the fee fetch is in flight
    oracle.entered.notified().await;
    account.insert(record(50, 1));
    oracle.release.notify_one();

    assert_eq!(task.await.unwrap().unwrap(), 140);
}

#[tokio::test]
async fn test_spent_records_drop_out_of_later_estimates() {
    let account = SharedAccount::from_records(vec![record(100, 0), record(50, 1)]);
    let estimator = TransactionEstimator::from_shared(
        Arc::new(account.clone()),
        Arc::new(CountingFeeOracle::fixed(10)),
        TxOutSelector::new(16),
    );

    let before = estimator
        .amount_transferable(TokenId::MOB, FeeLevel::Minimum)
        .await
        .unwrap();
    assert_eq!(before, 140);

    let spent = record(100, 0).key_image;
    assert_eq!(account.mark_spent(&[spent]), 1);

    let after = estimator
        .amount_transferable(TokenId::MOB, FeeLevel::Minimum)
        .await
        .unwrap();
    assert_eq!(after, 40);
}

// ============================================================================
// Completion Delivery
// ============================================================================

#[tokio::test]
async fn test_concurrent_completions_all_delivered() {
    let account = SharedAccount::from_records((0..8).map(|i| record(100, i)));
    let estimator = TransactionEstimator::new(
        account,
        CountingFeeOracle::fixed(5),
        TxOutSelector::new(16),
    );
    let (tx, mut rx) = mpsc::unbounded_channel();

    for amount in 1..=20u64 {
        let tx = tx.clone();
        estimator.estimate_total_fee_with_completion(
            mob(amount * 10),
            FeeLevel::Minimum,
            move |result| {
                let _ = tx.send((amount, result));
            },
        );
    }
    drop(tx);

    let mut seen = Vec::new();
    while let Some((amount, result)) = rx.recv().await {
        assert_eq!(result.unwrap(), 5);
        seen.push(amount);
    }
    seen.sort_unstable();
    assert_eq!(seen, (1..=20).collect::<Vec<_>>());
}

#[tokio::test]
async fn test_zero_amount_completions_skip_oracle() {
    let oracle = Arc::new(CountingFeeOracle::fixed(5));
    let estimator = TransactionEstimator::from_shared(
        Arc::new(SharedAccount::from_records(vec![record(100, 0)])),
        Arc::clone(&oracle),
        TxOutSelector::new(16),
    );
    let (fee_tx, mut fee_rx) = mpsc::unbounded_channel();
    let (defrag_tx, mut defrag_rx) = mpsc::unbounded_channel();

    estimator.estimate_total_fee_with_completion(mob(0), FeeLevel::Minimum, move |r| {
        let _ = fee_tx.send(r);
    });
    estimator.requires_defragmentation_with_completion(mob(0), FeeLevel::Minimum, move |r| {
        let _ = defrag_tx.send(r);
    });

    assert!(matches!(fee_rx.recv().await.unwrap(), Err(Error::InvalidInput(_))));
    assert!(matches!(defrag_rx.recv().await.unwrap(), Err(Error::InvalidInput(_))));
    assert_eq!(oracle.calls(), 0);
}

#[tokio::test]
async fn test_completion_reports_connection_failure() {
    let oracle = Arc::new(FailingFeeOracle::new(ConnectionError::Timeout));
    let estimator = TransactionEstimator::from_shared(
        Arc::new(SharedAccount::from_records(vec![record(100, 0)])),
        Arc::clone(&oracle),
        TxOutSelector::new(16),
    );
    let (tx, mut rx) = mpsc::unbounded_channel();

    estimator.amount_transferable_with_completion(TokenId::MOB, FeeLevel::Priority, move |r| {
        let _ = tx.send(r);
    });

    let err = rx.recv().await.unwrap().unwrap_err();
    assert!(matches!(err, Error::Connection(ConnectionError::Timeout)));
    assert!(err.is_retryable());
    assert_eq!(oracle.calls(), 1);
}

#[tokio::test]
async fn test_defrag_completion_matches_direct_call() {
    let account = SharedAccount::from_records((0..3).map(|i| record(10, i)));
    let estimator = TransactionEstimator::new(
        account,
        CountingFeeOracle::fixed(2),
        TxOutSelector::new(2),
    );
    let (tx, mut rx) = mpsc::unbounded_channel();

    estimator.requires_defragmentation_with_completion(mob(25), FeeLevel::Minimum, move |r| {
        let _ = tx.send(r);
    });

    let delivered = rx.recv().await.unwrap().unwrap();
    let direct = estimator
        .requires_defragmentation(mob(25), FeeLevel::Minimum)
        .await
        .unwrap();
    assert!(delivered);
    assert_eq!(delivered, direct);
}

#[tokio::test]
async fn test_panicking_completion_does_not_block_later_ones() {
    let estimator = TransactionEstimator::new(
        SharedAccount::from_records(vec![record(100, 0)]),
        CountingFeeOracle::fixed(5),
        TxOutSelector::new(16),
    );

    let (panicked_tx, panicked_rx) = oneshot::channel();
    estimator.estimate_total_fee_with_completion(mob(10), FeeLevel::Minimum, move |_| {
        let _ = panicked_tx.send(());
        panic!("completion handler bug");
    });
    panicked_rx.await.unwrap();

    let (tx, rx) = oneshot::channel();
    estimator.estimate_total_fee_with_completion(mob(10), FeeLevel::Minimum, move |r| {
        let _ = tx.send(r);
    });
    assert_eq!(rx.await.unwrap().unwrap(), 5);
}

#[test]
fn test_completions_survive_runtime_restart() {
    let estimator = TransactionEstimator::new(
        SharedAccount::from_records(vec![record(100, 0)]),
        CountingFeeOracle::fixed(5),
        TxOutSelector::new(16),
    );

    for _ in 0..2 {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        let fee = runtime.block_on(async {
            let (tx, rx) = oneshot::channel();
            estimator.estimate_total_fee_with_completion(mob(10), FeeLevel::Minimum, move |r| {
                let _ = tx.send(r);
            });
            rx.await.unwrap()
        });
        assert_eq!(fee.unwrap(), 5);
    }
}

// ============================================================================
// Fee Caching
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_cached_fee_reused_until_ttl() {
    let oracle = Arc::new(CachingFeeOracle::new(
        CountingFeeOracle::fixed(3),
        Duration::from_secs(60),
    ));
    let estimator = TransactionEstimator::from_shared(
        Arc::new(SharedAccount::from_records(vec![record(100, 0)])),
        Arc::clone(&oracle),
        TxOutSelector::new(16),
    );

    for _ in 0..3 {
        let fee = estimator
            .estimate_total_fee(mob(50), FeeLevel::Minimum)
            .await
            .unwrap();
        assert_eq!(fee, 3);
    }
    assert_eq!(oracle.inner().calls(), 1);

    tokio::time::advance(Duration::from_secs(61)).await;
    estimator
        .estimate_total_fee(mob(50), FeeLevel::Minimum)
        .await
        .unwrap();
    assert_eq!(oracle.inner().calls(), 2);

    // Levels are cached separately
    estimator
        .estimate_total_fee(mob(50), FeeLevel::Standard)
        .await
        .unwrap();
    assert_eq!(oracle.inner().calls(), 3);
}
