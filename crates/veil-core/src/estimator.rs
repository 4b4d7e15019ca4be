//! Asynchronous transaction estimation
//!
//! Every estimate follows the same steps:
//!
//! 1. Reject a zero amount without touching the network.
//! 2. Fetch the fee strategy for (level, token) from the oracle.
//! 3. Snapshot the spendable records, holding the account lock only for the copy.
//! 4. Run the selector on the snapshot.
//!
//! The snapshot is whichever state is current when the fee arrives, not when
//! the call was made. No causal pinning across the await is attempted.

use std::future::Future;
use std::sync::Arc;

use crate::account::AccountSnapshotProvider;
use crate::amount::{Amount, TokenId};
use crate::delivery::DeliveryQueue;
use crate::fees::{FeeLevel, FeeStrategy};
use crate::logging::Redacted;
use crate::oracle::FeeOracle;
use crate::records::KnownTxOut;
use crate::selection::{FeeEstimate, SelectionError, TxOutSelector};
use crate::{Error, Result};

/// Fee and balance estimates for an account
pub struct TransactionEstimator<P, O> {
    provider: Arc<P>,
    oracle: Arc<O>,
    selector: TxOutSelector,
    delivery: Arc<DeliveryQueue>,
}

impl<P, O> Clone for TransactionEstimator<P, O> {
    fn clone(&self) -> Self {
        Self {
            provider: Arc::clone(&self.provider),
            oracle: Arc::clone(&self.oracle),
            selector: self.selector,
            delivery: Arc::clone(&self.delivery),
        }
    }
}

impl<P, O> TransactionEstimator<P, O>
where
    P: AccountSnapshotProvider + 'static,
    O: FeeOracle + 'static,
{
    /// Create estimator
    pub fn new(provider: P, oracle: O, selector: TxOutSelector) -> Self {
        Self::from_shared(Arc::new(provider), Arc::new(oracle), selector)
    }

    /// Create estimator over shared collaborators
    pub fn from_shared(provider: Arc<P>, oracle: Arc<O>, selector: TxOutSelector) -> Self {
        Self {
            provider,
            oracle,
            selector,
            delivery: Arc::new(DeliveryQueue::new()),
        }
    }

    /// Selector used for every estimate
    pub fn selector(&self) -> &TxOutSelector {
        &self.selector
    }

    /// Largest amount one recipient could receive, after fees
    pub async fn amount_transferable(&self, token_id: TokenId, level: FeeLevel) -> Result<u64> {
        let (strategy, records) = self.fetch(level, token_id).await?;
        let amount = self
            .selector
            .amount_transferable(token_id, strategy.as_ref(), &records)
            .map_err(Error::from)?;

        tracing::info!("Amount transferable ({} {}): {}", level, token_id, Redacted(amount));
        Ok(amount)
    }

    /// Full fee estimate for sending `amount`
    pub async fn estimate(&self, amount: Amount, level: FeeLevel) -> Result<FeeEstimate> {
        ensure_positive(amount)?;
        let (strategy, records) = self.fetch(level, amount.token_id).await?;
        let estimate = self
            .selector
            .estimate_total_fee(amount, strategy.as_ref(), &records)
            .map_err(insufficient_balance)?;

        tracing::info!(
            "Estimated fee for {}: {} (defrag: {})",
            Redacted(amount),
            estimate.total_fee,
            estimate.requires_defrag
        );
        Ok(estimate)
    }

    /// Total fee for sending `amount`, consolidation included
    pub async fn estimate_total_fee(&self, amount: Amount, level: FeeLevel) -> Result<u64> {
        self.estimate(amount, level).await.map(|e| e.total_fee)
    }

    /// Whether sending `amount` needs consolidation first
    pub async fn requires_defragmentation(&self, amount: Amount, level: FeeLevel) -> Result<bool> {
        self.estimate(amount, level).await.map(|e| e.requires_defrag)
    }

    /// [`amount_transferable`](Self::amount_transferable), delivered to `completion`
    ///
    /// Must be called within a Tokio runtime.
    pub fn amount_transferable_with_completion<F>(
        &self,
        token_id: TokenId,
        level: FeeLevel,
        completion: F,
    )
    where
        F: FnOnce(Result<u64>) + Send + 'static,
    {
        self.spawn_with_completion(
            move |this| async move { this.amount_transferable(token_id, level).await },
            completion,
        );
    }

    /// [`estimate_total_fee`](Self::estimate_total_fee), delivered to `completion`
    ///
    /// Must be called within a Tokio runtime.
    pub fn estimate_total_fee_with_completion<F>(
        &self,
        amount: Amount,
        level: FeeLevel,
        completion: F,
    )
    where
        F: FnOnce(Result<u64>) + Send + 'static,
    {
        if let Err(e) = ensure_positive(amount) {
            self.delivery.deliver(move || completion(Err(e)));
            return;
        }
        self.spawn_with_completion(
            move |this| async move { this.estimate_total_fee(amount, level).await },
            completion,
        );
    }

    /// [`requires_defragmentation`](Self::requires_defragmentation), delivered to
    /// `completion`
    ///
    /// Must be called within a Tokio runtime.
    pub fn requires_defragmentation_with_completion<F>(
        &self,
        amount: Amount,
        level: FeeLevel,
        completion: F,
    )
    where
        F: FnOnce(Result<bool>) + Send + 'static,
    {
        if let Err(e) = ensure_positive(amount) {
            self.delivery.deliver(move || completion(Err(e)));
            return;
        }
        self.spawn_with_completion(
            move |this| async move { this.requires_defragmentation(amount, level).await },
            completion,
        );
    }

    async fn fetch(
        &self,
        level: FeeLevel,
        token_id: TokenId,
    ) -> Result<(Arc<dyn FeeStrategy>, Vec<KnownTxOut>)> {
        let strategy = self.oracle.fee_strategy(level, token_id).await.map_err(|e| {
            tracing::warn!("Fee strategy fetch failed for {} {}: {}", level, token_id, e);
            Error::Connection(e)
        })?;
        let records = self.provider.spendable_records(token_id);
        Ok((strategy, records))
    }

    fn spawn_with_completion<T, Op, Fut, F>(&self, op: Op, completion: F)
    where
        T: Send + 'static,
        Op: FnOnce(Self) -> Fut,
        Fut: Future<Output = Result<T>> + Send + 'static,
        F: FnOnce(Result<T>) + Send + 'static,
    {
        let queue = Arc::clone(&self.delivery);
        let future = op(self.clone());
        tokio::spawn(async move {
            let result = future.await;
            queue.deliver(move || completion(result));
        });
    }
}

fn ensure_positive(amount: Amount) -> Result<()> {
    if amount.value == 0 {
        return Err(Error::InvalidInput("amount must be positive".to_string()));
    }
    Ok(())
}

/// Fee and defrag estimates report every selector failure as a balance shortfall
fn insufficient_balance(e: SelectionError) -> Error {
    match e {
        SelectionError::InvalidAmount(reason) => Error::InvalidInput(reason),
        SelectionError::InsufficientBalance(reason)
        | SelectionError::BalanceOverflow(reason)
        | SelectionError::FeeExceedsBalance(reason) => Error::InsufficientBalance(reason),
    }
}
