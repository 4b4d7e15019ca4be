//! Record selection for transaction building
//!
//! Records are always considered in one documented order: descending value,
//! ties broken by ascending global index. The policy is greedy per call. It
//! spends the fewest, largest records that cover a request and leaves small
//! records for consolidation.
//!
//! When no prefix of at most `max_inputs_per_transaction` records covers a
//! send, the selector simulates defragmentation: the smallest candidates are
//! merged, `max` at a time, into single-output self-sends until the send fits.

use std::cmp::Ordering;

use serde::Serialize;
use veil_params::ProtocolParams;

use crate::amount::{
    safe_compare, safe_subtract, safe_sum, Amount, AmountError, Comparison, TokenId,
};
use crate::fees::{FeeStrategy, TxShape};
use crate::logging::Redacted;
use crate::records::KnownTxOut;

/// Outputs of an ordinary send: recipient plus change
const SEND_OUTPUTS: usize = 2;

/// Outputs of a consolidation or sweep transaction
const SELF_SEND_OUTPUTS: usize = 1;

/// Selector failure
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SelectionError {
    /// Requested amount is zero
    #[error("invalid amount: {0}")]
    InvalidAmount(String),
    /// Records cannot cover the request
    #[error("insufficient balance: {0}")]
    InsufficientBalance(String),
    /// Record values overflow `u64` when summed
    #[error("balance overflow: {0}")]
    BalanceOverflow(String),
    /// Fee alone consumes the balance
    #[error("fee exceeds balance: {0}")]
    FeeExceedsBalance(String),
}

impl From<AmountError> for SelectionError {
    fn from(e: AmountError) -> Self {
        SelectionError::BalanceOverflow(e.to_string())
    }
}

/// Single-transaction selection
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectionResult {
    /// Chosen inputs, in selection order
    pub inputs: Vec<KnownTxOut>,
    /// Sum of the chosen inputs
    pub total_value: u64,
    /// Fee for the transaction shape
    pub fee: u64,
    /// `total_value - outputs - fee`, possibly zero
    pub change: u64,
}

/// Fee estimate for a send, consolidation included
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FeeEstimate {
    /// Fees of all consolidation transactions plus the send
    pub total_fee: u64,
    /// The send needs consolidation first
    pub requires_defrag: bool,
    /// Number of consolidation transactions before the send
    pub defrag_transactions: usize,
}

/// Consolidation transaction spending only existing records
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DefragStep {
    /// Records merged by this transaction
    pub inputs: Vec<KnownTxOut>,
    /// Fee of the consolidation transaction
    pub fee: u64,
    /// Value of the single merged output
    pub output_value: u64,
}

/// Inputs and amount for sending the whole balance
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SweepSelection {
    /// Chosen inputs, in selection order
    pub inputs: Vec<KnownTxOut>,
    /// Fee for `(inputs, 1)`
    pub fee: u64,
    /// Amount the recipient receives
    pub amount: u64,
}

/// Where a simulated candidate came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Source {
    /// Index into the ordered record list
    Record(usize),
    /// Output of an earlier merge step
    Merged(usize),
}

#[derive(Debug, Clone, Copy)]
struct Candidate {
    value: u64,
    source: Source,
    /// Position in the total order; merged outputs sort after all records of equal value
    rank: u64,
}

#[derive(Debug)]
struct Merge {
    sources: Vec<Source>,
    fee: u64,
    output_value: u64,
}

#[derive(Debug)]
struct DefragPlan {
    merges: Vec<Merge>,
    send_fee: u64,
}

/// Record selector
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TxOutSelector {
    max_inputs_per_transaction: usize,
}

impl TxOutSelector {
    /// Create selector
    ///
    /// Limits below 2 are raised to 2; consolidation must shrink the record set.
    pub fn new(max_inputs_per_transaction: usize) -> Self {
        Self {
            max_inputs_per_transaction: max_inputs_per_transaction.max(2),
        }
    }

    /// Selector using the protocol's input limit
    pub fn from_params(params: &ProtocolParams) -> Self {
        Self::new(params.max_inputs_per_transaction)
    }

    /// Input limit
    pub fn max_inputs_per_transaction(&self) -> usize {
        self.max_inputs_per_transaction
    }

    /// Records of one token in selection order
    pub fn selection_order(&self, token_id: TokenId, records: &[KnownTxOut]) -> Vec<KnownTxOut> {
        let mut ordered: Vec<KnownTxOut> = records
            .iter()
            .filter(|r| r.token_id == token_id)
            .cloned()
            .collect();
        ordered.sort_by(compare_records);
        ordered
    }

    /// Largest amount a single recipient could receive from these records
    ///
    /// Maximizes, over the `k` largest records, their sum minus the fee of
    /// spending them, consolidation included once `k` exceeds the input limit.
    pub fn amount_transferable(
        &self,
        token_id: TokenId,
        strategy: &dyn FeeStrategy,
        records: &[KnownTxOut],
    ) -> Result<u64, SelectionError> {
        let ordered = self.selection_order(token_id, records);
        let values: Vec<u64> = ordered.iter().map(|r| r.value).collect();

        let total = safe_sum(&values).map_err(|_| {
            SelectionError::BalanceOverflow(format!(
                "sum of {} records of {} overflows",
                values.len(),
                token_id
            ))
        })?;

        let minimal_fee = strategy.fee(TxShape::new(1, SELF_SEND_OUTPUTS));
        if total <= minimal_fee {
            return Err(SelectionError::FeeExceedsBalance(format!(
                "fee {} covers balance {}",
                minimal_fee, total
            )));
        }

        let mut best: Option<u64> = None;
        let mut prefix = 0u64;
        for (i, &value) in values.iter().enumerate() {
            // Prefixes are bounded by `total`.
            prefix += value;
            let fee = self.sweep_fee(strategy, i + 1);
            if let Some(amount) = prefix.checked_sub(fee).filter(|&a| a > 0) {
                best = Some(best.map_or(amount, |b| b.max(amount)));
            }
        }

        let amount = best.ok_or_else(|| {
            SelectionError::FeeExceedsBalance(format!(
                "no selection of {} records leaves a positive amount",
                values.len()
            ))
        })?;

        tracing::debug!(
            "Transferable {}: {} of {} from {} records",
            token_id,
            Redacted(amount),
            Redacted(total),
            values.len()
        );
        Ok(amount)
    }

    /// Fee to send `amount`, including any consolidation transactions needed first
    pub fn estimate_total_fee(
        &self,
        amount: Amount,
        strategy: &dyn FeeStrategy,
        records: &[KnownTxOut],
    ) -> Result<FeeEstimate, SelectionError> {
        ensure_positive(amount.value)?;
        let ordered = self.selection_order(amount.token_id, records);
        let values: Vec<u64> = ordered.iter().map(|r| r.value).collect();

        if let Some((count, fee)) = self.fit_prefix(&values, amount.value, SEND_OUTPUTS, strategy) {
            tracing::debug!(
                "Send of {} fits in one transaction with {} inputs",
                Redacted(amount),
                count
            );
            return Ok(FeeEstimate {
                total_fee: fee,
                requires_defrag: false,
                defrag_transactions: 0,
            });
        }

        let plan = self.plan_defragmentation(&values, amount.value, strategy)?;
        let total_fee = plan
            .merges
            .iter()
            .try_fold(plan.send_fee, |acc, m| acc.checked_add(m.fee))
            .ok_or_else(|| SelectionError::BalanceOverflow("total fee overflows".to_string()))?;

        tracing::debug!(
            "Send of {} needs {} consolidation transactions, total fee {}",
            Redacted(amount),
            plan.merges.len(),
            total_fee
        );
        Ok(FeeEstimate {
            total_fee,
            requires_defrag: true,
            defrag_transactions: plan.merges.len(),
        })
    }

    /// Select inputs for one transaction paying `amount` to one recipient
    pub fn select_transaction_inputs(
        &self,
        amount: Amount,
        strategy: &dyn FeeStrategy,
        records: &[KnownTxOut],
    ) -> Result<SelectionResult, SelectionError> {
        self.select_for_outputs(amount.token_id, &[amount.value], strategy, records)
    }

    /// Select inputs for one transaction paying every amount in `amounts`
    ///
    /// The fee is evaluated for `amounts.len() + 1` outputs, change included.
    pub fn select_for_outputs(
        &self,
        token_id: TokenId,
        amounts: &[u64],
        strategy: &dyn FeeStrategy,
        records: &[KnownTxOut],
    ) -> Result<SelectionResult, SelectionError> {
        if amounts.is_empty() {
            return Err(SelectionError::InvalidAmount("no outputs requested".to_string()));
        }
        for &value in amounts {
            ensure_positive(value)?;
        }
        let outlay = safe_sum(amounts).map_err(|_| {
            SelectionError::BalanceOverflow("requested amounts overflow".to_string())
        })?;

        let mut ordered = self.selection_order(token_id, records);
        let values: Vec<u64> = ordered.iter().map(|r| r.value).collect();
        let num_outputs = amounts.len() + 1;

        let Some((count, fee)) = self.fit_prefix(&values, outlay, num_outputs, strategy) else {
            let fee = strategy.fee(TxShape::new(1, num_outputs));
            let reason = if safe_compare(&values, Comparison::GreaterOrEqual, &[outlay, fee]) {
                format!(
                    "{} largest records do not cover {} plus fee; defragmentation required",
                    self.max_inputs_per_transaction.min(values.len()),
                    outlay
                )
            } else {
                format!("balance does not cover {} plus fee", outlay)
            };
            return Err(SelectionError::InsufficientBalance(reason));
        };

        ordered.truncate(count);
        let total_value = safe_sum(&values[..count])?;
        let change = safe_subtract(&[total_value], &[outlay, fee])?;

        tracing::info!(
            "Selected {} inputs, total={}, fee={}, change={}",
            count,
            Redacted(total_value),
            fee,
            Redacted(change)
        );
        Ok(SelectionResult {
            inputs: ordered,
            total_value,
            fee,
            change,
        })
    }

    /// Consolidation transactions that can be built now, from existing records only
    ///
    /// Empty when the send already fits in one transaction. Later steps that
    /// would spend merged outputs are left for after these land on the ledger.
    pub fn select_inputs_for_defragmentation(
        &self,
        amount: Amount,
        strategy: &dyn FeeStrategy,
        records: &[KnownTxOut],
    ) -> Result<Vec<DefragStep>, SelectionError> {
        ensure_positive(amount.value)?;
        let ordered = self.selection_order(amount.token_id, records);
        let values: Vec<u64> = ordered.iter().map(|r| r.value).collect();

        if self.fit_prefix(&values, amount.value, SEND_OUTPUTS, strategy).is_some() {
            return Ok(Vec::new());
        }

        let plan = self.plan_defragmentation(&values, amount.value, strategy)?;
        let steps = plan
            .merges
            .into_iter()
            .filter_map(|merge| {
                let inputs = merge
                    .sources
                    .iter()
                    .map(|source| match source {
                        Source::Record(i) => Some(ordered[*i].clone()),
                        Source::Merged(_) => None,
                    })
                    .collect::<Option<Vec<_>>>()?;
                Some(DefragStep {
                    inputs,
                    fee: merge.fee,
                    output_value: merge.output_value,
                })
            })
            .collect();
        Ok(steps)
    }

    /// Select the largest records one transaction can spend, to send everything
    pub fn select_inputs_for_sweep(
        &self,
        token_id: TokenId,
        strategy: &dyn FeeStrategy,
        records: &[KnownTxOut],
    ) -> Result<SweepSelection, SelectionError> {
        let mut ordered = self.selection_order(token_id, records);
        if ordered.is_empty() {
            return Err(SelectionError::InsufficientBalance(format!(
                "no spendable {} records",
                token_id
            )));
        }
        ordered.truncate(self.max_inputs_per_transaction);

        let values: Vec<u64> = ordered.iter().map(|r| r.value).collect();
        let total = safe_sum(&values)?;
        let fee = strategy.fee(TxShape::new(ordered.len(), SELF_SEND_OUTPUTS));
        let amount = total.checked_sub(fee).filter(|&a| a > 0).ok_or_else(|| {
            SelectionError::FeeExceedsBalance(format!("fee {} covers balance {}", fee, total))
        })?;

        Ok(SweepSelection {
            inputs: ordered,
            fee,
            amount,
        })
    }

    /// Smallest `k <= max` whose ordered prefix covers `outlay + fee(k, outputs)`
    fn fit_prefix(
        &self,
        values: &[u64],
        outlay: u64,
        num_outputs: usize,
        strategy: &dyn FeeStrategy,
    ) -> Option<(usize, u64)> {
        let limit = self.max_inputs_per_transaction.min(values.len());
        (1..=limit).find_map(|k| {
            let fee = strategy.fee(TxShape::new(k, num_outputs));
            safe_compare(&values[..k], Comparison::GreaterOrEqual, &[outlay, fee])
                .then_some((k, fee))
        })
    }

    /// Fee of sending the `k` largest records to one recipient, consolidating first if needed
    fn sweep_fee(&self, strategy: &dyn FeeStrategy, k: usize) -> u64 {
        let max = self.max_inputs_per_transaction;
        if k <= max {
            return strategy.fee(TxShape::new(k, SELF_SEND_OUTPUTS));
        }
        // Each merge of `max` inputs leaves one output, shrinking the set by `max - 1`.
        let merges = (k - max).div_ceil(max - 1);
        let remaining = k - merges * (max - 1);
        let merge_fee = strategy.fee(TxShape::new(max, SELF_SEND_OUTPUTS));
        let merges = u64::try_from(merges).unwrap_or(u64::MAX);
        merge_fee
            .saturating_mul(merges)
            .saturating_add(strategy.fee(TxShape::new(remaining, SELF_SEND_OUTPUTS)))
    }

    /// Merge the smallest candidates until the send of `outlay` fits
    fn plan_defragmentation(
        &self,
        values: &[u64],
        outlay: u64,
        strategy: &dyn FeeStrategy,
    ) -> Result<DefragPlan, SelectionError> {
        if values.is_empty() {
            return Err(SelectionError::InsufficientBalance("no spendable records".to_string()));
        }

        let max = self.max_inputs_per_transaction;
        let mut pool: Vec<Candidate> = values
            .iter()
            .enumerate()
            .map(|(i, &value)| Candidate {
                value,
                source: Source::Record(i),
                rank: i as u64,
            })
            .collect();
        let mut merges: Vec<Merge> = Vec::new();

        loop {
            pool.sort_by(compare_candidates);
            let pool_values: Vec<u64> = pool.iter().map(|c| c.value).collect();
            let fit = self.fit_prefix(&pool_values, outlay, SEND_OUTPUTS, strategy);
            if let Some((_, send_fee)) = fit {
                return Ok(DefragPlan { merges, send_fee });
            }

            if pool.len() < 2 {
                return Err(SelectionError::InsufficientBalance(format!(
                    "balance does not cover {} plus fee after {} consolidation transactions",
                    outlay,
                    merges.len()
                )));
            }

            let batch = max.min(pool.len());
            let merged: Vec<Candidate> = pool.split_off(pool.len() - batch);
            let merged_values: Vec<u64> = merged.iter().map(|c| c.value).collect();
            let fee = strategy.fee(TxShape::new(batch, SELF_SEND_OUTPUTS));

            let output_value = match safe_subtract(&merged_values, &[fee]) {
                Ok(value) if value > 0 => value,
                Ok(_) | Err(AmountError::Underflow) => {
                    return Err(SelectionError::InsufficientBalance(format!(
                        "consolidating {} records does not cover its fee {}",
                        batch, fee
                    )));
                }
                Err(AmountError::Overflow) => {
                    return Err(SelectionError::BalanceOverflow(
                        "consolidated value overflows".to_string(),
                    ));
                }
            };

            let step = merges.len();
            merges.push(Merge {
                sources: merged.iter().map(|c| c.source).collect(),
                fee,
                output_value,
            });
            pool.push(Candidate {
                value: output_value,
                source: Source::Merged(step),
                rank: values.len() as u64 + step as u64,
            });
        }
    }
}

impl Default for TxOutSelector {
    fn default() -> Self {
        Self::from_params(&ProtocolParams::default())
    }
}

fn ensure_positive(value: u64) -> Result<(), SelectionError> {
    if value == 0 {
        return Err(SelectionError::InvalidAmount("amount must be positive".to_string()));
    }
    Ok(())
}

fn compare_records(a: &KnownTxOut, b: &KnownTxOut) -> Ordering {
    b.value
        .cmp(&a.value)
        .then_with(|| a.global_index.cmp(&b.global_index))
}

fn compare_candidates(a: &Candidate, b: &Candidate) -> Ordering {
    b.value.cmp(&a.value).then_with(|| a.rank.cmp(&b.rank))
}
