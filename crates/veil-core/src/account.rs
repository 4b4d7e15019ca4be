//! Account state shared between the scanner and the estimator
//!
//! The scanner writes records under the write lock. Readers take the read
//! lock only long enough to clone a snapshot of the records they need and
//! never hold it across an await or a selection.

use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::amount::{safe_sum, TokenId};
use crate::records::{KeyImage, KnownTxOut};
use crate::{Error, Result};

/// Lock-scoped source of spendable records
pub trait AccountSnapshotProvider: Send + Sync {
    /// Copy of the spendable records for a token
    fn spendable_records(&self, token_id: TokenId) -> Vec<KnownTxOut>;
}

/// Unspent records known to the account, keyed by key image
#[derive(Debug, Clone, Default)]
pub struct AccountState {
    unspent: BTreeMap<KeyImage, KnownTxOut>,
}

impl AccountState {
    /// Empty state
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a newly observed output; returns `false` if it was already known
    pub fn insert(&mut self, record: KnownTxOut) -> bool {
        match self.unspent.entry(record.key_image) {
            std::collections::btree_map::Entry::Occupied(_) => false,
            std::collections::btree_map::Entry::Vacant(slot) => {
                slot.insert(record);
                true
            }
        }
    }

    /// Remove a spent output
    pub fn mark_spent(&mut self, key_image: &KeyImage) -> Option<KnownTxOut> {
        self.unspent.remove(key_image)
    }

    /// Unspent records of one token
    pub fn records(&self, token_id: TokenId) -> Vec<KnownTxOut> {
        self.unspent
            .values()
            .filter(|r| r.token_id == token_id)
            .cloned()
            .collect()
    }

    /// Number of unspent records across tokens
    pub fn len(&self) -> usize {
        self.unspent.len()
    }

    /// No unspent records
    pub fn is_empty(&self) -> bool {
        self.unspent.is_empty()
    }

    /// Checked balance of one token
    pub fn balance(&self, token_id: TokenId) -> Result<u64> {
        let values: Vec<u64> = self
            .unspent
            .values()
            .filter(|r| r.token_id == token_id)
            .map(|r| r.value)
            .collect();
        safe_sum(&values)
            .map_err(|e| Error::BalanceOverflow(format!("{} balance: {}", token_id, e)))
    }
}

/// Account state behind a reader/writer lock
#[derive(Debug, Clone, Default)]
pub struct SharedAccount {
    state: Arc<RwLock<AccountState>>,
}

impl SharedAccount {
    /// Wrap existing state
    pub fn new(state: AccountState) -> Self {
        Self {
            state: Arc::new(RwLock::new(state)),
        }
    }

    /// Account holding `records`
    pub fn from_records(records: impl IntoIterator<Item = KnownTxOut>) -> Self {
        let mut state = AccountState::new();
        for record in records {
            state.insert(record);
        }
        Self::new(state)
    }

    /// Add an observed output
    pub fn insert(&self, record: KnownTxOut) -> bool {
        self.state.write().insert(record)
    }

    /// Remove outputs consumed by a submitted transaction
    pub fn mark_spent(&self, key_images: &[KeyImage]) -> usize {
        let mut state = self.state.write();
        key_images
            .iter()
            .filter(|image| state.mark_spent(image).is_some())
            .count()
    }

    /// Checked balance of one token
    pub fn balance(&self, token_id: TokenId) -> Result<u64> {
        self.state.read().balance(token_id)
    }
}

impl AccountSnapshotProvider for SharedAccount {
    fn spendable_records(&self, token_id: TokenId) -> Vec<KnownTxOut> {
        let records = self.state.read().records(token_id);
        tracing::debug!("Snapshot of {} {} records", records.len(), token_id);
        records
    }
}

impl<T: AccountSnapshotProvider + ?Sized> AccountSnapshotProvider for Arc<T> {
    fn spendable_records(&self, token_id: TokenId) -> Vec<KnownTxOut> {
        (**self).spendable_records(token_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::record;

    #[test]
    fn test_insert_and_mark_spent() {
        let account = SharedAccount::new(AccountState::new());
        let first = record(10, 1);
        let image = first.key_image;

        assert!(account.insert(first.clone()));
        assert!(!account.insert(first));
        assert!(account.insert(record(20, 2)));
        assert_eq!(account.balance(TokenId::MOB).unwrap(), 30);

        assert_eq!(account.mark_spent(&[image, image]), 1);
        assert_eq!(account.balance(TokenId::MOB).unwrap(), 20);
    }

    #[test]
    fn test_snapshot_filters_token() {
        let eusd = KnownTxOut {
            token_id: TokenId::EUSD,
            ..record(7, 3)
        };
        let account = SharedAccount::from_records(vec![record(5, 1), eusd]);

        let snapshot = account.spendable_records(TokenId::EUSD);
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0].value, 7);
    }

    #[test]
    fn test_balance_overflow() {
        let account = SharedAccount::from_records(vec![record(u64::MAX, 1), record(1, 2)]);
        assert!(matches!(account.balance(TokenId::MOB), Err(Error::BalanceOverflow(_))));
    }

    #[test]
    fn test_snapshot_does_not_hold_lock() {
        let account = SharedAccount::from_records(vec![record(5, 1)]);
        let snapshot = account.spendable_records(TokenId::MOB);

        // A writer proceeds while the snapshot is still alive.
        assert!(account.insert(record(6, 2)));
        assert_eq!(snapshot.len(), 1);
    }
}
