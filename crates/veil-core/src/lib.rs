//! Veil wallet transaction engine
//!
//! This crate implements record selection, fee estimation, and transaction
//! assembly for the Veil privacy wallet. Signing and fee metadata are
//! supplied by collaborators behind the [`SigningBackend`] and [`FeeOracle`]
//! traits.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod account;
pub mod amount;
pub mod backend;
pub mod builder;
pub mod delivery;
pub mod error;
pub mod estimator;
pub mod fees;
pub mod keys;
pub mod logging;
pub mod oracle;
pub mod records;
pub mod selection;

#[cfg(any(test, feature = "test-helpers"))]
pub mod testing;

pub use account::{AccountSnapshotProvider, AccountState, SharedAccount};
pub use amount::{
    safe_compare, safe_compare_value, safe_subtract, safe_subtract_value, safe_sum, Amount,
    AmountError, Comparison, PositiveU64, TokenId,
};
pub use backend::{
    BackendError, BackendSession, ConfirmationNumber, FogResolver, OutputArtifact, SessionParams,
    SigningBackend,
};
pub use builder::{
    OutputRequest, PendingSinglePayloadTransaction, PendingTransaction, ProposalContext, Receipt,
    Transaction, TransactionBuilder, TransactionProposer, TxId, TxOutContext,
};
pub use delivery::DeliveryQueue;
pub use error::{Error, ErrorCategory, Result};
pub use estimator::TransactionEstimator;
pub use fees::{
    FeeLevel, FeeStrategy, FixedFeeStrategy, ShapeFeeStrategy, TxShape, DEFAULT_EUSD_MINIMUM_FEE,
    DEFAULT_MOB_MINIMUM_FEE,
};
pub use keys::{
    AccountKey, FogInfo, PublicAddress, RistrettoPrivate, RistrettoPublic, CHANGE_SUBADDRESS_INDEX,
    DEFAULT_SUBADDRESS_INDEX,
};
pub use oracle::{CachingFeeOracle, ConnectionError, FeeOracle, StaticFeeOracle};
pub use records::{
    records_from_json, KeyImage, KnownTxOut, MembershipProof, PreparedTxInput, RingMember,
    TxOutBytes,
};
pub use selection::{
    DefragStep, FeeEstimate, SelectionError, SelectionResult, SweepSelection, TxOutSelector,
};
pub use veil_params::{BlockVersion, ProtocolParams};
