//! Signing backend seam
//!
//! All ring-signature, key-image and commitment work happens behind
//! [`SigningBackend`]. A backend hands out one [`BackendSession`] per
//! transaction; the session owns whatever native state the backend needs and
//! releases it in `Drop`, so finalizing (which consumes the session) and
//! abandoning a build both free it exactly once.
//!
//! Backends report two recoverable failures, [`BackendError::InvalidInput`]
//! and [`BackendError::AttestationVerificationFailed`]. Anything else, and any
//! malformed success payload, means the backend broke its contract. The
//! operation is logged and aborted with a panic.

use std::collections::BTreeMap;
use std::fmt;

use rand::RngCore;
use serde::{Deserialize, Serialize};

use crate::amount::Amount;
use crate::keys::{AccountKey, PublicAddress, RistrettoPrivate, RistrettoPublic};
use crate::logging::Redacted;
use crate::records::{RingMember, TxOutBytes};
use crate::Error;
use veil_params::BlockVersion;

/// Failure reported by a signing backend
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BackendError {
    /// Backend rejected the call's arguments
    #[error("invalid input: {0}")]
    InvalidInput(String),
    /// Backend could not verify a fog report signature
    #[error("attestation verification failed: {0}")]
    AttestationVerificationFailed(String),
    /// Undocumented failure
    #[error("backend error {code}: {message}")]
    Other {
        /// Backend-specific code
        code: i32,
        /// Backend message
        message: String,
    },
}

/// Backend call, for error mapping
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendOp {
    /// `add_input`
    AddInput,
    /// `add_output`
    AddOutput,
    /// `add_change_output`
    AddChangeOutput,
    /// `finalize`
    Finalize,
}

impl BackendOp {
    /// Only output construction consults fog reports
    fn may_fail_attestation(self) -> bool {
        matches!(self, BackendOp::AddOutput | BackendOp::AddChangeOutput)
    }
}

impl fmt::Display for BackendOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendOp::AddInput => write!(f, "add_input"),
            BackendOp::AddOutput => write!(f, "add_output"),
            BackendOp::AddChangeOutput => write!(f, "add_change_output"),
            BackendOp::Finalize => write!(f, "finalize"),
        }
    }
}

/// Abort on a backend contract violation
pub(crate) fn contract_violation(op: BackendOp, detail: impl fmt::Display) -> ! {
    tracing::error!("Signing backend violated its contract in {}: {}", op, Redacted(detail));
    panic!("signing backend contract violation in {op}");
}

/// Map a backend failure to the public error, aborting on undocumented ones
pub(crate) fn map_backend_error(op: BackendOp, err: BackendError) -> Error {
    match err {
        BackendError::InvalidInput(reason) => Error::InvalidInput(reason),
        BackendError::AttestationVerificationFailed(reason) if op.may_fail_attestation() => {
            tracing::warn!("Attestation verification failed in {}", op);
            Error::AttestationVerificationFailed(reason)
        }
        other => contract_violation(op, other),
    }
}

/// Receipt confirmation number for one output
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConfirmationNumber(#[serde(with = "hex")] pub [u8; 32]);

impl fmt::Debug for ConfirmationNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ConfirmationNumber({})", hex::encode(self.0))
    }
}

/// What the backend returns for a constructed output
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputArtifact {
    /// Serialized output
    pub tx_out: TxOutBytes,
    /// One-time public key of the output
    pub tx_out_public_key: RistrettoPublic,
    /// Proof-of-payment confirmation number
    pub confirmation_number: ConfirmationNumber,
    /// Shared secret with the recipient
    pub shared_secret: RistrettoPublic,
}

/// Fog report responses, keyed by report URL
///
/// Opaque to this crate; the backend verifies and consumes them when a
/// recipient has fog reporting enabled.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FogResolver {
    reports: BTreeMap<String, Vec<u8>>,
}

impl FogResolver {
    /// Resolver without reports
    pub fn new() -> Self {
        Self::default()
    }

    /// Add the report response for a URL
    pub fn with_report(mut self, report_url: impl Into<String>, response: Vec<u8>) -> Self {
        self.reports.insert(report_url.into(), response);
        self
    }

    /// Report response for a URL
    pub fn report(&self, report_url: &str) -> Option<&[u8]> {
        self.reports.get(report_url).map(Vec::as_slice)
    }

    /// Report response for a recipient, `None` for recipients without fog
    pub fn report_for(&self, recipient: &PublicAddress) -> Option<&[u8]> {
        recipient
            .fog_info
            .as_ref()
            .and_then(|fog| self.report(&fog.report_url))
    }

    /// Number of report responses
    pub fn len(&self) -> usize {
        self.reports.len()
    }

    /// No report responses
    pub fn is_empty(&self) -> bool {
        self.reports.is_empty()
    }
}

/// Per-transaction backend parameters
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionParams {
    /// Fee and the transaction's token
    pub fee: Amount,
    /// Last block the transaction is valid in
    pub tombstone_block_index: u64,
    /// Fog reports for the recipients
    pub fog_resolver: FogResolver,
    /// Block version the transaction targets
    pub block_version: BlockVersion,
}

/// Cryptographic transaction construction
pub trait SigningBackend {
    /// Per-transaction state
    type Session: BackendSession;

    /// Start a transaction
    fn create_session(&self, params: SessionParams) -> Self::Session;
}

/// One transaction's backend state
pub trait BackendSession {
    /// Add a ring input spending `ring[real_input_index]`
    fn add_input(
        &mut self,
        view_private_key: &RistrettoPrivate,
        subaddress_spend_private_key: &RistrettoPrivate,
        real_input_index: usize,
        ring: &[RingMember],
    ) -> Result<(), BackendError>;

    /// Add a payment output
    fn add_output(
        &mut self,
        recipient: &PublicAddress,
        amount: u64,
        rng: &mut dyn RngCore,
    ) -> Result<OutputArtifact, BackendError>;

    /// Add the output returning change to the account
    fn add_change_output(
        &mut self,
        account_key: &AccountKey,
        amount: u64,
        rng: &mut dyn RngCore,
    ) -> Result<OutputArtifact, BackendError>;

    /// Sign and serialize the transaction
    fn finalize(self, rng: &mut dyn RngCore) -> Result<Vec<u8>, BackendError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::FogInfo;

    #[test]
    fn test_recoverable_errors_pass_through() {
        let err = map_backend_error(BackendOp::AddInput, BackendError::InvalidInput("ring".into()));
        assert!(matches!(err, Error::InvalidInput(reason) if reason == "ring"));

        let err = map_backend_error(
            BackendOp::AddOutput,
            BackendError::AttestationVerificationFailed("report".into()),
        );
        assert!(matches!(err, Error::AttestationVerificationFailed(_)));
    }

    #[test]
    #[should_panic(expected = "contract violation in finalize")]
    fn test_undocumented_error_panics() {
        map_backend_error(
            BackendOp::Finalize,
            BackendError::Other {
                code: 99,
                message: "boom".into(),
            },
        );
    }

    #[test]
    #[should_panic(expected = "contract violation in add_input")]
    fn test_attestation_failure_from_input_panics() {
        map_backend_error(
            BackendOp::AddInput,
            BackendError::AttestationVerificationFailed("unexpected".into()),
        );
    }

    #[test]
    fn test_fog_resolver_lookup() {
        let resolver = FogResolver::new().with_report("fog://report.example", vec![1, 2, 3]);
        let key = RistrettoPublic::from_bytes([4; 32]);
        let plain = PublicAddress::new(key, key);
        let fogged = plain.clone().with_fog(FogInfo {
            report_url: "fog://report.example".into(),
            report_id: String::new(),
        });

        assert_eq!(resolver.len(), 1);
        assert!(resolver.report_for(&plain).is_none());
        assert_eq!(resolver.report_for(&fogged), Some(&[1u8, 2, 3][..]));
    }
}
