//! Test doubles for the signing backend and fee oracle
//!
//! Enabled for this crate's tests and, through the `test-helpers` feature,
//! for integration tests and downstream crates.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use rand::RngCore;
use sha2::{Digest, Sha256};

use crate::amount::TokenId;
use crate::backend::{
    BackendError, BackendSession, ConfirmationNumber, OutputArtifact, SessionParams, SigningBackend,
};
use crate::fees::{FeeLevel, FeeStrategy, FixedFeeStrategy};
use crate::keys::{AccountKey, PublicAddress, RistrettoPrivate, RistrettoPublic};
use crate::oracle::{ConnectionError, FeeOracle};
use crate::records::{KeyImage, KnownTxOut, RingMember, TxOutBytes};

/// MOB record on subaddress 0 with identifiers derived from `global_index`
pub fn record(value: u64, global_index: u64) -> KnownTxOut {
    let mut id = [0u8; 32];
    id[..8].copy_from_slice(&global_index.to_le_bytes());
    let mut key = id;
    key[31] = 0x01;

    KnownTxOut {
        value,
        token_id: TokenId::MOB,
        global_index,
        subaddress_index: 0,
        public_key: RistrettoPublic::from_bytes(key),
        key_image: KeyImage(id),
        tx_out: TxOutBytes(global_index.to_le_bytes().to_vec()),
    }
}

#[derive(Debug, Default)]
struct MockState {
    sessions_created: usize,
    sessions_released: usize,
    inputs: usize,
    output_amounts: Vec<u64>,
    change_amounts: Vec<u64>,
    params: Vec<SessionParams>,
}

#[derive(Debug, Clone, Copy, Default)]
struct MockBehavior {
    fail_attestation: bool,
    empty_outputs: bool,
}

/// Deterministic signing backend recording every call
#[derive(Debug, Clone, Default)]
pub struct MockSigningBackend {
    state: Arc<Mutex<MockState>>,
    behavior: MockBehavior,
}

impl MockSigningBackend {
    /// Backend that accepts every call
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject every payment output with an attestation failure
    pub fn failing_attestation(mut self) -> Self {
        self.behavior.fail_attestation = true;
        self
    }

    /// Return empty serialized outputs on success
    pub fn returning_empty_outputs(mut self) -> Self {
        self.behavior.empty_outputs = true;
        self
    }

    /// Sessions opened
    pub fn sessions_created(&self) -> usize {
        self.state.lock().sessions_created
    }

    /// Sessions dropped
    pub fn sessions_released(&self) -> usize {
        self.state.lock().sessions_released
    }

    /// Inputs added across sessions
    pub fn input_count(&self) -> usize {
        self.state.lock().inputs
    }

    /// Payment output amounts, in call order
    pub fn output_amounts(&self) -> Vec<u64> {
        self.state.lock().output_amounts.clone()
    }

    /// Change output amounts, in call order
    pub fn change_amounts(&self) -> Vec<u64> {
        self.state.lock().change_amounts.clone()
    }

    /// Parameters of every opened session
    pub fn session_params(&self) -> Vec<SessionParams> {
        self.state.lock().params.clone()
    }
}

impl SigningBackend for MockSigningBackend {
    type Session = MockSession;

    fn create_session(&self, params: SessionParams) -> MockSession {
        let mut state = self.state.lock();
        state.sessions_created += 1;
        state.params.push(params.clone());

        let mut transcript = Sha256::new();
        transcript.update(params.fee.value.to_le_bytes());
        transcript.update(params.tombstone_block_index.to_le_bytes());
        MockSession {
            state: Arc::clone(&self.state),
            behavior: self.behavior,
            transcript,
            outputs: 0,
        }
    }
}

/// Session of [`MockSigningBackend`]
pub struct MockSession {
    state: Arc<Mutex<MockState>>,
    behavior: MockBehavior,
    transcript: Sha256,
    outputs: u64,
}

impl MockSession {
    fn artifact(&mut self, amount: u64, rng: &mut dyn RngCore) -> OutputArtifact {
        self.outputs += 1;
        self.transcript.update(self.outputs.to_le_bytes());
        self.transcript.update(amount.to_le_bytes());
        let digest: [u8; 32] = self.transcript.clone().finalize().into();

        let mut shared_secret = [0u8; 32];
        rng.fill_bytes(&mut shared_secret);

        let tx_out = if self.behavior.empty_outputs {
            Vec::new()
        } else {
            digest[..16].to_vec()
        };
        OutputArtifact {
            tx_out: TxOutBytes(tx_out),
            tx_out_public_key: RistrettoPublic::from_bytes(digest),
            confirmation_number: ConfirmationNumber(Sha256::digest(digest).into()),
            shared_secret: RistrettoPublic::from_bytes(shared_secret),
        }
    }
}

impl BackendSession for MockSession {
    fn add_input(
        &mut self,
        _view_private_key: &RistrettoPrivate,
        subaddress_spend_private_key: &RistrettoPrivate,
        real_input_index: usize,
        ring: &[RingMember],
    ) -> Result<(), BackendError> {
        let real = ring.get(real_input_index).ok_or_else(|| {
            BackendError::InvalidInput("real input index outside ring".to_string())
        })?;
        self.transcript.update(subaddress_spend_private_key.as_bytes());
        self.transcript.update(&real.tx_out.0);
        self.state.lock().inputs += 1;
        Ok(())
    }

    fn add_output(
        &mut self,
        _recipient: &PublicAddress,
        amount: u64,
        rng: &mut dyn RngCore,
    ) -> Result<OutputArtifact, BackendError> {
        if self.behavior.fail_attestation {
            return Err(BackendError::AttestationVerificationFailed(
                "fog report signature rejected".to_string(),
            ));
        }
        self.state.lock().output_amounts.push(amount);
        Ok(self.artifact(amount, rng))
    }

    fn add_change_output(
        &mut self,
        _account_key: &AccountKey,
        amount: u64,
        rng: &mut dyn RngCore,
    ) -> Result<OutputArtifact, BackendError> {
        self.state.lock().change_amounts.push(amount);
        Ok(self.artifact(amount, rng))
    }

    fn finalize(self, rng: &mut dyn RngCore) -> Result<Vec<u8>, BackendError> {
        let mut bytes = self.transcript.clone().finalize().to_vec();
        let mut nonce = [0u8; 8];
        rng.fill_bytes(&mut nonce);
        bytes.extend_from_slice(&nonce);
        Ok(bytes)
    }
}

impl Drop for MockSession {
    fn drop(&mut self) {
        self.state.lock().sessions_released += 1;
    }
}

/// Oracle serving a fixed fee and counting fetches
#[derive(Debug)]
pub struct CountingFeeOracle {
    fee: u64,
    calls: AtomicUsize,
}

impl CountingFeeOracle {
    /// Oracle answering `fee` for every level and token
    pub fn fixed(fee: u64) -> Self {
        Self {
            fee,
            calls: AtomicUsize::new(0),
        }
    }

    /// Fetches so far
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl FeeOracle for CountingFeeOracle {
    async fn fee_strategy(
        &self,
        _level: FeeLevel,
        _token_id: TokenId,
    ) -> Result<Arc<dyn FeeStrategy>, ConnectionError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::new(FixedFeeStrategy::new(self.fee)))
    }
}

/// Oracle that always fails
#[derive(Debug)]
pub struct FailingFeeOracle {
    error: ConnectionError,
    calls: AtomicUsize,
}

impl FailingFeeOracle {
    /// Oracle failing with `error`
    pub fn new(error: ConnectionError) -> Self {
        Self {
            error,
            calls: AtomicUsize::new(0),
        }
    }

    /// Fetches so far
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl FeeOracle for FailingFeeOracle {
    async fn fee_strategy(
        &self,
        _level: FeeLevel,
        _token_id: TokenId,
    ) -> Result<Arc<dyn FeeStrategy>, ConnectionError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(self.error.clone())
    }
}
