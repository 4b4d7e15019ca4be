//! Transaction assembly
//!
//! [`TransactionProposer`] checks a proposed composition and drives a
//! [`TransactionBuilder`] through the signing backend. Conservation,
//! `sum(inputs) == sum(outputs) + fee + change`, is verified before any
//! backend call is made.
//!
//! ```ignore
//! let proposer = TransactionProposer::new(backend);
//! let ctx = ProposalContext::new(&account_key, Amount::new(fee, TokenId::MOB), tombstone);
//! let pending = proposer.build_to_recipient(&inputs, &recipient, amount, &ctx, &mut OsRng)?;
//! ```

use std::fmt;

use rand::{CryptoRng, RngCore};
use sha2::{Digest, Sha256};

use crate::amount::{
    safe_compare, safe_compare_value, safe_subtract, safe_subtract_value, Amount, AmountError,
    Comparison, PositiveU64, TokenId,
};
use crate::backend::{
    contract_violation, map_backend_error, BackendOp, BackendSession, ConfirmationNumber,
    FogResolver, OutputArtifact, SessionParams, SigningBackend,
};
use crate::keys::{AccountKey, PublicAddress, RistrettoPrivate, RistrettoPublic};
use crate::logging::Redacted;
use crate::records::{KeyImage, PreparedTxInput, TxOutBytes};
use crate::{Error, Result};
use veil_params::{BlockVersion, ProtocolParams};

/// Requested payment
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputRequest {
    /// Recipient
    pub recipient: PublicAddress,
    /// Amount in the transaction's token
    pub amount: PositiveU64,
}

impl OutputRequest {
    /// Create request
    pub fn new(recipient: PublicAddress, amount: PositiveU64) -> Self {
        Self { recipient, amount }
    }
}

/// Proof-of-payment data for one output
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Receipt {
    /// One-time public key of the output
    pub tx_out_public_key: RistrettoPublic,
    /// Serialized output
    pub tx_out: TxOutBytes,
    /// Confirmation number
    pub confirmation_number: ConfirmationNumber,
    /// Block after which the transaction can no longer land
    pub tombstone_block_index: u64,
}

/// Output constructed for a transaction, with its receipt
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxOutContext {
    /// Serialized output
    pub tx_out: TxOutBytes,
    /// Receipt for the recipient
    pub receipt: Receipt,
    /// Shared secret with the recipient
    pub shared_secret: RistrettoPublic,
}

impl TxOutContext {
    fn from_artifact(artifact: OutputArtifact, tombstone_block_index: u64) -> Self {
        Self {
            receipt: Receipt {
                tx_out_public_key: artifact.tx_out_public_key,
                tx_out: artifact.tx_out.clone(),
                confirmation_number: artifact.confirmation_number,
                tombstone_block_index,
            },
            tx_out: artifact.tx_out,
            shared_secret: artifact.shared_secret,
        }
    }
}

/// Transaction digest
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TxId(pub [u8; 32]);

impl fmt::Display for TxId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

impl fmt::Debug for TxId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TxId({})", self)
    }
}

/// Signed, serialized transaction
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transaction {
    /// Serialized transaction
    pub bytes: Vec<u8>,
    /// Fee paid
    pub fee: Amount,
    /// Block after which the transaction can no longer land
    pub tombstone_block_index: u64,
    /// Key images of the spent records
    pub key_images: Vec<KeyImage>,
}

impl Transaction {
    /// SHA-256 of the serialized transaction
    pub fn id(&self) -> TxId {
        TxId(Sha256::digest(&self.bytes).into())
    }
}

/// Built transaction with per-output receipts
///
/// Produced once per build; the caller owns it from then on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingTransaction {
    /// The transaction
    pub transaction: Transaction,
    /// Payment outputs, in request order
    pub payload_contexts: Vec<TxOutContext>,
    /// Change output, absent when sending everything
    pub change_context: Option<TxOutContext>,
}

impl PendingTransaction {
    /// Receipts for the payment outputs
    pub fn receipts(&self) -> Vec<&Receipt> {
        self.payload_contexts.iter().map(|c| &c.receipt).collect()
    }

    /// Narrow to a single-recipient transaction
    pub fn single_payload(self) -> Result<PendingSinglePayloadTransaction> {
        let count = self.payload_contexts.len();
        let mut payloads = self.payload_contexts.into_iter();
        match (payloads.next(), payloads.next()) {
            (Some(payload_context), None) => Ok(PendingSinglePayloadTransaction {
                transaction: self.transaction,
                payload_context,
                change_context: self.change_context,
            }),
            _ => Err(Error::InvalidInput(format!(
                "expected one payment output, transaction has {}",
                count
            ))),
        }
    }
}

/// Built transaction paying one recipient
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingSinglePayloadTransaction {
    /// The transaction
    pub transaction: Transaction,
    /// Payment output
    pub payload_context: TxOutContext,
    /// Change output, absent when sending everything
    pub change_context: Option<TxOutContext>,
}

impl PendingSinglePayloadTransaction {
    /// Receipt for the payment output
    pub fn receipt(&self) -> &Receipt {
        &self.payload_context.receipt
    }
}

/// Per-build parameters shared by every entry point
#[derive(Debug, Clone)]
pub struct ProposalContext<'a> {
    /// Spending account
    pub account_key: &'a AccountKey,
    /// Fee, in the token every input must carry
    pub fee: Amount,
    /// Last block the transaction is valid in
    pub tombstone_block_index: u64,
    /// Fog reports for the recipients
    pub fog_resolver: FogResolver,
    /// Target block version
    pub block_version: BlockVersion,
}

impl<'a> ProposalContext<'a> {
    /// Context with no fog reports at the default network's block version
    pub fn new(account_key: &'a AccountKey, fee: Amount, tombstone_block_index: u64) -> Self {
        Self {
            account_key,
            fee,
            tombstone_block_index,
            fog_resolver: FogResolver::new(),
            block_version: ProtocolParams::default().network.block_version,
        }
    }

    /// Context for a transaction built at `current_block`
    ///
    /// The tombstone is the furthest block `params` allows and the block
    /// version is the network's.
    pub fn at_block(
        account_key: &'a AccountKey,
        fee: Amount,
        current_block: u64,
        params: &ProtocolParams,
    ) -> Self {
        Self {
            account_key,
            fee,
            tombstone_block_index: params.tombstone_limit(current_block),
            fog_resolver: FogResolver::new(),
            block_version: params.network.block_version,
        }
    }

    /// Attach fog reports
    pub fn with_fog_resolver(mut self, fog_resolver: FogResolver) -> Self {
        self.fog_resolver = fog_resolver;
        self
    }

    /// Target a specific block version
    pub fn with_block_version(mut self, block_version: BlockVersion) -> Self {
        self.block_version = block_version;
        self
    }

    fn session_params(&self) -> SessionParams {
        SessionParams {
            fee: self.fee,
            tombstone_block_index: self.tombstone_block_index,
            fog_resolver: self.fog_resolver.clone(),
            block_version: self.block_version,
        }
    }
}

/// Check token and ring shape, then resolve the input's spend key
fn resolve_input<'k>(
    input: &PreparedTxInput,
    token_id: TokenId,
    account_key: &'k AccountKey,
) -> Result<&'k RistrettoPrivate> {
    let record = &input.known_tx_out;
    if record.token_id != token_id {
        return Err(Error::InvalidInput(format!(
            "input token {} does not match fee token {}",
            record.token_id, token_id
        )));
    }
    if input.ring.is_empty() {
        return Err(Error::InvalidInput("input ring is empty".to_string()));
    }
    if input.real_input_index >= input.ring.len() {
        return Err(Error::InvalidInput(format!(
            "real input index {} outside ring of {}",
            input.real_input_index,
            input.ring.len()
        )));
    }
    account_key
        .subaddress_spend_private_key(record.subaddress_index)
        .ok_or_else(|| Error::InvalidInput("Tx subaddress index out of bounds".to_string()))
}

/// Check a composition against the transaction-format limits
fn check_protocol_limits(
    params: &ProtocolParams,
    inputs: &[PreparedTxInput],
    num_outputs: usize,
    ctx: &ProposalContext<'_>,
) -> Result<()> {
    if inputs.len() > params.max_inputs_per_transaction {
        return Err(Error::InvalidInput(format!(
            "{} inputs exceed the limit of {}",
            inputs.len(),
            params.max_inputs_per_transaction
        )));
    }
    if num_outputs > params.max_outputs_per_transaction {
        return Err(Error::InvalidInput(format!(
            "{} outputs exceed the limit of {}",
            num_outputs, params.max_outputs_per_transaction
        )));
    }
    if ctx.fee.token_id != TokenId::MOB && !ctx.block_version.supports_multiple_tokens() {
        return Err(Error::InvalidInput(format!(
            "block version {} does not support token {}",
            ctx.block_version, ctx.fee.token_id
        )));
    }
    if let Some(input) = inputs.iter().find(|i| i.ring.len() > params.ring_size) {
        return Err(Error::InvalidInput(format!(
            "ring of {} exceeds ring size {}",
            input.ring.len(),
            params.ring_size
        )));
    }
    Ok(())
}

/// A fog recipient needs a report, on a network that serves them
fn check_fog_report(
    params: &ProtocolParams,
    recipient: &PublicAddress,
    fog_resolver: &FogResolver,
) -> Result<()> {
    let Some(fog_info) = &recipient.fog_info else {
        return Ok(());
    };
    if !params.network.fog_enabled {
        return Err(Error::InvalidInput(format!(
            "fog recipients are not supported on {}",
            params.network.name
        )));
    }
    if fog_resolver.report(&fog_info.report_url).is_none() {
        return Err(Error::InvalidInput(format!(
            "no fog report for {}",
            fog_info.report_url
        )));
    }
    Ok(())
}

fn checked_artifact(op: BackendOp, artifact: OutputArtifact) -> OutputArtifact {
    if artifact.tx_out.0.is_empty() {
        contract_violation(op, "empty serialized output on success");
    }
    artifact
}

/// Accumulates one transaction in a backend session
///
/// Driven from one thread through `&mut self` and consumed by
/// [`finalize`](Self::finalize), so it cannot be reused.
pub struct TransactionBuilder<S: BackendSession> {
    session: S,
    fee: Amount,
    tombstone_block_index: u64,
    key_images: Vec<KeyImage>,
}

impl<S: BackendSession> TransactionBuilder<S> {
    /// Open a session on `backend`
    pub fn new<B>(backend: &B, params: SessionParams) -> Self
    where
        B: SigningBackend<Session = S>,
    {
        let fee = params.fee;
        let tombstone_block_index = params.tombstone_block_index;
        Self {
            session: backend.create_session(params),
            fee,
            tombstone_block_index,
            key_images: Vec::new(),
        }
    }

    /// Add an input owned by `account_key`
    pub fn add_input(&mut self, input: &PreparedTxInput, account_key: &AccountKey) -> Result<()> {
        let spend_key = resolve_input(input, self.fee.token_id, account_key)?;
        self.session
            .add_input(
                account_key.view_private_key(),
                spend_key,
                input.real_input_index,
                &input.ring,
            )
            .map_err(|e| map_backend_error(BackendOp::AddInput, e))?;
        self.key_images.push(input.known_tx_out.key_image);
        Ok(())
    }

    /// Add a payment output
    pub fn add_output<R: RngCore + CryptoRng>(
        &mut self,
        recipient: &PublicAddress,
        amount: u64,
        rng: &mut R,
    ) -> Result<TxOutContext> {
        let artifact = self
            .session
            .add_output(recipient, amount, rng)
            .map_err(|e| map_backend_error(BackendOp::AddOutput, e))?;
        let artifact = checked_artifact(BackendOp::AddOutput, artifact);
        Ok(TxOutContext::from_artifact(artifact, self.tombstone_block_index))
    }

    /// Add the change output; a zero amount is allowed
    pub fn add_change_output<R: RngCore + CryptoRng>(
        &mut self,
        account_key: &AccountKey,
        amount: u64,
        rng: &mut R,
    ) -> Result<TxOutContext> {
        let artifact = self
            .session
            .add_change_output(account_key, amount, rng)
            .map_err(|e| map_backend_error(BackendOp::AddChangeOutput, e))?;
        let artifact = checked_artifact(BackendOp::AddChangeOutput, artifact);
        Ok(TxOutContext::from_artifact(artifact, self.tombstone_block_index))
    }

    /// Sign and serialize, consuming the builder
    pub fn finalize<R: RngCore + CryptoRng>(self, rng: &mut R) -> Result<Transaction> {
        let bytes = self
            .session
            .finalize(rng)
            .map_err(|e| map_backend_error(BackendOp::Finalize, e))?;
        if bytes.is_empty() {
            contract_violation(BackendOp::Finalize, "empty transaction on success");
        }
        Ok(Transaction {
            bytes,
            fee: self.fee,
            tombstone_block_index: self.tombstone_block_index,
            key_images: self.key_images,
        })
    }
}

/// Builds transaction proposals against a signing backend
#[derive(Debug, Clone)]
pub struct TransactionProposer<B> {
    backend: B,
    params: ProtocolParams,
}

impl<B: SigningBackend> TransactionProposer<B> {
    /// Create proposer enforcing the default network's limits
    pub fn new(backend: B) -> Self {
        Self::with_params(backend, ProtocolParams::default())
    }

    /// Create proposer enforcing `params`
    pub fn with_params(backend: B, params: ProtocolParams) -> Self {
        Self { backend, params }
    }

    /// Underlying backend
    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Limits every build is checked against
    pub fn params(&self) -> &ProtocolParams {
        &self.params
    }

    /// Build a transaction from an explicit composition
    ///
    /// `change_amount` of `None` builds without a change output. The
    /// composition must satisfy `sum(inputs) == sum(outputs) + fee + change`.
    pub fn build<R: RngCore + CryptoRng>(
        &self,
        inputs: &[PreparedTxInput],
        outputs: &[OutputRequest],
        change_amount: Option<u64>,
        ctx: &ProposalContext<'_>,
        rng: &mut R,
    ) -> Result<PendingTransaction> {
        let input_values: Vec<u64> = inputs.iter().map(PreparedTxInput::value).collect();
        let mut spent: Vec<u64> = outputs.iter().map(|o| o.amount.get()).collect();
        spent.push(ctx.fee.value);
        spent.extend(change_amount);

        if !safe_compare(&input_values, Comparison::Equal, &spent) {
            return Err(Error::InvalidInput(
                "Input values != output values + fee".to_string(),
            ));
        }
        if outputs.is_empty() {
            return Err(Error::InvalidInput("no outputs requested".to_string()));
        }

        let num_outputs = outputs.len() + usize::from(change_amount.is_some());
        check_protocol_limits(&self.params, inputs, num_outputs, ctx)?;
        for output in outputs {
            check_fog_report(&self.params, &output.recipient, &ctx.fog_resolver)?;
        }
        for input in inputs {
            resolve_input(input, ctx.fee.token_id, ctx.account_key)?;
        }

        tracing::info!(
            "Building transaction: {} inputs, {} outputs, fee {}, change {}, block version {}",
            inputs.len(),
            outputs.len(),
            ctx.fee,
            change_amount.map(Redacted).map_or("none".to_string(), |c| c.to_string()),
            ctx.block_version
        );

        let mut builder = TransactionBuilder::new(&self.backend, ctx.session_params());
        for input in inputs {
            builder.add_input(input, ctx.account_key)?;
        }

        let mut payload_contexts = Vec::with_capacity(outputs.len());
        for output in outputs {
            let context = builder.add_output(&output.recipient, output.amount.get(), rng)?;
            payload_contexts.push(context);
        }

        let change_context = match change_amount {
            Some(amount) => Some(builder.add_change_output(ctx.account_key, amount, rng)?),
            None => None,
        };

        let transaction = builder.finalize(rng)?;
        tracing::info!("Built transaction {}", transaction.id());

        Ok(PendingTransaction {
            transaction,
            payload_contexts,
            change_context,
        })
    }

    /// Pay one recipient, returning the remainder as change
    pub fn build_to_recipient<R: RngCore + CryptoRng>(
        &self,
        inputs: &[PreparedTxInput],
        recipient: &PublicAddress,
        amount: PositiveU64,
        ctx: &ProposalContext<'_>,
        rng: &mut R,
    ) -> Result<PendingSinglePayloadTransaction> {
        let outputs = [OutputRequest::new(recipient.clone(), amount)];
        self.build_to_outputs(inputs, &outputs, ctx, rng)?.single_payload()
    }

    /// Send everything the inputs hold, less the fee, to one recipient
    pub fn build_sending_all_to<R: RngCore + CryptoRng>(
        &self,
        inputs: &[PreparedTxInput],
        recipient: &PublicAddress,
        ctx: &ProposalContext<'_>,
        rng: &mut R,
    ) -> Result<PendingSinglePayloadTransaction> {
        let input_values: Vec<u64> = inputs.iter().map(PreparedTxInput::value).collect();
        if !safe_compare_value(&input_values, Comparison::Greater, ctx.fee.value) {
            return Err(Error::InvalidInput("Total input amount <= fee".to_string()));
        }
        let remaining = safe_subtract_value(&input_values, ctx.fee.value).map_err(|_| {
            Error::InvalidInput("Output amount overflows u64".to_string())
        })?;
        let amount = PositiveU64::new(remaining)
            .ok_or_else(|| Error::InvalidInput("Total input amount == fee".to_string()))?;

        let outputs = [OutputRequest::new(recipient.clone(), amount)];
        self.build(inputs, &outputs, None, ctx, rng)?.single_payload()
    }

    /// Pay several recipients, returning the remainder as change
    ///
    /// A change output is always added, with zero value when nothing remains.
    pub fn build_to_outputs<R: RngCore + CryptoRng>(
        &self,
        inputs: &[PreparedTxInput],
        outputs: &[OutputRequest],
        ctx: &ProposalContext<'_>,
        rng: &mut R,
    ) -> Result<PendingTransaction> {
        let input_values: Vec<u64> = inputs.iter().map(PreparedTxInput::value).collect();
        let mut spent: Vec<u64> = outputs.iter().map(|o| o.amount.get()).collect();
        spent.push(ctx.fee.value);

        let change = safe_subtract(&input_values, &spent).map_err(|e| match e {
            AmountError::Underflow => {
                Error::InvalidInput("Total input amount < total output amount + fee".to_string())
            }
            AmountError::Overflow => Error::InvalidInput("Change amount overflows u64".to_string()),
        })?;

        self.build(inputs, outputs, Some(change), ctx, rng)
    }

    /// Construct a standalone output and its receipt, outside any transaction
    pub fn output_with_receipt<R: RngCore + CryptoRng>(
        &self,
        recipient: &PublicAddress,
        amount: Amount,
        tombstone_block_index: u64,
        fog_resolver: FogResolver,
        block_version: BlockVersion,
        rng: &mut R,
    ) -> Result<TxOutContext> {
        check_fog_report(&self.params, recipient, &fog_resolver)?;
        if amount.token_id != TokenId::MOB && !block_version.supports_multiple_tokens() {
            return Err(Error::InvalidInput(format!(
                "block version {} does not support token {}",
                block_version, amount.token_id
            )));
        }
        let params = SessionParams {
            fee: Amount::new(0, amount.token_id),
            tombstone_block_index,
            fog_resolver,
            block_version,
        };
        let mut builder = TransactionBuilder::new(&self.backend, params);
        builder.add_output(recipient, amount.value, rng)
    }
}
