//! Sender Resolver
//!
//! Recovers a transaction's sending address from its signature. This is a
//! pure cryptographic derivation, not a network call: the RPC transaction is
//! converted back into its canonical signed envelope and the signer is
//! recovered according to the envelope's signing scheme (EIP-155 for legacy
//! transactions, typed-transaction hashing otherwise).
//!
//! Recovery failure is a per-transaction condition the caller is expected to
//! log and skip; it never aborts the run.

use alloy::consensus::TxEnvelope;
use alloy::primitives::Address;
use alloy::rpc::types::Transaction;
use thiserror::Error;

/// Errors that can occur during sender recovery
#[derive(Error, Debug)]
pub enum SenderError {
    #[error("not a canonical signed transaction: {0}")]
    Envelope(String),

    #[error("signature recovery failed: {0}")]
    Recovery(String),

    #[error("unsupported transaction type")]
    UnsupportedType,
}

/// Recover the sender of an RPC transaction from its signature.
///
/// # Arguments
/// * `tx` - A transaction as returned in a full block body
///
/// # Returns
/// The recovered sender address, or a [`SenderError`] when the transaction's
/// signature is structurally invalid.
pub fn resolve_sender(tx: &Transaction) -> Result<Address, SenderError> {
    let envelope =
        TxEnvelope::try_from(tx.clone()).map_err(|e| SenderError::Envelope(e.to_string()))?;
    recover_from_envelope(&envelope)
}

/// Recover the signer of a canonical signed envelope
pub fn recover_from_envelope(envelope: &TxEnvelope) -> Result<Address, SenderError> {
    match envelope {
        TxEnvelope::Legacy(signed) => signed.recover_signer(),
        TxEnvelope::Eip2930(signed) => signed.recover_signer(),
        TxEnvelope::Eip1559(signed) => signed.recover_signer(),
        TxEnvelope::Eip4844(signed) => signed.recover_signer(),
        _ => return Err(SenderError::UnsupportedType),
    }
    .map_err(|e| SenderError::Recovery(e.to_string()))
}
