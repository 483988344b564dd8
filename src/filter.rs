//! Transaction Filter
//!
//! Pure predicate over a block's transactions: does this call target the
//! configured contract and start with the configured 4-byte selector?
//! No logging, no I/O, so it stays independently testable.

use alloy::primitives::{Address, TxHash, B256};
use alloy::rpc::types::Transaction;

/// One matched mint-like call, as persisted by the store.
///
/// Created by a scan task the moment a transaction passes the filter, moved
/// by value through the match channel, and consumed by the persister.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchRecord {
    /// Hash of the matched transaction
    pub tx_hash: TxHash,
    /// Height of the containing block
    pub block_height: u64,
    /// Hash of the containing block
    pub block_hash: B256,
    /// Recovered sender address
    pub sender: Address,
}

impl MatchRecord {
    /// Transaction hash as a 0x-prefixed hex string
    pub fn tx_hash_hex(&self) -> String {
        format!("{:#x}", self.tx_hash)
    }

    /// Block hash as a 0x-prefixed hex string
    pub fn block_hash_hex(&self) -> String {
        format!("{:#x}", self.block_hash)
    }

    /// Sender address as a 0x-prefixed hex string
    pub fn sender_hex(&self) -> String {
        format!("{:#x}", self.sender)
    }
}

/// Extract the function selector from calldata
///
/// # Arguments
/// * `input` - The full transaction input/calldata
///
/// # Returns
/// `Some([u8; 4])` if input has at least 4 bytes, `None` otherwise
pub fn extract_selector(input: &[u8]) -> Option<[u8; 4]> {
    if input.len() < 4 {
        return None;
    }
    let mut selector = [0u8; 4];
    selector.copy_from_slice(&input[..4]);
    Some(selector)
}

/// Check a transaction against the target contract and selector.
///
/// Match order: contract-creation transactions (no recipient) never match;
/// then the recipient must equal `target`; then the calldata must be at
/// least 4 bytes and start with `selector`. Calldata shorter than 4 bytes is
/// a non-match, never a fault.
///
/// # Returns
/// The transaction's hash when it matches; the caller fills in block height,
/// block hash, and sender to assemble the full [`MatchRecord`].
pub fn match_transaction(tx: &Transaction, target: Address, selector: [u8; 4]) -> Option<TxHash> {
    let to = tx.to?;
    if to != target {
        return None;
    }
    if extract_selector(&tx.input)? != selector {
        return None;
    }
    Some(tx.hash)
}
