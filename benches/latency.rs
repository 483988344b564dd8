//! Latency benchmarks for the per-transaction scan path
//!
//! The filter runs once per transaction in every fetched block, and sender
//! recovery once per match, so both need to stay cheap relative to the RPC
//! round trips that dominate a scan.

use alloy::consensus::{SignableTransaction, TxEip1559};
use alloy::primitives::{Address, Bytes, TxKind, U256};
use alloy::rpc::types::{Parity, Signature as RpcSignature, Transaction};
use alloy::signers::{local::PrivateKeySigner, SignerSync};
use criterion::{black_box, criterion_group, criterion_main, Criterion};

use mintscan::filter::{extract_selector, match_transaction};
use mintscan::sender::resolve_sender;

const MINT_SELECTOR: [u8; 4] = [0x40, 0xc1, 0x0f, 0x19];

fn mint_calldata() -> Vec<u8> {
    let mut calldata = MINT_SELECTOR.to_vec();
    calldata.extend_from_slice(&[0u8; 64]);
    calldata
}

fn signed_mint_call(target: Address) -> Transaction {
    let signer = PrivateKeySigner::random();
    let tx = TxEip1559 {
        chain_id: 1,
        nonce: 0,
        gas_limit: 120_000,
        max_fee_per_gas: 30_000_000_000,
        max_priority_fee_per_gas: 1_000_000_000,
        to: TxKind::Call(target),
        value: U256::ZERO,
        input: Bytes::from(mint_calldata()),
        ..Default::default()
    };
    let signature = signer.sign_hash_sync(&tx.signature_hash()).unwrap();
    let signed = tx.clone().into_signed(signature);

    Transaction {
        hash: *signed.hash(),
        nonce: tx.nonce,
        from: signer.address(),
        to: Some(target),
        value: tx.value,
        gas: tx.gas_limit as u128,
        max_fee_per_gas: Some(tx.max_fee_per_gas),
        max_priority_fee_per_gas: Some(tx.max_priority_fee_per_gas),
        input: tx.input.clone(),
        chain_id: Some(tx.chain_id),
        access_list: Some(Default::default()),
        transaction_type: Some(2),
        signature: Some(RpcSignature {
            r: signature.r(),
            s: signature.s(),
            v: U256::from(signature.v().y_parity_byte()),
            y_parity: Some(Parity(signature.v().y_parity())),
        }),
        ..Default::default()
    }
}

/// Benchmark selector extraction from calldata
fn bench_extract_selector(c: &mut Criterion) {
    let calldata = mint_calldata();

    c.bench_function("extract_selector", |b| {
        b.iter(|| black_box(extract_selector(black_box(&calldata))))
    });
}

/// Benchmark the full recipient + selector match
fn bench_match_transaction(c: &mut Criterion) {
    let target = Address::repeat_byte(0xaa);
    let tx = signed_mint_call(target);

    c.bench_function("match_transaction", |b| {
        b.iter(|| black_box(match_transaction(black_box(&tx), target, MINT_SELECTOR)))
    });
}

/// Benchmark ECDSA sender recovery for a matched transaction
fn bench_resolve_sender(c: &mut Criterion) {
    let tx = signed_mint_call(Address::repeat_byte(0xaa));

    c.bench_function("resolve_sender", |b| {
        b.iter(|| black_box(resolve_sender(black_box(&tx)).unwrap()))
    });
}

criterion_group!(
    benches,
    bench_extract_selector,
    bench_match_transaction,
    bench_resolve_sender
);

criterion_main!(benches);
