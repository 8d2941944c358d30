//! Shared test helpers for integration tests.

use arbor_core::crypto::{sign_all_inputs, KeyPair};
use arbor_core::snapshot::UtxoSnapshot;
use arbor_core::types::*;
use arbor_core::validation::{TransactionValidator, UtxoValidator};

/// Default coinbase reward used by the helpers.
pub const REWARD: u64 = 50;

/// Deterministic keypair from a seed byte.
pub fn key(seed: u8) -> KeyPair {
    KeyPair::from_secret_bytes([seed; 32])
}

/// Pubkey hash of [`key`]`(seed)`.
pub fn pkh(seed: u8) -> Hash256 {
    key(seed).pubkey_hash()
}

/// Coinbase paying `value` to `pubkey_hash`, tagged with `height` so ids
/// never collide across heights.
pub fn make_coinbase(value: u64, pubkey_hash: Hash256, height: u64) -> Transaction {
    Transaction::coinbase(vec![TxOutput { value, pubkey_hash }], height)
}

/// Genesis block paying [`REWARD`] to `key(owner)`.
pub fn make_genesis(owner: u8) -> Block {
    Block::new(None, make_coinbase(REWARD, pkh(owner), 0), vec![], 1_700_000_000)
}

/// Block on `parent` at `height`, rewarding `key(miner)`.
pub fn make_block(parent: &Block, height: u64, miner: u8, txs: Vec<Transaction>) -> Block {
    Block::new(
        Some(parent.hash()),
        make_coinbase(REWARD, pkh(miner), height),
        txs,
        parent.header.timestamp + 60,
    )
}

/// First output of `tx`.
pub fn first_output(tx: &Transaction) -> OutPoint {
    OutPoint::new(tx.txid(), 0)
}

/// Signed spend of `inputs` (all owned by `owner`) into `outputs`.
pub fn signed_spend(
    owner: &KeyPair,
    inputs: &[OutPoint],
    outputs: &[(u64, Hash256)],
) -> Transaction {
    let mut tx = Transaction {
        version: 1,
        inputs: inputs.iter().cloned().map(TxInput::unsigned).collect(),
        outputs: outputs
            .iter()
            .map(|(value, pubkey_hash)| TxOutput {
                value: *value,
                pubkey_hash: *pubkey_hash,
            })
            .collect(),
        lock_time: 0,
    };
    sign_all_inputs(&mut tx, owner).expect("every input index is in bounds");
    tx
}

/// Snapshot after `block` derived independently from `parent`: regular
/// transactions through [`UtxoValidator`], then the coinbase.
pub fn replay(parent: &UtxoSnapshot, block: &Block) -> UtxoSnapshot {
    UtxoValidator
        .validate(parent, &block.transactions)
        .snapshot
        .with_coinbase(&block.coinbase)
}
