//! Criterion benchmarks for block submission.
//!
//! Covers: extending the best tip with empty blocks, and submitting a block
//! carrying signed spends.

use criterion::{black_box, criterion_group, criterion_main, BatchSize, Criterion};

use arbor_chain::{ChainConfig, Ledger};
use arbor_core::crypto::{sign_all_inputs, KeyPair};
use arbor_core::types::{Block, OutPoint, Transaction, TxInput, TxOutput};

fn coinbase(kp: &KeyPair, outputs: u64, height: u64) -> Transaction {
    Transaction::coinbase(
        (0..outputs)
            .map(|_| TxOutput {
                value: 1_000,
                pubkey_hash: kp.pubkey_hash(),
            })
            .collect(),
        height,
    )
}

fn bench_extend_tip(c: &mut Criterion) {
    let kp = KeyPair::from_secret_bytes([1; 32]);
    c.bench_function("extend_tip_100", |b| {
        b.iter_batched(
            || {
                let genesis = Block::new(None, coinbase(&kp, 1, 0), vec![], 0);
                Ledger::new(genesis, ChainConfig::default()).unwrap()
            },
            |ledger| {
                for h in 1..=100 {
                    let block = Block::new(Some(ledger.best_tip()), coinbase(&kp, 1, h), vec![], h);
                    black_box(ledger.submit_block(&block).unwrap());
                }
            },
            BatchSize::SmallInput,
        )
    });
}

fn bench_submit_spends(c: &mut Criterion) {
    let kp = KeyPair::from_secret_bytes([2; 32]);
    let genesis = Block::new(None, coinbase(&kp, 50, 0), vec![], 0);
    let txid = genesis.coinbase.txid();
    let spends: Vec<Transaction> = (0..50)
        .map(|i| {
            let mut tx = Transaction {
                version: 1,
                inputs: vec![TxInput::unsigned(OutPoint::new(txid, i))],
                outputs: vec![TxOutput {
                    value: 900,
                    pubkey_hash: kp.pubkey_hash(),
                }],
                lock_time: 0,
            };
            sign_all_inputs(&mut tx, &kp).unwrap();
            tx
        })
        .collect();
    let block = Block::new(Some(genesis.hash()), coinbase(&kp, 1, 1), spends, 1);

    c.bench_function("submit_block_50_spends", |b| {
        b.iter_batched(
            || Ledger::new(genesis.clone(), ChainConfig::default()).unwrap(),
            |ledger| black_box(ledger.submit_block(&block).unwrap()),
            BatchSize::SmallInput,
        )
    });
}

criterion_group!(benches, bench_extend_tip, bench_submit_spends);
criterion_main!(benches);
