//! Staging pool for transactions awaiting inclusion in a block.
//!
//! The pool is a holding area for block assembly. It performs no validation:
//! a staged transaction may conflict with another, or with any branch, and
//! is only checked when a block carrying it is submitted. Nothing is removed
//! automatically when blocks are accepted; callers decide when to drop
//! confirmed transactions via [`StagingPool::remove_confirmed`].
//!
//! Not thread-safe; the ledger keeps it behind a `Mutex`.

use std::collections::HashMap;

use arbor_core::types::{Block, Hash256, Transaction};

/// A staged transaction with precomputed metadata.
#[derive(Debug, Clone)]
pub struct StagedTransaction {
    pub tx: Transaction,
    pub txid: Hash256,
    /// Encoded size in bytes.
    pub size: usize,
    /// Position in first-staged order.
    seq: u64,
}

impl StagedTransaction {
    pub fn seq(&self) -> u64 {
        self.seq
    }
}

/// Transactions keyed by txid, iterated in the order first staged.
#[derive(Debug, Default)]
pub struct StagingPool {
    entries: HashMap<Hash256, StagedTransaction>,
    next_seq: u64,
    total_bytes: usize,
}

fn encoded_size(tx: &Transaction) -> usize {
    bincode::encode_to_vec(tx, bincode::config::standard()).map_or(0, |bytes| bytes.len())
}

impl StagingPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stage `tx`, returning its txid.
    ///
    /// Staging the same transaction twice keeps a single entry at its
    /// original position.
    pub fn stage(&mut self, tx: Transaction) -> Hash256 {
        let txid = tx.txid();
        let size = encoded_size(&tx);

        let seq = match self.entries.get(&txid) {
            Some(existing) => {
                self.total_bytes -= existing.size;
                existing.seq
            }
            None => {
                let seq = self.next_seq;
                self.next_seq += 1;
                seq
            }
        };

        self.total_bytes += size;
        self.entries.insert(txid, StagedTransaction {
            tx,
            txid,
            size,
            seq,
        });
        txid
    }

    pub fn contains(&self, txid: &Hash256) -> bool {
        self.entries.contains_key(txid)
    }

    pub fn get(&self, txid: &Hash256) -> Option<&Transaction> {
        self.entries.get(txid).map(|entry| &entry.tx)
    }

    /// Remove a staged transaction by id.
    pub fn remove(&mut self, txid: &Hash256) -> Option<Transaction> {
        let entry = self.entries.remove(txid)?;
        self.total_bytes -= entry.size;
        Some(entry.tx)
    }

    /// Drop every staged transaction that `block` includes. Returns the
    /// number removed.
    pub fn remove_confirmed(&mut self, block: &Block) -> usize {
        block
            .transactions
            .iter()
            .filter(|tx| self.remove(&tx.txid()).is_some())
            .count()
    }

    /// Staged transactions in first-staged order.
    pub fn contents(&self) -> Vec<&Transaction> {
        self.ordered().into_iter().map(|entry| &entry.tx).collect()
    }

    /// Staged entries with metadata, in first-staged order.
    pub fn entries(&self) -> Vec<&StagedTransaction> {
        self.ordered()
    }

    /// Remove and return everything, in first-staged order.
    pub fn drain(&mut self) -> Vec<Transaction> {
        let mut entries: Vec<StagedTransaction> = self.entries.drain().map(|(_, e)| e).collect();
        entries.sort_by_key(|entry| entry.seq);
        self.total_bytes = 0;
        entries.into_iter().map(|entry| entry.tx).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Sum of encoded sizes of everything staged.
    pub fn total_bytes(&self) -> usize {
        self.total_bytes
    }

    fn ordered(&self) -> Vec<&StagedTransaction> {
        let mut entries: Vec<&StagedTransaction> = self.entries.values().collect();
        entries.sort_by_key(|entry| entry.seq);
        entries
    }
}
