//! Immutable unspent-output snapshots.
//!
//! A [`UtxoSnapshot`] is the complete unspent-output set immediately after one
//! block. Snapshots are frozen: deriving a child state goes through a
//! [`SnapshotBuilder`], which copies the parent's map, mutates the copy, and
//! freezes it into a new snapshot. Clones of a snapshot share storage, so
//! handing one to a validator on another thread is an `Arc` bump.

use std::collections::HashMap;
use std::sync::Arc;

use crate::error::TransactionError;
use crate::types::{Hash256, OutPoint, Transaction, TxOutput};

/// Frozen mapping from output identifier to spendable output.
#[derive(Clone, Debug, Default)]
pub struct UtxoSnapshot {
    utxos: Arc<HashMap<OutPoint, TxOutput>>,
}

impl UtxoSnapshot {
    /// The empty snapshot (ledger state before genesis).
    pub fn empty() -> Self {
        Self::default()
    }

    /// Look up an unspent output.
    pub fn get(&self, outpoint: &OutPoint) -> Option<&TxOutput> {
        self.utxos.get(outpoint)
    }

    /// Whether `outpoint` is unspent in this snapshot.
    pub fn contains(&self, outpoint: &OutPoint) -> bool {
        self.utxos.contains_key(outpoint)
    }

    /// Number of unspent outputs.
    pub fn len(&self) -> usize {
        self.utxos.len()
    }

    pub fn is_empty(&self) -> bool {
        self.utxos.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&OutPoint, &TxOutput)> {
        self.utxos.iter()
    }

    /// Sum of all unspent values. Returns None on overflow.
    pub fn total_value(&self) -> Option<u64> {
        self.utxos
            .values()
            .try_fold(0u64, |acc, out| acc.checked_add(out.value))
    }

    /// Sum of unspent values owned by `pubkey_hash`.
    pub fn balance_of(&self, pubkey_hash: &Hash256) -> u64 {
        self.utxos
            .values()
            .filter(|out| out.pubkey_hash == *pubkey_hash)
            .fold(0u64, |acc, out| acc.saturating_add(out.value))
    }

    /// Outpoints owned by `pubkey_hash`, sorted for deterministic iteration.
    pub fn outpoints_of(&self, pubkey_hash: &Hash256) -> Vec<(OutPoint, TxOutput)> {
        let mut owned: Vec<_> = self
            .utxos
            .iter()
            .filter(|(_, out)| out.pubkey_hash == *pubkey_hash)
            .map(|(op, out)| (op.clone(), out.clone()))
            .collect();
        owned.sort_by(|a, b| a.0.cmp(&b.0));
        owned
    }

    /// Derive a new snapshot with every output of `coinbase` added.
    ///
    /// Coinbase outputs are credited directly; they are never validated.
    pub fn with_coinbase(&self, coinbase: &Transaction) -> UtxoSnapshot {
        let mut builder = self.to_builder();
        builder.add_outputs(coinbase);
        builder.freeze()
    }

    /// Start a mutable copy of this snapshot.
    pub fn to_builder(&self) -> SnapshotBuilder {
        SnapshotBuilder {
            utxos: HashMap::clone(&self.utxos),
        }
    }

    /// Whether two handles share the same storage.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.utxos, &other.utxos)
    }
}

impl PartialEq for UtxoSnapshot {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other) || self.utxos == other.utxos
    }
}

impl Eq for UtxoSnapshot {}

impl FromIterator<(OutPoint, TxOutput)> for UtxoSnapshot {
    fn from_iter<I: IntoIterator<Item = (OutPoint, TxOutput)>>(iter: I) -> Self {
        Self {
            utxos: Arc::new(iter.into_iter().collect()),
        }
    }
}

/// Mutable working state used to derive a snapshot.
#[derive(Clone, Debug, Default)]
pub struct SnapshotBuilder {
    utxos: HashMap<OutPoint, TxOutput>,
}

impl SnapshotBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, outpoint: &OutPoint) -> Option<&TxOutput> {
        self.utxos.get(outpoint)
    }

    pub fn contains(&self, outpoint: &OutPoint) -> bool {
        self.utxos.contains_key(outpoint)
    }

    pub fn len(&self) -> usize {
        self.utxos.len()
    }

    pub fn is_empty(&self) -> bool {
        self.utxos.is_empty()
    }

    /// Insert an output, replacing any entry at the same outpoint.
    pub fn insert(&mut self, outpoint: OutPoint, output: TxOutput) {
        self.utxos.insert(outpoint, output);
    }

    /// Remove an unspent output, returning it.
    pub fn spend(&mut self, outpoint: &OutPoint) -> Option<TxOutput> {
        self.utxos.remove(outpoint)
    }

    /// Add every output of `tx`. Returns the number created.
    pub fn add_outputs(&mut self, tx: &Transaction) -> usize {
        let mut created = 0;
        for (outpoint, output) in tx.outpoints() {
            self.utxos.insert(outpoint, output.clone());
            created += 1;
        }
        created
    }

    /// Spend every input of `tx`, then add its outputs.
    ///
    /// All inputs are checked before anything is removed, so a failed apply
    /// leaves the builder untouched. Does not verify signatures or value
    /// conservation; that is the validator's job.
    pub fn apply(&mut self, tx: &Transaction) -> Result<(), TransactionError> {
        if let Some(missing) = tx
            .inputs
            .iter()
            .find(|input| !self.utxos.contains_key(&input.previous_output))
        {
            return Err(TransactionError::UnknownUtxo(missing.previous_output.to_string()));
        }
        for input in &tx.inputs {
            self.utxos.remove(&input.previous_output);
        }
        self.add_outputs(tx);
        Ok(())
    }

    /// Freeze into an immutable snapshot.
    pub fn freeze(self) -> UtxoSnapshot {
        UtxoSnapshot {
            utxos: Arc::new(self.utxos),
        }
    }
}
