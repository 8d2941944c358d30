//! Core ledger types: hashes, transactions, blocks.
//!
//! All monetary values are in grains (1 ARB = 10^8 grains).
//! All numeric fields use u64 per protocol convention.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

use crate::merkle;

/// A 32-byte hash value.
///
/// Used for transaction IDs (BLAKE3), block hashes (double SHA-256),
/// and merkle roots (BLAKE3). Compared and hashed by value.
#[derive(
    Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Default,
    bincode::Encode, bincode::Decode,
)]
pub struct Hash256(pub [u8; 32]);

impl Hash256 {
    /// The zero hash (32 zero bytes).
    pub const ZERO: Self = Self([0u8; 32]);

    /// Create a Hash256 from a byte array.
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Return the underlying bytes.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Check if this is the zero hash.
    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; 32]
    }

    /// First eight hex characters, for log lines.
    pub fn short(&self) -> String {
        hex::encode(&self.0[..4])
    }
}

impl fmt::Display for Hash256 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in &self.0 {
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

impl From<[u8; 32]> for Hash256 {
    fn from(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }
}

impl AsRef<[u8]> for Hash256 {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

/// Identifier of a produced output: the creating transaction and the
/// output's position within it.
#[derive(
    Serialize, Deserialize, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord,
    bincode::Encode, bincode::Decode,
)]
pub struct OutPoint {
    /// Transaction ID containing the referenced output.
    pub txid: Hash256,
    /// Index of the output within the transaction.
    pub index: u64,
}

impl OutPoint {
    pub fn new(txid: Hash256, index: u64) -> Self {
        Self { txid, index }
    }
}

impl fmt::Display for OutPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.txid, self.index)
    }
}

/// A transaction input, spending a previous output.
#[derive(
    Serialize, Deserialize, Clone, Debug, PartialEq, Eq,
    bincode::Encode, bincode::Decode,
)]
pub struct TxInput {
    /// The outpoint being spent.
    pub previous_output: OutPoint,
    /// Ed25519 signature (64 bytes).
    pub signature: Vec<u8>,
    /// Ed25519 public key (32 bytes).
    pub public_key: Vec<u8>,
}

impl TxInput {
    /// An unsigned input spending `previous_output`.
    pub fn unsigned(previous_output: OutPoint) -> Self {
        Self {
            previous_output,
            signature: Vec::new(),
            public_key: Vec::new(),
        }
    }
}

/// A transaction output, creating a new UTXO.
#[derive(
    Serialize, Deserialize, Clone, Debug, PartialEq, Eq,
    bincode::Encode, bincode::Decode,
)]
pub struct TxOutput {
    /// Value in grains.
    pub value: u64,
    /// BLAKE3 hash of the owner's Ed25519 public key.
    pub pubkey_hash: Hash256,
}

/// A transaction transferring value between owners.
///
/// A transaction with no inputs is a coinbase: it mints its outputs and is
/// never passed through the validator.
#[derive(
    Serialize, Deserialize, Clone, Debug, PartialEq, Eq,
    bincode::Encode, bincode::Decode,
)]
pub struct Transaction {
    /// Protocol version.
    pub version: u64,
    /// Inputs consuming previous outputs.
    pub inputs: Vec<TxInput>,
    /// New outputs created by this transaction.
    pub outputs: Vec<TxOutput>,
    /// Free-form marker. Coinbases carry the block height here so that their
    /// ids never collide.
    pub lock_time: u64,
}

impl Transaction {
    /// Build a coinbase paying `outputs`, tagged with `height`.
    pub fn coinbase(outputs: Vec<TxOutput>, height: u64) -> Self {
        Self {
            version: crate::constants::PROTOCOL_VERSION,
            inputs: Vec::new(),
            outputs,
            lock_time: height,
        }
    }

    /// Compute the transaction ID (BLAKE3 over a fixed byte layout).
    ///
    /// Layout: version || input count || (txid || index || sig len || sig ||
    /// key len || key)* || output count || (value || pubkey_hash)* ||
    /// lock_time, integers little-endian.
    pub fn txid(&self) -> Hash256 {
        let mut hasher = blake3::Hasher::new();
        hasher.update(&self.version.to_le_bytes());
        hasher.update(&(self.inputs.len() as u64).to_le_bytes());
        for input in &self.inputs {
            hasher.update(input.previous_output.txid.as_bytes());
            hasher.update(&input.previous_output.index.to_le_bytes());
            hasher.update(&(input.signature.len() as u64).to_le_bytes());
            hasher.update(&input.signature);
            hasher.update(&(input.public_key.len() as u64).to_le_bytes());
            hasher.update(&input.public_key);
        }
        hasher.update(&(self.outputs.len() as u64).to_le_bytes());
        for output in &self.outputs {
            hasher.update(&output.value.to_le_bytes());
            hasher.update(output.pubkey_hash.as_bytes());
        }
        hasher.update(&self.lock_time.to_le_bytes());
        Hash256(hasher.finalize().into())
    }

    /// A coinbase has no inputs.
    pub fn is_coinbase(&self) -> bool {
        self.inputs.is_empty()
    }

    /// Sum of all output values. Returns None on overflow.
    pub fn total_output_value(&self) -> Option<u64> {
        self.outputs
            .iter()
            .try_fold(0u64, |acc, out| acc.checked_add(out.value))
    }

    /// Outpoints created by this transaction, in output order.
    pub fn outpoints(&self) -> impl Iterator<Item = (OutPoint, &TxOutput)> + '_ {
        let txid = self.txid();
        self.outputs
            .iter()
            .enumerate()
            .map(move |(index, output)| (OutPoint::new(txid, index as u64), output))
    }
}

/// Block header committing to the parent and the block's transactions.
#[derive(
    Serialize, Deserialize, Clone, Debug, PartialEq, Eq,
    bincode::Encode, bincode::Decode,
)]
pub struct BlockHeader {
    /// Protocol version.
    pub version: u64,
    /// Hash of the parent block. `None` only for genesis.
    pub prev_hash: Option<Hash256>,
    /// BLAKE3 merkle root of coinbase + transactions.
    pub merkle_root: Hash256,
    /// Unix timestamp in seconds.
    pub timestamp: u64,
    /// Proof-of-work nonce.
    pub nonce: u64,
}

impl BlockHeader {
    /// Header size in bytes when serialized for hashing
    /// (3 u64 fields + presence byte + 2 * 32-byte hashes).
    const HASH_SIZE: usize = 3 * 8 + 1 + 2 * 32;

    /// Compute the block hash (double SHA-256).
    ///
    /// Fixed layout: version || present || prev_hash || merkle_root ||
    /// timestamp || nonce, integers little-endian. A missing parent is
    /// encoded as presence byte 0 followed by 32 zero bytes.
    pub fn hash(&self) -> Hash256 {
        let mut data = Vec::with_capacity(Self::HASH_SIZE);
        data.extend_from_slice(&self.version.to_le_bytes());
        match &self.prev_hash {
            Some(prev) => {
                data.push(1);
                data.extend_from_slice(prev.as_bytes());
            }
            None => {
                data.push(0);
                data.extend_from_slice(Hash256::ZERO.as_bytes());
            }
        }
        data.extend_from_slice(self.merkle_root.as_bytes());
        data.extend_from_slice(&self.timestamp.to_le_bytes());
        data.extend_from_slice(&self.nonce.to_le_bytes());
        let first = Sha256::digest(&data);
        Hash256(Sha256::digest(first).into())
    }
}

/// A complete block: header, coinbase, and ordered regular transactions.
#[derive(
    Serialize, Deserialize, Clone, Debug, PartialEq, Eq,
    bincode::Encode, bincode::Decode,
)]
pub struct Block {
    pub header: BlockHeader,
    /// Mints the block reward. Applied after `transactions`.
    pub coinbase: Transaction,
    /// Regular transactions, validated against the parent's snapshot.
    pub transactions: Vec<Transaction>,
}

impl Block {
    /// Assemble a block on `prev_hash`, filling in the merkle root.
    pub fn new(
        prev_hash: Option<Hash256>,
        coinbase: Transaction,
        transactions: Vec<Transaction>,
        timestamp: u64,
    ) -> Self {
        let merkle_root = merkle_root_of(&coinbase, &transactions);
        Self {
            header: BlockHeader {
                version: crate::constants::PROTOCOL_VERSION,
                prev_hash,
                merkle_root,
                timestamp,
                nonce: 0,
            },
            coinbase,
            transactions,
        }
    }

    /// The block hash (hash of the header).
    pub fn hash(&self) -> Hash256 {
        self.header.hash()
    }

    /// Parent hash, `None` for genesis.
    pub fn parent_hash(&self) -> Option<Hash256> {
        self.header.prev_hash
    }

    /// Whether this block claims to be a genesis block.
    pub fn is_genesis(&self) -> bool {
        self.header.prev_hash.is_none()
    }

    /// Recompute the merkle root from the block's contents.
    pub fn compute_merkle_root(&self) -> Hash256 {
        merkle_root_of(&self.coinbase, &self.transactions)
    }
}

fn merkle_root_of(coinbase: &Transaction, transactions: &[Transaction]) -> Hash256 {
    let txids: Vec<Hash256> = std::iter::once(coinbase)
        .chain(transactions)
        .map(Transaction::txid)
        .collect();
    merkle::merkle_root(&txids)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::COIN;

    fn sample_pubkey_hash() -> Hash256 {
        Hash256([0xAA; 32])
    }

    fn sample_tx() -> Transaction {
        Transaction {
            version: 1,
            inputs: vec![TxInput {
                previous_output: OutPoint::new(Hash256([0x11; 32]), 0),
                signature: vec![0u8; 64],
                public_key: vec![0u8; 32],
            }],
            outputs: vec![TxOutput {
                value: 50 * COIN,
                pubkey_hash: sample_pubkey_hash(),
            }],
            lock_time: 0,
        }
    }

    fn sample_coinbase(height: u64) -> Transaction {
        Transaction::coinbase(
            vec![TxOutput {
                value: 50 * COIN,
                pubkey_hash: sample_pubkey_hash(),
            }],
            height,
        )
    }

    // --- Hash256 ---

    #[test]
    fn hash256_zero_is_zero() {
        let h = Hash256::ZERO;
        assert!(h.is_zero());
        assert_eq!(h, Hash256::default());
    }

    #[test]
    fn hash256_display_hex() {
        let h = Hash256([0xAB; 32]);
        let s = format!("{h}");
        assert_eq!(s.len(), 64);
        assert_eq!(&s[0..2], "ab");
        assert_eq!(h.short(), "abababab");
    }

    #[test]
    fn hash256_equality_is_structural() {
        let a = Hash256::from_bytes([7u8; 32]);
        let b = Hash256::from([7u8; 32]);
        assert_eq!(a, b);
        let mut set = std::collections::HashSet::new();
        set.insert(a);
        assert!(set.contains(&b));
    }

    // --- OutPoint ---

    #[test]
    fn outpoint_display() {
        let op = OutPoint::new(Hash256([0xFF; 32]), 3);
        assert!(format!("{op}").ends_with(":3"));
    }

    // --- Transaction ---

    #[test]
    fn coinbase_detection() {
        assert!(sample_coinbase(0).is_coinbase());
        assert!(!sample_tx().is_coinbase());
    }

    #[test]
    fn coinbase_ids_differ_by_height() {
        assert_ne!(sample_coinbase(1).txid(), sample_coinbase(2).txid());
    }

    #[test]
    fn total_output_value_sums_correctly() {
        let tx = Transaction {
            version: 1,
            inputs: vec![],
            outputs: vec![
                TxOutput {
                    value: 100,
                    pubkey_hash: Hash256::ZERO,
                },
                TxOutput {
                    value: 200,
                    pubkey_hash: Hash256::ZERO,
                },
            ],
            lock_time: 0,
        };
        assert_eq!(tx.total_output_value(), Some(300));
    }

    #[test]
    fn total_output_value_overflow_returns_none() {
        let tx = Transaction {
            version: 1,
            inputs: vec![],
            outputs: vec![
                TxOutput {
                    value: u64::MAX,
                    pubkey_hash: Hash256::ZERO,
                },
                TxOutput {
                    value: 1,
                    pubkey_hash: Hash256::ZERO,
                },
            ],
            lock_time: 0,
        };
        assert_eq!(tx.total_output_value(), None);
    }

    #[test]
    fn txid_changes_with_signature() {
        let tx1 = sample_tx();
        let mut tx2 = sample_tx();
        tx2.inputs[0].signature[0] = 1;
        assert_ne!(tx1.txid(), tx2.txid());
    }

    #[test]
    fn outpoints_enumerate_outputs() {
        let mut tx = sample_tx();
        tx.outputs.push(TxOutput {
            value: 1,
            pubkey_hash: Hash256::ZERO,
        });
        let ops: Vec<_> = tx.outpoints().map(|(op, _)| op).collect();
        assert_eq!(ops.len(), 2);
        assert_eq!(ops[0], OutPoint::new(tx.txid(), 0));
        assert_eq!(ops[1], OutPoint::new(tx.txid(), 1));
    }

    // --- Block ---

    #[test]
    fn genesis_has_no_parent() {
        let block = Block::new(None, sample_coinbase(0), vec![], 1_700_000_000);
        assert!(block.is_genesis());
        assert_eq!(block.parent_hash(), None);
    }

    #[test]
    fn block_hash_commits_to_parent_presence() {
        let genesis = Block::new(None, sample_coinbase(0), vec![], 0);
        let child = Block::new(Some(Hash256::ZERO), sample_coinbase(0), vec![], 0);
        assert_ne!(genesis.hash(), child.hash());
    }

    #[test]
    fn block_hash_commits_to_transactions() {
        let a = Block::new(Some(Hash256::ZERO), sample_coinbase(1), vec![], 0);
        let b = Block::new(Some(Hash256::ZERO), sample_coinbase(1), vec![sample_tx()], 0);
        assert_ne!(a.hash(), b.hash());
        assert_eq!(b.compute_merkle_root(), b.header.merkle_root);
    }

    #[test]
    fn block_header_hash_changes_with_nonce() {
        let block = Block::new(None, sample_coinbase(0), vec![], 0);
        let mut header = block.header.clone();
        header.nonce = 1;
        assert_ne!(block.header.hash(), header.hash());
    }

    #[test]
    fn bincode_round_trip_block() {
        let block = Block::new(Some(Hash256([3; 32])), sample_coinbase(5), vec![sample_tx()], 9);
        let encoded = bincode::encode_to_vec(&block, bincode::config::standard()).unwrap();
        let (decoded, _): (Block, usize) =
            bincode::decode_from_slice(&encoded, bincode::config::standard()).unwrap();
        assert_eq!(block, decoded);
    }
}
