//! Error types for the Arbor ledger.
use thiserror::Error;

use crate::types::Hash256;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransactionError {
    #[error("unknown UTXO: {0}")] UnknownUtxo(String),
    #[error("insufficient funds: have {have}, need {need}")] InsufficientFunds { have: u64, need: u64 },
    #[error("invalid signature on input {index}")] InvalidSignature { index: usize },
    #[error("duplicate input: {0}")] DuplicateInput(String),
    #[error("too many inputs or outputs: {count} > {max}")] TooManyEntries { count: usize, max: usize },
    #[error("empty inputs or outputs")] EmptyInputsOrOutputs,
    #[error("value overflow")] ValueOverflow,
    #[error("coinbase cannot be validated as a regular transaction")] UnexpectedCoinbase,
    #[error("zero-value output at index {0}")] ZeroValueOutput(usize),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CryptoError {
    #[error("invalid public key bytes")] InvalidPublicKey,
    #[error("invalid signature bytes")] InvalidSignature,
    #[error("signature verification failed")] VerificationFailed,
    #[error("pubkey hash does not match expected")] PubkeyHashMismatch,
    #[error("input index out of bounds: {index} >= {len}")] InputIndexOutOfBounds { index: usize, len: usize },
}

/// Why a submitted block was not added to the branch index.
///
/// Every variant is non-fatal: the index is left exactly as it was before
/// the submission.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BlockRejection {
    /// Parent is absent (a second genesis) or not retained by the index.
    #[error("orphan block: parent {} unknown", display_parent(.parent))]
    OrphanBlock { parent: Option<Hash256> },
    /// Block would sit at or below `best_height - cutoff_age`.
    #[error("block at height {height} too old: best height {best_height}, cutoff age {cutoff_age}")]
    TooOld { height: u64, best_height: u64, cutoff_age: u64 },
    /// Hash already recorded. Nothing changed.
    #[error("duplicate block: {0}")]
    DuplicateBlock(Hash256),
    /// The validator accepted fewer transactions than the block carries.
    #[error("invalid transactions: {accepted} of {submitted} accepted")]
    InvalidTransactions { submitted: usize, accepted: usize },
}

fn display_parent(parent: &Option<Hash256>) -> String {
    match parent {
        Some(hash) => hash.to_string(),
        None => "<none>".into(),
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ChainStateError {
    #[error("block not found: {0}")] BlockNotFound(Hash256),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("cutoff age must be at least 1, got {0}")] InvalidCutoffAge(u64),
    #[error("unknown fork choice policy: {0}")] UnknownForkChoice(String),
    #[error("failed to load config: {0}")] Load(String),
}
