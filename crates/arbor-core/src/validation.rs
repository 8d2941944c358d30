//! Transaction validation against a UTXO snapshot.
//!
//! Two levels:
//!
//! - **Structural** ([`validate_transaction_structure`]): context-free checks
//!   on format and internal consistency.
//! - **Contextual** ([`validate_transaction`]): checks against a working UTXO
//!   state: inputs exist, signatures verify, value is conserved.
//!
//! The branch index consumes validation through the [`TransactionValidator`]
//! trait. [`UtxoValidator`] is the reference implementation: it accepts the
//! largest mutually consistent subset of a batch, in a deterministic order.

use std::collections::HashSet;

use crate::constants::{MAX_TX_INPUTS, MAX_TX_OUTPUTS};
use crate::crypto;
use crate::error::TransactionError;
use crate::snapshot::{SnapshotBuilder, UtxoSnapshot};
use crate::types::{OutPoint, Transaction, TxOutput};

/// Result of validating a batch of transactions against a snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationOutcome {
    /// Transactions accepted, in the order they were applied.
    pub accepted: Vec<Transaction>,
    /// State after applying `accepted` to the input snapshot.
    pub snapshot: UtxoSnapshot,
}

impl ValidationOutcome {
    /// Whether every one of `submitted` transactions was accepted.
    pub fn accepted_all(&self, submitted: usize) -> bool {
        self.accepted.len() >= submitted
    }
}

/// Stateless batch validator.
///
/// `validate` must be a pure function of its arguments: the same snapshot and
/// batch always yield the same outcome, and nothing carries over between
/// calls. Returning fewer transactions than submitted signals that at least
/// one was invalid or conflicting.
pub trait TransactionValidator: Send + Sync {
    fn validate(&self, snapshot: &UtxoSnapshot, transactions: &[Transaction]) -> ValidationOutcome;
}

/// Summary of a transaction that passed contextual validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedTransaction {
    /// Total value of all spent inputs.
    pub total_input: u64,
    /// Total value of all created outputs.
    pub total_output: u64,
    /// `total_input - total_output`.
    pub fee: u64,
}

/// Validate transaction structure (context-free).
///
/// - Not a coinbase
/// - Non-empty inputs and outputs, within count limits
/// - No duplicate input outpoints
/// - All output values non-zero, total does not overflow
pub fn validate_transaction_structure(tx: &Transaction) -> Result<(), TransactionError> {
    if tx.is_coinbase() {
        return Err(TransactionError::UnexpectedCoinbase);
    }

    if tx.outputs.is_empty() {
        return Err(TransactionError::EmptyInputsOrOutputs);
    }

    if tx.inputs.len() > MAX_TX_INPUTS {
        return Err(TransactionError::TooManyEntries {
            count: tx.inputs.len(),
            max: MAX_TX_INPUTS,
        });
    }
    if tx.outputs.len() > MAX_TX_OUTPUTS {
        return Err(TransactionError::TooManyEntries {
            count: tx.outputs.len(),
            max: MAX_TX_OUTPUTS,
        });
    }

    let mut seen = HashSet::with_capacity(tx.inputs.len());
    for input in &tx.inputs {
        if !seen.insert(&input.previous_output) {
            return Err(TransactionError::DuplicateInput(input.previous_output.to_string()));
        }
    }

    for (i, output) in tx.outputs.iter().enumerate() {
        if output.value == 0 {
            return Err(TransactionError::ZeroValueOutput(i));
        }
    }

    if tx.total_output_value().is_none() {
        return Err(TransactionError::ValueOverflow);
    }

    Ok(())
}

/// Validate a transaction against a UTXO lookup (contextual).
///
/// Structural checks plus:
/// - every input references an unspent output known to `get_utxo`
/// - every input's signature verifies against that output's owner
/// - total input value covers total output value
///
/// `get_utxo` lets the caller supply any source: a frozen snapshot or a
/// builder holding a partially applied batch.
pub fn validate_transaction<'a, F>(
    tx: &Transaction,
    get_utxo: F,
) -> Result<ValidatedTransaction, TransactionError>
where
    F: Fn(&OutPoint) -> Option<&'a TxOutput>,
{
    validate_transaction_structure(tx)?;

    let mut total_input: u64 = 0;
    for (i, input) in tx.inputs.iter().enumerate() {
        let utxo = get_utxo(&input.previous_output)
            .ok_or_else(|| TransactionError::UnknownUtxo(input.previous_output.to_string()))?;

        crypto::verify_transaction_input(tx, i, &utxo.pubkey_hash)
            .map_err(|_| TransactionError::InvalidSignature { index: i })?;

        total_input = total_input
            .checked_add(utxo.value)
            .ok_or(TransactionError::ValueOverflow)?;
    }

    let total_output = tx.total_output_value().ok_or(TransactionError::ValueOverflow)?;
    if total_input < total_output {
        return Err(TransactionError::InsufficientFunds {
            have: total_input,
            need: total_output,
        });
    }

    Ok(ValidatedTransaction {
        total_input,
        total_output,
        fee: total_input - total_output,
    })
}

/// Reference [`TransactionValidator`].
///
/// Makes repeated passes over the pending transactions in submission order,
/// applying each one that is valid against the running state, until a pass
/// accepts nothing. A transaction may therefore spend an output created by a
/// later transaction in the same batch. Of two transactions spending the
/// same output, the one reached first wins and the other is dropped.
#[derive(Debug, Clone, Copy, Default)]
pub struct UtxoValidator;

impl UtxoValidator {
    pub fn new() -> Self {
        Self
    }
}

impl TransactionValidator for UtxoValidator {
    fn validate(&self, snapshot: &UtxoSnapshot, transactions: &[Transaction]) -> ValidationOutcome {
        let mut state: SnapshotBuilder = snapshot.to_builder();
        let mut pending: Vec<&Transaction> = transactions.iter().collect();
        let mut accepted = Vec::with_capacity(transactions.len());

        loop {
            let before = accepted.len();
            let mut deferred = Vec::with_capacity(pending.len());
            for tx in pending {
                let valid = validate_transaction(tx, |op| state.get(op)).is_ok();
                if valid && state.apply(tx).is_ok() {
                    accepted.push(tx.clone());
                } else {
                    deferred.push(tx);
                }
            }
            pending = deferred;
            if accepted.len() == before || pending.is_empty() {
                break;
            }
        }

        ValidationOutcome {
            accepted,
            snapshot: state.freeze(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::COIN;
    use crate::crypto::{sign_all_inputs, KeyPair};
    use crate::types::{Hash256, TxInput};
    use proptest::prelude::*;

    // --- Helpers ---

    fn key(seed: u8) -> KeyPair {
        KeyPair::from_secret_bytes([seed; 32])
    }

    fn funded(kp: &KeyPair, value: u64) -> (UtxoSnapshot, OutPoint) {
        let cb = Transaction::coinbase(
            vec![TxOutput {
                value,
                pubkey_hash: kp.pubkey_hash(),
            }],
            0,
        );
        let op = OutPoint::new(cb.txid(), 0);
        (UtxoSnapshot::empty().with_coinbase(&cb), op)
    }

    fn signed_spend(kp: &KeyPair, inputs: &[OutPoint], outputs: &[(u64, Hash256)]) -> Transaction {
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
        sign_all_inputs(&mut tx, kp).unwrap();
        tx
    }

    // ==========================================
    // Structural validation
    // ==========================================

    #[test]
    fn structural_rejects_coinbase() {
        let output = TxOutput {
            value: 1,
            pubkey_hash: Hash256::ZERO,
        };
        let cb = Transaction::coinbase(vec![output], 0);
        assert_eq!(validate_transaction_structure(&cb), Err(TransactionError::UnexpectedCoinbase));
    }

    #[test]
    fn structural_rejects_empty_outputs() {
        let kp = key(1);
        let (_, op) = funded(&kp, COIN);
        let tx = signed_spend(&kp, &[op], &[]);
        assert_eq!(
            validate_transaction_structure(&tx),
            Err(TransactionError::EmptyInputsOrOutputs)
        );
    }

    #[test]
    fn structural_rejects_duplicate_input() {
        let kp = key(1);
        let (_, op) = funded(&kp, COIN);
        let tx = signed_spend(&kp, &[op.clone(), op], &[(1, Hash256::ZERO)]);
        assert!(matches!(
            validate_transaction_structure(&tx),
            Err(TransactionError::DuplicateInput(_))
        ));
    }

    #[test]
    fn structural_rejects_zero_value_output() {
        let kp = key(1);
        let (_, op) = funded(&kp, COIN);
        let tx = signed_spend(&kp, &[op], &[(5, Hash256::ZERO), (0, Hash256::ZERO)]);
        assert_eq!(validate_transaction_structure(&tx), Err(TransactionError::ZeroValueOutput(1)));
    }

    // ==========================================
    // Contextual validation
    // ==========================================

    #[test]
    fn contextual_accepts_valid_spend() {
        let kp = key(1);
        let (snap, op) = funded(&kp, 10 * COIN);
        let tx = signed_spend(&kp, &[op], &[(9 * COIN, key(2).pubkey_hash())]);
        let validated = validate_transaction(&tx, |o| snap.get(o)).unwrap();
        assert_eq!(validated.fee, COIN);
    }

    #[test]
    fn contextual_rejects_unknown_input() {
        let kp = key(1);
        let (snap, _) = funded(&kp, COIN);
        let tx = signed_spend(&kp, &[OutPoint::new(Hash256([7; 32]), 0)], &[(1, Hash256::ZERO)]);
        assert!(matches!(
            validate_transaction(&tx, |o| snap.get(o)),
            Err(TransactionError::UnknownUtxo(_))
        ));
    }

    #[test]
    fn contextual_rejects_wrong_signer() {
        let owner = key(1);
        let thief = key(2);
        let (snap, op) = funded(&owner, COIN);
        let tx = signed_spend(&thief, &[op], &[(1, thief.pubkey_hash())]);
        assert_eq!(
            validate_transaction(&tx, |o| snap.get(o)),
            Err(TransactionError::InvalidSignature { index: 0 })
        );
    }

    #[test]
    fn contextual_rejects_overspend() {
        let kp = key(1);
        let (snap, op) = funded(&kp, COIN);
        let tx = signed_spend(&kp, &[op], &[(COIN + 1, Hash256::ZERO)]);
        assert_eq!(
            validate_transaction(&tx, |o| snap.get(o)),
            Err(TransactionError::InsufficientFunds {
                have: COIN,
                need: COIN + 1,
            })
        );
    }

    // ==========================================
    // Batch validation
    // ==========================================

    #[test]
    fn batch_accepts_all_valid() {
        let kp = key(1);
        let (snap, op) = funded(&kp, 10 * COIN);
        let outputs = [(4 * COIN, kp.pubkey_hash()), (5 * COIN, key(2).pubkey_hash())];
        let tx = signed_spend(&kp, &[op.clone()], &outputs);
        let outcome = UtxoValidator.validate(&snap, std::slice::from_ref(&tx));

        assert!(outcome.accepted_all(1));
        assert!(!outcome.snapshot.contains(&op));
        assert_eq!(outcome.snapshot.balance_of(&key(2).pubkey_hash()), 5 * COIN);
        assert!(snap.contains(&op));
    }

    #[test]
    fn batch_drops_double_spend() {
        let kp = key(1);
        let (snap, op) = funded(&kp, 10 * COIN);
        let a = signed_spend(&kp, &[op.clone()], &[(COIN, key(2).pubkey_hash())]);
        let b = signed_spend(&kp, &[op], &[(COIN, key(3).pubkey_hash())]);
        let outcome = UtxoValidator.validate(&snap, &[a.clone(), b]);

        assert_eq!(outcome.accepted, vec![a]);
        assert!(!outcome.accepted_all(2));
    }

    #[test]
    fn batch_resolves_out_of_order_dependency() {
        let kp = key(1);
        let (snap, op) = funded(&kp, 10 * COIN);
        let parent = signed_spend(&kp, &[op], &[(8 * COIN, kp.pubkey_hash())]);
        let child_input = OutPoint::new(parent.txid(), 0);
        let child = signed_spend(&kp, &[child_input], &[(7 * COIN, key(2).pubkey_hash())]);

        let outcome = UtxoValidator.validate(&snap, &[child.clone(), parent.clone()]);
        assert_eq!(outcome.accepted, vec![parent, child]);
        assert_eq!(outcome.snapshot.balance_of(&key(2).pubkey_hash()), 7 * COIN);
    }

    #[test]
    fn batch_is_deterministic() {
        let kp = key(1);
        let (snap, op) = funded(&kp, 10 * COIN);
        let a = signed_spend(&kp, &[op.clone()], &[(COIN, key(2).pubkey_hash())]);
        let b = signed_spend(&kp, &[op], &[(2 * COIN, key(3).pubkey_hash())]);
        let first = UtxoValidator.validate(&snap, &[a.clone(), b.clone()]);
        let second = UtxoValidator.validate(&snap, &[a, b]);
        assert_eq!(first, second);
    }

    #[test]
    fn empty_batch_returns_same_state() {
        let kp = key(1);
        let (snap, _) = funded(&kp, COIN);
        let outcome = UtxoValidator.validate(&snap, &[]);
        assert!(outcome.accepted.is_empty());
        assert_eq!(outcome.snapshot, snap);
    }

    // --- proptest ---

    /// Snapshot holding `n` outputs of 100 owned by `key(1)`.
    fn funded_many(n: u64) -> (UtxoSnapshot, Vec<OutPoint>) {
        let output = TxOutput {
            value: 100,
            pubkey_hash: key(1).pubkey_hash(),
        };
        let cb = Transaction::coinbase(vec![output; n as usize], 0);
        let ops = (0..n).map(|i| OutPoint::new(cb.txid(), i)).collect();
        (UtxoSnapshot::empty().with_coinbase(&cb), ops)
    }

    proptest! {
        #[test]
        fn batch_never_creates_value(
            picks in prop::collection::vec((0usize..4, 1u64..=150, any::<bool>()), 0..8),
        ) {
            let (snap, ops) = funded_many(4);
            let txs: Vec<Transaction> = picks
                .iter()
                .map(|(input, value, honest)| {
                    let signer = if *honest { key(1) } else { key(2) };
                    signed_spend(&signer, &[ops[*input].clone()], &[(*value, key(3).pubkey_hash())])
                })
                .collect();

            let outcome = UtxoValidator.validate(&snap, &txs);
            prop_assert!(outcome.accepted.len() <= txs.len());
            prop_assert!(outcome.snapshot.total_value() <= snap.total_value());

            // Replaying the accepted list reproduces the outcome snapshot.
            let mut replay = snap.to_builder();
            for tx in &outcome.accepted {
                prop_assert!(validate_transaction(tx, |o| replay.get(o)).is_ok());
                replay.apply(tx).unwrap();
            }
            prop_assert_eq!(replay.freeze(), outcome.snapshot);
        }
    }
}
