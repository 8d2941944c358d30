//! Ed25519 signing for transaction inputs.
//!
//! Uses ed25519-dalek for signatures and BLAKE3 for pubkey hashes and
//! signing hashes.
//!
//! # Signing scheme
//!
//! Each input is signed over a **sighash** committing to:
//! - Transaction version and lock_time
//! - All input outpoints (txid + index)
//! - All outputs (value + pubkey_hash)
//! - The index of the input being signed
//!
//! Signatures and public keys are excluded from the sighash, so inputs can be
//! signed independently in any order.

use ed25519_dalek::{Signer, Verifier};
use std::fmt;

use crate::error::CryptoError;
use crate::types::{Hash256, Transaction};

/// Ed25519 keypair for signing transactions.
pub struct KeyPair {
    signing_key: ed25519_dalek::SigningKey,
}

impl KeyPair {
    /// Generate a random keypair using the OS cryptographic RNG.
    pub fn generate() -> Self {
        let mut csprng = rand::rngs::OsRng;
        Self {
            signing_key: ed25519_dalek::SigningKey::generate(&mut csprng),
        }
    }

    /// Create a keypair from 32-byte secret key material.
    pub fn from_secret_bytes(bytes: [u8; 32]) -> Self {
        Self {
            signing_key: ed25519_dalek::SigningKey::from_bytes(&bytes),
        }
    }

    /// Derive the public key from this keypair.
    pub fn public_key(&self) -> PublicKey {
        PublicKey {
            verifying_key: self.signing_key.verifying_key(),
        }
    }

    /// Owner hash of this keypair, as stored in outputs it can spend.
    pub fn pubkey_hash(&self) -> Hash256 {
        self.public_key().pubkey_hash()
    }

    /// Sign a message, returning the raw 64-byte Ed25519 signature.
    pub fn sign(&self, message: &[u8]) -> [u8; 64] {
        self.signing_key.sign(message).to_bytes()
    }
}

impl Clone for KeyPair {
    fn clone(&self) -> Self {
        Self::from_secret_bytes(self.signing_key.to_bytes())
    }
}

impl fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyPair")
            .field("public_key", &self.public_key())
            .finish_non_exhaustive()
    }
}

/// Ed25519 public key.
#[derive(Clone, PartialEq, Eq)]
pub struct PublicKey {
    verifying_key: ed25519_dalek::VerifyingKey,
}

impl PublicKey {
    /// Create a public key from raw bytes (32 bytes).
    pub fn from_bytes(bytes: &[u8; 32]) -> Result<Self, CryptoError> {
        let vk = ed25519_dalek::VerifyingKey::from_bytes(bytes)
            .map_err(|_| CryptoError::InvalidPublicKey)?;
        Ok(Self { verifying_key: vk })
    }

    /// Get the raw public key bytes (32 bytes).
    pub fn to_bytes(&self) -> [u8; 32] {
        self.verifying_key.to_bytes()
    }

    /// Compute the BLAKE3 pubkey hash used in transaction outputs.
    pub fn pubkey_hash(&self) -> Hash256 {
        pubkey_hash(&self.to_bytes())
    }

    /// Verify an Ed25519 signature on a message.
    pub fn verify(&self, message: &[u8], signature: &[u8; 64]) -> Result<(), CryptoError> {
        let sig = ed25519_dalek::Signature::from_bytes(signature);
        self.verifying_key
            .verify(message, &sig)
            .map_err(|_| CryptoError::VerificationFailed)
    }
}

impl fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PublicKey({})", hex::encode(self.to_bytes()))
    }
}

/// Compute the BLAKE3 pubkey hash from raw public key bytes.
pub fn pubkey_hash(pubkey_bytes: &[u8; 32]) -> Hash256 {
    Hash256(blake3::hash(pubkey_bytes).into())
}

/// Compute the signing hash (sighash) for a transaction input.
pub fn signing_hash(tx: &Transaction, input_index: usize) -> Result<Hash256, CryptoError> {
    if input_index >= tx.inputs.len() {
        return Err(CryptoError::InputIndexOutOfBounds {
            index: input_index,
            len: tx.inputs.len(),
        });
    }

    let mut data = Vec::new();
    data.extend_from_slice(&tx.version.to_le_bytes());

    data.extend_from_slice(&(tx.inputs.len() as u64).to_le_bytes());
    for input in &tx.inputs {
        data.extend_from_slice(input.previous_output.txid.as_bytes());
        data.extend_from_slice(&input.previous_output.index.to_le_bytes());
    }

    data.extend_from_slice(&(tx.outputs.len() as u64).to_le_bytes());
    for output in &tx.outputs {
        data.extend_from_slice(&output.value.to_le_bytes());
        data.extend_from_slice(output.pubkey_hash.as_bytes());
    }

    data.extend_from_slice(&tx.lock_time.to_le_bytes());
    data.extend_from_slice(&(input_index as u64).to_le_bytes());

    Ok(Hash256(blake3::hash(&data).into()))
}

/// Sign a transaction input in place, writing signature and public key.
pub fn sign_transaction_input(
    tx: &mut Transaction,
    input_index: usize,
    keypair: &KeyPair,
) -> Result<(), CryptoError> {
    let sighash = signing_hash(tx, input_index)?;
    let signature = keypair.sign(sighash.as_bytes());

    tx.inputs[input_index].signature = signature.to_vec();
    tx.inputs[input_index].public_key = keypair.public_key().to_bytes().to_vec();
    Ok(())
}

/// Sign every input of `tx` with the same keypair.
pub fn sign_all_inputs(tx: &mut Transaction, keypair: &KeyPair) -> Result<(), CryptoError> {
    for index in 0..tx.inputs.len() {
        sign_transaction_input(tx, index, keypair)?;
    }
    Ok(())
}

/// Verify a transaction input's signature against the spent output's owner.
///
/// The input's public key must hash to `expected_pubkey_hash` and its
/// signature must verify over the input's sighash.
pub fn verify_transaction_input(
    tx: &Transaction,
    input_index: usize,
    expected_pubkey_hash: &Hash256,
) -> Result<(), CryptoError> {
    let input = tx.inputs.get(input_index).ok_or(CryptoError::InputIndexOutOfBounds {
        index: input_index,
        len: tx.inputs.len(),
    })?;

    let pk_bytes: [u8; 32] = input
        .public_key
        .as_slice()
        .try_into()
        .map_err(|_| CryptoError::InvalidPublicKey)?;
    let pk = PublicKey::from_bytes(&pk_bytes)?;

    if pk.pubkey_hash() != *expected_pubkey_hash {
        return Err(CryptoError::PubkeyHashMismatch);
    }

    let sig_bytes: [u8; 64] = input
        .signature
        .as_slice()
        .try_into()
        .map_err(|_| CryptoError::InvalidSignature)?;

    let sighash = signing_hash(tx, input_index)?;
    pk.verify(sighash.as_bytes(), &sig_bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{OutPoint, TxInput, TxOutput};

    fn spend(kp: &KeyPair) -> Transaction {
        let mut tx = Transaction {
            version: 1,
            inputs: vec![TxInput::unsigned(OutPoint::new(Hash256([0x11; 32]), 0))],
            outputs: vec![TxOutput {
                value: 10,
                pubkey_hash: Hash256([0x22; 32]),
            }],
            lock_time: 0,
        };
        sign_transaction_input(&mut tx, 0, kp).unwrap();
        tx
    }

    #[test]
    fn keypair_from_secret_deterministic() {
        let kp1 = KeyPair::from_secret_bytes([42u8; 32]);
        let kp2 = KeyPair::from_secret_bytes([42u8; 32]);
        assert_eq!(kp1.public_key(), kp2.public_key());
        assert_eq!(kp1.pubkey_hash(), kp2.pubkey_hash());
    }

    #[test]
    fn generated_keys_differ() {
        assert_ne!(KeyPair::generate().public_key(), KeyPair::generate().public_key());
    }

    #[test]
    fn signed_input_verifies() {
        let kp = KeyPair::from_secret_bytes([1u8; 32]);
        let tx = spend(&kp);
        assert!(verify_transaction_input(&tx, 0, &kp.pubkey_hash()).is_ok());
    }

    #[test]
    fn wrong_owner_rejected() {
        let kp = KeyPair::from_secret_bytes([1u8; 32]);
        let tx = spend(&kp);
        assert_eq!(
            verify_transaction_input(&tx, 0, &Hash256([9; 32])),
            Err(CryptoError::PubkeyHashMismatch)
        );
    }

    #[test]
    fn tampered_output_breaks_signature() {
        let kp = KeyPair::from_secret_bytes([1u8; 32]);
        let mut tx = spend(&kp);
        tx.outputs[0].value += 1;
        assert_eq!(
            verify_transaction_input(&tx, 0, &kp.pubkey_hash()),
            Err(CryptoError::VerificationFailed)
        );
    }

    #[test]
    fn unsigned_input_rejected() {
        let kp = KeyPair::from_secret_bytes([1u8; 32]);
        let mut tx = spend(&kp);
        tx.inputs[0].public_key.clear();
        assert_eq!(
            verify_transaction_input(&tx, 0, &kp.pubkey_hash()),
            Err(CryptoError::InvalidPublicKey)
        );
    }

    #[test]
    fn signing_hash_out_of_bounds() {
        let kp = KeyPair::from_secret_bytes([1u8; 32]);
        let tx = spend(&kp);
        assert_eq!(
            signing_hash(&tx, 5),
            Err(CryptoError::InputIndexOutOfBounds { index: 5, len: 1 })
        );
    }

    #[test]
    fn sign_all_inputs_signs_each() {
        let kp = KeyPair::from_secret_bytes([3u8; 32]);
        let mut tx = Transaction {
            version: 1,
            inputs: vec![
                TxInput::unsigned(OutPoint::new(Hash256([1; 32]), 0)),
                TxInput::unsigned(OutPoint::new(Hash256([1; 32]), 1)),
            ],
            outputs: vec![TxOutput {
                value: 1,
                pubkey_hash: Hash256::ZERO,
            }],
            lock_time: 0,
        };
        sign_all_inputs(&mut tx, &kp).unwrap();
        for i in 0..2 {
            assert!(verify_transaction_input(&tx, i, &kp.pubkey_hash()).is_ok());
        }
    }
}
