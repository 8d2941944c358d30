//! # arbor-core
//! Foundation types for the Arbor ledger: blocks, transactions, UTXO
//! snapshots, and the transaction validator consumed by the branch index.

pub mod constants;
pub mod crypto;
pub mod error;
pub mod merkle;
pub mod snapshot;
pub mod types;
pub mod validation;
