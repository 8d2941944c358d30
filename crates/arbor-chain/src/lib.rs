//! # arbor-chain
//! Fork-aware ledger state for a single validating node.
//!
//! - [`branch_index`]: every live branch within the retention window, with a
//!   frozen UTXO snapshot per block
//! - [`fork_choice`]: the tie-break policy between tips at the best height
//! - [`staging`]: transactions awaiting inclusion in a block
//! - [`ledger`]: the thread-safe facade composing the three

pub mod branch_index;
pub mod config;
pub mod fork_choice;
pub mod ledger;
pub mod staging;

pub use config::ChainConfig;
pub use ledger::Ledger;
