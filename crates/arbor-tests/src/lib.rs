//! Integration test suite for the Arbor ledger.
//!
//! Exercises the branch index and ledger facade through their public API:
//! fork scenarios end to end, randomized block trees checked against the
//! index invariants, and concurrent submission.

pub mod helpers;
