//! Thread-safe ledger facade.
//!
//! [`Ledger`] composes the [`BranchIndex`] (behind a `RwLock`), the
//! [`StagingPool`] (behind a `Mutex`) and a [`TransactionValidator`].
//! Block submission validates outside the index lock: the parent snapshot
//! is resolved under a read guard, the validator runs unlocked, and the
//! result is committed under a write guard that re-checks admission.

use std::sync::Arc;

use parking_lot::{Mutex, MutexGuard, RwLock, RwLockReadGuard};
use tracing::{debug, info, warn};

use arbor_core::error::{BlockRejection, ChainStateError, ConfigError};
use arbor_core::snapshot::UtxoSnapshot;
use arbor_core::types::{Block, Hash256, Transaction};
use arbor_core::validation::{TransactionValidator, UtxoValidator};

use crate::branch_index::{BlockAccepted, BranchIndex};
use crate::config::ChainConfig;
use crate::staging::StagingPool;

/// Fork-aware UTXO ledger for a single node.
pub struct Ledger {
    index: RwLock<BranchIndex>,
    staging: Mutex<StagingPool>,
    validator: Arc<dyn TransactionValidator>,
    config: ChainConfig,
}

impl Ledger {
    /// Create a ledger rooted at `genesis`, validating with [`UtxoValidator`].
    ///
    /// `genesis` is trusted: its coinbase outputs form the initial snapshot.
    /// `config` is validated first.
    pub fn new(genesis: Block, config: ChainConfig) -> Result<Self, ConfigError> {
        Self::with_validator(genesis, config, Arc::new(UtxoValidator))
    }

    pub fn with_validator(
        genesis: Block,
        config: ChainConfig,
        validator: Arc<dyn TransactionValidator>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        let hash = genesis.hash();
        let fork_choice = config.fork_choice.build();
        let index = BranchIndex::with_fork_choice(genesis, config.cutoff_age, fork_choice)?;
        info!(
            genesis = %hash.short(),
            cutoff_age = config.cutoff_age,
            fork_choice = config.fork_choice.as_str(),
            "ledger initialized"
        );
        Ok(Self {
            index: RwLock::new(index),
            staging: Mutex::new(StagingPool::new()),
            validator,
            config,
        })
    }

    /// Validate and record `block`.
    ///
    /// On rejection nothing observable changes.
    pub fn submit_block(&self, block: &Block) -> Result<BlockAccepted, BlockRejection> {
        let hash = block.hash();
        match self.try_submit(block) {
            Ok(accepted) => {
                if accepted.tip_changed {
                    info!(
                        hash = %hash.short(),
                        height = accepted.height,
                        evicted = accepted.evicted,
                        "new best tip"
                    );
                } else {
                    debug!(
                        hash = %hash.short(),
                        height = accepted.height,
                        "accepted block on side branch"
                    );
                }
                Ok(accepted)
            }
            Err(rejection) => {
                debug!(hash = %hash.short(), reason = %rejection, "rejected block");
                Err(rejection)
            }
        }
    }

    fn try_submit(&self, block: &Block) -> Result<BlockAccepted, BlockRejection> {
        let pending = self.index.read().prepare(block)?;
        let (hash, height) = (pending.hash(), pending.height());
        let validated = pending.validate(self.validator.as_ref())?;

        let mut index = self.index.write();
        index.commit(validated).inspect_err(|rejection| {
            warn!(
                hash = %hash.short(),
                height,
                reason = %rejection,
                "block lost a race between validation and commit"
            );
        })
    }

    /// Stage a transaction for a future block. Returns its txid.
    ///
    /// No validation happens here; conflicting or invalid transactions are
    /// caught when a block carrying them is submitted.
    pub fn submit_transaction(&self, tx: Transaction) -> Hash256 {
        let txid = self.staging.lock().stage(tx);
        debug!(%txid, "staged transaction");
        txid
    }

    pub fn best_tip(&self) -> Hash256 {
        self.index.read().best_tip()
    }

    /// Ledger state at the best tip.
    pub fn best_snapshot(&self) -> UtxoSnapshot {
        self.index.read().best_snapshot()
    }

    /// Best tip and its snapshot, read under one guard so both describe the
    /// same block.
    pub fn best_state(&self) -> (Hash256, UtxoSnapshot) {
        let index = self.index.read();
        (index.best_tip(), index.best_snapshot())
    }

    pub fn best_height(&self) -> u64 {
        self.index.read().best_height()
    }

    pub fn height_of(&self, hash: &Hash256) -> Result<u64, ChainStateError> {
        self.index.read().height_of(hash)
    }

    pub fn snapshot_of(&self, hash: &Hash256) -> Result<UtxoSnapshot, ChainStateError> {
        self.index.read().snapshot_of(hash)
    }

    pub fn block(&self, hash: &Hash256) -> Option<Block> {
        self.index.read().block(hash).cloned()
    }

    /// Staged transactions in first-staged order.
    pub fn staged_transactions(&self) -> Vec<Transaction> {
        self.staging.lock().contents().into_iter().cloned().collect()
    }

    /// Exclusive access to the staging pool.
    pub fn staging_pool(&self) -> MutexGuard<'_, StagingPool> {
        self.staging.lock()
    }

    /// Shared access to the branch index. Submissions wait while the guard
    /// is held.
    pub fn index(&self) -> RwLockReadGuard<'_, BranchIndex> {
        self.index.read()
    }

    pub fn config(&self) -> &ChainConfig {
        &self.config
    }
}
