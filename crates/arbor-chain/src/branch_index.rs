//! Height-bucketed index of every live branch within the retention window.
//!
//! The [`BranchIndex`] records, for each accepted block, its height, its
//! position in the level for that height, and the frozen UTXO snapshot
//! representing ledger state immediately after it. Blocks may extend any
//! retained block, so several branches are live at once.
//!
//! Retention is bounded by `cutoff_age`:
//! - a block whose height would be `<= best_height - cutoff_age` is refused;
//! - after every accepted block, whole levels at or below
//!   `best_height - cutoff_age - 1` are evicted with their snapshots.
//!
//! Evicted blocks can never come back: any resubmission names a parent that
//! is itself evicted, and is refused as an orphan.
//!
//! Submission runs in three steps so the facade can validate outside its
//! write lock: [`BranchIndex::prepare`] resolves the parent,
//! [`PendingBlock::validate`] runs the validator, and
//! [`BranchIndex::commit`] re-checks against current state and records.
//! [`BranchIndex::submit`] chains all three for single-threaded callers.
//! A rejection at any step leaves the index untouched.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use tracing::{debug, trace};

use arbor_core::error::{BlockRejection, ChainStateError, ConfigError};
use arbor_core::snapshot::UtxoSnapshot;
use arbor_core::types::{Block, Hash256};
use arbor_core::validation::TransactionValidator;

use crate::fork_choice::{FirstSeen, ForkChoice};

/// Bookkeeping for one accepted block.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BlockEntry {
    pub hash: Hash256,
    /// `None` only for genesis.
    pub parent: Option<Hash256>,
    pub height: u64,
    /// Acceptance sequence number, unique and increasing per index.
    pub arrival: u64,
}

/// Result of accepting a block.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BlockAccepted {
    pub hash: Hash256,
    pub height: u64,
    /// Best height after acceptance.
    pub best_height: u64,
    /// Best tip after acceptance.
    pub best_tip: Hash256,
    /// Whether this block became the best tip.
    pub tip_changed: bool,
    /// Number of blocks evicted by this acceptance.
    pub evicted: usize,
}

/// A block whose parent has been resolved but whose transactions have not
/// been validated yet.
///
/// Holds its own handle on the parent snapshot, so the parent may be
/// evicted from the index while validation runs.
#[derive(Clone, Debug)]
pub struct PendingBlock {
    block: Block,
    hash: Hash256,
    height: u64,
    parent_snapshot: UtxoSnapshot,
}

impl PendingBlock {
    pub fn hash(&self) -> Hash256 {
        self.hash
    }

    pub fn height(&self) -> u64 {
        self.height
    }

    pub fn parent_snapshot(&self) -> &UtxoSnapshot {
        &self.parent_snapshot
    }

    /// Run `validator` over the block's transactions and derive its snapshot.
    ///
    /// The block is rejected as a whole if the validator accepts fewer
    /// transactions than the block carries. The coinbase is credited after
    /// the regular transactions, without validation.
    pub fn validate(
        self,
        validator: &dyn TransactionValidator,
    ) -> Result<ValidatedBlock, BlockRejection> {
        let submitted = self.block.transactions.len();
        let outcome = validator.validate(&self.parent_snapshot, &self.block.transactions);
        if !outcome.accepted_all(submitted) {
            return Err(BlockRejection::InvalidTransactions {
                submitted,
                accepted: outcome.accepted.len(),
            });
        }

        let snapshot = outcome.snapshot.with_coinbase(&self.block.coinbase);
        Ok(ValidatedBlock {
            block: self.block,
            hash: self.hash,
            height: self.height,
            snapshot,
        })
    }
}

/// A block whose transactions passed validation, ready to be recorded.
#[derive(Clone, Debug)]
pub struct ValidatedBlock {
    block: Block,
    hash: Hash256,
    height: u64,
    snapshot: UtxoSnapshot,
}

impl ValidatedBlock {
    pub fn hash(&self) -> Hash256 {
        self.hash
    }

    pub fn snapshot(&self) -> &UtxoSnapshot {
        &self.snapshot
    }
}

/// Fork-tracking, bounded-memory store of blocks and their snapshots.
///
/// Not thread-safe on its own; [`Ledger`](crate::ledger::Ledger) wraps it in
/// a `RwLock`.
pub struct BranchIndex {
    cutoff_age: u64,
    fork_choice: Arc<dyn ForkChoice>,
    /// Height → hashes at that height, in arrival order.
    levels: BTreeMap<u64, Vec<Hash256>>,
    /// Hash → entry. Doubles as the height map.
    entries: HashMap<Hash256, BlockEntry>,
    /// Hash → ledger state after that block.
    snapshots: HashMap<Hash256, UtxoSnapshot>,
    /// Hash → block, for the retained window.
    blocks: HashMap<Hash256, Block>,
    best_height: u64,
    best_tip: Hash256,
    next_arrival: u64,
}

impl BranchIndex {
    /// Create an index holding only `genesis`, with the default
    /// [`FirstSeen`] fork choice.
    ///
    /// The genesis snapshot contains exactly the genesis coinbase outputs;
    /// genesis regular transactions, if any, are not applied. The caller
    /// guarantees `genesis` is valid.
    ///
    /// Fails with [`ConfigError::InvalidCutoffAge`] when `cutoff_age` is 0,
    /// since such an index would evict every parent on arrival of its child.
    pub fn new(genesis: Block, cutoff_age: u64) -> Result<Self, ConfigError> {
        Self::with_fork_choice(genesis, cutoff_age, Arc::new(FirstSeen))
    }

    pub fn with_fork_choice(
        genesis: Block,
        cutoff_age: u64,
        fork_choice: Arc<dyn ForkChoice>,
    ) -> Result<Self, ConfigError> {
        if cutoff_age == 0 {
            return Err(ConfigError::InvalidCutoffAge(cutoff_age));
        }
        let hash = genesis.hash();
        let snapshot = UtxoSnapshot::empty().with_coinbase(&genesis.coinbase);

        let mut index = Self {
            cutoff_age,
            fork_choice,
            levels: BTreeMap::new(),
            entries: HashMap::new(),
            snapshots: HashMap::new(),
            blocks: HashMap::new(),
            best_height: 0,
            best_tip: hash,
            next_arrival: 0,
        };
        index.record(genesis, hash, None, 0, snapshot);
        Ok(index)
    }

    // ------------------------------------------------------------------
    // Submission
    // ------------------------------------------------------------------

    /// Validate and record `block` in one step.
    pub fn submit(
        &mut self,
        block: &Block,
        validator: &dyn TransactionValidator,
    ) -> Result<BlockAccepted, BlockRejection> {
        let pending = self.prepare(block)?;
        let validated = pending.validate(validator)?;
        self.commit(validated)
    }

    /// Resolve `block`'s parent and height without mutating the index.
    ///
    /// # Errors
    ///
    /// - [`BlockRejection::OrphanBlock`] if the block has no parent or the
    ///   parent is not retained
    /// - [`BlockRejection::TooOld`] if the block's height is at or below
    ///   `best_height - cutoff_age`
    /// - [`BlockRejection::DuplicateBlock`] if the block is already recorded
    pub fn prepare(&self, block: &Block) -> Result<PendingBlock, BlockRejection> {
        let (hash, parent, height) = self.admit(block)?;
        let parent_snapshot = self
            .snapshots
            .get(&parent)
            .cloned()
            .ok_or(BlockRejection::OrphanBlock {
                parent: Some(parent),
            })?;

        Ok(PendingBlock {
            block: block.clone(),
            hash,
            height,
            parent_snapshot,
        })
    }

    /// Record a validated block.
    ///
    /// Re-runs the admission checks of [`prepare`](Self::prepare) against
    /// the current state, since other blocks may have been committed since.
    /// On success records the block, raises the best height and tip if
    /// warranted, then evicts levels that fell out of the retention window.
    pub fn commit(&mut self, validated: ValidatedBlock) -> Result<BlockAccepted, BlockRejection> {
        let ValidatedBlock {
            block,
            hash,
            height,
            snapshot,
        } = validated;
        let (_, parent, admitted_height) = self.admit(&block)?;
        debug_assert_eq!(height, admitted_height, "parent height is immutable");

        let previous_tip = self.best_tip;
        self.record(block, hash, Some(parent), admitted_height, snapshot);
        let evicted = self.evict();

        Ok(BlockAccepted {
            hash,
            height: admitted_height,
            best_height: self.best_height,
            best_tip: self.best_tip,
            tip_changed: self.best_tip != previous_tip,
            evicted,
        })
    }

    /// Admission checks shared by `prepare` and `commit`, in order:
    /// orphan, too old, duplicate.
    fn admit(&self, block: &Block) -> Result<(Hash256, Hash256, u64), BlockRejection> {
        let parent = block
            .parent_hash()
            .ok_or(BlockRejection::OrphanBlock { parent: None })?;
        let parent_entry = self
            .entries
            .get(&parent)
            .ok_or(BlockRejection::OrphanBlock {
                parent: Some(parent),
            })?;

        let height = parent_entry.height + 1;
        if height.saturating_add(self.cutoff_age) <= self.best_height {
            return Err(BlockRejection::TooOld {
                height,
                best_height: self.best_height,
                cutoff_age: self.cutoff_age,
            });
        }

        let hash = block.hash();
        if self.entries.contains_key(&hash) {
            return Err(BlockRejection::DuplicateBlock(hash));
        }

        Ok((hash, parent, height))
    }

    fn record(
        &mut self,
        block: Block,
        hash: Hash256,
        parent: Option<Hash256>,
        height: u64,
        snapshot: UtxoSnapshot,
    ) {
        let entry = BlockEntry {
            hash,
            parent,
            height,
            arrival: self.next_arrival,
        };
        self.next_arrival += 1;

        if height > self.best_height {
            self.best_height = height;
            self.best_tip = hash;
        } else if height == self.best_height && hash != self.best_tip {
            if let Some(incumbent) = self.entries.get(&self.best_tip) {
                if self.fork_choice.prefers(&entry, incumbent) {
                    self.best_tip = hash;
                }
            }
        }

        self.entries.insert(hash, entry);
        self.levels.entry(height).or_default().push(hash);
        self.snapshots.insert(hash, snapshot);
        self.blocks.insert(hash, block);
        debug!(%hash, height, best_height = self.best_height, "recorded block");
    }

    /// Drop every level at or below `best_height - cutoff_age - 1`.
    fn evict(&mut self) -> usize {
        let mut evicted = 0;
        while let Some(level) = self.levels.first_entry() {
            if level.key().saturating_add(self.cutoff_age) >= self.best_height {
                break;
            }
            let height = *level.key();
            let hashes = level.remove();
            for hash in &hashes {
                self.entries.remove(hash);
                self.snapshots.remove(hash);
                self.blocks.remove(hash);
            }
            trace!(height, count = hashes.len(), "evicted level");
            evicted += hashes.len();
        }
        evicted
    }

    // ------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------

    /// Height of a retained block.
    pub fn height_of(&self, hash: &Hash256) -> Result<u64, ChainStateError> {
        self.entries
            .get(hash)
            .map(|entry| entry.height)
            .ok_or(ChainStateError::BlockNotFound(*hash))
    }

    /// Ledger state immediately after a retained block.
    pub fn snapshot_of(&self, hash: &Hash256) -> Result<UtxoSnapshot, ChainStateError> {
        self.snapshots
            .get(hash)
            .cloned()
            .ok_or(ChainStateError::BlockNotFound(*hash))
    }

    /// Greatest height ever accepted. Never decreases.
    pub fn best_height(&self) -> u64 {
        self.best_height
    }

    /// Preferred block at `best_height` under the configured fork choice.
    pub fn best_tip(&self) -> Hash256 {
        self.best_tip
    }

    /// Snapshot of the best tip.
    pub fn best_snapshot(&self) -> UtxoSnapshot {
        let snapshot = self.snapshots.get(&self.best_tip);
        debug_assert!(snapshot.is_some(), "best tip {} has no snapshot", self.best_tip);
        snapshot.cloned().unwrap_or_default()
    }

    pub fn cutoff_age(&self) -> u64 {
        self.cutoff_age
    }

    pub fn fork_choice(&self) -> &dyn ForkChoice {
        self.fork_choice.as_ref()
    }

    /// Lowest height a new block's parent may have.
    pub fn parent_floor(&self) -> u64 {
        self.best_height.saturating_sub(self.cutoff_age)
    }

    /// Lowest retained height.
    pub fn lowest_height(&self) -> u64 {
        self.levels.keys().next().copied().unwrap_or(self.best_height)
    }

    /// Hashes at `height` in arrival order. Empty if none are retained.
    pub fn level(&self, height: u64) -> &[Hash256] {
        self.levels.get(&height).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Entries at `height` in arrival order.
    pub fn entries_at(&self, height: u64) -> Vec<&BlockEntry> {
        self.level(height)
            .iter()
            .filter_map(|hash| self.entries.get(hash))
            .collect()
    }

    pub fn contains(&self, hash: &Hash256) -> bool {
        self.entries.contains_key(hash)
    }

    pub fn entry(&self, hash: &Hash256) -> Option<&BlockEntry> {
        self.entries.get(hash)
    }

    pub fn block(&self, hash: &Hash256) -> Option<&Block> {
        self.blocks.get(hash)
    }

    /// All retained entries, ordered by height then arrival.
    pub fn entries(&self) -> Vec<&BlockEntry> {
        self.levels
            .values()
            .flatten()
            .filter_map(|hash| self.entries.get(hash))
            .collect()
    }

    /// `hash` followed by its retained ancestors, newest first.
    ///
    /// Stops at genesis or at the oldest ancestor still retained. Empty if
    /// `hash` itself is not retained.
    pub fn ancestry(&self, hash: &Hash256) -> Vec<Hash256> {
        let mut path = Vec::new();
        let mut cursor = self.entries.get(hash);
        while let Some(entry) = cursor {
            path.push(entry.hash);
            cursor = entry.parent.and_then(|parent| self.entries.get(&parent));
        }
        path
    }

    /// Retained blocks with no retained child, deepest first, then by arrival.
    pub fn tips(&self) -> Vec<Hash256> {
        let parents: HashSet<Hash256> = self.entries.values().filter_map(|e| e.parent).collect();
        let mut tips: Vec<&BlockEntry> = self
            .entries
            .values()
            .filter(|entry| !parents.contains(&entry.hash))
            .collect();
        tips.sort_by(|a, b| b.height.cmp(&a.height).then(a.arrival.cmp(&b.arrival)));
        tips.into_iter().map(|entry| entry.hash).collect()
    }

    pub fn block_count(&self) -> usize {
        self.entries.len()
    }

    pub fn snapshot_count(&self) -> usize {
        self.snapshots.len()
    }
}
