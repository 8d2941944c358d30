//! Simulated miners competing on a shared ledger.
//!
//! Every round one miner builds a block. Usually it extends the best tip;
//! with probability `fork_rate` it extends a random retained block instead,
//! and with probability `invalid_rate` it produces a faulty block (one on an
//! evicted parent, or one carrying a double spend). Miners spend outputs
//! they own in the parent's snapshot through the ledger's staging pool.

use std::collections::BTreeMap;

use anyhow::{Context, Result};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;
use tracing::{debug, info};

use arbor_chain::Ledger;
use arbor_core::constants::COIN;
use arbor_core::crypto::{sign_all_inputs, KeyPair};
use arbor_core::error::BlockRejection;
use arbor_core::snapshot::UtxoSnapshot;
use arbor_core::types::{Block, Hash256, OutPoint, Transaction, TxInput, TxOutput};

/// Block reward paid to the miner of every simulated block.
pub const REWARD: u64 = 50 * COIN;

const BLOCK_INTERVAL_SECS: u64 = 60;
const GENESIS_TIMESTAMP: u64 = 1_700_000_000;

#[derive(Debug, Clone)]
pub struct SimParams {
    pub rounds: u64,
    pub miners: u8,
    pub fork_rate: f64,
    pub invalid_rate: f64,
    pub seed: u64,
}

/// Outcome of a simulation run.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Summary {
    pub rounds: u64,
    pub accepted: u64,
    pub tip_changes: u64,
    pub evicted: u64,
    pub staged: u64,
    /// Rejection counts by kind.
    pub rejected: BTreeMap<String, u64>,
    pub best_height: u64,
    pub best_tip: String,
    pub lowest_height: u64,
    pub retained_blocks: usize,
    pub retained_snapshots: usize,
    pub live_tips: usize,
    pub cutoff_age: u64,
    pub fork_choice: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Fault {
    StaleParent,
    DoubleSpend,
}

fn rejection_kind(rejection: &BlockRejection) -> &'static str {
    match rejection {
        BlockRejection::OrphanBlock { .. } => "orphan",
        BlockRejection::TooOld { .. } => "too_old",
        BlockRejection::DuplicateBlock(_) => "duplicate",
        BlockRejection::InvalidTransactions { .. } => "invalid_transactions",
    }
}

/// Deterministic key for miner `id`.
pub fn miner_key(id: u8) -> KeyPair {
    KeyPair::from_secret_bytes([id.wrapping_add(1); 32])
}

/// Genesis paying [`REWARD`] to each of `miners`.
pub fn genesis(miners: u8) -> Block {
    let outputs = (0..miners)
        .map(|id| TxOutput {
            value: REWARD,
            pubkey_hash: miner_key(id).pubkey_hash(),
        })
        .collect();
    Block::new(None, Transaction::coinbase(outputs, 0), vec![], GENESIS_TIMESTAMP)
}

fn spend(owner: &KeyPair, outpoint: OutPoint, value: u64, to: Hash256) -> Result<Transaction> {
    let mut tx = Transaction {
        version: 1,
        inputs: vec![TxInput::unsigned(outpoint)],
        outputs: vec![TxOutput {
            value,
            pubkey_hash: to,
        }],
        lock_time: 0,
    };
    sign_all_inputs(&mut tx, owner).context("failed to sign spend")?;
    Ok(tx)
}

struct Simulator<'a> {
    ledger: &'a Ledger,
    params: &'a SimParams,
    keys: Vec<KeyPair>,
    rng: StdRng,
    /// Every accepted block, including evicted ones.
    history: Vec<Block>,
    summary: Summary,
}

impl<'a> Simulator<'a> {
    /// Choose the parent for the next block, with its snapshot when the
    /// parent is still retained.
    fn pick_parent(&mut self, fault: Option<Fault>) -> Result<(Block, Option<UtxoSnapshot>)> {
        if fault == Some(Fault::StaleParent) {
            let evicted: Vec<&Block> = self
                .history
                .iter()
                .filter(|b| self.ledger.height_of(&b.hash()).is_err())
                .collect();
            if !evicted.is_empty() {
                return Ok((evicted[self.rng.gen_range(0..evicted.len())].clone(), None));
            }
        }

        if self.rng.gen_bool(self.params.fork_rate) {
            let index = self.ledger.index();
            let retained = index.entries();
            let hash = retained[self.rng.gen_range(0..retained.len())].hash;
            let block = index.block(&hash).cloned().context("retained block missing")?;
            let snapshot = index.snapshot_of(&hash).context("retained snapshot missing")?;
            Ok((block, Some(snapshot)))
        } else {
            let (tip, snapshot) = self.ledger.best_state();
            let block = self.ledger.block(&tip).context("best tip missing from index")?;
            Ok((block, Some(snapshot)))
        }
    }

    /// Stage spends of outputs owned in the parent's snapshot.
    fn stage_spends(&mut self, snapshot: &UtxoSnapshot, fault: Option<Fault>) -> Result<()> {
        let mut conflict = fault == Some(Fault::DoubleSpend);
        for owner in 0..self.keys.len() {
            let owned = snapshot.outpoints_of(&self.keys[owner].pubkey_hash());
            if owned.is_empty() || !self.rng.gen_bool(0.5) {
                continue;
            }
            let (outpoint, output) = owned[self.rng.gen_range(0..owned.len())].clone();
            let to = self.keys[self.rng.gen_range(0..self.keys.len())].pubkey_hash();
            let tx = spend(&self.keys[owner], outpoint.clone(), output.value, to)?;
            self.ledger.submit_transaction(tx);
            self.summary.staged += 1;

            if conflict {
                let other = self.keys[owner].pubkey_hash();
                let value = output.value.saturating_sub(1).max(1);
                self.ledger.submit_transaction(spend(&self.keys[owner], outpoint, value, other)?);
                self.summary.staged += 1;
                conflict = false;
            }
        }
        Ok(())
    }

    fn round(&mut self, round: u64) -> Result<()> {
        let fault = if !self.rng.gen_bool(self.params.invalid_rate) {
            None
        } else if self.rng.gen_bool(0.5) {
            Some(Fault::StaleParent)
        } else {
            Some(Fault::DoubleSpend)
        };

        let (parent, snapshot) = self.pick_parent(fault)?;
        if let Some(snapshot) = &snapshot {
            self.stage_spends(snapshot, fault)?;
        }

        let miner = self.rng.gen_range(0..self.keys.len());
        let height = self.ledger.height_of(&parent.hash()).map_or(0, |h| h + 1);
        let coinbase = Transaction::coinbase(
            vec![TxOutput {
                value: REWARD,
                pubkey_hash: self.keys[miner].pubkey_hash(),
            }],
            height,
        );
        let transactions = self.ledger.staging_pool().drain();
        let block = Block::new(
            Some(parent.hash()),
            coinbase,
            transactions,
            parent.header.timestamp + BLOCK_INTERVAL_SECS,
        );

        match self.ledger.submit_block(&block) {
            Ok(accepted) => {
                self.summary.accepted += 1;
                self.summary.evicted += accepted.evicted as u64;
                if accepted.tip_changed {
                    self.summary.tip_changes += 1;
                }
                debug!(round, miner, height = accepted.height, "block accepted");
                self.history.push(block);
            }
            Err(rejection) => {
                let kind = rejection_kind(&rejection);
                *self.summary.rejected.entry(kind.to_string()).or_default() += 1;
                debug!(round, miner, ?fault, kind, "block rejected");
            }
        }
        Ok(())
    }
}

/// Run `params.rounds` rounds against `ledger`, which must have been
/// created from [`genesis`]`(params.miners)`.
pub fn run(ledger: &Ledger, genesis: Block, params: &SimParams) -> Result<Summary> {
    anyhow::ensure!(params.miners > 0, "at least one miner is required");
    anyhow::ensure!((0.0..=1.0).contains(&params.fork_rate), "fork rate must be within [0, 1]");
    anyhow::ensure!(
        (0.0..=1.0).contains(&params.invalid_rate),
        "invalid rate must be within [0, 1]"
    );

    let mut sim = Simulator {
        ledger,
        params,
        keys: (0..params.miners).map(miner_key).collect(),
        rng: StdRng::seed_from_u64(params.seed),
        history: vec![genesis],
        summary: Summary {
            rounds: params.rounds,
            ..Summary::default()
        },
    };

    info!(rounds = params.rounds, miners = params.miners, seed = params.seed, "simulation started");
    for round in 0..params.rounds {
        sim.round(round)?;
    }

    let index = ledger.index();
    let mut summary = sim.summary;
    summary.best_height = index.best_height();
    summary.best_tip = index.best_tip().to_string();
    summary.lowest_height = index.lowest_height();
    summary.retained_blocks = index.block_count();
    summary.retained_snapshots = index.snapshot_count();
    summary.live_tips = index.tips().len();
    summary.cutoff_age = index.cutoff_age();
    summary.fork_choice = index.fork_choice().name().to_string();
    info!(
        accepted = summary.accepted,
        best_height = summary.best_height,
        retained = summary.retained_blocks,
        "simulation finished"
    );
    Ok(summary)
}
