//! Fork choice between competing tips at the best height.
//!
//! Height alone decides which level holds the best tip. When several blocks
//! share that height, a [`ForkChoice`] policy imposes a total order on them.
//! Nodes that disagree on the policy mine on different branches, so the
//! policy in use is part of a node's consensus configuration.

use std::cmp::Ordering;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use arbor_core::error::ConfigError;
use arbor_core::types::Hash256;

use crate::branch_index::{BlockEntry, BranchIndex};

/// Total order over sibling tips. `Ordering::Less` means `a` is preferred.
///
/// Implementations must be deterministic and must never return
/// `Ordering::Equal` for two distinct entries.
pub trait ForkChoice: Send + Sync {
    /// Short policy name for logs and config.
    fn name(&self) -> &'static str;

    fn compare(&self, a: &BlockEntry, b: &BlockEntry) -> Ordering;

    /// Whether `challenger` should replace `incumbent` as best tip.
    fn prefers(&self, challenger: &BlockEntry, incumbent: &BlockEntry) -> bool {
        self.compare(challenger, incumbent) == Ordering::Less
    }
}

/// The first block accepted at a height wins. Later siblings never displace
/// it, even if a stricter rule would prefer them.
#[derive(Debug, Clone, Copy, Default)]
pub struct FirstSeen;

impl ForkChoice for FirstSeen {
    fn name(&self) -> &'static str {
        "first-seen"
    }

    fn compare(&self, a: &BlockEntry, b: &BlockEntry) -> Ordering {
        a.arrival.cmp(&b.arrival)
    }
}

/// The numerically smallest block hash wins, independent of arrival order.
#[derive(Debug, Clone, Copy, Default)]
pub struct LowestHash;

impl ForkChoice for LowestHash {
    fn name(&self) -> &'static str {
        "lowest-hash"
    }

    fn compare(&self, a: &BlockEntry, b: &BlockEntry) -> Ordering {
        a.hash.cmp(&b.hash)
    }
}

/// Configurable selection of a built-in policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ForkChoiceKind {
    #[default]
    FirstSeen,
    LowestHash,
}

impl ForkChoiceKind {
    pub fn build(self) -> Arc<dyn ForkChoice> {
        match self {
            Self::FirstSeen => Arc::new(FirstSeen),
            Self::LowestHash => Arc::new(LowestHash),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::FirstSeen => "first-seen",
            Self::LowestHash => "lowest-hash",
        }
    }
}

impl FromStr for ForkChoiceKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "first-seen" => Ok(Self::FirstSeen),
            "lowest-hash" => Ok(Self::LowestHash),
            other => Err(ConfigError::UnknownForkChoice(other.to_string())),
        }
    }
}

/// Recompute the best tip of `index` under `policy` from scratch.
///
/// Returns the preferred entry at `best_height`. The index caches this
/// answer in [`BranchIndex::best_tip`]; this function is the reference the
/// cache must agree with.
pub fn select_tip(index: &BranchIndex, policy: &dyn ForkChoice) -> Option<Hash256> {
    index
        .entries_at(index.best_height())
        .into_iter()
        .min_by(|a, b| policy.compare(a, b))
        .map(|entry| entry.hash)
}
