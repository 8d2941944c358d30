//! Chain configuration.
//!
//! [`ChainConfig`] holds the consensus parameters of a [`Ledger`](crate::Ledger):
//! the retention window and the fork-choice policy. Values come from
//! defaults, an optional TOML file, and `ARBOR_*` environment variables, in
//! increasing order of precedence.

use std::path::Path;

use serde::{Deserialize, Serialize};

use arbor_core::constants::CUTOFF_AGE;
use arbor_core::error::ConfigError;

use crate::fork_choice::ForkChoiceKind;

/// Environment variable prefix, e.g. `ARBOR_CUTOFF_AGE=20`.
pub const ENV_PREFIX: &str = "ARBOR";

/// Consensus parameters for a ledger instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChainConfig {
    /// How far, in blocks, a new block may trail the best height.
    pub cutoff_age: u64,
    /// Tie-break between tips at the best height.
    pub fork_choice: ForkChoiceKind,
}

impl Default for ChainConfig {
    fn default() -> Self {
        Self {
            cutoff_age: CUTOFF_AGE,
            fork_choice: ForkChoiceKind::default(),
        }
    }
}

impl ChainConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.cutoff_age == 0 {
            return Err(ConfigError::InvalidCutoffAge(self.cutoff_age));
        }
        Ok(())
    }

    /// Load from a TOML file, then apply `ARBOR_*` environment overrides.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let settings = config::Config::builder()
            .add_source(config::File::from(path))
            .add_source(config::Environment::with_prefix(ENV_PREFIX).try_parsing(true))
            .build()
            .map_err(|e| ConfigError::Load(e.to_string()))?;
        Self::finish(settings)
    }

    /// Parse from a TOML string. Environment variables are not consulted.
    pub fn from_toml_str(toml: &str) -> Result<Self, ConfigError> {
        let settings = config::Config::builder()
            .add_source(config::File::from_str(toml, config::FileFormat::Toml))
            .build()
            .map_err(|e| ConfigError::Load(e.to_string()))?;
        Self::finish(settings)
    }

    fn finish(settings: config::Config) -> Result<Self, ConfigError> {
        let cfg: Self = settings
            .try_deserialize()
            .map_err(|e| ConfigError::Load(e.to_string()))?;
        cfg.validate()?;
        Ok(cfg)
    }
}
