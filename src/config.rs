//! Handler configuration.
//!
//! One value, built once at startup and handed to
//! [`FlexophoreHandler::with_config`](crate::FlexophoreHandler::with_config).
//! Missing JSON fields fall back to the defaults below.

use serde::{Deserialize, Serialize};

use crate::matching::{DEFAULT_MAX_SOLUTIONS, MAX_NUM_NODES};
use crate::{Error, Result};

/// Fewest heavy atoms a molecule needs for a descriptor.
pub const MIN_NUM_ATOMS: usize = 6;

/// Most heavy atoms a molecule may have for a descriptor.
pub const MAX_NUM_ATOMS: usize = 70;

/// Exponent of the score normalization curve.
pub const CORRECTION_FACTOR: f64 = 0.44;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FlexophoreConfig {
    pub min_num_atoms: usize,
    pub max_num_atoms: usize,
    /// Complete correspondences explored per comparison.
    pub max_solutions: usize,
    /// Keep caller orientation instead of matching small into large.
    pub query_biased: bool,
    pub correction_factor: f64,
    /// Engines built up front.
    pub initial_pool_size: usize,
    /// Graphs above this node count are rejected before matching.
    pub max_num_nodes: usize,
}

impl Default for FlexophoreConfig {
    fn default() -> Self {
        Self {
            min_num_atoms: MIN_NUM_ATOMS,
            max_num_atoms: MAX_NUM_ATOMS,
            max_solutions: DEFAULT_MAX_SOLUTIONS,
            query_biased: false,
            correction_factor: CORRECTION_FACTOR,
            initial_pool_size: 0,
            max_num_nodes: MAX_NUM_NODES,
        }
    }
}

impl FlexophoreConfig {
    /// Parse and validate a JSON configuration.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn validate(&self) -> Result<()> {
        if self.min_num_atoms > self.max_num_atoms {
            return Err(Error::Config(format!(
                "min_num_atoms {} exceeds max_num_atoms {}",
                self.min_num_atoms, self.max_num_atoms
            )));
        }
        if self.max_solutions == 0 {
            return Err(Error::Config("max_solutions must be at least 1".into()));
        }
        if !(self.correction_factor.is_finite() && self.correction_factor > 0.0) {
            return Err(Error::Config(format!(
                "correction_factor must be positive, got {}",
                self.correction_factor
            )));
        }
        if self.max_num_nodes == 0 || self.max_num_nodes > MAX_NUM_NODES {
            return Err(Error::Config(format!(
                "max_num_nodes must be in 1..={MAX_NUM_NODES}, got {}",
                self.max_num_nodes
            )));
        }
        Ok(())
    }
}
