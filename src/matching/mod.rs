//! # Graph Matching
//!
//! This is the contract between the similarity orchestrator and any
//! correspondence-search kernel. A matcher receives two realized graphs and
//! returns a raw similarity in [0, 1].
//!
//! ## Implementations
//!
//! | Matcher | Module | Description |
//! |---------|--------|-------------|
//! | `CompleteGraphMatcher` | `complete` | Branch-and-bound node correspondence search |
//!
//! Matchers keep scratch state between calls and are therefore `&mut self`.
//! Sharing happens through [`MatcherPool`], never through the engine itself.

pub mod objective;
pub mod complete;
pub mod pool;

use crate::model::MolDistHist;
use crate::Result;

pub use complete::{CompleteGraphMatcher, CompleteMatcherFactory};
pub use pool::{MatcherPool, PooledMatcher};

/// Largest graph the matching objective accepts; one bit per node in a `u64`.
pub const MAX_NUM_NODES: usize = 64;

/// Default bound on complete correspondences explored per comparison.
pub const DEFAULT_MAX_SOLUTIONS: usize = 10_000;

// ============================================================================
// Matcher contract
// ============================================================================

/// A stateful, non-reentrant similarity engine.
pub trait GraphMatcher: Send {
    /// Raw similarity of `query` against `base`, in [0, 1].
    ///
    /// Fails for unrealized graphs and for graphs above the engine's node
    /// limit. Callers decide orientation; the engine scores what it is given.
    fn score(&mut self, query: &MolDistHist, base: &MolDistHist) -> Result<f64>;

    /// The scoring policy the engine was built with.
    fn query_biased(&self) -> bool;
}

/// Builds matcher engines for a given scoring policy.
pub trait MatcherFactory: Send + Sync {
    type Matcher: GraphMatcher;

    fn create(&self, query_biased: bool) -> Self::Matcher;

    /// Largest node count the engines accept.
    fn max_num_nodes(&self) -> usize {
        MAX_NUM_NODES
    }
}
