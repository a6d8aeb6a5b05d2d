//! # flexophore-rs: Pharmacophore Distance-Histogram Descriptor
//!
//! A Flexophore describes a molecule as a complete graph of pharmacophore
//! points. Every node carries a set of interaction-type labels, every edge a
//! histogram of the distances observed between the two points across a
//! conformer ensemble.
//!
//! ## Design Principles
//!
//! 1. **Plain data model**: `PPNode` and `MolDistHist` are DTOs, no I/O, no state
//! 2. **Codec owns nothing**: graph → token → graph is a pair of pure functions
//! 3. **Trait seams**: `GraphMatcher`, `MatcherFactory` and `DescriptorBuilder`
//!    are the contracts to the matching kernel and the 3-D builder
//! 4. **No panics across the boundary**: `FlexophoreHandler` turns every
//!    failure into `Descriptor::Failed` or a zero similarity
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use flexophore::{FlexophoreHandler, MolDistHist, PPNode, BINS_HISTOGRAM};
//!
//! # fn example() -> flexophore::Result<()> {
//! let mut graph = MolDistHist::with_capacity(2);
//! graph.add_node(&PPNode::with_labels([1, 5])?)?;
//! graph.add_node(&PPNode::with_labels([3])?)?;
//! let mut hist = [0u8; BINS_HISTOGRAM];
//! hist[12] = 7;
//! graph.set_dist_hist(0, 1, &hist)?;
//! graph.realize()?;
//!
//! let handler = FlexophoreHandler::new();
//! let token = flexophore::codec::encode(&graph)?;
//! let back = flexophore::codec::decode(&token)?;
//! assert_eq!(handler.similarity(&graph, &back), 1.0);
//! # Ok(())
//! # }
//! ```

// ============================================================================
// Modules
// ============================================================================

pub mod model;
pub mod codec;
pub mod matching;
pub mod builder;
pub mod handler;
pub mod config;

// ============================================================================
// Re-exports: Model
// ============================================================================

pub use model::{
    PPNode, MolDistHist, Molecule, Atom, PharmacophorePoint,
    BINS_HISTOGRAM, MAX_INTERACTION_TYPE, MAX_LABELS_PER_NODE, MINIMUM_NUM_NODES,
};

// ============================================================================
// Re-exports: Matching + orchestration
// ============================================================================

pub use matching::{
    GraphMatcher, MatcherFactory, CompleteGraphMatcher, CompleteMatcherFactory,
    MatcherPool, PooledMatcher, MAX_NUM_NODES,
};
pub use builder::{DescriptorBuilder, HistogramBuilder};
pub use handler::{
    Descriptor, DescriptorHandler, DescriptorInfo, FailureReason, FlexophoreHandler,
    normalize_score, FAILED_TOKEN,
};
pub use config::FlexophoreConfig;

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Interaction type {0} exceeds maximum {max}", max = MAX_INTERACTION_TYPE)]
    InteractionTypeOutOfRange(u32),

    #[error("Pharmacophore node holds more than {max} labels", max = MAX_LABELS_PER_NODE)]
    TooManyLabels,

    #[error("Pharmacophore node has no interaction types")]
    EmptyNode,

    #[error("Graph has no nodes and cannot be realized")]
    EmptyGraph,

    #[error("Graph is not finalized, call realize() first")]
    NotFinalized,

    #[error("Node index {index} out of bounds for {num_nodes} nodes")]
    NodeIndexOutOfBounds { index: usize, num_nodes: usize },

    #[error("Invalid node pair ({i}, {j}) for {num_nodes} nodes")]
    InvalidPair { i: usize, j: usize, num_nodes: usize },

    #[error("Histogram length: expected {expected}, got {got}")]
    HistogramLength { expected: usize, got: usize },

    #[error("Parse error at position {position}: {message}")]
    Parse { position: usize, message: String },

    #[error("Decode error: {0}")]
    Decode(String),

    #[error("Node vector contains only zeros")]
    ZeroNodeVector,

    #[error("Token format mismatch: {0}")]
    FormatMismatch(String),

    #[error("Graph has {num_nodes} nodes, matcher supports at most {max}")]
    TooManyNodes { num_nodes: usize, max: usize },

    #[error("Matcher error: {0}")]
    Matcher(String),

    #[error("Descriptor builder error: {0}")]
    Build(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
