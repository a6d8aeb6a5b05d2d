//! # Pharmacophore Graph Model
//!
//! Clean DTOs that define the Flexophore descriptor.
//! These types cross every boundary: builder ↔ codec ↔ matcher ↔ user.
//!
//! Design rule: NO matcher state, NO codec state here.
//! This module is pure data: no I/O, no pooling, no logging.

pub mod pp_node;
pub mod dist_hist;
pub mod molecule;

pub use pp_node::PPNode;
pub use dist_hist::MolDistHist;
pub use molecule::{Atom, Molecule, PharmacophorePoint};

// ============================================================================
// Constants shared by model, codec and builder
// ============================================================================

/// Number of bins in every distance histogram.
pub const BINS_HISTOGRAM: usize = 80;

/// Largest interaction type a node label may carry.
pub const MAX_INTERACTION_TYPE: u32 = 30_000;

/// The packed node form prefixes each node with a one-byte label count.
pub const MAX_LABELS_PER_NODE: usize = u8::MAX as usize;

/// Smallest graph considered meaningful for comparison.
pub const MINIMUM_NUM_NODES: usize = 3;

/// Number of unordered pairs in a complete graph over `num_nodes` nodes.
#[inline]
pub const fn num_pairs(num_nodes: usize) -> usize {
    if num_nodes < 2 { 0 } else { num_nodes * (num_nodes - 1) / 2 }
}
