//! Distance-histogram graph: the Flexophore descriptor itself.
//!
//! A complete undirected graph over N pharmacophore nodes. Nodes live packed
//! in one flat byte buffer (see [`PPNode::write_packed`]); histograms live in
//! one flat buffer of `BINS_HISTOGRAM` bytes per unordered pair.
//!
//! Pair storage is laid out by the larger index so that adding a node only
//! appends the histograms of the new pairs:
//!
//! ```text
//! slot(i, j) = j * (j - 1) / 2 + i        (i < j)
//! (0,1) | (0,2) (1,2) | (0,3) (1,3) (2,3) | ...
//! ```
//!
//! Everything that leaves the graph (text form, codec) walks the pairs in
//! row-major upper-triangular order instead: (0,1), (0,2) … (1,2) …
//!
//! Writes clear the finalized flag; [`MolDistHist::realize`] sets it again.

use std::fmt;
use std::str::FromStr;

use super::{num_pairs, PPNode, BINS_HISTOGRAM};
use crate::{Error, Result};

/// Pharmacophore graph with one distance histogram per node pair.
#[derive(Debug, Clone, Default)]
pub struct MolDistHist {
    num_nodes: usize,
    /// Packed node records: `[count][labels u16 LE]...`
    nodes: Vec<u8>,
    /// `num_pairs(num_nodes) * BINS_HISTOGRAM` bytes, slot order.
    hists: Vec<u8>,
    finalized: bool,
}

#[inline]
fn slot(i: usize, j: usize) -> usize {
    debug_assert!(i < j);
    j * (j - 1) / 2 + i
}

impl MolDistHist {
    /// Empty graph. A zero-node graph is never similar to anything.
    pub fn new() -> Self {
        Self::default()
    }

    /// Empty graph with buffers pre-allocated for `num_nodes` nodes.
    pub fn with_capacity(num_nodes: usize) -> Self {
        Self {
            num_nodes: 0,
            nodes: Vec::with_capacity(num_nodes * 3),
            hists: Vec::with_capacity(num_pairs(num_nodes) * BINS_HISTOGRAM),
            finalized: false,
        }
    }

    // ========================================================================
    // Construction
    // ========================================================================

    /// Append a node. Its pairs to all earlier nodes start with empty histograms.
    pub fn add_node(&mut self, node: &PPNode) -> Result<()> {
        if node.is_empty() {
            return Err(Error::EmptyNode);
        }
        node.write_packed(&mut self.nodes);
        self.num_nodes += 1;
        let new_pairs = self.num_nodes - 1;
        self.hists.resize(self.hists.len() + new_pairs * BINS_HISTOGRAM, 0);
        self.finalized = false;
        Ok(())
    }

    /// Store the histogram of pair (i, j). Argument order does not matter.
    pub fn set_dist_hist(&mut self, i: usize, j: usize, hist: &[u8]) -> Result<()> {
        if hist.len() != BINS_HISTOGRAM {
            return Err(Error::HistogramLength { expected: BINS_HISTOGRAM, got: hist.len() });
        }
        let range = self.pair_range(i, j)?;
        self.hists[range].copy_from_slice(hist);
        self.finalized = false;
        Ok(())
    }

    /// Trim buffers and mark the graph finalized.
    pub fn realize(&mut self) -> Result<()> {
        if self.num_nodes == 0 {
            return Err(Error::EmptyGraph);
        }
        self.nodes.shrink_to_fit();
        self.hists.shrink_to_fit();
        self.finalized = true;
        Ok(())
    }

    pub fn is_finalized(&self) -> bool {
        self.finalized
    }

    // ========================================================================
    // Access
    // ========================================================================

    pub fn num_nodes(&self) -> usize {
        self.num_nodes
    }

    pub fn num_pairs(&self) -> usize {
        num_pairs(self.num_nodes)
    }

    /// Copy of the histogram of pair (i, j).
    ///
    /// There is no pair to return for graphs with one node or less; callers
    /// check `num_nodes()` first.
    pub fn dist_hist(&self, i: usize, j: usize) -> Result<[u8; BINS_HISTOGRAM]> {
        let mut out = [0u8; BINS_HISTOGRAM];
        out.copy_from_slice(self.dist_hist_slice(i, j)?);
        Ok(out)
    }

    /// Borrowed view of the histogram of pair (i, j).
    pub fn dist_hist_slice(&self, i: usize, j: usize) -> Result<&[u8]> {
        let range = self.pair_range(i, j)?;
        Ok(&self.hists[range])
    }

    /// Deep copy of node `i`. Scans the packed buffer, O(N).
    pub fn node(&self, index: usize) -> Result<PPNode> {
        let record = self
            .node_records()
            .nth(index)
            .ok_or(Error::NodeIndexOutOfBounds { index, num_nodes: self.num_nodes })?;
        PPNode::read_packed(record).map(|(node, _)| node)
    }

    /// All nodes, decoded in one pass.
    pub fn nodes(&self) -> Result<Vec<PPNode>> {
        self.node_records()
            .map(|record| PPNode::read_packed(record).map(|(node, _)| node))
            .collect()
    }

    /// The packed node buffer.
    pub fn node_bytes(&self) -> &[u8] {
        &self.nodes
    }

    /// Unordered pairs in row-major upper-triangular order.
    pub fn pairs(&self) -> impl Iterator<Item = (usize, usize)> + use<> {
        let n = self.num_nodes;
        (0..n).flat_map(move |i| (i + 1..n).map(move |j| (i, j)))
    }

    /// Packed byte slice of each node, in insertion order.
    fn node_records(&self) -> impl Iterator<Item = &[u8]> + '_ {
        let mut offset = 0;
        (0..self.num_nodes).map_while(move |_| {
            let count = *self.nodes.get(offset)? as usize;
            let end = (offset + 1 + count * 2).min(self.nodes.len());
            let record = &self.nodes[offset..end];
            offset = end;
            Some(record)
        })
    }

    fn pair_range(&self, i: usize, j: usize) -> Result<std::ops::Range<usize>> {
        let (lo, hi) = if i < j { (i, j) } else { (j, i) };
        if lo == hi || hi >= self.num_nodes {
            return Err(Error::InvalidPair { i, j, num_nodes: self.num_nodes });
        }
        let start = slot(lo, hi) * BINS_HISTOGRAM;
        Ok(start..start + BINS_HISTOGRAM)
    }

    /// Parse the canonical text form. The result is realized.
    pub fn read(s: &str) -> Result<Self> {
        s.parse()
    }
}

impl PartialEq for MolDistHist {
    /// Node count, then nodes, then histograms byte-for-byte.
    fn eq(&self, other: &Self) -> bool {
        self.num_nodes == other.num_nodes
            && self.node_records().eq(other.node_records())
            && self.hists == other.hists
    }
}

impl Eq for MolDistHist {}

// ============================================================================
// Text form: [(l,l)(l)...][b,b,...][b,b,...]...
// ============================================================================

impl fmt::Display for MolDistHist {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[")?;
        for record in self.node_records() {
            match PPNode::read_packed(record) {
                Ok((node, _)) => write!(f, "{node}")?,
                Err(_) => f.write_str("(?)")?,
            }
        }
        f.write_str("]")?;
        for (i, j) in self.pairs() {
            let hist = &self.hists[slot(i, j) * BINS_HISTOGRAM..][..BINS_HISTOGRAM];
            f.write_str("[")?;
            for (k, bin) in hist.iter().enumerate() {
                if k > 0 {
                    f.write_str(",")?;
                }
                write!(f, "{bin}")?;
            }
            f.write_str("]")?;
        }
        Ok(())
    }
}

impl FromStr for MolDistHist {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let parse_err = |rest: &str, message: String| Error::Parse {
            position: s.len() - rest.len(),
            message,
        };

        let body = s
            .trim_start()
            .strip_prefix('[')
            .ok_or_else(|| parse_err(s, "expected '[' opening the node list".into()))?;
        let close = body
            .find(']')
            .ok_or_else(|| parse_err(body, "unterminated node list".into()))?;

        let mut graph = MolDistHist::new();
        let mut nodes = body[..close].trim_start();
        while !nodes.is_empty() {
            let end = nodes
                .find(')')
                .ok_or_else(|| parse_err(nodes, "unterminated node".into()))?;
            let node: PPNode = nodes[..=end]
                .parse()
                .map_err(|e| parse_err(nodes, format!("bad node: {e}")))?;
            graph.add_node(&node)?;
            nodes = nodes[end + 1..].trim_start();
        }

        let pairs: Vec<(usize, usize)> = graph.pairs().collect();
        let mut rest = &body[close + 1..];
        let mut hist = [0u8; BINS_HISTOGRAM];
        for &(i, j) in &pairs {
            rest = rest.trim_start();
            let inner = rest
                .strip_prefix('[')
                .ok_or_else(|| parse_err(rest, format!("expected histogram for pair ({i}, {j})")))?;
            let end = inner
                .find(']')
                .ok_or_else(|| parse_err(inner, "unterminated histogram".into()))?;
            let mut count = 0;
            for part in inner[..end].split(',') {
                if count == BINS_HISTOGRAM {
                    return Err(parse_err(inner, format!("more than {BINS_HISTOGRAM} bins")));
                }
                hist[count] = part
                    .trim()
                    .parse()
                    .map_err(|_| parse_err(inner, format!("invalid bin value '{part}'")))?;
                count += 1;
            }
            if count != BINS_HISTOGRAM {
                return Err(parse_err(inner, format!("expected {BINS_HISTOGRAM} bins, got {count}")));
            }
            graph.set_dist_hist(i, j, &hist)?;
            rest = &inner[end + 1..];
        }
        if !rest.trim().is_empty() {
            return Err(parse_err(rest, "trailing data after last histogram".into()));
        }

        graph.realize()?;
        Ok(graph)
    }
}
