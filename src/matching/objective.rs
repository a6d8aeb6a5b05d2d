//! Pairwise scoring terms of the matching objective.
//!
//! * nodes: Tanimoto coefficient of the two label multisets;
//! * edges: overlap of the blurred, sum-normalized distance histograms.

use crate::model::{num_pairs, MolDistHist, PPNode, BINS_HISTOGRAM};
use crate::Result;

/// Tanimoto coefficient of two sorted label multisets.
pub fn node_similarity(a: &PPNode, b: &PPNode) -> f64 {
    let (x, y) = (a.labels(), b.labels());
    if x.is_empty() && y.is_empty() {
        return 1.0;
    }
    let (mut i, mut j, mut common) = (0, 0, 0usize);
    while i < x.len() && j < y.len() {
        match x[i].cmp(&y[j]) {
            std::cmp::Ordering::Less => i += 1,
            std::cmp::Ordering::Greater => j += 1,
            std::cmp::Ordering::Equal => {
                common += 1;
                i += 1;
                j += 1;
            }
        }
    }
    common as f64 / (x.len() + y.len() - common) as f64
}

/// Smooth `hist` with a 1-2-1 kernel and scale it to unit sum.
///
/// An empty histogram stays all zero.
pub fn blur_normalize(hist: &[u8], out: &mut [f64]) {
    debug_assert_eq!(hist.len(), out.len());
    let n = hist.len();
    let mut sum = 0.0;
    for k in 0..n {
        let left = if k > 0 { f64::from(hist[k - 1]) } else { 0.0 };
        let right = if k + 1 < n { f64::from(hist[k + 1]) } else { 0.0 };
        out[k] = left + 2.0 * f64::from(hist[k]) + right;
        sum += out[k];
    }
    if sum > 0.0 {
        out.iter_mut().for_each(|v| *v /= sum);
    }
}

/// Overlap of two unit-sum histograms in [0, 1].
///
/// Two empty histograms match perfectly; empty against occupied scores zero.
pub fn histogram_overlap(p: &[f64], q: &[f64]) -> f64 {
    overlap_within(p, support(p), q, support(q))
}

/// Bins `[lo, hi)` outside of which `hist` is zero; `lo == hi` when empty.
pub fn support(hist: &[f64]) -> (usize, usize) {
    match hist.iter().position(|&v| v != 0.0) {
        None => (0, 0),
        Some(lo) => {
            let hi = hist.iter().rposition(|&v| v != 0.0).unwrap_or(lo) + 1;
            (lo, hi)
        }
    }
}

/// Overlap restricted to the known supports of both histograms.
fn overlap_within(p: &[f64], (plo, phi): (usize, usize), q: &[f64], (qlo, qhi): (usize, usize)) -> f64 {
    match (plo == phi, qlo == qhi) {
        (true, true) => 1.0,
        (true, false) | (false, true) => 0.0,
        _ if (plo, phi) == (qlo, qhi) && p[plo..phi] == q[qlo..qhi] => 1.0,
        _ => {
            let (lo, hi) = (plo.max(qlo), phi.min(qhi));
            if lo >= hi {
                return 0.0;
            }
            p[lo..hi].iter().zip(&q[lo..hi]).map(|(a, b)| a.min(*b)).sum::<f64>().min(1.0)
        }
    }
}

/// Nodes and blurred histograms of one graph, reused across comparisons.
#[derive(Debug, Default)]
pub struct PreparedGraph {
    nodes: Vec<PPNode>,
    hists: Vec<f64>,
    /// Occupied bin range per pair slot.
    supports: Vec<(usize, usize)>,
}

impl PreparedGraph {
    /// Replace the contents with `graph`, keeping allocations.
    pub fn load(&mut self, graph: &MolDistHist) -> Result<()> {
        self.nodes.clear();
        self.nodes.extend(graph.nodes()?);
        let n = graph.num_nodes();
        self.hists.clear();
        self.hists.resize(num_pairs(n) * BINS_HISTOGRAM, 0.0);
        self.supports.clear();
        self.supports.resize(num_pairs(n), (0, 0));
        for (i, j) in graph.pairs() {
            let slot = Self::slot(i, j);
            let out = &mut self.hists[slot * BINS_HISTOGRAM..(slot + 1) * BINS_HISTOGRAM];
            blur_normalize(graph.dist_hist_slice(i, j)?, out);
            self.supports[slot] = support(out);
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn node(&self, i: usize) -> &PPNode {
        &self.nodes[i]
    }

    /// Prepared histogram of pair (i, j), either order, i != j.
    pub fn hist(&self, i: usize, j: usize) -> &[f64] {
        let slot = Self::ordered_slot(i, j);
        &self.hists[slot * BINS_HISTOGRAM..(slot + 1) * BINS_HISTOGRAM]
    }

    /// Overlap of pair (i, j) here with pair (k, l) of `other`.
    pub fn overlap(&self, i: usize, j: usize, other: &PreparedGraph, k: usize, l: usize) -> f64 {
        let (a, b) = (Self::ordered_slot(i, j), Self::ordered_slot(k, l));
        overlap_within(self.hist(i, j), self.supports[a], other.hist(k, l), other.supports[b])
    }

    #[inline]
    fn ordered_slot(i: usize, j: usize) -> usize {
        if i < j { Self::slot(i, j) } else { Self::slot(j, i) }
    }

    #[inline]
    fn slot(lo: usize, hi: usize) -> usize {
        hi * (hi - 1) / 2 + lo
    }
}
