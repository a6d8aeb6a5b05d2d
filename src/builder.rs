//! Molecule → Flexophore graph.
//!
//! Conformer generation and pharmacophore perception are upstream concerns;
//! the builder receives their output on [`Molecule`] and only bins distances.

use tracing::warn;

use crate::model::{Molecule, MolDistHist, PPNode, BINS_HISTOGRAM, MINIMUM_NUM_NODES};
use crate::{Error, Result};

/// Upper end of the histogram distance range, in Ångström.
pub const RANGE_HISTOGRAM: f64 = 25.0;

/// Turns a molecule into a realized distance-histogram graph.
pub trait DescriptorBuilder: Send + Sync {
    fn build(&self, molecule: &Molecule) -> Result<MolDistHist>;
}

/// One node per pharmacophore point; per conformer, the centroid distance of
/// every point pair adds one count to its histogram.
#[derive(Debug, Clone, Copy)]
pub struct HistogramBuilder {
    range: f64,
}

impl Default for HistogramBuilder {
    fn default() -> Self {
        Self { range: RANGE_HISTOGRAM }
    }
}

impl HistogramBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Distances at or beyond `range` land in the last bin.
    pub fn with_range(range: f64) -> Result<Self> {
        if !(range.is_finite() && range > 0.0) {
            return Err(Error::Config(format!("histogram range must be positive, got {range}")));
        }
        Ok(Self { range })
    }

    /// Histogram bin of a distance.
    pub fn bin(&self, distance: f64) -> usize {
        let scaled = distance.max(0.0) / self.range * BINS_HISTOGRAM as f64;
        (scaled as usize).min(BINS_HISTOGRAM - 1)
    }
}

fn centroid(coords: &[[f64; 3]], atoms: &[usize]) -> Result<[f64; 3]> {
    let mut c = [0.0; 3];
    for &a in atoms {
        let p = coords
            .get(a)
            .ok_or_else(|| Error::Build(format!("atom {a} has no coordinates")))?;
        for k in 0..3 {
            c[k] += p[k];
        }
    }
    let n = atoms.len() as f64;
    Ok([c[0] / n, c[1] / n, c[2] / n])
}

fn distance(a: &[f64; 3], b: &[f64; 3]) -> f64 {
    ((a[0] - b[0]).powi(2) + (a[1] - b[1]).powi(2) + (a[2] - b[2]).powi(2)).sqrt()
}

impl DescriptorBuilder for HistogramBuilder {
    fn build(&self, molecule: &Molecule) -> Result<MolDistHist> {
        if molecule.conformers.is_empty() {
            return Err(Error::Build("molecule has no conformers".into()));
        }
        if molecule.points.is_empty() {
            return Err(Error::Build("molecule has no pharmacophore points".into()));
        }

        let mut graph = MolDistHist::with_capacity(molecule.points.len());
        for (k, point) in molecule.points.iter().enumerate() {
            if point.atoms.is_empty() {
                return Err(Error::Build(format!("pharmacophore point {k} spans no atoms")));
            }
            let mut node = PPNode::new();
            for &t in &point.interaction_types {
                node.add(t)?;
            }
            node.realize();
            graph.add_node(&node)?;
        }

        let n = molecule.points.len();
        let mut hists = vec![[0u8; BINS_HISTOGRAM]; crate::model::num_pairs(n)];
        let mut centroids = Vec::with_capacity(n);
        for coords in &molecule.conformers {
            centroids.clear();
            for point in &molecule.points {
                centroids.push(centroid(coords, &point.atoms)?);
            }
            for (slot, (i, j)) in graph.pairs().enumerate() {
                let bin = self.bin(distance(&centroids[i], &centroids[j]));
                hists[slot][bin] = hists[slot][bin].saturating_add(1);
            }
        }
        for (hist, (i, j)) in hists.iter().zip(graph.pairs()) {
            graph.set_dist_hist(i, j, hist)?;
        }

        graph.realize()?;
        if graph.num_nodes() < MINIMUM_NUM_NODES {
            warn!(num_nodes = graph.num_nodes(), "Flexophore graph below minimum node count");
        }
        Ok(graph)
    }
}
