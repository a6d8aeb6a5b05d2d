//! # Flexophore descriptor handler
//!
//! Public face of the crate: create, encode, decode and compare descriptors.
//!
//! Descriptor operations never panic and never return `Err`: failures become
//! [`Descriptor::Failed`] and failed comparisons score 0.
//!
//! ```text
//! Molecule ─ strip fragments ─ bounds ─ DescriptorBuilder ─ Descriptor
//! Descriptor × Descriptor ─ orientation ─ MatcherPool ─ GraphMatcher ─ normalize ─ f32
//! ```

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, warn};

use crate::builder::{DescriptorBuilder, HistogramBuilder};
use crate::codec;
use crate::config::FlexophoreConfig;
use crate::matching::{CompleteMatcherFactory, GraphMatcher, MatcherFactory, MatcherPool};
use crate::model::{Molecule, MolDistHist};
use crate::{Error, Result};

/// Token standing for a failed descriptor.
pub const FAILED_TOKEN: &str = "FAILED";

/// Version string of the descriptor definition.
pub const DESCRIPTOR_VERSION: &str = "1.0";

// ============================================================================
// Descriptor value
// ============================================================================

/// Why no graph could be produced.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum FailureReason {
    #[error("{found} heavy atoms, at least {min} required")]
    TooFewAtoms { found: usize, min: usize },

    #[error("{found} heavy atoms, at most {max} allowed")]
    TooManyAtoms { found: usize, max: usize },

    #[error("builder failed: {0}")]
    Builder(String),

    #[error("{found} pharmacophore nodes, at most {max} supported")]
    TooManyNodes { found: usize, max: usize },

    #[error("malformed token: {0}")]
    Malformed(String),

    #[error("token written with other codec constants: {0}")]
    FormatMismatch(String),

    #[error("node vector contains only zeros")]
    CorruptNodeVector,

    /// Decoded from [`FAILED_TOKEN`]; the original reason is not persisted.
    #[error("failed descriptor")]
    Sentinel,
}

/// A Flexophore descriptor: a graph, or the reason there is none.
#[derive(Debug, Clone, PartialEq)]
pub enum Descriptor {
    Graph(MolDistHist),
    Failed(FailureReason),
}

impl Descriptor {
    pub fn graph(&self) -> Option<&MolDistHist> {
        match self {
            Descriptor::Graph(g) => Some(g),
            Descriptor::Failed(_) => None,
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, Descriptor::Failed(_))
    }
}

impl From<MolDistHist> for Descriptor {
    fn from(graph: MolDistHist) -> Self {
        Descriptor::Graph(graph)
    }
}

/// Static description of a descriptor type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DescriptorInfo {
    pub name: String,
    pub short_name: String,
    pub version: String,
    pub is_binary: bool,
    pub is_vector: bool,
    pub needs_coordinates: bool,
}

// ============================================================================
// DescriptorHandler trait
// ============================================================================

/// Contract shared by descriptor implementations.
pub trait DescriptorHandler: Send + Sync {
    type Descriptor;
    type Molecule: ?Sized;

    fn info(&self) -> DescriptorInfo;

    fn version(&self) -> &'static str;

    /// Printable form; failed descriptors encode as a fixed token.
    fn encode(&self, descriptor: &Self::Descriptor) -> String;

    /// `None` for empty input; failures decode to an error descriptor.
    fn decode(&self, token: &str) -> Option<Self::Descriptor>;

    fn create_descriptor(&self, molecule: &Self::Molecule) -> Self::Descriptor;

    /// Similarity in [0, 1]; missing or failed descriptors score 0.
    fn get_similarity(
        &self,
        query: Option<&Self::Descriptor>,
        base: Option<&Self::Descriptor>,
    ) -> f32;

    fn is_descriptor_error(&self, descriptor: &Self::Descriptor) -> bool;
}

// ============================================================================
// Score normalization
// ============================================================================

/// Map a raw matcher score onto the similarity scale.
///
/// `1 - (1 - raw^c)^(1/c)`, clamped to [0, 1]. Monotonic, with fixed points 0 and 1.
pub fn normalize_score(raw: f64, correction_factor: f64) -> f64 {
    if raw.is_nan() || raw <= 0.0 {
        return 0.0;
    }
    if raw >= 1.0 {
        return 1.0;
    }
    let c = correction_factor;
    (1.0 - (1.0 - raw.powf(c)).powf(1.0 / c)).clamp(0.0, 1.0)
}

// ============================================================================
// FlexophoreHandler
// ============================================================================

/// Thread-safe Flexophore orchestrator. Share it by reference or `Arc`.
pub struct FlexophoreHandler<F: MatcherFactory = CompleteMatcherFactory> {
    config: FlexophoreConfig,
    pool: MatcherPool<F>,
    builder: RwLock<Arc<dyn DescriptorBuilder>>,
}

impl FlexophoreHandler<CompleteMatcherFactory> {
    /// Handler with default configuration.
    pub fn new() -> Self {
        let config = FlexophoreConfig::default();
        let factory = CompleteMatcherFactory { max_solutions: config.max_solutions };
        Self::build(config, factory)
    }

    pub fn with_config(config: FlexophoreConfig) -> Result<Self> {
        let factory = CompleteMatcherFactory { max_solutions: config.max_solutions };
        Self::with_factory(config, factory)
    }
}

impl Default for FlexophoreHandler<CompleteMatcherFactory> {
    fn default() -> Self {
        Self::new()
    }
}

impl<F: MatcherFactory> FlexophoreHandler<F> {
    /// Handler using engines from `factory`.
    pub fn with_factory(config: FlexophoreConfig, factory: F) -> Result<Self> {
        config.validate()?;
        Ok(Self::build(config, factory))
    }

    fn build(config: FlexophoreConfig, factory: F) -> Self {
        let pool = MatcherPool::new(factory, config.query_biased);
        pool.prefill(config.initial_pool_size);
        Self {
            config,
            pool,
            builder: RwLock::new(Arc::new(HistogramBuilder::default())),
        }
    }

    pub fn config(&self) -> &FlexophoreConfig {
        &self.config
    }

    pub fn pool(&self) -> &MatcherPool<F> {
        &self.pool
    }

    /// Replace the molecule → graph builder.
    pub fn set_builder(&self, builder: Arc<dyn DescriptorBuilder>) {
        *self.builder.write() = builder;
    }

    /// Switch scoring policy. Idle engines are rebuilt, borrowed ones retire on return.
    pub fn set_query_biased(&self, query_biased: bool) {
        self.pool.set_query_biased(query_biased);
    }

    pub fn is_query_biased(&self) -> bool {
        self.pool.query_biased()
    }

    /// Largest graph accepted for matching.
    pub fn max_num_nodes(&self) -> usize {
        self.config.max_num_nodes.min(self.pool.factory().max_num_nodes())
    }

    // ========================================================================
    // Create
    // ========================================================================

    pub fn create_descriptor(&self, molecule: &Molecule) -> Descriptor {
        let molecule = molecule.strip_small_fragments();
        let heavy = molecule.heavy_atom_count();
        if heavy < self.config.min_num_atoms {
            debug!(heavy, min = self.config.min_num_atoms, "molecule too small for Flexophore");
            return Descriptor::Failed(FailureReason::TooFewAtoms { found: heavy, min: self.config.min_num_atoms });
        }
        if heavy > self.config.max_num_atoms {
            debug!(heavy, max = self.config.max_num_atoms, "molecule too large for Flexophore");
            return Descriptor::Failed(FailureReason::TooManyAtoms { found: heavy, max: self.config.max_num_atoms });
        }

        let builder = Arc::clone(&self.builder.read());
        let mut graph = match panic::catch_unwind(AssertUnwindSafe(|| builder.build(&molecule))) {
            Ok(Ok(graph)) => graph,
            Ok(Err(e)) => {
                warn!(error = %e, "Flexophore builder failed");
                return Descriptor::Failed(FailureReason::Builder(e.to_string()));
            }
            Err(_) => {
                error!("Flexophore builder panicked");
                return Descriptor::Failed(FailureReason::Builder("builder panicked".into()));
            }
        };

        if !graph.is_finalized() {
            if let Err(e) = graph.realize() {
                warn!(error = %e, "Flexophore builder returned an unrealizable graph");
                return Descriptor::Failed(FailureReason::Builder(e.to_string()));
            }
        }

        let max = self.max_num_nodes();
        if graph.num_nodes() > max {
            warn!(num_nodes = graph.num_nodes(), max, "Flexophore graph exceeds matcher node limit");
            return Descriptor::Failed(FailureReason::TooManyNodes { found: graph.num_nodes(), max });
        }
        Descriptor::Graph(graph)
    }

    // ========================================================================
    // Encode / decode
    // ========================================================================

    pub fn encode(&self, descriptor: &Descriptor) -> String {
        match descriptor {
            Descriptor::Graph(graph) => codec::encode(graph).unwrap_or_else(|e| {
                warn!(error = %e, "Flexophore encoding failed");
                FAILED_TOKEN.to_string()
            }),
            Descriptor::Failed(_) => FAILED_TOKEN.to_string(),
        }
    }

    pub fn decode(&self, token: &str) -> Option<Descriptor> {
        if token.trim().is_empty() {
            return None;
        }
        if token == FAILED_TOKEN {
            return Some(Descriptor::Failed(FailureReason::Sentinel));
        }
        let descriptor = match codec::decode(token) {
            Ok(graph) => Descriptor::Graph(graph),
            Err(Error::ZeroNodeVector) => {
                error!("Flexophore token with all-zero node vector");
                Descriptor::Failed(FailureReason::CorruptNodeVector)
            }
            Err(Error::FormatMismatch(msg)) => {
                warn!(%msg, "Flexophore token from incompatible codec");
                Descriptor::Failed(FailureReason::FormatMismatch(msg))
            }
            Err(e) => {
                debug!(error = %e, "malformed Flexophore token");
                Descriptor::Failed(FailureReason::Malformed(e.to_string()))
            }
        };
        Some(descriptor)
    }

    // ========================================================================
    // Similarity
    // ========================================================================

    /// Similarity of two descriptors; `None` and failed descriptors score 0.
    pub fn get_similarity(&self, query: Option<&Descriptor>, base: Option<&Descriptor>) -> f32 {
        match (query.and_then(Descriptor::graph), base.and_then(Descriptor::graph)) {
            (Some(q), Some(b)) => self.similarity(q, b),
            _ => 0.0,
        }
    }

    /// Normalized similarity of two graphs in [0, 1].
    ///
    /// Unless query-biased, the smaller graph is matched into the larger one;
    /// equal sizes are scored both ways and the better direction wins.
    pub fn similarity(&self, query: &MolDistHist, base: &MolDistHist) -> f32 {
        let (nq, nb) = (query.num_nodes(), base.num_nodes());
        if nq == 0 || nb == 0 {
            return 0.0;
        }
        let max = self.max_num_nodes();
        if nq > max || nb > max {
            warn!(query_nodes = nq, base_nodes = nb, max, "graph exceeds matcher node limit");
            return 0.0;
        }

        let raw = if self.is_query_biased() {
            self.raw_score(query, base)
        } else if nq == nb {
            self.raw_score(base, query).max(self.raw_score(query, base))
        } else if nq < nb {
            self.raw_score(query, base)
        } else {
            self.raw_score(base, query)
        };
        normalize_score(raw, self.config.correction_factor) as f32
    }

    /// One matcher call on a pooled engine; failures score 0.
    fn raw_score(&self, query: &MolDistHist, base: &MolDistHist) -> f64 {
        let Ok(mut matcher) = panic::catch_unwind(AssertUnwindSafe(|| self.pool.borrow())) else {
            error!("Flexophore matcher factory panicked");
            return 0.0;
        };
        match panic::catch_unwind(AssertUnwindSafe(|| matcher.score(query, base))) {
            Ok(Ok(score)) => score,
            Ok(Err(e)) => {
                warn!(error = %e, "Flexophore matching failed");
                0.0
            }
            Err(_) => {
                error!("Flexophore matcher panicked, engine discarded");
                matcher.discard();
                0.0
            }
        }
    }

    /// All-pairs similarities, computed on scoped threads sharing the pool.
    pub fn similarity_matrix(&self, descriptors: &[Descriptor]) -> Vec<Vec<f32>> {
        let n = descriptors.len();
        let workers = thread::available_parallelism().map_or(1, |p| p.get()).clamp(1, n.max(1));
        let next = AtomicUsize::new(0);

        let rows: Vec<(usize, Vec<f32>)> = thread::scope(|s| {
            let handles: Vec<_> = (0..workers)
                .map(|_| {
                    s.spawn(|| {
                        let mut done = Vec::new();
                        loop {
                            let i = next.fetch_add(1, Ordering::Relaxed);
                            if i >= n {
                                break done;
                            }
                            let row: Vec<f32> = descriptors[i..]
                                .iter()
                                .map(|other| self.get_similarity(Some(&descriptors[i]), Some(other)))
                                .collect();
                            done.push((i, row));
                        }
                    })
                })
                .collect();
            handles
                .into_iter()
                .flat_map(|h| {
                    h.join().unwrap_or_else(|_| {
                        error!("similarity worker panicked, its rows stay zero");
                        Vec::new()
                    })
                })
                .collect()
        });

        let mut matrix = vec![vec![0.0f32; n]; n];
        for (i, row) in rows {
            for (offset, value) in row.into_iter().enumerate() {
                matrix[i][i + offset] = value;
                matrix[i + offset][i] = value;
            }
        }
        matrix
    }
}

impl<F: MatcherFactory> DescriptorHandler for FlexophoreHandler<F> {
    type Descriptor = Descriptor;
    type Molecule = Molecule;

    fn info(&self) -> DescriptorInfo {
        DescriptorInfo {
            name: "Flexophore".into(),
            short_name: "Flexophore".into(),
            version: DESCRIPTOR_VERSION.into(),
            is_binary: false,
            is_vector: false,
            needs_coordinates: true,
        }
    }

    fn version(&self) -> &'static str {
        DESCRIPTOR_VERSION
    }

    fn encode(&self, descriptor: &Descriptor) -> String {
        FlexophoreHandler::encode(self, descriptor)
    }

    fn decode(&self, token: &str) -> Option<Descriptor> {
        FlexophoreHandler::decode(self, token)
    }

    fn create_descriptor(&self, molecule: &Molecule) -> Descriptor {
        FlexophoreHandler::create_descriptor(self, molecule)
    }

    fn get_similarity(&self, query: Option<&Descriptor>, base: Option<&Descriptor>) -> f32 {
        FlexophoreHandler::get_similarity(self, query, base)
    }

    fn is_descriptor_error(&self, descriptor: &Descriptor) -> bool {
        descriptor.is_failed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{PPNode, BINS_HISTOGRAM};

    fn graph(labels: &[u32]) -> MolDistHist {
        let mut g = MolDistHist::new();
        for &l in labels {
            g.add_node(&PPNode::with_labels([l]).unwrap()).unwrap();
        }
        for (i, j) in g.pairs() {
            let mut h = [0u8; BINS_HISTOGRAM];
            h[(i * 7 + j * 3) % BINS_HISTOGRAM] = 3;
            g.set_dist_hist(i, j, &h).unwrap();
        }
        g.realize().unwrap();
        g
    }

    #[test]
    fn normalization_fixed_points_and_monotonicity() {
        let c = crate::config::CORRECTION_FACTOR;
        assert_eq!(normalize_score(0.0, c), 0.0);
        assert_eq!(normalize_score(-0.3, c), 0.0);
        assert_eq!(normalize_score(1.0, c), 1.0);
        assert_eq!(normalize_score(1.7, c), 1.0);
        assert_eq!(normalize_score(f64::NAN, c), 0.0);
        let mut last = 0.0;
        for k in 1..100 {
            let v = normalize_score(k as f64 / 100.0, c);
            assert!(v > last, "not increasing at {k}");
            last = v;
        }
    }

    #[test]
    fn normalization_lifts_mid_range_scores() {
        let c = crate::config::CORRECTION_FACTOR;
        assert!((normalize_score(0.5, c) - 0.952).abs() < 1e-3);
        for k in 1..100 {
            let raw = k as f64 / 100.0;
            assert!(normalize_score(raw, c) > raw, "not lifted at {raw}");
        }
    }

    #[test]
    fn self_similarity_is_one() {
        let handler = FlexophoreHandler::new();
        let g = graph(&[1, 2, 3]);
        assert_eq!(handler.similarity(&g, &g), 1.0);
    }

    #[test]
    fn degenerate_inputs_score_zero() {
        let handler = FlexophoreHandler::new();
        let g = Descriptor::Graph(graph(&[1, 2, 3]));
        let empty = Descriptor::Graph(MolDistHist::new());
        let failed = Descriptor::Failed(FailureReason::Sentinel);
        assert_eq!(handler.get_similarity(None, Some(&g)), 0.0);
        assert_eq!(handler.get_similarity(Some(&g), None), 0.0);
        assert_eq!(handler.get_similarity(Some(&empty), Some(&g)), 0.0);
        assert_eq!(handler.get_similarity(Some(&g), Some(&failed)), 0.0);
        assert_eq!(handler.pool().created_count(), 0);
    }

    #[test]
    fn decode_sentinels() {
        let handler = FlexophoreHandler::new();
        assert_eq!(handler.decode(""), None);
        assert_eq!(handler.decode(FAILED_TOKEN), Some(Descriptor::Failed(FailureReason::Sentinel)));
        assert!(matches!(handler.decode("garbage"), Some(Descriptor::Failed(FailureReason::Malformed(_)))));
        assert_eq!(handler.encode(&Descriptor::Failed(FailureReason::CorruptNodeVector)), FAILED_TOKEN);
    }

    #[test]
    fn info_describes_flexophore() {
        let handler = FlexophoreHandler::new();
        let info = handler.info();
        assert_eq!(info.short_name, "Flexophore");
        assert!(info.needs_coordinates);
        assert_eq!(DescriptorHandler::version(&handler), DESCRIPTOR_VERSION);
    }
}
