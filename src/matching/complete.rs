//! Complete-graph correspondence search.
//!
//! Every node of the smaller graph is mapped onto a distinct node of the
//! larger graph. A mapping scores
//!
//! ```text
//! mean(node similarity) × mean(histogram overlap over mapped pairs) × coverage
//! ```
//!
//! where coverage is `n_small / n_large`, or, for query-biased engines, the
//! fraction of query nodes that received a partner. Base nodes left over in
//! query-biased mode cost nothing.
//!
//! The search is depth-first over the small graph's nodes. Candidates are
//! tried in descending node similarity, so the first complete mapping is the
//! greedy one. Branches whose optimistic bound cannot beat the best mapping
//! found so far are cut. Exploration stops after `max_solutions` complete
//! mappings, or after `4 × max_solutions` partial extensions beyond the
//! first descent.
//!
//! Histogram overlaps only touch the occupied bins of both histograms (see
//! [`PreparedGraph::overlap`]).

use super::objective::{node_similarity, PreparedGraph};
use super::{GraphMatcher, MatcherFactory, DEFAULT_MAX_SOLUTIONS, MAX_NUM_NODES};
use crate::model::{num_pairs, MolDistHist};
use crate::{Error, Result};

/// Partial extensions allowed per permitted complete mapping.
const VISITS_PER_SOLUTION: usize = 4;

/// Branch-and-bound matcher. Holds scratch buffers; not reentrant.
#[derive(Debug)]
pub struct CompleteGraphMatcher {
    max_solutions: usize,
    query_biased: bool,

    small: PreparedGraph,
    large: PreparedGraph,
    /// `small.len() × large.len()`, row per small node.
    node_sim: Vec<f64>,
    /// Large-graph candidates per small node, best first.
    candidates: Vec<Vec<usize>>,
    assignment: Vec<usize>,
    used: u64,

    coverage: f64,
    best: f64,
    solutions: usize,
    visits: usize,
}

impl CompleteGraphMatcher {
    pub fn new(max_solutions: usize, query_biased: bool) -> Self {
        Self {
            max_solutions: max_solutions.max(1),
            query_biased,
            small: PreparedGraph::default(),
            large: PreparedGraph::default(),
            node_sim: Vec::new(),
            candidates: Vec::new(),
            assignment: Vec::with_capacity(MAX_NUM_NODES),
            used: 0,
            coverage: 0.0,
            best: 0.0,
            solutions: 0,
            visits: 0,
        }
    }

    pub fn max_solutions(&self) -> usize {
        self.max_solutions
    }

    /// Complete mappings evaluated during the last call to `score`.
    pub fn solutions_explored(&self) -> usize {
        self.solutions
    }

    /// Partial extensions tried during the last call to `score`.
    pub fn extensions_explored(&self) -> usize {
        self.visits
    }

    fn check(graph: &MolDistHist) -> Result<()> {
        if !graph.is_finalized() {
            return Err(Error::NotFinalized);
        }
        if graph.num_nodes() > MAX_NUM_NODES {
            return Err(Error::TooManyNodes { num_nodes: graph.num_nodes(), max: MAX_NUM_NODES });
        }
        Ok(())
    }

    fn prepare(&mut self) {
        let (ns, nl) = (self.small.len(), self.large.len());
        self.node_sim.clear();
        for s in 0..ns {
            for l in 0..nl {
                self.node_sim.push(node_similarity(self.small.node(s), self.large.node(l)));
            }
        }

        self.candidates.resize_with(ns, Vec::new);
        for (s, list) in self.candidates.iter_mut().enumerate() {
            let row = &self.node_sim[s * nl..(s + 1) * nl];
            list.clear();
            list.extend(0..nl);
            // stable: ties keep index order
            list.sort_by(|&a, &b| row[b].total_cmp(&row[a]));
        }

        self.assignment.clear();
        self.used = 0;
        self.best = 0.0;
        self.solutions = 0;
        self.visits = 0;
    }

    fn combine(&self, node_sum: f64, hist_sum: f64) -> f64 {
        let ns = self.small.len();
        let pairs = num_pairs(ns);
        let node_mean = node_sum / ns as f64;
        let hist_mean = if pairs == 0 { 1.0 } else { hist_sum / pairs as f64 };
        node_mean * hist_mean * self.coverage
    }

    fn exhausted(&self) -> bool {
        self.solutions >= self.max_solutions
            || self.visits >= self.max_solutions.saturating_mul(VISITS_PER_SOLUTION) + self.small.len()
    }

    fn search(&mut self, depth: usize, node_sum: f64, hist_sum: f64) {
        let ns = self.small.len();
        if depth == ns {
            self.solutions += 1;
            let score = self.combine(node_sum, hist_sum);
            if score > self.best {
                self.best = score;
            }
            return;
        }

        let nl = self.large.len();
        let pairs_left = (num_pairs(ns) - num_pairs(depth + 1)) as f64;
        let nodes_left = (ns - depth - 1) as f64;

        for c in 0..nl {
            if self.exhausted() {
                return;
            }
            let l = self.candidates[depth][c];
            if self.used & (1u64 << l) != 0 {
                continue;
            }
            self.visits += 1;

            let node_total = node_sum + self.node_sim[depth * nl + l];
            let mut hist_total = hist_sum;
            for (a, &mapped) in self.assignment.iter().enumerate() {
                hist_total += self.small.overlap(a, depth, &self.large, mapped, l);
            }

            if self.combine(node_total + nodes_left, hist_total + pairs_left) <= self.best {
                continue;
            }

            self.assignment.push(l);
            self.used |= 1u64 << l;
            self.search(depth + 1, node_total, hist_total);
            self.used &= !(1u64 << l);
            self.assignment.pop();
        }
    }
}

impl GraphMatcher for CompleteGraphMatcher {
    fn score(&mut self, query: &MolDistHist, base: &MolDistHist) -> Result<f64> {
        Self::check(query)?;
        Self::check(base)?;
        let (nq, nb) = (query.num_nodes(), base.num_nodes());
        if nq == 0 || nb == 0 {
            return Ok(0.0);
        }

        let query_is_small = nq <= nb;
        let (small, large) = if query_is_small { (query, base) } else { (base, query) };
        self.small.load(small)?;
        self.large.load(large)?;

        self.coverage = match (self.query_biased, query_is_small) {
            (true, true) => 1.0,
            (true, false) => nb as f64 / nq as f64,
            (false, _) => small.num_nodes() as f64 / large.num_nodes() as f64,
        };

        self.prepare();
        self.search(0, 0.0, 0.0);
        Ok(self.best.clamp(0.0, 1.0))
    }

    fn query_biased(&self) -> bool {
        self.query_biased
    }
}

// ============================================================================
// Factory
// ============================================================================

/// Creates [`CompleteGraphMatcher`] engines.
#[derive(Debug, Clone, Copy)]
pub struct CompleteMatcherFactory {
    pub max_solutions: usize,
}

impl Default for CompleteMatcherFactory {
    fn default() -> Self {
        Self { max_solutions: DEFAULT_MAX_SOLUTIONS }
    }
}

impl MatcherFactory for CompleteMatcherFactory {
    type Matcher = CompleteGraphMatcher;

    fn create(&self, query_biased: bool) -> CompleteGraphMatcher {
        CompleteGraphMatcher::new(self.max_solutions, query_biased)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{PPNode, BINS_HISTOGRAM};

    fn graph(labels: &[u32], peak: impl Fn(usize, usize) -> usize) -> MolDistHist {
        let mut g = MolDistHist::new();
        for &l in labels {
            g.add_node(&PPNode::with_labels([l]).unwrap()).unwrap();
        }
        for (i, j) in g.pairs() {
            let mut h = [0u8; BINS_HISTOGRAM];
            h[peak(i, j)] = 10;
            g.set_dist_hist(i, j, &h).unwrap();
        }
        g.realize().unwrap();
        g
    }

    #[test]
    fn identical_graphs_score_one() {
        let g = graph(&[1, 2, 3, 4], |i, j| 5 * (i + j));
        let mut m = CompleteGraphMatcher::new(1000, false);
        assert_eq!(m.score(&g, &g).unwrap(), 1.0);
    }

    #[test]
    fn permuted_graph_is_found() {
        let a = graph(&[1, 2, 3], |i, j| 10 * i + j);
        // same graph with node order reversed: new k = 2 - old k
        let mut b = MolDistHist::new();
        for l in [3, 2, 1] {
            b.add_node(&PPNode::with_labels([l]).unwrap()).unwrap();
        }
        for (i, j) in a.pairs() {
            b.set_dist_hist(2 - i, 2 - j, &a.dist_hist(i, j).unwrap()).unwrap();
        }
        b.realize().unwrap();

        let mut m = CompleteGraphMatcher::new(1000, false);
        assert_eq!(m.score(&a, &b).unwrap(), 1.0);
    }

    #[test]
    fn extra_base_nodes_cost_coverage_unless_query_biased() {
        let small = graph(&[1, 2], |_, _| 20);
        let large = graph(&[1, 2, 9, 9], |_, _| 20);

        let mut unbiased = CompleteGraphMatcher::new(1000, false);
        assert!((unbiased.score(&small, &large).unwrap() - 0.5).abs() < 1e-12);

        let mut biased = CompleteGraphMatcher::new(1000, true);
        assert_eq!(biased.score(&small, &large).unwrap(), 1.0);
        assert!((biased.score(&large, &small).unwrap() - 0.5).abs() < 1e-12);
    }

    #[test]
    fn disjoint_labels_score_zero() {
        let a = graph(&[1, 2, 3], |_, _| 7);
        let b = graph(&[4, 5, 6], |_, _| 7);
        let mut m = CompleteGraphMatcher::new(1000, false);
        assert_eq!(m.score(&a, &b).unwrap(), 0.0);
    }

    #[test]
    fn solution_bound_is_respected() {
        let a = graph(&[1, 1, 1, 1, 1, 1], |i, j| i + j);
        let b = graph(&[1, 1, 1, 1, 1, 1], |i, j| 2 * (i + j));
        let mut m = CompleteGraphMatcher::new(3, false);
        let s = m.score(&a, &b).unwrap();
        assert!(m.solutions_explored() <= 3);
        assert!((0.0..=1.0).contains(&s));
    }

    #[test]
    fn unrealized_or_oversized_graphs_fail() {
        let mut open = graph(&[1, 2], |_, _| 1);
        open.add_node(&PPNode::with_labels([3]).unwrap()).unwrap();
        let ok = graph(&[1, 2], |_, _| 1);
        let mut m = CompleteGraphMatcher::new(10, false);
        assert!(matches!(m.score(&open, &ok), Err(Error::NotFinalized)));

        let mut big = MolDistHist::new();
        for _ in 0..=MAX_NUM_NODES {
            big.add_node(&PPNode::with_labels([1]).unwrap()).unwrap();
        }
        big.realize().unwrap();
        assert!(matches!(m.score(&ok, &big), Err(Error::TooManyNodes { num_nodes: 65, max: 64 })));
    }

    #[test]
    fn first_descent_completes_under_tight_budget() {
        let labels: Vec<u32> = (0..MAX_NUM_NODES as u32).collect();
        let g = graph(&labels, |i, j| (i + j) % BINS_HISTOGRAM);
        let mut m = CompleteGraphMatcher::new(1, false);
        assert_eq!(m.score(&g, &g).unwrap(), 1.0);
        assert_eq!(m.solutions_explored(), 1);
    }

    #[test]
    fn extensions_are_bounded() {
        let labels = [1u32; 20];
        let a = graph(&labels, |i, j| (3 * i + j) % BINS_HISTOGRAM);
        let b = graph(&labels, |i, j| (i + 5 * j) % BINS_HISTOGRAM);
        let mut m = CompleteGraphMatcher::new(50, false);
        let s = m.score(&a, &b).unwrap();
        assert!(m.extensions_explored() <= 50 * VISITS_PER_SOLUTION + labels.len());
        assert!((0.0..=1.0).contains(&s));
    }
}
