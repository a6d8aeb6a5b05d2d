//! Free list of matcher engines.
//!
//! Borrowing never blocks: an empty pool builds a fresh engine. Engines go
//! back on drop of the [`PooledMatcher`] guard. There is no upper bound; the
//! pool grows to the peak number of concurrent borrowers.
//!
//! Changing the scoring policy replaces every idle engine. Engines that are
//! borrowed at that moment keep the old policy until they come back, and are
//! dropped instead of being re-pooled.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use crossbeam_queue::SegQueue;
use parking_lot::Mutex;
use tracing::debug;

use super::{GraphMatcher, MatcherFactory};
use crate::model::MolDistHist;
use crate::{Error, Result};

/// Lock-free pool of reusable matcher engines.
pub struct MatcherPool<F: MatcherFactory> {
    factory: F,
    idle: SegQueue<F::Matcher>,
    query_biased: AtomicBool,
    created: AtomicUsize,
    /// Serializes policy changes; borrow/release never take it.
    rebuild: Mutex<()>,
}

impl<F: MatcherFactory> MatcherPool<F> {
    pub fn new(factory: F, query_biased: bool) -> Self {
        Self {
            factory,
            idle: SegQueue::new(),
            query_biased: AtomicBool::new(query_biased),
            created: AtomicUsize::new(0),
            rebuild: Mutex::new(()),
        }
    }

    /// Add `n` idle engines with the current policy.
    pub fn prefill(&self, n: usize) {
        let policy = self.query_biased();
        for _ in 0..n {
            self.idle.push(self.create(policy));
        }
    }

    /// Take an engine, building one if the pool is empty.
    pub fn borrow(&self) -> PooledMatcher<'_, F> {
        let policy = self.query_biased();
        let matcher = loop {
            match self.idle.pop() {
                // a release racing a policy switch can leave a stale engine behind
                Some(m) if m.query_biased() != policy => continue,
                Some(m) => break m,
                None => break self.create(policy),
            }
        };
        PooledMatcher { pool: self, matcher: Some(matcher) }
    }

    /// Put an engine back. Engines built for another policy are dropped.
    pub fn release(&self, matcher: F::Matcher) {
        if matcher.query_biased() == self.query_biased() {
            self.idle.push(matcher);
        } else {
            debug!(query_biased = matcher.query_biased(), "dropping stale matcher");
        }
    }

    /// Switch policy and rebuild the idle engines at the current pool size.
    pub fn set_query_biased(&self, query_biased: bool) {
        let _guard = self.rebuild.lock();
        self.query_biased.store(query_biased, Ordering::SeqCst);

        let mut drained = 0;
        while self.idle.pop().is_some() {
            drained += 1;
        }
        for _ in 0..drained {
            self.idle.push(self.create(query_biased));
        }
        debug!(query_biased, engines = drained, "matcher pool rebuilt");
    }

    pub fn query_biased(&self) -> bool {
        self.query_biased.load(Ordering::SeqCst)
    }

    /// Engines currently waiting in the pool.
    pub fn idle_count(&self) -> usize {
        self.idle.len()
    }

    /// Engines built over the pool's lifetime.
    pub fn created_count(&self) -> usize {
        self.created.load(Ordering::Relaxed)
    }

    pub fn factory(&self) -> &F {
        &self.factory
    }

    fn create(&self, query_biased: bool) -> F::Matcher {
        self.created.fetch_add(1, Ordering::Relaxed);
        self.factory.create(query_biased)
    }
}

// ============================================================================
// Borrow guard
// ============================================================================

/// Exclusive handle on a pooled engine; returns it on drop.
///
/// `matcher` is `Some` from `borrow` until `discard` or drop.
pub struct PooledMatcher<'a, F: MatcherFactory> {
    pool: &'a MatcherPool<F>,
    matcher: Option<F::Matcher>,
}

impl<F: MatcherFactory> PooledMatcher<'_, F> {
    /// Drop the engine instead of returning it, e.g. after it panicked.
    pub fn discard(mut self) {
        self.matcher = None;
    }
}

/// The guard scores like the engine it holds.
impl<F: MatcherFactory> GraphMatcher for PooledMatcher<'_, F> {
    fn score(&mut self, query: &MolDistHist, base: &MolDistHist) -> Result<f64> {
        match self.matcher.as_mut() {
            Some(m) => m.score(query, base),
            None => Err(Error::Matcher("pooled engine already released".into())),
        }
    }

    fn query_biased(&self) -> bool {
        self.matcher
            .as_ref()
            .map_or_else(|| self.pool.query_biased(), GraphMatcher::query_biased)
    }
}

impl<F: MatcherFactory> Drop for PooledMatcher<'_, F> {
    fn drop(&mut self) {
        if let Some(matcher) = self.matcher.take() {
            if std::thread::panicking() {
                debug!("discarding matcher borrowed by a panicking thread");
            } else {
                self.pool.release(matcher);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matching::CompleteMatcherFactory;

    fn pool() -> MatcherPool<CompleteMatcherFactory> {
        MatcherPool::new(CompleteMatcherFactory { max_solutions: 10 }, false)
    }

    #[test]
    fn empty_pool_builds_on_demand() {
        let pool = pool();
        assert_eq!(pool.idle_count(), 0);
        {
            let a = pool.borrow();
            let b = pool.borrow();
            assert!(!a.query_biased());
            assert!(!b.query_biased());
            assert_eq!(pool.created_count(), 2);
        }
        assert_eq!(pool.idle_count(), 2);

        let _again = pool.borrow();
        assert_eq!(pool.created_count(), 2);
        assert_eq!(pool.idle_count(), 1);
    }

    #[test]
    fn policy_change_rebuilds_at_same_size() {
        let pool = pool();
        pool.prefill(3);
        pool.set_query_biased(true);
        assert_eq!(pool.idle_count(), 3);
        assert_eq!(pool.created_count(), 6);
        for _ in 0..3 {
            let m = pool.idle.pop().unwrap();
            assert!(m.query_biased());
        }
    }

    #[test]
    fn stale_engines_are_not_repooled() {
        let pool = pool();
        let borrowed = pool.borrow();
        pool.set_query_biased(true);
        drop(borrowed);
        assert_eq!(pool.idle_count(), 0);
        assert!(pool.borrow().query_biased());
    }

    #[test]
    fn discarded_engines_are_dropped() {
        let pool = pool();
        pool.borrow().discard();
        assert_eq!(pool.idle_count(), 0);
    }

    #[test]
    fn guard_scores_with_its_engine() {
        let mut g = MolDistHist::new();
        for l in [1, 2, 3] {
            g.add_node(&crate::model::PPNode::with_labels([l]).unwrap()).unwrap();
        }
        g.realize().unwrap();

        let pool = pool();
        let mut m = pool.borrow();
        assert_eq!(m.score(&g, &g).unwrap(), 1.0);
        drop(m);
        assert_eq!(pool.idle_count(), 1);
    }
}
