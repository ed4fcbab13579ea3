//! # Selection Policies
//!
//! A [`SelectionPolicy`] picks one index out of the currently Alive candidates. The pool
//! does the filtering and the locking; a policy only has to answer "which one?".

use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::atomic::{AtomicUsize, Ordering};

/// Strategy used by [`WorkerPool`](super::WorkerPool) to choose a worker.
///
/// `pick` is called with the pool lock held, so implementations must not block.
pub trait SelectionPolicy: Send + Sync {
    /// Returns an index in `0..candidates`. Never called with `candidates == 0`.
    fn pick(&self, candidates: usize) -> usize;

    fn name(&self) -> &str;
}

/// Uniform random choice among the Alive workers.
///
/// The default policy: it spreads load without keeping any per-worker state.
pub struct RandomPolicy {
    seeded: Option<Mutex<StdRng>>,
}

impl RandomPolicy {
    /// Draws from the thread-local generator.
    pub fn new() -> Self {
        Self { seeded: None }
    }

    /// Draws from a deterministic generator, for reproducible tests.
    pub fn seeded(seed: u64) -> Self {
        Self {
            seeded: Some(Mutex::new(StdRng::seed_from_u64(seed))),
        }
    }
}

impl Default for RandomPolicy {
    fn default() -> Self {
        Self::new()
    }
}

impl SelectionPolicy for RandomPolicy {
    fn pick(&self, candidates: usize) -> usize {
        match &self.seeded {
            Some(rng) => rng.lock().random_range(0..candidates),
            None => rand::rng().random_range(0..candidates),
        }
    }

    fn name(&self) -> &str {
        "Random"
    }
}

/// Cycles through the Alive workers in registration order.
pub struct RoundRobinPolicy {
    counter: AtomicUsize,
}

impl RoundRobinPolicy {
    pub fn new() -> Self {
        Self {
            counter: AtomicUsize::new(0),
        }
    }
}

impl Default for RoundRobinPolicy {
    fn default() -> Self {
        Self::new()
    }
}

impl SelectionPolicy for RoundRobinPolicy {
    fn pick(&self, candidates: usize) -> usize {
        self.counter.fetch_add(1, Ordering::Relaxed) % candidates
    }

    fn name(&self) -> &str {
        "RoundRobin"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_random_policy_stays_in_range() {
        let policy = RandomPolicy::new();
        for candidates in 1..20 {
            for _ in 0..50 {
                assert!(policy.pick(candidates) < candidates);
            }
        }
    }

    #[test]
    fn test_seeded_policy_is_reproducible() {
        let a = RandomPolicy::seeded(7);
        let b = RandomPolicy::seeded(7);
        let picks_a: Vec<usize> = (0..32).map(|_| a.pick(5)).collect();
        let picks_b: Vec<usize> = (0..32).map(|_| b.pick(5)).collect();
        assert_eq!(picks_a, picks_b);
    }

    #[test]
    fn test_round_robin_cycles() {
        let policy = RoundRobinPolicy::new();
        let picks: Vec<usize> = (0..6).map(|_| policy.pick(3)).collect();
        assert_eq!(picks, vec![0, 1, 2, 0, 1, 2]);
    }
}
