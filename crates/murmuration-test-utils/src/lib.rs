//! Test utilities shared across the murmuration workspace.
//!
//! Provides seeded position clouds, a brute-force neighbour reference
//! (the ground truth every hash query is checked against), pre-built
//! agent sets, and small assertion helpers reused by several crates'
//! test suites.

#![forbid(unsafe_code)]
#![allow(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

use glam::Vec3A;
use indexmap::IndexSet;
use murmuration_core::AgentArrays;
use murmuration_pool::ThreadPool;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

/// A deterministic cloud of `n` positions uniform in `[-extents, extents]³`.
pub fn random_cloud(seed: u64, n: usize, extents: f32) -> Vec<Vec3A> {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    (0..n)
        .map(|_| {
            Vec3A::new(
                rng.gen_range(-extents..=extents),
                rng.gen_range(-extents..=extents),
                rng.gen_range(-extents..=extents),
            )
        })
        .collect()
}

/// Ground-truth radius query: every index whose position lies within
/// `radius` of `q` (inclusive), ascending.
pub fn brute_force_neighbours(positions: &[Vec3A], q: Vec3A, radius: f32) -> Vec<u32> {
    let r2 = radius * radius;
    positions
        .iter()
        .enumerate()
        .filter(|(_, &p)| (p - q).length_squared() <= r2)
        .map(|(i, _)| i as u32)
        .collect()
}

/// A small worker pool sized for unit tests.
pub fn test_pool() -> ThreadPool {
    ThreadPool::start(2, 512, 1 << 20).expect("test pool must start")
}

/// Agents parked at the given positions with spatial+boid components,
/// all behaviours, and zero velocity.
pub fn agents_at(positions: &[Vec3A]) -> AgentArrays {
    let mut agents = AgentArrays::with_count(positions.len());
    for (i, &p) in positions.iter().enumerate() {
        agents.positions[i] = p;
        agents.components[i] = murmuration_core::ComponentSet::spatial_boid();
        agents.behaviours[i] = murmuration_core::BehaviourSet::all();
    }
    agents
}

/// Assert that a slice of indices contains no duplicates.
pub fn assert_all_unique(ids: &[u32]) {
    let unique: IndexSet<u32> = ids.iter().copied().collect();
    assert_eq!(unique.len(), ids.len(), "indices contain duplicates");
}
