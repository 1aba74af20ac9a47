//! Shared setup helpers for the murmuration benchmarks.

#![forbid(unsafe_code)]
#![allow(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

use murmuration_hash::SpatialHash;
use murmuration_pool::ThreadPool;
use murmuration_test_utils::random_cloud;

/// Agent counts the benchmarks sweep over.
pub const SWEEP: [usize; 3] = [1_000, 10_000, 100_000];

/// A pool matching a typical desktop configuration.
pub fn bench_pool() -> ThreadPool {
    ThreadPool::start(8, 256, 1 << 20).expect("bench pool must start")
}

/// A hash built over a seeded cloud of `n` agents in a 10-unit cube.
pub fn built_hash(n: usize, pool: &mut ThreadPool) -> SpatialHash {
    let positions = random_cloud(0xBEE, n, 10.0);
    let mut hash = SpatialHash::new(0.5).expect("valid cell size");
    hash.rebuild(&positions, pool).expect("cloud is not degenerate");
    hash
}
