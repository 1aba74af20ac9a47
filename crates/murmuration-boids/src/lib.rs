//! The boid behaviour kernel.
//!
//! Each frame, for every agent carrying the spatial and boid components,
//! the kernel fetches one neighbour set from the spatial hash (at the
//! largest rule radius) and accumulates the three steering rules over it
//! in a single pass: cohesion toward the average neighbour offset,
//! inverse-square-weighted separation away from close neighbours, and
//! alignment toward the average neighbour velocity. The combined
//! acceleration is clamped, integrated into velocity under a
//! `[v_min, v_max]` speed envelope, and positions are advanced in a
//! deferred second pass so every agent sees the same snapshot of the
//! world regardless of thread scheduling.
//!
//! Work is fanned out over the thread pool in contiguous agent chunks;
//! each chunk's neighbour-index buffer comes from the executing thread's
//! scratch arena.

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

mod error;
mod kernel;
mod params;

pub use error::KernelError;
pub use kernel::BoidKernel;
pub use params::BoidParams;
