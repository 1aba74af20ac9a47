//! Murmuration: a real-time parallel 3D flocking simulation core.
//!
//! This is the top-level facade crate that re-exports the public API
//! from all murmuration sub-crates. For most users, adding
//! `murmuration` as a single dependency is sufficient.
//!
//! # Quick start
//!
//! ```rust
//! use murmuration::prelude::*;
//!
//! // A thousand boids in a unit cube, workers auto-detected.
//! let config = SimConfig {
//!     num_agents: 1_000,
//!     n_workers: Some(2),
//!     ..Default::default()
//! };
//! let mut sim = Simulation::new(config).unwrap();
//!
//! // Drive frames headless; a windowed host would pass its clock and
//! // hand the returned transforms to its renderer.
//! let update = sim.advance(1.0 / 60.0).unwrap();
//! assert_eq!(update.agent_count, 1_000);
//! assert_eq!(update.transforms.len(), 1_000);
//!
//! // Neighbour queries run against the freshly rebuilt hash.
//! let mut out = vec![0u32; 1_000];
//! let p = sim.agents().positions[0];
//! let found = sim.hash().query_into(p, 0.25, &mut out).unwrap();
//! assert!(found >= 1); // at least the agent itself
//! ```
//!
//! # Modules
//!
//! Each module corresponds to a sub-crate. Use them for types not in
//! the prelude:
//!
//! | Module | Sub-crate | Contents |
//! |--------|-----------|----------|
//! | [`arena`] | `murmuration-arena` | Per-thread bump scratch arenas |
//! | [`types`] | `murmuration-core` | Agent columns, bitsets, ids |
//! | [`pool`] | `murmuration-pool` | Lock-free work queue and workers |
//! | [`hash`] | `murmuration-hash` | Spatial hash rebuild and queries |
//! | [`boids`] | `murmuration-boids` | Steering kernel and parameters |
//! | [`engine`] | `murmuration-engine` | Frame driver, config, interfaces |

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

/// Scratch arenas (`murmuration-arena`).
pub use murmuration_arena as arena;

/// Core agent types, bitsets, and ids (`murmuration-core`).
pub use murmuration_core as types;

/// Thread pool and work queue (`murmuration-pool`).
pub use murmuration_pool as pool;

/// Spatial hash (`murmuration-hash`).
pub use murmuration_hash as hash;

/// Boid behaviour kernel (`murmuration-boids`).
pub use murmuration_boids as boids;

/// Frame driver, configuration, and collaborator interfaces
/// (`murmuration-engine`).
pub use murmuration_engine as engine;

/// Common imports for typical murmuration usage.
///
/// ```rust
/// use murmuration::prelude::*;
/// ```
pub mod prelude {
    // Core types
    pub use murmuration_core::{AgentArrays, BehaviourSet, ComponentSet, FrameId, WorkerId};

    // Arena
    pub use murmuration_arena::{ArenaFrame, ScratchArena};

    // Pool
    pub use murmuration_pool::{PoolStats, TaskContext, ThreadPool};

    // Hash
    pub use murmuration_hash::SpatialHash;

    // Boids
    pub use murmuration_boids::{BoidKernel, BoidParams};

    // Engine
    pub use murmuration_engine::{
        FrameMetrics, FrameUpdate, FrameView, LightParams, MeshData, MeshSource, MeshVertex,
        Platform, PlatformEvent, Renderer, SimConfig, Simulation,
    };

    // Errors
    pub use murmuration_arena::ArenaError;
    pub use murmuration_boids::KernelError;
    pub use murmuration_engine::{ConfigError, StepError};
    pub use murmuration_hash::HashError;
    pub use murmuration_pool::PoolError;
}
