//! Simulation configuration, validation, and error types.
//!
//! [`SimConfig`] is the single input to [`Simulation::new`]; it carries
//! every process-wide parameter from the agent count down to the worker
//! arena size. [`validate`](SimConfig::validate) checks the structural
//! invariants at startup so the steady-state frame loop cannot fail for
//! sizing reasons.
//!
//! [`Simulation::new`]: crate::Simulation::new

use std::fmt;

use glam::Vec3A;
use murmuration_boids::{BoidKernel, BoidParams, KernelError};
use murmuration_hash::HashError;
use murmuration_pool::PoolError;

/// Process-wide configuration, supplied at init and fixed thereafter.
#[derive(Clone, Debug)]
pub struct SimConfig {
    /// Number of agents; sizes every parallel array.
    pub num_agents: usize,
    /// Half-extent of the random spawn cube.
    pub spawn_extents: f32,
    /// `cell_size = cell_size_factor * r_seek`. Larger values mean fewer,
    /// fuller cells: cheaper rebuilds, more candidates per query.
    pub cell_size_factor: f32,
    /// Steering radii and integration clamps.
    pub boids: BoidParams,
    /// Worker thread count. `None` resolves to the hardware thread count.
    pub n_workers: Option<usize>,
    /// Work-queue capacity. `None` derives a capacity that covers the
    /// worst-case submission burst of one frame.
    pub queue_capacity: Option<usize>,
    /// Scratch bytes per worker arena. `None` derives from `num_agents`.
    pub arena_size_per_worker: Option<usize>,
    /// Seed for the spawn distribution.
    pub seed: u64,
    /// Velocity assigned to every agent at spawn.
    pub initial_velocity: Vec3A,
    /// Uniform scale of the per-agent instance transform.
    pub render_scale: f32,
    /// Lower clamp applied to the frame delta, preventing zero-length
    /// steps. There is deliberately no upper clamp; callers that fear
    /// long hitches cap `dt` themselves.
    pub min_dt: f32,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            num_agents: 5_000,
            spawn_extents: 1.0,
            cell_size_factor: 2.0,
            boids: BoidParams::default(),
            n_workers: None,
            queue_capacity: None,
            arena_size_per_worker: None,
            seed: 0x5EED,
            initial_velocity: Vec3A::new(0.25, 0.0, 0.0),
            render_scale: 0.1,
            min_dt: 1.0 / 60.0,
        }
    }
}

impl SimConfig {
    /// Cell edge length derived from the factor and the query radius.
    pub fn cell_size(&self) -> f32 {
        self.cell_size_factor * self.boids.r_seek
    }

    /// Resolve the worker count, defaulting to the hardware thread count.
    pub fn resolved_workers(&self) -> usize {
        match self.n_workers {
            Some(n) => n,
            None => std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(4),
        }
    }

    /// Worst-case work items one frame submits in a single burst: the
    /// larger of the kernel's chunk fan-out and the hash's count/scatter
    /// fan-out.
    pub fn peak_burst(&self) -> usize {
        (self.resolved_workers() * 8).max(64)
    }

    /// Resolve the queue capacity.
    pub fn resolved_queue_capacity(&self) -> usize {
        self.queue_capacity.unwrap_or_else(|| self.peak_burst())
    }

    /// Resolve the per-worker arena size: room for one neighbour-index
    /// buffer plus slack for chunk-local temporaries.
    pub fn resolved_arena_bytes(&self) -> usize {
        self.arena_size_per_worker
            .unwrap_or_else(|| BoidKernel::scratch_bytes_per_task(self.num_agents) + (64 << 10))
    }

    /// Check every structural invariant the frame loop relies on.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.num_agents == 0 {
            return Err(ConfigError::ZeroAgents);
        }
        if !(self.spawn_extents.is_finite() && self.spawn_extents > 0.0) {
            return Err(ConfigError::InvalidSpawnExtents {
                value: self.spawn_extents,
            });
        }
        if !(self.cell_size_factor.is_finite() && self.cell_size_factor > 0.0) {
            return Err(ConfigError::InvalidCellSizeFactor {
                value: self.cell_size_factor,
            });
        }
        self.boids.validate().map_err(ConfigError::Boids)?;
        if !(self.min_dt.is_finite() && self.min_dt > 0.0) {
            return Err(ConfigError::InvalidMinDt { value: self.min_dt });
        }
        if !(self.render_scale.is_finite() && self.render_scale > 0.0) {
            return Err(ConfigError::InvalidRenderScale {
                value: self.render_scale,
            });
        }
        if !self.initial_velocity.is_finite() {
            return Err(ConfigError::InvalidInitialVelocity);
        }

        let burst = self.peak_burst();
        let queue = self.resolved_queue_capacity();
        if queue < burst {
            return Err(ConfigError::QueueTooSmall {
                needed: burst,
                configured: queue,
            });
        }

        let scratch = BoidKernel::scratch_bytes_per_task(self.num_agents);
        let arena = self.resolved_arena_bytes();
        if arena < scratch {
            return Err(ConfigError::ArenaTooSmall {
                needed: scratch,
                configured: arena,
            });
        }
        Ok(())
    }
}

/// Errors detected during [`SimConfig::validate`] or simulation startup.
#[derive(Debug)]
pub enum ConfigError {
    /// The simulation needs at least one agent.
    ZeroAgents,
    /// Spawn extents must be positive and finite.
    InvalidSpawnExtents {
        /// The rejected value.
        value: f32,
    },
    /// Cell-size factor must be positive and finite.
    InvalidCellSizeFactor {
        /// The rejected value.
        value: f32,
    },
    /// `min_dt` must be positive and finite.
    InvalidMinDt {
        /// The rejected value.
        value: f32,
    },
    /// Render scale must be positive and finite.
    InvalidRenderScale {
        /// The rejected value.
        value: f32,
    },
    /// The initial velocity must be finite.
    InvalidInitialVelocity,
    /// Boid parameters failed their own validation.
    Boids(KernelError),
    /// The configured queue cannot absorb one frame's submission burst.
    QueueTooSmall {
        /// Worst-case burst size.
        needed: usize,
        /// Configured capacity.
        configured: usize,
    },
    /// The worker arenas cannot hold one neighbour buffer.
    ArenaTooSmall {
        /// Bytes one task requires.
        needed: usize,
        /// Configured bytes.
        configured: usize,
    },
    /// The thread pool failed to start.
    Pool(PoolError),
    /// The initial hash build failed.
    Hash(HashError),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ZeroAgents => write!(f, "num_agents must be at least 1"),
            Self::InvalidSpawnExtents { value } => {
                write!(f, "spawn_extents must be positive and finite, got {value}")
            }
            Self::InvalidCellSizeFactor { value } => {
                write!(f, "cell_size_factor must be positive and finite, got {value}")
            }
            Self::InvalidMinDt { value } => {
                write!(f, "min_dt must be positive and finite, got {value}")
            }
            Self::InvalidRenderScale { value } => {
                write!(f, "render_scale must be positive and finite, got {value}")
            }
            Self::InvalidInitialVelocity => write!(f, "initial_velocity must be finite"),
            Self::Boids(e) => write!(f, "boid parameters: {e}"),
            Self::QueueTooSmall { needed, configured } => write!(
                f,
                "queue capacity {configured} is below the worst-case frame burst of {needed}"
            ),
            Self::ArenaTooSmall { needed, configured } => write!(
                f,
                "worker arenas hold {configured} bytes, one neighbour buffer needs {needed}"
            ),
            Self::Pool(e) => write!(f, "thread pool: {e}"),
            Self::Hash(e) => write!(f, "initial hash build: {e}"),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Boids(e) => Some(e),
            Self::Pool(e) => Some(e),
            Self::Hash(e) => Some(e),
            _ => None,
        }
    }
}

impl From<PoolError> for ConfigError {
    fn from(e: PoolError) -> Self {
        Self::Pool(e)
    }
}

impl From<HashError> for ConfigError {
    fn from(e: HashError) -> Self {
        Self::Hash(e)
    }
}
