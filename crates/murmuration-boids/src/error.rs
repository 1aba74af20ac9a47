//! Error types for the boid kernel.

use std::fmt;

/// Errors from kernel construction and [`update`](crate::BoidKernel::update).
///
/// Steady-state updates are infallible once the simulation is wired
/// correctly; every variant here indicates a structural misuse caught at
/// the API boundary.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum KernelError {
    /// A parameter failed validation at construction.
    InvalidParams {
        /// Which invariant was violated.
        reason: &'static str,
    },
    /// The agent columns have mismatched lengths.
    InconsistentColumns,
    /// `update` was called before the hash's first rebuild.
    HashNotBuilt,
    /// The hash was built for a different agent count.
    HashStale {
        /// Agent count the hash was built for.
        hash_len: usize,
        /// Agent count passed to `update`.
        agent_len: usize,
    },
    /// `dt` must be finite and non-negative.
    InvalidDt {
        /// The rejected value.
        value: f32,
    },
    /// The per-thread scratch arenas cannot hold one neighbour-index
    /// buffer; raise `arena_size_per_worker`.
    ScratchTooSmall {
        /// Bytes one task requires.
        needed: usize,
        /// Bytes each arena provides.
        capacity: usize,
    },
}

impl fmt::Display for KernelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidParams { reason } => write!(f, "invalid boid parameters: {reason}"),
            Self::InconsistentColumns => write!(f, "agent columns have mismatched lengths"),
            Self::HashNotBuilt => write!(f, "boid update requires a built spatial hash"),
            Self::HashStale { hash_len, agent_len } => write!(
                f,
                "spatial hash holds {hash_len} agents but update was given {agent_len}"
            ),
            Self::InvalidDt { value } => {
                write!(f, "dt must be finite and non-negative, got {value}")
            }
            Self::ScratchTooSmall { needed, capacity } => write!(
                f,
                "worker scratch arenas hold {capacity} bytes, one neighbour buffer needs {needed}"
            ),
        }
    }
}

impl std::error::Error for KernelError {}
