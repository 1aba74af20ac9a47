//! Error types for pool construction.

use murmuration_arena::ArenaError;
use std::fmt;

/// Errors arising from [`ThreadPool::start`](crate::ThreadPool::start).
///
/// Steady-state operations do not return errors: queue overflow is a
/// fatal mis-sizing bug and panics, per the frame driver's policy.
#[derive(Debug)]
pub enum PoolError {
    /// A worker pool needs at least one worker.
    ZeroWorkers,
    /// The queue must hold at least one item.
    ZeroQueueCapacity,
    /// A worker scratch arena could not be created.
    Arena(ArenaError),
    /// The OS refused to spawn a worker thread.
    ThreadSpawn {
        /// Index of the worker that failed to start.
        worker: u32,
        /// The underlying OS error.
        source: std::io::Error,
    },
}

impl fmt::Display for PoolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ZeroWorkers => write!(f, "worker count must be at least 1"),
            Self::ZeroQueueCapacity => write!(f, "queue capacity must be at least 1"),
            Self::Arena(e) => write!(f, "worker arena: {e}"),
            Self::ThreadSpawn { worker, source } => {
                write!(f, "failed to spawn worker {worker}: {source}")
            }
        }
    }
}

impl std::error::Error for PoolError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Arena(e) => Some(e),
            Self::ThreadSpawn { source, .. } => Some(source),
            _ => None,
        }
    }
}

impl From<ArenaError> for PoolError {
    fn from(e: ArenaError) -> Self {
        Self::Arena(e)
    }
}
