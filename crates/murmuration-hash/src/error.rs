//! Error types for hash construction, rebuild, and queries.

use std::fmt;

/// Errors arising from spatial-hash operations.
///
/// Rebuild errors leave the previously built state (if any) untouched;
/// query errors leave the output buffer untouched.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum HashError {
    /// Rebuild was given zero positions.
    EmptyInput,
    /// Cell size must be positive and finite.
    InvalidCellSize {
        /// The rejected value.
        value: f32,
    },
    /// Query radius must be positive and finite.
    InvalidRadius {
        /// The rejected value.
        value: f32,
    },
    /// Every position is identical — the domain has zero extent on all
    /// axes and no meaningful grid exists.
    DegenerateDomain,
    /// A non-finite coordinate reached the domain reduction.
    NonFinitePosition,
    /// The domain and cell size imply more cells than the hash supports.
    GridTooLarge {
        /// The computed cell count.
        cells: u64,
    },
    /// Query issued before the first successful rebuild.
    NotBuilt,
    /// The query output buffer cannot hold a worst-case result.
    OutputTooSmall {
        /// Required capacity (the agent count at last rebuild).
        needed: usize,
        /// Provided capacity.
        got: usize,
    },
}

impl fmt::Display for HashError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EmptyInput => write!(f, "rebuild requires at least one position"),
            Self::InvalidCellSize { value } => {
                write!(f, "cell size must be positive and finite, got {value}")
            }
            Self::InvalidRadius { value } => {
                write!(f, "query radius must be positive and finite, got {value}")
            }
            Self::DegenerateDomain => {
                write!(f, "all positions are identical; domain has zero extent")
            }
            Self::NonFinitePosition => write!(f, "positions contain a non-finite coordinate"),
            Self::GridTooLarge { cells } => {
                write!(f, "grid would have {cells} cells, exceeding the supported maximum")
            }
            Self::NotBuilt => write!(f, "query before first rebuild"),
            Self::OutputTooSmall { needed, got } => {
                write!(f, "query output buffer holds {got} indices, {needed} required")
            }
        }
    }
}

impl std::error::Error for HashError {}
