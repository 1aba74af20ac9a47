//! Error types for arena construction.

use std::fmt;

/// Errors arising from scratch-arena construction.
///
/// Exhaustion during allocation is deliberately *not* an error value:
/// [`ArenaFrame::alloc`](crate::ArenaFrame::alloc) returns `None` and
/// callers treat that as a sizing bug, per the frame driver's policy.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ArenaError {
    /// Requested a zero-byte arena.
    ZeroCapacity,
}

impl fmt::Display for ArenaError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ZeroCapacity => write!(f, "scratch arena capacity must be non-zero"),
        }
    }
}

impl std::error::Error for ArenaError {}
