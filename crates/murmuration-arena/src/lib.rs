//! Bump-allocated scratch memory for per-frame temporaries.
//!
//! A [`ScratchArena`] owns one fixed block of cache-line-aligned bytes.
//! Each frame (or work item) opens an [`ArenaFrame`], bump-allocates
//! typed slices out of it, and drops the frame when done — the drop *is*
//! the reset. Allocations borrow from the frame, so the borrow checker
//! enforces what the design requires: no scratch pointer survives the
//! reset that invalidates it.
//!
//! Arenas are strictly single-owner. Worker threads each own one; the
//! main thread owns its own. Nothing here is `Sync`, which makes sharing
//! an arena between threads within a frame unrepresentable.

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

mod error;
mod scratch;

pub use error::ArenaError;
pub use scratch::{ArenaFrame, ScratchArena, CACHE_LINE};
