//! Uniform-grid spatial hash over moving 3D agents.
//!
//! The hash answers one question fast: *which agents lie within radius
//! `r` of a point?* It is rebuilt from scratch every frame by a parallel
//! counting sort that reorders agent positions into structure-of-arrays
//! columns, cell by cell, so the query's 8-wide SIMD distance loop reads
//! contiguous memory. Queries return caller indices (the agent order the
//! simulation owns), never hash-internal positions.
//!
//! Rebuild and query never run concurrently; the frame driver sequences
//! `update → rebuild`, and `&mut self` on rebuild enforces it locally.
//!
//! This crate is one of two in the workspace that may contain `unsafe`
//! code (along with `murmuration-pool`): the scatter phase writes
//! reordered columns from several workers at disjoint indices derived
//! from an atomic per-cell cursor.

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

mod error;
mod grid;
mod hash;
mod query;

pub use error::HashError;
pub use grid::{CellGeometry, GridDims, CELL_EMPTY};
pub use hash::SpatialHash;
