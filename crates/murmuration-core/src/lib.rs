//! Core types shared across the murmuration workspace.
//!
//! Defines the agent data model (parallel arrays of positions, velocities,
//! and per-agent bitsets), the component/behaviour tag sets, and the
//! strongly-typed identifiers used by the pool and frame driver.

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

mod agents;
mod id;
mod tag;

pub use agents::AgentArrays;
pub use id::{FrameId, WorkerId};
pub use tag::{BehaviourSet, ComponentSet};
