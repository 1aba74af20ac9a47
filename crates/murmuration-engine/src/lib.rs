//! Frame driver for the murmuration simulator.
//!
//! [`Simulation`] owns everything the core needs — agents, spatial hash,
//! boid kernel, and thread pool — as one explicit context object, so
//! multiple simulations can coexist in a process and tests can build
//! them freely. Each [`step`](Simulation::step) runs the frame sequence:
//! clamp `dt`, update the kernel, rebuild the hash from the fresh
//! positions, and prepare per-agent model matrices for the renderer.
//!
//! Windowing, rendering, timing, and mesh loading are external
//! collaborators, consumed through the [`Renderer`], [`Platform`], and
//! [`MeshSource`] traits.

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

mod config;
mod interface;
mod metrics;
mod sim;

pub use config::{ConfigError, SimConfig};
pub use interface::{
    FrameView, LightParams, MeshData, MeshSource, MeshVertex, Platform, PlatformEvent, Renderer,
};
pub use metrics::{FrameMetrics, FrameTimeWindow};
pub use sim::{FrameUpdate, Simulation, StepError};
