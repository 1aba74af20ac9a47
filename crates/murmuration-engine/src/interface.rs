//! Interfaces to the simulator's external collaborators.
//!
//! The core consumes these traits and never implements them: the
//! windowing/graphics host supplies a [`Renderer`] and [`Platform`], and
//! asset loading supplies a [`MeshSource`]. Tests drive the simulation
//! headless and, where the draw sequence matters, with recording stubs.

use std::io;
use std::path::Path;

use glam::{Mat4, Vec3};

/// Per-vertex layout expected by instanced mesh rendering: three 4-lane
/// attributes padded to one cache line per vertex.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
#[repr(C, align(64))]
pub struct MeshVertex {
    /// Homogeneous position (`w` is 1).
    pub position: [f32; 4],
    /// Normal with a padding lane.
    pub normal: [f32; 4],
    /// Texture coordinates with padding lanes.
    pub texcoord: [f32; 4],
}

/// An indexed triangle mesh as delivered by a [`MeshSource`].
#[derive(Clone, Debug, Default)]
pub struct MeshData {
    /// Vertex attributes.
    pub vertices: Vec<MeshVertex>,
    /// Triangle indices.
    pub indices: Vec<u32>,
}

/// Scene lighting handed to the renderer once per frame.
#[derive(Clone, Copy, Debug)]
pub struct LightParams {
    /// Ambient colour.
    pub ambient: Vec3,
    /// Diffuse colour.
    pub diffuse: Vec3,
    /// Specular colour.
    pub specular: Vec3,
}

impl Default for LightParams {
    fn default() -> Self {
        Self {
            ambient: Vec3::splat(0.1),
            diffuse: Vec3::splat(0.8),
            specular: Vec3::ONE,
        }
    }
}

/// Camera and viewport state for one frame.
#[derive(Clone, Copy, Debug)]
pub struct FrameView {
    /// World-to-view matrix.
    pub view: Mat4,
    /// View-to-clip matrix.
    pub projection: Mat4,
    /// Camera position, used for lighting.
    pub eye: Vec3,
    /// Viewport width in pixels.
    pub width: u32,
    /// Viewport height in pixels.
    pub height: u32,
    /// Scene lighting.
    pub light: LightParams,
}

/// The graphics layer the frame driver hands its output to.
///
/// Call order within one frame: [`frame_begin`](Renderer::frame_begin),
/// any number of state/draw calls, [`frame_end`](Renderer::frame_end).
pub trait Renderer {
    /// Opaque handle to an uploaded mesh.
    type MeshHandle;

    /// Upload a mesh once; instances reference the handle every frame.
    fn upload_mesh(&mut self, mesh: &MeshData) -> Self::MeshHandle;

    /// Begin a frame targeting a viewport of the given size.
    fn frame_begin(&mut self, width: u32, height: u32);

    /// Set the view/projection matrices and camera position.
    fn set_mvp(&mut self, view: Mat4, projection: Mat4, eye: Vec3);

    /// Set scene lighting.
    fn set_light(&mut self, light: LightParams, eye: Vec3);

    /// Draw `transforms.len()` instances of a mesh.
    fn render_instances(&mut self, mesh: &Self::MeshHandle, transforms: &[Mat4]);

    /// Draw a world-space line segment. `depth_always` draws over
    /// geometry (used for debug overlays).
    fn draw_line(&mut self, thickness: f32, a: Vec3, b: Vec3, color: Vec3, depth_always: bool);

    /// Finish and present the frame.
    fn frame_end(&mut self);
}

/// Window events the driver cares about.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PlatformEvent {
    /// The user asked to close the window.
    CloseRequested,
    /// The window was resized.
    Resized {
        /// New width in pixels.
        width: u32,
        /// New height in pixels.
        height: u32,
    },
}

/// Platform services: timing, window metrics, input events.
pub trait Platform {
    /// Monotonic time in milliseconds.
    fn now_ms(&self) -> f64;

    /// Current client-area size in pixels.
    fn window_size(&self) -> (u32, u32);

    /// Poll the next pending event, if any.
    fn poll_event(&mut self) -> Option<PlatformEvent>;

    /// Cursor position in client coordinates.
    fn cursor_position(&self) -> (f32, f32);
}

/// Mesh asset loading.
pub trait MeshSource {
    /// Load an indexed mesh from a file.
    fn load_mesh(&mut self, path: &Path) -> io::Result<MeshData>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vertex_layout_is_one_cache_line() {
        assert_eq!(std::mem::size_of::<MeshVertex>(), 64);
        assert_eq!(std::mem::align_of::<MeshVertex>(), 64);
    }

    #[test]
    fn default_light_matches_the_reference_scene() {
        let light = LightParams::default();
        assert_eq!(light.ambient, Vec3::splat(0.1));
        assert_eq!(light.diffuse, Vec3::splat(0.8));
        assert_eq!(light.specular, Vec3::ONE);
    }
}
