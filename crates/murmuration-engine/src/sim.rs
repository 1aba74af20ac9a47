//! The simulation context and per-frame driver.

use std::fmt;
use std::time::Instant;

use glam::{Mat4, Quat, Vec3, Vec3A};
use murmuration_boids::{BoidKernel, KernelError};
use murmuration_core::{AgentArrays, FrameId};
use murmuration_hash::{HashError, SpatialHash};
use murmuration_pool::{TaskContext, ThreadPool};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use smallvec::SmallVec;
use tracing::{debug, info, warn};

use crate::config::{ConfigError, SimConfig};
use crate::interface::{FrameView, Renderer};
use crate::metrics::{FrameMetrics, FrameTimeWindow};

/// Raw frame deltas above this are logged as hitches (the step itself
/// is not capped; see [`SimConfig::min_dt`]).
const HITCH_WARN_SECONDS: f32 = 0.1;

/// Errors a frame step can surface.
///
/// With a validated config these cannot occur in steady state; they
/// exist so state corruption (for example, every agent collapsing onto
/// one point) is reported rather than hidden.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum StepError {
    /// The hash rebuild rejected the new positions.
    Hash(HashError),
    /// The kernel rejected its inputs.
    Kernel(KernelError),
}

impl fmt::Display for StepError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Hash(e) => write!(f, "hash rebuild: {e}"),
            Self::Kernel(e) => write!(f, "boid kernel: {e}"),
        }
    }
}

impl std::error::Error for StepError {}

impl From<HashError> for StepError {
    fn from(e: HashError) -> Self {
        Self::Hash(e)
    }
}

impl From<KernelError> for StepError {
    fn from(e: KernelError) -> Self {
        Self::Kernel(e)
    }
}

/// One frame's output for the renderer.
#[derive(Debug)]
pub struct FrameUpdate<'a> {
    /// Number of live agents (and of valid transforms).
    pub agent_count: usize,
    /// Per-agent model matrices, in agent order.
    pub transforms: &'a [Mat4],
    /// Timing data for the frame that produced this.
    pub metrics: &'a FrameMetrics,
}

/// The whole simulation as one explicit context object.
///
/// Owns the agent arrays, spatial hash, boid kernel, and thread pool;
/// nothing here is global, so simulations can be created side by side
/// (each with its own worker set) and torn down independently.
#[derive(Debug)]
pub struct Simulation {
    config: SimConfig,
    agents: AgentArrays,
    hash: SpatialHash,
    kernel: BoidKernel,
    pool: ThreadPool,
    /// Retained per-agent instance matrices, refreshed every frame.
    transforms: Vec<Mat4>,
    frame: FrameId,
    last_now_ms: Option<f64>,
    window: FrameTimeWindow,
    metrics: FrameMetrics,
}

impl Simulation {
    /// Build a simulation from a validated config: start the pool,
    /// spawn the agents, and run the initial hash build so the first
    /// frame's kernel has neighbours to query.
    pub fn new(config: SimConfig) -> Result<Self, ConfigError> {
        config.validate()?;

        let workers = config.resolved_workers();
        let mut pool = ThreadPool::start(
            workers,
            config.resolved_queue_capacity(),
            config.resolved_arena_bytes(),
        )?;

        let mut agents = AgentArrays::with_count(config.num_agents);
        let mut rng = ChaCha8Rng::seed_from_u64(config.seed);
        agents.spawn_uniform_cube(&mut rng, config.spawn_extents, config.initial_velocity);

        let mut hash = SpatialHash::new(config.cell_size())?;
        hash.rebuild(&agents.positions, &mut pool)?;

        let kernel = BoidKernel::new(config.boids).map_err(ConfigError::Boids)?;

        info!(
            agents = config.num_agents,
            workers,
            cell_size = f64::from(config.cell_size()),
            queue_capacity = pool.queue_capacity(),
            "simulation initialised"
        );

        Ok(Self {
            config,
            agents,
            hash,
            kernel,
            pool,
            transforms: Vec::new(),
            frame: FrameId::default(),
            last_now_ms: None,
            window: FrameTimeWindow::default(),
            metrics: FrameMetrics::default(),
        })
    }

    /// The configuration this simulation was built from.
    pub fn config(&self) -> &SimConfig {
        &self.config
    }

    /// Read access to the agent columns.
    pub fn agents(&self) -> &AgentArrays {
        &self.agents
    }

    /// Mutable access to the agent columns, for scenario setup and
    /// external steering. The arrays must stay consistent.
    pub fn agents_mut(&mut self) -> &mut AgentArrays {
        &mut self.agents
    }

    /// The spatial hash as of the end of the last frame.
    pub fn hash(&self) -> &SpatialHash {
        &self.hash
    }

    /// Metrics of the most recent frame.
    pub fn metrics(&self) -> &FrameMetrics {
        &self.metrics
    }

    /// Frames completed so far.
    pub fn frame(&self) -> FrameId {
        self.frame
    }

    /// Advance one frame using the platform clock.
    ///
    /// The first call integrates one `min_dt` step (there is no previous
    /// timestamp); later calls integrate the clock delta, clamped from
    /// below by `min_dt`.
    pub fn step(&mut self, now_ms: f64) -> Result<FrameUpdate<'_>, StepError> {
        let raw_dt = match self.last_now_ms {
            Some(last) => ((now_ms - last) / 1000.0) as f32,
            None => self.config.min_dt,
        };
        self.last_now_ms = Some(now_ms);
        if raw_dt > HITCH_WARN_SECONDS {
            warn!(raw_dt = f64::from(raw_dt), "frame hitch; integrating the full delta");
        }
        let dt = raw_dt.max(self.config.min_dt);
        self.advance_clamped(dt, raw_dt)?;
        Ok(self.frame_update())
    }

    /// Advance one frame by an explicit delta, for headless callers and
    /// tests. `dt` is still clamped from below by `min_dt`.
    pub fn advance(&mut self, dt: f32) -> Result<FrameUpdate<'_>, StepError> {
        let dt = dt.max(self.config.min_dt);
        self.advance_clamped(dt, dt)?;
        Ok(self.frame_update())
    }

    /// The renderer-facing view of the last completed frame.
    pub fn frame_update(&self) -> FrameUpdate<'_> {
        FrameUpdate {
            agent_count: self.agents.len(),
            transforms: &self.transforms,
            metrics: &self.metrics,
        }
    }

    fn advance_clamped(&mut self, dt: f32, raw_dt: f32) -> Result<(), StepError> {
        let frame_start = Instant::now();

        // Update first, rebuild second: the hash the *next* frame's
        // kernel queries reflects the positions written here.
        let t = Instant::now();
        self.kernel
            .update(&mut self.agents, &self.hash, &mut self.pool, dt)?;
        let update_us = t.elapsed().as_micros() as u64;

        let t = Instant::now();
        self.hash.rebuild(&self.agents.positions, &mut self.pool)?;
        let rebuild_us = t.elapsed().as_micros() as u64;

        let t = Instant::now();
        self.prepare_transforms();
        let transforms_us = t.elapsed().as_micros() as u64;

        self.pool.reset();

        self.window.push(dt);
        self.frame = self.frame.next();
        self.metrics = FrameMetrics {
            frame: self.frame,
            dt,
            raw_dt,
            update_us,
            rebuild_us,
            transforms_us,
            total_us: frame_start.elapsed().as_micros() as u64,
            smoothed_frame_time: self.window.average(),
            pool: self.pool.stats(),
        };
        debug!(
            frame = %self.frame,
            update_us,
            rebuild_us,
            transforms_us,
            "frame complete"
        );
        Ok(())
    }

    /// Compute per-agent model matrices (translate ∘ rotate-to-velocity
    /// ∘ scale) in parallel into the retained instance buffer.
    fn prepare_transforms(&mut self) {
        let n = self.agents.len();
        self.transforms.resize(n, Mat4::IDENTITY);
        let scale = Vec3::splat(self.config.render_scale);

        let chunk = n.div_ceil((self.pool.workers() * 8).max(1)).max(48);
        let mut jobs: SmallVec<[TransformJob<'_>; 64]> = self
            .transforms
            .chunks_mut(chunk)
            .zip(self.agents.positions.chunks(chunk))
            .zip(self.agents.velocities.chunks(chunk))
            .map(|((transforms, positions), velocities)| TransformJob {
                transforms,
                positions,
                velocities,
                scale,
            })
            .collect();
        self.pool.run_batch_mut(&mut jobs, run_transform_job);
    }

    /// Walk one frame's draw sequence against a renderer: begin, state,
    /// instanced agents, optional hash-grid overlay, end.
    pub fn render<R: Renderer>(
        &self,
        renderer: &mut R,
        view: &FrameView,
        mesh: &R::MeshHandle,
        draw_grid: bool,
    ) {
        renderer.frame_begin(view.width, view.height);
        renderer.set_light(view.light, view.eye);
        renderer.set_mvp(view.view, view.projection, view.eye);
        renderer.render_instances(mesh, &self.transforms);
        if draw_grid {
            let mut lines = Vec::new();
            self.hash.debug_cell_edges(&mut lines);
            for (a, b) in lines {
                renderer.draw_line(0.5, a, b, Vec3::splat(0.5), true);
            }
        }
        renderer.frame_end();
    }

    /// Stop the worker pool. Also happens on drop; explicit shutdown
    /// lets callers sequence it before tearing down the graphics host.
    pub fn shutdown(&mut self) {
        self.pool.shutdown();
        info!(frames = %self.frame, "simulation shut down");
    }
}

struct TransformJob<'a> {
    transforms: &'a mut [Mat4],
    positions: &'a [Vec3A],
    velocities: &'a [Vec3A],
    scale: Vec3,
}

fn run_transform_job(job: &mut TransformJob<'_>, _ctx: &mut TaskContext<'_>) {
    for k in 0..job.transforms.len() {
        let rotation = match Vec3::from(job.velocities[k]).try_normalize() {
            Some(heading) => Quat::from_rotation_arc(Vec3::Z, heading),
            None => Quat::IDENTITY,
        };
        job.transforms[k] = Mat4::from_scale_rotation_translation(
            job.scale,
            rotation,
            Vec3::from(job.positions[k]),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interface::LightParams;

    fn small_config(workers: usize, agents: usize, seed: u64) -> SimConfig {
        SimConfig {
            num_agents: agents,
            n_workers: Some(workers),
            seed,
            ..Default::default()
        }
    }

    #[test]
    fn step_produces_transforms_and_advances_the_frame() {
        let mut sim = Simulation::new(small_config(2, 64, 1)).unwrap();
        assert_eq!(sim.frame(), FrameId(0));

        let update = sim.step(0.0).unwrap();
        assert_eq!(update.agent_count, 64);
        assert_eq!(update.transforms.len(), 64);
        assert_eq!(update.metrics.frame, FrameId(1));

        sim.step(16.0).unwrap();
        assert_eq!(sim.frame(), FrameId(2));
    }

    #[test]
    fn dt_is_clamped_from_below() {
        let mut sim = Simulation::new(small_config(2, 64, 2)).unwrap();
        let min_dt = sim.config().min_dt;
        sim.step(0.0).unwrap();
        // 1 ms of wall time is below min_dt; the step integrates min_dt.
        let update = sim.step(1.0).unwrap();
        assert!((update.metrics.raw_dt - 0.001).abs() < 1e-6);
        assert_eq!(update.metrics.dt, min_dt);
    }

    #[test]
    fn long_deltas_are_integrated_unclamped() {
        let mut sim = Simulation::new(small_config(2, 64, 3)).unwrap();
        sim.step(0.0).unwrap();
        let update = sim.step(250.0).unwrap();
        assert!((update.metrics.dt - 0.25).abs() < 1e-6);
    }

    #[test]
    fn single_worker_runs_are_bit_identical() {
        let dts = [1.0 / 60.0; 8];
        let run = |seed| {
            let mut sim = Simulation::new(small_config(1, 300, seed)).unwrap();
            for &dt in &dts {
                sim.advance(dt).unwrap();
            }
            (
                sim.agents().positions.clone(),
                sim.agents().velocities.clone(),
            )
        };
        let (pa, va) = run(7);
        let (pb, vb) = run(7);
        assert_eq!(pa, pb);
        assert_eq!(va, vb);
    }

    #[test]
    fn worker_count_does_not_change_trajectories() {
        // The canonical in-cell ordering makes neighbour sets *and*
        // accumulation order independent of scheduling, so trajectories
        // match bitwise across worker counts.
        let dts = [1.0 / 60.0; 5];
        let run = |workers| {
            let mut sim = Simulation::new(small_config(workers, 2000, 11)).unwrap();
            for &dt in &dts {
                sim.advance(dt).unwrap();
            }
            sim.agents().positions.clone()
        };
        assert_eq!(run(1), run(3));
    }

    #[test]
    fn hash_tracks_agent_positions_across_frames() {
        let mut sim = Simulation::new(small_config(2, 256, 5)).unwrap();
        for _ in 0..4 {
            sim.advance(1.0 / 60.0).unwrap();
        }
        assert_eq!(sim.hash().len(), 256);

        // Every agent must find itself in the hash built from the
        // positions it now occupies.
        let mut out = vec![0u32; 256];
        for i in 0..256 {
            let p = sim.agents().positions[i];
            let found = sim
                .hash()
                .query_into(p, sim.config().boids.r_seek, &mut out)
                .unwrap();
            assert!(out[..found].contains(&(i as u32)));
        }
    }

    #[test]
    fn speeds_stay_inside_the_envelope_across_frames() {
        let mut sim = Simulation::new(small_config(2, 500, 9)).unwrap();
        for _ in 0..10 {
            sim.advance(1.0 / 60.0).unwrap();
        }
        let p = sim.config().boids;
        for v in &sim.agents().velocities {
            let speed = v.length();
            assert!(speed >= p.v_min - 1e-5 && speed <= p.v_max + 1e-5);
        }
    }

    #[test]
    fn smoothed_frame_time_converges_on_the_step() {
        let mut sim = Simulation::new(small_config(2, 64, 4)).unwrap();
        for _ in 0..10 {
            sim.advance(0.02).unwrap();
        }
        assert!((sim.metrics().smoothed_frame_time - 0.02).abs() < 1e-6);
    }

    // ── Renderer hand-off ────────────────────────────────────────

    #[derive(Default)]
    struct RecordingRenderer {
        calls: Vec<String>,
        instances: usize,
        lines: usize,
    }

    impl Renderer for RecordingRenderer {
        type MeshHandle = u32;

        fn upload_mesh(&mut self, _mesh: &crate::interface::MeshData) -> u32 {
            self.calls.push("upload".into());
            1
        }

        fn frame_begin(&mut self, _w: u32, _h: u32) {
            self.calls.push("begin".into());
        }

        fn set_mvp(&mut self, _view: Mat4, _projection: Mat4, _eye: Vec3) {
            self.calls.push("mvp".into());
        }

        fn set_light(&mut self, _light: LightParams, _eye: Vec3) {
            self.calls.push("light".into());
        }

        fn render_instances(&mut self, _mesh: &u32, transforms: &[Mat4]) {
            self.calls.push("instances".into());
            self.instances = transforms.len();
        }

        fn draw_line(&mut self, _t: f32, _a: Vec3, _b: Vec3, _c: Vec3, _d: bool) {
            self.lines += 1;
        }

        fn frame_end(&mut self) {
            self.calls.push("end".into());
        }
    }

    #[test]
    fn render_walks_the_draw_sequence_in_order() {
        let mut sim = Simulation::new(small_config(2, 64, 6)).unwrap();
        sim.advance(1.0 / 60.0).unwrap();

        let mut renderer = RecordingRenderer::default();
        let mesh = renderer.upload_mesh(&crate::interface::MeshData::default());
        let view = FrameView {
            view: Mat4::IDENTITY,
            projection: Mat4::IDENTITY,
            eye: Vec3::ONE,
            width: 800,
            height: 600,
            light: LightParams::default(),
        };

        sim.render(&mut renderer, &view, &mesh, true);

        assert_eq!(
            renderer.calls,
            vec!["upload", "begin", "light", "mvp", "instances", "end"]
        );
        assert_eq!(renderer.instances, 64);
        assert!(renderer.lines > 0, "grid overlay must emit line segments");
    }
}
