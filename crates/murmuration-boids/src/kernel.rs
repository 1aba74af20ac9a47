//! Two-pass parallel boid update.

use glam::Vec3A;
use murmuration_core::{AgentArrays, BehaviourSet, ComponentSet};
use murmuration_hash::SpatialHash;
use murmuration_pool::{TaskContext, ThreadPool};
use smallvec::SmallVec;

use crate::error::KernelError;
use crate::params::BoidParams;

/// Target work items per worker, so the pool can rebalance uneven chunks.
const TASKS_PER_THREAD: usize = 8;

/// Chunks smaller than this cost more to schedule than to compute.
const MIN_AGENTS_PER_TASK: usize = 48;

/// The boid behaviour kernel.
///
/// Owns the steering parameters and a retained velocity snapshot used so
/// that every agent's alignment rule reads the velocities from the start
/// of the update, independent of chunk scheduling. Combined with the
/// deferred position pass, a whole [`update`](BoidKernel::update) is a
/// pure function of the previous frame's state.
#[derive(Debug)]
pub struct BoidKernel {
    params: BoidParams,
    snapshot: Vec<Vec3A>,
}

impl BoidKernel {
    /// Create a kernel with validated parameters.
    pub fn new(params: BoidParams) -> Result<Self, KernelError> {
        params.validate()?;
        Ok(Self {
            params,
            snapshot: Vec::new(),
        })
    }

    /// The active steering parameters.
    pub fn params(&self) -> &BoidParams {
        &self.params
    }

    /// Bytes of worker scratch one update task allocates (the
    /// neighbour-index buffer, sized so no query can overflow).
    pub fn scratch_bytes_per_task(agent_count: usize) -> usize {
        (agent_count * std::mem::size_of::<u32>()).div_ceil(64) * 64
    }

    /// Advance all boid agents by `dt`.
    ///
    /// Phase 1 fans agent chunks over the pool; each chunk queries the
    /// hash once per agent (at `r_seek`), accumulates the active rules
    /// over that neighbour set, and writes the clamped new velocity.
    /// Phase 2 walks the chunks again and advances positions, so phase 1
    /// observes a consistent position snapshot no matter how chunks were
    /// scheduled.
    ///
    /// An empty agent set is a no-op. The hash must have been rebuilt
    /// for exactly these agents.
    pub fn update(
        &mut self,
        agents: &mut AgentArrays,
        hash: &SpatialHash,
        pool: &mut ThreadPool,
        dt: f32,
    ) -> Result<(), KernelError> {
        let n = agents.len();
        if n == 0 {
            return Ok(());
        }
        if !agents.is_consistent() {
            return Err(KernelError::InconsistentColumns);
        }
        if hash.is_empty() {
            return Err(KernelError::HashNotBuilt);
        }
        if hash.len() != n {
            return Err(KernelError::HashStale {
                hash_len: hash.len(),
                agent_len: n,
            });
        }
        if !(dt.is_finite() && dt >= 0.0) {
            return Err(KernelError::InvalidDt { value: dt });
        }
        let needed = Self::scratch_bytes_per_task(n);
        if needed > pool.arena_capacity() {
            return Err(KernelError::ScratchTooSmall {
                needed,
                capacity: pool.arena_capacity(),
            });
        }

        self.snapshot.clear();
        self.snapshot.extend_from_slice(&agents.velocities);

        let chunk = chunk_len(n, pool.workers());

        // Phase 1: forces and velocity, reading the position array and
        // the velocity snapshot, writing only this chunk's velocities.
        {
            let positions: &[Vec3A] = &agents.positions;
            let snapshot: &[Vec3A] = &self.snapshot;
            let mut jobs: SmallVec<[ForceJob<'_>; 64]> = agents
                .velocities
                .chunks_mut(chunk)
                .zip(agents.components.chunks(chunk))
                .zip(agents.behaviours.chunks(chunk))
                .enumerate()
                .map(|(j, ((velocities, components), behaviours))| ForceJob {
                    first_agent: j * chunk,
                    positions,
                    snapshot,
                    components,
                    behaviours,
                    velocities,
                    hash,
                    params: self.params,
                    dt,
                })
                .collect();
            pool.run_batch_mut(&mut jobs, run_force_job);
        }

        // Phase 2: advance positions from the settled velocities.
        {
            let mut jobs: SmallVec<[IntegrateJob<'_>; 64]> = agents
                .positions
                .chunks_mut(chunk)
                .zip(agents.velocities.chunks(chunk))
                .zip(agents.components.chunks(chunk))
                .map(|((positions, velocities), components)| IntegrateJob {
                    positions,
                    velocities,
                    components,
                    dt,
                })
                .collect();
            pool.run_batch_mut(&mut jobs, run_integrate_job);
        }

        Ok(())
    }
}

fn chunk_len(n: usize, workers: usize) -> usize {
    n.div_ceil((workers * TASKS_PER_THREAD).max(1))
        .max(MIN_AGENTS_PER_TASK)
}

struct ForceJob<'a> {
    /// Global index of this chunk's first agent.
    first_agent: usize,
    positions: &'a [Vec3A],
    /// Velocities as they were when the update began.
    snapshot: &'a [Vec3A],
    components: &'a [ComponentSet],
    behaviours: &'a [BehaviourSet],
    /// This chunk's slice of the live velocity column.
    velocities: &'a mut [Vec3A],
    hash: &'a SpatialHash,
    params: BoidParams,
    dt: f32,
}

fn run_force_job(job: &mut ForceJob<'_>, ctx: &mut TaskContext<'_>) {
    let n = job.positions.len();
    let neighbours = ctx
        .scratch
        .alloc_u32(n)
        .expect("worker arena holds one neighbour buffer; checked at update entry");

    let p = job.params;
    let r_seek2 = p.r_seek * p.r_seek;
    let r_flee2 = p.r_flee * p.r_flee;
    let r_align2 = p.r_align * p.r_align;

    for k in 0..job.velocities.len() {
        if !job.components[k].contains(ComponentSet::spatial_boid()) {
            continue;
        }
        let i = job.first_agent + k;
        let pos = job.positions[i];

        // One fetch at the widest radius serves all three rules.
        let count = job
            .hash
            .query_into(pos, p.r_seek, neighbours)
            .expect("query preconditions checked at update entry");

        let mut seek_sum = Vec3A::ZERO;
        let mut flee_sum = Vec3A::ZERO;
        let mut align_sum = Vec3A::ZERO;
        let (mut n_seek, mut n_flee, mut n_align) = (0u32, 0u32, 0u32);

        for &id in &neighbours[..count] {
            let j = id as usize;
            if j == i {
                continue;
            }
            let diff = job.positions[j] - pos;
            let d2 = diff.length_squared();
            if d2 < r_seek2 {
                seek_sum += diff;
                n_seek += 1;
            }
            if d2 < r_flee2 {
                // Closer neighbours repel harder.
                flee_sum += diff * (r_flee2 / (d2 + p.flee_epsilon));
                n_flee += 1;
            }
            if d2 < r_align2 {
                align_sum += job.snapshot[j];
                n_align += 1;
            }
        }

        let b = job.behaviours[k];
        let mut accel = Vec3A::ZERO;
        if b.contains(BehaviourSet::SEEK) && n_seek > 0 {
            accel += seek_sum / n_seek as f32;
        }
        if b.contains(BehaviourSet::FLEE) && n_flee > 0 {
            // Flee is outward: averaged, then negated.
            accel -= flee_sum / n_flee as f32;
        }
        if b.contains(BehaviourSet::ALIGN) && n_align > 0 {
            accel += align_sum / n_align as f32;
        }
        accel = accel.clamp_length_max(p.a_max);

        let mut v = job.velocities[k] + accel * job.dt;
        v = v.clamp_length_max(p.v_max);
        if v.length_squared() < p.v_min * p.v_min {
            // A stopped agent with no steering input stays stopped
            // rather than acquiring a NaN heading.
            v = match v.try_normalize() {
                Some(dir) => dir * p.v_min,
                None => Vec3A::ZERO,
            };
        }
        job.velocities[k] = v;
    }
}

struct IntegrateJob<'a> {
    positions: &'a mut [Vec3A],
    velocities: &'a [Vec3A],
    components: &'a [ComponentSet],
    dt: f32,
}

fn run_integrate_job(job: &mut IntegrateJob<'_>, _ctx: &mut TaskContext<'_>) {
    for k in 0..job.positions.len() {
        if !job.components[k].contains(ComponentSet::spatial_boid()) {
            continue;
        }
        job.positions[k] += job.velocities[k] * job.dt;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use murmuration_test_utils::{agents_at, random_cloud, test_pool};
    use proptest::prelude::*;

    const DT: f32 = 1.0 / 60.0;

    fn run_update(agents: &mut AgentArrays, params: BoidParams, dt: f32) {
        let mut pool = test_pool();
        let mut hash = SpatialHash::new(2.0 * params.r_seek).unwrap();
        hash.rebuild(&agents.positions, &mut pool).unwrap();
        let mut kernel = BoidKernel::new(params).unwrap();
        kernel.update(agents, &hash, &mut pool, dt).unwrap();
    }

    #[test]
    fn flee_pushes_a_close_pair_apart() {
        let params = BoidParams::default();
        let mut agents = agents_at(&[
            Vec3A::ZERO,
            Vec3A::new(params.r_flee / 2.0, 0.0, 0.0),
        ]);
        for b in &mut agents.behaviours {
            *b = BehaviourSet::FLEE;
        }

        run_update(&mut agents, params, DT);

        let v0 = agents.velocities[0];
        let v1 = agents.velocities[1];
        assert!(v0.x < 0.0, "agent 0 must flee in -x, got {v0:?}");
        assert!(v1.x > 0.0, "agent 1 must flee in +x, got {v1:?}");
        assert!((v0.x + v1.x).abs() < 1e-6, "components must be opposite");
        assert_eq!(v0.y, 0.0);
        assert_eq!(v0.z, 0.0);
        assert!(v0.length() >= params.v_min - 1e-6);
        assert!(v1.length() >= params.v_min - 1e-6);
    }

    #[test]
    fn seek_pulls_a_pair_together() {
        let params = BoidParams::default();
        let mut agents = agents_at(&[
            Vec3A::ZERO,
            Vec3A::new(params.r_seek / 2.0, 0.0, 0.0),
        ]);
        for b in &mut agents.behaviours {
            *b = BehaviourSet::SEEK;
        }

        run_update(&mut agents, params, DT);

        assert!(agents.velocities[0].x > 0.0, "agent 0 must steer toward agent 1");
        assert!(agents.velocities[1].x < 0.0, "agent 1 must steer toward agent 0");
    }

    #[test]
    fn align_averages_neighbour_velocities() {
        let params = BoidParams::default();
        let mut agents = agents_at(&[
            Vec3A::ZERO,
            Vec3A::new(0.1, 0.0, 0.0),
            Vec3A::new(0.0, 0.1, 0.0),
        ]);
        for b in &mut agents.behaviours {
            *b = BehaviourSet::ALIGN;
        }
        // Neighbours both head in +z; the centre agent should too.
        agents.velocities[1] = Vec3A::new(0.0, 0.0, 0.3);
        agents.velocities[2] = Vec3A::new(0.0, 0.0, 0.3);

        run_update(&mut agents, params, DT);

        assert!(agents.velocities[0].z > 0.0);
    }

    #[test]
    fn isolated_agents_advance_linearly() {
        // Agents farther apart than any rule radius: no forces, so
        // velocities persist (they are inside the envelope) and
        // positions advance by exactly v·dt.
        let mut positions = Vec::new();
        for i in 0..256 {
            positions.push(Vec3A::new((i % 16) as f32 * 10.0, (i / 16) as f32 * 10.0, 0.0));
        }
        let mut agents = agents_at(&positions);
        let v = Vec3A::new(0.25, 0.0, 0.0);
        for vel in &mut agents.velocities {
            *vel = v;
        }

        run_update(&mut agents, BoidParams::default(), DT);

        for i in 0..agents.len() {
            assert_eq!(agents.velocities[i], v);
            assert_eq!(agents.positions[i], positions[i] + v * DT);
        }
    }

    #[test]
    fn empty_behaviours_leave_velocity_direction_alone() {
        let params = BoidParams::default();
        let mut agents = agents_at(&[Vec3A::ZERO, Vec3A::new(0.05, 0.0, 0.0)]);
        for b in &mut agents.behaviours {
            *b = BehaviourSet::empty();
        }
        agents.velocities[0] = Vec3A::new(0.3, 0.0, 0.0);
        agents.velocities[1] = Vec3A::new(0.0, 0.3, 0.0);

        run_update(&mut agents, params, DT);

        assert_eq!(agents.velocities[0], Vec3A::new(0.3, 0.0, 0.0));
        assert_eq!(agents.velocities[1], Vec3A::new(0.0, 0.3, 0.0));
    }

    #[test]
    fn agents_without_components_are_untouched() {
        let params = BoidParams::default();
        let mut agents = agents_at(&[Vec3A::ZERO, Vec3A::new(0.05, 0.0, 0.0)]);
        agents.components[1] = ComponentSet::empty();
        agents.velocities[1] = Vec3A::new(9.0, 9.0, 9.0); // outside envelope

        run_update(&mut agents, params, DT);

        assert_eq!(agents.velocities[1], Vec3A::new(9.0, 9.0, 9.0));
        assert_eq!(agents.positions[1], Vec3A::new(0.05, 0.0, 0.0));
    }

    #[test]
    fn stopped_isolated_agent_stays_stopped() {
        let params = BoidParams::default();
        let mut agents = agents_at(&[Vec3A::ZERO, Vec3A::new(100.0, 0.0, 0.0)]);
        // Zero velocity, no neighbours: the min-speed clamp has no
        // direction to rescale along and must leave zero, not NaN.
        run_update(&mut agents, params, DT);
        assert_eq!(agents.velocities[0], Vec3A::ZERO);
        assert!(agents.positions[0].is_finite());
    }

    #[test]
    fn empty_agent_set_is_a_no_op() {
        let mut pool = test_pool();
        let mut agents = AgentArrays::with_count(0);
        let hash = SpatialHash::new(0.5).unwrap();
        let mut kernel = BoidKernel::new(BoidParams::default()).unwrap();
        kernel.update(&mut agents, &hash, &mut pool, DT).unwrap();
    }

    #[test]
    fn stale_hash_is_rejected() {
        let mut pool = test_pool();
        let positions = random_cloud(5, 64, 1.0);
        let mut hash = SpatialHash::new(0.5).unwrap();
        hash.rebuild(&positions, &mut pool).unwrap();

        let mut agents = agents_at(&positions[..32]);
        let mut kernel = BoidKernel::new(BoidParams::default()).unwrap();
        assert_eq!(
            kernel.update(&mut agents, &hash, &mut pool, DT),
            Err(KernelError::HashStale {
                hash_len: 64,
                agent_len: 32
            })
        );
    }

    #[test]
    fn unbuilt_hash_and_bad_dt_are_rejected() {
        let mut pool = test_pool();
        let mut agents = agents_at(&random_cloud(6, 16, 1.0));
        let unbuilt = SpatialHash::new(0.5).unwrap();
        let mut kernel = BoidKernel::new(BoidParams::default()).unwrap();

        assert_eq!(
            kernel.update(&mut agents, &unbuilt, &mut pool, DT),
            Err(KernelError::HashNotBuilt)
        );

        let mut hash = SpatialHash::new(0.5).unwrap();
        hash.rebuild(&agents.positions, &mut pool).unwrap();
        for bad in [f32::NAN, f32::INFINITY, -0.1] {
            assert!(matches!(
                kernel.update(&mut agents, &hash, &mut pool, bad),
                Err(KernelError::InvalidDt { .. })
            ));
        }
    }

    #[test]
    fn undersized_worker_arena_is_rejected() {
        let mut pool = ThreadPool::start(1, 64, 64).unwrap();
        let positions = random_cloud(9, 1000, 1.0);
        let mut agents = agents_at(&positions);
        let mut hash = SpatialHash::new(0.5).unwrap();
        hash.rebuild(&positions, &mut pool).unwrap();
        let mut kernel = BoidKernel::new(BoidParams::default()).unwrap();

        assert!(matches!(
            kernel.update(&mut agents, &hash, &mut pool, DT),
            Err(KernelError::ScratchTooSmall { .. })
        ));
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(24))]

        #[test]
        fn velocity_envelope_holds_after_update(
            seed in 0u64..500,
            n in 2usize..200,
        ) {
            let params = BoidParams::default();
            let positions = random_cloud(seed, n, 0.5);
            let mut agents = agents_at(&positions);
            for (k, v) in agents.velocities.iter_mut().enumerate() {
                // Nonzero start so the minimum clamp has a heading.
                let dir = Vec3A::new(1.0, (k % 3) as f32 - 1.0, 0.5).normalize();
                *v = dir * 0.25;
            }

            let mut pool = test_pool();
            let mut hash = SpatialHash::new(2.0 * params.r_seek).unwrap();
            if hash.rebuild(&positions, &mut pool).is_err() {
                // Degenerate draw (all positions identical).
                return Ok(());
            }
            let mut kernel = BoidKernel::new(params).unwrap();
            kernel.update(&mut agents, &hash, &mut pool, DT).unwrap();

            for v in &agents.velocities {
                let speed = v.length();
                prop_assert!(speed <= params.v_max + 1e-5, "speed {speed} above v_max");
                prop_assert!(speed >= params.v_min - 1e-5, "speed {speed} below v_min");
            }
        }

        #[test]
        fn acceleration_clamp_bounds_velocity_change(
            seed in 0u64..500,
            n in 2usize..200,
        ) {
            let params = BoidParams::default();
            let positions = random_cloud(seed, n, 0.5);
            let mut agents = agents_at(&positions);
            // Mid-envelope speeds: neither clamp interferes, so the
            // entire velocity change comes from the bounded steering.
            let cruise = 0.5 * (params.v_min + params.v_max);
            for (k, v) in agents.velocities.iter_mut().enumerate() {
                let dir = Vec3A::new(0.3, 1.0, (k % 5) as f32 * 0.2 - 0.4).normalize();
                *v = dir * cruise;
            }
            let before = agents.velocities.clone();

            let mut pool = test_pool();
            let mut hash = SpatialHash::new(2.0 * params.r_seek).unwrap();
            if hash.rebuild(&positions, &mut pool).is_err() {
                return Ok(());
            }
            let mut kernel = BoidKernel::new(params).unwrap();
            kernel.update(&mut agents, &hash, &mut pool, DT).unwrap();

            for (v_new, v_old) in agents.velocities.iter().zip(&before) {
                let dv = (*v_new - *v_old).length();
                prop_assert!(
                    dv <= params.a_max * DT + 1e-5,
                    "velocity change {dv} exceeds a_max*dt"
                );
            }
        }
    }
}
