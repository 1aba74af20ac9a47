//! Parallel-array agent storage.
//!
//! Agent state lives in four same-length columns indexed `0..len`. The
//! simulation never permutes these arrays; reordering happens only inside
//! the spatial hash, which maps back to these indices via its own
//! `original_id` column.

use crate::tag::{BehaviourSet, ComponentSet};
use glam::Vec3A;
use rand::Rng;

/// Columnar storage for all simulated agents.
///
/// `Vec3A` is 16-byte aligned with a padding lane, so positions and
/// velocities load cleanly into SIMD registers; the fourth lane is never
/// a coordinate.
#[derive(Clone, Debug, Default)]
pub struct AgentArrays {
    /// World-space positions.
    pub positions: Vec<Vec3A>,
    /// Per-agent velocities.
    pub velocities: Vec<Vec3A>,
    /// Subsystem membership per agent.
    pub components: Vec<ComponentSet>,
    /// Active steering rules per agent.
    pub behaviours: Vec<BehaviourSet>,
}

impl AgentArrays {
    /// Allocate storage for `count` agents, zero-initialised with empty
    /// component and behaviour sets.
    pub fn with_count(count: usize) -> Self {
        Self {
            positions: vec![Vec3A::ZERO; count],
            velocities: vec![Vec3A::ZERO; count],
            components: vec![ComponentSet::empty(); count],
            behaviours: vec![BehaviourSet::empty(); count],
        }
    }

    /// Number of agents.
    pub fn len(&self) -> usize {
        self.positions.len()
    }

    /// Whether there are no agents.
    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    /// Whether all four columns have equal length. The simulation upholds
    /// this at all times; tests use it as a sanity check.
    pub fn is_consistent(&self) -> bool {
        let n = self.positions.len();
        self.velocities.len() == n && self.components.len() == n && self.behaviours.len() == n
    }

    /// Scatter every agent uniformly inside the axis-aligned cube
    /// `[-extents, extents]³`, give it spatial + boid components, all
    /// three steering rules, and `initial_velocity`.
    pub fn spawn_uniform_cube<R: Rng>(&mut self, rng: &mut R, extents: f32, initial_velocity: Vec3A) {
        for i in 0..self.len() {
            self.components[i] = ComponentSet::spatial_boid();
            self.behaviours[i] = BehaviourSet::all();
            self.positions[i] = Vec3A::new(
                rng.gen_range(-extents..=extents),
                rng.gen_range(-extents..=extents),
                rng.gen_range(-extents..=extents),
            );
            self.velocities[i] = initial_velocity;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    #[test]
    fn with_count_is_consistent() {
        let agents = AgentArrays::with_count(17);
        assert_eq!(agents.len(), 17);
        assert!(agents.is_consistent());
        assert!(agents.components.iter().all(|c| c.is_empty()));
    }

    #[test]
    fn spawn_stays_inside_cube() {
        let mut agents = AgentArrays::with_count(256);
        let mut rng = ChaCha8Rng::seed_from_u64(7);
        agents.spawn_uniform_cube(&mut rng, 2.5, Vec3A::new(0.25, 0.0, 0.0));

        for i in 0..agents.len() {
            let p = agents.positions[i];
            assert!(p.x.abs() <= 2.5 && p.y.abs() <= 2.5 && p.z.abs() <= 2.5);
            assert_eq!(agents.velocities[i], Vec3A::new(0.25, 0.0, 0.0));
            assert!(agents.components[i].contains(ComponentSet::spatial_boid()));
            assert!(agents.behaviours[i].contains(BehaviourSet::all()));
        }
    }

    #[test]
    fn spawn_is_deterministic_for_a_seed() {
        let mut a = AgentArrays::with_count(64);
        let mut b = AgentArrays::with_count(64);
        a.spawn_uniform_cube(&mut ChaCha8Rng::seed_from_u64(42), 1.0, Vec3A::ZERO);
        b.spawn_uniform_cube(&mut ChaCha8Rng::seed_from_u64(42), 1.0, Vec3A::ZERO);
        assert_eq!(a.positions, b.positions);
    }
}
