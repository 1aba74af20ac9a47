//! Grid geometry: domain reduction, cell coordinates, linear indexing.

use glam::Vec3A;

/// Sentinel stored in `cell_start` for cells containing no agents.
pub const CELL_EMPTY: u32 = u32::MAX;

/// Cells-per-axis of the uniform grid.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct GridDims {
    /// Cells along x.
    pub x: u32,
    /// Cells along y.
    pub y: u32,
    /// Cells along z.
    pub z: u32,
}

impl GridDims {
    /// Derive grid dimensions from a domain AABB and cell size.
    ///
    /// Each axis gets `ceil(extent / cell_size)` cells, at least one —
    /// a flat flock (zero extent on some axis) still needs a cell there.
    pub fn from_domain(domain_min: Vec3A, domain_max: Vec3A, cell_size: f32) -> Self {
        let extent = domain_max - domain_min;
        let cells = |e: f32| ((e / cell_size).ceil() as u32).max(1);
        Self {
            x: cells(extent.x),
            y: cells(extent.y),
            z: cells(extent.z),
        }
    }

    /// Total cell count, saturating so a mis-configured cell size is
    /// caught by the caller's bound check instead of wrapping.
    pub fn num_cells(self) -> u64 {
        (self.x as u64)
            .saturating_mul(self.y as u64)
            .saturating_mul(self.z as u64)
    }

    /// Linear index of a cell coordinate: `cx + cy·Gx + cz·Gx·Gy`.
    ///
    /// A consistent bijection between `(cx, cy, cz)` and `[0, num_cells)`
    /// for in-bounds coordinates.
    pub fn linear_index(self, cx: u32, cy: u32, cz: u32) -> u32 {
        debug_assert!(cx < self.x && cy < self.y && cz < self.z);
        cx + cy * self.x + cz * self.x * self.y
    }
}

/// Everything needed to map a world position to a cell: the domain
/// origin, the reciprocal cell size, and the grid bounds for clamping.
#[derive(Clone, Copy, Debug)]
pub struct CellGeometry {
    /// Domain minimum corner (cell `(0,0,0)` origin).
    pub domain_min: Vec3A,
    /// `1 / cell_size`.
    pub inv_cell_size: f32,
    /// Grid bounds.
    pub grid: GridDims,
}

impl CellGeometry {
    /// Integer cell coordinate of a position, clamped into the grid.
    ///
    /// Positions at the domain maximum land in the last cell of each
    /// axis; positions outside the domain (which only a caller bug can
    /// produce between rebuilds) clamp rather than index out of bounds.
    pub fn cell_coords(&self, p: Vec3A) -> (u32, u32, u32) {
        let shifted = (p - self.domain_min) * self.inv_cell_size;
        let clamp = |v: f32, max: u32| ((v.max(0.0)) as u32).min(max - 1);
        (
            clamp(shifted.x, self.grid.x),
            clamp(shifted.y, self.grid.y),
            clamp(shifted.z, self.grid.z),
        )
    }

    /// Linear cell index of a position.
    pub fn cell_index_of(&self, p: Vec3A) -> u32 {
        let (cx, cy, cz) = self.cell_coords(p);
        self.grid.linear_index(cx, cy, cz)
    }
}

/// Axis-aligned bounding box of a position set, reduced serially.
///
/// The parallel rebuild path computes per-chunk boxes with this and
/// reduces them on the caller thread.
pub fn compute_domain(positions: &[Vec3A]) -> (Vec3A, Vec3A) {
    let mut min = positions[0];
    let mut max = positions[0];
    for &p in &positions[1..] {
        min = min.min(p);
        max = max.max(p);
    }
    (min, max)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dims_cover_the_domain() {
        let dims = GridDims::from_domain(
            Vec3A::new(-1.0, -1.0, -1.0),
            Vec3A::new(1.0, 1.0, 1.0),
            0.5,
        );
        assert_eq!(dims, GridDims { x: 4, y: 4, z: 4 });
        assert_eq!(dims.num_cells(), 64);
    }

    #[test]
    fn flat_axis_still_gets_one_cell() {
        let dims = GridDims::from_domain(
            Vec3A::new(0.0, 5.0, 0.0),
            Vec3A::new(10.0, 5.0, 10.0),
            1.0,
        );
        assert_eq!(dims.y, 1);
        assert_eq!(dims.x, 10);
    }

    #[test]
    fn linear_index_is_a_bijection() {
        let dims = GridDims { x: 3, y: 4, z: 5 };
        let mut seen = vec![false; dims.num_cells() as usize];
        for cz in 0..dims.z {
            for cy in 0..dims.y {
                for cx in 0..dims.x {
                    let c = dims.linear_index(cx, cy, cz) as usize;
                    assert!(!seen[c], "cell ({cx},{cy},{cz}) collided at {c}");
                    seen[c] = true;
                }
            }
        }
        assert!(seen.iter().all(|&s| s));
    }

    #[test]
    fn coords_clamp_at_the_domain_boundary() {
        let geom = CellGeometry {
            domain_min: Vec3A::ZERO,
            inv_cell_size: 1.0,
            grid: GridDims { x: 4, y: 4, z: 4 },
        };
        // Exactly on the max corner: last cell, not one past it.
        assert_eq!(geom.cell_coords(Vec3A::splat(4.0)), (3, 3, 3));
        // Interior point.
        assert_eq!(geom.cell_coords(Vec3A::new(1.5, 0.2, 3.9)), (1, 0, 3));
        // Slightly outside (stale position): clamped.
        assert_eq!(geom.cell_coords(Vec3A::splat(-0.25)), (0, 0, 0));
        assert_eq!(geom.cell_coords(Vec3A::splat(17.0)), (3, 3, 3));
    }

    #[test]
    fn domain_reduction_matches_extremes() {
        let positions = [
            Vec3A::new(0.5, -2.0, 3.0),
            Vec3A::new(-1.5, 4.0, 0.0),
            Vec3A::new(2.5, 1.0, -3.5),
        ];
        let (min, max) = compute_domain(&positions);
        assert_eq!(min, Vec3A::new(-1.5, -2.0, -3.5));
        assert_eq!(max, Vec3A::new(2.5, 4.0, 3.0));
    }
}
