//! Radius query over the rebuilt hash.
//!
//! The search visits every cell whose AABB can intersect the query
//! sphere (`ceil(r / cell_size)` cells out in each direction, clamped to
//! the grid) and tests members eight at a time. The SoA reordering done
//! at rebuild is what pays off here: the eight x-coordinates of a cell's
//! members are adjacent in memory, so the wide loads touch one or two
//! cache lines instead of eight.
//!
//! Matches are accumulated branchlessly into a small staging buffer
//! (write the candidate unconditionally, advance the cursor by the mask
//! bit) and flushed to the caller's buffer in contiguous copies. The
//! scalar remainder path uses the same accumulation contract, so lane
//! width never changes the result.

use wide::{f32x8, CmpLe};

use crate::error::HashError;
use crate::grid::CELL_EMPTY;
use crate::hash::SpatialHash;
use glam::Vec3A;

/// Staging capacity in indices. Flushed when fewer than one SIMD block
/// of headroom remains.
const STAGING: usize = 2048;

impl SpatialHash {
    /// Collect the caller indices of every agent within `radius` of `q`
    /// into `out`, returning how many were written.
    ///
    /// Inclusive boundary: an agent at distance exactly `radius` is
    /// reported. Each agent is reported at most once. `out` must hold at
    /// least [`len`](SpatialHash::len) indices so no result can
    /// overflow; the query allocates nothing.
    ///
    /// On error the output buffer is untouched.
    pub fn query_into(
        &self,
        q: Vec3A,
        radius: f32,
        out: &mut [u32],
    ) -> Result<usize, HashError> {
        if self.is_empty() {
            return Err(HashError::NotBuilt);
        }
        if !(radius.is_finite() && radius > 0.0) {
            return Err(HashError::InvalidRadius { value: radius });
        }
        if out.len() < self.len() {
            return Err(HashError::OutputTooSmall {
                needed: self.len(),
                got: out.len(),
            });
        }

        let geom = self.geometry();
        let grid = self.grid_dims();
        let (cx, cy, cz) = geom.cell_coords(q);

        // ceil, not truncate: a cell whose near corner is inside the
        // sphere may have its center outside it.
        let reach = (radius * geom.inv_cell_size).ceil() as i64;
        let lo = |c: u32| (c as i64 - reach).max(0) as u32;
        let hi = |c: u32, g: u32| (c as i64 + reach).min(g as i64 - 1) as u32;
        let (min_x, max_x) = (lo(cx), hi(cx, grid.x));
        let (min_y, max_y) = (lo(cy), hi(cy, grid.y));
        let (min_z, max_z) = (lo(cz), hi(cz, grid.z));

        let r2 = radius * radius;
        let r2_wide = f32x8::splat(r2);
        let qx = f32x8::splat(q.x);
        let qy = f32x8::splat(q.y);
        let qz = f32x8::splat(q.z);

        let mut staging = [0u32; STAGING];
        let mut staged = 0usize;
        let mut written = 0usize;

        for z in min_z..=max_z {
            for y in min_y..=max_y {
                for x in min_x..=max_x {
                    let c = grid.linear_index(x, y, z) as usize;
                    let start = self.cell_start[c];
                    if start == CELL_EMPTY {
                        continue;
                    }
                    let end = self.cell_end[c] as usize;
                    let mut i = start as usize;

                    while i + 8 <= end {
                        if staged >= STAGING - 8 {
                            flush(&staging, &mut staged, out, &mut written);
                        }
                        let px = f32x8::from(&self.pos_x[i..i + 8]);
                        let py = f32x8::from(&self.pos_y[i..i + 8]);
                        let pz = f32x8::from(&self.pos_z[i..i + 8]);
                        let dx = px - qx;
                        let dy = py - qy;
                        let dz = pz - qz;
                        let d2 = dx.mul_add(dx, dy.mul_add(dy, dz * dz));
                        let mask = d2.cmp_le(r2_wide).move_mask();
                        for j in 0..8 {
                            staging[staged] = self.original_id[i + j];
                            staged += ((mask >> j) & 1) as usize;
                        }
                        i += 8;
                    }

                    // 0–7 member remainder: scalar, same branchless
                    // accumulation as the wide path.
                    if staged >= STAGING - 8 {
                        flush(&staging, &mut staged, out, &mut written);
                    }
                    while i < end {
                        let dx = self.pos_x[i] - q.x;
                        let dy = self.pos_y[i] - q.y;
                        let dz = self.pos_z[i] - q.z;
                        let d2 = dx.mul_add(dx, dy.mul_add(dy, dz * dz));
                        staging[staged] = self.original_id[i];
                        staged += (d2 <= r2) as usize;
                        i += 1;
                    }
                }
            }
        }

        flush(&staging, &mut staged, out, &mut written);
        Ok(written)
    }
}

fn flush(staging: &[u32], staged: &mut usize, out: &mut [u32], written: &mut usize) {
    out[*written..*written + *staged].copy_from_slice(&staging[..*staged]);
    *written += *staged;
    *staged = 0;
}
