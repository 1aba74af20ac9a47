//! Steering and integration parameters.

use crate::error::KernelError;

/// Tuning parameters for the boid rules and the integration clamps.
///
/// `r_seek` doubles as the hash query radius — it must be the largest of
/// the three rule radii so a single neighbour fetch serves all rules.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BoidParams {
    /// Cohesion radius; also the neighbour-query radius.
    pub r_seek: f32,
    /// Separation radius.
    pub r_flee: f32,
    /// Alignment radius.
    pub r_align: f32,
    /// Minimum sustained speed. Agents slower than this are rescaled
    /// along their current heading (a stopped agent stays stopped).
    pub v_min: f32,
    /// Maximum speed.
    pub v_max: f32,
    /// Maximum acceleration magnitude per update.
    pub a_max: f32,
    /// Guard term for the separation rule's inverse-square weight.
    pub flee_epsilon: f32,
}

impl Default for BoidParams {
    fn default() -> Self {
        Self {
            r_seek: 0.25,
            r_flee: 0.15,
            r_align: 0.25,
            v_min: 0.15,
            v_max: 0.5,
            a_max: 0.25,
            flee_epsilon: 1.0e-6,
        }
    }
}

impl BoidParams {
    /// Check the parameter invariants the kernel relies on.
    pub fn validate(&self) -> Result<(), KernelError> {
        let positive_finite =
            |v: f32| v.is_finite() && v > 0.0;
        if !positive_finite(self.r_seek)
            || !positive_finite(self.r_flee)
            || !positive_finite(self.r_align)
        {
            return Err(KernelError::InvalidParams {
                reason: "rule radii must be positive and finite",
            });
        }
        if self.r_seek < self.r_flee || self.r_seek < self.r_align {
            return Err(KernelError::InvalidParams {
                reason: "r_seek is the query radius and must be the largest rule radius",
            });
        }
        if !(self.v_min.is_finite() && self.v_min >= 0.0) {
            return Err(KernelError::InvalidParams {
                reason: "v_min must be finite and non-negative",
            });
        }
        if !(self.v_max.is_finite() && self.v_max >= self.v_min) {
            return Err(KernelError::InvalidParams {
                reason: "v_max must be finite and at least v_min",
            });
        }
        if !positive_finite(self.a_max) {
            return Err(KernelError::InvalidParams {
                reason: "a_max must be positive and finite",
            });
        }
        if !positive_finite(self.flee_epsilon) {
            return Err(KernelError::InvalidParams {
                reason: "flee_epsilon must be positive and finite",
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        BoidParams::default().validate().unwrap();
    }

    #[test]
    fn query_radius_must_dominate() {
        let params = BoidParams {
            r_flee: 0.5,
            ..Default::default()
        };
        assert!(params.validate().is_err());
    }

    #[test]
    fn inverted_speed_envelope_is_rejected() {
        let params = BoidParams {
            v_min: 1.0,
            v_max: 0.5,
            ..Default::default()
        };
        assert!(params.validate().is_err());
    }

    #[test]
    fn non_finite_values_are_rejected() {
        for bad in [f32::NAN, f32::INFINITY, -1.0, 0.0] {
            assert!(BoidParams {
                r_seek: bad,
                ..Default::default()
            }
            .validate()
            .is_err());
            assert!(BoidParams {
                a_max: bad,
                ..Default::default()
            }
            .validate()
            .is_err());
        }
    }
}
