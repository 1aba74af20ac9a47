//! Per-agent component and behaviour bitsets.
//!
//! Both sets are fixed-width `u32` bitsets. [`ComponentSet`] selects which
//! subsystems see an agent; [`BehaviourSet`] selects which steering rules
//! apply to it. Agents with no `SPATIAL` component are invisible to the
//! spatial hash and the boid kernel alike.

use std::fmt;
use std::ops::{BitOr, BitOrAssign};

/// Subsystem membership flags for a single agent.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct ComponentSet(u32);

impl ComponentSet {
    /// Agent participates in spatial-hash queries.
    pub const SPATIAL: ComponentSet = ComponentSet(1 << 0);
    /// Agent is integrated by the boid kernel.
    pub const BOID: ComponentSet = ComponentSet(1 << 1);

    /// The empty set.
    pub const fn empty() -> Self {
        ComponentSet(0)
    }

    /// Set with both `SPATIAL` and `BOID` (the default for spawned agents).
    pub const fn spatial_boid() -> Self {
        ComponentSet(Self::SPATIAL.0 | Self::BOID.0)
    }

    /// Whether every flag in `other` is present in `self`.
    pub const fn contains(self, other: ComponentSet) -> bool {
        self.0 & other.0 == other.0
    }

    /// Whether no flags are set.
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }
}

impl BitOr for ComponentSet {
    type Output = ComponentSet;

    fn bitor(self, rhs: Self) -> Self {
        ComponentSet(self.0 | rhs.0)
    }
}

impl BitOrAssign for ComponentSet {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

impl fmt::Display for ComponentSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names = Vec::new();
        if self.contains(Self::SPATIAL) {
            names.push("spatial");
        }
        if self.contains(Self::BOID) {
            names.push("boid");
        }
        write!(f, "{{{}}}", names.join("|"))
    }
}

/// Steering-rule flags for a single agent.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct BehaviourSet(u32);

impl BehaviourSet {
    /// Cohesion: steer toward the average offset of neighbours.
    pub const SEEK: BehaviourSet = BehaviourSet(1 << 0);
    /// Separation: steer away from neighbours, inverse-square weighted.
    pub const FLEE: BehaviourSet = BehaviourSet(1 << 1);
    /// Alignment: steer toward the average neighbour velocity.
    pub const ALIGN: BehaviourSet = BehaviourSet(1 << 2);

    /// The empty set.
    pub const fn empty() -> Self {
        BehaviourSet(0)
    }

    /// All three steering rules.
    pub const fn all() -> Self {
        BehaviourSet(Self::SEEK.0 | Self::FLEE.0 | Self::ALIGN.0)
    }

    /// Whether every flag in `other` is present in `self`.
    pub const fn contains(self, other: BehaviourSet) -> bool {
        self.0 & other.0 == other.0
    }

    /// Whether no flags are set.
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }
}

impl BitOr for BehaviourSet {
    type Output = BehaviourSet;

    fn bitor(self, rhs: Self) -> Self {
        BehaviourSet(self.0 | rhs.0)
    }
}

impl BitOrAssign for BehaviourSet {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

impl fmt::Display for BehaviourSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names = Vec::new();
        if self.contains(Self::SEEK) {
            names.push("seek");
        }
        if self.contains(Self::FLEE) {
            names.push("flee");
        }
        if self.contains(Self::ALIGN) {
            names.push("align");
        }
        write!(f, "{{{}}}", names.join("|"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_contains_nothing() {
        let c = ComponentSet::empty();
        assert!(c.is_empty());
        assert!(!c.contains(ComponentSet::SPATIAL));
        assert!(!c.contains(ComponentSet::BOID));
        // The empty set is a subset of everything, including itself.
        assert!(c.contains(ComponentSet::empty()));
    }

    #[test]
    fn union_accumulates_flags() {
        let mut c = ComponentSet::SPATIAL;
        c |= ComponentSet::BOID;
        assert!(c.contains(ComponentSet::SPATIAL));
        assert!(c.contains(ComponentSet::BOID));
        assert_eq!(c, ComponentSet::spatial_boid());
    }

    #[test]
    fn behaviour_all_has_every_rule() {
        let b = BehaviourSet::all();
        assert!(b.contains(BehaviourSet::SEEK));
        assert!(b.contains(BehaviourSet::FLEE));
        assert!(b.contains(BehaviourSet::ALIGN));
        assert_eq!(
            b,
            BehaviourSet::SEEK | BehaviourSet::FLEE | BehaviourSet::ALIGN
        );
    }

    #[test]
    fn contains_is_subset_not_intersection() {
        let b = BehaviourSet::SEEK | BehaviourSet::ALIGN;
        assert!(b.contains(BehaviourSet::SEEK));
        assert!(!b.contains(BehaviourSet::SEEK | BehaviourSet::FLEE));
    }

    #[test]
    fn display_names_flags() {
        assert_eq!(format!("{}", ComponentSet::spatial_boid()), "{spatial|boid}");
        assert_eq!(format!("{}", BehaviourSet::FLEE), "{flee}");
        assert_eq!(format!("{}", BehaviourSet::empty()), "{}");
    }
}
