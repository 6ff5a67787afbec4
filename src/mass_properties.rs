//! Mass Property Computation
//!
//! Mass, center of mass, and inertia tensors for the body archetypes plus the
//! closed-form composite operations used by collections.
//!
//! # Supported Shapes
//!
//! - Sphere
//! - Box (full side lengths)
//! - Sphere cloud (a body given as a bag of equal-mass primitives)
//!
//! # Composites
//!
//! [`MassProperties::combine`] and [`MassProperties::subtract`] implement the
//! parallel-axis combination of two parts, so a collection can be grown and
//! shrunk one member at a time. Combination is order independent up to
//! floating-point rounding.

use glam::{DMat3, DVec3};

use crate::math::parallel_axis_term;

// ============================================================================
// Mass Properties
// ============================================================================

/// Mass, center of mass, and inertia tensor for a rigid body.
///
/// `inertia` is taken about `center_of_mass`, expressed in the same frame as
/// `center_of_mass`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct MassProperties {
    /// Total mass
    pub mass: f64,
    /// Center of mass
    pub center_of_mass: DVec3,
    /// Inertia tensor about the center of mass
    pub inertia: DMat3,
}

impl MassProperties {
    /// Zero mass properties (empty composite).
    pub const ZERO: Self = Self {
        mass: 0.0,
        center_of_mass: DVec3::ZERO,
        inertia: DMat3::ZERO,
    };

    /// Rescale to a given total mass, keeping the distribution.
    #[must_use]
    pub fn with_mass(self, mass: f64) -> Self {
        if self.mass <= 0.0 {
            return self;
        }
        let s = mass / self.mass;
        Self {
            mass,
            center_of_mass: self.center_of_mass,
            inertia: self.inertia * s,
        }
    }

    /// Combine two parts into one composite.
    #[must_use]
    pub fn combine(&self, other: &Self) -> Self {
        let mass = self.mass + other.mass;
        if mass <= 0.0 {
            return Self::ZERO;
        }
        let com = (self.center_of_mass * self.mass + other.center_of_mass * other.mass) / mass;
        let inertia = translate_inertia(self, com - self.center_of_mass)
            + translate_inertia(other, com - other.center_of_mass);
        Self {
            mass,
            center_of_mass: com,
            inertia,
        }
    }

    /// Remove a part previously combined into this composite.
    ///
    /// Exact inverse of [`combine`](Self::combine) up to rounding. Returns
    /// `ZERO` when nothing of positive mass remains.
    #[must_use]
    pub fn subtract(&self, part: &Self) -> Self {
        let mass = self.mass - part.mass;
        if mass <= f64::EPSILON * self.mass.max(1.0) {
            return Self::ZERO;
        }
        let com = (self.center_of_mass * self.mass - part.center_of_mass * part.mass) / mass;
        // I_total = I_rest + m_rest·op(com_rest − com) + I_part + m_part·op(com_part − com)
        let inertia = self.inertia
            - translate_inertia(part, self.center_of_mass - part.center_of_mass)
            - parallel_axis_term(com - self.center_of_mass) * mass;
        Self {
            mass,
            center_of_mass: com,
            inertia,
        }
    }
}

impl Default for MassProperties {
    fn default() -> Self {
        Self::ZERO
    }
}

// ============================================================================
// Shape-specific mass property functions
// ============================================================================

/// Compute mass properties of a solid sphere.
///
/// Inertia: `I = 2/5 * m * r^2` (diagonal, all axes equal).
#[must_use]
pub fn sphere_mass_properties(radius: f64, density: f64) -> MassProperties {
    let volume = 4.0 / 3.0 * core::f64::consts::PI * radius * radius * radius;
    let mass = volume * density;
    let i = 0.4 * mass * radius * radius;
    MassProperties {
        mass,
        center_of_mass: DVec3::ZERO,
        inertia: DMat3::from_diagonal(DVec3::splat(i)),
    }
}

/// Compute mass properties of a box given its full side lengths.
///
/// Inertia: `Ixx = m/12 * (h^2 + d^2)`, etc.
#[must_use]
pub fn box_mass_properties(size: DVec3, density: f64) -> MassProperties {
    let mass = size.x * size.y * size.z * density;
    let s2 = size * size;
    let factor = mass / 12.0;
    MassProperties {
        mass,
        center_of_mass: DVec3::ZERO,
        inertia: DMat3::from_diagonal(DVec3::new(
            factor * (s2.y + s2.z),
            factor * (s2.x + s2.z),
            factor * (s2.x + s2.y),
        )),
    }
}

/// Mass properties of a cloud of equal-mass solid spheres.
///
/// Each `(center, radius)` gets `mass / n`. Returns `None` for an empty cloud.
#[must_use]
pub fn sphere_cloud_mass_properties(
    spheres: &[(DVec3, f64)],
    mass: f64,
) -> Option<MassProperties> {
    if spheres.is_empty() {
        return None;
    }
    let each = mass / spheres.len() as f64;
    let mut total = MassProperties::ZERO;
    for &(center, radius) in spheres {
        let part = MassProperties {
            mass: each,
            center_of_mass: center,
            inertia: DMat3::from_diagonal(DVec3::splat(0.4 * each * radius * radius)),
        };
        total = total.combine(&part);
    }
    Some(total)
}

/// Parallel-axis theorem: inertia of `props` about a point displaced by
/// `offset` from its center of mass.
#[must_use]
pub fn translate_inertia(props: &MassProperties, offset: DVec3) -> DMat3 {
    props.inertia + parallel_axis_term(offset) * props.mass
}

// ============================================================================
// Tests
// ============================================================================
