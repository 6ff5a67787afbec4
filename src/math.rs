//! Rigid Transforms and Small Linear-Algebra Helpers
//!
//! All simulation math is `f64` on top of `glam`'s double-precision types.
//! [`RigidTransform`] is a rotation followed by a translation and is the only
//! body↔world mapping the crate uses; bodies re-derive it after every pose
//! mutation so it is never stale.

use glam::{DMat3, DQuat, DVec3};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

// ============================================================================
// Rigid Transform
// ============================================================================

/// Rotation + translation mapping body coordinates to world coordinates.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct RigidTransform {
    /// Rotation part
    pub rotation: DQuat,
    /// Translation part (image of the body origin)
    pub translation: DVec3,
}

impl RigidTransform {
    /// Identity transform
    pub const IDENTITY: Self = Self {
        rotation: DQuat::IDENTITY,
        translation: DVec3::ZERO,
    };

    /// Create from rotation and translation
    #[inline]
    #[must_use]
    pub const fn new(rotation: DQuat, translation: DVec3) -> Self {
        Self {
            rotation,
            translation,
        }
    }

    /// Pure translation
    #[inline]
    #[must_use]
    pub const fn from_translation(translation: DVec3) -> Self {
        Self::new(DQuat::IDENTITY, translation)
    }

    /// Map a body-frame point to world
    #[inline]
    #[must_use]
    pub fn transform_point(&self, p: DVec3) -> DVec3 {
        self.rotation * p + self.translation
    }

    /// Map a body-frame direction to world
    #[inline]
    #[must_use]
    pub fn transform_vector(&self, v: DVec3) -> DVec3 {
        self.rotation * v
    }

    /// Map a world point to the body frame
    #[inline]
    #[must_use]
    pub fn inverse_transform_point(&self, p: DVec3) -> DVec3 {
        self.rotation.inverse() * (p - self.translation)
    }

    /// Map a world direction to the body frame
    #[inline]
    #[must_use]
    pub fn inverse_transform_vector(&self, v: DVec3) -> DVec3 {
        self.rotation.inverse() * v
    }

    /// Inverse transform (world → body)
    #[must_use]
    pub fn inverse(&self) -> Self {
        let inv = self.rotation.inverse();
        Self::new(inv, -(inv * self.translation))
    }

    /// Composition `self ∘ other` (apply `other` first)
    #[must_use]
    pub fn mul_transform(&self, other: &Self) -> Self {
        Self::new(
            (self.rotation * other.rotation).normalize(),
            self.transform_point(other.translation),
        )
    }

    /// Rotation as a 3x3 matrix
    #[inline]
    #[must_use]
    pub fn rotation_matrix(&self) -> DMat3 {
        DMat3::from_quat(self.rotation)
    }
}

impl Default for RigidTransform {
    fn default() -> Self {
        Self::IDENTITY
    }
}

// ============================================================================
// Helpers
// ============================================================================

/// Build an orthonormal tangent frame from a unit normal.
///
/// Picks the world axis least parallel to the normal so the frame is a pure
/// function of the normal (stable across steps for warm starting).
#[must_use]
pub fn tangent_frame(normal: DVec3) -> (DVec3, DVec3) {
    let a = normal.abs();
    let reference = if a.x <= a.y && a.x <= a.z {
        DVec3::X
    } else if a.y <= a.z {
        DVec3::Y
    } else {
        DVec3::Z
    };
    let t1 = normal.cross(reference).normalize();
    let t2 = normal.cross(t1);
    (t1, t2)
}

/// `|d|²·I − d·dᵀ`, the unit-mass parallel-axis term.
#[must_use]
pub fn parallel_axis_term(d: DVec3) -> DMat3 {
    let outer = DMat3::from_cols(d * d.x, d * d.y, d * d.z);
    DMat3::from_diagonal(DVec3::splat(d.length_squared())) - outer
}

/// Rotate a body-frame tensor into world: `R·I·Rᵀ`.
#[inline]
#[must_use]
pub fn rotate_tensor(rotation: DQuat, tensor: DMat3) -> DMat3 {
    let r = DMat3::from_quat(rotation);
    r * tensor * r.transpose()
}

/// Inverse of a symmetric tensor, zero if singular.
#[must_use]
pub fn inverse_or_zero(tensor: DMat3) -> DMat3 {
    if tensor.determinant().abs() <= f64::EPSILON {
        DMat3::ZERO
    } else {
        tensor.inverse()
    }
}
