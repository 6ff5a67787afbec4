//! Block Approximation
//!
//! Bodies are approximated by sets of fixed-radius spheres ("primitives")
//! anchored in the body frame. Primitives are the unit of contact detection;
//! a [`SphereTree`](crate::bvh::SphereTree) built over them accelerates the
//! narrow phase.
//!
//! # Archetypes
//!
//! - **Box**: boundary-only lattice of spheres. The lattice spacing radius is
//!   `min(0.5, ½·min(size))`; each axis gets `ceil(size/2r)` cells and only
//!   cells on the outer shell emit a primitive, with radius `r·√2` so the
//!   spheres overlap and leave no gaps between cells.
//! - **Sphere**: one primitive at the center.

use glam::DVec3;

use crate::bvh::SphereTree;
use crate::math::RigidTransform;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Largest lattice spacing radius used when tessellating boxes.
pub const MAX_BLOCK_RADIUS: f64 = 0.5;

// ============================================================================
// Color
// ============================================================================

/// RGB color attached to primitives.
///
/// Only used to classify purely fixed (boundary) material.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Color {
    /// Red channel in [0, 1]
    pub r: f32,
    /// Green channel in [0, 1]
    pub g: f32,
    /// Blue channel in [0, 1]
    pub b: f32,
}

impl Color {
    /// Neutral gray, not fixed material
    pub const GRAY: Self = Self::new(0.5, 0.5, 0.5);
    /// Boundary blue, fixed material
    pub const BOUNDARY: Self = Self::new(0.2, 0.2, 0.8);

    /// Create a color
    #[must_use]
    pub const fn new(r: f32, g: f32, b: f32) -> Self {
        Self { r, g, b }
    }

    /// Shades of blue with equal red and green mark immovable material.
    #[inline]
    #[must_use]
    pub fn is_fixed_material(&self) -> bool {
        self.r == self.g && self.r < self.b
    }
}

impl Default for Color {
    fn default() -> Self {
        Self::GRAY
    }
}

// ============================================================================
// Primitive
// ============================================================================

/// Fixed-radius sphere anchored at a body-local point.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Primitive {
    /// Center in body coordinates (relative to the center of mass once the
    /// body is built)
    pub center: DVec3,
    /// Sphere radius
    pub radius: f64,
    /// Material color
    pub color: Color,
}

impl Primitive {
    /// Create a primitive
    #[must_use]
    pub const fn new(center: DVec3, radius: f64, color: Color) -> Self {
        Self {
            center,
            radius,
            color,
        }
    }
}

/// Tessellate a box of full `size` into boundary-only lattice primitives.
#[must_use]
pub fn tessellate_box(size: DVec3, color: Color) -> Vec<Primitive> {
    let r = MAX_BLOCK_RADIUS.min(0.5 * size.min_element());
    if r <= 0.0 {
        return Vec::new();
    }
    let cells = |extent: f64| ((extent / (2.0 * r)).ceil() as usize).max(1);
    let (nx, ny, nz) = (cells(size.x), cells(size.y), cells(size.z));
    let radius = r * core::f64::consts::SQRT_2;

    let mut out = Vec::new();
    for i in 0..nx {
        for j in 0..ny {
            for k in 0..nz {
                let boundary = i == 0
                    || j == 0
                    || k == 0
                    || i == nx - 1
                    || j == ny - 1
                    || k == nz - 1;
                if !boundary {
                    continue;
                }
                let center = DVec3::new(
                    -0.5 * size.x + r + 2.0 * r * i as f64,
                    -0.5 * size.y + r + 2.0 * r * j as f64,
                    -0.5 * size.z + r + 2.0 * r * k as f64,
                );
                out.push(Primitive::new(center, radius, color));
            }
        }
    }
    out
}

/// Single primitive covering a sphere.
#[must_use]
pub fn sphere_primitive(radius: f64, color: Color) -> Primitive {
    Primitive::new(DVec3::ZERO, radius, color)
}

// ============================================================================
// Geometry
// ============================================================================

/// Primitives of one body plus the bounding-volume tree over them.
#[derive(Clone, Debug)]
pub struct Geometry {
    primitives: Vec<Primitive>,
    tree: SphereTree,
}

impl Geometry {
    /// Build geometry from primitives already expressed about the body's
    /// center of mass. Returns `None` when `primitives` is empty.
    #[must_use]
    pub fn new(primitives: Vec<Primitive>) -> Option<Self> {
        let tree = SphereTree::build(&primitives)?;
        Some(Self { primitives, tree })
    }

    /// Primitive list
    #[inline]
    #[must_use]
    pub fn primitives(&self) -> &[Primitive] {
        &self.primitives
    }

    /// Bounding-volume tree
    #[inline]
    #[must_use]
    pub fn tree(&self) -> &SphereTree {
        &self.tree
    }

    /// Mutable tree (world-center refresh)
    #[inline]
    pub fn tree_mut(&mut self) -> &mut SphereTree {
        &mut self.tree
    }

    /// True when every primitive is fixed material
    #[must_use]
    pub fn is_all_fixed_material(&self) -> bool {
        self.primitives.iter().all(|p| p.color.is_fixed_material())
    }

    /// True when `point_world` lies inside any primitive
    #[must_use]
    pub fn contains_point(&self, transform: &RigidTransform, point_world: DVec3) -> bool {
        let local = transform.inverse_transform_point(point_world);
        self.primitives
            .iter()
            .any(|p| (local - p.center).length_squared() < p.radius * p.radius)
    }
}
