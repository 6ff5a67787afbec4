//! Sphere-Tree Bounding Volume Hierarchy
//!
//! Binary tree of enclosing spheres over a body's primitives, used for the
//! dual-tree narrow phase between two bodies.
//!
//! # Features
//!
//! - Morton-ordered top-down construction (deterministic)
//! - Flat array storage, children addressed by index
//! - World-space node centers refreshed at most once per step via a visit stamp
//! - Dual-tree descent on an explicit, reusable stack (no recursion, no
//!   per-query allocation)
//!
//! Leaf spheres are exactly the primitives, so a leaf-leaf overlap is the
//! primitive overlap test `distance < r1 + r2`. Internal spheres enclose both
//! children (slightly inflated), so pruning never discards a pair that
//! brute-force testing would report.

use glam::DVec3;

use crate::geometry::Primitive;
use crate::math::RigidTransform;

/// Relative inflation applied to internal bounding spheres.
const SPHERE_INFLATION: f64 = 1e-9;

// ============================================================================
// Morton Codes (Z-order curve)
// ============================================================================

/// Expand 21-bit integer to 63 bits for 3D Morton code
#[inline]
fn expand_bits(mut v: u64) -> u64 {
    v = (v | (v << 32)) & 0x001F00000000FFFF;
    v = (v | (v << 16)) & 0x001F0000FF0000FF;
    v = (v | (v << 8)) & 0x100F00F00F00F00F;
    v = (v | (v << 4)) & 0x10C30C30C30C30C3;
    v = (v | (v << 2)) & 0x1249249249249249;
    v
}

/// Morton code of a point inside the box `[min, min + size]`
fn morton_code(point: DVec3, min: DVec3, size: DVec3) -> u64 {
    const MAX: f64 = ((1u64 << 21) - 1) as f64;
    let quantize = |p: f64, lo: f64, s: f64| -> u64 {
        if s <= 0.0 {
            0
        } else {
            (((p - lo) / s).clamp(0.0, 1.0) * MAX) as u64
        }
    };
    let x = quantize(point.x, min.x, size.x);
    let y = quantize(point.y, min.y, size.y);
    let z = quantize(point.z, min.z, size.z);
    expand_bits(x) | (expand_bits(y) << 1) | (expand_bits(z) << 2)
}

// ============================================================================
// Nodes
// ============================================================================

/// Leaf or internal node payload
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NodeKind {
    /// References exactly one primitive
    Leaf {
        /// Index into the body's primitive list
        primitive: u32,
    },
    /// Exactly two children
    Internal {
        /// First child node index
        left: u32,
        /// Second child node index
        right: u32,
    },
}

/// Bounding sphere node
#[derive(Clone, Copy, Debug)]
pub struct SphereNode {
    /// Sphere center in body coordinates
    pub center: DVec3,
    /// Sphere radius
    pub radius: f64,
    /// Leaf/internal payload
    pub kind: NodeKind,
    world_center: DVec3,
    visit: u64,
}

impl SphereNode {
    fn new(center: DVec3, radius: f64, kind: NodeKind) -> Self {
        Self {
            center,
            radius,
            kind,
            world_center: center,
            visit: 0,
        }
    }

    /// True for leaf nodes
    #[inline]
    #[must_use]
    pub fn is_leaf(&self) -> bool {
        matches!(self.kind, NodeKind::Leaf { .. })
    }
}

/// Smallest sphere enclosing two spheres
fn enclosing_sphere(c1: DVec3, r1: f64, c2: DVec3, r2: f64) -> (DVec3, f64) {
    let d = c1.distance(c2);
    let (center, radius) = if d + r2 <= r1 {
        (c1, r1)
    } else if d + r1 <= r2 {
        (c2, r2)
    } else {
        let radius = 0.5 * (d + r1 + r2);
        (c1 + (c2 - c1) * ((radius - r1) / d), radius)
    };
    (center, radius + SPHERE_INFLATION * (1.0 + radius))
}

/// Overlap between two primitives found by a tree query
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LeafHit {
    /// Primitive index on the first body
    pub prim_a: u32,
    /// Primitive index on the second body
    pub prim_b: u32,
    /// World center of the first primitive
    pub center_a: DVec3,
    /// World center of the second primitive
    pub center_b: DVec3,
    /// Radius of the first primitive
    pub radius_a: f64,
    /// Radius of the second primitive
    pub radius_b: f64,
}

impl LeafHit {
    /// Center-to-center distance
    #[inline]
    #[must_use]
    pub fn distance(&self) -> f64 {
        self.center_a.distance(self.center_b)
    }
}

// ============================================================================
// Sphere Tree
// ============================================================================

/// Bounding-sphere hierarchy over one body's primitives
#[derive(Clone, Debug)]
pub struct SphereTree {
    nodes: Vec<SphereNode>,
    root: u32,
}

impl SphereTree {
    /// Build a tree over `primitives`. Returns `None` if there are none.
    #[must_use]
    pub fn build(primitives: &[Primitive]) -> Option<Self> {
        if primitives.is_empty() {
            return None;
        }

        let (min, max) = primitives.iter().fold(
            (DVec3::splat(f64::INFINITY), DVec3::splat(f64::NEG_INFINITY)),
            |(lo, hi), p| (lo.min(p.center), hi.max(p.center)),
        );
        let size = max - min;

        let mut order: Vec<(u64, u32)> = primitives
            .iter()
            .enumerate()
            .map(|(i, p)| (morton_code(p.center, min, size), i as u32))
            .collect();
        order.sort_unstable();

        let mut nodes = Vec::with_capacity(2 * primitives.len() - 1);
        let root = Self::build_recursive(&mut nodes, primitives, &order);
        Some(Self { nodes, root })
    }

    fn build_recursive(
        nodes: &mut Vec<SphereNode>,
        primitives: &[Primitive],
        order: &[(u64, u32)],
    ) -> u32 {
        if let [(_, index)] = order {
            let p = &primitives[*index as usize];
            nodes.push(SphereNode::new(
                p.center,
                p.radius,
                NodeKind::Leaf { primitive: *index },
            ));
            return (nodes.len() - 1) as u32;
        }

        let mid = order.len() / 2;
        let left = Self::build_recursive(nodes, primitives, &order[..mid]);
        let right = Self::build_recursive(nodes, primitives, &order[mid..]);
        let (l, r) = (nodes[left as usize], nodes[right as usize]);
        let (center, radius) = enclosing_sphere(l.center, l.radius, r.center, r.radius);
        nodes.push(SphereNode::new(
            center,
            radius,
            NodeKind::Internal { left, right },
        ));
        (nodes.len() - 1) as u32
    }

    /// Root node
    #[inline]
    #[must_use]
    pub fn root(&self) -> &SphereNode {
        &self.nodes[self.root as usize]
    }

    /// All nodes
    #[inline]
    #[must_use]
    pub fn nodes(&self) -> &[SphereNode] {
        &self.nodes
    }

    /// Depth of the tree (a single leaf has depth 1)
    #[must_use]
    pub fn depth(&self) -> usize {
        fn walk(nodes: &[SphereNode], idx: u32) -> usize {
            match nodes[idx as usize].kind {
                NodeKind::Leaf { .. } => 1,
                NodeKind::Internal { left, right } => {
                    1 + walk(nodes, left).max(walk(nodes, right))
                }
            }
        }
        walk(&self.nodes, self.root)
    }

    /// World center of node `idx`, recomputed only if not yet visited this step
    #[inline]
    fn refresh(&mut self, idx: u32, transform: &RigidTransform, visit: u64) -> DVec3 {
        let node = &mut self.nodes[idx as usize];
        if node.visit != visit {
            node.visit = visit;
            node.world_center = transform.transform_point(node.center);
        }
        node.world_center
    }
}

/// Reusable traversal stack for [`collide_trees`]
pub type TraversalStack = Vec<(u32, u32)>;

/// Dual-tree descent reporting every overlapping primitive pair.
///
/// `visit` must be a step-local stamp: all nodes refreshed with the same
/// stamp reuse their cached world centers.
pub fn collide_trees<F>(
    tree_a: &mut SphereTree,
    transform_a: &RigidTransform,
    tree_b: &mut SphereTree,
    transform_b: &RigidTransform,
    visit: u64,
    stack: &mut TraversalStack,
    mut on_hit: F,
) where
    F: FnMut(LeafHit),
{
    stack.clear();
    stack.push((tree_a.root, tree_b.root));

    while let Some((ia, ib)) = stack.pop() {
        let ca = tree_a.refresh(ia, transform_a, visit);
        let cb = tree_b.refresh(ib, transform_b, visit);
        let na = tree_a.nodes[ia as usize];
        let nb = tree_b.nodes[ib as usize];

        if ca.distance_squared(cb) >= (na.radius + nb.radius) * (na.radius + nb.radius) {
            continue;
        }

        match (na.kind, nb.kind) {
            (NodeKind::Leaf { primitive: pa }, NodeKind::Leaf { primitive: pb }) => {
                on_hit(LeafHit {
                    prim_a: pa,
                    prim_b: pb,
                    center_a: ca,
                    center_b: cb,
                    radius_a: na.radius,
                    radius_b: nb.radius,
                });
            }
            // A leaf on one side always splits the other side.
            (NodeKind::Leaf { .. }, NodeKind::Internal { left, right }) => {
                stack.push((ia, right));
                stack.push((ia, left));
            }
            (NodeKind::Internal { left, right }, NodeKind::Leaf { .. }) => {
                stack.push((right, ib));
                stack.push((left, ib));
            }
            (
                NodeKind::Internal { left: la, right: ra },
                NodeKind::Internal { left: lb, right: rb },
            ) => {
                if na.radius <= nb.radius {
                    stack.push((ia, rb));
                    stack.push((ia, lb));
                } else {
                    stack.push((ra, ib));
                    stack.push((la, ib));
                }
            }
        }
    }
}

/// All-pairs primitive test, same contract as [`collide_trees`].
pub fn brute_force_pairs<F>(
    prims_a: &[Primitive],
    transform_a: &RigidTransform,
    prims_b: &[Primitive],
    transform_b: &RigidTransform,
    mut on_hit: F,
) where
    F: FnMut(LeafHit),
{
    for (ia, pa) in prims_a.iter().enumerate() {
        let ca = transform_a.transform_point(pa.center);
        for (ib, pb) in prims_b.iter().enumerate() {
            let cb = transform_b.transform_point(pb.center);
            let rsum = pa.radius + pb.radius;
            if ca.distance_squared(cb) < rsum * rsum {
                on_hit(LeafHit {
                    prim_a: ia as u32,
                    prim_b: ib as u32,
                    center_a: ca,
                    center_b: cb,
                    radius_a: pa.radius,
                    radius_b: pb.radius,
                });
            }
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
