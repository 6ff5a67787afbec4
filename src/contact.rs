//! Contacts and the Persistent Contact Graph
//!
//! A [`Contact`] is a per-step record of one overlapping primitive pair. It
//! references two kinds of bodies:
//!
//! - the *recorded* bodies: the leaf bodies whose primitives overlap
//! - the *constrained* bodies: each leaf's owning collection if merged,
//!   otherwise the leaf itself
//!
//! The solver acts on the constrained bodies while geometry stays at leaf
//! resolution.
//!
//! A [`BodyPairContact`] is the multi-step record between two leaf bodies.
//! The [`ContactGraph`] owns them, keyed by unordered body pair, and keeps the
//! per-body incident lists in sync.

use glam::DVec3;
use indexmap::IndexMap;

use crate::body::BodyHandle;
use crate::body_set::BodySet;
use crate::history::History;

// ============================================================================
// Keys
// ============================================================================

/// Unordered body pair key (`a < b`)
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BodyPairKey {
    /// Smaller handle
    pub a: BodyHandle,
    /// Larger handle
    pub b: BodyHandle,
}

impl BodyPairKey {
    /// Create a canonical body pair key
    #[inline]
    #[must_use]
    pub fn new(a: BodyHandle, b: BodyHandle) -> Self {
        if a <= b {
            Self { a, b }
        } else {
            Self { a: b, b: a }
        }
    }

    /// The endpoint that is not `body`
    #[inline]
    #[must_use]
    pub fn other(&self, body: BodyHandle) -> BodyHandle {
        if self.a == body {
            self.b
        } else {
            self.a
        }
    }

    /// True when `body` is an endpoint
    #[inline]
    #[must_use]
    pub fn involves(&self, body: BodyHandle) -> bool {
        self.a == body || self.b == body
    }
}

/// Stable identity of one primitive: owning leaf body and primitive index
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PrimitiveId {
    /// Leaf body owning the primitive
    pub body: BodyHandle,
    /// Index into the body's primitive list
    pub index: u32,
}

/// Unordered primitive pair key, independent of allocation identity
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PrimitivePairKey {
    /// Smaller primitive id
    pub first: PrimitiveId,
    /// Larger primitive id
    pub second: PrimitiveId,
}

impl PrimitivePairKey {
    /// Create a canonical primitive pair key
    #[inline]
    #[must_use]
    pub fn new(a: PrimitiveId, b: PrimitiveId) -> Self {
        if a <= b {
            Self { first: a, second: b }
        } else {
            Self { first: b, second: a }
        }
    }
}

// ============================================================================
// Contact
// ============================================================================

/// One constrained direction: 12 coefficients acting on two bodies
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct JacobianRow {
    /// Linear part on the first constrained body
    pub linear_a: DVec3,
    /// Angular part on the first constrained body
    pub angular_a: DVec3,
    /// Linear part on the second constrained body
    pub linear_b: DVec3,
    /// Angular part on the second constrained body
    pub angular_b: DVec3,
}

impl JacobianRow {
    /// Row for direction `dir` with lever arms `r_a`, `r_b` from each
    /// constrained body's center of mass
    #[inline]
    #[must_use]
    pub fn new(dir: DVec3, r_a: DVec3, r_b: DVec3) -> Self {
        Self {
            linear_a: -dir,
            angular_a: -r_a.cross(dir),
            linear_b: dir,
            angular_b: r_b.cross(dir),
        }
    }

    /// `J·u` for the given body velocities
    #[inline]
    #[must_use]
    pub fn dot(&self, v_a: DVec3, w_a: DVec3, v_b: DVec3, w_b: DVec3) -> f64 {
        self.linear_a.dot(v_a)
            + self.angular_a.dot(w_a)
            + self.linear_b.dot(v_b)
            + self.angular_b.dot(w_b)
    }
}

/// Number of constrained directions per contact (normal + two tangents)
pub const ROWS_PER_CONTACT: usize = 3;

/// Per-step contact between two primitives
#[derive(Clone, Debug)]
pub struct Contact {
    /// Index in the step's contact list
    pub index: usize,
    /// Contact point (world)
    pub point: DVec3,
    /// Unit normal from the first recorded body towards the second
    pub normal: DVec3,
    /// Tangent basis orthogonal to the normal
    pub tangents: [DVec3; 2],
    /// `distance − (r1 + r2)`, negative while overlapping
    pub constraint_violation: f64,
    /// First recorded (leaf) body
    pub body_a: BodyHandle,
    /// Second recorded (leaf) body
    pub body_b: BodyHandle,
    /// First constrained body
    pub constrained_a: BodyHandle,
    /// Second constrained body
    pub constrained_b: BodyHandle,
    /// Primitive pair identity for warm starting
    pub key: PrimitivePairKey,
    /// Normal in the first constrained body's frame
    pub normal_local_a: DVec3,
    /// Negated normal in the second constrained body's frame
    pub normal_local_b: DVec3,
    /// Normal row then two tangent rows
    pub rows: [JacobianRow; ROWS_PER_CONTACT],
    /// Accumulated impulse per row
    pub lambda: [f64; ROWS_PER_CONTACT],
    /// Combined restitution
    pub restitution: f64,
    /// Combined friction coefficient
    pub friction: f64,
    /// Contact force on the first constrained body, its frame
    pub force_a: DVec3,
    /// Contact torque on the first constrained body, its frame
    pub torque_a: DVec3,
    /// Contact force on the second constrained body, its frame
    pub force_b: DVec3,
    /// Contact torque on the second constrained body, its frame
    pub torque_b: DVec3,
}

impl Contact {
    /// Penetration depth (positive while overlapping)
    #[inline]
    #[must_use]
    pub fn penetration(&self) -> f64 {
        -self.constraint_violation
    }

    /// Normal impulse from the last solve
    #[inline]
    #[must_use]
    pub fn normal_impulse(&self) -> f64 {
        self.lambda[0]
    }

    /// Tangent impulses from the last solve
    #[inline]
    #[must_use]
    pub fn tangent_impulses(&self) -> [f64; 2] {
        [self.lambda[1], self.lambda[2]]
    }

    /// True when this contact touches `body` as recorded or constrained body
    #[must_use]
    pub fn touches(&self, body: BodyHandle) -> bool {
        self.body_a == body
            || self.body_b == body
            || self.constrained_a == body
            || self.constrained_b == body
    }

    /// Relative velocity of the two recorded bodies at the contact point,
    /// using their constrained bodies' motion
    #[must_use]
    pub fn relative_velocity(&self, bodies: &BodySet) -> DVec3 {
        let a = &bodies[self.constrained_a];
        let b = &bodies[self.constrained_b];
        b.spatial_velocity(self.point) - a.spatial_velocity(self.point)
    }
}

// ============================================================================
// Body pair contact
// ============================================================================

/// Persistent record of contact between two leaf bodies
#[derive(Clone, Debug)]
pub struct BodyPairContact {
    /// Endpoints
    pub key: BodyPairKey,
    /// Indices of this step's contacts between the pair
    pub contacts: Vec<usize>,
    /// Relative-motion samples, one per step in contact
    pub motion_history: History<f64>,
    /// Contact detected this step
    pub active: bool,
    /// Edge lies inside a collection
    pub in_collection: bool,
    /// Edge is being considered by the current merge pass
    pub in_cycle: bool,
    /// Consecutive steps without contact
    pub idle_steps: u32,
}

impl BodyPairContact {
    /// New record with an empty motion window
    #[must_use]
    pub fn new(key: BodyPairKey, window: usize) -> Self {
        Self {
            key,
            contacts: Vec::new(),
            motion_history: History::new(window),
            active: false,
            in_collection: false,
            in_cycle: false,
            idle_steps: 0,
        }
    }
}

// ============================================================================
// Contact graph
// ============================================================================

/// Persistent pairwise contact graph over leaf bodies
#[derive(Clone, Debug, Default)]
pub struct ContactGraph {
    pairs: IndexMap<BodyPairKey, BodyPairContact>,
}

impl ContactGraph {
    /// Empty graph
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of pair records
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    /// True when no pair is recorded
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    /// Lookup by key
    #[must_use]
    pub fn get(&self, key: &BodyPairKey) -> Option<&BodyPairContact> {
        self.pairs.get(key)
    }

    /// Mutable lookup by key
    pub fn get_mut(&mut self, key: &BodyPairKey) -> Option<&mut BodyPairContact> {
        self.pairs.get_mut(key)
    }

    /// Iterate records in insertion order
    pub fn iter(&self) -> impl Iterator<Item = &BodyPairContact> + '_ {
        self.pairs.values()
    }

    /// Iterate records mutably in insertion order
    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut BodyPairContact> + '_ {
        self.pairs.values_mut()
    }

    /// Keys in insertion order
    pub fn keys(&self) -> impl Iterator<Item = &BodyPairKey> + '_ {
        self.pairs.keys()
    }

    /// Get or create the record for `key`, registering it with both bodies.
    /// Returns the record and whether it was just created.
    pub fn entry(
        &mut self,
        bodies: &mut BodySet,
        key: BodyPairKey,
        window: usize,
    ) -> (&mut BodyPairContact, bool) {
        let created = !self.pairs.contains_key(&key);
        if created {
            for handle in [key.a, key.b] {
                if let Some(body) = bodies.get_mut(handle) {
                    body.pair_keys.push(key);
                }
            }
        }
        let pair = self
            .pairs
            .entry(key)
            .or_insert_with(|| BodyPairContact::new(key, window));
        (pair, created)
    }

    /// Clear per-step state before contact generation
    pub fn begin_step(&mut self) {
        for pair in self.pairs.values_mut() {
            pair.contacts.clear();
            pair.active = false;
            pair.in_cycle = false;
        }
    }

    /// Age pairs without contact and drop those past the grace window.
    ///
    /// Pairs inside a collection never age. Pairs whose bodies are both
    /// inactive (`frozen` returns true) are not re-tested by the broad phase
    /// and keep their age too, so sleeping stacks retain their edges.
    pub fn prune<F>(&mut self, bodies: &mut BodySet, grace_steps: u32, mut frozen: F) -> usize
    where
        F: FnMut(&BodySet, &BodyPairKey) -> bool,
    {
        let mut dropped = Vec::new();
        for pair in self.pairs.values_mut() {
            if pair.active {
                pair.idle_steps = 0;
                continue;
            }
            if pair.in_collection || frozen(bodies, &pair.key) {
                continue;
            }
            pair.idle_steps += 1;
            if pair.idle_steps > grace_steps {
                dropped.push(pair.key);
            }
        }
        for key in &dropped {
            self.remove(bodies, key);
        }
        dropped.len()
    }

    /// Remove one record and its incident-list entries
    pub fn remove(&mut self, bodies: &mut BodySet, key: &BodyPairKey) -> Option<BodyPairContact> {
        let pair = self.pairs.shift_remove(key)?;
        for handle in [key.a, key.b] {
            if let Some(body) = bodies.get_mut(handle) {
                body.pair_keys.retain(|k| k != key);
            }
        }
        Some(pair)
    }

    /// Remove every record touching `body`
    pub fn remove_body(&mut self, bodies: &mut BodySet, body: BodyHandle) {
        let keys: Vec<BodyPairKey> = bodies
            .get(body)
            .map(|b| b.pair_keys.clone())
            .unwrap_or_default();
        for key in &keys {
            self.remove(bodies, key);
        }
    }
}
