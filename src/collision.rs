//! Collision Detection and Contact Generation
//!
//! # Pipeline
//!
//! 1. **Broad phase**: O(n²) scan over top-level bodies. Pinned–pinned pairs
//!    never interact; pairs whose bodies are both inactive (sleeping or
//!    pinned) are skipped.
//! 2. **Narrow phase**: collections recurse into their members so primitive
//!    tests always run between leaf bodies; leaf pairs use dual-tree descent
//!    or brute force.
//! 3. **Contact generation**: each overlapping primitive pair yields one
//!    [`Contact`] acting on the leaves' constrained bodies, and updates the
//!    persistent [`ContactGraph`].
//! 4. **Wake**: contact-graph flood wake (depth limited) or direct wake of a
//!    sleeping body hit by a fully active neighbor.
//!
//! Penalty mode ([`apply_penalty_forces`]) turns the same contacts into
//! spring/damper forces instead of solver rows.

use std::collections::VecDeque;

use glam::DVec3;

use crate::body::BodyHandle;
use crate::body_set::BodySet;
use crate::bvh::{brute_force_pairs, collide_trees, LeafHit, TraversalStack};
use crate::contact::{
    BodyPairKey, Contact, ContactGraph, JacobianRow, PrimitiveId, PrimitivePairKey,
    ROWS_PER_CONTACT,
};
use crate::math::tangent_frame;
use crate::world::PhysicsConfig;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

// ============================================================================
// Configuration
// ============================================================================

/// Narrow-phase configuration
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct CollisionConfig {
    /// Use the sphere-tree descent instead of all-pairs primitive tests
    pub use_bvh: bool,
}

impl Default for CollisionConfig {
    fn default() -> Self {
        Self { use_bvh: true }
    }
}

/// Penalty contact model parameters
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct PenaltyConfig {
    /// Contact spring stiffness
    pub stiffness: f64,
    /// Contact damping coefficient
    pub damping: f64,
    /// Normal speed above which separating contacts are left undamped
    pub separation_velocity_threshold: f64,
    /// Apply the spring term
    pub enable_spring: bool,
    /// Apply the damping term
    pub enable_damping: bool,
}

impl Default for PenaltyConfig {
    fn default() -> Self {
        Self {
            stiffness: 1e3,
            damping: 10.0,
            separation_velocity_threshold: 1e-9,
            enable_spring: true,
            enable_damping: true,
        }
    }
}

/// Counters from the last detection pass
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CollisionStats {
    /// Top-level pairs that reached the narrow phase
    pub candidate_pairs: usize,
    /// Overlapping primitive pairs
    pub contacts: usize,
    /// Bodies woken during the pass
    pub woken: usize,
}

// ============================================================================
// Detector
// ============================================================================

/// Broad phase, narrow phase and contact generation with reusable buffers
#[derive(Debug, Default)]
pub struct CollisionDetector {
    visit: u64,
    wake_stamp: u64,
    stack: TraversalStack,
    hits: Vec<LeafHit>,
    top_level: Vec<BodyHandle>,
    deferred: Vec<(BodyHandle, BodyHandle)>,
    queue: VecDeque<(BodyHandle, u32)>,
    /// Counters from the last pass
    pub stats: CollisionStats,
}

#[inline]
fn member_count(bodies: &BodySet, handle: BodyHandle) -> Option<usize> {
    bodies[handle].collection().map(|d| d.members().len())
}

#[inline]
fn member_at(bodies: &BodySet, coll: BodyHandle, i: usize) -> Option<BodyHandle> {
    bodies[coll].collection().and_then(|d| d.members().get(i).copied())
}

#[inline]
fn inactive(bodies: &BodySet, handle: BodyHandle) -> bool {
    let b = &bodies[handle];
    b.is_sleeping() || b.is_pinned()
}

impl CollisionDetector {
    /// New detector
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild `contacts` for the current poses and update `graph`.
    pub fn detect(
        &mut self,
        bodies: &mut BodySet,
        graph: &mut ContactGraph,
        contacts: &mut Vec<Contact>,
        config: &PhysicsConfig,
    ) {
        self.visit += 1;
        self.stats = CollisionStats::default();
        contacts.clear();
        graph.begin_step();
        bodies.top_level_into(&mut self.top_level);
        self.deferred.clear();

        let top = std::mem::take(&mut self.top_level);
        for (i, &a) in top.iter().enumerate() {
            for &b in &top[i + 1..] {
                if bodies[a].is_pinned() && bodies[b].is_pinned() {
                    continue;
                }
                if inactive(bodies, a) && inactive(bodies, b) {
                    self.deferred.push((a, b));
                    continue;
                }
                self.stats.candidate_pairs += 1;
                self.narrow(bodies, graph, contacts, config, a, b);
            }
        }

        // Pairs skipped as inactive but woken later in this pass
        let deferred = std::mem::take(&mut self.deferred);
        for &(a, b) in &deferred {
            if !(inactive(bodies, a) && inactive(bodies, b)) {
                self.stats.candidate_pairs += 1;
                self.narrow(bodies, graph, contacts, config, a, b);
            }
        }
        self.deferred = deferred;
        self.top_level = top;
        self.stats.contacts = contacts.len();
    }

    fn narrow(
        &mut self,
        bodies: &mut BodySet,
        graph: &mut ContactGraph,
        contacts: &mut Vec<Contact>,
        config: &PhysicsConfig,
        a: BodyHandle,
        b: BodyHandle,
    ) {
        if bodies.root_of(a) == bodies.root_of(b) {
            return;
        }
        // Membership is fixed during detection, so members are read by index
        if let Some(n) = member_count(bodies, a) {
            for i in 0..n {
                let Some(m) = member_at(bodies, a, i) else {
                    break;
                };
                self.narrow(bodies, graph, contacts, config, m, b);
            }
        } else if let Some(n) = member_count(bodies, b) {
            for i in 0..n {
                let Some(m) = member_at(bodies, b, i) else {
                    break;
                };
                self.narrow(bodies, graph, contacts, config, a, m);
            }
        } else {
            self.leaf_pair(bodies, graph, contacts, config, a, b);
        }
    }

    fn leaf_pair(
        &mut self,
        bodies: &mut BodySet,
        graph: &mut ContactGraph,
        contacts: &mut Vec<Contact>,
        config: &PhysicsConfig,
        a: BodyHandle,
        b: BodyHandle,
    ) {
        self.hits.clear();
        {
            let Some((body_a, body_b)) = bodies.pair_mut(a, b) else {
                return;
            };
            let (xf_a, xf_b) = (*body_a.transform(), *body_b.transform());
            let (Some(geom_a), Some(geom_b)) = (body_a.geometry_mut(), body_b.geometry_mut())
            else {
                return;
            };
            let hits = &mut self.hits;
            if config.collision.use_bvh {
                collide_trees(
                    geom_a.tree_mut(),
                    &xf_a,
                    geom_b.tree_mut(),
                    &xf_b,
                    self.visit,
                    &mut self.stack,
                    |h| hits.push(h),
                );
            } else {
                brute_force_pairs(geom_a.primitives(), &xf_a, geom_b.primitives(), &xf_b, |h| {
                    hits.push(h);
                });
            }
        }

        let hits = std::mem::take(&mut self.hits);
        for hit in &hits {
            self.process_hit(bodies, graph, contacts, config, a, b, hit);
        }
        self.hits = hits;
    }

    #[allow(clippy::too_many_arguments)]
    fn process_hit(
        &mut self,
        bodies: &mut BodySet,
        graph: &mut ContactGraph,
        contacts: &mut Vec<Contact>,
        config: &PhysicsConfig,
        a: BodyHandle,
        b: BodyHandle,
        hit: &LeafHit,
    ) {
        let contact = build_contact(bodies, config, contacts.len(), a, b, hit);
        let sample = contact.relative_velocity(bodies).length();
        let index = contact.index;
        let (ca, cb) = (contact.constrained_a, contact.constrained_b);
        contacts.push(contact);

        let key = BodyPairKey::new(a, b);
        let (pair, created) = graph.entry(bodies, key, config.history_window);
        let new_collision = created || pair.idle_steps > 0;
        if !pair.active {
            pair.active = true;
            pair.motion_history.set_capacity(config.history_window);
            pair.motion_history.push(sample);
        }
        pair.contacts.push(index);

        if !config.sleep.enabled {
            return;
        }
        for (sleeper, leaf, other) in [(ca, a, cb), (cb, b, ca)] {
            let s = &bodies[sleeper];
            let o = &bodies[other];
            if !s.is_sleeping() || s.is_pinned() || o.is_sleeping() || o.is_pinned() {
                continue;
            }
            if config.sleep.use_contact_graph {
                if !o.woken {
                    self.flood_wake(bodies, leaf, config.sleep.wake_hops);
                }
            } else if new_collision || o.motion_metric() > config.sleep.waking_threshold {
                wake_body(bodies, sleeper);
                self.stats.woken += 1;
            }
        }
    }

    /// Wake `start` and every body within `hops − 1` contact-graph edges of
    /// it, skipping pinned bodies. Breadth first; a body is visited at most
    /// once per call. Returns the number of bodies woken.
    pub fn flood_wake(&mut self, bodies: &mut BodySet, start: BodyHandle, hops: u32) -> usize {
        if hops == 0 || !bodies.contains(start) {
            return 0;
        }
        self.wake_stamp += 1;
        let stamp = self.wake_stamp;
        let mut count = 0;

        self.queue.clear();
        bodies[start].wake_stamp = stamp;
        self.queue.push_back((start, 0));
        while let Some((leaf, depth)) = self.queue.pop_front() {
            let root = bodies.root_of(leaf);
            if bodies[root].is_sleeping() {
                count += 1;
            }
            wake_body(bodies, root);
            bodies[root].woken = true;

            if depth + 1 >= hops {
                continue;
            }
            for k in 0..bodies[leaf].pair_keys.len() {
                let next = bodies[leaf].pair_keys[k].other(leaf);
                let Some(nb) = bodies.get(next) else {
                    continue;
                };
                if nb.wake_stamp == stamp
                    || nb.is_pinned()
                    || bodies[bodies.root_of(next)].is_pinned()
                {
                    continue;
                }
                bodies[next].wake_stamp = stamp;
                self.queue.push_back((next, depth + 1));
            }
        }
        tracing::debug!(start = ?start, hops, woken = count, "flood wake");
        self.stats.woken += count;
        count
    }
}

/// Clear the sleeping flag and restart the body's history windows
pub fn wake_body(bodies: &mut BodySet, handle: BodyHandle) {
    let Some(body) = bodies.get_mut(handle) else {
        return;
    };
    if body.is_sleeping() {
        body.sleeping = false;
        body.clear_histories();
        tracing::trace!(body = ?handle, "woke");
    }
}

fn combine(a: Option<f64>, b: Option<f64>, global: f64) -> f64 {
    0.5 * (a.unwrap_or(global) + b.unwrap_or(global))
}

fn build_contact(
    bodies: &BodySet,
    config: &PhysicsConfig,
    index: usize,
    a: BodyHandle,
    b: BodyHandle,
    hit: &LeafHit,
) -> Contact {
    let ca = bodies.root_of(a);
    let cb = bodies.root_of(b);
    let distance = hit.distance();
    let rsum = hit.radius_a + hit.radius_b;

    let delta = hit.center_b - hit.center_a;
    let normal = if distance > f64::EPSILON {
        delta / distance
    } else {
        DVec3::Y
    };
    let point = hit.center_a + delta * (hit.radius_a / rsum);
    let (t1, t2) = tangent_frame(normal);

    let (body_a, body_b) = (&bodies[a], &bodies[b]);
    let (con_a, con_b) = (&bodies[ca], &bodies[cb]);
    let r_a = point - con_a.position();
    let r_b = point - con_b.position();
    let rows: [JacobianRow; ROWS_PER_CONTACT] =
        [normal, t1, t2].map(|dir| JacobianRow::new(dir, r_a, r_b));

    Contact {
        index,
        point,
        normal,
        tangents: [t1, t2],
        constraint_violation: distance - rsum,
        body_a: a,
        body_b: b,
        constrained_a: ca,
        constrained_b: cb,
        key: PrimitivePairKey::new(
            PrimitiveId {
                body: a,
                index: hit.prim_a,
            },
            PrimitiveId {
                body: b,
                index: hit.prim_b,
            },
        ),
        normal_local_a: con_a.transform().inverse_transform_vector(normal),
        normal_local_b: -con_b.transform().inverse_transform_vector(normal),
        rows,
        lambda: [0.0; ROWS_PER_CONTACT],
        restitution: combine(
            body_a.restitution(),
            body_b.restitution(),
            config.solver.restitution,
        ),
        friction: combine(body_a.friction(), body_b.friction(), config.solver.friction),
        force_a: DVec3::ZERO,
        torque_a: DVec3::ZERO,
        force_b: DVec3::ZERO,
        torque_b: DVec3::ZERO,
    }
}

// ============================================================================
// Penalty contacts
// ============================================================================

/// Turn contacts into spring/damper forces on the constrained bodies.
///
/// The spring pushes apart proportionally to penetration. Damping opposes
/// the normal relative velocity unless the pair already separates faster
/// than the threshold. Forces never pull bodies together.
pub fn apply_penalty_forces(bodies: &mut BodySet, contacts: &[Contact], config: &PenaltyConfig) {
    for c in contacts {
        if c.constrained_a == c.constrained_b {
            continue;
        }
        let vn = c.relative_velocity(bodies).dot(c.normal);
        let mut magnitude = 0.0;
        if config.enable_spring {
            magnitude += config.stiffness * c.penetration();
        }
        if config.enable_damping && vn < config.separation_velocity_threshold {
            magnitude -= config.damping * vn;
        }
        if magnitude <= 0.0 {
            continue;
        }
        let force = c.normal * magnitude;
        bodies[c.constrained_a].apply_contact_force(c.point, -force);
        bodies[c.constrained_b].apply_contact_force(c.point, force);
    }
}

// ============================================================================
// Tests
// ============================================================================
