//! Physics World
//!
//! Owns every body, the contact graph, the warm-start cache and the
//! per-step buffers, and runs the simulation step.
//!
//! # Step
//!
//! 1. Gravity on awake, non-pinned top-level bodies
//! 2. Collision detection: contacts, contact graph, wake
//! 3. Contact response: PGS impulses or penalty forces
//! 4. Integration; collections drive their members
//! 5. Sleeping update
//! 6. Merge/unmerge pass
//! 7. Contact-graph pruning
//!
//! ```
//! use glam::DVec3;
//! use rigid_merge::{BodyBuilder, PhysicsConfig, PhysicsWorld};
//!
//! let mut world = PhysicsWorld::new(PhysicsConfig::default()).unwrap();
//! world
//!     .add_body(BodyBuilder::cuboid(DVec3::new(10.0, 1.0, 10.0)).ground(true).build().unwrap())
//!     .unwrap();
//! let ball = world
//!     .add_body(BodyBuilder::sphere(0.5).position(DVec3::new(0.0, 3.0, 0.0)).build().unwrap())
//!     .unwrap();
//! for _ in 0..200 {
//!     world.step(0.01);
//! }
//! assert!(world.body(ball).unwrap().position().y < 3.0);
//! ```

use std::time::{Duration, Instant};

use glam::{DQuat, DVec3};

use crate::body::{Activity, BodyHandle, RigidBody};
use crate::body_set::BodySet;
use crate::collection::{apply_velocities_to_members, dissolve, propagate_member_poses};
use crate::collision::{
    apply_penalty_forces, wake_body, CollisionConfig, CollisionDetector, PenaltyConfig,
};
use crate::contact::{Contact, ContactGraph};
use crate::contact_cache::ContactCache;
use crate::error::PhysicsError;
use crate::merging::{self, update_merging, MergeConfig, MergeStats};
use crate::rng::DeterministicRng;
use crate::sleeping::{update_sleeping, SleepConfig};
use crate::solver::{compute_unmerge_metrics, ContactMode, ContactSolver, SolverConfig, SolverStats};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

// ============================================================================
// Configuration
// ============================================================================

/// World configuration
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct PhysicsConfig {
    /// Gravitational acceleration
    pub gravity: DVec3,
    /// Samples kept by every motion and force history
    pub history_window: usize,
    /// Steps a contact-graph edge survives without contact
    pub pair_grace_steps: u32,
    /// Contact response
    pub solver: SolverConfig,
    /// Penalty contact model
    pub penalty: PenaltyConfig,
    /// Narrow phase
    pub collision: CollisionConfig,
    /// Sleeping and waking
    pub sleep: SleepConfig,
    /// Merging and unmerging
    pub merge: MergeConfig,
}

impl Default for PhysicsConfig {
    fn default() -> Self {
        Self {
            gravity: DVec3::new(0.0, -9.81, 0.0),
            history_window: 50,
            pair_grace_steps: 3,
            solver: SolverConfig::default(),
            penalty: PenaltyConfig::default(),
            collision: CollisionConfig::default(),
            sleep: SleepConfig::default(),
            merge: MergeConfig::default(),
        }
    }
}

impl PhysicsConfig {
    /// Check parameter ranges.
    ///
    /// # Errors
    ///
    /// [`PhysicsError::InvalidConfiguration`] naming the first bad value.
    pub fn validate(&self) -> Result<(), PhysicsError> {
        let fail = |reason| Err(PhysicsError::InvalidConfiguration { reason });
        if self.solver.iterations == 0 {
            return fail("solver iterations must be positive");
        }
        if self.history_window == 0 {
            return fail("history window must be positive");
        }
        if !self.gravity.is_finite() {
            return fail("gravity must be finite");
        }
        if !(self.solver.friction >= 0.0) {
            return fail("friction must be non-negative");
        }
        if !(0.0..=1.0).contains(&self.solver.restitution) {
            return fail("restitution must lie in [0, 1]");
        }
        if !(self.solver.baumgarte >= 0.0) {
            return fail("baumgarte coefficient must be non-negative");
        }
        let thresholds = [
            self.sleep.sleeping_threshold,
            self.sleep.waking_threshold,
            self.sleep.force_tolerance,
            self.merge.merge_threshold,
            self.merge.unmerge_threshold,
        ];
        if thresholds.iter().any(|t| !(*t >= 0.0)) {
            return fail("thresholds must be non-negative");
        }
        if !(self.penalty.stiffness >= 0.0 && self.penalty.damping >= 0.0) {
            return fail("penalty stiffness and damping must be non-negative");
        }
        Ok(())
    }
}

/// Counters from the last step
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct StepStats {
    /// Steps taken so far
    pub step: u64,
    /// Top-level bodies (free bodies and collections)
    pub top_level: usize,
    /// Contacts generated
    pub contacts: usize,
    /// Top-level pairs reaching the narrow phase
    pub candidate_pairs: usize,
    /// Bodies woken by contact
    pub woken: usize,
    /// Bodies that fell asleep
    pub fell_asleep: usize,
    /// Sleeping top-level bodies after the step
    pub sleeping: usize,
    /// Live collections after the step
    pub collections: usize,
    /// Contact-graph edges after the step
    pub pairs: usize,
    /// Edges dropped by pruning
    pub pruned_pairs: usize,
    /// Solver counters
    pub solver: SolverStats,
    /// Merge counters
    pub merge: MergeStats,
    /// Wall time spent in collision detection
    pub detect_time: Duration,
    /// Wall time spent in contact response
    pub solve_time: Duration,
}

/// Per-body readback for rendering or inspection
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct BodyState {
    /// Body handle
    pub handle: BodyHandle,
    /// World position
    pub position: DVec3,
    /// World orientation
    pub orientation: DQuat,
    /// Linear velocity
    pub linear_velocity: DVec3,
    /// Angular velocity
    pub angular_velocity: DVec3,
    /// Active, sleeping or merged
    pub activity: Activity,
    /// Kinetic energy
    pub kinetic_energy: f64,
}

// ============================================================================
// World
// ============================================================================

/// The simulation
#[derive(Debug)]
pub struct PhysicsWorld {
    config: PhysicsConfig,
    bodies: BodySet,
    graph: ContactGraph,
    contacts: Vec<Contact>,
    cache: ContactCache,
    detector: CollisionDetector,
    solver: ContactSolver,
    rng: DeterministicRng,
    top_level: Vec<BodyHandle>,
    step_count: u64,
    stats: StepStats,
}

fn inactive(bodies: &BodySet, handle: BodyHandle) -> bool {
    let root = &bodies[bodies.root_of(handle)];
    root.is_sleeping() || root.is_pinned()
}

impl PhysicsWorld {
    /// Create an empty world.
    ///
    /// # Errors
    ///
    /// [`PhysicsError::InvalidConfiguration`] if `config` fails validation.
    pub fn new(config: PhysicsConfig) -> Result<Self, PhysicsError> {
        config.validate()?;
        Ok(Self {
            config,
            bodies: BodySet::new(),
            graph: ContactGraph::new(),
            contacts: Vec::new(),
            cache: ContactCache::new(),
            detector: CollisionDetector::new(),
            solver: ContactSolver::new(),
            rng: DeterministicRng::new(config.solver.shuffle_seed),
            top_level: Vec::new(),
            step_count: 0,
            stats: StepStats::default(),
        })
    }

    /// Current configuration
    #[inline]
    #[must_use]
    pub fn config(&self) -> &PhysicsConfig {
        &self.config
    }

    /// Replace the configuration; history windows are resized in place.
    ///
    /// # Errors
    ///
    /// [`PhysicsError::InvalidConfiguration`] if `config` fails validation.
    pub fn set_config(&mut self, config: PhysicsConfig) -> Result<(), PhysicsError> {
        config.validate()?;
        if config.history_window != self.config.history_window {
            for body in self.bodies.iter_mut() {
                body.set_history_window(config.history_window);
            }
            for pair in self.graph.iter_mut() {
                pair.motion_history.set_capacity(config.history_window);
            }
        }
        if config.solver.shuffle_seed != self.config.solver.shuffle_seed {
            self.rng = DeterministicRng::new(config.solver.shuffle_seed);
        }
        self.config = config;
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Bodies
    // ------------------------------------------------------------------------

    /// Insert a body built by [`crate::BodyBuilder`].
    ///
    /// # Errors
    ///
    /// [`PhysicsError::MissingGeometry`] for bodies without primitives.
    pub fn add_body(&mut self, mut body: RigidBody) -> Result<BodyHandle, PhysicsError> {
        if body.geometry().is_none() {
            return Err(PhysicsError::MissingGeometry);
        }
        body.parent = None;
        body.pair_keys.clear();
        body.set_history_window(self.config.history_window);
        let handle = self.bodies.insert(body);
        tracing::trace!(body = ?handle, "added body");
        Ok(handle)
    }

    /// Remove a body. A merged body leaves its collection first; a
    /// collection handle dissolves the collection and keeps its members.
    ///
    /// # Errors
    ///
    /// [`PhysicsError::InvalidBodyHandle`] for stale handles.
    pub fn remove_body(&mut self, handle: BodyHandle) -> Result<(), PhysicsError> {
        let body = self.bodies.try_get(handle)?;
        if body.is_collection() {
            dissolve(&mut self.bodies, &mut self.graph, handle);
            return Ok(());
        }
        if body.parent().is_some() {
            merging::unmerge_body(&mut self.bodies, &mut self.graph, handle)?;
        }
        self.graph.remove_body(&mut self.bodies, handle);
        self.bodies.remove(handle);
        self.contacts.clear();
        Ok(())
    }

    /// Shared access to a body
    #[must_use]
    pub fn body(&self, handle: BodyHandle) -> Option<&RigidBody> {
        self.bodies.get(handle)
    }

    /// All bodies, including collections
    #[inline]
    #[must_use]
    pub fn bodies(&self) -> &BodySet {
        &self.bodies
    }

    /// Number of live bodies, collections included
    #[must_use]
    pub fn body_count(&self) -> usize {
        self.bodies.len()
    }

    /// Set a free body's velocity and wake it. A merged body leaves its
    /// collection first.
    ///
    /// # Errors
    ///
    /// [`PhysicsError::InvalidBodyHandle`] for stale handles,
    /// [`PhysicsError::PinnedBody`] for a non-zero velocity on a pinned body.
    /// Nothing is changed on error.
    pub fn set_velocity(
        &mut self,
        handle: BodyHandle,
        linear: DVec3,
        angular: DVec3,
    ) -> Result<(), PhysicsError> {
        let body = self.bodies.try_get(handle)?;
        if body.is_pinned() && (linear != DVec3::ZERO || angular != DVec3::ZERO) {
            tracing::warn!(body = ?handle, "rejecting velocity on pinned body");
            return Err(PhysicsError::PinnedBody { body: handle });
        }
        if body.parent().is_some() {
            merging::unmerge_body(&mut self.bodies, &mut self.graph, handle)?;
        }
        wake_body(&mut self.bodies, handle);
        let body = &mut self.bodies[handle];
        body.set_velocity(linear, angular);
        if body.is_collection() {
            apply_velocities_to_members(&mut self.bodies, handle);
        }
        Ok(())
    }

    /// Teleport a free body and wake it. A merged body leaves its collection
    /// first.
    ///
    /// # Errors
    ///
    /// [`PhysicsError::InvalidBodyHandle`] for stale handles.
    pub fn set_pose(
        &mut self,
        handle: BodyHandle,
        position: DVec3,
        orientation: DQuat,
    ) -> Result<(), PhysicsError> {
        if self.bodies.try_get(handle)?.parent().is_some() {
            merging::unmerge_body(&mut self.bodies, &mut self.graph, handle)?;
        }
        wake_body(&mut self.bodies, handle);
        self.bodies[handle].set_pose(position, orientation);
        if self.bodies[handle].is_collection() {
            propagate_member_poses(&mut self.bodies, handle);
        }
        Ok(())
    }

    /// Wake the top-level body owning `handle`
    ///
    /// # Errors
    ///
    /// [`PhysicsError::InvalidBodyHandle`] for stale handles.
    pub fn wake(&mut self, handle: BodyHandle) -> Result<(), PhysicsError> {
        self.bodies.try_get(handle)?;
        let root = self.bodies.root_of(handle);
        wake_body(&mut self.bodies, root);
        Ok(())
    }

    /// Wake everything within `hops` contact-graph edges of `handle`.
    /// Returns the number of bodies woken.
    ///
    /// # Errors
    ///
    /// [`PhysicsError::InvalidBodyHandle`] for stale handles.
    pub fn wake_neighbors(&mut self, handle: BodyHandle, hops: u32) -> Result<usize, PhysicsError> {
        self.bodies.try_get(handle)?;
        Ok(self.detector.flood_wake(&mut self.bodies, handle, hops))
    }

    /// Merge the bodies owning leaves `a` and `b`
    ///
    /// # Errors
    ///
    /// See [`merging::merge_bodies`].
    pub fn merge_bodies(
        &mut self,
        a: BodyHandle,
        b: BodyHandle,
    ) -> Result<BodyHandle, PhysicsError> {
        merging::merge_bodies(&mut self.bodies, &mut self.graph, a, b)
    }

    /// Release a merged body from its collection
    ///
    /// # Errors
    ///
    /// See [`merging::unmerge_body`].
    pub fn unmerge_body(&mut self, handle: BodyHandle) -> Result<(), PhysicsError> {
        merging::unmerge_body(&mut self.bodies, &mut self.graph, handle)
    }

    /// Dissolve every collection. Returns the number dissolved.
    pub fn unmerge_all(&mut self) -> usize {
        merging::unmerge_all(&mut self.bodies, &mut self.graph)
    }

    /// First leaf body whose geometry contains `point`, in insertion order
    #[must_use]
    pub fn body_at(&self, point: DVec3) -> Option<BodyHandle> {
        self.bodies
            .iter()
            .find(|b| b.contains_point(point))
            .map(RigidBody::handle)
    }

    // ------------------------------------------------------------------------
    // Contacts and readback
    // ------------------------------------------------------------------------

    /// Contacts generated by the last step
    #[inline]
    #[must_use]
    pub fn contacts(&self) -> &[Contact] {
        &self.contacts
    }

    /// Contacts of the last step touching `handle` as recorded or
    /// constrained body
    pub fn contacts_of(&self, handle: BodyHandle) -> impl Iterator<Item = &Contact> + '_ {
        self.contacts.iter().filter(move |c| c.touches(handle))
    }

    /// Persistent contact graph
    #[inline]
    #[must_use]
    pub fn contact_graph(&self) -> &ContactGraph {
        &self.graph
    }

    /// Counters from the last step
    #[inline]
    #[must_use]
    pub fn stats(&self) -> &StepStats {
        &self.stats
    }

    /// Steps taken since creation or the last reset
    #[inline]
    #[must_use]
    pub fn step_count(&self) -> u64 {
        self.step_count
    }

    /// Pose, velocity and activity of every leaf body
    #[must_use]
    pub fn readback(&self) -> Vec<BodyState> {
        self.bodies
            .iter()
            .filter(|b| !b.is_collection())
            .map(|b| BodyState {
                handle: b.handle(),
                position: b.position(),
                orientation: b.orientation(),
                linear_velocity: b.linear_velocity(),
                angular_velocity: b.angular_velocity(),
                activity: b.activity(),
                kinetic_energy: b.kinetic_energy(),
            })
            .collect()
    }

    /// Dissolve all collections and return every body to its construction
    /// pose. Contact state and the shuffle stream restart.
    pub fn reset(&mut self) {
        merging::unmerge_all(&mut self.bodies, &mut self.graph);
        for body in self.bodies.iter_mut() {
            body.reset();
            body.pair_keys.clear();
            body.scratch.reset();
        }
        self.graph = ContactGraph::new();
        self.cache.clear();
        self.contacts.clear();
        self.rng = DeterministicRng::new(self.config.solver.shuffle_seed);
        self.step_count = 0;
        self.stats = StepStats::default();
        tracing::debug!(bodies = self.bodies.len(), "world reset");
    }

    // ------------------------------------------------------------------------
    // Step
    // ------------------------------------------------------------------------

    /// Advance the simulation by `dt` seconds
    pub fn step(&mut self, dt: f64) {
        if !(dt.is_finite() && dt > 0.0) {
            tracing::warn!(dt, "ignoring step with non-positive time step");
            return;
        }
        let _span = tracing::debug_span!("step", step = self.step_count + 1).entered();
        self.step_count += 1;

        for body in self.bodies.iter_mut() {
            body.scratch.reset();
        }
        self.bodies.top_level_into(&mut self.top_level);

        // External forces
        let gravity = self.config.gravity;
        for &h in &self.top_level {
            let body = &mut self.bodies[h];
            if !body.is_pinned() && !body.is_sleeping() {
                let weight = gravity * body.mass();
                body.apply_force(weight);
            }
        }

        // Contacts
        let started = Instant::now();
        self.detector
            .detect(&mut self.bodies, &mut self.graph, &mut self.contacts, &self.config);
        let detect_time = started.elapsed();
        let started = Instant::now();
        match self.config.solver.mode {
            ContactMode::Lcp => {
                self.solver.solve(
                    &mut self.contacts,
                    &mut self.bodies,
                    &mut self.cache,
                    &mut self.rng,
                    &self.config.solver,
                    dt,
                );
                for &h in &self.top_level {
                    if self.bodies[h].is_collection() {
                        compute_unmerge_metrics(&mut self.bodies, h);
                    }
                }
            }
            ContactMode::Penalty => {
                self.solver.stats = SolverStats::default();
                apply_penalty_forces(&mut self.bodies, &self.contacts, &self.config.penalty);
            }
        }
        let solve_time = started.elapsed();

        // Integration
        for &h in &self.top_level {
            let body = &mut self.bodies[h];
            if body.is_sleeping() {
                body.clear_forces();
                continue;
            }
            body.integrate(dt);
            if body.is_collection() {
                propagate_member_poses(&mut self.bodies, h);
                apply_velocities_to_members(&mut self.bodies, h);
            }
        }

        let asleep = update_sleeping(&mut self.bodies, &self.top_level, &self.config.sleep);
        let merge = update_merging(
            &mut self.bodies,
            &mut self.graph,
            &self.contacts,
            &self.config.merge,
        );
        let grace = self.config.pair_grace_steps;
        let pruned = self.graph.prune(&mut self.bodies, grace, |bodies, key| {
            inactive(bodies, key.a) && inactive(bodies, key.b)
        });

        self.bodies.top_level_into(&mut self.top_level);
        self.stats = StepStats {
            step: self.step_count,
            top_level: self.top_level.len(),
            contacts: self.contacts.len(),
            candidate_pairs: self.detector.stats.candidate_pairs,
            woken: self.detector.stats.woken,
            fell_asleep: asleep.len(),
            sleeping: self
                .top_level
                .iter()
                .filter(|&&h| self.bodies[h].is_sleeping())
                .count(),
            collections: self.bodies.iter().filter(|b| b.is_collection()).count(),
            pairs: self.graph.len(),
            pruned_pairs: pruned,
            solver: self.solver.stats,
            merge,
            detect_time,
            solve_time,
        };
        tracing::trace!(
            contacts = self.stats.contacts,
            sleeping = self.stats.sleeping,
            collections = self.stats.collections,
            "step complete"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::body::BodyBuilder;
    use approx::assert_relative_eq;

    fn world() -> PhysicsWorld {
        PhysicsWorld::new(PhysicsConfig::default()).unwrap()
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = PhysicsConfig::default();
        config.solver.iterations = 0;
        assert!(matches!(
            config.validate(),
            Err(PhysicsError::InvalidConfiguration { .. })
        ));
        let mut config = PhysicsConfig::default();
        config.solver.restitution = 1.5;
        assert!(config.validate().is_err());
        let mut config = PhysicsConfig::default();
        config.history_window = 0;
        assert!(PhysicsWorld::new(config).is_err());
        let mut config = PhysicsConfig::default();
        config.merge.merge_threshold = -1.0;
        assert!(config.validate().is_err());
        assert!(PhysicsConfig::default().validate().is_ok());
    }

    #[test]
    fn test_free_fall() {
        let mut w = world();
        let h = w
            .add_body(BodyBuilder::sphere(0.5).mass(1.0).build().unwrap())
            .unwrap();
        w.step(0.1);
        let body = w.body(h).unwrap();
        assert_relative_eq!(body.linear_velocity().y, -0.981, epsilon = 1e-12);
        assert_relative_eq!(body.position().y, -0.0981, epsilon = 1e-12);
    }

    #[test]
    fn test_pinned_body_immovable() {
        let mut w = world();
        let ground = w
            .add_body(
                BodyBuilder::cuboid(DVec3::new(4.0, 1.0, 4.0))
                    .pinned(true)
                    .build()
                    .unwrap(),
            )
            .unwrap();
        w.add_body(
            BodyBuilder::sphere(0.5)
                .position(DVec3::new(0.0, 1.1, 0.0))
                .linear_velocity(DVec3::new(0.0, -3.0, 0.0))
                .build()
                .unwrap(),
        )
        .unwrap();
        for _ in 0..50 {
            w.step(0.01);
        }
        let g = w.body(ground).unwrap();
        assert_eq!(g.position(), DVec3::ZERO);
        assert_eq!(g.linear_velocity(), DVec3::ZERO);
    }

    #[test]
    fn test_set_velocity_on_merged_ground_rejected() {
        let mut w = world();
        let ground = w
            .add_body(
                BodyBuilder::cuboid(DVec3::new(4.0, 1.0, 4.0))
                    .ground(true)
                    .build()
                    .unwrap(),
            )
            .unwrap();
        let cube = w
            .add_body(
                BodyBuilder::cuboid(DVec3::ONE)
                    .position(DVec3::new(0.0, 0.99, 0.0))
                    .build()
                    .unwrap(),
            )
            .unwrap();
        let coll = w.merge_bodies(ground, cube).unwrap();

        let result = w.set_velocity(ground, DVec3::new(1.0, 0.0, 0.0), DVec3::ZERO);
        assert!(matches!(result, Err(PhysicsError::PinnedBody { body }) if body == ground));
        assert_eq!(w.body(ground).unwrap().parent(), Some(coll), "Ground stays merged");
        assert_eq!(w.body(cube).unwrap().parent(), Some(coll), "Cube stays merged");
        assert_eq!(w.body(ground).unwrap().linear_velocity(), DVec3::ZERO);

        // Zeroing a pinned body is not a request to move it
        assert!(w.set_velocity(ground, DVec3::ZERO, DVec3::ZERO).is_ok());
    }

    #[test]
    fn test_reset_restores_initial_state() {
        let mut w = world();
        let h = w
            .add_body(
                BodyBuilder::sphere(0.5)
                    .position(DVec3::new(0.0, 2.0, 0.0))
                    .build()
                    .unwrap(),
            )
            .unwrap();
        for _ in 0..10 {
            w.step(0.01);
        }
        w.reset();
        assert_eq!(w.step_count(), 0);
        assert_eq!(w.body(h).unwrap().position(), DVec3::new(0.0, 2.0, 0.0));
    }

    #[test]
    fn test_remove_body_clears_graph() {
        let mut w = world();
        let a = w
            .add_body(BodyBuilder::sphere(0.5).pinned(true).build().unwrap())
            .unwrap();
        let b = w
            .add_body(
                BodyBuilder::sphere(0.5)
                    .position(DVec3::new(0.0, 0.95, 0.0))
                    .build()
                    .unwrap(),
            )
            .unwrap();
        w.step(0.01);
        assert_eq!(w.contact_graph().len(), 1);
        w.remove_body(b).unwrap();
        assert!(w.contact_graph().is_empty());
        assert!(w.body(a).unwrap().pair_keys().is_empty());
        assert!(w.remove_body(b).is_err(), "Stale handle");
    }

    #[test]
    fn test_readback_and_point_query() {
        let mut w = world();
        let h = w
            .add_body(
                BodyBuilder::sphere(0.5)
                    .position(DVec3::new(3.0, 0.0, 0.0))
                    .build()
                    .unwrap(),
            )
            .unwrap();
        let states = w.readback();
        assert_eq!(states.len(), 1);
        assert_eq!(states[0].handle, h);
        assert_eq!(states[0].activity, Activity::Active);
        assert_eq!(w.body_at(DVec3::new(3.2, 0.0, 0.0)), Some(h));
        assert_eq!(w.body_at(DVec3::ZERO), None);
    }

    #[test]
    fn test_penalty_mode_separates() {
        let mut config = PhysicsConfig::default();
        config.gravity = DVec3::ZERO;
        config.solver.mode = ContactMode::Penalty;
        let mut w = PhysicsWorld::new(config).unwrap();
        let a = w
            .add_body(BodyBuilder::sphere(0.5).mass(1.0).build().unwrap())
            .unwrap();
        let b = w
            .add_body(
                BodyBuilder::sphere(0.5)
                    .mass(1.0)
                    .position(DVec3::new(0.9, 0.0, 0.0))
                    .build()
                    .unwrap(),
            )
            .unwrap();
        w.step(0.01);
        assert!(w.body(a).unwrap().linear_velocity().x < 0.0);
        assert!(w.body(b).unwrap().linear_velocity().x > 0.0);
        assert_eq!(w.stats().solver, SolverStats::default());
    }

    #[test]
    fn test_ignores_bad_dt() {
        let mut w = world();
        w.step(0.0);
        w.step(f64::NAN);
        assert_eq!(w.step_count(), 0);
    }
}
