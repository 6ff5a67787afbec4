//! Projected Gauss-Seidel Contact Solver
//!
//! Solves the contact LCP one row at a time. Each contact contributes a
//! normal row and two friction rows acting on its two constrained bodies.
//!
//! # Per row
//!
//! ```text
//! λ_new = λ − (b + J·Δv) / (J·M⁻¹·Jᵀ)
//! ```
//!
//! where `b` is the free-velocity right-hand side and `Δv` the velocity change
//! accumulated so far this step. Normal impulses are clamped to `λn ≥ 0`,
//! tangent impulses to the friction box `|λt| ≤ μ·λn` using the current
//! normal impulse. Velocity changes propagate to the bodies immediately, so
//! later rows see earlier results (Gauss-Seidel).
//!
//! # Features
//!
//! - **Warm start**: impulses from the previous step's cache seed the first
//!   sweep and their velocity change is pre-applied
//! - **Shuffle**: optional per-sweep permutation of the visitation order from
//!   a seeded PCG stream
//! - **Immovable sleepers**: sleeping and pinned bodies enter rows with zero
//!   inverse mass and inertia
//! - **Bookkeeping**: per-body contact force/torque and per-member external
//!   impulses for the sleep and unmerge heuristics

use glam::{DMat3, DVec3};

use crate::body::{BodyHandle, RigidBody};
use crate::body_set::BodySet;
use crate::contact::{Contact, JacobianRow, ROWS_PER_CONTACT};
use crate::contact_cache::ContactCache;
use crate::math::inverse_or_zero;
use crate::rng::DeterministicRng;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Rows with an effective mass below this are skipped
const DEGENERATE_DIAGONAL: f64 = 1e-12;

// ============================================================================
// Configuration
// ============================================================================

/// How contacts turn into motion
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum ContactMode {
    /// Impulses from the projected Gauss-Seidel solve
    #[default]
    Lcp,
    /// Spring/damper forces, no solve
    Penalty,
}

/// Solver configuration
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SolverConfig {
    /// Gauss-Seidel sweeps per step
    pub iterations: u32,
    /// Global friction coefficient
    pub friction: f64,
    /// Global restitution coefficient
    pub restitution: f64,
    /// Penetration feedback coefficient
    pub baumgarte: f64,
    /// Seed impulses from the previous step
    pub warm_start: bool,
    /// Permute contact order every sweep
    pub shuffle: bool,
    /// Seed for the shuffle stream
    pub shuffle_seed: u64,
    /// Contact model
    pub mode: ContactMode,
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            iterations: 70,
            friction: 0.33,
            restitution: 0.0,
            baumgarte: 0.0,
            warm_start: true,
            shuffle: false,
            shuffle_seed: 0x5EED,
            mode: ContactMode::Lcp,
        }
    }
}

/// Counters from the last solve
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SolverStats {
    /// Rows solved per sweep
    pub rows: usize,
    /// Rows skipped for a degenerate effective mass
    pub skipped_rows: usize,
    /// Contacts seeded from the cache
    pub warm_started: usize,
    /// Sweeps performed
    pub sweeps: u32,
}

// ============================================================================
// Solver
// ============================================================================

#[derive(Clone, Copy, Debug)]
struct Inverse {
    mass: f64,
    inertia: DMat3,
}

impl Inverse {
    const ZERO: Self = Self {
        mass: 0.0,
        inertia: DMat3::ZERO,
    };

    fn of(body: &RigidBody) -> Self {
        if body.is_sleeping() || body.is_pinned() {
            Self::ZERO
        } else {
            Self {
                mass: body.inv_mass(),
                inertia: body.inv_inertia_world(),
            }
        }
    }
}

/// Precomputed per-contact data
#[derive(Clone, Copy, Debug)]
struct Prepared {
    inv_a: Inverse,
    inv_b: Inverse,
    diagonal: [f64; ROWS_PER_CONTACT],
    rhs: [f64; ROWS_PER_CONTACT],
}

fn diagonal(row: &JacobianRow, inv_a: &Inverse, inv_b: &Inverse, same_body: bool) -> f64 {
    if same_body {
        let lin = row.linear_a + row.linear_b;
        let ang = row.angular_a + row.angular_b;
        return lin.length_squared() * inv_a.mass + ang.dot(inv_a.inertia * ang);
    }
    row.linear_a.length_squared() * inv_a.mass
        + row.angular_a.dot(inv_a.inertia * row.angular_a)
        + row.linear_b.length_squared() * inv_b.mass
        + row.angular_b.dot(inv_b.inertia * row.angular_b)
}

/// Velocity after external forces act for `dt`, with zero inverses for
/// immovable bodies
fn free_velocity(body: &RigidBody, inv: &Inverse, dt: f64) -> (DVec3, DVec3) {
    (
        body.linear_velocity() + body.force() * (inv.mass * dt),
        body.angular_velocity() + inv.inertia * body.torque() * dt,
    )
}

fn apply_row(bodies: &mut BodySet, c: &Contact, prep: &Prepared, k: usize, delta: f64) {
    let row = &c.rows[k];
    let a = &mut bodies[c.constrained_a].scratch;
    a.delta_v += row.linear_a * (prep.inv_a.mass * delta);
    a.delta_w += prep.inv_a.inertia * row.angular_a * delta;
    let b = &mut bodies[c.constrained_b].scratch;
    b.delta_v += row.linear_b * (prep.inv_b.mass * delta);
    b.delta_w += prep.inv_b.inertia * row.angular_b * delta;
}

/// Projected Gauss-Seidel solver with reusable buffers
#[derive(Debug, Default)]
pub struct ContactSolver {
    order: Vec<usize>,
    prepared: Vec<Prepared>,
    touched: Vec<BodyHandle>,
    /// Counters from the last solve
    pub stats: SolverStats,
}

impl ContactSolver {
    /// New solver
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Solve `contacts`, apply the resulting velocity changes to the
    /// constrained bodies and rebuild `cache` for the next step.
    ///
    /// Body forces must already hold this step's external forces; they are
    /// left in place for integration.
    pub fn solve(
        &mut self,
        contacts: &mut [Contact],
        bodies: &mut BodySet,
        cache: &mut ContactCache,
        rng: &mut DeterministicRng,
        config: &SolverConfig,
        dt: f64,
    ) {
        self.stats = SolverStats::default();
        if contacts.is_empty() {
            cache.clear();
            return;
        }

        self.prepare(contacts, bodies, config, dt);
        if config.warm_start {
            self.warm_start(contacts, bodies, cache);
        }

        self.order.clear();
        self.order.extend(0..contacts.len());
        for _ in 0..config.iterations {
            if config.shuffle {
                rng.shuffle(&mut self.order);
            }
            for &i in &self.order {
                solve_contact(&mut contacts[i], &self.prepared[i], bodies);
            }
            self.stats.sweeps += 1;
        }
        self.stats.rows = self
            .prepared
            .iter()
            .flat_map(|p| p.diagonal)
            .filter(|&d| d > DEGENERATE_DIAGONAL)
            .count();

        self.commit_velocities(contacts, bodies);
        record_forces(contacts, bodies, dt);
        cache.rebuild(contacts);
        tracing::trace!(
            contacts = contacts.len(),
            rows = self.stats.rows,
            skipped = self.stats.skipped_rows,
            warm = self.stats.warm_started,
            "solved contacts"
        );
    }

    fn prepare(
        &mut self,
        contacts: &mut [Contact],
        bodies: &BodySet,
        config: &SolverConfig,
        dt: f64,
    ) {
        self.prepared.clear();
        for c in contacts.iter_mut() {
            c.lambda = [0.0; ROWS_PER_CONTACT];
            let body_a = &bodies[c.constrained_a];
            let body_b = &bodies[c.constrained_b];
            let same = c.constrained_a == c.constrained_b;
            let inv_a = Inverse::of(body_a);
            let inv_b = if same { Inverse::ZERO } else { Inverse::of(body_b) };

            let (va, wa) = free_velocity(body_a, &inv_a, dt);
            let (vb, wb) = free_velocity(body_b, &inv_b, dt);
            let mut prep = Prepared {
                inv_a,
                inv_b,
                diagonal: [0.0; ROWS_PER_CONTACT],
                rhs: [0.0; ROWS_PER_CONTACT],
            };
            for (k, row) in c.rows.iter().enumerate() {
                prep.diagonal[k] = diagonal(row, &inv_a, &inv_b, same);
                prep.rhs[k] = row.dot(va, wa, vb, wb);
                if prep.diagonal[k] <= DEGENERATE_DIAGONAL {
                    self.stats.skipped_rows += 1;
                    tracing::trace!(contact = c.index, row = k, "skipping degenerate row");
                }
            }
            let approach = c.rows[0]
                .dot(
                    body_a.linear_velocity(),
                    body_a.angular_velocity(),
                    body_b.linear_velocity(),
                    body_b.angular_velocity(),
                )
                .min(0.0);
            prep.rhs[0] += c.restitution * approach + config.baumgarte * c.constraint_violation;
            self.prepared.push(prep);
        }
    }

    fn warm_start(&mut self, contacts: &mut [Contact], bodies: &mut BodySet, cache: &ContactCache) {
        for (c, prep) in contacts.iter_mut().zip(&self.prepared) {
            let Some(lambda) = cache.lookup(c) else {
                continue;
            };
            self.stats.warm_started += 1;
            for k in 0..ROWS_PER_CONTACT {
                if prep.diagonal[k] <= DEGENERATE_DIAGONAL {
                    continue;
                }
                c.lambda[k] = lambda[k];
                apply_row(bodies, c, prep, k, lambda[k]);
            }
        }
    }

    fn commit_velocities(&mut self, contacts: &[Contact], bodies: &mut BodySet) {
        self.touched.clear();
        for c in contacts {
            self.touched.push(c.constrained_a);
            self.touched.push(c.constrained_b);
        }
        self.touched.sort_unstable();
        self.touched.dedup();
        for &h in &self.touched {
            let body = &mut bodies[h];
            if body.is_pinned() || body.is_sleeping() {
                continue;
            }
            let v = body.linear_velocity() + body.scratch.delta_v;
            let w = body.angular_velocity() + body.scratch.delta_w;
            body.write_velocity(v, w);
        }
    }
}

fn solve_contact(c: &mut Contact, prep: &Prepared, bodies: &mut BodySet) {
    for k in 0..ROWS_PER_CONTACT {
        let d = prep.diagonal[k];
        if d <= DEGENERATE_DIAGONAL {
            continue;
        }
        let (dva, dwa) = {
            let s = &bodies[c.constrained_a].scratch;
            (s.delta_v, s.delta_w)
        };
        let (dvb, dwb) = {
            let s = &bodies[c.constrained_b].scratch;
            (s.delta_v, s.delta_w)
        };
        let jdv = c.rows[k].dot(dva, dwa, dvb, dwb);
        let unclamped = c.lambda[k] - (prep.rhs[k] + jdv) / d;
        let clamped = if k == 0 {
            unclamped.max(0.0)
        } else {
            let limit = (c.friction * c.lambda[0]).max(0.0);
            unclamped.clamp(-limit, limit)
        };
        let delta = clamped - c.lambda[k];
        c.lambda[k] = clamped;
        if delta != 0.0 {
            apply_row(bodies, c, prep, k, delta);
        }
    }
}

/// Per-contact and per-body force bookkeeping after the final sweep
fn record_forces(contacts: &mut [Contact], bodies: &mut BodySet, dt: f64) {
    let inv_dt = 1.0 / dt;
    for c in contacts.iter_mut() {
        let mut impulse_a = DVec3::ZERO;
        let mut angular_a = DVec3::ZERO;
        let mut impulse_b = DVec3::ZERO;
        let mut angular_b = DVec3::ZERO;
        for (row, &lambda) in c.rows.iter().zip(&c.lambda) {
            impulse_a += row.linear_a * lambda;
            angular_a += row.angular_a * lambda;
            impulse_b += row.linear_b * lambda;
            angular_b += row.angular_b * lambda;
        }

        {
            let body = &mut bodies[c.constrained_a];
            c.force_a = body.transform().inverse_transform_vector(impulse_a * inv_dt);
            c.torque_a = body.transform().inverse_transform_vector(angular_a * inv_dt);
            body.scratch.contact_force += c.force_a;
            body.scratch.contact_torque += c.torque_a;
        }
        {
            let body = &mut bodies[c.constrained_b];
            c.force_b = body.transform().inverse_transform_vector(impulse_b * inv_dt);
            c.torque_b = body.transform().inverse_transform_vector(angular_b * inv_dt);
            body.scratch.contact_force += c.force_b;
            body.scratch.contact_torque += c.torque_b;
        }

        if c.constrained_a == c.constrained_b {
            continue;
        }
        // External impulses on merged leaves feed the unmerge metric
        for (leaf, constrained, impulse) in [
            (c.body_a, c.constrained_a, impulse_a),
            (c.body_b, c.constrained_b, impulse_b),
        ] {
            if leaf == constrained {
                continue;
            }
            let body = &mut bodies[leaf];
            let lever = c.point - body.position();
            body.scratch.contact_impulse += impulse;
            body.scratch.contact_angular_impulse += lever.cross(impulse);
        }
    }
}

/// Relative motion each member of `coll` would gain if it were free, against
/// the motion the collection actually gained from this step's impulses.
///
/// ```text
/// metric = ½·|Δv_free − Δv_rigid|² + ½·Δωᵀ·(I/m)·Δω
/// ```
///
/// Stored in each member's solver scratch.
pub(crate) fn compute_unmerge_metrics(bodies: &mut BodySet, coll: BodyHandle) {
    let Some(data) = bodies[coll].collection() else {
        return;
    };
    let members = data.members().to_vec();
    let (dv_c, dw_c, x_c) = {
        let c = &bodies[coll];
        (c.scratch.delta_v, c.scratch.delta_w, c.position())
    };
    for m in members {
        let body = &mut bodies[m];
        let mass = body.mass();
        if mass <= 0.0 {
            continue;
        }
        let inertia = body.inertia_world();
        let dv_free = body.scratch.contact_impulse / mass;
        let dw_free = inverse_or_zero(inertia) * body.scratch.contact_angular_impulse;
        let dv_rigid = dv_c + dw_c.cross(body.position() - x_c);
        let rel_v = dv_free - dv_rigid;
        let rel_w = dw_free - dw_c;
        body.scratch.unmerge_metric =
            0.5 * rel_v.length_squared() + 0.5 * rel_w.dot(inertia * rel_w) / mass;
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::body::BodyBuilder;
    use crate::collision::CollisionDetector;
    use crate::contact::ContactGraph;
    use crate::world::PhysicsConfig;
    use approx::assert_relative_eq;

    const DT: f64 = 0.01;

    fn detect(set: &mut BodySet) -> Vec<Contact> {
        let mut contacts = Vec::new();
        CollisionDetector::new().detect(
            set,
            &mut ContactGraph::new(),
            &mut contacts,
            &PhysicsConfig::default(),
        );
        contacts
    }

    fn run(set: &mut BodySet, contacts: &mut [Contact], config: &SolverConfig) -> ContactCache {
        let mut cache = ContactCache::new();
        let mut rng = DeterministicRng::new(config.shuffle_seed);
        ContactSolver::new().solve(contacts, set, &mut cache, &mut rng, config, DT);
        cache
    }

    #[test]
    fn test_elastic_exchange() {
        let mut set = BodySet::new();
        let a = set.insert(
            BodyBuilder::sphere(0.5)
                .mass(1.0)
                .position(DVec3::new(-0.49, 0.0, 0.0))
                .linear_velocity(DVec3::X)
                .build()
                .unwrap(),
        );
        let b = set.insert(
            BodyBuilder::sphere(0.5)
                .mass(1.0)
                .position(DVec3::new(0.49, 0.0, 0.0))
                .linear_velocity(-DVec3::X)
                .build()
                .unwrap(),
        );
        let mut contacts = detect(&mut set);
        assert_eq!(contacts.len(), 1);
        contacts[0].restitution = 1.0;
        run(&mut set, &mut contacts, &SolverConfig::default());
        assert_relative_eq!(set[a].linear_velocity().x, -1.0, epsilon = 1e-9);
        assert_relative_eq!(set[b].linear_velocity().x, 1.0, epsilon = 1e-9);
        assert_relative_eq!(contacts[0].normal_impulse(), 2.0, epsilon = 1e-9);
    }

    #[test]
    fn test_inelastic_stops_approach() {
        let mut set = BodySet::new();
        let a = set.insert(
            BodyBuilder::sphere(0.5)
                .mass(1.0)
                .position(DVec3::new(-0.49, 0.0, 0.0))
                .linear_velocity(DVec3::X)
                .build()
                .unwrap(),
        );
        let b = set.insert(
            BodyBuilder::sphere(0.5)
                .mass(1.0)
                .position(DVec3::new(0.49, 0.0, 0.0))
                .build()
                .unwrap(),
        );
        let mut contacts = detect(&mut set);
        run(&mut set, &mut contacts, &SolverConfig::default());
        assert_relative_eq!(set[a].linear_velocity().x, 0.5, epsilon = 1e-9);
        assert_relative_eq!(set[b].linear_velocity().x, 0.5, epsilon = 1e-9);
    }

    #[test]
    fn test_friction_cone_and_sign() {
        let mut set = BodySet::new();
        set.insert(
            BodyBuilder::cuboid(DVec3::new(6.0, 1.0, 6.0))
                .pinned(true)
                .build()
                .unwrap(),
        );
        let ball = set.insert(
            BodyBuilder::sphere(0.5)
                .mass(1.0)
                .position(DVec3::new(0.2, 1.0, 0.1))
                .linear_velocity(DVec3::new(3.0, -1.0, 2.0))
                .angular_velocity(DVec3::new(0.0, 4.0, 1.0))
                .build()
                .unwrap(),
        );
        set[ball].apply_force(DVec3::new(0.0, -9.81, 0.0));
        let mut contacts = detect(&mut set);
        assert!(!contacts.is_empty());
        let config = SolverConfig {
            shuffle: true,
            ..SolverConfig::default()
        };
        run(&mut set, &mut contacts, &config);
        for c in &contacts {
            assert!(c.normal_impulse() >= 0.0, "Normal impulse must be non-negative");
            for t in c.tangent_impulses() {
                assert!(
                    t.abs() <= c.friction * c.normal_impulse() + 1e-12,
                    "Tangent impulse {t} outside friction cone"
                );
            }
        }
    }

    #[test]
    fn test_negative_friction_clamps_to_frictionless() {
        let mut set = BodySet::new();
        let anchor = set.insert(BodyBuilder::sphere(0.5).pinned(true).build().unwrap());
        let ball = set.insert(
            BodyBuilder::sphere(0.5)
                .mass(1.0)
                .position(DVec3::new(0.3, 0.9, 0.0))
                .linear_velocity(DVec3::new(1.0, -1.0, 0.0))
                .build()
                .unwrap(),
        );
        let mut contacts = detect(&mut set);
        assert_eq!(contacts.len(), 1);
        for friction in [-0.5, f64::NAN] {
            for h in [anchor, ball] {
                set[h].scratch.reset();
            }
            set[ball].set_velocity(DVec3::new(1.0, -1.0, 0.0), DVec3::ZERO);
            contacts[0].friction = friction;
            run(&mut set, &mut contacts, &SolverConfig::default());
            assert!(contacts[0].normal_impulse() > 0.0);
            assert_eq!(contacts[0].tangent_impulses(), [0.0, 0.0]);
        }
    }

    #[test]
    fn test_sleeping_body_is_immovable() {
        let mut set = BodySet::new();
        let sleeper = set.insert(BodyBuilder::sphere(0.5).mass(1.0).build().unwrap());
        set[sleeper].sleeping = true;
        set.insert(
            BodyBuilder::sphere(0.5)
                .mass(1.0)
                .position(DVec3::new(0.0, 0.99, 0.0))
                .linear_velocity(DVec3::new(0.0, -2.0, 0.0))
                .build()
                .unwrap(),
        );
        let mut contacts = detect(&mut set);
        run(&mut set, &mut contacts, &SolverConfig::default());
        assert_eq!(set[sleeper].linear_velocity(), DVec3::ZERO);
        assert_relative_eq!(contacts[0].normal_impulse(), 2.0, epsilon = 1e-9);
    }

    #[test]
    fn test_pinned_pair_rows_skipped() {
        let mut set = BodySet::new();
        let a = set.insert(BodyBuilder::sphere(0.5).mass(1.0).build().unwrap());
        let b = set.insert(
            BodyBuilder::sphere(0.5)
                .mass(1.0)
                .position(DVec3::new(0.9, 0.0, 0.0))
                .build()
                .unwrap(),
        );
        let mut contacts = detect(&mut set);
        set[a].sleeping = true;
        set[b].sleeping = true;
        let mut cache = ContactCache::new();
        let mut solver = ContactSolver::new();
        solver.solve(
            &mut contacts,
            &mut set,
            &mut cache,
            &mut DeterministicRng::new(1),
            &SolverConfig::default(),
            DT,
        );
        assert_eq!(solver.stats.skipped_rows, ROWS_PER_CONTACT);
        assert_eq!(solver.stats.rows, 0);
        assert_eq!(contacts[0].lambda, [0.0; ROWS_PER_CONTACT]);
    }

    #[test]
    fn test_resting_contact_force() {
        let mut set = BodySet::new();
        set.insert(BodyBuilder::sphere(0.5).pinned(true).build().unwrap());
        let ball = set.insert(
            BodyBuilder::sphere(0.5)
                .mass(2.0)
                .position(DVec3::new(0.0, 0.999, 0.0))
                .build()
                .unwrap(),
        );
        set[ball].apply_force(DVec3::new(0.0, -9.81 * 2.0, 0.0));
        let mut contacts = detect(&mut set);
        let cache = run(&mut set, &mut contacts, &SolverConfig::default());
        assert_relative_eq!(contacts[0].normal_impulse(), 2.0 * 9.81 * DT, epsilon = 1e-9);
        assert_relative_eq!(set[ball].contact_force().y, 2.0 * 9.81, epsilon = 1e-6);
        assert_eq!(cache.len(), 1, "Cache rebuilt from solved contacts");
    }

    #[test]
    fn test_warm_start_seeds_lambda() {
        let mut set = BodySet::new();
        set.insert(BodyBuilder::sphere(0.5).pinned(true).build().unwrap());
        let ball = set.insert(
            BodyBuilder::sphere(0.5)
                .mass(1.0)
                .position(DVec3::new(0.0, 0.999, 0.0))
                .build()
                .unwrap(),
        );
        let config = SolverConfig {
            iterations: 1,
            ..SolverConfig::default()
        };
        let mut cache = ContactCache::new();
        let mut rng = DeterministicRng::new(0);
        let mut solver = ContactSolver::new();

        set[ball].apply_force(DVec3::new(0.0, -9.81, 0.0));
        let mut contacts = detect(&mut set);
        solver.solve(&mut contacts, &mut set, &mut cache, &mut rng, &config, DT);
        set[ball].write_velocity(DVec3::ZERO, DVec3::ZERO);
        set[ball].scratch.reset();
        set[ball].clear_forces();

        set[ball].apply_force(DVec3::new(0.0, -9.81, 0.0));
        let mut contacts = detect(&mut set);
        solver.solve(&mut contacts, &mut set, &mut cache, &mut rng, &config, DT);
        assert_eq!(solver.stats.warm_started, 1);
        assert_relative_eq!(contacts[0].normal_impulse(), 9.81 * DT, epsilon = 1e-9);
    }
}
