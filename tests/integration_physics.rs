//! Integration tests for rigid-merge
//!
//! These tests verify end-to-end behaviour of the simulator using only the
//! public API re-exported from the crate root.

use approx::assert_relative_eq;
use glam::DVec3;
use rigid_merge::{
    Activity, BodyBuilder, BodyHandle, ContactMode, PhysicsConfig, PhysicsError, PhysicsWorld,
};

const DT: f64 = 0.01;

// ============================================================================
// Helpers
// ============================================================================

/// Run a world for `steps` frames.
fn run_world(world: &mut PhysicsWorld, steps: usize) {
    for _ in 0..steps {
        world.step(DT);
    }
}

fn ground(world: &mut PhysicsWorld) -> BodyHandle {
    world
        .add_body(
            BodyBuilder::cuboid(DVec3::new(8.0, 1.0, 8.0))
                .ground(true)
                .build()
                .unwrap(),
        )
        .unwrap()
}

/// Flat 2×1×2 boxes stacked on the ground, slightly apart.
fn box_stack(world: &mut PhysicsWorld, count: usize) -> Vec<BodyHandle> {
    (0..count)
        .map(|i| {
            world
                .add_body(
                    BodyBuilder::cuboid(DVec3::new(2.0, 1.0, 2.0))
                        .position(DVec3::new(0.0, 1.42 * (i + 1) as f64, 0.0))
                        .build()
                        .unwrap(),
                )
                .unwrap()
        })
        .collect()
}

fn activity(world: &PhysicsWorld, h: BodyHandle) -> Activity {
    world.body(h).unwrap().activity()
}

// ============================================================================
// Test 1: Resting contact
// ============================================================================

/// A sphere dropped onto a pinned sphere of equal radius comes to rest with
/// its center one diameter above the pinned center.
#[test]
fn test_sphere_rests_on_pinned_sphere() {
    let mut world = PhysicsWorld::new(PhysicsConfig::default()).unwrap();
    let base = world
        .add_body(BodyBuilder::sphere(0.5).pinned(true).build().unwrap())
        .unwrap();
    let ball = world
        .add_body(
            BodyBuilder::sphere(0.5)
                .position(DVec3::new(0.0, 1.2, 0.0))
                .build()
                .unwrap(),
        )
        .unwrap();
    run_world(&mut world, 300);

    let b = world.body(ball).unwrap();
    assert_relative_eq!(b.position().y, 1.0, epsilon = 0.05);
    assert!(b.linear_velocity().length() < 1e-6, "Ball must be at rest");
    assert_eq!(world.body(base).unwrap().position(), DVec3::ZERO);
}

// ============================================================================
// Test 2: Elastic collision
// ============================================================================

/// Two identical spheres approaching head-on with restitution 1 exchange
/// velocities.
#[test]
fn test_elastic_spheres_exchange_velocity() {
    let mut config = PhysicsConfig::default();
    config.gravity = DVec3::ZERO;
    config.solver.restitution = 1.0;
    config.solver.baumgarte = 0.0;
    let mut world = PhysicsWorld::new(config).unwrap();
    let a = world
        .add_body(
            BodyBuilder::sphere(0.5)
                .mass(1.0)
                .position(DVec3::new(-0.6, 0.0, 0.0))
                .linear_velocity(DVec3::new(1.0, 0.0, 0.0))
                .build()
                .unwrap(),
        )
        .unwrap();
    let b = world
        .add_body(
            BodyBuilder::sphere(0.5)
                .mass(1.0)
                .position(DVec3::new(0.6, 0.0, 0.0))
                .linear_velocity(DVec3::new(-1.0, 0.0, 0.0))
                .build()
                .unwrap(),
        )
        .unwrap();
    run_world(&mut world, 40);

    let va = world.body(a).unwrap().linear_velocity();
    let vb = world.body(b).unwrap().linear_velocity();
    assert_relative_eq!(va.x, -1.0, epsilon = 1e-6);
    assert_relative_eq!(vb.x, 1.0, epsilon = 1e-6);
    assert!(world.body(a).unwrap().position().x < -0.5, "Spheres separated");
}

// ============================================================================
// Test 3: Solver bounds
// ============================================================================

/// Normal impulses stay non-negative and friction stays inside the cone on
/// every contact of every step.
#[test]
fn test_impulses_respect_friction_cone() {
    let mut config = PhysicsConfig::default();
    config.solver.shuffle = true;
    config.solver.friction = 0.6;
    let mut world = PhysicsWorld::new(config).unwrap();
    ground(&mut world);
    for i in 0..4 {
        let x = -1.5 + i as f64;
        world
            .add_body(
                BodyBuilder::sphere(0.5)
                    .position(DVec3::new(x, 1.3 + 0.4 * i as f64, 0.2 * i as f64))
                    .linear_velocity(DVec3::new(2.0 - i as f64, 0.0, 1.0))
                    .angular_velocity(DVec3::new(0.0, 3.0, 0.0))
                    .build()
                    .unwrap(),
            )
            .unwrap();
    }
    let mut checked = 0;
    for _ in 0..150 {
        world.step(DT);
        for c in world.contacts() {
            assert!(c.normal_impulse() >= 0.0);
            for t in c.tangent_impulses() {
                assert!(t.abs() <= c.friction * c.normal_impulse() + 1e-12);
            }
            checked += 1;
        }
    }
    assert!(checked > 0, "Scene must produce contacts");
}

// ============================================================================
// Test 4: Pinned bodies
// ============================================================================

/// Pinned bodies never move, whatever hits them.
#[test]
fn test_pinned_bodies_immovable() {
    let mut world = PhysicsWorld::new(PhysicsConfig::default()).unwrap();
    let g = ground(&mut world);
    world
        .add_body(
            BodyBuilder::cuboid(DVec3::new(2.0, 2.0, 2.0))
                .mass(50.0)
                .position(DVec3::new(0.3, 2.0, -0.2))
                .linear_velocity(DVec3::new(1.0, -8.0, 0.5))
                .build()
                .unwrap(),
        )
        .unwrap();
    run_world(&mut world, 100);
    let body = world.body(g).unwrap();
    assert_eq!(body.position(), DVec3::ZERO);
    assert_eq!(body.linear_velocity(), DVec3::ZERO);
    assert_eq!(body.angular_velocity(), DVec3::ZERO);
}

/// A free body without forces advances by exactly `v·dt`.
#[test]
fn test_free_body_integrates_exactly() {
    let mut config = PhysicsConfig::default();
    config.gravity = DVec3::ZERO;
    let mut world = PhysicsWorld::new(config).unwrap();
    let v = DVec3::new(0.5, -0.25, 2.0);
    let h = world
        .add_body(BodyBuilder::sphere(0.5).linear_velocity(v).build().unwrap())
        .unwrap();
    world.step(DT);
    let body = world.body(h).unwrap();
    assert_eq!(body.linear_velocity(), v);
    assert_eq!(body.position(), v * DT);
}

// ============================================================================
// Test 5: Narrow phase
// ============================================================================

/// Tree descent and brute force produce the same contact set.
#[test]
fn test_bvh_matches_brute_force() {
    let contact_keys = |use_bvh: bool| {
        let mut config = PhysicsConfig::default();
        config.collision.use_bvh = use_bvh;
        let mut world = PhysicsWorld::new(config).unwrap();
        ground(&mut world);
        world
            .add_body(
                BodyBuilder::cuboid(DVec3::new(3.0, 2.0, 2.0))
                    .position(DVec3::new(0.4, 1.6, 0.3))
                    .orientation(glam::DQuat::from_rotation_y(0.3))
                    .build()
                    .unwrap(),
            )
            .unwrap();
        world
            .add_body(
                BodyBuilder::cuboid(DVec3::new(1.0, 3.0, 1.0))
                    .position(DVec3::new(-1.2, 2.2, 0.0))
                    .build()
                    .unwrap(),
            )
            .unwrap();
        world.step(DT);
        let mut keys: Vec<_> = world.contacts().iter().map(|c| c.key).collect();
        keys.sort_unstable();
        keys
    };
    let tree = contact_keys(true);
    assert!(!tree.is_empty());
    assert_eq!(tree, contact_keys(false));
}

// ============================================================================
// Test 6: Sleeping and waking
// ============================================================================

fn sleeping_stack(count: usize) -> (PhysicsWorld, Vec<BodyHandle>) {
    let mut config = PhysicsConfig::default();
    config.sleep.enabled = true;
    config.history_window = 20;
    let mut world = PhysicsWorld::new(config).unwrap();
    ground(&mut world);
    let boxes = box_stack(&mut world, count);
    run_world(&mut world, 250);
    for (i, &h) in boxes.iter().enumerate() {
        assert_eq!(activity(&world, h), Activity::Sleeping, "box {i} should sleep");
    }
    (world, boxes)
}

/// Drop a ball onto the top box and step until it touches.
fn drop_ball_on(world: &mut PhysicsWorld, top: BodyHandle) -> BodyHandle {
    let y = world.body(top).unwrap().position().y + 1.5;
    let ball = world
        .add_body(
            BodyBuilder::sphere(0.5)
                .position(DVec3::new(0.5, y, 0.5))
                .build()
                .unwrap(),
        )
        .unwrap();
    for _ in 0..100 {
        world.step(DT);
        if world.contacts_of(ball).next().is_some() {
            return ball;
        }
    }
    panic!("ball never reached the stack");
}

/// A resting stack falls asleep; sleeping bodies keep zero velocity.
#[test]
fn test_stack_falls_asleep() {
    let (world, boxes) = sleeping_stack(4);
    for &h in &boxes {
        assert_eq!(world.body(h).unwrap().linear_velocity(), DVec3::ZERO);
    }
    assert_eq!(world.stats().sleeping, 4);
}

/// Contact-graph wake reaches exactly `wake_hops` bodies down the stack.
#[test]
fn test_contact_graph_wake_hops() {
    let (mut world, boxes) = sleeping_stack(4);
    let mut config = *world.config();
    config.sleep.use_contact_graph = true;
    config.sleep.wake_hops = 2;
    world.set_config(config).unwrap();

    drop_ball_on(&mut world, boxes[3]);
    let awake: Vec<bool> = boxes
        .iter()
        .map(|&h| activity(&world, h) == Activity::Active)
        .collect();
    assert_eq!(awake, vec![false, false, true, true]);
}

/// Without the contact graph only the struck body wakes.
#[test]
fn test_direct_wake_only_touched_body() {
    let (mut world, boxes) = sleeping_stack(3);
    drop_ball_on(&mut world, boxes[2]);
    assert_eq!(activity(&world, boxes[2]), Activity::Active);
    assert_eq!(activity(&world, boxes[1]), Activity::Sleeping);
    assert_eq!(activity(&world, boxes[0]), Activity::Sleeping);
}

// ============================================================================
// Test 7: Merging
// ============================================================================

/// A resting box merges with the ground; a hard hit releases it again and the
/// leftover collection dissolves.
#[test]
fn test_merge_unmerge_round_trip() {
    let mut config = PhysicsConfig::default();
    config.merge.enabled = true;
    config.history_window = 10;
    let mut world = PhysicsWorld::new(config).unwrap();
    ground(&mut world);
    let target = box_stack(&mut world, 1)[0];
    run_world(&mut world, 60);
    assert_eq!(activity(&world, target), Activity::Merged);
    assert_eq!(world.stats().collections, 1);

    let y = world.body(target).unwrap().position().y;
    let ball = world
        .add_body(
            BodyBuilder::sphere(0.5)
                .position(DVec3::new(-3.0, y, 0.5))
                .linear_velocity(DVec3::new(20.0, 0.0, 0.0))
                .build()
                .unwrap(),
        )
        .unwrap();
    for _ in 0..30 {
        world.step(DT);
        if world.contacts_of(ball).next().is_some() {
            break;
        }
    }
    assert_eq!(activity(&world, target), Activity::Active, "Hit releases the box");
    assert_eq!(world.stats().collections, 0, "Single-member collection dissolved");
    assert!(world.stats().merge.unmerged >= 1);
}

/// Composite mass properties do not depend on merge order.
#[test]
fn test_composite_order_independent() {
    let composite = |order: [(usize, usize); 2]| {
        let mut config = PhysicsConfig::default();
        config.gravity = DVec3::ZERO;
        let mut world = PhysicsWorld::new(config).unwrap();
        let bodies: Vec<BodyHandle> = [
            (DVec3::new(0.0, 0.0, 0.0), 1.0),
            (DVec3::new(1.0, 0.2, 0.0), 2.0),
            (DVec3::new(0.5, 1.0, 0.7), 3.0),
        ]
        .iter()
        .map(|&(p, m)| {
            world
                .add_body(
                    BodyBuilder::cuboid(DVec3::new(1.0, 0.5, 0.8))
                        .mass(m)
                        .position(p)
                        .build()
                        .unwrap(),
                )
                .unwrap()
        })
        .collect();
        let mut coll = bodies[0];
        for (a, b) in order {
            coll = world.merge_bodies(bodies[a], bodies[b]).unwrap();
        }
        let c = world.body(coll).unwrap();
        (c.mass(), c.position(), c.inertia_body())
    };
    let (m1, x1, i1) = composite([(0, 1), (1, 2)]);
    let (m2, x2, i2) = composite([(2, 1), (0, 2)]);
    assert_relative_eq!(m1, 6.0, epsilon = 1e-12);
    assert_relative_eq!(m1, m2, epsilon = 1e-12);
    assert!((x1 - x2).length() < 1e-12);
    for (c1, c2) in i1.to_cols_array().iter().zip(i2.to_cols_array().iter()) {
        assert_relative_eq!(*c1, *c2, epsilon = 1e-9);
    }
}

/// Unmerge of a free body is a typed error and changes nothing.
#[test]
fn test_unmerge_non_member_errors() {
    let mut world = PhysicsWorld::new(PhysicsConfig::default()).unwrap();
    let h = world
        .add_body(BodyBuilder::sphere(0.5).build().unwrap())
        .unwrap();
    assert!(matches!(
        world.unmerge_body(h),
        Err(PhysicsError::NotACollectionMember { .. })
    ));
    assert_eq!(world.body_count(), 1);
}

// ============================================================================
// Test 8: Determinism and modes
// ============================================================================

/// Two identical runs with shuffling, sleeping and merging are bit-identical.
#[test]
fn test_determinism() {
    let simulate = || {
        let mut config = PhysicsConfig::default();
        config.solver.shuffle = true;
        config.sleep.enabled = true;
        config.merge.enabled = true;
        config.history_window = 15;
        let mut world = PhysicsWorld::new(config).unwrap();
        ground(&mut world);
        box_stack(&mut world, 3);
        world
            .add_body(
                BodyBuilder::sphere(0.5)
                    .position(DVec3::new(-2.0, 1.3, 0.4))
                    .linear_velocity(DVec3::new(3.0, 0.0, 0.0))
                    .build()
                    .unwrap(),
            )
            .unwrap();
        run_world(&mut world, 150);
        world.readback()
    };
    assert_eq!(simulate(), simulate());
}

/// Penalty mode keeps a box above the ground without a solve.
#[test]
fn test_penalty_mode_supports_box() {
    let mut config = PhysicsConfig::default();
    config.solver.mode = ContactMode::Penalty;
    config.penalty.stiffness = 5e3;
    config.penalty.damping = 50.0;
    let mut world = PhysicsWorld::new(config).unwrap();
    ground(&mut world);
    let top = box_stack(&mut world, 1)[0];
    run_world(&mut world, 300);
    let y = world.body(top).unwrap().position().y;
    assert!(y > 1.2 && y < 1.5, "box height {y}");
}

#[cfg(feature = "serde")]
#[test]
fn test_config_json() {
    let mut config = PhysicsConfig::default();
    config.merge.enabled = true;
    let json = serde_json::to_string(&config).unwrap();
    let back: PhysicsConfig = serde_json::from_str(&json).unwrap();
    assert_eq!(back, config);
}
