//! Stack Example
//!
//! Drops a column of boxes on the ground, lets it merge and fall asleep,
//! then knocks the top box off with a fast sphere.
//!
//! ```bash
//! RUST_LOG=rigid_merge=debug cargo run --example stack
//! ```

use glam::DVec3;
use rigid_merge::prelude::*;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

fn main() -> Result<(), PhysicsError> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer())
        .init();

    let mut config = PhysicsConfig::default();
    config.history_window = 20;
    config.sleep.enabled = true;
    config.merge.enabled = true;
    config.solver.shuffle = true;
    let mut world = PhysicsWorld::new(config)?;

    world.add_body(
        BodyBuilder::cuboid(DVec3::new(8.0, 1.0, 8.0))
            .ground(true)
            .build()?,
    )?;
    let mut boxes = Vec::new();
    for i in 0..5 {
        let body = BodyBuilder::cuboid(DVec3::new(2.0, 1.0, 2.0))
            .position(DVec3::new(0.0, 1.42 * (i + 1) as f64, 0.0))
            .build()?;
        boxes.push(world.add_body(body)?);
    }

    println!("rigid-merge Stack Example");
    println!("=========================");
    println!("Bodies: {}", world.body_count());
    println!();

    let dt = 0.01;
    for frame in 0..400 {
        world.step(dt);
        if frame == 200 {
            let top = world.body(boxes[4]).map_or(0.0, |b| b.position().y);
            world.add_body(
                BodyBuilder::sphere(0.5)
                    .mass(5.0)
                    .position(DVec3::new(-4.0, top, 0.0))
                    .linear_velocity(DVec3::new(25.0, 0.0, 0.0))
                    .build()?,
            )?;
            println!("Frame {frame:3}: sphere launched");
        }
        if frame % 25 == 0 {
            let stats = world.stats();
            println!(
                "Frame {:3}: top-level {:2}  collections {}  sleeping {:2}  contacts {:4}  solver rows {:4}",
                frame,
                stats.top_level,
                stats.collections,
                stats.sleeping,
                stats.contacts,
                stats.solver.rows,
            );
        }
    }

    println!();
    for (i, &h) in boxes.iter().enumerate() {
        if let Some(body) = world.body(h) {
            println!("box {i}: {:?} at {:.3}", body.activity(), body.position());
        }
    }
    Ok(())
}
