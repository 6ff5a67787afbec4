//! # rigid-merge
//!
//! **3D Rigid-Body Dynamics with Sleeping and Merging**
//!
//! A rigid-body simulator that fuses resting contact groups into composite
//! bodies so the constraint solver only sees what is actually moving, and
//! splits them again when relative motion resumes.
//!
//! ## Features
//!
//! | Feature | Description |
//! |---------|-------------|
//! | **Sphere-tree narrow phase** | Dual-tree descent over per-body sphere hierarchies |
//! | **Persistent contact graph** | Per body-pair relative-motion history and wake topology |
//! | **PGS solver** | Normal + two friction rows, warm start, optional shuffle, Baumgarte |
//! | **Sleeping** | Motion and load windows, direct or contact-graph wake |
//! | **Merging** | Momentum-conserving collections, impulse-driven unmerge |
//! | **Penalty mode** | Spring/damper contacts as an alternative to the solve |
//!
//! ## Design Principles
//!
//! - **Deterministic**: slot-ordered iteration, insertion-ordered maps and a
//!   seeded PCG shuffle make identical runs bit-identical
//! - **Leaf-resolution geometry**: contacts always come from leaf primitives;
//!   collections only change which body the solver moves
//! - **Typed errors**: fallible operations return [`PhysicsError`]
//!
//! ## Quick Start
//!
//! ```rust
//! use glam::DVec3;
//! use rigid_merge::prelude::*;
//!
//! let mut config = PhysicsConfig::default();
//! config.sleep.enabled = true;
//! config.merge.enabled = true;
//! let mut world = PhysicsWorld::new(config).unwrap();
//!
//! world
//!     .add_body(BodyBuilder::cuboid(DVec3::new(8.0, 1.0, 8.0)).ground(true).build().unwrap())
//!     .unwrap();
//! let top = world
//!     .add_body(
//!         BodyBuilder::cuboid(DVec3::new(2.0, 1.0, 2.0))
//!             .position(DVec3::new(0.0, 1.5, 0.0))
//!             .build()
//!             .unwrap(),
//!     )
//!     .unwrap();
//!
//! for _ in 0..100 {
//!     world.step(0.01);
//! }
//! let state = world.body(top).unwrap();
//! assert!(state.position().y > 1.0);
//! ```

pub mod body;
pub mod body_set;
pub mod bvh;
pub mod collection;
pub mod collision;
pub mod contact;
pub mod contact_cache;
pub mod error;
pub mod geometry;
pub mod history;
pub mod mass_properties;
pub mod math;
pub mod merging;
pub mod rng;
pub mod sleeping;
pub mod solver;
pub mod world;

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::body::{Activity, BodyBuilder, BodyHandle, BodyKind, RigidBody};
    pub use crate::body_set::BodySet;
    pub use crate::collection::CollectionData;
    pub use crate::collision::{CollisionConfig, CollisionStats, PenaltyConfig};
    pub use crate::contact::{BodyPairContact, BodyPairKey, Contact, ContactGraph};
    pub use crate::error::PhysicsError;
    pub use crate::geometry::{Color, Geometry, Primitive};
    pub use crate::math::RigidTransform;
    pub use crate::merging::{MergeConfig, MergeStats};
    pub use crate::sleeping::SleepConfig;
    pub use crate::solver::{ContactMode, SolverConfig, SolverStats};
    pub use crate::world::{BodyState, PhysicsConfig, PhysicsWorld, StepStats};
}

// Re-export main types at crate root
pub use prelude::*;

// ============================================================================
// Integration Tests
// ============================================================================
