//! Sleeping
//!
//! Puts resting bodies to sleep. A body sleeps when, over a full history
//! window, its kinetic energy per unit mass stayed below the sleeping
//! threshold and the contact force and torque acting on it stayed steady.
//!
//! Sleeping bodies keep zero velocity, skip integration and act as immovable
//! in the solver. They are still collision tested against active bodies and
//! wake through [`crate::collision`].

use glam::DVec3;

use crate::body::BodyHandle;
use crate::body_set::BodySet;
use crate::collection::apply_velocities_to_members;
use crate::history::History;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Configuration for the sleeping system
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SleepConfig {
    /// Master switch
    pub enabled: bool,
    /// Kinetic energy per unit mass below which a body counts as resting
    pub sleeping_threshold: f64,
    /// Neighbor kinetic energy per unit mass that wakes a sleeping body on contact
    pub waking_threshold: f64,
    /// Largest deviation of contact force/torque from its window mean
    pub force_tolerance: f64,
    /// Wake through the contact graph instead of direct neighbors only
    pub use_contact_graph: bool,
    /// Depth of a contact-graph wake
    pub wake_hops: u32,
}

impl Default for SleepConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            sleeping_threshold: 1e-3,
            waking_threshold: 0.05,
            force_tolerance: 2.5,
            use_contact_graph: false,
            wake_hops: 2,
        }
    }
}

/// Largest distance of any sample from the window mean
#[must_use]
pub fn variation(history: &History<DVec3>) -> f64 {
    if history.is_empty() {
        return 0.0;
    }
    let mean = history.iter().copied().sum::<DVec3>() / history.len() as f64;
    history
        .iter()
        .map(|s| s.distance(mean))
        .fold(0.0, f64::max)
}

/// Record this step's motion and contact load for every awake top-level body
/// and put qualifying bodies to sleep. Returns the bodies that fell asleep.
pub fn update_sleeping(
    bodies: &mut BodySet,
    top_level: &[BodyHandle],
    config: &SleepConfig,
) -> Vec<BodyHandle> {
    let mut asleep = Vec::new();
    if !config.enabled {
        return asleep;
    }
    for &h in top_level {
        let Some(body) = bodies.get_mut(h) else {
            continue;
        };
        if body.is_sleeping() || body.is_pinned() {
            continue;
        }
        let metric = body.motion_metric();
        body.motion_history.push(metric);
        body.force_history.push(body.scratch.contact_force);
        body.torque_history.push(body.scratch.contact_torque);

        let resting = body.motion_history.full_and_below(config.sleeping_threshold);
        let steady = variation(&body.force_history) <= config.force_tolerance
            && variation(&body.torque_history) <= config.force_tolerance;
        if resting && steady {
            body.sleeping = true;
            body.woken = false;
            body.write_velocity(DVec3::ZERO, DVec3::ZERO);
            asleep.push(h);
        }
    }
    for &h in &asleep {
        if bodies[h].is_collection() {
            apply_velocities_to_members(bodies, h);
        }
        tracing::debug!(body = ?h, "fell asleep");
    }
    asleep
}
