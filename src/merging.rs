//! Merging and Unmerging
//!
//! Resting contact groups are fused into collections so the solver sees one
//! rigid body instead of many contacts. A pair merges once its relative
//! contact motion stayed below the merge threshold for a full history
//! window. A member is released again when the external impulses it received
//! would have moved it noticeably differently from its collection.
//!
//! # Pass order (once per step, after integration)
//!
//! 1. Merge qualifying contact-graph pairs
//! 2. Migrate newly internal edges and archive internal contacts
//! 3. Unmerge members whose relative-motion metric exceeds the threshold
//! 4. Dissolve collections left with one member or fewer

use crate::body::BodyHandle;
use crate::body_set::BodySet;
use crate::collection::{
    add_incomplete_contacts, add_member, create_collection, dissolve, fill_internal_body_contacts,
    remove_member,
};
use crate::contact::{BodyPairKey, Contact, ContactGraph};
use crate::error::PhysicsError;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Configuration for merging
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct MergeConfig {
    /// Master switch
    pub enabled: bool,
    /// Relative contact speed below which a pair counts as resting
    pub merge_threshold: f64,
    /// Relative-motion metric above which a member is released
    pub unmerge_threshold: f64,
    /// Allow members to leave their collection
    pub enable_unmerge: bool,
}

impl Default for MergeConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            merge_threshold: 0.05,
            unmerge_threshold: 1.0,
            enable_unmerge: true,
        }
    }
}

/// Counters from the last merge pass
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct MergeStats {
    /// Pairs merged
    pub merged: usize,
    /// Members released
    pub unmerged: usize,
    /// Collections dissolved
    pub dissolved: usize,
}

// ============================================================================
// Operations
// ============================================================================

fn flatten_into(
    bodies: &mut BodySet,
    graph: &mut ContactGraph,
    receiver: BodyHandle,
    donor: BodyHandle,
) -> Result<(), PhysicsError> {
    let members = dissolve(bodies, graph, donor);
    for m in members {
        add_member(bodies, receiver, m)?;
    }
    Ok(())
}

fn contains_ground(bodies: &BodySet, root: BodyHandle) -> bool {
    let body = &bodies[root];
    match body.collection() {
        Some(data) => data.members().iter().any(|&m| bodies[m].is_ground()),
        None => body.is_ground(),
    }
}

/// Merge the bodies (or collections) owning leaves `a` and `b`.
///
/// Two simple bodies seed a new collection; the ground is never the seed.
/// A simple body joins an existing collection. Two collections fuse by
/// flattening one into the other, the one holding the ground receiving.
/// Returns the resulting collection.
///
/// # Errors
///
/// [`PhysicsError::InvalidBodyHandle`] for stale handles,
/// [`PhysicsError::CyclicMerge`] when both already share a collection.
pub fn merge_bodies(
    bodies: &mut BodySet,
    graph: &mut ContactGraph,
    a: BodyHandle,
    b: BodyHandle,
) -> Result<BodyHandle, PhysicsError> {
    bodies.try_get(a)?;
    bodies.try_get(b)?;
    let (ra, rb) = (bodies.root_of(a), bodies.root_of(b));
    if ra == rb {
        return Err(PhysicsError::CyclicMerge { body: b, collection: ra });
    }

    let coll = match (bodies[ra].is_collection(), bodies[rb].is_collection()) {
        (true, true) => {
            let (receiver, donor) = if contains_ground(bodies, rb) && !contains_ground(bodies, ra) {
                (rb, ra)
            } else {
                (ra, rb)
            };
            flatten_into(bodies, graph, receiver, donor)?;
            receiver
        }
        (true, false) => {
            add_member(bodies, ra, rb)?;
            ra
        }
        (false, true) => {
            add_member(bodies, rb, ra)?;
            rb
        }
        (false, false) => {
            let (seed, other) = if bodies[ra].is_ground() { (rb, ra) } else { (ra, rb) };
            let coll = create_collection(bodies, seed)?;
            add_member(bodies, coll, other)?;
            coll
        }
    };
    add_incomplete_contacts(bodies, graph, coll);
    tracing::debug!(a = ?a, b = ?b, collection = ?coll, "merged");
    Ok(coll)
}

/// Release `body` from its collection, reopening its internal edges.
/// Collections left with one member or fewer are dissolved.
///
/// # Errors
///
/// [`PhysicsError::NotACollectionMember`] when `body` is not merged.
pub fn unmerge_body(
    bodies: &mut BodySet,
    graph: &mut ContactGraph,
    body: BodyHandle,
) -> Result<(), PhysicsError> {
    let Some(coll) = bodies.try_get(body)?.parent() else {
        tracing::error!(body = ?body, "unmerge of a free body");
        return Err(PhysicsError::NotACollectionMember {
            body,
            collection: body,
        });
    };
    let reopened: Vec<BodyPairKey> = bodies[coll]
        .collection()
        .map(|d| d.internal_pairs().iter().filter(|k| k.involves(body)).copied().collect())
        .unwrap_or_default();

    remove_member(bodies, coll, body)?;
    for key in &reopened {
        if let Some(pair) = graph.get_mut(key) {
            pair.in_collection = false;
            pair.motion_history.clear();
        }
    }
    let remaining = bodies[coll].collection().map_or(0, |d| d.members().len());
    if remaining <= 1 {
        dissolve(bodies, graph, coll);
    }
    tracing::debug!(body = ?body, collection = ?coll, "unmerged");
    Ok(())
}

/// Dissolve every collection. Returns the number dissolved.
pub fn unmerge_all(bodies: &mut BodySet, graph: &mut ContactGraph) -> usize {
    let collections: Vec<BodyHandle> = bodies
        .iter()
        .filter(|b| b.is_collection())
        .map(|b| b.handle())
        .collect();
    for &c in &collections {
        dissolve(bodies, graph, c);
    }
    collections.len()
}

// ============================================================================
// Per-step pass
// ============================================================================

/// Run one merge/unmerge pass over the contact graph
pub fn update_merging(
    bodies: &mut BodySet,
    graph: &mut ContactGraph,
    contacts: &[Contact],
    config: &MergeConfig,
) -> MergeStats {
    let mut stats = MergeStats::default();
    if !config.enabled {
        return stats;
    }

    let candidates: Vec<BodyPairKey> = graph
        .iter()
        .filter(|p| {
            p.active
                && !p.in_collection
                && p.motion_history.full_and_below(config.merge_threshold)
        })
        .map(|p| p.key)
        .collect();

    let mut touched = Vec::new();
    for key in candidates {
        if let Some(pair) = graph.get_mut(&key) {
            pair.in_cycle = true;
        }
        let (ra, rb) = (bodies.root_of(key.a), bodies.root_of(key.b));
        if ra == rb || (bodies[ra].is_pinned() && bodies[rb].is_pinned()) {
            continue;
        }
        match merge_bodies(bodies, graph, key.a, key.b) {
            Ok(coll) => {
                stats.merged += 1;
                touched.push(coll);
            }
            Err(e) => tracing::warn!(error = %e, "merge skipped"),
        }
    }

    let collections: Vec<BodyHandle> = bodies
        .iter()
        .filter(|b| b.is_collection() && b.parent().is_none())
        .map(|b| b.handle())
        .collect();
    for &coll in &collections {
        if touched.contains(&coll) {
            add_incomplete_contacts(bodies, graph, coll);
            fill_internal_body_contacts(bodies, graph, contacts, coll);
        }
    }

    if config.enable_unmerge {
        for &coll in &collections {
            if !bodies.contains(coll) {
                continue;
            }
            let leaving: Vec<BodyHandle> = bodies[coll]
                .collection()
                .map(|d| {
                    d.members()
                        .iter()
                        .copied()
                        .filter(|&m| bodies[m].scratch.unmerge_metric > config.unmerge_threshold)
                        .collect()
                })
                .unwrap_or_default();
            for m in leaving {
                if !bodies.contains(coll) || bodies[m].parent() != Some(coll) {
                    break;
                }
                match unmerge_body(bodies, graph, m) {
                    Ok(()) => stats.unmerged += 1,
                    Err(e) => tracing::warn!(error = %e, "unmerge skipped"),
                }
            }
        }
    }

    for &coll in &collections {
        let Some(data) = bodies.get(coll).and_then(|b| b.collection()) else {
            stats.dissolved += 1;
            continue;
        };
        if data.members().len() <= 1 {
            dissolve(bodies, graph, coll);
            stats.dissolved += 1;
        }
    }
    if stats != MergeStats::default() {
        tracing::debug!(
            merged = stats.merged,
            unmerged = stats.unmerged,
            dissolved = stats.dissolved,
            "merge pass"
        );
    }
    stats
}
