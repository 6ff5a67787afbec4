//! Rigid Collections
//!
//! A collection is a body whose mass properties are the parallel-axis
//! composite of its members. Members are leaf bodies only (absorbing another
//! collection flattens it), so the merge graph cannot contain cycles.
//!
//! # Bookkeeping
//!
//! - On every membership change the collection frame is reset to the
//!   composite center of mass with identity orientation, so body-frame and
//!   world-frame inertia coincide at that instant. Member poses relative to
//!   the collection (`transform_b2c`) are re-derived.
//! - Adding a member conserves linear and angular momentum.
//! - Removing a member gives it the collection's rigid velocity at its center
//!   of mass and subtracts its contribution in closed form.
//! - A pinned collection keeps only mass and center of mass; its inertia is
//!   discarded (zero) like its inverses. Removing a member from a collection
//!   that was pinned therefore recomputes from the remaining members instead
//!   of subtracting.

use glam::{DQuat, DVec3};

use crate::body::{BodyHandle, RigidBody};
use crate::body_set::BodySet;
use crate::contact::{BodyPairKey, Contact, ContactGraph};
use crate::error::PhysicsError;
use crate::mass_properties::MassProperties;
use crate::math::{inverse_or_zero, RigidTransform};

/// Members and internal contact state of a collection
#[derive(Clone, Debug, Default)]
pub struct CollectionData {
    pub(crate) members: Vec<BodyHandle>,
    pub(crate) internal_pairs: Vec<BodyPairKey>,
    pub(crate) internal_contacts: Vec<Contact>,
}

impl CollectionData {
    /// Member bodies in insertion order
    #[inline]
    #[must_use]
    pub fn members(&self) -> &[BodyHandle] {
        &self.members
    }

    /// Contact-graph edges between members
    #[inline]
    #[must_use]
    pub fn internal_pairs(&self) -> &[BodyPairKey] {
        &self.internal_pairs
    }

    /// Archived contacts between members
    #[inline]
    #[must_use]
    pub fn internal_contacts(&self) -> &[Contact] {
        &self.internal_contacts
    }

    /// True when `body` is a member
    #[inline]
    #[must_use]
    pub fn contains(&self, body: BodyHandle) -> bool {
        self.members.contains(&body)
    }
}

/// World-frame mass properties of a body at its current pose
fn world_mass_properties(body: &RigidBody) -> MassProperties {
    MassProperties {
        mass: body.mass(),
        center_of_mass: body.position(),
        inertia: body.inertia_world(),
    }
}

fn collection_data(bodies: &BodySet, coll: BodyHandle) -> Result<&CollectionData, PhysicsError> {
    bodies
        .try_get(coll)?
        .collection()
        .ok_or(PhysicsError::NotACollection { handle: coll })
}

/// Create an empty collection at `seed`'s position and add `seed` to it.
///
/// # Errors
///
/// Fails if `seed` is not a free-standing leaf body.
pub fn create_collection(
    bodies: &mut BodySet,
    seed: BodyHandle,
) -> Result<BodyHandle, PhysicsError> {
    let seed_body = bodies.try_get(seed)?;
    if seed_body.is_collection() || seed_body.parent().is_some() {
        return Err(PhysicsError::CyclicMerge {
            body: seed,
            collection: seed_body.parent().unwrap_or(seed),
        });
    }
    let window = seed_body.motion_history.capacity();
    let mut body = RigidBody::new_collection(CollectionData::default(), seed_body.position());
    body.set_history_window(window);
    let coll = bodies.insert(body);
    if let Err(e) = add_member(bodies, coll, seed) {
        bodies.remove(coll);
        return Err(e);
    }
    tracing::debug!(collection = ?coll, seed = ?seed, "created collection");
    Ok(coll)
}

/// Add a free-standing leaf body to a collection.
///
/// # Errors
///
/// [`PhysicsError::NotACollection`] if `coll` is a simple body,
/// [`PhysicsError::CyclicMerge`] if `body` is a collection or already merged.
pub fn add_member(
    bodies: &mut BodySet,
    coll: BodyHandle,
    body: BodyHandle,
) -> Result<(), PhysicsError> {
    collection_data(bodies, coll)?;
    let member = bodies.try_get(body)?;
    if body == coll || member.is_collection() || member.parent().is_some() {
        return Err(PhysicsError::CyclicMerge {
            body,
            collection: coll,
        });
    }

    let part = world_mass_properties(member);
    let (v_b, w_b) = (member.linear_velocity(), member.angular_velocity());
    let member_pinned = member.is_pinned();
    let member_sleeping = member.is_sleeping();

    let c = &bodies[coll];
    let was_empty = c.collection().is_some_and(|d| d.members.is_empty());
    let was_pinned = c.is_pinned();

    if was_empty {
        let c = &mut bodies[coll];
        c.set_pose(part.center_of_mass, DQuat::IDENTITY);
        c.set_pinned(false);
        c.set_mass_properties(part.mass, part.inertia);
        c.write_velocity(v_b, w_b);
        c.set_pinned(member_pinned);
        c.sleeping = member_sleeping;
    } else if was_pinned || member_pinned {
        let c = &mut bodies[coll];
        c.sleeping = c.sleeping && member_sleeping;
        if let Some(data) = c.collection_mut() {
            data.members.push(body);
        }
        attach(bodies, coll, body);
        recompute_mass_properties(bodies, coll)?;
        tracing::debug!(collection = ?coll, body = ?body, "added member to pinned collection");
        return Ok(());
    } else {
        let total = world_mass_properties(c);
        let (v_c, w_c) = (c.linear_velocity(), c.angular_velocity());
        let combined = total.combine(&part);
        let com = combined.center_of_mass;

        let v = (v_c * total.mass + v_b * part.mass) / combined.mass;
        let momentum = total.inertia * w_c
            + (total.center_of_mass - com).cross(v_c) * total.mass
            + part.inertia * w_b
            + (part.center_of_mass - com).cross(v_b) * part.mass;
        let w = inverse_or_zero(combined.inertia) * momentum;

        let c = &mut bodies[coll];
        c.set_pose(com, DQuat::IDENTITY);
        c.set_mass_properties(combined.mass, combined.inertia);
        c.write_velocity(v, w);
        c.sleeping = c.sleeping && member_sleeping;
    }

    if let Some(data) = bodies[coll].collection_mut() {
        data.members.push(body);
    }
    attach(bodies, coll, body);
    update_member_transforms(bodies, coll);
    tracing::trace!(collection = ?coll, body = ?body, "added member");
    Ok(())
}

fn attach(bodies: &mut BodySet, coll: BodyHandle, body: BodyHandle) {
    let m = &mut bodies[body];
    m.parent = Some(coll);
    m.sleeping = false;
    m.scratch.reset();
    m.clear_histories();
}

/// Remove `body` from `coll`, restoring it as a free-standing body.
///
/// The removed body receives the collection's rigid velocity at its center of
/// mass. The caller dissolves collections left with one member or fewer.
///
/// # Errors
///
/// [`PhysicsError::NotACollectionMember`] if `body` is not a member; nothing
/// is mutated in that case.
pub fn remove_member(
    bodies: &mut BodySet,
    coll: BodyHandle,
    body: BodyHandle,
) -> Result<(), PhysicsError> {
    let data = collection_data(bodies, coll)?;
    if !data.contains(body) {
        tracing::error!(collection = ?coll, body = ?body, "unmerge of a non-member");
        return Err(PhysicsError::NotACollectionMember {
            body,
            collection: coll,
        });
    }

    let c = &bodies[coll];
    let was_pinned = c.is_pinned();
    let total = world_mass_properties(c);
    let (v_c, w_c) = (c.linear_velocity(), c.angular_velocity());
    let member_vel = c.spatial_velocity(bodies[body].position());
    let part = world_mass_properties(&bodies[body]);

    if let Some(data) = bodies[coll].collection_mut() {
        data.members.retain(|&m| m != body);
        data.internal_pairs.retain(|k| !k.involves(body));
        data.internal_contacts.retain(|c| c.body_a != body && c.body_b != body);
    }

    let m = &mut bodies[body];
    m.parent = None;
    m.transform_b2c = RigidTransform::IDENTITY;
    m.sleeping = false;
    m.scratch.reset();
    m.clear_histories();
    if m.is_pinned() {
        m.write_velocity(DVec3::ZERO, DVec3::ZERO);
    } else {
        m.write_velocity(member_vel, w_c);
    }

    if was_pinned {
        recompute_mass_properties(bodies, coll)?;
    } else {
        let rest = total.subtract(&part);
        let c = &mut bodies[coll];
        if rest.mass > 0.0 {
            let v = v_c + w_c.cross(rest.center_of_mass - total.center_of_mass);
            c.set_pose(rest.center_of_mass, DQuat::IDENTITY);
            c.set_mass_properties(rest.mass, rest.inertia);
            c.write_velocity(v, w_c);
        }
        update_member_transforms(bodies, coll);
    }
    tracing::trace!(collection = ?coll, body = ?body, "removed member");
    Ok(())
}

/// Recompute composite mass properties from scratch over the member list.
///
/// The pinned flag becomes true iff any member is pinned; a pinned
/// collection keeps mass and center of mass only, with zero velocity.
///
/// # Errors
///
/// [`PhysicsError::NotACollection`] if `coll` is a simple body.
pub fn recompute_mass_properties(
    bodies: &mut BodySet,
    coll: BodyHandle,
) -> Result<(), PhysicsError> {
    let members = collection_data(bodies, coll)?.members.clone();
    let mut total = MassProperties::ZERO;
    let mut pinned = false;
    for &m in &members {
        let body = &bodies[m];
        total = total.combine(&world_mass_properties(body));
        pinned |= body.is_pinned();
    }
    if members.is_empty() {
        return Ok(());
    }

    let c = &mut bodies[coll];
    c.set_pose(total.center_of_mass, DQuat::IDENTITY);
    let inertia = if pinned {
        glam::DMat3::ZERO
    } else {
        total.inertia
    };
    c.set_mass_properties(total.mass, inertia);
    c.set_pinned(pinned);
    if pinned && (c.linear_velocity() != DVec3::ZERO || c.angular_velocity() != DVec3::ZERO) {
        tracing::warn!(collection = ?coll, "pinned collection carried velocity, zeroing");
        c.write_velocity(DVec3::ZERO, DVec3::ZERO);
    }
    update_member_transforms(bodies, coll);
    Ok(())
}

/// Re-derive every member's pose in the collection frame
pub fn update_member_transforms(bodies: &mut BodySet, coll: BodyHandle) {
    let Some(data) = bodies.get(coll).and_then(RigidBody::collection) else {
        return;
    };
    let members = data.members.clone();
    let inv = bodies[coll].transform().inverse();
    for m in members {
        let body = &mut bodies[m];
        body.transform_b2c = inv.mul_transform(body.transform());
    }
}

/// Move members to their rigid poses under the collection's current transform
pub fn propagate_member_poses(bodies: &mut BodySet, coll: BodyHandle) {
    let Some(data) = bodies.get(coll).and_then(RigidBody::collection) else {
        return;
    };
    let members = data.members.clone();
    let transform = *bodies[coll].transform();
    for m in members {
        let body = &mut bodies[m];
        let pose = transform.mul_transform(&body.transform_b2c);
        body.set_pose(pose.translation, pose.rotation);
    }
}

/// Give every member the collection's rigid velocity: `v + ω × r`
pub fn apply_velocities_to_members(bodies: &mut BodySet, coll: BodyHandle) {
    let Some(data) = bodies.get(coll).and_then(RigidBody::collection) else {
        return;
    };
    let members = data.members.clone();
    let c = &bodies[coll];
    let (x_c, v_c, w_c) = (c.position(), c.linear_velocity(), c.angular_velocity());
    for m in members {
        let body = &mut bodies[m];
        let r = body.position() - x_c;
        body.write_velocity(v_c + w_c.cross(r), w_c);
    }
}

/// Mark contact-graph edges between members as internal.
///
/// Catches edges that had not yet qualified for merging but now connect two
/// members of the same collection. Returns the number of edges migrated.
pub fn add_incomplete_contacts(
    bodies: &mut BodySet,
    graph: &mut ContactGraph,
    coll: BodyHandle,
) -> usize {
    let Some(data) = bodies.get(coll).and_then(RigidBody::collection) else {
        return 0;
    };
    let mut migrated = Vec::new();
    for &m in &data.members {
        for key in &bodies[m].pair_keys {
            let other = key.other(m);
            if bodies.root_of(other) != coll {
                continue;
            }
            if let Some(pair) = graph.get_mut(key) {
                if !pair.in_collection {
                    pair.in_collection = true;
                    migrated.push(*key);
                }
            }
        }
    }
    if let Some(data) = bodies[coll].collection_mut() {
        for key in &migrated {
            if !data.internal_pairs.contains(key) {
                data.internal_pairs.push(*key);
            }
        }
    }
    migrated.len()
}

/// Rebuild the archived internal contacts from this step's contacts of the
/// collection's internal edges
pub fn fill_internal_body_contacts(
    bodies: &mut BodySet,
    graph: &ContactGraph,
    contacts: &[Contact],
    coll: BodyHandle,
) {
    let Some(data) = bodies.get_mut(coll).and_then(RigidBody::collection_mut) else {
        return;
    };
    data.internal_contacts.clear();
    for key in &data.internal_pairs {
        if let Some(pair) = graph.get(key) {
            data.internal_contacts
                .extend(pair.contacts.iter().filter_map(|&i| contacts.get(i)).cloned());
        }
    }
}

/// Remove every member and delete the collection.
///
/// Returns the released members.
pub fn dissolve(
    bodies: &mut BodySet,
    graph: &mut ContactGraph,
    coll: BodyHandle,
) -> Vec<BodyHandle> {
    let Some(data) = bodies.get(coll).and_then(RigidBody::collection) else {
        return Vec::new();
    };
    let members = data.members.clone();
    let internal = data.internal_pairs.clone();
    for &m in members.iter().rev() {
        if let Err(e) = remove_member(bodies, coll, m) {
            tracing::error!(error = %e, "dissolve failed to release member");
        }
    }
    for key in &internal {
        if let Some(pair) = graph.get_mut(key) {
            pair.in_collection = false;
            pair.motion_history.clear();
        }
    }
    bodies.remove(coll);
    tracing::debug!(collection = ?coll, members = members.len(), "dissolved collection");
    members
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::body::{Activity, BodyBuilder};
    use approx::assert_relative_eq;

    fn ball(set: &mut BodySet, x: DVec3, v: DVec3, mass: f64) -> BodyHandle {
        set.insert(
            BodyBuilder::sphere(0.5)
                .mass(mass)
                .position(x)
                .linear_velocity(v)
                .build()
                .unwrap(),
        )
    }

    #[test]
    fn test_create_and_composite_mass() {
        let mut set = BodySet::new();
        let a = ball(&mut set, DVec3::new(-1.0, 0.0, 0.0), DVec3::ZERO, 1.0);
        let b = ball(&mut set, DVec3::new(1.0, 0.0, 0.0), DVec3::ZERO, 3.0);
        let coll = create_collection(&mut set, a).unwrap();
        add_member(&mut set, coll, b).unwrap();

        let c = &set[coll];
        assert_relative_eq!(c.mass(), 4.0);
        assert_relative_eq!(c.position().x, 0.5, epsilon = 1e-12);
        assert_eq!(c.collection().unwrap().members(), &[a, b]);
        assert_eq!(set[a].activity(), Activity::Merged);
        assert_eq!(set[a].parent(), Some(coll));
    }

    #[test]
    fn test_add_conserves_momentum() {
        let mut set = BodySet::new();
        let a = ball(&mut set, DVec3::ZERO, DVec3::new(2.0, 0.0, 0.0), 1.0);
        let b = ball(&mut set, DVec3::new(0.0, 1.0, 0.0), DVec3::ZERO, 1.0);
        let coll = create_collection(&mut set, a).unwrap();
        add_member(&mut set, coll, b).unwrap();
        let c = &set[coll];
        assert_relative_eq!(c.linear_velocity().x * c.mass(), 2.0, epsilon = 1e-12);
        assert!(c.angular_velocity().length() > 0.0, "Off-center momentum spins the composite");
    }

    #[test]
    fn test_round_trip_rigid_velocities() {
        let mut set = BodySet::new();
        let w = DVec3::new(0.0, 0.0, 0.5);
        let xa = DVec3::new(-0.5, 0.0, 0.0);
        let xb = DVec3::new(0.5, 0.0, 0.0);
        // rigid motion about the origin
        let a = ball(&mut set, xa, DVec3::new(1.0, 0.0, 0.0) + w.cross(xa), 1.0);
        let b = ball(&mut set, xb, DVec3::new(1.0, 0.0, 0.0) + w.cross(xb), 1.0);
        for h in [a, b] {
            let v = set[h].linear_velocity();
            set[h].write_velocity(v, w);
        }
        let before = [(set[a].linear_velocity(), w), (set[b].linear_velocity(), w)];

        let coll = create_collection(&mut set, a).unwrap();
        add_member(&mut set, coll, b).unwrap();
        remove_member(&mut set, coll, b).unwrap();
        remove_member(&mut set, coll, a).unwrap();

        for (h, (v, w)) in [a, b].into_iter().zip(before) {
            assert!((set[h].linear_velocity() - v).length() < 1e-9, "linear velocity of {h:?}");
            assert!((set[h].angular_velocity() - w).length() < 1e-9, "angular velocity of {h:?}");
            assert_eq!(set[h].activity(), Activity::Active);
        }
    }

    #[test]
    fn test_remove_non_member_is_error_without_mutation() {
        let mut set = BodySet::new();
        let a = ball(&mut set, DVec3::ZERO, DVec3::ZERO, 1.0);
        let b = ball(&mut set, DVec3::X, DVec3::ZERO, 1.0);
        let outsider = ball(&mut set, DVec3::Y * 5.0, DVec3::ZERO, 1.0);
        let coll = create_collection(&mut set, a).unwrap();
        add_member(&mut set, coll, b).unwrap();
        let mass = set[coll].mass();

        let err = remove_member(&mut set, coll, outsider).unwrap_err();
        assert_eq!(
            err,
            PhysicsError::NotACollectionMember {
                body: outsider,
                collection: coll
            }
        );
        assert_eq!(set[coll].mass(), mass);
        assert_eq!(set[coll].collection().unwrap().members().len(), 2);
    }

    #[test]
    fn test_incremental_remove_matches_recompute() {
        let mut set = BodySet::new();
        let a = ball(&mut set, DVec3::new(0.0, 0.0, 0.0), DVec3::ZERO, 1.0);
        let b = ball(&mut set, DVec3::new(1.0, 0.0, 0.0), DVec3::ZERO, 2.0);
        let c = ball(&mut set, DVec3::new(0.0, 1.0, 0.5), DVec3::ZERO, 3.0);
        let coll = create_collection(&mut set, a).unwrap();
        add_member(&mut set, coll, b).unwrap();
        add_member(&mut set, coll, c).unwrap();
        remove_member(&mut set, coll, b).unwrap();
        let incremental = (set[coll].mass(), set[coll].position(), set[coll].inertia_body());

        recompute_mass_properties(&mut set, coll).unwrap();
        assert_relative_eq!(incremental.0, set[coll].mass(), epsilon = 1e-12);
        assert!((incremental.1 - set[coll].position()).length() < 1e-12);
        let diff = incremental.2 - set[coll].inertia_body();
        assert!(diff.to_cols_array().iter().all(|x| x.abs() < 1e-9));
    }

    #[test]
    fn test_pinned_member_pins_collection() {
        let mut set = BodySet::new();
        let ground = set.insert(BodyBuilder::sphere(0.5).pinned(true).build().unwrap());
        let a = ball(&mut set, DVec3::new(0.0, 1.0, 0.0), DVec3::new(0.0, -1.0, 0.0), 1.0);
        let coll = create_collection(&mut set, a).unwrap();
        add_member(&mut set, coll, ground).unwrap();
        let c = &set[coll];
        assert!(c.is_pinned());
        assert_eq!(c.inv_mass(), 0.0);
        assert_eq!(c.linear_velocity(), DVec3::ZERO);
        assert_relative_eq!(c.mass(), 1.0 + set[ground].mass());

        // Removing the pinned member recomputes and unpins
        remove_member(&mut set, coll, ground).unwrap();
        assert!(!set[coll].is_pinned());
        assert_relative_eq!(set[coll].inv_mass(), 1.0);
    }

    #[test]
    fn test_poses_follow_collection() {
        let mut set = BodySet::new();
        let a = ball(&mut set, DVec3::ZERO, DVec3::ZERO, 1.0);
        let b = ball(&mut set, DVec3::X, DVec3::ZERO, 1.0);
        let coll = create_collection(&mut set, a).unwrap();
        add_member(&mut set, coll, b).unwrap();
        set[coll].write_velocity(DVec3::new(0.0, 1.0, 0.0), DVec3::new(0.0, 0.0, 1.0));
        set[coll].integrate(0.1);
        propagate_member_poses(&mut set, coll);
        apply_velocities_to_members(&mut set, coll);
        let sep = set[a].position().distance(set[b].position());
        assert_relative_eq!(sep, 1.0, epsilon = 1e-12);
        let r = set[b].position() - set[coll].position();
        let expected = set[coll].linear_velocity() + set[coll].angular_velocity().cross(r);
        assert!((set[b].linear_velocity() - expected).length() < 1e-12);
    }

    #[test]
    fn test_cannot_add_collection_or_self() {
        let mut set = BodySet::new();
        let a = ball(&mut set, DVec3::ZERO, DVec3::ZERO, 1.0);
        let coll = create_collection(&mut set, a).unwrap();
        assert!(matches!(
            add_member(&mut set, coll, coll),
            Err(PhysicsError::CyclicMerge { .. })
        ));
        assert!(matches!(
            add_member(&mut set, coll, a),
            Err(PhysicsError::CyclicMerge { .. })
        ));
    }

    #[test]
    fn test_dissolve_releases_members() {
        let mut set = BodySet::new();
        let mut graph = ContactGraph::new();
        let a = ball(&mut set, DVec3::ZERO, DVec3::ZERO, 1.0);
        let b = ball(&mut set, DVec3::X, DVec3::ZERO, 1.0);
        let coll = create_collection(&mut set, a).unwrap();
        add_member(&mut set, coll, b).unwrap();
        let released = dissolve(&mut set, &mut graph, coll);
        assert_eq!(released.len(), 2);
        assert!(!set.contains(coll));
        assert!(set[a].parent().is_none() && set[b].parent().is_none());
    }
}
