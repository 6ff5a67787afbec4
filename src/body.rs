//! Rigid Bodies
//!
//! A [`RigidBody`] is either a simple body owning its block geometry or a
//! collection owning a list of member bodies (see [`crate::collection`]).
//! Both variants share one capability surface: integrate, apply contact
//! force, kinetic energy, spatial velocity. Callers never downcast.
//!
//! # Invariants
//!
//! - `inv_mass == 0` exactly when the body is pinned; pinned bodies also have a
//!   zero inverse inertia and zero velocity.
//! - The cached world transform and world inverse inertia are re-derived after
//!   every pose mutation.

use glam::{DMat3, DQuat, DVec3};

use crate::collection::CollectionData;
use crate::contact::BodyPairKey;
use crate::error::PhysicsError;
use crate::geometry::{sphere_primitive, tessellate_box, Color, Geometry, Primitive};
use crate::history::History;
use crate::mass_properties::{
    box_mass_properties, sphere_cloud_mass_properties, sphere_mass_properties, MassProperties,
};
use crate::math::{inverse_or_zero, rotate_tensor, RigidTransform};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

// ============================================================================
// Handles and states
// ============================================================================

/// Stable handle into the world's body table.
///
/// The generation guards against reuse of a freed slot.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct BodyHandle {
    index: u32,
    generation: u32,
}

impl BodyHandle {
    /// Placeholder for bodies not yet inserted into a world
    pub const DANGLING: Self = Self {
        index: u32::MAX,
        generation: u32::MAX,
    };

    #[inline]
    pub(crate) const fn new(index: u32, generation: u32) -> Self {
        Self { index, generation }
    }

    /// Slot index
    #[inline]
    #[must_use]
    pub const fn index(self) -> u32 {
        self.index
    }

    /// Slot generation
    #[inline]
    #[must_use]
    pub const fn generation(self) -> u32 {
        self.generation
    }
}

/// Activity label reported per body
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Activity {
    /// Integrated normally, eligible to initiate merges
    Active,
    /// Zero velocity, not integrated, still collision tested
    Sleeping,
    /// Owned by a collection which drives its motion
    Merged,
}

/// Simple body or collection
#[derive(Clone, Debug)]
pub enum BodyKind {
    /// Leaf body with its own block geometry
    Simple(Geometry),
    /// Composite of member bodies
    Collection(CollectionData),
}

/// Per-step solver scratch stored with the body
#[derive(Clone, Copy, Debug, Default)]
pub(crate) struct SolverScratch {
    /// Velocity change accumulated from impulses this step
    pub delta_v: DVec3,
    /// Angular velocity change accumulated from impulses this step
    pub delta_w: DVec3,
    /// Sum of external contact impulses on this leaf (world)
    pub contact_impulse: DVec3,
    /// Sum of external contact angular impulses about this leaf's COM (world)
    pub contact_angular_impulse: DVec3,
    /// Contact force this step in the body frame
    pub contact_force: DVec3,
    /// Contact torque this step in the body frame
    pub contact_torque: DVec3,
    /// Relative motion against the owning collection (members only)
    pub unmerge_metric: f64,
}

impl SolverScratch {
    #[inline]
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

// ============================================================================
// Rigid Body
// ============================================================================

/// Rigid body state
#[derive(Clone, Debug)]
pub struct RigidBody {
    pub(crate) handle: BodyHandle,
    mass: f64,
    inv_mass: f64,
    inertia_body: DMat3,
    inv_inertia_body: DMat3,
    inv_inertia_world: DMat3,
    position: DVec3,
    orientation: DQuat,
    transform: RigidTransform,
    linear_velocity: DVec3,
    angular_velocity: DVec3,
    force: DVec3,
    torque: DVec3,
    pinned: bool,
    ground: bool,
    pub(crate) sleeping: bool,
    restitution: Option<f64>,
    friction: Option<f64>,
    pub(crate) kind: BodyKind,
    pub(crate) parent: Option<BodyHandle>,
    /// Member pose in the owning collection's frame
    pub(crate) transform_b2c: RigidTransform,
    /// Incident body-pair contacts (leaf bodies only)
    pub(crate) pair_keys: Vec<BodyPairKey>,
    pub(crate) scratch: SolverScratch,
    pub(crate) force_history: History<DVec3>,
    pub(crate) torque_history: History<DVec3>,
    pub(crate) motion_history: History<f64>,
    pub(crate) wake_stamp: u64,
    /// Woken by a contact-graph flood since it last fell asleep
    pub(crate) woken: bool,
    initial_pose: (DVec3, DQuat),
}

impl RigidBody {
    fn from_parts(kind: BodyKind, props: &MassProperties, pinned: bool) -> Self {
        let mut body = Self {
            handle: BodyHandle::DANGLING,
            mass: props.mass,
            inv_mass: 0.0,
            inertia_body: props.inertia,
            inv_inertia_body: DMat3::ZERO,
            inv_inertia_world: DMat3::ZERO,
            position: DVec3::ZERO,
            orientation: DQuat::IDENTITY,
            transform: RigidTransform::IDENTITY,
            linear_velocity: DVec3::ZERO,
            angular_velocity: DVec3::ZERO,
            force: DVec3::ZERO,
            torque: DVec3::ZERO,
            pinned,
            ground: false,
            sleeping: false,
            restitution: None,
            friction: None,
            kind,
            parent: None,
            transform_b2c: RigidTransform::IDENTITY,
            pair_keys: Vec::new(),
            scratch: SolverScratch::default(),
            force_history: History::new(0),
            torque_history: History::new(0),
            motion_history: History::new(0),
            wake_stamp: 0,
            woken: false,
            initial_pose: (DVec3::ZERO, DQuat::IDENTITY),
        };
        body.refresh_inverses();
        body
    }

    /// Empty collection body at `position` with identity orientation
    pub(crate) fn new_collection(data: CollectionData, position: DVec3) -> Self {
        let mut body = Self::from_parts(BodyKind::Collection(data), &MassProperties::ZERO, false);
        body.set_pose(position, DQuat::IDENTITY);
        body.initial_pose = (position, DQuat::IDENTITY);
        body
    }

    // ------------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------------

    /// Handle of this body (dangling until inserted into a world)
    #[inline]
    #[must_use]
    pub fn handle(&self) -> BodyHandle {
        self.handle
    }

    /// Linear mass
    #[inline]
    #[must_use]
    pub fn mass(&self) -> f64 {
        self.mass
    }

    /// Inverse linear mass (zero when pinned)
    #[inline]
    #[must_use]
    pub fn inv_mass(&self) -> f64 {
        self.inv_mass
    }

    /// Inertia tensor in the body frame
    #[inline]
    #[must_use]
    pub fn inertia_body(&self) -> DMat3 {
        self.inertia_body
    }

    /// Inertia tensor in world coordinates
    #[must_use]
    pub fn inertia_world(&self) -> DMat3 {
        rotate_tensor(self.orientation, self.inertia_body)
    }

    /// Inverse inertia in world coordinates (zero when pinned)
    #[inline]
    #[must_use]
    pub fn inv_inertia_world(&self) -> DMat3 {
        self.inv_inertia_world
    }

    /// World position of the center of mass
    #[inline]
    #[must_use]
    pub fn position(&self) -> DVec3 {
        self.position
    }

    /// World orientation
    #[inline]
    #[must_use]
    pub fn orientation(&self) -> DQuat {
        self.orientation
    }

    /// Body → world transform
    #[inline]
    #[must_use]
    pub fn transform(&self) -> &RigidTransform {
        &self.transform
    }

    /// Linear velocity
    #[inline]
    #[must_use]
    pub fn linear_velocity(&self) -> DVec3 {
        self.linear_velocity
    }

    /// Angular velocity (world)
    #[inline]
    #[must_use]
    pub fn angular_velocity(&self) -> DVec3 {
        self.angular_velocity
    }

    /// Accumulated force for the current step
    #[inline]
    #[must_use]
    pub fn force(&self) -> DVec3 {
        self.force
    }

    /// Accumulated torque for the current step
    #[inline]
    #[must_use]
    pub fn torque(&self) -> DVec3 {
        self.torque
    }

    /// Immovable body
    #[inline]
    #[must_use]
    pub fn is_pinned(&self) -> bool {
        self.pinned
    }

    /// Ground/plane representation
    #[inline]
    #[must_use]
    pub fn is_ground(&self) -> bool {
        self.ground
    }

    /// Sleeping flag
    #[inline]
    #[must_use]
    pub fn is_sleeping(&self) -> bool {
        self.sleeping
    }

    /// Owning collection, if merged
    #[inline]
    #[must_use]
    pub fn parent(&self) -> Option<BodyHandle> {
        self.parent
    }

    /// Current activity label
    #[must_use]
    pub fn activity(&self) -> Activity {
        if self.parent.is_some() {
            Activity::Merged
        } else if self.sleeping {
            Activity::Sleeping
        } else {
            Activity::Active
        }
    }

    /// Restitution override
    #[inline]
    #[must_use]
    pub fn restitution(&self) -> Option<f64> {
        self.restitution
    }

    /// Friction override
    #[inline]
    #[must_use]
    pub fn friction(&self) -> Option<f64> {
        self.friction
    }

    /// True for collection bodies
    #[inline]
    #[must_use]
    pub fn is_collection(&self) -> bool {
        matches!(self.kind, BodyKind::Collection(_))
    }

    /// Block geometry of a simple body
    #[must_use]
    pub fn geometry(&self) -> Option<&Geometry> {
        match &self.kind {
            BodyKind::Simple(g) => Some(g),
            BodyKind::Collection(_) => None,
        }
    }

    /// Collection data of a collection body
    #[must_use]
    pub fn collection(&self) -> Option<&CollectionData> {
        match &self.kind {
            BodyKind::Simple(_) => None,
            BodyKind::Collection(c) => Some(c),
        }
    }

    pub(crate) fn collection_mut(&mut self) -> Option<&mut CollectionData> {
        match &mut self.kind {
            BodyKind::Simple(_) => None,
            BodyKind::Collection(c) => Some(c),
        }
    }

    /// Incident body-pair contact keys
    #[must_use]
    pub fn pair_keys(&self) -> &[BodyPairKey] {
        &self.pair_keys
    }

    /// Force applied by contacts during the last solve, body frame
    #[must_use]
    pub fn contact_force(&self) -> DVec3 {
        self.scratch.contact_force
    }

    /// Torque applied by contacts during the last solve, body frame
    #[must_use]
    pub fn contact_torque(&self) -> DVec3 {
        self.scratch.contact_torque
    }

    // ------------------------------------------------------------------------
    // Capability surface
    // ------------------------------------------------------------------------

    /// Symplectic Euler step: velocities from forces, then pose from
    /// velocities. Forces are cleared afterwards. Pinned bodies only clear.
    pub fn integrate(&mut self, dt: f64) {
        if !self.pinned {
            self.linear_velocity += self.force * (self.inv_mass * dt);
            self.angular_velocity += self.inv_inertia_world * self.torque * dt;

            self.position += self.linear_velocity * dt;
            let spin = DQuat::from_scaled_axis(self.angular_velocity * dt);
            self.orientation = (spin * self.orientation).normalize();
            self.refresh_transform();
        }
        self.clear_forces();
    }

    /// Accumulate a force applied at a world point
    #[inline]
    pub fn apply_contact_force(&mut self, point_world: DVec3, force: DVec3) {
        self.force += force;
        self.torque += (point_world - self.position).cross(force);
    }

    /// Accumulate a force through the center of mass
    #[inline]
    pub fn apply_force(&mut self, force: DVec3) {
        self.force += force;
    }

    /// `½·m·|v|² + ½·ωᵀ·I·ω`
    #[must_use]
    pub fn kinetic_energy(&self) -> f64 {
        let w = self.angular_velocity;
        0.5 * self.mass * self.linear_velocity.length_squared()
            + 0.5 * w.dot(self.inertia_world() * w)
    }

    /// Kinetic energy per unit mass
    #[must_use]
    pub fn motion_metric(&self) -> f64 {
        if self.mass > 0.0 {
            self.kinetic_energy() / self.mass
        } else {
            0.0
        }
    }

    /// Velocity of a world point rigidly attached to this body
    #[inline]
    #[must_use]
    pub fn spatial_velocity(&self, point_world: DVec3) -> DVec3 {
        self.linear_velocity + self.angular_velocity.cross(point_world - self.position)
    }

    /// True when `point_world` is inside one of this body's primitives
    #[must_use]
    pub fn contains_point(&self, point_world: DVec3) -> bool {
        self.geometry()
            .is_some_and(|g| g.contains_point(&self.transform, point_world))
    }

    // ------------------------------------------------------------------------
    // Mutation
    // ------------------------------------------------------------------------

    /// Set velocities. Pinned bodies keep zero velocity.
    pub fn set_velocity(&mut self, linear: DVec3, angular: DVec3) {
        if self.pinned && (linear != DVec3::ZERO || angular != DVec3::ZERO) {
            tracing::warn!(body = ?self.handle, "ignoring non-zero velocity on pinned body");
            return;
        }
        self.linear_velocity = linear;
        self.angular_velocity = angular;
    }

    /// Set world pose and re-derive transforms
    pub fn set_pose(&mut self, position: DVec3, orientation: DQuat) {
        self.position = position;
        self.orientation = orientation.normalize();
        self.refresh_transform();
    }

    /// Return to the construction pose with zero velocity
    pub fn reset(&mut self) {
        let (p, q) = self.initial_pose;
        self.set_pose(p, q);
        self.linear_velocity = DVec3::ZERO;
        self.angular_velocity = DVec3::ZERO;
        self.sleeping = false;
        self.woken = false;
        self.clear_forces();
        self.clear_histories();
    }

    pub(crate) fn clear_forces(&mut self) {
        self.force = DVec3::ZERO;
        self.torque = DVec3::ZERO;
    }

    pub(crate) fn clear_histories(&mut self) {
        self.force_history.clear();
        self.torque_history.clear();
        self.motion_history.clear();
    }

    pub(crate) fn set_history_window(&mut self, window: usize) {
        self.force_history.set_capacity(window);
        self.torque_history.set_capacity(window);
        self.motion_history.set_capacity(window);
    }

    pub(crate) fn set_pinned(&mut self, pinned: bool) {
        self.pinned = pinned;
        if pinned {
            self.linear_velocity = DVec3::ZERO;
            self.angular_velocity = DVec3::ZERO;
        }
        self.refresh_inverses();
    }

    /// Replace mass and body-frame inertia
    pub(crate) fn set_mass_properties(&mut self, mass: f64, inertia_body: DMat3) {
        self.mass = mass;
        self.inertia_body = inertia_body;
        self.refresh_inverses();
    }

    /// Overwrite velocities without the pinned check (collection transfers)
    #[inline]
    pub(crate) fn write_velocity(&mut self, linear: DVec3, angular: DVec3) {
        self.linear_velocity = linear;
        self.angular_velocity = angular;
    }

    fn refresh_inverses(&mut self) {
        if self.pinned || self.mass <= 0.0 {
            self.inv_mass = 0.0;
            self.inv_inertia_body = DMat3::ZERO;
        } else {
            self.inv_mass = 1.0 / self.mass;
            self.inv_inertia_body = inverse_or_zero(self.inertia_body);
        }
        self.inv_inertia_world = rotate_tensor(self.orientation, self.inv_inertia_body);
    }

    fn refresh_transform(&mut self) {
        self.transform = RigidTransform::new(self.orientation, self.position);
        self.inv_inertia_world = rotate_tensor(self.orientation, self.inv_inertia_body);
    }

    pub(crate) fn geometry_mut(&mut self) -> Option<&mut Geometry> {
        match &mut self.kind {
            BodyKind::Simple(g) => Some(g),
            BodyKind::Collection(_) => None,
        }
    }
}

// ============================================================================
// Builder
// ============================================================================

#[derive(Clone, Debug)]
enum Shape {
    Cuboid(DVec3),
    Sphere(f64),
    Primitives(Vec<Primitive>),
}

/// Construction parameters for a simple body.
///
/// ```
/// use glam::DVec3;
/// use rigid_merge::BodyBuilder;
///
/// let body = BodyBuilder::sphere(0.5)
///     .mass(1.0)
///     .position(DVec3::new(0.0, 2.0, 0.0))
///     .build()
///     .unwrap();
/// assert_eq!(body.mass(), 1.0);
/// ```
#[derive(Clone, Debug)]
pub struct BodyBuilder {
    shape: Shape,
    density: f64,
    mass: Option<f64>,
    inertia: Option<DMat3>,
    position: DVec3,
    orientation: DQuat,
    linear_velocity: DVec3,
    angular_velocity: DVec3,
    pinned: Option<bool>,
    ground: bool,
    restitution: Option<f64>,
    friction: Option<f64>,
    color: Color,
}

impl BodyBuilder {
    fn with_shape(shape: Shape) -> Self {
        Self {
            shape,
            density: 1.0,
            mass: None,
            inertia: None,
            position: DVec3::ZERO,
            orientation: DQuat::IDENTITY,
            linear_velocity: DVec3::ZERO,
            angular_velocity: DVec3::ZERO,
            pinned: None,
            ground: false,
            restitution: None,
            friction: None,
            color: Color::GRAY,
        }
    }

    /// Box archetype with full side lengths `size`
    #[must_use]
    pub fn cuboid(size: DVec3) -> Self {
        Self::with_shape(Shape::Cuboid(size))
    }

    /// Sphere archetype
    #[must_use]
    pub fn sphere(radius: f64) -> Self {
        Self::with_shape(Shape::Sphere(radius))
    }

    /// Arbitrary primitives given in the builder's local frame.
    ///
    /// The body origin is moved to the primitives' center of mass. Without an
    /// explicit [`pinned`](Self::pinned) flag the body is pinned iff every
    /// primitive is fixed material.
    #[must_use]
    pub fn from_primitives(primitives: Vec<Primitive>) -> Self {
        Self::with_shape(Shape::Primitives(primitives))
    }

    /// Density used when no explicit mass is given (default 1)
    #[must_use]
    pub fn density(mut self, density: f64) -> Self {
        self.density = density;
        self
    }

    /// Explicit linear mass
    #[must_use]
    pub fn mass(mut self, mass: f64) -> Self {
        self.mass = Some(mass);
        self
    }

    /// Explicit body-frame inertia tensor about the center of mass
    #[must_use]
    pub fn inertia(mut self, inertia: DMat3) -> Self {
        self.inertia = Some(inertia);
        self
    }

    /// Initial world position
    #[must_use]
    pub fn position(mut self, position: DVec3) -> Self {
        self.position = position;
        self
    }

    /// Initial orientation
    #[must_use]
    pub fn orientation(mut self, orientation: DQuat) -> Self {
        self.orientation = orientation;
        self
    }

    /// Initial linear velocity
    #[must_use]
    pub fn linear_velocity(mut self, v: DVec3) -> Self {
        self.linear_velocity = v;
        self
    }

    /// Initial angular velocity
    #[must_use]
    pub fn angular_velocity(mut self, w: DVec3) -> Self {
        self.angular_velocity = w;
        self
    }

    /// Pinned (immovable) flag
    #[must_use]
    pub fn pinned(mut self, pinned: bool) -> Self {
        self.pinned = Some(pinned);
        self
    }

    /// Mark as the ground/plane representation (implies pinned)
    #[must_use]
    pub fn ground(mut self, ground: bool) -> Self {
        self.ground = ground;
        self
    }

    /// Per-body restitution override
    #[must_use]
    pub fn restitution(mut self, restitution: f64) -> Self {
        self.restitution = Some(restitution);
        self
    }

    /// Per-body friction override
    #[must_use]
    pub fn friction(mut self, friction: f64) -> Self {
        self.friction = Some(friction);
        self
    }

    /// Material color for archetype primitives
    #[must_use]
    pub fn color(mut self, color: Color) -> Self {
        self.color = color;
        self
    }

    /// Build the body.
    ///
    /// # Errors
    ///
    /// [`PhysicsError::MissingGeometry`] when the shape yields no primitives,
    /// [`PhysicsError::NonPositiveMass`] when the mass is not positive,
    /// [`PhysicsError::InvalidMaterial`] for a negative or non-finite friction
    /// or a restitution outside `[0, 1]`.
    pub fn build(self) -> Result<RigidBody, PhysicsError> {
        if let Some(value) = self.friction.filter(|f| !(f.is_finite() && *f >= 0.0)) {
            tracing::error!(value, "rejecting body with invalid friction");
            return Err(PhysicsError::InvalidMaterial {
                property: "friction",
                value,
            });
        }
        if let Some(value) = self.restitution.filter(|e| !(0.0..=1.0).contains(e)) {
            tracing::error!(value, "rejecting body with invalid restitution");
            return Err(PhysicsError::InvalidMaterial {
                property: "restitution",
                value,
            });
        }
        let (primitives, props, offset) = match self.shape {
            Shape::Cuboid(size) => {
                let props = box_mass_properties(size, self.density);
                (tessellate_box(size, self.color), props, DVec3::ZERO)
            }
            Shape::Sphere(radius) => {
                let props = sphere_mass_properties(radius, self.density);
                (vec![sphere_primitive(radius, self.color)], props, DVec3::ZERO)
            }
            Shape::Primitives(mut primitives) => {
                let spheres: Vec<(DVec3, f64)> =
                    primitives.iter().map(|p| (p.center, p.radius)).collect();
                let volume: f64 = spheres
                    .iter()
                    .map(|(_, r)| 4.0 / 3.0 * core::f64::consts::PI * r * r * r)
                    .sum();
                let props = sphere_cloud_mass_properties(&spheres, volume * self.density)
                    .ok_or(PhysicsError::MissingGeometry)?;
                let com = props.center_of_mass;
                for p in &mut primitives {
                    p.center -= com;
                }
                (primitives, props, com)
            }
        };

        let mass = self.mass.unwrap_or(props.mass);
        if !(mass.is_finite() && mass > 0.0) {
            tracing::error!(mass, "rejecting body with non-positive mass");
            return Err(PhysicsError::NonPositiveMass { mass });
        }
        let props = props.with_mass(mass);
        let inertia = self.inertia.unwrap_or(props.inertia);

        let geometry = Geometry::new(primitives).ok_or(PhysicsError::MissingGeometry)?;
        let pinned = self.ground || self.pinned.unwrap_or_else(|| geometry.is_all_fixed_material());

        let props = MassProperties {
            mass,
            center_of_mass: DVec3::ZERO,
            inertia,
        };
        let mut body = RigidBody::from_parts(BodyKind::Simple(geometry), &props, pinned);
        body.ground = self.ground;
        body.restitution = self.restitution;
        body.friction = self.friction;

        let position = self.position + self.orientation * offset;
        body.set_pose(position, self.orientation);
        body.initial_pose = (position, body.orientation);
        body.set_velocity(self.linear_velocity, self.angular_velocity);
        Ok(body)
    }
}

// ============================================================================
// Tests
// ============================================================================
