//! Contracts with the external collision/physics engine.
//!
//! The simulation never integrates rigid bodies or tests geometry itself.
//! It talks to whatever engine hosts it through the traits below, and
//! consumes the engine's contacts through a per-tick [`ContactQueue`].

use crate::components::{ColliderHandle, ColliderTag};
use bevy_ecs::prelude::*;
use glam::{Quat, Vec3};
use serde::{Deserialize, Serialize};
use std::ops::{Deref, DerefMut};

/// Enables or disables a single collision primitive.
pub trait ColliderToggle {
    fn set_collider_enabled(&mut self, handle: ColliderHandle, enabled: bool);
}

/// Sphere overlap test against every enabled primitive.
pub trait OverlapQuery {
    fn overlap_sphere(&self, center: Vec3, radius: f32) -> Vec<ColliderHandle>;
}

/// Full engine contract used by the simulation systems.
pub trait CollisionWorld: ColliderToggle + OverlapQuery + Send + Sync {
    /// Closest point on the primitive to `point`, or `None` if the handle
    /// is unknown or disabled.
    fn closest_point(&self, handle: ColliderHandle, point: Vec3) -> Option<Vec3>;

    /// Moves a source-owned primitive to follow its source's harvest pose.
    fn place_collider(&mut self, handle: ColliderHandle, position: Vec3, up: Vec3);

    /// Accumulates a force on a body for the next `advance`.
    fn apply_force(&mut self, body: ColliderHandle, force: Vec3);

    /// Teleports a body (or just re-orients it when the position is unchanged).
    fn set_body_pose(&mut self, body: ColliderHandle, position: Vec3, rotation: Quat);

    fn body_position(&self, body: ColliderHandle) -> Option<Vec3>;

    /// Clears a body's velocity and pending forces.
    fn halt_body(&mut self, body: ColliderHandle);

    /// Integrates one fixed tick and appends the contacts it produced.
    fn advance(&mut self, dt: f32, contacts: &mut Vec<ContactEvent>);
}

/// Whether a contact just began or persists from the previous tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ContactKind {
    Enter,
    Stay,
}

/// One contact between a forager body and another primitive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContactEvent {
    /// The forager's body.
    pub body: ColliderHandle,
    /// The primitive it touches.
    pub collider: ColliderHandle,
    pub tag: ColliderTag,
    pub kind: ContactKind,
}

/// Contacts waiting to be processed this tick, in arrival order.
#[derive(Resource, Debug, Default)]
pub struct ContactQueue(pub Vec<ContactEvent>);

impl ContactQueue {
    pub fn push(&mut self, event: ContactEvent) {
        self.0.push(event);
    }

    pub fn drain(&mut self) -> std::vec::Drain<'_, ContactEvent> {
        self.0.drain(..)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Resource wrapper owning the engine behind a trait object.
#[derive(Resource)]
pub struct CollisionBackend(pub Box<dyn CollisionWorld>);

impl CollisionBackend {
    pub fn new(world: impl CollisionWorld + 'static) -> Self {
        Self(Box::new(world))
    }
}

impl Deref for CollisionBackend {
    type Target = dyn CollisionWorld;

    fn deref(&self) -> &Self::Target {
        self.0.as_ref()
    }
}

impl DerefMut for CollisionBackend {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.0.as_mut()
    }
}
