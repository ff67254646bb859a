//! A minimal sphere-only collision engine.
//!
//! Serves as the reference implementation of [`CollisionWorld`]: every
//! primitive is a sphere, bodies are point masses with linear drag, and
//! solid contacts are resolved by pushing the body back out. It is enough
//! to run the arena headless in tests, demos and benchmarks.

use crate::collision::{ColliderToggle, CollisionWorld, ContactEvent, ContactKind, OverlapQuery};
use crate::components::{ColliderHandle, ColliderTag};
use glam::{Quat, Vec3};

/// Slack used when deciding whether two spheres still touch.
const CONTACT_EPSILON: f32 = 1e-4;

/// A static (or source-driven) sphere.
#[derive(Debug, Clone)]
pub struct SphereCollider {
    pub handle: ColliderHandle,
    pub center: Vec3,
    pub radius: f32,
    /// Distance along the owner's up axis from the harvest point to the
    /// center, used by `place_collider`.
    pub lift: f32,
    pub tag: ColliderTag,
    /// Triggers report contacts but never push bodies.
    pub trigger: bool,
    pub enabled: bool,
}

/// A dynamic sphere driven by forces.
#[derive(Debug, Clone)]
pub struct SphereBody {
    pub handle: ColliderHandle,
    pub position: Vec3,
    pub rotation: Quat,
    pub velocity: Vec3,
    pub radius: f32,
    pub mass: f32,
    force: Vec3,
    touching: Vec<ColliderHandle>,
}

/// Sphere collision world with deterministic iteration order.
#[derive(Debug, Clone)]
pub struct SphereWorld {
    colliders: Vec<SphereCollider>,
    bodies: Vec<SphereBody>,
    /// Fraction of velocity lost per second.
    pub linear_drag: f32,
    next_handle: u64,
}

impl Default for SphereWorld {
    fn default() -> Self {
        Self::new()
    }
}

impl SphereWorld {
    pub fn new() -> Self {
        Self {
            colliders: Vec::new(),
            bodies: Vec::new(),
            linear_drag: 2.0,
            next_handle: 1,
        }
    }

    fn allocate(&mut self) -> ColliderHandle {
        let handle = ColliderHandle(self.next_handle);
        self.next_handle += 1;
        handle
    }

    /// Adds a sphere and returns its handle.
    pub fn add_collider(&mut self, center: Vec3, radius: f32, tag: ColliderTag, trigger: bool) -> ColliderHandle {
        let handle = self.allocate();
        self.colliders.push(SphereCollider {
            handle,
            center,
            radius,
            lift: 0.0,
            tag,
            trigger,
            enabled: true,
        });
        handle
    }

    /// Adds the trigger/petal pair of a flower with its harvest point at
    /// `position`. Returns `(nectar, petal)`.
    pub fn add_flower(&mut self, position: Vec3, up: Vec3) -> (ColliderHandle, ColliderHandle) {
        let up = up.normalize_or_zero();
        let nectar = self.add_collider(position, 0.02, ColliderTag::Nectar, true);
        let petal_lift = -0.06;
        let petal = self.add_collider(position + up * petal_lift, 0.05, ColliderTag::Petal, false);
        if let Some(c) = self.collider_mut(petal) {
            c.lift = petal_lift;
        }
        (nectar, petal)
    }

    /// Adds a forager body and returns its handle.
    pub fn add_body(&mut self, position: Vec3, radius: f32, mass: f32) -> ColliderHandle {
        let handle = self.allocate();
        self.bodies.push(SphereBody {
            handle,
            position,
            rotation: Quat::IDENTITY,
            velocity: Vec3::ZERO,
            radius,
            mass: mass.max(f32::EPSILON),
            force: Vec3::ZERO,
            touching: Vec::new(),
        });
        handle
    }

    pub fn collider(&self, handle: ColliderHandle) -> Option<&SphereCollider> {
        self.colliders.iter().find(|c| c.handle == handle)
    }

    fn collider_mut(&mut self, handle: ColliderHandle) -> Option<&mut SphereCollider> {
        self.colliders.iter_mut().find(|c| c.handle == handle)
    }

    pub fn body(&self, handle: ColliderHandle) -> Option<&SphereBody> {
        self.bodies.iter().find(|b| b.handle == handle)
    }

    fn body_mut(&mut self, handle: ColliderHandle) -> Option<&mut SphereBody> {
        self.bodies.iter_mut().find(|b| b.handle == handle)
    }

    pub fn is_enabled(&self, handle: ColliderHandle) -> bool {
        self.collider(handle).is_some_and(|c| c.enabled)
    }
}

impl ColliderToggle for SphereWorld {
    fn set_collider_enabled(&mut self, handle: ColliderHandle, enabled: bool) {
        if let Some(c) = self.collider_mut(handle) {
            c.enabled = enabled;
        }
    }
}

impl OverlapQuery for SphereWorld {
    fn overlap_sphere(&self, center: Vec3, radius: f32) -> Vec<ColliderHandle> {
        let colliders = self
            .colliders
            .iter()
            .filter(|c| c.enabled && c.center.distance(center) <= c.radius + radius)
            .map(|c| c.handle);
        let bodies = self
            .bodies
            .iter()
            .filter(|b| b.position.distance(center) <= b.radius + radius)
            .map(|b| b.handle);
        colliders.chain(bodies).collect()
    }
}

impl CollisionWorld for SphereWorld {
    fn closest_point(&self, handle: ColliderHandle, point: Vec3) -> Option<Vec3> {
        let c = self.collider(handle).filter(|c| c.enabled)?;
        let to_point = point - c.center;
        if to_point.length() <= c.radius {
            Some(point)
        } else {
            Some(c.center + to_point.normalize_or_zero() * c.radius)
        }
    }

    fn place_collider(&mut self, handle: ColliderHandle, position: Vec3, up: Vec3) {
        if let Some(c) = self.collider_mut(handle) {
            c.center = position + up.normalize_or_zero() * c.lift;
        }
    }

    fn apply_force(&mut self, body: ColliderHandle, force: Vec3) {
        if let Some(b) = self.body_mut(body) {
            b.force += force;
        }
    }

    fn set_body_pose(&mut self, body: ColliderHandle, position: Vec3, rotation: Quat) {
        if let Some(b) = self.body_mut(body) {
            b.position = position;
            b.rotation = rotation;
        }
    }

    fn body_position(&self, body: ColliderHandle) -> Option<Vec3> {
        self.body(body).map(|b| b.position)
    }

    fn halt_body(&mut self, body: ColliderHandle) {
        if let Some(b) = self.body_mut(body) {
            b.velocity = Vec3::ZERO;
            b.force = Vec3::ZERO;
        }
    }

    fn advance(&mut self, dt: f32, contacts: &mut Vec<ContactEvent>) {
        let drag = 1.0 / (1.0 + self.linear_drag * dt);
        let colliders = &self.colliders;

        for body in &mut self.bodies {
            body.velocity += body.force / body.mass * dt;
            body.velocity *= drag;
            body.position += body.velocity * dt;
            body.force = Vec3::ZERO;

            // Push out of solid spheres.
            for c in colliders.iter().filter(|c| c.enabled && !c.trigger) {
                let offset = body.position - c.center;
                let reach = c.radius + body.radius;
                let dist = offset.length();
                if dist < reach {
                    let normal = if dist > f32::EPSILON { offset / dist } else { Vec3::Y };
                    body.position = c.center + normal * reach;
                    let inward = body.velocity.dot(normal);
                    if inward < 0.0 {
                        body.velocity -= normal * inward;
                    }
                }
            }

            let mut touching = Vec::new();
            for c in colliders.iter().filter(|c| c.enabled) {
                if body.position.distance(c.center) <= c.radius + body.radius + CONTACT_EPSILON {
                    let kind = if body.touching.contains(&c.handle) {
                        ContactKind::Stay
                    } else {
                        ContactKind::Enter
                    };
                    contacts.push(ContactEvent {
                        body: body.handle,
                        collider: c.handle,
                        tag: c.tag,
                        kind,
                    });
                    touching.push(c.handle);
                }
            }
            body.touching = touching;
        }
    }
}
