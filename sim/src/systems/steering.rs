//! Steering - turns actions into body forces and orientation, then lets
//! the collision engine integrate the tick.

use crate::collision::{CollisionBackend, ContactQueue};
use crate::components::*;
use crate::config::SimConfig;
use bevy_ecs::prelude::*;
use glam::{EulerRot, Quat, Vec3};

/// Resource containing the delta time for the current tick.
#[derive(Resource, Default)]
pub struct DeltaTime(pub f32);

/// Moves `current` towards `target` by at most `max_delta`.
pub fn move_towards(current: f32, target: f32, max_delta: f32) -> f32 {
    let diff = target - current;
    if diff.abs() <= max_delta {
        target
    } else {
        current + diff.signum() * max_delta
    }
}

/// Wraps an angle in degrees to `(-180, 180]`.
fn wrap_degrees(angle: f32) -> f32 {
    let wrapped = angle.rem_euclid(360.0);
    if wrapped > 180.0 {
        wrapped - 360.0
    } else {
        wrapped
    }
}

/// System that applies each forager's pending action.
///
/// Held manual input takes precedence and is mapped through
/// [`heuristic_action`] with the current rotation. Movement becomes a force
/// on the body. Pitch and yaw inputs are smoothed and integrated; pitch is
/// clamped, roll is always zero. Frozen foragers and foragers without an
/// action are skipped.
///
/// ## Data Access
/// - Reads: DeltaTime, SimConfig, Forager, BodyHandle, PendingAction, ManualControl
/// - Writes: CollisionBackend, Pose, Steering
pub fn steering_system(
    dt: Res<DeltaTime>,
    config: Res<SimConfig>,
    mut backend: ResMut<CollisionBackend>,
    mut query: Query<(
        &Forager,
        &BodyHandle,
        &PendingAction,
        Option<&ManualControl>,
        &mut Pose,
        &mut Steering,
    )>,
) {
    let delta = dt.0;
    let steer = &config.steering;

    for (forager, body, pending, manual, mut pose, mut steering) in query.iter_mut() {
        if forager.frozen {
            continue;
        }
        let action = match manual.and_then(|m| m.0) {
            Some(input) => heuristic_action(input, pose.rotation),
            None => match pending.0 {
                Some(action) => action.sanitized(),
                None => continue,
            },
        };

        backend.apply_force(body.0, action.movement() * steer.move_force);

        let step = steer.smoothing_rate * delta;
        steering.smooth_pitch = move_towards(steering.smooth_pitch, action.pitch(), step);
        steering.smooth_yaw = move_towards(steering.smooth_yaw, action.yaw(), step);

        let (yaw, pitch, _) = pose.rotation.to_euler(EulerRot::YXZ);
        let pitch = wrap_degrees(pitch.to_degrees() + steering.smooth_pitch * delta * steer.pitch_speed);
        let pitch = pitch.clamp(-steer.max_pitch_deg, steer.max_pitch_deg);
        let yaw = yaw.to_degrees() + steering.smooth_yaw * delta * steer.yaw_speed;

        pose.rotation = Quat::from_euler(EulerRot::YXZ, yaw.to_radians(), pitch.to_radians(), 0.0);
    }
}

/// System that hands orientations to the engine, integrates one tick and
/// reads positions back. Contacts land in the [`ContactQueue`].
///
/// ## Data Access
/// - Reads: DeltaTime, BodyHandle
/// - Writes: CollisionBackend, ContactQueue, Pose
pub fn physics_step_system(
    dt: Res<DeltaTime>,
    mut backend: ResMut<CollisionBackend>,
    mut contacts: ResMut<ContactQueue>,
    mut query: Query<(&BodyHandle, &mut Pose)>,
) {
    for (body, pose) in query.iter() {
        backend.set_body_pose(body.0, pose.position, pose.rotation);
    }

    backend.advance(dt.0, &mut contacts.0);

    for (body, mut pose) in query.iter_mut() {
        if let Some(position) = backend.body_position(body.0) {
            pose.position = position;
        }
    }
}

/// Maps manual input to an action for a forager with `rotation`.
pub fn heuristic_action(input: ManualInput, rotation: Quat) -> Action {
    let combined = rotation * Vec3::Z * input.forward
        + rotation * Vec3::X * input.right
        + rotation * Vec3::Y * input.up;
    let movement = combined.normalize_or_zero();
    Action([movement.x, movement.y, movement.z, input.pitch, input.yaw]).sanitized()
}
