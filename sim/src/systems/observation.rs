//! Observation encoding for the decision component.
//!
//! Layout of the 10 values:
//!
//! | Index | Value |
//! |-------|-------|
//! | 0..4  | agent rotation quaternion (x, y, z, w) |
//! | 4..7  | unit vector from beak tip to the target's harvest point |
//! | 7     | dot(to-target, -target up) |
//! | 8     | dot(beak forward, -target up) |
//! | 9     | beak tip to target distance / area diameter |
//!
//! Without a target every value is zero.

use crate::components::*;
use crate::config::SimConfig;
use bevy_ecs::prelude::*;
use glam::{Quat, Vec3};

/// Encodes one observation. Zero-length vectors normalise to zero.
pub fn encode(
    rotation: Quat,
    beak_tip: Vec3,
    beak_forward: Vec3,
    target: Option<&NectarSource>,
    area_diameter: f32,
) -> Observation {
    let Some(target) = target else {
        return Observation::default();
    };

    let q = rotation.normalize();
    let to_target = target.position - beak_tip;
    let direction = to_target.normalize_or_zero();
    let approach = -target.up.normalize_or_zero();
    let distance = if area_diameter > 0.0 {
        to_target.length() / area_diameter
    } else {
        to_target.length()
    };

    Observation([
        q.x,
        q.y,
        q.z,
        q.w,
        direction.x,
        direction.y,
        direction.z,
        direction.dot(approach),
        beak_forward.normalize_or_zero().dot(approach),
        distance,
    ])
}

/// System that encodes every forager's observation at the end of a tick.
///
/// ## Data Access
/// - Reads: SimConfig, Pose, Beak, NearestTarget, NectarSource
/// - Writes: LatestObservation
pub fn observation_system(
    config: Res<SimConfig>,
    sources: Query<&NectarSource>,
    mut agents: Query<(&Pose, &Beak, &NearestTarget, &mut LatestObservation)>,
) {
    for (pose, beak, target, mut latest) in agents.iter_mut() {
        let source = target.0.and_then(|e| sources.get(e).ok());
        latest.0 = encode(pose.rotation, beak.tip(pose), beak.forward(pose), source, config.area_diameter);
    }
}
