//! Safe spawn placement.
//!
//! Draws candidate poses until one has nothing within the probe radius.
//! Anchored candidates hover in front of a random source; free candidates
//! float somewhere above the area.

use crate::collision::OverlapQuery;
use crate::components::*;
use crate::config::SpawnConfig;
use crate::error::SimError;
use glam::{EulerRot, Quat, Vec3};
use rand::Rng;
use tracing::warn;

/// Uniform draw from an inclusive `[lo, hi]` range (bounds may be swapped).
fn uniform<R: Rng>(rng: &mut R, range: [f32; 2]) -> f32 {
    let (lo, hi) = if range[0] <= range[1] { (range[0], range[1]) } else { (range[1], range[0]) };
    rng.random_range(lo..=hi)
}

/// One candidate pose in front of `source`, looking at its harvest point.
fn anchored_candidate<R: Rng>(source: &NectarSource, spawn: &SpawnConfig, rng: &mut R) -> Pose {
    let distance = uniform(rng, spawn.anchor_distance);
    let position = source.position + source.up.normalize_or_zero() * distance;
    let rotation = look_rotation(source.position - position, Vec3::Y);
    Pose::new(position, rotation)
}

/// One free-floating candidate pose above `origin`.
fn free_candidate<R: Rng>(origin: Vec3, spawn: &SpawnConfig, rng: &mut R) -> Pose {
    let height = uniform(rng, spawn.height);
    let radius = uniform(rng, spawn.radius);
    let heading = uniform(rng, [-180.0, 180.0]).to_radians();
    let position = origin + Vec3::Y * height + (Quat::from_rotation_y(heading) * Vec3::Z) * radius;

    let pitch_limit = spawn.max_pitch_deg.abs();
    let pitch = uniform(rng, [-pitch_limit, pitch_limit]).to_radians();
    let yaw = uniform(rng, [-180.0, 180.0]).to_radians();
    Pose::new(position, Quat::from_euler(EulerRot::YXZ, yaw, pitch, 0.0))
}

/// Searches for a collision-free spawn pose.
///
/// `sources` is the registry's source list in discovery order; anchored
/// placement picks one of them uniformly per attempt. `ignore` is left
/// out of the overlap result (the agent's own body). Fails with
/// [`SimError::NoSources`] when anchoring in an empty area and with
/// [`SimError::PlacementExhausted`] once `max_attempts` candidates were
/// all blocked.
pub fn find_safe_pose<Q, R>(
    anchored: bool,
    sources: &[&NectarSource],
    origin: Vec3,
    spawn: &SpawnConfig,
    overlap: &Q,
    ignore: Option<ColliderHandle>,
    rng: &mut R,
) -> Result<Pose, SimError>
where
    Q: OverlapQuery + ?Sized,
    R: Rng,
{
    if anchored && sources.is_empty() {
        return Err(SimError::NoSources);
    }

    for _ in 0..spawn.max_attempts {
        let candidate = if anchored {
            let source = sources[rng.random_range(0..sources.len())];
            anchored_candidate(source, spawn, rng)
        } else {
            free_candidate(origin, spawn, rng)
        };

        let blocked = overlap
            .overlap_sphere(candidate.position, spawn.probe_radius)
            .into_iter()
            .any(|hit| Some(hit) != ignore);
        if !blocked {
            return Ok(candidate);
        }
    }

    warn!(attempts = spawn.max_attempts, anchored, "Safe placement exhausted");
    Err(SimError::PlacementExhausted {
        attempts: spawn.max_attempts,
    })
}
