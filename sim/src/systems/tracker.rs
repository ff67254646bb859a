//! Nearest-target tracking.
//!
//! A forager keeps a non-owning reference to the closest source that
//! still has nectar. The reference is only recomputed when it goes stale
//! (its source emptied), when feeding empties a source, or at episode
//! start.
//!
//! ## Parallel Feature
//!
//! With `--features parallel` the recompute for stale foragers runs on
//! rayon (gather in parallel, apply sequentially).

use crate::components::*;
use crate::registry::SpatialRegistry;
use bevy_ecs::prelude::*;
use glam::Vec3;
use tracing::debug;

#[cfg(feature = "parallel")]
use rayon::prelude::*;

/// Closest source with nectar to `reference`.
///
/// Scans in the given order and only replaces the best candidate on a
/// strictly smaller distance, so the first of several equidistant
/// sources wins. Returns `None` when no source has nectar.
pub fn nearest_with_nectar<'a, I>(reference: Vec3, sources: I) -> Option<Entity>
where
    I: IntoIterator<Item = (Entity, &'a NectarSource)>,
{
    let mut best: Option<(Entity, f32)> = None;
    for (entity, source) in sources {
        if !source.has_nectar() {
            continue;
        }
        let dist = source.position.distance(reference);
        match best {
            Some((_, best_dist)) if dist >= best_dist => {}
            _ => best = Some((entity, dist)),
        }
    }
    best.map(|(entity, _)| entity)
}

/// Whether a forager's target must be recomputed.
pub fn is_stale(current: Option<Entity>, sources: &Query<&NectarSource>) -> bool {
    match current {
        Some(target) => sources.get(target).map(|s| !s.has_nectar()).unwrap_or(true),
        None => false,
    }
}

/// System that recomputes targets whose source ran dry.
///
/// ## Data Access
/// - Reads: SpatialRegistry, NectarSource, Pose, Beak
/// - Writes: NearestTarget
pub fn refresh_nearest_target_system(
    registry: Res<SpatialRegistry>,
    sources: Query<&NectarSource>,
    mut agents: Query<(Entity, &Pose, &Beak, &mut NearestTarget)>,
) {
    let stale: Vec<(Entity, Vec3)> = agents
        .iter()
        .filter(|(_, _, _, target)| is_stale(target.0, &sources))
        .map(|(entity, pose, beak, _)| (entity, beak.tip(pose)))
        .collect();
    if stale.is_empty() {
        return;
    }

    let candidates: Vec<(Entity, &NectarSource)> = registry
        .sources()
        .iter()
        .filter_map(|&e| sources.get(e).ok().map(|s| (e, s)))
        .collect();

    #[cfg(feature = "parallel")]
    let updates: Vec<(Entity, Option<Entity>)> = stale
        .par_iter()
        .map(|(agent, tip)| (*agent, nearest_with_nectar(*tip, candidates.iter().copied())))
        .collect();

    #[cfg(not(feature = "parallel"))]
    let updates: Vec<(Entity, Option<Entity>)> = stale
        .iter()
        .map(|(agent, tip)| (*agent, nearest_with_nectar(*tip, candidates.iter().copied())))
        .collect();

    for (agent, nearest) in updates {
        if let Ok((_, _, _, mut target)) = agents.get_mut(agent) {
            debug!(?agent, ?nearest, "Nearest target recomputed");
            target.0 = nearest;
        }
    }
}
