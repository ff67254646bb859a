//! Episode control and per-tick bookkeeping.
//!
//! Episode start touches many resources at once (area reset, placement,
//! teleport, retargeting), so it runs as plain functions over `&mut World`
//! instead of a system.

use crate::collision::CollisionBackend;
use crate::components::*;
use crate::config::{SimConfig, SimRng};
use crate::error::SimError;
use crate::registry::{reset_area_system, SpatialRegistry};
use crate::systems::observation::encode;
use crate::systems::placement::find_safe_pose;
use crate::systems::tracker::nearest_with_nectar;
use bevy_ecs::prelude::*;
use bevy_ecs::schedule::ScheduleLabel;
use rand::Rng;
use tracing::info;

/// Current simulation tick (incremented each fixed update).
#[derive(Resource, Default, Debug, Clone, Copy, PartialEq, Eq)]
pub struct SimTick(pub u64);

impl SimTick {
    pub fn increment(&mut self) {
        self.0 = self.0.wrapping_add(1);
    }
}

/// Schedule that re-orients plants and refills every source.
#[derive(ScheduleLabel, Debug, Clone, PartialEq, Eq, Hash)]
pub struct AreaReset;

/// Registers the [`AreaReset`] schedule on `world`.
pub fn install_area_reset(world: &mut World) {
    let mut schedule = Schedule::new(AreaReset);
    schedule.add_systems(reset_area_system);
    world.add_schedule(schedule);
}

/// Resets the whole area: new plant orientations, full sources.
pub fn reset_area(world: &mut World) {
    if world.try_run_schedule(AreaReset).is_err() {
        install_area_reset(world);
        world.run_schedule(AreaReset);
    }
}

/// Runs the safe-placement search against the world's registry, collision
/// backend and random stream. `ignore` is the caller's own body, if any.
pub fn place(world: &mut World, anchored: bool, ignore: Option<ColliderHandle>) -> Result<Pose, SimError> {
    world.resource_scope(|world, mut rng: Mut<SimRng>| {
        let registry = world.resource::<SpatialRegistry>();
        let sources: Vec<&NectarSource> = registry
            .sources()
            .iter()
            .filter_map(|&e| world.get::<NectarSource>(e))
            .collect();
        let backend = world.resource::<CollisionBackend>();
        let config = world.resource::<SimConfig>();
        find_safe_pose(anchored, &sources, registry.origin(), &config.spawn, &**backend, ignore, &mut rng.0)
    })
}

/// Record of a finished episode.
#[derive(Debug, Clone, PartialEq)]
pub struct EpisodeSummary {
    pub agent: Entity,
    pub number: u32,
    pub steps: u32,
    pub nectar_obtained: f32,
    pub reward: f32,
}

/// System that opens a tick: clears per-tick rewards and end flags and
/// counts the step.
///
/// ## Data Access
/// - Writes: SimTick, RewardLedger, EpisodeProgress
pub fn begin_tick_system(
    mut tick: ResMut<SimTick>,
    mut agents: Query<(&mut RewardLedger, &mut EpisodeProgress)>,
) {
    tick.increment();
    for (mut ledger, mut progress) in agents.iter_mut() {
        ledger.step = 0.0;
        progress.done = false;
        progress.steps += 1;
    }
}

/// Starts a new episode for `agent` and returns its spawn pose.
///
/// Resets the area when the agent's mode asks for it, clears the
/// episode's accumulators, places the agent (anchored or free in
/// training, always anchored otherwise), teleports its body and picks the
/// nearest target from the new beak tip.
pub fn begin_episode(world: &mut World, agent: Entity) -> Result<Pose, SimError> {
    let forager = *world.get::<Forager>(agent).ok_or(SimError::UnknownAgent(agent))?;
    let body = world.get::<BodyHandle>(agent).map(|b| b.0);

    if forager.mode.resets_area() {
        reset_area(world);
    }

    if let Some(body) = body {
        world.resource_mut::<CollisionBackend>().halt_body(body);
    }

    let anchored = !forager.mode.randomizes_spawn() || world.resource_mut::<SimRng>().0.random_bool(0.5);
    let pose = place(world, anchored, body)?;

    if let Some(body) = body {
        world
            .resource_mut::<CollisionBackend>()
            .set_body_pose(body, pose.position, pose.rotation);
    }

    let beak = world.get::<Beak>(agent).copied().unwrap_or_default();
    let tip = beak.tip(&pose);
    let (nearest, observation) = {
        let registry = world.resource::<SpatialRegistry>();
        let nearest = nearest_with_nectar(
            tip,
            registry
                .sources()
                .iter()
                .filter_map(|&e| world.get::<NectarSource>(e).map(|s| (e, s))),
        );
        let target = nearest.and_then(|e| world.get::<NectarSource>(e));
        let diameter = world.resource::<SimConfig>().area_diameter;
        (nearest, encode(pose.rotation, tip, beak.forward(&pose), target, diameter))
    };

    let mut entity = world.entity_mut(agent);
    if let Some(mut p) = entity.get_mut::<Pose>() {
        *p = pose;
    }
    if let Some(mut target) = entity.get_mut::<NearestTarget>() {
        target.0 = nearest;
    }
    if let Some(mut obtained) = entity.get_mut::<NectarObtained>() {
        obtained.0 = 0.0;
    }
    if let Some(mut ledger) = entity.get_mut::<RewardLedger>() {
        *ledger = RewardLedger::default();
    }
    if let Some(mut steering) = entity.get_mut::<Steering>() {
        *steering = Steering::default();
    }
    if let Some(mut latest) = entity.get_mut::<LatestObservation>() {
        latest.0 = observation;
    }
    let number = match entity.get_mut::<EpisodeProgress>() {
        Some(mut progress) => {
            progress.number += 1;
            progress.steps = 0;
            progress.number
        }
        None => 0,
    };

    info!(?agent, episode = number, anchored, mode = ?forager.mode, "Episode begun");
    Ok(pose)
}

/// Ends every training episode that reached `max_steps` and begins the
/// next one. The new episode is flagged `done` for the rest of the tick
/// and keeps the final tick's step reward, so both reach the decision
/// component together.
///
/// Each summary lands in `finished` before its agent restarts; if a
/// restart fails, the summaries recorded so far are kept.
pub fn finish_expired_episodes(world: &mut World, finished: &mut Vec<EpisodeSummary>) -> Result<(), SimError> {
    let max_steps = world.resource::<SimConfig>().max_steps;
    if max_steps == 0 {
        return Ok(());
    }

    let mut query = world.query::<(Entity, &Forager, &EpisodeProgress, &NectarObtained, &RewardLedger)>();
    let expired: Vec<(EpisodeSummary, f32)> = query
        .iter(world)
        .filter(|(_, forager, progress, ..)| forager.mode == ForagerMode::Training && progress.steps >= max_steps)
        .map(|(agent, _, progress, obtained, ledger)| {
            let summary = EpisodeSummary {
                agent,
                number: progress.number,
                steps: progress.steps,
                nectar_obtained: obtained.0,
                reward: ledger.episode,
            };
            (summary, ledger.step)
        })
        .collect();

    for (summary, last_step_reward) in expired {
        info!(
            agent = ?summary.agent,
            episode = summary.number,
            nectar = summary.nectar_obtained,
            reward = summary.reward,
            "Episode ended"
        );
        let agent = summary.agent;
        finished.push(summary);

        begin_episode(world, agent)?;
        if let Some(mut progress) = world.get_mut::<EpisodeProgress>(agent) {
            progress.done = true;
        }
        if let Some(mut ledger) = world.get_mut::<RewardLedger>(agent) {
            ledger.step = last_step_reward;
        }
    }

    Ok(())
}
