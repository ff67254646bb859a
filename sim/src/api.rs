//! Public API for the simulation.
//!
//! This module provides the main interface for a host engine, a trainer or
//! a test to drive one foraging arena.
//!
//! ## Fixed Timestep
//!
//! The simulation uses a fixed timestep internally (default 50 Hz). When
//! `step(dt)` is called, the simulation accumulates time and runs fixed
//! updates as needed. This ensures deterministic behavior regardless of
//! frame rate.
//!
//! ## Tick Order
//!
//! Every fixed update runs, in order: tick bookkeeping, action
//! application, collision integration, feeding, stale-target refresh and
//! observation encoding. Faults raised during the tick and training
//! episodes that hit their step limit are handled after the schedule.

use crate::bridge::{pack_observations, parse_action_buffer, AgentRow};
use crate::collision::{CollisionBackend, CollisionWorld, ContactEvent, ContactQueue};
use crate::components::*;
use crate::config::{SimConfig, SimRng};
use crate::error::SimError;
use crate::registry::SpatialRegistry;
use crate::scene::{NectarDef, SceneNode, SceneNodeDesc};
use crate::sphere_world::SphereWorld;
use crate::systems::*;
use crate::world::Snapshot;
use bevy_ecs::prelude::*;
use glam::Vec3;
use tracing::info;

/// The main simulation world container.
///
/// Holds the ECS world and schedule, providing a clean API for:
/// - Building an arena from a scene
/// - Adding foragers and starting their episodes
/// - Stepping the simulation forward
/// - Reading observations, rewards and snapshots
pub struct ForageWorld {
    world: World,
    schedule: Schedule,
    /// Foragers in the order they were added.
    agents: Vec<Entity>,
    time: f32,
    /// Accumulated time for fixed timestep.
    time_accumulator: f32,
    /// Episodes finished since the last drain.
    summaries: Vec<EpisodeSummary>,
}

impl ForageWorld {
    /// Build an arena from `scene`, with `backend` as the collision engine.
    pub fn new<N: SceneNode>(
        config: SimConfig,
        scene: &N,
        backend: impl CollisionWorld + 'static,
    ) -> Result<Self, SimError> {
        let mut world = World::new();

        let registry = SpatialRegistry::build(&mut world, scene)?;
        world.insert_resource(registry);

        // Core resources
        world.insert_resource(DeltaTime(config.fixed_timestep));
        world.insert_resource(SimTick::default());
        world.insert_resource(SimRng::seeded(config.seed));
        world.insert_resource(config);
        world.insert_resource(CollisionBackend::new(backend));
        world.insert_resource(ContactQueue::default());
        world.insert_resource(SimFaults::default());
        install_area_reset(&mut world);

        let mut schedule = Schedule::default();
        schedule.add_systems(
            (
                begin_tick_system,
                steering_system,
                physics_step_system,
                feeding_system,
                refresh_nearest_target_system,
                observation_system,
            )
                .chain(),
        );

        Ok(Self {
            world,
            schedule,
            agents: Vec::new(),
            time: 0.0,
            time_accumulator: 0.0,
            summaries: Vec::new(),
        })
    }

    /// A small meadow on the reference [`SphereWorld`] with one forager
    /// already in its first episode. Six plants of three flowers each
    /// stand in a ring around the origin.
    pub fn demo_meadow(config: SimConfig, mode: ForagerMode) -> Result<(Self, Entity), SimError> {
        let mut backend = SphereWorld::new();
        let mut plants = Vec::new();

        for p in 0..6 {
            let angle = p as f32 / 6.0 * std::f32::consts::TAU;
            let pivot = Vec3::new(angle.cos(), 0.0, angle.sin()) * 4.0;
            let outward = pivot.normalize_or_zero();
            let side = Vec3::Y.cross(outward);

            let flowers = (0..3)
                .map(|f| {
                    let lateral = (f as f32 - 1.0) * 0.3;
                    let position = pivot + Vec3::Y * (1.2 + 0.2 * f as f32) + side * lateral;
                    let up = (outward + side * lateral + Vec3::Y * 0.3).normalize();
                    let (nectar_collider, petal_collider) = backend.add_flower(position, up);
                    SceneNodeDesc::flower(
                        &format!("flower_{p}_{f}"),
                        position,
                        NectarDef { nectar_collider, petal_collider, up },
                    )
                })
                .collect();
            plants.push(SceneNodeDesc::plant(&format!("plant_{p}"), pivot, flowers));
        }

        let body = backend.add_body(Vec3::new(0.0, 2.0, 0.0), 0.09, 1.0);
        let scene = SceneNodeDesc::group("meadow", Vec3::ZERO, plants);

        let mut sim = Self::new(config, &scene, backend)?;
        let agent = sim.add_agent(mode, Beak::default(), body);
        sim.begin_episode(agent)?;
        Ok((sim, agent))
    }

    /// Add a forager driving the physics body `body`. Its first episode
    /// starts with [`ForageWorld::begin_episode`].
    pub fn add_agent(&mut self, mode: ForagerMode, beak: Beak, body: ColliderHandle) -> Entity {
        let agent = self
            .world
            .spawn((ForagerBundle::new(mode, beak), BodyHandle(body)))
            .id();
        self.agents.push(agent);
        info!(?agent, ?mode, "Forager added");
        agent
    }

    /// Start a new episode for `agent`; returns its spawn pose.
    pub fn begin_episode(&mut self, agent: Entity) -> Result<Pose, SimError> {
        self.check_agent(agent)?;
        begin_episode(&mut self.world, agent)
    }

    /// Step the simulation forward by `dt` seconds.
    ///
    /// Uses fixed timestep internally - accumulates time and runs fixed updates
    /// as needed. Returns the number of fixed updates that ran.
    pub fn step(&mut self, dt: f32) -> Result<u32, SimError> {
        let fixed_dt = self.world.resource::<SimConfig>().fixed_timestep;
        if fixed_dt <= 0.0 {
            self.fixed_update()?;
            return Ok(1);
        }

        self.time_accumulator += dt.max(0.0);

        let mut ticks = 0;
        while self.time_accumulator >= fixed_dt {
            self.time_accumulator -= fixed_dt;
            self.fixed_update()?;
            ticks += 1;
        }
        Ok(ticks)
    }

    /// Run a single fixed timestep update.
    pub fn fixed_update(&mut self) -> Result<(), SimError> {
        let dt = self.world.resource::<SimConfig>().fixed_timestep;
        self.world.resource_mut::<DeltaTime>().0 = dt;

        // Run all systems
        self.schedule.run(&mut self.world);
        self.time += dt;

        if let Some(fault) = self.world.resource_mut::<SimFaults>().take_first() {
            return Err(fault);
        }
        finish_expired_episodes(&mut self.world, &mut self.summaries)
    }

    /// Queue a contact for the next tick's feeding pass (for hosts whose
    /// engine reports contacts outside `advance`).
    pub fn push_contact(&mut self, event: ContactEvent) {
        self.world.resource_mut::<ContactQueue>().push(event);
    }

    /// Set the action applied from the next tick on. Releases any held
    /// manual input.
    pub fn set_action(&mut self, agent: Entity, action: Action) -> Result<(), SimError> {
        self.check_agent(agent)?;
        let mut entity = self.world.entity_mut(agent);
        if let Some(mut pending) = entity.get_mut::<PendingAction>() {
            pending.0 = Some(action.sanitized());
        }
        if let Some(mut manual) = entity.get_mut::<ManualControl>() {
            manual.0 = None;
        }
        Ok(())
    }

    /// Drive `agent` from discrete manual input instead of a policy. The
    /// input is held until replaced and follows the agent's heading.
    pub fn set_manual_input(&mut self, agent: Entity, input: ManualInput) -> Result<(), SimError> {
        self.check_agent(agent)?;
        self.world.entity_mut(agent).insert(ManualControl(Some(input)));
        Ok(())
    }

    /// Apply a flat action buffer, one action per agent in add order.
    pub fn apply_action_buffer(&mut self, buffer: &[f32]) -> Result<(), SimError> {
        let actions = parse_action_buffer(buffer)?;
        if actions.len() != self.agents.len() {
            return Err(SimError::ActionCountMismatch {
                expected: self.agents.len(),
                got: actions.len(),
            });
        }
        for (agent, action) in self.agents.clone().into_iter().zip(actions) {
            self.set_action(agent, action)?;
        }
        Ok(())
    }

    /// Observations, last-tick rewards and end flags of every agent as a
    /// flat buffer.
    pub fn observation_buffer(&self) -> Vec<f32> {
        let rows: Vec<AgentRow> = self
            .agents
            .iter()
            .enumerate()
            .map(|(id, &agent)| AgentRow {
                id: id as u32,
                observation: self.world.get::<LatestObservation>(agent).map(|o| o.0).unwrap_or_default(),
                step_reward: self.world.get::<RewardLedger>(agent).map_or(0.0, |r| r.step),
                done: self.world.get::<EpisodeProgress>(agent).is_some_and(|p| p.done),
            })
            .collect();
        pack_observations(&rows)
    }

    /// The observation encoded at the end of the last tick (or at episode start).
    pub fn observation(&self, agent: Entity) -> Result<Observation, SimError> {
        self.component::<LatestObservation>(agent).map(|o| o.0)
    }

    pub fn nectar_obtained(&self, agent: Entity) -> Result<f32, SimError> {
        self.component::<NectarObtained>(agent).map(|n| n.0)
    }

    /// Reward earned during the last tick.
    pub fn step_reward(&self, agent: Entity) -> Result<f32, SimError> {
        self.component::<RewardLedger>(agent).map(|r| r.step)
    }

    /// Reward accumulated over the current episode.
    pub fn episode_reward(&self, agent: Entity) -> Result<f32, SimError> {
        self.component::<RewardLedger>(agent).map(|r| r.episode)
    }

    pub fn nearest_target(&self, agent: Entity) -> Result<Option<Entity>, SimError> {
        self.component::<NearestTarget>(agent).map(|t| t.0)
    }

    pub fn pose(&self, agent: Entity) -> Result<Pose, SimError> {
        self.component::<Pose>(agent).copied()
    }

    /// Teleport `agent` and its physics body.
    pub fn set_pose(&mut self, agent: Entity, pose: Pose) -> Result<(), SimError> {
        self.check_agent(agent)?;
        if let Some(mut current) = self.world.get_mut::<Pose>(agent) {
            *current = pose;
        }
        if let Some(body) = self.world.get::<BodyHandle>(agent).map(|b| b.0) {
            let mut backend = self.world.resource_mut::<CollisionBackend>();
            backend.halt_body(body);
            backend.set_body_pose(body, pose.position, pose.rotation);
        }
        Ok(())
    }

    /// Stop applying actions to `agent` and halt its body.
    pub fn freeze_agent(&mut self, agent: Entity) -> Result<(), SimError> {
        self.set_frozen(agent, true)
    }

    /// Resume applying actions to `agent`.
    pub fn unfreeze_agent(&mut self, agent: Entity) -> Result<(), SimError> {
        self.set_frozen(agent, false)
    }

    fn set_frozen(&mut self, agent: Entity, frozen: bool) -> Result<(), SimError> {
        let mode = self.component::<Forager>(agent)?.mode;
        if mode == ForagerMode::Training {
            return Err(SimError::FreezeInTraining);
        }
        if let Some(mut forager) = self.world.get_mut::<Forager>(agent) {
            forager.frozen = frozen;
        }
        if frozen {
            if let Some(body) = self.world.get::<BodyHandle>(agent).map(|b| b.0) {
                self.world.resource_mut::<CollisionBackend>().halt_body(body);
            }
        }
        info!(?agent, frozen, "Forager freeze toggled");
        Ok(())
    }

    /// Re-orient every plant and refill every source.
    pub fn reset_area(&mut self) {
        reset_area(&mut self.world);
    }

    /// Search for a collision-free spawn pose without moving anyone.
    pub fn find_safe_pose(&mut self, anchored: bool) -> Result<Pose, SimError> {
        place(&mut self.world, anchored, None)
    }

    /// Get a snapshot of the current simulation state.
    pub fn snapshot(&self) -> Snapshot {
        Snapshot::from_world(&self.world, &self.agents, self.current_tick(), self.time)
    }

    /// Get the snapshot as a JSON string.
    pub fn snapshot_json(&self) -> Result<String, SimError> {
        Ok(self.snapshot().to_json()?)
    }

    /// Take every episode summary recorded since the last call.
    pub fn drain_episode_summaries(&mut self) -> Vec<EpisodeSummary> {
        std::mem::take(&mut self.summaries)
    }

    /// Get the current tick number.
    pub fn current_tick(&self) -> u64 {
        self.world.resource::<SimTick>().0
    }

    /// Get the elapsed simulation time.
    pub fn current_time(&self) -> f32 {
        self.time
    }

    /// Foragers in the order they were added.
    pub fn agents(&self) -> &[Entity] {
        &self.agents
    }

    pub fn registry(&self) -> &SpatialRegistry {
        self.world.resource::<SpatialRegistry>()
    }

    pub fn source(&self, entity: Entity) -> Option<&NectarSource> {
        self.world.get::<NectarSource>(entity)
    }

    pub fn backend(&self) -> &dyn CollisionWorld {
        &**self.world.resource::<CollisionBackend>()
    }

    /// Get direct access to the ECS world (for advanced usage).
    pub fn world(&self) -> &World {
        &self.world
    }

    /// Get mutable access to the ECS world (for advanced usage).
    pub fn world_mut(&mut self) -> &mut World {
        &mut self.world
    }

    fn check_agent(&self, agent: Entity) -> Result<(), SimError> {
        self.component::<Forager>(agent).map(|_| ())
    }

    fn component<T: Component>(&self, agent: Entity) -> Result<&T, SimError> {
        if self.world.get::<Forager>(agent).is_none() {
            return Err(SimError::UnknownAgent(agent));
        }
        self.world.get::<T>(agent).ok_or(SimError::UnknownAgent(agent))
    }
}
