//! Snapshot types.
//!
//! The `Snapshot` struct provides a serializable view of the arena that a
//! renderer or logger can consume without touching the ECS world.

use crate::components::*;
use crate::registry::SpatialRegistry;
use bevy_ecs::prelude::*;
use glam::{Quat, Vec3};
use serde::{Deserialize, Serialize};

/// Snapshot of a single nectar source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceSnapshot {
    /// Index in registry discovery order.
    pub index: usize,
    pub position: Vec3,
    pub up: Vec3,
    pub nectar: f32,
    pub state: SourceState,
    /// Linear RGB marker for the state.
    pub color: [f32; 3],
}

/// Snapshot of a single forager.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentSnapshot {
    /// Index in the order agents were added.
    pub id: u32,
    pub mode: ForagerMode,
    pub position: Vec3,
    pub rotation: Quat,
    pub nectar_obtained: f32,
    pub step_reward: f32,
    pub episode_reward: f32,
    pub episode: u32,
    pub steps: u32,
    /// Registry index of the nearest source with nectar.
    pub nearest_target: Option<usize>,
    pub frozen: bool,
}

/// Complete arena snapshot.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    /// Current simulation tick.
    pub tick: u64,
    /// Elapsed simulation time in seconds.
    pub time: f32,
    pub sources: Vec<SourceSnapshot>,
    pub agents: Vec<AgentSnapshot>,
}

impl Snapshot {
    /// Create a snapshot from the ECS world. `agents` fixes agent order.
    pub fn from_world(world: &World, agents: &[Entity], tick: u64, time: f32) -> Self {
        let Some(registry) = world.get_resource::<SpatialRegistry>() else {
            return Self { tick, time, ..Default::default() };
        };

        let sources = registry
            .sources()
            .iter()
            .enumerate()
            .filter_map(|(index, &e)| {
                let source = world.get::<NectarSource>(e)?;
                Some(SourceSnapshot {
                    index,
                    position: source.position,
                    up: source.up,
                    nectar: source.nectar_amount(),
                    state: source.state(),
                    color: source.state().color(),
                })
            })
            .collect();

        let agents = agents
            .iter()
            .enumerate()
            .filter_map(|(id, &e)| {
                let forager = world.get::<Forager>(e)?;
                let pose = world.get::<Pose>(e).copied().unwrap_or_default();
                let ledger = world.get::<RewardLedger>(e).copied().unwrap_or_default();
                let progress = world.get::<EpisodeProgress>(e).copied().unwrap_or_default();
                Some(AgentSnapshot {
                    id: id as u32,
                    mode: forager.mode,
                    position: pose.position,
                    rotation: pose.rotation,
                    nectar_obtained: world.get::<NectarObtained>(e).map_or(0.0, |n| n.0),
                    step_reward: ledger.step,
                    episode_reward: ledger.episode,
                    episode: progress.number,
                    steps: progress.steps,
                    nearest_target: world
                        .get::<NearestTarget>(e)
                        .and_then(|t| t.0)
                        .and_then(|t| registry.index_of(t)),
                    frozen: forager.frozen,
                })
            })
            .collect();

        Self {
            tick,
            time,
            sources,
            agents,
        }
    }

    /// Serialize snapshot to JSON string.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Serialize snapshot to pretty JSON string.
    pub fn to_json_pretty(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}
