//! Simulation configuration.
//!
//! Every tunable constant of the arena lives here so hosts can load a
//! JSON file instead of recompiling. Missing fields take their defaults.

use crate::error::SimError;
use bevy_ecs::prelude::*;
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};

/// Configuration for the foraging arena.
#[derive(Resource, Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    /// Fixed timestep in seconds (e.g., 0.02 = 50 Hz).
    pub fixed_timestep: f32,
    /// Seed for every random draw (area resets, spawn poses).
    pub seed: u64,
    /// Arena diameter used to normalise target distance.
    pub area_diameter: f32,
    /// Max distance from beak tip to nectar surface that counts as feeding.
    pub beak_tip_radius: f32,
    /// Nectar requested per feeding contact.
    pub feed_dose: f32,
    /// Reward for every successful feeding contact.
    pub base_reward: f32,
    /// Scale of the facing-alignment bonus on top of `base_reward`.
    pub alignment_bonus_scale: f32,
    /// Reward applied when a body starts touching the boundary.
    pub boundary_penalty: f32,
    /// Episode length in ticks for training agents (0 = unlimited).
    pub max_steps: u32,
    /// Max tilt of a plant around X and Z at reset, in degrees.
    pub plant_tilt_deg: f32,
    pub spawn: SpawnConfig,
    pub steering: SteeringConfig,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            fixed_timestep: 0.02,        // 50 Hz
            seed: 0,
            area_diameter: 20.0,
            beak_tip_radius: 0.008,
            feed_dose: 0.01,
            base_reward: 0.01,
            alignment_bonus_scale: 0.02,
            boundary_penalty: -0.5,
            max_steps: 5000,
            plant_tilt_deg: 5.0,
            spawn: SpawnConfig::default(),
            steering: SteeringConfig::default(),
        }
    }
}

impl SimConfig {
    /// Parse a configuration from JSON; absent fields keep their defaults.
    pub fn from_json_str(json: &str) -> Result<Self, SimError> {
        Ok(serde_json::from_str(json)?)
    }
}

/// Safe-placement search parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpawnConfig {
    pub max_attempts: u32,
    /// Radius of the overlap probe around a candidate position.
    pub probe_radius: f32,
    /// Distance range in front of a source for anchored spawns.
    pub anchor_distance: [f32; 2],
    /// Height range above the area origin for free spawns.
    pub height: [f32; 2],
    /// Horizontal distance range from the area origin for free spawns.
    pub radius: [f32; 2],
    /// Max absolute pitch of a free spawn, in degrees.
    pub max_pitch_deg: f32,
}

impl Default for SpawnConfig {
    fn default() -> Self {
        Self {
            max_attempts: 100,
            probe_radius: 0.05,
            anchor_distance: [0.1, 0.2],
            height: [1.2, 2.5],
            radius: [2.0, 7.0],
            max_pitch_deg: 60.0,
        }
    }
}

/// How actions turn into forces and rotation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SteeringConfig {
    pub move_force: f32,
    /// Degrees per second at full pitch input.
    pub pitch_speed: f32,
    /// Degrees per second at full yaw input.
    pub yaw_speed: f32,
    pub max_pitch_deg: f32,
    /// How fast smoothed inputs chase the raw ones, per second.
    pub smoothing_rate: f32,
}

impl Default for SteeringConfig {
    fn default() -> Self {
        Self {
            move_force: 2.0,
            pitch_speed: 100.0,
            yaw_speed: 100.0,
            max_pitch_deg: 80.0,
            smoothing_rate: 2.0,
        }
    }
}

/// The single source of randomness for the simulation.
#[derive(Resource, Debug, Clone)]
pub struct SimRng(pub StdRng);

impl SimRng {
    pub fn seeded(seed: u64) -> Self {
        Self(StdRng::seed_from_u64(seed))
    }
}
