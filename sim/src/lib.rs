//! Forage Sim - Simulation Core
//!
//! A deterministic, fixed-timestep ECS simulation of a nectar-foraging
//! agent in a bounded meadow. Uses `bevy_ecs` for the
//! entity-component-system architecture.
//!
//! The crate owns the foraging rules: where nectar is, who is nearest to
//! what, where a forager may safely spawn, what it observes and what it is
//! rewarded. Rigid-body integration and geometry stay with the host engine
//! behind the [`collision::CollisionWorld`] trait; [`sphere_world`] is a
//! small reference engine for tests and demos.

pub mod api;
pub mod bridge;
pub mod collision;
pub mod components;
pub mod config;
pub mod error;
pub mod registry;
pub mod scene;
pub mod sphere_world;
pub mod systems;
pub mod world;

pub use api::ForageWorld;
pub use collision::{CollisionBackend, CollisionWorld, ContactEvent, ContactKind, ContactQueue};
pub use components::*;
pub use config::{SimConfig, SimRng, SpawnConfig, SteeringConfig};
pub use error::SimError;
pub use registry::SpatialRegistry;
pub use scene::{NectarDef, SceneNode, SceneNodeDesc};
pub use sphere_world::SphereWorld;
pub use systems::*;
pub use world::Snapshot;
