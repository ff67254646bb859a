//! Error types for the foraging simulation.

use crate::components::ColliderHandle;
use bevy_ecs::entity::Entity;

/// Every failure the simulation core can surface to its caller.
///
/// Lookup and placement failures are integrity problems of the scene or
/// of the arena layout; the simulation reports them instead of guessing.
#[derive(Debug, thiserror::Error)]
pub enum SimError {
    /// A nectar contact named a collider that no source registered.
    #[error("collider {0:?} is not registered to any nectar source")]
    UnknownCollider(ColliderHandle),

    /// The scene registered the same nectar collider twice.
    #[error("collider {0:?} is registered by more than one nectar source")]
    DuplicateCollider(ColliderHandle),

    /// No collision-free spawn pose was found within the attempt budget.
    #[error("no collision-free spawn pose found after {attempts} attempts")]
    PlacementExhausted {
        /// Attempts spent before giving up.
        attempts: u32,
    },

    /// Anchored placement was requested in an area without sources.
    #[error("cannot anchor a spawn pose: the area has no nectar sources")]
    NoSources,

    /// The entity is not a forager in this world.
    #[error("entity {0:?} is not a forager")]
    UnknownAgent(Entity),

    /// Freezing is only available outside training.
    #[error("freeze/unfreeze is not supported in training mode")]
    FreezeInTraining,

    /// A flat action buffer did not divide into whole actions.
    #[error("action buffer of length {len} is not a multiple of stride {stride}")]
    MalformedActionBuffer {
        /// Length of the rejected buffer.
        len: usize,
        /// Expected number of values per action.
        stride: usize,
    },

    /// A well-formed action buffer carried the wrong number of actions.
    #[error("action buffer carries {got} actions for {expected} agents")]
    ActionCountMismatch {
        /// Agents in the world.
        expected: usize,
        /// Actions in the buffer.
        got: usize,
    },

    /// Scene or configuration JSON failed to parse.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}
