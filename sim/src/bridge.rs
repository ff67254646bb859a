//! Flat-buffer bridge for foreign decision components.
//!
//! Trainers and engines outside Rust exchange observations and actions
//! with the simulation as contiguous `f32` arrays.
//!
//! # Stable FFI Contract
//!
//! Both buffers have a fixed stride and a documented field order. Change
//! either only together with the consumers.
//!
//! # Observation Buffer Layout (Version 1.0)
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │ HEADER (1 element)                                              │
//! ├─────────────────────────────────────────────────────────────────┤
//! │ [0] agent_count (as f32)                                        │
//! ├─────────────────────────────────────────────────────────────────┤
//! │ AGENT DATA (agent_count × AGENT_STRIDE elements)                │
//! ├─────────────────────────────────────────────────────────────────┤
//! │ For each agent i (offset = 1 + i * AGENT_STRIDE):               │
//! │   [+0]      id          - Agent index (u32 as f32)              │
//! │   [+1..+11] observation - The 10 observation values             │
//! │   [+11]     step_reward - Reward earned during the last tick    │
//! │   [+12]     done        - 1.0 if the episode ended last tick    │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Action Buffer Layout
//!
//! `agent_count × ACTION_STRIDE` values with no header, agents in the
//! same order as the observation buffer:
//! `[move_x, move_y, move_z, pitch, yaw]`.
//!
//! # Determinism
//!
//! Packing is deterministic: the same rows always produce the same buffer.

use crate::components::{Action, Observation};
use crate::error::SimError;

// ============================================================================
// CONSTANTS - STABLE FFI CONTRACT
// ============================================================================

/// Number of f32 values per agent in the observation buffer.
///
/// **This is part of the stable FFI contract. Do not change without versioning.**
pub const AGENT_STRIDE: usize = 1 + Observation::SIZE + 2;

/// Number of f32 values per agent in the action buffer.
pub const ACTION_STRIDE: usize = Action::SIZE;

/// Number of f32 values in the observation buffer header.
pub const HEADER_SIZE: usize = 1;

/// Offset within agent data for: agent index
pub const FIELD_ID: usize = 0;
/// Offset within agent data for: first observation value
pub const FIELD_OBSERVATION: usize = 1;
/// Offset within agent data for: reward of the last tick
pub const FIELD_STEP_REWARD: usize = FIELD_OBSERVATION + Observation::SIZE;
/// Offset within agent data for: episode-ended flag
pub const FIELD_DONE: usize = FIELD_STEP_REWARD + 1;

/// One agent's entry in the observation buffer.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct AgentRow {
    pub id: u32,
    pub observation: Observation,
    pub step_reward: f32,
    pub done: bool,
}

// ============================================================================
// PACKING AND PARSING
// ============================================================================

/// Packs agent rows into a flat observation buffer.
///
/// # Example
///
/// ```rust
/// use forage_sim::bridge::{pack_observations, AgentRow, AGENT_STRIDE, HEADER_SIZE};
///
/// let buffer = pack_observations(&[AgentRow::default(), AgentRow::default()]);
/// assert_eq!(buffer[0], 2.0);
/// assert_eq!(buffer.len(), HEADER_SIZE + 2 * AGENT_STRIDE);
/// ```
pub fn pack_observations(rows: &[AgentRow]) -> Vec<f32> {
    let buffer_size = calculate_buffer_size(rows.len());
    let mut buffer = Vec::with_capacity(buffer_size);

    buffer.push(rows.len() as f32);
    for row in rows {
        buffer.push(row.id as f32);
        buffer.extend_from_slice(&row.observation.0);
        buffer.push(row.step_reward);
        buffer.push(if row.done { 1.0 } else { 0.0 });
    }

    debug_assert_eq!(buffer.len(), buffer_size, "Buffer size mismatch");
    buffer
}

/// Splits a flat action buffer into sanitized actions.
///
/// Fails with [`SimError::MalformedActionBuffer`] when the length is not a
/// whole number of actions.
pub fn parse_action_buffer(buffer: &[f32]) -> Result<Vec<Action>, SimError> {
    if buffer.len() % ACTION_STRIDE != 0 {
        return Err(SimError::MalformedActionBuffer {
            len: buffer.len(),
            stride: ACTION_STRIDE,
        });
    }
    Ok(buffer
        .chunks_exact(ACTION_STRIDE)
        .map(|chunk| {
            let mut values = [0.0; ACTION_STRIDE];
            values.copy_from_slice(chunk);
            Action(values).sanitized()
        })
        .collect())
}

/// `HEADER_SIZE + agent_count * AGENT_STRIDE`
#[inline]
pub fn calculate_buffer_size(agent_count: usize) -> usize {
    HEADER_SIZE + agent_count * AGENT_STRIDE
}

/// Offset of agent `index` in an observation buffer.
#[inline]
pub const fn agent_offset(index: usize) -> usize {
    HEADER_SIZE + index * AGENT_STRIDE
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_buffer_is_just_header() {
        let buffer = pack_observations(&[]);
        assert_eq!(buffer, vec![0.0]);
        assert_eq!(buffer.len(), calculate_buffer_size(0));
    }

    #[test]
    fn test_rows_land_at_their_offsets() {
        let mut obs = [0.0; Observation::SIZE];
        obs[3] = 1.0;
        obs[9] = 0.25;
        let rows = [
            AgentRow { id: 0, observation: Observation::default(), step_reward: 0.0, done: false },
            AgentRow { id: 1, observation: Observation(obs), step_reward: -0.5, done: true },
        ];

        let buffer = pack_observations(&rows);
        assert_eq!(buffer.len(), calculate_buffer_size(2));

        let offset = agent_offset(1);
        assert_eq!(buffer[offset + FIELD_ID], 1.0);
        assert_eq!(buffer[offset + FIELD_OBSERVATION + 3], 1.0);
        assert_eq!(buffer[offset + FIELD_OBSERVATION + 9], 0.25);
        assert_eq!(buffer[offset + FIELD_STEP_REWARD], -0.5);
        assert_eq!(buffer[offset + FIELD_DONE], 1.0);
        assert_eq!(buffer[agent_offset(0) + FIELD_DONE], 0.0);
    }

    #[test]
    fn test_stride_matches_last_field() {
        assert_eq!(AGENT_STRIDE, 13);
        assert_eq!(AGENT_STRIDE, FIELD_DONE + 1);
        assert_eq!(ACTION_STRIDE, 5);
    }

    #[test]
    fn test_action_buffer_parses_and_sanitizes() {
        let actions = parse_action_buffer(&[0.0, 0.5, 2.0, -1.0, f32::NAN, 1.0, 0.0, 0.0, 0.0, 0.0]).unwrap();
        assert_eq!(actions.len(), 2);
        assert_eq!(actions[0].0, [0.0, 0.5, 1.0, -1.0, 0.0]);
        assert_eq!(actions[1].0, [1.0, 0.0, 0.0, 0.0, 0.0]);
        assert!(parse_action_buffer(&[]).unwrap().is_empty());
    }

    #[test]
    fn test_ragged_action_buffer_is_rejected() {
        let result = parse_action_buffer(&[0.0; 7]);
        assert!(matches!(result, Err(SimError::MalformedActionBuffer { len: 7, stride: 5 })));
    }
}
