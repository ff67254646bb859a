//! ECS Components for the foraging simulation.
//!
//! Components are pure data containers attached to entities.
//! All per-tick logic lives in systems that query these components.
//!
//! Axis convention: +Y is world up, +Z is an entity's forward axis and
//! +X its right axis.

use crate::collision::ColliderToggle;
use bevy_ecs::prelude::*;
use glam::{Mat3, Quat, Vec3};
use serde::{Deserialize, Serialize};

// ============================================================================
// COLLISION IDENTITY
// ============================================================================

/// Opaque identifier the collision collaborator hands out for a primitive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ColliderHandle(pub u64);

/// Tag attached to every collision primitive and delivered with contacts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ColliderTag {
    /// Harvestable trigger volume of a source.
    Nectar,
    /// Solid petals surrounding the nectar.
    Petal,
    /// Arena boundary; touching it is penalised.
    Boundary,
    /// A forager's own body.
    Body,
    /// Any other solid scenery.
    Obstacle,
}

// ============================================================================
// SPATIAL COMPONENTS
// ============================================================================

/// Position and orientation in area space.
#[derive(Component, Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Pose {
    pub position: Vec3,
    pub rotation: Quat,
}

impl Default for Pose {
    fn default() -> Self {
        Self::new(Vec3::ZERO, Quat::IDENTITY)
    }
}

impl Pose {
    pub fn new(position: Vec3, rotation: Quat) -> Self {
        Self { position, rotation }
    }

    pub fn forward(&self) -> Vec3 {
        self.rotation * Vec3::Z
    }

    pub fn up(&self) -> Vec3 {
        self.rotation * Vec3::Y
    }

    pub fn right(&self) -> Vec3 {
        self.rotation * Vec3::X
    }
}

/// Rotation whose forward (+Z) axis points along `forward`, with `up` as
/// the secondary axis.
///
/// A zero `forward` yields the identity. When `forward` is parallel to
/// `up` the shortest arc from +Z is used instead.
pub fn look_rotation(forward: Vec3, up: Vec3) -> Quat {
    let f = forward.normalize_or_zero();
    if f == Vec3::ZERO {
        return Quat::IDENTITY;
    }
    let right = up.cross(f);
    if right.length_squared() < 1e-10 {
        return Quat::from_rotation_arc(Vec3::Z, f);
    }
    let right = right.normalize();
    let true_up = f.cross(right);
    Quat::from_mat3(&Mat3::from_cols(right, true_up, f)).normalize()
}

// ============================================================================
// NECTAR SOURCE COMPONENTS
// ============================================================================

/// Whether a source can currently be harvested.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SourceState {
    #[default]
    Full,
    Empty,
}

impl SourceState {
    /// Visual marker (linear RGB) for renderers.
    pub fn color(&self) -> [f32; 3] {
        match self {
            SourceState::Full => [1.0, 0.0, 0.0],
            SourceState::Empty => [0.5, 0.0, 1.0],
        }
    }
}

/// A single depletable nectar source (one flower).
///
/// `position` and `up` describe the harvest point in area space. The
/// amount stays within `[0, 1]`.
#[derive(Component, Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NectarSource {
    nectar_amount: f32,
    state: SourceState,
    pub position: Vec3,
    pub up: Vec3,
    pub nectar_collider: ColliderHandle,
    pub petal_collider: ColliderHandle,
}

impl NectarSource {
    /// A full source at the given harvest pose.
    pub fn new(
        position: Vec3,
        up: Vec3,
        nectar_collider: ColliderHandle,
        petal_collider: ColliderHandle,
    ) -> Self {
        Self {
            nectar_amount: 1.0,
            state: SourceState::Full,
            position,
            up,
            nectar_collider,
            petal_collider,
        }
    }

    pub fn nectar_amount(&self) -> f32 {
        self.nectar_amount
    }

    pub fn has_nectar(&self) -> bool {
        self.nectar_amount > 0.0
    }

    pub fn state(&self) -> SourceState {
        self.state
    }

    /// Takes up to `amount` nectar and returns what was actually taken.
    ///
    /// The full requested amount is subtracted and the result floored to
    /// zero straight away. Crossing zero empties the source and disables
    /// both of its colliders. Negative or non-finite requests take nothing.
    pub fn feed<T: ColliderToggle + ?Sized>(&mut self, amount: f32, colliders: &mut T) -> f32 {
        let amount = if amount.is_finite() { amount.max(0.0) } else { 0.0 };
        let taken = amount.clamp(0.0, self.nectar_amount);

        self.nectar_amount -= amount;

        if self.nectar_amount <= 0.0 {
            self.nectar_amount = 0.0;
            if self.state == SourceState::Full {
                self.state = SourceState::Empty;
                colliders.set_collider_enabled(self.petal_collider, false);
                colliders.set_collider_enabled(self.nectar_collider, false);
            }
        }

        taken
    }

    /// Refills the source and re-enables both colliders.
    pub fn reset<T: ColliderToggle + ?Sized>(&mut self, colliders: &mut T) {
        self.nectar_amount = 1.0;
        self.state = SourceState::Full;
        colliders.set_collider_enabled(self.petal_collider, true);
        colliders.set_collider_enabled(self.nectar_collider, true);
    }
}

/// A plant that rigidly carries one or more sources.
#[derive(Component, Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PlantCluster {
    /// Rotation pivot in area space.
    pub pivot: Vec3,
    /// Current absolute orientation.
    pub rotation: Quat,
}

/// Rest pose of a source relative to the plant that carries it.
#[derive(Component, Debug, Clone, Copy, PartialEq)]
pub struct ClusterMount {
    pub cluster: Entity,
    /// Harvest point offset from the pivot, in plant space.
    pub offset: Vec3,
    /// Source up axis in plant space.
    pub up: Vec3,
}

impl ClusterMount {
    /// Area-space harvest point and up axis for a plant orientation.
    pub fn world_pose(&self, cluster: &PlantCluster) -> (Vec3, Vec3) {
        let position = cluster.pivot + cluster.rotation * self.offset;
        let up = (cluster.rotation * self.up).normalize_or_zero();
        (position, up)
    }
}

/// Link from a plant to the plant that carries it.
#[derive(Component, Debug, Clone, Copy, PartialEq)]
pub struct ClusterParent {
    pub parent: Entity,
    /// Pivot offset from the parent pivot, in parent space.
    pub offset: Vec3,
    /// Orientation relative to the parent.
    pub local_rotation: Quat,
}

impl ClusterParent {
    /// Area-space pivot and orientation under the parent's current pose.
    pub fn world_pose(&self, parent: &PlantCluster) -> (Vec3, Quat) {
        let pivot = parent.pivot + parent.rotation * self.offset;
        (pivot, parent.rotation * self.local_rotation)
    }
}

// ============================================================================
// FORAGER COMPONENTS
// ============================================================================

/// Which context a forager runs in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ForagerMode {
    /// Rewards on, area reset per episode, random spawn kind, step limit.
    #[default]
    Training,
    /// Rewards on and area reset per episode, always spawns anchored.
    Evaluation,
    /// Rewards suppressed, area untouched, may be frozen.
    Gameplay,
}

impl ForagerMode {
    pub fn emits_rewards(&self) -> bool {
        matches!(self, ForagerMode::Training | ForagerMode::Evaluation)
    }

    pub fn resets_area(&self) -> bool {
        matches!(self, ForagerMode::Training | ForagerMode::Evaluation)
    }

    pub fn randomizes_spawn(&self) -> bool {
        matches!(self, ForagerMode::Training)
    }
}

/// Marker and mode flags for a forager.
#[derive(Component, Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Forager {
    pub mode: ForagerMode,
    /// Suppresses action application while set.
    pub frozen: bool,
}

/// Beak tip offset from the body origin, in body space.
#[derive(Component, Debug, Clone, Copy, PartialEq)]
pub struct Beak {
    pub offset: Vec3,
}

impl Default for Beak {
    fn default() -> Self {
        Self { offset: Vec3::new(0.0, 0.0, 0.1) }
    }
}

impl Beak {
    pub fn tip(&self, pose: &Pose) -> Vec3 {
        pose.position + pose.rotation * self.offset
    }

    pub fn forward(&self, pose: &Pose) -> Vec3 {
        pose.forward()
    }
}

/// Physics body the collaborator simulates for this forager.
#[derive(Component, Debug, Clone, Copy, PartialEq, Eq)]
pub struct BodyHandle(pub ColliderHandle);

/// Non-owning reference to the closest source that still has nectar.
#[derive(Component, Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NearestTarget(pub Option<Entity>);

/// Nectar harvested during the current episode.
#[derive(Component, Debug, Clone, Copy, Default, PartialEq)]
pub struct NectarObtained(pub f32);

/// Reward accumulated for the current tick and the whole episode.
#[derive(Component, Debug, Clone, Copy, Default, PartialEq)]
pub struct RewardLedger {
    pub step: f32,
    pub episode: f32,
}

impl RewardLedger {
    pub fn add(&mut self, reward: f32) {
        self.step += reward;
        self.episode += reward;
    }
}

/// Smoothed rotation inputs carried between ticks.
#[derive(Component, Debug, Clone, Copy, Default, PartialEq)]
pub struct Steering {
    pub smooth_pitch: f32,
    pub smooth_yaw: f32,
}

/// Decision output: `[move_x, move_y, move_z, pitch, yaw]`, each in `[-1, 1]`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Action(pub [f32; 5]);

impl Action {
    pub const SIZE: usize = 5;

    /// Clamps every component to `[-1, 1]`; non-finite values become 0.
    pub fn sanitized(self) -> Self {
        Self(self.0.map(|v| if v.is_finite() { v.clamp(-1.0, 1.0) } else { 0.0 }))
    }

    pub fn movement(&self) -> Vec3 {
        Vec3::new(self.0[0], self.0[1], self.0[2])
    }

    pub fn pitch(&self) -> f32 {
        self.0[3]
    }

    pub fn yaw(&self) -> f32 {
        self.0[4]
    }
}

/// Most recent action delivered by the decision component.
#[derive(Component, Debug, Clone, Copy, Default, PartialEq)]
pub struct PendingAction(pub Option<Action>);

/// Discrete manual input, each axis in `{-1, 0, 1}`.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ManualInput {
    /// +1 forward, -1 back.
    pub forward: f32,
    /// +1 right, -1 left.
    pub right: f32,
    /// +1 up, -1 down.
    pub up: f32,
    pub pitch: f32,
    pub yaw: f32,
}

/// Held manual input. When set it replaces [`PendingAction`] and is
/// re-read against the current heading every tick.
#[derive(Component, Debug, Clone, Copy, Default, PartialEq)]
pub struct ManualControl(pub Option<ManualInput>);

/// Fixed-length observation vector handed to the decision component.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Observation(pub [f32; 10]);

impl Observation {
    pub const SIZE: usize = 10;

    pub fn is_zero(&self) -> bool {
        self.0.iter().all(|v| *v == 0.0)
    }
}

/// Observation encoded at the end of the last tick.
#[derive(Component, Debug, Clone, Copy, Default, PartialEq)]
pub struct LatestObservation(pub Observation);

/// Episode counter and tick count within the current episode.
#[derive(Component, Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EpisodeProgress {
    pub number: u32,
    pub steps: u32,
    /// Set when an episode ended during the latest tick.
    pub done: bool,
}

// ============================================================================
// BUNDLE HELPERS
// ============================================================================

/// Bundle for spawning a complete forager entity.
#[derive(Bundle, Default)]
pub struct ForagerBundle {
    pub forager: Forager,
    pub pose: Pose,
    pub beak: Beak,
    pub nearest: NearestTarget,
    pub nectar: NectarObtained,
    pub rewards: RewardLedger,
    pub steering: Steering,
    pub action: PendingAction,
    pub manual: ManualControl,
    pub observation: LatestObservation,
    pub episode: EpisodeProgress,
}

impl ForagerBundle {
    pub fn new(mode: ForagerMode, beak: Beak) -> Self {
        Self {
            forager: Forager { mode, frozen: false },
            beak,
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Records every enable/disable signal.
    #[derive(Default)]
    struct ToggleLog(Vec<(ColliderHandle, bool)>);

    impl ColliderToggle for ToggleLog {
        fn set_collider_enabled(&mut self, handle: ColliderHandle, enabled: bool) {
            self.0.push((handle, enabled));
        }
    }

    fn source() -> NectarSource {
        NectarSource::new(Vec3::ZERO, Vec3::Y, ColliderHandle(1), ColliderHandle(2))
    }

    #[test]
    fn test_feed_takes_min_of_request_and_remaining() {
        for (start, amount) in [(1.0, 0.01), (1.0, 0.0), (0.3, 0.5), (0.25, 0.25), (1.0, 2.0)] {
            let mut s = source();
            let mut log = ToggleLog::default();
            s.feed(1.0 - start, &mut log);

            let taken = s.feed(amount, &mut log);
            assert!((taken - f32::min(amount, start)).abs() < 1e-6);
            assert!((s.nectar_amount() - f32::max(0.0, start - amount)).abs() < 1e-6);
        }
    }

    #[test]
    fn test_feed_to_empty_disables_both_colliders() {
        let mut s = source();
        let mut log = ToggleLog::default();

        let taken = s.feed(1.5, &mut log);

        assert_eq!(taken, 1.0);
        assert_eq!(s.nectar_amount(), 0.0);
        assert!(!s.has_nectar());
        assert_eq!(s.state(), SourceState::Empty);
        assert!(log.0.contains(&(ColliderHandle(1), false)));
        assert!(log.0.contains(&(ColliderHandle(2), false)));
    }

    #[test]
    fn test_empty_source_yields_nothing_until_reset() {
        let mut s = source();
        let mut log = ToggleLog::default();
        s.feed(1.0, &mut log);

        assert_eq!(s.feed(0.01, &mut log), 0.0);
        assert!(!s.has_nectar());

        s.reset(&mut log);
        assert_eq!(s.nectar_amount(), 1.0);
        assert!(s.has_nectar());
        assert_eq!(s.state(), SourceState::Full);
        assert_eq!(log.0.last(), Some(&(ColliderHandle(1), true)));
    }

    #[test]
    fn test_negative_feed_never_adds_nectar() {
        let mut s = source();
        let mut log = ToggleLog::default();
        s.feed(0.5, &mut log);

        assert_eq!(s.feed(-3.0, &mut log), 0.0);
        assert_eq!(s.feed(f32::NAN, &mut log), 0.0);
        assert!((s.nectar_amount() - 0.5).abs() < 1e-6);
        assert!(log.0.is_empty());
    }

    #[test]
    fn test_state_colors_differ() {
        assert_ne!(SourceState::Full.color(), SourceState::Empty.color());
    }

    #[test]
    fn test_look_rotation_points_forward_axis() {
        let dir = Vec3::new(1.0, -1.0, 0.5);
        let rot = look_rotation(dir, Vec3::Y);
        let fwd = rot * Vec3::Z;
        assert!(fwd.abs_diff_eq(dir.normalize(), 1e-5));
        // Up stays on the world-up side.
        assert!((rot * Vec3::Y).y > 0.0);
    }

    #[test]
    fn test_look_rotation_degenerate_cases() {
        assert_eq!(look_rotation(Vec3::ZERO, Vec3::Y), Quat::IDENTITY);
        let rot = look_rotation(Vec3::NEG_Y, Vec3::Y);
        assert!((rot * Vec3::Z).abs_diff_eq(Vec3::NEG_Y, 1e-5));
    }

    #[test]
    fn test_action_sanitized() {
        let action = Action([2.0, -3.0, f32::NAN, 0.5, f32::INFINITY]).sanitized();
        assert_eq!(action.0, [1.0, -1.0, 0.0, 0.5, 0.0]);
    }

    #[test]
    fn test_cluster_mount_follows_rotation() {
        let cluster = PlantCluster {
            pivot: Vec3::new(1.0, 0.0, 0.0),
            rotation: Quat::from_rotation_y(std::f32::consts::FRAC_PI_2),
        };
        let mount = ClusterMount { cluster: Entity::from_raw(0), offset: Vec3::Z, up: Vec3::Z };
        let (pos, up) = mount.world_pose(&cluster);
        assert!(pos.abs_diff_eq(Vec3::new(2.0, 0.0, 0.0), 1e-5));
        assert!(up.abs_diff_eq(Vec3::X, 1e-5));
    }
}
