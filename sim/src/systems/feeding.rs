//! Feeding protocol and reward shaping.
//!
//! Drains the tick's contact queue. A nectar contact feeds only when the
//! beak tip actually touches the nectar volume, and is re-checked on every
//! tick the contact persists. Touching the boundary costs a fixed penalty
//! once per contact.
//!
//! ## Faults
//!
//! A nectar contact naming a collider the registry does not know is a
//! broken scene. Systems cannot return errors, so the fault is logged and
//! recorded in [`SimFaults`] for the caller of the tick to surface.

use crate::collision::{CollisionBackend, ContactEvent, ContactKind, ContactQueue};
use crate::components::*;
use crate::config::SimConfig;
use crate::error::SimError;
use crate::registry::SpatialRegistry;
use crate::systems::tracker::nearest_with_nectar;
use bevy_ecs::prelude::*;
use glam::Vec3;
use std::collections::HashMap;
use tracing::{debug, error};

/// Integrity faults raised by systems during the current tick.
#[derive(Resource, Debug, Default)]
pub struct SimFaults(pub Vec<SimError>);

impl SimFaults {
    pub fn record(&mut self, fault: SimError) {
        error!(%fault, "Simulation fault");
        self.0.push(fault);
    }

    /// Removes and returns the first recorded fault, dropping the rest.
    pub fn take_first(&mut self) -> Option<SimError> {
        let mut faults = std::mem::take(&mut self.0).into_iter();
        faults.next()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Reward for one successful feeding contact.
///
/// `base_reward` plus `alignment_bonus_scale` times how squarely the agent
/// faces down the target's approach axis, clamped to `[0, 1]`.
pub fn alignment_reward(forward: Vec3, target_up: Vec3, config: &SimConfig) -> f32 {
    let alignment = forward.normalize_or_zero().dot(-target_up.normalize_or_zero());
    config.base_reward + config.alignment_bonus_scale * alignment.clamp(0.0, 1.0)
}

/// System that turns contacts into nectar, rewards and penalties.
///
/// ## Data Access
/// - Reads: SpatialRegistry, SimConfig, Forager, BodyHandle, Pose, Beak
/// - Writes: ContactQueue, CollisionBackend, SimFaults, NectarSource,
///   NearestTarget, NectarObtained, RewardLedger
#[allow(clippy::type_complexity)]
pub fn feeding_system(
    mut contacts: ResMut<ContactQueue>,
    registry: Res<SpatialRegistry>,
    config: Res<SimConfig>,
    mut backend: ResMut<CollisionBackend>,
    mut faults: ResMut<SimFaults>,
    mut sources: Query<&mut NectarSource>,
    mut agents: Query<(
        Entity,
        &Forager,
        &BodyHandle,
        &Pose,
        &Beak,
        &mut NearestTarget,
        &mut NectarObtained,
        &mut RewardLedger,
    )>,
) {
    if contacts.is_empty() {
        return;
    }
    let events: Vec<ContactEvent> = contacts.drain().collect();
    let bodies: HashMap<ColliderHandle, Entity> = agents.iter().map(|(e, _, body, ..)| (body.0, e)).collect();

    for event in events {
        let Some(&agent) = bodies.get(&event.body) else {
            continue;
        };
        let Ok((_, forager, _, pose, beak, mut target, mut obtained, mut ledger)) = agents.get_mut(agent) else {
            continue;
        };

        match event.tag {
            ColliderTag::Nectar => {
                let tip = beak.tip(pose);
                let Some(closest) = backend.closest_point(event.collider, tip) else {
                    continue;
                };
                if closest.distance(tip) >= config.beak_tip_radius {
                    continue;
                }

                let fed = match registry.lookup(event.collider) {
                    Ok(entity) => entity,
                    Err(fault) => {
                        faults.record(fault);
                        continue;
                    }
                };
                let (taken, fed_up, emptied) = {
                    let Ok(mut source) = sources.get_mut(fed) else {
                        faults.record(SimError::UnknownCollider(event.collider));
                        continue;
                    };
                    let taken = source.feed(config.feed_dose, &mut **backend);
                    (taken, source.up, !source.has_nectar())
                };
                obtained.0 += taken;

                if forager.mode.emits_rewards() {
                    let target_up = target
                        .0
                        .and_then(|t| sources.get(t).ok())
                        .map_or(fed_up, |s| s.up);
                    ledger.add(alignment_reward(pose.forward(), target_up, &config));
                }

                if emptied {
                    let candidates = registry
                        .sources()
                        .iter()
                        .filter_map(|&e| sources.get(e).ok().map(|s| (e, s)));
                    target.0 = nearest_with_nectar(tip, candidates);
                    debug!(?agent, source = ?fed, nearest = ?target.0, "Source emptied");
                }
            }
            ColliderTag::Boundary if event.kind == ContactKind::Enter => {
                if forager.mode.emits_rewards() {
                    ledger.add(config.boundary_penalty);
                }
            }
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene::{NectarDef, SceneNodeDesc};
    use crate::sphere_world::SphereWorld;

    #[test]
    fn test_reward_aligned_and_opposed() {
        let config = SimConfig::default();
        let aligned = alignment_reward(Vec3::Z, Vec3::NEG_Z, &config);
        assert!((aligned - 0.03).abs() < 1e-6);

        let opposed = alignment_reward(Vec3::Z, Vec3::Z, &config);
        assert_eq!(opposed, 0.01);
        let sideways = alignment_reward(Vec3::Z, Vec3::X, &config);
        assert_eq!(sideways, 0.01);
    }

    struct Arena {
        world: World,
        agent: Entity,
        sources: Vec<Entity>,
        body: ColliderHandle,
        nectar: Vec<ColliderHandle>,
    }

    /// Two flowers facing -Z; the agent's beak tip sits inside the first.
    fn arena(mode: ForagerMode) -> Arena {
        let mut backend = SphereWorld::new();
        let near = Vec3::new(0.0, 1.0, 1.0);
        let far = Vec3::new(0.0, 1.0, 3.0);
        let flowers = [backend.add_flower(near, Vec3::NEG_Z), backend.add_flower(far, Vec3::NEG_Z)];
        let body = backend.add_body(Vec3::new(0.0, 1.0, 0.9), 0.05, 1.0);

        let nodes = [near, far]
            .iter()
            .zip(flowers)
            .map(|(pos, (nectar, petal))| {
                SceneNodeDesc::flower("f", *pos, NectarDef { nectar_collider: nectar, petal_collider: petal, up: Vec3::NEG_Z })
            })
            .collect();
        let root = SceneNodeDesc::group("area", Vec3::ZERO, nodes);

        let mut world = World::new();
        let registry = SpatialRegistry::build(&mut world, &root).unwrap();
        let sources = registry.sources().to_vec();
        world.insert_resource(registry);
        world.insert_resource(SimConfig::default());
        world.insert_resource(CollisionBackend::new(backend));
        world.insert_resource(ContactQueue::default());
        world.insert_resource(SimFaults::default());

        let mut bundle = ForagerBundle::new(mode, Beak::default());
        bundle.pose = Pose::new(Vec3::new(0.0, 1.0, 0.9), glam::Quat::IDENTITY);
        bundle.nearest = NearestTarget(Some(sources[0]));
        let agent = world.spawn((bundle, BodyHandle(body))).id();

        Arena {
            world,
            agent,
            sources,
            body,
            nectar: flowers.iter().map(|f| f.0).collect(),
        }
    }

    fn contact(arena: &mut Arena, collider: ColliderHandle, tag: ColliderTag, kind: ContactKind) {
        let body = arena.body;
        arena
            .world
            .resource_mut::<ContactQueue>()
            .push(ContactEvent { body, collider, tag, kind });
    }

    fn run_feeding(world: &mut World) {
        let mut schedule = Schedule::default();
        schedule.add_systems(feeding_system);
        schedule.run(world);
    }

    #[test]
    fn test_touching_contact_feeds_one_dose() {
        let mut arena = arena(ForagerMode::Training);
        let nectar = arena.nectar[0];
        contact(&mut arena, nectar, ColliderTag::Nectar, ContactKind::Enter);
        run_feeding(&mut arena.world);

        let source = arena.world.get::<NectarSource>(arena.sources[0]).unwrap();
        assert!((source.nectar_amount() - 0.99).abs() < 1e-6);
        let obtained = arena.world.get::<NectarObtained>(arena.agent).unwrap().0;
        assert!((obtained - 0.01).abs() < 1e-6);
        // Agent faces +Z, flower up is -Z: fully aligned.
        let ledger = arena.world.get::<RewardLedger>(arena.agent).unwrap();
        assert!((ledger.step - 0.03).abs() < 1e-6);
        assert!(arena.world.resource::<ContactQueue>().is_empty());
    }

    #[test]
    fn test_distant_beak_does_not_feed() {
        let mut arena = arena(ForagerMode::Training);
        arena.world.get_mut::<Pose>(arena.agent).unwrap().position = Vec3::new(0.0, 1.0, 0.5);
        let nectar = arena.nectar[0];
        contact(&mut arena, nectar, ColliderTag::Nectar, ContactKind::Stay);
        run_feeding(&mut arena.world);

        assert_eq!(arena.world.get::<NectarSource>(arena.sources[0]).unwrap().nectar_amount(), 1.0);
        assert_eq!(arena.world.get::<RewardLedger>(arena.agent).unwrap().step, 0.0);
    }

    #[test]
    fn test_gameplay_mode_feeds_without_reward() {
        let mut arena = arena(ForagerMode::Gameplay);
        let nectar = arena.nectar[0];
        contact(&mut arena, nectar, ColliderTag::Nectar, ContactKind::Stay);
        contact(&mut arena, ColliderHandle(0), ColliderTag::Boundary, ContactKind::Enter);
        run_feeding(&mut arena.world);

        assert!(arena.world.get::<NectarObtained>(arena.agent).unwrap().0 > 0.0);
        assert_eq!(*arena.world.get::<RewardLedger>(arena.agent).unwrap(), RewardLedger::default());
    }

    #[test]
    fn test_emptying_source_retargets_and_disables_colliders() {
        let mut arena = arena(ForagerMode::Training);
        let nectar = arena.nectar[0];
        for _ in 0..110 {
            contact(&mut arena, nectar, ColliderTag::Nectar, ContactKind::Stay);
            run_feeding(&mut arena.world);
        }

        let source = arena.world.get::<NectarSource>(arena.sources[0]).unwrap().clone();
        assert!(!source.has_nectar());
        let backend = arena.world.resource::<CollisionBackend>();
        assert!(backend.closest_point(source.nectar_collider, Vec3::ZERO).is_none());
        assert!(backend.closest_point(source.petal_collider, Vec3::ZERO).is_none());
        assert_eq!(arena.world.get::<NearestTarget>(arena.agent).unwrap().0, Some(arena.sources[1]));

        // Further contacts with the disabled collider do nothing.
        let before = arena.world.get::<NectarObtained>(arena.agent).unwrap().0;
        contact(&mut arena, nectar, ColliderTag::Nectar, ContactKind::Stay);
        run_feeding(&mut arena.world);
        assert_eq!(arena.world.get::<NectarObtained>(arena.agent).unwrap().0, before);
    }

    #[test]
    fn test_boundary_penalty_once_per_contact() {
        let mut arena = arena(ForagerMode::Training);
        contact(&mut arena, ColliderHandle(0), ColliderTag::Boundary, ContactKind::Enter);
        contact(&mut arena, ColliderHandle(0), ColliderTag::Boundary, ContactKind::Stay);
        run_feeding(&mut arena.world);

        assert_eq!(arena.world.get::<RewardLedger>(arena.agent).unwrap().step, -0.5);
    }

    #[test]
    fn test_unknown_nectar_collider_is_a_fault() {
        let mut arena = arena(ForagerMode::Training);
        // Same arena, but the collision world reports a nectar trigger at
        // the beak tip that no source registered.
        let mut world = SphereWorld::new();
        for _ in 0..10 {
            world.add_collider(Vec3::splat(100.0), 0.01, ColliderTag::Obstacle, true);
        }
        let unknown = world.add_collider(Vec3::new(0.0, 1.0, 1.0), 0.02, ColliderTag::Nectar, true);
        arena.world.insert_resource(CollisionBackend::new(world));
        contact(&mut arena, unknown, ColliderTag::Nectar, ContactKind::Enter);
        run_feeding(&mut arena.world);

        let mut faults = arena.world.resource_mut::<SimFaults>();
        assert!(matches!(faults.take_first(), Some(SimError::UnknownCollider(h)) if h == unknown));
        assert!(faults.is_empty());
    }
}
