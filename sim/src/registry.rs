//! Spatial registry of the nectar sources in one area.
//!
//! Built once from a scene tree. After construction the entity lists and
//! the collider lookup never change; only the sources' own state does.

use crate::collision::CollisionBackend;
use crate::components::*;
use crate::config::{SimConfig, SimRng};
use crate::error::SimError;
use crate::scene::{NodeKind, SceneNode};
use bevy_ecs::prelude::*;
use glam::{EulerRot, Quat, Vec3};
use rand::Rng;
use std::collections::HashMap;
use tracing::info;

/// Per-area index of plants, sources and harvest colliders.
#[derive(Resource, Debug, Default)]
pub struct SpatialRegistry {
    /// Sources in discovery order.
    sources: Vec<Entity>,
    /// Plant containers in discovery order.
    clusters: Vec<Entity>,
    /// Nectar collider to the source that owns it.
    handle_to_source: HashMap<ColliderHandle, Entity>,
    /// Area origin (position of the scene root).
    origin: Vec3,
}

/// Scene contents gathered before anything is spawned.
#[derive(Default)]
struct Discovery {
    /// Plants with the index of their enclosing plant.
    clusters: Vec<(PlantCluster, Option<usize>)>,
    sources: Vec<(NectarSource, Option<usize>)>,
    handles: HashMap<ColliderHandle, usize>,
}

impl SpatialRegistry {
    /// Discover every plant and source under `root`, spawn them into
    /// `world` and index their nectar colliders.
    ///
    /// A plant container is recorded and searched; a source node is
    /// recorded and not searched further; any other node is searched.
    /// Nothing is spawned if the scene registers a nectar collider twice.
    pub fn build<N: SceneNode>(world: &mut World, root: &N) -> Result<Self, SimError> {
        let mut found = Discovery::default();
        discover(root, None, &mut found)?;

        let mut clusters: Vec<Entity> = Vec::with_capacity(found.clusters.len());
        for &(plant, parent_index) in &found.clusters {
            // Parents are discovered before their children.
            let link = parent_index.map(|i| {
                let (parent, _) = found.clusters[i];
                let inverse = parent.rotation.inverse();
                ClusterParent {
                    parent: clusters[i],
                    offset: inverse * (plant.pivot - parent.pivot),
                    local_rotation: inverse * plant.rotation,
                }
            });
            let entity = match link {
                Some(link) => world.spawn((plant, link)).id(),
                None => world.spawn(plant).id(),
            };
            clusters.push(entity);
        }

        let mut sources = Vec::with_capacity(found.sources.len());
        let mut handle_to_source = HashMap::with_capacity(found.sources.len());
        for (source, cluster_index) in found.sources {
            let handle = source.nectar_collider;
            let mount = cluster_index.map(|i| {
                let (plant, _) = &found.clusters[i];
                let inverse = plant.rotation.inverse();
                ClusterMount {
                    cluster: clusters[i],
                    offset: inverse * (source.position - plant.pivot),
                    up: inverse * source.up,
                }
            });
            let entity = match mount {
                Some(mount) => world.spawn((source, mount)).id(),
                None => world.spawn(source).id(),
            };
            handle_to_source.insert(handle, entity);
            sources.push(entity);
        }

        info!(
            clusters = clusters.len(),
            sources = sources.len(),
            "Area registry built"
        );

        Ok(Self {
            sources,
            clusters,
            handle_to_source,
            origin: root.position(),
        })
    }

    /// The source that owns a nectar collider.
    pub fn lookup(&self, handle: ColliderHandle) -> Result<Entity, SimError> {
        self.handle_to_source
            .get(&handle)
            .copied()
            .ok_or(SimError::UnknownCollider(handle))
    }

    pub fn sources(&self) -> &[Entity] {
        &self.sources
    }

    pub fn clusters(&self) -> &[Entity] {
        &self.clusters
    }

    pub fn origin(&self) -> Vec3 {
        self.origin
    }

    /// Discovery index of a source entity.
    pub fn index_of(&self, source: Entity) -> Option<usize> {
        self.sources.iter().position(|e| *e == source)
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }
}

fn discover<N: SceneNode>(node: &N, cluster: Option<usize>, found: &mut Discovery) -> Result<(), SimError> {
    for child in node.children() {
        match child.kind() {
            NodeKind::PlantContainer { rotation } => {
                let plant = PlantCluster {
                    pivot: child.position(),
                    rotation,
                };
                found.clusters.push((plant, cluster));
                let index = found.clusters.len() - 1;
                discover(child, Some(index), found)?;
            }
            NodeKind::NectarSource(def) => {
                if found.handles.contains_key(&def.nectar_collider) {
                    return Err(SimError::DuplicateCollider(def.nectar_collider));
                }
                found.handles.insert(def.nectar_collider, found.sources.len());
                let source = NectarSource::new(
                    child.position(),
                    def.up.normalize_or_zero(),
                    def.nectar_collider,
                    def.petal_collider,
                );
                found.sources.push((source, cluster));
            }
            NodeKind::Other => discover(child, cluster, found)?,
        }
    }
    Ok(())
}

/// System that re-orients every plant and refills every source.
///
/// Each plant gets a fresh tilt on X and Z within `plant_tilt_deg` and a
/// full random yaw, relative to the plant carrying it if any. Plants are
/// visited outermost first, so a nested plant's pivot follows its
/// parent's new pose. Sources are moved to follow their plant before they
/// are reset, so the refilled colliders sit at the final pose.
///
/// ## Data Access
/// - Reads: SpatialRegistry, SimConfig, ClusterParent, ClusterMount
/// - Writes: SimRng, CollisionBackend, PlantCluster, NectarSource
pub fn reset_area_system(
    registry: Res<SpatialRegistry>,
    config: Res<SimConfig>,
    mut rng: ResMut<SimRng>,
    mut backend: ResMut<CollisionBackend>,
    mut clusters: Query<(&mut PlantCluster, Option<&mut ClusterParent>)>,
    mut sources: Query<(&mut NectarSource, Option<&ClusterMount>)>,
) {
    let tilt = config.plant_tilt_deg.abs();

    for &entity in registry.clusters() {
        let x = rng.0.random_range(-tilt..=tilt);
        let y = rng.0.random_range(-180.0..=180.0f32);
        let z = rng.0.random_range(-tilt..=tilt);
        let local = Quat::from_euler(EulerRot::YXZ, y.to_radians(), x.to_radians(), z.to_radians());

        let parent = clusters
            .get(entity)
            .ok()
            .and_then(|(_, link)| link.copied())
            .and_then(|link| clusters.get(link.parent).ok().map(|(p, _)| *p));

        if let Ok((mut plant, link)) = clusters.get_mut(entity) {
            match (link, parent) {
                (Some(mut link), Some(parent)) => {
                    link.local_rotation = local;
                    let (pivot, rotation) = link.world_pose(&parent);
                    plant.pivot = pivot;
                    plant.rotation = rotation;
                }
                _ => plant.rotation = local,
            }
        }
    }

    for &entity in registry.sources() {
        let Ok((mut source, mount)) = sources.get_mut(entity) else {
            continue;
        };
        if let Some(mount) = mount {
            if let Ok((plant, _)) = clusters.get(mount.cluster) {
                let (position, up) = mount.world_pose(plant);
                source.position = position;
                source.up = up;
            }
        }
        backend.place_collider(source.nectar_collider, source.position, source.up);
        backend.place_collider(source.petal_collider, source.position, source.up);
        source.reset(&mut **backend);
    }

    info!(
        clusters = registry.clusters().len(),
        sources = registry.len(),
        "Area reset"
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene::{NectarDef, SceneNodeDesc};
    use crate::sphere_world::SphereWorld;

    fn def(n: u64) -> NectarDef {
        NectarDef {
            nectar_collider: ColliderHandle(n),
            petal_collider: ColliderHandle(n + 1000),
            up: Vec3::Y,
        }
    }

    fn sample_scene() -> SceneNodeDesc {
        SceneNodeDesc::group(
            "area",
            Vec3::new(0.0, 0.0, 0.0),
            vec![
                SceneNodeDesc::plant(
                    "plant_a",
                    Vec3::new(2.0, 0.0, 0.0),
                    vec![
                        SceneNodeDesc::flower("a0", Vec3::new(2.0, 1.0, 0.0), def(1)),
                        SceneNodeDesc::group(
                            "stem",
                            Vec3::new(2.0, 0.5, 0.0),
                            vec![SceneNodeDesc::flower("a1", Vec3::new(2.5, 1.0, 0.0), def(2))],
                        ),
                    ],
                ),
                SceneNodeDesc::flower("loose", Vec3::new(-3.0, 1.0, 0.0), def(3)),
                SceneNodeDesc::group(
                    "bed",
                    Vec3::ZERO,
                    vec![SceneNodeDesc::plant(
                        "plant_b",
                        Vec3::new(0.0, 0.0, 4.0),
                        vec![SceneNodeDesc::flower("b0", Vec3::new(0.0, 1.2, 4.0), def(4))],
                    )],
                ),
            ],
        )
    }

    #[test]
    fn test_build_discovers_depth_first() {
        let mut world = World::new();
        let registry = SpatialRegistry::build(&mut world, &sample_scene()).unwrap();

        assert_eq!(registry.clusters().len(), 2);
        assert_eq!(registry.len(), 4);

        let order: Vec<u64> = registry
            .sources()
            .iter()
            .map(|e| world.get::<NectarSource>(*e).unwrap().nectar_collider.0)
            .collect();
        assert_eq!(order, vec![1, 2, 3, 4]);

        // Sources under a plant carry a mount; the loose one does not.
        assert!(world.get::<ClusterMount>(registry.sources()[1]).is_some());
        assert!(world.get::<ClusterMount>(registry.sources()[2]).is_none());
    }

    #[test]
    fn test_source_node_children_are_not_searched() {
        let mut flower = SceneNodeDesc::flower("f", Vec3::ZERO, def(1));
        flower.children.push(SceneNodeDesc::flower("hidden", Vec3::ONE, def(2)));
        let root = SceneNodeDesc::group("area", Vec3::ZERO, vec![flower]);

        let mut world = World::new();
        let registry = SpatialRegistry::build(&mut world, &root).unwrap();
        assert_eq!(registry.len(), 1);
        assert!(registry.lookup(ColliderHandle(2)).is_err());
    }

    #[test]
    fn test_lookup_maps_every_nectar_collider() {
        let mut world = World::new();
        let registry = SpatialRegistry::build(&mut world, &sample_scene()).unwrap();

        for (i, entity) in registry.sources().iter().enumerate() {
            let handle = ColliderHandle(i as u64 + 1);
            assert_eq!(registry.lookup(handle).unwrap(), *entity);
        }
        assert!(matches!(
            registry.lookup(ColliderHandle(999)),
            Err(SimError::UnknownCollider(ColliderHandle(999)))
        ));
        // Petal colliders are not harvest colliders.
        assert!(registry.lookup(ColliderHandle(1001)).is_err());
    }

    #[test]
    fn test_duplicate_collider_spawns_nothing() {
        let root = SceneNodeDesc::group(
            "area",
            Vec3::ZERO,
            vec![
                SceneNodeDesc::flower("a", Vec3::ZERO, def(7)),
                SceneNodeDesc::flower("b", Vec3::ONE, def(7)),
            ],
        );
        let mut world = World::new();
        let result = SpatialRegistry::build(&mut world, &root);

        assert!(matches!(result, Err(SimError::DuplicateCollider(ColliderHandle(7)))));
        assert_eq!(world.entities().len(), 0);
    }

    fn reset_world(seed: u64) -> (World, Vec<(ColliderHandle, ColliderHandle)>) {
        let mut backend = SphereWorld::new();
        let flowers = vec![
            backend.add_flower(Vec3::new(2.0, 1.0, 0.0), Vec3::X),
            backend.add_flower(Vec3::new(2.0, 1.0, 0.5), Vec3::Z),
        ];
        let root = SceneNodeDesc::group(
            "area",
            Vec3::ZERO,
            vec![SceneNodeDesc::plant(
                "plant",
                Vec3::new(2.0, 0.0, 0.0),
                flowers
                    .iter()
                    .enumerate()
                    .map(|(i, (nectar, petal))| {
                        let pos = [Vec3::new(2.0, 1.0, 0.0), Vec3::new(2.0, 1.0, 0.5)][i];
                        let up = [Vec3::X, Vec3::Z][i];
                        SceneNodeDesc::flower("f", pos, NectarDef { nectar_collider: *nectar, petal_collider: *petal, up })
                    })
                    .collect(),
            )],
        );

        let mut world = World::new();
        let registry = SpatialRegistry::build(&mut world, &root).unwrap();
        world.insert_resource(registry);
        world.insert_resource(SimConfig { seed, ..Default::default() });
        world.insert_resource(SimRng::seeded(seed));
        world.insert_resource(CollisionBackend::new(backend));
        (world, flowers)
    }

    fn run_reset(world: &mut World) {
        let mut schedule = Schedule::default();
        schedule.add_systems(reset_area_system);
        schedule.run(world);
    }

    #[test]
    fn test_reset_area_refills_and_reenables() {
        let (mut world, _) = reset_world(3);
        let first = world.resource::<SpatialRegistry>().sources()[0];

        world.resource_scope(|world, mut backend: Mut<CollisionBackend>| {
            let mut source = world.get_mut::<NectarSource>(first).unwrap();
            source.feed(1.0, &mut **backend);
        });
        assert!(!world.get::<NectarSource>(first).unwrap().has_nectar());

        run_reset(&mut world);

        let source = world.get::<NectarSource>(first).unwrap().clone();
        assert_eq!(source.nectar_amount(), 1.0);
        assert_eq!(source.state(), SourceState::Full);
        let backend = world.resource::<CollisionBackend>();
        assert!(backend.closest_point(source.nectar_collider, source.position).is_some());
    }

    #[test]
    fn test_reset_area_rotates_plants_within_bounds() {
        let (mut world, _) = reset_world(11);
        run_reset(&mut world);

        let plant_entity = world.resource::<SpatialRegistry>().clusters()[0];
        let plant = *world.get::<PlantCluster>(plant_entity).unwrap();
        let (_, x, z) = plant.rotation.to_euler(EulerRot::YXZ);
        assert!(x.to_degrees().abs() <= 5.0 + 1e-3);
        assert!(z.to_degrees().abs() <= 5.0 + 1e-3);

        // Sources stay rigidly attached to the pivot.
        for &entity in world.resource::<SpatialRegistry>().sources() {
            let source = world.get::<NectarSource>(entity).unwrap();
            let mount = world.get::<ClusterMount>(entity).unwrap();
            let dist = source.position.distance(plant.pivot);
            assert!((dist - mount.offset.length()).abs() < 1e-4);
            assert!((source.up.length() - 1.0).abs() < 1e-4);
        }
    }

    #[test]
    fn test_nested_plant_follows_outer_plant() {
        let mut backend = SphereWorld::new();
        let flower = Vec3::new(3.0, 1.0, 0.0);
        let (nectar_collider, petal_collider) = backend.add_flower(flower, Vec3::Y);
        let root = SceneNodeDesc::group(
            "area",
            Vec3::ZERO,
            vec![SceneNodeDesc::plant(
                "outer",
                Vec3::ZERO,
                vec![SceneNodeDesc::plant(
                    "inner",
                    Vec3::new(3.0, 0.0, 0.0),
                    vec![SceneNodeDesc::flower("f", flower, NectarDef { nectar_collider, petal_collider, up: Vec3::Y })],
                )],
            )],
        );

        let mut world = World::new();
        let registry = SpatialRegistry::build(&mut world, &root).unwrap();
        let (outer, inner) = (registry.clusters()[0], registry.clusters()[1]);
        let source = registry.sources()[0];
        assert!(world.get::<ClusterParent>(outer).is_none());
        assert_eq!(world.get::<ClusterParent>(inner).unwrap().parent, outer);
        world.insert_resource(registry);
        world.insert_resource(SimConfig::default());
        world.insert_resource(SimRng::seeded(5));
        world.insert_resource(CollisionBackend::new(backend));

        let mut swung = false;
        for _ in 0..5 {
            run_reset(&mut world);

            let outer_plant = *world.get::<PlantCluster>(outer).unwrap();
            let inner_plant = *world.get::<PlantCluster>(inner).unwrap();
            let expected_pivot = outer_plant.rotation * Vec3::new(3.0, 0.0, 0.0);
            assert!(inner_plant.pivot.abs_diff_eq(expected_pivot, 1e-4));

            let position = world.get::<NectarSource>(source).unwrap().position;
            assert!((position.distance(inner_plant.pivot) - 1.0).abs() < 1e-4);
            swung |= position.distance(flower) > 0.5;
        }
        // Full random yaw on the outer plant carries the flower around the origin.
        assert!(swung);
    }

    #[test]
    fn test_reset_area_is_deterministic_per_seed() {
        let (mut a, _) = reset_world(42);
        let (mut b, _) = reset_world(42);
        run_reset(&mut a);
        run_reset(&mut b);

        let rotation = |world: &World| {
            let e = world.resource::<SpatialRegistry>().clusters()[0];
            world.get::<PlantCluster>(e).unwrap().rotation
        };
        assert_eq!(rotation(&a), rotation(&b));
    }
}
