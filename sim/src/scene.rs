//! Scene description consumed once when an area is built.
//!
//! The registry only needs a tree of typed nodes: plant containers,
//! nodes that carry a nectar source, and everything else. Hosts can feed
//! their own scene graph through [`SceneNode`] or load [`SceneNodeDesc`]
//! from JSON.

use crate::components::ColliderHandle;
use crate::error::SimError;
use glam::{EulerRot, Quat, Vec3};
use serde::{Deserialize, Serialize};

/// Tag that marks a node as a plant container.
pub const PLANT_TAG: &str = "flower_plant";

/// Harvestable source data attached to a scene node.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NectarDef {
    pub nectar_collider: ColliderHandle,
    pub petal_collider: ColliderHandle,
    /// Up axis of the harvest point in area space.
    pub up: Vec3,
}

/// What a node contributes to the registry.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum NodeKind {
    /// Groups sources that rotate together; `rotation` is its rest orientation.
    PlantContainer { rotation: Quat },
    NectarSource(NectarDef),
    Other,
}

/// Abstract read-only scene node.
pub trait SceneNode: Sized {
    fn kind(&self) -> NodeKind;

    /// Area-space position (the harvest point for source nodes).
    fn position(&self) -> Vec3;

    fn children(&self) -> &[Self];
}

/// Serde-loadable scene node.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SceneNodeDesc {
    pub name: String,
    pub tag: Option<String>,
    pub position: Vec3,
    /// Rest orientation as XYZ Euler angles in degrees (applied Y, X, Z).
    pub rotation_deg: Vec3,
    pub nectar: Option<NectarDef>,
    pub children: Vec<SceneNodeDesc>,
}

impl SceneNodeDesc {
    pub fn from_json_str(json: &str) -> Result<Self, SimError> {
        Ok(serde_json::from_str(json)?)
    }

    /// An untagged grouping node.
    pub fn group(name: &str, position: Vec3, children: Vec<SceneNodeDesc>) -> Self {
        Self {
            name: name.to_string(),
            position,
            children,
            ..Default::default()
        }
    }

    /// A plant container at `position`.
    pub fn plant(name: &str, position: Vec3, children: Vec<SceneNodeDesc>) -> Self {
        Self {
            tag: Some(PLANT_TAG.to_string()),
            ..Self::group(name, position, children)
        }
    }

    /// A flower whose harvest point sits at `position`.
    pub fn flower(name: &str, position: Vec3, def: NectarDef) -> Self {
        Self {
            name: name.to_string(),
            position,
            nectar: Some(def),
            ..Default::default()
        }
    }
}

impl SceneNode for SceneNodeDesc {
    fn kind(&self) -> NodeKind {
        if self.tag.as_deref() == Some(PLANT_TAG) {
            let r = self.rotation_deg;
            NodeKind::PlantContainer {
                rotation: Quat::from_euler(EulerRot::YXZ, r.y.to_radians(), r.x.to_radians(), r.z.to_radians()),
            }
        } else if let Some(def) = self.nectar {
            NodeKind::NectarSource(def)
        } else {
            NodeKind::Other
        }
    }

    fn position(&self) -> Vec3 {
        self.position
    }

    fn children(&self) -> &[Self] {
        &self.children
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_from_tag_and_payload() {
        let def = NectarDef {
            nectar_collider: ColliderHandle(1),
            petal_collider: ColliderHandle(2),
            up: Vec3::Y,
        };
        assert!(matches!(SceneNodeDesc::plant("p", Vec3::ZERO, vec![]).kind(), NodeKind::PlantContainer { .. }));
        assert!(matches!(SceneNodeDesc::flower("f", Vec3::ZERO, def).kind(), NodeKind::NectarSource(_)));
        assert_eq!(SceneNodeDesc::group("g", Vec3::ZERO, vec![]).kind(), NodeKind::Other);
    }

    #[test]
    fn test_scene_loads_from_json() {
        let json = r#"{
            "name": "area",
            "children": [
                { "tag": "flower_plant", "position": [1.0, 0.0, 0.0], "children": [
                    { "name": "f0", "position": [1.0, 0.5, 0.0],
                      "nectar": { "nectar_collider": 10, "petal_collider": 11, "up": [0.0, 0.0, 1.0] } }
                ] }
            ]
        }"#;
        let scene = SceneNodeDesc::from_json_str(json).unwrap();
        let plant = &scene.children()[0];
        assert!(matches!(plant.kind(), NodeKind::PlantContainer { .. }));
        let flower = &plant.children()[0];
        match flower.kind() {
            NodeKind::NectarSource(def) => assert_eq!(def.nectar_collider, ColliderHandle(10)),
            other => panic!("unexpected kind {other:?}"),
        }
    }
}
