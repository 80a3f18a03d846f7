use serde::{Deserialize, Serialize};

/// A 3-component vector, serialized as a `[x, y, z]` JSON array.
pub type Vec3 = [f32; 3];

/// Geometry used to build the visual object for an item. Fixed once the
/// item exists; no patch can change it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MeshType {
    Cube,
    Sphere,
    Cylinder,
    Plane,
}

/// One controllable object in an organization's scene.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SceneItem {
    pub id: String,
    pub mesh_type: MeshType,
    pub position: Vec3,
    /// Euler angles in radians, one per axis.
    pub rotation: Vec3,
    /// CSS/hex color. `None` renders with the default material color.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
}

/// Full, authoritative scene for one organization, as returned by the
/// snapshot endpoint.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Scene {
    pub name: String,
    pub items: Vec<SceneItem>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scene_deserializes_wire_shape() {
        let json = r##"{
            "name": "test scene",
            "items": [
                {"meshType": "Cube", "id": "0", "position": [3, 0, 0], "rotation": [1, 0, 1], "color": "#af00f0"},
                {"meshType": "Plane", "id": "1", "position": [0, 0, 0], "rotation": [-1, 0, -1]}
            ]
        }"##;

        let scene: Scene = serde_json::from_str(json).unwrap();
        assert_eq!(scene.name, "test scene");
        assert_eq!(scene.items.len(), 2);
        assert_eq!(scene.items[0].mesh_type, MeshType::Cube);
        assert_eq!(scene.items[0].position, [3.0, 0.0, 0.0]);
        assert_eq!(scene.items[0].color.as_deref(), Some("#af00f0"));
        assert_eq!(scene.items[1].mesh_type, MeshType::Plane);
        assert_eq!(scene.items[1].color, None);
    }

    #[test]
    fn test_unknown_mesh_type_is_rejected() {
        let json = r#"{"meshType": "Torus", "id": "0", "position": [0,0,0], "rotation": [0,0,0]}"#;
        assert!(serde_json::from_str::<SceneItem>(json).is_err());
    }

    #[test]
    fn test_item_serializes_camel_case_without_empty_color() {
        let item = SceneItem {
            id: "a".into(),
            mesh_type: MeshType::Sphere,
            position: [1.0, 2.0, 3.0],
            rotation: [0.0, 0.0, 0.0],
            color: None,
        };
        let value = serde_json::to_value(&item).unwrap();
        assert_eq!(value["meshType"], "Sphere");
        assert!(value.get("color").is_none());
    }
}
