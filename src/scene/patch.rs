use serde::{Deserialize, Serialize};

use crate::error::ProtocolError;
use crate::scene::item::{SceneItem, Vec3};

/// Partial update for one scene item. A `None` field means "leave as is".
///
/// Unknown field names are rejected so a relay cannot write arbitrary
/// attributes into the working copy.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct DeltaPatch {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<Vec3>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rotation: Option<Vec3>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
}

/// Patches applied in sequence order.
pub type PatchBatch = Vec<DeltaPatch>;

impl DeltaPatch {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Default::default()
        }
    }

    pub fn with_position(mut self, position: Vec3) -> Self {
        self.position = Some(position);
        self
    }

    pub fn with_rotation(mut self, rotation: Vec3) -> Self {
        self.rotation = Some(rotation);
        self
    }

    pub fn with_color(mut self, color: impl Into<String>) -> Self {
        self.color = Some(color.into());
        self
    }

    /// True when the patch carries no field besides the id.
    pub fn is_empty(&self) -> bool {
        self.position.is_none() && self.rotation.is_none() && self.color.is_none()
    }

    /// Overwrites exactly the fields present in the patch.
    pub fn merge_into(&self, item: &mut SceneItem) {
        if let Some(position) = self.position {
            item.position = position;
        }
        if let Some(rotation) = self.rotation {
            item.rotation = rotation;
        }
        if let Some(color) = &self.color {
            item.color = Some(color.clone());
        }
    }
}

/// Decodes one websocket text message into a batch.
///
/// The relay forwards whatever the game server sends, and game servers emit
/// either an array of patches or a single patch object per message; both are
/// accepted, the latter as a batch of one.
pub fn parse_batch(text: &str) -> Result<PatchBatch, ProtocolError> {
    match text.trim_start().chars().next() {
        Some('[') => Ok(serde_json::from_str::<PatchBatch>(text)?),
        Some('{') => Ok(vec![serde_json::from_str::<DeltaPatch>(text)?]),
        _ => {
            // Surface serde's own diagnostic for non-JSON input; valid JSON
            // scalars get the shape error.
            match serde_json::from_str::<serde_json::Value>(text) {
                Err(e) => Err(ProtocolError::Malformed(e)),
                Ok(value) => Err(ProtocolError::NotABatch(value.to_string())),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene::item::MeshType;

    #[test]
    fn test_parse_batch_array() {
        let batch = parse_batch(
            r##"[{"id":"a","color":"#ff0000"},{"id":"b","position":[1,2,3],"rotation":[0,0.5,0]}]"##,
        )
        .unwrap();

        assert_eq!(batch.len(), 2);
        assert_eq!(batch[0], DeltaPatch::new("a").with_color("#ff0000"));
        assert_eq!(
            batch[1],
            DeltaPatch::new("b")
                .with_position([1.0, 2.0, 3.0])
                .with_rotation([0.0, 0.5, 0.0])
        );
    }

    #[test]
    fn test_parse_batch_single_object() {
        let batch = parse_batch(r#"  {"id":"7","rotation":[1,1,1]}"#).unwrap();
        assert_eq!(batch, vec![DeltaPatch::new("7").with_rotation([1.0, 1.0, 1.0])]);
    }

    #[test]
    fn test_null_fields_mean_no_change() {
        let batch = parse_batch(r#"[{"id":"a","position":null,"color":null}]"#).unwrap();
        assert!(batch[0].is_empty());
    }

    #[test]
    fn test_unknown_field_is_protocol_error() {
        let err = parse_batch(r#"[{"id":"a","meshType":"Sphere"}]"#).unwrap_err();
        assert!(matches!(err, ProtocolError::Malformed(_)));
    }

    #[test]
    fn test_wrong_vector_arity_is_protocol_error() {
        assert!(parse_batch(r#"[{"id":"a","position":[1,2]}]"#).is_err());
    }

    #[test]
    fn test_non_json_is_protocol_error() {
        assert!(matches!(
            parse_batch("definitely not json"),
            Err(ProtocolError::Malformed(_))
        ));
        assert!(matches!(parse_batch("42"), Err(ProtocolError::NotABatch(_))));
        assert!(parse_batch("").is_err());
    }

    #[test]
    fn test_merge_into_touches_only_present_fields() {
        let mut item = SceneItem {
            id: "a".into(),
            mesh_type: MeshType::Cube,
            position: [1.0, 1.0, 1.0],
            rotation: [0.2, 0.0, 0.0],
            color: Some("red".into()),
        };

        DeltaPatch::new("a").with_rotation([0.0, 3.0, 0.0]).merge_into(&mut item);

        assert_eq!(item.position, [1.0, 1.0, 1.0]);
        assert_eq!(item.rotation, [0.0, 3.0, 0.0]);
        assert_eq!(item.color.as_deref(), Some("red"));
    }
}
