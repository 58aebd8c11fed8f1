use serde::{Deserialize, Serialize};

use crate::geometry::Range3d;

/// Tile tree metadata as returned by a backend.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TileTreeProps {
    pub id: String,
    /// Packed `major << 16 | minor` version of the tiles the backend produces.
    #[serde(default)]
    pub format_version: Option<u32>,
    pub root_tile: TileProps,
    #[serde(default)]
    pub max_tiles_to_skip: u32,
    #[serde(default = "default_is_3d", rename = "is3d")]
    pub is_3d: bool,
}

fn default_is_3d() -> bool {
    true
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TileProps {
    pub content_id: String,
    pub range: Range3d,
    #[serde(default)]
    pub content_range: Option<Range3d>,
    #[serde(default)]
    pub is_leaf: bool,
}

impl TileTreeProps {
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Major format version, if the backend reported one.
    pub fn major_version(&self) -> Option<u16> {
        self.format_version.map(|v| (v >> 16) as u16)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_backend_json() {
        let json = r#"{
            "id": "4_0-0x1c",
            "formatVersion": 262144,
            "rootTile": {
                "contentId": "0/0/0/0/1",
                "range": { "low": [-10.0, -10.0, -1.0], "high": [10.0, 10.0, 1.0] },
                "isLeaf": false
            },
            "maxTilesToSkip": 1
        }"#;

        let props = TileTreeProps::from_json(json).unwrap();
        assert_eq!(props.id, "4_0-0x1c");
        assert_eq!(props.major_version(), Some(4));
        assert_eq!(props.root_tile.content_id, "0/0/0/0/1");
        assert!(!props.root_tile.is_leaf);
        assert!(props.root_tile.content_range.is_none());
        assert_eq!(props.max_tiles_to_skip, 1);
        assert!(props.is_3d);
    }

    #[test]
    fn test_json_round_trip_preserves_fields() {
        let json = r#"{"id":"0x1c","rootTile":{"contentId":"0/0/0/0/1","range":{"low":[0.0,0.0,0.0],"high":[1.0,1.0,0.0]}},"is3d":false}"#;
        let props = TileTreeProps::from_json(json).unwrap();
        assert!(!props.is_3d);
        assert_eq!(props.format_version, None);

        let again = TileTreeProps::from_json(&props.to_json().unwrap()).unwrap();
        assert_eq!(again, props);
    }
}
