// ── Registry records ──
//
// Structural metadata from the hub's area, device, and entity registries.
// Distinct from live state: these change rarely and are re-fetched
// wholesale when the hub announces a registry update.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HassArea {
    #[serde(alias = "area_id")]
    pub id: String,

    #[serde(default)]
    pub name: String,

    #[serde(default)]
    pub floor_id: Option<String>,

    #[serde(default)]
    pub labels: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HassDevice {
    pub id: String,

    #[serde(default)]
    pub name: Option<String>,

    #[serde(default)]
    pub area_id: Option<String>,

    #[serde(default)]
    pub labels: Vec<String>,
}

/// Entity registry entry.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HassEntity {
    pub entity_id: String,

    #[serde(default)]
    pub name: Option<String>,

    #[serde(default)]
    pub device_id: Option<String>,

    #[serde(default)]
    pub area_id: Option<String>,

    #[serde(default)]
    pub labels: Vec<String>,
}
