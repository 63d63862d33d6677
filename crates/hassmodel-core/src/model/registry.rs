// ── Registry domain types ──

/// An area (room/zone) from the area registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Area {
    pub id: String,
    pub name: String,
    pub floor_id: Option<String>,
    pub labels: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Device {
    pub id: String,
    pub name: Option<String>,
    pub area_id: Option<String>,
    pub labels: Vec<String>,
}

/// An entity's registry entry (structural metadata, not live state).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityRegistration {
    pub entity_id: String,
    pub name: Option<String>,
    pub device_id: Option<String>,
    pub area_id: Option<String>,
    pub labels: Vec<String>,
}
