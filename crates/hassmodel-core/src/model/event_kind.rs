// ── Registry invalidation event kinds ──

use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};

/// Hub events announcing that a registry changed.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    AsRefStr,
    Display,
    EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum RegistryEventKind {
    AreaRegistryUpdated,
    DeviceRegistryUpdated,
    EntityRegistryUpdated,
    LabelRegistryUpdated,
    FloorRegistryUpdated,
}

impl RegistryEventKind {
    pub const fn all() -> &'static [Self] {
        &[
            Self::AreaRegistryUpdated,
            Self::DeviceRegistryUpdated,
            Self::EntityRegistryUpdated,
            Self::LabelRegistryUpdated,
            Self::FloorRegistryUpdated,
        ]
    }
}
