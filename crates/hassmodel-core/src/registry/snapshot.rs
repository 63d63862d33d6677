// ── Registry snapshot ──
//
// One consistent fetch of the three registries the derived indexes are
// built from.

use std::collections::HashMap;

use hassmodel_api::Transport;

use crate::error::CoreError;
use crate::model::{Area, Device, EntityRegistration};

/// Entities, devices and areas as fetched together.
#[derive(Debug, Clone, Default)]
pub struct RegistrySnapshot {
    pub entities: Vec<EntityRegistration>,
    pub devices: Vec<Device>,
    pub areas: Vec<Area>,
}

impl RegistrySnapshot {
    /// Fetch all three registries concurrently. Any failure fails the
    /// whole snapshot.
    pub async fn fetch<T: Transport>(transport: &T) -> Result<Self, CoreError> {
        let (entities, devices, areas) = tokio::try_join!(
            transport.get_entities(),
            transport.get_devices(),
            transport.get_areas(),
        )?;

        Ok(Self {
            entities: entities.into_iter().map(EntityRegistration::from).collect(),
            devices: devices.into_iter().map(Device::from).collect(),
            areas: areas.into_iter().map(Area::from).collect(),
        })
    }

    /// `device_id -> area_id` for devices placed in an area.
    pub(crate) fn device_areas(&self) -> HashMap<&str, &str> {
        self.devices
            .iter()
            .filter_map(|d| Some((d.id.as_str(), d.area_id.as_deref()?)))
            .collect()
    }
}

/// The entity's own area wins; otherwise it inherits its device's area.
pub(crate) fn resolve_area_id<'a>(
    entity: &'a EntityRegistration,
    device_areas: &HashMap<&'a str, &'a str>,
) -> Option<&'a str> {
    entity.area_id.as_deref().or_else(|| {
        entity
            .device_id
            .as_deref()
            .and_then(|device_id| device_areas.get(device_id).copied())
    })
}
