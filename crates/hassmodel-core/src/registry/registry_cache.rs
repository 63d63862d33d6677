// ── Registry navigation ──
//
// Lookups across the entity, device and area registries: which area an
// entity is in, what a device or area contains, which entities carry a
// label. Same snapshot, rebuild and failure policy as the area index.

use std::collections::HashMap;
use std::sync::Arc;

use hassmodel_api::Transport;
use tokio::sync::watch;

use super::refresh::RegistryBacked;
use super::snapshot::{RegistrySnapshot, resolve_area_id};
use crate::config::ModelConfig;
use crate::error::CoreError;
use crate::model::{Area, Device, EntityRegistration};

#[derive(Debug)]
struct RegistryIndex {
    entities: HashMap<String, Arc<EntityRegistration>>,
    devices: HashMap<String, Arc<Device>>,
    areas: HashMap<String, Arc<Area>>,
    /// Resolved `entity_id -> area_id`, entity area first, then device area.
    entity_areas: HashMap<String, String>,
}

impl RegistryIndex {
    fn build(snapshot: RegistrySnapshot) -> Self {
        let device_areas = snapshot.device_areas();
        let entity_areas = snapshot
            .entities
            .iter()
            .filter_map(|e| {
                let area_id = resolve_area_id(e, &device_areas)?;
                Some((e.entity_id.clone(), area_id.to_owned()))
            })
            .collect();

        Self {
            entity_areas,
            entities: snapshot
                .entities
                .into_iter()
                .map(|e| (e.entity_id.clone(), Arc::new(e)))
                .collect(),
            devices: snapshot
                .devices
                .into_iter()
                .map(|d| (d.id.clone(), Arc::new(d)))
                .collect(),
            areas: snapshot
                .areas
                .into_iter()
                .map(|a| (a.id.clone(), Arc::new(a)))
                .collect(),
        }
    }

    fn area_for_entity(&self, entity_id: &str) -> Option<Arc<Area>> {
        let area_id = self.entity_areas.get(entity_id)?;
        self.areas.get(area_id).cloned()
    }
}

/// Sorted by key so results are stable across rebuilds.
fn sorted_by<T>(mut items: Vec<Arc<T>>, key: impl Fn(&T) -> &str) -> Vec<Arc<T>> {
    items.sort_by(|a, b| key(a).cmp(key(b)));
    items
}

/// Navigable view of the hub's registries.
pub struct RegistryCache {
    inner: RegistryBacked<RegistryIndex>,
}

impl RegistryCache {
    pub async fn initialize<T: Transport>(
        transport: Arc<T>,
        config: &ModelConfig,
    ) -> Result<Self, CoreError> {
        let inner =
            RegistryBacked::initialize("registry-cache", transport, config, RegistryIndex::build)
                .await?;
        Ok(Self { inner })
    }

    pub fn entity(&self, entity_id: &str) -> Option<Arc<EntityRegistration>> {
        self.inner.load().entities.get(entity_id).cloned()
    }

    pub fn device(&self, device_id: &str) -> Option<Arc<Device>> {
        self.inner.load().devices.get(device_id).cloned()
    }

    pub fn area(&self, area_id: &str) -> Option<Arc<Area>> {
        self.inner.load().areas.get(area_id).cloned()
    }

    pub fn areas(&self) -> Vec<Arc<Area>> {
        let areas: Vec<Arc<Area>> = self.inner.load().areas.values().cloned().collect();
        sorted_by(areas, |a| a.id.as_str())
    }

    /// The entity's own area, or else its device's area.
    pub fn area_for_entity(&self, entity_id: &str) -> Option<Arc<Area>> {
        self.inner.load().area_for_entity(entity_id)
    }

    /// Entities resolving to `area_id`, directly or through their device.
    pub fn entities_for_area(&self, area_id: &str) -> Vec<Arc<EntityRegistration>> {
        let index = self.inner.load();
        let entities: Vec<Arc<EntityRegistration>> = index
            .entity_areas
            .iter()
            .filter(|(_, area)| area.as_str() == area_id)
            .filter_map(|(entity_id, _)| index.entities.get(entity_id).cloned())
            .collect();
        sorted_by(entities, |e| e.entity_id.as_str())
    }

    pub fn entities_for_device(&self, device_id: &str) -> Vec<Arc<EntityRegistration>> {
        let index = self.inner.load();
        let entities: Vec<Arc<EntityRegistration>> = index
            .entities
            .values()
            .filter(|e| e.device_id.as_deref() == Some(device_id))
            .cloned()
            .collect();
        sorted_by(entities, |e| e.entity_id.as_str())
    }

    pub fn devices_for_area(&self, area_id: &str) -> Vec<Arc<Device>> {
        let index = self.inner.load();
        let devices: Vec<Arc<Device>> = index
            .devices
            .values()
            .filter(|d| d.area_id.as_deref() == Some(area_id))
            .cloned()
            .collect();
        sorted_by(devices, |d| d.id.as_str())
    }

    pub fn entities_for_label(&self, label_id: &str) -> Vec<Arc<EntityRegistration>> {
        let index = self.inner.load();
        let entities: Vec<Arc<EntityRegistration>> = index
            .entities
            .values()
            .filter(|e| e.labels.iter().any(|l| l == label_id))
            .cloned()
            .collect();
        sorted_by(entities, |e| e.entity_id.as_str())
    }

    pub fn areas_for_floor(&self, floor_id: &str) -> Vec<Arc<Area>> {
        let index = self.inner.load();
        let areas: Vec<Arc<Area>> = index
            .areas
            .values()
            .filter(|a| a.floor_id.as_deref() == Some(floor_id))
            .cloned()
            .collect();
        sorted_by(areas, |a| a.id.as_str())
    }

    pub fn version(&self) -> u64 {
        self.inner.version()
    }

    pub fn subscribe_version(&self) -> watch::Receiver<u64> {
        self.inner.subscribe_version()
    }

    pub async fn refresh(&self) -> Result<(), CoreError> {
        self.inner.refresh().await
    }

    pub async fn dispose(&self) {
        self.inner.dispose().await;
    }
}
