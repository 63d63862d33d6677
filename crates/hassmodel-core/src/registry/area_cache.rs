// ── Entity → area index ──

use std::collections::HashMap;
use std::sync::Arc;

use hassmodel_api::Transport;
use tokio::sync::watch;

use super::refresh::RegistryBacked;
use super::snapshot::{RegistrySnapshot, resolve_area_id};
use crate::config::ModelConfig;
use crate::error::CoreError;
use crate::model::Area;

/// `entity_id -> area` for every registered entity; `None` when the
/// entity resolves to no known area.
type AreaIndex = HashMap<String, Option<Arc<Area>>>;

/// Resolves the area of an entity from the registries.
///
/// An entity's own area takes precedence over its device's. The index
/// is rebuilt wholesale on registry-updated events; a failed rebuild
/// keeps the previous index.
pub struct EntityAreaCache {
    inner: RegistryBacked<AreaIndex>,
}

impl EntityAreaCache {
    /// Subscribe for registry events and build the first index.
    pub async fn initialize<T: Transport>(
        transport: Arc<T>,
        config: &ModelConfig,
    ) -> Result<Self, CoreError> {
        let inner =
            RegistryBacked::initialize("entity-area-cache", transport, config, build_area_index)
                .await?;
        Ok(Self { inner })
    }

    /// Area of `entity_id` per the last completed build.
    pub fn area(&self, entity_id: &str) -> Option<Arc<Area>> {
        self.inner.load().get(entity_id).cloned().flatten()
    }

    /// Number of completed rebuilds since initialization.
    pub fn version(&self) -> u64 {
        self.inner.version()
    }

    /// Ticks after every completed rebuild.
    pub fn subscribe_version(&self) -> watch::Receiver<u64> {
        self.inner.subscribe_version()
    }

    /// Rebuild now and report the outcome; the index is kept on failure.
    pub async fn refresh(&self) -> Result<(), CoreError> {
        self.inner.refresh().await
    }

    pub async fn dispose(&self) {
        self.inner.dispose().await;
    }
}

fn build_area_index(snapshot: RegistrySnapshot) -> AreaIndex {
    let areas: HashMap<&str, Arc<Area>> = snapshot
        .areas
        .iter()
        .map(|a| (a.id.as_str(), Arc::new(a.clone())))
        .collect();
    let device_areas = snapshot.device_areas();

    snapshot
        .entities
        .iter()
        .map(|entity| {
            let area = resolve_area_id(entity, &device_areas).and_then(|id| areas.get(id).cloned());
            (entity.entity_id.clone(), area)
        })
        .collect()
}
