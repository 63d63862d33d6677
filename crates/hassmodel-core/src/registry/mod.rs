// ── Registry-derived indexes ──
//
// Indexes built from the entity, device and area registries and rebuilt
// wholesale whenever the hub announces a registry change.

mod area_cache;
mod refresh;
mod registry_cache;
mod snapshot;

pub use area_cache::EntityAreaCache;
pub use registry_cache::RegistryCache;
pub use snapshot::RegistrySnapshot;
