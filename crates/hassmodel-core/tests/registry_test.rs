#![allow(clippy::unwrap_used)]
// Integration tests for the registry-derived indexes.

mod common;

use std::sync::Arc;

use common::{FakeTransport, area, device, entity, plain_event, transition};
use hassmodel_core::{CoreError, EntityAreaCache, ModelConfig, RegistryCache};

// ── Helpers ─────────────────────────────────────────────────────────

/// E1 has no area of its own and sits on device D1 in the kitchen.
fn kitchen_setup() -> Arc<FakeTransport> {
    let transport = FakeTransport::new();
    transport.set_registry(
        vec![entity("light.e1", Some("d1"), None)],
        vec![device("d1", Some("a1"))],
        vec![area("a1", "Kitchen"), area("a2", "Garage")],
    );
    transport
}

fn move_e1_to_garage(transport: &FakeTransport) {
    transport.set_registry(
        vec![entity("light.e1", Some("d1"), Some("a2"))],
        vec![device("d1", Some("a1"))],
        vec![area("a1", "Kitchen"), area("a2", "Garage")],
    );
}

async fn area_cache(transport: &Arc<FakeTransport>) -> EntityAreaCache {
    EntityAreaCache::initialize(Arc::clone(transport), &ModelConfig::default())
        .await
        .unwrap()
}

fn area_name(cache: &EntityAreaCache, entity_id: &str) -> Option<String> {
    cache.area(entity_id).map(|a| a.name.clone())
}

// ── EntityAreaCache ─────────────────────────────────────────────────

#[tokio::test]
async fn test_entity_inherits_device_area() {
    let transport = kitchen_setup();
    let cache = area_cache(&transport).await;

    assert_eq!(area_name(&cache, "light.e1").as_deref(), Some("Kitchen"));
    assert_eq!(area_name(&cache, "light.unknown"), None);
    assert_eq!(cache.version(), 0);
}

#[tokio::test]
async fn test_registry_event_rebuilds_index() {
    let transport = kitchen_setup();
    let cache = area_cache(&transport).await;
    let mut version = cache.subscribe_version();

    move_e1_to_garage(&transport);
    // The registry changed upstream, but nothing was announced yet.
    assert_eq!(area_name(&cache, "light.e1").as_deref(), Some("Kitchen"));

    transport.push(plain_event("entity_registry_updated"));
    tokio::time::timeout(common::WAIT, version.wait_for(|v| *v >= 1))
        .await
        .unwrap()
        .unwrap();

    assert_eq!(area_name(&cache, "light.e1").as_deref(), Some("Garage"));
}

#[tokio::test]
async fn test_unrelated_events_do_not_rebuild() {
    let transport = kitchen_setup();
    let cache = area_cache(&transport).await;

    move_e1_to_garage(&transport);
    transport.push(plain_event("call_service"));
    transport.push(transition("light.e1", "off", "on"));
    // Waits for the listener to drain and any scheduled rebuild.
    cache.dispose().await;

    assert_eq!(cache.version(), 0);
    assert_eq!(area_name(&cache, "light.e1").as_deref(), Some("Kitchen"));
}

#[tokio::test]
async fn test_failed_rebuild_keeps_last_known_index() {
    let (warnings, _guard) = common::count_logs(tracing::Level::WARN);
    let transport = kitchen_setup();
    let cache = area_cache(&transport).await;

    move_e1_to_garage(&transport);
    transport.set_fail_fetches(true);
    transport.push(plain_event("device_registry_updated"));
    cache.dispose().await;

    assert_eq!(cache.version(), 0);
    assert_eq!(area_name(&cache, "light.e1").as_deref(), Some("Kitchen"));
    assert_eq!(warnings.load(std::sync::atomic::Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_explicit_refresh_reports_failure_and_recovers() {
    let transport = kitchen_setup();
    let cache = area_cache(&transport).await;
    move_e1_to_garage(&transport);

    transport.set_fail_fetches(true);
    let failed = cache.refresh().await;
    assert!(matches!(failed, Err(CoreError::ConnectionFailed { .. })));
    assert_eq!(area_name(&cache, "light.e1").as_deref(), Some("Kitchen"));

    transport.set_fail_fetches(false);
    cache.refresh().await.unwrap();
    assert_eq!(cache.version(), 1);
    assert_eq!(area_name(&cache, "light.e1").as_deref(), Some("Garage"));
}

#[tokio::test]
async fn test_initialize_fails_when_hub_unreachable() {
    let transport = kitchen_setup();
    transport.set_fail_fetches(true);

    let result = EntityAreaCache::initialize(Arc::clone(&transport), &ModelConfig::default()).await;

    assert!(result.is_err());
}

#[tokio::test]
async fn test_empty_ids_are_treated_as_unset() {
    let transport = FakeTransport::new();
    transport.set_registry(
        vec![entity("light.e1", Some("d1"), Some(""))],
        vec![device("d1", Some("a1"))],
        vec![area("a1", "Kitchen")],
    );

    let cache = area_cache(&transport).await;

    assert_eq!(area_name(&cache, "light.e1").as_deref(), Some("Kitchen"));
}

// ── RegistryCache ───────────────────────────────────────────────────

#[tokio::test]
async fn test_registry_navigation() {
    let transport = FakeTransport::new();
    let mut fan = entity("switch.fan", Some("d2"), None);
    fan.labels = vec!["climate".into()];
    let mut thermostat = entity("climate.hall", None, Some("a1"));
    thermostat.labels = vec!["climate".into()];
    transport.set_registry(
        vec![
            entity("light.ceiling", Some("d1"), None),
            entity("sensor.door", Some("d1"), Some("a2")),
            fan,
            thermostat,
        ],
        vec![device("d1", Some("a1")), device("d2", Some("a2"))],
        vec![area("a1", "Kitchen"), area("a2", "Garage")],
    );

    let registry = RegistryCache::initialize(Arc::clone(&transport), &ModelConfig::default())
        .await
        .unwrap();

    let ids = |entities: Vec<Arc<hassmodel_core::EntityRegistration>>| {
        entities.iter().map(|e| e.entity_id.clone()).collect::<Vec<_>>()
    };

    assert_eq!(registry.area_for_entity("light.ceiling").unwrap().name, "Kitchen");
    assert_eq!(registry.area_for_entity("sensor.door").unwrap().name, "Garage");
    assert_eq!(ids(registry.entities_for_area("a1")), vec!["climate.hall", "light.ceiling"]);
    assert_eq!(ids(registry.entities_for_area("a2")), vec!["sensor.door", "switch.fan"]);
    assert_eq!(ids(registry.entities_for_device("d1")), vec!["light.ceiling", "sensor.door"]);
    assert_eq!(ids(registry.entities_for_label("climate")), vec!["climate.hall", "switch.fan"]);
    assert_eq!(
        registry
            .devices_for_area("a2")
            .iter()
            .map(|d| d.id.as_str())
            .collect::<Vec<_>>(),
        vec!["d2"]
    );
    assert_eq!(registry.device("d1").unwrap().area_id.as_deref(), Some("a1"));
    assert_eq!(registry.area("a2").unwrap().name, "Garage");
    assert_eq!(registry.areas().len(), 2);
    assert!(registry.entity("light.nope").is_none());
}

#[tokio::test]
async fn test_registry_cache_follows_registry_events() {
    let transport = kitchen_setup();
    let registry = RegistryCache::initialize(Arc::clone(&transport), &ModelConfig::default())
        .await
        .unwrap();
    let mut version = registry.subscribe_version();

    move_e1_to_garage(&transport);
    transport.push(plain_event("area_registry_updated"));
    tokio::time::timeout(common::WAIT, version.wait_for(|v| *v >= 1))
        .await
        .unwrap()
        .unwrap();

    assert_eq!(registry.area_for_entity("light.e1").unwrap().name, "Garage");
    assert_eq!(registry.entities_for_area("a1").len(), 0);
}
