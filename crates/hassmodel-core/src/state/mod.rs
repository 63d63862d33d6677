// ── Entity state cache ──
//
// `entity_id -> latest snapshot`, kept current from the hub's
// `state_changed` events. Ingest runs on the cache's own fan-out queue;
// every change is written to the map before it is republished, so a
// handler reacting to a published change always reads the new value.

use std::sync::Arc;

use arc_swap::ArcSwapOption;
use dashmap::DashMap;
use hassmodel_api::{HassEvent, HassMessage, Transport};
use tokio::sync::broadcast;
use tracing::{debug, info, trace};

use crate::config::ModelConfig;
use crate::error::CoreError;
use crate::model::{EntityState, StateChange};
use crate::queue::{HandlerError, Observer, QueuedObservable};

/// One published hub event, with the derived state change for
/// `state_changed` events.
#[derive(Debug, Clone)]
pub struct CacheEvent {
    pub event: Arc<HassEvent>,
    pub change: Option<StateChange>,
}

/// Local mirror of the hub's entity states.
///
/// Built by [`initialize`](Self::initialize); a value of this type is
/// always populated, so lookups never fail.
pub struct EntityStateCache {
    store: Arc<StateStore>,
    ingest: QueuedObservable<Arc<HassMessage>>,
}

struct StateStore {
    /// `None` marks an entity whose latest event removed it.
    states: DashMap<String, Option<Arc<EntityState>>>,
    /// Cleared when ingest completes, which closes downstream sources.
    outbound: ArcSwapOption<broadcast::Sender<CacheEvent>>,
}

impl EntityStateCache {
    /// Subscribe to the hub's events, then load the full state set.
    ///
    /// Events arriving while the states load are buffered and applied
    /// afterwards. Fails without constructing anything if the hub is
    /// unreachable.
    pub async fn initialize<T: Transport>(
        transport: &T,
        config: &ModelConfig,
    ) -> Result<Self, CoreError> {
        let inbound = transport.subscribe_messages()?;
        let states = transport.get_states().await?;

        let (outbound, _) = broadcast::channel(config.queue_capacity.max(1));
        let store = Arc::new(StateStore {
            states: DashMap::with_capacity(states.len()),
            outbound: ArcSwapOption::from_pointee(outbound),
        });
        for state in states {
            let state = EntityState::from(state);
            store
                .states
                .insert(state.entity_id.clone(), Some(Arc::new(state)));
        }
        info!(entities = store.states.len(), "entity state cache initialized");

        let ingest = QueuedObservable::initialize_with_observer(
            "entity-state-cache",
            inbound,
            config,
            "state-ingest",
            StateIngest {
                store: Arc::clone(&store),
            },
        );

        Ok(Self { store, ingest })
    }

    /// Latest snapshot of `entity_id`, or `None` if unknown or removed.
    pub fn get_state(&self, entity_id: &str) -> Option<Arc<EntityState>> {
        self.store
            .states
            .get(entity_id)
            .and_then(|entry| entry.value().clone())
    }

    /// Every entity id seen at initialization or in a later event.
    pub fn all_entity_ids(&self) -> Vec<String> {
        self.store
            .states
            .iter()
            .map(|entry| entry.key().clone())
            .collect()
    }

    /// A new receiver on the outbound stream (AllEvents with derived
    /// state changes), seeing everything published from now on.
    ///
    /// After the cache stopped ingesting, the receiver is already closed.
    pub fn subscribe(&self) -> broadcast::Receiver<CacheEvent> {
        match self.store.outbound.load_full() {
            Some(sender) => sender.subscribe(),
            None => broadcast::channel(1).1,
        }
    }

    /// Stop ingesting, apply everything already queued, then close the
    /// outbound stream.
    pub async fn dispose(&self) {
        self.ingest.dispose().await;
    }
}

// ── Ingest ───────────────────────────────────────────────────────────

struct StateIngest {
    store: Arc<StateStore>,
}

impl StateIngest {
    fn apply(&self, event: &HassEvent) -> Result<StateChange, CoreError> {
        let data = event
            .state_changed_data()
            .map_err(|e| CoreError::InvalidEvent {
                event_type: event.event_type.clone(),
                reason: e.to_string(),
            })?;

        let old = data.old_state.map(|s| Arc::new(EntityState::from(s)));
        let new = data.new_state.map(|s| Arc::new(EntityState::from(s)));
        self.store
            .states
            .insert(data.entity_id.clone(), new.clone());
        trace!(entity_id = %data.entity_id, "state updated");

        Ok(StateChange {
            entity_id: data.entity_id,
            old,
            new,
        })
    }

    fn publish(&self, event: CacheEvent) {
        let outbound = self.store.outbound.load();
        if let Some(outbound) = &*outbound {
            // No receivers is fine: nobody is listening yet.
            let _ = outbound.send(event);
        }
    }
}

impl Observer<Arc<HassMessage>> for StateIngest {
    fn on_next(&self, message: &Arc<HassMessage>) -> Result<(), HandlerError> {
        // Trigger deliveries share the channel; they belong to the
        // trigger manager.
        let Some(event) = message.event.as_ref() else {
            return Ok(());
        };
        if message.trigger_payload().is_some() {
            return Ok(());
        }

        let event = Arc::new(event.clone());
        let change = if event.is_state_changed() {
            match self.apply(&event) {
                Ok(change) => Some(change),
                Err(e) => {
                    self.publish(CacheEvent { event, change: None });
                    return Err(e.into());
                }
            }
        } else {
            None
        };

        self.publish(CacheEvent { event, change });
        Ok(())
    }

    fn on_completed(&self) {
        self.store.outbound.store(None);
        debug!("entity state cache stopped ingesting");
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use hassmodel_api::STATE_CHANGED;
    use serde_json::json;

    use super::*;

    fn store() -> Arc<StateStore> {
        let (outbound, _) = broadcast::channel(16);
        Arc::new(StateStore {
            states: DashMap::new(),
            outbound: ArcSwapOption::from_pointee(outbound),
        })
    }

    fn state_changed(entity_id: &str, old: Option<&str>, new: Option<&str>) -> Arc<HassMessage> {
        let as_state = |s: &str| json!({ "entity_id": entity_id, "state": s, "attributes": {} });
        Arc::new(HassMessage::event(
            1,
            HassEvent::new(
                STATE_CHANGED,
                Some(json!({
                    "entity_id": entity_id,
                    "old_state": old.map(as_state),
                    "new_state": new.map(as_state),
                })),
            ),
        ))
    }

    #[test]
    fn state_changed_updates_store_and_publishes() {
        let store = store();
        let mut rx = store.outbound.load_full().unwrap().subscribe();
        let ingest = StateIngest {
            store: Arc::clone(&store),
        };

        ingest
            .on_next(&state_changed("light.kitchen", Some("off"), Some("on")))
            .unwrap();

        let stored = store.states.get("light.kitchen").unwrap().clone().unwrap();
        assert_eq!(stored.state, "on");

        let published = rx.try_recv().unwrap();
        let change = published.change.unwrap();
        assert_eq!(change.old.unwrap().state, "off");
        assert_eq!(change.new.unwrap().state, "on");
    }

    #[test]
    fn removed_entity_stays_known() {
        let store = store();
        let ingest = StateIngest {
            store: Arc::clone(&store),
        };

        ingest
            .on_next(&state_changed("sensor.gone", Some("1"), None))
            .unwrap();

        assert!(store.states.contains_key("sensor.gone"));
        assert!(store.states.get("sensor.gone").unwrap().is_none());
    }

    #[test]
    fn malformed_state_changed_is_published_raw_and_reported() {
        let store = store();
        let mut rx = store.outbound.load_full().unwrap().subscribe();
        let ingest = StateIngest {
            store: Arc::clone(&store),
        };
        let message = Arc::new(HassMessage::event(1, HassEvent::new(STATE_CHANGED, None)));

        assert!(ingest.on_next(&message).is_err());
        assert!(store.states.is_empty());
        let published = rx.try_recv().unwrap();
        assert!(published.change.is_none());
    }

    #[test]
    fn trigger_deliveries_are_not_events() {
        let store = store();
        let mut rx = store.outbound.load_full().unwrap().subscribe();
        let ingest = StateIngest { store };

        ingest
            .on_next(&Arc::new(HassMessage::trigger(9, json!({ "platform": "state" }))))
            .unwrap();

        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn completion_closes_outbound() {
        let store = store();
        let mut rx = store.outbound.load_full().unwrap().subscribe();
        let ingest = StateIngest {
            store: Arc::clone(&store),
        };

        ingest.on_completed();

        assert!(store.outbound.load().is_none());
        assert!(matches!(
            rx.try_recv(),
            Err(broadcast::error::TryRecvError::Closed)
        ));
    }
}
