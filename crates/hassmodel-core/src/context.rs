// ── Consumer-scoped context ──
//
// What one consumer (an automation, an app) sees of the hub: state and
// area lookups, its own isolated event queue, trigger registration and
// tracked background work. Disposing the context lets the consumer's
// pending events and background work finish before it goes away.

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use futures_core::Stream;
use futures_util::StreamExt;
use futures_util::future::ready;
use hassmodel_api::{HassEvent, Transport};
use serde_json::Value;
use tracing::debug;

use crate::config::ModelConfig;
use crate::error::CoreError;
use crate::model::{Area, EntityState, StateChange};
use crate::queue::{HandlerError, Observer, QueuedObservable, Subscription};
use crate::registry::{EntityAreaCache, RegistryCache};
use crate::state::{CacheEvent, EntityStateCache};
use crate::tasks::BackgroundTaskTracker;
use crate::trigger::{TriggerManager, TriggerSubscription};

/// A consumer's view of the hub.
///
/// Events are delivered through a queue owned by this context, so a
/// slow consumer only delays itself.
pub struct HaContext<T: Transport> {
    states: Arc<EntityStateCache>,
    areas: Arc<EntityAreaCache>,
    registry: Arc<RegistryCache>,
    triggers: Arc<TriggerManager<T>>,
    queue: QueuedObservable<CacheEvent>,
    tasks: BackgroundTaskTracker,
    disposing: AtomicBool,
}

impl<T: Transport> HaContext<T> {
    pub fn new(
        states: Arc<EntityStateCache>,
        areas: Arc<EntityAreaCache>,
        registry: Arc<RegistryCache>,
        triggers: Arc<TriggerManager<T>>,
        config: &ModelConfig,
    ) -> Self {
        let queue = QueuedObservable::initialize("ha-context", states.subscribe(), config);
        Self {
            states,
            areas,
            registry,
            triggers,
            queue,
            tasks: BackgroundTaskTracker::new(config),
            disposing: AtomicBool::new(false),
        }
    }

    // ── Lookups ──────────────────────────────────────────────────────

    pub fn get_state(&self, entity_id: &str) -> Option<Arc<EntityState>> {
        self.states.get_state(entity_id)
    }

    pub fn get_area(&self, entity_id: &str) -> Option<Arc<Area>> {
        self.areas.area(entity_id)
    }

    pub fn all_entity_ids(&self) -> Vec<String> {
        self.states.all_entity_ids()
    }

    pub fn registry(&self) -> &RegistryCache {
        &self.registry
    }

    // ── Streams ──────────────────────────────────────────────────────

    /// Every hub event, in arrival order.
    pub fn events(&self) -> impl Stream<Item = Arc<HassEvent>> + Send + Unpin + use<T> {
        self.queue.subscribe_stream("events").map(|e| e.event)
    }

    /// Every state update, including attribute-only changes.
    pub fn state_all_changes(&self) -> impl Stream<Item = StateChange> + Send + Unpin + use<T> {
        self.queue
            .subscribe_stream("state-all-changes")
            .filter_map(|e| ready(e.change))
    }

    /// State updates where the state value itself changed.
    pub fn state_changes(&self) -> impl Stream<Item = StateChange> + Send + Unpin + use<T> {
        self.queue
            .subscribe_stream("state-changes")
            .filter_map(|e| ready(e.change.filter(StateChange::is_state_change)))
    }

    /// Run `observer` on this context's worker for every state-value
    /// change.
    pub fn subscribe_state_changes<O>(&self, name: impl Into<String>, observer: O) -> Subscription<CacheEvent>
    where
        O: Observer<StateChange> + 'static,
    {
        self.queue.subscribe(name, StateChangesOnly(observer))
    }

    // ── Triggers and background work ─────────────────────────────────

    pub async fn register_trigger(&self, trigger: Value) -> Result<TriggerSubscription<T>, CoreError> {
        if self.disposing.load(Ordering::Acquire) {
            return Err(CoreError::Disposed {
                component: "context",
            });
        }
        self.triggers.register_trigger(trigger).await
    }

    /// Run `future` in the background; [`dispose`](Self::dispose) waits
    /// for it (up to the flush timeout).
    pub fn track_background<F>(&self, future: F, description: impl Into<String>)
    where
        F: Future<Output = Result<(), CoreError>> + Send + 'static,
    {
        self.tasks.track(future, description);
    }

    /// Deliver pending events to this context's observers, then wait for
    /// its background work. Idempotent.
    pub async fn dispose(&self) {
        if self.disposing.swap(true, Ordering::AcqRel) {
            return;
        }
        self.queue.dispose().await;
        self.tasks.flush().await;
        debug!("context disposed");
    }
}

/// Forwards only state-value changes to the wrapped observer.
struct StateChangesOnly<O>(O);

impl<O: Observer<StateChange>> Observer<CacheEvent> for StateChangesOnly<O> {
    fn on_next(&self, event: &CacheEvent) -> Result<(), HandlerError> {
        match &event.change {
            Some(change) if change.is_state_change() => self.0.on_next(change),
            _ => Ok(()),
        }
    }

    fn on_completed(&self) {
        self.0.on_completed();
    }
}
