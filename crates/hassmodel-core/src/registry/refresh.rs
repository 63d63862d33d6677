// ── Registry-backed indexes ──
//
// Shared machinery for indexes derived from a `RegistrySnapshot`: the
// index lives behind an `ArcSwap` and is replaced wholesale; rebuilds
// run one at a time in arrival order; a `watch` counter ticks on every
// successful swap. Registry-updated events schedule a rebuild on the
// background tracker.

use std::sync::Arc;

use arc_swap::ArcSwap;
use futures_util::FutureExt;
use futures_util::future::BoxFuture;
use hassmodel_api::{HassMessage, Transport};
use tokio::sync::{Mutex, watch};
use tracing::{debug, info, warn};

use super::snapshot::RegistrySnapshot;
use crate::config::ModelConfig;
use crate::error::CoreError;
use crate::queue::{HandlerError, Observer, QueuedObservable};
use crate::tasks::BackgroundTaskTracker;

/// Builds an index from a freshly fetched snapshot.
pub(crate) type BuildFn<I> = fn(RegistrySnapshot) -> I;

type RebuildFn = Arc<dyn Fn() -> BoxFuture<'static, Result<(), CoreError>> + Send + Sync>;

pub(crate) struct RefreshingIndex<I> {
    current: ArcSwap<I>,
    version: watch::Sender<u64>,
    rebuild_lock: Mutex<()>,
}

impl<I> RefreshingIndex<I> {
    fn new(initial: I) -> Self {
        let (version, _) = watch::channel(0u64);
        Self {
            current: ArcSwap::from_pointee(initial),
            version,
            rebuild_lock: Mutex::new(()),
        }
    }

    /// Fetch a new snapshot and swap in the index built from it.
    ///
    /// On failure the current index stays in place.
    async fn rebuild<T: Transport>(
        &self,
        name: &str,
        transport: &T,
        build: BuildFn<I>,
    ) -> Result<(), CoreError> {
        // tokio's mutex is fair, so queued rebuilds run in arrival order.
        let _serial = self.rebuild_lock.lock().await;

        let snapshot = RegistrySnapshot::fetch(transport).await?;
        let (entities, devices, areas) = (
            snapshot.entities.len(),
            snapshot.devices.len(),
            snapshot.areas.len(),
        );
        self.current.store(Arc::new(build(snapshot)));
        self.version.send_modify(|v| *v += 1);

        info!(
            index = name,
            version = *self.version.borrow(),
            entities,
            devices,
            areas,
            "registry index rebuilt"
        );
        Ok(())
    }
}

/// An index derived from the registries, kept current by registry
/// events.
pub(crate) struct RegistryBacked<I> {
    index: Arc<RefreshingIndex<I>>,
    rebuild: RebuildFn,
    listener: QueuedObservable<Arc<HassMessage>>,
    tasks: BackgroundTaskTracker,
}

impl<I: Send + Sync + 'static> RegistryBacked<I> {
    /// Subscribe for invalidations, then fetch and build the first index.
    pub(crate) async fn initialize<T: Transport>(
        name: &'static str,
        transport: Arc<T>,
        config: &ModelConfig,
        build: BuildFn<I>,
    ) -> Result<Self, CoreError> {
        let inbound = transport.subscribe_messages()?;
        let snapshot = RegistrySnapshot::fetch(transport.as_ref()).await?;
        let index = Arc::new(RefreshingIndex::new(build(snapshot)));

        let rebuild: RebuildFn = {
            let index = Arc::clone(&index);
            Arc::new(move || {
                let index = Arc::clone(&index);
                let transport = Arc::clone(&transport);
                async move { index.rebuild(name, transport.as_ref(), build).await }.boxed()
            })
        };

        let tasks = BackgroundTaskTracker::new(config);
        let listener = QueuedObservable::initialize_with_observer(
            name,
            inbound,
            config,
            "registry-invalidation",
            RebuildOnRegistryEvent {
                name,
                rebuild: Arc::clone(&rebuild),
                tasks: tasks.clone(),
                config: config.clone(),
            },
        );
        info!(index = name, "registry index initialized");

        Ok(Self {
            index,
            rebuild,
            listener,
            tasks,
        })
    }

    pub(crate) fn load(&self) -> Arc<I> {
        self.index.current.load_full()
    }

    pub(crate) fn version(&self) -> u64 {
        *self.index.version.borrow()
    }

    pub(crate) fn subscribe_version(&self) -> watch::Receiver<u64> {
        self.index.version.subscribe()
    }

    /// Rebuild now, independent of registry events.
    pub(crate) async fn refresh(&self) -> Result<(), CoreError> {
        (self.rebuild)().await
    }

    /// Stop listening and wait for scheduled rebuilds.
    pub(crate) async fn dispose(&self) {
        self.listener.dispose().await;
        self.tasks.flush().await;
    }
}

// ── Invalidation ─────────────────────────────────────────────────────

struct RebuildOnRegistryEvent {
    name: &'static str,
    rebuild: RebuildFn,
    tasks: BackgroundTaskTracker,
    config: ModelConfig,
}

impl Observer<Arc<HassMessage>> for RebuildOnRegistryEvent {
    fn on_next(&self, message: &Arc<HassMessage>) -> Result<(), HandlerError> {
        let Some(event) = message.event.as_ref() else {
            return Ok(());
        };
        if !self.config.is_registry_event(&event.event_type) {
            return Ok(());
        }

        debug!(index = self.name, event_type = %event.event_type, "registry changed, scheduling rebuild");
        let rebuild = (self.rebuild)();
        let name = self.name;
        self.tasks.track(
            async move {
                if let Err(e) = rebuild.await {
                    warn!(index = name, error = %e, "registry rebuild failed, keeping the last known index");
                }
                Ok(())
            },
            format!("rebuild {name}"),
        );
        Ok(())
    }
}
