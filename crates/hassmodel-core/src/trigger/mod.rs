// ── Trigger subscriptions ──
//
// Registers server-side triggers and demultiplexes their deliveries from
// the shared inbound channel. Each registration is keyed by the
// subscription id the hub assigned to it.
//
// The correlation table lock covers delivery, the `Active ->
// Unsubscribing` transition and removal. Whoever performs that
// transition sends the unsubscribe, so it goes out exactly once and
// nothing is delivered after it.
//
// The hub may push the first trigger before the subscribe result reaches
// the caller. While any subscribe command is in flight, triggers for ids
// not in the table are parked; the registration that turns out to own
// one replays it before it becomes `Active`.

use std::collections::HashMap;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::task::{Context, Poll};

use futures_core::Stream;
use futures_util::future::join_all;
use hassmodel_api::{HassCommand, HassMessage, Transport};
use serde_json::Value;
use strum::Display;
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tracing::{debug, info, trace, warn};

use crate::config::ModelConfig;
use crate::error::CoreError;
use crate::queue::{HandlerError, QueuedObservable};
use crate::tasks::BackgroundTaskTracker;

/// Lifecycle of one trigger registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "snake_case")]
pub enum RegistrationState {
    Active,
    /// Unsubscribe in flight; deliveries are refused.
    Unsubscribing,
    Closed,
}

pub(crate) struct CorrelationEntry {
    state: RegistrationState,
    sink: mpsc::UnboundedSender<Value>,
}

#[derive(Default)]
struct Correlation {
    entries: HashMap<u64, CorrelationEntry>,
    /// Subscribe commands sent whose result has not been handled yet.
    registering: usize,
    /// Triggers for unknown ids seen while `registering > 0`, in arrival order.
    parked: Vec<(u64, Value)>,
}

/// Owns every trigger registered through it and unsubscribes them on
/// [`dispose`](Self::dispose).
pub struct TriggerManager<T: Transport> {
    inner: Arc<Inner<T>>,
    demux: QueuedObservable<Arc<HassMessage>>,
}

struct Inner<T> {
    transport: Arc<T>,
    table: Mutex<Correlation>,
    tasks: BackgroundTaskTracker,
    disposed: AtomicBool,
}

impl<T: Transport> TriggerManager<T> {
    /// Attach to the transport's inbound channel and start demultiplexing.
    pub fn new(transport: Arc<T>, config: &ModelConfig) -> Result<Self, CoreError> {
        let inbound = transport.subscribe_messages()?;
        let inner = Arc::new(Inner {
            transport,
            table: Mutex::new(Correlation::default()),
            tasks: BackgroundTaskTracker::new(config),
            disposed: AtomicBool::new(false),
        });

        let demux_inner = Arc::clone(&inner);
        let demux = QueuedObservable::initialize_with_observer(
            "trigger-manager",
            inbound,
            config,
            "trigger-demux",
            move |message: &Arc<HassMessage>| -> Result<(), HandlerError> {
                demux_inner.deliver(message);
                Ok(())
            },
        );

        Ok(Self { inner, demux })
    }

    /// Subscribe `trigger` on the hub and return its deliveries.
    ///
    /// The subscribe command is sent when the returned future is first
    /// polled. On failure no registration exists and nothing needs
    /// cleaning up.
    pub async fn register_trigger(&self, trigger: Value) -> Result<TriggerSubscription<T>, CoreError> {
        if self.inner.is_disposed() {
            return Err(CoreError::Disposed {
                component: "trigger manager",
            });
        }

        let _pending = self.inner.begin_registration();
        let response = self
            .inner
            .transport
            .send_command(HassCommand::SubscribeTrigger { trigger })
            .await
            .map_err(|e| CoreError::SubscribeFailed {
                message: e.to_string(),
            })?;
        if response.success == Some(false) {
            return Err(CoreError::SubscribeFailed {
                message: response
                    .result
                    .map_or_else(|| "hub rejected the trigger".to_owned(), |r| r.to_string()),
            });
        }
        let id = response.id;

        let (sink, rx) = mpsc::unbounded_channel();
        {
            let mut table = self.inner.table();
            // Checked under the lock: `dispose` sets the flag before it
            // collects entries, so an entry is either collected or refused.
            if !self.inner.is_disposed() {
                if table.entries.contains_key(&id) {
                    return Err(CoreError::Internal(format!(
                        "hub reused subscription id {id}"
                    )));
                }
                let (early, rest): (Vec<_>, Vec<_>) = std::mem::take(&mut table.parked)
                    .into_iter()
                    .partition(|(parked_id, _)| *parked_id == id);
                table.parked = rest;
                if !early.is_empty() {
                    debug!(
                        subscription = id,
                        count = early.len(),
                        "replaying triggers that arrived before the subscribe result"
                    );
                }
                for (_, payload) in early {
                    // The receiver is still held here.
                    let _ = sink.send(payload);
                }
                table.entries.insert(
                    id,
                    CorrelationEntry {
                        state: RegistrationState::Active,
                        sink,
                    },
                );
                info!(subscription = id, "trigger registered");
                return Ok(TriggerSubscription {
                    id,
                    deliveries: UnboundedReceiverStream::new(rx),
                    inner: Arc::clone(&self.inner),
                    disposed: false,
                });
            }
        }

        // Disposed while subscribing: the hub holds a subscription nobody owns.
        self.inner.send_unsubscribe(id).await;
        Err(CoreError::Disposed {
            component: "trigger manager",
        })
    }

    /// Number of registrations still in the correlation table.
    pub fn active_count(&self) -> usize {
        self.inner.table().entries.len()
    }

    /// Unsubscribe every registration, then stop demultiplexing.
    ///
    /// Idempotent. Registering afterwards fails with
    /// [`CoreError::Disposed`].
    pub async fn dispose(&self) {
        self.inner.disposed.store(true, Ordering::SeqCst);

        let ids: Vec<u64> = self
            .inner
            .table()
            .entries
            .iter()
            .filter(|(_, entry)| entry.state == RegistrationState::Active)
            .map(|(id, _)| *id)
            .collect();
        if !ids.is_empty() {
            debug!(count = ids.len(), "unsubscribing triggers");
        }
        join_all(ids.into_iter().map(|id| self.inner.unsubscribe(id))).await;

        self.demux.dispose().await;
        self.inner.tasks.flush().await;
    }
}

impl<T: Transport> Inner<T> {
    fn table(&self) -> MutexGuard<'_, Correlation> {
        self.table.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn begin_registration(&self) -> PendingRegistration<'_, T> {
        self.table().registering += 1;
        PendingRegistration { inner: self }
    }

    fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::SeqCst)
    }

    fn deliver(&self, message: &HassMessage) {
        let Some(payload) = message.trigger_payload() else {
            return;
        };

        let mut guard = self.table();
        let table = &mut *guard;
        match table.entries.get(&message.id) {
            Some(entry) if entry.state == RegistrationState::Active => {
                if entry.sink.send(payload.clone()).is_err() {
                    trace!(subscription = message.id, "trigger stream already dropped");
                }
            }
            Some(_) => trace!(subscription = message.id, "ignoring trigger for a closing subscription"),
            None if table.registering > 0 => {
                table.parked.push((message.id, payload.clone()));
                trace!(subscription = message.id, "parked trigger until pending registrations finish");
            }
            None => trace!(subscription = message.id, "ignoring trigger for unknown subscription"),
        }
    }

    fn state(&self, id: u64) -> RegistrationState {
        self.table()
            .entries
            .get(&id)
            .map_or(RegistrationState::Closed, |entry| entry.state)
    }

    async fn unsubscribe(&self, id: u64) {
        let claimed = {
            let mut table = self.table();
            match table.entries.get_mut(&id) {
                Some(entry) if entry.state == RegistrationState::Active => {
                    entry.state = RegistrationState::Unsubscribing;
                    true
                }
                _ => false,
            }
        };
        if !claimed {
            return;
        }

        self.send_unsubscribe(id).await;
        // Dropping the entry drops its sink and ends the stream.
        self.table().entries.remove(&id);
        debug!(subscription = id, "trigger closed");
    }

    async fn send_unsubscribe(&self, id: u64) {
        if let Err(e) = self
            .transport
            .send_command(HassCommand::UnsubscribeEvents { subscription: id })
            .await
        {
            warn!(subscription = id, error = %e, "unsubscribe failed");
        }
    }
}

/// Held across a subscribe command. The last one to finish discards
/// whatever parked triggers nobody claimed.
struct PendingRegistration<'a, T: Transport> {
    inner: &'a Inner<T>,
}

impl<T: Transport> Drop for PendingRegistration<'_, T> {
    fn drop(&mut self) {
        let mut table = self.inner.table();
        table.registering = table.registering.saturating_sub(1);
        if table.registering == 0 && !table.parked.is_empty() {
            trace!(count = table.parked.len(), "discarding triggers for unknown subscriptions");
            table.parked.clear();
        }
    }
}

// ── TriggerSubscription ──────────────────────────────────────────────

/// Deliveries of one registered trigger.
///
/// Ends after the registration closes. Dropping it without calling
/// [`dispose`](Self::dispose) unsubscribes in the background.
pub struct TriggerSubscription<T: Transport> {
    id: u64,
    deliveries: UnboundedReceiverStream<Value>,
    inner: Arc<Inner<T>>,
    disposed: bool,
}

impl<T: Transport> TriggerSubscription<T> {
    /// The hub-assigned subscription id.
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn state(&self) -> RegistrationState {
        self.inner.state(self.id)
    }

    /// Unsubscribe and wait for the hub to acknowledge (or fail).
    ///
    /// The stream then yields what was delivered before the call and ends.
    pub async fn dispose(&mut self) {
        self.disposed = true;
        self.inner.unsubscribe(self.id).await;
    }
}

impl<T: Transport> Stream for TriggerSubscription<T> {
    type Item = Value;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Value>> {
        Pin::new(&mut self.deliveries).poll_next(cx)
    }
}

impl<T: Transport> Drop for TriggerSubscription<T> {
    fn drop(&mut self) {
        if self.disposed || self.inner.state(self.id) != RegistrationState::Active {
            return;
        }
        let inner = Arc::clone(&self.inner);
        let id = self.id;
        self.inner.tasks.track(
            async move {
                inner.unsubscribe(id).await;
                Ok(())
            },
            format!("unsubscribe trigger {id}"),
        );
    }
}

impl<T: Transport> std::fmt::Debug for TriggerSubscription<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TriggerSubscription")
            .field("id", &self.id)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn states_display_in_snake_case() {
        assert_eq!(RegistrationState::Unsubscribing.to_string(), "unsubscribing");
        assert_eq!(RegistrationState::Active.to_string(), "active");
        assert_eq!(RegistrationState::Closed.to_string(), "closed");
    }
}
