// ── Observers and subscription handles ──

use std::fmt;
use std::pin::Pin;
use std::sync::{Arc, Weak};
use std::task::{Context, Poll};

use futures_core::Stream;
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;

use super::Shared;

/// Error type observers report back to the queue. Logged, never propagated.
pub type HandlerError = Box<dyn std::error::Error + Send + Sync>;

/// A consumer attached to a [`QueuedObservable`](super::QueuedObservable).
///
/// Callbacks run on the queue's drain worker, one item at a time. An
/// `Err` or a panic is logged and the observer stays attached.
pub trait Observer<T>: Send + Sync {
    fn on_next(&self, item: &T) -> Result<(), HandlerError>;

    /// Called once when the queue stops (source closed or disposed).
    fn on_completed(&self) {}
}

impl<T, F> Observer<T> for F
where
    F: Fn(&T) -> Result<(), HandlerError> + Send + Sync,
{
    fn on_next(&self, item: &T) -> Result<(), HandlerError> {
        self(item)
    }
}

/// Identity of an attached observer, unique per queue instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObserverId(pub(crate) u64);

impl fmt::Display for ObserverId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

pub(crate) struct ObserverEntry<T> {
    pub(crate) id: ObserverId,
    pub(crate) name: String,
    pub(crate) observer: Box<dyn Observer<T>>,
}

// ── Subscription ────────────────────────────────────────────────────

/// Handle for one attached observer.
///
/// Dropping the handle leaves the observer attached (it lives as long as
/// the queue); call [`unsubscribe`](Self::unsubscribe) to detach it.
pub struct Subscription<T> {
    id: ObserverId,
    shared: Weak<Shared<T>>,
}

impl<T> Subscription<T> {
    pub(crate) fn new(id: ObserverId, shared: &Arc<Shared<T>>) -> Self {
        Self {
            id,
            shared: Arc::downgrade(shared),
        }
    }

    pub fn id(&self) -> ObserverId {
        self.id
    }

    /// Detach the observer. Items already being dispatched may still
    /// reach it; nothing dispatched afterwards will.
    pub fn unsubscribe(self) {
        if let Some(shared) = self.shared.upgrade() {
            shared.remove(self.id);
        }
    }
}

impl<T> fmt::Debug for Subscription<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription").field("id", &self.id).finish()
    }
}

// ── Channel-backed stream ───────────────────────────────────────────

/// Observer that forwards every item into an unbounded channel.
pub(crate) struct ChannelObserver<T> {
    tx: mpsc::UnboundedSender<T>,
}

impl<T> ChannelObserver<T> {
    pub(crate) fn new(tx: mpsc::UnboundedSender<T>) -> Self {
        Self { tx }
    }
}

impl<T: Clone + Send + Sync> Observer<T> for ChannelObserver<T> {
    fn on_next(&self, item: &T) -> Result<(), HandlerError> {
        // A dropped receiver detaches itself; nothing to report here.
        let _ = self.tx.send(item.clone());
        Ok(())
    }
}

/// Items of one queue instance as a [`Stream`].
///
/// Ends when the queue completes. Dropping the stream detaches its
/// observer.
pub struct QueueStream<T> {
    inner: UnboundedReceiverStream<T>,
    subscription: Option<Subscription<T>>,
}

impl<T> QueueStream<T> {
    pub(crate) fn new(rx: mpsc::UnboundedReceiver<T>, subscription: Subscription<T>) -> Self {
        Self {
            inner: UnboundedReceiverStream::new(rx),
            subscription: Some(subscription),
        }
    }
}

impl<T> Stream for QueueStream<T> {
    type Item = T;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.inner).poll_next(cx)
    }
}

impl<T> Drop for QueueStream<T> {
    fn drop(&mut self) {
        if let Some(subscription) = self.subscription.take() {
            subscription.unsubscribe();
        }
    }
}
