// ── Fan-out queue ──
//
// Turns one hot broadcast source into an isolated, ordered delivery
// pipeline. Each `QueuedObservable` owns its own receiver on the source
// and two tasks: an intake task that moves items from the receiver into
// this instance's FIFO, and a drain worker that invokes the attached
// observers in registration order.
//
// A slow observer only delays its own instance: other instances hold
// independent receivers and workers. Disposal detaches intake from the
// source first, so anything published afterwards never reaches this
// instance, and then drains what was already queued before resolving.

mod observer;

use std::any::Any;
use std::fmt::Debug;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};

use arc_swap::ArcSwap;
use tokio::sync::broadcast::error::{RecvError, TryRecvError};
use tokio::sync::{Mutex, broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, trace, warn};

use crate::config::ModelConfig;

pub use observer::{HandlerError, Observer, ObserverId, QueueStream, Subscription};

use observer::{ChannelObserver, ObserverEntry};

/// An ordered, isolated fan-out pipeline over a broadcast source.
///
/// Created with [`initialize`](Self::initialize), which takes this
/// instance's receiver on the source and starts the intake and drain
/// tasks. Requires a Tokio runtime.
pub struct QueuedObservable<T> {
    shared: Arc<Shared<T>>,
    cancel: CancellationToken,
    handles: Mutex<Vec<JoinHandle<()>>>,
    disposed: AtomicBool,
}

/// State shared between the queue handle, subscriptions, and the tasks.
pub(crate) struct Shared<T> {
    name: String,
    observers: ArcSwap<Vec<Arc<ObserverEntry<T>>>>,
    next_id: AtomicU64,
    /// Items accepted by intake and not yet taken by the worker.
    queued: AtomicUsize,
}

impl<T> QueuedObservable<T>
where
    T: Clone + Debug + Send + Sync + 'static,
{
    /// Start draining `source` into this instance's observers.
    pub fn initialize(
        name: impl Into<String>,
        source: broadcast::Receiver<T>,
        config: &ModelConfig,
    ) -> Self {
        Self::start(name.into(), source, config, None)
    }

    /// Like [`initialize`](Self::initialize), with one observer attached
    /// before the worker starts. Items already buffered in `source` reach
    /// it too.
    pub fn initialize_with_observer<O>(
        name: impl Into<String>,
        source: broadcast::Receiver<T>,
        config: &ModelConfig,
        observer_name: impl Into<String>,
        observer: O,
    ) -> Self
    where
        O: Observer<T> + 'static,
    {
        let observer: Box<dyn Observer<T>> = Box::new(observer);
        Self::start(name.into(), source, config, Some((observer_name.into(), observer)))
    }

    fn start(
        name: String,
        source: broadcast::Receiver<T>,
        config: &ModelConfig,
        first: Option<(String, Box<dyn Observer<T>>)>,
    ) -> Self {
        let shared = Arc::new(Shared {
            name,
            observers: ArcSwap::from_pointee(Vec::new()),
            next_id: AtomicU64::new(1),
            queued: AtomicUsize::new(0),
        });
        if let Some((observer_name, observer)) = first {
            shared.add(observer_name, observer);
        }
        let cancel = CancellationToken::new();
        let (fifo_tx, fifo_rx) = mpsc::unbounded_channel();

        let intake = Intake {
            shared: Arc::clone(&shared),
            fifo: fifo_tx,
            capacity: config.queue_capacity.max(1),
            warn_threshold: config.warn_threshold(),
            backlog_warned: false,
            overflowing: false,
        };
        let handles = vec![
            tokio::spawn(intake.run(source, cancel.clone())),
            tokio::spawn(drain_loop(Arc::clone(&shared), fifo_rx)),
        ];
        debug!(queue = %shared.name, "queue initialized");

        Self {
            shared,
            cancel,
            handles: Mutex::new(handles),
            disposed: AtomicBool::new(false),
        }
    }

    pub fn name(&self) -> &str {
        &self.shared.name
    }

    /// Attach an observer. Observers are invoked in attachment order.
    pub fn subscribe<O>(&self, name: impl Into<String>, observer: O) -> Subscription<T>
    where
        O: Observer<T> + 'static,
    {
        let id = self.shared.add(name.into(), Box::new(observer));
        if self.is_disposed() {
            debug!(queue = %self.shared.name, observer = %id, "subscribed to a disposed queue");
        }
        Subscription::new(id, &self.shared)
    }

    /// Attach a channel-backed observer and return its items as a stream.
    pub fn subscribe_stream(&self, name: impl Into<String>) -> QueueStream<T> {
        let (tx, rx) = mpsc::unbounded_channel();
        let subscription = self.subscribe(name, ChannelObserver::new(tx));
        QueueStream::new(rx, subscription)
    }

    pub fn observer_count(&self) -> usize {
        self.shared.observers.load().len()
    }

    /// Items waiting for the worker.
    pub fn backlog(&self) -> usize {
        self.shared.queued.load(Ordering::Acquire)
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::Acquire)
    }

    /// Detach from the source, deliver everything already queued,
    /// complete the observers, and wait for both tasks to exit.
    ///
    /// Items published to the source after this call are not delivered.
    /// Idempotent; concurrent callers all return after the drain finished.
    pub async fn dispose(&self) {
        self.disposed.store(true, Ordering::Release);
        self.cancel.cancel();

        let mut handles = self.handles.lock().await;
        if handles.is_empty() {
            return;
        }
        for handle in handles.drain(..) {
            if let Err(e) = handle.await {
                error!(queue = %self.shared.name, error = %e, "queue task terminated abnormally");
            }
        }
        debug!(queue = %self.shared.name, "queue disposed");
    }
}

impl<T> Drop for QueuedObservable<T> {
    fn drop(&mut self) {
        // Intake detaches, the worker drains what is queued and exits.
        self.cancel.cancel();
    }
}

// ── Observer bookkeeping ─────────────────────────────────────────────

impl<T> Shared<T> {
    fn add(&self, name: String, observer: Box<dyn Observer<T>>) -> ObserverId {
        let id = ObserverId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let entry = Arc::new(ObserverEntry { id, name, observer });
        self.observers.rcu(|current| {
            let mut next: Vec<_> = current.iter().cloned().collect();
            next.push(Arc::clone(&entry));
            next
        });
        id
    }

    pub(crate) fn remove(&self, id: ObserverId) {
        self.observers.rcu(|current| {
            current
                .iter()
                .filter(|entry| entry.id != id)
                .cloned()
                .collect::<Vec<_>>()
        });
        trace!(queue = %self.name, observer = %id, "observer detached");
    }

    fn dispatch(&self, item: &T)
    where
        T: Debug,
    {
        let observers = self.observers.load_full();
        for entry in observers.iter() {
            match catch_unwind(AssertUnwindSafe(|| entry.observer.on_next(item))) {
                Ok(Ok(())) => {}
                Ok(Err(e)) => error!(
                    queue = %self.name,
                    observer = %entry.name,
                    observer_id = %entry.id,
                    item = ?item,
                    error = %e,
                    "observer failed handling item"
                ),
                Err(panic) => error!(
                    queue = %self.name,
                    observer = %entry.name,
                    observer_id = %entry.id,
                    item = ?item,
                    panic = panic_message(panic.as_ref()),
                    "observer panicked handling item"
                ),
            }
        }
    }

    fn complete(&self) {
        let observers = self.observers.swap(Arc::new(Vec::new()));
        for entry in observers.iter() {
            if catch_unwind(AssertUnwindSafe(|| entry.observer.on_completed())).is_err() {
                error!(
                    queue = %self.name,
                    observer = %entry.name,
                    observer_id = %entry.id,
                    "observer panicked on completion"
                );
            }
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.as_str()
    } else {
        "<non-string panic payload>"
    }
}

// ── Intake ───────────────────────────────────────────────────────────

/// Moves items from the source receiver into the FIFO, enforcing the
/// capacity bound. Dropping it closes the FIFO, which ends the worker.
struct Intake<T> {
    shared: Arc<Shared<T>>,
    fifo: mpsc::UnboundedSender<T>,
    capacity: usize,
    warn_threshold: usize,
    backlog_warned: bool,
    overflowing: bool,
}

impl<T> Intake<T>
where
    T: Clone + Debug + Send + Sync + 'static,
{
    async fn run(mut self, mut source: broadcast::Receiver<T>, cancel: CancellationToken) {
        loop {
            tokio::select! {
                biased;
                () = cancel.cancelled() => break,
                received = source.recv() => match received {
                    Ok(item) => {
                        if !self.push(item) {
                            return;
                        }
                    }
                    Err(RecvError::Lagged(dropped)) => self.lagged(dropped),
                    Err(RecvError::Closed) => {
                        debug!(queue = %self.shared.name, "queue source closed");
                        return;
                    }
                }
            }
        }

        // Disposed: take what the source had already published to this
        // instance, then let go of the receiver.
        let pending = source.len();
        let mut accepted = 0usize;
        for _ in 0..pending {
            match source.try_recv() {
                Ok(item) => {
                    if !self.push(item) {
                        return;
                    }
                    accepted += 1;
                }
                Err(TryRecvError::Lagged(dropped)) => self.lagged(dropped),
                Err(TryRecvError::Empty | TryRecvError::Closed) => break,
            }
        }
        trace!(queue = %self.shared.name, accepted, "queue intake detached");
    }

    /// Returns `false` once the worker is gone.
    fn push(&mut self, item: T) -> bool {
        let backlog = self.shared.queued.load(Ordering::Acquire);
        if backlog >= self.capacity {
            if !self.overflowing {
                error!(
                    queue = %self.shared.name,
                    capacity = self.capacity,
                    "event queue exceeded capacity, events were dropped; make sure event handlers do not block"
                );
                self.overflowing = true;
            }
            return true;
        }
        self.overflowing = false;

        // Counted before the send so the worker never sees it go negative.
        let backlog = self.shared.queued.fetch_add(1, Ordering::AcqRel) + 1;
        if self.fifo.send(item).is_err() {
            self.shared.queued.fetch_sub(1, Ordering::AcqRel);
            return false;
        }

        if backlog >= self.warn_threshold && !self.backlog_warned {
            warn!(
                queue = %self.shared.name,
                backlog,
                "event queue is nearing capacity; make sure event handlers do not block or events might be dropped"
            );
            self.backlog_warned = true;
        } else if backlog < self.warn_threshold {
            self.backlog_warned = false;
        }
        true
    }

    fn lagged(&self, dropped: u64) {
        error!(
            queue = %self.shared.name,
            dropped,
            "event queue exceeded capacity, events were dropped; make sure event handlers do not block"
        );
    }
}

// ── Drain worker ─────────────────────────────────────────────────────

async fn drain_loop<T>(shared: Arc<Shared<T>>, mut fifo: mpsc::UnboundedReceiver<T>)
where
    T: Clone + Debug + Send + Sync + 'static,
{
    while let Some(item) = fifo.recv().await {
        shared.queued.fetch_sub(1, Ordering::AcqRel);
        shared.dispatch(&item);
    }
    trace!(queue = %shared.name, "queue drained");
    shared.complete();
}
