// ── Background task tracking ──
//
// Fire-and-forget work (index rebuilds, unsubscribes scheduled from
// `Drop`) runs on tracked tasks so an owner can wait for it on dispose.

use std::future::Future;
use std::time::Duration;

use tokio::runtime::Handle;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, warn};

use crate::config::ModelConfig;
use crate::error::CoreError;

/// Spawns and tracks background work; failures are logged, never returned.
#[derive(Debug, Clone)]
pub struct BackgroundTaskTracker {
    tracker: TaskTracker,
    flush_timeout: Duration,
}

impl BackgroundTaskTracker {
    pub fn new(config: &ModelConfig) -> Self {
        Self {
            tracker: TaskTracker::new(),
            flush_timeout: config.flush_timeout,
        }
    }

    /// Spawn `future` on the current runtime and track it until it ends.
    ///
    /// An `Err` result is logged with `description`. Outside a runtime
    /// (e.g. a handle dropped after shutdown) the work is skipped.
    pub fn track<F>(&self, future: F, description: impl Into<String>)
    where
        F: Future<Output = Result<(), CoreError>> + Send + 'static,
    {
        let description = description.into();
        let Ok(handle) = Handle::try_current() else {
            warn!(task = %description, "no runtime available, background task skipped");
            return;
        };

        self.tracker.spawn_on(
            async move {
                if let Err(e) = future.await {
                    error!(task = %description, error = %e, "background task failed");
                }
            },
            &handle,
        );
    }

    /// Number of tracked tasks still running.
    pub fn len(&self) -> usize {
        self.tracker.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracker.is_empty()
    }

    /// Wait for every tracked task, bounded by the configured flush
    /// timeout. Returns `false` if tasks were still running at the bound.
    ///
    /// The tracker stays usable afterwards.
    pub async fn flush(&self) -> bool {
        self.tracker.close();
        let finished = tokio::time::timeout(self.flush_timeout, self.tracker.wait())
            .await
            .is_ok();
        self.tracker.reopen();

        if finished {
            debug!("background tasks flushed");
        } else {
            warn!(
                pending = self.tracker.len(),
                timeout_ms = u64::try_from(self.flush_timeout.as_millis()).unwrap_or(u64::MAX),
                "background tasks still running after flush timeout"
            );
        }
        finished
    }
}
