// ── Runtime configuration ──
//
// Tuning knobs for the distribution layer. These never touch disk:
// `hassmodel-config` (or the embedding application) builds a
// `ModelConfig` and hands it in.

use std::time::Duration;

use crate::model::RegistryEventKind;

/// Default per-instance queue bound.
pub const DEFAULT_QUEUE_CAPACITY: usize = 1024;

/// Configuration shared by every component in the core.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelConfig {
    /// Maximum number of items buffered per Fan-Out Queue instance.
    /// Items beyond this are dropped (and logged) for that instance only.
    pub queue_capacity: usize,
    /// Fill ratio above which a queue logs a backlog warning.
    pub near_capacity_ratio: f64,
    /// Upper bound on waiting for background tasks during dispose.
    pub flush_timeout: Duration,
    /// Event types that invalidate the registry-derived indexes.
    pub registry_events: Vec<RegistryEventKind>,
}

impl ModelConfig {
    /// Queue length at which the backlog warning fires.
    pub(crate) fn warn_threshold(&self) -> usize {
        #[allow(
            clippy::cast_possible_truncation,
            clippy::cast_sign_loss,
            clippy::cast_precision_loss,
            clippy::as_conversions
        )]
        let threshold = (self.queue_capacity as f64 * self.near_capacity_ratio) as usize;
        threshold.clamp(1, self.queue_capacity.max(1))
    }

    pub(crate) fn is_registry_event(&self, event_type: &str) -> bool {
        self.registry_events
            .iter()
            .any(|kind| kind.as_ref() == event_type)
    }
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            near_capacity_ratio: 0.9,
            flush_timeout: Duration::from_secs(5),
            registry_events: RegistryEventKind::all().to_vec(),
        }
    }
}
