//! Event distribution core between a hub connection (`hassmodel-api`) and
//! in-process consumers (automations, generated bindings).
//!
//! - **[`QueuedObservable`]**: turns one hot broadcast source into an
//!   isolated, strictly ordered delivery pipeline with its own drain
//!   worker. Observer failures and panics are logged and contained;
//!   [`dispose()`](QueuedObservable::dispose) delivers everything already
//!   queued before it resolves.
//!
//! - **[`EntityStateCache`]**: `entity_id -> latest state`, kept current
//!   from `state_changed` events. The cache is updated before an event is
//!   republished, so handlers always read the value they were notified of.
//!
//! - **[`TriggerManager`]**: registers server-side triggers over the shared
//!   channel and demultiplexes deliveries by subscription id. Each
//!   registration is unsubscribed exactly once and receives nothing after.
//!
//! - **[`EntityAreaCache`]** / **[`RegistryCache`]**: indexes joined from
//!   the entity, device and area registries, replaced wholesale on
//!   registry-updated events. A failed rebuild keeps the previous index.
//!
//! - **[`HaContext`]**: one consumer's scope over all of the above, with
//!   its own event queue and tracked background work.

pub mod config;
pub mod context;
pub mod convert;
pub mod error;
pub mod model;
pub mod queue;
pub mod registry;
pub mod state;
pub mod tasks;
pub mod trigger;

// ── Primary re-exports ──────────────────────────────────────────────
pub use config::{DEFAULT_QUEUE_CAPACITY, ModelConfig};
pub use context::HaContext;
pub use error::CoreError;
pub use queue::{HandlerError, Observer, ObserverId, QueueStream, QueuedObservable, Subscription};
pub use registry::{EntityAreaCache, RegistryCache, RegistrySnapshot};
pub use state::{CacheEvent, EntityStateCache};
pub use tasks::BackgroundTaskTracker;
pub use trigger::{RegistrationState, TriggerManager, TriggerSubscription};

// Re-export model types at the crate root for ergonomics.
pub use model::{
    Area, Attributes, Context, Device, EntityRegistration, EntityState, RegistryEventKind,
    StateChange,
};
