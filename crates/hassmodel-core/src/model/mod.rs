// ── Domain model ──
//
// Canonical, immutable types handed to consumers. Raw hub records from
// `hassmodel-api` are converted into these in `crate::convert`.

pub mod event_kind;
pub mod registry;
pub mod state;

pub use event_kind::RegistryEventKind;
pub use registry::{Area, Device, EntityRegistration};
pub use state::{Attributes, Context, EntityState, StateChange};
