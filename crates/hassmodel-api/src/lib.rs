// hassmodel-api: Records, commands, and the transport contract for a hub connection.
//
// Nothing in this crate performs I/O. A concrete connection (WebSocket,
// test double, replay file) implements [`Transport`] and hands it to
// `hassmodel-core`.

pub mod command;
pub mod error;
pub mod messages;
pub mod registry;
pub mod transport;

pub use command::HassCommand;
pub use error::Error;
pub use messages::{
    HassContext, HassEvent, HassMessage, HassState, HassStateChangedEventData, HassVariables,
    STATE_CHANGED,
};
pub use registry::{HassArea, HassDevice, HassEntity};
pub use transport::{MessageReceiver, Transport};
