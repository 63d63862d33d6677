// ── Transport contract ──
//
// The seam between the core and a live hub connection. Implementations
// own the socket, request ids, and wire decoding; the core only sees
// decoded records and a hot broadcast of inbound messages.

use std::future::Future;
use std::sync::Arc;

use tokio::sync::broadcast;

use crate::command::HassCommand;
use crate::error::Error;
use crate::messages::{HassMessage, HassState};
use crate::registry::{HassArea, HassDevice, HassEntity};

/// A subscription on the shared inbound channel.
pub type MessageReceiver = broadcast::Receiver<Arc<HassMessage>>;

/// A connection to the hub.
///
/// Async methods return `Send` futures so callers can drive them from
/// spawned tasks while staying generic over the implementation.
pub trait Transport: Send + Sync + 'static {
    /// Attach a new receiver to the inbound message channel.
    ///
    /// Every call returns an independent receiver that sees messages
    /// produced from that point on. Fails if the hub is unreachable.
    fn subscribe_messages(&self) -> Result<MessageReceiver, Error>;

    /// Fetch the full current state set.
    fn get_states(&self) -> impl Future<Output = Result<Vec<HassState>, Error>> + Send;

    fn get_areas(&self) -> impl Future<Output = Result<Vec<HassArea>, Error>> + Send;

    fn get_devices(&self) -> impl Future<Output = Result<Vec<HassDevice>, Error>> + Send;

    fn get_entities(&self) -> impl Future<Output = Result<Vec<HassEntity>, Error>> + Send;

    /// Send a command and wait for its response.
    ///
    /// The response `id` is the correlation id the hub will tag later
    /// deliveries with.
    fn send_command(
        &self,
        command: HassCommand,
    ) -> impl Future<Output = Result<HassMessage, Error>> + Send;
}
