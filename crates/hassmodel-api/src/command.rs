// ── Outbound commands ──

use serde::Serialize;
use serde_json::Value;

/// Commands the core sends over the shared duplex channel.
///
/// The transport assigns the request id; the response carries it back
/// and, for subscriptions, every later delivery is tagged with it.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum HassCommand {
    /// Ask the hub to evaluate `trigger` and deliver a message each time it fires.
    SubscribeTrigger { trigger: Value },

    /// Cancel the subscription previously answered with id `subscription`.
    UnsubscribeEvents { subscription: u64 },
}
