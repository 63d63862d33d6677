// ── Inbound hub records ──
//
// Shapes of the messages a hub connection delivers. Field names follow
// what the hub sends so a transport can deserialize straight into them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::Error;

/// Event type tag for state changes.
pub const STATE_CHANGED: &str = "state_changed";

// ── HassMessage ─────────────────────────────────────────────────────

/// One message from the shared inbound channel.
///
/// `id` is the correlation id of the subscription (or command) the
/// message belongs to. Plain event subscriptions and trigger
/// subscriptions both arrive with `type = "event"`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HassMessage {
    #[serde(default)]
    pub id: u64,

    #[serde(rename = "type", default)]
    pub message_type: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub success: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event: Option<HassEvent>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
}

impl HassMessage {
    /// Build an event message for subscription `id`.
    pub fn event(id: u64, event: HassEvent) -> Self {
        Self {
            id,
            message_type: "event".into(),
            event: Some(event),
            ..Self::default()
        }
    }

    /// Build a trigger-fired message for subscription `id`.
    pub fn trigger(id: u64, payload: Value) -> Self {
        Self::event(
            id,
            HassEvent {
                variables: Some(HassVariables {
                    trigger: Some(payload),
                }),
                ..HassEvent::default()
            },
        )
    }

    /// The trigger payload carried by this message, if any.
    pub fn trigger_payload(&self) -> Option<&Value> {
        self.event
            .as_ref()?
            .variables
            .as_ref()?
            .trigger
            .as_ref()
    }
}

// ── HassEvent ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HassEvent {
    #[serde(default)]
    pub event_type: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub origin: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_fired: Option<DateTime<Utc>>,

    /// Event payload, opaque at this layer.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,

    /// Present on trigger subscriptions only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variables: Option<HassVariables>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<HassContext>,
}

impl HassEvent {
    pub fn new(event_type: impl Into<String>, data: Option<Value>) -> Self {
        Self {
            event_type: event_type.into(),
            data,
            ..Self::default()
        }
    }

    pub fn is_state_changed(&self) -> bool {
        self.event_type == STATE_CHANGED
    }

    /// Decode the payload of a `state_changed` event.
    pub fn state_changed_data(&self) -> Result<HassStateChangedEventData, Error> {
        let data = self.data.clone().ok_or_else(|| Error::Deserialization {
            message: format!("{} event without data", self.event_type),
        })?;
        Ok(serde_json::from_value(data)?)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HassVariables {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trigger: Option<Value>,
}

// ── State records ───────────────────────────────────────────────────

/// Raw state record for one entity, as fetched or as carried by a
/// `state_changed` event.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HassState {
    pub entity_id: String,

    #[serde(default)]
    pub state: String,

    #[serde(default)]
    pub attributes: Value,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_changed: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_updated: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<HassContext>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HassContext {
    pub id: String,

    #[serde(default)]
    pub user_id: Option<String>,

    #[serde(default)]
    pub parent_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HassStateChangedEventData {
    pub entity_id: String,

    #[serde(default)]
    pub old_state: Option<HassState>,

    #[serde(default)]
    pub new_state: Option<HassState>,
}
