// ── Core error types ──
//
// User-facing errors from hassmodel-core. Consumers never see raw
// transport failures; the `From<hassmodel_api::Error>` impl folds them
// into the variants below.

use thiserror::Error;

/// Unified error type for the core crate.
#[derive(Debug, Error)]
pub enum CoreError {
    // ── Connection errors ────────────────────────────────────────────
    /// The hub was unreachable while initializing or rebuilding.
    #[error("Cannot reach hub: {reason}")]
    ConnectionFailed { reason: String },

    #[error("Hub request timed out after {timeout_secs}s")]
    Timeout { timeout_secs: u64 },

    // ── Subscription errors ──────────────────────────────────────────
    /// The hub rejected (or never answered) a subscribe command.
    #[error("Subscribe failed: {message}")]
    SubscribeFailed { message: String },

    /// The component was already disposed.
    #[error("{component} has been disposed")]
    Disposed { component: &'static str },

    // ── Data errors ──────────────────────────────────────────────────
    #[error("Invalid {event_type} event: {reason}")]
    InvalidEvent { event_type: String, reason: String },

    // ── Internal errors ──────────────────────────────────────────────
    #[error("Internal error: {0}")]
    Internal(String),
}

impl CoreError {
    /// Returns `true` for failures caused by losing the hub.
    pub fn is_connection_error(&self) -> bool {
        matches!(self, Self::ConnectionFailed { .. } | Self::Timeout { .. })
    }
}

// ── Conversion from transport-layer errors ───────────────────────────

impl From<hassmodel_api::Error> for CoreError {
    fn from(err: hassmodel_api::Error) -> Self {
        match err {
            hassmodel_api::Error::ConnectionFailed { reason } => {
                CoreError::ConnectionFailed { reason }
            }
            hassmodel_api::Error::NotConnected => CoreError::ConnectionFailed {
                reason: "not connected".into(),
            },
            hassmodel_api::Error::ChannelClosed => CoreError::ConnectionFailed {
                reason: "message channel closed".into(),
            },
            hassmodel_api::Error::Timeout { timeout_secs } => CoreError::Timeout { timeout_secs },
            hassmodel_api::Error::CommandFailed { code, message } => CoreError::SubscribeFailed {
                message: format!("{code}: {message}"),
            },
            hassmodel_api::Error::Deserialization { message } => {
                CoreError::Internal(format!("Deserialization error: {message}"))
            }
        }
    }
}
