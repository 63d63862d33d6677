use thiserror::Error;

/// Top-level error type for the `hassmodel-api` crate.
///
/// Covers every failure a [`Transport`](crate::Transport) can report.
/// `hassmodel-core` maps these into its own taxonomy.
#[derive(Debug, Error)]
pub enum Error {
    // ── Connection ──────────────────────────────────────────────────
    /// The hub could not be reached (refused, DNS failure, handshake error).
    #[error("Cannot connect to hub: {reason}")]
    ConnectionFailed { reason: String },

    /// There is no live connection right now.
    #[error("Not connected to hub")]
    NotConnected,

    /// The inbound message channel has been closed by the connection.
    #[error("Message channel closed")]
    ChannelClosed,

    /// Request timed out.
    #[error("Request timed out after {timeout_secs}s")]
    Timeout { timeout_secs: u64 },

    // ── Commands ────────────────────────────────────────────────────
    /// The hub answered a command with `success: false`.
    #[error("Command failed ({code}): {message}")]
    CommandFailed { code: String, message: String },

    // ── Data ────────────────────────────────────────────────────────
    /// A payload could not be decoded into the expected record.
    #[error("Deserialization error: {message}")]
    Deserialization { message: String },
}

impl Error {
    /// Returns `true` if this is a transient error worth retrying.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::ConnectionFailed { .. } | Self::NotConnected | Self::Timeout { .. }
        )
    }

    /// Returns `true` if the error means the hub is unreachable.
    pub fn is_connection_error(&self) -> bool {
        matches!(
            self,
            Self::ConnectionFailed { .. } | Self::NotConnected | Self::ChannelClosed
        )
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::Deserialization {
            message: err.to_string(),
        }
    }
}
