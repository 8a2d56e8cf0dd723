#![forbid(unsafe_code)]

//! Error taxonomy shared across the workspace.
//!
//! Local recovery (reconnect with backoff, token re-mint) happens inside the
//! client; everything else is surfaced to the caller through these variants.
//! Nothing here terminates the client: it keeps reconnecting until closed.

use thiserror::Error as ThisError;

/// Workspace-wide result alias.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// A notification failed validation before any network I/O.
#[derive(Debug, Clone, PartialEq, Eq, ThisError)]
pub enum ValidationError {
    /// Device token is not 32-100 lowercase hex characters.
    #[error("device token must be 32-100 lowercase hex characters")]
    DeviceToken,
    /// Topic is empty or contains non-ASCII characters.
    #[error("topic must be non-empty ASCII")]
    Topic,
    /// Payload exceeds the size limit for its push type.
    #[error("payload of {size} bytes exceeds the {limit} byte limit")]
    PayloadTooLarge {
        /// Actual payload size in bytes.
        size: usize,
        /// Applicable limit (4096, or 5120 for VoIP).
        limit: usize,
    },
    /// Collapse id exceeds 64 bytes.
    #[error("collapse id must be at most 64 bytes")]
    CollapseId,
    /// Caller-supplied apns-id is not a canonical UUID.
    #[error("apns-id must be a canonical UUID")]
    ApnsId,
}

/// Failure modes of a submission or of the client lifecycle.
#[derive(Debug, ThisError)]
pub enum Error {
    /// Pre-send validation failure; no network I/O was attempted.
    #[error("invalid notification: {0}")]
    InvalidNotification(#[from] ValidationError),
    /// TLS, ALPN, or socket-level failure establishing a connection.
    #[error("connection failed: {0}")]
    ConnectionFailed(String),
    /// The HTTP/2 stream carrying this submission was reset or lost.
    #[error("stream failed: {0}")]
    StreamFailed(String),
    /// Keepalive PING went unacknowledged; the connection was closed.
    #[error("connection idle timeout")]
    IdleTimeout,
    /// The per-submission deadline fired before a response arrived.
    #[error("submission deadline elapsed")]
    TimedOut,
    /// The client was closed while this submission was outstanding.
    #[error("client closed")]
    ClientClosed,
    /// New submissions are rejected while the client drains.
    #[error("client is shutting down")]
    ShuttingDown,
    /// No connection reached Ready state, or the acquire queue overflowed.
    #[error("no ready connection: {0}")]
    NoReadyConnection(String),
    /// Token minting or signing failure.
    #[error("authentication: {0}")]
    Auth(String),
    /// TLS configuration or handshake failure.
    #[error("tls: {0}")]
    Tls(String),
    /// Protocol-level HTTP/2 failure outside a single stream.
    #[error("http/2: {0}")]
    Http2(#[from] h2::Error),
    /// Underlying socket error.
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Connection-establishment failure with context.
    pub fn connection(msg: impl Into<String>) -> Self {
        Self::ConnectionFailed(msg.into())
    }

    /// Stream-level failure with context.
    pub fn stream(msg: impl Into<String>) -> Self {
        Self::StreamFailed(msg.into())
    }

    /// Authentication failure with context.
    pub fn auth(msg: impl Into<String>) -> Self {
        Self::Auth(msg.into())
    }

    /// TLS failure with context.
    pub fn tls(msg: impl Into<String>) -> Self {
        Self::Tls(msg.into())
    }

    /// Whether the failure happened before any bytes reached the wire.
    pub fn is_pre_send(&self) -> bool {
        matches!(
            self,
            Self::InvalidNotification(_) | Self::NoReadyConnection(_) | Self::ShuttingDown
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_error_display_names_the_limit() {
        let err = ValidationError::PayloadTooLarge {
            size: 5000,
            limit: 4096,
        };
        assert_eq!(err.to_string(), "payload of 5000 bytes exceeds the 4096 byte limit");
    }

    #[test]
    fn pre_send_classification() {
        assert!(Error::from(ValidationError::Topic).is_pre_send());
        assert!(Error::ShuttingDown.is_pre_send());
        assert!(!Error::TimedOut.is_pre_send());
        assert!(!Error::IdleTimeout.is_pre_send());
    }
}
