#![forbid(unsafe_code)]

//! Push-style metrics callbacks.
//!
//! Listeners are invoked from connection and dispatcher tasks. They must
//! not block: a listener that needs to do real work should hand the event
//! to its own channel or executor. There is no back-pressure on metrics.

use std::time::Duration;

use apns_core::{Error, RejectionReason};

/// How a submission was acknowledged, for metrics purposes.
#[derive(Debug, Clone, Copy)]
pub enum Acknowledgement<'a> {
    /// The server accepted the notification.
    Accepted,
    /// The server rejected the notification.
    Rejected(&'a RejectionReason),
    /// The submission failed without a server verdict.
    Failed(&'a Error),
}

/// Typed callbacks fired at submission, send, acknowledgement, and
/// connection transitions. Every method has an empty default body.
pub trait MetricsListener: Send + Sync {
    /// A submission failed before its request was fully written.
    fn write_failure(&self, _topic: &str) {}

    /// A request was fully written to the wire.
    fn notification_sent(&self, _topic: &str) {}

    /// A submission resolved, `elapsed` after its send.
    fn notification_acknowledged(&self, _ack: Acknowledgement<'_>, _elapsed: Duration) {}

    /// A connection reached Ready state.
    fn connection_added(&self) {}

    /// A connection left the pool.
    fn connection_removed(&self) {}

    /// A connection attempt failed before becoming Ready.
    fn connection_creation_failed(&self) {}
}

/// Listener that ignores every event; the default.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopMetrics;

impl MetricsListener for NoopMetrics {}
