#![forbid(unsafe_code)]

//! Outcome of a delivery attempt.
//!
//! A submission future resolves to `Result<Outcome, Error>`: `Outcome` holds
//! the server's verdict (accepted or rejected), while transport and
//! lifecycle failures travel on the error channel.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde::Deserialize;
use uuid::Uuid;

use crate::reason::RejectionReason;

/// Terminal verdict from the server for one notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// The notification was accepted for delivery.
    Accepted {
        /// Notification id echoed by the server, when present.
        apns_id: Option<Uuid>,
    },
    /// The notification was rejected with a reason.
    Rejected {
        /// Parsed reason; `Other` when outside the recognized set.
        reason: RejectionReason,
        /// Reason string exactly as received; empty when the body was
        /// missing or malformed.
        raw_reason: String,
        /// Instant at which the device token became invalid. Present only
        /// when the reason is `Unregistered`.
        token_invalidated_at: Option<SystemTime>,
    },
}

impl Outcome {
    /// Whether the server accepted the notification.
    pub fn is_accepted(&self) -> bool {
        matches!(self, Self::Accepted { .. })
    }

    /// The rejection reason, when rejected.
    pub fn rejection_reason(&self) -> Option<&RejectionReason> {
        match self {
            Self::Rejected { reason, .. } => Some(reason),
            Self::Accepted { .. } => None,
        }
    }
}

/// Body of a non-200 APNs response.
#[derive(Debug, Clone, Deserialize)]
pub struct ErrorResponse {
    /// Reason string; absent on malformed bodies.
    pub reason: Option<String>,
    /// Milliseconds since the unix epoch at which the token went stale.
    pub timestamp: Option<u64>,
}

impl ErrorResponse {
    /// Build a `Rejected` outcome from a parsed (or unparseable) body.
    ///
    /// A malformed body yields an empty raw reason. The invalidation
    /// timestamp is attached only for `Unregistered`, converted from
    /// millisecond precision.
    pub fn into_outcome(self) -> Outcome {
        let raw = self.reason.unwrap_or_default();
        let reason = RejectionReason::from(raw.clone());
        let token_invalidated_at = if reason == RejectionReason::Unregistered {
            self.timestamp
                .map(|ms| UNIX_EPOCH + Duration::from_millis(ms))
        } else {
            None
        };
        Outcome::Rejected {
            reason,
            raw_reason: raw,
            token_invalidated_at,
        }
    }

    /// Parse a response body, tolerating malformed JSON.
    pub fn parse(body: &[u8]) -> Self {
        serde_json::from_slice(body).unwrap_or(Self {
            reason: None,
            timestamp: None,
        })
    }
}
