#![forbid(unsafe_code)]

//! Closed enumeration of APNs rejection reasons.
//!
//! The server reports a rejection as JSON `{"reason": "...", "timestamp": n}`.
//! The reason strings form a closed set; anything outside it is carried
//! verbatim in [`RejectionReason::Other`] so new server-side reasons do not
//! break deserialization.

use serde::{Deserialize, Serialize};

/// Reason string attached to a non-200 APNs response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum RejectionReason {
    /// The message payload was empty.
    PayloadEmpty,
    /// The message payload was too large.
    PayloadTooLarge,
    /// The apns-topic value is invalid.
    BadTopic,
    /// Pushing to this topic is not allowed.
    TopicDisallowed,
    /// The apns-id value is bad.
    BadMessageId,
    /// The apns-expiration value is bad.
    BadExpirationDate,
    /// The apns-priority value is bad.
    BadPriority,
    /// The device token is not specified in the request path.
    MissingDeviceToken,
    /// The specified device token is invalid.
    BadDeviceToken,
    /// The device token does not match the specified topic.
    DeviceTokenNotForTopic,
    /// The device token is inactive for the specified topic.
    Unregistered,
    /// One or more headers were repeated.
    DuplicateHeaders,
    /// The client certificate was for the wrong environment.
    BadCertificateEnvironment,
    /// The certificate was bad.
    BadCertificate,
    /// The specified action is not allowed.
    Forbidden,
    /// The request contained a bad :path value.
    BadPath,
    /// The specified :method was not POST.
    MethodNotAllowed,
    /// Too many requests were made consecutively to the same device token.
    TooManyRequests,
    /// Idle timeout.
    IdleTimeout,
    /// The server is shutting down.
    Shutdown,
    /// An internal server error occurred.
    InternalServerError,
    /// The service is unavailable.
    ServiceUnavailable,
    /// The apns-topic header of the request was not specified and was required.
    MissingTopic,
    /// The provider token is stale and a new token should be generated.
    ExpiredProviderToken,
    /// A reason outside the recognized set, preserved verbatim.
    Other(String),
}

impl RejectionReason {
    /// The wire string for this reason.
    pub fn as_str(&self) -> &str {
        match self {
            Self::PayloadEmpty => "PayloadEmpty",
            Self::PayloadTooLarge => "PayloadTooLarge",
            Self::BadTopic => "BadTopic",
            Self::TopicDisallowed => "TopicDisallowed",
            Self::BadMessageId => "BadMessageId",
            Self::BadExpirationDate => "BadExpirationDate",
            Self::BadPriority => "BadPriority",
            Self::MissingDeviceToken => "MissingDeviceToken",
            Self::BadDeviceToken => "BadDeviceToken",
            Self::DeviceTokenNotForTopic => "DeviceTokenNotForTopic",
            Self::Unregistered => "Unregistered",
            Self::DuplicateHeaders => "DuplicateHeaders",
            Self::BadCertificateEnvironment => "BadCertificateEnvironment",
            Self::BadCertificate => "BadCertificate",
            Self::Forbidden => "Forbidden",
            Self::BadPath => "BadPath",
            Self::MethodNotAllowed => "MethodNotAllowed",
            Self::TooManyRequests => "TooManyRequests",
            Self::IdleTimeout => "IdleTimeout",
            Self::Shutdown => "Shutdown",
            Self::InternalServerError => "InternalServerError",
            Self::ServiceUnavailable => "ServiceUnavailable",
            Self::MissingTopic => "MissingTopic",
            Self::ExpiredProviderToken => "ExpiredProviderToken",
            Self::Other(s) => s,
        }
    }

    /// Whether the provider token is stale and should be re-minted.
    pub fn is_token_expired(&self) -> bool {
        matches!(self, Self::ExpiredProviderToken)
    }

    /// Whether the device token should be dropped from the caller's records.
    pub fn invalidates_device_token(&self) -> bool {
        matches!(
            self,
            Self::Unregistered | Self::BadDeviceToken | Self::DeviceTokenNotForTopic
        )
    }
}

impl From<String> for RejectionReason {
    fn from(s: String) -> Self {
        match s.as_str() {
            "PayloadEmpty" => Self::PayloadEmpty,
            "PayloadTooLarge" => Self::PayloadTooLarge,
            "BadTopic" => Self::BadTopic,
            "TopicDisallowed" => Self::TopicDisallowed,
            "BadMessageId" => Self::BadMessageId,
            "BadExpirationDate" => Self::BadExpirationDate,
            "BadPriority" => Self::BadPriority,
            "MissingDeviceToken" => Self::MissingDeviceToken,
            "BadDeviceToken" => Self::BadDeviceToken,
            "DeviceTokenNotForTopic" => Self::DeviceTokenNotForTopic,
            "Unregistered" => Self::Unregistered,
            "DuplicateHeaders" => Self::DuplicateHeaders,
            "BadCertificateEnvironment" => Self::BadCertificateEnvironment,
            "BadCertificate" => Self::BadCertificate,
            "Forbidden" => Self::Forbidden,
            "BadPath" => Self::BadPath,
            "MethodNotAllowed" => Self::MethodNotAllowed,
            "TooManyRequests" => Self::TooManyRequests,
            "IdleTimeout" => Self::IdleTimeout,
            "Shutdown" => Self::Shutdown,
            "InternalServerError" => Self::InternalServerError,
            "ServiceUnavailable" => Self::ServiceUnavailable,
            "MissingTopic" => Self::MissingTopic,
            "ExpiredProviderToken" => Self::ExpiredProviderToken,
            _ => Self::Other(s),
        }
    }
}

impl From<RejectionReason> for String {
    fn from(r: RejectionReason) -> Self {
        r.as_str().to_owned()
    }
}

impl std::fmt::Display for RejectionReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recognized_reasons_round_trip() {
        for wire in [
            "PayloadEmpty",
            "BadDeviceToken",
            "Unregistered",
            "ExpiredProviderToken",
            "ServiceUnavailable",
        ] {
            let reason = RejectionReason::from(wire.to_owned());
            assert!(!matches!(reason, RejectionReason::Other(_)), "{wire}");
            assert_eq!(reason.as_str(), wire);
        }
    }

    #[test]
    fn unknown_reason_preserved() {
        let reason = RejectionReason::from("SomethingNew".to_owned());
        assert_eq!(reason, RejectionReason::Other("SomethingNew".into()));
        assert_eq!(reason.as_str(), "SomethingNew");
    }

    #[test]
    fn serde_uses_wire_strings() {
        let json = serde_json::to_string(&RejectionReason::BadDeviceToken).unwrap();
        assert_eq!(json, "\"BadDeviceToken\"");
        let back: RejectionReason = serde_json::from_str("\"Unregistered\"").unwrap();
        assert_eq!(back, RejectionReason::Unregistered);
    }

    #[test]
    fn predicates() {
        assert!(RejectionReason::ExpiredProviderToken.is_token_expired());
        assert!(!RejectionReason::BadDeviceToken.is_token_expired());
        assert!(RejectionReason::Unregistered.invalidates_device_token());
        assert!(RejectionReason::BadDeviceToken.invalidates_device_token());
        assert!(!RejectionReason::Shutdown.invalidates_device_token());
    }
}
