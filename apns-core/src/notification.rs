#![forbid(unsafe_code)]

//! Notification model and validation.
//!
//! A [`Notification`] is immutable once built. All validation happens in
//! [`NotificationBuilder::build`] so a submission that reaches the transport
//! engine is already well-formed and fails only for network or server
//! reasons.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use bytes::Bytes;
use uuid::Uuid;

use crate::error::ValidationError;

/// Maximum payload size in bytes for regular notifications.
pub const MAX_PAYLOAD_SIZE: usize = 4096;
/// Maximum payload size in bytes for VoIP notifications.
pub const MAX_VOIP_PAYLOAD_SIZE: usize = 5120;
/// Maximum collapse id length in bytes.
pub const MAX_COLLAPSE_ID_SIZE: usize = 64;

/// Delivery priority, carried in the `apns-priority` header.
///
/// The header is omitted entirely when the caller does not set a priority;
/// the server then applies its own default.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Priority {
    /// Send at a time that conserves the device's power (value 5).
    Conserve,
    /// Send immediately (value 10).
    Immediate,
}

impl Priority {
    /// Wire value for the `apns-priority` header.
    pub fn as_u8(self) -> u8 {
        match self {
            Self::Conserve => 5,
            Self::Immediate => 10,
        }
    }
}

/// Push type tag, carried in the `apns-push-type` header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushType {
    /// User-visible alert.
    Alert,
    /// Silent background refresh.
    Background,
    /// Voice-over-IP wakeup; raises the payload limit to 5120 bytes.
    Voip,
    /// watchOS complication update.
    Complication,
    /// File provider update.
    FileProvider,
    /// Mobile device management command.
    Mdm,
    /// Live Activity update.
    LiveActivity,
    /// Location query.
    Location,
}

impl PushType {
    /// Wire value for the `apns-push-type` header.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Alert => "alert",
            Self::Background => "background",
            Self::Voip => "voip",
            Self::Complication => "complication",
            Self::FileProvider => "fileprovider",
            Self::Mdm => "mdm",
            Self::LiveActivity => "liveactivity",
            Self::Location => "location",
        }
    }
}

/// An immutable, validated push notification.
#[derive(Debug, Clone)]
pub struct Notification {
    device_token: String,
    topic: String,
    payload: Bytes,
    expiration: Option<SystemTime>,
    priority: Option<Priority>,
    collapse_id: Option<String>,
    push_type: Option<PushType>,
    apns_id: Option<Uuid>,
}

impl Notification {
    /// Start building a notification from the three mandatory fields.
    pub fn builder(
        device_token: impl Into<String>,
        topic: impl Into<String>,
        payload: impl Into<Bytes>,
    ) -> NotificationBuilder {
        NotificationBuilder {
            device_token: device_token.into(),
            topic: topic.into(),
            payload: payload.into(),
            expiration: None,
            priority: None,
            collapse_id: None,
            push_type: None,
            apns_id: None,
        }
    }

    /// Hex-encoded device token; forms the request path.
    pub fn device_token(&self) -> &str {
        &self.device_token
    }

    /// Topic (bundle id or subtopic) this notification targets.
    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Raw JSON payload bytes.
    pub fn payload(&self) -> &Bytes {
        &self.payload
    }

    /// Expiration instant, encoded as unix seconds on the wire.
    pub fn expiration(&self) -> Option<SystemTime> {
        self.expiration
    }

    /// Unix-seconds value for the `apns-expiration` header.
    pub fn expiration_secs(&self) -> Option<u64> {
        self.expiration.map(|t| {
            t.duration_since(UNIX_EPOCH)
                .map(|d| d.as_secs())
                .unwrap_or(0)
        })
    }

    /// Delivery priority, if the caller set one.
    pub fn priority(&self) -> Option<Priority> {
        self.priority
    }

    /// Collapse id, if any.
    pub fn collapse_id(&self) -> Option<&str> {
        self.collapse_id.as_deref()
    }

    /// Push type tag, if any.
    pub fn push_type(&self) -> Option<PushType> {
        self.push_type
    }

    /// Caller-supplied notification id; the server assigns one when absent.
    pub fn apns_id(&self) -> Option<Uuid> {
        self.apns_id
    }

    /// The payload limit that applies to this notification's push type.
    pub fn payload_limit(&self) -> usize {
        match self.push_type {
            Some(PushType::Voip) => MAX_VOIP_PAYLOAD_SIZE,
            _ => MAX_PAYLOAD_SIZE,
        }
    }
}

/// Builder for [`Notification`]; `build` runs full validation.
#[derive(Debug, Clone)]
pub struct NotificationBuilder {
    device_token: String,
    topic: String,
    payload: Bytes,
    expiration: Option<SystemTime>,
    priority: Option<Priority>,
    collapse_id: Option<String>,
    push_type: Option<PushType>,
    apns_id: Option<Uuid>,
}

impl NotificationBuilder {
    /// Expire the notification at the given instant.
    pub fn expiration(mut self, at: SystemTime) -> Self {
        self.expiration = Some(at);
        self
    }

    /// Expire the notification after the given duration from now.
    pub fn expires_in(self, ttl: Duration) -> Self {
        self.expiration(SystemTime::now() + ttl)
    }

    /// Set the delivery priority.
    pub fn priority(mut self, priority: Priority) -> Self {
        self.priority = Some(priority);
        self
    }

    /// Set the collapse id (at most 64 bytes).
    pub fn collapse_id(mut self, id: impl Into<String>) -> Self {
        self.collapse_id = Some(id.into());
        self
    }

    /// Set the push type tag.
    pub fn push_type(mut self, push_type: PushType) -> Self {
        self.push_type = Some(push_type);
        self
    }

    /// Supply the notification id instead of letting the server assign one.
    pub fn apns_id(mut self, id: Uuid) -> Self {
        self.apns_id = Some(id);
        self
    }

    /// Supply the notification id as a string; validated as a canonical UUID.
    pub fn apns_id_str(mut self, id: &str) -> Result<Self, ValidationError> {
        let parsed = Uuid::try_parse(id).map_err(|_| ValidationError::ApnsId)?;
        self.apns_id = Some(parsed);
        Ok(self)
    }

    /// Validate every field and produce the immutable notification.
    pub fn build(self) -> Result<Notification, ValidationError> {
        validate_device_token(&self.device_token)?;
        validate_topic(&self.topic)?;

        let limit = match self.push_type {
            Some(PushType::Voip) => MAX_VOIP_PAYLOAD_SIZE,
            _ => MAX_PAYLOAD_SIZE,
        };
        if self.payload.len() > limit {
            return Err(ValidationError::PayloadTooLarge {
                size: self.payload.len(),
                limit,
            });
        }

        if let Some(id) = &self.collapse_id {
            if id.len() > MAX_COLLAPSE_ID_SIZE {
                return Err(ValidationError::CollapseId);
            }
        }

        Ok(Notification {
            device_token: self.device_token,
            topic: self.topic,
            payload: self.payload,
            expiration: self.expiration,
            priority: self.priority,
            collapse_id: self.collapse_id,
            push_type: self.push_type,
            apns_id: self.apns_id,
        })
    }
}

fn validate_device_token(token: &str) -> Result<(), ValidationError> {
    if !(32..=100).contains(&token.len()) {
        return Err(ValidationError::DeviceToken);
    }
    if !token
        .bytes()
        .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b))
    {
        return Err(ValidationError::DeviceToken);
    }
    Ok(())
}

fn validate_topic(topic: &str) -> Result<(), ValidationError> {
    if topic.is_empty() || !topic.is_ascii() {
        return Err(ValidationError::Topic);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn token64() -> String {
        "a1b2c3d4".repeat(8)
    }

    fn minimal() -> NotificationBuilder {
        Notification::builder(token64(), "com.example.app", &br#"{"aps":{"alert":"hi"}}"#[..])
    }

    #[test]
    fn minimal_notification_builds() {
        let n = minimal().build().unwrap();
        assert_eq!(n.device_token(), token64());
        assert_eq!(n.topic(), "com.example.app");
        assert!(n.priority().is_none());
        assert!(n.apns_id().is_none());
        assert_eq!(n.payload_limit(), MAX_PAYLOAD_SIZE);
    }

    #[test]
    fn uppercase_token_rejected() {
        let err = Notification::builder("A1B2".repeat(16), "t", &b"{}"[..])
            .build()
            .unwrap_err();
        assert_eq!(err, ValidationError::DeviceToken);
    }

    #[test]
    fn short_and_long_tokens_rejected() {
        assert_eq!(
            Notification::builder("ab12", "t", &b"{}"[..]).build().unwrap_err(),
            ValidationError::DeviceToken
        );
        assert_eq!(
            Notification::builder("ab".repeat(51), "t", &b"{}"[..])
                .build()
                .unwrap_err(),
            ValidationError::DeviceToken
        );
    }

    #[test]
    fn empty_topic_rejected() {
        let err = Notification::builder(token64(), "", &b"{}"[..]).build().unwrap_err();
        assert_eq!(err, ValidationError::Topic);
    }

    #[test]
    fn payload_limit_depends_on_push_type() {
        let big = vec![b'x'; MAX_PAYLOAD_SIZE + 1];
        let err = Notification::builder(token64(), "t", big.clone())
            .build()
            .unwrap_err();
        assert!(matches!(err, ValidationError::PayloadTooLarge { limit: 4096, .. }));

        // The same payload fits under the VoIP limit.
        let n = Notification::builder(token64(), "t", big)
            .push_type(PushType::Voip)
            .build()
            .unwrap();
        assert_eq!(n.payload_limit(), MAX_VOIP_PAYLOAD_SIZE);
    }

    #[test]
    fn oversized_collapse_id_rejected() {
        let err = minimal().collapse_id("c".repeat(65)).build().unwrap_err();
        assert_eq!(err, ValidationError::CollapseId);
    }

    #[test]
    fn apns_id_string_must_be_canonical_uuid() {
        assert!(minimal().apns_id_str("not-a-uuid").is_err());
        let n = minimal()
            .apns_id_str("8deb1ca9-2f10-4f4c-b530-5b7c2a21d2b0")
            .unwrap()
            .build()
            .unwrap();
        assert_eq!(
            n.apns_id().unwrap().to_string(),
            "8deb1ca9-2f10-4f4c-b530-5b7c2a21d2b0"
        );
    }

    #[test]
    fn expiration_encodes_as_unix_seconds() {
        let at = UNIX_EPOCH + Duration::from_secs(1_700_000_000);
        let n = minimal().expiration(at).build().unwrap();
        assert_eq!(n.expiration_secs(), Some(1_700_000_000));
    }
}
