use std::fmt;

use serde::{Deserialize, Serialize};

/// Error code reported when the provider rejected an outbound send.
pub const ERROR_SEND_FAILED: u32 = 30007;

/// Error code reported when a message was not acknowledged within the ack
/// window, or when its media could not be fetched.
pub const ERROR_UNDELIVERED: u32 = 30008;

// ── Delivery status ──────────────────────────────────────────────────────────

/// Progress of one outbound message. `Sent < Delivered < Read`; `Failed`
/// sits outside that order and is only reached through an explicit failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryStatus {
    Sent,
    Delivered,
    Read,
    Failed,
}

impl DeliveryStatus {
    /// Map a provider acknowledgment level to a status.
    ///
    /// Only levels 1 (server), 2 (device) and 3 (read) are meaningful; pending,
    /// error and playback levels return `None`.
    pub fn from_ack(ack: i32) -> Option<Self> {
        match ack {
            1 => Some(Self::Sent),
            2 => Some(Self::Delivered),
            3 => Some(Self::Read),
            _ => None,
        }
    }

    /// Whether no further status may follow this one.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Read | Self::Failed)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Sent => "sent",
            Self::Delivered => "delivered",
            Self::Read => "read",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for DeliveryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── Webhook payloads ─────────────────────────────────────────────────────────

/// Body of a status webhook. Field names follow the Twilio conventions the
/// downstream receiver already understands.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusUpdate {
    #[serde(rename = "MessageSid")]
    pub message_id: String,
    #[serde(rename = "MessageStatus")]
    pub status: DeliveryStatus,
    #[serde(rename = "ErrorCode", default, skip_serializing_if = "Option::is_none")]
    pub error_code: Option<u32>,
}

impl StatusUpdate {
    pub fn new(message_id: impl Into<String>, status: DeliveryStatus) -> Self {
        Self {
            message_id: message_id.into(),
            status,
            error_code: None,
        }
    }

    pub fn failed(message_id: impl Into<String>, error_code: u32) -> Self {
        Self {
            message_id: message_id.into(),
            status: DeliveryStatus::Failed,
            error_code: Some(error_code),
        }
    }
}

/// Body of an inbound-message webhook.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InboundNotification {
    #[serde(rename = "From")]
    pub from: String,
    #[serde(rename = "To")]
    pub to: String,
    #[serde(rename = "MessageSid")]
    pub message_id: String,
    #[serde(rename = "Body")]
    pub body: String,
    #[serde(rename = "MessageType")]
    pub media_type: Option<String>,
    #[serde(rename = "MediaUrl0")]
    pub media_url: Option<String>,
    /// `"unknown"` when the message carries no media.
    #[serde(rename = "MediaContentType0")]
    pub media_content_type: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ack_levels_map_to_statuses() {
        assert_eq!(DeliveryStatus::from_ack(1), Some(DeliveryStatus::Sent));
        assert_eq!(DeliveryStatus::from_ack(2), Some(DeliveryStatus::Delivered));
        assert_eq!(DeliveryStatus::from_ack(3), Some(DeliveryStatus::Read));
        assert_eq!(DeliveryStatus::from_ack(0), None);
        assert_eq!(DeliveryStatus::from_ack(-1), None);
        assert_eq!(DeliveryStatus::from_ack(4), None);
    }

    #[test]
    fn acknowledgments_are_ordered() {
        assert!(DeliveryStatus::Sent < DeliveryStatus::Delivered);
        assert!(DeliveryStatus::Delivered < DeliveryStatus::Read);
        assert!(DeliveryStatus::Read.is_terminal());
        assert!(DeliveryStatus::Failed.is_terminal());
        assert!(!DeliveryStatus::Delivered.is_terminal());
    }

    #[test]
    fn status_update_omits_missing_error_code() {
        let json = serde_json::to_value(StatusUpdate::new("ABC", DeliveryStatus::Read)).unwrap();
        assert_eq!(
            json,
            serde_json::json!({ "MessageSid": "ABC", "MessageStatus": "read" })
        );

        let json = serde_json::to_value(StatusUpdate::failed("ABC", ERROR_UNDELIVERED)).unwrap();
        assert_eq!(json["ErrorCode"], 30008);
        assert_eq!(json["MessageStatus"], "failed");
    }

    #[test]
    fn inbound_without_media_serializes_nulls() {
        let n = InboundNotification {
            from: "15551234567@c.us".into(),
            to: "15557654321@c.us".into(),
            message_id: "false_15551234567@c.us_3EB0".into(),
            body: "hi".into(),
            media_type: None,
            media_url: None,
            media_content_type: "unknown".into(),
        };
        let json = serde_json::to_value(&n).unwrap();
        assert!(json["MediaUrl0"].is_null());
        assert!(json["MessageType"].is_null());
        assert_eq!(json["MediaContentType0"], "unknown");
    }
}
