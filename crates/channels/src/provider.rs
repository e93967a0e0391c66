use std::{fmt, sync::Arc};

use async_trait::async_trait;

use crate::{error::ProviderError, events::EventSink};

/// Creates provider clients, one per user session.
#[async_trait]
pub trait ProviderConnector: Send + Sync {
    /// Create a client for `user_id`. The client must not emit events before
    /// [`ProviderClient::initialize`] is called, and must emit every event
    /// through `events`.
    async fn connect(
        &self,
        user_id: &str,
        events: EventSink,
    ) -> Result<Arc<dyn ProviderClient>, ProviderError>;
}

/// One live connection to the messaging provider.
#[async_trait]
pub trait ProviderClient: Send + Sync {
    /// Start the connection. QR, auth and ready events follow asynchronously.
    async fn initialize(&self) -> Result<(), ProviderError>;

    /// Provider-reported connection state. `None` when the provider has no
    /// state to report (not yet paired, or already torn down).
    async fn state(&self) -> Result<Option<ProviderState>, ProviderError>;

    /// Serialized id of the account this client is logged into, once ready.
    fn account_id(&self) -> Option<String>;

    async fn send_text(&self, chat_id: &str, body: &str) -> Result<SentMessage, ProviderError>;

    /// Fetch `media_url` and send it. Fetch failures are reported as
    /// [`ProviderError::MediaFetch`].
    async fn send_media(
        &self,
        chat_id: &str,
        media_url: &str,
        caption: Option<&str>,
    ) -> Result<SentMessage, ProviderError>;

    /// Unlink the device from the account.
    async fn logout(&self) -> Result<(), ProviderError>;

    /// Release every local resource held by the client.
    async fn destroy(&self) -> Result<(), ProviderError>;
}

/// A message accepted by the provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentMessage {
    /// Fully-qualified serialized message id.
    pub id: String,
}

/// Connection state as reported by the provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProviderState {
    Connected,
    Opening,
    Pairing,
    Timeout,
    Conflict,
    Unpaired,
    UnpairedIdle,
    Other(String),
}

impl ProviderState {
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_uppercase().as_str() {
            "CONNECTED" => Self::Connected,
            "OPENING" => Self::Opening,
            "PAIRING" => Self::Pairing,
            "TIMEOUT" => Self::Timeout,
            "CONFLICT" => Self::Conflict,
            "UNPAIRED" => Self::Unpaired,
            "UNPAIRED_IDLE" => Self::UnpairedIdle,
            _ => Self::Other(raw.to_string()),
        }
    }

    /// Whether a session in this state can never recover on its own.
    pub fn is_dead(&self) -> bool {
        matches!(self, Self::Conflict | Self::Unpaired | Self::UnpairedIdle)
    }
}

impl fmt::Display for ProviderState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Connected => "CONNECTED",
            Self::Opening => "OPENING",
            Self::Pairing => "PAIRING",
            Self::Timeout => "TIMEOUT",
            Self::Conflict => "CONFLICT",
            Self::Unpaired => "UNPAIRED",
            Self::UnpairedIdle => "UNPAIRED_IDLE",
            Self::Other(s) => s,
        };
        f.write_str(s)
    }
}

/// Chat id for a phone-number destination: a leading `+` is dropped and the
/// user-chat suffix appended.
pub fn chat_id_for(destination: &str) -> String {
    let number = destination.trim();
    let number = number.strip_prefix('+').unwrap_or(number);
    format!("{number}@c.us")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_known_states() {
        assert_eq!(ProviderState::parse("CONNECTED"), ProviderState::Connected);
        assert_eq!(ProviderState::parse("unpaired_idle"), ProviderState::UnpairedIdle);
        assert_eq!(
            ProviderState::parse("TOS_BLOCK"),
            ProviderState::Other("TOS_BLOCK".into())
        );
    }

    #[test]
    fn dead_states() {
        assert!(ProviderState::Conflict.is_dead());
        assert!(ProviderState::Unpaired.is_dead());
        assert!(ProviderState::UnpairedIdle.is_dead());
        assert!(!ProviderState::Connected.is_dead());
        assert!(!ProviderState::Opening.is_dead());
    }

    #[test]
    fn chat_id_strips_plus() {
        assert_eq!(chat_id_for("+15551234567"), "15551234567@c.us");
        assert_eq!(chat_id_for("15551234567"), "15551234567@c.us");
    }
}
