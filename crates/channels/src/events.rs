use tokio::sync::mpsc;

/// Something the provider observed for one session.
#[derive(Debug, Clone)]
pub struct ProviderEvent {
    pub user_id: String,
    /// Generation of the session whose client produced the event.
    pub epoch: u64,
    pub kind: ProviderEventKind,
}

#[derive(Debug, Clone)]
pub enum ProviderEventKind {
    /// A fresh authentication challenge (QR payload).
    Qr(String),
    Authenticated,
    Ready,
    AuthFailure(String),
    Disconnected(String),
    /// A message received from another party.
    Message(InboundMessage),
    /// A message was created on this account, either by us or from another
    /// linked device.
    MessageCreate { message_id: String, from_me: bool },
    /// Acknowledgment progress for a message sent from this account.
    MessageAck { message_id: String, ack: i32 },
}

impl ProviderEventKind {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Qr(_) => "qr",
            Self::Authenticated => "authenticated",
            Self::Ready => "ready",
            Self::AuthFailure(_) => "auth_failure",
            Self::Disconnected(_) => "disconnected",
            Self::Message(_) => "message",
            Self::MessageCreate { .. } => "message_create",
            Self::MessageAck { .. } => "message_ack",
        }
    }
}

#[derive(Debug, Clone)]
pub struct InboundMessage {
    /// Fully-qualified serialized message id.
    pub id: String,
    pub from: String,
    pub body: String,
    /// Provider message type (`chat`, `image`, `ptt`, ...).
    pub kind: String,
    pub media: Option<InboundMedia>,
}

/// Downloaded media attached to an inbound message.
#[derive(Debug, Clone)]
pub struct InboundMedia {
    /// Raw content type as reported, possibly with parameters.
    pub mimetype: String,
    pub data: Vec<u8>,
}

/// Stamps events with their session identity and hands them to the
/// gateway's single intake channel.
#[derive(Debug, Clone)]
pub struct EventSink {
    user_id: String,
    epoch: u64,
    tx: mpsc::UnboundedSender<ProviderEvent>,
}

impl EventSink {
    pub fn new(user_id: &str, epoch: u64, tx: mpsc::UnboundedSender<ProviderEvent>) -> Self {
        Self {
            user_id: user_id.to_string(),
            epoch,
            tx,
        }
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    /// Returns false once the intake has shut down.
    pub fn emit(&self, kind: ProviderEventKind) -> bool {
        self.tx
            .send(ProviderEvent {
                user_id: self.user_id.clone(),
                epoch: self.epoch,
                kind,
            })
            .is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sink_stamps_identity() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let sink = EventSink::new("alice", 7, tx);
        assert!(sink.emit(ProviderEventKind::Ready));

        let event = rx.try_recv().unwrap();
        assert_eq!(event.user_id, "alice");
        assert_eq!(event.epoch, 7);
        assert_eq!(event.kind.name(), "ready");
    }

    #[test]
    fn emit_reports_closed_intake() {
        let (tx, rx) = mpsc::unbounded_channel();
        drop(rx);
        let sink = EventSink::new("alice", 1, tx);
        assert!(!sink.emit(ProviderEventKind::Authenticated));
    }
}
