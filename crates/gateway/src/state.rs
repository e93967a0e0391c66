use std::sync::Arc;

use {
    tokio::sync::mpsc,
    wabridge_channels::{ProviderConnector, ProviderEvent},
    wabridge_common::StatusUpdate,
    wabridge_config::WabridgeConfig,
    wabridge_delivery::DeliveryTracker,
    wabridge_media::MediaStore,
    wabridge_sessions::{SessionManager, Sweeper},
    wabridge_webhooks::WebhookRelay,
};

/// Receiving ends of the gateway's internal channels. Consumed by
/// [`crate::events::spawn_event_loops`].
pub struct GatewayChannels {
    /// Everything provider clients report.
    pub events: mpsc::UnboundedReceiver<ProviderEvent>,
    /// Delivery status changes bound for the status webhook.
    pub statuses: mpsc::UnboundedReceiver<StatusUpdate>,
}

/// Shared gateway runtime state.
pub struct GatewayState {
    pub version: String,
    pub sessions: Arc<SessionManager>,
    pub sweeper: Sweeper,
    pub tracker: DeliveryTracker,
    pub relay: WebhookRelay,
    pub media: MediaStore,
}

impl GatewayState {
    pub fn new(
        config: &WabridgeConfig,
        connector: Arc<dyn ProviderConnector>,
    ) -> (Arc<Self>, GatewayChannels) {
        let (events_tx, events) = mpsc::unbounded_channel();
        let (statuses_tx, statuses) = mpsc::unbounded_channel();

        let sessions = SessionManager::new(
            connector,
            events_tx,
            config.sessions.provider_timeout(),
        );
        let sweeper = Sweeper::new(
            Arc::clone(&sessions),
            config.sessions.state_query_timeout(),
        );
        let tracker = DeliveryTracker::new(
            config.delivery.ack_timeout(),
            config.delivery.retention(),
            config.delivery.final_retention(),
            statuses_tx,
        );
        let relay = WebhookRelay::new(
            &config.webhooks.status_url,
            &config.webhooks.inbound_url,
            config.webhooks.timeout(),
        );
        let media = MediaStore::new(
            &config.media.dir,
            &config.server.public_url(),
            config.media.retention(),
        );

        let state = Arc::new(Self {
            version: env!("CARGO_PKG_VERSION").to_string(),
            sessions,
            sweeper,
            tracker,
            relay,
            media,
        });
        (state, GatewayChannels { events, statuses })
    }
}
