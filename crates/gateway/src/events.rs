//! Provider event intake and status forwarding.
//!
//! All provider events arrive on one channel and are handled by one task,
//! so per-user ordering is the order the provider reported them in. Work
//! that waits on I/O (media writes, webhooks) is spawned off that task.

use std::sync::Arc;

use {
    tokio::{
        sync::mpsc,
        task::{JoinHandle, JoinSet},
    },
    tokio_util::sync::CancellationToken,
    tracing::{debug, info, warn},
    wabridge_channels::{InboundMessage, ProviderEvent, ProviderEventKind},
    wabridge_common::{InboundNotification, StatusUpdate},
    wabridge_delivery::correlation_key,
    wabridge_media::{mime, schedule_cleanup},
    wabridge_sessions::LifecycleEvent,
    wabridge_webhooks::WebhookRelay,
};

use crate::state::{GatewayChannels, GatewayState};

/// Spawn the provider event dispatcher and the status forwarder. Both stop
/// when `cancel` fires.
pub fn spawn_event_loops(
    state: &Arc<GatewayState>,
    channels: GatewayChannels,
    cancel: CancellationToken,
) -> Vec<JoinHandle<()>> {
    vec![
        tokio::spawn(run_dispatcher(
            Arc::clone(state),
            channels.events,
            cancel.clone(),
        )),
        tokio::spawn(run_status_forwarder(
            state.relay.clone(),
            channels.statuses,
            cancel,
        )),
    ]
}

async fn run_dispatcher(
    state: Arc<GatewayState>,
    mut events: mpsc::UnboundedReceiver<ProviderEvent>,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            () = cancel.cancelled() => break,
            event = events.recv() => match event {
                Some(event) => dispatch(&state, event),
                None => break,
            },
        }
    }
    debug!("provider event dispatcher stopped");
}

/// Relay status updates until cancelled. On cancellation, updates already
/// queued are still relayed and in-flight posts are awaited.
pub(crate) async fn run_status_forwarder(
    relay: WebhookRelay,
    mut statuses: mpsc::UnboundedReceiver<StatusUpdate>,
    cancel: CancellationToken,
) {
    let mut in_flight = JoinSet::new();
    let forward = |in_flight: &mut JoinSet<()>, update: StatusUpdate| {
        let relay = relay.clone();
        let _ = in_flight.spawn(async move { relay.notify_status(&update).await });
    };

    loop {
        let update = tokio::select! {
            () = cancel.cancelled() => break,
            update = statuses.recv() => update,
            Some(_) = in_flight.join_next(), if !in_flight.is_empty() => continue,
        };
        match update {
            Some(update) => forward(&mut in_flight, update),
            None => break,
        }
    }

    while let Ok(update) = statuses.try_recv() {
        forward(&mut in_flight, update);
    }
    let pending = in_flight.len();
    while in_flight.join_next().await.is_some() {}
    debug!(pending, "status forwarder stopped");
}

/// Route one provider event.
pub(crate) fn dispatch(state: &Arc<GatewayState>, event: ProviderEvent) {
    let ProviderEvent {
        user_id,
        epoch,
        kind,
    } = event;
    debug!(user_id = %user_id, epoch, event = kind.name(), "provider event");

    match kind {
        ProviderEventKind::Qr(challenge) => {
            state.sessions.stage_challenge(&user_id, epoch, challenge);
        },
        ProviderEventKind::Authenticated => {
            state
                .sessions
                .apply(&user_id, epoch, LifecycleEvent::Authenticated);
        },
        ProviderEventKind::Ready => {
            state.sessions.apply(&user_id, epoch, LifecycleEvent::Ready);
        },
        ProviderEventKind::AuthFailure(reason) => {
            warn!(user_id = %user_id, reason = %reason, "authentication failed");
            state
                .sessions
                .apply(&user_id, epoch, LifecycleEvent::AuthFailure);
        },
        ProviderEventKind::Disconnected(reason) => {
            info!(user_id = %user_id, reason = %reason, "provider disconnected");
            state
                .sessions
                .apply(&user_id, epoch, LifecycleEvent::Disconnected);
        },
        ProviderEventKind::Message(message) => {
            let Some(client) = state.sessions.ready_client_for(&user_id, epoch) else {
                debug!(user_id = %user_id, "dropping inbound message, session not ready");
                return;
            };
            let to = client.account_id().unwrap_or_default();
            let state = Arc::clone(state);
            tokio::spawn(async move { forward_inbound(&state, message, to).await });
        },
        ProviderEventKind::MessageCreate {
            message_id,
            from_me,
        } => {
            if from_me && state.sessions.is_current(&user_id, epoch) {
                state.tracker.record_sent(correlation_key(&message_id));
            }
        },
        ProviderEventKind::MessageAck { message_id, ack } => {
            if state.sessions.is_current(&user_id, epoch) {
                state.tracker.record_ack(correlation_key(&message_id), ack);
            } else {
                debug!(user_id = %user_id, message_id = %message_id, "ack from superseded session");
            }
        },
    }
}

/// Store any media, notify the inbound webhook, then schedule the media for
/// deletion.
async fn forward_inbound(state: &GatewayState, message: InboundMessage, to: String) {
    let InboundMessage {
        id,
        from,
        body,
        kind,
        media,
    } = message;

    let mut stored_path = None;
    let (media_type, media_url, content_type) = match media {
        None => (None, None, "unknown".to_string()),
        Some(media) => {
            let media_type = Some(mime::media_type_for(&kind).to_string());
            match state.media.save(&media.data, &media.mimetype).await {
                Ok(stored) => {
                    stored_path = Some(stored.path);
                    (media_type, Some(stored.url), stored.content_type)
                },
                Err(e) => {
                    warn!(message_id = %id, error = %e, "failed to store inbound media");
                    (media_type, None, mime::normalize(&media.mimetype).to_string())
                },
            }
        },
    };

    let notification = InboundNotification {
        from,
        to,
        message_id: id,
        body,
        media_type,
        media_url,
        media_content_type: content_type,
    };
    state.relay.notify_inbound(&notification).await;

    if let Some(path) = stored_path {
        schedule_cleanup(path, state.media.retention());
    }
}

#[cfg(test)]
mod tests {
    use {
        super::*,
        mockito::Matcher,
        serde_json::json,
        std::time::Duration,
        wabridge_common::DeliveryStatus,
    };

    #[tokio::test]
    async fn forwarder_relays_queued_updates_when_cancelled() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/status")
            .match_body(Matcher::PartialJson(json!({ "MessageStatus": "sent" })))
            .with_status(200)
            .expect(2)
            .create_async()
            .await;
        let relay = WebhookRelay::new(
            format!("{}/status", server.url()),
            format!("{}/inbound", server.url()),
            Duration::from_secs(2),
        );

        let (tx, rx) = mpsc::unbounded_channel();
        tx.send(StatusUpdate::new("m1", DeliveryStatus::Sent)).unwrap();
        tx.send(StatusUpdate::new("m2", DeliveryStatus::Sent)).unwrap();
        let cancel = CancellationToken::new();
        cancel.cancel();

        run_status_forwarder(relay, rx, cancel).await;
        mock.assert_async().await;
    }
}
