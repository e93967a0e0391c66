use std::time::Duration;

use {
    serde::Serialize,
    thiserror::Error,
    tracing::{debug, warn},
    wabridge_common::{InboundNotification, StatusUpdate},
};

#[derive(Debug, Error)]
pub enum RelayError {
    #[error("webhook request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("webhook returned {status}")]
    Status { status: reqwest::StatusCode },
}

/// POSTs notifications to the configured endpoints. Each notification is one
/// attempt; failures are logged and never returned to the caller.
#[derive(Clone)]
pub struct WebhookRelay {
    client: reqwest::Client,
    status_url: String,
    inbound_url: String,
}

impl WebhookRelay {
    pub fn new(status_url: impl Into<String>, inbound_url: impl Into<String>, timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_default();
        Self {
            client,
            status_url: status_url.into(),
            inbound_url: inbound_url.into(),
        }
    }

    /// Report a delivery status change.
    pub async fn notify_status(&self, update: &StatusUpdate) {
        match self.post(&self.status_url, update).await {
            Ok(()) => debug!(
                message_id = %update.message_id,
                status = %update.status,
                "status webhook delivered"
            ),
            Err(e) => warn!(
                message_id = %update.message_id,
                status = %update.status,
                error = %e,
                "failed to deliver status webhook"
            ),
        }
    }

    /// Forward an inbound message.
    pub async fn notify_inbound(&self, notification: &InboundNotification) {
        match self.post(&self.inbound_url, notification).await {
            Ok(()) => debug!(
                message_id = %notification.message_id,
                from = %notification.from,
                "inbound webhook delivered"
            ),
            Err(e) => warn!(
                message_id = %notification.message_id,
                from = %notification.from,
                error = %e,
                "failed to deliver inbound webhook"
            ),
        }
    }

    async fn post<T: Serialize + ?Sized>(&self, url: &str, body: &T) -> Result<(), RelayError> {
        let resp = self.client.post(url).json(body).send().await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(RelayError::Status { status });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use {
        super::*,
        mockito::Matcher,
        serde_json::json,
        wabridge_common::{DeliveryStatus, types::ERROR_UNDELIVERED},
    };

    fn relay(server: &mockito::Server) -> WebhookRelay {
        WebhookRelay::new(
            format!("{}/status", server.url()),
            format!("{}/inbound", server.url()),
            Duration::from_secs(2),
        )
    }

    #[tokio::test]
    async fn status_posts_twilio_fields() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/status")
            .match_header("content-type", "application/json")
            .match_body(Matcher::Json(json!({
                "MessageSid": "3EB0AA",
                "MessageStatus": "failed",
                "ErrorCode": 30008,
            })))
            .with_status(200)
            .expect(1)
            .create_async()
            .await;

        relay(&server)
            .notify_status(&StatusUpdate::failed("3EB0AA", ERROR_UNDELIVERED))
            .await;
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn inbound_posts_to_inbound_url() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/inbound")
            .match_body(Matcher::PartialJson(json!({
                "From": "15551234567@c.us",
                "Body": "hello",
                "MediaContentType0": "unknown",
            })))
            .with_status(204)
            .expect(1)
            .create_async()
            .await;

        relay(&server)
            .notify_inbound(&InboundNotification {
                from: "15551234567@c.us".into(),
                to: "15557654321@c.us".into(),
                message_id: "false_15551234567@c.us_3EB0BB".into(),
                body: "hello".into(),
                media_type: None,
                media_url: None,
                media_content_type: "unknown".into(),
            })
            .await;
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn receiver_errors_are_swallowed() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/status")
            .with_status(500)
            .expect(1)
            .create_async()
            .await;

        relay(&server)
            .notify_status(&StatusUpdate::new("3EB0CC", DeliveryStatus::Read))
            .await;
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn non_success_status_is_an_error() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/status")
            .with_status(503)
            .create_async()
            .await;

        let relay = relay(&server);
        let err = relay
            .post(&relay.status_url, &StatusUpdate::new("x", DeliveryStatus::Sent))
            .await
            .unwrap_err();
        assert!(matches!(err, RelayError::Status { status } if status.as_u16() == 503));
    }

    #[tokio::test]
    async fn unreachable_receiver_is_swallowed() {
        let relay = WebhookRelay::new(
            "http://127.0.0.1:1/status",
            "http://127.0.0.1:1/inbound",
            Duration::from_millis(200),
        );
        relay
            .notify_status(&StatusUpdate::new("x", DeliveryStatus::Sent))
            .await;
    }
}
