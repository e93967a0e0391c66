use std::sync::Arc;

use {async_trait::async_trait, tracing::warn};

use crate::{
    error::ProviderError,
    events::EventSink,
    provider::{ProviderClient, ProviderConnector, ProviderState, SentMessage},
};

/// Connector used when no provider is wired in. Sessions start but never
/// produce a challenge, and sends are rejected.
#[derive(Debug, Default)]
pub struct NoopConnector;

#[async_trait]
impl ProviderConnector for NoopConnector {
    async fn connect(
        &self,
        user_id: &str,
        _events: EventSink,
    ) -> Result<Arc<dyn ProviderClient>, ProviderError> {
        warn!(user_id, "no messaging provider configured, session will stay idle");
        Ok(Arc::new(NoopClient))
    }
}

struct NoopClient;

#[async_trait]
impl ProviderClient for NoopClient {
    async fn initialize(&self) -> Result<(), ProviderError> {
        Ok(())
    }

    async fn state(&self) -> Result<Option<ProviderState>, ProviderError> {
        Ok(None)
    }

    fn account_id(&self) -> Option<String> {
        None
    }

    async fn send_text(&self, _chat_id: &str, _body: &str) -> Result<SentMessage, ProviderError> {
        Err(ProviderError::Unavailable)
    }

    async fn send_media(
        &self,
        _chat_id: &str,
        _media_url: &str,
        _caption: Option<&str>,
    ) -> Result<SentMessage, ProviderError> {
        Err(ProviderError::Unavailable)
    }

    async fn logout(&self) -> Result<(), ProviderError> {
        Ok(())
    }

    async fn destroy(&self) -> Result<(), ProviderError> {
        Ok(())
    }
}
