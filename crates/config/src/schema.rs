/// Config schema types (server, webhooks, sessions, delivery, media).
use std::{path::PathBuf, time::Duration};

use serde::{Deserialize, Serialize};

/// Root configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct WabridgeConfig {
    pub server: ServerConfig,
    pub webhooks: WebhooksConfig,
    pub sessions: SessionsConfig,
    pub delivery: DeliveryConfig,
    pub media: MediaConfig,
}

/// HTTP listener settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: String,
    pub port: u16,
    /// Base URL under which stored media is reachable by the webhook
    /// receiver. Defaults to `http://127.0.0.1:<port>`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub public_url: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0".into(),
            port: 3000,
            public_url: None,
        }
    }
}

impl ServerConfig {
    pub fn public_url(&self) -> String {
        match &self.public_url {
            Some(url) => url.trim_end_matches('/').to_string(),
            None => format!("http://127.0.0.1:{}", self.port),
        }
    }
}

/// Downstream webhook endpoints.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WebhooksConfig {
    /// Receives delivery status updates.
    pub status_url: String,
    /// Receives inbound messages.
    pub inbound_url: String,
    pub timeout_secs: u64,
}

impl Default for WebhooksConfig {
    fn default() -> Self {
        Self {
            status_url: "http://127.0.0.1:8000/api/v1/whatsapp/status".into(),
            inbound_url: "http://127.0.0.1:8000/api/v1/whatsapp".into(),
            timeout_secs: 10,
        }
    }
}

impl WebhooksConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Session lifecycle and sweeper settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionsConfig {
    pub sweep_interval_secs: u64,
    /// Upper bound for a provider state query during a sweep.
    pub state_query_timeout_secs: u64,
    /// Upper bound for sends, logouts and destroys.
    pub provider_timeout_secs: u64,
}

impl Default for SessionsConfig {
    fn default() -> Self {
        Self {
            sweep_interval_secs: 300,
            state_query_timeout_secs: 10,
            provider_timeout_secs: 30,
        }
    }
}

impl SessionsConfig {
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }

    pub fn state_query_timeout(&self) -> Duration {
        Duration::from_secs(self.state_query_timeout_secs)
    }

    pub fn provider_timeout(&self) -> Duration {
        Duration::from_secs(self.provider_timeout_secs)
    }
}

/// Outbound delivery tracking.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DeliveryConfig {
    /// How long to wait for the first acknowledgment before reporting failure.
    pub ack_timeout_secs: u64,
    /// How long acknowledged, not yet final, delivery records are kept.
    pub retention_secs: u64,
    /// How long READ and FAILED records are kept so late acknowledgments
    /// stay suppressed. Must not be shorter than `retention_secs`.
    pub final_retention_secs: u64,
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            ack_timeout_secs: 20,
            retention_secs: 3600,
            final_retention_secs: 7 * 24 * 3600,
        }
    }
}

impl DeliveryConfig {
    pub fn ack_timeout(&self) -> Duration {
        Duration::from_secs(self.ack_timeout_secs)
    }

    pub fn retention(&self) -> Duration {
        Duration::from_secs(self.retention_secs)
    }

    pub fn final_retention(&self) -> Duration {
        Duration::from_secs(self.final_retention_secs)
    }
}

/// Inbound media storage.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MediaConfig {
    pub dir: PathBuf,
    /// Stored files are deleted this long after the webhook attempt.
    pub retention_secs: u64,
}

impl Default for MediaConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("media"),
            retention_secs: 60,
        }
    }
}

impl MediaConfig {
    pub fn retention(&self) -> Duration {
        Duration::from_secs(self.retention_secs)
    }
}

impl WabridgeConfig {
    /// Reject values the runtime cannot work with.
    pub fn validate(&self) -> anyhow::Result<()> {
        for (name, url) in [
            ("webhooks.status_url", &self.webhooks.status_url),
            ("webhooks.inbound_url", &self.webhooks.inbound_url),
        ] {
            if !url.starts_with("http://") && !url.starts_with("https://") {
                anyhow::bail!("{name} must be an http(s) URL, got {url:?}");
            }
        }
        for (name, secs) in [
            ("sessions.sweep_interval_secs", self.sessions.sweep_interval_secs),
            (
                "sessions.state_query_timeout_secs",
                self.sessions.state_query_timeout_secs,
            ),
            (
                "sessions.provider_timeout_secs",
                self.sessions.provider_timeout_secs,
            ),
            ("delivery.ack_timeout_secs", self.delivery.ack_timeout_secs),
            ("webhooks.timeout_secs", self.webhooks.timeout_secs),
        ] {
            if secs == 0 {
                anyhow::bail!("{name} must be greater than zero");
            }
        }
        if self.delivery.final_retention_secs < self.delivery.retention_secs {
            anyhow::bail!("delivery.final_retention_secs must be at least delivery.retention_secs");
        }
        Ok(())
    }
}
