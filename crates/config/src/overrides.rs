use std::{path::PathBuf, str::FromStr};

use tracing::warn;

use crate::schema::WabridgeConfig;

/// Apply `WABRIDGE_*` environment variables on top of a loaded config.
pub fn apply_env_overrides(config: &mut WabridgeConfig) {
    apply_overrides(config, |name| std::env::var(name).ok());
}

pub(crate) fn apply_overrides(
    config: &mut WabridgeConfig,
    lookup: impl Fn(&str) -> Option<String>,
) {
    if let Some(v) = lookup("WABRIDGE_BIND") {
        config.server.bind = v;
    }
    set_parsed(&lookup, "WABRIDGE_PORT", &mut config.server.port);
    if let Some(v) = lookup("WABRIDGE_PUBLIC_URL") {
        config.server.public_url = Some(v);
    }
    if let Some(v) = lookup("WABRIDGE_STATUS_WEBHOOK_URL") {
        config.webhooks.status_url = v;
    }
    if let Some(v) = lookup("WABRIDGE_INBOUND_WEBHOOK_URL") {
        config.webhooks.inbound_url = v;
    }
    set_parsed(
        &lookup,
        "WABRIDGE_WEBHOOK_TIMEOUT_SECS",
        &mut config.webhooks.timeout_secs,
    );
    set_parsed(
        &lookup,
        "WABRIDGE_SWEEP_INTERVAL_SECS",
        &mut config.sessions.sweep_interval_secs,
    );
    set_parsed(
        &lookup,
        "WABRIDGE_PROVIDER_TIMEOUT_SECS",
        &mut config.sessions.provider_timeout_secs,
    );
    set_parsed(
        &lookup,
        "WABRIDGE_ACK_TIMEOUT_SECS",
        &mut config.delivery.ack_timeout_secs,
    );
    set_parsed(
        &lookup,
        "WABRIDGE_DELIVERY_RETENTION_SECS",
        &mut config.delivery.retention_secs,
    );
    set_parsed(
        &lookup,
        "WABRIDGE_DELIVERY_FINAL_RETENTION_SECS",
        &mut config.delivery.final_retention_secs,
    );
    if let Some(v) = lookup("WABRIDGE_MEDIA_DIR") {
        config.media.dir = PathBuf::from(v);
    }
    set_parsed(
        &lookup,
        "WABRIDGE_MEDIA_RETENTION_SECS",
        &mut config.media.retention_secs,
    );
}

fn set_parsed<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, name: &str, slot: &mut T) {
    let Some(raw) = lookup(name) else {
        return;
    };
    match raw.trim().parse() {
        Ok(v) => *slot = v,
        Err(_) => warn!(var = name, value = %raw, "ignoring unparsable environment override"),
    }
}
