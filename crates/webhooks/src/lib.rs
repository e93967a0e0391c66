//! Best-effort relay of delivery statuses and inbound messages to the
//! downstream webhook receiver.

pub mod relay;

pub use relay::{RelayError, WebhookRelay};
