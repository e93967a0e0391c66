//! Types shared between the delivery tracker, the webhook relay and the gateway.

pub mod types;

pub use types::{DeliveryStatus, InboundNotification, StatusUpdate};
