//! Outbound delivery tracking.
//!
//! Every outbound message gets a record keyed by its correlation key and an
//! acknowledgment deadline. Status changes are pushed to an update channel
//! that the gateway forwards to the status webhook.

pub mod tracker;

pub use tracker::{DeliveryTracker, correlation_key};
