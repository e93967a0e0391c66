//! Messaging-provider boundary.
//!
//! The provider client (connection, QR generation, network transport) lives
//! outside this workspace. It is reached through [`ProviderConnector`] and
//! [`ProviderClient`], and pushes everything it observes back as
//! [`ProviderEvent`]s through an [`EventSink`].

pub mod error;
pub mod events;
#[cfg(any(test, feature = "testing"))]
pub mod fake;
pub mod noop;
pub mod provider;

pub use {
    error::ProviderError,
    events::{EventSink, InboundMedia, InboundMessage, ProviderEvent, ProviderEventKind},
    provider::{ProviderClient, ProviderConnector, ProviderState, SentMessage, chat_id_for},
};
