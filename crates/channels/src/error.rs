use thiserror::Error;

/// Failures reported by the messaging provider.
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("failed to create provider client: {0}")]
    Connect(String),

    #[error("provider client failed to initialize: {0}")]
    Initialize(String),

    #[error("failed to fetch media: {0}")]
    MediaFetch(String),

    /// The provider rejected a send. `message_id` is set when the provider
    /// had already assigned an id to the message before failing.
    #[error("failed to send message: {reason}")]
    Send {
        message_id: Option<String>,
        reason: String,
    },

    #[error("failed to query provider state: {0}")]
    Query(String),

    #[error("provider teardown failed: {0}")]
    Teardown(String),

    #[error("no messaging provider configured")]
    Unavailable,
}
