use std::time::Duration;

use {thiserror::Error, wabridge_channels::ProviderError};

use crate::state::SessionState;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("session not found: {0}")]
    NotFound(String),

    #[error("session {user_id} is not ready (state: {state})")]
    NotReady {
        user_id: String,
        state: SessionState,
    },

    #[error("session conflict: {0}")]
    Conflict(String),

    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error("{operation} timed out after {timeout:?}")]
    Timeout {
        operation: &'static str,
        timeout: Duration,
    },
}
