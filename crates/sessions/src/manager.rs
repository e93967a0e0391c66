use std::{sync::Arc, time::Duration};

use {
    serde::Serialize,
    tokio::sync::mpsc,
    tracing::{debug, info, warn},
    wabridge_channels::{EventSink, ProviderClient, ProviderConnector, ProviderEvent},
};

use crate::{
    challenge::ChallengeStatus,
    error::SessionError,
    registry::{Applied, Claim, SessionRegistry},
    state::{LifecycleEvent, SessionState},
};

// ── Public result types ──────────────────────────────────────────────────────

/// How a stop request ended. The session is removed either way.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StopOutcome {
    /// Logout and destroy both succeeded.
    Stopped,
    /// Teardown failed or timed out; the entry was dropped regardless.
    ForceStopped,
}

impl StopOutcome {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Stopped => "STOPPED",
            Self::ForceStopped => "FORCE_STOPPED",
        }
    }
}

/// Row of [`SessionManager::list_active`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSummary {
    pub user_id: String,
    pub status: SessionState,
    pub has_challenge: bool,
}

/// Connection probe result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Connection {
    NotFound,
    Initializing,
    Connected { account: String },
    NotConnected,
}

/// Effect of a lifecycle event, for logging and tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Stale,
    Ignored(SessionState),
    Moved {
        from: SessionState,
        to: SessionState,
    },
    Removed,
}

// ── Session manager ──────────────────────────────────────────────────────────

/// Single point of truth for session state.
pub struct SessionManager {
    registry: SessionRegistry,
    connector: Arc<dyn ProviderConnector>,
    events: mpsc::UnboundedSender<ProviderEvent>,
    provider_timeout: Duration,
}

impl SessionManager {
    /// `events` is the intake every provider client reports through.
    pub fn new(
        connector: Arc<dyn ProviderConnector>,
        events: mpsc::UnboundedSender<ProviderEvent>,
        provider_timeout: Duration,
    ) -> Arc<Self> {
        Arc::new(Self {
            registry: SessionRegistry::default(),
            connector,
            events,
            provider_timeout,
        })
    }

    pub fn provider_timeout(&self) -> Duration {
        self.provider_timeout
    }

    /// Start a session, or report the state of the one already running.
    ///
    /// Concurrent starts for the same user create at most one provider
    /// client: the registry slot is claimed before the client exists.
    pub async fn start(self: &Arc<Self>, user_id: &str) -> Result<SessionState, SessionError> {
        let (epoch, replaced) = match self.registry.claim(user_id) {
            Claim::Existing(state) => {
                debug!(user_id, %state, "session already running");
                return Ok(state);
            },
            Claim::Claimed { epoch, replaced } => (epoch, replaced),
        };
        if let Some(old) = replaced {
            info!(user_id, "replacing failed session");
            self.release(user_id, old);
        }

        info!(user_id, epoch, "starting session");
        let sink = EventSink::new(user_id, epoch, self.events.clone());
        let client = match tokio::time::timeout(
            self.provider_timeout,
            self.connector.connect(user_id, sink),
        )
        .await
        {
            Ok(Ok(client)) => client,
            Ok(Err(e)) => {
                warn!(user_id, error = %e, "failed to create provider client");
                self.registry.remove_if_epoch(user_id, epoch);
                return Err(e.into());
            },
            Err(_) => {
                warn!(user_id, "provider client creation timed out");
                self.registry.remove_if_epoch(user_id, epoch);
                return Err(SessionError::Timeout {
                    operation: "connect",
                    timeout: self.provider_timeout,
                });
            },
        };

        if !self.registry.attach(user_id, epoch, Arc::clone(&client)) {
            info!(user_id, epoch, "session stopped while starting, discarding client");
            self.release(user_id, client);
            return Err(SessionError::Conflict(format!(
                "session {user_id} was stopped while starting"
            )));
        }

        let manager = Arc::clone(self);
        let user_id = user_id.to_string();
        tokio::spawn(async move {
            if let Err(e) = client.initialize().await {
                warn!(user_id = %user_id, error = %e, "provider client failed to initialize");
                if let Some(entry) = manager.registry.remove_if_epoch(&user_id, epoch)
                    && let Some(client) = entry.client
                {
                    manager.release(&user_id, client);
                }
            }
        });

        Ok(SessionState::Initializing)
    }

    pub fn status(&self, user_id: &str) -> Result<SessionState, SessionError> {
        self.registry
            .state(user_id)
            .ok_or_else(|| SessionError::NotFound(user_id.to_string()))
    }

    /// Remove the session, then log out and destroy its client.
    pub async fn stop(&self, user_id: &str) -> Result<StopOutcome, SessionError> {
        let entry = self
            .registry
            .remove(user_id)
            .ok_or_else(|| SessionError::NotFound(user_id.to_string()))?;
        info!(user_id, state = %entry.state, "stopping session");

        let Some(client) = entry.client else {
            // Still connecting; `start` releases the client when it finds the
            // slot gone.
            return Ok(StopOutcome::Stopped);
        };
        let outcome = teardown(user_id, client.as_ref(), self.provider_timeout).await;
        info!(user_id, outcome = outcome.as_str(), "session stopped");
        Ok(outcome)
    }

    pub fn list_active(&self) -> Vec<SessionSummary> {
        self.registry
            .snapshot()
            .into_iter()
            .map(|(user_id, status, has_challenge)| SessionSummary {
                user_id,
                status,
                has_challenge,
            })
            .collect()
    }

    pub fn session_count(&self) -> usize {
        self.registry.len()
    }

    /// Stage a challenge for the current session of `user_id`. Dropped
    /// (returns false) unless the session is INITIALIZING.
    pub fn set_challenge(&self, user_id: &str, challenge: impl Into<String>) -> bool {
        self.registry
            .stage_challenge(user_id, None, challenge.into())
    }

    /// Stage a challenge reported by the client of generation `epoch`.
    pub fn stage_challenge(&self, user_id: &str, epoch: u64, challenge: impl Into<String>) -> bool {
        let staged = self
            .registry
            .stage_challenge(user_id, Some(epoch), challenge.into());
        if staged {
            debug!(user_id, epoch, "challenge staged");
        } else {
            debug!(user_id, epoch, "challenge discarded, session not initializing");
        }
        staged
    }

    pub fn get_challenge(&self, user_id: &str) -> ChallengeStatus {
        self.registry.challenge(user_id)
    }

    /// Apply a lifecycle event reported by the client of generation `epoch`.
    pub fn apply(&self, user_id: &str, epoch: u64, event: LifecycleEvent) -> Transition {
        match self.registry.apply(user_id, epoch, event) {
            Applied::Stale => {
                debug!(user_id, epoch, ?event, "ignoring event from superseded session");
                Transition::Stale
            },
            Applied::Ignored(state) => {
                debug!(user_id, %state, ?event, "event does not apply in current state");
                Transition::Ignored(state)
            },
            Applied::Moved { from, to } => {
                info!(user_id, %from, %to, "session state changed");
                Transition::Moved { from, to }
            },
            Applied::Removed(entry) => {
                info!(user_id, state = %entry.state, "session disconnected");
                if let Some(client) = entry.client {
                    self.release(user_id, client);
                }
                Transition::Removed
            },
        }
    }

    /// Client of a READY session, for sending.
    pub fn ready_client(&self, user_id: &str) -> Result<Arc<dyn ProviderClient>, SessionError> {
        match self.registry.lookup(user_id) {
            None => Err(SessionError::NotFound(user_id.to_string())),
            Some((SessionState::Ready, _, Some(client))) => Ok(client),
            Some((state, ..)) => Err(SessionError::NotReady {
                user_id: user_id.to_string(),
                state,
            }),
        }
    }

    /// Client of generation `epoch` if that session is READY.
    pub fn ready_client_for(&self, user_id: &str, epoch: u64) -> Option<Arc<dyn ProviderClient>> {
        match self.registry.lookup(user_id) {
            Some((SessionState::Ready, e, Some(client))) if e == epoch => Some(client),
            _ => None,
        }
    }

    /// Whether generation `epoch` is still the registered session.
    pub fn is_current(&self, user_id: &str, epoch: u64) -> bool {
        self.registry
            .lookup(user_id)
            .is_some_and(|(_, current, _)| current == epoch)
    }

    pub fn connection(&self, user_id: &str) -> Connection {
        match self.registry.lookup(user_id) {
            None => Connection::NotFound,
            Some((SessionState::Initializing, ..)) => Connection::Initializing,
            Some((SessionState::Ready, _, Some(client))) => match client.account_id() {
                Some(account) => Connection::Connected { account },
                None => Connection::NotConnected,
            },
            Some(_) => Connection::NotConnected,
        }
    }

    pub(crate) fn registry(&self) -> &SessionRegistry {
        &self.registry
    }

    /// Destroy a client that no longer backs a registered session.
    pub(crate) fn release(&self, user_id: &str, client: Arc<dyn ProviderClient>) {
        let user_id = user_id.to_string();
        let timeout = self.provider_timeout;
        tokio::spawn(async move {
            match tokio::time::timeout(timeout, client.destroy()).await {
                Ok(Ok(())) => debug!(user_id = %user_id, "provider client released"),
                Ok(Err(e)) => {
                    warn!(user_id = %user_id, error = %e, "failed to release provider client")
                },
                Err(_) => warn!(user_id = %user_id, "provider client release timed out"),
            }
        });
    }
}

/// Graceful logout followed by destroy. Destroy is attempted even when the
/// logout fails.
pub(crate) async fn teardown(
    user_id: &str,
    client: &dyn ProviderClient,
    timeout: Duration,
) -> StopOutcome {
    let logged_out = match tokio::time::timeout(timeout, client.logout()).await {
        Ok(Ok(())) => true,
        Ok(Err(e)) => {
            warn!(user_id, error = %e, "logout failed, forcing destroy");
            false
        },
        Err(_) => {
            warn!(user_id, "logout timed out, forcing destroy");
            false
        },
    };
    let destroyed = match tokio::time::timeout(timeout, client.destroy()).await {
        Ok(Ok(())) => true,
        Ok(Err(e)) => {
            warn!(user_id, error = %e, "destroy failed");
            false
        },
        Err(_) => {
            warn!(user_id, "destroy timed out");
            false
        },
    };
    if logged_out && destroyed {
        StopOutcome::Stopped
    } else {
        StopOutcome::ForceStopped
    }
}
