use std::fmt;

use serde::Serialize;

/// Lifecycle state of one user's session.
///
/// `Uninitialized` and `Disconnected` are never stored: a missing entry is
/// uninitialized, and a disconnect removes the entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SessionState {
    Uninitialized,
    Initializing,
    Authenticated,
    Ready,
    AuthFailure,
    Disconnected,
}

impl SessionState {
    /// A session in one of these states owns a live provider client that must
    /// not be duplicated by another start.
    pub fn is_active(self) -> bool {
        matches!(self, Self::Initializing | Self::Authenticated | Self::Ready)
    }

    /// The user has scanned the challenge; serving a QR makes no sense.
    pub fn is_connected(self) -> bool {
        matches!(self, Self::Authenticated | Self::Ready)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Uninitialized => "UNINITIALIZED",
            Self::Initializing => "INITIALIZING",
            Self::Authenticated => "AUTHENTICATED",
            Self::Ready => "READY",
            Self::AuthFailure => "AUTH_FAILURE",
            Self::Disconnected => "DISCONNECTED",
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Provider lifecycle notifications that drive transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleEvent {
    Authenticated,
    Ready,
    AuthFailure,
    Disconnected,
}

/// Next state for `current` on `event`, or `None` when the event does not
/// apply in that state.
pub fn transition(current: SessionState, event: LifecycleEvent) -> Option<SessionState> {
    use SessionState::*;

    match (current, event) {
        (Initializing, LifecycleEvent::Authenticated) => Some(Authenticated),
        (Initializing | Authenticated, LifecycleEvent::Ready) => Some(Ready),
        (Initializing, LifecycleEvent::AuthFailure) => Some(AuthFailure),
        (_, LifecycleEvent::Disconnected) => Some(Disconnected),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn happy_path() {
        let s = SessionState::Initializing;
        let s = transition(s, LifecycleEvent::Authenticated).unwrap();
        assert_eq!(s, SessionState::Authenticated);
        let s = transition(s, LifecycleEvent::Ready).unwrap();
        assert_eq!(s, SessionState::Ready);
    }

    #[test]
    fn ready_may_skip_authenticated() {
        assert_eq!(
            transition(SessionState::Initializing, LifecycleEvent::Ready),
            Some(SessionState::Ready)
        );
    }

    #[test]
    fn auth_failure_only_while_initializing() {
        assert_eq!(
            transition(SessionState::Initializing, LifecycleEvent::AuthFailure),
            Some(SessionState::AuthFailure)
        );
        assert_eq!(transition(SessionState::Ready, LifecycleEvent::AuthFailure), None);
    }

    #[test]
    fn late_events_do_not_regress() {
        assert_eq!(transition(SessionState::Ready, LifecycleEvent::Authenticated), None);
        assert_eq!(transition(SessionState::AuthFailure, LifecycleEvent::Ready), None);
    }

    #[test]
    fn disconnect_applies_everywhere() {
        for s in [
            SessionState::Initializing,
            SessionState::Authenticated,
            SessionState::Ready,
            SessionState::AuthFailure,
        ] {
            assert_eq!(
                transition(s, LifecycleEvent::Disconnected),
                Some(SessionState::Disconnected)
            );
        }
    }

    #[test]
    fn serializes_screaming_case() {
        assert_eq!(SessionState::AuthFailure.as_str(), "AUTH_FAILURE");
        assert!(SessionState::Authenticated.is_active());
        assert!(!SessionState::AuthFailure.is_active());
    }
}
