use dashmap::DashMap;

/// Answer to a challenge query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChallengeStatus {
    Available(String),
    /// The session is authenticated or ready; no challenge will come.
    AlreadyConnected,
    NotAvailable,
}

#[derive(Debug)]
struct PendingChallenge {
    payload: String,
    /// Session generation the challenge belongs to.
    epoch: u64,
}

/// Latest authentication challenge per user.
///
/// Only the registry writes here, and only while it holds the owning
/// session's entry, so a challenge can never outlive the INITIALIZING state
/// it was staged in.
#[derive(Debug, Default)]
pub(crate) struct ChallengeStore {
    pending: DashMap<String, PendingChallenge>,
}

impl ChallengeStore {
    /// Stage `payload`, superseding any previous challenge.
    pub(crate) fn stage(&self, user_id: &str, epoch: u64, payload: String) {
        self.pending
            .insert(user_id.to_string(), PendingChallenge { payload, epoch });
    }

    /// Drop the challenge of generation `epoch`, leaving newer ones alone.
    pub(crate) fn clear(&self, user_id: &str, epoch: u64) {
        self.pending.remove_if(user_id, |_, c| c.epoch <= epoch);
    }

    pub(crate) fn current(&self, user_id: &str, epoch: u64) -> Option<String> {
        self.pending
            .get(user_id)
            .filter(|c| c.epoch == epoch)
            .map(|c| c.payload.clone())
    }

    pub(crate) fn contains(&self, user_id: &str, epoch: u64) -> bool {
        self.pending.get(user_id).is_some_and(|c| c.epoch == epoch)
    }

    pub(crate) fn clear_all(&self) {
        self.pending.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn newer_challenge_supersedes() {
        let store = ChallengeStore::default();
        store.stage("alice", 1, "qr-1".into());
        store.stage("alice", 1, "qr-2".into());
        assert_eq!(store.current("alice", 1).as_deref(), Some("qr-2"));
    }

    #[test]
    fn clear_spares_newer_generation() {
        let store = ChallengeStore::default();
        store.stage("alice", 5, "qr".into());
        store.clear("alice", 4);
        assert!(store.contains("alice", 5));
        store.clear("alice", 5);
        assert!(!store.contains("alice", 5));
    }

    #[test]
    fn other_generation_is_invisible() {
        let store = ChallengeStore::default();
        store.stage("alice", 2, "qr".into());
        assert_eq!(store.current("alice", 3), None);
    }
}
