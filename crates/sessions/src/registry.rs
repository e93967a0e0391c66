use std::sync::{
    Arc,
    atomic::{AtomicU64, Ordering},
};

use {
    dashmap::{DashMap, mapref::entry::Entry},
    wabridge_channels::ProviderClient,
};

use crate::{
    challenge::{ChallengeStatus, ChallengeStore},
    state::{LifecycleEvent, SessionState, transition},
};

/// One registered session.
pub(crate) struct SessionEntry {
    pub(crate) state: SessionState,
    pub(crate) epoch: u64,
    /// `None` while the provider client is still being created.
    pub(crate) client: Option<Arc<dyn ProviderClient>>,
}

impl SessionEntry {
    fn new(epoch: u64) -> Self {
        Self {
            state: SessionState::Initializing,
            epoch,
            client: None,
        }
    }
}

/// Outcome of claiming a slot for a new session.
pub(crate) enum Claim {
    /// A live session already exists; nothing was created.
    Existing(SessionState),
    /// A fresh INITIALIZING entry was inserted. `replaced` is the client of
    /// a dead entry (auth failure) that was overwritten and must be released.
    Claimed {
        epoch: u64,
        replaced: Option<Arc<dyn ProviderClient>>,
    },
}

/// Outcome of applying a lifecycle event.
pub(crate) enum Applied {
    /// No session, or the event came from a superseded client.
    Stale,
    /// The event does not apply in the current state.
    Ignored(SessionState),
    Moved {
        from: SessionState,
        to: SessionState,
    },
    Removed(SessionEntry),
}

/// user id → session. Every transition runs inside the user's entry guard;
/// guards are never held across an await. Lock order is sessions, then
/// challenges.
#[derive(Default)]
pub(crate) struct SessionRegistry {
    sessions: DashMap<String, SessionEntry>,
    challenges: ChallengeStore,
    next_epoch: AtomicU64,
}

impl SessionRegistry {
    fn allocate_epoch(&self) -> u64 {
        self.next_epoch.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub(crate) fn claim(&self, user_id: &str) -> Claim {
        match self.sessions.entry(user_id.to_string()) {
            Entry::Occupied(entry) if entry.get().state.is_active() => {
                Claim::Existing(entry.get().state)
            },
            Entry::Occupied(mut entry) => {
                let epoch = self.allocate_epoch();
                let old = std::mem::replace(entry.get_mut(), SessionEntry::new(epoch));
                self.challenges.clear(user_id, old.epoch);
                Claim::Claimed {
                    epoch,
                    replaced: old.client,
                }
            },
            Entry::Vacant(entry) => {
                let epoch = self.allocate_epoch();
                entry.insert(SessionEntry::new(epoch));
                self.challenges.clear(user_id, epoch);
                Claim::Claimed {
                    epoch,
                    replaced: None,
                }
            },
        }
    }

    /// Bind a freshly created client. Fails when the slot was removed or
    /// reclaimed while the client was being created.
    pub(crate) fn attach(
        &self,
        user_id: &str,
        epoch: u64,
        client: Arc<dyn ProviderClient>,
    ) -> bool {
        match self.sessions.get_mut(user_id) {
            Some(mut entry) if entry.epoch == epoch && entry.client.is_none() => {
                entry.client = Some(client);
                true
            },
            _ => false,
        }
    }

    pub(crate) fn apply(&self, user_id: &str, epoch: u64, event: LifecycleEvent) -> Applied {
        if event == LifecycleEvent::Disconnected {
            return match self.remove_if_epoch(user_id, epoch) {
                Some(entry) => Applied::Removed(entry),
                None => Applied::Stale,
            };
        }

        let Some(mut entry) = self.sessions.get_mut(user_id) else {
            return Applied::Stale;
        };
        if entry.epoch != epoch {
            return Applied::Stale;
        }
        let from = entry.state;
        let Some(to) = transition(from, event) else {
            return Applied::Ignored(from);
        };
        entry.state = to;
        if from == SessionState::Initializing {
            self.challenges.clear(user_id, epoch);
        }
        Applied::Moved { from, to }
    }

    /// Stage a challenge if the session is INITIALIZING. With `epoch` set,
    /// the session must also be of that generation.
    pub(crate) fn stage_challenge(
        &self,
        user_id: &str,
        epoch: Option<u64>,
        payload: String,
    ) -> bool {
        let Some(entry) = self.sessions.get(user_id) else {
            return false;
        };
        if entry.state != SessionState::Initializing || epoch.is_some_and(|e| e != entry.epoch) {
            return false;
        }
        self.challenges.stage(user_id, entry.epoch, payload);
        true
    }

    pub(crate) fn challenge(&self, user_id: &str) -> ChallengeStatus {
        let Some(entry) = self.sessions.get(user_id) else {
            return ChallengeStatus::NotAvailable;
        };
        if entry.state.is_connected() {
            return ChallengeStatus::AlreadyConnected;
        }
        match self.challenges.current(user_id, entry.epoch) {
            Some(payload) if entry.state == SessionState::Initializing => {
                ChallengeStatus::Available(payload)
            },
            _ => ChallengeStatus::NotAvailable,
        }
    }

    pub(crate) fn state(&self, user_id: &str) -> Option<SessionState> {
        self.sessions.get(user_id).map(|e| e.state)
    }

    /// Current state, epoch and client of a session.
    pub(crate) fn lookup(
        &self,
        user_id: &str,
    ) -> Option<(SessionState, u64, Option<Arc<dyn ProviderClient>>)> {
        self.sessions
            .get(user_id)
            .map(|e| (e.state, e.epoch, e.client.clone()))
    }

    /// `(user_id, state, has_challenge)` for every session, sorted by user id.
    pub(crate) fn snapshot(&self) -> Vec<(String, SessionState, bool)> {
        let rows: Vec<(String, SessionState, u64)> = self
            .sessions
            .iter()
            .map(|e| (e.key().clone(), e.state, e.epoch))
            .collect();
        let mut rows: Vec<_> = rows
            .into_iter()
            .map(|(user_id, state, epoch)| {
                let has_challenge = self.challenges.contains(&user_id, epoch);
                (user_id, state, has_challenge)
            })
            .collect();
        rows.sort_by(|a, b| a.0.cmp(&b.0));
        rows
    }

    /// Sessions that have a provider client bound.
    pub(crate) fn attached(&self) -> Vec<(String, u64, Arc<dyn ProviderClient>)> {
        self.sessions
            .iter()
            .filter_map(|e| {
                e.client
                    .as_ref()
                    .map(|c| (e.key().clone(), e.epoch, Arc::clone(c)))
            })
            .collect()
    }

    pub(crate) fn remove(&self, user_id: &str) -> Option<SessionEntry> {
        let (_, entry) = self.sessions.remove(user_id)?;
        self.challenges.clear(user_id, entry.epoch);
        Some(entry)
    }

    /// Remove the session only if it is still generation `epoch`.
    pub(crate) fn remove_if_epoch(&self, user_id: &str, epoch: u64) -> Option<SessionEntry> {
        let (_, entry) = self.sessions.remove_if(user_id, |_, e| e.epoch == epoch)?;
        self.challenges.clear(user_id, entry.epoch);
        Some(entry)
    }

    /// Remove every session.
    pub(crate) fn drain(&self) -> Vec<(String, SessionEntry)> {
        let keys: Vec<String> = self.sessions.iter().map(|e| e.key().clone()).collect();
        let drained = keys
            .into_iter()
            .filter_map(|k| self.sessions.remove(&k))
            .collect();
        self.challenges.clear_all();
        drained
    }

    pub(crate) fn len(&self) -> usize {
        self.sessions.len()
    }
}
