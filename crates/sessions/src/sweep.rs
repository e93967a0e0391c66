//! Periodic health sweep and shutdown drain.

use std::{sync::Arc, time::Duration};

use {
    futures::future::join_all,
    tracing::{debug, info, warn},
    wabridge_channels::{ProviderClient, ProviderState},
};

use crate::manager::{SessionManager, StopOutcome, teardown};

/// Result of one sweep pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub checked: usize,
    pub evicted: Vec<String>,
}

/// Why a probed session should go.
#[derive(Debug)]
enum Verdict {
    Healthy,
    Evict(String),
}

pub struct Sweeper {
    sessions: Arc<SessionManager>,
    query_timeout: Duration,
}

impl Sweeper {
    pub fn new(sessions: Arc<SessionManager>, query_timeout: Duration) -> Self {
        Self {
            sessions,
            query_timeout,
        }
    }

    /// Probe every session with a client and evict the unhealthy ones.
    ///
    /// Probes run concurrently. An eviction only removes the generation that
    /// was probed, so a session restarted mid-sweep survives.
    pub async fn sweep(&self) -> SweepReport {
        let attached = self.sessions.registry().attached();
        let checked = attached.len();
        if checked == 0 {
            return SweepReport::default();
        }
        debug!(sessions = checked, "sweeping sessions");

        let probes = attached.into_iter().map(|(user_id, epoch, client)| async move {
            let verdict = self.probe(client.as_ref()).await;
            (user_id, epoch, client, verdict)
        });

        let mut evicted = Vec::new();
        let mut releases = Vec::new();
        for (user_id, epoch, client, verdict) in join_all(probes).await {
            let Verdict::Evict(reason) = verdict else {
                continue;
            };
            if self
                .sessions
                .registry()
                .remove_if_epoch(&user_id, epoch)
                .is_none()
            {
                continue;
            }
            info!(user_id = %user_id, reason = %reason, "evicting session");
            releases.push(self.destroy(user_id.clone(), client));
            evicted.push(user_id);
        }
        join_all(releases).await;

        evicted.sort();
        SweepReport { checked, evicted }
    }

    async fn probe(&self, client: &dyn ProviderClient) -> Verdict {
        match tokio::time::timeout(self.query_timeout, client.state()).await {
            Ok(Ok(None)) => Verdict::Evict("no state reported".into()),
            Ok(Ok(Some(state))) if state.is_dead() => Verdict::Evict(format!("state {state}")),
            Ok(Ok(Some(ProviderState::Other(state)))) => {
                debug!(state = %state, "unrecognized provider state, keeping session");
                Verdict::Healthy
            },
            Ok(Ok(Some(_))) => Verdict::Healthy,
            Ok(Err(e)) => Verdict::Evict(format!("state query failed: {e}")),
            Err(_) => Verdict::Evict("state query timed out".into()),
        }
    }

    async fn destroy(&self, user_id: String, client: Arc<dyn ProviderClient>) {
        match tokio::time::timeout(self.sessions.provider_timeout(), client.destroy()).await {
            Ok(Ok(())) => {},
            Ok(Err(e)) => warn!(user_id = %user_id, error = %e, "failed to destroy evicted session"),
            Err(_) => warn!(user_id = %user_id, "destroying evicted session timed out"),
        }
    }

    /// Remove every session and tear down its client. Teardowns run
    /// concurrently and each is bounded by the provider timeout.
    pub async fn shutdown(&self) -> Vec<(String, StopOutcome)> {
        let drained = self.sessions.registry().drain();
        if drained.is_empty() {
            return Vec::new();
        }
        info!(sessions = drained.len(), "shutting down sessions");

        let timeout = self.sessions.provider_timeout();
        let teardowns = drained.into_iter().map(|(user_id, entry)| async move {
            let outcome = match entry.client {
                Some(client) => teardown(&user_id, client.as_ref(), timeout).await,
                None => StopOutcome::Stopped,
            };
            (user_id, outcome)
        });
        let mut outcomes = join_all(teardowns).await;
        outcomes.sort_by(|a, b| a.0.cmp(&b.0));
        outcomes
    }
}

#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::state::{LifecycleEvent, SessionState},
        tokio::sync::mpsc,
        wabridge_channels::fake::{FakeConnector, StateReply},
    };

    async fn setup(users: &[&str]) -> (Arc<SessionManager>, Arc<FakeConnector>, Sweeper) {
        let connector = FakeConnector::new();
        let (tx, _rx) = mpsc::unbounded_channel();
        let manager = SessionManager::new(connector.clone(), tx, Duration::from_secs(5));
        for user in users {
            manager.start(user).await.unwrap();
        }
        let sweeper = Sweeper::new(Arc::clone(&manager), Duration::from_secs(1));
        (manager, connector, sweeper)
    }

    #[tokio::test]
    async fn healthy_sessions_survive() {
        let (manager, connector, sweeper) = setup(&["alice", "bob"]).await;
        connector
            .client("bob")
            .unwrap()
            .set_state(StateReply::State(Some(ProviderState::Opening)));

        let report = sweeper.sweep().await;
        assert_eq!(report.checked, 2);
        assert!(report.evicted.is_empty());
        assert_eq!(manager.list_active().len(), 2);
    }

    #[tokio::test]
    async fn dead_states_are_evicted() {
        let (manager, connector, sweeper) = setup(&["a", "b", "c", "d", "e"]).await;
        let set = |user: &str, reply| connector.client(user).unwrap().set_state(reply);
        set("a", StateReply::State(Some(ProviderState::Conflict)));
        set("b", StateReply::State(Some(ProviderState::Unpaired)));
        set("c", StateReply::State(Some(ProviderState::UnpairedIdle)));
        set("d", StateReply::State(None));

        let report = sweeper.sweep().await;
        assert_eq!(report.evicted, vec!["a", "b", "c", "d"]);
        assert_eq!(manager.status("e").unwrap(), SessionState::Initializing);
        assert!(connector.client("a").unwrap().is_destroyed());
    }

    #[tokio::test(start_paused = true)]
    async fn hung_and_failing_probes_are_evicted() {
        let (manager, connector, sweeper) = setup(&["hang", "fail", "ok"]).await;
        connector.client("hang").unwrap().set_state(StateReply::Hang);
        connector.client("fail").unwrap().set_state(StateReply::Fail);

        let report = sweeper.sweep().await;
        assert_eq!(report.evicted, vec!["fail", "hang"]);
        assert!(manager.status("ok").is_ok());
    }

    #[tokio::test]
    async fn destroy_failure_does_not_block_other_evictions() {
        let (manager, connector, sweeper) = setup(&["a", "b"]).await;
        for user in ["a", "b"] {
            connector
                .client(user)
                .unwrap()
                .set_state(StateReply::State(Some(ProviderState::Conflict)));
        }
        connector.client("a").unwrap().set_fail_destroy(true);

        let report = sweeper.sweep().await;
        assert_eq!(report.evicted.len(), 2);
        assert!(manager.list_active().is_empty());
        assert!(connector.client("b").unwrap().is_destroyed());
    }

    #[tokio::test]
    async fn restarted_session_is_not_evicted_by_old_probe() {
        let (manager, connector, _sweeper) = setup(&["alice"]).await;
        let old = connector.client("alice").unwrap();
        old.set_state(StateReply::State(Some(ProviderState::Conflict)));
        let old_epoch = old.epoch();

        manager.stop("alice").await.unwrap();
        manager.start("alice").await.unwrap();
        assert!(
            manager
                .registry()
                .remove_if_epoch("alice", old_epoch)
                .is_none()
        );
        assert_eq!(manager.status("alice").unwrap(), SessionState::Initializing);
    }

    #[tokio::test]
    async fn shutdown_tears_down_everything() {
        let (manager, connector, sweeper) = setup(&["alice", "bob"]).await;
        let alice = connector.client("alice").unwrap();
        manager.apply("alice", alice.epoch(), LifecycleEvent::Ready);
        connector.client("bob").unwrap().set_fail_logout(true);

        let outcomes = sweeper.shutdown().await;
        assert_eq!(outcomes, vec![
            ("alice".to_string(), StopOutcome::Stopped),
            ("bob".to_string(), StopOutcome::ForceStopped),
        ]);
        assert!(alice.is_logged_out());
        assert!(alice.is_destroyed());
        assert!(connector.client("bob").unwrap().is_destroyed());
        assert!(manager.list_active().is_empty());
    }
}
