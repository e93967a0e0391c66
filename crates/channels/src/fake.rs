//! Scriptable in-memory provider for tests.

use std::{
    collections::HashMap,
    sync::{
        Arc, Mutex, MutexGuard, PoisonError,
        atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;

use crate::{
    error::ProviderError,
    events::{EventSink, ProviderEventKind},
    provider::{ProviderClient, ProviderConnector, ProviderState, SentMessage},
};

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

/// What [`FakeClient::state`] answers.
#[derive(Debug, Clone)]
pub enum StateReply {
    State(Option<ProviderState>),
    Fail,
    /// Never answers.
    Hang,
}

/// Connector that hands out [`FakeClient`]s and remembers them per user.
#[derive(Default)]
pub struct FakeConnector {
    clients: Mutex<HashMap<String, Vec<Arc<FakeClient>>>>,
    connects: AtomicUsize,
    connect_delay: Mutex<Option<Duration>>,
    fail_connect: AtomicBool,
    fail_initialize: AtomicBool,
}

impl FakeConnector {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Number of `connect` calls so far, successful or not.
    pub fn connect_count(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    pub fn set_connect_delay(&self, delay: Duration) {
        *lock(&self.connect_delay) = Some(delay);
    }

    pub fn set_fail_connect(&self, fail: bool) {
        self.fail_connect.store(fail, Ordering::SeqCst);
    }

    /// Clients created from now on fail to initialize.
    pub fn set_fail_initialize(&self, fail: bool) {
        self.fail_initialize.store(fail, Ordering::SeqCst);
    }

    /// Most recent client created for `user_id`.
    pub fn client(&self, user_id: &str) -> Option<Arc<FakeClient>> {
        lock(&self.clients)
            .get(user_id)
            .and_then(|c| c.last().cloned())
    }

    /// Every client ever created for `user_id`, oldest first.
    pub fn clients(&self, user_id: &str) -> Vec<Arc<FakeClient>> {
        lock(&self.clients)
            .get(user_id)
            .cloned()
            .unwrap_or_default()
    }
}

#[async_trait]
impl ProviderConnector for FakeConnector {
    async fn connect(
        &self,
        user_id: &str,
        events: EventSink,
    ) -> Result<Arc<dyn ProviderClient>, ProviderError> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        let delay = *lock(&self.connect_delay);
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail_connect.load(Ordering::SeqCst) {
            return Err(ProviderError::Connect("fake connect failure".into()));
        }
        let client = Arc::new(FakeClient::new(events));
        client.set_fail_initialize(self.fail_initialize.load(Ordering::SeqCst));
        lock(&self.clients)
            .entry(user_id.to_string())
            .or_default()
            .push(Arc::clone(&client));
        Ok(client as Arc<dyn ProviderClient>)
    }
}

/// In-memory client. Tests drive provider events through [`FakeClient::emit`].
pub struct FakeClient {
    sink: EventSink,
    state_reply: Mutex<StateReply>,
    account: Mutex<Option<String>>,
    fail_initialize: AtomicBool,
    fail_logout: AtomicBool,
    fail_destroy: AtomicBool,
    fail_send: AtomicBool,
    initialized: AtomicBool,
    logged_out: AtomicBool,
    destroyed: AtomicBool,
    sent: Mutex<Vec<(String, String)>>,
    next_id: AtomicU64,
}

impl FakeClient {
    fn new(sink: EventSink) -> Self {
        Self {
            sink,
            state_reply: Mutex::new(StateReply::State(Some(ProviderState::Connected))),
            account: Mutex::new(None),
            fail_initialize: AtomicBool::new(false),
            fail_logout: AtomicBool::new(false),
            fail_destroy: AtomicBool::new(false),
            fail_send: AtomicBool::new(false),
            initialized: AtomicBool::new(false),
            logged_out: AtomicBool::new(false),
            destroyed: AtomicBool::new(false),
            sent: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(1),
        }
    }

    pub fn emit(&self, kind: ProviderEventKind) -> bool {
        self.sink.emit(kind)
    }

    pub fn epoch(&self) -> u64 {
        self.sink.epoch()
    }

    pub fn set_state(&self, reply: StateReply) {
        *lock(&self.state_reply) = reply;
    }

    pub fn set_account(&self, account: &str) {
        *lock(&self.account) = Some(account.to_string());
    }

    pub fn set_fail_initialize(&self, fail: bool) {
        self.fail_initialize.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_logout(&self, fail: bool) {
        self.fail_logout.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_destroy(&self, fail: bool) {
        self.fail_destroy.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_send(&self, fail: bool) {
        self.fail_send.store(fail, Ordering::SeqCst);
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::SeqCst)
    }

    pub fn is_logged_out(&self) -> bool {
        self.logged_out.load(Ordering::SeqCst)
    }

    pub fn is_destroyed(&self) -> bool {
        self.destroyed.load(Ordering::SeqCst)
    }

    /// `(chat_id, body_or_media_url)` for every accepted send.
    pub fn sent(&self) -> Vec<(String, String)> {
        lock(&self.sent).clone()
    }

    fn next_message_id(&self, chat_id: &str) -> String {
        let n = self.next_id.fetch_add(1, Ordering::SeqCst);
        format!("true_{chat_id}_3EB0{n:016X}")
    }
}

#[async_trait]
impl ProviderClient for FakeClient {
    async fn initialize(&self) -> Result<(), ProviderError> {
        if self.fail_initialize.load(Ordering::SeqCst) {
            return Err(ProviderError::Initialize("fake initialize failure".into()));
        }
        self.initialized.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn state(&self) -> Result<Option<ProviderState>, ProviderError> {
        let reply = lock(&self.state_reply).clone();
        match reply {
            StateReply::State(state) => Ok(state),
            StateReply::Fail => Err(ProviderError::Query("fake state failure".into())),
            StateReply::Hang => std::future::pending().await,
        }
    }

    fn account_id(&self) -> Option<String> {
        lock(&self.account).clone()
    }

    async fn send_text(&self, chat_id: &str, body: &str) -> Result<SentMessage, ProviderError> {
        let id = self.next_message_id(chat_id);
        if self.fail_send.load(Ordering::SeqCst) {
            return Err(ProviderError::Send {
                message_id: Some(id),
                reason: "fake send failure".into(),
            });
        }
        lock(&self.sent).push((chat_id.to_string(), body.to_string()));
        Ok(SentMessage { id })
    }

    async fn send_media(
        &self,
        chat_id: &str,
        media_url: &str,
        _caption: Option<&str>,
    ) -> Result<SentMessage, ProviderError> {
        if media_url.contains("unreachable") {
            return Err(ProviderError::MediaFetch(format!("cannot fetch {media_url}")));
        }
        let id = self.next_message_id(chat_id);
        if self.fail_send.load(Ordering::SeqCst) {
            return Err(ProviderError::Send {
                message_id: Some(id),
                reason: "fake send failure".into(),
            });
        }
        lock(&self.sent).push((chat_id.to_string(), media_url.to_string()));
        Ok(SentMessage { id })
    }

    async fn logout(&self) -> Result<(), ProviderError> {
        if self.fail_logout.load(Ordering::SeqCst) {
            return Err(ProviderError::Teardown("fake logout failure".into()));
        }
        self.logged_out.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn destroy(&self) -> Result<(), ProviderError> {
        if self.fail_destroy.load(Ordering::SeqCst) {
            return Err(ProviderError::Teardown("fake destroy failure".into()));
        }
        self.destroyed.store(true, Ordering::SeqCst);
        Ok(())
    }
}
