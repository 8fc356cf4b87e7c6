//! In-memory collaborators for unit tests

use crate::auth::models::{
    AuthType, CreateSessionRequest, SessionCheckResponse, SessionCheckStatus, SessionTokens,
};
use crate::client::{
    collaborators::{GuestProvisioner, GuestRegistration, RegisteredUser, SessionBackend, TokenRefresher},
    credentials::CredentialStore,
    error::{RefreshError, SessionError},
};
use crate::realtime::{
    listeners::Subscription,
    socket::{RealtimeSocket, SocketConnector, SocketEvent, SocketEventKind, SocketEvents, SocketHandler},
};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::{
    atomic::{AtomicBool, AtomicUsize, Ordering},
    Arc,
};
use std::time::Duration;

/// Session endpoints backed by a canned `/session-check` answer
pub struct FakeSessionBackend {
    check: Mutex<SessionCheckResponse>,
    check_calls: AtomicUsize,
    created: Mutex<Vec<CreateSessionRequest>>,
    updated: Mutex<Vec<SessionTokens>>,
    clear_calls: AtomicUsize,
    fail_create: AtomicBool,
}

impl FakeSessionBackend {
    fn answering(check: SessionCheckResponse) -> Self {
        Self {
            check: Mutex::new(check),
            check_calls: AtomicUsize::new(0),
            created: Mutex::new(Vec::new()),
            updated: Mutex::new(Vec::new()),
            clear_calls: AtomicUsize::new(0),
            fail_create: AtomicBool::new(false),
        }
    }

    pub fn without_session() -> Self {
        Self::answering(SessionCheckResponse::without_session(
            SessionCheckStatus::Missing,
        ))
    }

    pub fn with_session(username: &str, auth_type: AuthType) -> Self {
        Self::with_session_tokens(username, auth_type, "cookie-access", "cookie-refresh")
    }

    pub fn with_session_tokens(
        username: &str,
        auth_type: AuthType,
        access: &str,
        refresh: &str,
    ) -> Self {
        Self::answering(SessionCheckResponse {
            status: SessionCheckStatus::Valid,
            tokens: Some(SessionTokens {
                access_token: access.to_string(),
                refresh_token: refresh.to_string(),
            }),
            username: Some(username.to_string()),
            user_id: Some(format!("id-{username}")),
            auth_type: Some(auth_type),
        })
    }

    pub fn check_calls(&self) -> usize {
        self.check_calls.load(Ordering::SeqCst)
    }

    pub fn created(&self) -> Vec<CreateSessionRequest> {
        self.created.lock().clone()
    }

    pub fn updated(&self) -> Vec<SessionTokens> {
        self.updated.lock().clone()
    }

    pub fn clear_calls(&self) -> usize {
        self.clear_calls.load(Ordering::SeqCst)
    }

    pub fn fail_create(&self, fail: bool) {
        self.fail_create.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl SessionBackend for FakeSessionBackend {
    async fn check_session(&self) -> Result<SessionCheckResponse, SessionError> {
        self.check_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.check.lock().clone())
    }

    async fn create_session(&self, request: &CreateSessionRequest) -> Result<(), SessionError> {
        if self.fail_create.load(Ordering::SeqCst) {
            return Err(SessionError::Status {
                endpoint: "/session".to_string(),
                status: 500,
            });
        }
        self.created.lock().push(request.clone());
        Ok(())
    }

    async fn update_session(&self, tokens: &SessionTokens) -> Result<(), SessionError> {
        self.updated.lock().push(tokens.clone());
        Ok(())
    }

    async fn clear_session(&self) -> Result<(), SessionError> {
        self.clear_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Guest provisioning with counters and an optional artificial latency
pub struct FakeGuests {
    delay: Option<Duration>,
    pseudonym_calls: AtomicUsize,
    register_calls: AtomicUsize,
    fail_registration: AtomicBool,
}

impl FakeGuests {
    pub fn new() -> Self {
        Self {
            delay: None,
            pseudonym_calls: AtomicUsize::new(0),
            register_calls: AtomicUsize::new(0),
            fail_registration: AtomicBool::new(false),
        }
    }

    pub fn with_delay(delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Self::new()
        }
    }

    pub fn pseudonym_calls(&self) -> usize {
        self.pseudonym_calls.load(Ordering::SeqCst)
    }

    pub fn register_calls(&self) -> usize {
        self.register_calls.load(Ordering::SeqCst)
    }

    pub fn fail_registration(&self, fail: bool) {
        self.fail_registration.store(fail, Ordering::SeqCst);
    }

    async fn pause(&self) {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
    }
}

#[async_trait]
impl GuestProvisioner for FakeGuests {
    async fn issue_pseudonym(&self) -> Result<String, SessionError> {
        let n = self.pseudonym_calls.fetch_add(1, Ordering::SeqCst) + 1;
        self.pause().await;
        Ok(format!("quiet-otter-{n}"))
    }

    async fn register_guest(&self, pseudonym: &str) -> Result<GuestRegistration, SessionError> {
        self.register_calls.fetch_add(1, Ordering::SeqCst);
        self.pause().await;
        if self.fail_registration.load(Ordering::SeqCst) {
            return Err(SessionError::Status {
                endpoint: "/users/guest".to_string(),
                status: 503,
            });
        }
        Ok(GuestRegistration {
            tokens: SessionTokens {
                access_token: "guest-access".to_string(),
                refresh_token: "guest-refresh".to_string(),
            },
            user: RegisteredUser {
                id: uuid::Uuid::new_v4().to_string(),
                username: pseudonym.to_string(),
            },
        })
    }
}

#[derive(Debug, Clone, Copy)]
enum RefreshBehavior {
    Succeed,
    Decline,
    Fail,
}

/// Token refresher that counts calls. On success it writes
/// `refreshed-access-<n>` into the attached store.
pub struct FakeRefresher {
    behavior: RefreshBehavior,
    delay: Option<Duration>,
    store: Option<CredentialStore>,
    calls: AtomicUsize,
}

impl FakeRefresher {
    fn behaving(behavior: RefreshBehavior) -> Self {
        Self {
            behavior,
            delay: None,
            store: None,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn succeeding() -> Self {
        Self::behaving(RefreshBehavior::Succeed)
    }

    pub fn declining() -> Self {
        Self::behaving(RefreshBehavior::Decline)
    }

    pub fn failing() -> Self {
        Self::behaving(RefreshBehavior::Fail)
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn with_store(mut self, store: CredentialStore) -> Self {
        self.store = Some(store);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TokenRefresher for FakeRefresher {
    async fn refresh_access_token(&self) -> Result<bool, RefreshError> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        match self.behavior {
            RefreshBehavior::Succeed => {
                if let Some(store) = &self.store {
                    store.set_tokens(SessionTokens {
                        access_token: format!("refreshed-access-{n}"),
                        refresh_token: format!("refreshed-refresh-{n}"),
                    });
                }
                Ok(true)
            }
            RefreshBehavior::Decline => Ok(false),
            RefreshBehavior::Fail => Err(RefreshError::Transport("connection reset".to_string())),
        }
    }
}

/// Socket driven by hand: tests emit events, the socket records calls
pub struct FakeSocket {
    events: SocketEvents,
    token: Mutex<String>,
    connected: AtomicBool,
    connect_calls: AtomicUsize,
    close_calls: AtomicUsize,
}

impl FakeSocket {
    pub fn new(token: String) -> Self {
        Self {
            events: SocketEvents::new(),
            token: Mutex::new(token),
            connected: AtomicBool::new(false),
            connect_calls: AtomicUsize::new(0),
            close_calls: AtomicUsize::new(0),
        }
    }

    /// Deliver an event to the registered handlers
    pub fn emit(&self, event: SocketEvent) {
        match event {
            SocketEvent::Connect => self.connected.store(true, Ordering::SeqCst),
            SocketEvent::Disconnect(_) => self.connected.store(false, Ordering::SeqCst),
            _ => {}
        }
        self.events.emit(&event);
    }

    pub fn listener_count(&self, kind: SocketEventKind) -> usize {
        self.events.listener_count(kind)
    }

    pub fn total_listeners(&self) -> usize {
        self.events.total_listeners()
    }

    pub fn connect_calls(&self) -> usize {
        self.connect_calls.load(Ordering::SeqCst)
    }

    pub fn close_calls(&self) -> usize {
        self.close_calls.load(Ordering::SeqCst)
    }
}

impl RealtimeSocket for FakeSocket {
    fn on(&self, kind: SocketEventKind, handler: SocketHandler) -> Subscription {
        self.events.on(kind, handler)
    }

    fn set_auth_token(&self, token: String) {
        *self.token.lock() = token;
    }

    fn auth_token(&self) -> String {
        self.token.lock().clone()
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn connect(&self) {
        self.connect_calls.fetch_add(1, Ordering::SeqCst);
    }

    fn close(&self) {
        self.close_calls.fetch_add(1, Ordering::SeqCst);
        if self.connected.swap(false, Ordering::SeqCst) {
            self.events
                .emit(&SocketEvent::Disconnect("io client disconnect".to_string()));
        }
    }
}

/// Hands out `FakeSocket`s and keeps them for inspection
pub struct FakeConnector {
    opened: Mutex<Vec<Arc<FakeSocket>>>,
}

impl FakeConnector {
    pub fn new() -> Self {
        Self {
            opened: Mutex::new(Vec::new()),
        }
    }

    pub fn open_calls(&self) -> usize {
        self.opened.lock().len()
    }

    pub fn last_socket(&self) -> Arc<FakeSocket> {
        self.opened
            .lock()
            .last()
            .cloned()
            .expect("no socket opened")
    }
}

impl SocketConnector for FakeConnector {
    fn open(&self, token: String) -> Arc<dyn RealtimeSocket> {
        let socket = Arc::new(FakeSocket::new(token));
        self.opened.lock().push(socket.clone());
        socket
    }
}
