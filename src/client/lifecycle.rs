//! Session Lifecycle Manager
//! Mission: Single source of truth for "who is this browser"
//!
//! State machine:
//!
//! ```text
//! uninitialized -> initializing -> guest | authenticated | cleared
//! guest -> authenticated          (mark_authenticated / complete_login)
//! any -> cleared                  (clear_session / logout)
//! any -> uninitialized            (reset)
//! ```
//!
//! Restoration is single-flight: callers arriving while a restore/create
//! sequence is running await that same sequence.

use crate::auth::models::{
    AuthType, CreateSessionRequest, SessionCheckResponse, SessionCheckStatus, SessionTokens,
    DEFAULT_SESSION_TTL_SECS,
};
use crate::client::{
    collaborators::{GuestProvisioner, SessionBackend},
    credentials::{CredentialReader, CredentialStore},
    error::SessionError,
    single_flight::SingleFlight,
};
use futures_util::future::{BoxFuture, FutureExt};
use serde::Serialize;
use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

/// Lifecycle state of the browser's session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    Uninitialized,
    Initializing,
    Guest,
    Authenticated,
    Cleared,
}

impl SessionState {
    /// Past initialization: restore is a no-op from here
    pub fn is_settled(&self) -> bool {
        matches!(
            self,
            SessionState::Guest | SessionState::Authenticated | SessionState::Cleared
        )
    }

    fn for_auth_type(auth_type: AuthType) -> Self {
        if auth_type.is_guest() {
            SessionState::Guest
        } else {
            SessionState::Authenticated
        }
    }
}

/// Identity of the current session
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionInfo {
    pub user_id: String,
    pub username: String,
}

/// State plus identity. `info` is present iff the state is guest or authenticated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSnapshot {
    pub state: SessionState,
    pub info: Option<SessionInfo>,
}

impl SessionSnapshot {
    fn uninitialized() -> Self {
        Self {
            state: SessionState::Uninitialized,
            info: None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct RestoreOptions {
    /// Do not mint a guest identity when no session exists
    pub skip_creation: bool,
}

/// Tokens and identity obtained from a login flow
#[derive(Debug, Clone)]
pub struct LoginGrant {
    pub tokens: SessionTokens,
    pub user_id: String,
    pub username: String,
    pub auth_type: AuthType,
}

type RestoreResult = Result<Option<SessionInfo>, SessionError>;

/// Everything a restore sequence needs, detached from `&self` so the
/// sequence can outlive any single caller.
#[derive(Clone)]
struct RestoreContext {
    backend: Arc<dyn SessionBackend>,
    guests: Arc<dyn GuestProvisioner>,
    credentials: CredentialStore,
    snapshot: Arc<watch::Sender<SessionSnapshot>>,
    generation: Arc<AtomicU64>,
    launched_at: u64,
}

impl RestoreContext {
    fn is_current(&self) -> bool {
        self.generation.load(Ordering::SeqCst) == self.launched_at
    }

    /// Store tokens unless a reset/clear happened since launch
    fn adopt_tokens(&self, tokens: SessionTokens) {
        if self.is_current() {
            self.credentials.set_tokens(tokens);
        }
    }

    /// Publish a state unless a reset/clear happened since launch
    fn settle(&self, state: SessionState, info: Option<SessionInfo>) {
        if !self.is_current() {
            debug!(?state, "Discarding stale restore outcome");
            return;
        }
        self.snapshot.send_replace(SessionSnapshot { state, info });
    }
}

/// Owns the session state of one browser/process
pub struct SessionManager {
    backend: Arc<dyn SessionBackend>,
    guests: Arc<dyn GuestProvisioner>,
    credentials: CredentialStore,
    snapshot: Arc<watch::Sender<SessionSnapshot>>,
    generation: Arc<AtomicU64>,
    inflight: SingleFlight<RestoreResult>,
}

impl SessionManager {
    pub fn new(
        backend: Arc<dyn SessionBackend>,
        guests: Arc<dyn GuestProvisioner>,
        credentials: CredentialStore,
    ) -> Self {
        let (snapshot, _) = watch::channel(SessionSnapshot::uninitialized());
        Self {
            backend,
            guests,
            credentials,
            snapshot: Arc::new(snapshot),
            generation: Arc::new(AtomicU64::new(0)),
            inflight: SingleFlight::new(),
        }
    }

    pub fn state(&self) -> SessionState {
        self.snapshot.borrow().state
    }

    pub fn info(&self) -> Option<SessionInfo> {
        self.snapshot.borrow().info.clone()
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        self.snapshot.borrow().clone()
    }

    /// Observe state changes
    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.snapshot.subscribe()
    }

    /// Read-only view of the credentials this manager maintains
    pub fn credentials(&self) -> CredentialReader {
        self.credentials.reader()
    }

    /// Restore the session with default options (guest creation allowed)
    pub async fn init(&self) -> RestoreResult {
        self.restore_session(RestoreOptions::default()).await
    }

    /// Restore an existing session or create a guest one.
    ///
    /// Concurrent callers share one underlying sequence. Once settled, this
    /// returns the cached identity without any network calls.
    pub async fn restore_session(&self, options: RestoreOptions) -> RestoreResult {
        {
            let snapshot = self.snapshot.borrow();
            if snapshot.state.is_settled() {
                return Ok(snapshot.info.clone());
            }
        }

        let ctx = RestoreContext {
            backend: self.backend.clone(),
            guests: self.guests.clone(),
            credentials: self.credentials.clone(),
            snapshot: self.snapshot.clone(),
            generation: self.generation.clone(),
            launched_at: self.generation.load(Ordering::SeqCst),
        };

        self.inflight
            .run(move || -> BoxFuture<'static, RestoreResult> {
                // Re-check under the single-flight slot: a sequence may have
                // settled between the fast-path check and here.
                let current = ctx.snapshot.borrow().clone();
                if current.state.is_settled() {
                    return async move { Ok(current.info) }.boxed();
                }

                ctx.snapshot.send_replace(SessionSnapshot {
                    state: SessionState::Initializing,
                    info: None,
                });
                run_restore(ctx, options).boxed()
            })
            .await
    }

    /// Transition to authenticated, optionally replacing the identity.
    /// A restore still in flight can no longer overwrite the result.
    pub fn mark_authenticated(
        &self,
        username: Option<String>,
        user_id: Option<String>,
    ) -> Result<SessionInfo, SessionError> {
        let current = self.snapshot.borrow().info.clone();
        let info = match (current, username, user_id) {
            (Some(mut info), username, user_id) => {
                if let Some(username) = username {
                    info.username = username;
                }
                if let Some(user_id) = user_id {
                    info.user_id = user_id;
                }
                info
            }
            (None, Some(username), Some(user_id)) => SessionInfo { user_id, username },
            (None, _, _) => return Err(SessionError::NoIdentity),
        };

        self.generation.fetch_add(1, Ordering::SeqCst);
        info!("✅ Session authenticated as {} ({})", info.username, info.user_id);
        self.snapshot.send_replace(SessionSnapshot {
            state: SessionState::Authenticated,
            info: Some(info.clone()),
        });
        Ok(info)
    }

    /// Drop the session locally. Synchronous; the cookie is left alone
    /// (see `logout`).
    pub fn clear_session(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
        self.credentials.clear();
        self.snapshot.send_replace(SessionSnapshot {
            state: SessionState::Cleared,
            info: None,
        });
        info!("🧹 Session cleared");
    }

    /// Clear locally, then invalidate the cookie
    pub async fn logout(&self) -> Result<(), SessionError> {
        self.clear_session();
        self.backend.clear_session().await
    }

    /// Adopt the outcome of a login: store tokens, mint a cookie carrying the
    /// new identity, and transition accordingly.
    pub async fn complete_login(&self, grant: LoginGrant) -> Result<SessionInfo, SessionError> {
        self.generation.fetch_add(1, Ordering::SeqCst);
        self.credentials.set_tokens(grant.tokens.clone());

        let request = CreateSessionRequest {
            username: Some(grant.username.clone()),
            user_id: Some(grant.user_id.clone()),
            access_token: Some(grant.tokens.access_token),
            refresh_token: Some(grant.tokens.refresh_token),
            auth_type: Some(grant.auth_type.as_str().to_string()),
            expiration_from_now: Some(serde_json::json!(DEFAULT_SESSION_TTL_SECS)),
        };
        self.backend.create_session(&request).await?;

        let info = SessionInfo {
            user_id: grant.user_id,
            username: grant.username,
        };
        if grant.auth_type.is_guest() {
            self.snapshot.send_replace(SessionSnapshot {
                state: SessionState::Guest,
                info: Some(info.clone()),
            });
            Ok(info)
        } else {
            self.mark_authenticated(Some(info.username), Some(info.user_id))
        }
    }

    /// Return to `uninitialized`, forgetting identity, credentials and any
    /// in-flight restoration.
    pub fn reset(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
        self.inflight.forget();
        self.credentials.clear();
        self.snapshot.send_replace(SessionSnapshot::uninitialized());
        debug!("Session manager reset");
    }
}

async fn run_restore(ctx: RestoreContext, options: RestoreOptions) -> RestoreResult {
    let outcome = restore_or_create(&ctx, options).await;
    if let Err(e) = &outcome {
        error!("Session restoration failed: {}", e);
        if ctx.is_current() {
            ctx.credentials.clear();
        }
        ctx.settle(SessionState::Uninitialized, None);
    }
    outcome
}

async fn restore_or_create(ctx: &RestoreContext, options: RestoreOptions) -> RestoreResult {
    let check = ctx.backend.check_session().await?;

    if let Some((tokens, info, auth_type)) = adoptable(check) {
        ctx.adopt_tokens(tokens);
        let state = SessionState::for_auth_type(auth_type);
        info!(
            "🔐 Restored {} session for {}",
            auth_type.as_str(),
            info.username
        );
        ctx.settle(state, Some(info.clone()));
        return Ok(Some(info));
    }

    if options.skip_creation {
        debug!("No session and creation skipped");
        ctx.settle(SessionState::Cleared, None);
        return Ok(None);
    }

    let info = create_guest(ctx).await?;
    ctx.settle(SessionState::Guest, Some(info.clone()));
    Ok(Some(info))
}

/// Extract a usable session from a check response. Incomplete "valid"
/// responses are treated like no session at all.
fn adoptable(check: SessionCheckResponse) -> Option<(SessionTokens, SessionInfo, AuthType)> {
    if check.status != SessionCheckStatus::Valid {
        return None;
    }

    match (check.tokens, check.username, check.user_id) {
        (Some(tokens), Some(username), Some(user_id)) => Some((
            tokens,
            SessionInfo { user_id, username },
            check.auth_type.unwrap_or_default(),
        )),
        _ => {
            warn!("Session check reported a valid session without identity");
            None
        }
    }
}

async fn create_guest(ctx: &RestoreContext) -> Result<SessionInfo, SessionError> {
    let pseudonym = ctx
        .guests
        .issue_pseudonym()
        .await
        .map_err(|e| SessionError::GuestCreation(e.to_string()))?;

    let registration = ctx
        .guests
        .register_guest(&pseudonym)
        .await
        .map_err(|e| SessionError::GuestCreation(e.to_string()))?;

    ctx.adopt_tokens(registration.tokens.clone());

    let request = CreateSessionRequest {
        username: Some(registration.user.username.clone()),
        user_id: Some(registration.user.id.clone()),
        access_token: Some(registration.tokens.access_token.clone()),
        refresh_token: Some(registration.tokens.refresh_token.clone()),
        auth_type: Some(AuthType::Guest.as_str().to_string()),
        expiration_from_now: Some(serde_json::json!(DEFAULT_SESSION_TTL_SECS)),
    };
    ctx.backend
        .create_session(&request)
        .await
        .map_err(|e| SessionError::GuestCreation(e.to_string()))?;

    info!(
        "👤 Guest session created for {} ({})",
        registration.user.username, registration.user.id
    );

    Ok(SessionInfo {
        user_id: registration.user.id,
        username: registration.user.username,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeGuests, FakeSessionBackend};
    use std::time::Duration;

    fn manager(backend: &Arc<FakeSessionBackend>, guests: &Arc<FakeGuests>) -> Arc<SessionManager> {
        Arc::new(SessionManager::new(
            backend.clone(),
            guests.clone(),
            CredentialStore::new(),
        ))
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_restores_create_one_guest() {
        let backend = Arc::new(FakeSessionBackend::without_session());
        let guests = Arc::new(FakeGuests::with_delay(Duration::from_millis(200)));
        let manager = manager(&backend, &guests);

        let mut handles = Vec::new();
        for _ in 0..10 {
            let manager = manager.clone();
            handles.push(tokio::spawn(async move {
                manager.restore_session(RestoreOptions::default()).await
            }));
        }

        let mut results = Vec::new();
        for handle in handles {
            results.push(handle.await.unwrap().unwrap());
        }

        let first = results[0].clone().expect("guest identity");
        assert!(results.iter().all(|r| r.as_ref() == Some(&first)));
        assert_eq!(guests.pseudonym_calls(), 1);
        assert_eq!(guests.register_calls(), 1);
        assert_eq!(backend.check_calls(), 1);
        assert_eq!(backend.created().len(), 1);
        assert_eq!(manager.state(), SessionState::Guest);
        assert_eq!(
            manager.credentials().access_token().as_deref(),
            Some("guest-access")
        );

        let minted = &backend.created()[0];
        assert_eq!(minted.auth_type.as_deref(), Some("guest"));
        assert_eq!(
            minted.expiration_from_now,
            Some(serde_json::json!(DEFAULT_SESSION_TTL_SECS))
        );
    }

    #[tokio::test]
    async fn test_restores_authenticated_session_from_auth_type() {
        let backend = Arc::new(FakeSessionBackend::with_session("Guest-lookalike", AuthType::User));
        let guests = Arc::new(FakeGuests::new());
        let manager = manager(&backend, &guests);

        let info = manager.init().await.unwrap().unwrap();

        assert_eq!(info.username, "Guest-lookalike");
        assert_eq!(manager.state(), SessionState::Authenticated);
        assert_eq!(
            manager.credentials().access_token().as_deref(),
            Some("cookie-access")
        );
        assert_eq!(guests.pseudonym_calls(), 0);
    }

    #[tokio::test]
    async fn test_restores_guest_session_from_auth_type() {
        let backend = Arc::new(FakeSessionBackend::with_session("quiet-fox", AuthType::Guest));
        let guests = Arc::new(FakeGuests::new());
        let manager = manager(&backend, &guests);

        manager.init().await.unwrap();
        assert_eq!(manager.state(), SessionState::Guest);
    }

    #[tokio::test]
    async fn test_skip_creation_without_cookie() {
        let backend = Arc::new(FakeSessionBackend::without_session());
        let guests = Arc::new(FakeGuests::new());
        let manager = manager(&backend, &guests);

        let result = manager
            .restore_session(RestoreOptions {
                skip_creation: true,
            })
            .await
            .unwrap();

        assert!(result.is_none());
        assert_eq!(manager.state(), SessionState::Cleared);
        assert!(manager.info().is_none());
        assert_eq!(guests.pseudonym_calls(), 0);
        assert_eq!(guests.register_calls(), 0);
        assert!(backend.created().is_empty());
    }

    #[tokio::test]
    async fn test_restore_after_settle_is_cached() {
        let backend = Arc::new(FakeSessionBackend::with_session("alice", AuthType::User));
        let guests = Arc::new(FakeGuests::new());
        let manager = manager(&backend, &guests);

        let first = manager.init().await.unwrap();
        let second = manager.init().await.unwrap();

        assert_eq!(first, second);
        assert_eq!(backend.check_calls(), 1);
    }

    #[tokio::test]
    async fn test_guest_creation_failure_surfaces() {
        let backend = Arc::new(FakeSessionBackend::without_session());
        let guests = Arc::new(FakeGuests::new());
        guests.fail_registration(true);
        let manager = manager(&backend, &guests);

        let err = manager.init().await.unwrap_err();
        assert!(matches!(err, SessionError::GuestCreation(_)));
        assert_eq!(manager.state(), SessionState::Uninitialized);
        assert!(manager.credentials().tokens().is_none());

        // Not retried automatically, but a later call may try again.
        assert_eq!(guests.register_calls(), 1);
        guests.fail_registration(false);
        assert!(manager.init().await.unwrap().is_some());
        assert_eq!(guests.register_calls(), 2);
    }

    #[tokio::test]
    async fn test_cookie_mint_failure_surfaces() {
        let backend = Arc::new(FakeSessionBackend::without_session());
        backend.fail_create(true);
        let guests = Arc::new(FakeGuests::new());
        let manager = manager(&backend, &guests);

        assert!(matches!(
            manager.init().await,
            Err(SessionError::GuestCreation(_))
        ));
        assert!(manager.credentials().tokens().is_none());
    }

    #[tokio::test]
    async fn test_mark_authenticated_overwrites_identity() {
        let backend = Arc::new(FakeSessionBackend::without_session());
        let guests = Arc::new(FakeGuests::new());
        let manager = manager(&backend, &guests);
        manager.init().await.unwrap();

        let info = manager
            .mark_authenticated(Some("alice".to_string()), Some("user-7".to_string()))
            .unwrap();

        assert_eq!(info.username, "alice");
        assert_eq!(manager.state(), SessionState::Authenticated);
        assert_eq!(manager.info(), Some(info));
    }

    #[tokio::test]
    async fn test_mark_authenticated_keeps_identity_when_omitted() {
        let backend = Arc::new(FakeSessionBackend::without_session());
        let guests = Arc::new(FakeGuests::new());
        let manager = manager(&backend, &guests);
        let guest = manager.init().await.unwrap().unwrap();

        let info = manager.mark_authenticated(None, None).unwrap();
        assert_eq!(info, guest);
    }

    #[test]
    fn test_mark_authenticated_without_identity_fails() {
        let backend = Arc::new(FakeSessionBackend::without_session());
        let guests = Arc::new(FakeGuests::new());
        let manager = manager(&backend, &guests);

        assert_eq!(
            manager.mark_authenticated(Some("alice".to_string()), None),
            Err(SessionError::NoIdentity)
        );
        assert_eq!(manager.state(), SessionState::Uninitialized);
    }

    #[tokio::test]
    async fn test_clear_session_is_local() {
        let backend = Arc::new(FakeSessionBackend::with_session("alice", AuthType::User));
        let guests = Arc::new(FakeGuests::new());
        let manager = manager(&backend, &guests);
        manager.init().await.unwrap();

        manager.clear_session();

        assert_eq!(manager.state(), SessionState::Cleared);
        assert!(manager.info().is_none());
        assert!(manager.credentials().tokens().is_none());
        assert_eq!(backend.clear_calls(), 0);

        // cleared is settled: no silent re-creation
        assert!(manager.init().await.unwrap().is_none());
        assert_eq!(backend.check_calls(), 1);
    }

    #[tokio::test]
    async fn test_logout_invalidates_cookie() {
        let backend = Arc::new(FakeSessionBackend::with_session("alice", AuthType::User));
        let guests = Arc::new(FakeGuests::new());
        let manager = manager(&backend, &guests);
        manager.init().await.unwrap();

        manager.logout().await.unwrap();

        assert_eq!(manager.state(), SessionState::Cleared);
        assert_eq!(backend.clear_calls(), 1);
    }

    #[tokio::test]
    async fn test_reset_allows_fresh_restore() {
        let backend = Arc::new(FakeSessionBackend::with_session("alice", AuthType::User));
        let guests = Arc::new(FakeGuests::new());
        let manager = manager(&backend, &guests);
        manager.init().await.unwrap();

        manager.reset();
        assert_eq!(manager.state(), SessionState::Uninitialized);
        assert!(manager.credentials().tokens().is_none());

        manager.init().await.unwrap();
        assert_eq!(backend.check_calls(), 2);
        assert_eq!(manager.state(), SessionState::Authenticated);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reset_discards_in_flight_outcome() {
        let backend = Arc::new(FakeSessionBackend::without_session());
        let guests = Arc::new(FakeGuests::with_delay(Duration::from_millis(100)));
        let manager = manager(&backend, &guests);

        let pending = {
            let manager = manager.clone();
            tokio::spawn(async move { manager.init().await })
        };
        tokio::task::yield_now().await;
        assert_eq!(manager.state(), SessionState::Initializing);

        manager.reset();
        pending.await.unwrap().unwrap();

        assert_eq!(manager.state(), SessionState::Uninitialized);
    }

    #[tokio::test(start_paused = true)]
    async fn test_mark_authenticated_survives_in_flight_restore() {
        let backend = Arc::new(FakeSessionBackend::without_session());
        let guests = Arc::new(FakeGuests::with_delay(Duration::from_millis(100)));
        let manager = manager(&backend, &guests);

        let pending = {
            let manager = manager.clone();
            tokio::spawn(async move { manager.init().await })
        };
        tokio::task::yield_now().await;
        assert_eq!(manager.state(), SessionState::Initializing);

        manager
            .mark_authenticated(Some("alice".to_string()), Some("user-7".to_string()))
            .unwrap();
        pending.await.unwrap().unwrap();

        assert_eq!(manager.state(), SessionState::Authenticated);
        assert_eq!(manager.info().unwrap().username, "alice");
        assert!(manager.credentials().tokens().is_none());
    }

    #[tokio::test]
    async fn test_complete_login_mints_user_cookie() {
        let backend = Arc::new(FakeSessionBackend::without_session());
        let guests = Arc::new(FakeGuests::new());
        let manager = manager(&backend, &guests);
        manager.init().await.unwrap();

        let info = manager
            .complete_login(LoginGrant {
                tokens: SessionTokens {
                    access_token: "login-access".to_string(),
                    refresh_token: "login-refresh".to_string(),
                },
                user_id: "user-9".to_string(),
                username: "bob".to_string(),
                auth_type: AuthType::User,
            })
            .await
            .unwrap();

        assert_eq!(info.username, "bob");
        assert_eq!(manager.state(), SessionState::Authenticated);
        assert_eq!(
            manager.credentials().access_token().as_deref(),
            Some("login-access")
        );
        let minted = backend.created();
        assert_eq!(minted.last().unwrap().auth_type.as_deref(), Some("user"));
    }

    #[tokio::test]
    async fn test_subscribers_observe_transitions() {
        let backend = Arc::new(FakeSessionBackend::with_session("alice", AuthType::Admin));
        let guests = Arc::new(FakeGuests::new());
        let manager = manager(&backend, &guests);
        let mut rx = manager.subscribe();

        manager.init().await.unwrap();
        rx.changed().await.unwrap();
        assert_eq!(rx.borrow().state, SessionState::Authenticated);
    }
}
