//! Narrow interfaces to the services the session core depends on.

use crate::auth::models::{CreateSessionRequest, SessionCheckResponse, SessionTokens};
use crate::client::error::{RefreshError, SessionError};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// The session endpoints (`/session-check`, `/session`)
#[async_trait]
pub trait SessionBackend: Send + Sync {
    /// Ask whether the browser holds a valid session cookie
    async fn check_session(&self) -> Result<SessionCheckResponse, SessionError>;

    /// Mint a new session cookie (POST)
    async fn create_session(&self, request: &CreateSessionRequest) -> Result<(), SessionError>;

    /// Rotate the tokens inside the existing cookie (PATCH)
    async fn update_session(&self, tokens: &SessionTokens) -> Result<(), SessionError>;

    /// Invalidate the cookie (DELETE)
    async fn clear_session(&self) -> Result<(), SessionError>;
}

/// Registered account returned by guest registration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RegisteredUser {
    pub id: String,
    pub username: String,
}

/// Outcome of registering a guest pseudonym
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct GuestRegistration {
    pub tokens: SessionTokens,
    pub user: RegisteredUser,
}

/// Issues and registers guest pseudonyms
#[async_trait]
pub trait GuestProvisioner: Send + Sync {
    async fn issue_pseudonym(&self) -> Result<String, SessionError>;

    async fn register_guest(&self, pseudonym: &str) -> Result<GuestRegistration, SessionError>;
}

/// Obtains a fresh access token.
///
/// `Ok(true)` means the credential store now holds new tokens. `Ok(false)`
/// means the refresh was declined (e.g. refresh token rejected).
#[async_trait]
pub trait TokenRefresher: Send + Sync {
    async fn refresh_access_token(&self) -> Result<bool, RefreshError>;
}
