//! HTTP implementations of the session collaborators
//!
//! All of them share one `reqwest::Client` with a cookie store, so the cookie
//! minted by `POST /session` rides along on later `/session-check` calls the
//! way a browser would send it.

use crate::auth::models::{CreateSessionRequest, SessionCheckResponse, SessionTokens};
use crate::client::{
    collaborators::{GuestProvisioner, GuestRegistration, SessionBackend, TokenRefresher},
    credentials::CredentialStore,
    error::{RefreshError, SessionError},
};
use crate::config::ClientEndpoints;
use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode};
use serde::{de::DeserializeOwned, Deserialize};
use serde_json::json;
use std::{sync::Arc, time::Duration};
use tracing::{debug, info, warn};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Build the shared HTTP client (cookie store enabled)
pub fn build_http_client() -> reqwest::Result<Client> {
    Client::builder()
        .cookie_store(true)
        .timeout(REQUEST_TIMEOUT)
        .build()
}

fn transport(endpoint: &str, err: reqwest::Error) -> SessionError {
    SessionError::Transport {
        endpoint: endpoint.to_string(),
        reason: err.to_string(),
    }
}

fn expect_success(endpoint: &str, resp: Response) -> Result<Response, SessionError> {
    if resp.status().is_success() {
        Ok(resp)
    } else {
        Err(SessionError::Status {
            endpoint: endpoint.to_string(),
            status: resp.status().as_u16(),
        })
    }
}

async fn parse_json<T: DeserializeOwned>(endpoint: &str, resp: Response) -> Result<T, SessionError> {
    resp.json::<T>()
        .await
        .map_err(|e| SessionError::Protocol(format!("{endpoint}: {e}")))
}

/// Session endpoints over HTTP
#[derive(Clone)]
pub struct HttpSessionBackend {
    client: Client,
    endpoints: ClientEndpoints,
}

impl HttpSessionBackend {
    pub fn new(client: Client, endpoints: ClientEndpoints) -> Self {
        Self { client, endpoints }
    }
}

#[async_trait]
impl SessionBackend for HttpSessionBackend {
    async fn check_session(&self) -> Result<SessionCheckResponse, SessionError> {
        let url = self.endpoints.session_url("/session-check");
        let resp = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| transport(&url, e))?;
        let resp = expect_success(&url, resp)?;
        let check: SessionCheckResponse = parse_json(&url, resp).await?;
        debug!(status = ?check.status, "Session check completed");
        Ok(check)
    }

    async fn create_session(&self, request: &CreateSessionRequest) -> Result<(), SessionError> {
        let url = self.endpoints.session_url("/session");
        let resp = self
            .client
            .post(&url)
            .json(request)
            .send()
            .await
            .map_err(|e| transport(&url, e))?;
        expect_success(&url, resp)?;
        Ok(())
    }

    async fn update_session(&self, tokens: &SessionTokens) -> Result<(), SessionError> {
        let url = self.endpoints.session_url("/session");
        let resp = self
            .client
            .patch(&url)
            .json(tokens)
            .send()
            .await
            .map_err(|e| transport(&url, e))?;
        expect_success(&url, resp)?;
        Ok(())
    }

    async fn clear_session(&self) -> Result<(), SessionError> {
        let url = self.endpoints.session_url("/session");
        let resp = self
            .client
            .delete(&url)
            .send()
            .await
            .map_err(|e| transport(&url, e))?;
        expect_success(&url, resp)?;
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
struct PseudonymResponse {
    pseudonym: String,
}

/// Guest pseudonym issuance and registration over HTTP
#[derive(Clone)]
pub struct HttpGuestProvisioner {
    client: Client,
    endpoints: ClientEndpoints,
}

impl HttpGuestProvisioner {
    pub fn new(client: Client, endpoints: ClientEndpoints) -> Self {
        Self { client, endpoints }
    }
}

#[async_trait]
impl GuestProvisioner for HttpGuestProvisioner {
    async fn issue_pseudonym(&self) -> Result<String, SessionError> {
        let url = self.endpoints.api_url("/users/pseudonym");
        let resp = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| transport(&url, e))?;
        let resp = expect_success(&url, resp)?;
        let body: PseudonymResponse = parse_json(&url, resp).await?;
        if body.pseudonym.trim().is_empty() {
            return Err(SessionError::Protocol(format!("{url}: empty pseudonym")));
        }
        Ok(body.pseudonym)
    }

    async fn register_guest(&self, pseudonym: &str) -> Result<GuestRegistration, SessionError> {
        let url = self.endpoints.api_url("/users/guest");
        let resp = self
            .client
            .post(&url)
            .json(&json!({ "username": pseudonym }))
            .send()
            .await
            .map_err(|e| transport(&url, e))?;
        let resp = expect_success(&url, resp)?;
        parse_json(&url, resp).await
    }
}

/// Refreshes the access token against the auth API, then rotates the tokens
/// inside the session cookie.
pub struct HttpTokenRefresher {
    client: Client,
    endpoints: ClientEndpoints,
    credentials: CredentialStore,
    backend: Arc<dyn SessionBackend>,
}

impl HttpTokenRefresher {
    pub fn new(
        client: Client,
        endpoints: ClientEndpoints,
        credentials: CredentialStore,
        backend: Arc<dyn SessionBackend>,
    ) -> Self {
        Self {
            client,
            endpoints,
            credentials,
            backend,
        }
    }
}

#[async_trait]
impl TokenRefresher for HttpTokenRefresher {
    async fn refresh_access_token(&self) -> Result<bool, RefreshError> {
        let current = self
            .credentials
            .tokens()
            .ok_or(RefreshError::NoRefreshToken)?;

        let url = self.endpoints.api_url("/auth/refresh");
        let resp = self
            .client
            .post(&url)
            .json(&json!({ "refreshToken": current.refresh_token }))
            .send()
            .await
            .map_err(|e| RefreshError::Transport(e.to_string()))?;

        match resp.status() {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                warn!("Refresh token rejected ({})", resp.status());
                return Ok(false);
            }
            status if !status.is_success() => {
                return Err(RefreshError::Status(status.as_u16()));
            }
            _ => {}
        }

        let tokens: SessionTokens = resp
            .json()
            .await
            .map_err(|e| RefreshError::Protocol(e.to_string()))?;
        self.credentials.set_tokens(tokens.clone());
        info!("🔄 Access token refreshed");

        // The in-memory credential is already usable; a failed cookie rotation
        // only means the next page load restores the older pair.
        if let Err(e) = self.backend.update_session(&tokens).await {
            warn!("Session cookie rotation failed: {}", e);
        }

        Ok(true)
    }
}
