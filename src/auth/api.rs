//! Session API Endpoints
//! Mission: Mint, rotate, inspect and clear the sealed session cookie

use crate::auth::{
    codec::CookieCodec,
    models::{
        AuthType, CreateSessionRequest, MessageResponse, SessionCheckResponse,
        SessionCheckStatus, SessionClaims, SessionTokens, UpdateSessionRequest,
        DEFAULT_SESSION_TTL_SECS, SESSION_COOKIE_NAME,
    },
};
use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use chrono::Utc;
use serde_json::json;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Shared session endpoint state
#[derive(Clone)]
pub struct SessionApiState {
    pub codec: Arc<CookieCodec>,
    /// Adds the `Secure` attribute (TLS deployments only)
    pub secure_cookies: bool,
}

impl SessionApiState {
    pub fn new(codec: Arc<CookieCodec>, secure_cookies: bool) -> Self {
        Self {
            codec,
            secure_cookies,
        }
    }
}

/// Router serving `/session-check` and `/session`
pub fn session_router(state: SessionApiState) -> Router {
    Router::new()
        .route(
            "/session-check",
            get(check_session).fallback(method_not_allowed),
        )
        .route(
            "/session",
            post(create_session)
                .patch(update_session)
                .delete(clear_session)
                .fallback(method_not_allowed),
        )
        .with_state(state)
}

/// Build the session cookie with the fixed attribute set
pub fn session_cookie(value: String, max_age_secs: i64, secure: bool) -> Cookie<'static> {
    Cookie::build((SESSION_COOKIE_NAME, value))
        .http_only(true)
        .secure(secure)
        .same_site(SameSite::Strict)
        .path("/")
        .max_age(time::Duration::seconds(max_age_secs.max(0)))
        .build()
}

/// Session check - GET /session-check
pub async fn check_session(
    State(state): State<SessionApiState>,
    jar: CookieJar,
) -> (CookieJar, Json<SessionCheckResponse>) {
    let Some(cookie) = jar.get(SESSION_COOKIE_NAME) else {
        debug!("Session check: no cookie");
        return (
            jar,
            Json(SessionCheckResponse::without_session(
                SessionCheckStatus::Missing,
            )),
        );
    };

    let now = Utc::now().timestamp();
    match state.codec.decode(cookie.value()) {
        Ok(claims) if !claims.is_expired(now) => {
            debug!(
                "Session check: valid session for {} ({})",
                claims.sub,
                claims.auth_type.as_str()
            );
            (jar, Json(SessionCheckResponse::valid(&claims)))
        }
        Ok(claims) => {
            info!("⌛ Session check: cookie for {} expired", claims.sub);
            invalid_session(jar, state.secure_cookies)
        }
        Err(e) => {
            warn!("❌ Session check: {}", e);
            invalid_session(jar, state.secure_cookies)
        }
    }
}

fn invalid_session(jar: CookieJar, secure: bool) -> (CookieJar, Json<SessionCheckResponse>) {
    (
        jar.add(session_cookie(String::new(), 0, secure)),
        Json(SessionCheckResponse::without_session(
            SessionCheckStatus::Invalid,
        )),
    )
}

/// Create session - POST /session
pub async fn create_session(
    State(state): State<SessionApiState>,
    jar: CookieJar,
    payload: Result<Json<CreateSessionRequest>, JsonRejection>,
) -> Result<(CookieJar, Json<MessageResponse>), SessionApiError> {
    let Json(payload) = payload.map_err(|e| {
        debug!("Rejected session body: {}", e);
        SessionApiError::InvalidBody
    })?;

    let auth_type = match payload.auth_type.as_deref() {
        None => AuthType::Guest,
        Some(raw) => AuthType::parse(raw).ok_or(SessionApiError::InvalidAuthType)?,
    };

    let ttl_secs = match payload.expiration_from_now.as_ref() {
        None => DEFAULT_SESSION_TTL_SECS,
        Some(raw) => parse_expiration(raw).ok_or(SessionApiError::InvalidExpiration)?,
    };

    let (Some(username), Some(user_id), Some(access_token), Some(refresh_token)) = (
        non_empty(payload.username),
        non_empty(payload.user_id),
        non_empty(payload.access_token),
        non_empty(payload.refresh_token),
    ) else {
        return Err(SessionApiError::MissingFields);
    };

    let claims = SessionClaims::issue(
        SessionTokens {
            access_token,
            refresh_token,
        },
        user_id,
        username,
        auth_type,
        Utc::now().timestamp(),
        ttl_secs,
    );

    let value = state.codec.encode(&claims).map_err(|e| {
        error!("Failed to seal new session: {}", e);
        SessionApiError::CreateFailed
    })?;

    info!(
        "🔐 Session created for {} ({}), ttl {}s",
        claims.sub,
        auth_type.as_str(),
        ttl_secs
    );

    Ok((
        jar.add(session_cookie(value, ttl_secs, state.secure_cookies)),
        Json(MessageResponse {
            message: "Session created".to_string(),
        }),
    ))
}

/// Rotate tokens - PATCH /session
///
/// Only the token pair changes. The cookie's Max-Age is whatever remains of the
/// original lifetime, so rotation never extends a session.
pub async fn update_session(
    State(state): State<SessionApiState>,
    jar: CookieJar,
    payload: Result<Json<UpdateSessionRequest>, JsonRejection>,
) -> Result<(CookieJar, Json<MessageResponse>), SessionApiError> {
    let Json(payload) = payload.map_err(|e| {
        debug!("Rejected session body: {}", e);
        SessionApiError::InvalidBody
    })?;

    let (Some(access_token), Some(refresh_token)) = (
        non_empty(payload.access_token),
        non_empty(payload.refresh_token),
    ) else {
        return Err(SessionApiError::MissingTokens);
    };

    let cookie = jar
        .get(SESSION_COOKIE_NAME)
        .ok_or(SessionApiError::NoSession)?;

    let existing = state.codec.decode(cookie.value()).map_err(|e| {
        error!("Existing session cookie could not be opened: {}", e);
        SessionApiError::UpdateFailed
    })?;

    let now = Utc::now().timestamp();
    let claims = existing.with_rotated_tokens(
        SessionTokens {
            access_token,
            refresh_token,
        },
        now,
    );
    let max_age = existing.remaining_secs(now);

    let value = state.codec.encode(&claims).map_err(|e| {
        error!("Failed to seal rotated session: {}", e);
        SessionApiError::UpdateFailed
    })?;

    info!(
        "🔄 Session tokens rotated for {} ({}s remaining)",
        claims.sub, max_age
    );

    Ok((
        jar.add(session_cookie(value, max_age, state.secure_cookies)),
        Json(MessageResponse {
            message: "Session updated".to_string(),
        }),
    ))
}

/// Clear session - DELETE /session
pub async fn clear_session(
    State(state): State<SessionApiState>,
    jar: CookieJar,
) -> (CookieJar, Json<MessageResponse>) {
    info!("🗑️  Session cookie cleared");
    (
        jar.add(session_cookie(String::new(), 0, state.secure_cookies)),
        Json(MessageResponse {
            message: "Session cleared".to_string(),
        }),
    )
}

async fn method_not_allowed() -> SessionApiError {
    SessionApiError::MethodNotAllowed
}

/// `expirationFromNow` must be a non-negative JSON number of seconds
fn parse_expiration(raw: &serde_json::Value) -> Option<i64> {
    raw.as_f64()
        .filter(|secs| secs.is_finite() && *secs >= 0.0)
        .map(|secs| secs.floor() as i64)
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

/// Session API errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionApiError {
    InvalidBody,
    InvalidAuthType,
    InvalidExpiration,
    MissingFields,
    MissingTokens,
    NoSession,
    CreateFailed,
    UpdateFailed,
    MethodNotAllowed,
}

impl SessionApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            SessionApiError::InvalidBody
            | SessionApiError::InvalidAuthType
            | SessionApiError::InvalidExpiration
            | SessionApiError::MissingFields
            | SessionApiError::MissingTokens => StatusCode::BAD_REQUEST,
            SessionApiError::NoSession => StatusCode::UNAUTHORIZED,
            SessionApiError::CreateFailed | SessionApiError::UpdateFailed => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            SessionApiError::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
        }
    }

    pub fn message(&self) -> &'static str {
        match self {
            SessionApiError::InvalidBody => "Request body must be valid JSON",
            SessionApiError::InvalidAuthType => "authType must be one of: guest, user, admin",
            SessionApiError::InvalidExpiration => "expirationFromNow must be a number of seconds",
            SessionApiError::MissingFields => {
                "username, userId, accessToken and refreshToken are required"
            }
            SessionApiError::MissingTokens => "accessToken and refreshToken are required",
            SessionApiError::NoSession => "No session found",
            SessionApiError::CreateFailed => "Failed to create session",
            SessionApiError::UpdateFailed => "Failed to update session",
            SessionApiError::MethodNotAllowed => "Method not allowed",
        }
    }
}

impl IntoResponse for SessionApiError {
    fn into_response(self) -> Response {
        (self.status(), Json(json!({ "error": self.message() }))).into_response()
    }
}
