//! Session Models
//! Mission: Define the session claims sealed into the cookie and the wire shapes
//! of the session endpoints

use serde::{Deserialize, Serialize};

/// Name of the cookie carrying the sealed session claims
pub const SESSION_COOKIE_NAME: &str = "nextspace-session";

/// Default session lifetime (30 days)
pub const DEFAULT_SESSION_TTL_SECS: i64 = 30 * 24 * 60 * 60;

/// Kind of identity a session belongs to
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
pub enum AuthType {
    #[serde(rename = "guest")]
    #[default]
    Guest, // Auto-provisioned pseudonym
    #[serde(rename = "user")]
    User, // Registered account
    #[serde(rename = "admin")]
    Admin, // Administrator
}

impl AuthType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuthType::Guest => "guest",
            AuthType::User => "user",
            AuthType::Admin => "admin",
        }
    }

    /// Strict parse: only the exact lowercase wire names are accepted.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "guest" => Some(AuthType::Guest),
            "user" => Some(AuthType::User),
            "admin" => Some(AuthType::Admin),
            _ => None,
        }
    }

    pub fn is_guest(&self) -> bool {
        matches!(self, AuthType::Guest)
    }
}

/// Claims sealed inside the session cookie
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SessionClaims {
    pub access: String,
    pub refresh: String,
    #[serde(rename = "userId")]
    pub user_id: String,
    #[serde(rename = "authType", default)]
    pub auth_type: AuthType,
    pub sub: String, // username
    pub iat: i64,    // issued at, unix seconds
    pub exp: i64,    // absolute expiration, unix seconds
}

impl SessionClaims {
    /// Fresh claims for a newly created session
    pub fn issue(
        tokens: SessionTokens,
        user_id: String,
        username: String,
        auth_type: AuthType,
        now: i64,
        ttl_secs: i64,
    ) -> Self {
        Self {
            access: tokens.access_token,
            refresh: tokens.refresh_token,
            user_id,
            auth_type,
            sub: username,
            iat: now,
            exp: now.saturating_add(ttl_secs),
        }
    }

    /// Replace only the token material. Identity and the absolute expiration
    /// are carried forward verbatim.
    pub fn with_rotated_tokens(&self, tokens: SessionTokens, now: i64) -> Self {
        Self {
            access: tokens.access_token,
            refresh: tokens.refresh_token,
            user_id: self.user_id.clone(),
            auth_type: self.auth_type,
            sub: self.sub.clone(),
            iat: now,
            exp: self.exp,
        }
    }

    /// Seconds left before the absolute expiration, never negative
    pub fn remaining_secs(&self, now: i64) -> i64 {
        (self.exp - now).max(0)
    }

    pub fn is_expired(&self, now: i64) -> bool {
        self.exp <= now
    }

    pub fn tokens(&self) -> SessionTokens {
        SessionTokens {
            access_token: self.access.clone(),
            refresh_token: self.refresh.clone(),
        }
    }
}

/// Access/refresh token pair
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SessionTokens {
    pub access_token: String,
    pub refresh_token: String,
}

/// Body of POST /session
///
/// Fields are optional at the serde level so that missing or mistyped values
/// surface as validation failures rather than extractor rejections.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateSessionRequest {
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub access_token: Option<String>,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub auth_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiration_from_now: Option<serde_json::Value>,
}

/// Body of PATCH /session
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateSessionRequest {
    #[serde(default)]
    pub access_token: Option<String>,
    #[serde(default)]
    pub refresh_token: Option<String>,
}

/// Success body of the session endpoints
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageResponse {
    pub message: String,
}

/// Result of GET /session-check
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SessionCheckStatus {
    Valid,
    Missing,
    Invalid,
}

/// Body of GET /session-check
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionCheckResponse {
    pub status: SessionCheckStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tokens: Option<SessionTokens>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth_type: Option<AuthType>,
}

impl SessionCheckResponse {
    pub fn valid(claims: &SessionClaims) -> Self {
        Self {
            status: SessionCheckStatus::Valid,
            tokens: Some(claims.tokens()),
            username: Some(claims.sub.clone()),
            user_id: Some(claims.user_id.clone()),
            auth_type: Some(claims.auth_type),
        }
    }

    pub fn without_session(status: SessionCheckStatus) -> Self {
        Self {
            status,
            tokens: None,
            username: None,
            user_id: None,
            auth_type: None,
        }
    }
}
