//! Client-side session errors

use thiserror::Error;

/// Failures of the session lifecycle. `Clone` so one in-flight restoration
/// can hand the same outcome to every waiting caller.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SessionError {
    #[error("request to {endpoint} failed: {reason}")]
    Transport { endpoint: String, reason: String },

    #[error("{endpoint} responded with status {status}")]
    Status { endpoint: String, status: u16 },

    #[error("malformed response from {0}")]
    Protocol(String),

    #[error("guest creation failed: {0}")]
    GuestCreation(String),

    #[error("no session identity available")]
    NoIdentity,
}

/// Failures of a token refresh attempt
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RefreshError {
    #[error("no refresh token available")]
    NoRefreshToken,

    #[error("refresh request failed: {0}")]
    Transport(String),

    #[error("refresh endpoint responded with status {0}")]
    Status(u16),

    #[error("malformed refresh response: {0}")]
    Protocol(String),
}
