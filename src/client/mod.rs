//! Client-side session core
//!
//! - `lifecycle`: restores or creates the browser's identity
//! - `http`: reqwest implementations of the collaborators
//! - `refresh`: single-flight token refresh shared by all triggers

pub mod collaborators;
pub mod credentials;
pub mod error;
pub mod http;
pub mod lifecycle;
pub mod refresh;
pub mod single_flight;

pub use collaborators::{
    GuestProvisioner, GuestRegistration, RegisteredUser, SessionBackend, TokenRefresher,
};
pub use credentials::{CredentialReader, CredentialStore};
pub use error::{RefreshError, SessionError};
pub use http::{build_http_client, HttpGuestProvisioner, HttpSessionBackend, HttpTokenRefresher};
pub use lifecycle::{
    LoginGrant, RestoreOptions, SessionInfo, SessionManager, SessionSnapshot, SessionState,
};
pub use refresh::{RefreshOutcome, RefreshTrigger, SharedRefresher};
pub use single_flight::SingleFlight;
