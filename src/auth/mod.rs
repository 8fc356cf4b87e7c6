//! Session Cookie Module
//! Mission: Seal session claims into an opaque cookie and serve the endpoints
//! that mint, rotate and inspect it

pub mod api;
pub mod codec;
pub mod models;

pub use api::{session_router, SessionApiError, SessionApiState};
pub use codec::{CodecError, CookieCodec};
pub use models::{AuthType, SessionClaims, SessionTokens, SESSION_COOKIE_NAME};
