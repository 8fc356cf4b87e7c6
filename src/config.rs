//! Configuration
//!
//! Environment loading and the settings shared by the session server and the
//! client-side session core. Tunables that only matter to one component live
//! next to it (`SupervisorConfig`, `WsSocketConfig`).

use anyhow::{bail, Context, Result};
use std::{env, net::SocketAddr, path::Path};
use tracing::warn;

/// Secrets shorter than this are accepted but flagged
const RECOMMENDED_SECRET_LEN: usize = 32;

/// Load `.env` from the working directory (and parents) and the crate root.
pub fn load_env() {
    let _ = dotenv::dotenv();

    let manifest_dir = Path::new(env!("CARGO_MANIFEST_DIR"));
    let candidate = manifest_dir.join(".env");
    if candidate.exists() {
        let _ = dotenv::from_path(&candidate);
    }
}

/// Boolean environment flag ("1", "true", "on" are truthy)
pub fn env_flag(name: &str, default: bool) -> bool {
    env::var(name)
        .map(|v| matches!(v.trim(), "1" | "true" | "TRUE" | "on" | "ON"))
        .unwrap_or(default)
}

/// Session server settings
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Listen address
    pub addr: SocketAddr,
    /// Secret the cookie key is derived from
    pub secret: String,
    /// Issue cookies with `Secure` (TLS deployments)
    pub secure_cookies: bool,
}

impl ServerConfig {
    pub fn new(addr: SocketAddr, secret: String, secure_cookies: bool) -> Result<Self> {
        if secret.trim().is_empty() {
            bail!("SESSION_SECRET must not be empty");
        }
        if secret.len() < RECOMMENDED_SECRET_LEN {
            warn!(
                "⚠️  SESSION_SECRET is shorter than {} characters",
                RECOMMENDED_SECRET_LEN
            );
        }

        Ok(Self {
            addr,
            secret,
            secure_cookies,
        })
    }

    /// `SESSION_SERVER_ADDR` (default `0.0.0.0:3000`), `SESSION_SECRET`,
    /// `SESSION_COOKIE_SECURE`
    pub fn from_env() -> Result<Self> {
        let addr = env::var("SESSION_SERVER_ADDR")
            .unwrap_or_else(|_| "0.0.0.0:3000".to_string())
            .parse::<SocketAddr>()
            .context("Invalid SESSION_SERVER_ADDR")?;
        let secret = env::var("SESSION_SECRET").context("SESSION_SECRET is not set")?;

        Self::new(addr, secret, env_flag("SESSION_COOKIE_SECURE", false))
    }
}

/// Where the client-side session core finds its collaborators
#[derive(Debug, Clone)]
pub struct ClientEndpoints {
    /// Base URL of the session endpoints (`/session-check`, `/session`)
    pub session_base: String,
    /// Base URL of the user/auth API (pseudonyms, registration, refresh)
    pub api_base: String,
    /// Realtime websocket URL
    pub realtime_url: String,
}

impl ClientEndpoints {
    pub fn new(session_base: &str, api_base: &str, realtime_url: &str) -> Self {
        Self {
            session_base: session_base.trim_end_matches('/').to_string(),
            api_base: api_base.trim_end_matches('/').to_string(),
            realtime_url: realtime_url.to_string(),
        }
    }

    /// `SESSION_SERVER_URL`, `NEXTSPACE_API_URL`, `NEXTSPACE_REALTIME_URL`,
    /// each defaulting to a local development address
    pub fn from_env() -> Self {
        let session = env::var("SESSION_SERVER_URL")
            .unwrap_or_else(|_| "http://127.0.0.1:3000".to_string());
        let api = env::var("NEXTSPACE_API_URL")
            .unwrap_or_else(|_| "http://127.0.0.1:8000/api".to_string());
        let realtime = env::var("NEXTSPACE_REALTIME_URL")
            .unwrap_or_else(|_| "ws://127.0.0.1:8000/ws".to_string());

        Self::new(&session, &api, &realtime)
    }

    pub fn session_url(&self, path: &str) -> String {
        format!("{}{}", self.session_base, path)
    }

    pub fn api_url(&self, path: &str) -> String {
        format!("{}{}", self.api_base, path)
    }
}
