//! Outbound-request credential store.
//!
//! `CredentialStore` is the write handle, held by the session manager and the
//! refresh path. Everything else gets a `CredentialReader`.

use crate::auth::models::SessionTokens;
use parking_lot::RwLock;
use std::sync::Arc;
use tracing::debug;

#[derive(Debug, Default)]
struct Slot {
    tokens: Option<SessionTokens>,
    version: u64,
}

/// Write handle to the current access/refresh pair
#[derive(Debug, Clone, Default)]
pub struct CredentialStore {
    slot: Arc<RwLock<Slot>>,
}

impl CredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_tokens(&self, tokens: SessionTokens) {
        let mut slot = self.slot.write();
        slot.tokens = Some(tokens);
        slot.version += 1;
        debug!(version = slot.version, "Credentials replaced");
    }

    pub fn clear(&self) {
        let mut slot = self.slot.write();
        if slot.tokens.take().is_some() {
            slot.version += 1;
            debug!(version = slot.version, "Credentials cleared");
        }
    }

    pub fn tokens(&self) -> Option<SessionTokens> {
        self.slot.read().tokens.clone()
    }

    /// Read-only view sharing the same slot
    pub fn reader(&self) -> CredentialReader {
        CredentialReader {
            slot: self.slot.clone(),
        }
    }
}

/// Read-only view of the credential store
#[derive(Debug, Clone)]
pub struct CredentialReader {
    slot: Arc<RwLock<Slot>>,
}

impl CredentialReader {
    pub fn tokens(&self) -> Option<SessionTokens> {
        self.slot.read().tokens.clone()
    }

    pub fn access_token(&self) -> Option<String> {
        self.slot
            .read()
            .tokens
            .as_ref()
            .map(|t| t.access_token.clone())
            .filter(|t| !t.is_empty())
    }

    /// Bumped on every write; lets callers detect a swap without comparing secrets
    pub fn version(&self) -> u64 {
        self.slot.read().version
    }
}
