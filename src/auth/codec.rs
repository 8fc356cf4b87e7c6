//! Session Cookie Codec
//! Mission: Seal and open session claims with authenticated encryption

use crate::auth::models::SessionClaims;
use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Nonce,
};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use rand::RngCore;
use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::debug;

const NONCE_LEN: usize = 12;

/// Codec failures
#[derive(Debug, Error)]
pub enum CodecError {
    /// The value was tampered with, sealed under another key, or is not a
    /// claims record at all.
    #[error("session cookie failed integrity check")]
    Integrity,
    #[error("failed to seal session claims: {0}")]
    Encode(String),
}

/// Seals claims into opaque cookie values and opens them again
pub struct CookieCodec {
    cipher: Aes256Gcm,
}

impl CookieCodec {
    /// Create a codec keyed by the server-held secret
    pub fn new(secret: &str) -> Self {
        let key = Sha256::digest(secret.as_bytes());
        Self {
            cipher: Aes256Gcm::new(&key),
        }
    }

    /// Seal claims into `base64url(nonce || ciphertext)`
    pub fn encode(&self, claims: &SessionClaims) -> Result<String, CodecError> {
        let plaintext =
            serde_json::to_vec(claims).map_err(|e| CodecError::Encode(e.to_string()))?;

        let mut nonce_bytes = [0u8; NONCE_LEN];
        rand::thread_rng().fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let ciphertext = self
            .cipher
            .encrypt(nonce, plaintext.as_ref())
            .map_err(|_| CodecError::Encode("encryption failed".to_string()))?;

        let mut sealed = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        sealed.extend_from_slice(&nonce_bytes);
        sealed.extend_from_slice(&ciphertext);

        debug!(
            "Sealed session cookie for {} ({}), expires at {}",
            claims.sub,
            claims.auth_type.as_str(),
            claims.exp
        );

        Ok(URL_SAFE_NO_PAD.encode(sealed))
    }

    /// Open a cookie value. Any failure yields `CodecError::Integrity`; partial
    /// claims are never returned. Expiry is not checked here.
    pub fn decode(&self, value: &str) -> Result<SessionClaims, CodecError> {
        let sealed = URL_SAFE_NO_PAD
            .decode(value.trim())
            .map_err(|_| CodecError::Integrity)?;

        if sealed.len() <= NONCE_LEN {
            return Err(CodecError::Integrity);
        }

        let (nonce_bytes, ciphertext) = sealed.split_at(NONCE_LEN);
        let plaintext = self
            .cipher
            .decrypt(Nonce::from_slice(nonce_bytes), ciphertext)
            .map_err(|_| CodecError::Integrity)?;

        serde_json::from_slice::<SessionClaims>(&plaintext).map_err(|_| CodecError::Integrity)
    }
}
