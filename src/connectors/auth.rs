// src/connectors/auth.rs
//! Kraken request authentication: credentials, nonces and `API-Sign`.

use crate::error::{TradingError, TradingResult};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use chrono::Utc;
use hmac::{Hmac, Mac};
use secrecy::{ExposeSecret, SecretString};
use sha2::{Digest, Sha256, Sha512};
use std::sync::atomic::{AtomicU64, Ordering};

type HmacSha512 = Hmac<Sha512>;

/// API key plus the base64 private key. The secret never shows up in `Debug`.
#[derive(Clone)]
pub struct Credentials {
    api_key: String,
    private_key: SecretString,
}

impl Credentials {
    /// Fails with `InvalidKeyFormat` when the private key is not base64, so a
    /// bad secret is caught at startup instead of on the first order.
    pub fn new(api_key: impl Into<String>, private_key: impl Into<String>) -> TradingResult<Self> {
        let private_key: String = private_key.into();
        decode_secret(&private_key)?;
        Ok(Self {
            api_key: api_key.into(),
            private_key: SecretString::from(private_key),
        })
    }

    pub fn api_key(&self) -> &str {
        &self.api_key
    }

    /// Only for signing. Never log the return value.
    pub fn expose_secret(&self) -> &str {
        self.private_key.expose_secret()
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("api_key", &self.api_key)
            .field("private_key", &"[REDACTED]")
            .finish()
    }
}

fn decode_secret(secret: &str) -> TradingResult<Vec<u8>> {
    BASE64
        .decode(secret.trim())
        .map_err(|e| TradingError::InvalidKeyFormat(e.to_string()))
}

/// Computes the `API-Sign` header value:
/// `base64(HMAC-SHA512(path + SHA256(nonce + urlencode(params)), base64decode(secret)))`.
///
/// `params` is the full form body in send order, nonce included.
pub fn sign(path: &str, params: &[(String, String)], nonce: u64, secret: &str) -> TradingResult<String> {
    let key = decode_secret(secret)?;
    let encoded = serde_urlencoded::to_string(params)
        .map_err(|e| TradingError::Transport(format!("cannot encode request body: {}", e)))?;

    let mut sha = Sha256::new();
    sha.update(nonce.to_string().as_bytes());
    sha.update(encoded.as_bytes());
    let digest = sha.finalize();

    let mut mac = HmacSha512::new_from_slice(&key)
        .map_err(|e| TradingError::InvalidKeyFormat(e.to_string()))?;
    mac.update(path.as_bytes());
    mac.update(&digest);

    Ok(BASE64.encode(mac.finalize().into_bytes()))
}

/// Strictly increasing nonce source seeded from wall-clock milliseconds.
///
/// Each call returns `max(last + 1, now_ms)`, so clock steps backwards or
/// two calls in the same millisecond still yield distinct, growing values.
#[derive(Debug)]
pub struct NonceSource {
    last: AtomicU64,
}

impl NonceSource {
    pub fn new() -> Self {
        Self::starting_at(now_ms())
    }

    pub fn starting_at(seed: u64) -> Self {
        Self {
            last: AtomicU64::new(seed),
        }
    }

    pub fn next(&self) -> u64 {
        let target = now_ms();
        loop {
            let current = self.last.load(Ordering::Acquire);
            let next = current.saturating_add(1).max(target);
            match self
                .last
                .compare_exchange_weak(current, next, Ordering::AcqRel, Ordering::Acquire)
            {
                Ok(_) => return next,
                Err(_) => continue,
            }
        }
    }
}

impl Default for NonceSource {
    fn default() -> Self {
        Self::new()
    }
}

fn now_ms() -> u64 {
    Utc::now().timestamp_millis().max(0) as u64
}
