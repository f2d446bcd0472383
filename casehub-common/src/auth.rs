//! Password hashing and access-token signing
//!
//! Tokens are opaque to clients: a JSON claims blob, HMAC-SHA256 signed with
//! a key stored in the `settings` table (generated on first start). There is
//! no third-party token format; verification is stateless.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use sqlx::SqlitePool;

use crate::time::now_ms;
use crate::{Error, Result};

/// Token format version for forward compatibility
const TOKEN_VERSION: u8 = 1;

/// Signing key length in bytes
const SIGNING_KEY_LENGTH: usize = 32;

/// Access-token lifetime: 1 hour
pub const ACCESS_TOKEN_TTL_MS: i64 = 60 * 60 * 1000;

/// Refresh-token lifetime: 7 days
pub const REFRESH_TOKEN_TTL_MS: i64 = 7 * 24 * 60 * 60 * 1000;

// ========================================
// Password hashing
// ========================================

/// Hash a password with Argon2id and a random salt
pub fn hash_password(password: &str) -> Result<String> {
    use argon2::password_hash::{rand_core::OsRng, PasswordHasher, SaltString};
    use argon2::Argon2;

    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| Error::Internal(format!("password hashing failed: {}", e)))?;
    Ok(hash.to_string())
}

/// Verify a candidate password against a stored hash
pub fn verify_password(password: &str, stored_hash: &str) -> bool {
    use argon2::password_hash::{PasswordHash, PasswordVerifier};
    use argon2::Argon2;

    match PasswordHash::new(stored_hash) {
        Ok(parsed) => Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok(),
        Err(_) => false,
    }
}

// ========================================
// Token codec
// ========================================

/// What a token is good for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TokenKind {
    Access,
    Refresh,
}

/// Signed token claims
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenClaims {
    pub version: u8,
    pub user_id: String,
    pub kind: TokenKind,
    /// Expiry as unix epoch milliseconds
    pub expires_at: i64,
}

/// Token encoder/decoder with HMAC validation
#[derive(Clone)]
pub struct TokenCodec {
    key: [u8; SIGNING_KEY_LENGTH],
}

impl TokenCodec {
    /// Create a codec from a raw signing key
    pub fn new(key: [u8; SIGNING_KEY_LENGTH]) -> Self {
        Self { key }
    }

    /// Create a codec with a random key (tests)
    pub fn with_random_key() -> Self {
        use rand::RngCore;
        let mut key = [0u8; SIGNING_KEY_LENGTH];
        rand::thread_rng().fill_bytes(&mut key);
        Self { key }
    }

    /// Issue a token for a user
    pub fn issue(&self, user_id: &str, kind: TokenKind, ttl_ms: i64) -> String {
        let claims = TokenClaims {
            version: TOKEN_VERSION,
            user_id: user_id.to_string(),
            kind,
            expires_at: now_ms() + ttl_ms,
        };
        self.encode(&claims)
    }

    /// Encode claims as `base64(json)` + "." + `base64(hmac)`
    pub fn encode(&self, claims: &TokenClaims) -> String {
        // Serialization of TokenClaims cannot fail
        let payload = serde_json::to_vec(claims).unwrap_or_default();

        let mut mac = <Hmac<Sha256>>::new_from_slice(&self.key)
            .expect("HMAC accepts any key length");
        mac.update(&payload);
        let tag = mac.finalize().into_bytes();

        format!(
            "{}.{}",
            URL_SAFE_NO_PAD.encode(&payload),
            URL_SAFE_NO_PAD.encode(tag)
        )
    }

    /// Decode and validate a token
    ///
    /// Returns an error if the token is malformed, the signature does not
    /// match, the version is unsupported, or the token has expired.
    pub fn decode(&self, token: &str) -> Result<TokenClaims> {
        let (payload_b64, tag_b64) = token
            .split_once('.')
            .ok_or_else(|| Error::Unauthorized("malformed token".to_string()))?;

        let payload = URL_SAFE_NO_PAD
            .decode(payload_b64)
            .map_err(|_| Error::Unauthorized("malformed token".to_string()))?;
        let tag = URL_SAFE_NO_PAD
            .decode(tag_b64)
            .map_err(|_| Error::Unauthorized("malformed token".to_string()))?;

        let mut mac = <Hmac<Sha256>>::new_from_slice(&self.key)
            .expect("HMAC accepts any key length");
        mac.update(&payload);
        // verify_slice is constant-time
        mac.verify_slice(&tag)
            .map_err(|_| Error::Unauthorized("invalid token signature".to_string()))?;

        let claims: TokenClaims = serde_json::from_slice(&payload)
            .map_err(|_| Error::Unauthorized("malformed token".to_string()))?;

        if claims.version != TOKEN_VERSION {
            return Err(Error::Unauthorized(format!(
                "unsupported token version: {}",
                claims.version
            )));
        }
        if claims.expires_at < now_ms() {
            return Err(Error::Unauthorized("token expired".to_string()));
        }

        Ok(claims)
    }
}

// ========================================
// Signing key storage
// ========================================

/// Load the token signing key from the settings table
///
/// Key: `token_signing_key`, value: 64 hex chars. Generated and stored on
/// first start.
pub async fn load_signing_key(db: &SqlitePool) -> Result<[u8; SIGNING_KEY_LENGTH]> {
    let row: Option<(String,)> =
        sqlx::query_as("SELECT value FROM settings WHERE key = 'token_signing_key'")
            .fetch_optional(db)
            .await?;

    match row {
        Some((value,)) => parse_key_hex(&value),
        None => initialize_signing_key(db).await,
    }
}

/// Generate a random signing key and persist it
pub async fn initialize_signing_key(db: &SqlitePool) -> Result<[u8; SIGNING_KEY_LENGTH]> {
    use rand::RngCore;

    let mut key = [0u8; SIGNING_KEY_LENGTH];
    rand::thread_rng().fill_bytes(&mut key);

    sqlx::query("INSERT OR REPLACE INTO settings (key, value) VALUES ('token_signing_key', ?)")
        .bind(hex::encode(key))
        .execute(db)
        .await?;

    Ok(key)
}

fn parse_key_hex(value: &str) -> Result<[u8; SIGNING_KEY_LENGTH]> {
    let bytes = hex::decode(value)
        .map_err(|_| Error::Config("invalid token_signing_key".to_string()))?;
    bytes
        .try_into()
        .map_err(|_| Error::Config("invalid token_signing_key length".to_string()))
}
