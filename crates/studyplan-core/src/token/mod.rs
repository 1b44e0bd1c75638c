//! Signed bearer tokens.
//!
//! Tokens are HMAC-SHA256 based, bound to a user and an expiry time.
//! Format: `sp_<kind>_<user_id>_<expires_unix>_<hmac_hex>` where `kind` is
//! `at` (access) or `rt` (refresh). The HMAC covers
//! `<kind>:<user_id>:<expires_unix>`.

use chrono::{DateTime, Duration, Utc};
use hmac::{Hmac, Mac};
use rand::Rng;
use serde::Serialize;
use sha2::{Digest, Sha256};
use uuid::Uuid;

type HmacSha256 = Hmac<Sha256>;

const TOKEN_PREFIX: &str = "sp_";
const UUID_LEN: usize = 36;

pub const DEFAULT_ACCESS_TTL_MINUTES: i64 = 60;
pub const DEFAULT_REFRESH_TTL_DAYS: i64 = 7;

/// Environment variable holding the hex-encoded signing secret.
pub const TOKEN_SECRET_ENV: &str = "STUDYPLAN_TOKEN_SECRET";

#[derive(Debug, thiserror::Error)]
pub enum TokenError {
    #[error("invalid token format: {0}")]
    InvalidFormat(String),

    #[error("invalid user ID in token: {0}")]
    InvalidUserId(String),

    #[error("expected {expected} token, got {actual}")]
    WrongKind { expected: TokenKind, actual: TokenKind },

    #[error("token HMAC verification failed")]
    HmacMismatch,

    #[error("token expired")]
    Expired,

    #[error("missing token secret")]
    MissingSecret,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    Access,
    Refresh,
}

impl TokenKind {
    fn tag(self) -> &'static str {
        match self {
            Self::Access => "at",
            Self::Refresh => "rt",
        }
    }

    fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "at" => Some(Self::Access),
            "rt" => Some(Self::Refresh),
            _ => None,
        }
    }
}

impl std::fmt::Display for TokenKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Access => "access",
            Self::Refresh => "refresh",
        })
    }
}

/// Signing secret and lifetimes.
#[derive(Clone)]
pub struct TokenConfig {
    pub secret: Vec<u8>,
    pub access_ttl: Duration,
    pub refresh_ttl: Duration,
}

impl std::fmt::Debug for TokenConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenConfig")
            .field("access_ttl", &self.access_ttl)
            .field("refresh_ttl", &self.refresh_ttl)
            .finish_non_exhaustive()
    }
}

impl TokenConfig {
    pub fn new(secret: Vec<u8>) -> Self {
        Self {
            secret,
            access_ttl: Duration::minutes(DEFAULT_ACCESS_TTL_MINUTES),
            refresh_ttl: Duration::days(DEFAULT_REFRESH_TTL_DAYS),
        }
    }

    /// Decode a hex secret as written by `studyplan init`.
    pub fn from_hex(secret_hex: &str) -> Result<Self, TokenError> {
        let secret = hex::decode(secret_hex.trim())
            .map_err(|e| TokenError::InvalidFormat(format!("token secret is not valid hex: {e}")))?;
        if secret.is_empty() {
            return Err(TokenError::MissingSecret);
        }
        Ok(Self::new(secret))
    }

    pub fn from_env() -> Result<Self, TokenError> {
        let secret_hex = std::env::var(TOKEN_SECRET_ENV).map_err(|_| TokenError::MissingSecret)?;
        Self::from_hex(&secret_hex)
    }

    fn ttl(&self, kind: TokenKind) -> Duration {
        match kind {
            TokenKind::Access => self.access_ttl,
            TokenKind::Refresh => self.refresh_ttl,
        }
    }
}

/// Claims carried by a validated token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenClaims {
    pub kind: TokenKind,
    pub user_id: Uuid,
    pub expires_at: DateTime<Utc>,
}

/// An access token and the refresh token that renews it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TokenPair {
    pub access: String,
    pub refresh: String,
}

pub fn issue_pair(config: &TokenConfig, user_id: Uuid) -> Result<TokenPair, TokenError> {
    let now = Utc::now();
    Ok(TokenPair {
        access: generate_token_at(config, TokenKind::Access, user_id, now)?,
        refresh: generate_token_at(config, TokenKind::Refresh, user_id, now)?,
    })
}

pub fn generate_token(
    config: &TokenConfig,
    kind: TokenKind,
    user_id: Uuid,
) -> Result<String, TokenError> {
    generate_token_at(config, kind, user_id, Utc::now())
}

/// Generate a token as if issued at `now`.
pub fn generate_token_at(
    config: &TokenConfig,
    kind: TokenKind,
    user_id: Uuid,
    now: DateTime<Utc>,
) -> Result<String, TokenError> {
    let expires = (now + config.ttl(kind)).timestamp();
    let tag = kind.tag();
    let mac = compute_hmac(&config.secret, signed_message(tag, user_id, expires).as_bytes())?;
    Ok(format!(
        "{TOKEN_PREFIX}{tag}_{user_id}_{expires}_{}",
        hex::encode(mac)
    ))
}

pub fn validate_token(
    config: &TokenConfig,
    expected: TokenKind,
    token: &str,
) -> Result<TokenClaims, TokenError> {
    validate_token_at(config, expected, token, Utc::now())
}

/// Validate a token against the clock value `now`.
///
/// The signature is checked before the kind and the expiry, so a forged
/// token never reveals anything beyond "HMAC mismatch".
pub fn validate_token_at(
    config: &TokenConfig,
    expected: TokenKind,
    token: &str,
    now: DateTime<Utc>,
) -> Result<TokenClaims, TokenError> {
    let rest = token
        .strip_prefix(TOKEN_PREFIX)
        .ok_or_else(|| TokenError::InvalidFormat(format!("token must start with {TOKEN_PREFIX:?}")))?;

    let (tag, rest) = rest
        .split_once('_')
        .ok_or_else(|| TokenError::InvalidFormat("missing token kind".to_string()))?;
    let kind = TokenKind::from_tag(tag)
        .ok_or_else(|| TokenError::InvalidFormat(format!("unknown token kind {tag:?}")))?;

    if rest.len() < UUID_LEN || !rest.is_char_boundary(UUID_LEN) {
        return Err(TokenError::InvalidFormat(
            "token too short to contain a valid UUID".to_string(),
        ));
    }
    let (user_str, rest) = rest.split_at(UUID_LEN);
    let user_id = Uuid::parse_str(user_str).map_err(|e| TokenError::InvalidUserId(e.to_string()))?;

    let (expires_str, hmac_hex) = rest
        .strip_prefix('_')
        .and_then(|r| r.split_once('_'))
        .ok_or_else(|| TokenError::InvalidFormat("expected _<expires>_<hmac>".to_string()))?;
    let expires: i64 = expires_str
        .parse()
        .map_err(|e| TokenError::InvalidFormat(format!("invalid expiry: {e}")))?;

    let provided_mac = hex::decode(hmac_hex)
        .map_err(|e| TokenError::InvalidFormat(format!("invalid hex in hmac: {e}")))?;

    let mut mac = HmacSha256::new_from_slice(&config.secret).map_err(|_| TokenError::MissingSecret)?;
    mac.update(signed_message(tag, user_id, expires).as_bytes());
    mac.verify_slice(&provided_mac)
        .map_err(|_| TokenError::HmacMismatch)?;

    if kind != expected {
        return Err(TokenError::WrongKind {
            expected,
            actual: kind,
        });
    }

    let expires_at = DateTime::from_timestamp(expires, 0)
        .ok_or_else(|| TokenError::InvalidFormat("expiry out of range".to_string()))?;
    if expires_at <= now {
        return Err(TokenError::Expired);
    }

    Ok(TokenClaims {
        kind,
        user_id,
        expires_at,
    })
}

/// SHA-256 hex digest of a token, the form stored in the revocation list.
pub fn token_digest(token: &str) -> String {
    hex::encode(Sha256::digest(token.as_bytes()))
}

/// Generate a fresh random signing secret, hex-encoded.
pub fn generate_secret() -> String {
    let mut bytes = [0u8; 32];
    rand::rng().fill(&mut bytes);
    hex::encode(bytes)
}

fn signed_message(tag: &str, user_id: Uuid, expires: i64) -> String {
    format!("{tag}:{user_id}:{expires}")
}

fn compute_hmac(key: &[u8], message: &[u8]) -> Result<Vec<u8>, TokenError> {
    let mut mac = HmacSha256::new_from_slice(key).map_err(|_| TokenError::MissingSecret)?;
    mac.update(message);
    Ok(mac.finalize().into_bytes().to_vec())
}
