//! Password hashing with PBKDF2-HMAC-SHA256.
//!
//! Stored form: `pbkdf2_sha256$<iterations>$<salt_hex>$<hash_hex>`.

use hmac::{Hmac, Mac};
use rand::Rng;
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

const ALGORITHM: &str = "pbkdf2_sha256";
pub const DEFAULT_ITERATIONS: u32 = 600_000;
const SALT_LEN: usize = 16;
const HASH_LEN: usize = 32;
pub const MIN_PASSWORD_CHARS: usize = 8;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PasswordError {
    #[error("passwords do not match")]
    Mismatch,

    #[error("password must be at least {MIN_PASSWORD_CHARS} characters")]
    TooShort,

    #[error("password must not be entirely numeric")]
    AllDigits,

    #[error("malformed password hash: {0}")]
    MalformedHash(String),

    #[error("iteration count must be positive")]
    ZeroIterations,
}

/// Check a new password and its confirmation.
pub fn validate_new_password(password: &str, confirmation: &str) -> Result<(), PasswordError> {
    if password != confirmation {
        return Err(PasswordError::Mismatch);
    }
    if password.chars().count() < MIN_PASSWORD_CHARS {
        return Err(PasswordError::TooShort);
    }
    if password.chars().all(|c| c.is_ascii_digit()) {
        return Err(PasswordError::AllDigits);
    }
    Ok(())
}

/// Hash a password with a fresh random salt.
pub fn hash_password(password: &str, iterations: u32) -> Result<String, PasswordError> {
    if iterations == 0 {
        return Err(PasswordError::ZeroIterations);
    }
    let mut salt = [0u8; SALT_LEN];
    rand::rng().fill(&mut salt);
    let hash = pbkdf2_sha256(password.as_bytes(), &salt, iterations);
    Ok(format!(
        "{ALGORITHM}${iterations}${}${}",
        hex::encode(salt),
        hex::encode(hash)
    ))
}

/// A well-formed stored hash that no password matches. Verifying against it
/// costs the same as a real check.
pub fn dummy_hash(iterations: u32) -> String {
    format!(
        "{ALGORITHM}${}${}${}",
        iterations.max(1),
        hex::encode([0u8; SALT_LEN]),
        hex::encode([0u8; HASH_LEN])
    )
}

/// Check a password against a stored hash.
///
/// Returns `Ok(false)` on a wrong password and `Err` only when the stored
/// value cannot be parsed.
pub fn verify_password(password: &str, stored: &str) -> Result<bool, PasswordError> {
    let malformed = |what: &str| PasswordError::MalformedHash(what.to_owned());

    let mut parts = stored.split('$');
    let (Some(algorithm), Some(iterations), Some(salt), Some(hash), None) = (
        parts.next(),
        parts.next(),
        parts.next(),
        parts.next(),
        parts.next(),
    ) else {
        return Err(malformed("expected four `$`-separated fields"));
    };

    if algorithm != ALGORITHM {
        return Err(malformed("unsupported algorithm"));
    }
    let iterations: u32 = iterations
        .parse()
        .map_err(|_| malformed("invalid iteration count"))?;
    if iterations == 0 {
        return Err(PasswordError::ZeroIterations);
    }
    let salt = hex::decode(salt).map_err(|_| malformed("salt is not hex"))?;
    let expected = hex::decode(hash).map_err(|_| malformed("hash is not hex"))?;

    let actual = pbkdf2_sha256(password.as_bytes(), &salt, iterations);
    Ok(constant_time_eq(&actual, &expected))
}

/// PBKDF2 (RFC 8018) with HMAC-SHA256 and a single output block.
fn pbkdf2_sha256(password: &[u8], salt: &[u8], iterations: u32) -> [u8; HASH_LEN] {
    // HMAC accepts keys of any length, so this cannot fail.
    let Ok(prf) = HmacSha256::new_from_slice(password) else {
        return [0u8; HASH_LEN];
    };

    let mut mac = prf.clone();
    mac.update(salt);
    mac.update(&1u32.to_be_bytes());
    let mut block = [0u8; HASH_LEN];
    block.copy_from_slice(&mac.finalize().into_bytes());
    let mut out = block;

    for _ in 1..iterations {
        let mut mac = prf.clone();
        mac.update(&block);
        block.copy_from_slice(&mac.finalize().into_bytes());
        for (o, b) in out.iter_mut().zip(block.iter()) {
            *o ^= b;
        }
    }

    out
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pbkdf2_known_vectors() {
        assert_eq!(
            hex::encode(pbkdf2_sha256(b"password", b"salt", 1)),
            "120fb6cffcf8b32c43e7225256c4f837a86548c92ccc35480805987cb70be17b"
        );
        assert_eq!(
            hex::encode(pbkdf2_sha256(b"password", b"salt", 2)),
            "ae4d0c95af6b46d32d0adff928f06dd02a303f8ef3c251dfd6e2d85a95474c43"
        );
        assert_eq!(
            hex::encode(pbkdf2_sha256(b"password", b"salt", 4096)),
            "c5e478d59288c841aa530db6845c4c8d962893a001ce4e11a4963873aa98134a"
        );
    }

    #[test]
    fn hash_and_verify() {
        let stored = hash_password("correct horse", 1_000).unwrap();
        assert!(stored.starts_with("pbkdf2_sha256$1000$"));
        assert!(verify_password("correct horse", &stored).unwrap());
        assert!(!verify_password("wrong horse", &stored).unwrap());
    }

    #[test]
    fn dummy_hash_never_matches() {
        let dummy = dummy_hash(1_000);
        assert!(dummy.starts_with("pbkdf2_sha256$1000$"));
        assert_eq!(verify_password("", &dummy), Ok(false));
        assert_eq!(verify_password("correct horse", &dummy), Ok(false));
        assert_eq!(verify_password("x", &dummy_hash(0)), Ok(false));
    }

    #[test]
    fn salts_differ() {
        let a = hash_password("same", 10).unwrap();
        let b = hash_password("same", 10).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn malformed_hashes() {
        for bad in [
            "",
            "pbkdf2_sha256$10$00",
            "bcrypt$10$00$00",
            "pbkdf2_sha256$ten$00$00",
            "pbkdf2_sha256$10$zz$00",
            "pbkdf2_sha256$10$00$00$extra",
        ] {
            assert!(
                matches!(verify_password("x", bad), Err(PasswordError::MalformedHash(_))),
                "{bad:?}"
            );
        }
        assert_eq!(
            verify_password("x", "pbkdf2_sha256$0$00$00"),
            Err(PasswordError::ZeroIterations)
        );
        assert_eq!(hash_password("x", 0), Err(PasswordError::ZeroIterations));
    }

    #[test]
    fn new_password_rules() {
        assert_eq!(validate_new_password("abcdefgh", "abcdefgh"), Ok(()));
        assert_eq!(
            validate_new_password("abcdefgh", "abcdefgi"),
            Err(PasswordError::Mismatch)
        );
        assert_eq!(
            validate_new_password("abc", "abc"),
            Err(PasswordError::TooShort)
        );
        assert_eq!(
            validate_new_password("12345678", "12345678"),
            Err(PasswordError::AllDigits)
        );
    }
}
