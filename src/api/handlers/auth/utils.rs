//! Small helpers for auth validation, password hashing, and token extraction.

use anyhow::{Result, anyhow};
use argon2::{
    Argon2, PasswordHash, PasswordHasher, PasswordVerifier,
    password_hash::{SaltString, rand_core::OsRng},
};
use axum::http::{HeaderMap, header::AUTHORIZATION};
use base64::Engine;
use rand::RngCore;
use regex::Regex;

/// Normalize an email for lookup/uniqueness checks.
pub(crate) fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Basic email format check on already-normalized input.
pub(crate) fn valid_email(email_normalized: &str) -> bool {
    Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").is_ok_and(|regex| regex.is_match(email_normalized))
}

/// Loose mobile number check: optional leading `+`, 7 to 15 digits.
pub(crate) fn valid_mobile(mobile: &str) -> bool {
    Regex::new(r"^\+?[0-9]{7,15}$").is_ok_and(|regex| regex.is_match(mobile))
}

/// Hash a password into a PHC string for storage.
///
/// # Errors
/// Returns an error if hashing fails.
pub(crate) fn hash_password(plain: &str) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(plain.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|err| anyhow!("failed to hash password: {err}"))
}

/// Constant-time comparison of a submitted password against a stored hash.
/// Malformed stored hashes read as a mismatch rather than an error.
pub(crate) fn verify_password(plain: &str, hash: &str) -> bool {
    PasswordHash::new(hash)
        .and_then(|parsed| Argon2::default().verify_password(plain.as_bytes(), &parsed))
        .is_ok()
}

/// Random unusable password placeholder for identities created through
/// federated login. Returned value is hashed before storage and never shown.
pub(crate) fn random_password() -> String {
    let mut bytes = [0u8; 16];
    rand::rngs::OsRng.fill_bytes(&mut bytes);
    base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(bytes)
}

/// Random URL-safe value used as the OAuth `state` parameter.
pub(crate) fn random_state_token() -> String {
    let mut bytes = [0u8; 24];
    rand::rngs::OsRng.fill_bytes(&mut bytes);
    base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(bytes)
}

/// Pull the access token out of an `Authorization: Bearer` header.
pub(crate) fn extract_bearer_token(headers: &HeaderMap) -> Option<String> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let trimmed = value.trim();
    let token = trimmed
        .strip_prefix("Bearer ")
        .or_else(|| trimmed.strip_prefix("bearer "))?
        .trim();
    if token.is_empty() {
        None
    } else {
        Some(token.to_string())
    }
}

/// Whether the header carries an `Authorization` value at all, regardless of
/// scheme. The gate distinguishes "no token" from "wrong scheme".
pub(crate) fn has_authorization_header(headers: &HeaderMap) -> bool {
    headers.contains_key(AUTHORIZATION)
}

pub(crate) fn is_unique_violation(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db_err) => db_err.code().is_some_and(|code| code.as_ref() == "23505"),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn normalize_email_trims_and_lowercases() {
        assert_eq!(normalize_email(" Alice@Example.COM "), "alice@example.com");
    }

    #[test]
    fn valid_email_accepts_basic_format() {
        assert!(valid_email("a@example.com"));
        assert!(valid_email("name.surname@example.co"));
    }

    #[test]
    fn valid_email_rejects_missing_parts() {
        assert!(!valid_email("not-an-email"));
        assert!(!valid_email("missing-at.example.com"));
        assert!(!valid_email("missing-domain@"));
    }

    #[test]
    fn valid_mobile_accepts_digit_strings() {
        assert!(valid_mobile("5551234567"));
        assert!(valid_mobile("+915551234567"));
        assert!(!valid_mobile("555-123"));
        assert!(!valid_mobile("abc"));
        assert!(!valid_mobile("123"));
    }

    #[test]
    fn password_hash_round_trips() -> anyhow::Result<()> {
        let hash = hash_password("hunter2")?;
        assert!(verify_password("hunter2", &hash));
        assert!(!verify_password("hunter3", &hash));
        Ok(())
    }

    #[test]
    fn verify_password_rejects_malformed_hash() {
        assert!(!verify_password("hunter2", "not-a-phc-string"));
    }

    #[test]
    fn random_password_is_unique_per_call() {
        assert_ne!(random_password(), random_password());
    }

    #[test]
    fn extract_bearer_token_handles_scheme_variants() {
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer abc"));
        assert_eq!(extract_bearer_token(&headers), Some("abc".to_string()));

        headers.insert(AUTHORIZATION, HeaderValue::from_static("bearer  xyz "));
        assert_eq!(extract_bearer_token(&headers), Some("xyz".to_string()));

        headers.insert(AUTHORIZATION, HeaderValue::from_static("Basic abc"));
        assert_eq!(extract_bearer_token(&headers), None);
        assert!(has_authorization_header(&headers));

        assert_eq!(extract_bearer_token(&HeaderMap::new()), None);
        assert!(!has_authorization_header(&HeaderMap::new()));
    }
}
