//! One-time login codes and the OTP send/verify endpoints.
//!
//! Codes are 6-digit numerics stored in the shared [`TtlStore`] under
//! `otp:{code}` with a 5-minute default TTL. A successful verification
//! deletes the code (single use); a miss leaves any stored code untouched so
//! the user can retry until natural expiry.

use anyhow::Result;
use axum::{
    Json,
    extract::Extension,
    http::StatusCode,
    response::Response,
};
use rand::Rng;
use sqlx::PgPool;
use std::sync::Arc;
use std::time::Duration;
use tracing::error;

use crate::store::TtlStore;

use crate::api::outbound;

use super::login::issue_login_tokens;
use super::state::AuthState;
use super::storage::{find_by_email, find_by_mobile};
use super::types::{
    EmailOtpSendRequest, EmailOtpVerifyRequest, MobileOtpSendRequest, MobileOtpVerifyRequest,
    message_response,
};
use super::utils::normalize_email;

pub const DEFAULT_OTP_TTL_SECONDS: u64 = 300;

/// Outcome of checking a submitted code against the store.
#[derive(Debug, PartialEq, Eq)]
pub enum OtpVerification {
    Valid,
    Invalid,
    ExpiredOrNotFound,
}

impl OtpVerification {
    #[must_use]
    pub fn message(&self) -> &'static str {
        match self {
            Self::Valid => "OTP verified successfully.",
            Self::Invalid => "Invalid OTP.",
            Self::ExpiredOrNotFound => "OTP expired or not found.",
        }
    }
}

/// Expiring store for one-time codes.
///
/// Codes are keyed by their own value, so a wrong submission reads as a miss
/// and the outstanding code survives for retry within its TTL.
pub struct OtpStore {
    store: Arc<dyn TtlStore>,
    ttl: Duration,
}

impl OtpStore {
    #[must_use]
    pub fn new(store: Arc<dyn TtlStore>, ttl: Duration) -> Self {
        Self { store, ttl }
    }

    fn key(code: &str) -> String {
        format!("otp:{code}")
    }

    /// Store a freshly generated code with the configured TTL.
    ///
    /// # Errors
    /// Returns an error if the store write fails.
    pub async fn store_code(&self, code: &str) -> Result<()> {
        self.store.set(&Self::key(code), code, self.ttl).await
    }

    /// Check a submitted code. A match consumes the code.
    ///
    /// # Errors
    /// Returns an error if the store fails.
    pub async fn verify(&self, code: &str) -> Result<OtpVerification> {
        match self.store.get(&Self::key(code)).await? {
            None => Ok(OtpVerification::ExpiredOrNotFound),
            Some(stored) if stored == code => {
                self.store.delete(&Self::key(code)).await?;
                Ok(OtpVerification::Valid)
            }
            Some(_) => Ok(OtpVerification::Invalid),
        }
    }
}

/// Generate a 6-digit numeric code.
#[must_use]
pub fn generate_otp() -> String {
    rand::thread_rng().gen_range(100_000..1_000_000).to_string()
}

#[utoipa::path(
    post,
    path = "/v1/auth/login/email-otp/send",
    request_body = EmailOtpSendRequest,
    responses(
        (status = 200, description = "OTP dispatched to the email address"),
        (status = 400, description = "Missing email"),
        (status = 404, description = "No account for this email"),
        (status = 500, description = "OTP could not be stored or dispatched")
    ),
    tag = "auth"
)]
pub async fn send_email_otp(
    pool: Extension<PgPool>,
    auth_state: Extension<Arc<AuthState>>,
    payload: Option<Json<EmailOtpSendRequest>>,
) -> Response {
    let Some(Json(request)) = payload else {
        return message_response(StatusCode::BAD_REQUEST, "Email is required");
    };
    let email = normalize_email(&request.email);
    if email.is_empty() {
        return message_response(StatusCode::BAD_REQUEST, "Email is required");
    }

    let identity = match find_by_email(&pool, &email).await {
        Ok(Some(identity)) => identity,
        Ok(None) => {
            return message_response(StatusCode::NOT_FOUND, "User not found with this email");
        }
        Err(err) => {
            error!("OTP send lookup failed: {err}");
            return message_response(StatusCode::INTERNAL_SERVER_ERROR, "Error sending OTP");
        }
    };

    let code = generate_otp();
    if let Err(err) = auth_state.otp().store_code(&code).await {
        error!("Failed to store OTP: {err}");
        return message_response(StatusCode::INTERNAL_SERVER_ERROR, "Error storing OTP");
    }

    let message = outbound::login_otp_email(&identity.email, &code);
    match auth_state.dispatcher().submit(message) {
        // The code never appears in the response; delivery is out-of-band.
        Ok(_job_id) => {
            message_response(StatusCode::OK, "OTP sent successfully to your email")
        }
        Err(err) => {
            error!("Failed to enqueue OTP email: {err}");
            message_response(StatusCode::INTERNAL_SERVER_ERROR, "Error sending OTP via email")
        }
    }
}

#[utoipa::path(
    post,
    path = "/v1/auth/login/email-otp/verify",
    request_body = EmailOtpVerifyRequest,
    responses(
        (status = 200, description = "Login succeeded, tokens returned"),
        (status = 400, description = "Missing email or OTP"),
        (status = 401, description = "Code mismatch or expired"),
        (status = 404, description = "No account for this email")
    ),
    tag = "auth"
)]
pub async fn verify_email_otp(
    pool: Extension<PgPool>,
    auth_state: Extension<Arc<AuthState>>,
    payload: Option<Json<EmailOtpVerifyRequest>>,
) -> Response {
    let Some(Json(request)) = payload else {
        return message_response(StatusCode::BAD_REQUEST, "Email and OTP are required");
    };
    let email = normalize_email(&request.email);
    if email.is_empty() || request.otp.is_empty() {
        return message_response(StatusCode::BAD_REQUEST, "Email and OTP are required");
    }

    let verification = match auth_state.otp().verify(&request.otp).await {
        Ok(verification) => verification,
        Err(err) => {
            error!("OTP verification failed: {err}");
            return message_response(StatusCode::INTERNAL_SERVER_ERROR, "Error verifying OTP");
        }
    };
    if verification != OtpVerification::Valid {
        return message_response(StatusCode::UNAUTHORIZED, verification.message());
    }

    let identity = match find_by_email(&pool, &email).await {
        Ok(Some(identity)) => identity,
        Ok(None) => {
            return message_response(StatusCode::NOT_FOUND, "User not found with this email");
        }
        Err(err) => {
            error!("OTP verify lookup failed: {err}");
            return message_response(StatusCode::INTERNAL_SERVER_ERROR, "Error verifying OTP");
        }
    };

    issue_login_tokens(&pool, &auth_state, &identity, "Login successful with Email + OTP").await
}

#[utoipa::path(
    post,
    path = "/v1/auth/login/mobile-otp/send",
    request_body = MobileOtpSendRequest,
    responses(
        (status = 200, description = "OTP dispatched over SMS"),
        (status = 400, description = "Missing mobile number"),
        (status = 404, description = "No account for this mobile number"),
        (status = 500, description = "OTP could not be stored or dispatched")
    ),
    tag = "auth"
)]
pub async fn send_mobile_otp(
    pool: Extension<PgPool>,
    auth_state: Extension<Arc<AuthState>>,
    payload: Option<Json<MobileOtpSendRequest>>,
) -> Response {
    let Some(Json(request)) = payload else {
        return message_response(StatusCode::BAD_REQUEST, "Mobile number is required");
    };
    let mobile = request.mobile.trim();
    if mobile.is_empty() {
        return message_response(StatusCode::BAD_REQUEST, "Mobile number is required");
    }

    let identity = match find_by_mobile(&pool, mobile).await {
        Ok(Some(identity)) => identity,
        Ok(None) => {
            return message_response(
                StatusCode::NOT_FOUND,
                "User not found with this mobile number",
            );
        }
        Err(err) => {
            error!("OTP send lookup failed: {err}");
            return message_response(StatusCode::INTERNAL_SERVER_ERROR, "Error sending OTP");
        }
    };

    let code = generate_otp();
    if let Err(err) = auth_state.otp().store_code(&code).await {
        error!("Failed to store OTP: {err}");
        return message_response(StatusCode::INTERNAL_SERVER_ERROR, "Error storing OTP");
    }

    let Some(mobile) = identity.mobile.as_deref() else {
        return message_response(
            StatusCode::NOT_FOUND,
            "User not found with this mobile number",
        );
    };
    let message = outbound::login_otp_sms(mobile, &code);
    match auth_state.dispatcher().submit(message) {
        Ok(_job_id) => message_response(
            StatusCode::OK,
            "OTP sent successfully to your mobile number",
        ),
        Err(err) => {
            error!("Failed to enqueue OTP SMS: {err}");
            message_response(StatusCode::INTERNAL_SERVER_ERROR, "Error sending OTP via SMS")
        }
    }
}

#[utoipa::path(
    post,
    path = "/v1/auth/login/mobile-otp/verify",
    request_body = MobileOtpVerifyRequest,
    responses(
        (status = 200, description = "Login succeeded, tokens returned"),
        (status = 400, description = "Missing mobile number or OTP"),
        (status = 401, description = "Code mismatch or expired"),
        (status = 404, description = "No account for this mobile number")
    ),
    tag = "auth"
)]
pub async fn verify_mobile_otp(
    pool: Extension<PgPool>,
    auth_state: Extension<Arc<AuthState>>,
    payload: Option<Json<MobileOtpVerifyRequest>>,
) -> Response {
    let Some(Json(request)) = payload else {
        return message_response(StatusCode::BAD_REQUEST, "Mobile number and OTP are required");
    };
    let mobile = request.mobile.trim();
    if mobile.is_empty() || request.otp.is_empty() {
        return message_response(StatusCode::BAD_REQUEST, "Mobile number and OTP are required");
    }

    let verification = match auth_state.otp().verify(&request.otp).await {
        Ok(verification) => verification,
        Err(err) => {
            error!("OTP verification failed: {err}");
            return message_response(StatusCode::INTERNAL_SERVER_ERROR, "Error verifying OTP");
        }
    };
    if verification != OtpVerification::Valid {
        return message_response(StatusCode::UNAUTHORIZED, verification.message());
    }

    let identity = match find_by_mobile(&pool, mobile).await {
        Ok(Some(identity)) => identity,
        Ok(None) => {
            return message_response(
                StatusCode::NOT_FOUND,
                "User not found with this mobile number",
            );
        }
        Err(err) => {
            error!("OTP verify lookup failed: {err}");
            return message_response(StatusCode::INTERNAL_SERVER_ERROR, "Error verifying OTP");
        }
    };

    issue_login_tokens(&pool, &auth_state, &identity, "Login successful with Mobile + OTP").await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use anyhow::Result;

    fn otp_store(ttl: Duration) -> OtpStore {
        OtpStore::new(Arc::new(MemoryStore::new()), ttl)
    }

    #[test]
    fn generated_codes_are_six_digits() {
        for _ in 0..32 {
            let code = generate_otp();
            assert_eq!(code.len(), 6);
            assert!(code.chars().all(|c| c.is_ascii_digit()));
        }
    }

    #[tokio::test]
    async fn correct_code_verifies_once_then_misses() -> Result<()> {
        let store = otp_store(Duration::from_secs(300));
        store.store_code("123456").await?;

        assert_eq!(store.verify("123456").await?, OtpVerification::Valid);
        // Single use: the same code is gone after a successful match.
        assert_eq!(
            store.verify("123456").await?,
            OtpVerification::ExpiredOrNotFound
        );
        Ok(())
    }

    #[tokio::test]
    async fn wrong_code_misses_and_leaves_stored_code_valid() -> Result<()> {
        let store = otp_store(Duration::from_secs(300));
        store.store_code("123456").await?;

        assert_eq!(
            store.verify("654321").await?,
            OtpVerification::ExpiredOrNotFound
        );
        // The stored code is untouched and still verifies.
        assert_eq!(store.verify("123456").await?, OtpVerification::Valid);
        Ok(())
    }

    #[tokio::test]
    async fn expired_code_is_rejected_even_if_correct() -> Result<()> {
        let store = otp_store(Duration::ZERO);
        store.store_code("123456").await?;

        assert_eq!(
            store.verify("123456").await?,
            OtpVerification::ExpiredOrNotFound
        );
        Ok(())
    }

    #[test]
    fn verification_messages_match_flow_responses() {
        assert_eq!(OtpVerification::Invalid.message(), "Invalid OTP.");
        assert_eq!(
            OtpVerification::ExpiredOrNotFound.message(),
            "OTP expired or not found."
        );
    }
}
