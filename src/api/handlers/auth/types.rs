//! Request/response types and response envelopes for auth endpoints.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use utoipa::{IntoParams, ToSchema};

/// Machine-readable codes carried by 401 responses so clients can tell
/// "expired, refresh and retry" apart from "invalid, force re-login".
pub const CODE_TOKEN_EXPIRED: &str = "TOKEN_EXPIRED";
pub const CODE_TOKEN_REVOKED: &str = "TOKEN_REVOKED";
pub const CODE_REFRESH_TOKEN_EXPIRED: &str = "REFRESH_TOKEN_EXPIRED";
pub const CODE_INVALID_REFRESH_TOKEN: &str = "INVALID_REFRESH_TOKEN";
pub const CODE_NO_REFRESH_TOKEN: &str = "NO_REFRESH_TOKEN_IN_DB";
pub const CODE_FORBIDDEN: &str = "FORBIDDEN";

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct RegisterRequest {
    pub name: String,
    pub email: String,
    pub password: String,
    #[serde(default)]
    pub mobile: Option<String>,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct EmailPasswordLoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct MobilePasswordLoginRequest {
    pub mobile: String,
    pub password: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct EmailOtpSendRequest {
    pub email: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct EmailOtpVerifyRequest {
    pub email: String,
    pub otp: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct MobileOtpSendRequest {
    pub mobile: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct MobileOtpVerifyRequest {
    pub mobile: String,
    pub otp: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct RefreshAccessTokenRequest {
    #[serde(rename = "refreshToken", default)]
    pub refresh_token: Option<String>,
}

#[derive(ToSchema, Serialize, Deserialize, Debug, Default)]
pub struct LogoutRequest {
    #[serde(rename = "refreshToken", default)]
    pub refresh_token: Option<String>,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct ForgetPasswordRequest {
    pub email: String,
}

#[derive(IntoParams, Deserialize, Debug, Default)]
#[into_params(parameter_in = Query)]
pub struct ResetPasswordParams {
    /// Email address the reset link was issued for.
    #[serde(default)]
    pub email: Option<String>,
    /// Signed reset token from the mailed link.
    #[serde(default)]
    pub token: Option<String>,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct ResetPasswordRequest {
    #[serde(rename = "newPassword", default)]
    pub new_password: Option<String>,
}

/// Token pair returned by every successful login flow.
#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct TokenPair {
    #[serde(rename = "accessToken")]
    pub access_token: String,
    #[serde(rename = "refreshToken")]
    pub refresh_token: String,
}

/// `{message, data}` envelope used by non-login responses.
pub fn message_response(status: StatusCode, message: &str) -> Response {
    (
        status,
        Json(json!({
            "message": message,
            "data": {},
        })),
    )
        .into_response()
}

/// 401 envelope with a machine-readable `code` field.
pub fn code_response(status: StatusCode, message: &str, code: &str) -> Response {
    (
        status,
        Json(json!({
            "message": message,
            "code": code,
        })),
    )
        .into_response()
}

/// Successful login envelope carrying the token pair.
pub fn tokens_response(message: &str, tokens: &TokenPair) -> Response {
    (
        StatusCode::OK,
        Json(json!({
            "message": message,
            "tokens": tokens,
        })),
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;

    #[test]
    fn token_pair_serializes_camel_case() -> Result<()> {
        let pair = TokenPair {
            access_token: "a".to_string(),
            refresh_token: "r".to_string(),
        };
        let value = serde_json::to_value(&pair)?;
        assert_eq!(
            value,
            serde_json::json!({"accessToken": "a", "refreshToken": "r"})
        );
        Ok(())
    }

    #[test]
    fn refresh_request_accepts_missing_token() -> Result<()> {
        let decoded: RefreshAccessTokenRequest = serde_json::from_str("{}")?;
        assert!(decoded.refresh_token.is_none());

        let decoded: RefreshAccessTokenRequest =
            serde_json::from_str(r#"{"refreshToken": "abc"}"#)?;
        assert_eq!(decoded.refresh_token.as_deref(), Some("abc"));
        Ok(())
    }

    #[test]
    fn register_request_mobile_is_optional() -> Result<()> {
        let decoded: RegisterRequest = serde_json::from_str(
            r#"{"name": "Alice", "email": "a@example.com", "password": "secret"}"#,
        )?;
        assert!(decoded.mobile.is_none());
        Ok(())
    }
}
