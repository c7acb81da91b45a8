//! Auth handlers and supporting modules.
//!
//! This module implements the multi-method login protocol (password, OTP
//! over email/SMS, federated Google login), the refresh/logout lifecycle,
//! and the forget/reset-password pair.
//!
//! ## Session model
//!
//! Each identity holds at most one live refresh token. Every successful
//! login overwrites it, so the most recent login is the only session whose
//! refresh token still works; earlier tokens stay in the outstanding
//! registry until expiry but fail the identity-record equality check.
//!
//! ## Failure semantics
//!
//! Validation problems are 400, unknown identities 404, credential and token
//! problems 401 with a machine-readable `code` where the client must choose
//! between refreshing and re-logging-in, role problems 403, and store
//! failures 500. Rate limiting and auth checks fail closed; the response
//! cache fails open.

pub(crate) mod gate;
pub(crate) mod google;
pub(crate) mod login;
pub(crate) mod logout;
pub(crate) mod otp;
pub(crate) mod refresh;
pub(crate) mod register;
pub(crate) mod reset;
mod state;
pub(crate) mod storage;
pub(crate) mod types;
mod utils;

pub use google::{GoogleClient, GoogleConfig, GoogleExchange, GoogleProfile, OauthStateStore};
pub use otp::{DEFAULT_OTP_TTL_SECONDS, OtpStore};
pub use state::{AuthConfig, AuthState, GoogleState};
