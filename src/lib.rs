//! # ReWear Auth
//!
//! `rewear-auth` is the authentication service for the ReWear clothing-swap
//! marketplace. It owns the multi-method login protocol and the token
//! lifecycle; the marketplace itself (listings, swaps, points, chat) lives in
//! other services that consume this one through the bearer-token gate.
//!
//! ## Login methods
//!
//! - **Password** over email or mobile, hashes stored as Argon2 PHC strings.
//! - **One-time codes** delivered out-of-band over email or SMS, single-use,
//!   5-minute TTL.
//! - **Federated Google login**, linking by provider id or email and creating
//!   verified identities on first sign-in.
//!
//! ## Token lifecycle
//!
//! Short-lived access tokens and long-lived refresh tokens are signed with
//! distinct secrets. Each identity has at most one live refresh token; a new
//! login overwrites it, which is what ends the previous session. Logout
//! blacklists the presented access token and clears the stored refresh
//! token. Revocation state sits behind a keyed TTL store so a shared-store
//! implementation gives every instance the same view.

pub mod api;
pub mod cli;
pub mod store;
pub mod token;

#[allow(clippy::doc_markdown, clippy::needless_raw_string_hashes)]
pub mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

pub const GIT_COMMIT_HASH: &str = match built_info::GIT_COMMIT_HASH {
    Some(hash) => hash,
    None => "unknown",
};

pub const APP_USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"),);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_git_commit_hash_format() {
        if GIT_COMMIT_HASH == "unknown" {
            // Acceptable in non-git build environments
            return;
        }
        // Should be a hex string (full SHA-1 is 40 chars, but could be short)
        assert!(
            GIT_COMMIT_HASH.chars().all(|c| c.is_ascii_hexdigit()),
            "GIT_COMMIT_HASH should be a hex string, got: {GIT_COMMIT_HASH}"
        );
        assert!(
            GIT_COMMIT_HASH.len() >= 7,
            "GIT_COMMIT_HASH should be at least 7 characters long, got: {GIT_COMMIT_HASH}"
        );
    }

    #[test]
    fn test_app_user_agent_format() {
        assert!(APP_USER_AGENT.starts_with(env!("CARGO_PKG_NAME")));
        assert!(APP_USER_AGENT.contains(env!("CARGO_PKG_VERSION")));
    }
}
