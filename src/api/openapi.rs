use axum::middleware;
use utoipa::openapi::{Contact, InfoBuilder, License, OpenApiBuilder, Tag};
use utoipa_axum::{router::OpenApiRouter, routes};

use super::cache;
use super::handlers::{auth, health, users};

#[must_use]
pub fn openapi() -> utoipa::openapi::OpenApi {
    // Reuse the same router wiring and only return the generated OpenAPI spec.
    let (_router, openapi) = api_router().split_for_parts();
    openapi
}

/// Build the router that also drives the `OpenAPI` document.
///
/// Add new endpoints here via `.routes(routes!(...))` so they are both served
/// and included in the generated `OpenAPI` spec. Protected routes carry the
/// auth gate and the response cache as route-local layers; cross-cutting
/// layers (trace, CORS, rate limiting, extensions) are applied by the server
/// wiring around the whole router.
pub(crate) fn api_router() -> OpenApiRouter {
    // `routes!` reads #[utoipa::path] to bind HTTP method + path and add the route to OpenAPI.
    let public = OpenApiRouter::with_openapi(cargo_openapi())
        .routes(routes!(health::health))
        .routes(routes!(auth::register::register))
        .routes(routes!(auth::login::login_email_password))
        .routes(routes!(auth::login::login_mobile_password))
        .routes(routes!(auth::otp::send_email_otp))
        .routes(routes!(auth::otp::verify_email_otp))
        .routes(routes!(auth::otp::send_mobile_otp))
        .routes(routes!(auth::otp::verify_mobile_otp))
        .routes(routes!(auth::google::google_login))
        .routes(routes!(auth::google::google_callback))
        .routes(routes!(auth::refresh::refresh_access_token))
        .routes(routes!(auth::logout::logout))
        .routes(routes!(auth::reset::forget_password))
        .routes(routes!(auth::reset::reset_password));

    // Layer order matters: the gate must run before the cache so cached
    // payloads are never served to unauthenticated callers.
    let protected = OpenApiRouter::new()
        .routes(routes!(users::get_user))
        .layer(middleware::from_fn(cache::cache_response))
        .layer(middleware::from_fn(auth::gate::require_auth));

    public.merge(protected)
}

fn cargo_openapi() -> utoipa::openapi::OpenApi {
    // Use Cargo.toml metadata instead of the utoipa-axum crate info defaults.
    let mut info = InfoBuilder::new()
        .title(env!("CARGO_PKG_NAME"))
        .version(env!("CARGO_PKG_VERSION"))
        .description(optional_str(env!("CARGO_PKG_DESCRIPTION")))
        .build();

    info.contact = cargo_contact();
    info.license = cargo_license();

    let mut auth_tag = Tag::new("auth");
    auth_tag.description =
        Some("Login flows, token lifecycle, and password recovery".to_string());

    let mut users_tag = Tag::new("users");
    users_tag.description = Some("Authenticated profile reads".to_string());

    OpenApiBuilder::new()
        .info(info)
        .tags(Some(vec![auth_tag, users_tag]))
        .build()
}

fn cargo_contact() -> Option<Contact> {
    // Cargo authors are `;` separated and may include "Name <email>".
    let authors = env!("CARGO_PKG_AUTHORS");
    let primary = authors.split(';').next().map(str::trim)?;
    if primary.is_empty() {
        return None;
    }

    let (name, email) = parse_author(primary);
    if name.is_none() && email.is_none() {
        return None;
    }

    let mut contact = Contact::new();
    contact.name = name.map(str::to_string);
    contact.email = email.map(str::to_string);
    Some(contact)
}

fn cargo_license() -> Option<License> {
    let identifier = optional_str(env!("CARGO_PKG_LICENSE"))?;
    let mut license = License::new(identifier);
    license.identifier = Some(identifier.to_string());
    Some(license)
}

fn optional_str(value: &'static str) -> Option<&'static str> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed)
    }
}

fn parse_author(author: &str) -> (Option<&str>, Option<&str>) {
    if let Some(start) = author.find('<') {
        let name = author[..start].trim();
        let email = author[start + 1..].trim_end_matches('>').trim();
        let name = if name.is_empty() { None } else { Some(name) };
        let email = if email.is_empty() { None } else { Some(email) };
        (name, email)
    } else {
        let name = author.trim();
        (if name.is_empty() { None } else { Some(name) }, None)
    }
}
