//! # Authentication Module
//!
//! Two independent checks:
//!
//! - An optional service key (`MERIT_API_KEY`). When set, every request
//!   except `/health` must carry `Authorization: Bearer <key>`.
//! - Caller identity. Users are authenticated upstream; the gateway forwards
//!   who they are in headers, which the [`Caller`] extractor turns into an
//!   `Identity`:
//!
//! ```text
//! X-User-Id: u-1234
//! X-User-Role: Mahasiswa
//! X-User-Permissions: achievement:read,achievement:create
//! ```
//!
//! Without `X-User-Permissions` the role's default permission set applies.

use super::types::Unauthenticated;
use axum::{
    body::Body,
    extract::{FromRequestParts, State},
    http::{HeaderMap, Request, StatusCode, header, request::Parts},
    middleware::Next,
    response::Response,
};
use merit_core::{Identity, Permission, Role, UserId};
use std::collections::BTreeSet;
use std::sync::Arc;
use subtle::ConstantTimeEq;

pub const USER_ID_HEADER: &str = "x-user-id";
pub const USER_ROLE_HEADER: &str = "x-user-role";
pub const USER_PERMISSIONS_HEADER: &str = "x-user-permissions";

// =============================================================================
// API KEY AUTHENTICATION
// =============================================================================

/// Compare in constant time over the longer of the two lengths.
fn keys_match(provided: &[u8], expected: &[u8]) -> bool {
    let len = provided.len().max(expected.len());
    let mut a = vec![0u8; len];
    let mut b = vec![0u8; len];
    a[..provided.len()].copy_from_slice(provided);
    b[..expected.len()].copy_from_slice(expected);
    let bytes_match: bool = a.ct_eq(&b).into();
    bytes_match && provided.len() == expected.len()
}

/// Service key middleware. `/health` is always let through for load
/// balancer checks.
pub async fn api_key_auth_middleware(
    State(expected): State<Arc<str>>,
    request: Request<Body>,
    next: Next,
) -> Result<Response, (StatusCode, &'static str)> {
    if request.uri().path() == "/health" {
        return Ok(next.run(request).await);
    }

    let provided = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.strip_prefix("Bearer ").unwrap_or(v));

    match provided {
        Some(key) if keys_match(key.as_bytes(), expected.as_bytes()) => {
            Ok(next.run(request).await)
        }
        Some(_) => {
            tracing::warn!(event = "auth_failure", reason = "invalid_api_key", "invalid API key");
            Err((StatusCode::UNAUTHORIZED, "Unauthorized"))
        }
        None => {
            tracing::warn!(
                event = "auth_failure",
                reason = "missing_authorization_header",
                "missing Authorization header"
            );
            Err((StatusCode::UNAUTHORIZED, "Unauthorized"))
        }
    }
}

// =============================================================================
// CALLER IDENTITY
// =============================================================================

/// The authenticated caller of a request.
#[derive(Debug, Clone)]
pub struct Caller(pub Identity);

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

/// Build an identity from forwarded headers.
pub fn identity_from_headers(headers: &HeaderMap) -> Result<Identity, Unauthenticated> {
    let user = header_str(headers, USER_ID_HEADER).ok_or(Unauthenticated("missing X-User-Id"))?;
    let role =
        header_str(headers, USER_ROLE_HEADER).ok_or(Unauthenticated("missing X-User-Role"))?;

    let identity = Identity::new(UserId::new(user), Role::parse(role));
    let Some(raw) = headers
        .get(USER_PERMISSIONS_HEADER)
        .and_then(|v| v.to_str().ok())
    else {
        return Ok(identity);
    };

    let permissions: BTreeSet<Permission> = raw
        .split(',')
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .filter_map(|p| match p.parse::<Permission>() {
            Ok(permission) => Some(permission),
            Err(e) => {
                tracing::debug!(error = %e, "ignoring permission");
                None
            }
        })
        .collect();
    Ok(identity.with_permissions(permissions))
}

impl<S> FromRequestParts<S> for Caller
where
    S: Send + Sync,
{
    type Rejection = Unauthenticated;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        identity_from_headers(&parts.headers).map(Caller)
    }
}

// =============================================================================
// TESTS
// =============================================================================
