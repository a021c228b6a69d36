//! services/api/src/web/middleware.rs
//!
//! Authentication middleware for protecting routes.
//!
//! Credentials are verified upstream by the authentication provider, which
//! forwards the verified user id in the `x-user-id` header. This layer trusts
//! that header and only checks that it is present and well-formed.

use axum::{extract::Request, http::StatusCode, middleware::Next, response::Response};
use tracing::warn;
use uuid::Uuid;

/// The header carrying the verified identity.
pub const USER_ID_HEADER: &str = "x-user-id";

/// The verified identity of the caller, inserted into request extensions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuthenticatedUser(pub Uuid);

/// Middleware that extracts the verified user id.
///
/// If present, inserts an `AuthenticatedUser` into request extensions for handlers to use.
/// If missing or malformed, returns 401 Unauthorized.
pub async fn require_auth(mut req: Request, next: Next) -> Result<Response, StatusCode> {
    // 1. Extract the identity header
    let raw = req
        .headers()
        .get(USER_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .ok_or(StatusCode::UNAUTHORIZED)?;

    // 2. Parse the user id
    let user_id = Uuid::parse_str(raw.trim()).map_err(|_| {
        warn!("Rejected request with a malformed {} header.", USER_ID_HEADER);
        StatusCode::UNAUTHORIZED
    })?;

    // 3. Insert the identity into request extensions
    req.extensions_mut().insert(AuthenticatedUser(user_id));

    // 4. Continue to the handler
    Ok(next.run(req).await)
}
