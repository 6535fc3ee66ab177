//! Caller identity extraction.
//!
//! Session mechanics live in the upstream auth proxy; by the time a
//! request reaches this service, the proxy has already authenticated it
//! and stamped the owner onto the `X-User-Id` header. Requests without
//! a usable header are rejected, never defaulted.

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use lumen_core::types::DbId;

use crate::error::AppError;

/// Header carrying the authenticated user's id.
pub const USER_ID_HEADER: &str = "x-user-id";

/// The authenticated owner of the request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Owner(pub DbId);

impl<S> FromRequestParts<S> for Owner
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let header = parts
            .headers
            .get(USER_ID_HEADER)
            .ok_or_else(|| AppError::Unauthorized("Missing X-User-Id header".to_string()))?;

        let user_id: DbId = header
            .to_str()
            .ok()
            .and_then(|v| v.parse().ok())
            .filter(|id| *id > 0)
            .ok_or_else(|| AppError::Unauthorized("Invalid X-User-Id header".to_string()))?;

        Ok(Owner(user_id))
    }
}
