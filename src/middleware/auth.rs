use async_trait::async_trait;
use axum::{extract::FromRequestParts, http::request::Parts};

use crate::error::AppError;

/// Identity header set by the upstream auth layer.
pub const USER_ID_HEADER: &str = "x-user-id";

/// The authenticated buyer making the request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequesterId(pub String);

#[async_trait]
impl<S> FromRequestParts<S> for RequesterId
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let user_id = parts
            .headers
            .get(USER_ID_HEADER)
            .and_then(|h| h.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .ok_or_else(|| AppError::Unauthorized("missing user identity".to_string()))?;

        Ok(RequesterId(user_id.to_string()))
    }
}
