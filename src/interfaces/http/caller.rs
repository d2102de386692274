use super::error_responses::ApiError;
use crate::domain::appointment::UserId;
use axum::{extract::FromRequestParts, http::request::Parts};

pub const CALLER_HEADER: &str = "x-user-id";

/// The authenticated user, as asserted by the upstream session layer in the
/// `x-user-id` header.
#[derive(Debug, Clone, Copy)]
pub struct Caller(pub UserId);

impl<S> FromRequestParts<S> for Caller
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .headers
            .get(CALLER_HEADER)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.trim().parse::<u64>().ok())
            .map(|id| Caller(UserId(id)))
            .ok_or(ApiError::MissingCaller)
    }
}
