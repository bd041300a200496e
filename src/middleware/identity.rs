use axum::{extract::FromRequestParts, http::request::Parts};

use crate::{
    error::{AppError, AppResult},
    models::UserId,
};

/// Header carrying the identity established by the upstream auth provider
pub const USER_ID_HEADER: &str = "x-user-id";

/// Identity of the caller, if any
///
/// A missing or blank header means nobody is signed in. A header that is
/// present but not a valid user id is rejected with 400.
#[derive(Debug, Clone, PartialEq)]
pub struct CurrentUser(pub Option<UserId>);

impl CurrentUser {
    /// The signed-in user, or 401
    pub fn require(self) -> AppResult<UserId> {
        self.0.ok_or(AppError::Unauthorized)
    }
}

#[axum::async_trait]
impl<S> FromRequestParts<S> for CurrentUser
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let Some(value) = parts.headers.get(USER_ID_HEADER) else {
            return Ok(CurrentUser(None));
        };

        let raw = value
            .to_str()
            .map_err(|_| AppError::Validation(format!("{} header must be ASCII", USER_ID_HEADER)))?;

        if raw.trim().is_empty() {
            return Ok(CurrentUser(None));
        }

        Ok(CurrentUser(Some(UserId::parse(raw)?)))
    }
}
