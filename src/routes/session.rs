use std::sync::Arc;

use axum::{extract::State, http::StatusCode};

use crate::{error::AppResult, middleware::CurrentUser, services::StoreRegistry};

/// Sign-out: drops the caller's in-memory store
///
/// Durable data is untouched; the next request reloads it.
pub async fn sign_out(
    State(registry): State<Arc<StoreRegistry>>,
    user: CurrentUser,
) -> AppResult<StatusCode> {
    let owner = user.require()?;
    registry.evict(&owner);
    Ok(StatusCode::NO_CONTENT)
}
