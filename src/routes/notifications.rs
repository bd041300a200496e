use std::sync::Arc;

use axum::{extract::State, http::StatusCode, Json};

use crate::{
    error::AppResult,
    middleware::CurrentUser,
    services::{Notification, StoreRegistry},
};

/// The caller's visible notification, or `null`
pub async fn current(
    State(registry): State<Arc<StoreRegistry>>,
    user: CurrentUser,
) -> AppResult<Json<Option<Notification>>> {
    let owner = user.require()?;
    Ok(Json(registry.notifier_for(&owner).current()))
}

pub async fn dismiss(
    State(registry): State<Arc<StoreRegistry>>,
    user: CurrentUser,
) -> AppResult<StatusCode> {
    let owner = user.require()?;
    registry.notifier_for(&owner).clear();
    Ok(StatusCode::NO_CONTENT)
}
