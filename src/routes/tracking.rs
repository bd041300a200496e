use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::Deserialize;

use crate::{
    error::{AppError, AppResult},
    middleware::CurrentUser,
    models::{MovieId, MovieRecord, RecordId, TrackingEntry, WatchStatus},
    services::{tracking::Outcome, StoreRegistry},
};

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    status: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct TrackRequest {
    status: String,
    /// Catalog record to keep alongside the entry
    #[serde(default)]
    movie: Option<MovieRecord>,
}

/// The caller's tracked movies, optionally narrowed to one list
pub async fn list(
    State(registry): State<Arc<StoreRegistry>>,
    user: CurrentUser,
    Query(params): Query<ListQuery>,
) -> AppResult<Json<Vec<TrackingEntry>>> {
    let owner = user.require()?;
    let store = registry.store_for(&owner).await?;

    let entries = match params.status {
        Some(status) => store.get_movies_by_status(status.parse()?),
        None => store.entries(),
    };

    Ok(Json(entries))
}

pub async fn status(
    State(registry): State<Arc<StoreRegistry>>,
    user: CurrentUser,
    Path(movie_id): Path<MovieId>,
) -> AppResult<Json<TrackingEntry>> {
    let owner = user.require()?;
    let store = registry.store_for(&owner).await?;

    store
        .get_movie_status(movie_id)
        .map(Json)
        .ok_or_else(|| AppError::NotFound(format!("Movie {} is not tracked", movie_id)))
}

/// Adds the movie to a list or moves it to another one
pub async fn track(
    State(registry): State<Arc<StoreRegistry>>,
    user: CurrentUser,
    Path(movie_id): Path<MovieId>,
    Json(body): Json<TrackRequest>,
) -> AppResult<Json<Outcome<TrackingEntry>>> {
    let owner = user.require()?;
    let status: WatchStatus = body.status.parse()?;

    if let Some(movie) = &body.movie {
        if movie.id != movie_id {
            return Err(AppError::Validation(format!(
                "Movie record {} does not match path id {}",
                movie.id, movie_id
            )));
        }
    }

    let store = registry.store_for(&owner).await?;
    let outcome = match body.movie {
        Some(movie) => store.track_record(movie, status).await,
        None => store.track_movie(movie_id, status).await,
    };

    Ok(Json(outcome))
}

pub async fn remove(
    State(registry): State<Arc<StoreRegistry>>,
    user: CurrentUser,
    Path(movie_id): Path<MovieId>,
) -> AppResult<Json<Outcome<Option<TrackingEntry>>>> {
    let owner = user.require()?;
    let store = registry.store_for(&owner).await?;
    Ok(Json(store.remove_tracking(movie_id).await))
}

/// Removal by backend record handle
pub async fn remove_record(
    State(registry): State<Arc<StoreRegistry>>,
    user: CurrentUser,
    Path(record_id): Path<RecordId>,
) -> AppResult<Json<Outcome<Option<TrackingEntry>>>> {
    let owner = user.require()?;
    let store = registry.store_for(&owner).await?;
    Ok(Json(store.remove_record(record_id).await))
}
