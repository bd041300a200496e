use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::Deserialize;

use crate::{
    error::AppResult,
    middleware::CurrentUser,
    models::{MovieId, MovieRecord},
    services::{Catalog, Notifier, StoreRegistry},
};

#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    #[serde(default)]
    q: String,
}

/// Failures are reported to the caller's own channel; anonymous callers have none
fn requester_notifier(registry: &StoreRegistry, user: &CurrentUser) -> Option<Notifier> {
    user.0.as_ref().map(|owner| registry.notifier_for(owner))
}

/// Title search; an empty `q` lists popular movies
pub async fn search(
    State(catalog): State<Catalog>,
    State(registry): State<Arc<StoreRegistry>>,
    user: CurrentUser,
    Query(params): Query<SearchQuery>,
) -> AppResult<Json<Vec<MovieRecord>>> {
    let notifier = requester_notifier(&registry, &user);
    let movies = catalog.search(&params.q, notifier.as_ref()).await?;
    Ok(Json(movies))
}

pub async fn popular(
    State(catalog): State<Catalog>,
    State(registry): State<Arc<StoreRegistry>>,
    user: CurrentUser,
) -> AppResult<Json<Vec<MovieRecord>>> {
    let notifier = requester_notifier(&registry, &user);
    let movies = catalog.popular(notifier.as_ref()).await?;
    Ok(Json(movies))
}

pub async fn details(
    State(catalog): State<Catalog>,
    State(registry): State<Arc<StoreRegistry>>,
    user: CurrentUser,
    Path(id): Path<MovieId>,
) -> AppResult<Json<MovieRecord>> {
    let notifier = requester_notifier(&registry, &user);
    let movie = catalog.details(id, notifier.as_ref()).await?;
    Ok(Json(movie))
}
