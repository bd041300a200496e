//! Movie catalog provider abstraction
//!
//! Providers translate the three catalog intents (free-text search, lookup by
//! id, popular list) into requests against an external metadata service.
//! Providers never retry; a failed request is returned to the caller as is.

use crate::{
    error::AppResult,
    models::{MovieId, MovieRecord},
};

pub mod tmdb;

pub use tmdb::TmdbProvider;

/// Trait for movie metadata providers
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait CatalogProvider: Send + Sync {
    /// Search for movies by title
    ///
    /// Rejects blank queries with a validation error.
    async fn search(&self, query: &str) -> AppResult<Vec<MovieRecord>>;

    /// Fetch a single movie, failing with `NotFound` for unknown ids
    async fn details(&self, id: MovieId) -> AppResult<MovieRecord>;

    /// Fetch the catalog's current popular list
    async fn popular(&self) -> AppResult<Vec<MovieRecord>>;

    /// Provider name for logging and debugging
    fn name(&self) -> &'static str;
}
