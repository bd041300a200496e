use std::sync::Arc;

use crate::{
    error::AppResult,
    models::{MovieId, MovieRecord},
    services::{notifications::Notifier, providers::CatalogProvider},
};

const SEARCH_FAILED: &str = "Failed to search movies. Please try again later.";
const POPULAR_FAILED: &str = "Failed to load popular movies. Please try again later.";
const DETAILS_FAILED: &str = "Failed to load movie details. Please try again later.";

/// Catalog boundary used by the HTTP layer
///
/// Delegates to the configured [`CatalogProvider`] and reports failures on
/// the requester's notification channel, when there is one, before handing
/// them back. Nothing is retried; calling again is the retry.
#[derive(Clone)]
pub struct Catalog {
    provider: Arc<dyn CatalogProvider>,
}

impl Catalog {
    pub fn new(provider: Arc<dyn CatalogProvider>) -> Self {
        Self { provider }
    }

    /// Searches by title; a blank query returns the popular list instead
    pub async fn search(&self, query: &str, notifier: Option<&Notifier>) -> AppResult<Vec<MovieRecord>> {
        if query.trim().is_empty() {
            return self.popular(notifier).await;
        }

        let result = self.provider.search(query).await;
        self.report(result, SEARCH_FAILED, notifier)
    }

    pub async fn popular(&self, notifier: Option<&Notifier>) -> AppResult<Vec<MovieRecord>> {
        let result = self.provider.popular().await;
        self.report(result, POPULAR_FAILED, notifier)
    }

    pub async fn details(&self, id: MovieId, notifier: Option<&Notifier>) -> AppResult<MovieRecord> {
        let result = self.provider.details(id).await;
        self.report(result, DETAILS_FAILED, notifier)
    }

    fn report<T>(&self, result: AppResult<T>, message: &str, notifier: Option<&Notifier>) -> AppResult<T> {
        if let Err(e) = &result {
            tracing::error!(error = %e, provider = self.provider.name(), "Catalog request failed");
            if let Some(notifier) = notifier {
                notifier.error(message);
            }
        }
        result
    }
}
