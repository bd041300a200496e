/// TMDB (The Movie Database) provider
///
/// API Flow:
/// 1. Search: /search/movie?query= → paged `results`
/// 2. Details: /movie/{id} → single movie object
/// 3. Popular: /movie/popular → paged `results`
///
/// All requests authenticate with the `api_key` query parameter.
use crate::{
    cached,
    db::{Cache, CacheKey},
    error::{AppError, AppResult},
    models::{MovieId, MovieRecord, TmdbMovie, TmdbPage},
    services::providers::CatalogProvider,
};
use reqwest::{Client as HttpClient, StatusCode};
use serde::de::DeserializeOwned;

const SEARCH_CACHE_TTL: u64 = 3600; // 1 hour
const DETAILS_CACHE_TTL: u64 = 86400; // 1 day
const POPULAR_CACHE_TTL: u64 = 3600; // 1 hour

#[derive(Clone)]
pub struct TmdbProvider {
    http_client: HttpClient,
    api_key: String,
    api_url: String,
    cache: Cache,
}

impl TmdbProvider {
    pub fn new(cache: Cache, api_key: String, api_url: String) -> Self {
        Self {
            http_client: HttpClient::new(),
            api_key,
            api_url: api_url.trim_end_matches('/').to_string(),
            cache,
        }
    }

    /// Issues a GET against the API and decodes the JSON body
    async fn get_json<T: DeserializeOwned>(&self, path: &str, params: &[(&str, &str)]) -> AppResult<T> {
        let url = format!("{}{}", self.api_url, path);

        let response = self
            .http_client
            .get(&url)
            .query(&[("api_key", self.api_key.as_str())])
            .query(params)
            .send()
            .await?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Err(AppError::NotFound(format!("TMDB resource {}", path)));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::Catalog(format!(
                "TMDB API returned status {}: {}",
                status, body
            )));
        }

        let body = response.text().await?;
        serde_json::from_str(&body).map_err(|e| {
            tracing::error!(error = %e, path = %path, "Failed to deserialize TMDB response");
            AppError::Catalog(format!("Failed to parse TMDB response: {}", e))
        })
    }
}

#[async_trait::async_trait]
impl CatalogProvider for TmdbProvider {
    async fn search(&self, query: &str) -> AppResult<Vec<MovieRecord>> {
        let query = query.trim();
        if query.is_empty() {
            return Err(AppError::Validation(
                "Search query cannot be empty".to_string(),
            ));
        }

        cached!(
            self.cache,
            CacheKey::Search(query.to_string()),
            SEARCH_CACHE_TTL,
            async move {
                let page: TmdbPage = self.get_json("/search/movie", &[("query", query)]).await?;
                let movies = page.into_records();

                tracing::info!(
                    query = %query,
                    results = movies.len(),
                    provider = "tmdb",
                    "Movie search completed"
                );

                Ok::<_, AppError>(movies)
            }
        )
    }

    async fn details(&self, id: MovieId) -> AppResult<MovieRecord> {
        cached!(
            self.cache,
            CacheKey::Details(id),
            DETAILS_CACHE_TTL,
            async move {
                let movie: TmdbMovie = self
                    .get_json(&format!("/movie/{}", id), &[])
                    .await
                    .map_err(|e| match e {
                        AppError::NotFound(_) => AppError::NotFound(format!("Movie {}", id)),
                        other => other,
                    })?;

                tracing::info!(movie_id = id, provider = "tmdb", "Movie details fetched");

                Ok::<_, AppError>(MovieRecord::from(movie))
            }
        )
    }

    async fn popular(&self) -> AppResult<Vec<MovieRecord>> {
        cached!(self.cache, CacheKey::Popular, POPULAR_CACHE_TTL, async move {
            let page: TmdbPage = self.get_json("/movie/popular", &[]).await?;
            let movies = page.into_records();

            tracing::info!(results = movies.len(), provider = "tmdb", "Popular movies fetched");

            Ok::<_, AppError>(movies)
        })
    }

    fn name(&self) -> &'static str {
        "tmdb"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::create_redis_client;
    use serde_json::json;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    /// Provider pointed at a mock server with a cache that always misses
    fn create_test_provider(server: &MockServer) -> TmdbProvider {
        let client = create_redis_client("redis://127.0.0.1:1").unwrap();
        let (cache, _handle) = Cache::new(client);
        TmdbProvider::new(cache, "test_key".to_string(), server.uri())
    }

    #[tokio::test]
    async fn test_search_parses_results() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/search/movie"))
            .and(query_param("api_key", "test_key"))
            .and(query_param("query", "matrix"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "page": 1,
                "results": [
                    {"id": 603, "title": "The Matrix", "overview": "Neo...", "release_date": "1999-03-30", "vote_average": 8.2},
                    {"id": 604, "title": "The Matrix Reloaded", "poster_path": null}
                ],
                "total_results": 2
            })))
            .expect(1)
            .mount(&server)
            .await;

        let provider = create_test_provider(&server);
        let movies = provider.search("  matrix ").await.unwrap();

        assert_eq!(movies.len(), 2);
        assert_eq!(movies[0].id, 603);
        assert_eq!(movies[0].release_date.as_deref(), Some("1999-03-30"));
        assert_eq!(movies[1].poster_path, None);
    }

    #[tokio::test]
    async fn test_search_rejects_blank_query() {
        let server = MockServer::start().await;
        let provider = create_test_provider(&server);

        let result = provider.search("   ").await;
        assert!(matches!(result, Err(AppError::Validation(_))));
    }

    #[tokio::test]
    async fn test_details_not_found() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/movie/999999"))
            .respond_with(ResponseTemplate::new(404).set_body_json(json!({
                "status_code": 34,
                "status_message": "The resource you requested could not be found."
            })))
            .mount(&server)
            .await;

        let provider = create_test_provider(&server);
        let result = provider.details(999999).await;

        match result {
            Err(AppError::NotFound(msg)) => assert_eq!(msg, "Movie 999999"),
            other => panic!("expected NotFound, got {:?}", other.map(|m| m.id)),
        }
    }

    #[tokio::test]
    async fn test_details_success() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/movie/27205"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": 27205,
                "title": "Inception",
                "overview": "Cobb...",
                "poster_path": "/inception.jpg",
                "release_date": "2010-07-15",
                "vote_average": 8.4,
                "runtime": 148
            })))
            .mount(&server)
            .await;

        let provider = create_test_provider(&server);
        let movie = provider.details(27205).await.unwrap();

        assert_eq!(movie.title, "Inception");
        assert_eq!(movie.poster_path.as_deref(), Some("/inception.jpg"));
    }

    #[tokio::test]
    async fn test_server_error_is_catalog_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/movie/popular"))
            .respond_with(ResponseTemplate::new(503).set_body_string("upstream down"))
            .expect(1)
            .mount(&server)
            .await;

        let provider = create_test_provider(&server);
        let result = provider.popular().await;

        match result {
            Err(AppError::Catalog(msg)) => assert!(msg.contains("503")),
            other => panic!("expected Catalog error, got {:?}", other.map(|m| m.len())),
        }
    }

    #[tokio::test]
    async fn test_malformed_envelope_is_catalog_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/movie/popular"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>oops</html>"))
            .mount(&server)
            .await;

        let provider = create_test_provider(&server);
        let result = provider.popular().await;
        assert!(matches!(result, Err(AppError::Catalog(_))));
    }

    #[tokio::test]
    async fn test_unreachable_catalog_is_http_error() {
        let client = create_redis_client("redis://127.0.0.1:1").unwrap();
        let (cache, _handle) = Cache::new(client);
        let provider = TmdbProvider::new(cache, "k".to_string(), "http://127.0.0.1:1".to_string());

        let result = provider.popular().await;
        assert!(matches!(result, Err(AppError::Catalog(_))));
    }
}
