use serde::{Deserialize, Serialize};

/// Numeric TMDB movie identifier
pub type MovieId = u64;

/// Movie metadata returned to the client
///
/// Read-only reference data fetched from the catalog. Never mutated locally.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MovieRecord {
    pub id: MovieId,
    pub title: String,
    #[serde(default)]
    pub overview: String,
    #[serde(default)]
    pub poster_path: Option<String>,
    /// Release date as delivered by the catalog (`YYYY-MM-DD`)
    #[serde(default)]
    pub release_date: Option<String>,
    /// Average rating on a 0.0 to 10.0 scale
    #[serde(default)]
    pub vote_average: Option<f64>,
}

impl MovieRecord {
    /// Blank optional strings become absent and the rating is clamped to 0..=10
    pub fn normalized(self) -> Self {
        let non_empty = |value: Option<String>| value.filter(|v| !v.trim().is_empty());

        MovieRecord {
            poster_path: non_empty(self.poster_path),
            release_date: non_empty(self.release_date),
            vote_average: self
                .vote_average
                .filter(|v| v.is_finite())
                .map(|v| v.clamp(0.0, 10.0)),
            ..self
        }
    }
}

// ============================================================================
// TMDB API Types
// ============================================================================

/// Raw movie object from TMDB (`/search/movie`, `/movie/{id}`, `/movie/popular`)
#[derive(Debug, Clone, Deserialize)]
pub struct TmdbMovie {
    pub id: u64,
    pub title: String,
    #[serde(default)]
    pub overview: Option<String>,
    #[serde(default)]
    pub poster_path: Option<String>,
    #[serde(default)]
    pub release_date: Option<String>,
    #[serde(default)]
    pub vote_average: Option<f64>,
}

impl From<TmdbMovie> for MovieRecord {
    fn from(movie: TmdbMovie) -> Self {
        // TMDB sends "" for unknown dates and posters
        MovieRecord {
            id: movie.id,
            title: movie.title,
            overview: movie.overview.unwrap_or_default(),
            poster_path: movie.poster_path,
            release_date: movie.release_date,
            vote_average: movie.vote_average,
        }
        .normalized()
    }
}

/// Paged list envelope used by TMDB list endpoints
///
/// Items are kept as raw JSON so a single malformed entry doesn't sink the page.
#[derive(Debug, Deserialize)]
pub struct TmdbPage {
    pub results: Vec<serde_json::Value>,
}

impl TmdbPage {
    pub fn into_records(self) -> Vec<MovieRecord> {
        self.results
            .into_iter()
            .filter_map(|raw| match serde_json::from_value::<TmdbMovie>(raw) {
                Ok(movie) => Some(MovieRecord::from(movie)),
                Err(e) => {
                    tracing::debug!(error = %e, "Skipping malformed TMDB result");
                    None
                }
            })
            .collect()
    }
}
