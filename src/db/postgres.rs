use chrono::{DateTime, Utc};
use sqlx::{postgres::PgPoolOptions, types::Json, PgPool};
use uuid::Uuid;

use crate::{
    error::{AppError, AppResult},
    models::{MovieRecord, RecordId, TrackingEntry, UserId},
    services::tracking::TrackingBackend,
};

/// Creates a PostgreSQL connection pool
pub async fn create_pool(database_url: &str) -> anyhow::Result<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(database_url)
        .await?;

    Ok(pool)
}

/// Applies the bundled migrations
pub async fn run_migrations(pool: &PgPool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

#[derive(Debug, sqlx::FromRow)]
struct EntryRow {
    id: Uuid,
    owner_id: String,
    movie_id: i64,
    status: String,
    last_updated: DateTime<Utc>,
    movie: Option<Json<MovieRecord>>,
}

impl TryFrom<EntryRow> for TrackingEntry {
    type Error = AppError;

    fn try_from(row: EntryRow) -> Result<Self, Self::Error> {
        let movie_id = u64::try_from(row.movie_id)
            .map_err(|_| AppError::Validation(format!("Invalid movie id: {}", row.movie_id)))?;

        Ok(TrackingEntry {
            movie_id,
            owner_id: UserId::parse(&row.owner_id)?,
            status: row.status.parse()?,
            last_updated: row.last_updated,
            record_id: Some(row.id),
            movie: row.movie.map(|Json(movie)| movie),
        })
    }
}

fn movie_id_param(entry: &TrackingEntry) -> AppResult<i64> {
    i64::try_from(entry.movie_id)
        .map_err(|_| AppError::Validation(format!("Invalid movie id: {}", entry.movie_id)))
}

/// One row per tracked movie in `tracking_entries`
///
/// Each mutation issues a single targeted statement keyed on
/// `(owner_id, movie_id)`; the snapshot handed in by the store is ignored.
pub struct PostgresBackend {
    pool: PgPool,
}

impl PostgresBackend {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl TrackingBackend for PostgresBackend {
    async fn load(&self, owner: &UserId) -> AppResult<Vec<TrackingEntry>> {
        let rows: Vec<EntryRow> = sqlx::query_as(
            r#"
            SELECT id, owner_id, movie_id, status, last_updated, movie
            FROM tracking_entries
            WHERE owner_id = $1
            ORDER BY last_updated, id
            "#,
        )
        .bind(owner.as_str())
        .fetch_all(&self.pool)
        .await?;

        let entries = rows
            .into_iter()
            .filter_map(|row| {
                let id = row.id;
                match TrackingEntry::try_from(row) {
                    Ok(entry) => Some(entry),
                    Err(e) => {
                        tracing::warn!(error = %e, record_id = %id, owner = %owner, "Skipping invalid tracking row");
                        None
                    }
                }
            })
            .collect();

        Ok(entries)
    }

    async fn save(
        &self,
        owner: &UserId,
        _snapshot: &[TrackingEntry],
        entry: &TrackingEntry,
    ) -> AppResult<Option<RecordId>> {
        let proposed = entry.record_id.unwrap_or_else(Uuid::new_v4);

        // Older writes never overwrite a newer row; the stored id always wins
        let stored: Option<Uuid> = sqlx::query_scalar(
            r#"
            INSERT INTO tracking_entries (id, owner_id, movie_id, status, last_updated, movie)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (owner_id, movie_id) DO UPDATE
            SET status = EXCLUDED.status,
                last_updated = EXCLUDED.last_updated,
                movie = COALESCE(EXCLUDED.movie, tracking_entries.movie)
            WHERE tracking_entries.last_updated <= EXCLUDED.last_updated
            RETURNING id
            "#,
        )
        .bind(proposed)
        .bind(owner.as_str())
        .bind(movie_id_param(entry)?)
        .bind(entry.status.as_str())
        .bind(entry.last_updated)
        .bind(entry.movie.as_ref().map(Json))
        .fetch_optional(&self.pool)
        .await?;

        match stored {
            Some(id) => Ok(Some(id)),
            None => {
                tracing::warn!(
                    owner = %owner,
                    movie_id = entry.movie_id,
                    "Stored row is newer than this write, keeping it"
                );
                let id: Option<Uuid> = sqlx::query_scalar(
                    "SELECT id FROM tracking_entries WHERE owner_id = $1 AND movie_id = $2",
                )
                .bind(owner.as_str())
                .bind(movie_id_param(entry)?)
                .fetch_optional(&self.pool)
                .await?;
                Ok(id)
            }
        }
    }

    async fn remove(
        &self,
        owner: &UserId,
        _snapshot: &[TrackingEntry],
        entry: &TrackingEntry,
    ) -> AppResult<()> {
        let result = sqlx::query("DELETE FROM tracking_entries WHERE owner_id = $1 AND movie_id = $2")
            .bind(owner.as_str())
            .bind(movie_id_param(entry)?)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            tracing::debug!(owner = %owner, movie_id = entry.movie_id, "No stored row to delete");
        }

        Ok(())
    }

    fn new_record_id(&self) -> Option<RecordId> {
        Some(Uuid::new_v4())
    }

    fn name(&self) -> &'static str {
        "postgres"
    }
}
