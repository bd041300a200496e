use std::path::PathBuf;

use crate::{
    error::{AppError, AppResult},
    models::{RecordId, TrackingEntry, UserId},
    services::tracking::TrackingBackend,
};

const STORAGE_KEY: &str = "movie-tracker-data";

/// One JSON file per user holding the serialized array of entries
///
/// The file is read whole and rewritten whole on every change. Writes go to a
/// temporary file first and are renamed into place.
pub struct FileBackend {
    dir: PathBuf,
}

impl FileBackend {
    /// Creates the backend, making sure `dir` exists
    pub async fn new(dir: impl Into<PathBuf>) -> AppResult<Self> {
        let dir = dir.into();
        tokio::fs::create_dir_all(&dir).await?;
        tracing::info!(dir = %dir.display(), "File tracking backend ready");
        Ok(Self { dir })
    }

    fn path_for(&self, owner: &UserId) -> PathBuf {
        self.dir.join(format!("{}-{}.json", STORAGE_KEY, owner))
    }

    async fn write_snapshot(&self, owner: &UserId, snapshot: &[TrackingEntry]) -> AppResult<()> {
        let json = serde_json::to_vec_pretty(snapshot)
            .map_err(|e| AppError::Persistence(format!("Failed to serialize entries: {}", e)))?;

        let path = self.path_for(owner);
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, json).await?;
        tokio::fs::rename(&tmp, &path).await?;

        tracing::debug!(owner = %owner, entries = snapshot.len(), path = %path.display(), "Tracking file written");
        Ok(())
    }
}

/// Decodes a stored blob, discarding anything malformed
fn parse_entries(owner: &UserId, raw: &str) -> Vec<TrackingEntry> {
    let items = match serde_json::from_str::<serde_json::Value>(raw) {
        Ok(serde_json::Value::Array(items)) => items,
        Ok(_) => {
            tracing::error!(owner = %owner, "Tracking file is not a JSON array, starting empty");
            return Vec::new();
        }
        Err(e) => {
            tracing::error!(error = %e, owner = %owner, "Tracking file is not valid JSON, starting empty");
            return Vec::new();
        }
    };

    items
        .into_iter()
        .filter_map(|item| match serde_json::from_value::<TrackingEntry>(item) {
            Ok(entry) => Some(entry),
            Err(e) => {
                tracing::warn!(error = %e, owner = %owner, "Skipping malformed tracking entry");
                None
            }
        })
        .collect()
}

#[async_trait::async_trait]
impl TrackingBackend for FileBackend {
    async fn load(&self, owner: &UserId) -> AppResult<Vec<TrackingEntry>> {
        let path = self.path_for(owner);

        match tokio::fs::read_to_string(&path).await {
            Ok(raw) => Ok(parse_entries(owner, &raw)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(e.into()),
        }
    }

    async fn save(
        &self,
        owner: &UserId,
        snapshot: &[TrackingEntry],
        _entry: &TrackingEntry,
    ) -> AppResult<Option<RecordId>> {
        self.write_snapshot(owner, snapshot).await?;
        Ok(None)
    }

    async fn remove(
        &self,
        owner: &UserId,
        snapshot: &[TrackingEntry],
        _entry: &TrackingEntry,
    ) -> AppResult<()> {
        self.write_snapshot(owner, snapshot).await
    }

    fn new_record_id(&self) -> Option<RecordId> {
        None
    }

    fn name(&self) -> &'static str {
        "file"
    }
}
