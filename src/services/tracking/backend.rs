use crate::{
    error::AppResult,
    models::{RecordId, TrackingEntry, UserId},
};

/// Durable storage for tracked movies
///
/// Every call concerns a single owner. `save` and `remove` receive both the
/// owner's complete snapshot (already reflecting the change) and the entry
/// that changed: whole-blob backends write the snapshot, record-oriented
/// backends issue one targeted write for the entry.
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait TrackingBackend: Send + Sync {
    /// Loads every entry stored for `owner`
    async fn load(&self, owner: &UserId) -> AppResult<Vec<TrackingEntry>>;

    /// Persists an inserted or updated entry
    ///
    /// Returns the record id the backend actually holds for the entry, which
    /// may differ from the one proposed by [`new_record_id`](Self::new_record_id)
    /// when the row already existed. `None` for backends without record ids.
    async fn save(
        &self,
        owner: &UserId,
        snapshot: &[TrackingEntry],
        entry: &TrackingEntry,
    ) -> AppResult<Option<RecordId>>;

    /// Persists the removal of an entry
    async fn remove(
        &self,
        owner: &UserId,
        snapshot: &[TrackingEntry],
        entry: &TrackingEntry,
    ) -> AppResult<()>;

    /// Handle for a newly inserted entry, for backends that address records
    fn new_record_id(&self) -> Option<RecordId>;

    /// Backend name for logging and debugging
    fn name(&self) -> &'static str;
}
