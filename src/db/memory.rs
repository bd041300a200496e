use std::{collections::HashMap, sync::Mutex};

use crate::{
    error::AppResult,
    models::{RecordId, TrackingEntry, UserId},
    services::tracking::TrackingBackend,
};

/// Process-local backend; everything is lost on restart
#[derive(Default)]
pub struct MemoryBackend {
    entries: Mutex<HashMap<UserId, Vec<TrackingEntry>>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    fn replace(&self, owner: &UserId, snapshot: &[TrackingEntry]) {
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert(owner.clone(), snapshot.to_vec());
    }
}

#[async_trait::async_trait]
impl TrackingBackend for MemoryBackend {
    async fn load(&self, owner: &UserId) -> AppResult<Vec<TrackingEntry>> {
        let entries = self
            .entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        Ok(entries.get(owner).cloned().unwrap_or_default())
    }

    async fn save(
        &self,
        owner: &UserId,
        snapshot: &[TrackingEntry],
        _entry: &TrackingEntry,
    ) -> AppResult<Option<RecordId>> {
        self.replace(owner, snapshot);
        Ok(None)
    }

    async fn remove(
        &self,
        owner: &UserId,
        snapshot: &[TrackingEntry],
        _entry: &TrackingEntry,
    ) -> AppResult<()> {
        self.replace(owner, snapshot);
        Ok(())
    }

    fn new_record_id(&self) -> Option<RecordId> {
        None
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}
