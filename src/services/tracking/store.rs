use chrono::Utc;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::Mutex as AsyncMutex;

use super::TrackingBackend;
use crate::{
    error::AppResult,
    models::{MovieId, MovieRecord, RecordId, TrackingEntry, UserId, WatchStatus},
    services::{
        notifications::Notifier,
        subject::{Subject, Subscription},
    },
};

const LOAD_FAILED: &str = "Failed to load your movie lists. Please try again.";
const ADD_FAILED: &str = "Failed to add movie. Please try again.";
const UPDATE_FAILED: &str = "Failed to update movie status. Please try again.";
const REMOVE_FAILED: &str = "Failed to remove movie. Please try again.";

/// Result of a mutation
///
/// The in-memory change always stands; `persisted` says whether the durable
/// write went through as well.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Outcome<T> {
    pub value: T,
    pub persisted: bool,
}

enum Change {
    Inserted,
    Updated,
}

/// One user's tracked movies
///
/// The snapshot is authoritative and is updated before anything is written
/// to the backend, so reads always see the latest accepted mutation even when
/// the durable write is still running or has failed.
pub struct TrackingStore {
    owner: UserId,
    backend: Arc<dyn TrackingBackend>,
    notifier: Notifier,
    snapshot: Subject<Vec<TrackingEntry>>,
    /// Serializes durable writes so the backend sees them in snapshot order
    write_lock: AsyncMutex<()>,
}

impl TrackingStore {
    /// Seeds a store from the backend
    ///
    /// Malformed stored entries are dropped by the backend. A backend that
    /// cannot be read at all is reported to `notifier` and yields an error, so
    /// no store is built that would later overwrite the unread data.
    pub async fn load(
        owner: UserId,
        backend: Arc<dyn TrackingBackend>,
        notifier: Notifier,
    ) -> AppResult<Self> {
        let entries = match backend.load(&owner).await {
            Ok(entries) => normalize(&owner, entries),
            Err(e) => {
                tracing::error!(
                    error = %e,
                    owner = %owner,
                    backend = backend.name(),
                    "Failed to load tracked movies"
                );
                notifier.error(LOAD_FAILED);
                return Err(e);
            }
        };

        tracing::info!(
            owner = %owner,
            entries = entries.len(),
            backend = backend.name(),
            "Tracking store loaded"
        );

        Ok(Self {
            owner,
            backend,
            notifier,
            snapshot: Subject::new(entries),
            write_lock: AsyncMutex::new(()),
        })
    }

    /// Puts `movie_id` on the `status` list, creating or updating its entry
    pub async fn track_movie(&self, movie_id: MovieId, status: WatchStatus) -> Outcome<TrackingEntry> {
        self.track(movie_id, status, None).await
    }

    /// Like [`track_movie`](Self::track_movie), embedding the catalog record
    pub async fn track_record(&self, movie: MovieRecord, status: WatchStatus) -> Outcome<TrackingEntry> {
        let movie = movie.normalized();
        self.track(movie.id, status, Some(movie)).await
    }

    async fn track(
        &self,
        movie_id: MovieId,
        status: WatchStatus,
        movie: Option<MovieRecord>,
    ) -> Outcome<TrackingEntry> {
        let now = Utc::now();
        let record_id = self.backend.new_record_id();

        let (mut entry, change) = self.snapshot.update(|entries| {
            if let Some(existing) = entries.iter_mut().find(|e| e.movie_id == movie_id) {
                existing.restamp(status, now);
                if movie.is_some() {
                    existing.movie = movie;
                }
                return (existing.clone(), Change::Updated);
            }

            let mut entry = TrackingEntry::new(self.owner.clone(), movie_id, status, now);
            entry.record_id = record_id;
            entry.movie = movie;
            entries.push(entry.clone());
            (entry, Change::Inserted)
        });

        tracing::info!(
            owner = %self.owner,
            movie_id,
            status = %status,
            backend = self.backend.name(),
            "Movie tracked"
        );

        let result = self.persist(movie_id, &entry).await;
        if let Ok(Some(stored)) = result {
            entry.record_id = Some(stored);
        }

        let persisted = match (result, change) {
            (Ok(_), Change::Inserted) => {
                let message = match &entry.movie {
                    Some(movie) => format!("\"{}\" added to your {} list", movie.title, status),
                    None => format!("Movie added to your {} list", status),
                };
                self.notifier.success(message);
                true
            }
            (Ok(_), Change::Updated) => {
                self.notifier
                    .success(format!("Movie status updated to {}", status));
                true
            }
            (Err(e), change) => {
                tracing::error!(
                    error = %e,
                    owner = %self.owner,
                    movie_id,
                    backend = self.backend.name(),
                    "Failed to persist tracked movie"
                );
                self.notifier.error(match change {
                    Change::Inserted => ADD_FAILED,
                    Change::Updated => UPDATE_FAILED,
                });
                false
            }
        };

        Outcome {
            value: entry,
            persisted,
        }
    }

    /// Takes `movie_id` off every list; a no-op if it isn't tracked
    pub async fn remove_tracking(&self, movie_id: MovieId) -> Outcome<Option<TrackingEntry>> {
        let removed = self.snapshot.update_if(|entries| {
            let index = entries.iter().position(|e| e.movie_id == movie_id)?;
            Some(entries.remove(index))
        });

        let Some(entry) = removed else {
            tracing::debug!(owner = %self.owner, movie_id, "Removal of untracked movie ignored");
            return Outcome {
                value: None,
                persisted: true,
            };
        };

        tracing::info!(
            owner = %self.owner,
            movie_id,
            backend = self.backend.name(),
            "Movie removed"
        );

        let persisted = match self.persist(movie_id, &entry).await {
            Ok(_) => {
                self.notifier.success("Movie removed from your list");
                true
            }
            Err(e) => {
                tracing::error!(
                    error = %e,
                    owner = %self.owner,
                    movie_id,
                    backend = self.backend.name(),
                    "Failed to persist movie removal"
                );
                self.notifier.error(REMOVE_FAILED);
                false
            }
        };

        Outcome {
            value: Some(entry),
            persisted,
        }
    }

    /// Writes the current state of `movie_id` to the backend
    ///
    /// Runs under the write lock and reads the snapshot only once the lock is
    /// held: a tracked movie is saved as it stands now, an untracked one is
    /// removed using `fallback`. A write queued behind newer mutations
    /// therefore never replays older state. A record id reported by the
    /// backend replaces the proposed one in the snapshot.
    async fn persist(&self, movie_id: MovieId, fallback: &TrackingEntry) -> AppResult<Option<RecordId>> {
        let _guard = self.write_lock.lock().await;
        let snapshot = self.snapshot.get();

        let Some(current) = snapshot.iter().find(|e| e.movie_id == movie_id) else {
            self.backend.remove(&self.owner, &snapshot, fallback).await?;
            return Ok(None);
        };

        let stored = self.backend.save(&self.owner, &snapshot, current).await?;

        if let Some(id) = stored.filter(|id| current.record_id != Some(*id)) {
            tracing::debug!(
                owner = %self.owner,
                movie_id,
                record_id = %id,
                "Adopting stored record id"
            );
            self.snapshot.update_if(|entries| {
                let entry = entries.iter_mut().find(|e| e.movie_id == movie_id)?;
                entry.record_id = Some(id);
                Some(())
            });
        }

        Ok(stored)
    }

    /// Removes the entry holding backend handle `record_id`, if any
    pub async fn remove_record(&self, record_id: RecordId) -> Outcome<Option<TrackingEntry>> {
        let movie_id = self
            .snapshot
            .get()
            .iter()
            .find(|e| e.record_id == Some(record_id))
            .map(|e| e.movie_id);

        match movie_id {
            Some(movie_id) => self.remove_tracking(movie_id).await,
            None => Outcome {
                value: None,
                persisted: true,
            },
        }
    }

    pub fn get_movie_status(&self, movie_id: MovieId) -> Option<TrackingEntry> {
        self.snapshot
            .get()
            .into_iter()
            .find(|e| e.movie_id == movie_id)
    }

    /// Entries currently on the `status` list
    ///
    /// Order follows the snapshot and is not guaranteed across backends.
    pub fn get_movies_by_status(&self, status: WatchStatus) -> Vec<TrackingEntry> {
        self.snapshot
            .get()
            .into_iter()
            .filter(|e| e.status == status)
            .collect()
    }

    pub fn entries(&self) -> Vec<TrackingEntry> {
        self.snapshot.get()
    }

    pub fn len(&self) -> usize {
        self.snapshot.get().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Observes the full snapshot, starting with the current one
    pub fn subscribe<F>(&self, observer: F) -> Subscription
    where
        F: Fn(&Vec<TrackingEntry>) + Send + Sync + 'static,
    {
        self.snapshot.subscribe(observer)
    }
}

/// Drops entries that belong to someone else and collapses duplicates
///
/// When a movie appears more than once the most recently updated entry wins
/// and keeps the position of the first occurrence.
fn normalize(owner: &UserId, entries: Vec<TrackingEntry>) -> Vec<TrackingEntry> {
    let mut normalized: Vec<TrackingEntry> = Vec::with_capacity(entries.len());

    for entry in entries {
        if &entry.owner_id != owner {
            tracing::warn!(
                owner = %owner,
                found_owner = %entry.owner_id,
                movie_id = entry.movie_id,
                "Ignoring stored entry for another owner"
            );
            continue;
        }

        match normalized.iter_mut().find(|e| e.movie_id == entry.movie_id) {
            Some(existing) => {
                tracing::warn!(owner = %owner, movie_id = entry.movie_id, "Collapsing duplicate stored entry");
                if entry.last_updated > existing.last_updated {
                    *existing = entry;
                }
            }
            None => normalized.push(entry),
        }
    }

    normalized
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::MemoryBackend;
    use crate::error::AppError;
    use crate::services::notifications::NotificationKind;
    use crate::services::tracking::MockTrackingBackend;
    use chrono::Duration;
    use std::sync::Mutex;

    fn alice() -> UserId {
        UserId::parse("alice").unwrap()
    }

    async fn memory_store() -> (TrackingStore, Notifier) {
        let notifier = Notifier::default();
        let store = TrackingStore::load(alice(), Arc::new(MemoryBackend::new()), notifier.clone())
            .await
            .unwrap();
        (store, notifier)
    }

    fn ids(entries: &[TrackingEntry]) -> Vec<MovieId> {
        entries.iter().map(|e| e.movie_id).collect()
    }

    #[tokio::test]
    async fn test_track_then_status_for_every_value() {
        let (store, _) = memory_store().await;

        for status in WatchStatus::ALL {
            let outcome = store.track_movie(7, status).await;
            assert!(outcome.persisted);
            assert_eq!(store.get_movie_status(7).unwrap().status, status);
        }
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_tracking_twice_is_idempotent() {
        let (store, _) = memory_store().await;
        store.track_movie(1, WatchStatus::Watched).await;
        store.track_movie(2, WatchStatus::WantToWatch).await;
        let before = store.len();

        store.track_movie(2, WatchStatus::WantToWatch).await;
        store.track_movie(2, WatchStatus::WantToWatch).await;

        assert_eq!(store.len(), before);
        assert_eq!(ids(&store.get_movies_by_status(WatchStatus::WantToWatch)), vec![2]);
    }

    #[tokio::test]
    async fn test_remove_tracked_and_untracked() {
        let (store, notifier) = memory_store().await;
        store.track_movie(10, WatchStatus::InProgress).await;

        let removed = store.remove_tracking(10).await;
        assert_eq!(removed.value.map(|e| e.movie_id), Some(10));
        assert!(store.get_movie_status(10).is_none());
        assert_eq!(notifier.current().unwrap().message, "Movie removed from your list");

        let removed = store.remove_tracking(11).await;
        assert_eq!(removed.value, None);
        assert!(removed.persisted);
        assert!(store.get_movie_status(11).is_none());
    }

    #[tokio::test]
    async fn test_want_to_watch_then_watched_moves_lists() {
        let (store, _) = memory_store().await;

        store.track_movie(42, WatchStatus::WantToWatch).await;
        assert!(ids(&store.get_movies_by_status(WatchStatus::WantToWatch)).contains(&42));

        store.track_movie(42, WatchStatus::Watched).await;
        assert!(!ids(&store.get_movies_by_status(WatchStatus::WantToWatch)).contains(&42));
        assert!(ids(&store.get_movies_by_status(WatchStatus::Watched)).contains(&42));
    }

    #[tokio::test]
    async fn test_random_mutation_sequences_keep_invariants() {
        let (store, _) = memory_store().await;
        let mut expected: std::collections::HashMap<MovieId, WatchStatus> = Default::default();

        // Small LCG keeps the sequence deterministic
        let mut seed: u64 = 0x2545_f491_4f6c_dd1d;
        let mut next = move || {
            seed = seed.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
            seed >> 33
        };

        for _ in 0..300 {
            let movie_id = next() % 12;
            if next() % 4 == 0 {
                store.remove_tracking(movie_id).await;
                expected.remove(&movie_id);
            } else {
                let status = WatchStatus::ALL[(next() % 3) as usize];
                store.track_movie(movie_id, status).await;
                expected.insert(movie_id, status);
            }

            let entries = store.entries();
            let mut seen = ids(&entries);
            seen.sort_unstable();
            seen.dedup();
            assert_eq!(seen.len(), entries.len(), "duplicate entry for a movie");
        }

        assert_eq!(store.len(), expected.len());
        for status in WatchStatus::ALL {
            let mut actual = ids(&store.get_movies_by_status(status));
            actual.sort_unstable();
            let mut wanted: Vec<MovieId> = expected
                .iter()
                .filter(|(_, s)| **s == status)
                .map(|(id, _)| *id)
                .collect();
            wanted.sort_unstable();
            assert_eq!(actual, wanted);
        }
    }

    #[tokio::test]
    async fn test_subscribe_replays_and_tracks_changes() {
        let (store, _) = memory_store().await;
        store.track_movie(1, WatchStatus::Watched).await;

        let sizes = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&sizes);
        let subscription = store.subscribe(move |entries| sink.lock().unwrap().push(entries.len()));

        store.track_movie(2, WatchStatus::Watched).await;
        store.remove_tracking(99).await;
        store.remove_tracking(1).await;
        subscription.unsubscribe();
        store.track_movie(3, WatchStatus::Watched).await;

        assert_eq!(*sizes.lock().unwrap(), vec![1, 2, 1]);
    }

    #[tokio::test]
    async fn test_backend_failure_keeps_optimistic_state() {
        let mut backend = MockTrackingBackend::new();
        backend.expect_load().returning(|_| Ok(vec![]));
        backend.expect_new_record_id().return_const(None::<RecordId>);
        backend.expect_name().return_const("mock");
        backend
            .expect_save()
            .times(1)
            .returning(|_, _, _| Err(AppError::Persistence("disk full".to_string())));

        let notifier = Notifier::default();
        let store = TrackingStore::load(alice(), Arc::new(backend), notifier.clone()).await.unwrap();

        let outcome = store.track_movie(5, WatchStatus::InProgress).await;

        assert!(!outcome.persisted);
        assert_eq!(store.get_movie_status(5).unwrap().status, WatchStatus::InProgress);
        let shown = notifier.current().unwrap();
        assert_eq!(shown.kind, NotificationKind::Error);
        assert_eq!(shown.message, ADD_FAILED);
    }

    #[tokio::test]
    async fn test_failed_update_reports_update_message() {
        let mut backend = MockTrackingBackend::new();
        let now = Utc::now();
        backend
            .expect_load()
            .returning(move |owner| Ok(vec![TrackingEntry::new(owner.clone(), 5, WatchStatus::WantToWatch, now)]));
        backend.expect_new_record_id().return_const(None::<RecordId>);
        backend.expect_name().return_const("mock");
        backend
            .expect_save()
            .returning(|_, _, _| Err(AppError::Persistence("timeout".to_string())));

        let notifier = Notifier::default();
        let store = TrackingStore::load(alice(), Arc::new(backend), notifier.clone()).await.unwrap();
        store.track_movie(5, WatchStatus::Watched).await;

        assert_eq!(store.get_movie_status(5).unwrap().status, WatchStatus::Watched);
        assert_eq!(notifier.current().unwrap().message, UPDATE_FAILED);
    }

    #[tokio::test]
    async fn test_load_failure_is_reported_and_returned() {
        let mut backend = MockTrackingBackend::new();
        backend
            .expect_load()
            .returning(|_| Err(AppError::Persistence("unreadable".to_string())));
        backend.expect_name().return_const("mock");
        backend.expect_save().never();

        let notifier = Notifier::default();
        let result = TrackingStore::load(alice(), Arc::new(backend), notifier.clone()).await;

        assert!(matches!(result, Err(AppError::Persistence(_))));
        assert_eq!(notifier.current().unwrap().message, LOAD_FAILED);
    }

    #[tokio::test]
    async fn test_save_receives_updated_snapshot() {
        let mut backend = MockTrackingBackend::new();
        backend.expect_load().returning(|_| Ok(vec![]));
        backend.expect_new_record_id().return_const(None::<RecordId>);
        backend.expect_name().return_const("mock");
        backend
            .expect_save()
            .withf(|_, snapshot, entry| {
                snapshot.len() == 1
                    && snapshot[0].movie_id == entry.movie_id
                    && entry.status == WatchStatus::Watched
            })
            .times(1)
            .returning(|_, _, _| Ok(None));

        let store = TrackingStore::load(alice(), Arc::new(backend), Notifier::default()).await.unwrap();
        store.track_movie(8, WatchStatus::Watched).await;
    }

    #[tokio::test]
    async fn test_track_record_embeds_movie_and_keeps_it() {
        let (store, notifier) = memory_store().await;
        let movie = MovieRecord {
            id: 603,
            title: "The Matrix".to_string(),
            overview: String::new(),
            poster_path: None,
            release_date: Some("1999-03-30".to_string()),
            vote_average: Some(8.2),
        };

        store.track_record(movie.clone(), WatchStatus::WantToWatch).await;
        assert_eq!(
            notifier.current().unwrap().message,
            "\"The Matrix\" added to your want-to-watch list"
        );

        store.track_movie(603, WatchStatus::Watched).await;
        assert_eq!(notifier.current().unwrap().message, "Movie status updated to watched");
        assert_eq!(store.get_movie_status(603).unwrap().movie, Some(movie));
    }

    #[tokio::test]
    async fn test_remove_record_by_backend_handle() {
        let record_id = uuid::Uuid::new_v4();
        let mut backend = MockTrackingBackend::new();
        backend.expect_load().returning(|_| Ok(vec![]));
        backend.expect_new_record_id().return_const(Some(record_id));
        backend.expect_name().return_const("mock");
        backend.expect_save().returning(|_, _, _| Ok(None));
        backend
            .expect_remove()
            .withf(move |_, snapshot, entry| snapshot.is_empty() && entry.record_id == Some(record_id))
            .times(1)
            .returning(|_, _, _| Ok(()));

        let store = TrackingStore::load(alice(), Arc::new(backend), Notifier::default()).await.unwrap();
        let tracked = store.track_movie(12, WatchStatus::InProgress).await;
        assert_eq!(tracked.value.record_id, Some(record_id));

        let missing = store.remove_record(uuid::Uuid::new_v4()).await;
        assert_eq!(missing.value, None);

        let removed = store.remove_record(record_id).await;
        assert_eq!(removed.value.map(|e| e.movie_id), Some(12));
        assert!(store.is_empty());
    }

    #[test]
    fn test_normalize_collapses_duplicates_and_foreign_entries() {
        let now = Utc::now();
        let owner = alice();
        let bob = UserId::parse("bob").unwrap();

        let entries = vec![
            TrackingEntry::new(owner.clone(), 1, WatchStatus::WantToWatch, now),
            TrackingEntry::new(owner.clone(), 2, WatchStatus::Watched, now),
            TrackingEntry::new(owner.clone(), 1, WatchStatus::InProgress, now + Duration::seconds(10)),
            TrackingEntry::new(owner.clone(), 2, WatchStatus::WantToWatch, now - Duration::seconds(10)),
            TrackingEntry::new(bob, 3, WatchStatus::Watched, now),
        ];

        let normalized = normalize(&owner, entries);

        assert_eq!(ids(&normalized), vec![1, 2]);
        assert_eq!(normalized[0].status, WatchStatus::InProgress);
        assert_eq!(normalized[1].status, WatchStatus::Watched);
    }

    #[tokio::test]
    async fn test_last_updated_never_decreases() {
        let (store, _) = memory_store().await;
        let first = store.track_movie(4, WatchStatus::WantToWatch).await.value.last_updated;
        let second = store.track_movie(4, WatchStatus::Watched).await.value.last_updated;
        assert!(second >= first);
    }
    #[tokio::test]
    async fn test_stored_record_id_replaces_proposed_one() {
        let proposed = uuid::Uuid::new_v4();
        let stored = uuid::Uuid::new_v4();
        let mut backend = MockTrackingBackend::new();
        backend.expect_load().returning(|_| Ok(vec![]));
        backend.expect_new_record_id().return_const(Some(proposed));
        backend.expect_name().return_const("mock");
        backend
            .expect_save()
            .withf(move |_, _, entry| entry.record_id == Some(proposed))
            .times(1)
            .returning(move |_, _, _| Ok(Some(stored)));
        backend
            .expect_remove()
            .withf(move |_, _, entry| entry.record_id == Some(stored))
            .times(1)
            .returning(|_, _, _| Ok(()));

        let store = TrackingStore::load(alice(), Arc::new(backend), Notifier::default()).await.unwrap();
        let tracked = store.track_movie(21, WatchStatus::Watched).await;

        assert_eq!(tracked.value.record_id, Some(stored));
        assert_eq!(store.get_movie_status(21).unwrap().record_id, Some(stored));
        assert_eq!(store.remove_record(stored).await.value.map(|e| e.movie_id), Some(21));
    }

    #[tokio::test]
    async fn test_queued_write_sends_current_state() {
        let saved = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&saved);
        let mut backend = MockTrackingBackend::new();
        backend.expect_load().returning(|_| Ok(vec![]));
        backend.expect_new_record_id().return_const(None::<RecordId>);
        backend.expect_name().return_const("mock");
        backend.expect_save().returning(move |_, _, entry| {
            sink.lock().unwrap().push(entry.status);
            Ok(None)
        });
        backend
            .expect_remove()
            .withf(|_, snapshot, entry| snapshot.is_empty() && entry.movie_id == 9)
            .times(2)
            .returning(|_, _, _| Ok(()));

        let store = TrackingStore::load(alice(), Arc::new(backend), Notifier::default()).await.unwrap();
        let stale = store.track_movie(9, WatchStatus::WantToWatch).await.value;
        store.track_movie(9, WatchStatus::Watched).await;

        // A write for the older mutation that only now gets its turn
        store.persist(9, &stale).await.unwrap();
        assert_eq!(
            *saved.lock().unwrap(),
            vec![WatchStatus::WantToWatch, WatchStatus::Watched, WatchStatus::Watched]
        );

        // Once the movie is gone the same write becomes a removal
        store.remove_tracking(9).await;
        store.persist(9, &stale).await.unwrap();
        assert_eq!(saved.lock().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_track_record_normalizes_movie() {
        let (store, _) = memory_store().await;
        let movie = MovieRecord {
            id: 77,
            title: "Loud".to_string(),
            overview: String::new(),
            poster_path: Some(" ".to_string()),
            release_date: Some(String::new()),
            vote_average: Some(42.0),
        };

        let tracked = store.track_record(movie, WatchStatus::Watched).await.value;
        let movie = tracked.movie.unwrap();

        assert_eq!(movie.poster_path, None);
        assert_eq!(movie.release_date, None);
        assert_eq!(movie.vote_average, Some(10.0));
    }
}
