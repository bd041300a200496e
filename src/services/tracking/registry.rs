use std::{
    collections::HashMap,
    sync::{Arc, Mutex, MutexGuard, Weak},
    time::Duration,
};
use tokio::sync::OnceCell;

use super::{TrackingBackend, TrackingStore};
use crate::{error::AppResult, models::UserId, services::notifications::Notifier};

pub const DEFAULT_STORE_CAPACITY: usize = 1000;

struct Slot {
    store: Arc<OnceCell<Arc<TrackingStore>>>,
    notifier: Notifier,
    last_used: u64,
}

impl Slot {
    fn is_loading(&self) -> bool {
        self.store.get().is_none() && Arc::strong_count(&self.store) > 1
    }
}

/// A store pushed out of the registry while requests may still hold it
struct Detached {
    store: Weak<TrackingStore>,
    notifier: Notifier,
}

#[derive(Default)]
struct Slots {
    active: HashMap<UserId, Slot>,
    detached: HashMap<UserId, Detached>,
    clock: u64,
}

/// Lazily loaded tracking stores and notifiers, one per signed-in user
///
/// A store is loaded from the backend the first time its owner shows up and
/// reused afterwards. Concurrent first requests for one owner load it once,
/// and a failed load is not remembered so the next request tries again.
///
/// At most `capacity` owners are kept; the least recently used one is dropped
/// first. A dropped store that some request still holds is handed back on the
/// owner's next access instead of being loaded a second time.
pub struct StoreRegistry {
    backend: Arc<dyn TrackingBackend>,
    notification_duration: Duration,
    capacity: usize,
    slots: Mutex<Slots>,
}

impl StoreRegistry {
    pub fn new(backend: Arc<dyn TrackingBackend>, notification_duration: Duration, capacity: usize) -> Self {
        Self {
            backend,
            notification_duration,
            capacity: capacity.max(1),
            slots: Mutex::new(Slots::default()),
        }
    }

    pub async fn store_for(&self, owner: &UserId) -> AppResult<Arc<TrackingStore>> {
        let (cell, notifier) = self.slot(owner);

        let store = cell
            .get_or_try_init(|| async {
                TrackingStore::load(owner.clone(), Arc::clone(&self.backend), notifier.clone())
                    .await
                    .map(Arc::new)
            })
            .await?;

        Ok(Arc::clone(store))
    }

    /// The owner's notification channel, without loading their store
    pub fn notifier_for(&self, owner: &UserId) -> Notifier {
        self.slot(owner).1
    }

    /// Forgets a cached store; the next access reloads it from the backend
    /// unless a request is still using it
    pub fn evict(&self, owner: &UserId) -> bool {
        let mut slots = self.lock();
        let evicted = Self::detach(&mut slots, owner);
        if evicted {
            tracing::info!(owner = %owner, "Tracking store evicted");
        }
        evicted
    }

    /// Number of owners with a loaded store
    pub fn loaded_count(&self) -> usize {
        self.lock()
            .active
            .values()
            .filter(|slot| slot.store.initialized())
            .count()
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    fn lock(&self) -> MutexGuard<'_, Slots> {
        self.slots.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn slot(&self, owner: &UserId) -> (Arc<OnceCell<Arc<TrackingStore>>>, Notifier) {
        let mut slots = self.lock();
        slots.clock += 1;
        let now = slots.clock;

        if let Some(slot) = slots.active.get_mut(owner) {
            slot.last_used = now;
            return (Arc::clone(&slot.store), slot.notifier.clone());
        }

        let slot = match slots.detached.remove(owner) {
            Some(detached) => {
                let store = detached.store.upgrade();
                if store.is_some() {
                    tracing::debug!(owner = %owner, "Reattaching tracking store still in use");
                }
                Slot {
                    store: Arc::new(OnceCell::new_with(store)),
                    notifier: detached.notifier,
                    last_used: now,
                }
            }
            None => Slot {
                store: Arc::new(OnceCell::new()),
                notifier: Notifier::new(self.notification_duration),
                last_used: now,
            },
        };

        let handles = (Arc::clone(&slot.store), slot.notifier.clone());
        slots.active.insert(owner.clone(), slot);
        self.shrink(&mut slots, owner);
        handles
    }

    fn shrink(&self, slots: &mut Slots, keep: &UserId) {
        while slots.active.len() > self.capacity {
            let oldest = slots
                .active
                .iter()
                .filter(|(owner, slot)| *owner != keep && !slot.is_loading())
                .min_by_key(|(_, slot)| slot.last_used)
                .map(|(owner, _)| owner.clone());

            let Some(oldest) = oldest else {
                break;
            };
            tracing::debug!(owner = %oldest, capacity = self.capacity, "Dropping least recently used tracking store");
            Self::detach(slots, &oldest);
        }
    }

    fn detach(slots: &mut Slots, owner: &UserId) -> bool {
        let Some(slot) = slots.active.remove(owner) else {
            return false;
        };

        slots.detached.retain(|_, detached| detached.store.strong_count() > 0);

        if let Some(store) = slot.store.get() {
            if Arc::strong_count(store) > 1 {
                slots.detached.insert(
                    owner.clone(),
                    Detached {
                        store: Arc::downgrade(store),
                        notifier: slot.notifier,
                    },
                );
            }
        }
        true
    }
}
