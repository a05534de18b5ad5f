use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::sync::watch;
use tracing::{debug, warn};

use crate::error::RequestError;
use crate::types::{CacheEntry, CollectionKey};

/// Source of authoritative collection values, used for every refetch.
#[async_trait]
pub trait QueryFetcher<T>: Send + Sync {
    /// `Ok(None)` means the collection exists but has no value for this caller.
    async fn fetch(&self, key: &CollectionKey) -> Result<Option<T>, RequestError>;
}

struct Slot<T> {
    value: Option<T>,
    is_fetching: bool,
    is_stale: bool,
    invalidations: u64,
    // A fetch only lands if the slot's generation is unchanged when it
    // completes; bumping it orphans whatever is in flight.
    generation: u64,
    watch: watch::Sender<Option<T>>,
}

impl<T: Clone> Slot<T> {
    fn new() -> Self {
        let (watch, _) = watch::channel(None);
        Self {
            value: None,
            is_fetching: false,
            is_stale: false,
            invalidations: 0,
            generation: 0,
            watch,
        }
    }

    fn store(&mut self, value: Option<T>) {
        self.value = value.clone();
        self.watch.send_replace(value);
    }

    fn begin_fetch(&mut self) -> u64 {
        self.generation += 1;
        self.is_fetching = true;
        self.generation
    }
}

/// Shared last-known values per collection key, with staleness and
/// in-flight tracking.
///
/// Every operation except [`QueryCache::fetch`] is synchronous. The updater
/// passed to [`QueryCache::update`] runs while the slot is locked and must
/// not call back into the cache.
pub struct QueryCache<T> {
    slots: Arc<DashMap<CollectionKey, Slot<T>>>,
    fetcher: Arc<dyn QueryFetcher<T>>,
}

impl<T> Clone for QueryCache<T> {
    fn clone(&self) -> Self {
        Self {
            slots: self.slots.clone(),
            fetcher: self.fetcher.clone(),
        }
    }
}

impl<T> QueryCache<T>
where
    T: Clone + Send + Sync + 'static,
{
    pub fn new(fetcher: Arc<dyn QueryFetcher<T>>) -> Self {
        Self {
            slots: Arc::new(DashMap::new()),
            fetcher,
        }
    }

    pub fn get(&self, key: &str) -> Option<T> {
        self.slots.get(key).and_then(|slot| slot.value.clone())
    }

    pub fn entry(&self, key: &str) -> Option<CacheEntry<T>> {
        self.slots.get(key).map(|r| {
            let (key, slot) = r.pair();
            CacheEntry {
                key: key.clone(),
                value: slot.value.clone(),
                is_fetching: slot.is_fetching,
                is_stale: slot.is_stale,
                invalidations: slot.invalidations,
            }
        })
    }

    pub fn set(&self, key: &str, value: T) {
        self.restore(key, Some(value));
    }

    /// Like `set`, but can also put a slot back to "never populated".
    pub fn restore(&self, key: &str, value: Option<T>) {
        let mut slot = self.slot_mut(key);
        slot.store(value);
    }

    pub fn update<F>(&self, key: &str, updater: F)
    where
        F: FnOnce(Option<T>) -> T,
    {
        let mut slot = self.slot_mut(key);
        let next = updater(slot.value.clone());
        slot.store(Some(next));
    }

    /// Marks `key` stale. With live subscribers a background refetch starts
    /// right away, otherwise the next [`QueryCache::fetch`] picks it up.
    /// A key that is already stale and refetching is left alone.
    pub fn invalidate(&self, key: &str) {
        let runtime = tokio::runtime::Handle::try_current().ok();

        let generation = {
            let Some(mut slot) = self.slots.get_mut(key) else {
                debug!(collection_key = key, "invalidate for unknown key ignored");
                return;
            };
            slot.invalidations += 1;
            if slot.is_stale && slot.is_fetching {
                return;
            }
            slot.is_stale = true;
            if slot.watch.receiver_count() == 0 || runtime.is_none() {
                None
            } else {
                Some(slot.begin_fetch())
            }
        };

        if let (Some(generation), Some(runtime)) = (generation, runtime) {
            debug!(collection_key = key, generation, "refetching stale collection");
            self.spawn_fetch(&runtime, Arc::from(key), generation);
        }
    }

    /// Stops any in-progress fetch for `key` from writing its result.
    pub fn cancel_in_flight(&self, key: &str) {
        if let Some(mut slot) = self.slots.get_mut(key) {
            if slot.is_fetching {
                slot.generation += 1;
                slot.is_fetching = false;
                debug!(collection_key = key, "cancelled in-flight fetch");
            }
        }
    }

    /// Registers a consumer for `key`. The slot is fetched if it has no value
    /// or is stale and nothing is already loading it.
    pub fn subscribe(&self, key: &str) -> Subscription<T> {
        let runtime = tokio::runtime::Handle::try_current().ok();

        let (rx, generation) = {
            let mut slot = self.slot_mut(key);
            let rx = slot.watch.subscribe();
            let needs_fetch = (slot.value.is_none() || slot.is_stale) && !slot.is_fetching;
            let generation = match (&runtime, needs_fetch) {
                (Some(_), true) => Some(slot.begin_fetch()),
                _ => None,
            };
            (rx, generation)
        };

        if let (Some(generation), Some(runtime)) = (generation, runtime) {
            self.spawn_fetch(&runtime, Arc::from(key), generation);
        }

        Subscription { rx }
    }

    /// Fetch-on-read: serves the cached value when fresh, otherwise loads it.
    pub async fn fetch(&self, key: &str) -> Result<Option<T>, RequestError> {
        let generation = {
            let mut slot = self.slot_mut(key);
            if slot.value.is_some() && !slot.is_stale {
                return Ok(slot.value.clone());
            }
            slot.begin_fetch()
        };

        let key: CollectionKey = Arc::from(key);
        let result = self.fetcher.fetch(&key).await;
        self.complete_fetch(&key, generation, result.clone());
        result
    }

    pub fn subscriber_count(&self, key: &str) -> usize {
        self.slots
            .get(key)
            .map_or(0, |slot| slot.watch.receiver_count())
    }

    fn slot_mut(&self, key: &str) -> dashmap::mapref::one::RefMut<'_, CollectionKey, Slot<T>> {
        if let Some(slot) = self.slots.get_mut(key) {
            return slot;
        }
        self.slots.entry(Arc::from(key)).or_insert_with(Slot::new)
    }

    fn spawn_fetch(&self, runtime: &tokio::runtime::Handle, key: CollectionKey, generation: u64) {
        let cache = self.clone();
        runtime.spawn(async move {
            let result = cache.fetcher.fetch(&key).await;
            cache.complete_fetch(&key, generation, result);
        });
    }

    fn complete_fetch(
        &self,
        key: &CollectionKey,
        generation: u64,
        result: Result<Option<T>, RequestError>,
    ) {
        let Some(mut slot) = self.slots.get_mut(key) else {
            return;
        };
        if slot.generation != generation {
            debug!(collection_key = %key, generation, "discarding superseded fetch result");
            return;
        }
        slot.is_fetching = false;
        match result {
            Ok(value) => {
                slot.is_stale = false;
                slot.store(value);
            }
            Err(e) => {
                warn!(collection_key = %key, error = %e, "collection fetch failed");
            }
        }
    }
}

/// A live read consumer of one collection key. Dropping it unsubscribes.
pub struct Subscription<T> {
    rx: watch::Receiver<Option<T>>,
}

impl<T: Clone> Subscription<T> {
    pub fn current(&self) -> Option<T> {
        self.rx.borrow().clone()
    }

    /// Waits for the next value written to the slot. Returns `None` once the
    /// cache itself is gone.
    pub async fn changed(&mut self) -> Option<Option<T>> {
        self.rx.changed().await.ok()?;
        Some(self.rx.borrow_and_update().clone())
    }
}
