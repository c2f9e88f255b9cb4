//! Keyed query cache with cooperative cancellation of in-flight reads.
//!
//! Entries and in-flight read registrations live behind a single mutex, so a
//! read's "am I still current?" check and its write happen as one step. Once
//! `cancel` has removed a registration no completion from that read can reach
//! the entry map. Concurrent reads of one key share a single load; only
//! `cancel` and `cancel_and_update` abort a read.

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use metrics::counter;
use thiserror::Error;
use time::OffsetDateTime;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::keys::QueryKey;
use super::lock::mutex_lock;

const SOURCE: &str = "cache::store";

pub(crate) const METRIC_CACHE_HIT: &str = "likefeed_cache_hit_total";
pub(crate) const METRIC_CACHE_MISS: &str = "likefeed_cache_miss_total";
pub(crate) const METRIC_FETCH_CANCELLED: &str = "likefeed_cache_fetch_cancelled_total";

/// Lifecycle marker carried by every entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryStatus {
    /// Written by a completed read.
    Fresh,
    /// Marked for refetch; the next read through `ensure` goes to the source.
    Stale,
    /// Written by an optimistic patch rather than a read. The remote side
    /// may or may not have confirmed it; only a later read replaces it.
    Pending,
}

/// An immutable cached value. Replacing an entry never alters earlier copies.
#[derive(Debug, PartialEq)]
pub struct CacheEntry<T> {
    pub data: Arc<T>,
    pub status: EntryStatus,
    pub updated_at: OffsetDateTime,
}

impl<T> Clone for CacheEntry<T> {
    fn clone(&self) -> Self {
        Self {
            data: Arc::clone(&self.data),
            status: self.status,
            updated_at: self.updated_at,
        }
    }
}

impl<T> CacheEntry<T> {
    pub fn fresh(data: T) -> Self {
        Self::with_status(data, EntryStatus::Fresh)
    }

    pub fn with_status(data: T, status: EntryStatus) -> Self {
        Self {
            data: Arc::new(data),
            status,
            updated_at: OffsetDateTime::now_utc(),
        }
    }

    /// A new entry holding an optimistic value.
    pub fn patched(&self, data: T) -> Self {
        Self::with_status(data, EntryStatus::Pending)
    }

    /// The same data marked for refetch.
    pub fn stale(&self) -> Self {
        Self {
            data: Arc::clone(&self.data),
            status: EntryStatus::Stale,
            updated_at: self.updated_at,
        }
    }

    pub fn data(&self) -> &T {
        &self.data
    }
}

#[derive(Debug, Error)]
pub enum CacheError<E> {
    #[error("read for `{0}` was cancelled")]
    Cancelled(QueryKey),
    #[error(transparent)]
    Source(E),
}

/// Progress of one in-flight read as seen by callers waiting on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ReadState {
    Running,
    Completed,
    Failed,
    Cancelled,
}

struct InFlight {
    generation: u64,
    token: CancellationToken,
    state: watch::Receiver<ReadState>,
}

/// How a caller of `fetch` takes part in the read for a key.
enum Registration {
    Leader {
        generation: u64,
        token: CancellationToken,
        state: watch::Sender<ReadState>,
    },
    Joined(watch::Receiver<ReadState>),
}

struct CacheState<T> {
    entries: HashMap<QueryKey, CacheEntry<T>>,
    in_flight: HashMap<QueryKey, InFlight>,
}

/// Keyed store of fetched results.
pub struct QueryCache<T> {
    state: Mutex<CacheState<T>>,
    next_generation: AtomicU64,
}

impl<T> QueryCache<T> {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(CacheState {
                entries: HashMap::new(),
                in_flight: HashMap::new(),
            }),
            next_generation: AtomicU64::new(0),
        }
    }

    pub fn get(&self, key: &QueryKey) -> Option<CacheEntry<T>> {
        mutex_lock(&self.state, SOURCE, "get")
            .entries
            .get(key)
            .cloned()
    }

    /// Replace the entry for `key` in one step.
    pub fn write(&self, key: QueryKey, entry: CacheEntry<T>) {
        mutex_lock(&self.state, SOURCE, "write")
            .entries
            .insert(key, entry);
    }

    /// Replace the entry for `key` with `patch(current)` and return the entry it replaced.
    ///
    /// Snapshot and write happen under one lock acquisition. Absent entries are
    /// left absent and `patch` is not called.
    pub fn update(
        &self,
        key: &QueryKey,
        patch: impl FnOnce(&CacheEntry<T>) -> CacheEntry<T>,
    ) -> Option<CacheEntry<T>> {
        let mut state = mutex_lock(&self.state, SOURCE, "update");
        let entry = state.entries.get_mut(key)?;
        let patched = patch(entry);
        Some(std::mem::replace(entry, patched))
    }

    /// Mark the entry for `key` stale. Returns false when there is no entry.
    pub fn invalidate(&self, key: &QueryKey) -> bool {
        self.update(key, CacheEntry::stale).is_some()
    }

    pub fn is_fetching(&self, key: &QueryKey) -> bool {
        mutex_lock(&self.state, SOURCE, "is_fetching")
            .in_flight
            .contains_key(key)
    }

    pub fn len(&self) -> usize {
        mutex_lock(&self.state, SOURCE, "len").entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Abort any in-flight read for `key` and wait until it has stopped.
    ///
    /// Never writes the entry itself. When this returns, the aborted read can
    /// no longer write to the cache.
    pub async fn cancel(&self, key: &QueryKey) {
        let in_flight = mutex_lock(&self.state, SOURCE, "cancel")
            .in_flight
            .remove(key);

        if let Some(in_flight) = in_flight {
            abort(key, in_flight).await;
        }
    }

    /// Abort every read of `key`, then replace its entry with `patch(current)`.
    ///
    /// Reads that register while an earlier one is being aborted are aborted
    /// too. The patch runs under the lock acquisition that found no read
    /// registered, so no read pending at that moment can land afterwards.
    /// Returns the replaced entry; an absent entry stays absent.
    pub async fn cancel_and_update(
        &self,
        key: &QueryKey,
        patch: impl FnOnce(&CacheEntry<T>) -> CacheEntry<T>,
    ) -> Option<CacheEntry<T>> {
        loop {
            let in_flight = {
                let mut state = mutex_lock(&self.state, SOURCE, "cancel_and_update");
                match state.in_flight.remove(key) {
                    Some(in_flight) => in_flight,
                    None => {
                        let entry = state.entries.get_mut(key)?;
                        let patched = patch(entry);
                        return Some(std::mem::replace(entry, patched));
                    }
                }
            };
            abort(key, in_flight).await;
        }
    }

    /// Load `key` through `loader` and store the result as a fresh entry.
    ///
    /// A read already in flight for `key` is joined instead of started twice;
    /// `loader` only runs when there is none or the joined read failed. The
    /// result is discarded if the read is cancelled before it completes.
    pub async fn fetch<F, E>(&self, key: &QueryKey, loader: F) -> Result<CacheEntry<T>, CacheError<E>>
    where
        F: Future<Output = Result<T, E>>,
    {
        loop {
            match self.register(key) {
                Registration::Leader {
                    generation,
                    token,
                    state,
                } => return self.lead(key, generation, token, state, loader).await,
                Registration::Joined(state) => match settled(state).await {
                    ReadState::Completed => {
                        if let Some(entry) = self.get(key) {
                            return Ok(entry);
                        }
                    }
                    ReadState::Cancelled => return Err(CacheError::Cancelled(key.clone())),
                    ReadState::Failed | ReadState::Running => {
                        debug!(query = %key, "joined read did not complete, reading again");
                    }
                },
            }
        }
    }

    /// Return the cached entry unless it is missing or stale, otherwise read through `loader`.
    pub async fn ensure<F, Fut, E>(
        &self,
        key: &QueryKey,
        loader: F,
    ) -> Result<CacheEntry<T>, CacheError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        if let Some(entry) = self.get(key).filter(|entry| entry.status != EntryStatus::Stale) {
            counter!(METRIC_CACHE_HIT, "query" => key.name()).increment(1);
            return Ok(entry);
        }

        counter!(METRIC_CACHE_MISS, "query" => key.name()).increment(1);
        self.fetch(key, loader()).await
    }

    fn register(&self, key: &QueryKey) -> Registration {
        let mut state = mutex_lock(&self.state, SOURCE, "fetch.register");
        if let Some(in_flight) = state.in_flight.get(key) {
            debug!(query = %key, generation = in_flight.generation, "joining in-flight read");
            return Registration::Joined(in_flight.state.clone());
        }

        let generation = self.next_generation.fetch_add(1, Ordering::SeqCst);
        let token = CancellationToken::new();
        let (state_tx, state_rx) = watch::channel(ReadState::Running);
        state.in_flight.insert(
            key.clone(),
            InFlight {
                generation,
                token: token.clone(),
                state: state_rx,
            },
        );
        Registration::Leader {
            generation,
            token,
            state: state_tx,
        }
    }

    async fn lead<F, E>(
        &self,
        key: &QueryKey,
        generation: u64,
        token: CancellationToken,
        state: watch::Sender<ReadState>,
        loader: F,
    ) -> Result<CacheEntry<T>, CacheError<E>>
    where
        F: Future<Output = Result<T, E>>,
    {
        let guard = InFlightGuard {
            cache: self,
            key,
            generation,
        };

        let result = tokio::select! {
            biased;
            _ = token.cancelled() => None,
            result = loader => Some(result),
        };

        let (outcome, read_state) = match result {
            None => (Err(CacheError::Cancelled(key.clone())), ReadState::Cancelled),
            Some(Err(err)) => (Err(CacheError::Source(err)), ReadState::Failed),
            Some(Ok(data)) => match self.complete(key, generation, data) {
                Ok(entry) => (Ok(entry), ReadState::Completed),
                Err(err) => (Err(err), ReadState::Cancelled),
            },
        };

        drop(guard);
        state.send_replace(read_state);
        outcome
    }

    fn complete<E>(
        &self,
        key: &QueryKey,
        generation: u64,
        data: T,
    ) -> Result<CacheEntry<T>, CacheError<E>> {
        let mut state = mutex_lock(&self.state, SOURCE, "fetch.complete");
        let current = state
            .in_flight
            .get(key)
            .is_some_and(|in_flight| in_flight.generation == generation);
        if !current {
            debug!(query = %key, generation, "discarding result of cancelled read");
            return Err(CacheError::Cancelled(key.clone()));
        }

        state.in_flight.remove(key);
        let entry = CacheEntry::fresh(data);
        state.entries.insert(key.clone(), entry.clone());
        Ok(entry)
    }

    fn release(&self, key: &QueryKey, generation: u64) {
        let mut state = mutex_lock(&self.state, SOURCE, "fetch.release");
        if state
            .in_flight
            .get(key)
            .is_some_and(|in_flight| in_flight.generation == generation)
        {
            state.in_flight.remove(key);
        }
    }
}

impl<T> Default for QueryCache<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Cancel a read whose registration the caller already removed and wait for it to stop.
async fn abort(key: &QueryKey, in_flight: InFlight) {
    in_flight.token.cancel();
    counter!(METRIC_FETCH_CANCELLED, "query" => key.name()).increment(1);
    debug!(query = %key, generation = in_flight.generation, "cancelling in-flight read");
    settled(in_flight.state).await;
}

/// Wait until a read leaves `Running`. A read dropped mid-await counts as failed.
async fn settled(mut state: watch::Receiver<ReadState>) -> ReadState {
    let settled = match state.wait_for(|read| *read != ReadState::Running).await {
        Ok(read) => *read,
        Err(_) => ReadState::Failed,
    };
    settled
}

/// Drops the in-flight registration of a read that ends without completing,
/// including when its future is dropped mid-await.
struct InFlightGuard<'a, T> {
    cache: &'a QueryCache<T>,
    key: &'a QueryKey,
    generation: u64,
}

impl<T> Drop for InFlightGuard<'_, T> {
    fn drop(&mut self) {
        self.cache.release(self.key, self.generation);
    }
}
