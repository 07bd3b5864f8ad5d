//! In-memory cache store: one entry per canonical key.
//!
//! The store is the single owner of cache state. All transitions happen
//! under one lock and are announced to the registered listener after the
//! lock is released, so observer callbacks may re-enter the store.

use chrono::Utc;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock, Weak};
use tracing::trace;

use super::entry::{CacheEntry, QuerySnapshot, QueryStatus};
use super::key::QueryKey;
use crate::error::Error;

/// Receives entry change notifications. Implemented by the subscription
/// manager; held weakly so the store never keeps its consumers alive.
pub(crate) trait StoreListener: Send + Sync {
  fn entry_changed(&self, key: &QueryKey, snapshot: &QuerySnapshot);
}

pub struct CacheStore {
  entries: Mutex<HashMap<QueryKey, CacheEntry>>,
  listener: RwLock<Option<Weak<dyn StoreListener>>>,
  /// Store-wide monotonic source for entry generations. A fetch issued
  /// before an entry was evicted and recreated can never match a fresh
  /// generation drawn from here.
  next_generation: AtomicU64,
}

impl CacheStore {
  pub fn new() -> Self {
    Self {
      entries: Mutex::new(HashMap::new()),
      listener: RwLock::new(None),
      next_generation: AtomicU64::new(1),
    }
  }

  pub(crate) fn set_listener(&self, listener: Weak<dyn StoreListener>) {
    *self
      .listener
      .write()
      .unwrap_or_else(PoisonError::into_inner) = Some(listener);
  }

  // A poisoned lock means a panic elsewhere while holding it; the map
  // itself is still consistent, so recover rather than propagate.
  fn lock_entries(&self) -> MutexGuard<'_, HashMap<QueryKey, CacheEntry>> {
    self.entries.lock().unwrap_or_else(PoisonError::into_inner)
  }

  fn notify(&self, key: &QueryKey, snapshot: &QuerySnapshot) {
    let listener = self
      .listener
      .read()
      .unwrap_or_else(PoisonError::into_inner)
      .clone();
    if let Some(listener) = listener.and_then(|weak| weak.upgrade()) {
      listener.entry_changed(key, snapshot);
    }
  }

  /// Current state of a key, if an entry exists.
  pub fn snapshot(&self, key: &QueryKey) -> Option<QuerySnapshot> {
    self.lock_entries().get(key).map(CacheEntry::snapshot)
  }

  /// Current state of a key, creating an Idle entry if absent.
  pub fn get_or_insert(&self, key: &QueryKey) -> QuerySnapshot {
    self
      .lock_entries()
      .entry(key.clone())
      .or_insert_with(CacheEntry::new)
      .snapshot()
  }

  /// Transition a key to Loading and stamp it with a fresh generation.
  ///
  /// Existing data is retained while the reload runs. If the entry is
  /// already Loading the current generation is returned unchanged. The
  /// transition is not announced here; the fetch coordinator notifies with
  /// the returned snapshot once its in-flight record is published, so that
  /// observers never see a result before the Loading state.
  pub(crate) fn begin_load(&self, key: &QueryKey) -> (u64, QuerySnapshot) {
    let mut entries = self.lock_entries();
    let entry = entries.entry(key.clone()).or_insert_with(CacheEntry::new);

    if entry.status.is_loading() {
      return (entry.generation, entry.snapshot());
    }

    entry.generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
    entry.status = QueryStatus::Loading;
    trace!(%key, generation = entry.generation, "begin load");
    (entry.generation, entry.snapshot())
  }

  pub(crate) fn notify_changed(&self, key: &QueryKey, snapshot: &QuerySnapshot) {
    self.notify(key, snapshot);
  }

  /// True if the entry is Loading at exactly this generation. Used by the
  /// coordinator to decide whether a caller can attach to an in-flight
  /// fetch.
  pub(crate) fn is_loading_at(&self, key: &QueryKey, generation: u64) -> bool {
    self
      .lock_entries()
      .get(key)
      .map(|entry| entry.status.is_loading() && entry.generation == generation)
      .unwrap_or(false)
  }

  /// Apply a successful fetch result.
  ///
  /// No-op unless the entry still exists, is still Loading, and its
  /// generation matches the one the fetch was issued under; out-of-order
  /// and superseded responses are discarded silently.
  pub(crate) fn set_success(&self, key: &QueryKey, data: serde_json::Value, generation: u64) -> bool {
    let snapshot = {
      let mut entries = self.lock_entries();
      let Some(entry) = entries.get_mut(key) else {
        trace!(%key, "fetch result for evicted entry discarded");
        return false;
      };
      if entry.generation != generation || !entry.status.is_loading() {
        trace!(%key, generation, current = entry.generation, "superseded fetch result discarded");
        return false;
      }
      entry.status = QueryStatus::Success;
      entry.data = Some(data);
      entry.error = None;
      entry.last_updated = Some(Utc::now());
      entry.snapshot()
    };
    self.notify(key, &snapshot);
    true
  }

  /// Apply a failed fetch result, under the same guard as `set_success`.
  /// Previously cached data is retained alongside the error.
  pub(crate) fn set_error(&self, key: &QueryKey, error: Arc<Error>, generation: u64) -> bool {
    let snapshot = {
      let mut entries = self.lock_entries();
      let Some(entry) = entries.get_mut(key) else {
        trace!(%key, "fetch error for evicted entry discarded");
        return false;
      };
      if entry.generation != generation || !entry.status.is_loading() {
        trace!(%key, generation, current = entry.generation, "superseded fetch error discarded");
        return false;
      }
      entry.status = QueryStatus::Error;
      entry.error = Some(error);
      entry.last_updated = Some(Utc::now());
      entry.snapshot()
    };
    self.notify(key, &snapshot);
    true
  }

  /// Flag every entry matching the predicate as Stale without clearing its
  /// data. Idle entries are skipped; there is nothing to refresh. Returns
  /// the affected keys with their subscriber counts so the caller can
  /// decide between eager and lazy refetch.
  pub fn mark_stale<P>(&self, predicate: P) -> Vec<(QueryKey, usize)>
  where
    P: Fn(&QueryKey) -> bool,
  {
    let mut affected = Vec::new();
    let mut notifications = Vec::new();
    {
      let mut entries = self.lock_entries();
      for (key, entry) in entries.iter_mut() {
        if !predicate(key) {
          continue;
        }
        match entry.status {
          QueryStatus::Idle => continue,
          QueryStatus::Stale => {}
          _ => {
            entry.status = QueryStatus::Stale;
            notifications.push((key.clone(), entry.snapshot()));
          }
        }
        affected.push((key.clone(), entry.subscriber_count));
      }
    }
    for (key, snapshot) in &notifications {
      self.notify(key, snapshot);
    }
    affected
  }

  /// Remove an entry. Refuses while the key still has subscribers, which
  /// closes the race between an eviction timer firing and a new subscriber
  /// arriving.
  pub fn evict(&self, key: &QueryKey) -> bool {
    let mut entries = self.lock_entries();
    match entries.get(key) {
      Some(entry) if entry.subscriber_count == 0 => {
        entries.remove(key);
        trace!(%key, "evicted");
        true
      }
      _ => false,
    }
  }

  pub(crate) fn add_subscriber(&self, key: &QueryKey) -> QuerySnapshot {
    let mut entries = self.lock_entries();
    let entry = entries.entry(key.clone()).or_insert_with(CacheEntry::new);
    entry.subscriber_count += 1;
    entry.snapshot()
  }

  /// Decrement a key's subscriber count, returning the remaining count.
  pub(crate) fn remove_subscriber(&self, key: &QueryKey) -> usize {
    let mut entries = self.lock_entries();
    match entries.get_mut(key) {
      Some(entry) => {
        entry.subscriber_count = entry.subscriber_count.saturating_sub(1);
        entry.subscriber_count
      }
      None => 0,
    }
  }

  pub fn subscriber_count(&self, key: &QueryKey) -> usize {
    self
      .lock_entries()
      .get(key)
      .map(|entry| entry.subscriber_count)
      .unwrap_or(0)
  }

  pub fn len(&self) -> usize {
    self.lock_entries().len()
  }

  pub fn is_empty(&self) -> bool {
    self.lock_entries().is_empty()
  }

  /// Drop all entries. Pending fetch results find no entry to apply to.
  pub fn clear(&self) {
    self.lock_entries().clear();
  }
}

impl Default for CacheStore {
  fn default() -> Self {
    Self::new()
  }
}
