//! Observer registry and entry lifecycle.
//!
//! Views subscribe to a key and receive the current snapshot synchronously
//! plus every subsequent change. When the last observer of a key leaves,
//! a grace-period timer starts; if nothing resubscribes before it fires,
//! the entry is evicted and the next subscriber starts a fresh load cycle.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, trace};

use super::entry::{QuerySnapshot, QueryStatus};
use super::fetch::FetchCoordinator;
use super::key::QueryKey;
use super::store::{CacheStore, StoreListener};

/// Callback invoked with a snapshot on subscribe and on every change.
pub type Observer = Arc<dyn Fn(QuerySnapshot) + Send + Sync>;

/// Returned by subscribe; pass back to unsubscribe. Dropping the handle
/// without unsubscribing leaks the observer until teardown.
#[derive(Debug)]
pub struct SubscriptionHandle {
  id: u64,
  key: QueryKey,
}

impl SubscriptionHandle {
  pub fn key(&self) -> &QueryKey {
    &self.key
  }
}

struct EvictionTimer {
  epoch: u64,
  task: JoinHandle<()>,
}

struct SubState {
  next_id: u64,
  next_epoch: u64,
  observers: HashMap<QueryKey, Vec<(u64, Observer)>>,
  timers: HashMap<QueryKey, EvictionTimer>,
}

pub struct SubscriptionManager {
  store: Arc<CacheStore>,
  coordinator: Arc<FetchCoordinator>,
  grace: Duration,
  /// Handed to eviction timer tasks so a timer outliving the manager
  /// becomes a no-op instead of keeping it alive.
  weak_self: Weak<SubscriptionManager>,
  state: Mutex<SubState>,
}

impl SubscriptionManager {
  pub fn new(
    store: Arc<CacheStore>,
    coordinator: Arc<FetchCoordinator>,
    grace: Duration,
  ) -> Arc<Self> {
    Arc::new_cyclic(|weak_self| Self {
      store,
      coordinator,
      grace,
      weak_self: weak_self.clone(),
      state: Mutex::new(SubState {
        next_id: 1,
        next_epoch: 1,
        observers: HashMap::new(),
        timers: HashMap::new(),
      }),
    })
  }

  fn lock_state(&self) -> MutexGuard<'_, SubState> {
    self.state.lock().unwrap_or_else(PoisonError::into_inner)
  }

  /// Register an observer for a key.
  ///
  /// The observer's first delivery happens before this returns: the
  /// Loading state if the subscription triggered a fetch (missing or Stale
  /// entry), the entry's current state otherwise.
  pub fn subscribe(&self, key: &QueryKey, observer: Observer) -> SubscriptionHandle {
    let id = {
      let mut state = self.lock_state();
      let id = state.next_id;
      state.next_id += 1;
      state
        .observers
        .entry(key.clone())
        .or_default()
        .push((id, Arc::clone(&observer)));
      if let Some(timer) = state.timers.remove(key) {
        trace!(%key, "eviction timer cancelled by new subscriber");
        timer.task.abort();
      }
      id
    };

    let snapshot = self.store.add_subscriber(key);
    match snapshot.status {
      QueryStatus::Idle | QueryStatus::Stale => {
        // The fetch transition notifies every observer, this one included.
        let _ = self.coordinator.request(key);
      }
      _ => observer(snapshot),
    }

    SubscriptionHandle {
      id,
      key: key.clone(),
    }
  }

  /// Drop one observer. When the key's subscriber count reaches zero the
  /// grace-period timer starts.
  pub fn unsubscribe(&self, handle: SubscriptionHandle) {
    {
      let mut state = self.lock_state();
      if let Some(list) = state.observers.get_mut(&handle.key) {
        list.retain(|(id, _)| *id != handle.id);
        if list.is_empty() {
          state.observers.remove(&handle.key);
        }
      }
    }

    let remaining = self.store.remove_subscriber(&handle.key);
    if remaining == 0 {
      self.schedule_eviction(&handle.key);
    }
  }

  fn schedule_eviction(&self, key: &QueryKey) {
    let mut state = self.lock_state();
    if state.observers.contains_key(key) {
      return; // resubscribed in the meantime
    }

    let epoch = state.next_epoch;
    state.next_epoch += 1;

    let manager = self.weak_self.clone();
    let timer_key = key.clone();
    let grace = self.grace;
    let task = tokio::spawn(async move {
      tokio::time::sleep(grace).await;
      if let Some(manager) = manager.upgrade() {
        manager.evict_if_idle(&timer_key, epoch);
      }
    });

    trace!(%key, epoch, "eviction timer started");
    if let Some(old) = state.timers.insert(
      key.clone(),
      EvictionTimer { epoch, task },
    ) {
      old.task.abort();
    }
  }

  fn evict_if_idle(&self, key: &QueryKey, epoch: u64) {
    {
      let mut state = self.lock_state();
      if state.timers.get(key).map(|timer| timer.epoch) != Some(epoch) {
        return; // superseded or cancelled
      }
      state.timers.remove(key);
      if state.observers.contains_key(key) {
        return;
      }
    }
    // The store re-checks the subscriber count under its own lock.
    if self.store.evict(key) {
      debug!(%key, "evicted after grace period");
    }
  }

  /// Cancel all timers and forget all observers.
  pub fn shutdown(&self) {
    let mut state = self.lock_state();
    for (_, timer) in state.timers.drain() {
      timer.task.abort();
    }
    state.observers.clear();
  }

  #[cfg(test)]
  fn observer_count(&self, key: &QueryKey) -> usize {
    self
      .lock_state()
      .observers
      .get(key)
      .map(Vec::len)
      .unwrap_or(0)
  }
}

impl StoreListener for SubscriptionManager {
  fn entry_changed(&self, key: &QueryKey, snapshot: &QuerySnapshot) {
    // Clone the observer list out so callbacks run without the lock and
    // may re-enter (e.g. unsubscribe from within a callback).
    let observers: Vec<Observer> = {
      let state = self.lock_state();
      state
        .observers
        .get(key)
        .map(|list| list.iter().map(|(_, observer)| Arc::clone(observer)).collect())
        .unwrap_or_default()
    };
    for observer in observers {
      observer(snapshot.clone());
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::sync::testutil::{FakeBackend, Recorder};

  fn wired(grace: Duration) -> (Arc<CacheStore>, Arc<FakeBackend>, Arc<SubscriptionManager>) {
    let store = Arc::new(CacheStore::new());
    let backend = Arc::new(FakeBackend::seeded(3));
    let coordinator = Arc::new(FetchCoordinator::new(
      Arc::clone(&store),
      Arc::clone(&backend) as Arc<dyn crate::sync::router::DirectoryBackend>,
    ));
    let manager = SubscriptionManager::new(Arc::clone(&store), coordinator, grace);
    let listener: Weak<SubscriptionManager> = Arc::downgrade(&manager);
    let listener: Weak<dyn StoreListener> = listener;
    store.set_listener(listener);
    (store, backend, manager)
  }

  #[tokio::test]
  async fn idle_entry_is_evicted_after_grace_period() {
    let (store, backend, manager) = wired(Duration::from_millis(40));
    let key = QueryKey::bare("employees");

    let recorder = Recorder::new();
    let handle = manager.subscribe(&key, recorder.observer());
    recorder.wait_for(QueryStatus::Success).await;
    manager.unsubscribe(handle);

    tokio::time::sleep(Duration::from_millis(120)).await;
    assert!(store.snapshot(&key).is_none(), "entry evicted");

    // A fresh subscription runs a full load cycle instead of serving the
    // old data instantly.
    let recorder = Recorder::new();
    let _handle = manager.subscribe(&key, recorder.observer());
    recorder.wait_for(QueryStatus::Success).await;
    assert_eq!(
      recorder.statuses(),
      vec![QueryStatus::Loading, QueryStatus::Success]
    );
    assert_eq!(backend.fetch_calls(), 2);
  }

  #[tokio::test]
  async fn resubscribe_within_grace_cancels_eviction() {
    let (store, backend, manager) = wired(Duration::from_millis(80));
    let key = QueryKey::bare("employees");

    let recorder = Recorder::new();
    let handle = manager.subscribe(&key, recorder.observer());
    recorder.wait_for(QueryStatus::Success).await;
    manager.unsubscribe(handle);

    tokio::time::sleep(Duration::from_millis(10)).await;
    let recorder = Recorder::new();
    let handle = manager.subscribe(&key, recorder.observer());
    // Served from cache, no new fetch.
    assert_eq!(recorder.statuses(), vec![QueryStatus::Success]);
    assert_eq!(backend.fetch_calls(), 1);

    tokio::time::sleep(Duration::from_millis(150)).await;
    assert!(store.snapshot(&key).is_some(), "entry survived");
    manager.unsubscribe(handle);
  }

  #[tokio::test]
  async fn unsubscribe_drops_only_its_own_observer() {
    let (_store, _backend, manager) = wired(Duration::from_millis(50));
    let key = QueryKey::bare("employees");

    let first = Recorder::new();
    let second = Recorder::new();
    let handle_a = manager.subscribe(&key, first.observer());
    let handle_b = manager.subscribe(&key, second.observer());
    assert_eq!(manager.observer_count(&key), 2);

    manager.unsubscribe(handle_a);
    assert_eq!(manager.observer_count(&key), 1);
    manager.unsubscribe(handle_b);
    assert_eq!(manager.observer_count(&key), 0);
  }
}
