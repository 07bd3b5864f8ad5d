//! Fetch execution with per-key deduplication.
//!
//! Concurrent requests for the same key share one in-flight operation;
//! later callers attach to it instead of issuing a second network read.
//! Results are applied under the store's generation guard, so a fetch
//! superseded by an invalidation runs to completion and is discarded.

use futures::future::{BoxFuture, Shared};
use futures::FutureExt;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tracing::{debug, trace};

use super::key::QueryKey;
use super::router::DirectoryBackend;
use super::store::CacheStore;
use crate::error::{Error, Result};

/// Result shared between every caller attached to one in-flight fetch.
pub type SharedFetchResult = std::result::Result<Value, Arc<Error>>;

/// Awaitable handle on an in-flight (or completed) fetch.
pub type FetchHandle = Shared<BoxFuture<'static, SharedFetchResult>>;

struct Inflight {
  generation: u64,
  handle: FetchHandle,
}

type InflightMap = Arc<Mutex<HashMap<QueryKey, Inflight>>>;

pub struct FetchCoordinator {
  store: Arc<CacheStore>,
  backend: Arc<dyn DirectoryBackend>,
  inflight: InflightMap,
}

impl FetchCoordinator {
  pub fn new(store: Arc<CacheStore>, backend: Arc<dyn DirectoryBackend>) -> Self {
    Self {
      store,
      backend,
      inflight: Arc::new(Mutex::new(HashMap::new())),
    }
  }

  /// Fetch `key` through the backend router, deduplicating concurrent
  /// requests. The returned handle can be awaited or dropped; the result
  /// lands in the store either way.
  pub fn request(&self, key: &QueryKey) -> FetchHandle {
    let backend = Arc::clone(&self.backend);
    let fetch_key = key.clone();
    self.request_with(key, move || backend.fetch(&fetch_key))
  }

  /// Like [`request`](Self::request), with a caller-supplied fetch
  /// closure. Lets callers wrap the network call, e.g. with
  /// [`with_retry`].
  pub fn request_with<F>(&self, key: &QueryKey, fetch_fn: F) -> FetchHandle
  where
    F: FnOnce() -> BoxFuture<'static, Result<Value>> + Send + 'static,
  {
    let mut inflight = lock_inflight(&self.inflight);

    // Attach if a fetch is already out for the entry's current generation.
    if let Some(existing) = inflight.get(key) {
      if self.store.is_loading_at(key, existing.generation) {
        trace!(%key, "attached to in-flight fetch");
        return existing.handle.clone();
      }
    }

    let (generation, loading) = self.store.begin_load(key);

    let store = Arc::clone(&self.store);
    let inflight_map = Arc::clone(&self.inflight);
    let task_key = key.clone();
    let handle: FetchHandle = async move {
      let outcome = fetch_fn().await;

      // Drop our in-flight record first so a follow-up request can start
      // immediately; only remove it if it is still ours.
      {
        let mut map = lock_inflight(&inflight_map);
        if map.get(&task_key).map(|inf| inf.generation) == Some(generation) {
          map.remove(&task_key);
        }
      }

      match outcome {
        Ok(data) => {
          store.set_success(&task_key, data.clone(), generation);
          Ok(data)
        }
        Err(error) => {
          debug!(%task_key, %error, "fetch failed");
          let error = Arc::new(error);
          store.set_error(&task_key, Arc::clone(&error), generation);
          Err(error)
        }
      }
    }
    .boxed()
    .shared();

    inflight.insert(
      key.clone(),
      Inflight {
        generation,
        handle: handle.clone(),
      },
    );
    drop(inflight);

    // Announce Loading before the fetch can possibly complete, then drive
    // the shared future to completion even if every caller drops it.
    self.store.notify_changed(key, &loading);
    tokio::spawn(handle.clone().map(|_| ()));

    handle
  }

  /// Number of in-flight fetches, for teardown diagnostics.
  pub fn inflight_count(&self) -> usize {
    lock_inflight(&self.inflight).len()
  }

  /// Forget all in-flight records. Running fetches complete against the
  /// store and are discarded there if their entry is gone.
  pub fn clear(&self) {
    lock_inflight(&self.inflight).clear();
  }
}

fn lock_inflight(map: &Mutex<HashMap<QueryKey, Inflight>>) -> MutexGuard<'_, HashMap<QueryKey, Inflight>> {
  map.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Wrap a fetch closure with bounded retry and exponential backoff.
///
/// Retries transient failures only (network errors and 5xx responses);
/// 4xx-class failures are returned immediately. The coordinator itself
/// never retries; this is opt-in per call site.
pub fn with_retry<F>(
  fetch_fn: F,
  attempts: u32,
  base_delay: Duration,
) -> impl FnOnce() -> BoxFuture<'static, Result<Value>> + Send + 'static
where
  F: Fn() -> BoxFuture<'static, Result<Value>> + Send + Sync + 'static,
{
  move || {
    async move {
      let mut delay = base_delay;
      let mut last = None;
      for attempt in 0..attempts.max(1) {
        if attempt > 0 {
          tokio::time::sleep(delay).await;
          delay *= 2;
        }
        match fetch_fn().await {
          Ok(value) => return Ok(value),
          Err(error) if error.is_retryable() => {
            debug!(attempt, %error, "retryable fetch failure");
            last = Some(error);
          }
          Err(error) => return Err(error),
        }
      }
      Err(last.unwrap_or_else(|| Error::Network("fetch retries exhausted".into())))
    }
    .boxed()
  }
}
