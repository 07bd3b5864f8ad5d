//! Public facade wiring the synchronization components together.

use serde_json::Value;
use std::sync::{Arc, Weak};

use crate::api::DirectoryClient;
use crate::config::{Config, SyncConfig};
use crate::error::Result;
use crate::sync::entry::QuerySnapshot;
use crate::sync::fetch::{FetchCoordinator, SharedFetchResult};
use crate::sync::invalidation::InvalidationBus;
use crate::sync::key::QueryKey;
use crate::sync::mutation::{MutationExecutor, MutationRequest, Operation};
use crate::sync::router::{DirectoryBackend, HttpBackend};
use crate::sync::store::{CacheStore, StoreListener};
use crate::sync::subscription::{SubscriptionHandle, SubscriptionManager};

/// Entry point for views.
///
/// Owns the cache and its collaborators; construction starts from an empty
/// map and [`shutdown`](Self::shutdown) tears everything down. Cheap to
/// clone and share across view code.
#[derive(Clone)]
pub struct QueryClient {
  store: Arc<CacheStore>,
  coordinator: Arc<FetchCoordinator>,
  subscriptions: Arc<SubscriptionManager>,
  mutations: MutationExecutor,
}

impl QueryClient {
  /// Connect to the backend described by `config`.
  pub fn new(config: &Config) -> Result<Self> {
    let api = DirectoryClient::new(&config.api)?;
    Ok(Self::with_backend(
      &config.sync,
      Arc::new(HttpBackend::new(api)),
    ))
  }

  /// Assemble a client over an explicit backend implementation.
  pub fn with_backend(sync: &SyncConfig, backend: Arc<dyn DirectoryBackend>) -> Self {
    let store = Arc::new(CacheStore::new());
    let coordinator = Arc::new(FetchCoordinator::new(
      Arc::clone(&store),
      Arc::clone(&backend),
    ));
    let subscriptions = SubscriptionManager::new(
      Arc::clone(&store),
      Arc::clone(&coordinator),
      sync.gc_grace(),
    );
    let listener: Weak<SubscriptionManager> = Arc::downgrade(&subscriptions);
    let listener: Weak<dyn StoreListener> = listener;
    store.set_listener(listener);

    let bus = Arc::new(InvalidationBus::new(
      Arc::clone(&store),
      Arc::clone(&coordinator),
    ));
    let mutations = MutationExecutor::new(backend, bus);

    Self {
      store,
      coordinator,
      subscriptions,
      mutations,
    }
  }

  /// Observe a query.
  ///
  /// The observer receives the current `{status, data, error}` before this
  /// returns and again on every subsequent change. Filters with `None` or
  /// empty values are ignored, so call sites can pass optional form state
  /// as-is.
  pub fn subscribe<F>(
    &self,
    resource: &str,
    filters: &[(&str, Option<&str>)],
    on_change: F,
  ) -> SubscriptionHandle
  where
    F: Fn(QuerySnapshot) + Send + Sync + 'static,
  {
    let key = QueryKey::normalize(resource, filters);
    self.subscriptions.subscribe(&key, Arc::new(on_change))
  }

  /// Observe a pre-built key.
  pub fn subscribe_key<F>(&self, key: &QueryKey, on_change: F) -> SubscriptionHandle
  where
    F: Fn(QuerySnapshot) + Send + Sync + 'static,
  {
    self.subscriptions.subscribe(key, Arc::new(on_change))
  }

  pub fn unsubscribe(&self, handle: SubscriptionHandle) {
    self.subscriptions.unsubscribe(handle);
  }

  /// Execute a write.
  ///
  /// Update and delete payloads carry the target in their `id` field.
  /// Resolves with the backend's response; by then invalidation has
  /// already been dispatched, so observed queries are refetching. On
  /// failure the cache is untouched and only this caller sees the error.
  pub async fn mutate(
    &self,
    resource: &str,
    operation: Operation,
    payload: Value,
  ) -> Result<Value> {
    self
      .mutations
      .execute(MutationRequest::new(resource, operation, payload))
      .await
  }

  /// Force a refetch of one key, attaching to an in-flight fetch if one is
  /// already out.
  pub async fn refresh(&self, key: &QueryKey) -> SharedFetchResult {
    self.coordinator.request(key).await
  }

  /// Current state of a key without subscribing.
  pub fn snapshot(&self, key: &QueryKey) -> Option<QuerySnapshot> {
    self.store.snapshot(key)
  }

  /// Tear down: forget observers, cancel eviction timers, drop in-flight
  /// records and every cache entry. Fetches already on the wire complete
  /// and find nothing to apply to.
  pub fn shutdown(&self) {
    self.subscriptions.shutdown();
    self.coordinator.clear();
    self.store.clear();
  }
}
