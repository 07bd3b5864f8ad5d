//! Cache entry state and the snapshots observers receive.

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::sync::Arc;

use crate::error::{Error, Result};

/// Lifecycle status of a cache entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryStatus {
  /// Created but never fetched
  Idle,
  /// A fetch is in flight
  Loading,
  /// The last fetch succeeded
  Success,
  /// Data may be outdated following an invalidation; it is retained and
  /// served until a refetch replaces it
  Stale,
  /// The last fetch failed
  Error,
}

impl QueryStatus {
  pub fn is_loading(&self) -> bool {
    matches!(self, QueryStatus::Loading)
  }

  pub fn is_success(&self) -> bool {
    matches!(self, QueryStatus::Success)
  }

  pub fn is_error(&self) -> bool {
    matches!(self, QueryStatus::Error)
  }

  pub fn is_stale(&self) -> bool {
    matches!(self, QueryStatus::Stale)
  }
}

/// One cached query result. Owned exclusively by the store; everything
/// outside sees [`QuerySnapshot`] copies.
#[derive(Debug, Clone)]
pub(crate) struct CacheEntry {
  pub status: QueryStatus,
  pub data: Option<Value>,
  pub error: Option<Arc<Error>>,
  pub last_updated: Option<DateTime<Utc>>,
  /// Stamped from the store-wide counter at each load; a fetch result only
  /// applies while this still matches the generation it was issued under.
  pub generation: u64,
  pub subscriber_count: usize,
}

impl CacheEntry {
  pub fn new() -> Self {
    Self {
      status: QueryStatus::Idle,
      data: None,
      error: None,
      last_updated: None,
      generation: 0,
      subscriber_count: 0,
    }
  }

  pub fn snapshot(&self) -> QuerySnapshot {
    QuerySnapshot {
      status: self.status,
      data: self.data.clone(),
      error: self.error.clone(),
      last_updated: self.last_updated,
    }
  }
}

/// Point-in-time view of a cache entry, delivered to observers on subscribe
/// and on every subsequent change.
#[derive(Debug, Clone)]
pub struct QuerySnapshot {
  pub status: QueryStatus,
  pub data: Option<Value>,
  pub error: Option<Arc<Error>>,
  pub last_updated: Option<DateTime<Utc>>,
}

impl QuerySnapshot {
  /// Decode the cached payload into a typed value.
  pub fn data_as<T: DeserializeOwned>(&self) -> Result<Option<T>> {
    match &self.data {
      Some(value) => Ok(Some(serde_json::from_value(value.clone())?)),
      None => Ok(None),
    }
  }
}
