//! Maps confirmed writes to the cache keys they affect.
//!
//! The rule table is deliberately coarse: any employee write stales every
//! employee list key, whatever its filters. Finer per-filter policy would
//! slot in here without touching the store or the coordinator.

use std::sync::Arc;
use tracing::{debug, trace};

use super::fetch::FetchCoordinator;
use super::key::QueryKey;
use super::mutation::{MutationEvent, Operation};
use super::store::CacheStore;

/// Key pattern a rule invalidates.
#[derive(Debug, Clone, Copy)]
enum KeyTarget {
  /// Every key for the given resource, all filter combinations included.
  Resource(&'static str),
  /// The single-item key of the affected id, under the given resource.
  Item(&'static str),
}

struct InvalidationRule {
  resource: &'static str,
  operation: Operation,
  targets: &'static [KeyTarget],
}

/// Which keys each confirmed write invalidates. Creates have no prior
/// single-item key, so they only touch list queries. The departments
/// resource is read-only and carries no rules.
const RULES: &[InvalidationRule] = &[
  InvalidationRule {
    resource: "employees",
    operation: Operation::Create,
    targets: &[KeyTarget::Resource("employees")],
  },
  InvalidationRule {
    resource: "employees",
    operation: Operation::Update,
    targets: &[KeyTarget::Resource("employees"), KeyTarget::Item("employee")],
  },
  InvalidationRule {
    resource: "employees",
    operation: Operation::Delete,
    targets: &[KeyTarget::Resource("employees"), KeyTarget::Item("employee")],
  },
];

/// Applies the rule table to the store after each confirmed write.
///
/// Affected keys with live subscribers are refetched immediately; the rest
/// stay Stale and refresh lazily when something subscribes again.
pub struct InvalidationBus {
  store: Arc<CacheStore>,
  coordinator: Arc<FetchCoordinator>,
}

impl InvalidationBus {
  pub fn new(store: Arc<CacheStore>, coordinator: Arc<FetchCoordinator>) -> Self {
    Self { store, coordinator }
  }

  pub fn publish(&self, event: &MutationEvent) {
    let rule = RULES
      .iter()
      .find(|rule| rule.resource == event.resource && rule.operation == event.operation);
    let Some(rule) = rule else {
      trace!(resource = %event.resource, operation = %event.operation, "no invalidation rule");
      return;
    };

    for target in rule.targets {
      let affected = match target {
        KeyTarget::Resource(resource) => {
          self.store.mark_stale(|key| key.resource() == *resource)
        }
        KeyTarget::Item(resource) => {
          let Some(id) = event.affected_id.as_deref() else {
            continue;
          };
          let item_key = QueryKey::item(resource, id);
          self.store.mark_stale(|key| *key == item_key)
        }
      };

      for (key, subscribers) in affected {
        if subscribers > 0 {
          debug!(%key, "eager refresh after invalidation");
          let _ = self.coordinator.request(&key);
        } else {
          trace!(%key, "left stale for lazy refresh");
        }
      }
    }
  }
}
