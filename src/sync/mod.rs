//! Resource synchronization core.
//!
//! Keeps views consistent with server state without manual bookkeeping:
//! - one canonical key per logical query, whatever the parameter order
//! - at most one current in-flight fetch per key; concurrent subscribers
//!   attach to it
//! - confirmed writes mark the affected keys stale; observed keys refetch
//!   eagerly, idle ones lazily on the next subscribe
//! - stale data keeps being served while its replacement loads
//! - entries nobody observes are evicted after a grace period

pub mod entry;
pub mod fetch;
pub mod invalidation;
pub mod key;
pub mod mutation;
pub mod router;
pub mod store;
pub mod subscription;

#[cfg(test)]
pub(crate) mod testutil;

pub use entry::{QuerySnapshot, QueryStatus};
pub use fetch::{with_retry, FetchCoordinator, FetchHandle, SharedFetchResult};
pub use invalidation::InvalidationBus;
pub use key::QueryKey;
pub use mutation::{MutationEvent, MutationExecutor, MutationRequest, Operation};
pub use router::{DirectoryBackend, HttpBackend};
pub use store::CacheStore;
pub use subscription::{Observer, SubscriptionHandle, SubscriptionManager};
