//! staffdir: client-side resource synchronization for an employee
//! directory backend.
//!
//! An in-process library for view code: subscribe to a query and be kept
//! consistent with server state, no manual bookkeeping. Concurrent
//! subscribers to one query share a single network read, confirmed writes
//! invalidate the cached reads they affect, and stale data keeps being
//! served while its replacement loads.
//!
//! # Example
//!
//! ```ignore
//! use staffdir::{Config, Operation, QueryClient, QueryStatus};
//!
//! let config = Config::load(None)?;
//! let client = QueryClient::new(&config)?;
//!
//! let handle = client.subscribe("employees", &[("department", Some("HR"))], |snapshot| {
//!   match snapshot.status {
//!     QueryStatus::Loading => render_spinner(),
//!     QueryStatus::Error => render_error(snapshot.error),
//!     _ => render_list(snapshot.data),
//!   }
//! });
//!
//! // Accepted writes refresh every observed employee query on their own.
//! client.mutate("employees", Operation::Create, payload).await?;
//!
//! client.unsubscribe(handle);
//! ```

pub mod api;
pub mod client;
pub mod config;
pub mod error;
pub mod sync;

pub use client::QueryClient;
pub use config::{ApiConfig, Config, SyncConfig};
pub use error::{Error, Result};
pub use sync::{
  DirectoryBackend, MutationEvent, MutationRequest, Operation, QueryKey, QuerySnapshot,
  QueryStatus, SubscriptionHandle,
};
