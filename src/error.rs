//! Error taxonomy for the directory client.
//!
//! Read failures land in the cache entry for their key and stay visible to
//! subscribers until the next successful refetch. Write failures are
//! surfaced only to the `mutate` caller and never touch the cache. No error
//! is fatal to the process.

use thiserror::Error;

/// Errors produced by the API client and the synchronization layer.
#[derive(Debug, Error)]
pub enum Error {
  /// No response reached the client (connect failure, DNS, timeout).
  #[error("network error: {0}")]
  Network(String),

  /// The server responded with a non-success status.
  #[error("http {status}: {body}")]
  Http { status: u16, body: String },

  /// Input rejected client-side before any request was sent.
  #[error("validation error: {0}")]
  Validation(String),

  /// A response body could not be decoded.
  #[error("decode error: {0}")]
  Decode(#[from] serde_json::Error),

  /// Configuration could not be located or parsed.
  #[error("config error: {0}")]
  Config(String),
}

impl Error {
  /// HTTP status code, if this is a server-reported failure.
  pub fn http_status(&self) -> Option<u16> {
    match self {
      Error::Http { status, .. } => Some(*status),
      _ => None,
    }
  }

  /// Whether a retry could plausibly succeed.
  ///
  /// Network failures and 5xx responses are transient; 4xx responses are
  /// the server rejecting the request and are never retried.
  pub fn is_retryable(&self) -> bool {
    match self {
      Error::Network(_) => true,
      Error::Http { status, .. } => *status >= 500,
      _ => false,
    }
  }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
