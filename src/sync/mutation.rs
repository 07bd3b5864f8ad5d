//! Write execution and invalidation event emission.

use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

use super::invalidation::InvalidationBus;
use super::router::DirectoryBackend;
use crate::error::{Error, Result};

/// Kind of write operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
  Create,
  Update,
  Delete,
}

impl fmt::Display for Operation {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let name = match self {
      Operation::Create => "create",
      Operation::Update => "update",
      Operation::Delete => "delete",
    };
    f.write_str(name)
  }
}

/// A write request against one resource.
#[derive(Debug, Clone)]
pub struct MutationRequest {
  pub resource: String,
  pub operation: Operation,
  pub payload: Value,
}

impl MutationRequest {
  pub fn new(resource: impl Into<String>, operation: Operation, payload: Value) -> Self {
    Self {
      resource: resource.into(),
      operation,
      payload,
    }
  }

  /// Target id carried in the payload, for update and delete.
  pub fn id(&self) -> Option<&str> {
    self.payload.get("id").and_then(Value::as_str)
  }
}

/// Describes a confirmed write; consumed by the invalidation bus.
#[derive(Debug, Clone)]
pub struct MutationEvent {
  pub resource: String,
  pub operation: Operation,
  pub affected_id: Option<String>,
}

/// Runs writes against the backend and reports confirmed ones for
/// invalidation. The cache is never touched speculatively; a rejected
/// write leaves every entry exactly as it was.
#[derive(Clone)]
pub struct MutationExecutor {
  backend: Arc<dyn DirectoryBackend>,
  bus: Arc<InvalidationBus>,
}

impl MutationExecutor {
  pub fn new(backend: Arc<dyn DirectoryBackend>, bus: Arc<InvalidationBus>) -> Self {
    Self { backend, bus }
  }

  /// Execute a write.
  ///
  /// Input is validated client-side before any request is sent. On success
  /// the matching cache keys have been invalidated by the time this
  /// returns; on failure nothing is published and the error goes only to
  /// the caller.
  pub async fn execute(&self, request: MutationRequest) -> Result<Value> {
    validate(&request)?;

    let result = self.backend.mutate(&request).await?;

    let affected_id = match request.operation {
      // The server assigns ids on create.
      Operation::Create => result.get("id").and_then(Value::as_str).map(String::from),
      _ => request.id().map(String::from),
    };

    let event = MutationEvent {
      resource: request.resource.clone(),
      operation: request.operation,
      affected_id,
    };
    debug!(resource = %event.resource, operation = %event.operation, "mutation confirmed");
    self.bus.publish(&event);

    Ok(result)
  }
}

/// Required fields for an employee record, matching what the backend would
/// reject with a 400.
const EMPLOYEE_REQUIRED_FIELDS: [&str; 4] = ["firstName", "lastName", "email", "department"];

fn validate(request: &MutationRequest) -> Result<()> {
  if request.resource != "employees" {
    return Err(Error::Validation(format!(
      "mutations are not supported for resource: {}",
      request.resource
    )));
  }

  match request.operation {
    Operation::Create => {
      let Some(body) = request.payload.as_object() else {
        return Err(Error::Validation("create payload must be an object".into()));
      };
      for field in EMPLOYEE_REQUIRED_FIELDS {
        let present = body
          .get(field)
          .and_then(Value::as_str)
          .is_some_and(|v| !v.trim().is_empty());
        if !present {
          return Err(Error::Validation(format!("missing required field: {field}")));
        }
      }
      Ok(())
    }
    Operation::Update | Operation::Delete => match request.id() {
      Some(id) if !id.is_empty() => Ok(()),
      _ => Err(Error::Validation(format!(
        "{} requires an id",
        request.operation
      ))),
    },
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  #[test]
  fn create_requires_the_backend_mandatory_fields() {
    let request = MutationRequest::new(
      "employees",
      Operation::Create,
      json!({"firstName": "Ada", "lastName": "Lovelace", "email": "ada@example.com"}),
    );
    let error = validate(&request).unwrap_err();
    assert!(matches!(error, Error::Validation(message) if message.contains("department")));
  }

  #[test]
  fn create_rejects_empty_required_values() {
    let request = MutationRequest::new(
      "employees",
      Operation::Create,
      json!({"firstName": " ", "lastName": "L", "email": "a@b.c", "department": "HR"}),
    );
    assert!(validate(&request).is_err());
  }

  #[test]
  fn update_and_delete_require_an_id() {
    let missing = MutationRequest::new("employees", Operation::Delete, json!({}));
    assert!(validate(&missing).is_err());

    let present = MutationRequest::new("employees", Operation::Delete, json!({"id": "emp-1"}));
    assert!(validate(&present).is_ok());
  }

  #[test]
  fn unknown_resources_are_rejected() {
    let request = MutationRequest::new("departments", Operation::Create, json!({}));
    assert!(matches!(validate(&request), Err(Error::Validation(_))));
  }

  #[test]
  fn complete_create_payload_passes() {
    let request = MutationRequest::new(
      "employees",
      Operation::Create,
      json!({
        "firstName": "Ada", "lastName": "Lovelace",
        "email": "ada@example.com", "department": "Engineering"
      }),
    );
    assert!(validate(&request).is_ok());
  }
}
