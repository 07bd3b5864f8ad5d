//! Mapping from canonical keys and mutation requests to backend calls.

use futures::future::BoxFuture;
use futures::FutureExt;
use serde_json::Value;

use super::key::QueryKey;
use super::mutation::{MutationRequest, Operation};
use crate::api::DirectoryClient;
use crate::error::{Error, Result};

/// Executes reads and writes against the directory backend.
///
/// The production implementation is [`HttpBackend`]; tests substitute an
/// in-memory one so the synchronization layer can be exercised without a
/// server.
pub trait DirectoryBackend: Send + Sync {
  /// Execute the read described by `key`.
  fn fetch(&self, key: &QueryKey) -> BoxFuture<'static, Result<Value>>;

  /// Execute the write described by `request`.
  fn mutate(&self, request: &MutationRequest) -> BoxFuture<'static, Result<Value>>;
}

/// Routes keys to the REST endpoints of the directory API.
///
/// Recognized resources: `employees` (filters `search`, `department`),
/// `employee` (requires `id`), `departments`.
pub struct HttpBackend {
  api: DirectoryClient,
}

impl HttpBackend {
  pub fn new(api: DirectoryClient) -> Self {
    Self { api }
  }
}

impl DirectoryBackend for HttpBackend {
  fn fetch(&self, key: &QueryKey) -> BoxFuture<'static, Result<Value>> {
    let api = self.api.clone();
    let key = key.clone();
    async move {
      match key.resource() {
        "employees" => {
          let page = api
            .list_employees(key.param("search"), key.param("department"))
            .await?;
          Ok(serde_json::to_value(page)?)
        }
        "employee" => {
          let id = key
            .param("id")
            .ok_or_else(|| Error::Validation("employee key requires an id".into()))?;
          let employee = api.get_employee(id).await?;
          Ok(serde_json::to_value(employee)?)
        }
        "departments" => {
          let page = api.list_departments().await?;
          Ok(serde_json::to_value(page)?)
        }
        other => Err(Error::Validation(format!("unknown resource: {other}"))),
      }
    }
    .boxed()
  }

  fn mutate(&self, request: &MutationRequest) -> BoxFuture<'static, Result<Value>> {
    let api = self.api.clone();
    let request = request.clone();
    async move {
      match (request.resource.as_str(), request.operation) {
        ("employees", Operation::Create) => {
          let created = api.create_employee(&request.payload).await?;
          Ok(serde_json::to_value(created)?)
        }
        ("employees", Operation::Update) => {
          let id = request
            .id()
            .ok_or_else(|| Error::Validation("update requires an id".into()))?
            .to_string();
          let updated = api.update_employee(&id, &request.payload).await?;
          Ok(serde_json::to_value(updated)?)
        }
        ("employees", Operation::Delete) => {
          let id = request
            .id()
            .ok_or_else(|| Error::Validation("delete requires an id".into()))?
            .to_string();
          let deleted = api.delete_employee(&id).await?;
          Ok(serde_json::to_value(deleted)?)
        }
        (other, _) => Err(Error::Validation(format!(
          "mutations are not supported for resource: {other}"
        ))),
      }
    }
    .boxed()
  }
}
