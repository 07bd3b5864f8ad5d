//! HTTP client for the employee directory backend.

use serde::de::DeserializeOwned;
use serde_json::Value;
use std::time::Duration;

use crate::api::types::{Deleted, DepartmentsPage, Employee, EmployeesPage};
use crate::config::ApiConfig;
use crate::error::{Error, Result};

/// Typed client for the directory REST API.
///
/// Transport-level failures map to [`Error::Network`], non-2xx responses to
/// [`Error::Http`] with the status and raw body.
#[derive(Debug, Clone)]
pub struct DirectoryClient {
  http: reqwest::Client,
  base_url: String,
}

impl DirectoryClient {
  pub fn new(config: &ApiConfig) -> Result<Self> {
    let http = reqwest::Client::builder()
      .timeout(Duration::from_secs(config.timeout_secs))
      .build()
      .map_err(|e| Error::Network(format!("failed to build http client: {e}")))?;

    Ok(Self {
      http,
      base_url: config.base_url.trim_end_matches('/').to_string(),
    })
  }

  /// List employees, optionally filtered by a name/email search string or
  /// an exact department.
  pub async fn list_employees(
    &self,
    search: Option<&str>,
    department: Option<&str>,
  ) -> Result<EmployeesPage> {
    let mut query: Vec<(&str, &str)> = Vec::new();
    if let Some(s) = search {
      query.push(("search", s));
    }
    if let Some(d) = department {
      query.push(("department", d));
    }

    let response = self
      .http
      .get(format!("{}/employees", self.base_url))
      .query(&query)
      .send()
      .await
      .map_err(|e| Error::Network(e.to_string()))?;

    Self::decode(response).await
  }

  /// Get a single employee by id.
  pub async fn get_employee(&self, id: &str) -> Result<Employee> {
    let response = self
      .http
      .get(format!("{}/employees/{}", self.base_url, id))
      .send()
      .await
      .map_err(|e| Error::Network(e.to_string()))?;

    Self::decode(response).await
  }

  /// Create an employee. The backend assigns the id and echoes the record.
  pub async fn create_employee(&self, body: &Value) -> Result<Employee> {
    let response = self
      .http
      .post(format!("{}/employees", self.base_url))
      .json(body)
      .send()
      .await
      .map_err(|e| Error::Network(e.to_string()))?;

    Self::decode(response).await
  }

  /// Update an employee. Omitted fields keep their server-side values.
  pub async fn update_employee(&self, id: &str, body: &Value) -> Result<Employee> {
    let response = self
      .http
      .put(format!("{}/employees/{}", self.base_url, id))
      .json(body)
      .send()
      .await
      .map_err(|e| Error::Network(e.to_string()))?;

    Self::decode(response).await
  }

  /// Delete an employee.
  pub async fn delete_employee(&self, id: &str) -> Result<Deleted> {
    let response = self
      .http
      .delete(format!("{}/employees/{}", self.base_url, id))
      .send()
      .await
      .map_err(|e| Error::Network(e.to_string()))?;

    Self::decode(response).await
  }

  /// Per-department headcounts of active employees.
  pub async fn list_departments(&self) -> Result<DepartmentsPage> {
    let response = self
      .http
      .get(format!("{}/departments", self.base_url))
      .send()
      .await
      .map_err(|e| Error::Network(e.to_string()))?;

    Self::decode(response).await
  }

  /// Backend health probe.
  pub async fn health(&self) -> Result<Value> {
    let response = self
      .http
      .get(format!("{}/health", self.base_url))
      .send()
      .await
      .map_err(|e| Error::Network(e.to_string()))?;

    Self::decode(response).await
  }

  async fn decode<T: DeserializeOwned>(response: reqwest::Response) -> Result<T> {
    let status = response.status();
    let body = response
      .text()
      .await
      .map_err(|e| Error::Network(e.to_string()))?;

    if !status.is_success() {
      return Err(Error::Http {
        status: status.as_u16(),
        body,
      });
    }

    Ok(serde_json::from_str(&body)?)
  }
}
