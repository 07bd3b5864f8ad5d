//! In-memory backend and observer recorder for synchronization tests.

use futures::future::BoxFuture;
use futures::FutureExt;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use super::entry::{QuerySnapshot, QueryStatus};
use super::key::QueryKey;
use super::mutation::{MutationRequest, Operation};
use super::router::DirectoryBackend;
use super::subscription::Observer;
use crate::error::{Error, Result};

/// Install a subscriber once so `RUST_LOG=staffdir=trace cargo test` shows
/// the transition log.
pub fn init_tracing() {
  use tracing_subscriber::EnvFilter;
  let _ = tracing_subscriber::fmt()
    .with_env_filter(EnvFilter::from_default_env())
    .try_init();
}

/// In-memory stand-in for the directory backend. Behaves like the real
/// API: list filtering, 404 on unknown ids, server-assigned ids on create.
/// Deletes are hard so a later read of the id reports 404.
pub(crate) struct FakeBackend {
  employees: Mutex<Vec<Value>>,
  next_id: AtomicUsize,
  fetch_calls: AtomicUsize,
  fetch_delay: Mutex<Duration>,
  fail_next_mutation: AtomicBool,
}

impl FakeBackend {
  /// Backend seeded with `count` employees, ids `emp-1` through
  /// `emp-{count}`.
  pub fn seeded(count: usize) -> Self {
    let departments = ["Engineering", "Marketing", "Sales"];
    let employees = (1..=count)
      .map(|n| {
        json!({
          "id": format!("emp-{n}"),
          "firstName": format!("First{n}"),
          "lastName": format!("Last{n}"),
          "email": format!("employee{n}@example.com"),
          "department": departments[(n - 1) % departments.len()],
          "position": "",
          "phone": "",
          "hireDate": "2024-01-01",
          "salary": 50000,
          "isActive": true
        })
      })
      .collect();

    Self {
      employees: Mutex::new(employees),
      next_id: AtomicUsize::new(count + 1),
      fetch_calls: AtomicUsize::new(0),
      fetch_delay: Mutex::new(Duration::ZERO),
      fail_next_mutation: AtomicBool::new(false),
    }
  }

  /// Number of fetch (read) calls issued so far.
  pub fn fetch_calls(&self) -> usize {
    self.fetch_calls.load(Ordering::SeqCst)
  }

  /// Delay every subsequent fetch, to hold responses open while the test
  /// races subscriptions or invalidations against them.
  pub fn set_fetch_delay(&self, delay: Duration) {
    *self.fetch_delay.lock().unwrap() = delay;
  }

  /// Make the next mutation fail with a 500 without touching the data.
  pub fn fail_next_mutation(&self) {
    self.fail_next_mutation.store(true, Ordering::SeqCst);
  }

  pub fn employee_count(&self) -> usize {
    self.employees.lock().unwrap().len()
  }

  fn not_found() -> Error {
    Error::Http {
      status: 404,
      body: r#"{"error": "Employee not found"}"#.into(),
    }
  }

  fn list(&self, search: Option<&str>, department: Option<&str>) -> Value {
    let employees = self.employees.lock().unwrap();
    let matched: Vec<Value> = employees
      .iter()
      .filter(|e| {
        if let Some(d) = department {
          if e["department"].as_str() != Some(d) {
            return false;
          }
        }
        if let Some(s) = search {
          let needle = s.to_lowercase();
          let hit = ["firstName", "lastName", "email"].iter().any(|field| {
            e[*field]
              .as_str()
              .is_some_and(|v| v.to_lowercase().contains(&needle))
          });
          if !hit {
            return false;
          }
        }
        true
      })
      .cloned()
      .collect();
    json!({"employees": matched, "count": matched.len()})
  }

  fn departments(&self) -> Value {
    let employees = self.employees.lock().unwrap();
    let mut counts: Vec<(String, u64)> = Vec::new();
    for e in employees.iter() {
      if e["isActive"].as_bool() != Some(true) {
        continue;
      }
      let name = e["department"].as_str().unwrap_or("Unknown").to_string();
      match counts.iter_mut().find(|(n, _)| *n == name) {
        Some((_, c)) => *c += 1,
        None => counts.push((name, 1)),
      }
    }
    let departments: Vec<Value> = counts
      .into_iter()
      .map(|(name, count)| json!({"name": name, "count": count}))
      .collect();
    json!({"departments": departments})
  }

  fn apply_mutation(&self, request: &MutationRequest) -> Result<Value> {
    if self.fail_next_mutation.swap(false, Ordering::SeqCst) {
      return Err(Error::Http {
        status: 500,
        body: r#"{"error": "internal"}"#.into(),
      });
    }

    match request.operation {
      Operation::Create => {
        let id = format!("emp-{}", self.next_id.fetch_add(1, Ordering::SeqCst));
        let body = request.payload.as_object().cloned().unwrap_or_default();
        let mut employee = json!({
          "id": id,
          "position": "",
          "phone": "",
          "hireDate": "2024-01-01",
          "salary": 0,
          "isActive": true
        });
        for (field, value) in body {
          employee[field] = value;
        }
        self.employees.lock().unwrap().push(employee.clone());
        Ok(employee)
      }
      Operation::Update => {
        let id = request.id().ok_or_else(Self::not_found)?.to_string();
        let mut employees = self.employees.lock().unwrap();
        let existing = employees
          .iter_mut()
          .find(|e| e["id"].as_str() == Some(id.as_str()))
          .ok_or_else(Self::not_found)?;
        if let Some(body) = request.payload.as_object() {
          for (field, value) in body {
            existing[field] = value.clone();
          }
        }
        Ok(existing.clone())
      }
      Operation::Delete => {
        let id = request.id().ok_or_else(Self::not_found)?.to_string();
        let mut employees = self.employees.lock().unwrap();
        let before = employees.len();
        employees.retain(|e| e["id"].as_str() != Some(id.as_str()));
        if employees.len() == before {
          return Err(Self::not_found());
        }
        Ok(json!({"message": "Employee deleted successfully"}))
      }
    }
  }
}

impl DirectoryBackend for FakeBackend {
  fn fetch(&self, key: &QueryKey) -> BoxFuture<'static, Result<Value>> {
    self.fetch_calls.fetch_add(1, Ordering::SeqCst);
    let delay = *self.fetch_delay.lock().unwrap();
    let result = match key.resource() {
      "employees" => Ok(self.list(key.param("search"), key.param("department"))),
      "employee" => {
        let id = key.param("id").unwrap_or_default().to_string();
        let employees = self.employees.lock().unwrap();
        employees
          .iter()
          .find(|e| e["id"].as_str() == Some(id.as_str()))
          .cloned()
          .ok_or_else(Self::not_found)
      }
      "departments" => Ok(self.departments()),
      other => Err(Error::Validation(format!("unknown resource: {other}"))),
    };
    async move {
      if delay > Duration::ZERO {
        tokio::time::sleep(delay).await;
      }
      result
    }
    .boxed()
  }

  fn mutate(&self, request: &MutationRequest) -> BoxFuture<'static, Result<Value>> {
    let result = self.apply_mutation(request);
    async move { result }.boxed()
  }
}

/// Records every snapshot an observer receives.
#[derive(Clone)]
pub(crate) struct Recorder {
  snapshots: Arc<Mutex<Vec<QuerySnapshot>>>,
}

impl Recorder {
  pub fn new() -> Self {
    Self {
      snapshots: Arc::new(Mutex::new(Vec::new())),
    }
  }

  pub fn observer(&self) -> Observer {
    let snapshots = Arc::clone(&self.snapshots);
    Arc::new(move |snapshot: QuerySnapshot| snapshots.lock().unwrap().push(snapshot))
  }

  /// The same recording observer as a bare closure, for the closure-typed
  /// `QueryClient::subscribe`/`subscribe_key` facade (the manager-level API
  /// takes an [`Observer`] directly).
  pub fn callback(&self) -> impl Fn(QuerySnapshot) + Send + Sync + 'static {
    let observer = self.observer();
    move |snapshot| observer(snapshot)
  }

  pub fn snapshots(&self) -> Vec<QuerySnapshot> {
    self.snapshots.lock().unwrap().clone()
  }

  pub fn statuses(&self) -> Vec<QueryStatus> {
    self.snapshots().iter().map(|s| s.status).collect()
  }

  pub fn last(&self) -> Option<QuerySnapshot> {
    self.snapshots().last().cloned()
  }

  /// Poll until a snapshot with the given status has been recorded.
  /// Panics after two seconds; a test waiting that long has failed.
  pub async fn wait_for(&self, status: QueryStatus) {
    for _ in 0..400 {
      if self.statuses().contains(&status) {
        return;
      }
      tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("timed out waiting for {status:?}; saw {:?}", self.statuses());
  }
}
