//! Domain types for the employee directory backend.
//!
//! The backend speaks camelCase JSON; these types deserialize it directly
//! and are what cached payloads decode into. Records are server-owned; the
//! client only ever holds cached copies.

use serde::{Deserialize, Deserializer, Serialize};

/// An employee record.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Employee {
  pub id: String,
  pub first_name: String,
  pub last_name: String,
  pub email: String,
  pub department: String,
  #[serde(default)]
  pub position: String,
  #[serde(default)]
  pub phone: String,
  #[serde(default)]
  pub hire_date: String,
  /// The backend echoes whatever the form submitted, so this may arrive as
  /// a number or a numeric string.
  #[serde(default, deserialize_with = "de_salary")]
  pub salary: Option<f64>,
  #[serde(default = "default_true")]
  pub is_active: bool,
  #[serde(default)]
  pub created_at: Option<String>,
  #[serde(default)]
  pub updated_at: Option<String>,
}

impl Employee {
  pub fn full_name(&self) -> String {
    format!("{} {}", self.first_name, self.last_name)
  }
}

/// Per-department headcount of active employees.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Department {
  pub name: String,
  pub count: u64,
}

/// Response envelope for `GET /employees`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmployeesPage {
  pub employees: Vec<Employee>,
  #[serde(default)]
  pub count: usize,
}

/// Response envelope for `GET /departments`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DepartmentsPage {
  pub departments: Vec<Department>,
}

/// Response body for `DELETE /employees/{id}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Deleted {
  pub message: String,
}

fn default_true() -> bool {
  true
}

fn de_salary<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
  D: Deserializer<'de>,
{
  let value = serde_json::Value::deserialize(deserializer)?;
  Ok(match value {
    serde_json::Value::Number(n) => n.as_f64(),
    serde_json::Value::String(s) => s.trim().parse().ok(),
    _ => None,
  })
}
