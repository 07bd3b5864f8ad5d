//! Canonical query identity.

use std::collections::BTreeMap;
use std::fmt;
use url::form_urlencoded;

/// Canonical identifier for a parameterized read operation.
///
/// Two keys are equal iff their canonical serialization matches; parameter
/// order and absent or empty values never affect identity. Keys are
/// immutable once built.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct QueryKey {
  resource: String,
  params: BTreeMap<String, String>,
}

impl QueryKey {
  /// Canonicalize a (resource, parameters) pair.
  ///
  /// Parameters with `None` or empty values are dropped; the rest are
  /// ordered by name. Identical logical queries produce identical keys
  /// regardless of how the parameter list was assembled.
  pub fn normalize(resource: &str, params: &[(&str, Option<&str>)]) -> Self {
    let params = params
      .iter()
      .filter_map(|(name, value)| match value {
        Some(v) if !v.is_empty() && !name.is_empty() => Some((name.to_string(), v.to_string())),
        _ => None,
      })
      .collect();

    Self {
      resource: resource.to_string(),
      params,
    }
  }

  /// Key for a resource list with no filters.
  pub fn bare(resource: &str) -> Self {
    Self::normalize(resource, &[])
  }

  /// Key addressing a single item by id, e.g. `employee?id=5`.
  pub fn item(resource: &str, id: &str) -> Self {
    Self::normalize(resource, &[("id", Some(id))])
  }

  pub fn resource(&self) -> &str {
    &self.resource
  }

  pub fn params(&self) -> &BTreeMap<String, String> {
    &self.params
  }

  pub fn param(&self, name: &str) -> Option<&str> {
    self.params.get(name).map(String::as_str)
  }

  /// Canonical serialization, e.g. `employees?department=HR&search=ann`.
  pub fn canonical(&self) -> String {
    if self.params.is_empty() {
      return self.resource.clone();
    }
    let encoded = form_urlencoded::Serializer::new(String::new())
      .extend_pairs(self.params.iter())
      .finish();
    format!("{}?{}", self.resource, encoded)
  }
}

impl fmt::Display for QueryKey {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(&self.canonical())
  }
}
