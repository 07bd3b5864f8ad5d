//! Employee directory REST API: typed client and domain types.

pub mod client;
pub mod types;

pub use client::DirectoryClient;
pub use types::{Deleted, Department, DepartmentsPage, Employee, EmployeesPage};
