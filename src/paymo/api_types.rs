//! Serde-deserializable envelopes matching Paymo API responses.
//!
//! Every endpoint wraps its payload in an object keyed by the resource name,
//! and single-entity endpoints still return a one-element array.

use serde::Deserialize;

use super::types::{Client, Project, Task, TaskList, TimeEntry, User};

#[derive(Debug, Deserialize)]
pub struct MeResponse {
  #[serde(default)]
  pub users: Vec<User>,
}

#[derive(Debug, Deserialize)]
pub struct ClientsResponse {
  #[serde(default)]
  pub clients: Vec<Client>,
}

#[derive(Debug, Deserialize)]
pub struct ProjectsResponse {
  #[serde(default)]
  pub projects: Vec<Project>,
}

#[derive(Debug, Deserialize)]
pub struct TasksResponse {
  #[serde(default)]
  pub tasks: Vec<Task>,
}

#[derive(Debug, Deserialize)]
pub struct TaskListsResponse {
  #[serde(default)]
  pub tasklists: Vec<TaskList>,
}

#[derive(Debug, Deserialize)]
pub struct EntriesResponse {
  #[serde(default)]
  pub entries: Vec<TimeEntry>,
}

// ============================================================================
// Error body
// ============================================================================

/// Body of a 4xx/5xx response. Only the message is used.
#[derive(Debug, Default, Deserialize)]
pub struct ApiErrorBody {
  #[serde(default)]
  pub message: String,
}
