use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Deserializer, Serialize};

/// The authenticated user
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct User {
  pub id: u64,
  pub name: String,
  #[serde(default)]
  pub email: String,
  #[serde(default, rename = "type")]
  pub user_type: String,
  #[serde(default)]
  pub active: bool,
  #[serde(default)]
  pub timezone: String,
  pub created_on: Option<DateTime<Utc>>,
  pub updated_on: Option<DateTime<Utc>>,
}

/// A Paymo client (customer), not to be confused with the API client
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Client {
  pub id: u64,
  pub name: String,
  #[serde(default, skip_serializing_if = "String::is_empty")]
  pub email: String,
  #[serde(default, skip_serializing_if = "String::is_empty")]
  pub phone: String,
  #[serde(default, skip_serializing_if = "String::is_empty")]
  pub city: String,
  #[serde(default, skip_serializing_if = "String::is_empty")]
  pub country: String,
  #[serde(default)]
  pub active: bool,
  pub created_on: Option<DateTime<Utc>>,
  pub updated_on: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Project {
  pub id: u64,
  pub name: String,
  #[serde(default, skip_serializing_if = "String::is_empty")]
  pub code: String,
  #[serde(default, skip_serializing_if = "String::is_empty")]
  pub description: String,
  pub client_id: Option<u64>,
  #[serde(default)]
  pub active: bool,
  #[serde(default)]
  pub billable: bool,
  pub budget_hours: Option<f64>,
  pub price_per_hour: Option<f64>,
  #[serde(default, skip_serializing_if = "String::is_empty")]
  pub color: String,
  #[serde(default, skip_serializing_if = "Vec::is_empty")]
  pub users: Vec<u64>,
  #[serde(default, skip_serializing_if = "Vec::is_empty")]
  pub managers: Vec<u64>,
  pub created_on: Option<DateTime<Utc>>,
  pub updated_on: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TaskList {
  pub id: u64,
  pub name: String,
  pub project_id: u64,
  #[serde(default)]
  pub seq: i64,
  pub created_on: Option<DateTime<Utc>>,
  pub updated_on: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Task {
  pub id: u64,
  pub name: String,
  #[serde(default, skip_serializing_if = "String::is_empty")]
  pub code: String,
  pub project_id: u64,
  #[serde(default, rename = "tasklist_id")]
  pub task_list_id: u64,
  #[serde(default, skip_serializing_if = "String::is_empty")]
  pub description: String,
  #[serde(default)]
  pub complete: bool,
  #[serde(default)]
  pub billable: bool,
  pub due_date: Option<String>,
  #[serde(default, skip_serializing_if = "Vec::is_empty")]
  pub users: Vec<u64>,
  pub priority: Option<i64>,
  pub created_on: Option<DateTime<Utc>>,
  pub updated_on: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TimeEntry {
  pub id: u64,
  pub task_id: u64,
  pub user_id: u64,
  pub start_time: Option<DateTime<Utc>>,
  /// Missing while the timer is running
  #[serde(default, deserialize_with = "deserialize_optional_time")]
  pub end_time: Option<DateTime<Utc>>,
  /// Seconds
  #[serde(default)]
  pub duration: i64,
  #[serde(default, skip_serializing_if = "String::is_empty")]
  pub description: String,
  #[serde(default)]
  pub billable: bool,
  #[serde(default)]
  pub billed: bool,
  pub created_on: Option<DateTime<Utc>>,
  pub updated_on: Option<DateTime<Utc>>,

  // Included relations (when requested)
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub task: Option<Box<Task>>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub project: Option<Box<Project>>,
}

impl TimeEntry {
  pub fn is_running(&self) -> bool {
    self.end_time.is_none()
  }
}

/// Paymo reports an unset timestamp as either `null` or `""`.
fn deserialize_optional_time<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
  D: Deserializer<'de>,
{
  let raw: Option<String> = Option::deserialize(deserializer)?;
  match raw.as_deref() {
    None | Some("") => Ok(None),
    Some(s) => s
      .parse::<DateTime<Utc>>()
      .map(Some)
      .map_err(serde::de::Error::custom),
  }
}

// ============================================================================
// List filters
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProjectListOptions {
  pub active_only: bool,
  pub client_id: Option<u64>,
  pub user_id: Option<u64>,
  pub include_tasks: bool,
  pub include_client: bool,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TaskListOptions {
  pub project_id: Option<u64>,
  pub task_list_id: Option<u64>,
  pub user_id: Option<u64>,
  pub include_completed: bool,
  pub include_project: bool,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct EntryListOptions {
  pub user_id: Option<u64>,
  pub project_id: Option<u64>,
  pub task_id: Option<u64>,
  pub start_date: Option<NaiveDate>,
  /// Inclusive
  pub end_date: Option<NaiveDate>,
  pub include_task: bool,
  pub include_project: bool,
}

// ============================================================================
// Request bodies
// ============================================================================

#[derive(Debug, Clone, Default, Serialize)]
pub struct CreateProjectRequest {
  pub name: String,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub client_id: Option<u64>,
  #[serde(skip_serializing_if = "String::is_empty")]
  pub description: String,
  pub billable: bool,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub budget_hours: Option<f64>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub price_per_hour: Option<f64>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct CreateTaskRequest {
  pub name: String,
  pub project_id: u64,
  #[serde(rename = "tasklist_id", skip_serializing_if = "Option::is_none")]
  pub task_list_id: Option<u64>,
  #[serde(skip_serializing_if = "String::is_empty")]
  pub description: String,
  pub billable: bool,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub due_date: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct CreateTimeEntryRequest {
  pub task_id: u64,
  pub start_time: DateTime<Utc>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub end_time: Option<DateTime<Utc>>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub duration: Option<i64>,
  #[serde(skip_serializing_if = "String::is_empty")]
  pub description: String,
}

/// Partial update; `None` fields are left unchanged
#[derive(Debug, Clone, Default, Serialize)]
pub struct UpdateTimeEntryRequest {
  #[serde(skip_serializing_if = "Option::is_none")]
  pub task_id: Option<u64>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub start_time: Option<DateTime<Utc>>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub end_time: Option<DateTime<Utc>>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub duration: Option<i64>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub description: Option<String>,
}
