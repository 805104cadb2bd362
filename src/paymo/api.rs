//! The contract shared by the HTTP client and the caching wrapper.

use chrono::Local;

use super::error::ApiError;
use super::types::{
  Client, CreateProjectRequest, CreateTaskRequest, CreateTimeEntryRequest, EntryListOptions,
  Project, ProjectListOptions, Task, TaskList, TaskListOptions, TimeEntry, UpdateTimeEntryRequest,
  User,
};

pub type ApiResult<T> = Result<T, ApiError>;

/// All Paymo operations used by the CLI.
///
/// Errors must keep server-reported failures ([`ApiError::Server`],
/// [`ApiError::NotFound`]) apart from [`ApiError::Transport`]; the cache
/// relies on that to decide when stale data may be served.
pub trait PaymoApi {
  // Auth
  fn get_me(&self) -> ApiResult<User>;

  fn validate_auth(&self) -> ApiResult<()> {
    self.get_me().map(|_| ())
  }

  // Clients
  fn get_clients(&self) -> ApiResult<Vec<Client>>;

  // Projects
  fn get_projects(&self, opts: Option<&ProjectListOptions>) -> ApiResult<Vec<Project>>;
  fn get_project(&self, id: u64) -> ApiResult<Project>;
  /// First project whose name contains `name`, case-insensitively
  fn get_project_by_name(&self, name: &str) -> ApiResult<Project>;
  fn create_project(&self, req: &CreateProjectRequest) -> ApiResult<Project>;
  fn archive_project(&self, id: u64) -> ApiResult<()>;

  // Tasks
  fn get_tasks(&self, opts: Option<&TaskListOptions>) -> ApiResult<Vec<Task>>;
  fn get_task(&self, id: u64) -> ApiResult<Task>;
  fn get_task_by_name(&self, project_id: u64, name: &str) -> ApiResult<Task>;
  fn create_task(&self, req: &CreateTaskRequest) -> ApiResult<Task>;
  fn complete_task(&self, id: u64) -> ApiResult<()>;
  fn get_task_lists(&self, project_id: u64) -> ApiResult<Vec<TaskList>>;

  // Time entries
  fn get_entries(&self, opts: Option<&EntryListOptions>) -> ApiResult<Vec<TimeEntry>>;
  fn get_entry(&self, id: u64) -> ApiResult<TimeEntry>;
  fn create_entry(&self, req: &CreateTimeEntryRequest) -> ApiResult<TimeEntry>;
  fn update_entry(&self, id: u64, req: &UpdateTimeEntryRequest) -> ApiResult<TimeEntry>;
  fn delete_entry(&self, id: u64) -> ApiResult<()>;
  /// The running entry for a user, if any
  fn get_active_entry(&self, user_id: u64) -> ApiResult<Option<TimeEntry>>;
  fn start_entry(&self, task_id: u64, description: &str) -> ApiResult<TimeEntry>;
  fn stop_entry(&self, id: u64) -> ApiResult<TimeEntry>;

  /// Today's entries for a user, with task and project included.
  fn get_today_entries(&self, user_id: u64) -> ApiResult<Vec<TimeEntry>> {
    let today = Local::now().date_naive();
    self.get_entries(Some(&EntryListOptions {
      user_id: Some(user_id),
      start_date: Some(today),
      end_date: Some(today),
      include_task: true,
      include_project: true,
      ..Default::default()
    }))
  }
}
