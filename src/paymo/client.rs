use std::sync::Mutex;
use std::time::{Duration, Instant};

use chrono::{DateTime, Local, NaiveDate, NaiveTime, TimeZone, Utc};
use color_eyre::{eyre::eyre, Result};
use reqwest::blocking::RequestBuilder;
use reqwest::header::{HeaderMap, ACCEPT};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::json;
use tracing::{debug, warn};
use url::Url;

use crate::config::Config;
use crate::paymo::api::{ApiResult, PaymoApi};
use crate::paymo::api_types::{
  ApiErrorBody, ClientsResponse, EntriesResponse, MeResponse, ProjectsResponse, TaskListsResponse,
  TasksResponse,
};
use crate::paymo::error::ApiError;
use crate::paymo::types::{
  Client, CreateProjectRequest, CreateTaskRequest, CreateTimeEntryRequest, EntryListOptions,
  Project, ProjectListOptions, Task, TaskList, TaskListOptions, TimeEntry, UpdateTimeEntryRequest,
  User,
};

pub const DEFAULT_BASE_URL: &str = "https://app.paymoapp.com/api";

/// Request budget reported by the last response
#[derive(Debug, Default)]
struct RateLimit {
  remaining: Option<u64>,
  reset_at: Option<Instant>,
}

/// Blocking Paymo API client
pub struct PaymoClient {
  http: reqwest::blocking::Client,
  base_url: String,
  api_key: String,
  rate: Mutex<RateLimit>,
}

impl PaymoClient {
  pub fn new(config: &Config) -> Result<Self> {
    let api_key = config.get_api_key()?;
    Self::with_base_url(
      &config.api.base_url,
      api_key,
      Duration::from_secs(config.api.timeout_secs),
    )
  }

  pub fn with_base_url(base_url: &str, api_key: impl Into<String>, timeout: Duration) -> Result<Self> {
    let base_url = base_url.trim_end_matches('/').to_string();
    Url::parse(&base_url).map_err(|e| eyre!("Invalid Paymo base URL {}: {}", base_url, e))?;

    if !base_url.starts_with("https://")
      && !base_url.starts_with("http://localhost")
      && !base_url.starts_with("http://127.0.0.1")
    {
      warn!(
        "Base URL {} does not use HTTPS; credentials may be sent insecurely",
        base_url
      );
    }

    let http = reqwest::blocking::Client::builder()
      .timeout(timeout)
      .build()
      .map_err(|e| eyre!("Failed to create HTTP client: {}", e))?;

    Ok(Self {
      http,
      base_url,
      api_key: api_key.into(),
      rate: Mutex::new(RateLimit::default()),
    })
  }

  fn url(&self, path: &str, query: &[(&str, String)]) -> ApiResult<Url> {
    let mut url = Url::parse(&format!("{}/{}", self.base_url, path)).map_err(ApiError::transport)?;
    if !query.is_empty() {
      url.query_pairs_mut().extend_pairs(query);
    }
    Ok(url)
  }

  /// Send a request and return the body of a successful response.
  fn execute(&self, request: RequestBuilder) -> ApiResult<String> {
    self.wait_for_rate_limit();

    let response = request
      .basic_auth(&self.api_key, Some("x"))
      .header(ACCEPT, "application/json")
      .send()?;

    self.update_rate_limit(response.headers());

    let status = response.status();
    let body = response.text()?;

    if status.is_client_error() || status.is_server_error() {
      let message = serde_json::from_str::<ApiErrorBody>(&body)
        .map(|b| b.message)
        .unwrap_or_default();
      return Err(ApiError::server(status.as_u16(), message));
    }

    Ok(body)
  }

  fn get<T: DeserializeOwned>(&self, path: &str, query: &[(&str, String)]) -> ApiResult<T> {
    let url = self.url(path, query)?;
    debug!(%url, "GET");
    parse(&self.execute(self.http.get(url))?)
  }

  fn post<T: DeserializeOwned, B: Serialize + ?Sized>(&self, path: &str, body: &B) -> ApiResult<T> {
    let url = self.url(path, &[])?;
    debug!(%url, "POST");
    parse(&self.execute(self.http.post(url).json(body))?)
  }

  fn put<T: DeserializeOwned, B: Serialize + ?Sized>(&self, path: &str, body: &B) -> ApiResult<T> {
    let url = self.url(path, &[])?;
    debug!(%url, "PUT");
    parse(&self.execute(self.http.put(url).json(body))?)
  }

  fn put_unit<B: Serialize + ?Sized>(&self, path: &str, body: &B) -> ApiResult<()> {
    let url = self.url(path, &[])?;
    debug!(%url, "PUT");
    self.execute(self.http.put(url).json(body)).map(|_| ())
  }

  fn delete(&self, path: &str) -> ApiResult<()> {
    let url = self.url(path, &[])?;
    debug!(%url, "DELETE");
    self.execute(self.http.delete(url)).map(|_| ())
  }

  /// Block until the rate limit window reopens if the budget is spent.
  fn wait_for_rate_limit(&self) {
    let wait = match self.rate.lock() {
      Ok(rate) => match (rate.remaining, rate.reset_at) {
        (Some(0), Some(reset_at)) => reset_at.checked_duration_since(Instant::now()),
        _ => None,
      },
      Err(_) => None,
    };

    if let Some(wait) = wait {
      debug!(?wait, "Rate limit reached, waiting");
      std::thread::sleep(wait);
    }
  }

  fn update_rate_limit(&self, headers: &HeaderMap) {
    let header = |name: &str| -> Option<u64> { headers.get(name)?.to_str().ok()?.parse().ok() };

    if let Ok(mut rate) = self.rate.lock() {
      if let Some(remaining) = header("x-ratelimit-remaining") {
        rate.remaining = Some(remaining);
      }
      if let Some(decay) = header("x-ratelimit-decay-period") {
        rate.reset_at = Some(Instant::now() + Duration::from_secs(decay));
      }
    }
  }
}

fn parse<T: DeserializeOwned>(body: &str) -> ApiResult<T> {
  serde_json::from_str(body).map_err(|e| ApiError::Decode(e.to_string()))
}

fn first<T>(items: Vec<T>, what: &str) -> ApiResult<T> {
  items
    .into_iter()
    .next()
    .ok_or_else(|| ApiError::NotFound(what.to_string()))
}

fn created<T>(items: Vec<T>, what: &str) -> ApiResult<T> {
  items
    .into_iter()
    .next()
    .ok_or_else(|| ApiError::Decode(format!("no {} returned", what)))
}

/// Strip characters that would break out of a quoted `where` value.
fn sanitize(name: &str) -> String {
  name.replace(['"', '\\', '\''], "")
}

/// Midnight at the start of `date` in `tz`, as a UTC instant.
fn local_midnight<Tz: TimeZone>(date: NaiveDate, tz: &Tz) -> DateTime<Utc> {
  let local = date.and_time(NaiveTime::MIN);
  tz.from_local_datetime(&local)
    .earliest()
    .map(|t| t.with_timezone(&Utc))
    // Midnight skipped by a DST jump
    .unwrap_or_else(|| Utc.from_utc_datetime(&local))
}

fn where_time(instant: DateTime<Utc>) -> String {
  instant.format("%Y-%m-%dT%H:%M:%SZ").to_string()
}

fn day_start<Tz: TimeZone>(date: NaiveDate, tz: &Tz) -> String {
  where_time(local_midnight(date, tz))
}

/// Last second before the following local midnight.
fn day_end<Tz: TimeZone>(date: NaiveDate, tz: &Tz) -> String {
  let next = date
    .succ_opt()
    .map(|next| local_midnight(next, tz))
    .unwrap_or_else(|| local_midnight(date, tz) + chrono::Duration::days(1));
  where_time(next - chrono::Duration::seconds(1))
}

/// Assemble `where` / `include` query parameters, skipping empty ones.
fn list_query(conditions: Vec<String>, includes: Vec<&str>) -> Vec<(&'static str, String)> {
  let mut query = Vec::new();
  if !conditions.is_empty() {
    query.push(("where", conditions.join(" and ")));
  }
  if !includes.is_empty() {
    query.push(("include", includes.join(",")));
  }
  query
}

impl PaymoApi for PaymoClient {
  fn get_me(&self) -> ApiResult<User> {
    let resp: MeResponse = self.get("me", &[])?;
    first(resp.users, "user")
  }

  fn get_clients(&self) -> ApiResult<Vec<Client>> {
    let resp: ClientsResponse = self.get("clients", &[])?;
    Ok(resp.clients)
  }

  fn get_projects(&self, opts: Option<&ProjectListOptions>) -> ApiResult<Vec<Project>> {
    let mut conditions = Vec::new();
    let mut includes = Vec::new();

    if let Some(opts) = opts {
      if opts.active_only {
        conditions.push("active=true".to_string());
      }
      if let Some(client_id) = opts.client_id {
        conditions.push(format!("client_id={}", client_id));
      }
      if let Some(user_id) = opts.user_id {
        conditions.push(format!("users in ({})", user_id));
      }
      if opts.include_tasks {
        includes.push("tasklists.tasks");
      }
      if opts.include_client {
        includes.push("client");
      }
    }

    let resp: ProjectsResponse = self.get("projects", &list_query(conditions, includes))?;
    Ok(resp.projects)
  }

  fn get_project(&self, id: u64) -> ApiResult<Project> {
    let query = [("include", "tasklists.tasks,client".to_string())];
    let resp: ProjectsResponse = self.get(&format!("projects/{}", id), &query)?;
    first(resp.projects, "project")
  }

  fn get_project_by_name(&self, name: &str) -> ApiResult<Project> {
    let query = [("where", format!("name like \"%{}%\"", sanitize(name)))];
    let resp: ProjectsResponse = self.get("projects", &query)?;
    first(resp.projects, "project")
  }

  fn create_project(&self, req: &CreateProjectRequest) -> ApiResult<Project> {
    let resp: ProjectsResponse = self.post("projects", req)?;
    created(resp.projects, "project")
  }

  fn archive_project(&self, id: u64) -> ApiResult<()> {
    self.put_unit(&format!("projects/{}", id), &json!({ "active": false }))
  }

  fn get_tasks(&self, opts: Option<&TaskListOptions>) -> ApiResult<Vec<Task>> {
    // No options means the same query as default options; both share a cache key
    let opts = opts.cloned().unwrap_or_default();
    let mut conditions = Vec::new();
    let mut includes = Vec::new();

    if let Some(project_id) = opts.project_id {
      conditions.push(format!("project_id={}", project_id));
    }
    if let Some(task_list_id) = opts.task_list_id {
      conditions.push(format!("tasklist_id={}", task_list_id));
    }
    if !opts.include_completed {
      conditions.push("complete=false".to_string());
    }
    if let Some(user_id) = opts.user_id {
      conditions.push(format!("users in ({})", user_id));
    }
    if opts.include_project {
      includes.push("project");
    }

    let resp: TasksResponse = self.get("tasks", &list_query(conditions, includes))?;
    Ok(resp.tasks)
  }

  fn get_task(&self, id: u64) -> ApiResult<Task> {
    let query = [("include", "project".to_string())];
    let resp: TasksResponse = self.get(&format!("tasks/{}", id), &query)?;
    first(resp.tasks, "task")
  }

  fn get_task_by_name(&self, project_id: u64, name: &str) -> ApiResult<Task> {
    let query = [(
      "where",
      format!(
        "project_id={} and name like \"%{}%\"",
        project_id,
        sanitize(name)
      ),
    )];
    let resp: TasksResponse = self.get("tasks", &query)?;
    first(resp.tasks, "task")
  }

  fn create_task(&self, req: &CreateTaskRequest) -> ApiResult<Task> {
    let resp: TasksResponse = self.post("tasks", req)?;
    created(resp.tasks, "task")
  }

  fn complete_task(&self, id: u64) -> ApiResult<()> {
    self.put_unit(&format!("tasks/{}", id), &json!({ "complete": true }))
  }

  fn get_task_lists(&self, project_id: u64) -> ApiResult<Vec<TaskList>> {
    let query = [("where", format!("project_id={}", project_id))];
    let resp: TaskListsResponse = self.get("tasklists", &query)?;
    Ok(resp.tasklists)
  }

  fn get_entries(&self, opts: Option<&EntryListOptions>) -> ApiResult<Vec<TimeEntry>> {
    let mut conditions = Vec::new();
    let mut includes = Vec::new();

    if let Some(opts) = opts {
      if let Some(user_id) = opts.user_id {
        conditions.push(format!("user_id={}", user_id));
      }
      if let Some(project_id) = opts.project_id {
        conditions.push(format!("project_id={}", project_id));
      }
      if let Some(task_id) = opts.task_id {
        conditions.push(format!("task_id={}", task_id));
      }
      if let Some(start) = opts.start_date {
        conditions.push(format!("start_time>=\"{}\"", day_start(start, &Local)));
      }
      if let Some(end) = opts.end_date {
        conditions.push(format!("start_time<=\"{}\"", day_end(end, &Local)));
      }
      if opts.include_task {
        includes.push("task");
      }
      if opts.include_project {
        includes.push("task.project");
      }
    }

    let resp: EntriesResponse = self.get("entries", &list_query(conditions, includes))?;
    Ok(resp.entries)
  }

  fn get_entry(&self, id: u64) -> ApiResult<TimeEntry> {
    let resp: EntriesResponse = self.get(&format!("entries/{}", id), &[])?;
    first(resp.entries, "entry")
  }

  fn create_entry(&self, req: &CreateTimeEntryRequest) -> ApiResult<TimeEntry> {
    let resp: EntriesResponse = self.post("entries", req)?;
    created(resp.entries, "entry")
  }

  fn update_entry(&self, id: u64, req: &UpdateTimeEntryRequest) -> ApiResult<TimeEntry> {
    let resp: EntriesResponse = self.put(&format!("entries/{}", id), req)?;
    created(resp.entries, "entry")
  }

  fn delete_entry(&self, id: u64) -> ApiResult<()> {
    self.delete(&format!("entries/{}", id))
  }

  fn get_active_entry(&self, user_id: u64) -> ApiResult<Option<TimeEntry>> {
    let query = [
      ("where", format!("user_id={} and end_time=\"\"", user_id)),
      ("include", "task.project".to_string()),
    ];
    let resp: EntriesResponse = self.get("entries", &query)?;
    Ok(resp.entries.into_iter().next())
  }

  fn start_entry(&self, task_id: u64, description: &str) -> ApiResult<TimeEntry> {
    self.create_entry(&CreateTimeEntryRequest {
      task_id,
      start_time: Utc::now(),
      description: description.to_string(),
      ..Default::default()
    })
  }

  fn stop_entry(&self, id: u64) -> ApiResult<TimeEntry> {
    self.update_entry(
      id,
      &UpdateTimeEntryRequest {
        end_time: Some(Utc::now()),
        ..Default::default()
      },
    )
  }
}
