//! Cached Paymo client that wraps any `PaymoApi` with transparent caching.

use serde::{de::DeserializeOwned, Serialize};
use std::sync::Arc;
use tracing::warn;

use crate::cache::{CacheLayer, CacheSource, Named, ResourceType, Store};

use super::api::{ApiResult, PaymoApi};
use super::cache::{id_key, list_key, task_lists_key, ALL_KEY};
use super::types::{
  Client, CreateProjectRequest, CreateTaskRequest, CreateTimeEntryRequest, EntryListOptions,
  Project, ProjectListOptions, Task, TaskList, TaskListOptions, TimeEntry, UpdateTimeEntryRequest,
  User,
};

/// Write operations and the cache buckets each one makes stale.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mutation {
  CreateProject,
  ArchiveProject,
  CreateTask,
  CompleteTask,
  CreateEntry,
  UpdateEntry,
  DeleteEntry,
  StartEntry,
  StopEntry,
}

impl Mutation {
  pub fn invalidates(self) -> &'static [ResourceType] {
    match self {
      Self::CreateProject => &[ResourceType::Projects],
      Self::ArchiveProject => &[
        ResourceType::Projects,
        ResourceType::Project,
        ResourceType::ProjectByName,
      ],
      Self::CreateTask => &[ResourceType::Tasks],
      Self::CompleteTask => &[
        ResourceType::Tasks,
        ResourceType::Task,
        ResourceType::TaskByName,
      ],
      Self::CreateEntry
      | Self::UpdateEntry
      | Self::DeleteEntry
      | Self::StartEntry
      | Self::StopEntry => &[
        ResourceType::Entries,
        ResourceType::Entry,
        ResourceType::ActiveEntry,
      ],
    }
  }
}

/// Paymo client with transparent caching support.
///
/// This wraps another `PaymoApi` and implements the same trait. Reads are
/// served from the cache while fresh and fall back to stale data when the
/// network is unreachable; writes always go to the wrapped client and then
/// invalidate the affected buckets.
pub struct CachedPaymoClient<C> {
  inner: C,
  cache: CacheLayer,
}

impl<C: PaymoApi> CachedPaymoClient<C> {
  pub fn new(inner: C, store: Arc<Store>) -> Self {
    Self {
      inner,
      cache: CacheLayer::new(store),
    }
  }

  pub fn inner(&self) -> &C {
    &self.inner
  }

  pub fn store(&self) -> &Store {
    self.cache.store()
  }

  fn read<T, F>(&self, resource: ResourceType, key: &str, fetch: F) -> ApiResult<T>
  where
    T: Serialize + DeserializeOwned,
    F: FnOnce() -> ApiResult<T>,
  {
    self.cache.fetch(resource, key, fetch).map(|result| result.data)
  }

  /// Like `read`, also feeding freshly fetched entities to the name index.
  fn read_named<T, F>(&self, resource: ResourceType, key: &str, fetch: F) -> ApiResult<T>
  where
    T: Named + Serialize + DeserializeOwned,
    F: FnOnce() -> ApiResult<T>,
  {
    let result = self.cache.fetch(resource, key, fetch)?;
    if result.source == CacheSource::Network {
      self.index(resource, &result.data);
    }
    Ok(result.data)
  }

  fn read_named_list<T, F>(&self, resource: ResourceType, key: &str, index_as: ResourceType, fetch: F) -> ApiResult<Vec<T>>
  where
    T: Named + Serialize + DeserializeOwned,
    F: FnOnce() -> ApiResult<Vec<T>>,
  {
    let result = self.cache.fetch(resource, key, fetch)?;
    if result.source == CacheSource::Network {
      for item in &result.data {
        self.index(index_as, item);
      }
    }
    Ok(result.data)
  }

  fn index<T: Named>(&self, resource: ResourceType, item: &T) {
    self
      .store()
      .index_name(resource, &item.name().to_lowercase(), item.id(), item.parent_id());
  }

  /// Cache a single entity returned by a name search or a create.
  fn remember<T: Named + Serialize>(&self, resource: ResourceType, item: &T) {
    self.cache.fill(resource, &id_key(item.id()), item);
    self.index(resource, item);
  }

  fn lookup_name(&self, resource: ResourceType, name: &str, parent_id: u64) -> Option<u64> {
    match self
      .store()
      .lookup_name(resource, &name.to_lowercase(), parent_id)
    {
      Ok(found) => found,
      Err(e) => {
        warn!(%resource, name, "Name lookup failed: {}", e);
        None
      }
    }
  }

  fn invalidate(&self, mutation: Mutation) {
    self.cache.invalidate(mutation.invalidates());
  }
}

impl<C: PaymoApi> PaymoApi for CachedPaymoClient<C> {
  // --- Auth ---

  fn get_me(&self) -> ApiResult<User> {
    self.read(ResourceType::Me, "me", || self.inner.get_me())
  }

  fn validate_auth(&self) -> ApiResult<()> {
    self.inner.validate_auth()
  }

  // --- Clients ---

  fn get_clients(&self) -> ApiResult<Vec<Client>> {
    self.read(ResourceType::Clients, ALL_KEY, || self.inner.get_clients())
  }

  // --- Projects ---

  fn get_projects(&self, opts: Option<&ProjectListOptions>) -> ApiResult<Vec<Project>> {
    self.read_named_list(
      ResourceType::Projects,
      &list_key(opts),
      ResourceType::Project,
      || self.inner.get_projects(opts),
    )
  }

  fn get_project(&self, id: u64) -> ApiResult<Project> {
    self.read_named(ResourceType::Project, &id_key(id), || {
      self.inner.get_project(id)
    })
  }

  fn get_project_by_name(&self, name: &str) -> ApiResult<Project> {
    if let Some(id) = self.lookup_name(ResourceType::Project, name, 0) {
      return self.get_project(id);
    }

    let project = self.inner.get_project_by_name(name)?;
    self.remember(ResourceType::Project, &project);
    Ok(project)
  }

  fn create_project(&self, req: &CreateProjectRequest) -> ApiResult<Project> {
    let project = self.inner.create_project(req)?;
    self.invalidate(Mutation::CreateProject);
    self.remember(ResourceType::Project, &project);
    Ok(project)
  }

  fn archive_project(&self, id: u64) -> ApiResult<()> {
    self.inner.archive_project(id)?;
    self.invalidate(Mutation::ArchiveProject);
    Ok(())
  }

  // --- Tasks ---

  fn get_tasks(&self, opts: Option<&TaskListOptions>) -> ApiResult<Vec<Task>> {
    self.read_named_list(
      ResourceType::Tasks,
      &list_key(opts),
      ResourceType::Task,
      || self.inner.get_tasks(opts),
    )
  }

  fn get_task(&self, id: u64) -> ApiResult<Task> {
    self.read_named(ResourceType::Task, &id_key(id), || self.inner.get_task(id))
  }

  fn get_task_by_name(&self, project_id: u64, name: &str) -> ApiResult<Task> {
    if let Some(id) = self.lookup_name(ResourceType::Task, name, project_id) {
      return self.get_task(id);
    }

    let task = self.inner.get_task_by_name(project_id, name)?;
    self.remember(ResourceType::Task, &task);
    Ok(task)
  }

  fn create_task(&self, req: &CreateTaskRequest) -> ApiResult<Task> {
    let task = self.inner.create_task(req)?;
    self.invalidate(Mutation::CreateTask);
    self.remember(ResourceType::Task, &task);
    Ok(task)
  }

  fn complete_task(&self, id: u64) -> ApiResult<()> {
    self.inner.complete_task(id)?;
    self.invalidate(Mutation::CompleteTask);
    Ok(())
  }

  fn get_task_lists(&self, project_id: u64) -> ApiResult<Vec<TaskList>> {
    self.read(ResourceType::Tasklists, &task_lists_key(project_id), || {
      self.inner.get_task_lists(project_id)
    })
  }

  // --- Time entries ---

  fn get_entries(&self, opts: Option<&EntryListOptions>) -> ApiResult<Vec<TimeEntry>> {
    self.read(ResourceType::Entries, &list_key(opts), || {
      self.inner.get_entries(opts)
    })
  }

  fn get_entry(&self, id: u64) -> ApiResult<TimeEntry> {
    self.read(ResourceType::Entry, &id_key(id), || self.inner.get_entry(id))
  }

  fn create_entry(&self, req: &CreateTimeEntryRequest) -> ApiResult<TimeEntry> {
    let entry = self.inner.create_entry(req)?;
    self.invalidate(Mutation::CreateEntry);
    Ok(entry)
  }

  fn update_entry(&self, id: u64, req: &UpdateTimeEntryRequest) -> ApiResult<TimeEntry> {
    let entry = self.inner.update_entry(id, req)?;
    self.invalidate(Mutation::UpdateEntry);
    Ok(entry)
  }

  fn delete_entry(&self, id: u64) -> ApiResult<()> {
    self.inner.delete_entry(id)?;
    self.invalidate(Mutation::DeleteEntry);
    Ok(())
  }

  /// Never cached: a stale answer could report a stopped timer as running.
  fn get_active_entry(&self, user_id: u64) -> ApiResult<Option<TimeEntry>> {
    self.inner.get_active_entry(user_id)
  }

  fn start_entry(&self, task_id: u64, description: &str) -> ApiResult<TimeEntry> {
    let entry = self.inner.start_entry(task_id, description)?;
    self.invalidate(Mutation::StartEntry);
    Ok(entry)
  }

  fn stop_entry(&self, id: u64) -> ApiResult<TimeEntry> {
    let entry = self.inner.stop_entry(id)?;
    self.invalidate(Mutation::StopEntry);
    Ok(entry)
  }
}
