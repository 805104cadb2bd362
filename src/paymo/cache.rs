//! Caching implementations for Paymo types.

use crate::cache::Named;

use super::types::{EntryListOptions, Project, ProjectListOptions, Task, TaskListOptions};

/// Key shared by absent and all-default list options.
pub const ALL_KEY: &str = "all";

const SEPARATOR: &str = "|";

// ============================================================================
// Named implementations
// ============================================================================

impl Named for Project {
  fn id(&self) -> u64 {
    self.id
  }

  fn name(&self) -> &str {
    &self.name
  }
}

impl Named for Task {
  fn id(&self) -> u64 {
    self.id
  }

  fn name(&self) -> &str {
    &self.name
  }

  fn parent_id(&self) -> u64 {
    self.project_id
  }
}

// ============================================================================
// Query keys
// ============================================================================

/// List filters that map to a readable, order-stable cache key.
pub trait QueryKey {
  /// `name=value` fragments for every field that is set, in a fixed order.
  fn key_parts(&self) -> Vec<String>;

  fn cache_key(&self) -> String {
    let parts = self.key_parts();
    if parts.is_empty() {
      ALL_KEY.to_string()
    } else {
      parts.join(SEPARATOR)
    }
  }
}

/// Cache key for optional list filters; `None` is the same as no filter.
pub fn list_key<Q: QueryKey>(opts: Option<&Q>) -> String {
  opts.map_or_else(|| ALL_KEY.to_string(), QueryKey::cache_key)
}

/// Cache key for an entity fetched by id.
pub fn id_key(id: u64) -> String {
  id.to_string()
}

/// Cache key for the task lists of one project.
pub fn task_lists_key(project_id: u64) -> String {
  format!("project={}", project_id)
}

impl QueryKey for ProjectListOptions {
  fn key_parts(&self) -> Vec<String> {
    let mut parts = Vec::new();
    if self.active_only {
      parts.push("active=true".to_string());
    }
    if let Some(client_id) = self.client_id {
      parts.push(format!("client={}", client_id));
    }
    if let Some(user_id) = self.user_id {
      parts.push(format!("user={}", user_id));
    }
    if self.include_tasks {
      parts.push("inc_tasks".to_string());
    }
    if self.include_client {
      parts.push("inc_client".to_string());
    }
    parts
  }
}

impl QueryKey for TaskListOptions {
  fn key_parts(&self) -> Vec<String> {
    let mut parts = Vec::new();
    if let Some(project_id) = self.project_id {
      parts.push(format!("project={}", project_id));
    }
    if let Some(task_list_id) = self.task_list_id {
      parts.push(format!("tasklist={}", task_list_id));
    }
    if let Some(user_id) = self.user_id {
      parts.push(format!("user={}", user_id));
    }
    if self.include_completed {
      parts.push("completed=true".to_string());
    }
    if self.include_project {
      parts.push("inc_project".to_string());
    }
    parts
  }
}

impl QueryKey for EntryListOptions {
  fn key_parts(&self) -> Vec<String> {
    let mut parts = Vec::new();
    if let Some(user_id) = self.user_id {
      parts.push(format!("user={}", user_id));
    }
    if let Some(project_id) = self.project_id {
      parts.push(format!("project={}", project_id));
    }
    if let Some(task_id) = self.task_id {
      parts.push(format!("task={}", task_id));
    }
    // Day granularity
    if let Some(start) = self.start_date {
      parts.push(format!("start={}", start.format("%Y-%m-%d")));
    }
    if let Some(end) = self.end_date {
      parts.push(format!("end={}", end.format("%Y-%m-%d")));
    }
    if self.include_task {
      parts.push("inc_task".to_string());
    }
    if self.include_project {
      parts.push("inc_project".to_string());
    }
    parts
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use chrono::NaiveDate;

  #[test]
  fn test_absent_and_default_options_share_key() {
    assert_eq!(list_key::<ProjectListOptions>(None), "all");
    assert_eq!(list_key(Some(&ProjectListOptions::default())), "all");
    assert_eq!(list_key::<TaskListOptions>(None), "all");
    assert_eq!(list_key(Some(&TaskListOptions::default())), "all");
    assert_eq!(list_key::<EntryListOptions>(None), "all");
    assert_eq!(list_key(Some(&EntryListOptions::default())), "all");
  }

  #[test]
  fn test_projects_key_field_order() {
    let opts = ProjectListOptions {
      active_only: true,
      client_id: Some(7),
      user_id: Some(3),
      include_tasks: true,
      include_client: true,
    };
    assert_eq!(
      opts.cache_key(),
      "active=true|client=7|user=3|inc_tasks|inc_client"
    );
  }

  #[test]
  fn test_tasks_key() {
    let opts = TaskListOptions {
      project_id: Some(5),
      include_completed: true,
      ..Default::default()
    };
    assert_eq!(opts.cache_key(), "project=5|completed=true");

    let open_only = TaskListOptions {
      project_id: Some(5),
      ..Default::default()
    };
    assert_eq!(open_only.cache_key(), "project=5");
  }

  #[test]
  fn test_entries_key_renders_days() {
    let opts = EntryListOptions {
      user_id: Some(1),
      task_id: Some(42),
      start_date: NaiveDate::from_ymd_opt(2024, 1, 15),
      end_date: NaiveDate::from_ymd_opt(2024, 1, 21),
      ..Default::default()
    };
    assert_eq!(
      opts.cache_key(),
      "user=1|task=42|start=2024-01-15|end=2024-01-21"
    );
  }

  #[test]
  fn test_single_field_difference_changes_key() {
    let a = EntryListOptions {
      project_id: Some(1),
      ..Default::default()
    };
    let b = EntryListOptions {
      project_id: Some(2),
      ..Default::default()
    };
    let c = EntryListOptions {
      task_id: Some(1),
      ..Default::default()
    };
    assert_ne!(a.cache_key(), b.cache_key());
    assert_ne!(a.cache_key(), c.cache_key());
    assert_ne!(a.cache_key(), ALL_KEY);
  }

  #[test]
  fn test_key_is_deterministic() {
    let opts = ProjectListOptions {
      client_id: Some(12),
      ..Default::default()
    };
    assert_eq!(opts.cache_key(), opts.clone().cache_key());
  }

  #[test]
  fn test_fixed_keys() {
    assert_eq!(id_key(17), "17");
    assert_eq!(task_lists_key(4), "project=4");
  }
}
