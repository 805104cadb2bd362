//! Resource types and their time-to-live policy.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use color_eyre::{eyre::eyre, Report};
use serde::{Deserialize, Serialize};

/// TTL applied to resource types that have no entry in the table.
pub const FALLBACK_TTL: Duration = Duration::from_secs(60 * 60);

/// A cache bucket. Each variant owns one partition of the persisted document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceType {
  Me,
  Clients,
  Projects,
  Project,
  ProjectByName,
  Tasks,
  Task,
  TaskByName,
  Tasklists,
  Entries,
  Entry,
  ActiveEntry,
}

impl ResourceType {
  pub const ALL: [ResourceType; 12] = [
    Self::Me,
    Self::Clients,
    Self::Projects,
    Self::Project,
    Self::ProjectByName,
    Self::Tasks,
    Self::Task,
    Self::TaskByName,
    Self::Tasklists,
    Self::Entries,
    Self::Entry,
    Self::ActiveEntry,
  ];

  /// Bucket name as it appears in the cache file.
  pub fn as_str(self) -> &'static str {
    match self {
      Self::Me => "me",
      Self::Clients => "clients",
      Self::Projects => "projects",
      Self::Project => "project",
      Self::ProjectByName => "project_by_name",
      Self::Tasks => "tasks",
      Self::Task => "task",
      Self::TaskByName => "task_by_name",
      Self::Tasklists => "tasklists",
      Self::Entries => "entries",
      Self::Entry => "entry",
      Self::ActiveEntry => "active_entry",
    }
  }

  /// Built-in TTL, or `None` when the type falls back to [`FALLBACK_TTL`].
  fn default_ttl(self) -> Option<Duration> {
    const MINUTE: u64 = 60;
    const HOUR: u64 = 60 * MINUTE;

    let secs = match self {
      Self::Me => 24 * HOUR,
      Self::Projects | Self::Project | Self::ProjectByName | Self::Tasklists => HOUR,
      Self::Tasks | Self::Task | Self::TaskByName => 30 * MINUTE,
      Self::Entries | Self::Entry => 5 * MINUTE,
      // A running timer must never be served from cache
      Self::ActiveEntry => 0,
      Self::Clients => return None,
    };
    Some(Duration::from_secs(secs))
  }
}

impl fmt::Display for ResourceType {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

impl FromStr for ResourceType {
  type Err = Report;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    Self::ALL
      .into_iter()
      .find(|rt| rt.as_str() == s)
      .ok_or_else(|| eyre!("Unknown cache resource type: {}", s))
  }
}

/// Per-type TTLs: the built-in table plus any configured overrides.
#[derive(Debug, Clone, Default)]
pub struct TtlTable {
  overrides: BTreeMap<ResourceType, Duration>,
}

impl TtlTable {
  /// Table with configured overrides, in seconds.
  ///
  /// Overrides for `active_entry` are dropped: that type is never cached.
  pub fn with_overrides(overrides: &BTreeMap<ResourceType, u64>) -> Self {
    let overrides = overrides
      .iter()
      .filter_map(|(rt, secs)| {
        if *rt == ResourceType::ActiveEntry && *secs != 0 {
          tracing::warn!("Ignoring TTL override for active_entry: the running timer is never cached");
          return None;
        }
        Some((*rt, Duration::from_secs(*secs)))
      })
      .collect();

    Self { overrides }
  }

  /// TTL for a resource type. Zero means "never cache".
  pub fn ttl(&self, resource: ResourceType) -> Duration {
    self
      .overrides
      .get(&resource)
      .copied()
      .or_else(|| resource.default_ttl())
      .unwrap_or(FALLBACK_TTL)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_default_table() {
    let table = TtlTable::default();
    assert_eq!(table.ttl(ResourceType::Me), Duration::from_secs(86_400));
    assert_eq!(table.ttl(ResourceType::Projects), Duration::from_secs(3_600));
    assert_eq!(table.ttl(ResourceType::TaskByName), Duration::from_secs(1_800));
    assert_eq!(table.ttl(ResourceType::Entry), Duration::from_secs(300));
    assert_eq!(table.ttl(ResourceType::ActiveEntry), Duration::ZERO);
  }

  #[test]
  fn test_clients_use_fallback() {
    assert_eq!(TtlTable::default().ttl(ResourceType::Clients), FALLBACK_TTL);
  }

  #[test]
  fn test_overrides_win() {
    let overrides = BTreeMap::from([(ResourceType::Projects, 60), (ResourceType::Tasks, 0)]);
    let table = TtlTable::with_overrides(&overrides);
    assert_eq!(table.ttl(ResourceType::Projects), Duration::from_secs(60));
    assert_eq!(table.ttl(ResourceType::Tasks), Duration::ZERO);
    assert_eq!(table.ttl(ResourceType::Project), Duration::from_secs(3_600));
  }

  #[test]
  fn test_active_entry_override_ignored() {
    let overrides = BTreeMap::from([(ResourceType::ActiveEntry, 600)]);
    let table = TtlTable::with_overrides(&overrides);
    assert_eq!(table.ttl(ResourceType::ActiveEntry), Duration::ZERO);
  }

  #[test]
  fn test_parse_round_trips_names() {
    for rt in ResourceType::ALL {
      assert_eq!(rt.as_str().parse::<ResourceType>().ok(), Some(rt));
    }
    assert!("widgets".parse::<ResourceType>().is_err());
  }
}
