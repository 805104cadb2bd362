//! Sync targets, day ranges and suggestion logic

use chrono::{Datelike, Days, NaiveDate};
use color_eyre::{eyre::eyre, Result};

use crate::cache::ResourceType;

#[derive(Debug, Clone, PartialEq)]
pub struct SyncTarget {
  pub name: &'static str,
  pub aliases: &'static [&'static str],
  pub description: &'static str,
  /// Buckets dropped before the target is refetched
  pub invalidates: &'static [ResourceType],
}

/// All sync targets
pub const SYNC_TARGETS: &[SyncTarget] = &[
  SyncTarget {
    name: "me",
    aliases: &["user", "whoami"],
    description: "The authenticated user",
    invalidates: &[ResourceType::Me],
  },
  SyncTarget {
    name: "clients",
    aliases: &["c", "client"],
    description: "All clients",
    invalidates: &[ResourceType::Clients],
  },
  SyncTarget {
    name: "projects",
    aliases: &["p", "project"],
    description: "Projects and the project name index",
    invalidates: &[
      ResourceType::Projects,
      ResourceType::Project,
      ResourceType::ProjectByName,
    ],
  },
  SyncTarget {
    name: "tasks",
    aliases: &["t", "task"],
    description: "Tasks, task lists and the task name index",
    invalidates: &[
      ResourceType::Tasks,
      ResourceType::Task,
      ResourceType::TaskByName,
      ResourceType::Tasklists,
    ],
  },
];

/// Synced when no target is named
pub const DEFAULT_TARGETS: &[&str] = &["me", "clients", "projects"];

pub fn find_target(input: &str) -> Option<&'static SyncTarget> {
  let input_lower = input.to_lowercase();
  SYNC_TARGETS
    .iter()
    .find(|t| t.name == input_lower || t.aliases.contains(&input_lower.as_str()))
}

/// Resolve command-line targets, expanding `all` and dropping duplicates.
pub fn parse_targets(inputs: &[String]) -> Result<Vec<&'static SyncTarget>> {
  if inputs.is_empty() {
    return Ok(
      DEFAULT_TARGETS
        .iter()
        .filter_map(|name| find_target(name))
        .collect(),
    );
  }

  let mut targets: Vec<&'static SyncTarget> = Vec::new();
  for input in inputs {
    if input.eq_ignore_ascii_case("all") {
      return Ok(SYNC_TARGETS.iter().collect());
    }

    let target = find_target(input).ok_or_else(|| {
      match get_suggestions(input).first() {
        Some(suggestion) => eyre!(
          "Unknown sync target '{}'. Did you mean '{}'?",
          input,
          suggestion.name
        ),
        None => eyre!(
          "Unknown sync target '{}'. Valid targets: all, {}",
          input,
          SYNC_TARGETS
            .iter()
            .map(|t| t.name)
            .collect::<Vec<_>>()
            .join(", ")
        ),
      }
    })?;

    if !targets.contains(&target) {
      targets.push(target);
    }
  }

  Ok(targets)
}

/// Get suggestions for a given input, best match first
pub fn get_suggestions(input: &str) -> Vec<&'static SyncTarget> {
  let input_lower = input.to_lowercase();

  if input_lower.is_empty() {
    return SYNC_TARGETS.iter().collect();
  }

  let mut matches: Vec<(&SyncTarget, u32)> = Vec::new();

  for target in SYNC_TARGETS {
    // Prefix match on name
    if target.name.starts_with(&input_lower) {
      matches.push((target, 0));
      continue;
    }

    // Prefix match on alias
    if target.aliases.iter().any(|a| a.starts_with(&input_lower)) {
      matches.push((target, 1));
      continue;
    }

    // Input is the name with extra characters, e.g. a typo at the end
    if input_lower.starts_with(target.name) {
      matches.push((target, 2));
      continue;
    }

    // Fuzzy match (contains)
    if target.name.contains(&input_lower) {
      matches.push((target, 3));
    }
  }

  matches.sort_by_key(|(_, priority)| *priority);

  matches.into_iter().map(|(target, _)| target).collect()
}

// ============================================================================
// Day ranges
// ============================================================================

/// Inclusive range of local calendar days.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DayRange {
  pub start: NaiveDate,
  pub end: NaiveDate,
}

impl DayRange {
  pub fn single(day: NaiveDate) -> Self {
    Self {
      start: day,
      end: day,
    }
  }
}

/// Parse `today`, `yesterday`, `this-week`, `last-week` or `YYYY-MM-DD`
/// relative to `today`. Weeks start on Monday; `this-week` ends today.
pub fn parse_day_range(input: &str, today: NaiveDate) -> Result<DayRange> {
  let days_back = |n: u64| {
    today
      .checked_sub_days(Days::new(n))
      .ok_or_else(|| eyre!("Date out of range: {} minus {} days", today, n))
  };
  let since_monday = u64::from(today.weekday().num_days_from_monday());

  match input.to_lowercase().as_str() {
    "" | "today" => Ok(DayRange::single(today)),
    "yesterday" => Ok(DayRange::single(days_back(1)?)),
    "this-week" => Ok(DayRange {
      start: days_back(since_monday)?,
      end: today,
    }),
    "last-week" => Ok(DayRange {
      start: days_back(since_monday + 7)?,
      end: days_back(since_monday + 1)?,
    }),
    other => NaiveDate::parse_from_str(other, "%Y-%m-%d")
      .map(DayRange::single)
      .map_err(|_| {
        eyre!(
          "Invalid date '{}' (use YYYY-MM-DD, today, yesterday, this-week or last-week)",
          input
        )
      }),
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn args(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
  }

  fn names(targets: &[&SyncTarget]) -> Vec<&'static str> {
    targets.iter().map(|t| t.name).collect()
  }

  #[test]
  fn test_no_targets_uses_defaults() {
    let targets = parse_targets(&[]).unwrap();
    assert_eq!(names(&targets), vec!["me", "clients", "projects"]);
  }

  #[test]
  fn test_all_expands_to_every_target() {
    let targets = parse_targets(&args(&["projects", "all"])).unwrap();
    assert_eq!(targets.len(), SYNC_TARGETS.len());
  }

  #[test]
  fn test_aliases_and_duplicates() {
    let targets = parse_targets(&args(&["t", "tasks", "P"])).unwrap();
    assert_eq!(names(&targets), vec!["tasks", "projects"]);
  }

  #[test]
  fn test_unknown_target_suggests() {
    let err = parse_targets(&args(&["proj"])).unwrap_err();
    assert!(err.to_string().contains("Did you mean 'projects'"));

    let err = parse_targets(&args(&["taskss"])).unwrap_err();
    assert!(err.to_string().contains("Did you mean 'tasks'"));
  }

  #[test]
  fn test_unknown_target_without_suggestion() {
    let err = parse_targets(&args(&["zzz"])).unwrap_err();
    assert!(err.to_string().contains("Valid targets"));
  }

  #[test]
  fn test_invalidation_sets() {
    let projects = find_target("projects").unwrap();
    assert!(projects.invalidates.contains(&ResourceType::ProjectByName));
    assert!(!projects.invalidates.contains(&ResourceType::Tasks));

    let tasks = find_target("tasks").unwrap();
    assert!(tasks.invalidates.contains(&ResourceType::Tasklists));
    assert!(tasks.invalidates.contains(&ResourceType::TaskByName));

    let me = find_target("me").unwrap();
    assert_eq!(me.invalidates, &[ResourceType::Me]);
  }

  fn day(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
  }

  #[test]
  fn test_day_range_keywords() {
    // A Wednesday
    let today = day(2024, 3, 6);

    assert_eq!(parse_day_range("", today).unwrap(), DayRange::single(today));
    assert_eq!(
      parse_day_range("Yesterday", today).unwrap(),
      DayRange::single(day(2024, 3, 5))
    );
    assert_eq!(
      parse_day_range("this-week", today).unwrap(),
      DayRange {
        start: day(2024, 3, 4),
        end: today,
      }
    );
    assert_eq!(
      parse_day_range("last-week", today).unwrap(),
      DayRange {
        start: day(2024, 2, 26),
        end: day(2024, 3, 3),
      }
    );
  }

  #[test]
  fn test_day_range_week_on_sunday() {
    let sunday = day(2024, 3, 10);
    assert_eq!(
      parse_day_range("this-week", sunday).unwrap().start,
      day(2024, 3, 4)
    );
    assert_eq!(
      parse_day_range("last-week", sunday).unwrap(),
      DayRange {
        start: day(2024, 2, 26),
        end: day(2024, 3, 3),
      }
    );
  }

  #[test]
  fn test_day_range_explicit_date() {
    let today = day(2024, 3, 6);
    assert_eq!(
      parse_day_range("2024-02-01", today).unwrap(),
      DayRange::single(day(2024, 2, 1))
    );
    let err = parse_day_range("01/02/2024", today).unwrap_err();
    assert!(err.to_string().contains("YYYY-MM-DD"));
  }
}
