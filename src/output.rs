//! Table, JSON and CSV rendering for command output.

use chrono::{DateTime, Local, Utc};
use clap::ValueEnum;
use color_eyre::{eyre::eyre, Result};
use serde::Serialize;

use crate::paymo::types::{Client, Project, Task, TimeEntry, User};

const MAX_NAME_WIDTH: usize = 40;

#[derive(Debug, Clone, Copy, Default, PartialEq, ValueEnum)]
pub enum Format {
  #[default]
  Table,
  Json,
  Csv,
}

/// Truncate a string to a maximum length, adding "..." if truncated
pub fn truncate(s: &str, max_len: usize) -> String {
  if s.chars().count() <= max_len {
    s.to_string()
  } else {
    let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
    format!("{}...", kept)
  }
}

/// Render seconds as `1h 05m`
pub fn format_duration(seconds: i64) -> String {
  let seconds = seconds.max(0);
  let hours = seconds / 3600;
  let minutes = (seconds % 3600) / 60;
  if hours > 0 {
    format!("{}h {:02}m", hours, minutes)
  } else {
    format!("{}m", minutes)
  }
}

pub fn format_time(time: Option<DateTime<Utc>>) -> String {
  time
    .map(|t| t.with_timezone(&Local).format("%H:%M").to_string())
    .unwrap_or_else(|| "-".to_string())
}

/// Left-aligned columns sized to their widest cell.
pub fn render_table(headers: &[&str], rows: &[Vec<String>]) -> String {
  let mut widths: Vec<usize> = headers.iter().map(|h| h.chars().count()).collect();
  for row in rows {
    for (i, cell) in row.iter().enumerate() {
      if let Some(width) = widths.get_mut(i) {
        *width = (*width).max(cell.chars().count());
      }
    }
  }

  let line = |cells: Vec<&str>| -> String {
    cells
      .iter()
      .zip(&widths)
      .map(|(cell, width)| format!("{:<width$}", cell, width = *width))
      .collect::<Vec<_>>()
      .join("  ")
      .trim_end()
      .to_string()
  };

  let mut out = vec![line(headers.to_vec())];
  for row in rows {
    out.push(line(row.iter().map(String::as_str).collect()));
  }
  out.join("\n")
}

/// Comma-separated rows with a header line. Fields holding a comma, quote
/// or line break are quoted, with quotes doubled.
pub fn render_csv(headers: &[&str], rows: &[Vec<String>]) -> String {
  let mut out = vec![csv_line(headers.iter().copied())];
  for row in rows {
    out.push(csv_line(row.iter().map(String::as_str)));
  }
  out.join("\n")
}

fn csv_line<'a>(cells: impl Iterator<Item = &'a str>) -> String {
  cells.map(csv_field).collect::<Vec<_>>().join(",")
}

fn csv_field(field: &str) -> String {
  if field.contains([',', '"', '\n', '\r']) {
    format!("\"{}\"", field.replace('"', "\"\""))
  } else {
    field.to_string()
  }
}

pub fn to_json<T: Serialize + ?Sized>(value: &T) -> Result<String> {
  serde_json::to_string_pretty(value).map_err(|e| eyre!("Failed to serialize output: {}", e))
}

// ============================================================================
// Entities
// ============================================================================

pub fn user(format: Format, user: &User) -> Result<String> {
  match format {
    Format::Json => to_json(user),
    Format::Csv => Ok(render_csv(
      &["id", "name", "email", "type"],
      &[vec![
        user.id.to_string(),
        user.name.clone(),
        user.email.clone(),
        user.user_type.clone(),
      ]],
    )),
    Format::Table => Ok(format!(
      "{} <{}>\nID: {}\nType: {}\nTimezone: {}",
      user.name, user.email, user.id, user.user_type, user.timezone
    )),
  }
}

pub fn clients(format: Format, clients: &[Client]) -> Result<String> {
  match format {
    Format::Json => to_json(clients),
    Format::Csv => {
      let rows: Vec<Vec<String>> = clients
        .iter()
        .map(|c| {
          vec![
            c.id.to_string(),
            c.name.clone(),
            c.email.clone(),
            c.active.to_string(),
          ]
        })
        .collect();
      Ok(render_csv(&["id", "name", "email", "active"], &rows))
    }
    Format::Table => {
      let rows: Vec<Vec<String>> = clients
        .iter()
        .map(|c| {
          vec![
            c.id.to_string(),
            truncate(&c.name, MAX_NAME_WIDTH),
            yes_no(c.active),
          ]
        })
        .collect();
      Ok(render_table(&["ID", "NAME", "ACTIVE"], &rows))
    }
  }
}

pub fn projects(format: Format, projects: &[Project]) -> Result<String> {
  match format {
    Format::Json => to_json(projects),
    Format::Csv => {
      let rows: Vec<Vec<String>> = projects
        .iter()
        .map(|p| {
          vec![
            p.id.to_string(),
            p.name.clone(),
            p.code.clone(),
            p.active.to_string(),
            p.billable.to_string(),
            p.client_id.map(|id| id.to_string()).unwrap_or_default(),
          ]
        })
        .collect();
      Ok(render_csv(
        &["id", "name", "code", "active", "billable", "client_id"],
        &rows,
      ))
    }
    Format::Table => {
      let rows: Vec<Vec<String>> = projects
        .iter()
        .map(|p| {
          vec![
            p.id.to_string(),
            truncate(&p.name, MAX_NAME_WIDTH),
            p.client_id.map(|id| id.to_string()).unwrap_or_default(),
            yes_no(p.active),
          ]
        })
        .collect();
      Ok(render_table(&["ID", "NAME", "CLIENT", "ACTIVE"], &rows))
    }
  }
}

pub fn project(format: Format, project: &Project) -> Result<String> {
  match format {
    Format::Json => to_json(project),
    Format::Csv => projects(format, std::slice::from_ref(project)),
    Format::Table => {
      let mut lines = vec![
        format!("{} (ID: {})", project.name, project.id),
        format!("Active: {}", yes_no(project.active)),
        format!("Billable: {}", yes_no(project.billable)),
      ];
      if let Some(client_id) = project.client_id {
        lines.push(format!("Client: {}", client_id));
      }
      if let Some(hours) = project.budget_hours {
        lines.push(format!("Budget: {}h", hours));
      }
      if !project.description.is_empty() {
        lines.push(String::new());
        lines.push(project.description.clone());
      }
      Ok(lines.join("\n"))
    }
  }
}

pub fn tasks(format: Format, tasks: &[Task]) -> Result<String> {
  match format {
    Format::Json => to_json(tasks),
    Format::Csv => {
      let rows: Vec<Vec<String>> = tasks
        .iter()
        .map(|t| {
          vec![
            t.id.to_string(),
            t.name.clone(),
            t.project_id.to_string(),
            t.complete.to_string(),
            t.billable.to_string(),
            t.due_date.clone().unwrap_or_default(),
          ]
        })
        .collect();
      Ok(render_csv(
        &["id", "name", "project_id", "complete", "billable", "due_date"],
        &rows,
      ))
    }
    Format::Table => {
      let rows: Vec<Vec<String>> = tasks
        .iter()
        .map(|t| {
          vec![
            t.id.to_string(),
            truncate(&t.name, MAX_NAME_WIDTH),
            t.project_id.to_string(),
            yes_no(t.complete),
          ]
        })
        .collect();
      Ok(render_table(&["ID", "NAME", "PROJECT", "DONE"], &rows))
    }
  }
}

pub fn task(format: Format, task: &Task) -> Result<String> {
  match format {
    Format::Json => to_json(task),
    Format::Csv => tasks(format, std::slice::from_ref(task)),
    Format::Table => {
      let mut lines = vec![
        format!("{} (ID: {})", task.name, task.id),
        format!("Project: {}", task.project_id),
        format!("Complete: {}", yes_no(task.complete)),
      ];
      if let Some(due) = &task.due_date {
        lines.push(format!("Due: {}", due));
      }
      if !task.description.is_empty() {
        lines.push(String::new());
        lines.push(task.description.clone());
      }
      Ok(lines.join("\n"))
    }
  }
}

pub fn entry(format: Format, entry: &TimeEntry) -> Result<String> {
  match format {
    Format::Json => to_json(entry),
    Format::Csv => entries(format, std::slice::from_ref(entry)),
    Format::Table => {
      let task = entry
        .task
        .as_ref()
        .map(|t| t.name.clone())
        .unwrap_or_else(|| format!("task {}", entry.task_id));
      let state = if entry.is_running() {
        let elapsed = entry
          .start_time
          .map(|start| (Utc::now() - start).num_seconds())
          .unwrap_or_default();
        format!("running for {}", format_duration(elapsed))
      } else {
        format!("stopped after {}", format_duration(entry.duration))
      };
      Ok(format!(
        "{} (entry {}), started {}, {}",
        task,
        entry.id,
        format_time(entry.start_time),
        state
      ))
    }
  }
}

pub fn entries(format: Format, entries: &[TimeEntry]) -> Result<String> {
  match format {
    Format::Json => to_json(entries),
    Format::Csv => {
      let rows: Vec<Vec<String>> = entries.iter().map(entry_csv_row).collect();
      Ok(render_csv(
        &[
          "id",
          "project_id",
          "project_name",
          "task_id",
          "task_name",
          "duration",
          "date",
          "description",
        ],
        &rows,
      ))
    }
    Format::Table => {
      let rows: Vec<Vec<String>> = entries
        .iter()
        .map(|e| {
          let task = e
            .task
            .as_ref()
            .map(|t| t.name.clone())
            .unwrap_or_else(|| e.task_id.to_string());
          vec![
            e.id.to_string(),
            format_time(e.start_time),
            if e.is_running() {
              "running".to_string()
            } else {
              format_time(e.end_time)
            },
            format_duration(e.duration),
            truncate(&task, MAX_NAME_WIDTH),
            truncate(&e.description, MAX_NAME_WIDTH),
          ]
        })
        .collect();
      let total: i64 = entries.iter().map(|e| e.duration).sum();
      Ok(format!(
        "{}\n\nTotal: {}",
        render_table(&["ID", "START", "END", "DURATION", "TASK", "DESCRIPTION"], &rows),
        format_duration(total)
      ))
    }
  }
}

fn entry_csv_row(e: &TimeEntry) -> Vec<String> {
  let project = e.project.as_deref();
  // Without an included project, the task still names it
  let project_id = project
    .map(|p| p.id)
    .or_else(|| e.task.as_ref().map(|t| t.project_id))
    .map(|id| id.to_string())
    .unwrap_or_default();

  vec![
    e.id.to_string(),
    project_id,
    project.map(|p| p.name.clone()).unwrap_or_default(),
    e.task_id.to_string(),
    e.task.as_ref().map(|t| t.name.clone()).unwrap_or_default(),
    e.duration.to_string(),
    e.start_time
      .map(|t| t.with_timezone(&Local).format("%Y-%m-%d").to_string())
      .unwrap_or_default(),
    e.description.clone(),
  ]
}

fn yes_no(value: bool) -> String {
  if value { "yes" } else { "no" }.to_string()
}
