use chrono::Local;
use clap::{Parser, Subcommand};
use color_eyre::{eyre::eyre, Result};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use paymo::cache::Store;
use paymo::commands;
use paymo::config::Config;
use paymo::output::{self, Format};
use paymo::paymo::types::{
  CreateProjectRequest, CreateTaskRequest, EntryListOptions, Project, ProjectListOptions, Task,
  TaskListOptions,
};
use paymo::paymo::{ApiError, CachedPaymoClient, PaymoApi, PaymoClient};

#[derive(Parser, Debug)]
#[command(name = "paymo")]
#[command(about = "Command-line client for Paymo time tracking")]
#[command(version)]
struct Cli {
  /// Path to config file (default: $XDG_CONFIG_HOME/paymo/config.yaml)
  #[arg(short, long, global = true)]
  config: Option<PathBuf>,

  /// Skip the local cache and always ask the server
  #[arg(long, global = true)]
  no_cache: bool,

  /// Output format
  #[arg(long, value_enum, default_value_t = Format::Table, global = true)]
  format: Format,

  /// Debug logging (overrides PAYMO_LOG)
  #[arg(short, long, global = true)]
  verbose: bool,

  /// Also write logs to this file
  #[arg(long, global = true)]
  log_file: Option<PathBuf>,

  #[command(subcommand)]
  command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
  /// Inspect or reset the local cache
  Cache {
    #[command(subcommand)]
    action: CacheAction,
  },
  /// Refresh cached data from the server (targets: all, me, clients, projects, tasks)
  Sync { targets: Vec<String> },
  /// Show the authenticated user
  Me,
  /// List clients
  Clients,
  Projects {
    #[command(subcommand)]
    action: ProjectAction,
  },
  Tasks {
    #[command(subcommand)]
    action: TaskAction,
  },
  /// Time tracking
  Time {
    #[command(subcommand)]
    action: TimeAction,
  },
}

#[derive(Subcommand, Debug)]
enum CacheAction {
  /// Remove every cached entry
  Clear,
  /// Show cache location and contents
  Status,
  /// Remove expired entries
  Prune,
}

#[derive(Subcommand, Debug)]
enum ProjectAction {
  List {
    /// Only active projects
    #[arg(long)]
    active: bool,
    /// Only projects of this client
    #[arg(long)]
    client: Option<u64>,
  },
  Show {
    /// Project ID or name
    project: String,
  },
  Create { name: String },
  Archive {
    /// Project ID or name
    project: String,
  },
  /// List the tasks of a project
  Tasks {
    /// Project ID or name
    project: String,
    /// Include completed tasks
    #[arg(long)]
    all: bool,
  },
}

#[derive(Subcommand, Debug)]
enum TaskAction {
  List {
    /// Project ID or name
    #[arg(short, long)]
    project: Option<String>,
    /// Include completed tasks
    #[arg(long)]
    completed: bool,
  },
  Show {
    /// Task ID or name
    task: String,
    /// Project ID or name, required to find a task by name
    #[arg(short, long)]
    project: Option<String>,
  },
  Complete {
    task: String,
    #[arg(short, long)]
    project: Option<String>,
  },
  Create {
    name: String,
    /// Project ID or name
    #[arg(short, long)]
    project: String,
    #[arg(short, long, default_value = "")]
    description: String,
    #[arg(long)]
    billable: bool,
    /// Due date (YYYY-MM-DD)
    #[arg(long)]
    due: Option<String>,
  },
}

#[derive(Subcommand, Debug)]
enum TimeAction {
  /// Show the running timer
  Status,
  Start {
    /// Task ID or name
    task: String,
    #[arg(short, long)]
    project: Option<String>,
    /// Entry description
    #[arg(short, long, default_value = "")]
    message: String,
  },
  Stop,
  /// List entries (default: today)
  Log {
    /// today, yesterday, this-week, last-week or YYYY-MM-DD
    #[arg(long, default_value = "today")]
    date: String,
    /// Project ID or name
    #[arg(short, long)]
    project: Option<String>,
  },
  Delete { id: u64 },
}

fn main() -> Result<()> {
  color_eyre::install()?;

  let cli = Cli::parse();

  if let Err(report) = run(cli) {
    // Server-classified failures get their own exit codes
    if let Some(api_error) = report.downcast_ref::<ApiError>() {
      eprintln!("Error: {}", api_error);
      std::process::exit(api_error.exit_code());
    }
    return Err(report);
  }

  Ok(())
}

fn run(cli: Cli) -> Result<()> {
  let config = Config::load(cli.config.as_deref())?;
  init_tracing(
    cli.verbose,
    cli.log_file.as_deref().or(config.log_file.as_deref()),
  )?;

  if let Commands::Cache { action } = &cli.command {
    return run_cache(&config, action, cli.format);
  }

  let http = PaymoClient::new(&config)?;

  if cli.no_cache || !config.cache.enabled {
    return dispatch(&http, None, cli.command, cli.format);
  }

  let store = Arc::new(Store::open_with_ttls(
    config.cache_path()?,
    config.ttl_table(),
  )?);
  let client = CachedPaymoClient::new(http, Arc::clone(&store));

  let result = dispatch(&client, Some(store.as_ref()), cli.command, cli.format);
  if let Err(e) = store.close() {
    warn!("Failed to flush cache: {}", e);
  }
  result
}

fn init_tracing(verbose: bool, log_file: Option<&Path>) -> Result<()> {
  let filter = if verbose {
    EnvFilter::new("paymo=debug")
  } else {
    EnvFilter::try_from_env("PAYMO_LOG").unwrap_or_else(|_| EnvFilter::new("paymo=warn"))
  };

  let file_layer = match log_file {
    Some(path) => {
      let file_name = path
        .file_name()
        .ok_or_else(|| eyre!("Invalid log file path: {}", path.display()))?;
      let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
      };
      let appender = tracing_appender::rolling::never(dir, file_name);
      Some(
        tracing_subscriber::fmt::layer()
          .with_ansi(false)
          .with_writer(appender),
      )
    }
    None => None,
  };

  tracing_subscriber::registry()
    .with(filter)
    .with(
      tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_writer(std::io::stderr),
    )
    .with(file_layer)
    .try_init()
    .map_err(|e| eyre!("Failed to initialize logging: {}", e))
}

// ============================================================================
// Cache maintenance
// ============================================================================

fn run_cache(config: &Config, action: &CacheAction, format: Format) -> Result<()> {
  let path = config.cache_path()?;

  match action {
    CacheAction::Clear => {
      if !path.exists() {
        println!("No cache to clear.");
        return Ok(());
      }
      Store::open(&path)?.clear()?;
      println!("Cache cleared.");
    }
    CacheAction::Status => {
      let store = Store::open_with_ttls(&path, config.ttl_table())?;
      let stats = store.stats()?;
      let total: usize = stats.values().sum();

      match format {
        Format::Json => println!(
          "{}",
          output::to_json(&serde_json::json!({
            "path": store.path(),
            "size_bytes": store.size_bytes(),
            "total_entries": total,
            "types": stats,
          }))?
        ),
        Format::Csv => {
          let rows: Vec<Vec<String>> = stats
            .iter()
            .map(|(name, count)| vec![name.clone(), count.to_string()])
            .collect();
          println!("{}", output::render_csv(&["type", "entries"], &rows));
        }
        Format::Table => {
          println!("Path: {}", store.path().display());
          println!("Size: {:.1} KB", store.size_bytes() as f64 / 1024.0);
          println!("Entries: {}", total);
          if !stats.is_empty() {
            let rows: Vec<Vec<String>> = stats
              .iter()
              .map(|(name, count)| vec![name.clone(), count.to_string()])
              .collect();
            println!();
            println!("{}", output::render_table(&["TYPE", "ENTRIES"], &rows));
          }
        }
      }
    }
    CacheAction::Prune => {
      let store = Store::open_with_ttls(&path, config.ttl_table())?;
      let removed = store.prune()?;
      println!("Removed {} expired entries.", removed);
    }
  }

  Ok(())
}

// ============================================================================
// API commands
// ============================================================================

fn dispatch(api: &dyn PaymoApi, store: Option<&Store>, command: Commands, format: Format) -> Result<()> {
  match command {
    Commands::Cache { .. } => Err(eyre!("Cache commands do not use the API client")),
    Commands::Sync { targets } => sync(api, store, &targets),
    Commands::Me => {
      println!("{}", output::user(format, &api.get_me()?)?);
      Ok(())
    }
    Commands::Clients => {
      println!("{}", output::clients(format, &api.get_clients()?)?);
      Ok(())
    }
    Commands::Projects { action } => run_projects(api, action, format),
    Commands::Tasks { action } => run_tasks(api, action, format),
    Commands::Time { action } => run_time(api, action, format),
  }
}

fn sync(api: &dyn PaymoApi, store: Option<&Store>, targets: &[String]) -> Result<()> {
  for target in commands::parse_targets(targets)? {
    if let Some(store) = store {
      store.invalidate_type(target.invalidates)?;
    }

    info!(target = target.name, "Syncing");
    let count = match target.name {
      "me" => api.get_me().map(|_| 1)?,
      "clients" => api.get_clients()?.len(),
      "projects" => api.get_projects(None)?.len(),
      "tasks" => api.get_tasks(None)?.len(),
      other => return Err(eyre!("No sync handler for '{}'", other)),
    };
    println!("Synced {}: {} item(s)", target.name, count);
  }
  Ok(())
}

fn run_projects(api: &dyn PaymoApi, action: ProjectAction, format: Format) -> Result<()> {
  match action {
    ProjectAction::List { active, client } => {
      let opts = ProjectListOptions {
        active_only: active,
        client_id: client,
        ..Default::default()
      };
      println!("{}", output::projects(format, &api.get_projects(Some(&opts))?)?);
    }
    ProjectAction::Show { project } => {
      println!("{}", output::project(format, &resolve_project(api, &project)?)?);
    }
    ProjectAction::Create { name } => {
      let created = api.create_project(&CreateProjectRequest {
        name,
        ..Default::default()
      })?;
      println!("{}", output::project(format, &created)?);
    }
    ProjectAction::Archive { project } => {
      let project = resolve_project(api, &project)?;
      api.archive_project(project.id)?;
      println!("Archived project {} ({}).", project.name, project.id);
    }
    ProjectAction::Tasks { project, all } => {
      let project = resolve_project(api, &project)?;
      let opts = TaskListOptions {
        project_id: Some(project.id),
        include_completed: all,
        ..Default::default()
      };
      println!("{}", output::tasks(format, &api.get_tasks(Some(&opts))?)?);
    }
  }
  Ok(())
}

fn run_tasks(api: &dyn PaymoApi, action: TaskAction, format: Format) -> Result<()> {
  match action {
    TaskAction::List { project, completed } => {
      let project_id = project
        .as_deref()
        .map(|p| resolve_project(api, p))
        .transpose()?
        .map(|p| p.id);
      let opts = TaskListOptions {
        project_id,
        include_completed: completed,
        ..Default::default()
      };
      println!("{}", output::tasks(format, &api.get_tasks(Some(&opts))?)?);
    }
    TaskAction::Show { task, project } => {
      let task = resolve_task(api, &task, project.as_deref())?;
      println!("{}", output::task(format, &task)?);
    }
    TaskAction::Complete { task, project } => {
      let task = resolve_task(api, &task, project.as_deref())?;
      api.complete_task(task.id)?;
      println!("Completed task {} ({}).", task.name, task.id);
    }
    TaskAction::Create {
      name,
      project,
      description,
      billable,
      due,
    } => {
      let project = resolve_project(api, &project)?;
      let created = api.create_task(&CreateTaskRequest {
        name,
        project_id: project.id,
        description,
        billable,
        due_date: due,
        ..Default::default()
      })?;
      println!("{}", output::task(format, &created)?);
    }
  }
  Ok(())
}

fn run_time(api: &dyn PaymoApi, action: TimeAction, format: Format) -> Result<()> {
  match action {
    TimeAction::Status => {
      let me = api.get_me()?;
      match api.get_active_entry(me.id)? {
        Some(entry) => println!("{}", output::entry(format, &entry)?),
        None if format == Format::Json => println!("null"),
        None if format == Format::Csv => {}
        None => println!("No timer running."),
      }
    }
    TimeAction::Start {
      task,
      project,
      message,
    } => {
      let me = api.get_me()?;
      if let Some(running) = api.get_active_entry(me.id)? {
        return Err(eyre!(
          "A timer is already running (entry {}). Stop it first.",
          running.id
        ));
      }
      let task = resolve_task(api, &task, project.as_deref())?;
      let entry = api.start_entry(task.id, &message)?;
      println!("{}", output::entry(format, &entry)?);
    }
    TimeAction::Stop => {
      let me = api.get_me()?;
      let running = api
        .get_active_entry(me.id)?
        .ok_or_else(|| eyre!("No timer running."))?;
      let entry = api.stop_entry(running.id)?;
      println!("{}", output::entry(format, &entry)?);
    }
    TimeAction::Log { date, project } => {
      let range = commands::parse_day_range(&date, Local::now().date_naive())?;
      let project_id = project
        .as_deref()
        .map(|p| resolve_project(api, p))
        .transpose()?
        .map(|p| p.id);
      let me = api.get_me()?;

      let entries = api.get_entries(Some(&EntryListOptions {
        user_id: Some(me.id),
        project_id,
        start_date: Some(range.start),
        end_date: Some(range.end),
        include_task: true,
        include_project: true,
        ..Default::default()
      }))?;
      println!("{}", output::entries(format, &entries)?);
    }
    TimeAction::Delete { id } => {
      api.delete_entry(id)?;
      println!("Deleted entry {}.", id);
    }
  }
  Ok(())
}

// ============================================================================
// ID-or-name resolution
// ============================================================================

fn resolve_project(api: &dyn PaymoApi, arg: &str) -> Result<Project> {
  match arg.parse::<u64>() {
    Ok(id) => Ok(api.get_project(id)?),
    Err(_) => Ok(api.get_project_by_name(arg)?),
  }
}

fn resolve_task(api: &dyn PaymoApi, arg: &str, project: Option<&str>) -> Result<Task> {
  if let Ok(id) = arg.parse::<u64>() {
    return Ok(api.get_task(id)?);
  }

  let project = project
    .ok_or_else(|| eyre!("--project is required to find a task by name"))?;
  let project = resolve_project(api, project)?;
  Ok(api.get_task_by_name(project.id, arg)?)
}
