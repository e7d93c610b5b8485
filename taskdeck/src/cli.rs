//! Command-line front end: subcommands, id prefix lookup, and rendering.
//!
//! Each invocation loads the list through a [`TaskSession`], applies one
//! command, and prints the resulting view.

use std::fmt::Write as _;

use taskdeck_proto::store::TaskStore;
use taskdeck_proto::table::SnapshotError;
use taskdeck_proto::task::{Filter, Task, TaskId, Timestamp};

use crate::config::ConfigError;
use crate::gate::AccessGate;
use crate::store::ConnectError;
use crate::tasks::{SessionError, TaskSession, TaskStats, TaskView};

/// Shortest id prefix shown in listings.
const MIN_ID_PREFIX: usize = 8;

/// Errors surfaced to the user by the `taskdeck` binary.
#[derive(Debug, thiserror::Error)]
pub enum CliError {
    /// Configuration could not be loaded or is inconsistent.
    #[error(transparent)]
    Config(#[from] ConfigError),
    /// The server could not be reached or refused the token.
    #[error(transparent)]
    Connect(#[from] ConnectError),
    /// The local data file could not be opened.
    #[error(transparent)]
    Snapshot(#[from] SnapshotError),
    /// A task operation failed.
    #[error(transparent)]
    Session(#[from] SessionError),
    /// No task id starts with the given prefix.
    #[error("no task matches '{0}'")]
    NoMatch(String),
    /// More than one task id starts with the given prefix.
    #[error("'{prefix}' matches {count} tasks, use a longer prefix")]
    Ambiguous {
        /// The prefix as typed.
        prefix: String,
        /// How many tasks matched.
        count: usize,
    },
    /// JSON output could not be produced.
    #[error("failed to encode JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// `taskdeck` subcommands.
#[derive(clap::Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Show tasks.
    List {
        /// Which tasks to show (all, active, completed).
        #[arg(short, long, default_value_t = Filter::All)]
        filter: Filter,
        /// Print the view as JSON.
        #[arg(long)]
        json: bool,
    },
    /// Add a task.
    Add {
        /// Task text. Multiple words are joined with spaces.
        #[arg(required = true, num_args = 1..)]
        text: Vec<String>,
    },
    /// Flip a task between open and completed.
    Toggle {
        /// Task id or unique prefix.
        id: String,
    },
    /// Replace a task's text.
    Edit {
        /// Task id or unique prefix.
        id: String,
        /// New text. Multiple words are joined with spaces.
        #[arg(required = true, num_args = 1..)]
        text: Vec<String>,
    },
    /// Delete a task.
    #[command(alias = "delete")]
    Rm {
        /// Task id or unique prefix.
        id: String,
    },
    /// Delete every completed task.
    ClearCompleted,
    /// Complete every task, or reopen all if all are completed.
    ToggleAll,
    /// Show counts only.
    Stats,
}

impl Default for Command {
    fn default() -> Self {
        Self::List {
            filter: Filter::All,
            json: false,
        }
    }
}

/// Loads the list, applies `command`, and returns what to print.
///
/// # Errors
///
/// Returns [`CliError`] if loading or the command fails, or an id prefix
/// does not name exactly one task.
pub async fn execute<S: TaskStore, G: AccessGate>(
    session: &TaskSession<S, G>,
    command: &Command,
    timestamp_format: &str,
) -> Result<String, CliError> {
    session.load().await?;

    match command {
        Command::List { filter, json } => {
            session.set_filter(*filter);
            if *json {
                return Ok(serde_json::to_string_pretty(&session.view())?);
            }
        }
        Command::Add { text } => {
            let task = session.add_task(&text.join(" ")).await?;
            tracing::info!(task_id = %task.id, "added task");
        }
        Command::Toggle { id } => {
            let id = resolve_task_id(&session.state().tasks, id)?;
            session.toggle_task(id).await?;
        }
        Command::Edit { id, text } => {
            let id = resolve_task_id(&session.state().tasks, id)?;
            session.edit_task(id, &text.join(" ")).await?;
        }
        Command::Rm { id } => {
            let id = resolve_task_id(&session.state().tasks, id)?;
            session.delete_task(id).await?;
        }
        Command::ClearCompleted => session.clear_completed().await?,
        Command::ToggleAll => session.toggle_all().await?,
        Command::Stats => {
            let view = session.view();
            return Ok(render_stats(&view.stats, view.percent_complete));
        }
    }

    Ok(render_view(&session.view(), timestamp_format))
}

/// Finds the one task whose id starts with `prefix` (case-insensitive).
///
/// # Errors
///
/// Returns [`CliError::NoMatch`] for no match or an empty prefix, and
/// [`CliError::Ambiguous`] when several ids share the prefix.
pub fn resolve_task_id(tasks: &[Task], prefix: &str) -> Result<TaskId, CliError> {
    let needle = prefix.trim().to_ascii_lowercase();
    if needle.is_empty() {
        return Err(CliError::NoMatch(prefix.to_string()));
    }

    let matches: Vec<TaskId> = tasks
        .iter()
        .map(|t| t.id)
        .filter(|id| id.to_string().starts_with(&needle))
        .collect();

    match matches.as_slice() {
        [id] => Ok(*id),
        [] => Err(CliError::NoMatch(prefix.to_string())),
        _ => Err(CliError::Ambiguous {
            prefix: prefix.to_string(),
            count: matches.len(),
        }),
    }
}

/// Length of the shortest id prefix, at least [`MIN_ID_PREFIX`], that tells
/// every task in `tasks` apart.
#[must_use]
pub fn unique_prefix_len(tasks: &[Task]) -> usize {
    let ids: Vec<String> = tasks.iter().map(|t| t.id.to_string()).collect();
    let full = ids.first().map_or(MIN_ID_PREFIX, String::len);
    (MIN_ID_PREFIX..full)
        .find(|&len| {
            let mut prefixes: Vec<&str> = ids.iter().map(|id| &id[..len]).collect();
            prefixes.sort_unstable();
            prefixes.windows(2).all(|w| w[0] != w[1])
        })
        .unwrap_or(full)
}

/// Renders the visible tasks followed by a summary line.
#[must_use]
pub fn render_view(view: &TaskView, timestamp_format: &str) -> String {
    let mut out = String::new();
    if view.tasks.is_empty() {
        let _ = writeln!(out, "{}", empty_message(view.filter));
    }
    let prefix_len = unique_prefix_len(&view.tasks);
    for task in &view.tasks {
        let mark = if task.completed { 'x' } else { ' ' };
        let id = task.id.to_string();
        let _ = writeln!(
            out,
            "[{mark}] {}  {}  ({})",
            &id[..prefix_len.min(id.len())],
            task.text,
            format_timestamp(task.created_at, timestamp_format)
        );
    }
    out.push_str(&render_stats(&view.stats, view.percent_complete));
    out
}

/// One-line summary of the whole list.
#[must_use]
pub fn render_stats(stats: &TaskStats, percent_complete: f64) -> String {
    format!(
        "{} total, {} active, {} completed ({percent_complete:.0}% complete)",
        stats.total, stats.active, stats.completed
    )
}

/// Formats a timestamp in local time, falling back to raw milliseconds if
/// the format string is invalid.
#[must_use]
pub fn format_timestamp(at: Timestamp, format: &str) -> String {
    let millis = i64::try_from(at.as_millis()).unwrap_or(i64::MAX);
    let Some(utc) = chrono::DateTime::from_timestamp_millis(millis) else {
        return at.to_string();
    };
    let local = utc.with_timezone(&chrono::Local);
    let mut out = String::new();
    if write!(out, "{}", local.format(format)).is_err() {
        return at.to_string();
    }
    out
}

const fn empty_message(filter: Filter) -> &'static str {
    match filter {
        Filter::All => "No tasks.",
        Filter::Active => "No active tasks.",
        Filter::Completed => "No completed tasks.",
    }
}
