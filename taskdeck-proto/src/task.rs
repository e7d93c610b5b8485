//! Task model for `taskdeck`.
//!
//! Defines the [`Task`] record, its identifiers and timestamps, the
//! [`Filter`] predicate used by list views and store queries, and the
//! intake validation applied to task text before it reaches any store.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Maximum allowed task text length in characters, measured after trimming.
pub const MAX_TASK_TEXT_LENGTH: usize = 100;

/// Unique identifier for a task, based on UUID v7 for time-ordering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TaskId(Uuid);

impl TaskId {
    /// Creates a new time-ordered task identifier (UUID v7).
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    /// Creates a `TaskId` from an existing UUID.
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Returns the inner UUID value.
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for TaskId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for TaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for TaskId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

/// The authenticated principal that owns a set of tasks.
///
/// Opaque to this crate: whatever the access gate resolves a credential to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Identity(String);

impl Identity {
    /// Creates an identity from its string form.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the string form of this identity.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Identity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Milliseconds since the UNIX epoch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Timestamp(u64);

impl Timestamp {
    /// Creates a timestamp for the current instant.
    #[must_use]
    pub fn now() -> Self {
        let millis = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis();
        Self(u64::try_from(millis).unwrap_or(u64::MAX))
    }

    /// Creates a timestamp from milliseconds since the UNIX epoch.
    #[must_use]
    pub const fn from_millis(millis: u64) -> Self {
        Self(millis)
    }

    /// Returns the timestamp as milliseconds since the UNIX epoch.
    #[must_use]
    pub const fn as_millis(&self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for Timestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}ms", self.0)
    }
}

/// A single to-do item owned by one identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    /// Unique task identifier, immutable after creation.
    pub id: TaskId,
    /// Trimmed task text, 1 to [`MAX_TASK_TEXT_LENGTH`] characters.
    pub text: String,
    /// Whether the task has been completed.
    pub completed: bool,
    /// Identity that created the task. `None` only for ownerless local data.
    pub owner_id: Option<Identity>,
    /// When the task was created. Never changes.
    pub created_at: Timestamp,
    /// When the task was last mutated. Never earlier than `created_at`.
    pub updated_at: Timestamp,
}

impl Task {
    /// Creates an open task stamped with `at` for both timestamps.
    #[must_use]
    pub fn new(id: TaskId, text: String, owner_id: Option<Identity>, at: Timestamp) -> Self {
        Self {
            id,
            text,
            completed: false,
            owner_id,
            created_at: at,
            updated_at: at,
        }
    }

    /// Refreshes `updated_at`, clamped so it never precedes `created_at`.
    pub fn touch(&mut self, at: Timestamp) {
        self.updated_at = at.max(self.created_at);
    }

    /// Returns `true` if `identity` owns this task.
    #[must_use]
    pub fn is_owned_by(&self, identity: &Identity) -> bool {
        self.owner_id.as_ref() == Some(identity)
    }
}

/// View predicate over tasks.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Filter {
    /// Every task.
    #[default]
    All,
    /// Tasks with `completed == false`.
    Active,
    /// Tasks with `completed == true`.
    Completed,
}

impl Filter {
    /// Returns `true` if `task` is visible under this filter.
    #[must_use]
    pub const fn matches(self, task: &Task) -> bool {
        match self {
            Self::All => true,
            Self::Active => !task.completed,
            Self::Completed => task.completed,
        }
    }
}

impl std::fmt::Display for Filter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::All => write!(f, "all"),
            Self::Active => write!(f, "active"),
            Self::Completed => write!(f, "completed"),
        }
    }
}

/// Error returned when parsing an unknown filter name.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown filter '{0}' (expected all, active, or completed)")]
pub struct FilterParseError(String);

impl std::str::FromStr for Filter {
    type Err = FilterParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "all" => Ok(Self::All),
            "active" => Ok(Self::Active),
            "completed" => Ok(Self::Completed),
            _ => Err(FilterParseError(s.to_string())),
        }
    }
}

/// A partial update to a task. `None` fields are left unchanged.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskPatch {
    /// Replacement text, validated like new task text.
    pub text: Option<String>,
    /// Replacement completion flag.
    pub completed: Option<bool>,
}

impl TaskPatch {
    /// A patch that only replaces the text.
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            completed: None,
        }
    }

    /// A patch that only sets the completion flag.
    #[must_use]
    pub const fn completed(completed: bool) -> Self {
        Self {
            text: None,
            completed: Some(completed),
        }
    }

    /// Returns `true` if the patch changes nothing.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.text.is_none() && self.completed.is_none()
    }
}

/// Reasons task text is refused at intake.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
pub enum TextError {
    /// Text is empty after trimming.
    #[error("task text cannot be empty")]
    Empty,
    /// Text exceeds [`MAX_TASK_TEXT_LENGTH`] characters after trimming.
    #[error("task text too long ({len} characters, max {max})")]
    TooLong {
        /// Character count after trimming.
        len: usize,
        /// The enforced maximum.
        max: usize,
    },
}

/// Trims `raw` and checks it against the task text bounds.
///
/// Length is counted in characters, not bytes.
///
/// # Errors
///
/// Returns [`TextError::Empty`] for blank input and [`TextError::TooLong`]
/// when the trimmed text exceeds [`MAX_TASK_TEXT_LENGTH`] characters.
pub fn validate_text(raw: &str) -> Result<String, TextError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(TextError::Empty);
    }
    let len = trimmed.chars().count();
    if len > MAX_TASK_TEXT_LENGTH {
        return Err(TextError::TooLong {
            len,
            max: MAX_TASK_TEXT_LENGTH,
        });
    }
    Ok(trimmed.to_string())
}
