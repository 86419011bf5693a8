//! Core data model.
//!
//! A todo is a unit of follow-up work synthesized in reaction to a hive
//! event. It records why it exists (`triggered_by` + `context`), how urgent
//! it is, and where it is in its lifecycle.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Structured payload captured from the triggering event.
pub type Context = serde_json::Map<String, serde_json::Value>;

// ---------------------------------------------------------------------------
// Todo
// ---------------------------------------------------------------------------

/// A work item tracked by the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Todo {
    /// Unique identifier, assigned at creation.
    pub id: TodoId,

    /// Human-readable description of the work.
    pub content: String,

    /// Set at creation. Never escalated by the engine.
    pub priority: Priority,

    /// Current lifecycle status.
    pub status: Status,

    /// Snake-case name of the event kind that caused this todo
    /// (e.g. "agent_registered", "critical_resolved").
    pub triggered_by: String,

    /// Data captured from the triggering event.
    pub context: Context,

    /// Todos that should conceptually finish first. Advisory only: the
    /// engine records these but never blocks on them.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dependencies: Vec<TodoId>,

    /// Role hint for downstream routing (e.g. "monitor", "analyst").
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assigned_agent: Option<String>,

    /// Advisory deadline; not enforced.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deadline: Option<DateTime<Utc>>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl Todo {
    /// Pending or in progress.
    pub fn is_active(&self) -> bool {
        self.status.is_active()
    }
}

/// Newtype for todo IDs.
///
/// Format: `todo_<unix millis>_<random suffix>`. Only uniqueness matters;
/// the time component is not an ordering guarantee.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TodoId(pub String);

impl TodoId {
    pub fn generate() -> Self {
        let millis = Utc::now().timestamp_millis();
        let suffix = Uuid::new_v4().simple().to_string();
        Self(format!("todo_{millis}_{}", &suffix[..12]))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for TodoId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TodoId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for TodoId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

// ---------------------------------------------------------------------------
// Priority
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Low,
    #[default]
    Medium,
    High,
    Critical,
}

impl Priority {
    pub fn as_str(self) -> &'static str {
        match self {
            Priority::Low => "low",
            Priority::Medium => "medium",
            Priority::High => "high",
            Priority::Critical => "critical",
        }
    }
}

impl std::fmt::Display for Priority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Priority {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "low" => Ok(Priority::Low),
            "medium" => Ok(Priority::Medium),
            "high" => Ok(Priority::High),
            "critical" => Ok(Priority::Critical),
            other => Err(format!("unknown priority: {other}")),
        }
    }
}

// ---------------------------------------------------------------------------
// Status
// ---------------------------------------------------------------------------

/// Lifecycle status of a todo.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    /// Created, nobody has picked it up.
    Pending,
    /// Being worked on.
    InProgress,
    /// Done. Terminal.
    Completed,
    /// Parked; can still be completed.
    Blocked,
}

impl Status {
    /// Can transition from self to `to`?
    pub fn can_transition_to(self, to: Status) -> bool {
        use Status::*;
        matches!(
            (self, to),
            (Pending, InProgress)
                | (Pending, Blocked)
                | (Pending, Completed)
                | (InProgress, Completed)
                | (Blocked, Completed)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Status::Completed)
    }

    /// Active todos show up in queries.
    pub fn is_active(self) -> bool {
        matches!(self, Status::Pending | Status::InProgress)
    }
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Status::Pending => "pending",
            Status::InProgress => "in_progress",
            Status::Completed => "completed",
            Status::Blocked => "blocked",
        };
        write!(f, "{s}")
    }
}

// ---------------------------------------------------------------------------
// Builder
// ---------------------------------------------------------------------------

/// Builder for new todos. Content and trigger are mandatory; everything
/// else defaults (medium priority, empty context, no dependencies).
#[derive(Debug, Clone)]
pub struct NewTodo {
    pub(crate) content: String,
    pub(crate) triggered_by: String,
    pub(crate) priority: Priority,
    pub(crate) context: Context,
    pub(crate) dependencies: Vec<TodoId>,
    pub(crate) assigned_agent: Option<String>,
    pub(crate) deadline: Option<DateTime<Utc>>,
}

impl NewTodo {
    pub fn new(content: impl Into<String>, triggered_by: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            triggered_by: triggered_by.into(),
            priority: Priority::default(),
            context: Context::new(),
            dependencies: Vec::new(),
            assigned_agent: None,
            deadline: None,
        }
    }

    pub fn priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    /// Attach context. Objects are taken as-is; any other JSON value is
    /// stored under a `value` key so the context stays an object.
    pub fn context(mut self, context: serde_json::Value) -> Self {
        self.context = match context {
            serde_json::Value::Object(map) => map,
            serde_json::Value::Null => Context::new(),
            other => {
                let mut map = Context::new();
                map.insert("value".to_string(), other);
                map
            }
        };
        self
    }

    pub fn depends_on(mut self, id: TodoId) -> Self {
        self.dependencies.push(id);
        self
    }

    pub fn assign(mut self, role: impl Into<String>) -> Self {
        self.assigned_agent = Some(role.into());
        self
    }

    pub fn deadline(mut self, deadline: DateTime<Utc>) -> Self {
        self.deadline = Some(deadline);
        self
    }
}
