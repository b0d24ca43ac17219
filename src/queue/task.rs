//! Task records and the status/stat payloads reported to callers.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Current Unix time in seconds, with millisecond precision.
pub fn unix_now() -> f64 {
    chrono::Utc::now().timestamp_millis() as f64 / 1000.0
}

/// Positional arguments of a task.
pub type TaskArgs = Vec<Value>;

/// Keyword arguments of a task.
pub type TaskKwargs = Map<String, Value>;

// == Task ==
/// One unit of queued work, serialized onto the main list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    pub function_name: String,
    #[serde(default)]
    pub args: TaskArgs,
    #[serde(default)]
    pub kwargs: TaskKwargs,
    pub created_at: f64,
}

impl Task {
    pub fn new(
        id: impl Into<String>,
        function_name: impl Into<String>,
        args: TaskArgs,
        kwargs: TaskKwargs,
    ) -> Self {
        Self {
            id: id.into(),
            function_name: function_name.into(),
            args,
            kwargs,
            created_at: unix_now(),
        }
    }

    /// Keyword argument `name` as a string, if present and a string.
    pub fn kwarg_str(&self, name: &str) -> Option<&str> {
        self.kwargs.get(name).and_then(Value::as_str)
    }
}

/// Only the id, for scanning lists without decoding whole records.
#[derive(Deserialize)]
pub(crate) struct TaskId {
    pub id: String,
}

// == Task Status ==
/// Where a task is, as reported by `get_task_status`.
///
/// `Complete` and `Failed` are the terminal results stored under the result
/// key; the other variants are derived from list membership.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum TaskStatus {
    Complete { completed_at: f64 },
    Failed { error: String, failed_at: f64 },
    Processing,
    Queued { tasks_ahead: usize },
    NotFound,
}

impl TaskStatus {
    pub fn complete() -> Self {
        TaskStatus::Complete {
            completed_at: unix_now(),
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        TaskStatus::Failed {
            error: error.into(),
            failed_at: unix_now(),
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskStatus::Complete { .. } | TaskStatus::Failed { .. })
    }
}

// == Queue Stats ==
/// Live list lengths of one queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueStats {
    pub queue_name: String,
    pub queue_size: usize,
    pub processing_count: usize,
    pub max_concurrent: usize,
    /// Negative when other processes hold more tasks in flight than this
    /// instance's limit.
    pub available_slots: i64,
}
