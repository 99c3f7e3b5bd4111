use chrono::{DateTime, Utc};
use ffqueue_av::{EncodeParams, InputSpec, ProgressUpdate};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use uuid::Uuid;

/// Unique identifier for a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(Uuid);

impl TaskId {
    /// Generate a new random task ID.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for TaskId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<Uuid> for TaskId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl From<TaskId> for Uuid {
    fn from(id: TaskId) -> Self {
        id.0
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

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskKind {
    Convert,
    Merge,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Queued,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl TaskStatus {
    /// Whether the task will never change state again.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Queued => "queued",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

/// One submitted encode and its lifecycle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    pub kind: TaskKind,
    pub inputs: Vec<InputSpec>,
    pub output_path: PathBuf,
    pub params: EncodeParams,
    pub status: TaskStatus,
    /// Last observed fraction complete, when the run reports progress.
    pub progress: Option<f64>,
    pub error_message: Option<String>,
    /// Full encoder diagnostics of a failed run.
    pub stderr: Option<String>,
    /// Free-form details such as the command line and expected duration.
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl Task {
    pub fn new(
        kind: TaskKind,
        inputs: Vec<InputSpec>,
        output_path: PathBuf,
        params: EncodeParams,
    ) -> Self {
        Self {
            id: TaskId::new(),
            kind,
            inputs,
            output_path,
            params,
            status: TaskStatus::Queued,
            progress: None,
            error_message: None,
            stderr: None,
            metadata: HashMap::new(),
            created_at: Utc::now(),
            started_at: None,
            finished_at: None,
        }
    }

    pub fn start(&mut self) {
        self.status = TaskStatus::Running;
        self.started_at = Some(Utc::now());
    }

    pub fn update_progress(&mut self, progress: f64) {
        self.progress = Some(progress.clamp(0.0, 1.0));
    }

    pub fn complete(&mut self) {
        self.status = TaskStatus::Completed;
        self.progress = Some(1.0);
        self.finished_at = Some(Utc::now());
    }

    pub fn fail(&mut self, error: &str, stderr: Option<String>) {
        self.status = TaskStatus::Failed;
        self.error_message = Some(error.to_string());
        self.stderr = stderr;
        self.finished_at = Some(Utc::now());
    }

    pub fn cancel(&mut self) {
        self.status = TaskStatus::Cancelled;
        self.finished_at = Some(Utc::now());
    }
}

/// Notifications broadcast to [`TaskManager::subscribe`](super::TaskManager::subscribe) receivers.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event_type", rename_all = "snake_case")]
pub enum TaskEvent {
    /// A task entered a new state; carries the snapshot after the change.
    StatusChanged(Task),
    /// A running task reported progress.
    Progress { id: TaskId, update: ProgressUpdate },
}

impl TaskEvent {
    /// The task this event is about.
    pub fn task_id(&self) -> TaskId {
        match self {
            Self::StatusChanged(task) => task.id,
            Self::Progress { id, .. } => *id,
        }
    }
}
