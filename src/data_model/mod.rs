
use std::fmt::{self, Display};

use derive_builder::Builder;
use serde::{Deserialize, Serialize};

/// Per-task lifecycle state. Every status is either active or terminal;
/// `Running` is the one active status that counts as "up", and `Killing`
/// is active but draining.
#[derive(
    Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, strum::AsRefStr, strum::Display,
)]
pub enum ScheduleStatus {
    /// Waiting for resources to be offered.
    Pending,
    /// Matched to a host, descriptor handed to the agent.
    Assigned,
    /// The agent is preparing the sandbox and launching the process.
    Starting,
    /// The process is up.
    Running,
    /// A kill was issued and the task is draining.
    Killing,
    /// The scheduler is restarting the task in place.
    Restarting,
    /// Exited with a zero status.
    Finished,
    /// Exited non-zero or was rejected by the agent.
    Failed,
    /// Killed on request.
    Killed,
    /// The agent stopped reporting the task.
    Lost,
}

impl ScheduleStatus {
    /// A status from which further transitions exist.
    pub fn is_active(self) -> bool {
        matches!(
            self,
            ScheduleStatus::Pending |
                ScheduleStatus::Assigned |
                ScheduleStatus::Starting |
                ScheduleStatus::Running |
                ScheduleStatus::Killing |
                ScheduleStatus::Restarting
        )
    }

    /// A status from which no transition exists.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            ScheduleStatus::Finished |
                ScheduleStatus::Failed |
                ScheduleStatus::Killed |
                ScheduleStatus::Lost
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(transparent)]
pub struct TaskId(String);

impl TaskId {
    pub fn new(id: String) -> Self {
        Self(id)
    }

    pub fn get(&self) -> &str {
        &self.0
    }
}

impl Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for TaskId {
    fn from(value: &str) -> Self {
        Self::new(value.to_string())
    }
}

/// Who a task runs as. The zero value is the empty identity used when
/// normalizing configurations for comparison.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct Identity {
    pub role: String,
    pub user: String,
}

impl Identity {
    pub fn new(role: &str, user: &str) -> Self {
        Self {
            role: role.to_string(),
            user: user.to_string(),
        }
    }
}

/// Resource vector requested by a task.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct TaskResources {
    pub cpu_millis: u64,
    pub memory_mb: u64,
    pub disk_mb: u64,
}

/// A task configuration as submitted with a job. The update engine treats
/// it as opaque except for [`TaskConfig::eq_ignoring_owner`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash, Builder)]
pub struct TaskConfig {
    pub job_name: String,
    #[builder(setter(into), default = "\"prod\".to_string()")]
    pub environment: String,
    #[builder(default)]
    pub owner: Identity,
    #[builder(default)]
    pub is_service: bool,
    #[builder(default)]
    pub priority: u32,
    #[builder(default)]
    pub production: bool,
    #[builder(default)]
    pub max_task_failures: u32,
    #[builder(default)]
    pub resources: TaskResources,
}

impl TaskConfig {
    /// Structural equality with both owners normalized to the empty
    /// identity. The scheduler may stamp a different owner between
    /// submission and execution, so a configuration differing only there
    /// still counts as satisfied. Inputs are never mutated.
    pub fn eq_ignoring_owner(&self, other: &TaskConfig) -> bool {
        let mut first = self.clone();
        first.owner = Identity::default();
        let mut second = other.clone();
        second.owner = Identity::default();
        first == second
    }
}

/// One entry of a task's status history. Histories are non-empty and
/// time-ordered; index 0 is the oldest event and the latest event's
/// status equals the task's current status.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TaskEvent {
    pub timestamp_ms: i64,
    pub status: ScheduleStatus,
    /// Operator-facing annotation recorded with the transition.
    #[serde(default)]
    pub message: Option<String>,
}

impl TaskEvent {
    pub fn new(timestamp_ms: i64, status: ScheduleStatus) -> Self {
        Self {
            timestamp_ms,
            status,
            message: None,
        }
    }
}

/// The assignment of a task configuration to a concrete instance slot.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AssignedTask {
    pub task_id: TaskId,
    pub instance_id: u32,
    pub task_config: TaskConfig,
}

/// Runtime projection of a task as the storage layer reports it: current
/// status, the status history, and the assigned configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Builder)]
pub struct ScheduledTask {
    pub status: ScheduleStatus,
    pub task_events: Vec<TaskEvent>,
    pub assigned_task: AssignedTask,
}

impl ScheduledTask {
    /// The newest event of the task's history, if any was recorded.
    pub fn latest_event(&self) -> Option<&TaskEvent> {
        self.task_events.last()
    }
}
