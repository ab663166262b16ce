use std::{sync::Arc, time::Duration};

use anyhow::{bail, ensure, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::{
    config::UpdaterConfig,
    data_model::{ScheduleStatus, ScheduledTask, TaskConfig, TaskEvent},
    utils::Clock,
};

/// Verdict of one evaluation round. `Succeeded` and the `Failed*`
/// variants are terminal; every other variant tells the orchestrator what
/// to do before observing the instance again.
#[derive(
    Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, strum::AsRefStr, strum::Display,
)]
pub enum UpdateResult {
    /// The instance is in the desired stable state.
    Succeeded,
    /// The instance failed too many times after entering a terminal state.
    FailedTerminated,
    /// The instance spent too long out of `Running` without terminating.
    FailedStuck,
    /// Kill the current task, then evaluate on the next state change.
    KillTaskAndEvaluateOnStateChange,
    /// Launch a task with the desired configuration, then evaluate on the
    /// next state change.
    ReplaceTaskAndEvaluateOnStateChange,
    /// Nothing to do now; evaluate on the next state change.
    EvaluateOnStateChange,
    /// Nothing to do now; evaluate once the minimum running time has
    /// elapsed, or sooner on a state change.
    EvaluateAfterMinRunningMs,
}

impl UpdateResult {
    /// Terminal results retire the engine; the orchestrator stops
    /// scheduling evaluations for the instance.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            UpdateResult::Succeeded | UpdateResult::FailedTerminated | UpdateResult::FailedStuck
        )
    }
}

/// Manages the update of one logical instance from a possibly-absent old
/// task configuration to a possibly-absent desired one, and detects
/// whether a replaced instance fails to become stable.
///
/// One engine is built per instance. `evaluate` is synchronous and
/// non-blocking; the caller executes the returned action and calls again
/// when the instance's state changes. The failure counter is the only
/// state carried between calls, so a terminal result is reproduced on
/// re-evaluation of the same observation.
pub struct InstanceUpdater {
    desired_state: Option<TaskConfig>,
    tolerated_failures: u32,
    min_running_time: Duration,
    max_non_running_time: Duration,
    clock: Arc<dyn Clock>,
    observed_failures: u32,
}

impl InstanceUpdater {
    pub fn new(
        desired_state: Option<TaskConfig>,
        tolerated_failures: u32,
        min_running_time: Duration,
        max_non_running_time: Duration,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            desired_state,
            tolerated_failures,
            min_running_time,
            max_non_running_time,
            clock,
            observed_failures: 0,
        }
    }

    /// Build an engine for one instance from the job-wide updater tuning.
    pub fn from_config(
        desired_state: Option<TaskConfig>,
        config: &UpdaterConfig,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self::new(
            desired_state,
            config.tolerated_failures,
            config.min_running_time(),
            config.max_non_running_time(),
            clock,
        )
    }

    /// Instance failures observed so far. Never decreases.
    pub fn observed_failures(&self) -> u32 {
        self.observed_failures
    }

    /// Decide the next action for the instance given the latest observed
    /// scheduled task, or `None` when no task occupies the slot. A task
    /// that has moved past `Killing` is treated as absent; its slot is
    /// free to be refilled.
    pub fn evaluate(&mut self, observation: Option<&ScheduledTask>) -> Result<UpdateResult> {
        let actual = observation.filter(|task| !is_permanently_killed(task));
        let result = match (self.desired_state.is_some(), actual) {
            // The update is changing the task configuration.
            (true, Some(task)) => self.handle_actual_and_desired_present(task)?,
            // The update is introducing a new instance.
            (true, None) => UpdateResult::ReplaceTaskAndEvaluateOnStateChange,
            // The update is removing an instance.
            (false, Some(task)) => {
                if is_killable(task.status) {
                    UpdateResult::KillTaskAndEvaluateOnStateChange
                } else {
                    UpdateResult::EvaluateOnStateChange
                }
            }
            // No-op update.
            (false, None) => UpdateResult::Succeeded,
        };
        debug!(
            result = %result,
            observed_failures = self.observed_failures,
            "evaluated instance"
        );
        Ok(result)
    }

    fn handle_actual_and_desired_present(&mut self, task: &ScheduledTask) -> Result<UpdateResult> {
        ensure!(
            !task.task_events.is_empty(),
            "task {} has an empty event history",
            task.assigned_task.task_id
        );
        let Some(desired) = self.desired_state.as_ref() else {
            bail!("no desired configuration while handling a present task");
        };

        let status = task.status;
        if desired.eq_ignoring_owner(&task.assigned_task.task_config) {
            // The desired task is in the system.
            if status == ScheduleStatus::Running {
                if self.appears_stable(task) {
                    // Stably running, our work here is done.
                    Ok(UpdateResult::Succeeded)
                } else {
                    // Not running long enough to consider stable.
                    Ok(UpdateResult::EvaluateAfterMinRunningMs)
                }
            } else if status.is_terminal() {
                // The desired task has terminated, this is a failure.
                info!(status = %status, "task is in terminal state");
                if self.add_failure_and_check_if_failed() {
                    Ok(UpdateResult::FailedTerminated)
                } else {
                    Ok(UpdateResult::EvaluateOnStateChange)
                }
            } else if self.appears_stuck(task) {
                // Not running, not terminated, and in that state long
                // enough that we should intervene.
                info!(status = %status, "task appears stuck");
                if self.add_failure_and_check_if_failed() {
                    Ok(UpdateResult::FailedStuck)
                } else if is_killable(status) {
                    Ok(UpdateResult::KillTaskAndEvaluateOnStateChange)
                } else {
                    // A kill is already draining the task.
                    Ok(UpdateResult::EvaluateOnStateChange)
                }
            } else {
                // Transient on the way into or out of Running.
                Ok(UpdateResult::EvaluateAfterMinRunningMs)
            }
        } else if is_killable(status) {
            // Not the configuration we want to be running; task is active.
            Ok(UpdateResult::KillTaskAndEvaluateOnStateChange)
        } else if status.is_terminal() && is_permanently_killed(task) {
            // The old task has exited, it is now safe to add the new one.
            Ok(UpdateResult::ReplaceTaskAndEvaluateOnStateChange)
        } else {
            Ok(UpdateResult::EvaluateOnStateChange)
        }
    }

    fn millis_since(&self, event: &TaskEvent) -> i64 {
        self.clock.now_ms() - event.timestamp_ms
    }

    /// The task's current state has persisted at least the minimum
    /// running time. Ages are signed, so a clock behind the event stream
    /// never counts as stable.
    fn appears_stable(&self, task: &ScheduledTask) -> bool {
        task.latest_event().is_some_and(|event| {
            self.millis_since(event) >= self.min_running_time.as_millis() as i64
        })
    }

    /// The task's trailing non-`Running` streak is at least the maximum
    /// non-running time long. A task that never reached `Running` is
    /// measured from its first event.
    fn appears_stuck(&self, task: &ScheduledTask) -> bool {
        let Some(mut earliest_non_running) = task.task_events.first() else {
            return false;
        };
        // Walk the history backwards, stopping at the newest Running event.
        for event in task.task_events.iter().rev() {
            if event.status == ScheduleStatus::Running {
                break;
            }
            earliest_non_running = event;
        }
        self.millis_since(earliest_non_running) >= self.max_non_running_time.as_millis() as i64
    }

    fn add_failure_and_check_if_failed(&mut self) -> bool {
        self.observed_failures += 1;
        info!(
            observed_failures = self.observed_failures,
            tolerated_failures = self.tolerated_failures,
            "observed updated task failure"
        );
        self.observed_failures > self.tolerated_failures
    }
}

/// The task was asked to die and has moved past the draining state.
fn is_permanently_killed(task: &ScheduledTask) -> bool {
    let was_killing = task
        .task_events
        .iter()
        .any(|event| event.status == ScheduleStatus::Killing);
    task.status != ScheduleStatus::Killing && was_killing
}

/// Active and not already draining; a second kill against a draining task
/// is redundant.
fn is_killable(status: ScheduleStatus) -> bool {
    status.is_active() && status != ScheduleStatus::Killing
}
