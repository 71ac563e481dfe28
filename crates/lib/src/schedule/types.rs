//! Result and error types of a scheduling session.

use std::fmt;
use std::time::Duration;

use thiserror::Error;

use crate::task::{TaskFault, TaskId};

/// Errors in the task set itself, detected before anything runs.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ScheduleError {
  #[error("task {0} is registered more than once")]
  DuplicateTask(TaskId),

  #[error("dependency cycle detected involving task {0}")]
  CycleDetected(TaskId),

  #[error("unknown task '{0}'")]
  UnknownTask(String),
}

/// Why a task was not run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
  /// A dependency did not succeed in this session.
  FailedDependency(TaskId),
  /// An earlier task hit a fatal fault and the session stopped.
  Aborted,
}

impl fmt::Display for SkipReason {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Self::FailedDependency(id) => write!(f, "dependency {id} did not succeed"),
      Self::Aborted => write!(f, "session aborted after a fatal fault"),
    }
  }
}

#[derive(Debug)]
pub enum TaskOutcome {
  Succeeded,
  Failed(Vec<TaskFault>),
  Skipped(SkipReason),
}

impl TaskOutcome {
  pub fn is_success(&self) -> bool {
    matches!(self, Self::Succeeded)
  }
}

/// What happened to one task.
#[derive(Debug)]
pub struct TaskReport {
  pub id: TaskId,
  pub name: &'static str,
  pub help: &'static str,
  pub outcome: TaskOutcome,
  pub elapsed: Duration,
}

/// Result of a whole `run` or `clean` session, in execution order.
#[derive(Debug, Default)]
pub struct SessionReport {
  pub tasks: Vec<TaskReport>,
  /// Set when a fatal fault stopped the session early.
  pub aborted: bool,
}

impl SessionReport {
  /// True only when every task in the session succeeded.
  pub fn is_success(&self) -> bool {
    !self.aborted && self.tasks.iter().all(|t| t.outcome.is_success())
  }

  pub fn get(&self, id: TaskId) -> Option<&TaskReport> {
    self.tasks.iter().find(|t| t.id == id)
  }

  pub fn succeeded(&self) -> usize {
    self.tasks.iter().filter(|t| t.outcome.is_success()).count()
  }

  pub fn failed(&self) -> usize {
    self
      .tasks
      .iter()
      .filter(|t| matches!(t.outcome, TaskOutcome::Failed(_)))
      .count()
  }

  pub fn skipped(&self) -> usize {
    self
      .tasks
      .iter()
      .filter(|t| matches!(t.outcome, TaskOutcome::Skipped(_)))
      .count()
  }

  pub fn total(&self) -> usize {
    self.tasks.len()
  }
}
