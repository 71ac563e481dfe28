//! Dependency-ordered execution of build tasks.
//!
//! The scheduler owns the task set for one session. It runs each task at most once,
//! after all of its dependencies succeeded, and never lets one task's failure stop an
//! unrelated task. Only a fatal fault (failed integrity check, unexpected I/O) ends the
//! session early.

pub mod dag;
pub mod types;

use std::time::Instant;

use tracing::{error, info, warn};

use crate::target::{Architecture, BuildConfiguration};
use crate::task::{BuildTask, TaskContext, TaskFault, TaskId, TaskResult};

use dag::TaskGraph;
pub use types::{ScheduleError, SessionReport, SkipReason, TaskOutcome, TaskReport};

pub struct Scheduler<T: BuildTask> {
  tasks: Vec<T>,
  graph: TaskGraph,
}

impl<T: BuildTask> Scheduler<T> {
  /// Validate the task set: unique ids and no dependency cycles.
  pub fn new(tasks: Vec<T>) -> Result<Self, ScheduleError> {
    let graph = TaskGraph::new(tasks.iter().map(|t| (t.id(), t.dependencies())))?;
    Ok(Self { tasks, graph })
  }

  pub fn tasks(&self) -> &[T] {
    &self.tasks
  }

  /// Task ids in the order they would run.
  pub fn order(&self) -> Vec<TaskId> {
    self.graph.order().into_iter().map(|i| self.tasks[i].id()).collect()
  }

  /// Keep only the tasks named by `selectors` (id or case-insensitive name) and
  /// everything they depend on.
  pub fn select(self, selectors: &[String]) -> Result<Self, ScheduleError> {
    let mut roots = Vec::with_capacity(selectors.len());
    for selector in selectors {
      let index = self
        .tasks
        .iter()
        .position(|t| t.id().0.eq_ignore_ascii_case(selector) || t.name().eq_ignore_ascii_case(selector))
        .ok_or_else(|| ScheduleError::UnknownTask(selector.clone()))?;
      roots.push(index);
    }

    let keep = self.graph.closure(&roots);
    let tasks = self
      .tasks
      .into_iter()
      .enumerate()
      .filter(|(i, _)| keep.contains(i))
      .map(|(_, t)| t)
      .collect();
    Self::new(tasks)
  }

  /// Run every task in dependency order for the requested targets.
  ///
  /// Consumes the scheduler: a task never runs twice in one session.
  pub async fn run(mut self, ctx: &TaskContext, configs: BuildConfiguration, archs: Architecture) -> SessionReport {
    let mut report = SessionReport::default();
    let mut succeeded = vec![false; self.tasks.len()];

    for index in self.graph.order() {
      let started = Instant::now();
      let outcome = if report.aborted {
        TaskOutcome::Skipped(SkipReason::Aborted)
      } else if let Some(failed) = self.graph.dependencies(index).into_iter().find(|d| !succeeded[*d]) {
        let dep = self.tasks[failed].id();
        warn!(task = self.tasks[index].name(), dependency = %dep, "skipping task, dependency did not succeed");
        TaskOutcome::Skipped(SkipReason::FailedDependency(dep))
      } else if let Err(fault) = self.check_runnable(index, ctx, archs) {
        error!(task = self.tasks[index].name(), error = %fault, "task cannot run");
        TaskOutcome::Failed(vec![fault])
      } else {
        let task = &mut self.tasks[index];
        info!(task = task.name(), id = %task.id(), "running task");
        let result = task.run(ctx, configs, archs).await;
        Self::settle(task, result, &mut report.aborted)
      };

      succeeded[index] = outcome.is_success();
      report.tasks.push(self.task_report(index, outcome, started));
    }

    report
  }

  /// Clean every task, dependents before their dependencies.
  ///
  /// A failed clean does not prevent the others.
  pub async fn clean(mut self, ctx: &TaskContext) -> SessionReport {
    let mut report = SessionReport::default();
    let mut order = self.graph.order();
    order.reverse();

    for index in order {
      let started = Instant::now();
      let outcome = if report.aborted {
        TaskOutcome::Skipped(SkipReason::Aborted)
      } else if !self.tasks[index].supports_os(ctx.platform.os) {
        TaskOutcome::Failed(vec![unsupported_os(&self.tasks[index], ctx)])
      } else {
        let task = &mut self.tasks[index];
        info!(task = task.name(), id = %task.id(), "cleaning task");
        let result = task.clean(ctx).await;
        Self::settle(task, result, &mut report.aborted)
      };
      report.tasks.push(self.task_report(index, outcome, started));
    }

    report
  }

  fn check_runnable(&self, index: usize, ctx: &TaskContext, archs: Architecture) -> Result<(), TaskFault> {
    let task = &self.tasks[index];

    if let Some(missing) = self.graph.missing_dependencies(index).first() {
      return Err(TaskFault::config(format!(
        "{} depends on task {missing}, which is not part of this session",
        task.name()
      )));
    }
    if !task.supports_os(ctx.platform.os) {
      return Err(unsupported_os(task, ctx));
    }
    let supported = task.supported_architectures();
    if (archs & supported).is_empty() {
      return Err(TaskFault::config(format!(
        "{} supports {supported} but {archs} was requested",
        task.name()
      )));
    }
    Ok(())
  }

  fn settle(task: &T, result: TaskResult, aborted: &mut bool) -> TaskOutcome {
    match result {
      Ok(()) => {
        info!(task = task.name(), "task succeeded");
        TaskOutcome::Succeeded
      }
      Err(faults) => {
        for fault in &faults {
          error!(task = task.name(), kind = %fault.kind(), error = %fault, "task failed");
        }
        if faults.iter().any(TaskFault::is_fatal) {
          error!(task = task.name(), "fatal fault, aborting session");
          *aborted = true;
        }
        TaskOutcome::Failed(faults)
      }
    }
  }

  fn task_report(&self, index: usize, outcome: TaskOutcome, started: Instant) -> TaskReport {
    let task = &self.tasks[index];
    TaskReport {
      id: task.id(),
      name: task.name(),
      help: task.help(),
      outcome,
      elapsed: started.elapsed(),
    }
  }
}

fn unsupported_os<T: BuildTask>(task: &T, ctx: &TaskContext) -> TaskFault {
  TaskFault::config(format!("{} is not supported on {}", task.name(), ctx.platform.os))
}
