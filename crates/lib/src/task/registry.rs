//! The built-in task table.
//!
//! Tasks are registered statically in declaration order, which is also the order
//! independent tasks run in.

use crate::platform::os::Os;
use crate::target::{Architecture, BuildConfiguration};

use super::boost::BuildBoost;
use super::openssl::BuildOpenSsl;
use super::submodules::SetupSubmodules;
use super::windivert::SetupWinDivert;
use super::{BuildTask, TaskContext, TaskId, TaskResult};

/// Any built-in task.
#[derive(Debug)]
pub enum Task {
  Submodules(SetupSubmodules),
  WinDivert(SetupWinDivert),
  OpenSsl(BuildOpenSsl),
  Boost(BuildBoost),
}

/// Fresh instances of every built-in task, in declaration order.
pub fn builtin() -> Vec<Task> {
  vec![
    Task::Submodules(SetupSubmodules),
    Task::WinDivert(SetupWinDivert),
    Task::OpenSsl(BuildOpenSsl),
    Task::Boost(BuildBoost),
  ]
}

macro_rules! dispatch {
  ($self:ident, $task:ident => $body:expr) => {
    match $self {
      Task::Submodules($task) => $body,
      Task::WinDivert($task) => $body,
      Task::OpenSsl($task) => $body,
      Task::Boost($task) => $body,
    }
  };
}

impl BuildTask for Task {
  fn id(&self) -> TaskId {
    dispatch!(self, t => t.id())
  }

  fn name(&self) -> &'static str {
    dispatch!(self, t => t.name())
  }

  fn dependencies(&self) -> &'static [TaskId] {
    dispatch!(self, t => t.dependencies())
  }

  fn supported_architectures(&self) -> Architecture {
    dispatch!(self, t => t.supported_architectures())
  }

  fn supports_os(&self, os: Os) -> bool {
    dispatch!(self, t => t.supports_os(os))
  }

  fn help(&self) -> &'static str {
    dispatch!(self, t => t.help())
  }

  async fn run(&mut self, ctx: &TaskContext, configs: BuildConfiguration, archs: Architecture) -> TaskResult {
    dispatch!(self, t => t.run(ctx, configs, archs).await)
  }

  async fn clean(&mut self, ctx: &TaskContext) -> TaskResult {
    dispatch!(self, t => t.clean(ctx).await)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::schedule::Scheduler;
  use crate::task::{boost, openssl, submodules, windivert};
  use std::collections::HashSet;

  #[test]
  fn ids_are_unique() {
    let ids: Vec<TaskId> = builtin().iter().map(|t| t.id()).collect();
    let unique: HashSet<_> = ids.iter().collect();
    assert_eq!(unique.len(), ids.len());
  }

  #[test]
  fn builtin_set_forms_a_valid_graph() {
    let scheduler = Scheduler::new(builtin()).unwrap();
    assert_eq!(
      scheduler.order(),
      vec![submodules::ID, windivert::ID, openssl::ID, boost::ID]
    );
  }

  #[test]
  fn every_dependency_is_registered() {
    let known: HashSet<TaskId> = builtin().iter().map(|t| t.id()).collect();
    for task in builtin() {
      for dep in task.dependencies() {
        assert!(known.contains(dep), "{} depends on unregistered {dep}", task.name());
      }
    }
  }

  #[test]
  fn only_submodules_runs_on_macos() {
    let names: Vec<_> = builtin()
      .into_iter()
      .filter(|t| t.supports_os(Os::MacOs))
      .map(|t| t.id())
      .collect();
    assert_eq!(names, vec![submodules::ID]);
  }
}
