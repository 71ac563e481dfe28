//! Build tasks and the context they run in.
//!
//! A task is one unit of dependency work (initialise submodules, build OpenSSL, ...).
//! The scheduler decides whether and when a task runs; the task itself decides what
//! "done" means and must be safe to run again after an interrupted session.

pub mod boost;
pub mod openssl;
pub mod registry;
pub mod submodules;
pub mod windivert;

use std::fmt;
use std::io;

use thiserror::Error;

use crate::config::Settings;
use crate::env::Environment;
use crate::platform::Platform;
use crate::platform::os::Os;
use crate::platform::paths::Layout;
use crate::prepare::PrepareError;
use crate::process::{ProcessError, Timeout};
use crate::target::{Architecture, BuildConfiguration, Cell};
use crate::toolchain::ToolchainError;
use crate::tools::{ToolCache, ToolError};

pub use registry::Task;

/// Stable, never reused identifier of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskId(pub &'static str);

impl fmt::Display for TaskId {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.0)
  }
}

/// Broad classification of a fault, used for reporting and abort decisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultKind {
  Configuration,
  Integrity,
  PartialState,
  Process,
  Io,
}

impl fmt::Display for FaultKind {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(match self {
      Self::Configuration => "configuration",
      Self::Integrity => "integrity",
      Self::PartialState => "partial state",
      Self::Process => "process",
      Self::Io => "i/o",
    })
  }
}

/// One entry of a task's error list.
#[derive(Debug, Error)]
pub enum TaskFault {
  #[error("{0}")]
  Configuration(String),

  #[error(transparent)]
  Tool(#[from] ToolError),

  #[error(transparent)]
  Prepare(#[from] PrepareError),

  #[error(transparent)]
  Toolchain(#[from] ToolchainError),

  #[error(transparent)]
  Process(#[from] ProcessError),

  #[error("{cell}: {source}")]
  Cell {
    cell: Cell,
    #[source]
    source: Box<TaskFault>,
  },

  /// Build output missing or not movable into place. Scoped to the cell that made it.
  #[error("{context}: {source}")]
  Staging {
    context: String,
    #[source]
    source: io::Error,
  },

  #[error("{context}: {source}")]
  Io {
    context: String,
    #[source]
    source: io::Error,
  },
}

impl TaskFault {
  pub fn config(message: impl Into<String>) -> Self {
    Self::Configuration(message.into())
  }

  pub fn io(context: impl Into<String>, source: io::Error) -> Self {
    Self::Io {
      context: context.into(),
      source,
    }
  }

  pub fn staging(context: impl Into<String>, source: io::Error) -> Self {
    Self::Staging {
      context: context.into(),
      source,
    }
  }

  pub fn in_cell(self, cell: Cell) -> Self {
    Self::Cell {
      cell,
      source: Box::new(self),
    }
  }

  pub fn kind(&self) -> FaultKind {
    match self {
      Self::Configuration(_) => FaultKind::Configuration,
      Self::Tool(e) => match e {
        ToolError::Integrity { .. } => FaultKind::Integrity,
        ToolError::Io(_) => FaultKind::Io,
        ToolError::Download { .. } | ToolError::Extract { .. } => FaultKind::Process,
        ToolError::Unavailable { .. } | ToolError::NotInPackage { .. } | ToolError::Lock(_) => {
          FaultKind::Configuration
        }
      },
      Self::Prepare(e) => match e {
        PrepareError::PartialState { .. } => FaultKind::PartialState,
        PrepareError::Io { .. } => FaultKind::Io,
        PrepareError::MissingSource(_) | PrepareError::EmptySource(_) => FaultKind::Configuration,
      },
      Self::Toolchain(e) => match e {
        ToolchainError::NotFound(_) => FaultKind::Configuration,
        ToolchainError::Capture(_) | ToolchainError::EmptyEnvironment { .. } => FaultKind::Process,
      },
      Self::Process(_) | Self::Staging { .. } => FaultKind::Process,
      Self::Cell { source, .. } => source.kind(),
      Self::Io { .. } => FaultKind::Io,
    }
  }

  /// Whether this fault must abort the whole session.
  pub fn is_fatal(&self) -> bool {
    matches!(self.kind(), FaultKind::Integrity | FaultKind::Io)
  }
}

/// The accumulated error list of one `run` or `clean` call.
pub type TaskResult = Result<(), Vec<TaskFault>>;

/// Shared, read-only state every task sees during a session.
#[derive(Debug, Clone)]
pub struct TaskContext {
  pub layout: Layout,
  pub settings: Settings,
  pub platform: Platform,
  pub env: Environment,
  pub tools: ToolCache,
}

impl TaskContext {
  pub fn new(layout: Layout, settings: Settings, platform: Platform, env: Environment) -> Self {
    let tools = ToolCache::new(layout.tools_dir.clone(), platform, env.clone());
    Self {
      layout,
      settings,
      platform,
      env,
      tools,
    }
  }

  /// Timeout for short tool invocations such as git.
  pub fn tool_timeout(&self) -> Timeout {
    Timeout::Bounded(self.settings.tool_timeout)
  }
}

/// A unit of build work with declared dependencies.
#[allow(async_fn_in_trait)]
pub trait BuildTask {
  fn id(&self) -> TaskId;

  fn name(&self) -> &'static str;

  /// Tasks that must have succeeded before this one runs.
  fn dependencies(&self) -> &'static [TaskId] {
    &[]
  }

  fn supported_architectures(&self) -> Architecture;

  fn supports_os(&self, os: Os) -> bool;

  /// Guidance shown to the operator when the task fails.
  fn help(&self) -> &'static str {
    "No help to offer."
  }

  async fn run(&mut self, ctx: &TaskContext, configs: BuildConfiguration, archs: Architecture) -> TaskResult;

  async fn clean(&mut self, ctx: &TaskContext) -> TaskResult;
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::target::{Architecture, BuildConfiguration};

  #[test]
  fn integrity_and_io_are_fatal() {
    let integrity = TaskFault::Tool(ToolError::Integrity {
      tool: "git".into(),
      url: "https://example.invalid/git.zip".into(),
      expected: "sha256:aa".into(),
      actual: "sha256:bb".into(),
    });
    assert_eq!(integrity.kind(), FaultKind::Integrity);
    assert!(integrity.is_fatal());

    let io = TaskFault::io("staging output", io::Error::other("disk full"));
    assert!(io.is_fatal());

    assert!(!TaskFault::config("MSVC not found").is_fatal());
  }

  #[test]
  fn cell_faults_keep_inner_kind() {
    let cell = Cell::new(BuildConfiguration::RELEASE, Architecture::X64);
    let fault = TaskFault::Process(ProcessError::NonZeroExit {
      program: "nmake".into(),
      code: 2,
    })
    .in_cell(cell);

    assert_eq!(fault.kind(), FaultKind::Process);
    assert_eq!(fault.to_string(), "Release x64: nmake exited with code 2");
  }

  #[test]
  fn partial_state_is_not_fatal() {
    let fault = TaskFault::Prepare(PrepareError::PartialState {
      base: "deps/openssl".into(),
      reason: "architecture directory 'x64' is missing".into(),
    });
    assert_eq!(fault.kind(), FaultKind::PartialState);
    assert!(!fault.is_fatal());
  }
}
