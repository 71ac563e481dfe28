//! Implementation of the `depbot run` command.

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use tracing::info;

use depbot_lib::lock::FileLock;
use depbot_lib::target::{Architecture, BuildConfiguration};

use super::{Workspace, print_report};

pub struct RunOptions {
  pub configs: BuildConfiguration,
  pub archs: Architecture,
  pub tasks: Vec<String>,
  pub tool_timeout: Option<Duration>,
}

/// Execute the run command.
///
/// Holds the session lock on the workspace root, runs the selected tasks in
/// dependency order and prints the per-task outcome. Fails when any task did
/// not succeed.
pub fn cmd_run(root: Option<&Path>, options: RunOptions) -> Result<()> {
  let mut workspace = Workspace::open(root)?;
  if let Some(timeout) = options.tool_timeout {
    workspace.settings.tool_timeout = timeout;
  }

  let scheduler = workspace.scheduler(&options.tasks)?;
  let _lock = FileLock::acquire(&workspace.layout.session_lock(), "run")?;

  info!(
    root = %workspace.root.display(),
    configs = %options.configs,
    archs = %options.archs,
    "starting session"
  );
  let ctx = workspace.context();

  let rt = tokio::runtime::Runtime::new().context("Failed to create async runtime")?;
  let report = rt.block_on(scheduler.run(&ctx, options.configs, options.archs));

  print_report(&report);
  if !report.is_success() {
    bail!("{} of {} task(s) did not succeed", report.total() - report.succeeded(), report.total());
  }
  Ok(())
}
