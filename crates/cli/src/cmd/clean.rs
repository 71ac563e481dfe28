//! Implementation of the `depbot clean` command.

use std::path::Path;

use anyhow::{Context, Result, bail};

use depbot_lib::lock::FileLock;

use super::{Workspace, print_report};

pub fn cmd_clean(root: Option<&Path>, tasks: &[String]) -> Result<()> {
  let workspace = Workspace::open(root)?;
  let scheduler = workspace.scheduler(tasks)?;
  let _lock = FileLock::acquire(&workspace.layout.session_lock(), "clean")?;
  let ctx = workspace.context();

  let rt = tokio::runtime::Runtime::new().context("Failed to create async runtime")?;
  let report = rt.block_on(scheduler.clean(&ctx));

  print_report(&report);
  if !report.is_success() {
    bail!("{} task(s) could not be cleaned", report.failed());
  }
  Ok(())
}
