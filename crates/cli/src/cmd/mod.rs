mod clean;
mod info;
mod list;
mod run;

pub use clean::cmd_clean;
pub use info::cmd_info;
pub use list::cmd_list;
pub use run::{RunOptions, cmd_run};

use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};

use depbot_lib::config::Settings;
use depbot_lib::env::Environment;
use depbot_lib::platform::Platform;
use depbot_lib::platform::paths::Layout;
use depbot_lib::schedule::{Scheduler, SessionReport, TaskOutcome};
use depbot_lib::task::{BuildTask, Task, TaskContext, registry};

use crate::output::{format_duration, print_error, print_hint, print_stat, print_success, print_warning};

/// Everything resolved about the workspace before a command does its work.
pub(crate) struct Workspace {
  pub root: PathBuf,
  pub env: Environment,
  pub settings: Settings,
  pub layout: Layout,
  pub platform: Platform,
}

impl Workspace {
  pub fn open(root: Option<&Path>) -> Result<Self> {
    let root = match root {
      Some(root) => root.to_path_buf(),
      None => std::env::current_dir().context("Failed to read the current directory")?,
    };
    let root = dunce::canonicalize(&root).with_context(|| format!("Workspace root {} not found", root.display()))?;

    let platform = Platform::current().ok_or_else(|| anyhow!("Unsupported operating system: {}", std::env::consts::OS))?;
    let env = Environment::from_process();
    let settings = Settings::load(&root, &env).context("Failed to load settings")?;
    let layout = Layout::new(&root, &settings);

    Ok(Self {
      root,
      env,
      settings,
      layout,
      platform,
    })
  }

  pub fn context(self) -> TaskContext {
    TaskContext::new(self.layout, self.settings, self.platform, self.env)
  }

  /// Tasks for this session: the named ones plus their dependencies, or every
  /// task that supports the host OS.
  pub fn scheduler(&self, selectors: &[String]) -> Result<Scheduler<Task>> {
    if selectors.is_empty() {
      let tasks = registry::builtin()
        .into_iter()
        .filter(|t| t.supports_os(self.platform.os))
        .collect();
      return Scheduler::new(tasks).context("Invalid task registry");
    }
    let scheduler = Scheduler::new(registry::builtin()).context("Invalid task registry")?;
    Ok(scheduler.select(selectors)?)
  }
}

/// Print one line per task, the faults and help of failed tasks, and a summary.
pub(crate) fn print_report(report: &SessionReport) {
  for task in &report.tasks {
    let elapsed = format_duration(task.elapsed);
    match &task.outcome {
      TaskOutcome::Succeeded => print_success(&format!("{} ({elapsed})", task.name)),
      TaskOutcome::Skipped(reason) => print_warning(&format!("{} skipped: {reason}", task.name)),
      TaskOutcome::Failed(faults) => {
        print_error(&format!("{} failed ({elapsed})", task.name));
        for fault in faults {
          eprintln!("    - {fault}");
        }
        print_hint(task.help);
      }
    }
  }

  println!();
  print_stat("Succeeded", &report.succeeded().to_string());
  print_stat("Failed", &report.failed().to_string());
  print_stat("Skipped", &report.skipped().to_string());
  if report.aborted {
    print_error("Session aborted after a fatal fault");
  }
}
