//! Initialises the git submodules every other dependency is checked out from.

use std::path::Path;

use tracing::{info, warn};

use crate::platform::os::Os;
use crate::process::{self, Invocation};
use crate::target::{Architecture, BuildConfiguration};
use crate::tools::catalog;
use crate::util::fs::remove_dir_if_exists;

use super::{BuildTask, TaskContext, TaskFault, TaskId, TaskResult};

pub const ID: TaskId = TaskId("01241f94-9a80-42e9-bb23-f1470c40cff6");

/// Submodules initialised without `--recursive`. Boost pulls its own modules in
/// selectively, see the Boost task.
const NON_RECURSIVE: &[&str] = &["boost"];

#[derive(Debug, Default)]
pub struct SetupSubmodules;

/// A git invocation in `cwd` using the acquired git.
pub(crate) fn git(ctx: &TaskContext, git_dir: &Path, cwd: &Path) -> Invocation {
  let program = process::program_in(git_dir, &ctx.platform.os.executable_name("git"));
  Invocation::new(program, cwd).timeout(ctx.tool_timeout())
}

async fn init_root(ctx: &TaskContext, git_dir: &Path) -> Result<(), TaskFault> {
  let invocation = git(ctx, git_dir, &ctx.layout.root).args(["submodule", "update", "--init"]);
  process::run_checked(&invocation, &ctx.env).await?;
  Ok(())
}

/// `git submodule update` arguments for the checkout at `relative`.
pub fn update_args(relative: &str, name: &str) -> Vec<String> {
  let mut args = vec!["submodule".to_string(), "update".to_string(), "--init".to_string()];
  if !NON_RECURSIVE.contains(&name) {
    args.push("--recursive".to_string());
  }
  args.push(relative.to_string());
  args
}

impl BuildTask for SetupSubmodules {
  fn id(&self) -> TaskId {
    ID
  }

  fn name(&self) -> &'static str {
    "Git Submodule Setup"
  }

  fn supported_architectures(&self) -> Architecture {
    Architecture::all()
  }

  fn supports_os(&self, _os: Os) -> bool {
    true
  }

  fn help(&self) -> &'static str {
    "Submodule initialisation failed. Check network access to the submodule remotes, then run \
     `git submodule update --init` from the repository root to see the underlying error."
  }

  async fn run(&mut self, ctx: &TaskContext, _configs: BuildConfiguration, _archs: Architecture) -> TaskResult {
    let git_dir = ctx.tools.acquire(&catalog::git()).await.map_err(|e| vec![TaskFault::from(e)])?;

    init_root(ctx, &git_dir).await.map_err(|e| vec![e])?;

    let mut names: Vec<String> = match std::fs::read_dir(&ctx.layout.deps_dir) {
      Ok(entries) => entries
        .filter_map(Result::ok)
        .filter(|e| e.path().is_dir())
        .map(|e| e.file_name().to_string_lossy().into_owned())
        .collect(),
      Err(e) => {
        return Err(vec![TaskFault::io(
          format!("listing submodules in {}", ctx.layout.deps_dir.display()),
          e,
        )]);
      }
    };
    names.sort();

    if names.is_empty() {
      return Err(vec![TaskFault::config(format!(
        "no submodules found under {}",
        ctx.layout.deps_dir.display()
      ))]);
    }

    let mut faults: Vec<TaskFault> = Vec::new();
    for name in &names {
      let relative = ctx.layout.dependency_relative(name);
      // git wants forward slashes in pathspecs on every platform.
      let args = update_args(&relative.to_string_lossy().replace('\\', "/"), name);
      info!(submodule = %name, "initialising submodule");

      let invocation = git(ctx, &git_dir, &ctx.layout.root).args(args);
      if let Err(e) = process::run_checked(&invocation, &ctx.env).await {
        warn!(submodule = %name, error = %e, "submodule initialisation failed");
        faults.push(e.into());
      }
    }

    if faults.is_empty() { Ok(()) } else { Err(faults) }
  }

  async fn clean(&mut self, ctx: &TaskContext) -> TaskResult {
    info!(dir = %ctx.layout.deps_dir.display(), "removing submodule checkouts");
    remove_dir_if_exists(&ctx.layout.deps_dir)
      .map_err(|e| vec![TaskFault::io(format!("removing {}", ctx.layout.deps_dir.display()), e)])?;

    let git_dir = ctx.tools.acquire(&catalog::git()).await.map_err(|e| vec![TaskFault::from(e)])?;
    init_root(ctx, &git_dir).await.map_err(|e| vec![e])
  }
}
