//! Fetches the prebuilt WinDivert driver package into `deps/windivert/msvc`.
//!
//! The upstream archive nests everything under a versioned directory and names the
//! 64-bit binaries `amd64`. After extraction the versioned directory is collapsed and
//! `amd64` becomes `x64`, matching the architecture names used everywhere else.

use std::fs;
use std::path::Path;

use tracing::{debug, info};

use crate::platform::os::Os;
use crate::target::{Architecture, BuildConfiguration};
use crate::tools::{ToolDescriptor, ToolError, archive, catalog};
use crate::util::fs::{find_dirs, find_file, remove_dir_if_exists};

use super::{BuildTask, TaskContext, TaskFault, TaskId, TaskResult};

pub const ID: TaskId = TaskId("dce82bd6-da9e-49c8-991a-b3383b156a43");

const DRIVER_FILE: &str = "WinDivert.dll";

#[derive(Debug, Default)]
pub struct SetupWinDivert;

/// Collapse the versioned top directory of an extracted package into `dest` and
/// rename `amd64` to `x64`.
pub fn normalize_layout(dest: &Path) -> Result<(), TaskFault> {
  let amd64 = match find_dirs(dest, "amd64").as_slice() {
    [single] => single.clone(),
    [] => return Err(TaskFault::config(format!("no amd64 directory in the package at {}", dest.display()))),
    _ => {
      return Err(TaskFault::config(format!(
        "more than one amd64 directory in the package at {}",
        dest.display()
      )));
    }
  };
  let Some(version_dir) = amd64.parent().map(Path::to_path_buf) else {
    return Err(TaskFault::config("amd64 directory has no parent"));
  };

  let io = |context: &str, path: &Path| {
    let context = format!("{context} {}", path.display());
    move |e| TaskFault::io(context, e)
  };

  for entry in fs::read_dir(&version_dir).map_err(io("reading", &version_dir))? {
    let entry = entry.map_err(io("reading", &version_dir))?;
    let name = entry.file_name();
    let target_name = if name == "amd64" { "x64".into() } else { name };
    let target = dest.join(&target_name);
    if target == entry.path() {
      continue;
    }
    debug!(from = %entry.path().display(), to = %target.display(), "moving package entry");
    fs::rename(entry.path(), &target).map_err(io("moving", &entry.path()))?;
  }

  if version_dir != dest {
    remove_dir_if_exists(&version_dir).map_err(io("removing", &version_dir))?;
  }
  Ok(())
}

/// Stage the package described by `tool` into `deps/windivert/msvc`.
///
/// An existing installation is kept unless the archive had to be downloaded again,
/// in which case it is replaced by a fresh extraction.
async fn install(ctx: &TaskContext, tool: &ToolDescriptor) -> TaskResult {
  let _lock = ctx.tools.lock(tool).map_err(|e| vec![TaskFault::from(ToolError::from(e))])?;
  let archive = ctx.tools.ensure_archive(tool).await.map_err(|e| vec![TaskFault::from(e)])?;

  let dest = ctx.layout.dependency("windivert").join("msvc");
  if archive.downloaded {
    remove_dir_if_exists(&dest).map_err(|e| vec![TaskFault::io(format!("removing {}", dest.display()), e)])?;
  } else if find_file(&dest, DRIVER_FILE).is_some() {
    info!(dir = %dest.display(), "WinDivert already installed");
    return Ok(());
  }

  info!(dest = %dest.display(), "extracting WinDivert");
  archive::extract(&archive.path, &dest).map_err(|source| {
    vec![TaskFault::from(ToolError::Extract {
      tool: tool.name.clone(),
      source,
    })]
  })?;
  normalize_layout(&dest).map_err(|e| vec![e])?;

  if find_file(&dest, DRIVER_FILE).is_none() {
    return Err(vec![TaskFault::from(ToolError::NotInPackage {
      tool: tool.name.clone(),
      executable: DRIVER_FILE.to_string(),
      dir: dest,
    })]);
  }
  Ok(())
}

impl BuildTask for SetupWinDivert {
  fn id(&self) -> TaskId {
    ID
  }

  fn name(&self) -> &'static str {
    "WinDivert Driver Setup"
  }

  fn supported_architectures(&self) -> Architecture {
    Architecture::all()
  }

  fn supports_os(&self, os: Os) -> bool {
    os == Os::Windows
  }

  fn help(&self) -> &'static str {
    "The WinDivert package could not be installed. Delete deps/windivert and tools/WinDivert.zip, \
     then run again to download a fresh copy."
  }

  async fn run(&mut self, ctx: &TaskContext, _configs: BuildConfiguration, _archs: Architecture) -> TaskResult {
    install(ctx, &catalog::windivert()).await
  }

  async fn clean(&mut self, ctx: &TaskContext) -> TaskResult {
    let dir = ctx.layout.dependency("windivert");
    info!(dir = %dir.display(), "removing WinDivert");
    remove_dir_if_exists(&dir).map_err(|e| vec![TaskFault::io(format!("removing {}", dir.display()), e)])
  }
}
