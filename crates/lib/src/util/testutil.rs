//! Test helpers for running shell snippets portably and driving tasks against a
//! throwaway workspace.

use std::path::{Path, PathBuf};

use crate::config::Settings;
use crate::env::Environment;
use crate::platform::Platform;
use crate::platform::paths::Layout;
use crate::process::Invocation;
use crate::task::TaskContext;

#[cfg(unix)]
const SHELL: (&str, &str) = ("/bin/sh", "-c");

#[cfg(windows)]
const SHELL: (&str, &str) = ("cmd.exe", "/C");

/// An invocation running `script` through the platform shell in `cwd`.
pub fn shell(script: &str, cwd: &Path) -> Invocation {
  Invocation::new(SHELL.0, cwd).args([SHELL.1, script])
}

/// An invocation printing the value of `var`. Expansion needs a shell.
#[cfg(unix)]
pub fn echo_env(var: &str, cwd: &Path) -> Invocation {
  shell(&format!("echo \"${var}\""), cwd)
}

#[cfg(windows)]
pub fn echo_env(var: &str, cwd: &Path) -> Invocation {
  shell(&format!("echo %{var}%"), cwd)
}

/// A context for a workspace at `root` whose environment holds nothing but `PATH`.
pub fn context(root: &Path, platform: Platform, path: &[PathBuf]) -> TaskContext {
  let settings = Settings {
    jobs: 2,
    ..Settings::default()
  };
  let layout = Layout::new(root, &settings);
  let path = std::env::join_paths(path).unwrap().to_string_lossy().into_owned();
  TaskContext::new(layout, settings, platform, Environment::from_vars([("PATH", path)]))
}

/// Directories a fake tool script needs to find `mkdir`, `cat` and friends.
#[cfg(unix)]
pub fn system_path() -> Vec<PathBuf> {
  vec![PathBuf::from("/usr/bin"), PathBuf::from("/bin")]
}

/// Write an executable `/bin/sh` script named `name` into `dir`.
#[cfg(unix)]
pub fn fake_tool(dir: &Path, name: &str, body: &str) -> PathBuf {
  use std::os::unix::fs::PermissionsExt;

  std::fs::create_dir_all(dir).unwrap();
  let path = dir.join(name);
  std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
  std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
  path
}

/// Lines appended to a fake tool's call log, or nothing if it never ran.
pub fn read_log(path: &Path) -> Vec<String> {
  std::fs::read_to_string(path)
    .map(|s| s.lines().map(|l| l.trim_end().to_string()).collect())
    .unwrap_or_default()
}
