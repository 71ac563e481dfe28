//! Filesystem layout of a workspace.
//!
//! ```text
//! <root>/
//!   deps/<dependency>/...                         checkouts and prepared trees
//!   deps/<dependency>/<stage>/<Cfg> <arch>/       staged build output
//!   tools/<archive>                               verified download cache
//!   tools/<extract dir>/                          extracted tools
//! ```

use std::path::{Path, PathBuf};

use crate::config::Settings;
use crate::consts::SESSION_LOCK_FILE;

/// Resolved directories for one workspace root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Layout {
  pub root: PathBuf,
  pub deps_dir: PathBuf,
  pub tools_dir: PathBuf,
}

impl Layout {
  /// Resolve the layout for `root`, interpreting relative settings against it.
  pub fn new(root: impl Into<PathBuf>, settings: &Settings) -> Self {
    let root = root.into();
    Self {
      deps_dir: resolve(&root, &settings.deps_dir),
      tools_dir: resolve(&root, &settings.tools_dir),
      root,
    }
  }

  /// Checkout directory of a single dependency, e.g. `deps/openssl`.
  pub fn dependency(&self, name: &str) -> PathBuf {
    self.deps_dir.join(name)
  }

  /// `deps/<name>` relative to the root, as git expects submodule paths.
  pub fn dependency_relative(&self, name: &str) -> PathBuf {
    self
      .dependency(name)
      .strip_prefix(&self.root)
      .map(Path::to_path_buf)
      .unwrap_or_else(|_| self.dependency(name))
  }

  pub fn session_lock(&self) -> PathBuf {
    self.root.join(SESSION_LOCK_FILE)
  }
}

fn resolve(root: &Path, dir: &Path) -> PathBuf {
  if dir.is_absolute() {
    dir.to_path_buf()
  } else {
    root.join(dir)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn relative_settings_resolve_under_root() {
    let layout = Layout::new("/work", &Settings::default());
    assert_eq!(layout.deps_dir, PathBuf::from("/work/deps"));
    assert_eq!(layout.tools_dir, PathBuf::from("/work/tools"));
    assert_eq!(layout.dependency("openssl"), PathBuf::from("/work/deps/openssl"));
    assert_eq!(layout.dependency_relative("boost"), PathBuf::from("deps/boost"));
  }

  #[cfg(not(windows))]
  #[test]
  fn absolute_settings_are_kept() {
    let settings = Settings {
      tools_dir: PathBuf::from("/var/cache/depbot"),
      ..Settings::default()
    };
    let layout = Layout::new("/work", &settings);
    assert_eq!(layout.tools_dir, PathBuf::from("/var/cache/depbot"));
  }
}
