//! The environment handed to child processes and used for tool lookup.
//!
//! Nothing in the library reads the process environment directly. The caller builds an
//! [`Environment`] (usually with [`Environment::from_process`]) and passes it down, so
//! tests and compiler environment capture can substitute their own.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Name of the executable search path variable.
pub const PATH_VAR: &str = "PATH";

/// An ordered key/value environment.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Environment {
  vars: BTreeMap<String, String>,
}

impl Environment {
  /// Snapshot of the current process environment. Non-UTF-8 entries are skipped.
  pub fn from_process() -> Self {
    Self::from_vars(
      std::env::vars_os().filter_map(|(k, v)| Some((k.into_string().ok()?, v.into_string().ok()?))),
    )
  }

  pub fn from_vars<I, K, V>(vars: I) -> Self
  where
    I: IntoIterator<Item = (K, V)>,
    K: Into<String>,
    V: Into<String>,
  {
    let mut env = Self::default();
    for (k, v) in vars {
      env.set(k, v);
    }
    env
  }

  /// Look up a variable. Names are case-insensitive on Windows.
  pub fn get(&self, key: &str) -> Option<&str> {
    self.resolve_key(key).and_then(|k| self.vars.get(k)).map(String::as_str)
  }

  /// Set a variable, replacing an existing entry with the same (normalized) name.
  pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
    let key = key.into();
    let key = self.resolve_key(&key).map(str::to_string).unwrap_or(key);
    self.vars.insert(key, value.into());
  }

  pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
    self.vars.iter().map(|(k, v)| (k.as_str(), v.as_str()))
  }

  pub fn len(&self) -> usize {
    self.vars.len()
  }

  pub fn is_empty(&self) -> bool {
    self.vars.is_empty()
  }

  /// Apply `overlay` on top of this environment.
  pub fn merged(&self, overlay: &Environment) -> Environment {
    let mut merged = self.clone();
    for (k, v) in overlay.iter() {
      merged.set(k, v);
    }
    merged
  }

  /// Entries of `PATH`, in order.
  pub fn path_entries(&self) -> Vec<PathBuf> {
    self.get(PATH_VAR).map(|p| std::env::split_paths(p).collect()).unwrap_or_default()
  }

  /// Whether `dir` already appears in `PATH`.
  pub fn path_contains(&self, dir: &Path) -> bool {
    self.path_entries().iter().any(|entry| same_dir(entry, dir))
  }

  /// Append `dir` to `PATH` unless it is already present.
  pub fn append_path(&mut self, dir: &Path) {
    if self.path_contains(dir) {
      return;
    }
    let mut entries = self.path_entries();
    entries.push(dir.to_path_buf());
    if let Ok(joined) = std::env::join_paths(entries) {
      self.set(PATH_VAR, joined.to_string_lossy().into_owned());
    }
  }

  /// Every directory referenced by any search-path-style variable.
  ///
  /// `PATH` comes first, then every other variable in key order. Values are split with
  /// the platform path separator; only absolute paths naming an existing directory are
  /// kept, without duplicates.
  pub fn search_dirs(&self) -> Vec<PathBuf> {
    let mut keys: Vec<&str> = Vec::with_capacity(self.vars.len());
    if let Some(path_key) = self.resolve_key(PATH_VAR) {
      keys.push(path_key);
    }
    keys.extend(self.vars.keys().map(String::as_str).filter(|k| Some(*k) != self.resolve_key(PATH_VAR)));

    let mut dirs: Vec<PathBuf> = Vec::new();
    for key in keys {
      let Some(value) = self.vars.get(key) else { continue };
      for candidate in std::env::split_paths(value) {
        if candidate.is_absolute() && candidate.is_dir() && !dirs.iter().any(|d| d == &candidate) {
          dirs.push(candidate);
        }
      }
    }
    dirs
  }

  /// First search directory that directly contains `file_name`. Not recursive.
  pub fn find_in_search_dirs(&self, file_name: &str) -> Option<PathBuf> {
    self.search_dirs().into_iter().find(|dir| dir.join(file_name).is_file())
  }

  #[cfg(windows)]
  fn resolve_key(&self, key: &str) -> Option<&str> {
    self.vars.keys().find(|k| k.eq_ignore_ascii_case(key)).map(String::as_str)
  }

  #[cfg(not(windows))]
  fn resolve_key(&self, key: &str) -> Option<&str> {
    self.vars.get_key_value(key).map(|(k, _)| k.as_str())
  }
}

#[cfg(windows)]
fn same_dir(a: &Path, b: &Path) -> bool {
  a.to_string_lossy().trim_end_matches('\\').eq_ignore_ascii_case(b.to_string_lossy().trim_end_matches('\\'))
}

#[cfg(not(windows))]
fn same_dir(a: &Path, b: &Path) -> bool {
  a.components().eq(b.components())
}
