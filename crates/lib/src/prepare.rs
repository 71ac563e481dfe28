//! Per-architecture source trees.
//!
//! Some build systems (OpenSSL's in particular) build in-tree, so every architecture
//! needs its own copy of the checkout. The first run turns
//!
//! ```text
//! deps/openssl/{Configure, crypto/, ...}
//! ```
//!
//! into
//!
//! ```text
//! deps/openssl/x86/{Configure, crypto/, ...}
//! deps/openssl/x64/{Configure, crypto/, ...}
//! ```
//!
//! Later runs only validate that layout. A tree that is neither untouched nor fully
//! prepared is never repaired automatically: the caller reports it and the operator
//! restores the checkout.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{debug, info};
use walkdir::WalkDir;

use crate::util::fs::{contains_files, copy_dir_all};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrepareOutcome {
  /// Architecture trees were created by this call.
  Prepared,
  /// Architecture trees already existed and passed validation. Nothing was touched.
  AlreadyPrepared,
}

#[derive(Debug, Error)]
pub enum PrepareError {
  #[error("source directory {} does not exist", .0.display())]
  MissingSource(PathBuf),

  #[error("source directory {} contains no files to prepare", .0.display())]
  EmptySource(PathBuf),

  #[error("possible previously failed or partial preparation detected in {}: {reason}", .base.display())]
  PartialState { base: PathBuf, reason: String },

  #[error("failed to prepare {}: {source}", .path.display())]
  Io {
    path: PathBuf,
    #[source]
    source: io::Error,
  },
}

trait IoContext<T> {
  fn at(self, path: &Path) -> Result<T, PrepareError>;
}

impl<T> IoContext<T> for io::Result<T> {
  fn at(self, path: &Path) -> Result<T, PrepareError> {
    self.map_err(|source| PrepareError::Io {
      path: path.to_path_buf(),
      source,
    })
  }
}

/// Prepare `base` into one subdirectory per entry of `arch_dirs`.
///
/// Top-level entries named in `excluded` (e.g. staging output directories) are left
/// alone and ignored by validation.
pub fn prepare_source_tree(base: &Path, arch_dirs: &[&str], excluded: &[&str]) -> Result<PrepareOutcome, PrepareError> {
  if !base.is_dir() {
    return Err(PrepareError::MissingSource(base.to_path_buf()));
  }
  let Some((first, rest)) = arch_dirs.split_first() else {
    return Err(PrepareError::PartialState {
      base: base.to_path_buf(),
      reason: "no architecture directories requested".to_string(),
    });
  };

  let entries = top_level_entries(base, excluded)?;
  let any_arch_present = entries
    .iter()
    .any(|p| p.file_name().and_then(|n| n.to_str()).is_some_and(|n| arch_dirs.contains(&n)));

  if any_arch_present {
    validate(base, &entries, arch_dirs)?;
    debug!(base = %base.display(), "source tree already prepared");
    return Ok(PrepareOutcome::AlreadyPrepared);
  }

  if !contains_files(base) {
    return Err(PrepareError::EmptySource(base.to_path_buf()));
  }

  info!(base = %base.display(), archs = ?arch_dirs, "preparing per-architecture source trees");

  let first_dir = base.join(first);
  fs::create_dir(&first_dir).at(&first_dir)?;
  move_files_into(base, &entries, &first_dir)?;

  for arch in rest {
    let dest = base.join(arch);
    debug!(from = %first_dir.display(), to = %dest.display(), "copying source tree");
    copy_dir_all(&first_dir, &dest).at(&dest)?;
  }

  for entry in &entries {
    if entry.is_dir() && !contains_files(entry) {
      fs::remove_dir_all(entry).at(entry)?;
    }
  }

  Ok(PrepareOutcome::Prepared)
}

/// Top-level entries of `base`, minus excluded names, sorted by name.
fn top_level_entries(base: &Path, excluded: &[&str]) -> Result<Vec<PathBuf>, PrepareError> {
  let mut entries = Vec::new();
  for entry in fs::read_dir(base).at(base)? {
    let entry = entry.at(base)?;
    let name = entry.file_name();
    if name.to_str().is_some_and(|n| excluded.contains(&n)) {
      continue;
    }
    entries.push(entry.path());
  }
  entries.sort();
  Ok(entries)
}

/// Move every non-directory below `entries` to the same relative path under `dest`.
fn move_files_into(base: &Path, entries: &[PathBuf], dest: &Path) -> Result<(), PrepareError> {
  // Collect first so the walk never observes its own moves.
  let mut files = Vec::new();
  for entry in entries {
    for item in WalkDir::new(entry).sort_by_file_name() {
      let item = item.map_err(|e| PrepareError::Io {
        path: entry.clone(),
        source: io::Error::other(e),
      })?;
      if !item.file_type().is_dir() {
        files.push(item.into_path());
      }
    }
  }

  for file in files {
    let relative = file.strip_prefix(base).map_err(|e| PrepareError::Io {
      path: file.clone(),
      source: io::Error::other(e),
    })?;
    let target = dest.join(relative);
    if let Some(parent) = target.parent() {
      fs::create_dir_all(parent).at(parent)?;
    }
    fs::rename(&file, &target).at(&file)?;
  }

  Ok(())
}

fn validate(base: &Path, entries: &[PathBuf], arch_dirs: &[&str]) -> Result<(), PrepareError> {
  let partial = |reason: String| PrepareError::PartialState {
    base: base.to_path_buf(),
    reason,
  };

  for entry in entries {
    let name = entry.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default();
    if !arch_dirs.contains(&name.as_str()) {
      return Err(partial(format!("unexpected entry '{name}' next to the architecture directories")));
    }
    if !entry.is_dir() {
      return Err(partial(format!("'{name}' is not a directory")));
    }
  }

  for arch in arch_dirs {
    let dir = base.join(arch);
    if !dir.is_dir() {
      return Err(partial(format!("architecture directory '{arch}' is missing")));
    }
    if !contains_files(&dir) {
      return Err(partial(format!("architecture directory '{arch}' is empty")));
    }
  }

  Ok(())
}

#[cfg(test)]
mod tests {
  use super::*;
  use tempfile::TempDir;

  const ARCHS: &[&str] = &["x86", "x64"];

  fn checkout() -> TempDir {
    let temp = TempDir::new().unwrap();
    fs::write(temp.path().join("a"), "a").unwrap();
    fs::create_dir_all(temp.path().join("b")).unwrap();
    fs::write(temp.path().join("b").join("c"), "c").unwrap();
    temp
  }

  fn names(dir: &Path) -> Vec<String> {
    let mut names: Vec<_> = fs::read_dir(dir)
      .unwrap()
      .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
      .collect();
    names.sort();
    names
  }

  #[test]
  fn fresh_tree_is_split_per_architecture() {
    let temp = checkout();

    let outcome = prepare_source_tree(temp.path(), ARCHS, &["msvc"]).unwrap();

    assert_eq!(outcome, PrepareOutcome::Prepared);
    assert_eq!(names(temp.path()), vec!["x64", "x86"]);
    for arch in ARCHS {
      assert_eq!(fs::read_to_string(temp.path().join(arch).join("a")).unwrap(), "a");
      assert_eq!(fs::read_to_string(temp.path().join(arch).join("b").join("c")).unwrap(), "c");
    }
  }

  #[test]
  fn same_file_name_in_several_directories_is_moved_once_each() {
    let temp = checkout();
    fs::create_dir_all(temp.path().join("d").join("e")).unwrap();
    fs::write(temp.path().join("d").join("a"), "da").unwrap();
    fs::write(temp.path().join("d").join("e").join("a"), "dea").unwrap();

    prepare_source_tree(temp.path(), ARCHS, &[]).unwrap();

    for arch in ARCHS {
      let tree = temp.path().join(arch);
      assert_eq!(fs::read_to_string(tree.join("a")).unwrap(), "a");
      assert_eq!(fs::read_to_string(tree.join("d").join("a")).unwrap(), "da");
      assert_eq!(fs::read_to_string(tree.join("d").join("e").join("a")).unwrap(), "dea");
    }
    assert!(!temp.path().join("d").exists());
  }

  #[test]
  fn copies_are_independent() {
    let temp = checkout();
    prepare_source_tree(temp.path(), ARCHS, &[]).unwrap();

    fs::write(temp.path().join("x86").join("a"), "changed").unwrap();
    assert_eq!(fs::read_to_string(temp.path().join("x64").join("a")).unwrap(), "a");
  }

  #[test]
  fn second_run_touches_nothing() {
    let temp = checkout();
    prepare_source_tree(temp.path(), ARCHS, &[]).unwrap();
    let marker = temp.path().join("x64").join("a");
    let before = fs::metadata(&marker).unwrap().modified().unwrap();

    let outcome = prepare_source_tree(temp.path(), ARCHS, &[]).unwrap();

    assert_eq!(outcome, PrepareOutcome::AlreadyPrepared);
    assert_eq!(fs::metadata(&marker).unwrap().modified().unwrap(), before);
    assert_eq!(names(temp.path()), vec!["x64", "x86"]);
  }

  #[test]
  fn excluded_entries_are_left_alone() {
    let temp = checkout();
    fs::create_dir_all(temp.path().join("msvc").join("Release x64")).unwrap();
    fs::write(temp.path().join("msvc").join("Release x64").join("libssl.dll"), "").unwrap();

    prepare_source_tree(temp.path(), ARCHS, &["msvc"]).unwrap();
    assert!(temp.path().join("msvc").join("Release x64").join("libssl.dll").is_file());
    assert!(!temp.path().join("x86").join("msvc").exists());

    let outcome = prepare_source_tree(temp.path(), ARCHS, &["msvc"]).unwrap();
    assert_eq!(outcome, PrepareOutcome::AlreadyPrepared);
  }

  #[test]
  fn missing_architecture_directory_is_partial_state() {
    let temp = checkout();
    prepare_source_tree(temp.path(), ARCHS, &[]).unwrap();
    fs::remove_dir_all(temp.path().join("x64")).unwrap();

    let err = prepare_source_tree(temp.path(), ARCHS, &[]).unwrap_err();
    assert!(matches!(err, PrepareError::PartialState { .. }));
  }

  #[test]
  fn empty_architecture_directory_is_partial_state() {
    let temp = checkout();
    prepare_source_tree(temp.path(), ARCHS, &[]).unwrap();
    fs::remove_dir_all(temp.path().join("x86")).unwrap();
    fs::create_dir(temp.path().join("x86")).unwrap();

    let err = prepare_source_tree(temp.path(), ARCHS, &[]).unwrap_err();
    assert!(matches!(err, PrepareError::PartialState { .. }));
  }

  #[test]
  fn interrupted_move_is_refused_not_repaired() {
    let temp = checkout();
    // A crash after creating the first tree but before moving everything.
    fs::create_dir(temp.path().join("x86")).unwrap();
    fs::rename(temp.path().join("a"), temp.path().join("x86").join("a")).unwrap();

    let err = prepare_source_tree(temp.path(), ARCHS, &[]).unwrap_err();
    assert!(matches!(err, PrepareError::PartialState { .. }));
    assert!(temp.path().join("b").join("c").is_file());
    assert!(!temp.path().join("x64").exists());
  }

  #[test]
  fn missing_or_empty_source_is_reported() {
    let temp = TempDir::new().unwrap();
    assert!(matches!(
      prepare_source_tree(&temp.path().join("nope"), ARCHS, &[]),
      Err(PrepareError::MissingSource(_))
    ));

    fs::create_dir(temp.path().join("empty")).unwrap();
    assert!(matches!(
      prepare_source_tree(&temp.path().join("empty"), ARCHS, &[]),
      Err(PrepareError::EmptySource(_))
    ));
  }
}
