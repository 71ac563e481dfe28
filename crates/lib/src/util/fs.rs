//! Filesystem helpers shared by tool extraction and source tree preparation.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use walkdir::WalkDir;

/// Recursively copy `src` into `dst`, creating `dst` if needed.
///
/// Symlinks are recreated as symlinks on Unix and followed elsewhere.
pub fn copy_dir_all(src: &Path, dst: &Path) -> io::Result<()> {
  fs::create_dir_all(dst)?;

  for entry in WalkDir::new(src).min_depth(1).sort_by_file_name() {
    let entry = entry.map_err(io::Error::other)?;
    let relative = entry.path().strip_prefix(src).map_err(io::Error::other)?;
    let target = dst.join(relative);
    let file_type = entry.file_type();

    if file_type.is_dir() {
      fs::create_dir_all(&target)?;
    } else if file_type.is_symlink() {
      copy_symlink(entry.path(), &target)?;
    } else {
      if let Some(parent) = target.parent() {
        fs::create_dir_all(parent)?;
      }
      fs::copy(entry.path(), &target)?;
    }
  }

  Ok(())
}

#[cfg(unix)]
fn copy_symlink(src: &Path, dst: &Path) -> io::Result<()> {
  let link = fs::read_link(src)?;
  std::os::unix::fs::symlink(link, dst)
}

#[cfg(not(unix))]
fn copy_symlink(src: &Path, dst: &Path) -> io::Result<()> {
  if src.is_dir() {
    copy_dir_all(src, dst)
  } else {
    fs::copy(src, dst).map(|_| ())
  }
}

/// Whether `dir` contains at least one non-directory entry at any depth.
pub fn contains_files(dir: &Path) -> bool {
  WalkDir::new(dir)
    .min_depth(1)
    .into_iter()
    .filter_map(Result::ok)
    .any(|e| !e.file_type().is_dir())
}

/// Locate a file by exact name anywhere below `dir`, returning its full path.
///
/// Entries are visited in file-name order so the result is stable.
pub fn find_file(dir: &Path, file_name: &str) -> Option<PathBuf> {
  WalkDir::new(dir)
    .sort_by_file_name()
    .into_iter()
    .filter_map(Result::ok)
    .find(|e| e.file_type().is_file() && e.file_name() == file_name)
    .map(|e| e.into_path())
}

/// Every directory named `dir_name` below `dir`.
pub fn find_dirs(dir: &Path, dir_name: &str) -> Vec<PathBuf> {
  WalkDir::new(dir)
    .min_depth(1)
    .sort_by_file_name()
    .into_iter()
    .filter_map(Result::ok)
    .filter(|e| e.file_type().is_dir() && e.file_name() == dir_name)
    .map(|e| e.into_path())
    .collect()
}

/// Remove a directory tree, treating an already-missing directory as success.
pub fn remove_dir_if_exists(dir: &Path) -> io::Result<()> {
  match fs::remove_dir_all(dir) {
    Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
    other => other,
  }
}
