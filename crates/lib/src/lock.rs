//! Advisory file locks.
//!
//! Two kinds of lock are taken: one on the workspace root for the length of a
//! session, and one per tool while it is being acquired so two sessions never race to
//! download or extract the same archive. Locks are non-blocking; contention is an
//! error that names the holder.

use std::fs::{File, OpenOptions};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::consts::LOCK_FORMAT_VERSION;

#[derive(Debug, Serialize, Deserialize)]
pub struct LockMetadata {
  pub version: u32,
  pub pid: u32,
  pub started_at_unix: u64,
  /// What the holder is doing, e.g. `run` or `acquire git`.
  pub purpose: String,
}

#[derive(Debug, Error)]
pub enum LockError {
  #[error(
    "{lock_path} is locked by another depbot process: {purpose} (PID {pid}, started at Unix time {started_at_unix})\n\
     If you're sure no depbot process is running, remove the lock file."
  )]
  Contention {
    purpose: String,
    pid: u32,
    started_at_unix: u64,
    lock_path: PathBuf,
  },

  #[error(
    "{lock_path} is locked (could not read lock metadata)\n\
     If you're sure no depbot process is running, remove the lock file."
  )]
  ContentionUnknown { lock_path: PathBuf },

  #[error("failed to create lock directory {path}: {source}")]
  CreateDir {
    path: PathBuf,
    #[source]
    source: io::Error,
  },

  #[error("failed to open lock file {path}: {source}")]
  OpenFile {
    path: PathBuf,
    #[source]
    source: io::Error,
  },

  #[error("failed to write lock metadata: {0}")]
  WriteMetadata(#[source] io::Error),

  #[error("failed to acquire lock: {0}")]
  LockFailed(#[source] io::Error),
}

/// An exclusive lock held until dropped.
#[derive(Debug)]
pub struct FileLock {
  file: File,
  lock_path: PathBuf,
}

impl FileLock {
  /// Take an exclusive lock on `lock_path`, creating the file and its directory.
  pub fn acquire(lock_path: &Path, purpose: &str) -> Result<Self, LockError> {
    if let Some(dir) = lock_path.parent()
      && !dir.exists()
    {
      std::fs::create_dir_all(dir).map_err(|source| LockError::CreateDir {
        path: dir.to_path_buf(),
        source,
      })?;
    }

    let file = OpenOptions::new()
      .read(true)
      .write(true)
      .create(true)
      .truncate(false)
      .open(lock_path)
      .map_err(|source| LockError::OpenFile {
        path: lock_path.to_path_buf(),
        source,
      })?;

    if let Err(err) = try_lock_exclusive(&file) {
      if err.kind() == io::ErrorKind::WouldBlock {
        return Err(read_contention_error(lock_path));
      }
      return Err(LockError::LockFailed(err));
    }

    write_metadata(&file, purpose)?;
    debug!(path = %lock_path.display(), purpose, "lock acquired");

    Ok(FileLock {
      file,
      lock_path: lock_path.to_path_buf(),
    })
  }

  pub fn lock_path(&self) -> &Path {
    &self.lock_path
  }
}

fn write_metadata(file: &File, purpose: &str) -> Result<(), LockError> {
  let metadata = LockMetadata {
    version: LOCK_FORMAT_VERSION,
    pid: std::process::id(),
    started_at_unix: SystemTime::now()
      .duration_since(UNIX_EPOCH)
      .unwrap_or_default()
      .as_secs(),
    purpose: purpose.to_string(),
  };

  file.set_len(0).map_err(LockError::WriteMetadata)?;
  let mut writer = io::BufWriter::new(file);
  serde_json::to_writer_pretty(&mut writer, &metadata).map_err(|e| LockError::WriteMetadata(io::Error::other(e)))?;
  writer.flush().map_err(LockError::WriteMetadata)?;

  Ok(())
}

fn read_contention_error(lock_path: &Path) -> LockError {
  if let Ok(mut file) = File::open(lock_path) {
    let mut contents = String::new();
    if file.read_to_string(&mut contents).is_ok()
      && let Ok(metadata) = serde_json::from_str::<LockMetadata>(&contents)
    {
      return LockError::Contention {
        purpose: metadata.purpose,
        pid: metadata.pid,
        started_at_unix: metadata.started_at_unix,
        lock_path: lock_path.to_path_buf(),
      };
    }
  }

  LockError::ContentionUnknown {
    lock_path: lock_path.to_path_buf(),
  }
}

#[cfg(unix)]
fn try_lock_exclusive(file: &File) -> io::Result<()> {
  use rustix::fs::{FlockOperation, flock};
  use std::os::unix::io::AsFd;

  flock(file.as_fd(), FlockOperation::NonBlockingLockExclusive)
    .map_err(|e| io::Error::from_raw_os_error(e.raw_os_error()))
}

#[cfg(windows)]
fn try_lock_exclusive(file: &File) -> io::Result<()> {
  use std::os::windows::io::AsRawHandle;
  use windows_sys::Win32::Foundation::{ERROR_LOCK_VIOLATION, HANDLE};
  use windows_sys::Win32::Storage::FileSystem::{LOCKFILE_EXCLUSIVE_LOCK, LOCKFILE_FAIL_IMMEDIATELY, LockFileEx};

  let handle = file.as_raw_handle() as HANDLE;

  // SAFETY: OVERLAPPED is a plain data struct that is valid when zero-initialized.
  // LockFileEx is safe to call with a valid file handle and zeroed OVERLAPPED.
  let result = unsafe {
    let mut overlapped = std::mem::zeroed();
    LockFileEx(
      handle,
      LOCKFILE_FAIL_IMMEDIATELY | LOCKFILE_EXCLUSIVE_LOCK,
      0,
      1,
      0,
      &mut overlapped,
    )
  };

  if result != 0 {
    return Ok(());
  }
  let err = io::Error::last_os_error();
  if err.raw_os_error() == Some(ERROR_LOCK_VIOLATION as i32) {
    Err(io::Error::new(io::ErrorKind::WouldBlock, err))
  } else {
    Err(err)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use tempfile::TempDir;

  #[test]
  fn acquire_creates_lock_file_and_directory() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("tools").join(".git.lock");

    let lock = FileLock::acquire(&path, "acquire git").unwrap();
    assert!(lock.lock_path().exists());
  }

  #[test]
  fn lock_metadata_written() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join(".lock");
    drop(FileLock::acquire(&path, "run").unwrap());

    let metadata: LockMetadata = serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
    assert_eq!(metadata.version, LOCK_FORMAT_VERSION);
    assert_eq!(metadata.purpose, "run");
    assert_eq!(metadata.pid, std::process::id());
  }

  #[test]
  fn second_holder_sees_contention() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join(".lock");
    let _held = FileLock::acquire(&path, "run").unwrap();

    let err = FileLock::acquire(&path, "clean").unwrap_err();
    assert!(matches!(
      err,
      LockError::Contention { .. } | LockError::ContentionUnknown { .. }
    ));
  }

  #[test]
  fn lock_released_on_drop() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join(".lock");
    {
      let _lock = FileLock::acquire(&path, "first").unwrap();
    }

    let lock = FileLock::acquire(&path, "second").unwrap();
    assert!(lock.lock_path().exists());
  }
}
