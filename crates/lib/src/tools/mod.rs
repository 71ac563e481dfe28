//! Tool acquisition with verified downloads.
//!
//! [`ToolCache::acquire`] resolves a tool to the directory holding its executable:
//!
//! 1. Search every directory named by a search-path-style environment variable.
//! 2. Otherwise make sure the pinned archive is in the cache and matches its digest,
//!    downloading it when missing or when the cached copy fails verification.
//! 3. Reuse a previous extraction if the executable is already there and the archive
//!    was not downloaded again, else extract into a fresh directory.
//!
//! A freshly downloaded archive that fails verification is deleted and reported as
//! [`ToolError::Integrity`]. Nothing extracted from an unverified or replaced archive
//! is returned.

pub mod archive;
pub mod catalog;
pub mod download;

use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::env::Environment;
use crate::lock::{FileLock, LockError};
use crate::platform::Platform;
use crate::platform::os::Os;
use crate::target::Architecture;
use crate::util::fs::{find_file, remove_dir_if_exists};
use crate::util::hash::{Checksum, hash_file};

use archive::ArchiveError;

/// A pinned archive for one OS and a set of host architectures.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Download {
  pub os: Os,
  /// Host architectures this archive runs on.
  pub arch: Architecture,
  pub url: String,
  pub checksum: Checksum,
}

impl Download {
  pub fn windows(arch: Architecture, url: impl Into<String>, checksum: Checksum) -> Self {
    Self {
      os: Os::Windows,
      arch,
      url: url.into(),
      checksum,
    }
  }
}

/// Everything needed to find or fetch one external tool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolDescriptor {
  pub name: String,
  /// Executable base name; the platform suffix is added at lookup.
  pub executable: String,
  pub downloads: Vec<Download>,
  /// File name of the cached archive inside the tools directory.
  pub archive_name: String,
  /// Directory name the archive is extracted into inside the tools directory.
  pub extract_dir: String,
}

impl ToolDescriptor {
  /// The archive to fetch on `platform`, if one is pinned.
  pub fn download_for(&self, platform: &Platform) -> Option<&Download> {
    let arch = platform.arch?;
    self.downloads.iter().find(|d| d.os == platform.os && d.arch.contains(arch))
  }

  /// Executable file name on `os`. Names that already carry an extension are kept.
  pub fn executable_name(&self, os: Os) -> String {
    if Path::new(&self.executable).extension().is_some() {
      self.executable.clone()
    } else {
      os.executable_name(&self.executable)
    }
  }
}

#[derive(Debug, Error)]
pub enum ToolError {
  #[error("{tool} was not found on the search path and no download is available for {platform}; install it and retry")]
  Unavailable { tool: String, platform: String },

  #[error("failed to download {url}: {message}")]
  Download { url: String, message: String },

  #[error("downloaded {tool} archive from {url} failed verification: expected {expected}, got {actual}")]
  Integrity {
    tool: String,
    url: String,
    expected: String,
    actual: String,
  },

  #[error("{executable} was not found in the {tool} package extracted to {dir}")]
  NotInPackage {
    tool: String,
    executable: String,
    dir: PathBuf,
  },

  #[error("failed to extract {tool}: {source}")]
  Extract {
    tool: String,
    #[source]
    source: ArchiveError,
  },

  #[error(transparent)]
  Lock(#[from] LockError),

  #[error(transparent)]
  Io(#[from] io::Error),
}

impl ToolError {
  /// Integrity failures and unexpected I/O end the session.
  pub fn is_fatal(&self) -> bool {
    matches!(self, Self::Integrity { .. } | Self::Io(_))
  }
}

/// A verified archive in the tools directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedArchive {
  pub path: PathBuf,
  /// Whether this call fetched the archive. Anything extracted earlier came from a
  /// different file and must not be reused.
  pub downloaded: bool,
}

/// The tools directory together with what is needed to populate it.
#[derive(Debug, Clone)]
pub struct ToolCache {
  tools_dir: PathBuf,
  platform: Platform,
  env: Environment,
  client: reqwest::Client,
}

impl ToolCache {
  pub fn new(tools_dir: impl Into<PathBuf>, platform: Platform, env: Environment) -> Self {
    Self {
      tools_dir: tools_dir.into(),
      platform,
      env,
      client: reqwest::Client::new(),
    }
  }

  pub fn archive_path(&self, tool: &ToolDescriptor) -> PathBuf {
    self.tools_dir.join(&tool.archive_name)
  }

  pub fn extract_path(&self, tool: &ToolDescriptor) -> PathBuf {
    self.tools_dir.join(&tool.extract_dir)
  }

  /// Resolve `tool` to the directory that directly contains its executable.
  pub async fn acquire(&self, tool: &ToolDescriptor) -> Result<PathBuf, ToolError> {
    let executable = tool.executable_name(self.platform.os);

    if let Some(dir) = self.env.find_in_search_dirs(&executable) {
      debug!(tool = %tool.name, dir = %dir.display(), "found on search path");
      return Ok(dir);
    }

    let _lock = self.lock(tool)?;
    let archive = self.ensure_archive(tool).await?;
    let extract_dir = self.extract_path(tool);

    if archive.downloaded {
      remove_dir_if_exists(&extract_dir)?;
    } else if let Some(dir) = locate(&extract_dir, &executable) {
      debug!(tool = %tool.name, dir = %dir.display(), "using previous extraction");
      return Ok(dir);
    }

    info!(tool = %tool.name, dest = %extract_dir.display(), "extracting");
    archive::extract(&archive.path, &extract_dir).map_err(|source| ToolError::Extract {
      tool: tool.name.clone(),
      source,
    })?;

    locate(&extract_dir, &executable).ok_or_else(|| ToolError::NotInPackage {
      tool: tool.name.clone(),
      executable,
      dir: extract_dir,
    })
  }

  /// Make sure the verified archive for `tool` is in the cache.
  ///
  /// Callers that extract the archive must hold [`ToolCache::lock`].
  pub async fn ensure_archive(&self, tool: &ToolDescriptor) -> Result<CachedArchive, ToolError> {
    let download = tool.download_for(&self.platform).ok_or_else(|| ToolError::Unavailable {
      tool: tool.name.clone(),
      platform: self.platform.to_string(),
    })?;
    let archive = self.archive_path(tool);

    if archive.is_file() {
      let actual = hash_file(download.checksum.algorithm, &archive)?;
      if download.checksum.matches(&actual) {
        debug!(tool = %tool.name, path = %archive.display(), "cached archive verified");
        return Ok(CachedArchive {
          path: archive,
          downloaded: false,
        });
      }
      warn!(
        tool = %tool.name,
        expected = %download.checksum,
        actual = %actual,
        "cached archive failed verification, downloading again"
      );
    }

    download::download(&self.client, &download.url, &archive).await?;

    let actual = hash_file(download.checksum.algorithm, &archive)?;
    if !download.checksum.matches(&actual) {
      std::fs::remove_file(&archive)?;
      return Err(ToolError::Integrity {
        tool: tool.name.clone(),
        url: download.url.clone(),
        expected: download.checksum.to_string(),
        actual: format!("{}:{actual}", download.checksum.algorithm),
      });
    }

    info!(tool = %tool.name, checksum = %download.checksum, "archive verified");
    Ok(CachedArchive {
      path: archive,
      downloaded: true,
    })
  }

  /// Exclusive lock serializing acquisition of `tool` across sessions.
  pub fn lock(&self, tool: &ToolDescriptor) -> Result<FileLock, LockError> {
    let path = self.tools_dir.join(format!(".{}.lock", tool.name));
    FileLock::acquire(&path, &format!("acquire {}", tool.name))
  }
}

/// Directory directly containing `executable` anywhere below `dir`.
pub fn locate(dir: &Path, executable: &str) -> Option<PathBuf> {
  if !dir.is_dir() {
    return None;
  }
  find_file(dir, executable).and_then(|p| p.parent().map(Path::to_path_buf))
}
