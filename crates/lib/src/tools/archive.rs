//! Archive extraction for downloaded tool packages.
//!
//! Entries are unpacked with their full relative path. Any entry that would land
//! outside the destination (absolute path, `..` component, or a path through a
//! symlink unpacked earlier) fails the extraction.

use std::fs::{self, File};
use std::io::{self, BufReader};
use std::path::{Component, Path, PathBuf};

use flate2::read::GzDecoder;
use tar::Archive;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum ArchiveError {
  #[error("unsupported archive format: {}", .0.display())]
  Unsupported(PathBuf),

  #[error("archive entry escapes the destination directory: {0}")]
  UnsafePath(String),

  #[error("failed to read zip archive {}: {source}", .path.display())]
  Zip {
    path: PathBuf,
    #[source]
    source: zip::result::ZipError,
  },

  #[error(transparent)]
  Io(#[from] io::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Format {
  Zip,
  Tar,
  TarGz,
}

fn detect_format(path: &Path) -> Option<Format> {
  let name = path.file_name()?.to_str()?.to_ascii_lowercase();
  if name.ends_with(".zip") {
    Some(Format::Zip)
  } else if name.ends_with(".tar.gz") || name.ends_with(".tgz") {
    Some(Format::TarGz)
  } else if name.ends_with(".tar") {
    Some(Format::Tar)
  } else {
    None
  }
}

/// Extract `archive` into `dest`, creating `dest` if needed.
pub fn extract(archive: &Path, dest: &Path) -> Result<(), ArchiveError> {
  let format = detect_format(archive).ok_or_else(|| ArchiveError::Unsupported(archive.to_path_buf()))?;
  fs::create_dir_all(dest)?;

  debug!(archive = %archive.display(), dest = %dest.display(), ?format, "extracting");
  match format {
    Format::Zip => extract_zip(archive, dest),
    Format::Tar => extract_tar(Archive::new(BufReader::new(File::open(archive)?)), dest),
    Format::TarGz => extract_tar(Archive::new(GzDecoder::new(BufReader::new(File::open(archive)?))), dest),
  }
}

/// Validate an entry path and turn it into a relative path below the destination.
fn sanitize(raw: &Path) -> Result<PathBuf, ArchiveError> {
  let mut out = PathBuf::new();
  for component in raw.components() {
    match component {
      Component::Normal(part) => out.push(part),
      Component::CurDir => {}
      Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
        return Err(ArchiveError::UnsafePath(raw.display().to_string()));
      }
    }
  }
  Ok(out)
}

fn extract_tar<R: io::Read>(mut archive: Archive<R>, dest: &Path) -> Result<(), ArchiveError> {
  for entry in archive.entries()? {
    let mut entry = entry?;
    let relative = sanitize(&entry.path()?)?;
    if relative.as_os_str().is_empty() {
      continue;
    }

    if !entry.unpack_in(dest)? {
      return Err(ArchiveError::UnsafePath(relative.display().to_string()));
    }
  }
  Ok(())
}

fn extract_zip(archive_path: &Path, dest: &Path) -> Result<(), ArchiveError> {
  let zip_error = |source| ArchiveError::Zip {
    path: archive_path.to_path_buf(),
    source,
  };

  let file = File::open(archive_path)?;
  let mut archive = zip::ZipArchive::new(BufReader::new(file)).map_err(zip_error)?;

  for i in 0..archive.len() {
    let mut file = archive.by_index(i).map_err(zip_error)?;
    let relative = match file.enclosed_name() {
      Some(name) => sanitize(&name)?,
      None => return Err(ArchiveError::UnsafePath(file.name().to_string())),
    };
    if relative.as_os_str().is_empty() {
      continue;
    }

    let dest_path = dest.join(&relative);
    if file.is_dir() {
      fs::create_dir_all(&dest_path)?;
      continue;
    }

    if let Some(parent) = dest_path.parent() {
      fs::create_dir_all(parent)?;
    }
    let mut outfile = File::create(&dest_path)?;
    io::copy(&mut file, &mut outfile)?;

    #[cfg(unix)]
    {
      use std::os::unix::fs::PermissionsExt;
      if let Some(mode) = file.unix_mode() {
        fs::set_permissions(&dest_path, fs::Permissions::from_mode(mode))?;
      }
    }
  }

  Ok(())
}
