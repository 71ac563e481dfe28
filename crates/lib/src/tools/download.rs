//! HTTP download of tool archives into the cache.

use std::path::{Path, PathBuf};

use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

use super::ToolError;

/// Download `url` to `dest`.
///
/// The body is streamed to `<dest>.part` and renamed into place once complete, so an
/// interrupted transfer never leaves a truncated file at the cache path.
pub async fn download(client: &reqwest::Client, url: &str, dest: &Path) -> Result<(), ToolError> {
  info!(url = %url, dest = %dest.display(), "downloading");

  if let Some(parent) = dest.parent() {
    fs::create_dir_all(parent).await?;
  }

  let failed = |message: String| ToolError::Download {
    url: url.to_string(),
    message,
  };

  let mut response = client.get(url).send().await.map_err(|e| failed(e.to_string()))?;
  if !response.status().is_success() {
    return Err(failed(format!("HTTP {}", response.status())));
  }

  let part = part_path(dest);
  let mut file = fs::File::create(&part).await?;
  let mut written: u64 = 0;

  loop {
    let chunk = match response.chunk().await {
      Ok(Some(chunk)) => chunk,
      Ok(None) => break,
      Err(e) => {
        drop(file);
        let _ = fs::remove_file(&part).await;
        return Err(failed(e.to_string()));
      }
    };
    file.write_all(&chunk).await?;
    written += chunk.len() as u64;
  }

  file.flush().await?;
  drop(file);
  fs::rename(&part, dest).await?;

  debug!(bytes = written, path = %dest.display(), "download complete");
  Ok(())
}

fn part_path(dest: &Path) -> PathBuf {
  let mut name = dest.file_name().map(|n| n.to_os_string()).unwrap_or_default();
  name.push(".part");
  dest.with_file_name(name)
}

#[cfg(test)]
mod tests {
  use super::*;
  use tempfile::TempDir;

  #[test]
  fn part_path_appends_suffix() {
    assert_eq!(
      part_path(Path::new("/tools/PortableGit.zip")),
      PathBuf::from("/tools/PortableGit.zip.part")
    );
  }

  #[tokio::test]
  async fn writes_body_to_destination() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
      .mock("GET", "/nasm.zip")
      .with_status(200)
      .with_body("payload")
      .create_async()
      .await;

    let temp = TempDir::new().unwrap();
    let dest = temp.path().join("cache").join("nasm.zip");
    download(&reqwest::Client::new(), &format!("{}/nasm.zip", server.url()), &dest)
      .await
      .unwrap();

    mock.assert_async().await;
    assert_eq!(std::fs::read_to_string(&dest).unwrap(), "payload");
    assert!(!part_path(&dest).exists());
  }

  #[tokio::test]
  async fn http_error_is_download_failure() {
    let mut server = mockito::Server::new_async().await;
    let _mock = server.mock("GET", "/missing.zip").with_status(404).create_async().await;

    let temp = TempDir::new().unwrap();
    let dest = temp.path().join("missing.zip");
    let err = download(&reqwest::Client::new(), &format!("{}/missing.zip", server.url()), &dest)
      .await
      .unwrap_err();

    assert!(matches!(err, ToolError::Download { .. }));
    assert!(!dest.exists());
  }
}
