//! Streaming file hashes used to verify downloaded archives.

use std::fmt;
use std::fs::File;
use std::io::{self, Read};
use std::path::Path;

use sha2::{Digest, Sha256};

/// Digest algorithms accepted for published artifacts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HashAlgorithm {
  Sha1,
  Sha256,
}

impl HashAlgorithm {
  pub fn as_str(&self) -> &'static str {
    match self {
      Self::Sha1 => "sha1",
      Self::Sha256 => "sha256",
    }
  }
}

impl fmt::Display for HashAlgorithm {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

/// An expected digest as published alongside a download.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Checksum {
  pub algorithm: HashAlgorithm,
  /// Hex digest. Publishers disagree on case, so comparisons ignore it.
  pub hex: String,
}

impl Checksum {
  pub fn sha1(hex: impl Into<String>) -> Self {
    Self {
      algorithm: HashAlgorithm::Sha1,
      hex: hex.into(),
    }
  }

  pub fn sha256(hex: impl Into<String>) -> Self {
    Self {
      algorithm: HashAlgorithm::Sha256,
      hex: hex.into(),
    }
  }

  /// Whether `actual` (lowercase hex, as produced by [`hash_file`]) matches.
  pub fn matches(&self, actual: &str) -> bool {
    self.hex.eq_ignore_ascii_case(actual)
  }
}

impl fmt::Display for Checksum {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}:{}", self.algorithm, self.hex.to_ascii_lowercase())
  }
}

enum Hasher {
  Sha1(sha1_smol::Sha1),
  Sha256(Sha256),
}

impl Hasher {
  fn new(algorithm: HashAlgorithm) -> Self {
    match algorithm {
      HashAlgorithm::Sha1 => Self::Sha1(sha1_smol::Sha1::new()),
      HashAlgorithm::Sha256 => Self::Sha256(Sha256::new()),
    }
  }

  fn update(&mut self, data: &[u8]) {
    match self {
      Self::Sha1(h) => h.update(data),
      Self::Sha256(h) => h.update(data),
    }
  }

  fn finish(self) -> String {
    match self {
      Self::Sha1(h) => h.digest().to_string(),
      Self::Sha256(h) => hex::encode(h.finalize()),
    }
  }
}

/// Hash arbitrary bytes, returning lowercase hex.
pub fn hash_bytes(algorithm: HashAlgorithm, data: &[u8]) -> String {
  let mut hasher = Hasher::new(algorithm);
  hasher.update(data);
  hasher.finish()
}

/// Hash a file without loading it into memory, returning lowercase hex.
pub fn hash_file(algorithm: HashAlgorithm, path: &Path) -> io::Result<String> {
  let mut file = File::open(path)?;
  let mut hasher = Hasher::new(algorithm);
  let mut buffer = [0u8; 8192];

  loop {
    let n = file.read(&mut buffer)?;
    if n == 0 {
      break;
    }
    hasher.update(&buffer[..n]);
  }

  Ok(hasher.finish())
}

#[cfg(test)]
mod tests {
  use super::*;
  use tempfile::tempdir;

  const HELLO_SHA256: &str = "b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9";
  const HELLO_SHA1: &str = "2aae6c35c94fcfb415dbe95f408b9ce91ee846ed";

  #[test]
  fn known_digests() {
    assert_eq!(hash_bytes(HashAlgorithm::Sha256, b"hello world"), HELLO_SHA256);
    assert_eq!(hash_bytes(HashAlgorithm::Sha1, b"hello world"), HELLO_SHA1);
  }

  #[test]
  fn file_hash_matches_bytes_hash() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("archive.zip");
    // Larger than one read buffer so the streaming path is exercised.
    let data = vec![7u8; 20_000];
    std::fs::write(&path, &data).unwrap();

    for algorithm in [HashAlgorithm::Sha1, HashAlgorithm::Sha256] {
      assert_eq!(hash_file(algorithm, &path).unwrap(), hash_bytes(algorithm, &data));
    }
  }

  #[test]
  fn checksum_comparison_ignores_case() {
    let expected = Checksum::sha256(HELLO_SHA256.to_ascii_uppercase());
    assert!(expected.matches(HELLO_SHA256));
    assert!(!expected.matches(HELLO_SHA1));
  }

  #[test]
  fn missing_file_is_io_error() {
    let dir = tempdir().unwrap();
    assert!(hash_file(HashAlgorithm::Sha1, &dir.path().join("nope")).is_err());
  }
}
