//! Session settings.
//!
//! Settings come from, in increasing precedence: built-in defaults, an optional
//! `depbot.toml` at the workspace root, `DEPBOT_*` environment variables, and finally
//! whatever the caller overrides on the returned [`Settings`].

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

use crate::consts::{CONFIG_FILE_NAME, DEFAULT_DEPS_DIR, DEFAULT_TOOL_TIMEOUT_SECS, DEFAULT_TOOLS_DIR};
use crate::env::Environment;

pub const ENV_DEPS_DIR: &str = "DEPBOT_DEPS_DIR";
pub const ENV_TOOLS_DIR: &str = "DEPBOT_TOOLS_DIR";
pub const ENV_JOBS: &str = "DEPBOT_JOBS";
pub const ENV_VCVARSALL: &str = "DEPBOT_VCVARSALL";
pub const ENV_TOOL_TIMEOUT: &str = "DEPBOT_TOOL_TIMEOUT_SECS";

#[derive(Debug, Error)]
pub enum ConfigError {
  #[error("failed to read {path}: {source}")]
  Read {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },
  #[error("invalid configuration in {path}: {source}")]
  Parse {
    path: PathBuf,
    #[source]
    source: toml::de::Error,
  },
  #[error("invalid value '{value}' for {var}: expected a positive integer")]
  InvalidNumber { var: &'static str, value: String },
}

/// On-disk representation of `depbot.toml`.
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct FileSettings {
  deps_dir: Option<PathBuf>,
  tools_dir: Option<PathBuf>,
  jobs: Option<usize>,
  vcvarsall: Option<PathBuf>,
  tool_timeout_secs: Option<u64>,
}

/// Resolved settings for one session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
  /// Dependency checkouts, relative to the root unless absolute.
  pub deps_dir: PathBuf,
  /// Download cache and extracted tools, relative to the root unless absolute.
  pub tools_dir: PathBuf,
  /// Parallel jobs handed to build systems that accept `-j`.
  pub jobs: usize,
  /// Explicit path to `vcvarsall.bat`, skipping detection.
  pub vcvarsall: Option<PathBuf>,
  /// Bound applied to short tool invocations.
  pub tool_timeout: Duration,
}

impl Default for Settings {
  fn default() -> Self {
    Self {
      deps_dir: PathBuf::from(DEFAULT_DEPS_DIR),
      tools_dir: PathBuf::from(DEFAULT_TOOLS_DIR),
      jobs: std::thread::available_parallelism().map(|n| n.get()).unwrap_or(1),
      vcvarsall: None,
      tool_timeout: Duration::from_secs(DEFAULT_TOOL_TIMEOUT_SECS),
    }
  }
}

impl Settings {
  /// Load settings for the workspace at `root`.
  pub fn load(root: &Path, env: &Environment) -> Result<Self, ConfigError> {
    let path = root.join(CONFIG_FILE_NAME);
    let mut settings = if path.is_file() {
      debug!(path = %path.display(), "loading configuration file");
      let content = std::fs::read_to_string(&path).map_err(|source| ConfigError::Read {
        path: path.clone(),
        source,
      })?;
      Self::from_toml(&content).map_err(|source| ConfigError::Parse { path, source })?
    } else {
      Self::default()
    };
    settings.apply_env(env)?;
    Ok(settings)
  }

  /// Parse settings from TOML, filling unset keys with defaults.
  pub fn from_toml(content: &str) -> Result<Self, toml::de::Error> {
    let file: FileSettings = toml::from_str(content)?;
    let defaults = Self::default();
    Ok(Self {
      deps_dir: file.deps_dir.unwrap_or(defaults.deps_dir),
      tools_dir: file.tools_dir.unwrap_or(defaults.tools_dir),
      jobs: file.jobs.filter(|j| *j > 0).unwrap_or(defaults.jobs),
      vcvarsall: file.vcvarsall,
      tool_timeout: file
        .tool_timeout_secs
        .map(Duration::from_secs)
        .unwrap_or(defaults.tool_timeout),
    })
  }

  fn apply_env(&mut self, env: &Environment) -> Result<(), ConfigError> {
    if let Some(dir) = env.get(ENV_DEPS_DIR) {
      self.deps_dir = PathBuf::from(dir);
    }
    if let Some(dir) = env.get(ENV_TOOLS_DIR) {
      self.tools_dir = PathBuf::from(dir);
    }
    if let Some(path) = env.get(ENV_VCVARSALL) {
      self.vcvarsall = Some(PathBuf::from(path));
    }
    if let Some(jobs) = env.get(ENV_JOBS) {
      self.jobs = parse_positive(ENV_JOBS, jobs)? as usize;
    }
    if let Some(secs) = env.get(ENV_TOOL_TIMEOUT) {
      self.tool_timeout = Duration::from_secs(parse_positive(ENV_TOOL_TIMEOUT, secs)?);
    }
    Ok(())
  }
}

fn parse_positive(var: &'static str, value: &str) -> Result<u64, ConfigError> {
  match value.trim().parse::<u64>() {
    Ok(n) if n > 0 => Ok(n),
    _ => Err(ConfigError::InvalidNumber {
      var,
      value: value.to_string(),
    }),
  }
}
