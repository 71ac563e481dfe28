//! Native compiler toolchains.
//!
//! On Windows the MSVC environment is captured by running `vcvarsall.bat` for the
//! target architecture and reading back the resulting variables. The GNU toolchain
//! needs no setup and uses the inherited environment as is.

use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{debug, info};

use crate::config::Settings;
use crate::env::Environment;
use crate::platform::os::Os;
use crate::process::{self, Invocation, ProcessError, Timeout};
use crate::target::Architecture;

/// Common-tools variables of supported Visual Studio versions, newest first.
const VS_COMNTOOLS_VARS: &[&str] = &["VS140COMNTOOLS", "VS120COMNTOOLS", "VS110COMNTOOLS"];

#[derive(Debug, Error)]
pub enum ToolchainError {
  #[error("{0}")]
  NotFound(String),

  #[error("failed to capture the compiler environment: {0}")]
  Capture(#[from] ProcessError),

  #[error("{script} produced no environment for {arch}")]
  EmptyEnvironment { script: PathBuf, arch: Architecture },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Toolchain {
  Msvc { vcvarsall: PathBuf },
  Gnu,
}

impl Toolchain {
  /// Find the toolchain to build with on `os`.
  pub fn detect(os: Os, env: &Environment, settings: &Settings) -> Result<Self, ToolchainError> {
    match os {
      Os::Windows => {
        if let Some(path) = &settings.vcvarsall {
          return if path.is_file() {
            Ok(Self::Msvc { vcvarsall: path.clone() })
          } else {
            Err(ToolchainError::NotFound(format!(
              "configured vcvarsall {} does not exist",
              path.display()
            )))
          };
        }
        find_vcvarsall(env)
          .map(|vcvarsall| Self::Msvc { vcvarsall })
          .ok_or_else(|| ToolchainError::NotFound("Could not detect a compatible installation of MSVC.".to_string()))
      }
      Os::Linux => Ok(Self::Gnu),
      Os::MacOs => Err(ToolchainError::NotFound(
        "no supported native toolchain on macos".to_string(),
      )),
    }
  }

  /// Name of the directory staged output is placed under.
  pub fn stage_dir_name(&self) -> &'static str {
    match self {
      Self::Msvc { .. } => "msvc",
      Self::Gnu => "gnu",
    }
  }

  /// Toolset name as b2 understands it.
  pub fn b2_toolset(&self) -> &'static str {
    match self {
      Self::Msvc { .. } => "msvc",
      Self::Gnu => "gcc",
    }
  }

  /// Environment to build `arch` with.
  pub async fn environment(
    &self,
    arch: Architecture,
    inherited: &Environment,
    timeout: Timeout,
  ) -> Result<Environment, ToolchainError> {
    match self {
      Self::Gnu => Ok(inherited.clone()),
      Self::Msvc { vcvarsall } => capture_vcvars(vcvarsall, arch, inherited, timeout).await,
    }
  }
}

/// All staging directory names any toolchain may create.
pub const STAGE_DIR_NAMES: &[&str] = &["msvc", "gnu"];

fn find_vcvarsall(env: &Environment) -> Option<PathBuf> {
  VS_COMNTOOLS_VARS.iter().find_map(|var| {
    let tools = PathBuf::from(env.get(var)?);
    let candidate = tools.join("..").join("..").join("VC").join("vcvarsall.bat");
    debug!(var, candidate = %candidate.display(), "probing for vcvarsall");
    candidate.is_file().then_some(candidate)
  })
}

fn vcvars_arch(arch: Architecture) -> &'static str {
  if arch == Architecture::X64 { "amd64" } else { "x86" }
}

async fn capture_vcvars(
  vcvarsall: &Path,
  arch: Architecture,
  inherited: &Environment,
  timeout: Timeout,
) -> Result<Environment, ToolchainError> {
  info!(script = %vcvarsall.display(), arch = %arch, "capturing compiler environment");

  let cwd = vcvarsall.parent().unwrap_or(Path::new("."));
  let script = format!("\"{}\" {} && set", vcvarsall.display(), vcvars_arch(arch));
  let invocation = Invocation::new("cmd.exe", cwd).args(["/C", script.as_str()]).timeout(timeout);

  let output = process::run_checked(&invocation, inherited).await?;
  let env = parse_set_output(&output.stdout);
  if env.is_empty() {
    return Err(ToolchainError::EmptyEnvironment {
      script: vcvarsall.to_path_buf(),
      arch,
    });
  }
  Ok(env)
}

/// Parse the `KEY=VALUE` lines printed by `set`.
pub fn parse_set_output(output: &str) -> Environment {
  Environment::from_vars(output.lines().filter_map(|line| {
    let (key, value) = line.trim_end_matches('\r').split_once('=')?;
    (!key.is_empty() && !key.contains(char::is_whitespace)).then(|| (key.to_string(), value.to_string()))
  }))
}

#[cfg(test)]
mod tests {
  use super::*;
  use tempfile::TempDir;

  #[test]
  fn parses_set_output() {
    let output = "**********\r\nINCLUDE=C:\\VC\\include;C:\\SDK\\include\r\nPath=C:\\VC\\bin;C:\\Windows\r\nnot a var\r\n=C:=C:\\\r\n";
    let env = parse_set_output(output);

    assert_eq!(env.get("INCLUDE"), Some("C:\\VC\\include;C:\\SDK\\include"));
    assert_eq!(env.get("Path"), Some("C:\\VC\\bin;C:\\Windows"));
    assert_eq!(env.len(), 2);
  }

  #[test]
  fn linux_uses_gnu() {
    let toolchain = Toolchain::detect(Os::Linux, &Environment::default(), &Settings::default()).unwrap();
    assert_eq!(toolchain, Toolchain::Gnu);
    assert_eq!(toolchain.stage_dir_name(), "gnu");
    assert_eq!(toolchain.b2_toolset(), "gcc");
  }

  #[test]
  fn msvc_missing_is_not_found() {
    let err = Toolchain::detect(Os::Windows, &Environment::default(), &Settings::default()).unwrap_err();
    assert!(matches!(err, ToolchainError::NotFound(_)));
  }

  #[test]
  fn msvc_found_through_comntools() {
    let temp = TempDir::new().unwrap();
    let tools = temp.path().join("Common7").join("Tools");
    std::fs::create_dir_all(&tools).unwrap();
    std::fs::create_dir_all(temp.path().join("VC")).unwrap();
    std::fs::write(temp.path().join("VC").join("vcvarsall.bat"), "").unwrap();
    let env = Environment::from_vars([("VS140COMNTOOLS", tools.to_string_lossy().into_owned())]);

    let toolchain = Toolchain::detect(Os::Windows, &env, &Settings::default()).unwrap();
    assert!(matches!(toolchain, Toolchain::Msvc { .. }));
    assert_eq!(toolchain.stage_dir_name(), "msvc");
  }

  #[tokio::test]
  async fn gnu_environment_is_inherited() {
    let inherited = Environment::from_vars([("CC", "gcc")]);
    let env = Toolchain::Gnu
      .environment(Architecture::X86, &inherited, Timeout::Unbounded)
      .await
      .unwrap();
    assert_eq!(env, inherited);
  }
}
