//! External process execution.
//!
//! Every tool and build system the tasks drive goes through [`run`]. The child sees the
//! caller's [`Environment`] with the invocation's overlay applied on top, never a bare
//! environment. Output is forwarded to the log line by line while the child runs and
//! collected for the caller.

use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::env::Environment;

/// How long a child may run before it is killed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Timeout {
  Bounded(Duration),
  /// Native builds can legitimately take hours.
  Unbounded,
}

/// A fully described external invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
  pub program: PathBuf,
  pub args: Vec<String>,
  pub cwd: PathBuf,
  /// Variables applied over the inherited environment.
  pub env: Environment,
  pub timeout: Timeout,
}

impl Invocation {
  /// A new invocation of `program` in `cwd` with no arguments and no timeout.
  pub fn new(program: impl Into<PathBuf>, cwd: impl Into<PathBuf>) -> Self {
    Self {
      program: program.into(),
      args: Vec::new(),
      cwd: cwd.into(),
      env: Environment::default(),
      timeout: Timeout::Unbounded,
    }
  }

  pub fn arg(mut self, arg: impl Into<String>) -> Self {
    self.args.push(arg.into());
    self
  }

  pub fn args<I, S>(mut self, args: I) -> Self
  where
    I: IntoIterator<Item = S>,
    S: Into<String>,
  {
    self.args.extend(args.into_iter().map(Into::into));
    self
  }

  pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
    self.env.set(key, value);
    self
  }

  /// Replace the overlay wholesale, e.g. with a captured compiler environment.
  pub fn overlay(mut self, env: Environment) -> Self {
    self.env = env;
    self
  }

  pub fn timeout(mut self, timeout: Timeout) -> Self {
    self.timeout = timeout;
    self
  }

  pub fn program_name(&self) -> String {
    self
      .program
      .file_name()
      .map(|n| n.to_string_lossy().into_owned())
      .unwrap_or_else(|| self.program.display().to_string())
  }
}

impl fmt::Display for Invocation {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}", self.program.display())?;
    for arg in &self.args {
      if arg.is_empty() || arg.contains(char::is_whitespace) {
        write!(f, " \"{arg}\"")?;
      } else {
        write!(f, " {arg}")?;
      }
    }
    Ok(())
  }
}

/// Captured result of a finished process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessOutput {
  pub program: String,
  /// Exit code; `-1` when the process was terminated without one.
  pub code: i32,
  pub stdout: String,
  pub stderr: String,
}

impl ProcessOutput {
  pub fn success(&self) -> bool {
    self.code == 0
  }

  /// Convert a non-zero exit into an error.
  pub fn check(self) -> Result<Self, ProcessError> {
    if self.success() {
      Ok(self)
    } else {
      Err(ProcessError::NonZeroExit {
        program: self.program,
        code: self.code,
      })
    }
  }
}

#[derive(Debug, Error)]
pub enum ProcessError {
  #[error("failed to start {program} in {cwd}: {source}")]
  Spawn {
    program: String,
    cwd: PathBuf,
    #[source]
    source: std::io::Error,
  },

  #[error("failed while waiting for {program}: {source}")]
  Wait {
    program: String,
    #[source]
    source: io::Error,
  },

  #[error("{program} did not finish within {}s and was killed", .after.as_secs())]
  TimedOut { program: String, after: Duration },

  #[error("{program} exited with code {code}")]
  NonZeroExit { program: String, code: i32 },
}

/// Run an invocation to completion.
///
/// A non-zero exit is not an error here; use [`ProcessOutput::check`] for that. A
/// bounded timeout that expires kills the child and returns [`ProcessError::TimedOut`].
/// Unbounded invocations are long builds, so their output is logged at info level
/// to show progress; everything else logs at debug.
pub async fn run(invocation: &Invocation, inherited: &Environment) -> Result<ProcessOutput, ProcessError> {
  let program = invocation.program_name();
  let env = inherited.merged(&invocation.env);

  let mut command = Command::new(&invocation.program);
  command
    .args(&invocation.args)
    .current_dir(&invocation.cwd)
    .env_clear()
    .envs(env.iter())
    .stdin(Stdio::null())
    .stdout(Stdio::piped())
    .stderr(Stdio::piped())
    .kill_on_drop(true);

  info!(cmd = %invocation, "running");
  debug!(cwd = %invocation.cwd.display(), timeout = ?invocation.timeout, "spawning process");

  let mut child = command.spawn().map_err(|source| ProcessError::Spawn {
    program: program.clone(),
    cwd: invocation.cwd.clone(),
    source,
  })?;

  let progress = invocation.timeout == Timeout::Unbounded;
  let stdout = child.stdout.take();
  let stderr = child.stderr.take();
  let finished = async {
    let (stdout, stderr, status) = tokio::join!(
      forward_lines(stdout, &program, "stdout", progress),
      forward_lines(stderr, &program, "stderr", progress),
      child.wait(),
    );
    Ok::<_, io::Error>((stdout?, stderr?, status?))
  };

  let waited = match invocation.timeout {
    Timeout::Unbounded => finished.await,
    Timeout::Bounded(limit) => match tokio::time::timeout(limit, finished).await {
      Ok(result) => result,
      Err(_) => {
        warn!(program = %program, after = ?limit, "process timed out, killed");
        return Err(ProcessError::TimedOut {
          program: program.clone(),
          after: limit,
        });
      }
    },
  };
  let (stdout, stderr, status) = waited.map_err(|source| ProcessError::Wait {
    program: program.clone(),
    source,
  })?;

  let result = ProcessOutput {
    program,
    code: status.code().unwrap_or(-1),
    stdout,
    stderr,
  };
  if !result.success() {
    warn!(program = %result.program, code = result.code, "process failed");
  }
  Ok(result)
}

/// Run and require a zero exit code.
pub async fn run_checked(invocation: &Invocation, inherited: &Environment) -> Result<ProcessOutput, ProcessError> {
  run(invocation, inherited).await?.check()
}

/// Log every line of `reader` as it arrives and return everything read.
async fn forward_lines<R: AsyncRead + Unpin>(
  reader: Option<R>,
  program: &str,
  stream: &'static str,
  progress: bool,
) -> io::Result<String> {
  let mut collected = String::new();
  let Some(reader) = reader else {
    return Ok(collected);
  };

  let mut reader = BufReader::new(reader);
  let mut buf = Vec::new();
  loop {
    buf.clear();
    if reader.read_until(b'\n', &mut buf).await? == 0 {
      break;
    }
    // Build tools do not always emit UTF-8 (MSVC uses the console code page).
    let line = String::from_utf8_lossy(&buf);
    let trimmed = line.trim_end_matches(['\r', '\n']);
    if progress {
      info!(program, stream, "{trimmed}");
    } else {
      debug!(program, stream, "{trimmed}");
    }
    collected.push_str(&line);
  }
  Ok(collected)
}

/// Resolve `program` relative to `dir` when it names a file there, otherwise leave it
/// for the OS to look up.
pub fn program_in(dir: &Path, program: &str) -> PathBuf {
  let candidate = dir.join(program);
  if candidate.is_file() { candidate } else { PathBuf::from(program) }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::util::testutil::{echo_env, shell};
  use tempfile::TempDir;
  use tracing_test::traced_test;

  #[tokio::test]
  async fn captures_stdout_and_exit_code() {
    let temp = TempDir::new().unwrap();
    let inv = shell("echo hello", temp.path());

    let output = run(&inv, &Environment::from_process()).await.unwrap();
    assert!(output.success());
    assert_eq!(output.stdout.trim(), "hello");
  }

  #[tokio::test]
  async fn non_zero_exit_is_reported_not_raised() {
    let temp = TempDir::new().unwrap();
    let inv = shell("exit 3", temp.path());

    let output = run(&inv, &Environment::from_process()).await.unwrap();
    assert_eq!(output.code, 3);
    assert!(matches!(output.check(), Err(ProcessError::NonZeroExit { code: 3, .. })));
  }

  #[tokio::test]
  async fn overlay_merges_over_inherited_environment() {
    let temp = TempDir::new().unwrap();
    let inherited = Environment::from_process().merged(&Environment::from_vars([("DEPBOT_INHERITED", "base")]));

    let inv = echo_env("DEPBOT_INHERITED", temp.path());
    let output = run_checked(&inv, &inherited).await.unwrap();
    assert_eq!(output.stdout.trim(), "base");

    let inv = echo_env("DEPBOT_INHERITED", temp.path()).env("DEPBOT_INHERITED", "overlay");
    let output = run_checked(&inv, &inherited).await.unwrap();
    assert_eq!(output.stdout.trim(), "overlay");
  }

  #[tokio::test]
  async fn runs_in_working_directory() {
    let temp = TempDir::new().unwrap();
    std::fs::write(temp.path().join("marker.txt"), "").unwrap();

    #[cfg(unix)]
    let inv = shell("ls", temp.path());
    #[cfg(windows)]
    let inv = shell("dir /b", temp.path());

    let output = run_checked(&inv, &Environment::from_process()).await.unwrap();
    assert!(output.stdout.contains("marker.txt"));
  }

  #[cfg(unix)]
  #[tokio::test]
  async fn bounded_timeout_kills_child() {
    let temp = TempDir::new().unwrap();
    let inv = shell("sleep 5", temp.path()).timeout(Timeout::Bounded(Duration::from_millis(200)));

    let started = std::time::Instant::now();
    let err = run(&inv, &Environment::from_process()).await.unwrap_err();
    assert!(matches!(err, ProcessError::TimedOut { .. }));
    assert!(started.elapsed() < Duration::from_secs(4));
  }

  #[tokio::test]
  #[traced_test]
  async fn long_running_output_is_logged_as_it_arrives() {
    let temp = TempDir::new().unwrap();
    let inv = shell("echo compiling-unit-one && echo compiling-unit-two 1>&2", temp.path());

    let output = run_checked(&inv, &Environment::from_process()).await.unwrap();

    assert!(output.stdout.contains("compiling-unit-one"));
    assert!(output.stderr.contains("compiling-unit-two"));
    assert!(logs_contain("compiling-unit-one"));
    assert!(logs_contain("compiling-unit-two"));
  }

  #[cfg(unix)]
  #[tokio::test]
  #[traced_test]
  async fn output_before_a_timeout_reaches_the_log() {
    let temp = TempDir::new().unwrap();
    let inv = shell("echo configure-started; sleep 5", temp.path()).timeout(Timeout::Bounded(Duration::from_millis(500)));

    let err = run(&inv, &Environment::from_process()).await.unwrap_err();
    assert!(matches!(err, ProcessError::TimedOut { .. }));
    assert!(logs_contain("configure-started"));
  }

  #[tokio::test]
  async fn missing_program_is_spawn_error() {
    let temp = TempDir::new().unwrap();
    let inv = Invocation::new("definitely-not-a-real-program-xyz", temp.path());

    let err = run(&inv, &Environment::from_process()).await.unwrap_err();
    assert!(matches!(err, ProcessError::Spawn { .. }));
  }

  #[test]
  fn display_quotes_arguments_with_spaces() {
    let inv = Invocation::new("b2", "/tmp").args(["stage", "--stagedir=stage/msvc/Release x64"]);
    assert_eq!(inv.to_string(), "b2 stage \"--stagedir=stage/msvc/Release x64\"");
  }
}
