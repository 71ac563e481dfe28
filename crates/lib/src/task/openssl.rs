//! Builds OpenSSL as shared libraries for every requested architecture.
//!
//! OpenSSL configures and builds in-tree, so the checkout is first split into one
//! source tree per architecture. Only the Release configuration is compiled; its
//! staged output is copied to the Debug location as well.

use std::io;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::matrix::{MatrixBuild, Pass, execute_matrix, plan_cells};
use crate::platform::os::Os;
use crate::prepare::{PrepareOutcome, prepare_source_tree};
use crate::process::{self, Invocation, Timeout};
use crate::target::{Architecture, BuildConfiguration, Cell};
use crate::toolchain::{STAGE_DIR_NAMES, Toolchain};
use crate::tools::catalog;
use crate::util::fs::{copy_dir_all, remove_dir_if_exists};

use super::{BuildTask, TaskContext, TaskFault, TaskId, TaskResult, submodules};

pub const ID: TaskId = TaskId("54917d60-831b-480b-b63e-e3a4f3c17994");

const SOURCE_DIR: &str = "openssl";

const CONFIGURE_OPTIONS: &[&str] = &[
  "no-idea",
  "no-mdc2",
  "no-rc5",
  "no-comp",
  "no-ssl2",
  "no-ssl3",
  "no-weak-ssl-ciphers",
  "threads",
];

#[derive(Debug, Default)]
pub struct BuildOpenSsl;

/// `perl` arguments for configuring one architecture.
pub fn configure_args(toolchain: &Toolchain, arch: Architecture, install: &Path) -> Vec<String> {
  let x64 = arch == Architecture::X64;
  let target = match toolchain {
    Toolchain::Msvc { .. } if x64 => "VC-WIN64A",
    Toolchain::Msvc { .. } => "VC-WIN32",
    Toolchain::Gnu if x64 => "linux-x86_64",
    Toolchain::Gnu => "linux-elf",
  };

  let mut args = vec!["Configure".to_string(), target.to_string()];
  args.extend(CONFIGURE_OPTIONS.iter().map(|o| o.to_string()));
  if *toolchain == Toolchain::Gnu && arch == Architecture::X86 {
    args.push("-m32".to_string());
  }
  args.push(format!("--prefix={}", install.display()));
  args.push(format!("--openssldir={}", install.display()));
  args
}

/// Directory OpenSSL installs into before staging, e.g. `msvc/Releasex64`.
fn install_dir(stage_root: &Path, arch: Architecture) -> PathBuf {
  stage_root.join(format!("Release{arch}"))
}

struct OpenSslMatrix<'a> {
  ctx: &'a TaskContext,
  toolchain: &'a Toolchain,
  source: PathBuf,
  stage_root: PathBuf,
  perl: PathBuf,
  /// Extra directories appended to `PATH` for the build.
  tool_dirs: Vec<PathBuf>,
}

impl OpenSslMatrix<'_> {
  fn build_passes(&self, cell: &Cell, cwd: &Path, env: &crate::env::Environment) -> Vec<Pass> {
    let arch = cell.architecture;
    let configure = Invocation::new(&self.perl, cwd)
      .args(configure_args(self.toolchain, arch, &install_dir(&self.stage_root, arch)))
      .overlay(env.clone())
      .timeout(Timeout::Unbounded);

    let mut passes = vec![Pass::new("configure", configure)];
    match self.toolchain {
      Toolchain::Msvc { .. } => {
        let asm = if arch == Architecture::X64 {
          "ms\\do_win64a.bat"
        } else {
          "ms\\do_nasm.bat"
        };
        let script = format!("{asm} && nmake -f ms\\ntdll.mak && nmake -f ms\\ntdll.mak install");
        passes.push(Pass::new(
          "build",
          Invocation::new("cmd.exe", cwd).args(["/C", script.as_str()]).overlay(env.clone()),
        ));
      }
      Toolchain::Gnu => {
        passes.push(Pass::new(
          "build",
          Invocation::new("make", cwd)
            .arg(format!("-j{}", self.ctx.settings.jobs))
            .overlay(env.clone()),
        ));
        passes.push(Pass::new(
          "install",
          Invocation::new("make", cwd).arg("install_sw").overlay(env.clone()),
        ));
      }
    }
    passes
  }
}

impl MatrixBuild for OpenSslMatrix<'_> {
  async fn passes(&self, cell: &Cell) -> Result<Vec<Pass>, TaskFault> {
    let mut env = self
      .toolchain
      .environment(cell.architecture, &self.ctx.env, self.ctx.tool_timeout())
      .await?;
    for dir in &self.tool_dirs {
      env.append_path(dir);
    }
    let cwd = self.source.join(cell.architecture.name());
    Ok(self.build_passes(cell, &cwd, &env))
  }

  fn stage(&self, cell: &Cell) -> Result<(), TaskFault> {
    stage_release(&self.stage_root, cell.architecture)
  }
}

/// Move `Release<arch>` to `Release <arch>` and mirror it to `Debug <arch>`.
///
/// Failures here concern one architecture's output and never abort the session.
pub fn stage_release(stage_root: &Path, arch: Architecture) -> Result<(), TaskFault> {
  let installed = install_dir(stage_root, arch);
  let release = stage_root.join(Cell::new(BuildConfiguration::RELEASE, arch).staging_name());
  let debug = stage_root.join(Cell::new(BuildConfiguration::DEBUG, arch).staging_name());
  let staging = |what: &str, path: &Path| {
    let context = format!("{what} {}", path.display());
    move |e| TaskFault::staging(context, e)
  };

  if !installed.is_dir() {
    return Err(TaskFault::staging(
      format!("install step finished but {} was not created", installed.display()),
      io::Error::from(io::ErrorKind::NotFound),
    ));
  }

  debug!(from = %installed.display(), to = %release.display(), "staging release output");
  remove_dir_if_exists(&release).map_err(staging("removing", &release))?;
  std::fs::rename(&installed, &release).map_err(staging("staging", &installed))?;

  remove_dir_if_exists(&debug).map_err(staging("removing", &debug))?;
  copy_dir_all(&release, &debug).map_err(staging("copying to", &debug))?;
  Ok(())
}

impl BuildTask for BuildOpenSsl {
  fn id(&self) -> TaskId {
    ID
  }

  fn name(&self) -> &'static str {
    "OpenSSL Compilation"
  }

  fn dependencies(&self) -> &'static [TaskId] {
    &[submodules::ID]
  }

  fn supported_architectures(&self) -> Architecture {
    Architecture::X86 | Architecture::X64
  }

  fn supports_os(&self, os: Os) -> bool {
    matches!(os, Os::Windows | Os::Linux)
  }

  fn help(&self) -> &'static str {
    "If the build reports a possible previously failed or partial configuration, the \
     per-architecture copies of the OpenSSL sources are inconsistent. Delete the deps/openssl \
     directory and run `git submodule update --init` to restore the checkout, then run again."
  }

  async fn run(&mut self, ctx: &TaskContext, _configs: BuildConfiguration, archs: Architecture) -> TaskResult {
    let toolchain =
      Toolchain::detect(ctx.platform.os, &ctx.env, &ctx.settings).map_err(|e| vec![TaskFault::from(e)])?;

    let source = ctx.layout.dependency(SOURCE_DIR);
    let arch_dirs: Vec<String> = self.supported_architectures().iter().map(|a| a.name()).collect();
    let arch_dirs: Vec<&str> = arch_dirs.iter().map(String::as_str).collect();
    match prepare_source_tree(&source, &arch_dirs, STAGE_DIR_NAMES).map_err(|e| vec![TaskFault::from(e)])? {
      PrepareOutcome::Prepared => info!(dir = %source.display(), "prepared per-architecture sources"),
      PrepareOutcome::AlreadyPrepared => debug!(dir = %source.display(), "sources already prepared"),
    }

    let perl_dir = ctx.tools.acquire(&catalog::perl()).await.map_err(|e| vec![TaskFault::from(e)])?;
    let mut tool_dirs = vec![perl_dir.clone()];
    if matches!(toolchain, Toolchain::Msvc { .. }) {
      let nasm_dir = ctx.tools.acquire(&catalog::nasm()).await.map_err(|e| vec![TaskFault::from(e)])?;
      tool_dirs.push(nasm_dir);
    }

    let build = OpenSslMatrix {
      ctx,
      toolchain: &toolchain,
      stage_root: source.join(toolchain.stage_dir_name()),
      perl: process::program_in(&perl_dir, &ctx.platform.os.executable_name("perl")),
      source,
      tool_dirs,
    };

    // Only Release is compiled; Debug output is a copy made while staging.
    let cells = plan_cells(
      BuildConfiguration::RELEASE,
      BuildConfiguration::RELEASE,
      archs,
      self.supported_architectures(),
    );
    execute_matrix(&build, &cells, &ctx.env).await.into_result()
  }

  async fn clean(&mut self, ctx: &TaskContext) -> TaskResult {
    let source = ctx.layout.dependency(SOURCE_DIR);
    let mut faults: Vec<TaskFault> = Vec::new();
    for stage in STAGE_DIR_NAMES {
      let dir = source.join(stage);
      info!(dir = %dir.display(), "removing staged OpenSSL output");
      if let Err(e) = remove_dir_if_exists(&dir) {
        faults.push(TaskFault::io(format!("removing {}", dir.display()), e));
      }
    }
    if faults.is_empty() { Ok(()) } else { Err(faults) }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::task::FaultKind;
  use std::fs;
  use tempfile::TempDir;

  #[cfg(unix)]
  mod build {
    use super::*;
    use crate::platform::Platform;
    use crate::prepare::PrepareError;
    use crate::util::testutil::{context, fake_tool, read_log, system_path};

    /// Records the install prefix the way Configure bakes it into the makefiles.
    const PERL: &str = r#"for a in "$@"; do case "$a" in --prefix=*) echo "${a#--prefix=}" > .prefix;; esac; done"#;

    /// `install_sw` populates the recorded prefix.
    const MAKE: &str = r#"if [ "$1" = install_sw ]; then p=$(cat .prefix); mkdir -p "$p/lib" && echo "$(basename "$(pwd)")" > "$p/lib/libssl.so"; fi"#;

    fn workspace(make_extra: &str) -> (TempDir, TaskContext) {
      let temp = TempDir::new().unwrap();
      let source = temp.path().join("deps").join("openssl");
      fs::create_dir_all(source.join("crypto")).unwrap();
      fs::write(source.join("Configure"), "").unwrap();
      fs::write(source.join("crypto").join("mem.c"), "").unwrap();

      let bin = temp.path().join("bin");
      let log = temp.path().join("calls.log");
      let record = |tool: &str| format!("echo \"{tool} $* @$(basename \"$(pwd)\")\" >> '{}'", log.display());
      fake_tool(&bin, "perl", &format!("{}\n{PERL}", record("perl")));
      fake_tool(&bin, "make", &format!("{}\n{make_extra}\n{MAKE}", record("make")));

      let mut path = vec![bin];
      path.extend(system_path());
      let ctx = context(temp.path(), Platform::new(Os::Linux, Some(Architecture::X64)), &path);
      (temp, ctx)
    }

    #[tokio::test]
    async fn builds_release_per_architecture_and_stages_both_configurations() {
      let (temp, ctx) = workspace("");

      BuildOpenSsl
        .run(&ctx, BuildConfiguration::all(), Architecture::all())
        .await
        .unwrap();

      let source = ctx.layout.dependency("openssl");
      assert!(source.join("x86").join("Configure").is_file());
      assert!(source.join("x64").join("crypto").join("mem.c").is_file());
      for arch in ["x86", "x64"] {
        for cfg in ["Release", "Debug"] {
          let lib = source.join("gnu").join(format!("{cfg} {arch}")).join("lib").join("libssl.so");
          assert_eq!(fs::read_to_string(lib).unwrap().trim(), arch);
        }
        assert!(!source.join("gnu").join(format!("Release{arch}")).exists());
      }

      let calls = read_log(&temp.path().join("calls.log"));
      let tools: Vec<&str> = calls.iter().map(|c| c.split(' ').next().unwrap()).collect();
      assert_eq!(tools, vec!["perl", "make", "make", "perl", "make", "make"]);
      assert!(calls[0].starts_with("perl Configure linux-elf"));
      assert!(calls[0].contains(" -m32 "));
      assert!(calls[0].ends_with("@x86"));
      assert!(calls[1].starts_with("make -j2"));
      assert!(calls[3].starts_with("perl Configure linux-x86_64"));
      assert!(calls[5].starts_with("make install_sw") && calls[5].ends_with("@x64"));
    }

    #[tokio::test]
    async fn only_requested_architectures_are_built() {
      let (temp, ctx) = workspace("");

      BuildOpenSsl
        .run(&ctx, BuildConfiguration::DEBUG, Architecture::X64)
        .await
        .unwrap();

      let calls = read_log(&temp.path().join("calls.log"));
      assert_eq!(calls.len(), 3);
      assert!(calls.iter().all(|c| c.ends_with("@x64")));
      let stage = ctx.layout.dependency("openssl").join("gnu");
      assert!(stage.join("Debug x64").is_dir());
      assert!(!stage.join("Release x86").exists());
    }

    #[tokio::test]
    async fn failing_cell_leaves_the_other_architecture_staged() {
      let (_temp, ctx) = workspace(r#"case "$(pwd)" in */x86) exit 2;; esac"#);

      let faults = BuildOpenSsl
        .run(&ctx, BuildConfiguration::all(), Architecture::all())
        .await
        .unwrap_err();

      assert_eq!(faults.len(), 1);
      assert!(!faults[0].is_fatal());
      assert!(faults[0].to_string().starts_with("Release x86: make exited with code 2"));
      let stage = ctx.layout.dependency("openssl").join("gnu");
      assert!(stage.join("Release x64").join("lib").join("libssl.so").is_file());
      assert!(!stage.join("Release x86").exists());
    }

    #[tokio::test]
    async fn half_prepared_tree_is_refused_before_building() {
      let (temp, ctx) = workspace("");
      let source = ctx.layout.dependency("openssl");
      fs::create_dir_all(source.join("x64")).unwrap();
      fs::write(source.join("x64").join("Configure"), "").unwrap();

      let faults = BuildOpenSsl
        .run(&ctx, BuildConfiguration::all(), Architecture::all())
        .await
        .unwrap_err();

      assert!(matches!(faults[0], TaskFault::Prepare(PrepareError::PartialState { .. })));
      assert_eq!(faults[0].kind(), FaultKind::PartialState);
      assert!(read_log(&temp.path().join("calls.log")).is_empty());
    }

    #[tokio::test]
    async fn clean_removes_only_staged_output() {
      let (_temp, ctx) = workspace("");
      let source = ctx.layout.dependency("openssl");
      fs::create_dir_all(source.join("gnu").join("Release x64")).unwrap();
      fs::create_dir_all(source.join("msvc").join("Debug x86")).unwrap();

      BuildOpenSsl.clean(&ctx).await.unwrap();

      assert!(!source.join("gnu").exists());
      assert!(!source.join("msvc").exists());
      assert!(source.join("Configure").is_file());
    }
  }

  #[test]
  fn msvc_configure_targets() {
    let msvc = Toolchain::Msvc {
      vcvarsall: PathBuf::from("vcvarsall.bat"),
    };
    let install = Path::new("deps/openssl/msvc/Releasex64");

    let args = configure_args(&msvc, Architecture::X64, install);
    assert_eq!(args[0], "Configure");
    assert_eq!(args[1], "VC-WIN64A");
    assert!(args.contains(&"no-weak-ssl-ciphers".to_string()));
    assert_eq!(args.last().unwrap(), &format!("--openssldir={}", install.display()));

    assert_eq!(configure_args(&msvc, Architecture::X86, install)[1], "VC-WIN32");
  }

  #[test]
  fn gnu_x86_builds_32_bit() {
    let args = configure_args(&Toolchain::Gnu, Architecture::X86, Path::new("/out"));
    assert_eq!(args[1], "linux-elf");
    assert!(args.contains(&"-m32".to_string()));
    assert!(!configure_args(&Toolchain::Gnu, Architecture::X64, Path::new("/out")).contains(&"-m32".to_string()));
  }

  #[test]
  fn staging_moves_release_and_copies_debug() {
    let temp = TempDir::new().unwrap();
    let stage_root = temp.path().join("msvc");
    fs::create_dir_all(stage_root.join("Releasex64").join("bin")).unwrap();
    fs::write(stage_root.join("Releasex64").join("bin").join("libeay32.dll"), "dll").unwrap();
    // Output of an earlier build is replaced.
    fs::create_dir_all(stage_root.join("Release x64")).unwrap();
    fs::write(stage_root.join("Release x64").join("stale"), "").unwrap();

    stage_release(&stage_root, Architecture::X64).unwrap();

    assert!(!stage_root.join("Releasex64").exists());
    assert!(!stage_root.join("Release x64").join("stale").exists());
    assert!(stage_root.join("Release x64").join("bin").join("libeay32.dll").is_file());
    assert!(stage_root.join("Debug x64").join("bin").join("libeay32.dll").is_file());
  }

  #[test]
  fn missing_install_output_fails_only_the_cell() {
    let temp = TempDir::new().unwrap();
    let stage_root = temp.path().join("gnu");
    fs::create_dir_all(&stage_root).unwrap();

    let fault = stage_release(&stage_root, Architecture::X86).unwrap_err();

    assert_eq!(fault.kind(), FaultKind::Process);
    assert!(!fault.is_fatal());
    assert!(fault.to_string().contains("Releasex86"));
  }

  #[test]
  fn unreplaceable_debug_output_fails_only_the_cell() {
    let temp = TempDir::new().unwrap();
    let stage_root = temp.path().join("gnu");
    fs::create_dir_all(stage_root.join("Releasex64")).unwrap();
    fs::write(stage_root.join("Releasex64").join("libssl.so"), "").unwrap();
    // A file where the Debug directory belongs cannot be removed as a directory.
    fs::write(stage_root.join("Debug x64"), "").unwrap();

    let fault = stage_release(&stage_root, Architecture::X64).unwrap_err();

    assert!(matches!(fault, TaskFault::Staging { .. }));
    assert!(!fault.is_fatal());
  }

  #[test]
  fn depends_on_submodules() {
    assert_eq!(BuildOpenSsl.dependencies(), &[submodules::ID]);
    assert!(!BuildOpenSsl.supports_os(Os::MacOs));
  }
}
