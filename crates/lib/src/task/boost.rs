//! Builds the subset of modular Boost the project links against.
//!
//! Only the libraries listed in [`MODULES`] are checked out. b2 is bootstrapped once
//! and reused; every cell is built in two passes, the second adding Boost.Iostreams
//! with zlib and bzip2 compiled from their own submodules.

use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::env::Environment;
use crate::matrix::{MatrixBuild, Pass, execute_matrix, plan_cells};
use crate::platform::os::Os;
use crate::process::{self, Invocation};
use crate::target::{Architecture, BuildConfiguration, Cell};
use crate::toolchain::{STAGE_DIR_NAMES, Toolchain};
use crate::tools::catalog;
use crate::util::fs::remove_dir_if_exists;

use super::{BuildTask, TaskContext, TaskFault, TaskId, TaskResult, submodules};

pub const ID: TaskId = TaskId("22762ad9-fff1-4faf-a3ff-0148385d40b9");

const SOURCE_DIR: &str = "boost";

/// Boost submodules checked out under `deps/boost`.
pub const MODULES: &[&str] = &[
  "libs/system",
  "libs/config",
  "libs/iostreams",
  "libs/date_time",
  "libs/core",
  "libs/exception",
  "libs/throw_exception",
  "libs/detail",
  "libs/assert",
  "libs/static_assert",
  "libs/type_traits",
  "libs/integer",
  "libs/smart_ptr",
  "libs/predef",
  "libs/mpl",
  "libs/preprocessor",
  "libs/range",
  "libs/iterator",
  "libs/concept_check",
  "libs/utility",
  "libs/lexical_cast",
  "libs/numeric",
  "libs/array",
  "libs/functional",
  "libs/function",
  "libs/type_index",
  "libs/container",
  "libs/move",
  "libs/intrusive",
  "libs/math",
  "libs/bind",
  "libs/thread",
  "libs/regex",
  "libs/tokenizer",
  "libs/asio",
  "libs/align",
  "libs/tuple",
  "libs/chrono",
  "libs/ratio",
  "libs/io",
  "libs/optional",
  "libs/winapi",
  "libs/algorithm",
  "tools/build",
  "tools/inspect",
];

/// Targets Windows Vista and later, required by Boost.Asio and Boost.Thread.
const WIN32_WINNT: &str = "-D_WIN32_WINNT=0x0600";

#[derive(Debug, Default)]
pub struct BuildBoost;

/// `<stage dir>/<Cfg Arch>` relative to the Boost checkout.
pub fn stage_dir(toolchain: &Toolchain, cell: &Cell) -> PathBuf {
  Path::new("stage")
    .join(toolchain.stage_dir_name())
    .join(cell.staging_name())
}

/// Arguments shared by both b2 passes, without the trailing `<variant> stage`.
pub fn base_args(toolchain: &Toolchain, cell: &Cell, jobs: usize) -> Vec<String> {
  let mut args = vec![
    "-a".to_string(),
    format!("-j{jobs}"),
    format!("--toolset={}", toolchain.b2_toolset()),
    "--layout=system".to_string(),
  ];
  if matches!(toolchain, Toolchain::Msvc { .. }) {
    args.push(format!("cxxflags={WIN32_WINNT}"));
    args.push(format!("cflags={WIN32_WINNT}"));
  }
  args.push("link=shared".to_string());
  args.push("threading=multi".to_string());
  args.push(format!("address-model={}", cell.architecture.address_model()));
  args.push(format!("--stagedir={}", stage_dir(toolchain, cell).display()));
  args
}

/// Extra arguments of the second pass, which builds Boost.Iostreams.
pub fn iostreams_args(deps_dir: &Path) -> Vec<String> {
  vec![
    "--with-iostreams".to_string(),
    "-sNO_COMPRESSION=0".to_string(),
    "-sNO_ZLIB=0".to_string(),
    format!("-sBZIP2_SOURCE={}", deps_dir.join("bzip2").display()),
    format!("-sZLIB_SOURCE={}", deps_dir.join("zlib").display()),
  ]
}

fn variant_args(cell: &Cell) -> [String; 2] {
  [cell.configuration.name().to_lowercase(), "stage".to_string()]
}

struct BoostMatrix<'a> {
  ctx: &'a TaskContext,
  toolchain: &'a Toolchain,
  source: PathBuf,
  b2: PathBuf,
}

impl MatrixBuild for BoostMatrix<'_> {
  async fn passes(&self, cell: &Cell) -> Result<Vec<Pass>, TaskFault> {
    let env = self
      .toolchain
      .environment(cell.architecture, &self.ctx.env, self.ctx.tool_timeout())
      .await?;
    let base = base_args(self.toolchain, cell, self.ctx.settings.jobs);

    let libraries = Invocation::new(&self.b2, &self.source)
      .args(base.iter().cloned())
      .args(variant_args(cell))
      .overlay(env.clone());
    let iostreams = Invocation::new(&self.b2, &self.source)
      .args(base)
      .args(iostreams_args(&self.ctx.layout.deps_dir))
      .args(variant_args(cell))
      .overlay(env);

    Ok(vec![Pass::new("libraries", libraries), Pass::new("iostreams", iostreams)])
  }

  fn stage(&self, cell: &Cell) -> Result<(), TaskFault> {
    let staged = self.source.join(stage_dir(self.toolchain, cell));
    if staged.is_dir() {
      debug!(dir = %staged.display(), "boost output staged");
      Ok(())
    } else {
      Err(TaskFault::staging(
        format!("b2 finished but {} was not created", staged.display()),
        std::io::Error::from(std::io::ErrorKind::NotFound),
      ))
    }
  }
}

async fn init_modules(ctx: &TaskContext, git_dir: &Path, source: &Path) -> Result<(), Vec<TaskFault>> {
  let mut faults: Vec<TaskFault> = Vec::new();
  for module in MODULES {
    debug!(module, "initialising boost module");
    let invocation = submodules::git(ctx, git_dir, source).args(["submodule", "update", "--init", module]);
    if let Err(e) = process::run_checked(&invocation, &ctx.env).await {
      warn!(module, error = %e, "boost module initialisation failed");
      faults.push(TaskFault::from(e));
    }
  }
  if faults.is_empty() { Ok(()) } else { Err(faults) }
}

/// Bootstrap b2 unless it already exists, then generate the header links.
async fn init_build_engine(
  ctx: &TaskContext,
  toolchain: &Toolchain,
  source: &Path,
  b2: &Path,
) -> Result<(), TaskFault> {
  if b2.is_file() {
    info!(b2 = %b2.display(), "boost build engine already built");
  } else {
    let host = Architecture::host().unwrap_or(Architecture::X64);
    let env = toolchain.environment(host, &ctx.env, ctx.tool_timeout()).await?;
    let bootstrap = match toolchain {
      Toolchain::Msvc { .. } => Invocation::new("cmd.exe", source).args(["/C", "bootstrap.bat"]),
      Toolchain::Gnu => Invocation::new("sh", source).arg("bootstrap.sh"),
    };
    info!(dir = %source.display(), "bootstrapping boost build engine");
    process::run_checked(&bootstrap.overlay(env).timeout(ctx.tool_timeout()), &ctx.env).await?;
  }

  let headers = Invocation::new(b2, source).args(["-a", "headers"]).timeout(ctx.tool_timeout());
  process::run_checked(&headers, &ctx.env).await?;
  Ok(())
}

impl BuildTask for BuildBoost {
  fn id(&self) -> TaskId {
    ID
  }

  fn name(&self) -> &'static str {
    "Boost Libraries Compilation"
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

  async fn run(&mut self, ctx: &TaskContext, configs: BuildConfiguration, archs: Architecture) -> TaskResult {
    let toolchain =
      Toolchain::detect(ctx.platform.os, &ctx.env, &ctx.settings).map_err(|e| vec![TaskFault::from(e)])?;
    let git_dir = ctx.tools.acquire(&catalog::git()).await.map_err(|e| vec![TaskFault::from(e)])?;

    let source = ctx.layout.dependency(SOURCE_DIR);
    if !source.is_dir() {
      return Err(vec![TaskFault::config(format!(
        "boost checkout not found at {}",
        source.display()
      ))]);
    }

    init_modules(ctx, &git_dir, &source).await?;

    // Always the checkout's own b2, which bootstrapping may only now create.
    let b2 = source.join(ctx.platform.os.executable_name("b2"));
    init_build_engine(ctx, &toolchain, &source, &b2)
      .await
      .map_err(|e| vec![e])?;

    let build = BoostMatrix {
      ctx,
      toolchain: &toolchain,
      source,
      b2,
    };
    let cells = plan_cells(configs, BuildConfiguration::all(), archs, self.supported_architectures());
    execute_matrix(&build, &cells, &ctx.env).await.into_result()
  }

  async fn clean(&mut self, ctx: &TaskContext) -> TaskResult {
    let stage = ctx.layout.dependency(SOURCE_DIR).join("stage");
    let mut faults: Vec<TaskFault> = Vec::new();
    for name in STAGE_DIR_NAMES {
      let dir = stage.join(name);
      info!(dir = %dir.display(), "removing staged Boost output");
      if let Err(e) = remove_dir_if_exists(&dir) {
        faults.push(TaskFault::io(format!("removing {}", dir.display()), e));
      }
    }
    if faults.is_empty() { Ok(()) } else { Err(faults) }
  }
}
