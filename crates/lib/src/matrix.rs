//! Configuration x architecture build matrices.
//!
//! A [`MatrixBuild`] describes, for one cell, the ordered external invocations that
//! build it and how its output is staged. [`execute_matrix`] walks the cells in order.
//! A failing pass ends its own cell; the remaining cells are still attempted.

use tracing::{error, info};

use crate::env::Environment;
use crate::process::{self, Invocation};
use crate::target::{Architecture, BuildConfiguration, Cell};
use crate::task::{TaskFault, TaskResult};

/// One external invocation within a cell.
#[derive(Debug, Clone)]
pub struct Pass {
  pub label: String,
  pub invocation: Invocation,
}

impl Pass {
  pub fn new(label: impl Into<String>, invocation: Invocation) -> Self {
    Self {
      label: label.into(),
      invocation,
    }
  }
}

/// A build that can be driven across a matrix of cells.
#[allow(async_fn_in_trait)]
pub trait MatrixBuild {
  /// Ordered passes for `cell`. Preparing them may itself fail, e.g. when the
  /// compiler environment for the cell's architecture cannot be captured.
  async fn passes(&self, cell: &Cell) -> Result<Vec<Pass>, TaskFault>;

  /// Move or copy the cell's output to its stable location.
  fn stage(&self, cell: &Cell) -> Result<(), TaskFault>;
}

/// Outcome of one matrix execution.
#[derive(Debug, Default)]
pub struct MatrixReport {
  pub attempted: usize,
  pub succeeded: usize,
  /// One fault per failed cell, tagged with the cell.
  pub failures: Vec<TaskFault>,
}

impl MatrixReport {
  pub fn is_success(&self) -> bool {
    self.attempted > 0 && self.succeeded == self.attempted
  }

  pub fn into_result(self) -> TaskResult {
    if self.attempted == 0 {
      return Err(vec![TaskFault::config(
        "no build cells matched the requested configurations and architectures",
      )]);
    }
    if self.failures.is_empty() { Ok(()) } else { Err(self.failures) }
  }
}

/// Cells to build: requested sets intersected with supported sets, configurations
/// outermost, in declaration order.
pub fn plan_cells(
  requested_configs: BuildConfiguration,
  supported_configs: BuildConfiguration,
  requested_archs: Architecture,
  supported_archs: Architecture,
) -> Vec<Cell> {
  let configs = requested_configs & supported_configs;
  let archs = requested_archs & supported_archs;

  configs
    .iter()
    .flat_map(|configuration| archs.iter().map(move |architecture| Cell::new(configuration, architecture)))
    .collect()
}

/// Run every cell's passes in order, then stage the cells whose passes all succeeded.
pub async fn execute_matrix<B: MatrixBuild>(build: &B, cells: &[Cell], env: &Environment) -> MatrixReport {
  let mut report = MatrixReport::default();

  for cell in cells {
    report.attempted += 1;
    info!(cell = %cell, "building");

    match build_cell(build, cell, env).await {
      Ok(()) => {
        info!(cell = %cell, "cell succeeded");
        report.succeeded += 1;
      }
      Err(fault) => {
        error!(cell = %cell, error = %fault, "cell failed");
        report.failures.push(fault.in_cell(*cell));
      }
    }
  }

  report
}

async fn build_cell<B: MatrixBuild>(build: &B, cell: &Cell, env: &Environment) -> Result<(), TaskFault> {
  for pass in build.passes(cell).await? {
    info!(cell = %cell, pass = %pass.label, "starting pass");
    process::run_checked(&pass.invocation, env).await?;
  }
  build.stage(cell)
}
