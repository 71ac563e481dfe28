mod cmd;
mod output;

use std::path::PathBuf;

use anyhow::Result;
use clap::{ArgAction, Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use depbot_lib::target::{Architecture, BuildConfiguration};

use crate::cmd::{RunOptions, cmd_clean, cmd_info, cmd_list, cmd_run};
use crate::output::OutputFormat;

/// depbot - builds and stages third-party dependencies
#[derive(Parser)]
#[command(name = "depbot")]
#[command(author, version, about, long_about = None)]
struct Cli {
  /// Increase log verbosity (-v for debug, -vv for trace)
  #[arg(short, long, action = ArgAction::Count, global = true)]
  verbose: u8,

  /// Workspace root holding the deps directory (default: current directory)
  #[arg(short = 'C', long, global = true)]
  root: Option<PathBuf>,

  #[command(subcommand)]
  command: Commands,
}

#[derive(Subcommand)]
enum Commands {
  /// Run build tasks in dependency order
  Run {
    /// Build configurations, comma separated
    #[arg(short, long, value_delimiter = ',', default_value = "Debug,Release")]
    config: Vec<BuildConfiguration>,

    /// Target architectures, comma separated
    #[arg(short, long, value_delimiter = ',', default_value = "x86,x64")]
    arch: Vec<Architecture>,

    /// Only run these tasks (id or name) and what they depend on
    #[arg(short, long = "task")]
    tasks: Vec<String>,

    /// Bound for short tool invocations such as git, e.g. "10m"
    #[arg(long)]
    tool_timeout: Option<humantime::Duration>,
  },

  /// Remove the output of build tasks
  Clean {
    /// Only clean these tasks (id or name) and what they depend on
    #[arg(short, long = "task")]
    tasks: Vec<String>,
  },

  /// List registered tasks
  List {
    /// Output format
    #[arg(short, long, value_enum, default_value_t)]
    output: OutputFormat,
  },

  /// Show the resolved settings, platform and toolchain
  Info,
}

fn init_tracing(verbose: u8) {
  let filter = match verbose {
    0 => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
    1 => EnvFilter::new("debug"),
    _ => EnvFilter::new("trace"),
  };

  tracing_subscriber::fmt()
    .with_env_filter(filter)
    .with_writer(std::io::stderr)
    .without_time()
    .init();
}

fn main() -> Result<()> {
  let cli = Cli::parse();
  init_tracing(cli.verbose);

  let root = cli.root.as_deref();
  match cli.command {
    Commands::Run {
      config,
      arch,
      tasks,
      tool_timeout,
    } => cmd_run(
      root,
      RunOptions {
        configs: config.into_iter().fold(BuildConfiguration::empty(), |acc, c| acc | c),
        archs: arch.into_iter().fold(Architecture::empty(), |acc, a| acc | a),
        tasks,
        tool_timeout: tool_timeout.map(Into::into),
      },
    ),
    Commands::Clean { tasks } => cmd_clean(root, &tasks),
    Commands::List { output } => cmd_list(output),
    Commands::Info => cmd_info(root),
  }
}
