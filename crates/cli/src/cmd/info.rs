//! Implementation of the `depbot info` command.

use std::path::Path;

use anyhow::Result;

use depbot_lib::toolchain::Toolchain;
use depbot_lib::tools::catalog;

use super::Workspace;
use crate::output::{print_info, print_stat, print_warning};

pub fn cmd_info(root: Option<&Path>) -> Result<()> {
  let workspace = Workspace::open(root)?;
  let settings = &workspace.settings;

  print_info(&format!("depbot v{}", env!("CARGO_PKG_VERSION")));
  print_stat("Platform", &workspace.platform.to_string());
  print_stat("Root", &workspace.root.display().to_string());
  print_stat("Deps", &workspace.layout.deps_dir.display().to_string());
  print_stat("Tools", &workspace.layout.tools_dir.display().to_string());
  print_stat("Jobs", &settings.jobs.to_string());
  print_stat("Tool timeout", &humantime::format_duration(settings.tool_timeout).to_string());

  println!();
  match Toolchain::detect(workspace.platform.os, &workspace.env, settings) {
    Ok(Toolchain::Msvc { vcvarsall }) => print_stat("Toolchain", &format!("msvc ({})", vcvarsall.display())),
    Ok(Toolchain::Gnu) => print_stat("Toolchain", "gnu"),
    Err(e) => print_warning(&format!("No toolchain: {e}")),
  }

  for tool in [catalog::git(), catalog::perl(), catalog::nasm()] {
    let exe = tool.executable_name(workspace.platform.os);
    let location = match workspace.env.find_in_search_dirs(&exe) {
      Some(path) => path.display().to_string(),
      None if tool.download_for(&workspace.platform).is_some() => "not found, will be downloaded".to_string(),
      None => "not found".to_string(),
    };
    print_stat(&tool.name, &location);
  }
  Ok(())
}
