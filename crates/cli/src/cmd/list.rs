//! Implementation of the `depbot list` command.

use anyhow::Result;
use owo_colors::{OwoColorize, Stream};
use serde::Serialize;

use depbot_lib::platform::os::Os;
use depbot_lib::task::{BuildTask, registry};

use crate::output::{OutputFormat, print_json, print_stat};

#[derive(Serialize)]
struct TaskEntry {
  id: &'static str,
  name: &'static str,
  dependencies: Vec<&'static str>,
  os: Vec<&'static str>,
  architectures: String,
}

pub fn cmd_list(output: OutputFormat) -> Result<()> {
  let entries: Vec<TaskEntry> = registry::builtin()
    .iter()
    .map(|task| TaskEntry {
      id: task.id().0,
      name: task.name(),
      dependencies: task.dependencies().iter().map(|d| d.0).collect(),
      os: Os::ALL.iter().filter(|os| task.supports_os(**os)).map(|os| os.as_str()).collect(),
      architectures: task.supported_architectures().name(),
    })
    .collect();

  if output.is_json() {
    return print_json(&entries);
  }

  for (i, entry) in entries.iter().enumerate() {
    if i > 0 {
      println!();
    }
    println!("{}", entry.name.if_supports_color(Stream::Stdout, |s| s.bold()));
    print_stat("Id", entry.id);
    if !entry.dependencies.is_empty() {
      print_stat("Depends on", &entry.dependencies.join(", "));
    }
    print_stat("OS", &entry.os.join(", "));
    print_stat("Architectures", &entry.architectures);
  }
  Ok(())
}
