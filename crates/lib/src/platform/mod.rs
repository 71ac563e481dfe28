pub mod os;
pub mod paths;

use os::Os;
use std::fmt;

use crate::target::Architecture;

/// The machine a session runs on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Platform {
  pub os: Os,
  /// `None` when the host CPU is not one we build for (e.g. aarch64).
  pub arch: Option<Architecture>,
}

impl Platform {
  pub fn new(os: Os, arch: Option<Architecture>) -> Self {
    Self { os, arch }
  }

  /// Detect the current platform at runtime
  ///
  /// Returns `None` if the OS is not supported
  pub fn current() -> Option<Self> {
    Some(Self {
      os: Os::current()?,
      arch: Architecture::host(),
    })
  }
}

impl fmt::Display for Platform {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self.arch {
      Some(arch) => write!(f, "{}-{}", self.os, arch),
      None => write!(f, "{}-{}", self.os, std::env::consts::ARCH),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn display_format() {
    let platform = Platform::new(Os::Windows, Some(Architecture::X64));
    assert_eq!(platform.to_string(), "windows-x64");

    let platform = Platform::new(Os::Linux, Some(Architecture::X86));
    assert_eq!(platform.to_string(), "linux-x86");
  }
}
