//! Build targets: configurations, architectures and the cells of a build matrix.
//!
//! Both [`BuildConfiguration`] and [`Architecture`] are bit-sets so that a task can
//! declare what it supports and a session can request several values at once. The
//! effective work for a task is always the intersection of the two.

use std::fmt;
use std::str::FromStr;

use bitflags::bitflags;
use thiserror::Error;

bitflags! {
  /// Set of build configurations.
  #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
  pub struct BuildConfiguration: u8 {
    const DEBUG = 1 << 0;
    const RELEASE = 1 << 1;
  }
}

bitflags! {
  /// Set of target CPU architectures.
  #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
  pub struct Architecture: u8 {
    const X86 = 1 << 0;
    const X64 = 1 << 1;
  }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TargetParseError {
  #[error("unknown build configuration '{0}' (expected Debug or Release)")]
  Configuration(String),
  #[error("unknown architecture '{0}' (expected x86 or x64)")]
  Architecture(String),
}

impl BuildConfiguration {
  /// Display name of a single configuration, e.g. `Release`.
  ///
  /// For a set holding several configurations the names are joined with `|`.
  pub fn name(&self) -> String {
    self
      .iter()
      .map(|c| if c == Self::DEBUG { "Debug" } else { "Release" })
      .collect::<Vec<_>>()
      .join("|")
  }
}

impl Architecture {
  /// Short name of a single architecture, e.g. `x64`.
  pub fn name(&self) -> String {
    self
      .iter()
      .map(|a| if a == Self::X86 { "x86" } else { "x64" })
      .collect::<Vec<_>>()
      .join("|")
  }

  /// Pointer width in bits, as used by `address-model=` style switches.
  pub fn address_model(&self) -> u32 {
    if self.contains(Self::X64) { 64 } else { 32 }
  }

  /// Architecture of the machine we are running on, if it is one we build for.
  pub fn host() -> Option<Self> {
    match std::env::consts::ARCH {
      "x86_64" => Some(Self::X64),
      "x86" => Some(Self::X86),
      _ => None,
    }
  }
}

impl fmt::Display for BuildConfiguration {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}", self.name())
  }
}

impl fmt::Display for Architecture {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}", self.name())
  }
}

impl FromStr for BuildConfiguration {
  type Err = TargetParseError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s.to_ascii_lowercase().as_str() {
      "debug" => Ok(Self::DEBUG),
      "release" => Ok(Self::RELEASE),
      "all" => Ok(Self::all()),
      _ => Err(TargetParseError::Configuration(s.to_string())),
    }
  }
}

impl FromStr for Architecture {
  type Err = TargetParseError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s.to_ascii_lowercase().as_str() {
      "x86" | "win32" | "i686" => Ok(Self::X86),
      "x64" | "amd64" | "x86_64" => Ok(Self::X64),
      "all" => Ok(Self::all()),
      _ => Err(TargetParseError::Architecture(s.to_string())),
    }
  }
}

/// One (configuration, architecture) pair of a build matrix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Cell {
  pub configuration: BuildConfiguration,
  pub architecture: Architecture,
}

impl Cell {
  pub fn new(configuration: BuildConfiguration, architecture: Architecture) -> Self {
    Self {
      configuration,
      architecture,
    }
  }

  /// Directory name the cell's output is staged under, e.g. `Release x64`.
  pub fn staging_name(&self) -> String {
    format!("{} {}", self.configuration.name(), self.architecture.name())
  }
}

impl fmt::Display for Cell {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}", self.staging_name())
  }
}
