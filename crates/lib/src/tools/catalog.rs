//! Pinned tool packages.
//!
//! Only Windows has portable packages for these tools; elsewhere they are expected on
//! the search path and acquisition fails with a hint to install them.

use crate::platform::os::Os;
use crate::target::Architecture;
use crate::util::hash::Checksum;

use super::{Download, ToolDescriptor};

const MINGIT_BASE: &str = "https://github.com/git-for-windows/git/releases/download/v2.10.0.windows.1";
const PERL_BASE: &str = "http://strawberryperl.com/download/5.24.0.1";
const NASM_BASE: &str = "http://www.nasm.us/pub/nasm/releasebuilds/2.12.02";

/// Archive name of the WinDivert driver package in the tools cache.
pub const WINDIVERT_ARCHIVE: &str = "WinDivert.zip";

pub fn git() -> ToolDescriptor {
  ToolDescriptor {
    name: "git".into(),
    executable: "git".into(),
    archive_name: "PortableGit.zip".into(),
    extract_dir: "portablegit".into(),
    downloads: vec![
      Download::windows(
        Architecture::X64,
        format!("{MINGIT_BASE}/MinGit-2.10.0-64-bit.zip"),
        Checksum::sha256("2e1101ec57da526728704c04792293613f3c5aa18e65f13a4129d00b54de2087"),
      ),
      Download::windows(
        Architecture::X86,
        format!("{MINGIT_BASE}/MinGit-2.10.0-32-bit.zip"),
        Checksum::sha256("36f890870126dcf840d87eaec7e55b8a483bc336ebf8970de2f9d549a3cfc195"),
      ),
    ],
  }
}

pub fn perl() -> ToolDescriptor {
  ToolDescriptor {
    name: "perl".into(),
    executable: "perl".into(),
    archive_name: "StrawberryPerl.zip".into(),
    extract_dir: "strawberryperl".into(),
    downloads: vec![
      Download::windows(
        Architecture::X64,
        format!("{PERL_BASE}/strawberry-perl-5.24.0.1-64bit-portable.zip"),
        Checksum::sha1("40094b93fdab1057598e9474767d34e810a1c383"),
      ),
      Download::windows(
        Architecture::X86,
        format!("{PERL_BASE}/strawberry-perl-no64-5.24.0.1-32bit-portable.zip"),
        Checksum::sha1("64fe479f4caa0881fca59e88c97d9cf2181a5007"),
      ),
    ],
  }
}

pub fn nasm() -> ToolDescriptor {
  ToolDescriptor {
    name: "nasm".into(),
    executable: "nasm".into(),
    archive_name: "nasm.zip".into(),
    extract_dir: "nasm".into(),
    downloads: vec![
      Download::windows(
        Architecture::X64,
        format!("{NASM_BASE}/win64/nasm-2.12.02-win64.zip"),
        Checksum::sha1("94756C0A427E65CD2AFE3DAC36F675BBAC3D89D8"),
      ),
      Download::windows(
        Architecture::X86,
        format!("{NASM_BASE}/win32/nasm-2.12.02-win32.zip"),
        Checksum::sha1("07D7C742DCC1107D7A322DB7A3A19065D7D1CBB4"),
      ),
    ],
  }
}

/// The WinDivert 1.2.0-rc MSVC driver package. One archive serves both architectures.
pub fn windivert() -> ToolDescriptor {
  ToolDescriptor {
    name: "windivert".into(),
    executable: "WinDivert.dll".into(),
    archive_name: WINDIVERT_ARCHIVE.into(),
    extract_dir: "windivert".into(),
    downloads: vec![Download {
      os: Os::Windows,
      arch: Architecture::all(),
      url: "https://github.com/basil00/Divert/releases/download/v1.2.0-rc/WinDivert-1.2.0-rc-MSVC.zip".into(),
      checksum: Checksum::sha256("7A194D5066C4093A370E3EA474371A4CF9976D28763C253D9DDF312BC2B33715"),
    }],
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::platform::Platform;
  use crate::util::hash::HashAlgorithm;

  #[test]
  fn downloads_follow_host_architecture() {
    let x64 = Platform::new(Os::Windows, Some(Architecture::X64));
    let x86 = Platform::new(Os::Windows, Some(Architecture::X86));

    assert!(git().download_for(&x64).unwrap().url.ends_with("MinGit-2.10.0-64-bit.zip"));
    assert!(git().download_for(&x86).unwrap().url.ends_with("MinGit-2.10.0-32-bit.zip"));
    assert_eq!(perl().download_for(&x64).unwrap().checksum.algorithm, HashAlgorithm::Sha1);
  }

  #[test]
  fn no_portable_packages_outside_windows() {
    let linux = Platform::new(Os::Linux, Some(Architecture::X64));
    for tool in [git(), perl(), nasm(), windivert()] {
      assert!(tool.download_for(&linux).is_none(), "{} should not download on linux", tool.name);
    }
  }

  #[test]
  fn windivert_serves_every_architecture() {
    for arch in Architecture::all().iter() {
      let platform = Platform::new(Os::Windows, Some(arch));
      assert!(windivert().download_for(&platform).is_some());
    }
  }
}
