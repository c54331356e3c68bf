//! Platform identifiers and detection.
//!
//! Version indices spell operating systems and architectures in their own way
//! (`mac`, `winnt`, `i686`, `armv7l`, ...). Everything is normalized onto the
//! small set of identifiers below before packages are compared with the host.

use std::collections::BTreeMap;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Os {
    Linux,
    MacOs,
    Windows,
    FreeBsd,
}

impl Os {
    pub fn as_str(&self) -> &'static str {
        match self {
            Os::Linux => "linux",
            Os::MacOs => "macos",
            Os::Windows => "windows",
            Os::FreeBsd => "freebsd",
        }
    }

    /// Parse a raw OS name using the built-in alias table.
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_lowercase().as_str() {
            "linux" => Some(Os::Linux),
            "macos" | "mac" | "darwin" | "osx" | "apple" => Some(Os::MacOs),
            "windows" | "winnt" | "win" | "win32" | "win64" => Some(Os::Windows),
            "freebsd" => Some(Os::FreeBsd),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Arch {
    X86_64,
    X86,
    Aarch64,
    Arm,
    Powerpc64le,
}

impl Arch {
    pub fn as_str(&self) -> &'static str {
        match self {
            Arch::X86_64 => "x86_64",
            Arch::X86 => "i686",
            Arch::Aarch64 => "aarch64",
            Arch::Arm => "armv7l",
            Arch::Powerpc64le => "powerpc64le",
        }
    }

    /// Parse a raw architecture name using the built-in alias table.
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_lowercase().as_str() {
            "x86_64" | "amd64" | "x64" => Some(Arch::X86_64),
            "i686" | "i386" | "x86" | "386" => Some(Arch::X86),
            "aarch64" | "arm64" => Some(Arch::Aarch64),
            "armv7l" | "armv7" | "arm" => Some(Arch::Arm),
            "powerpc64le" | "ppc64le" => Some(Arch::Powerpc64le),
            _ => None,
        }
    }
}

impl fmt::Display for Os {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Display for Arch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Extra per-runtime spellings, applied before the built-in tables.
///
/// Maps a raw index value (e.g. `"mac"`) to any name the built-in parser
/// understands (e.g. `"macos"`).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PlatformAliases {
    pub os: BTreeMap<String, String>,
    pub arch: BTreeMap<String, String>,
}

impl PlatformAliases {
    pub fn normalize_os(&self, raw: &str) -> Option<Os> {
        let raw = raw.trim();
        let canonical = self.os.get(raw).map(String::as_str).unwrap_or(raw);
        Os::parse(canonical)
    }

    pub fn normalize_arch(&self, raw: &str) -> Option<Arch> {
        let raw = raw.trim();
        let canonical = self.arch.get(raw).map(String::as_str).unwrap_or(raw);
        Arch::parse(canonical)
    }
}

/// Platform information for package selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Platform {
    pub os: Os,
    pub arch: Arch,
}

impl Platform {
    pub fn new(os: Os, arch: Arch) -> Self {
        Self { os, arch }
    }

    /// Detect the current platform. Returns `None` on hosts no index ships for.
    pub fn detect() -> Option<Self> {
        Some(Self {
            os: Self::detect_os()?,
            arch: Self::detect_arch()?,
        })
    }

    fn detect_os() -> Option<Os> {
        #[cfg(target_os = "macos")]
        {
            Some(Os::MacOs)
        }
        #[cfg(target_os = "linux")]
        {
            Some(Os::Linux)
        }
        #[cfg(target_os = "windows")]
        {
            Some(Os::Windows)
        }
        #[cfg(not(any(target_os = "macos", target_os = "linux", target_os = "windows")))]
        {
            Os::parse(std::env::consts::OS)
        }
    }

    fn detect_arch() -> Option<Arch> {
        #[cfg(target_arch = "x86_64")]
        {
            Some(Arch::X86_64)
        }
        #[cfg(target_arch = "aarch64")]
        {
            Some(Arch::Aarch64)
        }
        #[cfg(target_arch = "x86")]
        {
            Some(Arch::X86)
        }
        #[cfg(not(any(target_arch = "x86_64", target_arch = "aarch64", target_arch = "x86")))]
        {
            Arch::parse(std::env::consts::ARCH)
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.os, self.arch)
    }
}
