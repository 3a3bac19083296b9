//! Operating-system / CPU pairs and their compatibility rules.
//!
//! SPDX-License-Identifier: GPL-3.0-or-later

use std::fmt;
use std::str::FromStr;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Os {
    All,
    Posix,
    Linux,
    Solaris,
    FreeBsd,
    MacOsX,
    Windows,
    Source,
    Unknown,
}

impl Os {
    /// Can an implementation built for `self` run on a `system` OS?
    ///
    /// `All` subsumes anything; `Posix` covers the Unix family; `Source` only
    /// matches when the caller explicitly asked for source code.
    pub fn runs_on(self, system: Os) -> bool {
        match (self, system) {
            (Os::All, _) | (_, Os::All) => true,
            (Os::Source, Os::Source) => true,
            (Os::Source, _) | (_, Os::Source) => false,
            (Os::Unknown, _) | (_, Os::Unknown) => false,
            (Os::Posix, s) => s.is_posix(),
            (a, b) => a == b,
        }
    }

    fn is_posix(self) -> bool {
        matches!(
            self,
            Os::Posix | Os::Linux | Os::Solaris | Os::FreeBsd | Os::MacOsX
        )
    }

    /// Higher values are more specific; used as a sort key only.
    pub fn specificity(self) -> u8 {
        match self {
            Os::All => 0,
            Os::Unknown => 1,
            Os::Posix => 2,
            _ => 3,
        }
    }

    pub fn current() -> Os {
        if cfg!(target_os = "linux") {
            Os::Linux
        } else if cfg!(target_os = "macos") {
            Os::MacOsX
        } else if cfg!(target_os = "freebsd") {
            Os::FreeBsd
        } else if cfg!(target_os = "solaris") {
            Os::Solaris
        } else if cfg!(windows) {
            Os::Windows
        } else {
            Os::Unknown
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Os::All => "*",
            Os::Posix => "POSIX",
            Os::Linux => "Linux",
            Os::Solaris => "Solaris",
            Os::FreeBsd => "FreeBSD",
            Os::MacOsX => "MacOSX",
            Os::Windows => "Windows",
            Os::Source => "src",
            Os::Unknown => "unknown",
        }
    }
}

impl FromStr for Os {
    type Err = ();

    /// Unrecognised names map to `Unknown` so that feeds for OSes newer than
    /// this build are skipped rather than rejected.
    fn from_str(s: &str) -> Result<Os, ()> {
        Ok(match s {
            "*" => Os::All,
            "POSIX" => Os::Posix,
            "Linux" => Os::Linux,
            "Solaris" => Os::Solaris,
            "FreeBSD" => Os::FreeBsd,
            "MacOSX" | "Darwin" => Os::MacOsX,
            "Windows" => Os::Windows,
            "src" => Os::Source,
            _ => Os::Unknown,
        })
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Cpu {
    All,
    I386,
    I486,
    I586,
    I686,
    X64,
    Ppc,
    Ppc64,
    ArmV6L,
    ArmV7L,
    AArch64,
    Source,
    Unknown,
}

impl Cpu {
    /// x86 chain position; newer CPUs run older code, never the reverse.
    fn x86_rank(self) -> Option<u8> {
        match self {
            Cpu::I386 => Some(0),
            Cpu::I486 => Some(1),
            Cpu::I586 => Some(2),
            Cpu::I686 => Some(3),
            _ => None,
        }
    }

    fn arm_rank(self) -> Option<u8> {
        match self {
            Cpu::ArmV6L => Some(0),
            Cpu::ArmV7L => Some(1),
            _ => None,
        }
    }

    /// Can an implementation built for `self` run on a `system` CPU?
    pub fn runs_on(self, system: Cpu) -> bool {
        match (self, system) {
            (Cpu::All, _) | (_, Cpu::All) => true,
            (Cpu::Source, Cpu::Source) => true,
            (Cpu::Source, _) | (_, Cpu::Source) => false,
            (Cpu::Unknown, _) | (_, Cpu::Unknown) => false,
            (a, b) => {
                if let (Some(i), Some(s)) = (a.x86_rank(), b.x86_rank()) {
                    return i <= s;
                }
                if let (Some(i), Some(s)) = (a.arm_rank(), b.arm_rank()) {
                    return i <= s;
                }
                a == b
            }
        }
    }

    pub fn is_32bit(self) -> bool {
        matches!(
            self,
            Cpu::I386 | Cpu::I486 | Cpu::I586 | Cpu::I686 | Cpu::Ppc | Cpu::ArmV6L | Cpu::ArmV7L
        )
    }

    pub fn is_64bit(self) -> bool {
        matches!(self, Cpu::X64 | Cpu::Ppc64 | Cpu::AArch64)
    }

    /// Higher values are more specific; within the x86 chain, later models
    /// count as more specific than earlier ones.
    pub fn specificity(self) -> u8 {
        match self {
            Cpu::All => 0,
            Cpu::Unknown => 1,
            Cpu::I386 => 2,
            Cpu::I486 => 3,
            Cpu::I586 => 4,
            Cpu::I686 => 5,
            Cpu::ArmV6L => 2,
            Cpu::ArmV7L => 3,
            _ => 6,
        }
    }

    pub fn current() -> Cpu {
        if cfg!(target_arch = "x86_64") {
            Cpu::X64
        } else if cfg!(target_arch = "x86") {
            Cpu::I686
        } else if cfg!(target_arch = "aarch64") {
            Cpu::AArch64
        } else if cfg!(target_arch = "arm") {
            Cpu::ArmV7L
        } else if cfg!(target_arch = "powerpc64") {
            Cpu::Ppc64
        } else if cfg!(target_arch = "powerpc") {
            Cpu::Ppc
        } else {
            Cpu::Unknown
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Cpu::All => "*",
            Cpu::I386 => "i386",
            Cpu::I486 => "i486",
            Cpu::I586 => "i586",
            Cpu::I686 => "i686",
            Cpu::X64 => "x86_64",
            Cpu::Ppc => "ppc",
            Cpu::Ppc64 => "ppc64",
            Cpu::ArmV6L => "armv6l",
            Cpu::ArmV7L => "armv7l",
            Cpu::AArch64 => "aarch64",
            Cpu::Source => "src",
            Cpu::Unknown => "unknown",
        }
    }
}

impl FromStr for Cpu {
    type Err = ();

    fn from_str(s: &str) -> Result<Cpu, ()> {
        Ok(match s {
            "*" => Cpu::All,
            "i386" => Cpu::I386,
            "i486" => Cpu::I486,
            "i586" => Cpu::I586,
            "i686" => Cpu::I686,
            "x86_64" | "amd64" => Cpu::X64,
            "ppc" => Cpu::Ppc,
            "ppc64" => Cpu::Ppc64,
            "armv6l" => Cpu::ArmV6L,
            "armv7l" => Cpu::ArmV7L,
            "aarch64" | "arm64" => Cpu::AArch64,
            "src" => Cpu::Source,
            _ => Cpu::Unknown,
        })
    }
}

/// An `(OS, CPU)` pair, written `OS-CPU` in feeds (e.g. `Linux-x86_64`).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Architecture {
    pub os: Os,
    pub cpu: Cpu,
}

impl Architecture {
    pub fn new(os: Os, cpu: Cpu) -> Architecture {
        Architecture { os, cpu }
    }

    /// The wildcard architecture `*-*`.
    pub fn any() -> Architecture {
        Architecture {
            os: Os::All,
            cpu: Cpu::All,
        }
    }

    /// The architecture of the running system.
    pub fn current() -> Architecture {
        Architecture {
            os: Os::current(),
            cpu: Cpu::current(),
        }
    }

    /// Can an implementation built for `self` run on the given `system`?
    pub fn runs_on(&self, system: &Architecture) -> bool {
        self.os.runs_on(system.os) && self.cpu.runs_on(system.cpu)
    }
}

impl fmt::Display for Architecture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.os.as_str(), self.cpu.as_str())
    }
}

impl FromStr for Architecture {
    type Err = ();

    fn from_str(s: &str) -> Result<Architecture, ()> {
        match s.split_once('-') {
            Some((os, cpu)) => Ok(Architecture {
                os: os.parse()?,
                cpu: cpu.parse()?,
            }),
            None => Err(()),
        }
    }
}

impl Default for Architecture {
    fn default() -> Architecture {
        Architecture::any()
    }
}
