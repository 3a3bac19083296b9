//! What the user asked the solver for.
//!
//! SPDX-License-Identifier: GPL-3.0-or-later

use crate::arch::{Architecture, Cpu, Os};
use crate::implementation::{COMMAND_COMPILE, COMMAND_RUN};
use crate::version_range::VersionRange;
use std::collections::BTreeMap;

/// A request to select an implementation of an interface, plus constraints.
/// Cloned and narrowed at solver entry, then inherited through recursive
/// dependency expansion.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Requirements {
    #[serde(rename = "interface")]
    pub interface_uri: String,
    /// Command to run; `None` means the default for the architecture.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
    #[serde(default, skip_serializing_if = "is_any_arch")]
    pub architecture: Architecture,
    /// Preferred languages, best first, as BCP-47-ish tags (`de-AT`).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub languages: Vec<String>,
    /// Additional version constraints per interface URI.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extra_restrictions: BTreeMap<String, VersionRange>,
}

fn is_any_arch(arch: &Architecture) -> bool {
    *arch == Architecture::any()
}

impl Requirements {
    pub fn new(interface_uri: impl Into<String>) -> Requirements {
        Requirements {
            interface_uri: interface_uri.into(),
            command: None,
            architecture: Architecture::any(),
            languages: Vec::new(),
            extra_restrictions: BTreeMap::new(),
        }
    }

    /// Fills in unspecified fields from the running system: wildcard OS/CPU
    /// become the host's, and the command defaults to `run` (`compile` when
    /// source code was requested).
    pub fn for_current_system(&self) -> Requirements {
        let mut narrowed = self.clone();
        let host = Architecture::current();
        if narrowed.architecture.os == Os::All {
            narrowed.architecture.os = host.os;
        }
        if narrowed.architecture.cpu == Cpu::All {
            narrowed.architecture.cpu = host.cpu;
        }
        if narrowed.command.is_none() {
            narrowed.command = Some(
                if self.architecture.os == Os::Source || self.architecture.cpu == Cpu::Source {
                    COMMAND_COMPILE.to_string()
                } else {
                    COMMAND_RUN.to_string()
                },
            );
        }
        narrowed
    }

    /// The effective command name; empty string means "no command needed"
    /// (used for plain library dependencies).
    pub fn command_name(&self) -> &str {
        self.command.as_deref().unwrap_or(COMMAND_RUN)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn narrowing_fills_host_and_default_command() {
        let reqs = Requirements::new("https://example.com/app");
        let narrowed = reqs.for_current_system();
        assert_ne!(narrowed.architecture.os, Os::All);
        assert_ne!(narrowed.architecture.cpu, Cpu::All);
        assert_eq!(narrowed.command.as_deref(), Some("run"));
        // Idempotent.
        assert_eq!(narrowed.for_current_system(), narrowed);
    }

    #[test]
    fn source_requests_default_to_compile() {
        let mut reqs = Requirements::new("https://example.com/app");
        reqs.architecture.os = Os::Source;
        assert_eq!(reqs.for_current_system().command.as_deref(), Some("compile"));
    }

    #[test]
    fn explicit_command_is_kept() {
        let mut reqs = Requirements::new("https://example.com/app");
        reqs.command = Some("test".into());
        assert_eq!(reqs.for_current_system().command.as_deref(), Some("test"));
    }
}
