//! Concrete implementations and their commands.
//!
//! SPDX-License-Identifier: GPL-3.0-or-later

use crate::arch::Architecture;
use crate::dependency::{Binding, Dependency, Restriction};
use crate::digest::ManifestDigest;
use crate::stability::Stability;
use crate::version::Version;
use crate::version_range::VersionRange;
use std::path::PathBuf;

/// Canonical command names.
pub const COMMAND_RUN: &str = "run";
pub const COMMAND_COMPILE: &str = "compile";
pub const COMMAND_TEST: &str = "test";

/// One concrete version of an interface's code, identified by its manifest
/// digest (or a distribution-package key for external implementations).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Implementation {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<Version>,
    #[serde(default)]
    pub architecture: Architecture,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub languages: Vec<String>,
    #[serde(default = "default_stability")]
    pub stability: Stability,
    /// Percentage of users that should see this implementation while it is
    /// being rolled out; absent means fully rolled out.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rollout_percentage: Option<u32>,
    #[serde(default, skip_serializing_if = "ManifestDigest::is_empty")]
    pub digest: ManifestDigest,
    /// Set for implementations in local feeds only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub local_path: Option<PathBuf>,
    /// Which distribution provided this implementation; set only for results
    /// of package-manager queries.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub distribution: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub retrieval_methods: Vec<RetrievalMethod>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub commands: Vec<Command>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dependencies: Vec<Dependency>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub restrictions: Vec<Restriction>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub bindings: Vec<Binding>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub released: Option<String>,
    /// Legacy shorthand for the `run` command's path.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub main: Option<String>,
}

fn default_stability() -> Stability {
    Stability::Testing
}

impl Default for Implementation {
    fn default() -> Implementation {
        Implementation::new("")
    }
}

impl Implementation {
    pub fn new(id: impl Into<String>) -> Implementation {
        Implementation {
            id: id.into(),
            version: None,
            architecture: Architecture::any(),
            languages: Vec::new(),
            stability: Stability::Testing,
            rollout_percentage: None,
            digest: ManifestDigest::default(),
            local_path: None,
            distribution: None,
            retrieval_methods: Vec::new(),
            commands: Vec::new(),
            dependencies: Vec::new(),
            restrictions: Vec::new(),
            bindings: Vec::new(),
            released: None,
            main: None,
        }
    }

    pub fn command(&self, name: &str) -> Option<&Command> {
        self.commands.iter().find(|c| c.name == name)
    }
}

/// A distribution-package pattern; expanded into concrete implementations by
/// querying the package manager.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PackageImplementation {
    /// Package name within the distribution (e.g. `gnupg2`).
    pub package: String,
    /// Distributions this pattern applies to; empty = any.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub distributions: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub versions: Option<VersionRange>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub main: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dependencies: Vec<Dependency>,
}

/// A named entry point into an implementation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Command {
    pub name: String,
    /// Path of the executable, relative to the implementation root.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub arguments: Vec<String>,
    /// Interface that supplies the interpreter this command is run with.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub runner: Option<Runner>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub working_dir: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dependencies: Vec<Dependency>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub restrictions: Vec<Restriction>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub bindings: Vec<Binding>,
}

impl Command {
    pub fn new(name: impl Into<String>, path: impl Into<String>) -> Command {
        Command {
            name: name.into(),
            path: Some(path.into()),
            arguments: Vec::new(),
            runner: None,
            working_dir: None,
            dependencies: Vec::new(),
            restrictions: Vec::new(),
            bindings: Vec::new(),
        }
    }
}

/// Wraps a command in another interface's command (e.g. a Python script run
/// by a Python interpreter implementation).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Runner {
    pub interface_uri: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub arguments: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub versions: Option<VersionRange>,
}

impl Runner {
    pub fn command_name(&self) -> &str {
        self.command.as_deref().unwrap_or(COMMAND_RUN)
    }
}

/// How to obtain an implementation's files.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum RetrievalMethod {
    Archive {
        href: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        mime_type: Option<String>,
        #[serde(default)]
        size: u64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        extract: Option<String>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_lookup_by_name() {
        let mut implementation = Implementation::new("sha256=aa");
        implementation.commands.push(Command::new(COMMAND_RUN, "bin/tool"));
        implementation.commands.push(Command::new(COMMAND_TEST, "bin/selftest"));

        assert_eq!(
            implementation.command("test").and_then(|c| c.path.as_deref()),
            Some("bin/selftest")
        );
        assert!(implementation.command("compile").is_none());
    }

    #[test]
    fn runner_command_defaults_to_run() {
        let runner = Runner {
            interface_uri: "https://example.com/python".into(),
            command: None,
            arguments: Vec::new(),
            versions: None,
        };
        assert_eq!(runner.command_name(), "run");
    }
}
