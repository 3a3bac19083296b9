//! Dependencies, restrictions and bindings between interfaces.
//!
//! SPDX-License-Identifier: GPL-3.0-or-later

use crate::arch::Os;
use crate::stability::Importance;
use crate::version_range::VersionRange;

/// Default command name for executable bindings that do not name one.
pub const DEFAULT_COMMAND: &str = "run";

/// Instructions for making a dependency visible to the depender at run time.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum Binding {
    /// Export a location inside the implementation via an environment
    /// variable (`PATH`-style prepend/append or plain overwrite).
    Environment {
        name: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        insert: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        value: Option<String>,
        #[serde(default)]
        mode: EnvironmentMode,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        separator: Option<String>,
    },
    /// Expose one of the provider's commands through a named variable.
    ExecutableInVar {
        name: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        command: Option<String>,
    },
    /// Expose one of the provider's commands on the search path.
    ExecutableInPath {
        name: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        command: Option<String>,
    },
}

impl Binding {
    /// The command of the *providing* interface this binding needs, if any.
    /// The solver must make sure that command gets selected too.
    pub fn required_command(&self) -> Option<&str> {
        match self {
            Binding::Environment { .. } => None,
            Binding::ExecutableInVar { command, .. }
            | Binding::ExecutableInPath { command, .. } => {
                Some(command.as_deref().unwrap_or(DEFAULT_COMMAND))
            }
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EnvironmentMode {
    Prepend,
    Append,
    Replace,
}

impl Default for EnvironmentMode {
    fn default() -> EnvironmentMode {
        EnvironmentMode::Prepend
    }
}

/// A requirement on another interface, carrying bindings that activate the
/// chosen implementation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dependency {
    pub interface_uri: String,
    /// Acceptable versions of the provider; absent means any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub versions: Option<VersionRange>,
    /// Only applies when running on this OS.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub os: Option<Os>,
    /// Allow-list of distributions the provider may come from; empty = any.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub distributions: Vec<String>,
    #[serde(default)]
    pub importance: Importance,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub bindings: Vec<Binding>,
}

impl Dependency {
    pub fn new(interface_uri: impl Into<String>) -> Dependency {
        Dependency {
            interface_uri: interface_uri.into(),
            versions: None,
            os: None,
            distributions: Vec::new(),
            importance: Importance::Essential,
            bindings: Vec::new(),
        }
    }

    /// Whether this dependency applies on the given OS at all.
    pub fn applies_to(&self, os: Os) -> bool {
        match self.os {
            Some(required) => required.runs_on(os),
            None => true,
        }
    }
}

/// Like a dependency, but only constrains: no bindings, no importance. Used
/// to rule out provider versions without creating a dependency edge.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Restriction {
    pub interface_uri: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub versions: Option<VersionRange>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub os: Option<Os>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub distributions: Vec<String>,
}

impl Restriction {
    pub fn new(interface_uri: impl Into<String>) -> Restriction {
        Restriction {
            interface_uri: interface_uri.into(),
            versions: None,
            os: None,
            distributions: Vec::new(),
        }
    }
}
