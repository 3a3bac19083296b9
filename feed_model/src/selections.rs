//! The solver's output: one chosen implementation per interface.
//!
//! SPDX-License-Identifier: GPL-3.0-or-later

use crate::arch::Architecture;
use crate::dependency::{Binding, Dependency, Restriction};
use crate::digest::ManifestDigest;
use crate::implementation::{Command, Implementation};
use crate::stability::Stability;
use crate::version::Version;
use crate::version_range::VersionRange;
use std::path::PathBuf;

/// One interface's chosen implementation, enriched with the commands the
/// solution actually needs and their dependencies.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ImplementationSelection {
    pub interface_uri: String,
    /// Feed the implementation came from, when not the interface itself.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from_feed: Option<String>,
    pub id: String,
    pub version: Version,
    #[serde(default)]
    pub architecture: Architecture,
    #[serde(default = "Stability::default_for_selection")]
    pub stability: Stability,
    #[serde(default, skip_serializing_if = "ManifestDigest::is_empty")]
    pub digest: ManifestDigest,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub local_path: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub distribution: Option<String>,
    /// Only the commands required by the solution, in demand order.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub commands: Vec<Command>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dependencies: Vec<Dependency>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub restrictions: Vec<Restriction>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub bindings: Vec<Binding>,
}

impl Stability {
    fn default_for_selection() -> Stability {
        Stability::Testing
    }
}

impl ImplementationSelection {
    /// Creates a selection from an implementation; `commands` starts empty
    /// and is filled as the solver discovers which commands are needed.
    pub fn from_implementation(
        interface_uri: &str,
        from_feed: Option<&str>,
        implementation: &Implementation,
        version: Version,
    ) -> ImplementationSelection {
        ImplementationSelection {
            interface_uri: interface_uri.to_string(),
            from_feed: from_feed
                .filter(|f| *f != interface_uri)
                .map(|f| f.to_string()),
            id: implementation.id.clone(),
            version,
            architecture: implementation.architecture,
            stability: implementation.stability,
            digest: implementation.digest.clone(),
            local_path: implementation.local_path.clone(),
            distribution: implementation.distribution.clone(),
            commands: Vec::new(),
            dependencies: implementation.dependencies.clone(),
            restrictions: implementation.restrictions.clone(),
            bindings: implementation.bindings.clone(),
        }
    }

    pub fn command(&self, name: &str) -> Option<&Command> {
        self.commands.iter().find(|c| c.name == name)
    }
}

/// A constraint one selection places on another interface, collected when
/// checking candidate compatibility.
#[derive(Clone, Debug, PartialEq)]
pub struct AppliedRestriction {
    pub versions: Option<VersionRange>,
    pub distributions: Vec<String>,
}

/// An ordered set of selections, at most one per interface. Built mutably
/// during a solver run; cloned wholesale for backtracking snapshots.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Selections {
    #[serde(rename = "interface")]
    pub interface_uri: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
    /// Set when the result may be based on stale feeds (a refresh pass was
    /// needed but failed with a network error).
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub stale: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub implementations: Vec<ImplementationSelection>,
}

impl Selections {
    pub fn new(interface_uri: impl Into<String>, command: Option<String>) -> Selections {
        Selections {
            interface_uri: interface_uri.into(),
            command,
            stale: false,
            implementations: Vec::new(),
        }
    }

    pub fn contains(&self, interface_uri: &str) -> bool {
        self.get(interface_uri).is_some()
    }

    pub fn get(&self, interface_uri: &str) -> Option<&ImplementationSelection> {
        self.implementations
            .iter()
            .find(|s| s.interface_uri == interface_uri)
    }

    pub fn get_mut(&mut self, interface_uri: &str) -> Option<&mut ImplementationSelection> {
        self.implementations
            .iter_mut()
            .find(|s| s.interface_uri == interface_uri)
    }

    pub fn insert(&mut self, selection: ImplementationSelection) {
        debug_assert!(!self.contains(&selection.interface_uri));
        self.implementations.push(selection);
    }

    pub fn remove(&mut self, interface_uri: &str) {
        self.implementations
            .retain(|s| s.interface_uri != interface_uri);
    }

    /// All constraints the current selections place on `interface_uri`:
    /// dependencies act as restrictions, explicit restrictions too, from
    /// both implementations and their selected commands.
    pub fn restrictions_for(&self, interface_uri: &str) -> Vec<AppliedRestriction> {
        let mut found = Vec::new();
        for selection in &self.implementations {
            for dep in selection
                .dependencies
                .iter()
                .chain(selection.commands.iter().flat_map(|c| c.dependencies.iter()))
            {
                if dep.interface_uri == interface_uri {
                    found.push(AppliedRestriction {
                        versions: dep.versions.clone(),
                        distributions: dep.distributions.clone(),
                    });
                }
            }
            for restriction in selection
                .restrictions
                .iter()
                .chain(selection.commands.iter().flat_map(|c| c.restrictions.iter()))
            {
                if restriction.interface_uri == interface_uri {
                    found.push(AppliedRestriction {
                        versions: restriction.versions.clone(),
                        distributions: restriction.distributions.clone(),
                    });
                }
            }
        }
        found
    }

    /// True if any selection is 32-bit / 64-bit; used to keep solutions from
    /// mixing CPU word sizes.
    pub fn contains_32bit(&self) -> bool {
        self.implementations
            .iter()
            .any(|s| s.architecture.cpu.is_32bit())
    }

    pub fn contains_64bit(&self) -> bool {
        self.implementations
            .iter()
            .any(|s| s.architecture.cpu.is_64bit())
    }

    /// Drops restriction entries from all selections; they only matter while
    /// solving and would bloat the persisted document.
    pub fn purge_restrictions(&mut self) {
        for selection in &mut self.implementations {
            selection.restrictions.clear();
            for command in &mut selection.commands {
                command.restrictions.clear();
            }
        }
    }

    pub fn sort_by_interface(&mut self) {
        self.implementations
            .sort_by(|a, b| a.interface_uri.cmp(&b.interface_uri));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn selection(uri: &str, id: &str) -> ImplementationSelection {
        let mut implementation = Implementation::new(id);
        implementation.version = Some("1".parse().unwrap());
        ImplementationSelection::from_implementation(uri, None, &implementation, "1".parse().unwrap())
    }

    #[test]
    fn insert_get_remove() {
        let mut selections = Selections::new("https://example.com/app", Some("run".into()));
        selections.insert(selection("https://example.com/app", "sha256=aa"));
        assert!(selections.contains("https://example.com/app"));
        selections.remove("https://example.com/app");
        assert!(!selections.contains("https://example.com/app"));
    }

    #[test]
    fn restrictions_are_collected_from_deps_and_commands() {
        let mut sel = selection("https://example.com/app", "sha256=aa");
        let mut dep = Dependency::new("https://example.com/lib");
        dep.versions = Some("1..!2".parse().unwrap());
        sel.dependencies.push(dep);

        let mut command = Command::new("run", "bin/app");
        command
            .restrictions
            .push(Restriction::new("https://example.com/lib"));
        sel.commands.push(command);

        let mut selections = Selections::new("https://example.com/app", None);
        selections.insert(sel);

        let applied = selections.restrictions_for("https://example.com/lib");
        assert_eq!(applied.len(), 2);
        assert_eq!(
            applied[0].versions.as_ref().map(|r| r.to_string()),
            Some("1..!2".to_string())
        );
    }

    #[test]
    fn snapshot_restore_via_clone() {
        let mut selections = Selections::new("https://example.com/app", None);
        selections.insert(selection("https://example.com/app", "sha256=aa"));
        let snapshot = selections.clone();

        selections.insert(selection("https://example.com/lib", "sha256=bb"));
        assert_eq!(selections.implementations.len(), 2);

        let restored = snapshot;
        assert_eq!(restored.implementations.len(), 1);
    }
}
