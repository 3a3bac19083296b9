//! Demands: the units of work the backtracking solver fulfils.
//!
//! SPDX-License-Identifier: GPL-3.0-or-later

use hatch_feed_model::dependency::Dependency;
use hatch_feed_model::implementation::Runner;
use hatch_feed_model::{Importance, Requirements, VersionRange};

/// A request to have some interface selected, with constraints accumulated
/// from the dependency edge that created the demand.
#[derive(Clone, Debug)]
pub struct SolverDemand {
    /// Narrowed requirements: interface URI and command of the demand, with
    /// architecture, languages and extra restrictions inherited from the
    /// top level.
    pub requirements: Requirements,
    /// Ranges the candidate version must *all* match, in addition to the
    /// ones folded into `requirements.extra_restrictions`. Non-empty only
    /// when an intersection could not be expressed as a single range.
    pub versions: Vec<VersionRange>,
    /// Distribution allow-list from the dependency; empty = any.
    pub distributions: Vec<String>,
    pub importance: Importance,
}

impl SolverDemand {
    /// The root demand of a solver run.
    pub fn top_level(requirements: &Requirements) -> SolverDemand {
        SolverDemand {
            requirements: requirements.clone(),
            versions: Vec::new(),
            distributions: Vec::new(),
            importance: Importance::Essential,
        }
    }

    /// Demand arising from a dependency edge. The dependency's version range
    /// is intersected into the inherited restrictions where possible; when
    /// the intersection is not expressible, both ranges are kept and must
    /// match independently.
    pub fn from_dependency(parent: &Requirements, dependency: &Dependency) -> SolverDemand {
        let mut demand = SolverDemand {
            requirements: narrowed(parent, &dependency.interface_uri, ""),
            versions: Vec::new(),
            distributions: dependency.distributions.clone(),
            importance: dependency.importance,
        };
        if let Some(range) = &dependency.versions {
            demand.constrain(&dependency.interface_uri, range);
        }
        demand
    }

    /// Demand for a specific command of an interface (from an executable
    /// binding, or for a selection that still lacks the command).
    pub fn for_command(parent: &Requirements, interface_uri: &str, command: &str) -> SolverDemand {
        SolverDemand {
            requirements: narrowed(parent, interface_uri, command),
            versions: Vec::new(),
            distributions: Vec::new(),
            importance: Importance::Essential,
        }
    }

    /// Demand for a command's runner interface.
    pub fn for_runner(parent: &Requirements, runner: &Runner) -> SolverDemand {
        let mut demand = SolverDemand {
            requirements: narrowed(parent, &runner.interface_uri, runner.command_name()),
            versions: Vec::new(),
            distributions: Vec::new(),
            importance: Importance::Essential,
        };
        if let Some(range) = &runner.versions {
            demand.constrain(&runner.interface_uri, range);
        }
        demand
    }

    fn constrain(&mut self, interface_uri: &str, range: &VersionRange) {
        match self.requirements.extra_restrictions.get(interface_uri) {
            Some(existing) => match existing.intersect(range) {
                Ok(merged) => {
                    self.requirements
                        .extra_restrictions
                        .insert(interface_uri.to_string(), merged);
                }
                // Not expressible as one range; keep both constraints.
                Err(_) => self.versions.push(range.clone()),
            },
            None => {
                self.requirements
                    .extra_restrictions
                    .insert(interface_uri.to_string(), range.clone());
            }
        }
    }
}

fn narrowed(parent: &Requirements, interface_uri: &str, command: &str) -> Requirements {
    let mut requirements = parent.clone();
    requirements.interface_uri = interface_uri.to_string();
    requirements.command = Some(command.to_string());
    requirements
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dependency_range_folds_into_restrictions() {
        let mut parent = Requirements::new("https://example.com/app").for_current_system();
        parent.extra_restrictions.insert(
            "https://example.com/lib".into(),
            "..!3".parse().unwrap(),
        );

        let mut dep = Dependency::new("https://example.com/lib");
        dep.versions = Some("1..".parse().unwrap());
        let demand = SolverDemand::from_dependency(&parent, &dep);

        assert!(demand.versions.is_empty());
        assert_eq!(
            demand
                .requirements
                .extra_restrictions
                .get("https://example.com/lib")
                .unwrap()
                .to_string(),
            "1..!3"
        );
        assert_eq!(demand.requirements.command.as_deref(), Some(""));
    }

    #[test]
    fn unexpressible_intersection_keeps_both_ranges() {
        let mut parent = Requirements::new("https://example.com/app").for_current_system();
        parent.extra_restrictions.insert(
            "https://example.com/lib".into(),
            "1..!3".parse().unwrap(),
        );

        let mut dep = Dependency::new("https://example.com/lib");
        dep.versions = Some("!2".parse().unwrap());
        let demand = SolverDemand::from_dependency(&parent, &dep);

        assert_eq!(demand.versions.len(), 1);
        assert_eq!(demand.versions[0].to_string(), "!2");
        // The inherited range is untouched.
        assert_eq!(
            demand
                .requirements
                .extra_restrictions
                .get("https://example.com/lib")
                .unwrap()
                .to_string(),
            "1..!3"
        );
    }

    #[test]
    fn runner_demand_uses_declared_command() {
        let parent = Requirements::new("https://example.com/app").for_current_system();
        let runner = Runner {
            interface_uri: "https://example.com/python".into(),
            command: Some("run-gui".into()),
            arguments: Vec::new(),
            versions: None,
        };
        let demand = SolverDemand::for_runner(&parent, &runner);
        assert_eq!(
            demand.requirements.interface_uri,
            "https://example.com/python"
        );
        assert_eq!(demand.requirements.command.as_deref(), Some("run-gui"));
    }
}
