//! The standard solver: one fresh backtracking run per call.
//!
//! SPDX-License-Identifier: GPL-3.0-or-later

use crate::config::{CancellationFlag, SolverConfig};
use crate::errors::SolverError;
use crate::provider::{
    CandidateProvider, FeedManager, ImplementationStore, PackageManager, PreferencesStore,
};
use crate::run::SolverRun;
use hatch_feed_model::{Requirements, Selections};
use std::sync::Arc;

/// Anything that can turn requirements into selections.
pub trait Solver: Send + Sync {
    /// Solves the requirements. With `refresh`, feeds are re-fetched rather
    /// than read from cache.
    fn solve(&self, requirements: &Requirements, refresh: bool) -> Result<Selections, SolverError>;
}

/// Depth-first backtracking solver. Shareable and re-entrant: all run state
/// lives in a per-call [`SolverRun`] and a per-call candidate provider.
pub struct BacktrackingSolver {
    feeds: Arc<dyn FeedManager>,
    packages: Arc<dyn PackageManager>,
    store: Arc<dyn ImplementationStore>,
    preferences: Arc<dyn PreferencesStore>,
    config: SolverConfig,
    cancel: CancellationFlag,
}

impl BacktrackingSolver {
    pub fn new(
        feeds: Arc<dyn FeedManager>,
        packages: Arc<dyn PackageManager>,
        store: Arc<dyn ImplementationStore>,
        preferences: Arc<dyn PreferencesStore>,
        config: SolverConfig,
        cancel: CancellationFlag,
    ) -> BacktrackingSolver {
        BacktrackingSolver {
            feeds,
            packages,
            store,
            preferences,
            config,
            cancel,
        }
    }

    fn provider(&self, refresh: bool) -> CandidateProvider {
        CandidateProvider::new(
            self.feeds.clone(),
            self.packages.clone(),
            self.store.clone(),
            self.preferences.clone(),
            self.config.clone(),
            refresh,
        )
    }
}

impl Solver for BacktrackingSolver {
    fn solve(&self, requirements: &Requirements, refresh: bool) -> Result<Selections, SolverError> {
        let provider = self.provider(refresh);
        let run = SolverRun::new(&provider, &self.cancel);
        run.solve(requirements)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::test_support::*;
    use hatch_feed_model::dependency::{Binding, Dependency};
    use hatch_feed_model::feed::{Element, Feed};
    use hatch_feed_model::implementation::{Command, Implementation, Runner};
    use hatch_feed_model::{Importance, Stability};

    fn implementation(version: &str, stability: Stability) -> Implementation {
        let mut implementation = Implementation::new(format!("sha256={}", version));
        implementation.version = Some(version.parse().unwrap());
        implementation.stability = stability;
        implementation.commands.push(Command::new("run", "bin/app"));
        implementation
    }

    fn feed_of(implementations: Vec<Implementation>) -> Feed {
        let mut feed = Feed::new("app");
        for implementation in implementations {
            feed.elements.push(Element::Implementation(implementation));
        }
        feed
    }

    fn solver_for(feeds: Arc<FakeFeeds>) -> BacktrackingSolver {
        BacktrackingSolver::new(
            feeds,
            Arc::new(NoPackages),
            Arc::new(FullStore),
            Arc::new(MemoryPreferences::default()),
            SolverConfig::default(),
            CancellationFlag::new(),
        )
    }

    const APP: &str = "https://example.com/app";
    const LIB: &str = "https://example.com/lib";

    #[test]
    fn picks_newest_stable_version() {
        let feeds = Arc::new(FakeFeeds::default());
        feeds.insert(
            APP,
            feed_of(vec![
                implementation("1.0", Stability::Stable),
                implementation("1.1", Stability::Testing),
                implementation("1.2", Stability::Stable),
            ]),
        );
        let selections = solver_for(feeds)
            .solve(&Requirements::new(APP), false)
            .unwrap();
        assert_eq!(selections.implementations.len(), 1);
        assert_eq!(selections.get(APP).unwrap().version.to_string(), "1.2");
    }

    #[test]
    fn testing_policy_does_not_prefer_older_stable() {
        let feeds = Arc::new(FakeFeeds::default());
        feeds.insert(
            APP,
            feed_of(vec![
                implementation("1.0", Stability::Stable),
                implementation("1.1", Stability::Testing),
                implementation("1.2", Stability::Stable),
            ]),
        );
        let prefs = MemoryPreferences::default();
        prefs.interfaces.lock().unwrap().insert(
            APP.into(),
            hatch_feed_model::preferences::InterfacePreferences {
                stability_policy: Some(Stability::Testing),
                feeds: Vec::new(),
            },
        );
        let solver = BacktrackingSolver::new(
            feeds,
            Arc::new(NoPackages),
            Arc::new(FullStore),
            Arc::new(prefs),
            SolverConfig::default(),
            CancellationFlag::new(),
        );
        let selections = solver.solve(&Requirements::new(APP), false).unwrap();
        // 1.2 beats 1.1 even though testing is now acceptable.
        assert_eq!(selections.get(APP).unwrap().version.to_string(), "1.2");
    }

    #[test]
    fn extra_restriction_excludes_versions() {
        let feeds = Arc::new(FakeFeeds::default());
        feeds.insert(
            APP,
            feed_of(vec![
                implementation("1.0", Stability::Stable),
                implementation("1.1", Stability::Stable),
                implementation("1.2", Stability::Stable),
            ]),
        );
        let mut requirements = Requirements::new(APP);
        requirements
            .extra_restrictions
            .insert(APP.into(), "..!1.1".parse().unwrap());
        let selections = solver_for(feeds).solve(&requirements, false).unwrap();
        assert_eq!(selections.get(APP).unwrap().version.to_string(), "1.0");
    }

    #[test]
    fn dependencies_are_expanded_and_constrained() {
        let feeds = Arc::new(FakeFeeds::default());
        let mut app = implementation("1.0", Stability::Stable);
        let mut dep = Dependency::new(LIB);
        dep.versions = Some("2..!3".parse().unwrap());
        app.dependencies.push(dep);
        feeds.insert(APP, feed_of(vec![app]));

        let mut lib_v1 = implementation("1.5", Stability::Stable);
        lib_v1.commands.clear();
        let mut lib_v2 = implementation("2.5", Stability::Stable);
        lib_v2.commands.clear();
        let mut lib_v3 = implementation("3.5", Stability::Stable);
        lib_v3.commands.clear();
        feeds.insert(LIB, feed_of(vec![lib_v1, lib_v2, lib_v3]));

        let selections = solver_for(feeds)
            .solve(&Requirements::new(APP), false)
            .unwrap();
        assert_eq!(selections.implementations.len(), 2);
        assert_eq!(selections.get(LIB).unwrap().version.to_string(), "2.5");
        // Solver output is sorted by interface URI.
        assert_eq!(selections.implementations[0].interface_uri, APP);
    }

    #[test]
    fn unsatisfiable_essential_dependency_fails() {
        let feeds = Arc::new(FakeFeeds::default());
        let mut app = implementation("1.0", Stability::Stable);
        let mut dep = Dependency::new(LIB);
        dep.versions = Some("9..".parse().unwrap());
        app.dependencies.push(dep);
        feeds.insert(APP, feed_of(vec![app]));
        feeds.insert(LIB, feed_of(vec![implementation("1.0", Stability::Stable)]));

        let result = solver_for(feeds).solve(&Requirements::new(APP), false);
        assert!(matches!(result, Err(SolverError::NoSolution)));
    }

    #[test]
    fn recommended_dependency_failure_is_tolerated() {
        let feeds = Arc::new(FakeFeeds::default());
        let mut app = implementation("1.0", Stability::Stable);
        let mut dep = Dependency::new(LIB);
        dep.importance = Importance::Recommended;
        app.dependencies.push(dep);
        feeds.insert(APP, feed_of(vec![app]));
        // The lib feed does not even exist.

        let selections = solver_for(feeds)
            .solve(&Requirements::new(APP), false)
            .unwrap();
        assert_eq!(selections.implementations.len(), 1);
        assert!(selections.get(LIB).is_none());
    }

    #[test]
    fn runner_pulls_in_interpreter() {
        const PYTHON: &str = "https://example.com/python";
        let feeds = Arc::new(FakeFeeds::default());

        let mut app = Implementation::new("sha256=app");
        app.version = Some("1.0".parse().unwrap());
        app.stability = Stability::Stable;
        let mut run = Command::new("run", "app.py");
        run.runner = Some(Runner {
            interface_uri: PYTHON.into(),
            command: None,
            arguments: Vec::new(),
            versions: None,
        });
        app.commands.push(run);
        feeds.insert(APP, feed_of(vec![app]));
        feeds.insert(
            PYTHON,
            feed_of(vec![implementation("3.12", Stability::Stable)]),
        );

        let selections = solver_for(feeds)
            .solve(&Requirements::new(APP), false)
            .unwrap();
        let python = selections.get(PYTHON).unwrap();
        assert_eq!(python.version.to_string(), "3.12");
        // The runner needs the interpreter's `run` command selected.
        assert!(python.command("run").is_some());
    }

    #[test]
    fn executable_binding_selects_named_command() {
        let feeds = Arc::new(FakeFeeds::default());
        let mut app = implementation("1.0", Stability::Stable);
        let mut dep = Dependency::new(LIB);
        dep.bindings.push(Binding::ExecutableInPath {
            name: "helper".into(),
            command: Some("helper".into()),
        });
        app.dependencies.push(dep);
        feeds.insert(APP, feed_of(vec![app]));

        let mut lib = implementation("2.0", Stability::Stable);
        lib.commands.push(Command::new("helper", "bin/helper"));
        feeds.insert(LIB, feed_of(vec![lib]));

        let selections = solver_for(feeds)
            .solve(&Requirements::new(APP), false)
            .unwrap();
        let lib = selections.get(LIB).unwrap();
        assert!(lib.command("helper").is_some());
    }

    #[test]
    fn conflicting_restriction_forces_backtrack() {
        // lib 2.0 restricts app to versions < 2; app 2.0 is preferred but
        // pulling lib in then rules it out, so the solver falls back to
        // app 1.0.
        let feeds = Arc::new(FakeFeeds::default());

        let mut app2 = implementation("2.0", Stability::Stable);
        let mut app1 = implementation("1.0", Stability::Stable);
        let dep = Dependency::new(LIB);
        app2.dependencies.push(dep.clone());
        app1.dependencies.push(dep);
        feeds.insert(APP, feed_of(vec![app1, app2]));

        let mut lib = implementation("1.0", Stability::Stable);
        lib.commands.clear();
        lib.restrictions
            .push(hatch_feed_model::dependency::Restriction {
                interface_uri: APP.into(),
                versions: Some("..!2".parse().unwrap()),
                os: None,
                distributions: Vec::new(),
            });
        feeds.insert(LIB, feed_of(vec![lib]));

        let selections = solver_for(feeds)
            .solve(&Requirements::new(APP), false)
            .unwrap();
        assert_eq!(selections.get(APP).unwrap().version.to_string(), "1.0");
        assert!(selections.get(LIB).is_some());
    }

    #[test]
    fn cancellation_aborts_the_run() {
        let feeds = Arc::new(FakeFeeds::default());
        feeds.insert(APP, feed_of(vec![implementation("1.0", Stability::Stable)]));
        let cancel = CancellationFlag::new();
        cancel.cancel();
        let solver = BacktrackingSolver::new(
            feeds,
            Arc::new(NoPackages),
            Arc::new(FullStore),
            Arc::new(MemoryPreferences::default()),
            SolverConfig::default(),
            cancel,
        );
        assert!(matches!(
            solver.solve(&Requirements::new(APP), false),
            Err(SolverError::Cancelled)
        ));
    }

    #[test]
    fn feed_failure_is_surfaced_on_no_solution() {
        let feeds = Arc::new(FakeFeeds::default());
        feeds
            .fail
            .lock()
            .unwrap()
            .insert(APP.into(), "timed out".into());
        let result = solver_for(feeds).solve(&Requirements::new(APP), false);
        match result {
            Err(SolverError::FeedFailure { uri, .. }) => assert_eq!(uri, APP),
            other => panic!("expected FeedFailure, got {:?}", other.map(|_| ())),
        }
    }
}
