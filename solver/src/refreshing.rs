//! Composition: re-solve with fresh feeds when the first pass used stale
//! ones.
//!
//! SPDX-License-Identifier: GPL-3.0-or-later

use crate::backtracking::Solver;
use crate::errors::SolverError;
use crate::provider::FeedManager;
use hatch_feed_model::{Requirements, Selections};
use std::sync::Arc;

/// Solves once; if any feed involved in the result is stale, solves again in
/// refresh mode. A network error during the refresh pass keeps the first
/// result and marks it stale so callers can tell.
pub struct RefreshingSolver<S> {
    inner: S,
    feeds: Arc<dyn FeedManager>,
}

impl<S: Solver> RefreshingSolver<S> {
    pub fn new(inner: S, feeds: Arc<dyn FeedManager>) -> RefreshingSolver<S> {
        RefreshingSolver { inner, feeds }
    }

    fn uses_stale_feeds(&self, requirements: &Requirements, selections: &Selections) -> bool {
        if self.feeds.is_stale(&requirements.interface_uri) {
            return true;
        }
        selections.implementations.iter().any(|selection| {
            self.feeds.is_stale(&selection.interface_uri)
                || selection
                    .from_feed
                    .as_deref()
                    .is_some_and(|feed| self.feeds.is_stale(feed))
        })
    }
}

impl<S: Solver> Solver for RefreshingSolver<S> {
    fn solve(&self, requirements: &Requirements, refresh: bool) -> Result<Selections, SolverError> {
        let mut selections = self.inner.solve(requirements, refresh)?;
        if refresh || !self.uses_stale_feeds(requirements, &selections) {
            return Ok(selections);
        }

        info!("Feeds are stale; solving again with refresh");
        match self.inner.solve(requirements, true) {
            Ok(fresh) => Ok(fresh),
            Err(e) if e.is_network_error() => {
                warn!("Refresh pass failed ({}); keeping possibly stale result", e);
                selections.stale = true;
                Ok(selections)
            }
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::test_support::FakeFeeds;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;

    struct Scripted {
        calls: AtomicU32,
        /// Result per call index.
        script: Mutex<Vec<Result<String, ()>>>,
    }

    impl Scripted {
        fn new(script: Vec<Result<String, ()>>) -> Scripted {
            Scripted {
                calls: AtomicU32::new(0),
                script: Mutex::new(script),
            }
        }
    }

    impl Solver for Scripted {
        fn solve(
            &self,
            requirements: &Requirements,
            _refresh: bool,
        ) -> Result<Selections, SolverError> {
            let index = self.calls.fetch_add(1, Ordering::SeqCst) as usize;
            match &self.script.lock().unwrap()[index] {
                Ok(tag) => {
                    let mut selections = Selections::new(&requirements.interface_uri, None);
                    selections.command = Some(tag.clone());
                    Ok(selections)
                }
                Err(()) => Err(SolverError::FeedFailure {
                    uri: requirements.interface_uri.clone(),
                    source: anyhow::anyhow!("offline"),
                }),
            }
        }
    }

    const APP: &str = "https://example.com/app";

    #[test]
    fn fresh_feeds_solve_once() {
        let feeds = Arc::new(FakeFeeds::default());
        let solver = RefreshingSolver::new(Scripted::new(vec![Ok("first".into())]), feeds);
        let selections = solver.solve(&Requirements::new(APP), false).unwrap();
        assert_eq!(selections.command.as_deref(), Some("first"));
        assert!(!selections.stale);
    }

    #[test]
    fn stale_feeds_trigger_second_pass() {
        let feeds = Arc::new(FakeFeeds::default());
        feeds.stale.lock().unwrap().push(APP.to_string());
        let solver = RefreshingSolver::new(
            Scripted::new(vec![Ok("first".into()), Ok("second".into())]),
            feeds,
        );
        let selections = solver.solve(&Requirements::new(APP), false).unwrap();
        assert_eq!(selections.command.as_deref(), Some("second"));
    }

    #[test]
    fn refresh_network_failure_keeps_first_result_marked_stale() {
        let feeds = Arc::new(FakeFeeds::default());
        feeds.stale.lock().unwrap().push(APP.to_string());
        let solver =
            RefreshingSolver::new(Scripted::new(vec![Ok("first".into()), Err(())]), feeds);
        let selections = solver.solve(&Requirements::new(APP), false).unwrap();
        assert_eq!(selections.command.as_deref(), Some("first"));
        assert!(selections.stale);
    }

    #[test]
    fn explicit_refresh_never_runs_twice() {
        let feeds = Arc::new(FakeFeeds::default());
        feeds.stale.lock().unwrap().push(APP.to_string());
        let scripted = Scripted::new(vec![Ok("only".into())]);
        let solver = RefreshingSolver::new(scripted, feeds);
        let selections = solver.solve(&Requirements::new(APP), true).unwrap();
        assert_eq!(selections.command.as_deref(), Some("only"));
    }
}
