//! One solver run: depth-first backtracking over compatible candidates.
//!
//! SPDX-License-Identifier: GPL-3.0-or-later

use crate::candidate::SelectionCandidate;
use crate::config::CancellationFlag;
use crate::demand::SolverDemand;
use crate::errors::SolverError;
use crate::provider::{CandidateProvider, DISTRIBUTION_FEED};
use hatch_feed_model::implementation::Command;
use hatch_feed_model::selections::ImplementationSelection;
use hatch_feed_model::{Importance, Requirements, Selections};
use std::collections::HashMap;

/// Failed branches allowed before the run gives up; bounds worst-case time
/// on pathological graphs.
const MAX_BACKTRACKS: u32 = 128;

/// Candidates tried per demand before concluding it cannot be fulfilled.
const SEARCH_WIDTH: usize = 32;

/// Above this many essential demands, trying every permutation would blow up
/// factorially; heuristic orderings are used instead.
const PERMUTATION_LIMIT: usize = 6;

/// State of a single `solve` call. Created fresh per call; the solver object
/// itself stays shareable because nothing run-scoped lives on it.
pub struct SolverRun<'a> {
    provider: &'a CandidateProvider,
    cancel: &'a CancellationFlag,
    selections: Selections,
    /// The candidate behind each selection, for command synthesis.
    picked: HashMap<String, SelectionCandidate>,
    backtracks: u32,
}

impl<'a> SolverRun<'a> {
    pub fn new(provider: &'a CandidateProvider, cancel: &'a CancellationFlag) -> SolverRun<'a> {
        SolverRun {
            provider,
            cancel,
            selections: Selections::default(),
            picked: HashMap::new(),
            backtracks: 0,
        }
    }

    pub fn solve(mut self, requirements: &Requirements) -> Result<Selections, SolverError> {
        let requirements = requirements.for_current_system();
        self.selections =
            Selections::new(&requirements.interface_uri, requirements.command.clone());

        let fulfilled = self.try_fulfill(&SolverDemand::top_level(&requirements))?;
        if fulfilled {
            self.selections.purge_restrictions();
            self.selections.sort_by_interface();
            Ok(self.selections)
        } else {
            // Prefer showing a failed download over a bare "no solution";
            // the network problem is usually the actual cause.
            Err(match self.provider.first_feed_failure() {
                Some((uri, message)) => SolverError::FeedFailure {
                    uri,
                    source: anyhow::anyhow!(message),
                },
                None => SolverError::NoSolution,
            })
        }
    }

    fn compatible_candidates(&self, demand: &SolverDemand) -> Vec<SelectionCandidate> {
        self.provider
            .candidates(&demand.requirements, &demand.distributions)
            .into_iter()
            .filter(|c| self.is_compatible(c, demand))
            .collect()
    }

    /// Compatibility of a candidate with the current partial solution:
    /// suitable in itself, no word-size clash, inside every range already
    /// imposed on its interface, and not in conflict with any restriction it
    /// carries itself.
    fn is_compatible(&self, candidate: &SelectionCandidate, demand: &SolverDemand) -> bool {
        if !candidate.is_suitable() {
            return false;
        }

        let cpu = candidate.implementation.architecture.cpu;
        if cpu.is_32bit() && self.selections.contains_64bit() {
            return false;
        }
        if cpu.is_64bit() && self.selections.contains_32bit() {
            return false;
        }

        if !demand.versions.iter().all(|r| r.matches(&candidate.version)) {
            return false;
        }

        for applied in self
            .selections
            .restrictions_for(&demand.requirements.interface_uri)
        {
            if let Some(range) = &applied.versions {
                if !range.matches(&candidate.version) {
                    return false;
                }
            }
            // Distribution lists only constrain external packages.
            if let Some(distribution) = candidate.implementation.distribution.as_deref() {
                if !applied.distributions.is_empty()
                    && !applied.distributions.iter().any(|d| d == distribution)
                {
                    return false;
                }
            }
        }

        for restriction in &candidate.implementation.restrictions {
            let Some(selected) = self.selections.get(&restriction.interface_uri) else {
                continue;
            };
            if let Some(range) = &restriction.versions {
                if !range.matches(&selected.version) {
                    return false;
                }
            }
            if !restriction.distributions.is_empty() {
                let distribution = selected
                    .distribution
                    .as_deref()
                    .unwrap_or(DISTRIBUTION_FEED);
                if !restriction.distributions.iter().any(|d| d == distribution) {
                    return false;
                }
            }
        }

        true
    }

    fn try_fulfill(&mut self, demand: &SolverDemand) -> Result<bool, SolverError> {
        if self.cancel.is_cancelled() {
            return Err(SolverError::Cancelled);
        }

        let candidates = self.compatible_candidates(demand);
        let uri = demand.requirements.interface_uri.clone();

        if self.selections.contains(&uri) {
            return self.fulfill_against_existing(demand, &candidates, &uri);
        }

        let command_name = demand.requirements.command.clone().unwrap_or_default();
        for candidate in candidates.into_iter().take(SEARCH_WIDTH) {
            let mut selection = ImplementationSelection::from_implementation(
                &uri,
                Some(&candidate.feed_uri),
                &candidate.implementation,
                candidate.version.clone(),
            );
            if !command_name.is_empty() {
                match candidate.implementation.command(&command_name) {
                    Some(command) => selection.commands.push(command.clone()),
                    // No such command; this candidate was never viable.
                    None => continue,
                }
            }

            self.selections.insert(selection);
            let demands = self.demands_for(&candidate, &demand.requirements);
            self.picked.insert(uri.clone(), candidate);

            if self.try_fulfill_all(&demands)? {
                return Ok(true);
            }

            self.selections.remove(&uri);
            self.picked.remove(&uri);
            self.note_backtrack()?;
        }

        // An unfulfilled recommendation is not a failure; the interface is
        // simply left unselected.
        Ok(demand.importance == Importance::Recommended)
    }

    /// The interface is already bound: the demand must be satisfied by the
    /// existing selection or not at all. This is also what keeps cyclic
    /// dependency graphs finite.
    fn fulfill_against_existing(
        &mut self,
        demand: &SolverDemand,
        candidates: &[SelectionCandidate],
        uri: &str,
    ) -> Result<bool, SolverError> {
        let existing_id = match self.selections.get(uri) {
            Some(selection) => selection.id.clone(),
            None => return Ok(false),
        };
        if !candidates.iter().any(|c| c.id() == existing_id) {
            return Ok(false);
        }

        let command_name = demand.requirements.command.clone().unwrap_or_default();
        if command_name.is_empty()
            || self
                .selections
                .get(uri)
                .is_some_and(|s| s.command(&command_name).is_some())
        {
            return Ok(true);
        }

        // The selection lacks the required command: synthesise it from the
        // implementation it was selected from and expand the demands the new
        // command brings in.
        let Some(picked) = self.picked.get(uri) else {
            return Ok(false);
        };
        let Some(command) = picked.implementation.command(&command_name).cloned() else {
            return Ok(false);
        };
        if let Some(selection) = self.selections.get_mut(uri) {
            selection.commands.push(command.clone());
        }
        let demands = self.demands_for_command(&demand.requirements, &command);
        self.try_fulfill_all(&demands)
    }

    /// The demands a fresh selection brings with it: its dependencies (and
    /// their executable bindings), its own executable bindings, and whatever
    /// the requested command needs.
    fn demands_for(
        &self,
        candidate: &SelectionCandidate,
        requirements: &Requirements,
    ) -> Vec<SolverDemand> {
        let mut demands = Vec::new();
        let os = requirements.architecture.os;
        let implementation = &candidate.implementation;

        for dependency in &implementation.dependencies {
            if !dependency.applies_to(os) {
                continue;
            }
            demands.push(SolverDemand::from_dependency(requirements, dependency));
            for binding in &dependency.bindings {
                if let Some(command) = binding.required_command() {
                    demands.push(SolverDemand::for_command(
                        requirements,
                        &dependency.interface_uri,
                        command,
                    ));
                }
            }
        }

        for binding in &implementation.bindings {
            if let Some(command) = binding.required_command() {
                demands.push(SolverDemand::for_command(
                    requirements,
                    &requirements.interface_uri,
                    command,
                ));
            }
        }

        let command_name = requirements.command.as_deref().unwrap_or_default();
        if !command_name.is_empty() {
            if let Some(command) = implementation.command(command_name) {
                demands.extend(self.demands_for_command(requirements, command));
            }
        }
        demands
    }

    fn demands_for_command(
        &self,
        requirements: &Requirements,
        command: &Command,
    ) -> Vec<SolverDemand> {
        let mut demands = Vec::new();
        let os = requirements.architecture.os;

        if let Some(runner) = &command.runner {
            demands.push(SolverDemand::for_runner(requirements, runner));
        }
        for dependency in &command.dependencies {
            if !dependency.applies_to(os) {
                continue;
            }
            demands.push(SolverDemand::from_dependency(requirements, dependency));
            for binding in &dependency.bindings {
                if let Some(name) = binding.required_command() {
                    demands.push(SolverDemand::for_command(
                        requirements,
                        &dependency.interface_uri,
                        name,
                    ));
                }
            }
        }
        for binding in &command.bindings {
            if let Some(name) = binding.required_command() {
                demands.push(SolverDemand::for_command(
                    requirements,
                    &requirements.interface_uri,
                    name,
                ));
            }
        }
        demands
    }

    fn try_fulfill_all(&mut self, demands: &[SolverDemand]) -> Result<bool, SolverError> {
        let (essentials, recommended): (Vec<&SolverDemand>, Vec<&SolverDemand>) = demands
            .iter()
            .partition(|d| d.importance == Importance::Essential);

        // Fast reject: an essential with zero compatible candidates can
        // never be satisfied, whatever the order.
        for demand in &essentials {
            if self.compatible_candidates(demand).is_empty()
                && !self
                    .selections
                    .contains(&demand.requirements.interface_uri)
            {
                return Ok(false);
            }
        }

        let snapshot = self.snapshot();
        for order in self.essential_orderings(&essentials) {
            let mut all_ok = true;
            for &index in &order {
                if !self.try_fulfill(essentials[index])? {
                    all_ok = false;
                    break;
                }
            }
            if !all_ok {
                self.restore(&snapshot);
                self.note_backtrack()?;
                continue;
            }

            // Recommendations after all essentials: tried, but failures are
            // silently rolled back.
            for demand in &recommended {
                let saved = self.snapshot();
                if !self.try_fulfill(demand)? {
                    self.restore(&saved);
                }
            }
            return Ok(true);
        }
        Ok(false)
    }

    /// Orders in which to try the essentials. Order can matter because of
    /// mutual restrictions; all permutations are tried for small sets, with
    /// a fallback to two heuristic orders to avoid factorial blow-up.
    fn essential_orderings(&self, essentials: &[&SolverDemand]) -> Vec<Vec<usize>> {
        let n = essentials.len();
        if n <= PERMUTATION_LIMIT {
            return permutations(n);
        }
        let declared: Vec<usize> = (0..n).collect();
        let mut by_candidate_count = declared.clone();
        let counts: Vec<usize> = essentials
            .iter()
            .map(|d| self.compatible_candidates(d).len())
            .collect();
        by_candidate_count.sort_by(|&a, &b| counts[b].cmp(&counts[a]));
        vec![declared, by_candidate_count]
    }

    fn snapshot(&self) -> (Selections, HashMap<String, SelectionCandidate>) {
        (self.selections.clone(), self.picked.clone())
    }

    fn restore(&mut self, snapshot: &(Selections, HashMap<String, SelectionCandidate>)) {
        self.selections = snapshot.0.clone();
        self.picked = snapshot.1.clone();
    }

    fn note_backtrack(&mut self) -> Result<(), SolverError> {
        self.backtracks += 1;
        if self.backtracks > MAX_BACKTRACKS {
            debug!("Backtrack budget exhausted after {} branches", self.backtracks);
            Err(SolverError::TooMuchBacktracking)
        } else {
            Ok(())
        }
    }
}

/// All permutations of `0..n`, identity first.
fn permutations(n: usize) -> Vec<Vec<usize>> {
    fn permute(current: &mut Vec<usize>, start: usize, out: &mut Vec<Vec<usize>>) {
        if start == current.len() {
            out.push(current.clone());
            return;
        }
        for i in start..current.len() {
            current.swap(start, i);
            permute(current, start + 1, out);
            current.swap(start, i);
        }
    }
    let mut out = Vec::new();
    let mut current: Vec<usize> = (0..n).collect();
    permute(&mut current, 0, &mut out);
    out
}
