//! Composition: try one solver, fall back to another on structural failure.
//!
//! SPDX-License-Identifier: GPL-3.0-or-later

use crate::backtracking::Solver;
use crate::errors::SolverError;
use hatch_feed_model::{Requirements, Selections};

/// Delegates to `primary`; on a structural failure retries on `secondary`.
/// When the secondary then fails with a *network* error, the primary's
/// original error is re-raised so users see the real problem, not the
/// inability to reach a backup solver.
pub struct FallbackSolver<P, S> {
    primary: P,
    secondary: S,
}

impl<P: Solver, S: Solver> FallbackSolver<P, S> {
    pub fn new(primary: P, secondary: S) -> FallbackSolver<P, S> {
        FallbackSolver { primary, secondary }
    }
}

impl<P: Solver, S: Solver> Solver for FallbackSolver<P, S> {
    fn solve(&self, requirements: &Requirements, refresh: bool) -> Result<Selections, SolverError> {
        let primary_error = match self.primary.solve(requirements, refresh) {
            Ok(selections) => return Ok(selections),
            // Cancellation must never trigger a retry.
            Err(SolverError::Cancelled) => return Err(SolverError::Cancelled),
            Err(e) => e,
        };
        info!("Primary solver failed ({}); trying fallback", primary_error);

        match self.secondary.solve(requirements, refresh) {
            Ok(selections) => Ok(selections),
            Err(secondary_error) if secondary_error.is_network_error() => {
                warn!(
                    "Fallback solver failed with a network error ({}); reporting the original problem",
                    secondary_error
                );
                Err(primary_error)
            }
            Err(e) => Err(e),
        }
    }
}
