//! Solver error taxonomy.
//!
//! SPDX-License-Identifier: GPL-3.0-or-later

use thiserror::Error;

#[derive(Error, Debug)]
pub enum SolverError {
    /// No combination of candidates satisfies all essential demands.
    #[error("No solution found")]
    NoSolution,

    /// The per-run backtrack budget ran out; the dependency graph is too
    /// pathological to search exhaustively.
    #[error("Too much backtracking; giving up")]
    TooMuchBacktracking,

    /// A feed could not be loaded; when the solve then fails, the first such
    /// error is surfaced so users see the network problem rather than a bare
    /// "no solution".
    #[error("feed {uri} could not be loaded")]
    FeedFailure {
        uri: String,
        #[source]
        source: anyhow::Error,
    },

    /// This solver cannot handle the request (e.g. an external solver
    /// binary that does not speak our API version).
    #[error("not supported: {0}")]
    NotSupported(String),

    /// The external solver subprocess misbehaved.
    #[error("external solver protocol error: {0}")]
    Protocol(String),

    /// The external solver ran fine but reported a solve failure.
    #[error("external solver failed: {0}")]
    External(String),

    #[error("solve cancelled")]
    Cancelled,

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl SolverError {
    /// Errors caused by the network rather than by the dependency graph.
    pub fn is_network_error(&self) -> bool {
        matches!(self, SolverError::FeedFailure { .. })
    }
}
