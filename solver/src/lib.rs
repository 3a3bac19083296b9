//! Dependency solver: selects one implementation per interface such that
//! every version, architecture, language, distribution and command
//! constraint is satisfied.
//!
//! SPDX-License-Identifier: GPL-3.0-or-later

#[macro_use]
extern crate log;

#[macro_use]
extern crate serde_derive;

pub mod backtracking;
pub mod candidate;
pub mod config;
pub mod demand;
pub mod disk;
pub mod errors;
pub mod external;
pub mod fallback;
pub mod provider;
pub mod refreshing;
pub mod run;
pub mod selections_xml;

pub use backtracking::{BacktrackingSolver, Solver};
pub use candidate::{SelectionCandidate, Suitability};
pub use config::{CancellationFlag, NetworkUse, SolverConfig};
pub use errors::SolverError;
pub use fallback::FallbackSolver;
pub use provider::{
    CandidateProvider, FeedManager, ImplementationStore, PackageManager, PreferencesStore,
};
pub use refreshing::RefreshingSolver;
