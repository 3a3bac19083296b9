//! Solver-wide configuration, passed explicitly to constructors.
//!
//! SPDX-License-Identifier: GPL-3.0-or-later

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// How much network access the solver may assume. Ordered: `Offline` <
/// `Minimal` < `Full`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NetworkUse {
    /// Only cached implementations are usable.
    Offline,
    /// Downloads allowed, but cached candidates are strongly preferred.
    Minimal,
    Full,
}

impl Default for NetworkUse {
    fn default() -> NetworkUse {
        NetworkUse::Full
    }
}

#[derive(Clone, Debug, Default)]
pub struct SolverConfig {
    pub network_use: NetworkUse,
    /// Restrict candidates to this distribution (plus `zero-install`
    /// feed implementations when it is unset).
    pub distribution: Option<String>,
}

/// Cooperative cancellation shared between the caller and a running solve.
#[derive(Clone, Default)]
pub struct CancellationFlag(Arc<AtomicBool>);

impl CancellationFlag {
    pub fn new() -> CancellationFlag {
        CancellationFlag::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn network_use_is_ordered() {
        assert!(NetworkUse::Offline < NetworkUse::Minimal);
        assert!(NetworkUse::Minimal < NetworkUse::Full);
    }

    #[test]
    fn cancellation_flag_is_shared() {
        let flag = CancellationFlag::new();
        let clone = flag.clone();
        assert!(!clone.is_cancelled());
        flag.cancel();
        assert!(clone.is_cancelled());
    }
}
