//! Per-interface and per-feed user preferences, stored as JSON files.
//!
//! SPDX-License-Identifier: GPL-3.0-or-later

use crate::stability::Stability;
use std::collections::BTreeMap;

/// Preferences scoped to one interface URI.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InterfacePreferences {
    /// Implementations at least this stable are treated as preferred when
    /// sorting candidates. `None` means the built-in default (stable).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stability_policy: Option<Stability>,
    /// Extra feeds the user registered for this interface.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub feeds: Vec<String>,
}

impl InterfacePreferences {
    /// The stability threshold used by the candidate sort.
    pub fn effective_stability_policy(&self) -> Stability {
        self.stability_policy.unwrap_or(Stability::Stable)
    }
}

/// Preferences scoped to one feed URI.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedPreferences {
    /// Die roll in `1..=100` deciding whether staged rollouts apply to this
    /// user. Rolled once, then never changed, so a user's rollout membership
    /// is stable across runs.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rollout_die: Option<u32>,
    /// Per-implementation preferences, keyed by implementation ID.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub implementations: BTreeMap<String, ImplementationPreferences>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImplementationPreferences {
    /// User override for the implementation's stability rating.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_stability: Option<Stability>,
}

impl FeedPreferences {
    pub fn user_stability(&self, implementation_id: &str) -> Option<Stability> {
        self.implementations
            .get(implementation_id)?
            .user_stability
    }

    /// Returns the persistent rollout die, rolling it first if absent.
    /// `roll` supplies the random value (in `1..=100`) so callers control
    /// the RNG.
    pub fn ensure_rollout_die(&mut self, roll: impl FnOnce() -> u32) -> u32 {
        match self.rollout_die {
            Some(die) => die,
            None => {
                let die = roll().clamp(1, 100);
                self.rollout_die = Some(die);
                die
            }
        }
    }
}
