//! Stability and importance orderings.
//!
//! SPDX-License-Identifier: GPL-3.0-or-later

use std::fmt;
use std::str::FromStr;

/// How much an implementation is to be trusted. The declaration order is the
/// total order: earlier variants are preferred over later ones.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stability {
    /// User override: always wins.
    Preferred,
    /// Provided by the native distribution's package manager.
    Packaged,
    Stable,
    Testing,
    Developer,
    /// Known broken; never selected automatically.
    Buggy,
    /// Known vulnerable; never selected automatically.
    Insecure,
}

impl Stability {
    pub fn as_str(self) -> &'static str {
        match self {
            Stability::Preferred => "preferred",
            Stability::Packaged => "packaged",
            Stability::Stable => "stable",
            Stability::Testing => "testing",
            Stability::Developer => "developer",
            Stability::Buggy => "buggy",
            Stability::Insecure => "insecure",
        }
    }
}

impl fmt::Display for Stability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Stability {
    type Err = String;

    fn from_str(s: &str) -> Result<Stability, String> {
        Ok(match s {
            "preferred" => Stability::Preferred,
            "packaged" => Stability::Packaged,
            "stable" => Stability::Stable,
            "testing" => Stability::Testing,
            "developer" => Stability::Developer,
            "buggy" => Stability::Buggy,
            "insecure" => Stability::Insecure,
            other => return Err(format!("unknown stability {:?}", other)),
        })
    }
}

/// Whether a dependency must be satisfied for the depender to work at all.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Importance {
    Essential,
    Recommended,
}

impl Default for Importance {
    fn default() -> Importance {
        Importance::Essential
    }
}
