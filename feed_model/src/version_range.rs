//! Version ranges: disjunctions of exact versions, exclusions and half-open
//! intervals, closed under intersection.
//!
//! SPDX-License-Identifier: GPL-3.0-or-later

use crate::version::{Version, VersionError};
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RangeError {
    #[error("invalid version range part {0:?}")]
    Parse(String),
    #[error(transparent)]
    Version(#[from] VersionError),
    #[error("intersection cannot be expressed as a version range")]
    NotSupported,
}

/// One disjunct of a range.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum RangePart {
    /// Matches exactly this version.
    Exact(Version),
    /// Matches anything but this version.
    Exclude(Version),
    /// Half-open interval `[lo, hi)`; either bound may be absent.
    Interval {
        lo: Option<Version>,
        hi: Option<Version>,
    },
}

impl RangePart {
    fn matches(&self, version: &Version) -> bool {
        match self {
            RangePart::Exact(v) => v == version,
            RangePart::Exclude(v) => v != version,
            RangePart::Interval { lo, hi } => {
                let above_lo = match lo {
                    Some(lo) => matches!(
                        version.try_cmp(lo),
                        Ok(Ordering::Greater) | Ok(Ordering::Equal)
                    ),
                    None => true,
                };
                let below_hi = match hi {
                    Some(hi) => matches!(version.try_cmp(hi), Ok(Ordering::Less)),
                    None => true,
                };
                above_lo && below_hi
            }
        }
    }
}

impl fmt::Display for RangePart {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RangePart::Exact(v) => write!(f, "{}", v),
            RangePart::Exclude(v) => write!(f, "!{}", v),
            RangePart::Interval { lo, hi } => {
                if let Some(lo) = lo {
                    write!(f, "{}", lo)?;
                }
                write!(f, "..")?;
                if let Some(hi) = hi {
                    write!(f, "!{}", hi)?;
                }
                Ok(())
            }
        }
    }
}

/// A disjunction of [`RangePart`]s. The empty disjunction is the universal
/// range (matches everything); the distinguished empty range matches nothing.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct VersionRange {
    parts: Vec<RangePart>,
    none: bool,
}

impl VersionRange {
    /// The range matching every version.
    pub fn universal() -> VersionRange {
        VersionRange {
            parts: Vec::new(),
            none: false,
        }
    }

    /// The range matching no version at all.
    pub fn empty() -> VersionRange {
        VersionRange {
            parts: Vec::new(),
            none: true,
        }
    }

    pub fn from_parts(parts: Vec<RangePart>) -> VersionRange {
        VersionRange { parts, none: false }
    }

    pub fn is_universal(&self) -> bool {
        !self.none && self.parts.is_empty()
    }

    pub fn is_empty(&self) -> bool {
        self.none
    }

    pub fn parts(&self) -> &[RangePart] {
        &self.parts
    }

    pub fn matches(&self, version: &Version) -> bool {
        if self.none {
            return false;
        }
        if self.parts.is_empty() {
            return true;
        }
        self.parts.iter().any(|p| p.matches(version))
    }

    /// Intersects two ranges: the result matches exactly the versions both
    /// inputs match. Fails with [`RangeError::NotSupported`] when the result
    /// cannot be written as a finite disjunction of range parts (an exclusion
    /// cut out of the middle of an interval); callers treat that as a refusal
    /// to intersect and keep both ranges.
    pub fn intersect(&self, other: &VersionRange) -> Result<VersionRange, RangeError> {
        if self.none || other.none {
            return Ok(VersionRange::empty());
        }
        if self.is_universal() {
            return Ok(other.clone());
        }
        if other.is_universal() {
            return Ok(self.clone());
        }

        let mut parts = Vec::new();
        for a in &self.parts {
            for b in &other.parts {
                if let Some(part) = intersect_parts(a, b)? {
                    if !parts.contains(&part) {
                        parts.push(part);
                    }
                }
            }
        }
        if parts.is_empty() {
            Ok(VersionRange::empty())
        } else {
            Ok(VersionRange { parts, none: false })
        }
    }
}

fn cmp(a: &Version, b: &Version) -> Result<Ordering, RangeError> {
    Ok(a.try_cmp(b)?)
}

/// Max of two optional lower bounds (`None` = unbounded below).
fn max_lo(a: &Option<Version>, b: &Option<Version>) -> Result<Option<Version>, RangeError> {
    match (a, b) {
        (None, other) => Ok(other.clone()),
        (other, None) => Ok(other.clone()),
        (Some(x), Some(y)) => Ok(Some(if cmp(x, y)? == Ordering::Less {
            y.clone()
        } else {
            x.clone()
        })),
    }
}

/// Min of two optional upper bounds (`None` = unbounded above).
fn min_hi(a: &Option<Version>, b: &Option<Version>) -> Result<Option<Version>, RangeError> {
    match (a, b) {
        (None, other) => Ok(other.clone()),
        (other, None) => Ok(other.clone()),
        (Some(x), Some(y)) => Ok(Some(if cmp(x, y)? == Ordering::Greater {
            y.clone()
        } else {
            x.clone()
        })),
    }
}

fn intersect_parts(a: &RangePart, b: &RangePart) -> Result<Option<RangePart>, RangeError> {
    use RangePart::*;
    match (a, b) {
        (Exact(x), Exact(y)) => Ok((x == y).then(|| Exact(x.clone()))),
        (Exact(x), Exclude(y)) | (Exclude(y), Exact(x)) => {
            Ok((x != y).then(|| Exact(x.clone())))
        }
        (Exact(x), interval @ Interval { .. }) | (interval @ Interval { .. }, Exact(x)) => {
            Ok(interval.matches(x).then(|| Exact(x.clone())))
        }
        (Exclude(x), Exclude(y)) => {
            if x == y {
                Ok(Some(Exclude(x.clone())))
            } else {
                // `!x AND !y` needs two cuts; not expressible as one part.
                Err(RangeError::NotSupported)
            }
        }
        (Exclude(x), interval @ Interval { .. }) | (interval @ Interval { .. }, Exclude(x)) => {
            if interval.matches(x) {
                // Cutting a point out of the middle of an interval.
                Err(RangeError::NotSupported)
            } else {
                Ok(Some(interval.clone()))
            }
        }
        (Interval { lo: lo1, hi: hi1 }, Interval { lo: lo2, hi: hi2 }) => {
            let lo = max_lo(lo1, lo2)?;
            let hi = min_hi(hi1, hi2)?;
            if let (Some(lo), Some(hi)) = (&lo, &hi) {
                if cmp(lo, hi)? != Ordering::Less {
                    return Ok(None);
                }
            }
            Ok(Some(Interval { lo, hi }))
        }
    }
}

impl FromStr for VersionRange {
    type Err = RangeError;

    fn from_str(s: &str) -> Result<VersionRange, RangeError> {
        let mut parts = Vec::new();
        for raw in s.split('|') {
            let raw = raw.trim();
            if raw.is_empty() {
                return Err(RangeError::Parse(s.to_string()));
            }
            if let Some((lo, hi)) = raw.split_once("..") {
                let lo = if lo.is_empty() {
                    None
                } else {
                    Some(lo.parse::<Version>()?)
                };
                let hi = if hi.is_empty() {
                    None
                } else {
                    // The upper bound is always exclusive and must say so.
                    let hi = hi
                        .strip_prefix('!')
                        .ok_or_else(|| RangeError::Parse(raw.to_string()))?;
                    Some(hi.parse::<Version>()?)
                };
                parts.push(RangePart::Interval { lo, hi });
            } else if let Some(excluded) = raw.strip_prefix('!') {
                parts.push(RangePart::Exclude(excluded.parse()?));
            } else {
                parts.push(RangePart::Exact(raw.parse()?));
            }
        }
        Ok(VersionRange { parts, none: false })
    }
}

impl fmt::Display for VersionRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.none {
            return write!(f, "<empty>");
        }
        for (i, part) in self.parts.iter().enumerate() {
            if i > 0 {
                write!(f, "|")?;
            }
            write!(f, "{}", part)?;
        }
        Ok(())
    }
}

impl Serialize for VersionRange {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for VersionRange {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<VersionRange, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(D::Error::custom)
    }
}
