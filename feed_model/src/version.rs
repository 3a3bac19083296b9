//! Feed version algebra.
//!
//! SPDX-License-Identifier: GPL-3.0-or-later

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum VersionError {
    #[error("empty version string")]
    Empty,
    #[error("invalid version token {0:?}")]
    InvalidToken(String),
    #[error("version {0:?} contains template placeholders and cannot be ordered")]
    Unordered(String),
}

/// Release-phase marker attached to a version part. Ordering is the whole
/// point: `1.2-pre` sorts before `1.2`, which sorts before `1.2-post`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Modifier {
    Pre,
    Rc,
    None,
    Post,
}

impl Modifier {
    fn rank(self) -> i8 {
        match self {
            Modifier::Pre => -2,
            Modifier::Rc => -1,
            Modifier::None => 0,
            Modifier::Post => 1,
        }
    }

    fn as_str(self) -> &'static str {
        match self {
            Modifier::Pre => "pre",
            Modifier::Rc => "rc",
            Modifier::None => "",
            Modifier::Post => "post",
        }
    }
}

/// One element of a dotted integer list. Feed authors may leave `{name}`
/// placeholders in versions that are filled in by release tooling; such
/// versions parse but refuse to be ordered.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
enum Token {
    Number(u64),
    Template(String),
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Number(n) => write!(f, "{}", n),
            Token::Template(name) => write!(f, "{{{}}}", name),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
struct VersionPart {
    modifier: Modifier,
    list: Vec<Token>,
}

impl VersionPart {
    /// The part an absent position compares as: no modifier, empty list.
    /// This makes `1.2` sort between `1.2-pre` and `1.2-post`.
    fn default_for_compare() -> VersionPart {
        VersionPart {
            modifier: Modifier::None,
            list: Vec::new(),
        }
    }

    fn try_cmp(&self, other: &VersionPart) -> Option<Ordering> {
        match self.modifier.rank().cmp(&other.modifier.rank()) {
            Ordering::Equal => {}
            order => return Some(order),
        }
        // Raw list comparison, no zero padding: `1.0` sorts after `1`.
        let mut a = self.list.iter();
        let mut b = other.list.iter();
        loop {
            match (a.next(), b.next()) {
                (None, None) => return Some(Ordering::Equal),
                (None, Some(_)) => return Some(Ordering::Less),
                (Some(_), None) => return Some(Ordering::Greater),
                (Some(Token::Number(x)), Some(Token::Number(y))) => match x.cmp(y) {
                    Ordering::Equal => {}
                    order => return Some(order),
                },
                _ => return None,
            }
        }
    }

    fn is_template(&self) -> bool {
        self.list.iter().any(|t| matches!(t, Token::Template(_)))
    }
}

impl fmt::Display for VersionPart {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.modifier.as_str())?;
        for (i, token) in self.list.iter().enumerate() {
            if i > 0 {
                write!(f, ".")?;
            }
            write!(f, "{}", token)?;
        }
        Ok(())
    }
}

/// A feed implementation version: dash-separated parts, each an optional
/// `pre`/`rc`/`post` modifier followed by a dotted integer list.
///
/// `1.2-pre3` < `1.2-rc3` < `1.2` < `1.2-post`.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Version {
    parts: Vec<VersionPart>,
}

impl Version {
    /// True if any token is a `{placeholder}`; such versions only support
    /// equality comparison.
    pub fn is_template(&self) -> bool {
        self.parts.iter().any(VersionPart::is_template)
    }

    /// Total-order comparison. Fails for template versions.
    pub fn try_cmp(&self, other: &Version) -> Result<Ordering, VersionError> {
        if self.is_template() {
            return Err(VersionError::Unordered(self.to_string()));
        }
        if other.is_template() {
            return Err(VersionError::Unordered(other.to_string()));
        }
        let default = VersionPart::default_for_compare();
        let len = self.parts.len().max(other.parts.len());
        for i in 0..len {
            let a = self.parts.get(i).unwrap_or(&default);
            let b = other.parts.get(i).unwrap_or(&default);
            match a.try_cmp(b) {
                Some(Ordering::Equal) => {}
                Some(order) => return Ok(order),
                None => return Err(VersionError::Unordered(self.to_string())),
            }
        }
        Ok(Ordering::Equal)
    }

    /// Compares only the leading part of each version. The candidate sort
    /// uses this to group candidates by major release before weaker criteria.
    pub fn cmp_leading_part(&self, other: &Version) -> Ordering {
        let default = VersionPart::default_for_compare();
        let a = self.parts.first().unwrap_or(&default);
        let b = other.parts.first().unwrap_or(&default);
        a.try_cmp(b).unwrap_or(Ordering::Equal)
    }
}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Version) -> Option<Ordering> {
        self.try_cmp(other).ok()
    }
}

fn parse_dotted_list(input: &str, original: &str) -> Result<Vec<Token>, VersionError> {
    let mut list = Vec::new();
    for token in input.split('.') {
        if token.starts_with('{') && token.ends_with('}') && token.len() > 2 {
            list.push(Token::Template(token[1..token.len() - 1].to_string()));
        } else if !token.is_empty() && token.bytes().all(|b| b.is_ascii_digit()) {
            list.push(Token::Number(
                token
                    .parse()
                    .map_err(|_| VersionError::InvalidToken(original.to_string()))?,
            ));
        } else {
            return Err(VersionError::InvalidToken(token.to_string()));
        }
    }
    Ok(list)
}

impl FromStr for Version {
    type Err = VersionError;

    fn from_str(s: &str) -> Result<Version, VersionError> {
        if s.is_empty() {
            return Err(VersionError::Empty);
        }
        let mut parts = Vec::new();
        for (i, segment) in s.split('-').enumerate() {
            let (modifier, rest) = if let Some(rest) = segment.strip_prefix("pre") {
                (Modifier::Pre, rest)
            } else if let Some(rest) = segment.strip_prefix("rc") {
                (Modifier::Rc, rest)
            } else if let Some(rest) = segment.strip_prefix("post") {
                (Modifier::Post, rest)
            } else {
                (Modifier::None, segment)
            };

            if i == 0 && modifier != Modifier::None {
                // The leading part is the release number itself.
                return Err(VersionError::InvalidToken(segment.to_string()));
            }

            let list = if rest.is_empty() {
                if modifier == Modifier::None {
                    // A bare dash with nothing behind it.
                    return Err(VersionError::InvalidToken(segment.to_string()));
                }
                Vec::new()
            } else {
                parse_dotted_list(rest, s)?
            };
            parts.push(VersionPart { modifier, list });
        }
        Ok(Version { parts })
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, part) in self.parts.iter().enumerate() {
            if i > 0 {
                write!(f, "-")?;
            }
            write!(f, "{}", part)?;
        }
        Ok(())
    }
}

impl Serialize for Version {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Version {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Version, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(D::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v(s: &str) -> Version {
        s.parse().unwrap()
    }

    #[test]
    fn parse_round_trip() {
        for s in ["1", "1.0", "1.2-pre1", "1.2-rc2.3", "1.2-post", "0.9-pre-post2"] {
            assert_eq!(v(s).to_string(), s);
        }
    }

    #[test]
    fn rejects_garbage() {
        assert!(Version::from_str("").is_err());
        assert!(Version::from_str("1..2").is_err());
        assert!(Version::from_str("1.a").is_err());
        assert!(Version::from_str("1.2-").is_err());
        assert!(Version::from_str("pre1").is_err());
    }

    #[test]
    fn modifier_ordering() {
        assert_eq!(v("1.2-pre1").try_cmp(&v("1.2")).unwrap(), Ordering::Less);
        assert_eq!(v("1.2-post").try_cmp(&v("1.2")).unwrap(), Ordering::Greater);
        assert_eq!(v("1.2-pre").try_cmp(&v("1.2-rc")).unwrap(), Ordering::Less);
        assert_eq!(v("1.2-rc1").try_cmp(&v("1.2-rc2")).unwrap(), Ordering::Less);
    }

    #[test]
    fn raw_list_comparison_distinguishes_trailing_zero() {
        assert_eq!(v("1").try_cmp(&v("1.0")).unwrap(), Ordering::Less);
        assert_ne!(v("1"), v("1.0"));
        assert_eq!(v("1.2.3").try_cmp(&v("1.2.3")).unwrap(), Ordering::Equal);
        assert_eq!(v("2").try_cmp(&v("10")).unwrap(), Ordering::Less);
    }

    #[test]
    fn templates_parse_but_refuse_ordering() {
        let t = v("1.{minor}");
        assert!(t.is_template());
        assert_eq!(t.to_string(), "1.{minor}");
        assert!(t.try_cmp(&v("1.2")).is_err());
        assert_eq!(t, v("1.{minor}"));
    }

    #[test]
    fn leading_part_comparison() {
        assert_eq!(v("1.9-post").cmp_leading_part(&v("1.9")), Ordering::Equal);
        assert_eq!(v("2.0").cmp_leading_part(&v("1.9")), Ordering::Greater);
    }
}
