//! Manifest digests: the primary identity of an implementation.
//!
//! SPDX-License-Identifier: GPL-3.0-or-later

use std::fmt;

/// A bag of `algorithm -> encoded digest` pairs over the known manifest
/// algorithms. Two digests identify the same implementation when at least one
/// algorithm is present in both with the same value; digests with disjoint
/// algorithm sets never match.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ManifestDigest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sha1: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sha1_new: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sha256: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sha256_new: Option<String>,
}

impl ManifestDigest {
    /// Extracts any digests encoded in an implementation ID string such as
    /// `sha256new_ABC123,sha1=0123abcd`. Unknown prefixes are ignored, so IDs
    /// minted by newer releases still partially parse.
    pub fn from_id(id: &str) -> ManifestDigest {
        let mut digest = ManifestDigest::default();
        for token in id.split(',') {
            digest.parse_token(token);
        }
        digest
    }

    fn parse_token(&mut self, token: &str) {
        if let Some(value) = token.strip_prefix("sha1new=") {
            self.sha1_new.get_or_insert_with(|| value.to_string());
        } else if let Some(value) = token.strip_prefix("sha1=") {
            self.sha1.get_or_insert_with(|| value.to_string());
        } else if let Some(value) = token.strip_prefix("sha256new_") {
            self.sha256_new.get_or_insert_with(|| value.to_string());
        } else if let Some(value) = token.strip_prefix("sha256=") {
            self.sha256.get_or_insert_with(|| value.to_string());
        }
    }

    pub fn is_empty(&self) -> bool {
        self.available_digests().is_empty()
    }

    /// All digests as ID strings, strongest algorithm first.
    pub fn available_digests(&self) -> Vec<String> {
        let mut out = Vec::new();
        if let Some(v) = &self.sha256_new {
            out.push(format!("sha256new_{}", v));
        }
        if let Some(v) = &self.sha256 {
            out.push(format!("sha256={}", v));
        }
        if let Some(v) = &self.sha1_new {
            out.push(format!("sha1new={}", v));
        }
        if let Some(v) = &self.sha1 {
            out.push(format!("sha1={}", v));
        }
        out
    }

    /// The canonical ID: the strongest available digest.
    pub fn best(&self) -> Option<String> {
        self.available_digests().into_iter().next()
    }

    /// Partial equality: true iff some algorithm is present on both sides
    /// with the same value. Symmetric and reflexive for non-empty digests,
    /// but deliberately not transitive.
    pub fn partial_matches(&self, other: &ManifestDigest) -> bool {
        fn matches(a: &Option<String>, b: &Option<String>) -> bool {
            matches!((a, b), (Some(x), Some(y)) if x == y)
        }
        matches(&self.sha1, &other.sha1)
            || matches(&self.sha1_new, &other.sha1_new)
            || matches(&self.sha256, &other.sha256)
            || matches(&self.sha256_new, &other.sha256_new)
    }
}

impl fmt::Display for ManifestDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.available_digests().join(","))
    }
}

const BASE32_ALPHABET: &[u8; 32] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ234567";

/// RFC 4648 Base32 without padding, as used in `sha256new_` digest bodies.
pub fn base32_encode(data: &[u8]) -> String {
    let mut out = String::with_capacity(data.len().div_ceil(5) * 8);
    for chunk in data.chunks(5) {
        let mut buf = [0u8; 5];
        buf[..chunk.len()].copy_from_slice(chunk);
        let bits = u64::from(buf[0]) << 32
            | u64::from(buf[1]) << 24
            | u64::from(buf[2]) << 16
            | u64::from(buf[3]) << 8
            | u64::from(buf[4]);
        let chars = (chunk.len() * 8).div_ceil(5);
        for i in 0..chars {
            let shift = 35 - 5 * i;
            out.push(BASE32_ALPHABET[((bits >> shift) & 0x1f) as usize] as char);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_all_separator_styles() {
        let digest = ManifestDigest::from_id("sha256new_ABC234,sha1=0123abcd");
        assert_eq!(digest.sha256_new.as_deref(), Some("ABC234"));
        assert_eq!(digest.sha1.as_deref(), Some("0123abcd"));
        assert_eq!(digest.sha256, None);
    }

    #[test]
    fn unknown_prefixes_are_ignored() {
        let digest = ManifestDigest::from_id("package:deb:gcc:12.0,sha256=ffff");
        assert_eq!(digest.sha256.as_deref(), Some("ffff"));
        assert_eq!(digest.sha1, None);
    }

    #[test]
    fn best_prefers_strongest() {
        let digest = ManifestDigest {
            sha1: Some("aa".into()),
            sha1_new: Some("bb".into()),
            sha256: Some("cc".into()),
            sha256_new: Some("DD".into()),
        };
        assert_eq!(digest.best().as_deref(), Some("sha256new_DD"));
        assert_eq!(
            digest.available_digests(),
            vec!["sha256new_DD", "sha256=cc", "sha1new=bb", "sha1=aa"]
        );
    }

    #[test]
    fn partial_match_semantics() {
        let a = ManifestDigest {
            sha1: Some("aa".into()),
            sha256: Some("cc".into()),
            ..Default::default()
        };
        let b = ManifestDigest {
            sha256: Some("cc".into()),
            sha256_new: Some("DD".into()),
            ..Default::default()
        };
        let c = ManifestDigest {
            sha1_new: Some("ee".into()),
            ..Default::default()
        };
        assert!(a.partial_matches(&b));
        assert!(b.partial_matches(&a));
        assert!(a.partial_matches(&a));
        // Disjoint algorithms never match.
        assert!(!a.partial_matches(&c));
        // Same algorithm, different value.
        let d = ManifestDigest {
            sha256: Some("00".into()),
            ..Default::default()
        };
        assert!(!a.partial_matches(&d));
    }

    #[test]
    fn base32_known_vectors() {
        assert_eq!(base32_encode(b""), "");
        assert_eq!(base32_encode(b"f"), "MY");
        assert_eq!(base32_encode(b"fo"), "MZXQ");
        assert_eq!(base32_encode(b"foo"), "MZXW6");
        assert_eq!(base32_encode(b"foob"), "MZXW6YQ");
        assert_eq!(base32_encode(b"fooba"), "MZXW6YTB");
        assert_eq!(base32_encode(b"foobar"), "MZXW6YTBOI");
    }
}
