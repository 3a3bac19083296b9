//! Candidates: implementations paired with the reasons they may or may not
//! be selectable for a request.
//!
//! SPDX-License-Identifier: GPL-3.0-or-later

use crate::config::{NetworkUse, SolverConfig};
use hatch_feed_model::implementation::Implementation;
use hatch_feed_model::preferences::FeedPreferences;
use hatch_feed_model::{Requirements, Stability, Version};
use std::sync::Arc;

/// Why a candidate cannot be used, or `Suitable` if it can.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Suitability {
    Suitable,
    Buggy,
    Insecure,
    NoVersion,
    ArchitectureMismatch,
    VersionOutOfRange,
    LanguageMismatch,
    /// Not in the local store while network use is `Offline`.
    UncachedOffline,
    /// The user's rollout die exceeds the implementation's percentage.
    NotRolledOut,
}

impl Suitability {
    pub fn is_suitable(self) -> bool {
        self == Suitability::Suitable
    }
}

/// One implementation considered for one interface during one solver run.
#[derive(Clone, Debug)]
pub struct SelectionCandidate {
    pub feed_uri: String,
    pub implementation: Arc<Implementation>,
    pub version: Version,
    /// User override > implementation stability.
    pub effective_stability: Stability,
    pub suitability: Suitability,
    pub is_cached: bool,
    /// Language match quality against the requirements, best = 3.
    pub language_rank: u8,
    /// 1 when an exact language+country match exists.
    pub country_rank: u8,
}

impl SelectionCandidate {
    pub fn new(
        feed_uri: &str,
        feed_preferences: &FeedPreferences,
        implementation: Arc<Implementation>,
        requirements: &Requirements,
        config: &SolverConfig,
        is_cached: bool,
        rollout_die: u32,
    ) -> SelectionCandidate {
        let effective_stability = feed_preferences
            .user_stability(&implementation.id)
            .unwrap_or(implementation.stability);

        let language_rank = language_rank(&implementation.languages, &requirements.languages);
        let country_rank = country_rank(&implementation.languages, &requirements.languages);

        let version = implementation.version.clone();
        let suitability = (|| {
            match effective_stability {
                Stability::Buggy => return Suitability::Buggy,
                Stability::Insecure => return Suitability::Insecure,
                _ => {}
            }
            let Some(version) = &version else {
                return Suitability::NoVersion;
            };
            if !implementation
                .architecture
                .runs_on(&requirements.architecture)
            {
                return Suitability::ArchitectureMismatch;
            }
            if let Some(range) = requirements.extra_restrictions.get(&requirements.interface_uri)
            {
                if !range.matches(version) {
                    return Suitability::VersionOutOfRange;
                }
            }
            if language_rank == 0
                && !requirements.languages.is_empty()
                && !implementation.languages.is_empty()
            {
                return Suitability::LanguageMismatch;
            }
            if config.network_use == NetworkUse::Offline
                && !is_cached
                && implementation.local_path.is_none()
                && implementation.distribution.is_none()
            {
                return Suitability::UncachedOffline;
            }
            if let Some(percentage) = implementation.rollout_percentage {
                if rollout_die > percentage {
                    return Suitability::NotRolledOut;
                }
            }
            Suitability::Suitable
        })();

        SelectionCandidate {
            feed_uri: feed_uri.to_string(),
            version: version.unwrap_or_else(|| {
                // Unversioned candidates are never suitable; the placeholder
                // keeps the struct total.
                "0".parse().unwrap()
            }),
            implementation,
            effective_stability,
            suitability,
            is_cached,
            language_rank,
            country_rank,
        }
    }

    pub fn is_suitable(&self) -> bool {
        self.suitability.is_suitable()
    }

    pub fn id(&self) -> &str {
        &self.implementation.id
    }

    /// Stability as used by the candidate sort: anything at least as stable
    /// as the user's policy counts as `Preferred`, so a policy of `testing`
    /// does not make older stable releases beat newer testing ones.
    pub fn capped_stability(&self, policy: Stability) -> Stability {
        if self.effective_stability <= policy {
            Stability::Preferred
        } else {
            self.effective_stability
        }
    }
}

fn primary_tag(language: &str) -> &str {
    language
        .split(['-', '_'])
        .next()
        .unwrap_or(language)
}

/// 3 = exact language+country match, 2 = primary-language match (or the
/// implementation is language-neutral), 1 = English fallback, 0 = no match.
fn language_rank(implementation_languages: &[String], wanted: &[String]) -> u8 {
    if implementation_languages.is_empty() || wanted.is_empty() {
        return 2;
    }
    let mut best = 0;
    for want in wanted {
        for have in implementation_languages {
            if have.eq_ignore_ascii_case(want) && want.contains(['-', '_']) {
                return 3;
            }
            if primary_tag(have).eq_ignore_ascii_case(primary_tag(want)) {
                best = best.max(2);
            }
        }
    }
    if best == 0
        && implementation_languages
            .iter()
            .any(|l| primary_tag(l).eq_ignore_ascii_case("en"))
    {
        best = 1;
    }
    best
}

fn country_rank(implementation_languages: &[String], wanted: &[String]) -> u8 {
    u8::from(language_rank(implementation_languages, wanted) == 3)
}
