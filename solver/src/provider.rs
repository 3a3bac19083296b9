//! Candidate provider: loads feeds, expands package implementations and
//! produces the sorted candidate list the solver walks.
//!
//! SPDX-License-Identifier: GPL-3.0-or-later

use crate::candidate::SelectionCandidate;
use crate::config::{NetworkUse, SolverConfig};
use anyhow::Error;
use hatch_feed_model::feed::Feed;
use hatch_feed_model::implementation::{Implementation, PackageImplementation};
use hatch_feed_model::preferences::{FeedPreferences, InterfacePreferences};
use hatch_feed_model::{ManifestDigest, Requirements, Stability, Version};
use rand::Rng;
use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// ID prefix for implementations that came from a package manager rather
/// than a feed.
pub const PACKAGE_ID_PREFIX: &str = "package:";

/// The pseudo-distribution name for ordinary feed implementations.
pub const DISTRIBUTION_FEED: &str = "zero-install";

/// Loads feed documents, normalised and ready to use. Network access and XML
/// parsing live behind this seam.
pub trait FeedManager: Send + Sync {
    fn get_feed(&self, uri: &str, refresh: bool) -> Result<Arc<Feed>, Error>;

    /// True when the cached copy of `uri` is older than the freshness policy.
    fn is_stale(&self, uri: &str) -> bool;
}

/// Queries the native distribution's package manager.
pub trait PackageManager: Send + Sync {
    /// Concrete implementations matching a package pattern; each result has
    /// `distribution` set and a stable ID.
    fn query(&self, package: &PackageImplementation) -> Vec<Implementation>;
}

/// The local implementation cache.
pub trait ImplementationStore: Send + Sync {
    fn contains(&self, digest: &ManifestDigest) -> bool;
}

/// Loads and stores user preferences.
pub trait PreferencesStore: Send + Sync {
    fn interface_preferences(&self, uri: &str) -> InterfacePreferences;
    fn feed_preferences(&self, uri: &str) -> FeedPreferences;
    fn save_feed_preferences(&self, uri: &str, preferences: &FeedPreferences);
}

/// Produces sorted [`SelectionCandidate`]s for requirements. All lookups are
/// memoised for the provider's lifetime; create a fresh provider (or call
/// [`CandidateProvider::clear`]) to observe external changes.
pub struct CandidateProvider {
    feeds: Arc<dyn FeedManager>,
    packages: Arc<dyn PackageManager>,
    store: Arc<dyn ImplementationStore>,
    preferences: Arc<dyn PreferencesStore>,
    config: SolverConfig,
    refresh: bool,

    feed_cache: Mutex<HashMap<String, Option<Arc<Feed>>>>,
    interface_prefs_cache: Mutex<HashMap<String, InterfacePreferences>>,
    feed_prefs_cache: Mutex<HashMap<String, FeedPreferences>>,
    contains_cache: Mutex<HashMap<String, bool>>,
    /// Implementations provided by the package manager, keyed by their
    /// generated `package:`-prefixed ID so selections can be re-resolved.
    external_implementations: Mutex<HashMap<String, Arc<Implementation>>>,
    failed_feeds: Mutex<HashMap<String, Error>>,
}

impl CandidateProvider {
    pub fn new(
        feeds: Arc<dyn FeedManager>,
        packages: Arc<dyn PackageManager>,
        store: Arc<dyn ImplementationStore>,
        preferences: Arc<dyn PreferencesStore>,
        config: SolverConfig,
        refresh: bool,
    ) -> CandidateProvider {
        CandidateProvider {
            feeds,
            packages,
            store,
            preferences,
            config,
            refresh,
            feed_cache: Mutex::new(HashMap::new()),
            interface_prefs_cache: Mutex::new(HashMap::new()),
            feed_prefs_cache: Mutex::new(HashMap::new()),
            contains_cache: Mutex::new(HashMap::new()),
            external_implementations: Mutex::new(HashMap::new()),
            failed_feeds: Mutex::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &SolverConfig {
        &self.config
    }

    /// Drops all memoised state.
    pub fn clear(&self) {
        self.feed_cache.lock().unwrap().clear();
        self.interface_prefs_cache.lock().unwrap().clear();
        self.feed_prefs_cache.lock().unwrap().clear();
        self.contains_cache.lock().unwrap().clear();
        self.external_implementations.lock().unwrap().clear();
        self.failed_feeds.lock().unwrap().clear();
    }

    /// The first feed-load failure recorded during this run, if any.
    pub fn first_feed_failure(&self) -> Option<(String, String)> {
        let failed = self.failed_feeds.lock().unwrap();
        let mut entries: Vec<_> = failed.iter().collect();
        entries.sort_by(|a, b| a.0.cmp(b.0));
        entries
            .first()
            .map(|(uri, e)| ((*uri).clone(), e.to_string()))
    }

    pub fn interface_preferences(&self, uri: &str) -> InterfacePreferences {
        self.interface_prefs_cache
            .lock()
            .unwrap()
            .entry(uri.to_string())
            .or_insert_with(|| self.preferences.interface_preferences(uri))
            .clone()
    }

    fn feed_preferences(&self, uri: &str) -> FeedPreferences {
        self.feed_prefs_cache
            .lock()
            .unwrap()
            .entry(uri.to_string())
            .or_insert_with(|| self.preferences.feed_preferences(uri))
            .clone()
    }

    /// The stable rollout die for a feed, rolling and persisting it on first
    /// use so a user's rollout membership never flaps.
    fn rollout_die(&self, feed_uri: &str) -> u32 {
        let mut cache = self.feed_prefs_cache.lock().unwrap();
        let prefs = cache
            .entry(feed_uri.to_string())
            .or_insert_with(|| self.preferences.feed_preferences(feed_uri));
        if prefs.rollout_die.is_none() {
            let die = prefs.ensure_rollout_die(|| rand::thread_rng().gen_range(1..=100));
            self.preferences.save_feed_preferences(feed_uri, prefs);
            debug!("Rolled rollout die {} for {}", die, feed_uri);
        }
        prefs.rollout_die.unwrap_or(100)
    }

    fn is_cached(&self, implementation: &Implementation) -> bool {
        if implementation.local_path.is_some() || implementation.distribution.is_some() {
            return true;
        }
        if implementation.digest.is_empty() {
            return false;
        }
        let key = implementation.digest.best().unwrap_or_default();
        *self
            .contains_cache
            .lock()
            .unwrap()
            .entry(key)
            .or_insert_with(|| self.store.contains(&implementation.digest))
    }

    fn load_feed(&self, uri: &str) -> Option<Arc<Feed>> {
        let mut cache = self.feed_cache.lock().unwrap();
        if let Some(cached) = cache.get(uri) {
            return cached.clone();
        }
        // Serialised per provider: the cache lock is held across the load,
        // so a second caller for the same URI waits and then hits the cache.
        let loaded = match self.feeds.get_feed(uri, self.refresh) {
            Ok(feed) => Some(feed),
            Err(e) => {
                warn!("Failed to load feed {}: {}", uri, e);
                self.failed_feeds.lock().unwrap().insert(uri.to_string(), e);
                None
            }
        };
        cache.insert(uri.to_string(), loaded.clone());
        loaded
    }

    /// Resolves a `package:`-prefixed selection ID back to the external
    /// implementation it was generated from.
    pub fn external_implementation(&self, id: &str) -> Option<Arc<Implementation>> {
        self.external_implementations.lock().unwrap().get(id).cloned()
    }

    /// All feeds contributing implementations for the interface: the main
    /// feed, compatible nested references (depth-first), discovered local
    /// feeds and feeds registered in the interface preferences.
    fn feed_uris(&self, requirements: &Requirements) -> Vec<String> {
        let mut queue = vec![requirements.interface_uri.clone()];
        let prefs = self.interface_preferences(&requirements.interface_uri);
        queue.extend(prefs.feeds.iter().cloned());
        queue.extend(discover_local_feeds(&requirements.interface_uri));

        let mut seen = Vec::new();
        while let Some(uri) = queue.pop() {
            if seen.contains(&uri) {
                continue;
            }
            seen.push(uri.clone());
            let Some(feed) = self.load_feed(&uri) else {
                continue;
            };
            if let Some(min_version) = &feed.min_injector_version {
                if !injector_version_satisfies(min_version) {
                    warn!(
                        "Ignoring feed {}: requires launcher version {}",
                        uri, min_version
                    );
                    seen.pop();
                    continue;
                }
            }
            for reference in &feed.feeds {
                let arch_ok = reference
                    .architecture
                    .map(|a| a.runs_on(&requirements.architecture))
                    .unwrap_or(true);
                let lang_ok = reference.languages.is_empty()
                    || requirements.languages.is_empty()
                    || reference.languages.iter().any(|have| {
                        requirements
                            .languages
                            .iter()
                            .any(|want| have.eq_ignore_ascii_case(want))
                    });
                if arch_ok && lang_ok {
                    queue.push(reference.href.clone());
                }
            }
        }
        seen
    }

    /// Sorted candidates for the requirements, filtered by the allowed
    /// distributions (`distributions` empty = any).
    pub fn candidates(
        &self,
        requirements: &Requirements,
        distributions: &[String],
    ) -> Vec<SelectionCandidate> {
        let mut candidates = Vec::new();
        for feed_uri in self.feed_uris(requirements) {
            let Some(feed) = self.load_feed(&feed_uri) else {
                continue;
            };
            let feed_prefs = self.feed_preferences(&feed_uri);

            for package in &feed.package_implementations {
                for mut implementation in self.packages.query(package) {
                    let distribution = implementation.distribution.clone().unwrap_or_default();
                    if !distribution_allowed(distributions, &self.config, Some(&distribution)) {
                        continue;
                    }
                    implementation.id = format!("{}{}", PACKAGE_ID_PREFIX, implementation.id);
                    let implementation = Arc::new(implementation);
                    self.external_implementations
                        .lock()
                        .unwrap()
                        .insert(implementation.id.clone(), implementation.clone());
                    let die = self.rollout_die(&feed_uri);
                    candidates.push(SelectionCandidate::new(
                        &feed_uri,
                        &feed_prefs,
                        implementation,
                        requirements,
                        &self.config,
                        true,
                        die,
                    ));
                }
            }

            for implementation in &feed.implementations {
                if !distribution_allowed(distributions, &self.config, Some(DISTRIBUTION_FEED)) {
                    continue;
                }
                let implementation = Arc::new(implementation.clone());
                let is_cached = self.is_cached(&implementation);
                let die = self.rollout_die(&feed_uri);
                candidates.push(SelectionCandidate::new(
                    &feed_uri,
                    &feed_prefs,
                    implementation,
                    requirements,
                    &self.config,
                    is_cached,
                    die,
                ));
            }
        }

        let policy = self
            .interface_preferences(&requirements.interface_uri)
            .effective_stability_policy();
        candidates.sort_by(|a, b| compare_candidates(a, b, policy, self.config.network_use));
        candidates
    }
}

/// Does a candidate from `candidate_distribution` pass the demand's
/// allow-list and the global distribution filter?
fn distribution_allowed(
    allowed: &[String],
    config: &SolverConfig,
    candidate_distribution: Option<&str>,
) -> bool {
    if let Some(filter) = &config.distribution {
        match candidate_distribution {
            Some(d) if d != filter.as_str() => return false,
            _ => {}
        }
    }
    if allowed.is_empty() {
        return true;
    }
    match candidate_distribution {
        Some(d) => allowed.iter().any(|a| a == d),
        None => true,
    }
}

/// Feeds dropped next to the interface data by native packages or
/// site-packages installs.
fn discover_local_feeds(interface_uri: &str) -> Vec<String> {
    let escaped = hatch_locations::escape(interface_uri);
    let mut found = Vec::new();
    for dir in ["native_feeds", "site-packages"] {
        let path = hatch_locations::data_root().join(dir).join(&escaped);
        if path.exists() {
            found.push(path.to_string_lossy().into_owned());
        }
    }
    found
}

fn injector_version_satisfies(min_version: &Version) -> bool {
    match env!("CARGO_PKG_VERSION").parse::<Version>() {
        Ok(own) => match own.try_cmp(min_version) {
            Ok(order) => order != Ordering::Less,
            Err(_) => true,
        },
        Err(_) => true,
    }
}

/// The candidate sort. Strictly ordered criteria; the first non-equal
/// comparison decides.
fn compare_candidates(
    a: &SelectionCandidate,
    b: &SelectionCandidate,
    policy: Stability,
    network_use: NetworkUse,
) -> Ordering {
    // 1. Explicitly preferred implementations first.
    let a_preferred = a.effective_stability == Stability::Preferred;
    let b_preferred = b.effective_stability == Stability::Preferred;
    match b_preferred.cmp(&a_preferred) {
        Ordering::Equal => {}
        order => return order,
    }

    // 2. Language match quality.
    match b.language_rank.cmp(&a.language_rank) {
        Ordering::Equal => {}
        order => return order,
    }

    // 3. Below full network use, cached beats uncached outright.
    if network_use < NetworkUse::Full {
        match b.is_cached.cmp(&a.is_cached) {
            Ordering::Equal => {}
            order => return order,
        }
    }

    // 4. Stability, capped at the user's policy.
    match a.capped_stability(policy).cmp(&b.capped_stability(policy)) {
        Ordering::Equal => {}
        order => return order,
    }

    // 5. Newer major release first.
    match b.version.cmp_leading_part(&a.version) {
        Ordering::Equal => {}
        order => return order,
    }

    // 6. With equal leading versions, prefer the native package.
    let a_packaged = a.effective_stability == Stability::Packaged;
    let b_packaged = b.effective_stability == Stability::Packaged;
    match b_packaged.cmp(&a_packaged) {
        Ordering::Equal => {}
        order => return order,
    }

    // 7. Full version, newest first.
    match b.version.partial_cmp(&a.version).unwrap_or(Ordering::Equal) {
        Ordering::Equal => {}
        order => return order,
    }

    // 8. More specific OS, then CPU.
    match b
        .implementation
        .architecture
        .os
        .specificity()
        .cmp(&a.implementation.architecture.os.specificity())
    {
        Ordering::Equal => {}
        order => return order,
    }
    match b
        .implementation
        .architecture
        .cpu
        .specificity()
        .cmp(&a.implementation.architecture.cpu.specificity())
    {
        Ordering::Equal => {}
        order => return order,
    }

    // 9. Country-specialised language match.
    match b.country_rank.cmp(&a.country_rank) {
        Ordering::Equal => {}
        order => return order,
    }

    // 10. At full network use, cached is only a weak tiebreak.
    if network_use == NetworkUse::Full {
        match b.is_cached.cmp(&a.is_cached) {
            Ordering::Equal => {}
            order => return order,
        }
    }

    // 11. Deterministic order for everything else.
    a.implementation.id.cmp(&b.implementation.id)
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// In-memory collaborators used across the solver tests.
    #[derive(Default)]
    pub struct FakeFeeds {
        pub feeds: Mutex<HashMap<String, Arc<Feed>>>,
        pub stale: Mutex<Vec<String>>,
        pub fail: Mutex<HashMap<String, String>>,
    }

    impl FakeFeeds {
        pub fn insert(&self, uri: &str, mut feed: Feed) {
            feed.uri = Some(uri.to_string());
            feed.normalize(None).unwrap();
            self.feeds
                .lock()
                .unwrap()
                .insert(uri.to_string(), Arc::new(feed));
        }
    }

    impl FeedManager for FakeFeeds {
        fn get_feed(&self, uri: &str, _refresh: bool) -> Result<Arc<Feed>, Error> {
            if let Some(message) = self.fail.lock().unwrap().get(uri) {
                return Err(anyhow::anyhow!("{}", message));
            }
            self.feeds
                .lock()
                .unwrap()
                .get(uri)
                .cloned()
                .ok_or_else(|| anyhow::anyhow!("unknown feed {}", uri))
        }

        fn is_stale(&self, uri: &str) -> bool {
            self.stale.lock().unwrap().iter().any(|u| u == uri)
        }
    }

    #[derive(Default)]
    pub struct NoPackages;

    impl PackageManager for NoPackages {
        fn query(&self, _package: &PackageImplementation) -> Vec<Implementation> {
            Vec::new()
        }
    }

    /// Store that claims to hold everything.
    pub struct FullStore;

    impl ImplementationStore for FullStore {
        fn contains(&self, _digest: &ManifestDigest) -> bool {
            true
        }
    }

    #[derive(Default)]
    pub struct MemoryPreferences {
        pub interfaces: Mutex<HashMap<String, InterfacePreferences>>,
        pub feeds: Mutex<HashMap<String, FeedPreferences>>,
    }

    impl PreferencesStore for MemoryPreferences {
        fn interface_preferences(&self, uri: &str) -> InterfacePreferences {
            self.interfaces
                .lock()
                .unwrap()
                .get(uri)
                .cloned()
                .unwrap_or_default()
        }

        fn feed_preferences(&self, uri: &str) -> FeedPreferences {
            self.feeds
                .lock()
                .unwrap()
                .get(uri)
                .cloned()
                .unwrap_or_else(|| FeedPreferences {
                    // Tests must not depend on a random die.
                    rollout_die: Some(50),
                    ..FeedPreferences::default()
                })
        }

        fn save_feed_preferences(&self, uri: &str, preferences: &FeedPreferences) {
            self.feeds
                .lock()
                .unwrap()
                .insert(uri.to_string(), preferences.clone());
        }
    }

    pub fn provider_for(feeds: Arc<FakeFeeds>) -> CandidateProvider {
        CandidateProvider::new(
            feeds,
            Arc::new(NoPackages),
            Arc::new(FullStore),
            Arc::new(MemoryPreferences::default()),
            SolverConfig::default(),
            false,
        )
    }
}
