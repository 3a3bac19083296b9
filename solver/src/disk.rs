//! Disk-backed collaborators for running the solver against local state
//! only: cached feed copies, the implementation store directory and the
//! per-interface preference files. Fetching fresh feeds over the network is
//! someone else's job; these implementations serve whatever is on disk.
//!
//! SPDX-License-Identifier: GPL-3.0-or-later

use crate::provider::{FeedManager, ImplementationStore, PackageManager, PreferencesStore};
use anyhow::{Context, Error};
use hatch_feed_model::feed::Feed;
use hatch_feed_model::implementation::{Implementation, PackageImplementation};
use hatch_feed_model::preferences::{FeedPreferences, InterfacePreferences};
use hatch_feed_model::ManifestDigest;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

/// Cached copies older than this count as stale.
const FRESHNESS: Duration = Duration::from_secs(7 * 24 * 60 * 60);

/// Serves feeds from the on-disk cache (and local feed files directly).
pub struct DiskFeedManager {
    cache_dir: Option<PathBuf>,
}

impl DiskFeedManager {
    pub fn new() -> DiskFeedManager {
        DiskFeedManager { cache_dir: None }
    }

    /// Overrides the cache directory (tests).
    pub fn with_cache_dir(cache_dir: PathBuf) -> DiskFeedManager {
        DiskFeedManager {
            cache_dir: Some(cache_dir),
        }
    }

    fn cached_path(&self, uri: &str) -> PathBuf {
        match &self.cache_dir {
            Some(dir) => dir.join(hatch_locations::escape(uri)),
            None => hatch_locations::feed_cache_path(uri),
        }
    }

    fn file_for(&self, uri: &str) -> PathBuf {
        if uri.starts_with("http://") || uri.starts_with("https://") {
            self.cached_path(uri)
        } else {
            // Local feeds are referenced by path.
            PathBuf::from(uri)
        }
    }
}

impl Default for DiskFeedManager {
    fn default() -> DiskFeedManager {
        DiskFeedManager::new()
    }
}

impl FeedManager for DiskFeedManager {
    fn get_feed(&self, uri: &str, _refresh: bool) -> Result<Arc<Feed>, Error> {
        let path = self.file_for(uri);
        let data = fs::read_to_string(&path)
            .with_context(|| format!("no cached copy of {} at {}", uri, path.display()))?;
        let mut feed: Feed =
            serde_json::from_str(&data).with_context(|| format!("corrupt feed {}", uri))?;
        if feed.uri.is_none() {
            feed.uri = Some(uri.to_string());
        }
        // Remote feeds must not use local paths, even when served from the
        // cache directory; only genuinely local feeds resolve against their
        // own directory.
        let local_dir = if uri.starts_with("http://") || uri.starts_with("https://") {
            None
        } else {
            path.parent().map(Path::to_path_buf)
        };
        feed.normalize(local_dir.as_ref())
            .with_context(|| format!("invalid feed {}", uri))?;
        Ok(Arc::new(feed))
    }

    fn is_stale(&self, uri: &str) -> bool {
        let path = self.file_for(uri);
        match fs::metadata(&path).and_then(|m| m.modified()) {
            Ok(modified) => {
                SystemTime::now()
                    .duration_since(modified)
                    .unwrap_or_default()
                    > FRESHNESS
            }
            // A feed we do not even have is stale by definition.
            Err(_) => true,
        }
    }
}

/// Checks the implementation cache directory for manifest digests.
pub struct DirStore {
    root: PathBuf,
}

impl DirStore {
    pub fn new() -> DirStore {
        DirStore {
            root: hatch_locations::cache_root().join("implementations"),
        }
    }

    pub fn at(root: PathBuf) -> DirStore {
        DirStore { root }
    }
}

impl Default for DirStore {
    fn default() -> DirStore {
        DirStore::new()
    }
}

impl ImplementationStore for DirStore {
    fn contains(&self, digest: &ManifestDigest) -> bool {
        digest
            .available_digests()
            .iter()
            .any(|id| self.root.join(id).is_dir())
    }
}

/// No distribution integration: package implementations never match.
pub struct NoPackageManager;

impl PackageManager for NoPackageManager {
    fn query(&self, _package: &PackageImplementation) -> Vec<Implementation> {
        Vec::new()
    }
}

/// Preference files as JSON under the data root.
pub struct DiskPreferencesStore {
    root: Option<PathBuf>,
}

impl DiskPreferencesStore {
    pub fn new() -> DiskPreferencesStore {
        DiskPreferencesStore { root: None }
    }

    pub fn at(root: PathBuf) -> DiskPreferencesStore {
        DiskPreferencesStore { root: Some(root) }
    }

    fn interface_path(&self, uri: &str) -> PathBuf {
        match &self.root {
            Some(root) => root
                .join("interfaces")
                .join(hatch_locations::escape(uri)),
            None => hatch_locations::interface_prefs_path(uri),
        }
    }

    fn feed_path(&self, uri: &str) -> PathBuf {
        let base = match &self.root {
            Some(root) => root.clone(),
            None => hatch_locations::data_root().join("injector"),
        };
        base.join("feeds.meta").join(hatch_locations::escape(uri))
    }

    fn load<T: Default + serde::de::DeserializeOwned>(path: &Path) -> T {
        match fs::read_to_string(path) {
            Ok(data) => match serde_json::from_str(&data) {
                Ok(value) => value,
                Err(e) => {
                    warn!("Ignoring corrupt preference file {}: {}", path.display(), e);
                    T::default()
                }
            },
            Err(_) => T::default(),
        }
    }
}

impl Default for DiskPreferencesStore {
    fn default() -> DiskPreferencesStore {
        DiskPreferencesStore::new()
    }
}

impl PreferencesStore for DiskPreferencesStore {
    fn interface_preferences(&self, uri: &str) -> InterfacePreferences {
        Self::load(&self.interface_path(uri))
    }

    fn feed_preferences(&self, uri: &str) -> FeedPreferences {
        Self::load(&self.feed_path(uri))
    }

    fn save_feed_preferences(&self, uri: &str, preferences: &FeedPreferences) {
        let path = self.feed_path(uri);
        match serde_json::to_vec_pretty(preferences) {
            Ok(json) => {
                if let Err(e) = hatch_locations::atomic_write(&path, &json) {
                    warn!("Cannot save preferences {}: {}", path.display(), e);
                }
            }
            Err(e) => warn!("Cannot serialize preferences for {}: {}", uri, e),
        }
    }
}
