//! Standard on-disk locations for Hatch state.
//!
//! SPDX-License-Identifier: GPL-3.0-or-later

use std::env;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Setting this relocates every root below to subdirectories of the given
/// path, for portable installations carried on removable media.
pub const PORTABLE_BASE_ENV: &str = "HATCH_PORTABLE_BASE";

fn portable_base() -> Option<PathBuf> {
    env::var_os(PORTABLE_BASE_ENV)
        .filter(|v| !v.is_empty())
        .map(PathBuf::from)
}

/// Per-user data root (feeds, interface preferences, trust DB).
pub fn data_root() -> PathBuf {
    if let Some(base) = portable_base() {
        return base.join("data");
    }
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("hatch")
}

/// Per-user cache root (imported verification keys, implementation store).
pub fn cache_root() -> PathBuf {
    if let Some(base) = portable_base() {
        return base.join("cache");
    }
    dirs::cache_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("hatch")
}

/// Per-user config root (signing keys, user settings).
pub fn config_root() -> PathBuf {
    if let Some(base) = portable_base() {
        return base.join("config");
    }
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("hatch")
}

/// The trust database file.
pub fn trust_db_path() -> PathBuf {
    data_root().join("injector").join("trustdb.xml")
}

/// Cached copy of the feed for the given URI.
pub fn feed_cache_path(uri: &str) -> PathBuf {
    data_root().join("injector").join("feeds").join(escape(uri))
}

/// Per-interface preference file for the given URI.
pub fn interface_prefs_path(uri: &str) -> PathBuf {
    data_root()
        .join("injector")
        .join("interfaces")
        .join(escape(uri))
}

/// Public keyring holding keys imported while verifying feeds. Kept under the
/// cache root rather than the user's OpenPGP home so auto-imported feed-signer
/// keys never pollute it.
pub fn public_keyring_path() -> PathBuf {
    cache_root().join("pubring.gpg")
}

/// The user's signing-key home. `GNUPGHOME` overrides the default.
pub fn gnupg_home() -> PathBuf {
    if let Some(home) = env::var_os("GNUPGHOME").filter(|v| !v.is_empty()) {
        return PathBuf::from(home);
    }
    config_root().join("gnupg")
}

/// Escapes a URI so it can be used as a single file name. Alphanumerics plus
/// `.`, `_` and `-` pass through; everything else becomes `%XX`.
pub fn escape(uri: &str) -> String {
    let mut out = String::with_capacity(uri.len());
    for b in uri.bytes() {
        match b {
            b'0'..=b'9' | b'a'..=b'z' | b'A'..=b'Z' | b'.' | b'_' | b'-' => out.push(b as char),
            _ => out.push_str(&format!("%{:02x}", b)),
        }
    }
    out
}

/// Writes `data` to `path` atomically: the bytes go to a temporary file in the
/// same directory first and are renamed into place, so readers never observe a
/// half-written file.
pub fn atomic_write(path: &Path, data: &[u8]) -> io::Result<()> {
    let dir = path
        .parent()
        .ok_or_else(|| io::Error::other(format!("no parent directory for {}", path.display())))?;
    fs::create_dir_all(dir)?;

    let tmp = dir.join(format!(
        ".{}.tmp",
        path.file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "atomic".to_string())
    ));
    fs::write(&tmp, data)?;
    fs::rename(&tmp, path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escape_keeps_safe_chars_and_encodes_the_rest() {
        assert_eq!(escape("http://example.com/feed.xml"), "http%3a%2f%2fexample.com%2ffeed.xml");
        assert_eq!(escape("plain-name_1.0"), "plain-name_1.0");
    }

    #[test]
    fn atomic_write_replaces_content() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("state.xml");

        atomic_write(&target, b"first").unwrap();
        assert_eq!(fs::read(&target).unwrap(), b"first");

        atomic_write(&target, b"second").unwrap();
        assert_eq!(fs::read(&target).unwrap(), b"second");

        // No temporary leftovers.
        let names: Vec<_> = fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["state.xml".to_string()]);
    }

    #[test]
    fn portable_base_relocates_roots() {
        // Serialise around the env var to avoid clashing with other tests.
        env::set_var(PORTABLE_BASE_ENV, "/tmp/hatch-portable");
        assert_eq!(data_root(), PathBuf::from("/tmp/hatch-portable/data"));
        assert_eq!(cache_root(), PathBuf::from("/tmp/hatch-portable/cache"));
        env::remove_var(PORTABLE_BASE_ENV);
    }
}
