//! Manifest digests over an installation directory.
//!
//! SPDX-License-Identifier: GPL-3.0-or-later

use hatch_feed_model::digest::base32_encode;
use hatch_feed_model::ManifestDigest;
use sha1::Sha1;
use sha2::{Digest as _, Sha256};
use std::fs::File;
use std::io::{self, Read};
use std::path::Path;
use walkdir::WalkDir;

/// Builds the manifest digest of a directory tree: a deterministic manifest
/// text (one line per entry, sorted by path) is hashed with each supported
/// algorithm. File contents feed into the manifest through their own hash,
/// so any byte change anywhere changes the digest.
pub fn digest_directory(root: &Path) -> io::Result<ManifestDigest> {
    let manifest = manifest_text(root)?;
    let bytes = manifest.as_bytes();

    let sha1_hex = hex::encode(Sha1::digest(bytes));
    let sha256_raw = Sha256::digest(bytes);

    Ok(ManifestDigest {
        sha1: None,
        sha1_new: Some(sha1_hex),
        sha256: Some(hex::encode(sha256_raw)),
        sha256_new: Some(base32_encode(&sha256_raw)),
    })
}

fn manifest_text(root: &Path) -> io::Result<String> {
    let mut entries: Vec<(String, Option<(String, u64)>)> = Vec::new();
    for entry in WalkDir::new(root).min_depth(1).sort_by_file_name() {
        let entry = entry.map_err(io::Error::other)?;
        let relative = entry
            .path()
            .strip_prefix(root)
            .map_err(io::Error::other)?
            .components()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .collect::<Vec<_>>()
            .join("/");
        if entry.file_type().is_dir() {
            entries.push((relative, None));
        } else if entry.file_type().is_file() {
            let size = entry.metadata().map_err(io::Error::other)?.len();
            entries.push((relative, Some((hash_file(entry.path())?, size))));
        }
    }
    entries.sort_by(|(a, _), (b, _)| a.cmp(b));

    let mut manifest = String::new();
    for (path, file_info) in entries {
        match file_info {
            None => manifest.push_str(&format!("D /{}\n", path)),
            Some((hash, size)) => {
                manifest.push_str(&format!("F {} {} /{}\n", hash, size, path))
            }
        }
    }
    Ok(manifest)
}

fn hash_file(path: &Path) -> io::Result<String> {
    let mut file = File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buffer = [0u8; 64 * 1024];
    loop {
        let read = file.read(&mut buffer)?;
        if read == 0 {
            break;
        }
        hasher.update(&buffer[..read]);
    }
    Ok(hex::encode(hasher.finalize()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn digest_is_stable_and_content_sensitive() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join("bin")).unwrap();
        fs::write(dir.path().join("bin/app.exe"), b"binary").unwrap();
        fs::write(dir.path().join("readme.txt"), b"hello").unwrap();

        let first = digest_directory(dir.path()).unwrap();
        let second = digest_directory(dir.path()).unwrap();
        assert_eq!(first, second);
        assert!(first.sha256_new.is_some());
        assert!(first.sha1_new.is_some());
        assert!(first.best().unwrap().starts_with("sha256new_"));

        fs::write(dir.path().join("readme.txt"), b"changed").unwrap();
        let third = digest_directory(dir.path()).unwrap();
        assert_ne!(first, third);
        assert!(!first.partial_matches(&third));
    }

    #[test]
    fn empty_directory_digests() {
        let dir = tempfile::tempdir().unwrap();
        let digest = digest_directory(dir.path()).unwrap();
        assert!(digest.best().is_some());
    }
}
