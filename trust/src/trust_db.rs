//! The trust database: which key fingerprints are trusted to sign feeds for
//! which domains.
//!
//! SPDX-License-Identifier: GPL-3.0-or-later

use log::warn;
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// XML namespace of the trust database document.
pub const TRUST_NS: &str = "http://zero-install.sourceforge.net/2007/injector/trust";

/// Maps key fingerprints to the set of domains their signatures are trusted
/// for. Kept sorted so saved files are stable; domain comparison is
/// case-insensitive (domains are normalised to lower case on entry).
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TrustDb {
    keys: BTreeMap<String, BTreeSet<String>>,
    path: Option<PathBuf>,
}

// serde-xml-rs matches attributes by their plain name, so these fields line
// up with `<key fingerprint="…"><domain value="…"/></key>` on disk.
#[derive(Serialize, Deserialize)]
#[serde(rename = "trusted-keys")]
struct TrustedKeysXml {
    #[serde(default)]
    xmlns: String,
    #[serde(rename = "key", default)]
    keys: Vec<KeyXml>,
}

#[derive(Serialize, Deserialize)]
struct KeyXml {
    fingerprint: String,
    #[serde(rename = "domain", default)]
    domains: Vec<DomainXml>,
}

#[derive(Serialize, Deserialize)]
struct DomainXml {
    value: String,
}

impl TrustDb {
    /// Loads the database from the standard location. A missing or corrupt
    /// file yields an empty database with a logged warning; startup must not
    /// fail because of a damaged cache file.
    pub fn load() -> TrustDb {
        let path = hatch_locations::trust_db_path();
        let mut db = TrustDb::load_from(&path);
        db.path = Some(path);
        db
    }

    pub fn load_from(path: &Path) -> TrustDb {
        let mut db = TrustDb {
            keys: BTreeMap::new(),
            path: Some(path.to_path_buf()),
        };
        match fs::read_to_string(path) {
            Ok(xml) => match serde_xml_rs::from_str::<TrustedKeysXml>(&xml) {
                Ok(parsed) => {
                    for key in parsed.keys {
                        for domain in key.domains {
                            db.add(&key.fingerprint, &domain.value);
                        }
                    }
                }
                Err(e) => warn!("Ignoring corrupt trust database {}: {}", path.display(), e),
            },
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => warn!("Cannot read trust database {}: {}", path.display(), e),
        }
        db
    }

    /// Unions the `(fingerprint, domain)` pairs from another file into this
    /// database; used to combine system-wide and per-user configuration.
    pub fn merge_from(&mut self, path: &Path) {
        let other = TrustDb::load_from(path);
        for (fingerprint, domains) in other.keys {
            for domain in domains {
                self.add(&fingerprint, &domain);
            }
        }
    }

    fn add(&mut self, fingerprint: &str, domain: &str) {
        self.keys
            .entry(fingerprint.to_string())
            .or_default()
            .insert(domain.to_ascii_lowercase());
    }

    /// Trusts `fingerprint` for `domain`. Idempotent.
    pub fn trust(&mut self, fingerprint: &str, domain: &str) {
        self.add(fingerprint, domain);
    }

    /// Removes all trust in the given key.
    pub fn untrust_key(&mut self, fingerprint: &str) {
        self.keys.remove(fingerprint);
    }

    /// Removes trust in the key for one domain only.
    pub fn untrust(&mut self, fingerprint: &str, domain: &str) {
        if let Some(domains) = self.keys.get_mut(fingerprint) {
            domains.remove(&domain.to_ascii_lowercase());
            if domains.is_empty() {
                self.keys.remove(fingerprint);
            }
        }
    }

    pub fn is_trusted(&self, fingerprint: &str, domain: &str) -> bool {
        self.keys
            .get(fingerprint)
            .is_some_and(|domains| domains.contains(&domain.to_ascii_lowercase()))
    }

    /// All `(fingerprint, domains)` entries, sorted by fingerprint.
    pub fn entries(&self) -> impl Iterator<Item = (&String, &BTreeSet<String>)> {
        self.keys.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Saves back to the file this database was loaded from, atomically.
    pub fn save(&self) -> io::Result<()> {
        let path = self
            .path
            .as_ref()
            .ok_or_else(|| io::Error::other("trust database has no backing file"))?;
        self.save_to(path)
    }

    pub fn save_to(&self, path: &Path) -> io::Result<()> {
        let doc = TrustedKeysXml {
            xmlns: TRUST_NS.to_string(),
            keys: self
                .keys
                .iter()
                .map(|(fingerprint, domains)| KeyXml {
                    fingerprint: fingerprint.clone(),
                    domains: domains
                        .iter()
                        .map(|d| DomainXml { value: d.clone() })
                        .collect(),
                })
                .collect(),
        };
        let xml = serde_xml_rs::to_string(&doc).map_err(io::Error::other)?;
        hatch_locations::atomic_write(path, xml.as_bytes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trust_then_is_trusted() {
        let mut db = TrustDb::default();
        db.trust("ABC", "example.com");
        assert!(db.is_trusted("ABC", "example.com"));
        assert!(!db.is_trusted("ABC", "other.org"));
        assert!(!db.is_trusted("DEF", "example.com"));
    }

    #[test]
    fn domains_compare_case_insensitively() {
        let mut db = TrustDb::default();
        db.trust("ABC", "Example.Com");
        assert!(db.is_trusted("ABC", "example.com"));
        assert!(db.is_trusted("ABC", "EXAMPLE.COM"));
        // Fingerprints stay case-sensitive.
        assert!(!db.is_trusted("abc", "example.com"));
    }

    #[test]
    fn untrust_key_removes_all_domains() {
        let mut db = TrustDb::default();
        db.trust("ABC", "example.com");
        db.trust("ABC", "example.org");
        db.untrust_key("ABC");
        assert!(!db.is_trusted("ABC", "example.com"));
        assert!(!db.is_trusted("ABC", "example.org"));
    }

    #[test]
    fn untrust_single_domain_keeps_the_rest() {
        let mut db = TrustDb::default();
        db.trust("ABC", "example.com");
        db.trust("ABC", "example.org");
        db.untrust("ABC", "example.com");
        assert!(!db.is_trusted("ABC", "example.com"));
        assert!(db.is_trusted("ABC", "example.org"));
    }

    #[test]
    fn xml_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("trustdb.xml");

        let mut db = TrustDb::default();
        db.trust("ABC", "example.com");
        db.trust("ABC", "example.org");
        db.trust("DEF", "example.net");
        db.save_to(&path).unwrap();

        let loaded = TrustDb::load_from(&path);
        assert_eq!(loaded.keys, db.keys);
        assert!(loaded.is_trusted("ABC", "Example.Com"));
    }

    #[test]
    fn parses_documents_written_by_other_tools() {
        // A literal trust DB as other implementations write it, not one
        // produced by our own serializer.
        let xml = concat!(
            r#"<?xml version="1.0"?>"#,
            "\n",
            r#"<trusted-keys xmlns="http://zero-install.sourceforge.net/2007/injector/trust">"#,
            "\n",
            r#"  <key fingerprint="DA9825AECAD089757CDABD8E07133F96CA74D8BA">"#,
            "\n",
            r#"    <domain value="example.com"/>"#,
            "\n",
            r#"    <domain value="Example.Org"/>"#,
            "\n",
            r#"  </key>"#,
            "\n",
            r#"</trusted-keys>"#,
            "\n",
        );
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("trustdb.xml");
        fs::write(&path, xml).unwrap();

        let db = TrustDb::load_from(&path);
        assert!(!db.is_empty());
        assert!(db.is_trusted(
            "DA9825AECAD089757CDABD8E07133F96CA74D8BA",
            "example.com"
        ));
        // Domains normalise to lower case on load.
        assert!(db.is_trusted(
            "DA9825AECAD089757CDABD8E07133F96CA74D8BA",
            "example.org"
        ));
        assert!(!db.is_trusted(
            "DA9825AECAD089757CDABD8E07133F96CA74D8BA",
            "example.net"
        ));
    }

    #[test]
    fn missing_file_loads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let db = TrustDb::load_from(&dir.path().join("absent.xml"));
        assert!(db.is_empty());
    }

    #[test]
    fn corrupt_file_loads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("trustdb.xml");
        fs::write(&path, "this is not xml <<<").unwrap();
        let db = TrustDb::load_from(&path);
        assert!(db.is_empty());
    }

    #[test]
    fn merge_unions_pairs() {
        let dir = tempfile::tempdir().unwrap();
        let system = dir.path().join("system.xml");
        let mut db = TrustDb::default();
        db.trust("ABC", "example.com");
        db.save_to(&system).unwrap();

        let mut user = TrustDb::default();
        user.trust("ABC", "example.org");
        user.trust("DEF", "example.net");
        user.merge_from(&system);

        assert!(user.is_trusted("ABC", "example.com"));
        assert!(user.is_trusted("ABC", "example.org"));
        assert!(user.is_trusted("DEF", "example.net"));
    }
}
