//! Registry access seam. Collectors and snapshots only ever see this trait;
//! the live backend exists on Windows only, and tests use the in-memory
//! registry.
//!
//! SPDX-License-Identifier: GPL-3.0-or-later

use std::collections::BTreeMap;

/// Name of the "default" value of a registry key.
pub const DEFAULT_VALUE: &str = "";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Hive {
    ClassesRoot,
    CurrentUser,
    LocalMachine,
}

/// Read-only view of the registry. Paths use backslash separators and are
/// compared case-insensitively, like the real registry.
pub trait RegistryView: Send + Sync {
    /// Immediate subkey names of `path` (the hive root for `""`).
    fn subkeys(&self, hive: Hive, path: &str) -> Vec<String>;

    /// Value names of the key, including `""` for the default value if set.
    fn value_names(&self, hive: Hive, path: &str) -> Vec<String>;

    /// A string value; `DEFAULT_VALUE` reads the key's default value.
    fn get_string(&self, hive: Hive, path: &str, name: &str) -> Option<String>;

    fn key_exists(&self, hive: Hive, path: &str) -> bool;
}

/// In-memory registry for tests and dry runs.
#[derive(Default)]
pub struct MemoryRegistry {
    /// Key path (with hive) -> values. Parent keys are implied.
    keys: BTreeMap<(u8, String), BTreeMap<String, String>>,
}

fn hive_tag(hive: Hive) -> u8 {
    match hive {
        Hive::ClassesRoot => 0,
        Hive::CurrentUser => 1,
        Hive::LocalMachine => 2,
    }
}

impl MemoryRegistry {
    pub fn new() -> MemoryRegistry {
        MemoryRegistry::default()
    }

    /// Creates the key if needed.
    pub fn add_key(&mut self, hive: Hive, path: &str) {
        self.keys
            .entry((hive_tag(hive), path.to_string()))
            .or_default();
    }

    /// Creates the key if needed and sets a value (use [`DEFAULT_VALUE`] for
    /// the default value).
    pub fn set(&mut self, hive: Hive, path: &str, name: &str, value: &str) {
        self.keys
            .entry((hive_tag(hive), path.to_string()))
            .or_default()
            .insert(name.to_string(), value.to_string());
    }

    fn lookup(&self, hive: Hive, path: &str) -> Option<&BTreeMap<String, String>> {
        let tag = hive_tag(hive);
        self.keys
            .iter()
            .find(|((h, p), _)| *h == tag && p.eq_ignore_ascii_case(path))
            .map(|(_, values)| values)
    }
}

impl RegistryView for MemoryRegistry {
    fn subkeys(&self, hive: Hive, path: &str) -> Vec<String> {
        let tag = hive_tag(hive);
        let prefix = if path.is_empty() {
            String::new()
        } else {
            format!("{}\\", path.to_ascii_lowercase())
        };
        let mut names: Vec<String> = Vec::new();
        for (h, key_path) in self.keys.keys() {
            if *h != tag {
                continue;
            }
            let lower = key_path.to_ascii_lowercase();
            let Some(rest) = lower.strip_prefix(&prefix) else {
                continue;
            };
            if rest.is_empty() {
                continue;
            }
            // Preserve the stored casing of the first remaining segment.
            let segment_len = rest.split('\\').next().map(str::len).unwrap_or(0);
            let original = &key_path[prefix.len()..prefix.len() + segment_len];
            if !names.iter().any(|n| n.eq_ignore_ascii_case(original)) {
                names.push(original.to_string());
            }
        }
        names
    }

    fn value_names(&self, hive: Hive, path: &str) -> Vec<String> {
        self.lookup(hive, path)
            .map(|values| values.keys().cloned().collect())
            .unwrap_or_default()
    }

    fn get_string(&self, hive: Hive, path: &str, name: &str) -> Option<String> {
        self.lookup(hive, path)?.get(name).cloned()
    }

    fn key_exists(&self, hive: Hive, path: &str) -> bool {
        let tag = hive_tag(hive);
        let lower = path.to_ascii_lowercase();
        let prefix = format!("{}\\", lower);
        self.keys.keys().any(|(h, p)| {
            *h == tag && {
                let p = p.to_ascii_lowercase();
                p == lower || p.starts_with(&prefix)
            }
        })
    }
}

/// Live registry, only on Windows.
#[cfg(windows)]
pub mod live {
    use super::{Hive, RegistryView};
    use winreg::enums::{HKEY_CLASSES_ROOT, HKEY_CURRENT_USER, HKEY_LOCAL_MACHINE};
    use winreg::RegKey;

    pub struct LiveRegistry;

    fn root(hive: Hive) -> RegKey {
        match hive {
            Hive::ClassesRoot => RegKey::predef(HKEY_CLASSES_ROOT),
            Hive::CurrentUser => RegKey::predef(HKEY_CURRENT_USER),
            Hive::LocalMachine => RegKey::predef(HKEY_LOCAL_MACHINE),
        }
    }

    impl RegistryView for LiveRegistry {
        fn subkeys(&self, hive: Hive, path: &str) -> Vec<String> {
            match root(hive).open_subkey(path) {
                Ok(key) => key.enum_keys().filter_map(Result::ok).collect(),
                Err(_) => Vec::new(),
            }
        }

        fn value_names(&self, hive: Hive, path: &str) -> Vec<String> {
            match root(hive).open_subkey(path) {
                Ok(key) => key
                    .enum_values()
                    .filter_map(Result::ok)
                    .map(|(name, _)| name)
                    .collect(),
                Err(_) => Vec::new(),
            }
        }

        fn get_string(&self, hive: Hive, path: &str, name: &str) -> Option<String> {
            root(hive)
                .open_subkey(path)
                .ok()?
                .get_value::<String, _>(name)
                .ok()
        }

        fn key_exists(&self, hive: Hive, path: &str) -> bool {
            root(hive).open_subkey(path).is_ok()
        }
    }
}
