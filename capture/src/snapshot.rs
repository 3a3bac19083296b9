//! Snapshots of the observable system state and their diffs.
//!
//! SPDX-License-Identifier: GPL-3.0-or-later

use crate::registry::{Hive, RegistryView, DEFAULT_VALUE};
use std::cmp::Ordering;
use std::fs;
use std::path::Path;

pub const AUTOPLAY_HANDLERS_KEY: &str =
    r"SOFTWARE\Microsoft\Windows\CurrentVersion\Explorer\AutoplayHandlers\Handlers";
pub const AUTOPLAY_EVENTS_KEY: &str =
    r"SOFTWARE\Microsoft\Windows\CurrentVersion\Explorer\AutoplayHandlers\EventHandlers";
pub const REGISTERED_APPLICATIONS_KEY: &str = r"SOFTWARE\RegisteredApplications";
pub const CLIENTS_KEY: &str = r"SOFTWARE\Clients";
pub const CLSID_KEY: &str = "CLSID";
pub const URL_PROTOCOL_MARKER: &str = "URL Protocol";

/// Registry roots for the four context-menu targets.
pub const CONTEXT_MENU_FILES_KEY: &str = r"*\shell";
pub const CONTEXT_MENU_EXECUTABLE_FILES_KEY: &str = r"exefile\shell";
pub const CONTEXT_MENU_DIRECTORIES_KEY: &str = r"Directory\shell";
pub const CONTEXT_MENU_ALL_KEY: &str = r"AllFilesystemObjects\shell";

/// Everything about the machine we compare before and after an installer
/// run. All lists are sorted at capture time so diffing is a single merge
/// pass. A snapshot is a value: captured once, never mutated.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    /// `(service, client)` pairs under the Clients root.
    pub service_assocs: Vec<(String, String)>,
    pub autoplay_handlers_user: Vec<String>,
    pub autoplay_handlers_machine: Vec<String>,
    /// `(event, handler)` pairs.
    pub autoplay_assocs_user: Vec<(String, String)>,
    pub autoplay_assocs_machine: Vec<(String, String)>,
    /// `(.extension, progID)` pairs.
    pub file_assocs: Vec<(String, String)>,
    /// `(protocol, open command)` pairs.
    pub protocol_assocs: Vec<(String, String)>,
    pub prog_ids: Vec<String>,
    pub class_ids: Vec<String>,
    /// `(name, capability key path)` pairs.
    pub registered_applications: Vec<(String, String)>,
    pub context_menu_files: Vec<String>,
    pub context_menu_executable_files: Vec<String>,
    pub context_menu_directories: Vec<String>,
    pub context_menu_all: Vec<String>,
    /// Subdirectory names of the Program Files roots.
    pub program_files_dirs: Vec<String>,
}

fn ordinal(a: &String, b: &String) -> Ordering {
    a.cmp(b)
}

fn case_insensitive(a: &String, b: &String) -> Ordering {
    a.to_lowercase()
        .cmp(&b.to_lowercase())
        .then_with(|| a.cmp(b))
}

fn pair_ordinal(a: &(String, String), b: &(String, String)) -> Ordering {
    a.cmp(b)
}

impl Snapshot {
    /// Captures the current state through the given registry view and the
    /// Program Files roots.
    pub fn take(registry: &dyn RegistryView, program_files: &[&Path]) -> Snapshot {
        let mut snapshot = Snapshot::default();

        for service in registry.subkeys(Hive::LocalMachine, CLIENTS_KEY) {
            let service_key = format!(r"{}\{}", CLIENTS_KEY, service);
            for client in registry.subkeys(Hive::LocalMachine, &service_key) {
                snapshot.service_assocs.push((service.clone(), client));
            }
        }

        snapshot.autoplay_handlers_user =
            registry.subkeys(Hive::CurrentUser, AUTOPLAY_HANDLERS_KEY);
        snapshot.autoplay_handlers_machine =
            registry.subkeys(Hive::LocalMachine, AUTOPLAY_HANDLERS_KEY);
        snapshot.autoplay_assocs_user = autoplay_assocs(registry, Hive::CurrentUser);
        snapshot.autoplay_assocs_machine = autoplay_assocs(registry, Hive::LocalMachine);

        for key in registry.subkeys(Hive::ClassesRoot, "") {
            if let Some(extension) = key.strip_prefix('.') {
                if let Some(prog_id) =
                    registry.get_string(Hive::ClassesRoot, &key, DEFAULT_VALUE)
                {
                    snapshot
                        .file_assocs
                        .push((format!(".{}", extension), prog_id));
                }
            } else {
                if registry
                    .get_string(Hive::ClassesRoot, &key, URL_PROTOCOL_MARKER)
                    .is_some()
                {
                    let command = registry
                        .get_string(
                            Hive::ClassesRoot,
                            &format!(r"{}\shell\open\command", key),
                            DEFAULT_VALUE,
                        )
                        .unwrap_or_default();
                    snapshot.protocol_assocs.push((key.clone(), command));
                }
                snapshot.prog_ids.push(key);
            }
        }

        snapshot.class_ids = registry.subkeys(Hive::ClassesRoot, CLSID_KEY);
        for name in registry.value_names(Hive::LocalMachine, REGISTERED_APPLICATIONS_KEY) {
            if name.is_empty() {
                continue;
            }
            let path = registry
                .get_string(Hive::LocalMachine, REGISTERED_APPLICATIONS_KEY, &name)
                .unwrap_or_default();
            snapshot.registered_applications.push((name, path));
        }

        snapshot.context_menu_files = registry.subkeys(Hive::ClassesRoot, CONTEXT_MENU_FILES_KEY);
        snapshot.context_menu_executable_files =
            registry.subkeys(Hive::ClassesRoot, CONTEXT_MENU_EXECUTABLE_FILES_KEY);
        snapshot.context_menu_directories =
            registry.subkeys(Hive::ClassesRoot, CONTEXT_MENU_DIRECTORIES_KEY);
        snapshot.context_menu_all = registry.subkeys(Hive::ClassesRoot, CONTEXT_MENU_ALL_KEY);

        for root in program_files {
            if let Ok(entries) = fs::read_dir(root) {
                for entry in entries.flatten() {
                    if entry.path().is_dir() {
                        snapshot
                            .program_files_dirs
                            .push(entry.file_name().to_string_lossy().into_owned());
                    }
                }
            }
        }

        snapshot.sort();
        snapshot
    }

    fn sort(&mut self) {
        self.service_assocs.sort_by(pair_ordinal);
        self.autoplay_handlers_user.sort_by(ordinal);
        self.autoplay_handlers_machine.sort_by(ordinal);
        self.autoplay_assocs_user.sort_by(pair_ordinal);
        self.autoplay_assocs_machine.sort_by(pair_ordinal);
        self.file_assocs.sort_by(pair_ordinal);
        self.protocol_assocs.sort_by(pair_ordinal);
        // Registry class names vary in case between writes; compare them
        // case-insensitively or re-registrations show up as new entries.
        self.prog_ids.sort_by(case_insensitive);
        self.class_ids.sort_by(case_insensitive);
        self.registered_applications.sort_by(pair_ordinal);
        self.context_menu_files.sort_by(ordinal);
        self.context_menu_executable_files.sort_by(ordinal);
        self.context_menu_directories.sort_by(ordinal);
        self.context_menu_all.sort_by(ordinal);
        self.program_files_dirs.sort_by(case_insensitive);
    }
}

fn autoplay_assocs(registry: &dyn RegistryView, hive: Hive) -> Vec<(String, String)> {
    let mut assocs = Vec::new();
    for event in registry.subkeys(hive, AUTOPLAY_EVENTS_KEY) {
        let event_key = format!(r"{}\{}", AUTOPLAY_EVENTS_KEY, event);
        for handler in registry.value_names(hive, &event_key) {
            if !handler.is_empty() {
                assocs.push((event.clone(), handler));
            }
        }
    }
    assocs
}

/// Sorted set-difference `after \ before` with the given comparer. Both
/// inputs must be sorted by the same comparer.
fn new_entries<T: Clone>(
    before: &[T],
    after: &[T],
    cmp: impl Fn(&T, &T) -> Ordering,
) -> Vec<T> {
    let mut added = Vec::new();
    let mut b = 0;
    for item in after {
        while b < before.len() && cmp(&before[b], item) == Ordering::Less {
            b += 1;
        }
        if b >= before.len() || cmp(&before[b], item) != Ordering::Equal {
            added.push(item.clone());
        } else {
            b += 1;
        }
    }
    added
}

/// The entries that appeared between two snapshots.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotDiff {
    pub service_assocs: Vec<(String, String)>,
    pub autoplay_handlers_user: Vec<String>,
    pub autoplay_handlers_machine: Vec<String>,
    pub autoplay_assocs_user: Vec<(String, String)>,
    pub autoplay_assocs_machine: Vec<(String, String)>,
    pub file_assocs: Vec<(String, String)>,
    pub protocol_assocs: Vec<(String, String)>,
    pub prog_ids: Vec<String>,
    pub class_ids: Vec<String>,
    pub registered_applications: Vec<(String, String)>,
    pub context_menu_files: Vec<String>,
    pub context_menu_executable_files: Vec<String>,
    pub context_menu_directories: Vec<String>,
    pub context_menu_all: Vec<String>,
    pub program_files_dirs: Vec<String>,
}

impl SnapshotDiff {
    pub fn new(before: &Snapshot, after: &Snapshot) -> SnapshotDiff {
        SnapshotDiff {
            service_assocs: new_entries(&before.service_assocs, &after.service_assocs, pair_ordinal),
            autoplay_handlers_user: new_entries(
                &before.autoplay_handlers_user,
                &after.autoplay_handlers_user,
                ordinal,
            ),
            autoplay_handlers_machine: new_entries(
                &before.autoplay_handlers_machine,
                &after.autoplay_handlers_machine,
                ordinal,
            ),
            autoplay_assocs_user: new_entries(
                &before.autoplay_assocs_user,
                &after.autoplay_assocs_user,
                pair_ordinal,
            ),
            autoplay_assocs_machine: new_entries(
                &before.autoplay_assocs_machine,
                &after.autoplay_assocs_machine,
                pair_ordinal,
            ),
            file_assocs: new_entries(&before.file_assocs, &after.file_assocs, pair_ordinal),
            protocol_assocs: new_entries(
                &before.protocol_assocs,
                &after.protocol_assocs,
                pair_ordinal,
            ),
            prog_ids: new_entries(&before.prog_ids, &after.prog_ids, case_insensitive),
            class_ids: new_entries(&before.class_ids, &after.class_ids, case_insensitive),
            registered_applications: new_entries(
                &before.registered_applications,
                &after.registered_applications,
                pair_ordinal,
            ),
            context_menu_files: new_entries(
                &before.context_menu_files,
                &after.context_menu_files,
                ordinal,
            ),
            context_menu_executable_files: new_entries(
                &before.context_menu_executable_files,
                &after.context_menu_executable_files,
                ordinal,
            ),
            context_menu_directories: new_entries(
                &before.context_menu_directories,
                &after.context_menu_directories,
                ordinal,
            ),
            context_menu_all: new_entries(&before.context_menu_all, &after.context_menu_all, ordinal),
            program_files_dirs: new_entries(
                &before.program_files_dirs,
                &after.program_files_dirs,
                case_insensitive,
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::MemoryRegistry;

    #[test]
    fn new_entries_is_a_sorted_set_difference() {
        let before = vec!["a".to_string(), "c".to_string()];
        let after = vec!["a".to_string(), "b".to_string(), "c".to_string(), "d".to_string()];
        assert_eq!(new_entries(&before, &after, ordinal), vec!["b", "d"]);
        assert!(new_entries(&after, &after, ordinal).is_empty());
    }

    #[test]
    fn case_insensitive_diff_ignores_case_changes() {
        let before = vec!["MyApp.Doc".to_string()];
        let mut after = vec!["myapp.doc".to_string(), "Other".to_string()];
        after.sort_by(case_insensitive);
        assert_eq!(
            new_entries(&before, &after, case_insensitive),
            vec!["Other"]
        );
    }

    #[test]
    fn snapshot_captures_and_diffs_registry_state() {
        let mut registry = MemoryRegistry::new();
        registry.set(Hive::ClassesRoot, ".txt", "", "txtfile");
        registry.add_key(Hive::ClassesRoot, "txtfile");
        let before = Snapshot::take(&registry, &[]);

        registry.set(Hive::ClassesRoot, ".note", "", "App.Note");
        registry.set(Hive::ClassesRoot, r"App.Note\shell\open\command", "", "cmd");
        registry.set(Hive::ClassesRoot, "irc", URL_PROTOCOL_MARKER, "");
        registry.set(Hive::ClassesRoot, r"irc\shell\open\command", "", "irc cmd");
        registry.set(
            Hive::LocalMachine,
            REGISTERED_APPLICATIONS_KEY,
            "App",
            r"SOFTWARE\App\Capabilities",
        );
        let after = Snapshot::take(&registry, &[]);

        let diff = SnapshotDiff::new(&before, &after);
        assert_eq!(diff.file_assocs, vec![(".note".to_string(), "App.Note".to_string())]);
        assert!(diff.prog_ids.iter().any(|p| p == "App.Note"));
        assert!(diff.prog_ids.iter().any(|p| p == "irc"));
        assert_eq!(diff.protocol_assocs.len(), 1);
        assert_eq!(diff.registered_applications.len(), 1);
        assert!(diff.service_assocs.is_empty());
    }

    #[test]
    fn program_files_dirs_are_captured() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("MyApp")).unwrap();
        std::fs::write(dir.path().join("stray.txt"), "x").unwrap();

        let registry = MemoryRegistry::new();
        let snapshot = Snapshot::take(&registry, &[dir.path()]);
        assert_eq!(snapshot.program_files_dirs, vec!["MyApp"]);
    }
}
