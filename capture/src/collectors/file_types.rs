//! File types and URL protocols from new progIDs.
//!
//! SPDX-License-Identifier: GPL-3.0-or-later

use super::collect_verbs;
use crate::command_mapper::CommandMapper;
use crate::registry::{Hive, RegistryView, DEFAULT_VALUE};
use crate::snapshot::{SnapshotDiff, URL_PROTOCOL_MARKER};
use hatch_feed_model::capability::{Capability, FileType, UrlProtocol};

/// For every new progID: a `FileType` with its extensions (reverse-looked-up
/// from the new file associations) and verbs. A progID carrying the
/// `URL Protocol` marker is a protocol handler, not a file type.
/// Capabilities that end up with no verbs are discarded; they cannot launch
/// anything of ours.
pub fn collect(
    registry: &dyn RegistryView,
    diff: &SnapshotDiff,
    mapper: &CommandMapper,
) -> Vec<Capability> {
    let mut capabilities = Vec::new();

    for prog_id in &diff.prog_ids {
        let description = registry.get_string(Hive::ClassesRoot, prog_id, DEFAULT_VALUE);
        let verbs = collect_verbs(registry, Hive::ClassesRoot, prog_id, mapper);
        if verbs.is_empty() {
            debug!("Skipping {}: no verbs point into the installation", prog_id);
            continue;
        }

        if registry
            .get_string(Hive::ClassesRoot, prog_id, URL_PROTOCOL_MARKER)
            .is_some()
        {
            capabilities.push(Capability::UrlProtocol(UrlProtocol {
                id: prog_id.clone(),
                description,
                verbs,
            }));
        } else {
            let extensions: Vec<String> = diff
                .file_assocs
                .iter()
                .filter(|(_, assigned)| assigned.eq_ignore_ascii_case(prog_id))
                .map(|(extension, _)| extension.clone())
                .collect();
            capabilities.push(Capability::FileType(FileType {
                id: prog_id.clone(),
                description,
                extensions,
                verbs,
            }));
        }
    }
    capabilities
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::MemoryRegistry;
    use crate::snapshot::Snapshot;
    use hatch_feed_model::implementation::Command;

    fn mapper() -> CommandMapper {
        let mut command = Command::new("run", "editor.exe");
        command.arguments.clear();
        CommandMapper::new(r"C:\App", &[command])
    }

    #[test]
    fn new_progid_becomes_file_type_with_extensions() {
        let mut registry = MemoryRegistry::new();
        let before = Snapshot::take(&registry, &[]);

        registry.set(Hive::ClassesRoot, "App.Doc", "", "App Document");
        registry.set(
            Hive::ClassesRoot,
            r"App.Doc\shell\open\command",
            "",
            r#""C:\App\editor.exe" "%1""#,
        );
        registry.set(Hive::ClassesRoot, ".appdoc", "", "App.Doc");
        let after = Snapshot::take(&registry, &[]);

        let capabilities = collect(
            &registry,
            &crate::snapshot::SnapshotDiff::new(&before, &after),
            &mapper(),
        );
        assert_eq!(capabilities.len(), 1);
        match &capabilities[0] {
            Capability::FileType(file_type) => {
                assert_eq!(file_type.id, "App.Doc");
                assert_eq!(file_type.description.as_deref(), Some("App Document"));
                assert_eq!(file_type.extensions, vec![".appdoc"]);
                assert_eq!(file_type.verbs.len(), 1);
                assert_eq!(file_type.verbs[0].name, "open");
                assert_eq!(file_type.verbs[0].command.as_deref(), Some("run"));
                assert_eq!(file_type.verbs[0].arguments, vec!["%1"]);
            }
            other => panic!("expected FileType, got {:?}", other),
        }
    }

    #[test]
    fn url_protocol_marker_changes_the_capability_kind() {
        let mut registry = MemoryRegistry::new();
        let before = Snapshot::take(&registry, &[]);

        registry.set(Hive::ClassesRoot, "appcall", URL_PROTOCOL_MARKER, "");
        registry.set(
            Hive::ClassesRoot,
            r"appcall\shell\open\command",
            "",
            r#""C:\App\editor.exe" "%1""#,
        );
        let after = Snapshot::take(&registry, &[]);

        let capabilities = collect(
            &registry,
            &crate::snapshot::SnapshotDiff::new(&before, &after),
            &mapper(),
        );
        assert!(matches!(
            capabilities.as_slice(),
            [Capability::UrlProtocol(p)] if p.id == "appcall"
        ));
    }

    #[test]
    fn verbless_progids_are_discarded() {
        let mut registry = MemoryRegistry::new();
        let before = Snapshot::take(&registry, &[]);
        registry.set(Hive::ClassesRoot, "App.Stray", "", "No verbs here");
        let after = Snapshot::take(&registry, &[]);

        let capabilities = collect(
            &registry,
            &crate::snapshot::SnapshotDiff::new(&before, &after),
            &mapper(),
        );
        assert!(capabilities.is_empty());
    }

    #[test]
    fn foreign_command_lines_are_ignored() {
        let mut registry = MemoryRegistry::new();
        let before = Snapshot::take(&registry, &[]);
        registry.set(
            Hive::ClassesRoot,
            r"Other.Doc\shell\open\command",
            "",
            r#""C:\Entirely\Different\app.exe" "%1""#,
        );
        registry.add_key(Hive::ClassesRoot, "Other.Doc");
        let after = Snapshot::take(&registry, &[]);

        let capabilities = collect(
            &registry,
            &crate::snapshot::SnapshotDiff::new(&before, &after),
            &mapper(),
        );
        assert!(capabilities.is_empty());
    }
}
