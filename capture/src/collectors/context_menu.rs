//! Context-menu entries from new shell verbs under the four target roots.
//!
//! SPDX-License-Identifier: GPL-3.0-or-later

use super::split_arguments;
use crate::command_mapper::CommandMapper;
use crate::registry::{Hive, RegistryView, DEFAULT_VALUE};
use crate::snapshot::{
    SnapshotDiff, CONTEXT_MENU_ALL_KEY, CONTEXT_MENU_DIRECTORIES_KEY,
    CONTEXT_MENU_EXECUTABLE_FILES_KEY, CONTEXT_MENU_FILES_KEY,
};
use hatch_feed_model::capability::{Capability, ContextMenu, ContextMenuTarget, Verb};

/// One `ContextMenu` per new verb under each target root, named
/// `<target>-<verb>`. Verbs not resolvable through the command mapper are
/// skipped.
///
/// Entries under the all-filesystem-objects root are recorded with target
/// `Directories`; existing feeds were produced that way and changing the
/// value would alter how they re-apply.
pub fn collect(
    registry: &dyn RegistryView,
    diff: &SnapshotDiff,
    mapper: &CommandMapper,
) -> Vec<Capability> {
    let groups: [(&str, &[String], ContextMenuTarget, &str); 4] = [
        (
            "files",
            &diff.context_menu_files,
            ContextMenuTarget::Files,
            CONTEXT_MENU_FILES_KEY,
        ),
        (
            "executable-files",
            &diff.context_menu_executable_files,
            ContextMenuTarget::ExecutableFiles,
            CONTEXT_MENU_EXECUTABLE_FILES_KEY,
        ),
        (
            "directories",
            &diff.context_menu_directories,
            ContextMenuTarget::Directories,
            CONTEXT_MENU_DIRECTORIES_KEY,
        ),
        (
            "all",
            &diff.context_menu_all,
            ContextMenuTarget::Directories,
            CONTEXT_MENU_ALL_KEY,
        ),
    ];

    let mut capabilities = Vec::new();
    for (tag, verb_names, target, root) in groups {
        for verb_name in verb_names {
            let verb_key = format!(r"{}\{}", root, verb_name);
            let Some(command_line) = registry.get_string(
                Hive::ClassesRoot,
                &format!(r"{}\command", verb_key),
                DEFAULT_VALUE,
            ) else {
                continue;
            };
            let Some((command, rest)) = mapper.get_command(&command_line) else {
                debug!(
                    "Ignoring context-menu verb {:?} under {}: not ours",
                    verb_name, root
                );
                continue;
            };
            capabilities.push(Capability::ContextMenu(ContextMenu {
                id: format!("{}-{}", tag, verb_name),
                target,
                verbs: vec![Verb {
                    name: verb_name.clone(),
                    command: Some(command.name.clone()),
                    arguments: split_arguments(&rest),
                    description: registry.get_string(Hive::ClassesRoot, &verb_key, DEFAULT_VALUE),
                }],
            }));
        }
    }
    capabilities
}
