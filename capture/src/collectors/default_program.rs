//! Default programs (mail client, media player, ...) from new service
//! associations under the Clients root.
//!
//! SPDX-License-Identifier: GPL-3.0-or-later

use super::{collect_verbs, split_arguments};
use crate::command_mapper::CommandMapper;
use crate::registry::{Hive, RegistryView, DEFAULT_VALUE};
use crate::snapshot::{SnapshotDiff, CLIENTS_KEY};
use hatch_feed_model::capability::{Capability, DefaultProgram, InstallCommand};

const INSTALL_INFO_COMMANDS: [(&str, &str); 3] = [
    ("reinstall", "ReinstallCommand"),
    ("show-icons", "ShowIconsCommand"),
    ("hide-icons", "HideIconsCommand"),
];

/// One `DefaultProgram` per new `(service, client)` pair, with its verbs and
/// any Install Info commands that point into the installation directory.
pub fn collect(
    registry: &dyn RegistryView,
    diff: &SnapshotDiff,
    mapper: &CommandMapper,
    installation_dir: &str,
) -> Vec<Capability> {
    if diff.service_assocs.len() > 1 {
        warn!(
            "Multiple new service registrations found ({}); capturing all of them",
            diff.service_assocs.len()
        );
    }

    let mut capabilities = Vec::new();
    for (service, client) in &diff.service_assocs {
        let client_key = format!(r"{}\{}\{}", CLIENTS_KEY, service, client);
        let verbs = collect_verbs(registry, Hive::LocalMachine, &client_key, mapper);

        let install_info_key = format!(r"{}\InstallInfo", client_key);
        let mut install_commands = Vec::new();
        for (name, value_name) in INSTALL_INFO_COMMANDS {
            let Some(line) = registry.get_string(Hive::LocalMachine, &install_info_key, value_name)
            else {
                continue;
            };
            if let Some(command) = parse_install_command(name, &line, installation_dir) {
                install_commands.push(command);
            }
        }

        capabilities.push(Capability::DefaultProgram(DefaultProgram {
            id: client.clone(),
            service: service.clone(),
            description: registry.get_string(Hive::LocalMachine, &client_key, DEFAULT_VALUE),
            verbs,
            install_commands,
        }));
    }
    capabilities
}

/// Splits an Install Info command line into executable + arguments. Only
/// lines that start with the quoted installation directory are ours; the
/// executable is stored relative to it.
fn parse_install_command(
    name: &str,
    line: &str,
    installation_dir: &str,
) -> Option<InstallCommand> {
    let dir = installation_dir.trim_end_matches('\\');
    let prefix = format!("\"{}\\", dir);
    if !line.starts_with(&prefix) {
        debug!("Install Info command {:?} is not under {}", line, dir);
        return None;
    }
    let after_quote = &line[1..];
    let close = after_quote.find('"')?;
    let full_path = &after_quote[..close];
    let relative = full_path[dir.len()..].trim_start_matches('\\').to_string();
    let arguments = split_arguments(after_quote[close + 1..].trim_start());
    Some(InstallCommand {
        name: name.to_string(),
        command: relative,
        arguments,
    })
}
