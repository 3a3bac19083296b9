//! Application registration (`RegisteredApplications`) and the protocol /
//! file associations its capability key covers.
//!
//! SPDX-License-Identifier: GPL-3.0-or-later

use super::collect_verbs;
use crate::command_mapper::CommandMapper;
use crate::registry::{Hive, RegistryView};
use crate::snapshot::SnapshotDiff;
use hatch_feed_model::capability::{AppRegistration, Capability, UrlProtocol};

/// The app-registration capability plus the URL-protocol capabilities its
/// key declares. Only a single unambiguous new registration is captured; the
/// registration covers its protocols, so callers must not also collect them
/// from the raw protocol associations.
pub fn collect(
    registry: &dyn RegistryView,
    diff: &SnapshotDiff,
    mapper: &CommandMapper,
) -> Option<Vec<Capability>> {
    let (name, capability_path) = match diff.registered_applications.as_slice() {
        [] => return None,
        [single] => single,
        [first, ..] => {
            warn!(
                "Multiple new registered applications ({}); capturing only {}",
                diff.registered_applications.len(),
                first.0
            );
            first
        }
    };

    let mut capabilities = vec![Capability::AppRegistration(AppRegistration {
        id: name.clone(),
        capability_reg_path: capability_path.clone(),
    })];

    // Protocols declared under <capabilities>\URLAssociations map a scheme
    // to a progID whose verbs we can resolve.
    let url_assoc_key = format!(r"{}\URLAssociations", capability_path);
    for hive in [Hive::LocalMachine, Hive::CurrentUser] {
        for scheme in registry.value_names(hive, &url_assoc_key) {
            if scheme.is_empty() {
                continue;
            }
            let Some(prog_id) = registry.get_string(hive, &url_assoc_key, &scheme) else {
                continue;
            };
            let verbs = collect_verbs(registry, Hive::ClassesRoot, &prog_id, mapper);
            if verbs.is_empty() {
                continue;
            }
            capabilities.push(Capability::UrlProtocol(UrlProtocol {
                id: scheme,
                description: registry.get_string(Hive::ClassesRoot, &prog_id, ""),
                verbs,
            }));
        }
    }

    Some(capabilities)
}

/// URL protocols straight from the new protocol associations; used only
/// when no application registration covers them.
pub fn collect_protocols(
    registry: &dyn RegistryView,
    diff: &SnapshotDiff,
    mapper: &CommandMapper,
) -> Vec<Capability> {
    let mut capabilities = Vec::new();
    for (protocol, _command) in &diff.protocol_assocs {
        let verbs = collect_verbs(registry, Hive::ClassesRoot, protocol, mapper);
        if verbs.is_empty() {
            continue;
        }
        capabilities.push(Capability::UrlProtocol(UrlProtocol {
            id: protocol.clone(),
            description: registry.get_string(Hive::ClassesRoot, protocol, ""),
            verbs,
        }));
    }
    capabilities
}
