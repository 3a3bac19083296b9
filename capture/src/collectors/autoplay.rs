//! AutoPlay handlers from both hives.
//!
//! SPDX-License-Identifier: GPL-3.0-or-later

use super::split_arguments;
use crate::command_mapper::CommandMapper;
use crate::registry::{Hive, RegistryView, DEFAULT_VALUE};
use crate::snapshot::{SnapshotDiff, AUTOPLAY_HANDLERS_KEY};
use hatch_feed_model::capability::{AutoPlay, AutoPlayEvent, Capability, Verb};

/// For every new AutoPlay handler: its progID/verb pair resolved through the
/// command mapper, plus the events it was registered for.
pub fn collect(
    registry: &dyn RegistryView,
    diff: &SnapshotDiff,
    mapper: &CommandMapper,
) -> Vec<Capability> {
    let mut capabilities = Vec::new();
    for (hive, handlers, assocs) in [
        (
            Hive::CurrentUser,
            &diff.autoplay_handlers_user,
            &diff.autoplay_assocs_user,
        ),
        (
            Hive::LocalMachine,
            &diff.autoplay_handlers_machine,
            &diff.autoplay_assocs_machine,
        ),
    ] {
        for handler in handlers {
            let handler_key = format!(r"{}\{}", AUTOPLAY_HANDLERS_KEY, handler);
            let read = |name: &str| registry.get_string(hive, &handler_key, name);

            let Some(prog_id) = read("ProgID") else {
                debug!("AutoPlay handler {} has no ProgID; skipping", handler);
                continue;
            };
            let verb_name = read("Verb").unwrap_or_else(|| "play".to_string());

            let command_key = format!(r"{}\shell\{}\command", prog_id, verb_name);
            let Some(command_line) =
                registry.get_string(Hive::ClassesRoot, &command_key, DEFAULT_VALUE)
            else {
                continue;
            };
            let Some((command, rest)) = mapper.get_command(&command_line) else {
                debug!("AutoPlay handler {} does not point at us; skipping", handler);
                continue;
            };

            capabilities.push(Capability::AutoPlay(AutoPlay {
                id: handler.clone(),
                provider: read("Provider"),
                description: read("Description"),
                verb: Verb {
                    name: verb_name,
                    command: Some(command.name.clone()),
                    arguments: split_arguments(&rest),
                    description: None,
                },
                events: assocs
                    .iter()
                    .filter(|(_, h)| h.eq_ignore_ascii_case(handler))
                    .map(|(event, _)| AutoPlayEvent { name: event.clone() })
                    .collect(),
            }));
        }
    }
    capabilities
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::MemoryRegistry;
    use crate::snapshot::{Snapshot, AUTOPLAY_EVENTS_KEY};
    use hatch_feed_model::implementation::Command;

    #[test]
    fn handler_with_events_is_collected() {
        let mut registry = MemoryRegistry::new();
        let before = Snapshot::take(&registry, &[]);

        let handler_key = format!(r"{}\AppPlayDisc", AUTOPLAY_HANDLERS_KEY);
        registry.set(Hive::LocalMachine, &handler_key, "ProgID", "App.Play");
        registry.set(Hive::LocalMachine, &handler_key, "Verb", "play");
        registry.set(Hive::LocalMachine, &handler_key, "Provider", "App");
        registry.set(Hive::LocalMachine, &handler_key, "Description", "Play discs");
        registry.set(
            Hive::ClassesRoot,
            r"App.Play\shell\play\command",
            "",
            r#""C:\App\player.exe" --disc "%1""#,
        );
        registry.set(
            Hive::LocalMachine,
            &format!(r"{}\OnCDAudioArrival", AUTOPLAY_EVENTS_KEY),
            "AppPlayDisc",
            "",
        );
        let after = Snapshot::take(&registry, &[]);

        let mapper = CommandMapper::new(r"C:\App", &[Command::new("run", "player.exe")]);
        let capabilities = collect(
            &registry,
            &crate::snapshot::SnapshotDiff::new(&before, &after),
            &mapper,
        );

        match capabilities.as_slice() {
            [Capability::AutoPlay(autoplay)] => {
                assert_eq!(autoplay.id, "AppPlayDisc");
                assert_eq!(autoplay.provider.as_deref(), Some("App"));
                assert_eq!(autoplay.verb.name, "play");
                assert_eq!(autoplay.verb.arguments, vec!["--disc", "%1"]);
                assert_eq!(autoplay.events.len(), 1);
                assert_eq!(autoplay.events[0].name, "OnCDAudioArrival");
            }
            other => panic!("expected one AutoPlay capability, got {:?}", other),
        }
    }

    #[test]
    fn handler_without_progid_is_skipped() {
        let mut registry = MemoryRegistry::new();
        let before = Snapshot::take(&registry, &[]);
        registry.set(
            Hive::LocalMachine,
            &format!(r"{}\Empty", AUTOPLAY_HANDLERS_KEY),
            "Provider",
            "App",
        );
        let after = Snapshot::take(&registry, &[]);

        let mapper = CommandMapper::new(r"C:\App", &[Command::new("run", "player.exe")]);
        assert!(collect(
            &registry,
            &crate::snapshot::SnapshotDiff::new(&before, &after),
            &mapper
        )
        .is_empty());
    }
}
