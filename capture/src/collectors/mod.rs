//! Collectors turn a snapshot diff into capability declarations.
//!
//! SPDX-License-Identifier: GPL-3.0-or-later

pub mod app_registration;
pub mod autoplay;
pub mod context_menu;
pub mod default_program;
pub mod file_types;

use crate::command_mapper::CommandMapper;
use crate::registry::{Hive, RegistryView, DEFAULT_VALUE};
use hatch_feed_model::capability::Verb;

/// Splits a command line's trailing arguments on whitespace, honouring
/// double quotes.
pub(crate) fn split_arguments(text: &str) -> Vec<String> {
    let mut arguments = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    for c in text.chars() {
        match c {
            '"' => in_quotes = !in_quotes,
            c if c.is_whitespace() && !in_quotes => {
                if !current.is_empty() {
                    arguments.push(std::mem::take(&mut current));
                }
            }
            c => current.push(c),
        }
    }
    if !current.is_empty() {
        arguments.push(current);
    }
    arguments
}

/// Reads the verbs of a class key (`<class>\shell\<verb>\command`) and maps
/// each command line back to a feed command. Verbs whose command line does
/// not point into the installation are dropped.
pub(crate) fn collect_verbs(
    registry: &dyn RegistryView,
    hive: Hive,
    class_key: &str,
    mapper: &CommandMapper,
) -> Vec<Verb> {
    let shell_key = format!(r"{}\shell", class_key);
    let mut verbs = Vec::new();
    for verb_name in registry.subkeys(hive, &shell_key) {
        let verb_key = format!(r"{}\{}", shell_key, verb_name);
        let Some(command_line) =
            registry.get_string(hive, &format!(r"{}\command", verb_key), DEFAULT_VALUE)
        else {
            continue;
        };
        let Some((command, rest)) = mapper.get_command(&command_line) else {
            debug!(
                "Ignoring verb {} of {}: command line {:?} is not ours",
                verb_name, class_key, command_line
            );
            continue;
        };
        verbs.push(Verb {
            name: verb_name.clone(),
            command: Some(command.name.clone()),
            arguments: split_arguments(&rest),
            description: registry.get_string(hive, &verb_key, DEFAULT_VALUE),
        });
    }
    verbs
}
