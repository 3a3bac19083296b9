//! Maps observed command lines back to feed commands by longest-prefix
//! matching.
//!
//! SPDX-License-Identifier: GPL-3.0-or-later

use hatch_feed_model::implementation::Command;

/// For every known command, the spellings an installer might have written
/// into the registry: the quoted path and (when unambiguous) the bare one.
/// Sorted by command line *descending*, so the longest, most specific
/// spelling always matches first.
pub struct CommandMapper {
    pairs: Vec<(String, Command)>,
}

impl CommandMapper {
    /// `installation_dir` uses Windows separators and need not end with one.
    pub fn new(installation_dir: &str, commands: &[Command]) -> CommandMapper {
        let dir = installation_dir.trim_end_matches('\\');
        let mut pairs = Vec::new();

        for command in commands {
            let Some(relative) = &command.path else {
                continue;
            };
            let path = format!("{}\\{}", dir, relative.replace('/', "\\"));
            let arguments = command.arguments.join(" ");

            let quoted = if arguments.is_empty() {
                format!("\"{}\"", path)
            } else {
                format!("\"{}\" {}", path, arguments)
            };
            pairs.push((quoted, command.clone()));

            // The unquoted spelling is ambiguous when the path contains
            // whitespace *and* there are arguments; skip it then.
            if !path.contains(char::is_whitespace) || arguments.is_empty() {
                let unquoted = if arguments.is_empty() {
                    path
                } else {
                    format!("{} {}", path, arguments)
                };
                pairs.push((unquoted, command.clone()));
            }
        }

        pairs.sort_by(|(a, _), (b, _)| b.cmp(a));
        CommandMapper { pairs }
    }

    /// Finds the command whose spelling is a case-insensitive prefix of the
    /// observed command line; returns it plus the remaining arguments.
    pub fn get_command(&self, observed: &str) -> Option<(&Command, String)> {
        let lower = observed.to_lowercase();
        for (spelling, command) in &self.pairs {
            if lower.starts_with(&spelling.to_lowercase()) {
                let rest = observed[spelling.len()..].trim_start().to_string();
                return Some((command, rest));
            }
        }
        None
    }
}
