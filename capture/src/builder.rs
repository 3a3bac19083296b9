//! Assembles the captured feed.
//!
//! SPDX-License-Identifier: GPL-3.0-or-later

use hatch_feed_model::capability::{Capability, CapabilityList};
use hatch_feed_model::feed::{EntryPoint, Feed, LocalizedText};
use hatch_feed_model::implementation::{Command, Implementation, COMMAND_RUN};
use hatch_feed_model::{Stability, Version};

/// Collects everything the capture pipeline learns and turns it into a feed
/// with a single implementation.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct FeedBuilder {
    pub name: String,
    pub uri: Option<String>,
    pub summary: Option<String>,
    pub version: Option<Version>,
    /// Relative paths (backslash-separated) of all executables found in the
    /// installation directory.
    pub entry_points: Vec<String>,
    /// The executable chosen as the `run` command.
    pub main_exe: Option<String>,
    pub commands: Vec<Command>,
    pub capabilities: Vec<Capability>,
    pub implementation: Implementation,
}

impl FeedBuilder {
    pub fn new(name: impl Into<String>) -> FeedBuilder {
        FeedBuilder {
            name: name.into(),
            implementation: Implementation::new(""),
            ..FeedBuilder::default()
        }
    }

    /// Derives commands from the detected entry points: the main executable
    /// becomes `run`, every other executable gets a command named after its
    /// file stem.
    pub fn generate_commands(&mut self) {
        self.commands.clear();
        let Some(main) = &self.main_exe else {
            return;
        };
        self.commands.push(Command::new(COMMAND_RUN, main.clone()));
        for entry in &self.entry_points {
            if entry == main {
                continue;
            }
            let name = command_name_for(entry);
            if self.commands.iter().any(|c| c.name == name) {
                continue;
            }
            self.commands.push(Command::new(name, entry.clone()));
        }
    }

    pub fn build(&self) -> Feed {
        let mut implementation = self.implementation.clone();
        implementation.version = self
            .version
            .clone()
            .or_else(|| "0.1".parse().ok());
        implementation.stability = Stability::Testing;
        implementation.commands = self.commands.clone();

        let mut feed = Feed::new(self.name.clone());
        feed.uri = self.uri.clone();
        if let Some(summary) = &self.summary {
            feed.summaries.push(LocalizedText {
                lang: None,
                value: summary.clone(),
            });
        }
        feed.implementations.push(implementation);
        if !self.capabilities.is_empty() {
            feed.capabilities.push(CapabilityList {
                capabilities: self.capabilities.clone(),
            });
        }
        for command in &self.commands {
            feed.entry_points.push(EntryPoint {
                command: command.name.clone(),
                binary_name: command.path.as_ref().map(|p| file_stem(p).to_string()),
                names: Vec::new(),
            });
        }
        feed
    }
}

fn file_stem(path: &str) -> &str {
    let file = path.rsplit(['\\', '/']).next().unwrap_or(path);
    file.strip_suffix(".exe")
        .or_else(|| file.strip_suffix(".EXE"))
        .unwrap_or(file)
}

fn command_name_for(path: &str) -> String {
    file_stem(path).to_lowercase()
}
