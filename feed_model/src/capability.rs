//! Desktop-integration capabilities attached to feeds: declarations that an
//! implementation handles file types, URL protocols, AutoPlay events, context
//! menus or a default-program role.
//!
//! SPDX-License-Identifier: GPL-3.0-or-later

/// A verb a capability offers (`open`, `edit`, `play`, ...), resolved to one
/// of the implementation's commands.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Verb {
    pub name: String,
    /// Name of the feed command to invoke.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub arguments: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileType {
    /// The progID this file type is registered under.
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// File extensions including the leading dot.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub extensions: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub verbs: Vec<Verb>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UrlProtocol {
    /// The scheme handled, e.g. `irc`.
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub verbs: Vec<Verb>,
}

/// What kind of filesystem object a context-menu entry applies to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ContextMenuTarget {
    Files,
    ExecutableFiles,
    Directories,
    All,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextMenu {
    pub id: String,
    pub target: ContextMenuTarget,
    pub verbs: Vec<Verb>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AutoPlayEvent {
    pub name: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AutoPlay {
    /// Handler name in the registry.
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub verb: Verb,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub events: Vec<AutoPlayEvent>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstallCommand {
    pub name: String,
    pub command: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub arguments: Vec<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DefaultProgram {
    /// Client name under the service root (e.g. the browser's name).
    pub id: String,
    /// Service this program can act as (`Mail`, `Media`, ...).
    pub service: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub verbs: Vec<Verb>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub install_commands: Vec<InstallCommand>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppRegistration {
    pub id: String,
    /// Registry path of the application's capability key.
    pub capability_reg_path: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum Capability {
    FileType(FileType),
    UrlProtocol(UrlProtocol),
    ContextMenu(ContextMenu),
    AutoPlay(AutoPlay),
    DefaultProgram(DefaultProgram),
    AppRegistration(AppRegistration),
}

impl Capability {
    pub fn id(&self) -> &str {
        match self {
            Capability::FileType(c) => &c.id,
            Capability::UrlProtocol(c) => &c.id,
            Capability::ContextMenu(c) => &c.id,
            Capability::AutoPlay(c) => &c.id,
            Capability::DefaultProgram(c) => &c.id,
            Capability::AppRegistration(c) => &c.id,
        }
    }
}

/// A group of capabilities, all registered under one OS.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapabilityList {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub capabilities: Vec<Capability>,
}
