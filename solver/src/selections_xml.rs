//! XML form of a selections document, as exchanged with the legacy external
//! solver and printed by the CLI.
//!
//! SPDX-License-Identifier: GPL-3.0-or-later

use crate::errors::SolverError;
use hatch_feed_model::dependency::{Binding, Dependency, EnvironmentMode};
use hatch_feed_model::implementation::{Command, Runner};
use hatch_feed_model::selections::ImplementationSelection;
use hatch_feed_model::{Importance, ManifestDigest, Selections, Stability};
use std::path::PathBuf;

pub const SELECTIONS_NS: &str = "http://zero-install.sourceforge.net/2004/injector/interface";

// serde-xml-rs matches attributes by their plain name, so the field names
// below line up with `interface="…" id="…" version="…"` exactly as other
// implementations write them; renames are only for child element names and
// dashed attribute names.
#[derive(Serialize, Deserialize)]
#[serde(rename = "selections")]
struct SelectionsXml {
    #[serde(default)]
    xmlns: String,
    interface: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    command: Option<String>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    stale: bool,
    #[serde(rename = "selection", default)]
    selections: Vec<SelectionXml>,
}

#[derive(Serialize, Deserialize)]
struct SelectionXml {
    interface: String,
    #[serde(rename = "from-feed", default, skip_serializing_if = "Option::is_none")]
    from_feed: Option<String>,
    id: String,
    version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    arch: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    stability: Option<String>,
    #[serde(rename = "local-path", default, skip_serializing_if = "Option::is_none")]
    local_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    distribution: Option<String>,
    #[serde(rename = "manifest-digest", default, skip_serializing_if = "Option::is_none")]
    digest: Option<DigestXml>,
    #[serde(rename = "command", default)]
    commands: Vec<CommandXml>,
    #[serde(rename = "requires", default)]
    requires: Vec<RequiresXml>,
    #[serde(rename = "environment", default)]
    environment_bindings: Vec<EnvironmentXml>,
    #[serde(rename = "executable-in-var", default)]
    executable_in_var: Vec<ExecutableBindingXml>,
    #[serde(rename = "executable-in-path", default)]
    executable_in_path: Vec<ExecutableBindingXml>,
}

#[derive(Serialize, Deserialize, Default)]
struct DigestXml {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    sha1: Option<String>,
    #[serde(rename = "sha1new", default, skip_serializing_if = "Option::is_none")]
    sha1_new: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    sha256: Option<String>,
    #[serde(rename = "sha256new", default, skip_serializing_if = "Option::is_none")]
    sha256_new: Option<String>,
}

#[derive(Serialize, Deserialize)]
struct CommandXml {
    name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    path: Option<String>,
    #[serde(rename = "arg", default)]
    args: Vec<ArgXml>,
    #[serde(rename = "runner", default, skip_serializing_if = "Option::is_none")]
    runner: Option<RunnerXml>,
    #[serde(rename = "requires", default)]
    requires: Vec<RequiresXml>,
}

#[derive(Serialize, Deserialize)]
struct ArgXml {
    value: String,
}

#[derive(Serialize, Deserialize)]
struct RunnerXml {
    interface: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    command: Option<String>,
}

#[derive(Serialize, Deserialize)]
struct RequiresXml {
    interface: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    importance: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    version: Option<String>,
    #[serde(rename = "environment", default)]
    environment_bindings: Vec<EnvironmentXml>,
    #[serde(rename = "executable-in-var", default)]
    executable_in_var: Vec<ExecutableBindingXml>,
    #[serde(rename = "executable-in-path", default)]
    executable_in_path: Vec<ExecutableBindingXml>,
}

#[derive(Serialize, Deserialize)]
struct EnvironmentXml {
    name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    insert: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    value: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    mode: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    separator: Option<String>,
}

#[derive(Serialize, Deserialize)]
struct ExecutableBindingXml {
    name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    command: Option<String>,
}

fn malformed(what: impl std::fmt::Display) -> SolverError {
    SolverError::Protocol(format!("malformed selections document: {}", what))
}

/// Parses a selections XML document.
pub fn parse(xml: &str) -> Result<Selections, SolverError> {
    let doc: SelectionsXml = serde_xml_rs::from_str(xml).map_err(malformed)?;
    let mut selections = Selections::new(&doc.interface, doc.command);
    selections.stale = doc.stale;
    for selection in doc.selections {
        selections.implementations.push(selection_from_xml(selection)?);
    }
    Ok(selections)
}

/// Serializes a selections document to XML.
pub fn serialize(selections: &Selections) -> Result<String, SolverError> {
    let doc = SelectionsXml {
        xmlns: SELECTIONS_NS.to_string(),
        interface: selections.interface_uri.clone(),
        command: selections.command.clone(),
        stale: selections.stale,
        selections: selections
            .implementations
            .iter()
            .map(selection_to_xml)
            .collect(),
    };
    serde_xml_rs::to_string(&doc).map_err(malformed)
}

fn selection_from_xml(xml: SelectionXml) -> Result<ImplementationSelection, SolverError> {
    let digest = xml
        .digest
        .map(|d| ManifestDigest {
            sha1: d.sha1,
            sha1_new: d.sha1_new,
            sha256: d.sha256,
            sha256_new: d.sha256_new,
        })
        .unwrap_or_default();
    Ok(ImplementationSelection {
        interface_uri: xml.interface,
        from_feed: xml.from_feed,
        id: xml.id,
        version: xml.version.parse().map_err(malformed)?,
        architecture: xml
            .arch
            .as_deref()
            .and_then(|a| a.parse().ok())
            .unwrap_or_default(),
        stability: xml
            .stability
            .as_deref()
            .and_then(|s| s.parse().ok())
            .unwrap_or(Stability::Testing),
        digest,
        local_path: xml.local_path.map(PathBuf::from),
        distribution: xml.distribution,
        commands: xml.commands.into_iter().map(command_from_xml).collect(),
        dependencies: xml.requires.into_iter().map(requires_from_xml).collect::<Result<_, _>>()?,
        restrictions: Vec::new(),
        bindings: bindings_from_xml(
            xml.environment_bindings,
            xml.executable_in_var,
            xml.executable_in_path,
        ),
    })
}

fn selection_to_xml(selection: &ImplementationSelection) -> SelectionXml {
    let digest = &selection.digest;
    SelectionXml {
        interface: selection.interface_uri.clone(),
        from_feed: selection.from_feed.clone(),
        id: selection.id.clone(),
        version: selection.version.to_string(),
        arch: Some(selection.architecture.to_string()),
        stability: Some(selection.stability.to_string()),
        local_path: selection
            .local_path
            .as_ref()
            .map(|p| p.to_string_lossy().into_owned()),
        distribution: selection.distribution.clone(),
        digest: (!digest.is_empty()).then(|| DigestXml {
            sha1: digest.sha1.clone(),
            sha1_new: digest.sha1_new.clone(),
            sha256: digest.sha256.clone(),
            sha256_new: digest.sha256_new.clone(),
        }),
        commands: selection.commands.iter().map(command_to_xml).collect(),
        requires: selection.dependencies.iter().map(requires_to_xml).collect(),
        environment_bindings: environment_to_xml(&selection.bindings),
        executable_in_var: executables_to_xml(&selection.bindings, false),
        executable_in_path: executables_to_xml(&selection.bindings, true),
    }
}

fn command_from_xml(xml: CommandXml) -> Command {
    Command {
        name: xml.name,
        path: xml.path,
        arguments: xml.args.into_iter().map(|a| a.value).collect(),
        runner: xml.runner.map(|r| Runner {
            interface_uri: r.interface,
            command: r.command,
            arguments: Vec::new(),
            versions: None,
        }),
        working_dir: None,
        dependencies: xml
            .requires
            .into_iter()
            .filter_map(|r| requires_from_xml(r).ok())
            .collect(),
        restrictions: Vec::new(),
        bindings: Vec::new(),
    }
}

fn command_to_xml(command: &Command) -> CommandXml {
    CommandXml {
        name: command.name.clone(),
        path: command.path.clone(),
        args: command
            .arguments
            .iter()
            .map(|a| ArgXml { value: a.clone() })
            .collect(),
        runner: command.runner.as_ref().map(|r| RunnerXml {
            interface: r.interface_uri.clone(),
            command: r.command.clone(),
        }),
        requires: command.dependencies.iter().map(requires_to_xml).collect(),
    }
}

fn requires_from_xml(xml: RequiresXml) -> Result<Dependency, SolverError> {
    Ok(Dependency {
        interface_uri: xml.interface,
        versions: match xml.version {
            Some(v) => Some(v.parse().map_err(malformed)?),
            None => None,
        },
        os: None,
        distributions: Vec::new(),
        importance: match xml.importance.as_deref() {
            Some("recommended") => Importance::Recommended,
            _ => Importance::Essential,
        },
        bindings: bindings_from_xml(
            xml.environment_bindings,
            xml.executable_in_var,
            xml.executable_in_path,
        ),
    })
}

fn requires_to_xml(dependency: &Dependency) -> RequiresXml {
    RequiresXml {
        interface: dependency.interface_uri.clone(),
        importance: match dependency.importance {
            Importance::Essential => None,
            Importance::Recommended => Some("recommended".to_string()),
        },
        version: dependency.versions.as_ref().map(|v| v.to_string()),
        environment_bindings: environment_to_xml(&dependency.bindings),
        executable_in_var: executables_to_xml(&dependency.bindings, false),
        executable_in_path: executables_to_xml(&dependency.bindings, true),
    }
}

fn bindings_from_xml(
    environment: Vec<EnvironmentXml>,
    in_var: Vec<ExecutableBindingXml>,
    in_path: Vec<ExecutableBindingXml>,
) -> Vec<Binding> {
    let mut bindings = Vec::new();
    for b in environment {
        bindings.push(Binding::Environment {
            name: b.name,
            insert: b.insert,
            value: b.value,
            mode: match b.mode.as_deref() {
                Some("append") => EnvironmentMode::Append,
                Some("replace") => EnvironmentMode::Replace,
                _ => EnvironmentMode::Prepend,
            },
            separator: b.separator,
        });
    }
    for b in in_var {
        bindings.push(Binding::ExecutableInVar {
            name: b.name,
            command: b.command,
        });
    }
    for b in in_path {
        bindings.push(Binding::ExecutableInPath {
            name: b.name,
            command: b.command,
        });
    }
    bindings
}

fn environment_to_xml(bindings: &[Binding]) -> Vec<EnvironmentXml> {
    bindings
        .iter()
        .filter_map(|b| match b {
            Binding::Environment {
                name,
                insert,
                value,
                mode,
                separator,
            } => Some(EnvironmentXml {
                name: name.clone(),
                insert: insert.clone(),
                value: value.clone(),
                mode: match mode {
                    EnvironmentMode::Prepend => None,
                    EnvironmentMode::Append => Some("append".to_string()),
                    EnvironmentMode::Replace => Some("replace".to_string()),
                },
                separator: separator.clone(),
            }),
            _ => None,
        })
        .collect()
}

fn executables_to_xml(bindings: &[Binding], in_path: bool) -> Vec<ExecutableBindingXml> {
    bindings
        .iter()
        .filter_map(|b| match b {
            Binding::ExecutableInVar { name, command } if !in_path => {
                Some(ExecutableBindingXml {
                    name: name.clone(),
                    command: command.clone(),
                })
            }
            Binding::ExecutableInPath { name, command } if in_path => {
                Some(ExecutableBindingXml {
                    name: name.clone(),
                    command: command.clone(),
                })
            }
            _ => None,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use hatch_feed_model::implementation::Implementation;
    use hatch_feed_model::selections::ImplementationSelection;

    fn sample() -> Selections {
        let mut selections = Selections::new("https://example.com/app", Some("run".into()));
        let mut implementation = Implementation::new("sha256=aa");
        implementation.version = Some("1.2".parse().unwrap());
        implementation.digest = ManifestDigest {
            sha256: Some("aa".into()),
            ..ManifestDigest::default()
        };
        let mut selection = ImplementationSelection::from_implementation(
            "https://example.com/app",
            Some("https://example.com/feed"),
            &implementation,
            "1.2".parse().unwrap(),
        );
        let mut command = Command::new("run", "bin/app");
        command.arguments.push("--verbose".into());
        selection.commands.push(command);
        let mut dep = Dependency::new("https://example.com/lib");
        dep.versions = Some("1..!2".parse().unwrap());
        dep.bindings.push(Binding::ExecutableInPath {
            name: "helper".into(),
            command: None,
        });
        selection.dependencies.push(dep);
        selections.implementations.push(selection);
        selections
    }

    #[test]
    fn round_trip_preserves_structure() {
        let original = sample();
        let xml = serialize(&original).unwrap();
        assert!(xml.contains("selections"));
        assert!(xml.contains("sha256=aa"));

        let parsed = parse(&xml).unwrap();
        assert_eq!(parsed.interface_uri, original.interface_uri);
        assert_eq!(parsed.command, original.command);
        assert_eq!(parsed.implementations.len(), 1);

        let selection = &parsed.implementations[0];
        assert_eq!(selection.id, "sha256=aa");
        assert_eq!(selection.version.to_string(), "1.2");
        assert_eq!(selection.digest.sha256.as_deref(), Some("aa"));
        assert_eq!(selection.commands[0].path.as_deref(), Some("bin/app"));
        assert_eq!(selection.dependencies[0].interface_uri, "https://example.com/lib");
        assert_eq!(
            selection.dependencies[0]
                .versions
                .as_ref()
                .map(|v| v.to_string()),
            Some("1..!2".to_string())
        );
    }

    #[test]
    fn parses_documents_written_by_other_implementations() {
        // A literal selections document with plain attribute names, as a
        // legacy external solver returns it; deliberately not produced by
        // this module's own serializer.
        let xml = concat!(
            r#"<?xml version="1.0"?>"#,
            "\n",
            r#"<selections xmlns="http://zero-install.sourceforge.net/2004/injector/interface" interface="https://example.com/app" command="run">"#,
            "\n",
            r#"  <selection interface="https://example.com/app" id="sha256=aa" version="1.2" arch="Linux-x86_64" stability="stable">"#,
            "\n",
            r#"    <manifest-digest sha256="aa"/>"#,
            "\n",
            r#"    <command name="run" path="bin/app">"#,
            "\n",
            r#"      <arg value="--verbose"/>"#,
            "\n",
            r#"    </command>"#,
            "\n",
            r#"    <requires interface="https://example.com/lib" version="1..!2">"#,
            "\n",
            r#"      <executable-in-path name="helper"/>"#,
            "\n",
            r#"    </requires>"#,
            "\n",
            r#"  </selection>"#,
            "\n",
            r#"  <selection interface="https://example.com/lib" id="sha256=bb" version="1.5"/>"#,
            "\n",
            r#"</selections>"#,
            "\n",
        );

        let parsed = parse(xml).unwrap();
        assert_eq!(parsed.interface_uri, "https://example.com/app");
        assert_eq!(parsed.command.as_deref(), Some("run"));
        assert!(!parsed.stale);
        assert_eq!(parsed.implementations.len(), 2);

        let app = parsed.get("https://example.com/app").unwrap();
        assert_eq!(app.id, "sha256=aa");
        assert_eq!(app.version.to_string(), "1.2");
        assert_eq!(app.architecture.to_string(), "Linux-x86_64");
        assert_eq!(app.stability, Stability::Stable);
        assert_eq!(app.digest.sha256.as_deref(), Some("aa"));
        assert_eq!(app.commands[0].name, "run");
        assert_eq!(app.commands[0].path.as_deref(), Some("bin/app"));
        assert_eq!(app.commands[0].arguments, vec!["--verbose"]);
        assert_eq!(app.dependencies[0].interface_uri, "https://example.com/lib");
        assert_eq!(
            app.dependencies[0].versions.as_ref().map(|v| v.to_string()),
            Some("1..!2".to_string())
        );
        assert!(matches!(
            app.dependencies[0].bindings.as_slice(),
            [Binding::ExecutableInPath { name, command: None }] if name == "helper"
        ));

        let lib = parsed.get("https://example.com/lib").unwrap();
        assert_eq!(lib.version.to_string(), "1.5");
        assert!(lib.commands.is_empty());
    }

    #[test]
    fn stale_flag_survives_round_trip() {
        let mut selections = sample();
        selections.stale = true;
        let xml = serialize(&selections).unwrap();
        assert!(parse(&xml).unwrap().stale);
    }

    #[test]
    fn garbage_is_a_protocol_error() {
        assert!(matches!(
            parse("<selections"),
            Err(SolverError::Protocol(_))
        ));
    }
}
