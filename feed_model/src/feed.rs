//! The feed document: everything known about one interface.
//!
//! SPDX-License-Identifier: GPL-3.0-or-later

use crate::arch::Architecture;
use crate::capability::CapabilityList;
use crate::dependency::{Binding, Dependency, Restriction};
use crate::digest::ManifestDigest;
use crate::implementation::{Command, Implementation, PackageImplementation};
use crate::stability::Stability;
use crate::version::Version;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum FeedError {
    #[error("implementation {0:?} has no version")]
    MissingVersion(String),
    #[error("remote feed uses local path {0:?}")]
    LocalPathInRemoteFeed(String),
    #[error("relative href {0:?} in feed without a location")]
    UnresolvableHref(String),
}

/// A human-language-tagged text, e.g. a summary in a particular locale.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalizedText {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lang: Option<String>,
    pub value: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Icon {
    pub href: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
}

/// Reference to another feed contributing implementations for the same
/// interface, with optional architecture/language filters.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedReference {
    pub href: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub architecture: Option<Architecture>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub languages: Vec<String>,
}

/// A named entry point advertised to desktop menus.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EntryPoint {
    pub command: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub binary_name: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub names: Vec<LocalizedText>,
}

/// Attributes a group passes down to its descendants. A descendant's own
/// value always wins; list-valued attributes accumulate.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct GroupAttrs {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<Version>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub architecture: Option<Architecture>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stability: Option<Stability>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub languages: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub released: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub main: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub commands: Vec<Command>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dependencies: Vec<Dependency>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub restrictions: Vec<Restriction>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub bindings: Vec<Binding>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Group {
    #[serde(default)]
    pub attrs: GroupAttrs,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<Element>,
}

/// One entry in a feed's implementation tree.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum Element {
    Implementation(Implementation),
    PackageImplementation(PackageImplementation),
    Group(Group),
}

/// A feed document. Immutable after [`Feed::normalize`]; the solver only
/// ever sees the flattened `implementations` / `package_implementations`
/// lists, never groups.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Feed {
    /// Canonical URI this feed was fetched from; `None` for local feeds that
    /// have not been published.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uri: Option<String>,
    pub name: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub summaries: Vec<LocalizedText>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub descriptions: Vec<LocalizedText>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub homepage: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub icons: Vec<Icon>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub categories: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub feeds: Vec<FeedReference>,
    /// Minimum launcher version required to process this feed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_injector_version: Option<Version>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub elements: Vec<Element>,
    /// Populated by [`Feed::normalize`].
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub implementations: Vec<Implementation>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub package_implementations: Vec<PackageImplementation>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub capabilities: Vec<CapabilityList>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub entry_points: Vec<EntryPoint>,
}

impl Feed {
    pub fn new(name: impl Into<String>) -> Feed {
        Feed {
            name: name.into(),
            ..Feed::default()
        }
    }

    /// Flattens the element tree: groups disappear, their attributes are
    /// propagated onto the implementations below them, relative hrefs are
    /// resolved against the feed's own location and digests are derived from
    /// IDs where missing.
    ///
    /// `local_dir` is the directory of a local feed file; remote feeds pass
    /// `None` and any `local_path` then causes an error.
    pub fn normalize(&mut self, local_dir: Option<&PathBuf>) -> Result<(), FeedError> {
        self.resolve_hrefs()?;
        let elements = std::mem::take(&mut self.elements);
        let root = GroupAttrs::default();
        for element in elements {
            self.flatten(element, &root, local_dir)?;
        }
        Ok(())
    }

    /// Turns relative icon / nested-feed hrefs into absolute URIs using the
    /// feed's own location as the base.
    fn resolve_hrefs(&mut self) -> Result<(), FeedError> {
        let base = self.uri.as_deref().and_then(|u| url::Url::parse(u).ok());
        let mut resolve = |href: &mut String| -> Result<(), FeedError> {
            if url::Url::parse(href).is_ok() {
                return Ok(());
            }
            match &base {
                Some(base) => match base.join(href) {
                    Ok(absolute) => {
                        *href = absolute.into();
                        Ok(())
                    }
                    Err(_) => Err(FeedError::UnresolvableHref(href.clone())),
                },
                None => Err(FeedError::UnresolvableHref(href.clone())),
            }
        };
        for icon in &mut self.icons {
            resolve(&mut icon.href)?;
        }
        for feed in &mut self.feeds {
            resolve(&mut feed.href)?;
        }
        Ok(())
    }

    fn flatten(
        &mut self,
        element: Element,
        inherited: &GroupAttrs,
        local_dir: Option<&PathBuf>,
    ) -> Result<(), FeedError> {
        match element {
            Element::Group(group) => {
                let merged = merge_attrs(inherited, &group.attrs);
                for child in group.children {
                    self.flatten(child, &merged, local_dir)?;
                }
            }
            Element::Implementation(mut implementation) => {
                apply_attrs(&mut implementation, inherited);
                if implementation.version.is_none() {
                    return Err(FeedError::MissingVersion(implementation.id.clone()));
                }
                if let Some(local) = &implementation.local_path {
                    match local_dir {
                        Some(dir) if local.is_relative() => {
                            implementation.local_path = Some(dir.join(local));
                        }
                        Some(_) => {}
                        None => {
                            return Err(FeedError::LocalPathInRemoteFeed(
                                local.to_string_lossy().into_owned(),
                            ))
                        }
                    }
                }
                if implementation.digest.is_empty() {
                    implementation.digest = ManifestDigest::from_id(&implementation.id);
                }
                // `main` is shorthand for a `run` command.
                if let Some(main) = implementation.main.take() {
                    if implementation.command("run").is_none() {
                        implementation.commands.insert(0, Command::new("run", main));
                    }
                }
                self.implementations.push(implementation);
            }
            Element::PackageImplementation(mut package) => {
                for dep in &inherited.dependencies {
                    package.dependencies.push(dep.clone());
                }
                self.package_implementations.push(package);
            }
        }
        Ok(())
    }
}

fn merge_attrs(outer: &GroupAttrs, inner: &GroupAttrs) -> GroupAttrs {
    let mut merged = inner.clone();
    if merged.version.is_none() {
        merged.version = outer.version.clone();
    }
    if merged.architecture.is_none() {
        merged.architecture = outer.architecture;
    }
    if merged.stability.is_none() {
        merged.stability = outer.stability;
    }
    if merged.released.is_none() {
        merged.released = outer.released.clone();
    }
    if merged.main.is_none() {
        merged.main = outer.main.clone();
    }
    if merged.languages.is_empty() {
        merged.languages = outer.languages.clone();
    }
    // List-valued attributes accumulate outer-first so inner entries can
    // shadow them later during selection.
    merged.commands = outer
        .commands
        .iter()
        .chain(inner.commands.iter())
        .cloned()
        .collect();
    merged.dependencies = outer
        .dependencies
        .iter()
        .chain(inner.dependencies.iter())
        .cloned()
        .collect();
    merged.restrictions = outer
        .restrictions
        .iter()
        .chain(inner.restrictions.iter())
        .cloned()
        .collect();
    merged.bindings = outer
        .bindings
        .iter()
        .chain(inner.bindings.iter())
        .cloned()
        .collect();
    merged
}

fn apply_attrs(implementation: &mut Implementation, attrs: &GroupAttrs) {
    if implementation.version.is_none() {
        implementation.version = attrs.version.clone();
    }
    if implementation.architecture == Architecture::any() {
        if let Some(arch) = attrs.architecture {
            implementation.architecture = arch;
        }
    }
    if let Some(stability) = attrs.stability {
        // Only groups set explicit stability; the implementation keeps its
        // own value when it differs from the default.
        if implementation.stability == Stability::Testing {
            implementation.stability = stability;
        }
    }
    if implementation.languages.is_empty() {
        implementation.languages = attrs.languages.clone();
    }
    if implementation.released.is_none() {
        implementation.released = attrs.released.clone();
    }
    if implementation.main.is_none() {
        implementation.main = attrs.main.clone();
    }
    for command in &attrs.commands {
        if implementation.command(&command.name).is_none() {
            implementation.commands.push(command.clone());
        }
    }
    implementation.dependencies.extend(attrs.dependencies.iter().cloned());
    implementation.restrictions.extend(attrs.restrictions.iter().cloned());
    implementation.bindings.extend(attrs.bindings.iter().cloned());
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arch::{Cpu, Os};

    fn group(attrs: GroupAttrs, children: Vec<Element>) -> Element {
        Element::Group(Group { attrs, children })
    }

    #[test]
    fn groups_flatten_and_inherit() {
        let mut feed = Feed::new("demo");
        feed.elements.push(group(
            GroupAttrs {
                version: Some("1.0".parse().unwrap()),
                architecture: Some(Architecture::new(Os::Linux, Cpu::X64)),
                stability: Some(Stability::Stable),
                ..GroupAttrs::default()
            },
            vec![
                Element::Implementation(Implementation::new("sha256=aa")),
                group(
                    GroupAttrs {
                        version: Some("2.0".parse().unwrap()),
                        ..GroupAttrs::default()
                    },
                    vec![Element::Implementation(Implementation::new("sha256=bb"))],
                ),
            ],
        ));

        feed.normalize(None).unwrap();

        assert_eq!(feed.implementations.len(), 2);
        assert!(feed.elements.is_empty());
        let a = &feed.implementations[0];
        assert_eq!(a.version.as_ref().unwrap().to_string(), "1.0");
        assert_eq!(a.stability, Stability::Stable);
        assert_eq!(a.architecture.os, Os::Linux);
        let b = &feed.implementations[1];
        assert_eq!(b.version.as_ref().unwrap().to_string(), "2.0");
        assert_eq!(b.architecture.os, Os::Linux);
    }

    #[test]
    fn missing_version_is_rejected() {
        let mut feed = Feed::new("demo");
        feed.elements
            .push(Element::Implementation(Implementation::new("sha256=aa")));
        assert!(matches!(
            feed.normalize(None),
            Err(FeedError::MissingVersion(_))
        ));
    }

    #[test]
    fn local_paths_rejected_in_remote_feeds() {
        let mut implementation = Implementation::new("local");
        implementation.version = Some("1".parse().unwrap());
        implementation.local_path = Some(PathBuf::from("build/out"));

        let mut feed = Feed::new("demo");
        feed.elements.push(Element::Implementation(implementation.clone()));
        assert!(matches!(
            feed.normalize(None),
            Err(FeedError::LocalPathInRemoteFeed(_))
        ));

        let mut feed = Feed::new("demo");
        feed.elements.push(Element::Implementation(implementation));
        let dir = PathBuf::from("/srv/feeds");
        feed.normalize(Some(&dir)).unwrap();
        assert_eq!(
            feed.implementations[0].local_path.as_ref().unwrap(),
            &dir.join("build/out")
        );
    }

    #[test]
    fn digest_derived_from_id_and_main_becomes_run_command() {
        let mut implementation = Implementation::new("sha256=cafe");
        implementation.version = Some("1".parse().unwrap());
        implementation.main = Some("bin/tool".into());

        let mut feed = Feed::new("demo");
        feed.elements.push(Element::Implementation(implementation));
        feed.normalize(None).unwrap();

        let out = &feed.implementations[0];
        assert_eq!(out.digest.sha256.as_deref(), Some("cafe"));
        assert_eq!(
            out.command("run").and_then(|c| c.path.as_deref()),
            Some("bin/tool")
        );
    }

    #[test]
    fn relative_hrefs_resolve_against_feed_uri() {
        let mut feed = Feed::new("demo");
        feed.uri = Some("https://example.com/feeds/app.xml".into());
        feed.icons.push(Icon {
            href: "icons/app.png".into(),
            mime_type: None,
        });
        feed.feeds.push(FeedReference {
            href: "app-linux.xml".into(),
            architecture: None,
            languages: Vec::new(),
        });
        feed.normalize(None).unwrap();
        assert_eq!(feed.icons[0].href, "https://example.com/feeds/icons/app.png");
        assert_eq!(feed.feeds[0].href, "https://example.com/feeds/app-linux.xml");

        let mut feed = Feed::new("demo");
        feed.icons.push(Icon {
            href: "icons/app.png".into(),
            mime_type: None,
        });
        assert!(matches!(
            feed.normalize(None),
            Err(FeedError::UnresolvableHref(_))
        ));
    }

    #[test]
    fn group_dependencies_reach_package_implementations() {
        let mut feed = Feed::new("demo");
        feed.elements.push(group(
            GroupAttrs {
                dependencies: vec![Dependency::new("https://example.com/runtime")],
                ..GroupAttrs::default()
            },
            vec![Element::PackageImplementation(PackageImplementation {
                package: "tool".into(),
                distributions: vec!["deb".into()],
                versions: None,
                main: None,
                dependencies: Vec::new(),
            })],
        ));
        feed.normalize(None).unwrap();
        assert_eq!(feed.package_implementations[0].dependencies.len(), 1);
    }
}
