//! The capture session: snapshot, install, diff, collect, build.
//!
//! A session is persisted as JSON between CLI invocations, so `start`,
//! `diff` and `finish` can run as separate processes around the installer.
//!
//! SPDX-License-Identifier: GPL-3.0-or-later

use crate::builder::FeedBuilder;
use crate::collectors::{app_registration, autoplay, context_menu, default_program, file_types};
use crate::command_mapper::CommandMapper;
use crate::manifest;
use crate::registry::RegistryView;
use crate::snapshot::{Snapshot, SnapshotDiff};
use anyhow::{bail, Context, Result};
use hatch_feed_model::capability::Capability;
use hatch_feed_model::feed::Feed;
use hatch_feed_model::implementation::RetrievalMethod;
use std::collections::HashSet;
use std::fs::{self, File};
use std::io::{Read, Write};
use std::mem::discriminant;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;
use zip::write::SimpleFileOptions;
use zip::ZipWriter;

#[derive(Serialize, Deserialize)]
pub struct CaptureSession {
    snapshot_before: Snapshot,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    snapshot_after: Option<Snapshot>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    diff: Option<SnapshotDiff>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    installation_dir: Option<String>,
    pub feed_builder: FeedBuilder,
}

impl CaptureSession {
    /// Takes the before-install snapshot.
    pub fn start(
        registry: &dyn RegistryView,
        program_files: &[&Path],
        feed_builder: FeedBuilder,
    ) -> CaptureSession {
        CaptureSession {
            snapshot_before: Snapshot::take(registry, program_files),
            snapshot_after: None,
            diff: None,
            installation_dir: None,
            feed_builder,
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_vec_pretty(self).context("serializing capture session")?;
        fs::write(path, json)
            .with_context(|| format!("writing capture session to {}", path.display()))?;
        Ok(())
    }

    pub fn load(path: &Path) -> Result<CaptureSession> {
        let json = fs::read_to_string(path)
            .with_context(|| format!("reading capture session from {}", path.display()))?;
        serde_json::from_str(&json).context("capture session file is corrupt")
    }

    pub fn installation_dir(&self) -> Option<&str> {
        self.installation_dir.as_deref()
    }

    /// Takes the after-install snapshot, diffs, and determines the
    /// installation directory (from `override_dir`, or by looking for a new
    /// Program Files subdirectory). Then scans for entry-point candidates.
    pub fn diff(
        &mut self,
        registry: &dyn RegistryView,
        program_files: &[&Path],
        override_dir: Option<&Path>,
    ) -> Result<()> {
        let after = Snapshot::take(registry, program_files);
        let diff = SnapshotDiff::new(&self.snapshot_before, &after);

        let installation_dir = match override_dir {
            Some(dir) => dir.to_path_buf(),
            None => match diff.program_files_dirs.as_slice() {
                [] => bail!("no new installation directory found; pass one explicitly"),
                [single] => locate_program_dir(program_files, single)?,
                [first, rest @ ..] => {
                    warn!(
                        "Multiple new Program Files directories ({} more); using {}",
                        rest.len(),
                        first
                    );
                    locate_program_dir(program_files, first)?
                }
            },
        };

        if self.feed_builder.name.is_empty() {
            if let Some(name) = installation_dir.file_name() {
                self.feed_builder.name = name.to_string_lossy().into_owned();
            }
        }
        self.installation_dir = Some(installation_dir.to_string_lossy().into_owned());
        self.snapshot_after = Some(after);
        self.diff = Some(diff);

        self.detect_candidates(&installation_dir)?;
        Ok(())
    }

    /// Scans the installation directory for executables and picks a main
    /// candidate: an executable named like the directory, else the one
    /// closest to the root.
    fn detect_candidates(&mut self, installation_dir: &Path) -> Result<()> {
        let mut candidates = Vec::new();
        for entry in WalkDir::new(installation_dir).min_depth(1) {
            let entry = entry?;
            if !entry.file_type().is_file() {
                continue;
            }
            let is_exe = entry
                .path()
                .extension()
                .is_some_and(|e| e.eq_ignore_ascii_case("exe"));
            if !is_exe {
                continue;
            }
            let relative = entry
                .path()
                .strip_prefix(installation_dir)
                .context("walk escaped the installation directory")?
                .components()
                .map(|c| c.as_os_str().to_string_lossy().into_owned())
                .collect::<Vec<_>>()
                .join("\\");
            candidates.push(relative);
        }
        candidates.sort_by_key(|c| (c.matches('\\').count(), c.to_lowercase()));

        let dir_name = installation_dir
            .file_name()
            .map(|n| n.to_string_lossy().to_lowercase())
            .unwrap_or_default();
        let main = candidates
            .iter()
            .find(|c| {
                c.rsplit('\\')
                    .next()
                    .and_then(|f| f.strip_suffix(".exe").or_else(|| f.strip_suffix(".EXE")))
                    .map(|stem| stem.to_lowercase() == dir_name)
                    .unwrap_or(false)
            })
            .or_else(|| candidates.first())
            .cloned();

        self.feed_builder.entry_points = candidates;
        self.feed_builder.main_exe = main;
        self.feed_builder.generate_commands();
        Ok(())
    }

    /// Runs the collectors over the diff and builds the feed. Collector
    /// order: file types, context menus, AutoPlay, default programs,
    /// application registration. Protocol associations are collected
    /// directly only when no application registration covers them.
    pub fn finish(&mut self, registry: &dyn RegistryView) -> Result<Feed> {
        let diff = self
            .diff
            .as_ref()
            .context("no diff yet; run the diff step first")?;
        let installation_dir = self
            .installation_dir
            .clone()
            .context("installation directory unknown")?;
        let mapper = CommandMapper::new(&installation_dir, &self.feed_builder.commands);

        let mut capabilities = Vec::new();
        capabilities.extend(file_types::collect(registry, diff, &mapper));
        capabilities.extend(context_menu::collect(registry, diff, &mapper));
        capabilities.extend(autoplay::collect(registry, diff, &mapper));
        capabilities.extend(default_program::collect(
            registry,
            diff,
            &mapper,
            &installation_dir,
        ));
        match app_registration::collect(registry, diff, &mapper) {
            Some(registration) => capabilities.extend(registration),
            None => {
                capabilities.extend(app_registration::collect_protocols(registry, diff, &mapper))
            }
        }

        // A progID can surface through several collectors; keep the first.
        let mut seen = HashSet::new();
        capabilities.retain(|c: &Capability| seen.insert((discriminant(c), c.id().to_string())));

        self.feed_builder.capabilities = capabilities;
        Ok(self.feed_builder.build())
    }

    /// Digests the installation directory, packs it into a zip archive and
    /// attaches the archive as the implementation's retrieval method.
    pub fn collect_files(&mut self, archive_path: &Path, archive_url: &str) -> Result<()> {
        let installation_dir = PathBuf::from(
            self.installation_dir
                .clone()
                .context("installation directory unknown")?,
        );

        let digest = manifest::digest_directory(&installation_dir)
            .context("building manifest digest over the installation")?;
        self.feed_builder.implementation.id = digest
            .best()
            .context("manifest digest has no algorithms")?;
        self.feed_builder.implementation.digest = digest;

        build_archive(&installation_dir, archive_path)
            .with_context(|| format!("packing {}", installation_dir.display()))?;
        let size = fs::metadata(archive_path)?.len();

        self.feed_builder.implementation.retrieval_methods = vec![RetrievalMethod::Archive {
            href: archive_url.to_string(),
            mime_type: guess_mime_type(archive_url).map(str::to_string),
            size,
            extract: None,
        }];
        Ok(())
    }
}

fn locate_program_dir(program_files: &[&Path], name: &str) -> Result<PathBuf> {
    for root in program_files {
        let candidate = root.join(name);
        if candidate.is_dir() {
            return Ok(candidate);
        }
    }
    bail!("new directory {} not found under any Program Files root", name)
}

fn build_archive(source: &Path, archive_path: &Path) -> Result<()> {
    let file = File::create(archive_path)?;
    let mut writer = ZipWriter::new(file);
    let options = SimpleFileOptions::default();

    for entry in WalkDir::new(source).min_depth(1).sort_by_file_name() {
        let entry = entry?;
        let relative = entry
            .path()
            .strip_prefix(source)?
            .components()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .collect::<Vec<_>>()
            .join("/");
        if entry.file_type().is_dir() {
            writer.add_directory(relative, options)?;
        } else if entry.file_type().is_file() {
            writer.start_file(relative, options)?;
            let mut contents = Vec::new();
            File::open(entry.path())?.read_to_end(&mut contents)?;
            writer.write_all(&contents)?;
        }
    }
    writer.finish()?;
    Ok(())
}

/// MIME type from the archive file extension.
fn guess_mime_type(name: &str) -> Option<&'static str> {
    let lower = name.to_lowercase();
    if lower.ends_with(".zip") {
        Some("application/zip")
    } else if lower.ends_with(".tar.gz") || lower.ends_with(".tgz") {
        Some("application/x-compressed-tar")
    } else if lower.ends_with(".tar.bz2") {
        Some("application/x-bzip-compressed-tar")
    } else if lower.ends_with(".tar.xz") {
        Some("application/x-xz-compressed-tar")
    } else if lower.ends_with(".exe") {
        Some("application/x-msdownload")
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{Hive, MemoryRegistry};

    /// Full pipeline: snapshot, "install" (registry writes + files), diff,
    /// finish, collect files.
    #[test]
    fn capture_round_trip() {
        let program_files = tempfile::tempdir().unwrap();
        let mut registry = MemoryRegistry::new();

        let mut session = CaptureSession::start(
            &registry,
            &[program_files.path()],
            FeedBuilder::new(""),
        );

        // Simulated installer: drops files and registers a file type.
        let app_dir = program_files.path().join("MyApp");
        fs::create_dir(&app_dir).unwrap();
        fs::write(app_dir.join("MyApp.exe"), b"main binary").unwrap();
        fs::write(app_dir.join("helper.exe"), b"helper binary").unwrap();
        fs::write(app_dir.join("readme.txt"), b"docs").unwrap();

        let exe = format!("{}\\MyApp.exe", app_dir.display());
        registry.set(Hive::ClassesRoot, ".myd", "", "MyApp.Doc");
        registry.set(Hive::ClassesRoot, "MyApp.Doc", "", "MyApp Document");
        registry.set(
            Hive::ClassesRoot,
            r"MyApp.Doc\shell\open\command",
            "",
            &format!("\"{}\" \"%1\"", exe),
        );

        session
            .diff(&registry, &[program_files.path()], None)
            .unwrap();
        assert_eq!(
            session.installation_dir().unwrap(),
            app_dir.to_string_lossy()
        );
        assert_eq!(session.feed_builder.main_exe.as_deref(), Some("MyApp.exe"));
        assert_eq!(session.feed_builder.entry_points.len(), 2);

        let feed = session.finish(&registry).unwrap();
        assert_eq!(feed.name, "MyApp");
        assert_eq!(feed.implementations.len(), 1);
        let capabilities = &feed.capabilities[0].capabilities;
        assert!(matches!(
            &capabilities[0],
            Capability::FileType(f) if f.id == "MyApp.Doc" && f.extensions == vec![".myd"]
        ));

        // Session survives a save/load cycle between steps.
        let state = tempfile::NamedTempFile::new().unwrap();
        session.save(state.path()).unwrap();
        let mut reloaded = CaptureSession::load(state.path()).unwrap();

        let archive = program_files.path().join("myapp.zip");
        reloaded
            .collect_files(&archive, "https://example.com/myapp.zip")
            .unwrap();
        assert!(archive.is_file());
        let implementation = &reloaded.feed_builder.implementation;
        assert!(implementation.id.starts_with("sha256new_"));
        match &implementation.retrieval_methods[0] {
            RetrievalMethod::Archive {
                href,
                mime_type,
                size,
                ..
            } => {
                assert_eq!(href, "https://example.com/myapp.zip");
                assert_eq!(mime_type.as_deref(), Some("application/zip"));
                assert!(*size > 0);
            }
        }
    }

    #[test]
    fn diff_without_new_directory_needs_an_override() {
        let program_files = tempfile::tempdir().unwrap();
        let registry = MemoryRegistry::new();
        let mut session =
            CaptureSession::start(&registry, &[program_files.path()], FeedBuilder::new("App"));
        assert!(session
            .diff(&registry, &[program_files.path()], None)
            .is_err());

        let custom = program_files.path().join("Custom");
        fs::create_dir(&custom).unwrap();
        fs::write(custom.join("Custom.exe"), b"x").unwrap();
        session
            .diff(&registry, &[program_files.path()], Some(&custom))
            .unwrap();
        assert_eq!(session.feed_builder.main_exe.as_deref(), Some("Custom.exe"));
    }

    #[test]
    fn mime_guessing() {
        assert_eq!(guess_mime_type("app.zip"), Some("application/zip"));
        assert_eq!(
            guess_mime_type("app.tar.gz"),
            Some("application/x-compressed-tar")
        );
        assert_eq!(guess_mime_type("app.unknown"), None);
    }
}
