//! Hatch command-line interface.
//!
//! SPDX-License-Identifier: GPL-3.0-or-later

#[macro_use]
extern crate serde_derive;

use anyhow::{bail, Context, Result};
use docopt::Docopt;
use hatch_feed_model::Requirements;
use hatch_solver::disk::{DiskFeedManager, DiskPreferencesStore, DirStore, NoPackageManager};
use hatch_solver::{
    selections_xml, BacktrackingSolver, CancellationFlag, FeedManager, NetworkUse,
    RefreshingSolver, Solver, SolverConfig,
};
use hatch_trust::TrustDb;
use std::process::exit;
use std::sync::Arc;

const USAGE: &str = "
Hatch: run and manage applications described by signed feeds.

Usage:
  hatch select URI [--command NAME] [--refresh] [--offline] [--restrict RESTRICT]...
  hatch trust list
  hatch trust add FINGERPRINT DOMAIN
  hatch trust remove FINGERPRINT [DOMAIN]
  hatch capture start SESSION
  hatch capture diff SESSION [--install-dir DIR]
  hatch capture finish SESSION FEED [--archive PATH] [--archive-url URL]
  hatch (--help | -h)
  hatch (--version | -v)

Options:
  --command NAME        Command to select instead of the default (run).
  --refresh             Re-fetch feeds instead of using cached copies.
  --offline             Use only cached implementations.
  --restrict RESTRICT   Extra version restriction as URI=RANGE (repeatable).
  --install-dir DIR     Installation directory, if auto-detection fails.
  --archive PATH        Pack the installation into this zip archive.
  --archive-url URL     Where the archive will be published.
  --version, -v         Show tool version.
  --help, -h            Show this screen.
";

#[derive(Debug, Deserialize)]
struct Args {
    cmd_select: bool,
    cmd_trust: bool,
    cmd_list: bool,
    cmd_add: bool,
    cmd_remove: bool,
    cmd_capture: bool,
    cmd_start: bool,
    cmd_diff: bool,
    cmd_finish: bool,
    arg_URI: Option<String>,
    arg_FINGERPRINT: Option<String>,
    arg_DOMAIN: Option<String>,
    arg_SESSION: Option<String>,
    arg_FEED: Option<String>,
    flag_command: Option<String>,
    flag_refresh: bool,
    flag_offline: bool,
    flag_restrict: Vec<String>,
    flag_install_dir: Option<String>,
    flag_archive: Option<String>,
    flag_archive_url: Option<String>,
}

fn main() {
    env_logger::init();

    let version = format!(
        "{}, version: {}",
        env!("CARGO_PKG_NAME"),
        env!("CARGO_PKG_VERSION")
    );

    let args: Args = Docopt::new(USAGE)
        .map(|d| d.help(true))
        .map(|d| d.version(Some(version)))
        .and_then(|d| d.deserialize())
        .unwrap_or_else(|e| e.exit());

    let result = if args.cmd_select {
        run_select(&args)
    } else if args.cmd_trust {
        run_trust(&args)
    } else if args.cmd_capture {
        run_capture(&args)
    } else {
        Ok(())
    };

    if let Err(e) = result {
        eprintln!("{:#}", e);
        exit(1);
    }
}

fn run_select(args: &Args) -> Result<()> {
    let uri = args.arg_URI.clone().context("missing interface URI")?;
    let mut requirements = Requirements::new(uri);
    requirements.command = args.flag_command.clone();
    for restrict in &args.flag_restrict {
        let (interface, range) = restrict
            .split_once('=')
            .with_context(|| format!("--restrict {:?} is not URI=RANGE", restrict))?;
        requirements.extra_restrictions.insert(
            interface.to_string(),
            range
                .parse()
                .with_context(|| format!("invalid version range {:?}", range))?,
        );
    }

    let config = SolverConfig {
        network_use: if args.flag_offline {
            NetworkUse::Offline
        } else {
            NetworkUse::Full
        },
        distribution: None,
    };

    let feeds: Arc<dyn FeedManager> = Arc::new(DiskFeedManager::new());
    let solver = BacktrackingSolver::new(
        feeds.clone(),
        Arc::new(NoPackageManager),
        Arc::new(DirStore::new()),
        Arc::new(DiskPreferencesStore::new()),
        config,
        CancellationFlag::new(),
    );
    let solver = RefreshingSolver::new(solver, feeds);

    let selections = solver.solve(&requirements, args.flag_refresh)?;
    println!("{}", selections_xml::serialize(&selections)?);
    Ok(())
}

fn run_trust(args: &Args) -> Result<()> {
    let mut db = TrustDb::load();

    if args.cmd_list {
        for (fingerprint, domains) in db.entries() {
            for domain in domains {
                println!("{}  {}", fingerprint, domain);
            }
        }
        return Ok(());
    }

    let fingerprint = args
        .arg_FINGERPRINT
        .clone()
        .context("missing key fingerprint")?;
    if args.cmd_add {
        let domain = args.arg_DOMAIN.clone().context("missing domain")?;
        db.trust(&fingerprint, &domain);
        db.save().context("saving trust database")?;
        println!("Trusted {} for {}", fingerprint, domain);
    } else if args.cmd_remove {
        match &args.arg_DOMAIN {
            Some(domain) => db.untrust(&fingerprint, domain),
            None => db.untrust_key(&fingerprint),
        }
        db.save().context("saving trust database")?;
        println!("Updated trust for {}", fingerprint);
    }
    Ok(())
}

#[cfg(not(windows))]
fn run_capture(_args: &Args) -> Result<()> {
    bail!("application capture inspects the Windows registry and only works on Windows");
}

#[cfg(windows)]
fn run_capture(args: &Args) -> Result<()> {
    use hatch_capture::registry::live::LiveRegistry;
    use hatch_capture::{CaptureSession, FeedBuilder};
    use std::path::{Path, PathBuf};

    let session_path = PathBuf::from(
        args.arg_SESSION
            .clone()
            .context("missing session file path")?,
    );

    let roots: Vec<PathBuf> = ["ProgramFiles", "ProgramFiles(x86)"]
        .iter()
        .filter_map(|name| std::env::var_os(name))
        .map(PathBuf::from)
        .collect();
    if roots.is_empty() {
        bail!("no Program Files directory found in the environment");
    }
    let root_refs: Vec<&Path> = roots.iter().map(PathBuf::as_path).collect();
    let registry = LiveRegistry;

    if args.cmd_start {
        let session = CaptureSession::start(&registry, &root_refs, FeedBuilder::new(""));
        session.save(&session_path)?;
        println!(
            "Snapshot taken. Run the installer, then: hatch capture diff {}",
            session_path.display()
        );
    } else if args.cmd_diff {
        let mut session = CaptureSession::load(&session_path)?;
        let override_dir = args.flag_install_dir.as_ref().map(PathBuf::from);
        session.diff(&registry, &root_refs, override_dir.as_deref())?;
        session.save(&session_path)?;
        println!(
            "Installation directory: {}",
            session.installation_dir().unwrap_or("(unknown)")
        );
    } else if args.cmd_finish {
        let mut session = CaptureSession::load(&session_path)?;
        if let Some(archive) = &args.flag_archive {
            let url = args
                .flag_archive_url
                .clone()
                .unwrap_or_else(|| archive.clone());
            session.collect_files(Path::new(archive), &url)?;
        }
        let feed = session.finish(&registry)?;
        let feed_path = args.arg_FEED.clone().context("missing feed output path")?;
        let json = serde_json::to_vec_pretty(&feed)?;
        std::fs::write(&feed_path, json)
            .with_context(|| format!("writing captured feed to {}", feed_path))?;
        session.save(&session_path)?;
        println!("Captured feed written to {}", feed_path);
    }
    Ok(())
}
