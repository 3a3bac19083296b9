//! Application capture: diff two snapshots of a Windows system around an
//! unmodified installer run and reconstruct a feed for whatever it put on
//! the machine.
//!
//! All registry access goes through [`registry::RegistryView`], so the diff
//! and collector logic runs (and is tested) on any platform; only the live
//! registry backend is Windows-specific.
//!
//! SPDX-License-Identifier: GPL-3.0-or-later

#[macro_use]
extern crate log;

#[macro_use]
extern crate serde_derive;

pub mod builder;
pub mod collectors;
pub mod command_mapper;
pub mod manifest;
pub mod registry;
pub mod session;
pub mod snapshot;

pub use builder::FeedBuilder;
pub use command_mapper::CommandMapper;
pub use registry::{Hive, MemoryRegistry, RegistryView};
pub use session::CaptureSession;
pub use snapshot::{Snapshot, SnapshotDiff};
