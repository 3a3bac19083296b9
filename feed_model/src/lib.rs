//! Data model for Hatch feeds: versions, architectures, manifest digests,
//! feeds and their implementations, solver requirements and selections.
//!
//! SPDX-License-Identifier: GPL-3.0-or-later

#[macro_use]
extern crate serde_derive;

pub mod arch;
pub mod capability;
pub mod dependency;
pub mod digest;
pub mod feed;
pub mod implementation;
pub mod preferences;
pub mod requirements;
pub mod selections;
pub mod stability;
pub mod version;
pub mod version_range;

pub use arch::{Architecture, Cpu, Os};
pub use digest::ManifestDigest;
pub use requirements::Requirements;
pub use selections::{ImplementationSelection, Selections};
pub use stability::{Importance, Stability};
pub use version::Version;
pub use version_range::VersionRange;
