//! OpenPGP trust layer: signature verification, key management, the on-disk
//! trust database and the signed-feed envelope format.
//!
//! SPDX-License-Identifier: GPL-3.0-or-later

#[macro_use]
extern crate serde_derive;

pub mod feed_signature;
pub mod openpgp;
pub mod trust_db;

pub use openpgp::{
    Fingerprint, KeyId, OpenPgp, PgpError, SecretKey, SequoiaOpenPgp, Signature, ValidSignature,
};
pub use trust_db::TrustDb;
