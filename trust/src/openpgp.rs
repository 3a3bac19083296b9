//! OpenPGP operations backed by Sequoia.
//!
//! Verification keys imported from feeds live in their own keyring under the
//! cache root so they never pollute the user's normal OpenPGP home; signing
//! keys are read from the usual home (`GNUPGHOME` overrides it) and are never
//! written by this component.
//!
//! SPDX-License-Identifier: GPL-3.0-or-later

use chrono::{DateTime, Utc};
use openpgp::cert::{Cert, CertParser};
use openpgp::crypto::Password;
use openpgp::parse::stream::{
    DetachedVerifierBuilder, GoodChecksum, MessageLayer, MessageStructure, VerificationError,
    VerificationHelper,
};
use openpgp::parse::Parse;
use openpgp::policy::StandardPolicy;
use openpgp::serialize::Serialize as _;
use openpgp::KeyHandle;
use sequoia_openpgp as openpgp;
use std::fmt;
use std::io::Write as _;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Mutex;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PgpError {
    #[error("malformed signature data: {0}")]
    MalformedSignature(String),
    #[error("key {0} not found")]
    KeyNotFound(KeyId),
    #[error("wrong passphrase for key {0}")]
    WrongPassphrase(KeyId),
    #[error("feed has no signature block")]
    MissingSignatureBlock,
    #[error("invalid signature block: {0}")]
    InvalidSignatureBlock(String),
    #[error("signed feed data must end with a newline")]
    MissingTrailingNewline,
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Backend(#[from] anyhow::Error),
}

/// A 64-bit OpenPGP key ID, kept as 16 upper-case hex digits.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct KeyId(String);

impl KeyId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for KeyId {
    type Err = PgpError;

    fn from_str(s: &str) -> Result<KeyId, PgpError> {
        let normalized: String = s
            .trim()
            .trim_start_matches("0x")
            .chars()
            .filter(|c| !c.is_whitespace())
            .map(|c| c.to_ascii_uppercase())
            .collect();
        if normalized.len() != 16 || !normalized.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(PgpError::InvalidSignatureBlock(format!(
                "not a key ID: {:?}",
                s
            )));
        }
        Ok(KeyId(normalized))
    }
}

impl fmt::Display for KeyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A full key fingerprint, kept as upper-case hex without spaces.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Fingerprint(String);

impl Fingerprint {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The key ID is the low 64 bits, i.e. the last 16 hex digits.
    pub fn key_id(&self) -> KeyId {
        let hex = &self.0;
        KeyId(hex[hex.len().saturating_sub(16)..].to_string())
    }
}

impl FromStr for Fingerprint {
    type Err = PgpError;

    fn from_str(s: &str) -> Result<Fingerprint, PgpError> {
        let normalized: String = s
            .trim()
            .chars()
            .filter(|c| !c.is_whitespace())
            .map(|c| c.to_ascii_uppercase())
            .collect();
        // V4 fingerprints are 40 hex digits, V6 are 64.
        if !(normalized.len() == 40 || normalized.len() == 64)
            || !normalized.bytes().all(|b| b.is_ascii_hexdigit())
        {
            return Err(PgpError::InvalidSignatureBlock(format!(
                "not a fingerprint: {:?}",
                s
            )));
        }
        Ok(Fingerprint(normalized))
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One signature found on a data blob. Only `Valid` proves anything; the
/// other variants exist so callers can report *why* verification failed and
/// which key to fetch.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Signature {
    Valid(ValidSignature),
    Bad { key_id: Option<KeyId> },
    Error { key_id: Option<KeyId> },
    MissingKey { key_id: Option<KeyId> },
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ValidSignature {
    pub key_id: KeyId,
    pub fingerprint: Fingerprint,
    pub timestamp: Option<DateTime<Utc>>,
}

/// A secret key available for signing feeds.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SecretKey {
    pub key_id: KeyId,
    pub fingerprint: Fingerprint,
    pub user_id: String,
}

/// The OpenPGP operations the rest of the system needs. Tests substitute an
/// in-memory fake.
pub trait OpenPgp {
    /// Checks a detached signature, reporting one result per signature
    /// packet. Fails only when `signature` is not signature data at all.
    fn verify(&self, data: &[u8], signature: &[u8]) -> Result<Vec<Signature>, PgpError>;

    /// Creates a detached binary signature with the given secret key.
    fn sign(
        &self,
        data: &[u8],
        secret_key: &SecretKey,
        passphrase: Option<&str>,
    ) -> Result<Vec<u8>, PgpError>;

    /// Adds public keys to the verification keyring. Importing an
    /// already-known key is not an error.
    fn import_key(&self, data: &[u8]) -> Result<(), PgpError>;

    /// Exports a public key as ASCII armor, LF-terminated.
    fn export_key(&self, key_id: &KeyId) -> Result<String, PgpError>;

    fn list_secret_keys(&self) -> Result<Vec<SecretKey>, PgpError>;
}

/// Sequoia-backed implementation with two keyring files: `pubring.gpg` for
/// verification keys and a read-only `secring.gpg` for signing keys.
pub struct SequoiaOpenPgp {
    public_ring: PathBuf,
    secret_ring: PathBuf,
    /// Parsed public ring; per-instance only, so a concurrent process
    /// updating the ring is not seen until a new instance is created.
    /// Acceptable: public keys are easily re-fetched.
    public_certs: Mutex<Option<Vec<Cert>>>,
}

impl SequoiaOpenPgp {
    /// Uses the standard locations: cache root for the public ring, the
    /// OpenPGP home for the secret ring.
    pub fn new() -> SequoiaOpenPgp {
        SequoiaOpenPgp::with_paths(
            hatch_locations::public_keyring_path(),
            hatch_locations::gnupg_home().join("secring.gpg"),
        )
    }

    pub fn with_paths(public_ring: PathBuf, secret_ring: PathBuf) -> SequoiaOpenPgp {
        SequoiaOpenPgp {
            public_ring,
            secret_ring,
            public_certs: Mutex::new(None),
        }
    }

    fn load_ring(path: &PathBuf) -> Result<Vec<Cert>, PgpError> {
        if !path.exists() {
            return Ok(Vec::new());
        }
        let mut certs = Vec::new();
        let mut parser = CertParser::from_file(path)?;
        while let Some(cert) = parser.next().transpose()? {
            certs.push(cert);
        }
        Ok(certs)
    }

    fn public_certs(&self) -> Result<Vec<Cert>, PgpError> {
        let mut cache = self.public_certs.lock().expect("keyring cache poisoned");
        if cache.is_none() {
            *cache = Some(Self::load_ring(&self.public_ring)?);
        }
        Ok(cache.clone().unwrap_or_default())
    }

    fn write_public_ring(&self, certs: &[Cert]) -> Result<(), PgpError> {
        let mut out = Vec::new();
        for cert in certs {
            cert.serialize(&mut out)?;
        }
        hatch_locations::atomic_write(&self.public_ring, &out)?;
        *self.public_certs.lock().expect("keyring cache poisoned") = Some(certs.to_vec());
        Ok(())
    }
}

impl Default for SequoiaOpenPgp {
    fn default() -> SequoiaOpenPgp {
        SequoiaOpenPgp::new()
    }
}

fn key_id_of(handle: &KeyHandle) -> KeyId {
    match handle {
        KeyHandle::Fingerprint(fpr) => KeyId(
            fpr.to_hex()[fpr.to_hex().len().saturating_sub(16)..].to_string(),
        ),
        KeyHandle::KeyID(id) => KeyId(id.to_hex()),
    }
}

fn issuer_of(sig: &openpgp::packet::Signature) -> Option<KeyId> {
    sig.get_issuers().first().map(key_id_of)
}

struct CollectingHelper {
    certs: Vec<Cert>,
    results: Vec<Signature>,
}

impl VerificationHelper for CollectingHelper {
    fn get_certs(&mut self, _ids: &[KeyHandle]) -> openpgp::Result<Vec<Cert>> {
        Ok(self.certs.clone())
    }

    // Record every signature outcome instead of failing fast; trust policy
    // is the caller's business, not the verifier's.
    fn check(&mut self, structure: MessageStructure) -> openpgp::Result<()> {
        for layer in structure.iter() {
            if let MessageLayer::SignatureGroup { results } = layer {
                for result in results {
                    self.results.push(match result {
                        Ok(GoodChecksum { sig, ka, .. }) => {
                            let fingerprint = ka.key().fingerprint().to_hex();
                            Signature::Valid(ValidSignature {
                                key_id: Fingerprint(fingerprint.clone()).key_id(),
                                fingerprint: Fingerprint(fingerprint),
                                timestamp: sig
                                    .signature_creation_time()
                                    .map(DateTime::<Utc>::from),
                            })
                        }
                        Err(VerificationError::MissingKey { sig }) => Signature::MissingKey {
                            key_id: issuer_of(sig),
                        },
                        Err(VerificationError::BadSignature { sig, .. }) => Signature::Bad {
                            key_id: issuer_of(sig),
                        },
                        Err(VerificationError::MalformedSignature { sig, .. })
                        | Err(VerificationError::UnboundKey { sig, .. })
                        | Err(VerificationError::BadKey { sig, .. }) => Signature::Error {
                            key_id: issuer_of(sig),
                        },
                        Err(_) => Signature::Error { key_id: None },
                    });
                }
            }
        }
        Ok(())
    }
}

impl OpenPgp for SequoiaOpenPgp {
    fn verify(&self, data: &[u8], signature: &[u8]) -> Result<Vec<Signature>, PgpError> {
        let policy = StandardPolicy::new();
        let helper = CollectingHelper {
            certs: self.public_certs()?,
            results: Vec::new(),
        };

        let mut verifier = DetachedVerifierBuilder::from_bytes(signature)
            .map_err(|e| PgpError::MalformedSignature(e.to_string()))?
            .with_policy(&policy, None, helper)
            .map_err(|e| PgpError::MalformedSignature(e.to_string()))?;
        verifier
            .verify_bytes(data)
            .map_err(|e| PgpError::MalformedSignature(e.to_string()))?;

        let helper = verifier.into_helper();
        if helper.results.is_empty() {
            return Err(PgpError::MalformedSignature(
                "no signature packets found".to_string(),
            ));
        }
        Ok(helper.results)
    }

    fn sign(
        &self,
        data: &[u8],
        secret_key: &SecretKey,
        passphrase: Option<&str>,
    ) -> Result<Vec<u8>, PgpError> {
        use openpgp::serialize::stream::{Message, Signer};

        let certs = Self::load_ring(&self.secret_ring)?;
        let cert = certs
            .iter()
            .find(|c| c.fingerprint().to_hex() == secret_key.fingerprint.as_str())
            .ok_or_else(|| PgpError::KeyNotFound(secret_key.key_id.clone()))?;

        let policy = StandardPolicy::new();
        let valid = cert.with_policy(&policy, None)?;
        let ka = valid
            .keys()
            .for_signing()
            .secret()
            .next()
            .ok_or_else(|| PgpError::KeyNotFound(secret_key.key_id.clone()))?;

        let key = ka.key().clone();
        let keypair = if key.has_unencrypted_secret() {
            key.into_keypair()?
        } else {
            let password = Password::from(
                passphrase.ok_or_else(|| PgpError::WrongPassphrase(secret_key.key_id.clone()))?,
            );
            key.decrypt_secret(&password)
                .map_err(|_| PgpError::WrongPassphrase(secret_key.key_id.clone()))?
                .into_keypair()?
        };

        let mut sink = Vec::new();
        {
            let message = Message::new(&mut sink);
            let mut signer = Signer::new(message, keypair)?.detached().build()?;
            signer.write_all(data).map_err(PgpError::Io)?;
            signer.finalize()?;
        }
        Ok(sink)
    }

    fn import_key(&self, data: &[u8]) -> Result<(), PgpError> {
        let mut incoming = Vec::new();
        let mut parser = CertParser::from_bytes(data)?;
        while let Some(cert) = parser.next().transpose()? {
            incoming.push(cert);
        }
        if incoming.is_empty() {
            return Err(PgpError::MalformedSignature(
                "no certificates in key data".to_string(),
            ));
        }

        let mut ring = self.public_certs()?;
        for new in incoming {
            match ring
                .iter_mut()
                .find(|c| c.fingerprint() == new.fingerprint())
            {
                // Re-importing merges, so a known ring is never an error.
                Some(existing) => {
                    *existing = existing.clone().merge_public(new)?;
                }
                None => ring.push(new),
            }
        }
        self.write_public_ring(&ring)
    }

    fn export_key(&self, key_id: &KeyId) -> Result<String, PgpError> {
        let certs = self.public_certs()?;
        let cert = certs
            .iter()
            .find(|c| Fingerprint(c.fingerprint().to_hex()).key_id() == *key_id)
            .ok_or_else(|| PgpError::KeyNotFound(key_id.clone()))?;

        let mut out = Vec::new();
        cert.armored().serialize(&mut out)?;
        let mut armored = String::from_utf8(out)
            .map_err(|e| PgpError::MalformedSignature(e.to_string()))?;
        if !armored.ends_with('\n') {
            armored.push('\n');
        }
        Ok(armored)
    }

    fn list_secret_keys(&self) -> Result<Vec<SecretKey>, PgpError> {
        let certs = Self::load_ring(&self.secret_ring)?;
        let mut keys = Vec::new();
        for cert in certs {
            let fingerprint = Fingerprint(cert.fingerprint().to_hex());
            let user_id = cert
                .userids()
                .next()
                .map(|u| String::from_utf8_lossy(u.userid().value()).into_owned())
                .unwrap_or_default();
            keys.push(SecretKey {
                key_id: fingerprint.key_id(),
                fingerprint,
                user_id,
            });
        }
        Ok(keys)
    }
}
