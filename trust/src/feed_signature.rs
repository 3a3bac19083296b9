//! The signed-feed envelope: a feed file is UTF-8 XML followed by a Base64
//! signature block between fixed marker lines. The signature covers every
//! byte strictly before the start marker; signing never parses the XML.
//!
//! SPDX-License-Identifier: GPL-3.0-or-later

use crate::openpgp::{OpenPgp, PgpError, SecretKey, Signature, ValidSignature};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;

const BLOCK_START: &[u8] = b"<!-- Base64 Signature\n";
const BLOCK_END: &[u8] = b"-->\n";

/// Wrap width for the Base64 body, matching common armor output.
const LINE_WIDTH: usize = 64;

// The marker must start a line; the payload before it keeps its terminating
// newline. Marker text embedded mid-line is ordinary payload.
fn find_block_start(data: &[u8]) -> Option<usize> {
    let mut offset = 0;
    while let Some(pos) = data[offset..]
        .windows(BLOCK_START.len())
        .position(|window| window == BLOCK_START)
    {
        let absolute = offset + pos;
        if absolute == 0 || data[absolute - 1] == b'\n' {
            return Some(absolute);
        }
        offset = absolute + 1;
    }
    None
}

/// Splits a feed file into the signed payload and the decoded signature, if
/// a signature block is present.
pub fn split(data: &[u8]) -> Result<(&[u8], Option<Vec<u8>>), PgpError> {
    let Some(start) = find_block_start(data) else {
        return Ok((data, None));
    };

    let payload = &data[..start];
    let block = &data[start + BLOCK_START.len()..];

    if !data.ends_with(BLOCK_END) {
        return Err(PgpError::InvalidSignatureBlock(
            "missing end marker".to_string(),
        ));
    }
    let body = &block[..block.len() - BLOCK_END.len()];

    let mut base64_text = String::with_capacity(body.len());
    for line in body.split(|&b| b == b'\n') {
        let line = std::str::from_utf8(line)
            .map_err(|_| PgpError::InvalidSignatureBlock("non-UTF-8 content".to_string()))?
            .trim();
        base64_text.push_str(line);
    }
    let signature = BASE64
        .decode(base64_text.as_bytes())
        .map_err(|e| PgpError::InvalidSignatureBlock(e.to_string()))?;

    Ok((payload, Some(signature)))
}

/// Verifies the signature block of a feed file. Fails if there is no block
/// or it is malformed; an untrusted or unknown key is *not* an error and
/// shows up as a non-`Valid` entry in the result.
pub fn verify(pgp: &dyn OpenPgp, data: &[u8]) -> Result<Vec<Signature>, PgpError> {
    let (payload, signature) = split(data)?;
    let signature = signature.ok_or(PgpError::MissingSignatureBlock)?;
    pgp.verify(payload, &signature)
}

/// The first valid signature, which is the one key-lookup policy consults.
pub fn first_valid(signatures: &[Signature]) -> Option<&ValidSignature> {
    signatures.iter().find_map(|s| match s {
        Signature::Valid(valid) => Some(valid),
        _ => None,
    })
}

/// Signs feed data, replacing any existing signature block. The payload must
/// end with a newline so the marker starts its own line.
pub fn sign(
    pgp: &dyn OpenPgp,
    data: &[u8],
    secret_key: &SecretKey,
    passphrase: Option<&str>,
) -> Result<Vec<u8>, PgpError> {
    let (payload, _) = split(data)?;
    if !payload.ends_with(b"\n") {
        return Err(PgpError::MissingTrailingNewline);
    }

    let signature = pgp.sign(payload, secret_key, passphrase)?;
    let encoded = BASE64.encode(&signature);

    let mut out = Vec::with_capacity(payload.len() + encoded.len() + 64);
    out.extend_from_slice(payload);
    out.extend_from_slice(BLOCK_START);
    for chunk in encoded.as_bytes().chunks(LINE_WIDTH) {
        out.extend_from_slice(chunk);
        out.push(b'\n');
    }
    out.extend_from_slice(BLOCK_END);
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::openpgp::{Fingerprint, KeyId};
    use std::str::FromStr;

    /// Fake backend: "signs" by reversing the payload, verifies by checking
    /// the reversal. Enough to exercise the envelope logic without key
    /// material.
    struct ReversingPgp;

    impl OpenPgp for ReversingPgp {
        fn verify(&self, data: &[u8], signature: &[u8]) -> Result<Vec<Signature>, PgpError> {
            let mut expected: Vec<u8> = data.to_vec();
            expected.reverse();
            if signature == expected.as_slice() {
                Ok(vec![Signature::Valid(ValidSignature {
                    key_id: KeyId::from_str("0123456789ABCDEF").unwrap(),
                    fingerprint: Fingerprint::from_str(
                        "0123456789ABCDEF0123456789ABCDEF01234567",
                    )
                    .unwrap(),
                    timestamp: None,
                })])
            } else {
                Ok(vec![Signature::Bad { key_id: None }])
            }
        }

        fn sign(
            &self,
            data: &[u8],
            _secret_key: &SecretKey,
            _passphrase: Option<&str>,
        ) -> Result<Vec<u8>, PgpError> {
            let mut out = data.to_vec();
            out.reverse();
            Ok(out)
        }

        fn import_key(&self, _data: &[u8]) -> Result<(), PgpError> {
            Ok(())
        }

        fn export_key(&self, key_id: &KeyId) -> Result<String, PgpError> {
            Err(PgpError::KeyNotFound(key_id.clone()))
        }

        fn list_secret_keys(&self) -> Result<Vec<SecretKey>, PgpError> {
            Ok(Vec::new())
        }
    }

    fn secret() -> SecretKey {
        SecretKey {
            key_id: KeyId::from_str("0123456789ABCDEF").unwrap(),
            fingerprint: Fingerprint::from_str("0123456789ABCDEF0123456789ABCDEF01234567")
                .unwrap(),
            user_id: "Test".into(),
        }
    }

    #[test]
    fn sign_verify_round_trip() {
        let feed = b"<?xml version='1.0'?>\n<interface/>\n";
        let signed = sign(&ReversingPgp, feed, &secret(), None).unwrap();

        // Envelope shape: payload, start marker, base64 body, end marker.
        assert!(signed.starts_with(feed));
        assert!(signed.ends_with(b"-->\n"));

        let results = verify(&ReversingPgp, &signed).unwrap();
        assert!(matches!(results.as_slice(), [Signature::Valid(_)]));
        assert!(first_valid(&results).is_some());
    }

    #[test]
    fn signature_covers_bytes_before_marker_only() {
        let feed = b"<interface/>\n";
        let signed = sign(&ReversingPgp, feed, &secret(), None).unwrap();
        let (payload, sig) = split(&signed).unwrap();
        assert_eq!(payload, feed);
        let mut reversed = sig.unwrap();
        reversed.reverse();
        assert_eq!(reversed, feed);
    }

    #[test]
    fn re_signing_replaces_the_existing_block() {
        let feed = b"<interface/>\n";
        let signed_once = sign(&ReversingPgp, feed, &secret(), None).unwrap();
        let signed_twice = sign(&ReversingPgp, &signed_once, &secret(), None).unwrap();
        assert_eq!(signed_once, signed_twice);
    }

    #[test]
    fn payload_without_trailing_newline_is_rejected() {
        assert!(matches!(
            sign(&ReversingPgp, b"<interface/>", &secret(), None),
            Err(PgpError::MissingTrailingNewline)
        ));
    }

    #[test]
    fn missing_end_marker_is_malformed() {
        let mut bytes = b"<interface/>\n<!-- Base64 Signature\nAAAA\n".to_vec();
        bytes.extend_from_slice(b"no end");
        assert!(matches!(
            split(&bytes),
            Err(PgpError::InvalidSignatureBlock(_))
        ));
    }

    #[test]
    fn unsigned_feed_has_no_block() {
        let (payload, sig) = split(b"<interface/>\n").unwrap();
        assert_eq!(payload, b"<interface/>\n");
        assert!(sig.is_none());
        assert!(matches!(
            verify(&ReversingPgp, b"<interface/>\n"),
            Err(PgpError::MissingSignatureBlock)
        ));
    }

    #[test]
    fn marker_must_start_a_line() {
        // The marker text embedded mid-line is payload, not a block.
        let data = b"text <!-- Base64 Signature\nnot a real block\n";
        assert!(find_block_start(data).is_none());
    }
}
