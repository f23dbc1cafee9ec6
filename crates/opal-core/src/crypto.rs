//! Signature verification for downloaded feeds.
//!
//! A published feed is a [`SignedFeed`] envelope; each signature is
//! checked against its embedded ed25519 verifying key and reported with
//! the key's fingerprint (hex SHA-256 of the key bytes). Whether a valid
//! key is *trusted* is a separate question answered by the trust
//! database.

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use ed25519_dalek::{Signature, Verifier, VerifyingKey};
use sha2::{Digest, Sha256};
use thiserror::Error;

use opal_schema::SignedFeed;

/// Failures while checking a feed envelope's signatures.
#[derive(Error, Debug)]
pub enum SignatureError {
    /// The downloaded bytes are not a signed-feed envelope.
    #[error("Feed is not a signed document: {0}")]
    Malformed(#[from] serde_json::Error),

    /// The envelope carries no signatures at all.
    #[error("Feed carries no signatures")]
    Unsigned,
}

/// Outcome of verifying one signature from the envelope.
#[derive(Debug, Clone)]
pub struct SignatureCheck {
    /// Fingerprint of the signing key (hex SHA-256 of the key bytes).
    pub fingerprint: String,

    /// Whether the signature cryptographically verifies.
    pub valid: bool,
}

impl std::fmt::Display for SignatureCheck {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let status = if self.valid { "valid" } else { "INVALID" };
        write!(f, "{} ({status})", self.fingerprint)
    }
}

/// Fingerprint of a verifying key's raw bytes.
pub fn fingerprint(key_bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(key_bytes))
}

/// Parse a signed feed and verify every signature.
///
/// Returns the payload bytes (still untrusted) together with one check
/// per signature, in envelope order. Undecodable keys or signatures
/// produce an invalid check rather than an error, so the caller can show
/// the user exactly what the envelope claimed.
pub fn check_feed(data: &[u8]) -> Result<(Vec<u8>, Vec<SignatureCheck>), SignatureError> {
    let signed = SignedFeed::from_bytes(data)?;
    if signed.signatures.is_empty() {
        return Err(SignatureError::Unsigned);
    }

    let payload = signed.payload.into_bytes();
    let checks = signed
        .signatures
        .iter()
        .map(|sig| check_one(&payload, &sig.key, &sig.signature))
        .collect();

    Ok((payload, checks))
}

fn check_one(payload: &[u8], key_b64: &str, sig_b64: &str) -> SignatureCheck {
    let key_bytes = match BASE64.decode(key_b64) {
        Ok(b) => b,
        Err(_) => {
            return SignatureCheck {
                fingerprint: format!("<undecodable key {key_b64:.16}>"),
                valid: false,
            };
        }
    };
    let fingerprint = fingerprint(&key_bytes);

    let valid = key_bytes
        .as_slice()
        .try_into()
        .ok()
        .and_then(|arr: &[u8; 32]| VerifyingKey::from_bytes(arr).ok())
        .zip(
            BASE64
                .decode(sig_b64)
                .ok()
                .and_then(|s| Signature::from_slice(&s).ok()),
        )
        .is_some_and(|(key, sig)| key.verify(payload, &sig).is_ok());

    SignatureCheck { fingerprint, valid }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ed25519_dalek::{Signer, SigningKey};
    use opal_schema::FeedSignature;

    fn signing_key(seed: u8) -> SigningKey {
        SigningKey::from_bytes(&[seed; 32])
    }

    fn envelope(payload: &str, sigs: Vec<FeedSignature>) -> Vec<u8> {
        SignedFeed {
            payload: payload.to_string(),
            signatures: sigs,
        }
        .to_bytes()
        .unwrap()
    }

    fn sign(payload: &str, key: &SigningKey) -> FeedSignature {
        FeedSignature {
            key: BASE64.encode(key.verifying_key().as_bytes()),
            signature: BASE64.encode(key.sign(payload.as_bytes()).to_bytes()),
        }
    }

    #[test]
    fn test_valid_signature() {
        let key = signing_key(1);
        let data = envelope("{\"name\":\"app\"}", vec![sign("{\"name\":\"app\"}", &key)]);

        let (payload, checks) = check_feed(&data).unwrap();
        assert_eq!(payload, b"{\"name\":\"app\"}");
        assert_eq!(checks.len(), 1);
        assert!(checks[0].valid);
        assert_eq!(
            checks[0].fingerprint,
            fingerprint(key.verifying_key().as_bytes())
        );
    }

    #[test]
    fn test_tampered_payload_is_invalid() {
        let key = signing_key(1);
        let data = envelope("{\"name\":\"evil\"}", vec![sign("{\"name\":\"app\"}", &key)]);

        let (_, checks) = check_feed(&data).unwrap();
        assert!(!checks[0].valid);
    }

    #[test]
    fn test_mixed_signatures_keep_order() {
        let good = signing_key(1);
        let bad = signing_key(2);
        let payload = "{\"name\":\"app\"}";
        let data = envelope(
            payload,
            vec![sign("something else", &bad), sign(payload, &good)],
        );

        let (_, checks) = check_feed(&data).unwrap();
        assert!(!checks[0].valid);
        assert!(checks[1].valid);
    }

    #[test]
    fn test_unsigned_envelope() {
        let data = envelope("{}", vec![]);
        assert!(matches!(check_feed(&data), Err(SignatureError::Unsigned)));
    }

    #[test]
    fn test_undecodable_key_is_invalid_not_fatal() {
        let data = envelope(
            "{}",
            vec![FeedSignature {
                key: "!!! not base64 !!!".into(),
                signature: "AAAA".into(),
            }],
        );
        let (_, checks) = check_feed(&data).unwrap();
        assert!(!checks[0].valid);
    }
}
