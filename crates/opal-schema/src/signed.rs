//! The signed-feed envelope.
//!
//! A published feed is a JSON envelope carrying the feed document as an
//! embedded string plus one or more detached signatures over those exact
//! payload bytes. Embedding the payload as a string sidesteps JSON
//! canonicalization: what was signed is byte-for-byte what is verified.
//! Verification itself lives in `opal-core`.

use serde::{Deserialize, Serialize};

/// A feed document plus its detached signatures.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignedFeed {
    /// The feed JSON, verbatim as signed.
    pub payload: String,

    /// Candidate signatures; any one valid, trusted signature accepts
    /// the feed.
    pub signatures: Vec<FeedSignature>,
}

/// One detached signature.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedSignature {
    /// Base64-encoded ed25519 verifying key.
    pub key: String,

    /// Base64-encoded ed25519 signature over the payload bytes.
    pub signature: String,
}

impl SignedFeed {
    /// Parse an envelope from raw downloaded bytes.
    pub fn from_bytes(data: &[u8]) -> serde_json::Result<Self> {
        serde_json::from_slice(data)
    }

    /// Serialize the envelope for publication.
    pub fn to_bytes(&self) -> serde_json::Result<Vec<u8>> {
        serde_json::to_vec_pretty(self)
    }
}
