//! The trust database: which signing keys are trusted for which domains.
//!
//! A key is trusted per domain, where the domain is the authority
//! component of the interface URI it signs feeds for. The database is
//! append-only: keys are added, never removed, and every mutation is
//! persisted before observers are notified.

use std::collections::{BTreeMap, BTreeSet};
use std::io::Write;
use std::path::PathBuf;

use thiserror::Error;

use opal_schema::InterfaceUri;

/// Trust-related failures, all user-safe.
#[derive(Error, Debug)]
pub enum TrustError {
    /// The downloaded feed carried signatures, but none verified.
    #[error("No valid signatures found. Signatures:{0}")]
    NoValidSignature(String),

    /// The feed verified, but the user declined to trust any signer.
    #[error("Not signed with a trusted key")]
    Untrusted,

    /// The interface URI has no authority to derive a trust domain from.
    #[error("Interface URI '{0}' has no host to use as a trust domain")]
    NoDomain(InterfaceUri),

    /// The on-disk database could not be read or written.
    #[error("Trust database error: {0}")]
    Io(#[from] std::io::Error),

    /// The on-disk database is not valid JSON.
    #[error("Trust database is corrupt: {0}")]
    Corrupt(#[from] serde_json::Error),
}

/// Derive the trust domain for an interface: its URI authority.
pub fn domain_from_uri(uri: &InterfaceUri) -> Result<String, TrustError> {
    uri.host()
        .map(str::to_string)
        .ok_or_else(|| TrustError::NoDomain(uri.clone()))
}

type Observer = Box<dyn Fn() + Send>;

/// Append-only map of key fingerprint → trusted domains.
pub struct TrustDb {
    path: PathBuf,
    keys: BTreeMap<String, BTreeSet<String>>,
    observers: Vec<Observer>,
}

impl std::fmt::Debug for TrustDb {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TrustDb")
            .field("path", &self.path)
            .field("keys", &self.keys)
            .finish_non_exhaustive()
    }
}

impl TrustDb {
    /// Load the database at `path`, starting empty if the file does not
    /// exist yet.
    pub fn load(path: PathBuf) -> Result<Self, TrustError> {
        let keys = match std::fs::read(&path) {
            Ok(data) => serde_json::from_slice(&data)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => return Err(e.into()),
        };
        Ok(Self {
            path,
            keys,
            observers: Vec::new(),
        })
    }

    /// Whether `fingerprint` is trusted to sign feeds for `domain`.
    pub fn is_trusted(&self, fingerprint: &str, domain: &str) -> bool {
        self.keys
            .get(fingerprint)
            .is_some_and(|domains| domains.contains(domain))
    }

    /// All (fingerprint, domains) entries, for display.
    pub fn entries(&self) -> impl Iterator<Item = (&str, &BTreeSet<String>)> {
        self.keys.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Trust `fingerprint` for `domain` and persist immediately.
    ///
    /// Idempotent; the database never shrinks. Call
    /// [`notify`](Self::notify) once after a batch of additions.
    pub fn trust_key(&mut self, fingerprint: &str, domain: &str) -> Result<(), TrustError> {
        let inserted = self
            .keys
            .entry(fingerprint.to_string())
            .or_default()
            .insert(domain.to_string());
        if inserted {
            tracing::info!(fingerprint, domain, "trusting key");
            self.save()?;
        }
        Ok(())
    }

    /// Register a callback invoked on [`notify`](Self::notify).
    pub fn on_change(&mut self, observer: impl Fn() + Send + 'static) {
        self.observers.push(Box::new(observer));
    }

    /// Tell observers the set of trusted keys changed.
    pub fn notify(&self) {
        for observer in &self.observers {
            observer();
        }
    }

    /// Write the database atomically: temp file in the same directory,
    /// then rename over the old copy.
    fn save(&self) -> Result<(), TrustError> {
        let dir = self.path.parent().unwrap_or(std::path::Path::new("."));
        std::fs::create_dir_all(dir)?;
        let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
        tmp.write_all(&serde_json::to_vec_pretty(&self.keys)?)?;
        tmp.persist(&self.path).map_err(|e| e.error)?;
        Ok(())
    }
}
