//! Core identifier newtypes: interface URIs, implementation ids, stability.

use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::path::{Path, PathBuf};

/// The URI naming an interface (a contract resolved to one implementation
/// per run). The URI doubles as the download location of the interface's
/// feed document, and its authority component is the trust domain for
/// signing keys.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct InterfaceUri(String);

impl InterfaceUri {
    /// Create a new interface URI (stored as-is).
    pub fn new(uri: &str) -> Self {
        Self(uri.to_string())
    }

    /// Return the URI as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The authority (host) component, used as the trust domain.
    ///
    /// Returns `None` for URIs without a `scheme://host` prefix.
    pub fn host(&self) -> Option<&str> {
        let rest = self.0.split_once("://")?.1;
        let host = rest.split(['/', '?', '#']).next().unwrap_or(rest);
        if host.is_empty() { None } else { Some(host) }
    }
}

impl std::fmt::Display for InterfaceUri {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::ops::Deref for InterfaceUri {
    type Target = str;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl AsRef<str> for InterfaceUri {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Borrow<str> for InterfaceUri {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl From<&str> for InterfaceUri {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for InterfaceUri {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl PartialEq<str> for InterfaceUri {
    fn eq(&self, other: &str) -> bool {
        self.0 == other
    }
}

impl PartialEq<&str> for InterfaceUri {
    fn eq(&self, other: &&str) -> bool {
        self.0 == *other
    }
}

/// Identifier of one concrete implementation.
///
/// Three forms exist:
/// - `sha256:<hex>` — content digest; resolved to a store directory.
/// - `package:<distro>:<name>` — a native, distribution-provided
///   implementation assumed already present on the host.
/// - an absolute path — a local, unmanaged implementation root.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ImplId(String);

impl ImplId {
    /// Create a new implementation id (stored as-is).
    pub fn new(id: &str) -> Self {
        Self(id.to_string())
    }

    /// Return the id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether this is a native (`package:`-prefixed) implementation.
    pub fn is_native(&self) -> bool {
        self.0.starts_with("package:")
    }

    /// Interpret the id as a local absolute path, if it is one.
    pub fn as_local_path(&self) -> Option<PathBuf> {
        if Path::new(&self.0).is_absolute() {
            Some(PathBuf::from(&self.0))
        } else {
            None
        }
    }

    /// Split a content-addressed id into `(algorithm, hex digest)`.
    pub fn digest(&self) -> Option<(&str, &str)> {
        if self.is_native() || self.as_local_path().is_some() {
            return None;
        }
        self.0.split_once(':')
    }
}

impl std::fmt::Display for ImplId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for ImplId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ImplId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for ImplId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl PartialEq<str> for ImplId {
    fn eq(&self, other: &str) -> bool {
        self.0 == other
    }
}

impl PartialEq<&str> for ImplId {
    fn eq(&self, other: &&str) -> bool {
        self.0 == *other
    }
}

/// How much an implementation's publisher vouches for it.
///
/// Ordered from least to most trustworthy; a policy carries a floor below
/// which candidates are not considered. `Preferred` is a local, user-set
/// override rather than a publisher rating.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "lowercase")]
pub enum Stability {
    /// Known to be dangerous; never selected.
    Insecure,
    /// Known to be broken; never selected.
    Buggy,
    /// Snapshot quality, for people working on the program itself.
    Developer,
    /// Released but not yet widely exercised.
    #[default]
    Testing,
    /// Released and believed sound.
    Stable,
    /// Pinned locally by the user; beats every publisher rating.
    Preferred,
}

impl Stability {
    /// String form as written in feeds.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Insecure => "insecure",
            Self::Buggy => "buggy",
            Self::Developer => "developer",
            Self::Testing => "testing",
            Self::Stable => "stable",
            Self::Preferred => "preferred",
        }
    }
}

impl std::fmt::Display for Stability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for Stability {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "insecure" => Ok(Self::Insecure),
            "buggy" => Ok(Self::Buggy),
            "developer" | "dev" => Ok(Self::Developer),
            "testing" => Ok(Self::Testing),
            "stable" => Ok(Self::Stable),
            "preferred" => Ok(Self::Preferred),
            _ => Err(format!("Unknown stability rating: {s}")),
        }
    }
}
