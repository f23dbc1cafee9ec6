//! Feed documents: an interface's candidate implementations.
//!
//! A feed names one interface and the implementations that can satisfy
//! it. Feeds are immutable once parsed; a refresh replaces the whole
//! document in the cache.

use serde::{Deserialize, Serialize};

use crate::arch::Arch;
use crate::types::{ImplId, InterfaceUri, Stability};
use crate::version::Version;

/// A parsed feed document for one interface.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Feed {
    /// The interface this feed describes.
    pub uri: InterfaceUri,

    /// Human-readable program name.
    pub name: String,

    /// One-line description, if the publisher provided one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,

    /// Candidate implementations, in publication order.
    pub implementations: Vec<Implementation>,
}

/// One concrete installable version of an interface.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Implementation {
    /// Unique id: content digest, `package:` native id, or absolute path.
    pub id: ImplId,

    /// Version of this implementation.
    pub version: Version,

    /// Architecture constraint, or `None` for architecture-independent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arch: Option<Arch>,

    /// Publisher's stability rating.
    #[serde(default)]
    pub stability: Stability,

    /// Relative path of the entry point inside the implementation, if it
    /// is directly runnable (pure libraries have none).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub main: Option<String>,

    /// Dependencies on other interfaces, in declaration order.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub requires: Vec<Requirement>,

    /// Bindings dependents should apply when they depend on this
    /// implementation via an edge without its own bindings, and that the
    /// implementation applies to itself at launch.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub bindings: Vec<Binding>,

    /// Where to fetch the implementation bundle from, for digest ids not
    /// yet present in the local store.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub archive: Option<Archive>,
}

/// A dependency edge from one implementation to another interface.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Requirement {
    /// The interface the dependency must resolve to.
    pub interface: InterfaceUri,

    /// How the chosen dependency is exposed to the dependent.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub bindings: Vec<Binding>,
}

/// A declarative rule for exposing a dependency's location to a
/// dependent. Closed set; dispatch is by exhaustive match.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Binding {
    /// Combine the dependency's path into an environment variable.
    Environment(EnvironmentBinding),
}

/// An environment-variable binding.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnvironmentBinding {
    /// Variable to set (e.g. `PATH`, `PYTHONPATH`).
    pub name: String,

    /// Path inside the implementation to insert (empty for its root).
    #[serde(default)]
    pub insert: String,

    /// How the path combines with the variable's current value.
    #[serde(default)]
    pub mode: EnvMode,

    /// List separator; defaults to `:` when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub separator: Option<String>,
}

/// Combination rule for an [`EnvironmentBinding`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum EnvMode {
    /// Insert at the front of the list (default).
    #[default]
    Prepend,
    /// Insert at the end of the list.
    Append,
    /// Replace the variable's value entirely.
    Replace,
}

/// Where an implementation bundle can be fetched from.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Archive {
    /// Download URL of the bundle.
    pub url: String,

    /// Archive container format.
    pub format: ArchiveFormat,
}

/// Supported bundle container formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArchiveFormat {
    /// Gzip-compressed tar archive (`.tar.gz` / `.tgz`).
    #[serde(rename = "tar.gz")]
    TarGz,
    /// Zip archive (`.zip`).
    Zip,
}

/// Errors found while validating a parsed [`Feed`].
#[derive(thiserror::Error, Debug)]
pub enum FeedError {
    /// A required field is empty.
    #[error("Empty field in feed: {0}")]
    EmptyField(&'static str),

    /// A content-addressed id's digest is not valid lowercase hex of the
    /// expected length.
    #[error("Implementation '{0}' has a malformed digest")]
    MalformedDigest(ImplId),

    /// A digest-id implementation carries no archive to fetch it from.
    #[error("Implementation '{0}' has no archive and is not native or local")]
    NoArchive(ImplId),

    /// An archive URL does not use http(s).
    #[error("Archive URL for '{0}' must use http(s)")]
    BadArchiveUrl(ImplId),
}

impl Feed {
    /// Validate structural integrity after parsing.
    pub fn validate(&self) -> Result<(), FeedError> {
        if self.uri.as_str().is_empty() {
            return Err(FeedError::EmptyField("uri"));
        }
        if self.name.is_empty() {
            return Err(FeedError::EmptyField("name"));
        }
        for imp in &self.implementations {
            if imp.id.as_str().is_empty() {
                return Err(FeedError::EmptyField("id"));
            }
            if let Some((algo, digest)) = imp.id.digest() {
                if algo != "sha256"
                    || digest.len() != 64
                    || !digest.bytes().all(|b| b.is_ascii_hexdigit())
                {
                    return Err(FeedError::MalformedDigest(imp.id.clone()));
                }
                match &imp.archive {
                    None => return Err(FeedError::NoArchive(imp.id.clone())),
                    Some(a) if !a.url.starts_with("http") => {
                        return Err(FeedError::BadArchiveUrl(imp.id.clone()));
                    }
                    Some(_) => {}
                }
            }
        }
        Ok(())
    }

    /// Look up an implementation by id.
    pub fn implementation(&self, id: &ImplId) -> Option<&Implementation> {
        self.implementations.iter().find(|i| &i.id == id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn digest_id() -> ImplId {
        ImplId::new(&format!("sha256:{}", "ab".repeat(32)))
    }

    fn minimal_feed(implementations: Vec<Implementation>) -> Feed {
        Feed {
            uri: InterfaceUri::new("https://example.net/app.json"),
            name: "app".into(),
            summary: None,
            implementations,
        }
    }

    fn digest_impl() -> Implementation {
        Implementation {
            id: digest_id(),
            version: Version::new("1.0"),
            arch: None,
            stability: Stability::Stable,
            main: Some("bin/app".into()),
            requires: vec![],
            bindings: vec![],
            archive: Some(Archive {
                url: "https://example.net/app-1.0.tar.gz".into(),
                format: ArchiveFormat::TarGz,
            }),
        }
    }

    #[test]
    fn test_validate_ok() {
        minimal_feed(vec![digest_impl()]).validate().unwrap();
    }

    #[test]
    fn test_validate_rejects_bad_digest() {
        let mut imp = digest_impl();
        imp.id = ImplId::new("sha256:nothex");
        let err = minimal_feed(vec![imp]).validate().unwrap_err();
        assert!(matches!(err, FeedError::MalformedDigest(_)));
    }

    #[test]
    fn test_validate_requires_archive_for_digest_ids() {
        let mut imp = digest_impl();
        imp.archive = None;
        let err = minimal_feed(vec![imp]).validate().unwrap_err();
        assert!(matches!(err, FeedError::NoArchive(_)));
    }

    #[test]
    fn test_native_needs_no_archive() {
        let imp = Implementation {
            id: ImplId::new("package:deb:python3"),
            version: Version::new("3.11"),
            arch: None,
            stability: Stability::Stable,
            main: Some("/usr/bin/python3".into()),
            requires: vec![],
            bindings: vec![],
            archive: None,
        };
        minimal_feed(vec![imp]).validate().unwrap();
    }

    #[test]
    fn test_binding_wire_format() {
        let json = r#"{"kind":"environment","name":"PATH","insert":"bin"}"#;
        let binding: Binding = serde_json::from_str(json).unwrap();
        let Binding::Environment(env) = binding;
        assert_eq!(env.name, "PATH");
        assert_eq!(env.insert, "bin");
        assert_eq!(env.mode, EnvMode::Prepend);
        assert_eq!(env.separator, None);
    }
}
