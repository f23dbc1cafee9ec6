//! Resolved selection sets.
//!
//! A [`SelectionSet`] is the output of one resolution attempt: one chosen
//! implementation per reachable interface. It is immutable once built and
//! can be serialized, stored, and replayed later without re-solving.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::feed::{Archive, Binding, Requirement};
use crate::types::{ImplId, InterfaceUri};
use crate::version::Version;

/// The interface → implementation mapping for one run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SelectionSet {
    /// The interface the program was resolved for.
    pub interface: InterfaceUri,

    /// Chosen implementation per interface. BTreeMap for deterministic
    /// iteration and serialization.
    pub selections: BTreeMap<InterfaceUri, Selection>,
}

/// The chosen implementation for one interface, carrying everything
/// needed to bind and launch without the original feed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Selection {
    /// Implementation id.
    pub id: ImplId,

    /// Implementation version.
    pub version: Version,

    /// Declared entry point, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub main: Option<String>,

    /// The implementation's own bindings.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub bindings: Vec<Binding>,

    /// Dependency edges, mirroring the implementation's requirements.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dependencies: Vec<Requirement>,

    /// Where to fetch the bundle if it is not cached.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub archive: Option<Archive>,
}

/// Violations of the selection-set invariants.
#[derive(thiserror::Error, Debug)]
pub enum SelectionsError {
    /// The root interface has no entry in the set.
    #[error("Selections for '{0}' are missing the root interface itself")]
    MissingRoot(InterfaceUri),

    /// A dependency edge points at an interface with no selection.
    #[error("Selection for '{from}' depends on '{to}', which has no selection")]
    Dangling {
        /// Interface whose selection carries the edge.
        from: InterfaceUri,
        /// Interface the edge points at.
        to: InterfaceUri,
    },
}

impl SelectionSet {
    /// Create an empty set for `interface`.
    pub fn new(interface: InterfaceUri) -> Self {
        Self {
            interface,
            selections: BTreeMap::new(),
        }
    }

    /// The selection for the root interface.
    ///
    /// Call [`validate`](Self::validate) first; a set that passed it
    /// always has a root.
    pub fn root(&self) -> Option<&Selection> {
        self.selections.get(&self.interface)
    }

    /// Check the closure invariants: the root is present and every
    /// dependency edge resolves to another entry in the same set.
    pub fn validate(&self) -> Result<(), SelectionsError> {
        if !self.selections.contains_key(&self.interface) {
            return Err(SelectionsError::MissingRoot(self.interface.clone()));
        }
        for (uri, sel) in &self.selections {
            for dep in &sel.dependencies {
                if !self.selections.contains_key(&dep.interface) {
                    return Err(SelectionsError::Dangling {
                        from: uri.clone(),
                        to: dep.interface.clone(),
                    });
                }
            }
        }
        Ok(())
    }

    /// Serialize to pretty JSON for persistence.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    /// Parse a previously persisted set.
    pub fn from_json(data: &str) -> serde_json::Result<Self> {
        serde_json::from_str(data)
    }
}
