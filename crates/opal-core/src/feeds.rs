//! The verified feed cache.
//!
//! Feeds that passed signature and trust checks are kept on disk, one
//! JSON file per interface keyed by the SHA-256 of the interface URI,
//! plus an in-memory map the solver reads. Inserting a feed replaces any
//! previous version wholesale; feeds are never edited in place.

use std::collections::BTreeMap;
use std::io::{self, Write};
use std::path::PathBuf;

use sha2::{Digest, Sha256};
use thiserror::Error;

use opal_schema::{Feed, InterfaceUri};

/// Failures while reading or writing the cache.
#[derive(Error, Debug)]
pub enum FeedCacheError {
    /// Filesystem error.
    #[error("Feed cache IO error: {0}")]
    Io(#[from] io::Error),

    /// A cached file no longer parses as a feed.
    #[error("Cached feed for '{uri}' is corrupt: {source}")]
    Corrupt {
        /// The interface whose cache entry failed to parse.
        uri: InterfaceUri,
        /// Underlying parse error.
        source: serde_json::Error,
    },
}

/// Disk-backed cache of verified feeds with an in-memory working set.
#[derive(Debug)]
pub struct FeedCache {
    root: PathBuf,
    loaded: BTreeMap<InterfaceUri, Feed>,
}

impl FeedCache {
    /// Open (creating if needed) the cache rooted at `root`.
    pub fn with_root(root: PathBuf) -> io::Result<Self> {
        std::fs::create_dir_all(&root)?;
        Ok(Self {
            root,
            loaded: BTreeMap::new(),
        })
    }

    /// The feed for `uri`, if it is in the working set.
    pub fn feed(&self, uri: &InterfaceUri) -> Option<&Feed> {
        self.loaded.get(uri)
    }

    /// Load `uri` from disk into the working set if a cached copy
    /// exists. Returns whether a feed is now available.
    pub fn load_cached(&mut self, uri: &InterfaceUri) -> Result<bool, FeedCacheError> {
        if self.loaded.contains_key(uri) {
            return Ok(true);
        }
        let path = self.path_for(uri);
        let data = match std::fs::read(&path) {
            Ok(data) => data,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(false),
            Err(e) => return Err(e.into()),
        };
        let feed: Feed = serde_json::from_slice(&data).map_err(|source| {
            FeedCacheError::Corrupt {
                uri: uri.clone(),
                source,
            }
        })?;
        self.loaded.insert(uri.clone(), feed);
        Ok(true)
    }

    /// Insert a verified feed, replacing any previous copy on disk and
    /// in memory.
    pub fn insert(&mut self, feed: Feed) -> Result<(), FeedCacheError> {
        let path = self.path_for(&feed.uri);
        let mut tmp = tempfile::NamedTempFile::new_in(&self.root)?;
        tmp.write_all(&serde_json::to_vec_pretty(&feed).map_err(io::Error::other)?)?;
        tmp.persist(&path).map_err(|e| e.error)?;
        self.loaded.insert(feed.uri.clone(), feed);
        Ok(())
    }

    /// Interfaces currently in the working set.
    pub fn loaded_uris(&self) -> impl Iterator<Item = &InterfaceUri> {
        self.loaded.keys()
    }

    fn path_for(&self, uri: &InterfaceUri) -> PathBuf {
        let digest = hex::encode(Sha256::digest(uri.as_str().as_bytes()));
        self.root.join(format!("{digest}.json"))
    }
}
