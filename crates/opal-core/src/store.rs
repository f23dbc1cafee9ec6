//! Content-addressed implementation store.
//!
//! Cached implementations live under `store/<algo>=<digest>`, one
//! directory per implementation, keyed by the id the feed declared.
//! Directories are immutable once added: an archive is unpacked into a
//! temp directory and renamed into place only after its digest matched
//! the id.

use std::fs::{self, File};
use std::io::{self, Read};
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};
use thiserror::Error;

use opal_schema::{ArchiveFormat, ImplId};

/// Failures while resolving or populating the store.
#[derive(Error, Debug)]
pub enum StoreError {
    /// The implementation is not in the store.
    #[error("Implementation '{0}' is not in the local store")]
    NotCached(ImplId),

    /// The id is not one the store can hold (native package ids have no
    /// store path, and unknown digest algorithms cannot be verified).
    #[error("Implementation id '{0}' has no store location")]
    Unstorable(ImplId),

    /// The fetched archive does not hash to the id that named it.
    #[error("Digest mismatch for '{id}': archive hashed to sha256:{actual}")]
    DigestMismatch {
        /// The id the archive was fetched for.
        id: ImplId,
        /// Hex digest the archive actually hashed to.
        actual: String,
    },

    /// Archive unpacking failed.
    #[error("Failed to unpack archive for '{id}': {reason}")]
    Unpack {
        /// The id being added.
        id: ImplId,
        /// What the archive reader reported.
        reason: String,
    },

    /// Filesystem error.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

/// The on-disk store of cached implementations.
#[derive(Debug, Clone)]
pub struct ImplStore {
    root: PathBuf,
}

impl ImplStore {
    /// Open (creating if needed) the store rooted at `root`.
    pub fn with_root(root: PathBuf) -> io::Result<Self> {
        fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    /// The store's root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Absolute filesystem path of a cached implementation.
    ///
    /// Absolute-path ids pass through unchanged; digest ids must already
    /// be present; native ids have no path at all.
    pub fn lookup(&self, id: &ImplId) -> Result<PathBuf, StoreError> {
        if let Some(path) = id.as_local_path() {
            return Ok(path);
        }
        let dir = self.dir_for(id)?;
        if dir.is_dir() {
            Ok(dir)
        } else {
            Err(StoreError::NotCached(id.clone()))
        }
    }

    /// Whether the implementation is already available.
    ///
    /// Native implementations count as present: the host provides them.
    pub fn contains(&self, id: &ImplId) -> bool {
        if id.is_native() {
            return true;
        }
        if let Some(path) = id.as_local_path() {
            return path.exists();
        }
        self.dir_for(id).map(|d| d.is_dir()).unwrap_or(false)
    }

    /// All digest directories currently in the store.
    pub fn list(&self) -> io::Result<Vec<String>> {
        let mut entries = Vec::new();
        for entry in fs::read_dir(&self.root)? {
            let entry = entry?;
            if entry.file_type()?.is_dir() {
                entries.push(entry.file_name().to_string_lossy().into_owned());
            }
        }
        entries.sort();
        Ok(entries)
    }

    /// Verify a fetched archive against `id` and unpack it into the
    /// store. Returns the implementation's directory.
    ///
    /// The archive is hashed first; on mismatch nothing is written. The
    /// unpack goes to a temp directory next to the final location and is
    /// renamed into place, so a crash never leaves a half-populated
    /// entry under the final name.
    pub fn add_archive(
        &self,
        id: &ImplId,
        archive: &Path,
        format: ArchiveFormat,
    ) -> Result<PathBuf, StoreError> {
        let (_, expected) = id.digest().ok_or_else(|| StoreError::Unstorable(id.clone()))?;

        let actual = hash_file(archive)?;
        if actual != expected {
            return Err(StoreError::DigestMismatch {
                id: id.clone(),
                actual,
            });
        }

        let dest = self.dir_for(id)?;
        if dest.is_dir() {
            // Content-addressed: an existing entry is already correct.
            return Ok(dest);
        }

        let staging = tempfile::tempdir_in(&self.root)?;
        unpack(archive, format, staging.path()).map_err(|e| StoreError::Unpack {
            id: id.clone(),
            reason: e.to_string(),
        })?;

        let staged = staging.keep();
        match fs::rename(&staged, &dest) {
            Ok(()) => Ok(dest),
            Err(e) => {
                let _ = fs::remove_dir_all(&staged);
                // Lost the race to another process adding the same id.
                if dest.is_dir() { Ok(dest) } else { Err(e.into()) }
            }
        }
    }

    fn dir_for(&self, id: &ImplId) -> Result<PathBuf, StoreError> {
        match id.digest() {
            Some((algo, digest)) => Ok(self.root.join(format!("{algo}={digest}"))),
            None => Err(StoreError::Unstorable(id.clone())),
        }
    }
}

fn hash_file(path: &Path) -> io::Result<String> {
    let mut file = File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buffer = [0u8; 65536];
    loop {
        let n = file.read(&mut buffer)?;
        if n == 0 {
            break;
        }
        hasher.update(&buffer[..n]);
    }
    Ok(hex::encode(hasher.finalize()))
}

fn unpack(archive: &Path, format: ArchiveFormat, dest: &Path) -> io::Result<()> {
    match format {
        ArchiveFormat::TarGz => {
            let file = File::open(archive)?;
            let decoder = flate2::read::GzDecoder::new(file);
            let mut tar = tar::Archive::new(decoder);
            tar.unpack(dest)
        }
        ArchiveFormat::Zip => {
            let file = File::open(archive)?;
            let mut zip = zip::ZipArchive::new(file).map_err(io::Error::other)?;
            zip.extract(dest).map_err(io::Error::other)
        }
    }
}
