//! Durable storage for the bearer credential.
//!
//! Exactly one value matters: the credential under [`CREDENTIAL_KEY`]. Its
//! presence at startup is the only signal for restoring a session.

use std::collections::BTreeMap;
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use secrecy::ExposeSecret;
use tempfile::NamedTempFile;
use thiserror::Error;

use shopfront_core::Credential;

/// Key the credential is stored under.
pub const CREDENTIAL_KEY: &str = "jwt";

/// Errors that can occur while reading or writing the credential.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Filesystem operation failed.
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Storage file is not a JSON object of strings.
    #[error("Corrupt storage file {path}: {source}")]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Where the session store keeps its credential between runs.
pub trait CredentialStorage: Send + Sync {
    /// Read the persisted credential, if any.
    ///
    /// # Errors
    ///
    /// Returns an error if the backing store cannot be read.
    fn load(&self) -> Result<Option<Credential>, StorageError>;

    /// Persist `credential`, replacing any previous one.
    ///
    /// # Errors
    ///
    /// Returns an error if the backing store cannot be written.
    fn store(&self, credential: &Credential) -> Result<(), StorageError>;

    /// Remove the persisted credential. Succeeds when none is stored.
    ///
    /// # Errors
    ///
    /// Returns an error if the backing store cannot be written.
    fn clear(&self) -> Result<(), StorageError>;
}

// =============================================================================
// FileCredentialStorage
// =============================================================================

/// Key/value JSON file, one entry per key.
///
/// Other keys in the file are preserved. Writes go to a uniquely named,
/// owner-only temporary file in the same directory that is then persisted
/// over the original.
#[derive(Debug, Clone)]
pub struct FileCredentialStorage {
    path: PathBuf,
}

impl FileCredentialStorage {
    /// Storage backed by the file at `path`; the file is created on first write.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Path of the backing file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn io_error(&self, source: std::io::Error) -> StorageError {
        StorageError::Io {
            path: self.path.clone(),
            source,
        }
    }

    fn read_entries(&self) -> Result<BTreeMap<String, String>, StorageError> {
        let contents = match fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(BTreeMap::new()),
            Err(e) => return Err(self.io_error(e)),
        };

        if contents.trim().is_empty() {
            return Ok(BTreeMap::new());
        }

        serde_json::from_str(&contents).map_err(|source| StorageError::Corrupt {
            path: self.path.clone(),
            source,
        })
    }

    fn write_entries(&self, entries: &BTreeMap<String, String>) -> Result<(), StorageError> {
        let parent = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        fs::create_dir_all(parent).map_err(|e| self.io_error(e))?;

        let contents = serde_json::to_string_pretty(entries).map_err(|source| {
            StorageError::Corrupt {
                path: self.path.clone(),
                source,
            }
        })?;

        // Created owner-only (0600 on unix) under a unique name in the same directory
        let mut temp = NamedTempFile::new_in(parent).map_err(|e| self.io_error(e))?;
        temp.write_all(contents.as_bytes())
            .map_err(|e| self.io_error(e))?;
        temp.as_file().sync_all().map_err(|e| self.io_error(e))?;
        temp.persist(&self.path)
            .map_err(|e| self.io_error(e.error))?;
        Ok(())
    }
}

impl CredentialStorage for FileCredentialStorage {
    fn load(&self) -> Result<Option<Credential>, StorageError> {
        Ok(self
            .read_entries()?
            .remove(CREDENTIAL_KEY)
            .map(Credential::new))
    }

    fn store(&self, credential: &Credential) -> Result<(), StorageError> {
        // A corrupt file is replaced rather than blocking login
        let mut entries = self.read_entries().unwrap_or_default();
        entries.insert(
            CREDENTIAL_KEY.to_string(),
            credential.expose_secret().to_string(),
        );
        self.write_entries(&entries)
    }

    fn clear(&self) -> Result<(), StorageError> {
        let entries = match self.read_entries() {
            Ok(mut entries) => {
                if entries.remove(CREDENTIAL_KEY).is_none() {
                    return Ok(());
                }
                entries
            }
            // Unreadable contents may still hold a token; overwrite them
            Err(StorageError::Corrupt { .. }) => BTreeMap::new(),
            Err(e) => return Err(e),
        };

        self.write_entries(&entries)
    }
}

// =============================================================================
// MemoryCredentialStorage
// =============================================================================

/// Process-local storage for tests and embedders that persist elsewhere.
#[derive(Debug, Default)]
pub struct MemoryCredentialStorage {
    credential: Mutex<Option<Credential>>,
}

impl MemoryCredentialStorage {
    /// Empty storage.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Storage pre-seeded with `credential`, as if saved by an earlier run.
    #[must_use]
    pub fn with_credential(credential: Credential) -> Self {
        Self {
            credential: Mutex::new(Some(credential)),
        }
    }
}

impl CredentialStorage for MemoryCredentialStorage {
    fn load(&self) -> Result<Option<Credential>, StorageError> {
        Ok(self
            .credential
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone())
    }

    fn store(&self, credential: &Credential) -> Result<(), StorageError> {
        *self
            .credential
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(credential.clone());
        Ok(())
    }

    fn clear(&self) -> Result<(), StorageError> {
        self.credential
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        Ok(())
    }
}
