//! Identity persistence.
//!
//! The client never touches storage itself; it emits
//! [`crate::ClientAction::PersistIdentity`] and
//! [`crate::ClientAction::ClearIdentity`] and the runtime forwards them to an
//! [`IdentityPersistence`] backend.

use std::{
    fs,
    io::{self, BufReader, BufWriter, Write},
    path::{Path, PathBuf},
    sync::{Arc, Mutex, PoisonError},
};

use thiserror::Error;
use tracing::debug;

use crate::store::IdentityRecord;

/// Persistence errors.
#[derive(Debug, Error)]
pub enum PersistenceError {
    /// Filesystem failure.
    #[error("io error: {0}")]
    Io(#[from] io::Error),

    /// Record could not be serialized.
    #[error("encode failed: {0}")]
    Encode(String),

    /// Stored bytes are not a valid record.
    #[error("decode failed: {0}")]
    Decode(String),
}

/// Storage for the single local identity record.
pub trait IdentityPersistence: Send {
    /// Stored record, if any.
    ///
    /// # Errors
    ///
    /// - `PersistenceError::Decode` if stored bytes are corrupt
    fn load(&self) -> Result<Option<IdentityRecord>, PersistenceError>;

    /// Replace the stored record.
    fn save(&mut self, record: &IdentityRecord) -> Result<(), PersistenceError>;

    /// Delete the stored record. Deleting nothing is not an error.
    fn clear(&mut self) -> Result<(), PersistenceError>;
}

/// In-memory persistence. Clones share the same slot.
#[derive(Debug, Clone, Default)]
pub struct MemoryPersistence {
    slot: Arc<Mutex<Option<IdentityRecord>>>,
}

impl MemoryPersistence {
    /// Empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Store pre-populated with `record`.
    pub fn with_record(record: IdentityRecord) -> Self {
        Self { slot: Arc::new(Mutex::new(Some(record))) }
    }

    fn slot(&self) -> std::sync::MutexGuard<'_, Option<IdentityRecord>> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl IdentityPersistence for MemoryPersistence {
    fn load(&self) -> Result<Option<IdentityRecord>, PersistenceError> {
        Ok(self.slot().clone())
    }

    fn save(&mut self, record: &IdentityRecord) -> Result<(), PersistenceError> {
        *self.slot() = Some(record.clone());
        Ok(())
    }

    fn clear(&mut self) -> Result<(), PersistenceError> {
        *self.slot() = None;
        Ok(())
    }
}

/// CBOR file on disk.
///
/// Writes go to a sibling temporary file which is then renamed over the
/// target, so a crash never leaves a half-written record.
#[derive(Debug, Clone)]
pub struct FilePersistence {
    path: PathBuf,
}

impl FilePersistence {
    /// Persistence at `path`. The file need not exist yet.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Target file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self.path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

impl IdentityPersistence for FilePersistence {
    fn load(&self) -> Result<Option<IdentityRecord>, PersistenceError> {
        let file = match fs::File::open(&self.path) {
            Ok(file) => file,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(err.into()),
        };

        let record = ciborium::from_reader(BufReader::new(file))
            .map_err(|e| PersistenceError::Decode(e.to_string()))?;
        debug!(path = %self.path.display(), "loaded identity record");
        Ok(Some(record))
    }

    fn save(&mut self, record: &IdentityRecord) -> Result<(), PersistenceError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let temp = self.temp_path();
        let mut writer = BufWriter::new(fs::File::create(&temp)?);
        ciborium::into_writer(record, &mut writer)
            .map_err(|e| PersistenceError::Encode(e.to_string()))?;
        writer.flush()?;
        drop(writer);

        fs::rename(&temp, &self.path)?;
        debug!(path = %self.path.display(), "saved identity record");
        Ok(())
    }

    fn clear(&mut self) -> Result<(), PersistenceError> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }
}
