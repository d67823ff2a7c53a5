//! Persistence: four named slots of opaque bytes.
//!
//! The server writes through on every state mutation, so a crash never
//! loses more than the step arithmetic can recover on reload.

use std::{
    collections::HashMap,
    fs, io,
    path::PathBuf,
    sync::{Arc, Mutex},
};

use thiserror::Error;

/// Persistence failure.
#[derive(Error, Debug)]
pub enum StorageError {
    /// Underlying I/O failure.
    #[error("io failure: {0}")]
    Io(#[from] io::Error),

    /// The slot has never been written.
    #[error("slot {0:?} is empty")]
    Missing(StoreSlot),
}

/// The server's persistent slots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreSlot {
    /// Long-term key material (160 bytes).
    ServerKeys,
    /// Fountain state (152 bytes).
    Fountain,
    /// Pregenerator bookkeeping (64 bytes).
    Pregenerator,
    /// Last signed keylist.
    Keylist,
}

impl StoreSlot {
    fn file_name(self) -> &'static str {
        match self {
            StoreSlot::ServerKeys => "server-keys",
            StoreSlot::Fountain => "fountain",
            StoreSlot::Pregenerator => "pregenerator",
            StoreSlot::Keylist => "keylist",
        }
    }
}

/// Storage backend for server state.
///
/// Implementations are shared across the RPC layer and the pregeneration
/// task, so they must be cheap to clone and thread-safe.
pub trait Persistence: Clone + Send + Sync + 'static {
    /// Write a slot, replacing previous contents.
    fn store(&self, slot: StoreSlot, data: &[u8]) -> Result<(), StorageError>;

    /// Read a slot.
    fn load(&self, slot: StoreSlot) -> Result<Vec<u8>, StorageError>;
}

/// One file per slot under a directory.
#[derive(Debug, Clone)]
pub struct FileStore {
    path: PathBuf,
}

impl FileStore {
    /// Create a store rooted at `path`, creating the directory if needed.
    pub fn new(path: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let path = path.into();
        fs::create_dir_all(&path)?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&path, fs::Permissions::from_mode(0o700))?;
        }
        Ok(FileStore { path })
    }
}

impl Persistence for FileStore {
    fn store(&self, slot: StoreSlot, data: &[u8]) -> Result<(), StorageError> {
        let file = self.path.join(slot.file_name());
        fs::write(&file, data)?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&file, fs::Permissions::from_mode(0o600))?;
        }
        Ok(())
    }

    fn load(&self, slot: StoreSlot) -> Result<Vec<u8>, StorageError> {
        match fs::read(self.path.join(slot.file_name())) {
            Ok(data) => Ok(data),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Err(StorageError::Missing(slot)),
            Err(e) => Err(e.into()),
        }
    }
}

/// In-memory store for tests.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    slots: Arc<Mutex<HashMap<StoreSlot, Vec<u8>>>>,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

impl Persistence for MemoryStore {
    fn store(&self, slot: StoreSlot, data: &[u8]) -> Result<(), StorageError> {
        self.slots
            .lock()
            .expect("memory store lock poisoned")
            .insert(slot, data.to_vec());
        Ok(())
    }

    fn load(&self, slot: StoreSlot) -> Result<Vec<u8>, StorageError> {
        self.slots
            .lock()
            .expect("memory store lock poisoned")
            .get(&slot)
            .cloned()
            .ok_or(StorageError::Missing(slot))
    }
}
